//! Slot-addressed side table holding per-node scratch state for one window.
//!
//! Every id in the active window owns a record of fixed-width slots packed
//! into 64-bit words. The table is shared by all workers without locks: within
//! a phase each (id, slot) cell has exactly one writer, and the barrier at the
//! end of a phase publishes the writes to every reader. Debug builds verify
//! the single-writer precondition.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::types::{is_null, LabelId, NULL_REFERENCE};

/// Slot indexes of the node cache record.
pub mod node_slots {
    /// Node record is in use.
    pub const IN_USE: usize = 0;
    /// Node keeps its relationships in groups.
    pub const DENSE: usize = 1;
    /// First relationship (sparse) or first group (dense).
    pub const FIRST_REL: usize = 2;
    /// Label bit-set, see [`super::label_bits`].
    pub const LABELS: usize = 3;
}

/// Bit widths of the default node cache record.
pub const DEFAULT_SLOT_SIZES: [u8; 4] = [1, 1, 62, 64];

/// Label-set bit meaning "some label id did not fit, read the record".
pub const LABELS_OVERFLOW: u64 = 1 << 63;

/// Writes buffered by a client before it flushes.
const CLIENT_BATCH: usize = 32;

/// Bit widths of the slots in one cache record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SlotSizes {
    bits: Vec<u8>,
}

impl SlotSizes {
    /// Declares a layout.
    ///
    /// # Panics
    ///
    /// Panics on an empty layout, on more than 64 slots, or on a width outside
    /// `1..=64`.
    pub fn new(bits: &[u8]) -> Self {
        assert!(!bits.is_empty(), "cache layout needs at least one slot");
        assert!(bits.len() <= 64, "cache layout supports at most 64 slots");
        assert!(
            bits.iter().all(|b| (1..=64).contains(b)),
            "slot widths must be between 1 and 64 bits"
        );
        Self {
            bits: bits.to_vec(),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Always false; layouts have at least one slot.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Bytes one id's record takes once slots are packed into words.
    pub fn bytes_per_record(&self) -> u64 {
        (plan_layout(self).1 * 8) as u64
    }
}

impl Default for SlotSizes {
    fn default() -> Self {
        Self::new(&DEFAULT_SLOT_SIZES)
    }
}

#[derive(Clone, Copy, Debug)]
struct SlotLayout {
    word: usize,
    shift: u32,
    mask: u64,
}

fn plan_layout(sizes: &SlotSizes) -> (Vec<SlotLayout>, usize) {
    let mut layout = Vec::with_capacity(sizes.len());
    let mut word = 0usize;
    let mut used = 0u32;
    for &bits in &sizes.bits {
        let bits = u32::from(bits);
        if used + bits > 64 {
            word += 1;
            used = 0;
        }
        let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
        layout.push(SlotLayout {
            word,
            shift: used,
            mask,
        });
        used += bits;
    }
    (layout, word + 1)
}

/// The shared cache. See the module docs for the concurrency contract.
pub struct CacheAccess {
    layout: Vec<SlotLayout>,
    words_per_record: usize,
    budget_bytes: u64,
    window: Range<u64>,
    words: Vec<AtomicU64>,
    #[cfg(debug_assertions)]
    written: Vec<AtomicU64>,
}

impl CacheAccess {
    /// Creates an empty cache whose windows may never exceed `budget_bytes`.
    pub fn new(sizes: &SlotSizes, budget_bytes: u64) -> Self {
        let (layout, words_per_record) = plan_layout(sizes);
        Self {
            layout,
            words_per_record,
            budget_bytes,
            window: 0..0,
            words: Vec::new(),
            #[cfg(debug_assertions)]
            written: Vec::new(),
        }
    }

    /// Bytes one id's record takes.
    pub fn bytes_per_record(&self) -> u64 {
        (self.words_per_record * 8) as u64
    }

    /// The window currently resident.
    pub fn window(&self) -> Range<u64> {
        self.window.clone()
    }

    /// Whether `id` lies in the resident window.
    pub fn contains(&self, id: u64) -> bool {
        self.window.contains(&id)
    }

    /// Makes `window` resident with every slot zeroed.
    ///
    /// # Panics
    ///
    /// Panics when the window's records exceed the byte budget; callers must
    /// size windows through the memory limiter first.
    pub fn clear(&mut self, window: Range<u64>) {
        let ids = window.end.saturating_sub(window.start);
        let bytes = ids.saturating_mul(self.bytes_per_record());
        assert!(
            bytes <= self.budget_bytes,
            "cache window of {ids} ids needs {bytes} bytes, budget is {}",
            self.budget_bytes
        );
        let words = ids as usize * self.words_per_record;
        if self.words.len() < words {
            self.words.resize_with(words, || AtomicU64::new(0));
        }
        for word in &mut self.words[..words] {
            *word.get_mut() = 0;
        }
        #[cfg(debug_assertions)]
        {
            if self.written.len() < ids as usize {
                self.written.resize_with(ids as usize, || AtomicU64::new(0));
            }
            for mark in &mut self.written[..ids as usize] {
                *mark.get_mut() = 0;
            }
        }
        self.window = window;
    }

    /// Releases the backing memory.
    pub fn release(&mut self) {
        self.words = Vec::new();
        #[cfg(debug_assertions)]
        {
            self.written = Vec::new();
        }
        self.window = 0..0;
    }

    /// Reads a slot.
    pub fn get(&self, id: u64, slot: usize) -> u64 {
        let (index, layout) = self.locate(id, slot);
        (self.words[index].load(Ordering::Relaxed) >> layout.shift) & layout.mask
    }

    /// Reads a pointer slot, decoding the all-ones pattern as null. `None`
    /// means the stored pointer did not fit the slot; read the record.
    pub fn get_reference(&self, id: u64, slot: usize) -> Option<u64> {
        decode_reference(self.get(id, slot), self.layout[slot].mask)
    }

    /// A per-worker accessor batching writes.
    pub fn client(&self) -> CacheClient<'_> {
        CacheClient {
            cache: self,
            pending: SmallVec::new(),
        }
    }

    fn locate(&self, id: u64, slot: usize) -> (usize, SlotLayout) {
        assert!(
            self.window.contains(&id),
            "id {id} outside resident cache window {:?}",
            self.window
        );
        let layout = self.layout[slot];
        let record = (id - self.window.start) as usize;
        (record * self.words_per_record + layout.word, layout)
    }

    #[cfg(debug_assertions)]
    fn mark_written(&self, id: u64, slot: usize) {
        let record = (id - self.window.start) as usize;
        let bit = 1u64 << slot;
        let previous = self.written[record].fetch_or(bit, Ordering::Relaxed);
        debug_assert!(
            previous & bit == 0,
            "cache slot {slot} of id {id} written twice in one window"
        );
    }

    // Slots of one id share words, so a write must not clobber its neighbours.
    fn apply(&self, index: usize, mask: u64, bits: u64) {
        let word = &self.words[index];
        word.fetch_and(!mask, Ordering::Relaxed);
        word.fetch_or(bits, Ordering::Relaxed);
    }
}

/// Thread-scoped cache accessor. Writes are buffered and land in the shared
/// table on [`CacheClient::flush`] or when the client is dropped.
pub struct CacheClient<'a> {
    cache: &'a CacheAccess,
    pending: SmallVec<[(usize, u64, u64); CLIENT_BATCH]>,
}

impl CacheClient<'_> {
    /// Writes `value` into a slot. Bits above the slot width are dropped.
    pub fn put(&mut self, id: u64, slot: usize, value: u64) {
        let (index, layout) = self.cache.locate(id, slot);
        debug_assert!(
            value & !layout.mask == 0,
            "value {value:#x} does not fit slot {slot}"
        );
        #[cfg(debug_assertions)]
        self.cache.mark_written(id, slot);
        let mask = layout.mask << layout.shift;
        let bits = (value & layout.mask) << layout.shift;
        self.pending.push((index, mask, bits));
        if self.pending.len() >= CLIENT_BATCH {
            self.flush();
        }
    }

    /// Writes a pointer slot, encoding null as all ones. Pointers too wide
    /// for the slot are stored as the overflow pattern, one below null.
    pub fn put_reference(&mut self, id: u64, slot: usize, reference: u64) {
        let mask = self.cache.layout[slot].mask;
        let value = if is_null(reference) {
            mask
        } else if reference >= mask - 1 {
            mask - 1
        } else {
            reference
        };
        self.put(id, slot, value);
    }

    /// Reads a slot, seeing this client's own unflushed writes.
    pub fn get(&self, id: u64, slot: usize) -> u64 {
        let (index, layout) = self.cache.locate(id, slot);
        let mut word = self.cache.words[index].load(Ordering::Relaxed);
        for &(pending_index, mask, bits) in &self.pending {
            if pending_index == index {
                word = (word & !mask) | bits;
            }
        }
        (word >> layout.shift) & layout.mask
    }

    /// Reads a pointer slot like [`CacheAccess::get_reference`].
    pub fn get_reference(&self, id: u64, slot: usize) -> Option<u64> {
        decode_reference(self.get(id, slot), self.cache.layout[slot].mask)
    }

    /// Publishes buffered writes to the shared table.
    pub fn flush(&mut self) {
        for (index, mask, bits) in self.pending.drain(..) {
            self.cache.apply(index, mask, bits);
        }
    }
}

impl Drop for CacheClient<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

fn decode_reference(raw: u64, mask: u64) -> Option<u64> {
    if raw == mask {
        Some(NULL_REFERENCE)
    } else if raw == mask - 1 {
        None
    } else {
        Some(raw)
    }
}

/// Encodes a label set as a bit-set of ids below 63, with
/// [`LABELS_OVERFLOW`] set when any id is larger.
pub fn label_bits(labels: &[LabelId]) -> u64 {
    labels.iter().fold(0u64, |bits, label| {
        if label.0 < 63 {
            bits | (1u64 << label.0)
        } else {
            bits | LABELS_OVERFLOW
        }
    })
}

/// Decodes a label bit-set; `None` when it overflowed.
pub fn labels_from_bits(bits: u64) -> Option<SmallVec<[LabelId; 4]>> {
    if bits & LABELS_OVERFLOW != 0 {
        return None;
    }
    Some(
        (0..63u32)
            .filter(|label| bits & (1u64 << label) != 0)
            .map(LabelId)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(window: Range<u64>) -> CacheAccess {
        let mut cache = CacheAccess::new(&SlotSizes::default(), 1 << 20);
        cache.clear(window);
        cache
    }

    #[test]
    fn default_layout_packs_into_two_words() {
        let cache = CacheAccess::new(&SlotSizes::default(), 0);
        assert_eq!(cache.bytes_per_record(), 16);
        let wide = SlotSizes::new(&[40, 40, 40]);
        assert_eq!(wide.bytes_per_record(), 24);
        assert_eq!(SlotSizes::new(&[32, 32, 1]).bytes_per_record(), 16);
    }

    #[test]
    fn slots_are_independent() {
        let cache = cache(10..20);
        {
            let mut client = cache.client();
            client.put(12, node_slots::IN_USE, 1);
            client.put(12, node_slots::DENSE, 1);
            client.put_reference(12, node_slots::FIRST_REL, 77);
            client.put(12, node_slots::LABELS, u64::MAX);
            client.put_reference(13, node_slots::FIRST_REL, NULL_REFERENCE);
        }
        assert_eq!(cache.get(12, node_slots::IN_USE), 1);
        assert_eq!(cache.get(12, node_slots::DENSE), 1);
        assert_eq!(cache.get_reference(12, node_slots::FIRST_REL), Some(77));
        assert_eq!(cache.get(12, node_slots::LABELS), u64::MAX);
        assert_eq!(cache.get(13, node_slots::IN_USE), 0);
        assert_eq!(cache.get_reference(13, node_slots::FIRST_REL), Some(NULL_REFERENCE));
    }

    #[test]
    fn references_too_wide_for_the_slot_decode_as_overflow() {
        let cache = cache(0..4);
        {
            let mut client = cache.client();
            client.put_reference(0, node_slots::FIRST_REL, 1 << 62);
            client.put_reference(1, node_slots::FIRST_REL, (1 << 62) - 1);
            client.put_reference(2, node_slots::FIRST_REL, (1 << 62) - 2);
            client.put_reference(3, node_slots::FIRST_REL, (1 << 62) - 3);
        }
        assert_eq!(cache.get_reference(0, node_slots::FIRST_REL), None);
        assert_eq!(cache.get_reference(1, node_slots::FIRST_REL), None);
        assert_eq!(cache.get_reference(2, node_slots::FIRST_REL), None);
        assert_eq!(cache.get_reference(3, node_slots::FIRST_REL), Some((1 << 62) - 3));
    }

    #[test]
    fn client_sees_its_own_pending_writes() {
        let cache = cache(0..4);
        let mut client = cache.client();
        client.put(1, node_slots::IN_USE, 1);
        assert_eq!(client.get(1, node_slots::IN_USE), 1);
        assert_eq!(cache.get(1, node_slots::IN_USE), 0);
        client.flush();
        assert_eq!(cache.get(1, node_slots::IN_USE), 1);
    }

    #[test]
    fn clearing_zeroes_the_next_window() {
        let mut cache = cache(0..4);
        cache.client().put(3, node_slots::IN_USE, 1);
        cache.clear(4..8);
        assert_eq!(cache.get(4, node_slots::IN_USE), 0);
        assert!(!cache.contains(3));
    }

    #[test]
    #[should_panic(expected = "outside resident cache window")]
    fn reading_outside_the_window_panics() {
        cache(0..4).get(4, node_slots::IN_USE);
    }

    #[test]
    #[should_panic(expected = "budget")]
    fn window_larger_than_budget_panics() {
        let mut cache = CacheAccess::new(&SlotSizes::default(), 32);
        cache.clear(0..3);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "written twice")]
    fn double_write_is_caught_in_debug_builds() {
        let cache = cache(0..4);
        let mut client = cache.client();
        client.put(0, node_slots::IN_USE, 1);
        client.put(0, node_slots::IN_USE, 1);
    }

    #[test]
    fn concurrent_writers_on_distinct_ids() {
        let cache = cache(0..1000);
        std::thread::scope(|scope| {
            for worker in 0..4u64 {
                let cache = &cache;
                scope.spawn(move || {
                    let mut client = cache.client();
                    for id in (worker..1000).step_by(4) {
                        client.put_reference(id, node_slots::FIRST_REL, id * 3);
                        client.put(id, node_slots::IN_USE, 1);
                    }
                });
            }
        });
        for id in 0..1000 {
            assert_eq!(cache.get_reference(id, node_slots::FIRST_REL), Some(id * 3));
            assert_eq!(cache.get(id, node_slots::IN_USE), 1);
        }
    }

    #[test]
    fn concurrent_writers_on_distinct_slots_of_one_id() {
        for _ in 0..20 {
            let cache = cache(0..256);
            std::thread::scope(|scope| {
                let cache = &cache;
                scope.spawn(move || {
                    let mut client = cache.client();
                    for id in 0..256 {
                        client.put(id, node_slots::IN_USE, 1);
                        client.flush();
                    }
                });
                scope.spawn(move || {
                    let mut client = cache.client();
                    for id in 0..256 {
                        client.put(id, node_slots::DENSE, 1);
                        client.flush();
                    }
                });
                scope.spawn(move || {
                    let mut client = cache.client();
                    for id in 0..256 {
                        client.put_reference(id, node_slots::FIRST_REL, id + 1);
                        client.flush();
                    }
                });
            });
            for id in 0..256 {
                assert_eq!(cache.get(id, node_slots::IN_USE), 1);
                assert_eq!(cache.get(id, node_slots::DENSE), 1);
                assert_eq!(cache.get_reference(id, node_slots::FIRST_REL), Some(id + 1));
            }
        }
    }

    #[test]
    fn label_bits_round_trip_and_overflow() {
        let labels = [LabelId(0), LabelId(5), LabelId(62)];
        assert_eq!(labels_from_bits(label_bits(&labels)).unwrap().as_slice(), &labels);
        assert!(labels_from_bits(label_bits(&[LabelId(63)])).is_none());
        assert!(labels_from_bits(0).unwrap().is_empty());
    }
}
