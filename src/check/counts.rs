//! Observed aggregate counts and their comparison with the counts store.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::storage::access::{CountsRead, TokenRead};
use crate::storage::counts::CountsKey;
use crate::types::{LabelId, TypeId};

use super::report::{ConsistencyReporter, EntityKind, ViolationKind};

/// Counts gathered by one chunk, merged into [`CountsState`] when the chunk
/// ends.
#[derive(Default)]
pub(crate) struct CountsBatch {
    counts: FxHashMap<CountsKey, u64>,
}

impl CountsBatch {
    pub(crate) fn increment(&mut self, key: CountsKey) {
        *self.counts.entry(key).or_default() += 1;
    }

    /// One in-use node carrying `labels`.
    pub(crate) fn node(&mut self, labels: &[LabelId]) {
        self.increment(CountsKey::nodes(None));
        for label in distinct(labels) {
            self.increment(CountsKey::nodes(Some(label)));
        }
    }

    /// One in-use relationship, endpoint labels left out.
    pub(crate) fn relationship(&mut self, ty: TypeId) {
        for ty in [None, Some(ty)] {
            self.increment(CountsKey::relationships(None, ty, None));
        }
    }

    /// Labelled counts contributed by the start node of a relationship.
    pub(crate) fn relationship_start(&mut self, start_labels: &[LabelId], ty: TypeId) {
        for label in distinct(start_labels) {
            for ty in [None, Some(ty)] {
                self.increment(CountsKey::relationships(Some(label), ty, None));
            }
        }
    }

    /// Labelled counts contributed by the end node of a relationship.
    pub(crate) fn relationship_end(&mut self, end_labels: &[LabelId], ty: TypeId) {
        for label in distinct(end_labels) {
            for ty in [None, Some(ty)] {
                self.increment(CountsKey::relationships(None, ty, Some(label)));
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

fn distinct(labels: &[LabelId]) -> impl Iterator<Item = LabelId> + '_ {
    labels
        .iter()
        .enumerate()
        .filter(move |(index, label)| !labels[..*index].contains(label))
        .map(|(_, label)| *label)
}

/// Observed counts for the whole run. Written only through
/// [`CountsState::merge`]; read once the counting phases are over.
#[derive(Default)]
pub struct CountsState {
    observed: Mutex<BTreeMap<CountsKey, u64>>,
}

impl CountsState {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn merge(&self, batch: CountsBatch) {
        if batch.is_empty() {
            return;
        }
        let mut observed = self.observed.lock();
        for (key, count) in batch.counts {
            *observed.entry(key).or_default() += count;
        }
    }

    /// Observed value for `key`.
    pub fn observed(&self, key: &CountsKey) -> u64 {
        self.observed.lock().get(key).copied().unwrap_or(0)
    }

    /// Ends accumulation and hands out the totals.
    pub fn close(self) -> BTreeMap<CountsKey, u64> {
        self.observed.into_inner()
    }
}

/// Reports every key whose observed total differs from the stored one.
///
/// Keys present on only one side compare against zero.
pub(crate) fn check_counts(
    observed: &BTreeMap<CountsKey, u64>,
    counts: &dyn CountsRead,
    reporter: &ConsistencyReporter,
) {
    let mut keys: Vec<CountsKey> = observed.keys().copied().collect();
    keys.extend(counts.keys());
    keys.sort_unstable();
    keys.dedup();
    let mut mismatches = 0u64;
    for key in &keys {
        let seen = observed.get(key).copied().unwrap_or(0);
        let stored = counts.expected(key);
        if seen != stored {
            mismatches += 1;
            reporter.report_aggregate(
                EntityKind::Counts,
                ViolationKind::CountsMismatch,
                format!("{key}: stored {stored}, observed {seen}"),
            );
        }
    }
    debug!(keys = keys.len(), mismatches, "check.counts.compared");
}

/// Per-label node counts and per-type relationship counts keyed by token
/// name; ids without a token are written as `#id`.
pub(crate) fn named_counts(
    observed: &BTreeMap<CountsKey, u64>,
    tokens: &dyn TokenRead,
) -> (BTreeMap<String, u64>, BTreeMap<String, u64>) {
    let mut by_label = BTreeMap::new();
    let mut by_type = BTreeMap::new();
    for (key, &count) in observed {
        match *key {
            CountsKey::Nodes { label: Some(label) } => {
                let name = tokens
                    .label(label)
                    .map(|token| token.name)
                    .unwrap_or_else(|| format!("#{label}"));
                *by_label.entry(name).or_default() += count;
            }
            CountsKey::Relationships {
                start: None,
                ty: Some(ty),
                end: None,
            } => {
                let name = tokens
                    .relationship_type(ty)
                    .map(|token| token.name)
                    .unwrap_or_else(|| format!("#{ty}"));
                *by_type.entry(name).or_default() += count;
            }
            _ => {}
        }
    }
    (by_label, by_type)
}
