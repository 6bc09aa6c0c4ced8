//! Property record checks and owner-chain walks.

use std::collections::BTreeMap;
use std::ops::Range;

use rustc_hash::FxHashSet;

use crate::storage::access::RecordStore;
use crate::storage::props::{decode_value, PropValue};
use crate::types::{is_null, PropKeyId, Result};

use super::checker::Context;
use super::report::{EntityKind, ViolationKind};

/// Checks each in-use property record in `ids`: links to both neighbours and
/// every block.
pub(crate) fn check_properties(ctx: &Context<'_>, ids: Range<u64>) -> Result<()> {
    let records = ctx.access.records.as_ref();
    for id in ids {
        let record = records.property(id)?;
        if !record.in_use {
            continue;
        }
        if !is_null(record.next) {
            let next = records.property(record.next)?;
            if !next.in_use {
                ctx.report(
                    EntityKind::Property,
                    id,
                    ViolationKind::PropertyChainNotInUse,
                    format!("next property record {} is not in use", record.next),
                );
            } else if next.prev != id {
                ctx.report(
                    EntityKind::Property,
                    id,
                    ViolationKind::PropertyChainInconsistent,
                    format!(
                        "next property record {} points back to {}",
                        record.next,
                        display_ref(next.prev)
                    ),
                );
            }
        }
        if !is_null(record.prev) {
            let prev = records.property(record.prev)?;
            if !prev.in_use {
                ctx.report(
                    EntityKind::Property,
                    id,
                    ViolationKind::PropertyChainNotInUse,
                    format!("previous property record {} is not in use", record.prev),
                );
            } else if prev.next != id {
                ctx.report(
                    EntityKind::Property,
                    id,
                    ViolationKind::PropertyChainInconsistent,
                    format!(
                        "previous property record {} points forward to {}",
                        record.prev,
                        display_ref(prev.next)
                    ),
                );
            }
        }
        for (index, block) in record.blocks.iter().enumerate() {
            if let Err(err) = decode_value(&block.payload) {
                ctx.report(
                    EntityKind::Property,
                    id,
                    ViolationKind::PropertyBlockUndecodable,
                    format!("block {index} (key {}): {err}", block.key),
                );
            }
            if !ctx.property_key_live(block.key) {
                ctx.report(
                    EntityKind::Property,
                    id,
                    ViolationKind::PropertyKeyTokenMissing,
                    format!("block {index} uses property key {} with no token", block.key),
                );
            }
        }
    }
    Ok(())
}

/// Walks the property chain of one owner, reporting cycles and keys that
/// occur twice. The walk stops at the first record that is not in use;
/// dangling pointers are reported by the record checks.
pub(crate) fn check_owner_chain(
    ctx: &Context<'_>,
    owner_kind: EntityKind,
    owner: u64,
    first: u64,
) -> Result<()> {
    let records = ctx.access.records.as_ref();
    let mut visited = FxHashSet::default();
    let mut keys = FxHashSet::default();
    let mut cursor = first;
    while !is_null(cursor) {
        if !visited.insert(cursor) {
            ctx.report(
                owner_kind,
                owner,
                ViolationKind::PropertyChainCycle,
                format!("property chain revisits record {cursor}"),
            );
            break;
        }
        let record = records.property(cursor)?;
        if !record.in_use {
            break;
        }
        if cursor == first && !is_null(record.prev) {
            ctx.report(
                owner_kind,
                owner,
                ViolationKind::PropertyChainInconsistent,
                format!(
                    "first property record {cursor} has previous record {}",
                    record.prev
                ),
            );
        }
        for block in &record.blocks {
            if !keys.insert(block.key) {
                ctx.report(
                    owner_kind,
                    owner,
                    ViolationKind::PropertyDuplicateKey,
                    format!("property key {} repeated in record {cursor}", block.key),
                );
            }
        }
        cursor = record.next;
    }
    Ok(())
}

/// Values of `keys` along an owner's chain, in key order. `None` when a key is
/// absent or its value does not decode; the first occurrence of a key wins.
pub(crate) fn chain_values(
    records: &dyn RecordStore,
    first: u64,
    keys: &[PropKeyId],
) -> Result<Option<Vec<PropValue>>> {
    let mut found: BTreeMap<PropKeyId, Option<PropValue>> = BTreeMap::new();
    let mut visited = FxHashSet::default();
    let mut cursor = first;
    while !is_null(cursor) && visited.insert(cursor) {
        let record = records.property(cursor)?;
        if !record.in_use {
            break;
        }
        for block in &record.blocks {
            if keys.contains(&block.key) {
                found
                    .entry(block.key)
                    .or_insert_with(|| decode_value(&block.payload).ok());
            }
        }
        cursor = record.next;
    }
    Ok(keys
        .iter()
        .map(|key| found.remove(key).flatten())
        .collect())
}

/// Whether the chain holds `key` at all.
pub(crate) fn chain_has_key(records: &dyn RecordStore, first: u64, key: PropKeyId) -> Result<bool> {
    let mut visited = FxHashSet::default();
    let mut cursor = first;
    while !is_null(cursor) && visited.insert(cursor) {
        let record = records.property(cursor)?;
        if !record.in_use {
            break;
        }
        if record.blocks.iter().any(|block| block.key == key) {
            return Ok(true);
        }
        cursor = record.next;
    }
    Ok(false)
}

pub(crate) fn display_ref(reference: u64) -> String {
    if is_null(reference) {
        "null".to_string()
    } else {
        reference.to_string()
    }
}
