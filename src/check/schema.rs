//! Schema descriptors, constraints and property index entries.
//!
//! Entries are cross-checked in both directions: every store entity covered
//! by an index must hold exactly its expected value tuple, and every tuple the
//! index holds must be backed by the store. Only online indexes take part;
//! the others are listed as skipped.

use std::ops::Range;

use tracing::{debug, info};

use crate::primitives::concurrency::ParallelExecution;
use crate::storage::props::{encode_tuple, PropValue};
use crate::storage::schema::{ConstraintKind, IndexDescriptor, IndexSchema, IndexState};
use crate::types::{RecordType, Result, StoreError};

use super::checker::Context;
use super::property::{chain_has_key, chain_values};
use super::report::{EntityKind, ViolationKind};

/// Runs every schema check. Returns the names of indexes left out of the
/// entry cross-check.
pub(crate) fn check_schema(ctx: &Context<'_>, exec: &ParallelExecution) -> Result<Vec<String>> {
    let indexes = ctx.access.schema.indexes();
    let mut skipped = Vec::new();
    for index in &indexes {
        check_descriptor(ctx, index);
        match index.state {
            IndexState::Online => check_index_entries(ctx, exec, index)?,
            state => {
                if state == IndexState::Failed {
                    ctx.report(
                        EntityKind::Index,
                        index.id,
                        ViolationKind::IndexFailed,
                        format!("index {} failed to populate", index.name),
                    );
                }
                info!(index = %index.name, state = ?state, "check.index.skipped");
                skipped.push(index.name.clone());
            }
        }
    }

    for constraint in ctx.access.schema.constraints() {
        match constraint.kind {
            ConstraintKind::Uniqueness { owned_index } => {
                match indexes.iter().find(|index| index.id == owned_index) {
                    None => ctx.report(
                        EntityKind::Constraint,
                        constraint.id,
                        ViolationKind::ConstraintIndexMissing,
                        format!(
                            "constraint {} is backed by index {owned_index} which does not exist",
                            constraint.name
                        ),
                    ),
                    Some(index) if !index.unique => ctx.report(
                        EntityKind::Constraint,
                        constraint.id,
                        ViolationKind::ConstraintIndexNotUnique,
                        format!(
                            "constraint {} is backed by non-unique index {} ({owned_index})",
                            constraint.name, index.name
                        ),
                    ),
                    Some(_) => {}
                }
            }
            ConstraintKind::NodePropertyExistence { label, key } => {
                if !ctx.label_live(label) {
                    ctx.report(
                        EntityKind::Constraint,
                        constraint.id,
                        ViolationKind::SchemaTokenMissing,
                        format!("constraint {} names label {label} with no token", constraint.name),
                    );
                }
                if !ctx.property_key_live(key) {
                    ctx.report(
                        EntityKind::Constraint,
                        constraint.id,
                        ViolationKind::SchemaTokenMissing,
                        format!(
                            "constraint {} names property key {key} with no token",
                            constraint.name
                        ),
                    );
                }
                let name = constraint.name.as_str();
                exec.run("constraint", 0..ctx.node_high_id, |ids| {
                    for id in ids {
                        let node = ctx.access.records.node(id)?;
                        if node.in_use
                            && node.labels.contains(&label)
                            && !chain_has_key(ctx.access.records.as_ref(), node.next_prop, key)?
                        {
                            ctx.report(
                                EntityKind::Node,
                                id,
                                ViolationKind::ConstraintPropertyMissing,
                                format!("node with label {label} lacks property key {key} required by {name}"),
                            );
                        }
                    }
                    Ok::<(), StoreError>(())
                })?;
            }
        }
    }
    debug!(indexes = indexes.len(), skipped = skipped.len(), "check.schema.done");
    Ok(skipped)
}

fn check_descriptor(ctx: &Context<'_>, index: &IndexDescriptor) {
    let mut missing = Vec::new();
    match &index.schema {
        IndexSchema::Label { label, .. } if !ctx.label_live(*label) => {
            missing.push(format!("label {label}"));
        }
        IndexSchema::RelType { ty, .. } if !ctx.relationship_type_live(*ty) => {
            missing.push(format!("relationship type {ty}"));
        }
        _ => {}
    }
    for key in index.schema.keys() {
        if !ctx.property_key_live(*key) {
            missing.push(format!("property key {key}"));
        }
    }
    for token in missing {
        ctx.report(
            EntityKind::Index,
            index.id,
            ViolationKind::SchemaTokenMissing,
            format!("index {} names {token} with no token", index.name),
        );
    }
}

fn check_index_entries(ctx: &Context<'_>, exec: &ParallelExecution, index: &IndexDescriptor) -> Result<()> {
    let store_high = match index.schema {
        IndexSchema::Label { .. } => ctx.node_high_id,
        IndexSchema::RelType { .. } => ctx.access.records.high_id(RecordType::Relationship),
    };
    let high = store_high.max(ctx.access.schema.index_high_entity_id(index.id)?);
    debug!(index = %index.name, high, "check.index.start");
    exec.run("index", 0..high, |ids| check_entities(ctx, index, store_high, ids))
}

fn check_entities(
    ctx: &Context<'_>,
    index: &IndexDescriptor,
    store_high: u64,
    ids: Range<u64>,
) -> Result<()> {
    let entity_kind = match index.schema {
        IndexSchema::Label { .. } => EntityKind::Node,
        IndexSchema::RelType { .. } => EntityKind::Relationship,
    };
    for id in ids {
        let expected = if id < store_high {
            expected_tuple(ctx, &index.schema, id)?
        } else {
            None
        };
        let expected_key = expected.as_deref().map(encode_tuple);
        let actual = ctx.access.schema.index_entries(index.id, id)?;
        if let (Some(values), Some(key)) = (&expected, &expected_key) {
            if !actual.iter().any(|tuple| encode_tuple(tuple) == *key) {
                ctx.report(
                    entity_kind,
                    id,
                    ViolationKind::IndexEntryMissing,
                    format!("index {} lacks entry ({})", index.name, format_values(values)),
                );
            } else if index.unique {
                check_unique(ctx, index, entity_kind, store_high, id, values, key)?;
            }
        }
        for tuple in actual {
            if expected_key.as_ref() != Some(&encode_tuple(&tuple)) {
                ctx.report(
                    entity_kind,
                    id,
                    ViolationKind::IndexEntryDangling,
                    format!(
                        "index {} holds entry ({}) the store does not back",
                        index.name,
                        format_values(&tuple)
                    ),
                );
            }
        }
    }
    Ok(())
}

/// Reports a duplicate once, at the lowest holder the store backs. Holders
/// the store does not back are dangling entries, reported on their own.
fn check_unique(
    ctx: &Context<'_>,
    index: &IndexDescriptor,
    entity_kind: EntityKind,
    store_high: u64,
    id: u64,
    values: &[PropValue],
    key: &[u8],
) -> Result<()> {
    let holders = ctx.access.schema.index_lookup(index.id, values)?;
    if holders.len() < 2 {
        return Ok(());
    }
    let mut backed = Vec::with_capacity(holders.len());
    for holder in holders {
        if holder == id {
            backed.push(holder);
            continue;
        }
        if holder >= store_high {
            continue;
        }
        let tuple = expected_tuple(ctx, &index.schema, holder)?;
        if tuple.is_some_and(|tuple| encode_tuple(&tuple) == key) {
            backed.push(holder);
        }
    }
    if backed.len() > 1 && backed.iter().min() == Some(&id) {
        ctx.report(
            entity_kind,
            id,
            ViolationKind::IndexDuplicateValue,
            format!(
                "unique index {} maps ({}) to {backed:?}",
                index.name,
                format_values(values)
            ),
        );
    }
    Ok(())
}

/// The tuple an index over `schema` should hold for entity `id`, if any.
fn expected_tuple(ctx: &Context<'_>, schema: &IndexSchema, id: u64) -> Result<Option<Vec<PropValue>>> {
    let records = ctx.access.records.as_ref();
    match schema {
        IndexSchema::Label { label, keys } => {
            let node = records.node(id)?;
            if !node.in_use || !node.labels.contains(label) {
                return Ok(None);
            }
            chain_values(records, node.next_prop, keys)
        }
        IndexSchema::RelType { ty, keys } => {
            let rel = records.relationship(id)?;
            if !rel.in_use || rel.ty != *ty {
                return Ok(None);
            }
            chain_values(records, rel.next_prop, keys)
        }
    }
}

fn format_values(values: &[PropValue]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::checker::testing::Harness;
    use crate::storage::builder::GraphBuilder;
    use crate::storage::memory::MemoryStore;
    use crate::storage::props::encode_value;
    use crate::storage::schema::ConstraintDescriptor;
    use crate::types::{LabelId, PropKeyId};

    fn indexed_store(unique: bool) -> (MemoryStore, [u64; 3]) {
        let mut builder = GraphBuilder::new();
        let person = builder.label(0, "Person");
        let name = builder.property_key(0, "name");
        let a = builder.node(&[person], &[(name, PropValue::Str("ada".into()))]);
        let b = builder.node(&[person], &[(name, PropValue::Str("bob".into()))]);
        let c = builder.node(&[], &[(name, PropValue::Str("cy".into()))]);
        builder.index(IndexDescriptor {
            id: 1,
            name: "person_name".into(),
            schema: IndexSchema::Label {
                label: person,
                keys: vec![name],
            },
            unique,
            state: IndexState::Online,
        });
        (builder.build(), [a, b, c])
    }

    fn run(store: MemoryStore) -> (crate::check::report::ConsistencySummary, Vec<String>) {
        let harness = Harness::new(store);
        let ctx = harness.context();
        let exec = ParallelExecution::new(2, 1);
        let skipped = check_schema(&ctx, &exec).unwrap();
        (harness.summary(), skipped)
    }

    #[test]
    fn built_index_matches_the_store() {
        let (store, _) = indexed_store(true);
        let (summary, skipped) = run(store);
        assert_eq!(summary.total_violations, 0);
        assert!(skipped.is_empty());
    }

    #[test]
    fn missing_and_dangling_entries() {
        let (mut store, [a, _, c]) = indexed_store(false);
        store.remove_index_entries(1, a);
        store.add_index_entry(1, c, vec![PropValue::Str("cy".into())]);
        store.add_index_entry(1, 40, vec![PropValue::Str("ghost".into())]);
        let (summary, _) = run(store);
        assert_eq!(summary.count(ViolationKind::IndexEntryMissing), 1);
        assert_eq!(summary.count(ViolationKind::IndexEntryDangling), 2);
        assert!(summary
            .violations
            .iter()
            .any(|v| v.id == Some(40) && v.detail.contains("ghost")));
    }

    #[test]
    fn unique_index_duplicates_are_reported_once() {
        let (mut store, [_, b, _]) = indexed_store(true);
        // property records are allocated per node in creation order
        if let Some(record) = store.property_mut(b) {
            record.blocks[0].payload = encode_value(&PropValue::Str("ada".into()));
        }
        store.rebuild_index(1);
        let (summary, _) = run(store);
        assert_eq!(summary.count(ViolationKind::IndexDuplicateValue), 1);
        assert_eq!(summary.total_violations, 1);
    }

    fn single_key_store(values: &[PropValue], unique: bool) -> (MemoryStore, Vec<u64>) {
        let mut builder = GraphBuilder::new();
        let label = builder.label(0, "L");
        let k = builder.property_key(0, "k");
        let ids = values
            .iter()
            .map(|value| builder.node(&[label], &[(k, value.clone())]))
            .collect();
        builder.index(IndexDescriptor {
            id: 1,
            name: "l_k".into(),
            schema: IndexSchema::Label {
                label,
                keys: vec![k],
            },
            unique,
            state: IndexState::Online,
        });
        (builder.build(), ids)
    }

    #[test]
    fn float_entries_match_bit_for_bit() {
        let values = [
            PropValue::Float(f64::NAN),
            PropValue::Float(-0.0),
            PropValue::Float(0.0),
        ];
        let (store, _) = single_key_store(&values, true);
        let (summary, _) = run(store);
        assert_eq!(summary.total_violations, 0, "{:?}", summary.violations);

        let (mut store, ids) = single_key_store(&[PropValue::Float(0.0)], false);
        store.remove_index_entries(1, ids[0]);
        store.add_index_entry(1, ids[0], vec![PropValue::Float(-0.0)]);
        let (summary, _) = run(store);
        assert_eq!(summary.count(ViolationKind::IndexEntryMissing), 1);
        assert_eq!(summary.count(ViolationKind::IndexEntryDangling), 1);
    }

    #[test]
    fn duplicate_is_found_past_a_dangling_holder() {
        let mut builder = GraphBuilder::new();
        let person = builder.label(0, "Person");
        let name = builder.property_key(0, "name");
        builder.skip_node_ids(1);
        let first = builder.node(&[person], &[(name, PropValue::Str("ada".into()))]);
        let second = builder.node(&[person], &[(name, PropValue::Str("ada".into()))]);
        builder.index(IndexDescriptor {
            id: 1,
            name: "person_name".into(),
            schema: IndexSchema::Label {
                label: person,
                keys: vec![name],
            },
            unique: true,
            state: IndexState::Online,
        });
        let mut store = builder.build();
        store.add_index_entry(1, 0, vec![PropValue::Str("ada".into())]);
        let (summary, _) = run(store);
        assert_eq!(summary.count(ViolationKind::IndexEntryDangling), 1);
        let duplicates: Vec<_> = summary
            .violations
            .iter()
            .filter(|v| v.kind == ViolationKind::IndexDuplicateValue)
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].id, Some(first));
        assert!(duplicates[0].detail.contains(&format!("[{first}, {second}]")));
    }

    #[test]
    fn offline_indexes_are_skipped_and_failures_reported() {
        let mut store = MemoryStore::new();
        store.put_label_token(0, "L");
        store.put_property_key_token(0, "k");
        for (id, state) in [(1, IndexState::Populating), (2, IndexState::Failed)] {
            store.add_index(IndexDescriptor {
                id,
                name: format!("idx{id}"),
                schema: IndexSchema::Label {
                    label: LabelId(0),
                    keys: vec![PropKeyId(0)],
                },
                unique: false,
                state,
            });
        }
        store.add_index_entry(2, 5, vec![PropValue::Int(1)]);
        let (summary, skipped) = run(store);
        assert_eq!(skipped, vec!["idx1".to_string(), "idx2".to_string()]);
        assert_eq!(summary.count(ViolationKind::IndexFailed), 1);
        assert_eq!(summary.count(ViolationKind::IndexEntryDangling), 0);
    }

    #[test]
    fn constraints_are_checked_against_indexes_and_nodes() {
        let mut builder = GraphBuilder::new();
        let person = builder.label(0, "Person");
        let name = builder.property_key(0, "name");
        builder.node(&[person], &[(name, PropValue::Int(1))]);
        let bare = builder.node(&[person], &[]);
        builder.index(IndexDescriptor {
            id: 3,
            name: "plain".into(),
            schema: IndexSchema::Label {
                label: person,
                keys: vec![name],
            },
            unique: false,
            state: IndexState::Online,
        });
        let mut store = builder.build();
        store.add_constraint(ConstraintDescriptor {
            id: 10,
            name: "unique_name".into(),
            kind: ConstraintKind::Uniqueness { owned_index: 3 },
        });
        store.add_constraint(ConstraintDescriptor {
            id: 11,
            name: "dangling".into(),
            kind: ConstraintKind::Uniqueness { owned_index: 99 },
        });
        store.add_constraint(ConstraintDescriptor {
            id: 12,
            name: "name_exists".into(),
            kind: ConstraintKind::NodePropertyExistence {
                label: person,
                key: name,
            },
        });
        let (summary, _) = run(store);
        assert_eq!(summary.count(ViolationKind::ConstraintIndexNotUnique), 1);
        assert_eq!(summary.count(ViolationKind::ConstraintIndexMissing), 1);
        assert_eq!(summary.count(ViolationKind::ConstraintPropertyMissing), 1);
        assert!(summary
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::ConstraintPropertyMissing && v.id == Some(bare)));
    }
}
