//! Node population and node checks, one window at a time.

use std::ops::Range;

use crate::storage::access::RecordStore;
use crate::storage::record::NodeRecord;
use crate::types::{is_null, LabelId, Result};

use super::cache::{label_bits, node_slots};
use super::checker::Context;
use super::counts::CountsBatch;
use super::property::check_owner_chain;
use super::report::{EntityKind, ViolationKind};

/// Writes the cached node fields of every id in `ids`.
pub(crate) fn populate(ctx: &Context<'_>, ids: Range<u64>) -> Result<()> {
    let mut client = ctx.cache.client();
    for id in ids {
        let node = ctx.access.records.node(id)?;
        client.put(id, node_slots::IN_USE, u64::from(node.in_use));
        if !node.in_use {
            continue;
        }
        client.put(id, node_slots::DENSE, u64::from(node.dense));
        client.put_reference(id, node_slots::FIRST_REL, node.next_rel);
        client.put(id, node_slots::LABELS, label_bits(&node.labels));
    }
    client.flush();
    Ok(())
}

/// Checks every node in `ids`.
pub(crate) fn check_nodes(ctx: &Context<'_>, ids: Range<u64>, batch: &mut CountsBatch) -> Result<()> {
    let records = ctx.access.records.as_ref();
    for id in ids {
        let node = records.node(id)?;
        if !node.in_use {
            if ctx.flags.check_label_index {
                for label in ctx.access.label_index.labels_of(id)? {
                    ctx.report(
                        EntityKind::LabelIndex,
                        id,
                        ViolationKind::LabelIndexEntryDangling,
                        format!("label {label} indexed for node {id} which is not in use"),
                    );
                }
            }
            continue;
        }
        if ctx.flags.check_counts {
            batch.node(&node.labels);
        }
        if ctx.flags.check_graph {
            check_pointers(ctx, records, &node)?;
            check_labels(ctx, &node);
        }
        if ctx.flags.check_label_index {
            check_label_index(ctx, &node)?;
        }
        if ctx.flags.check_properties {
            check_owner_chain(ctx, EntityKind::Node, id, node.next_prop)?;
        }
    }
    Ok(())
}

fn check_pointers(ctx: &Context<'_>, records: &dyn RecordStore, node: &NodeRecord) -> Result<()> {
    let id = node.id;
    if !is_null(node.next_prop) && !records.property(node.next_prop)?.in_use {
        ctx.report(
            EntityKind::Node,
            id,
            ViolationKind::NodePropertyNotInUse,
            format!("first property record {} is not in use", node.next_prop),
        );
    }
    if is_null(node.next_rel) {
        return Ok(());
    }
    if node.dense {
        let group = records.group(node.next_rel)?;
        if !group.in_use {
            ctx.report(
                EntityKind::Node,
                id,
                ViolationKind::NodeGroupNotInUse,
                format!("first relationship group {} is not in use", node.next_rel),
            );
        } else if group.owner != id {
            ctx.report(
                EntityKind::Node,
                id,
                ViolationKind::NodeGroupOwnerMismatch,
                format!(
                    "first relationship group {} is owned by node {}",
                    node.next_rel, group.owner
                ),
            );
        }
    } else {
        let rel = records.relationship(node.next_rel)?;
        if !rel.in_use {
            ctx.report(
                EntityKind::Node,
                id,
                ViolationKind::NodeRelationshipNotInUse,
                format!("first relationship {} is not in use", node.next_rel),
            );
        } else if rel.side_of(id).is_none() {
            ctx.report(
                EntityKind::Node,
                id,
                ViolationKind::NodeRelationshipNotOwned,
                format!(
                    "first relationship {} connects nodes {} and {}",
                    node.next_rel, rel.first_node, rel.second_node
                ),
            );
        }
    }
    Ok(())
}

fn check_labels(ctx: &Context<'_>, node: &NodeRecord) {
    let id = node.id;
    if node.labels.windows(2).any(|pair| pair[0] > pair[1]) {
        ctx.report(
            EntityKind::Node,
            id,
            ViolationKind::NodeLabelsUnsorted,
            format!("labels {:?} are not sorted", label_ids(&node.labels)),
        );
    }
    let mut sorted = label_ids(&node.labels);
    sorted.sort_unstable();
    for pair in sorted.windows(2) {
        if pair[0] == pair[1] {
            ctx.report(
                EntityKind::Node,
                id,
                ViolationKind::NodeLabelDuplicate,
                format!("label {} appears more than once", pair[0]),
            );
        }
    }
    sorted.dedup();
    for label in sorted {
        if !ctx.label_live(LabelId(label)) {
            ctx.report(
                EntityKind::Node,
                id,
                ViolationKind::NodeLabelTokenMissing,
                format!("label {label} has no token"),
            );
        }
    }
}

fn check_label_index(ctx: &Context<'_>, node: &NodeRecord) -> Result<()> {
    let indexed = ctx.access.label_index.labels_of(node.id)?;
    let mut carried = label_ids(&node.labels);
    carried.sort_unstable();
    carried.dedup();
    for &label in &carried {
        if !indexed.contains(&LabelId(label)) {
            ctx.report(
                EntityKind::LabelIndex,
                node.id,
                ViolationKind::LabelIndexEntryMissing,
                format!("node {} carries label {label} but the label index lacks it", node.id),
            );
        }
    }
    for label in indexed {
        if carried.binary_search(&label.0).is_err() {
            ctx.report(
                EntityKind::LabelIndex,
                node.id,
                ViolationKind::LabelIndexEntryDangling,
                format!("label {label} indexed for node {} which does not carry it", node.id),
            );
        }
    }
    Ok(())
}

/// Reports label index entries naming nodes at or beyond the node high id,
/// which no window covers.
pub(crate) fn check_label_index_tail(ctx: &Context<'_>) {
    if ctx.access.label_index.high_node_id() <= ctx.node_high_id {
        return;
    }
    for label in ctx.access.label_index.indexed_labels() {
        let beyond = ctx
            .access
            .label_index
            .nodes_with_label(label)
            .skip_while(|node| *node < ctx.node_high_id);
        for node in beyond {
            ctx.report(
                EntityKind::LabelIndex,
                node,
                ViolationKind::LabelIndexEntryDangling,
                format!(
                    "label {label} indexed for node {node} beyond node high id {}",
                    ctx.node_high_id
                ),
            );
        }
    }
}

fn label_ids(labels: &[LabelId]) -> Vec<u32> {
    labels.iter().map(|label| label.0).collect()
}
