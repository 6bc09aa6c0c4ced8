//! Relationship checks.
//!
//! Endpoint checks read the node cache and run once per window, handling only
//! the sides whose node lies in that window. Chain pointer checks need no
//! node state and run in a single pass afterwards.

use std::ops::Range;

use rustc_hash::FxHashSet;

use crate::storage::access::RecordStore;
use crate::storage::record::{RelationshipRecord, Side};
use crate::types::{is_null, Result, NULL_REFERENCE};

use super::cache::node_slots;
use super::checker::Context;
use super::counts::CountsBatch;
use super::property::{check_owner_chain, display_ref};
use super::report::{EntityKind, ViolationKind};

/// Checks relationship endpoints that fall inside the resident window.
pub(crate) fn check_endpoints(
    ctx: &Context<'_>,
    ids: Range<u64>,
    batch: &mut CountsBatch,
) -> Result<()> {
    let records = ctx.access.records.as_ref();
    for id in ids {
        let rel = records.relationship(id)?;
        if !rel.in_use {
            continue;
        }
        for side in Side::BOTH {
            let node = rel.node(side);
            if !ctx.cache.contains(node) {
                continue;
            }
            if ctx.cache.get(node, node_slots::IN_USE) == 0 {
                if ctx.flags.check_graph {
                    ctx.report(
                        EntityKind::Relationship,
                        id,
                        ViolationKind::RelationshipNodeNotInUse,
                        format!("{} node {node} is not in use", side.as_str()),
                    );
                }
                continue;
            }
            if ctx.flags.check_counts {
                let labels = ctx.cached_labels(node)?;
                match side {
                    Side::First => batch.relationship_start(&labels, rel.ty),
                    Side::Second => batch.relationship_end(&labels, rel.ty),
                }
            }
            // a loop's second side mirrors its first
            if ctx.flags.check_graph && !(rel.is_loop() && side == Side::Second) {
                check_chain_head(ctx, records, &rel, side)?;
            }
        }
    }
    Ok(())
}

/// Compares the head-of-chain flag with where the endpoint's chain starts.
fn check_chain_head(
    ctx: &Context<'_>,
    records: &dyn RecordStore,
    rel: &RelationshipRecord,
    side: Side,
) -> Result<()> {
    let node = rel.node(side);
    let first = match ctx.cache.get_reference(node, node_slots::FIRST_REL) {
        Some(first) => first,
        None => records.node(node)?.next_rel,
    };
    let (head, origin) = if ctx.cache.get(node, node_slots::DENSE) == 1 {
        match find_group(records, node, first, rel)? {
            Some((group, head)) => (head, format!("group {group} of node {node}")),
            None => (NULL_REFERENCE, format!("node {node}, which has no group of type {}", rel.ty)),
        }
    } else {
        (first, format!("node {node}"))
    };
    let flagged = rel.first_in_chain(side);
    if flagged != (head == rel.id) {
        ctx.report(
            EntityKind::Relationship,
            rel.id,
            ViolationKind::RelationshipChainHeadMismatch,
            format!(
                "{} chain head flag is {flagged} but {origin} starts the chain at {}",
                side.as_str(),
                display_ref(head)
            ),
        );
    }
    Ok(())
}

/// Finds the group of `rel`'s type among the groups of `node`, returning the
/// group id and the head of the direction `rel` belongs to.
fn find_group(
    records: &dyn RecordStore,
    node: u64,
    first_group: u64,
    rel: &RelationshipRecord,
) -> Result<Option<(u64, u64)>> {
    let mut visited = FxHashSet::default();
    let mut cursor = first_group;
    while !is_null(cursor) && visited.insert(cursor) {
        let group = records.group(cursor)?;
        if !group.in_use || group.owner != node {
            break;
        }
        if group.ty == rel.ty {
            let head = if rel.is_loop() {
                group.first_loop
            } else if rel.first_node == node {
                group.first_out
            } else {
                group.first_in
            };
            return Ok(Some((cursor, head)));
        }
        cursor = group.next;
    }
    Ok(None)
}

/// Checks everything about a relationship that needs no node state.
pub(crate) fn check_relationships(
    ctx: &Context<'_>,
    ids: Range<u64>,
    batch: &mut CountsBatch,
) -> Result<()> {
    let records = ctx.access.records.as_ref();
    for id in ids {
        let rel = records.relationship(id)?;
        if !rel.in_use {
            continue;
        }
        if ctx.flags.check_counts {
            batch.relationship(rel.ty);
        }
        if ctx.flags.check_graph {
            check_record(ctx, records, &rel)?;
            let sides: &[Side] = if rel.is_loop() {
                &[Side::First]
            } else {
                &Side::BOTH
            };
            for &side in sides {
                check_chain_pointers(ctx, records, &rel, side)?;
            }
        }
        if ctx.flags.check_properties {
            check_owner_chain(ctx, EntityKind::Relationship, id, rel.next_prop)?;
        }
    }
    Ok(())
}

fn check_record(ctx: &Context<'_>, records: &dyn RecordStore, rel: &RelationshipRecord) -> Result<()> {
    let id = rel.id;
    if !ctx.relationship_type_live(rel.ty) {
        ctx.report(
            EntityKind::Relationship,
            id,
            ViolationKind::RelationshipTypeTokenMissing,
            format!("relationship type {} has no token", rel.ty),
        );
    }
    if !is_null(rel.next_prop) && !records.property(rel.next_prop)?.in_use {
        ctx.report(
            EntityKind::Relationship,
            id,
            ViolationKind::RelationshipPropertyNotInUse,
            format!("first property record {} is not in use", rel.next_prop),
        );
    }
    for side in Side::BOTH {
        let node = rel.node(side);
        if node >= ctx.node_high_id {
            ctx.report(
                EntityKind::Relationship,
                id,
                ViolationKind::RelationshipNodeOutOfRange,
                format!(
                    "{} node {} is beyond node high id {}",
                    side.as_str(),
                    display_ref(node),
                    ctx.node_high_id
                ),
            );
        }
        if rel.is_loop() {
            break;
        }
    }
    if rel.is_loop()
        && (rel.second_prev != rel.first_prev
            || rel.second_next != rel.first_next
            || rel.first_in_second_chain != rel.first_in_first_chain)
    {
        ctx.report(
            EntityKind::Relationship,
            id,
            ViolationKind::RelationshipLoopMismatch,
            format!(
                "second side (prev {}, next {}) differs from first side (prev {}, next {})",
                display_ref(rel.second_prev),
                display_ref(rel.second_next),
                display_ref(rel.first_prev),
                display_ref(rel.first_next)
            ),
        );
    }
    Ok(())
}

/// Verifies that `prev` and `next` of one side are answered by the
/// neighbours' reverse pointers.
fn check_chain_pointers(
    ctx: &Context<'_>,
    records: &dyn RecordStore,
    rel: &RelationshipRecord,
    side: Side,
) -> Result<()> {
    let id = rel.id;
    let node = rel.node(side);
    let name = side.as_str();
    let prev = rel.prev(side);
    let head = rel.first_in_chain(side);

    if head && !is_null(prev) {
        ctx.report(
            EntityKind::Relationship,
            id,
            ViolationKind::RelationshipChainInconsistent,
            format!("head of {name} chain of node {node} has previous relationship {prev}"),
        );
    } else if !head && is_null(prev) {
        ctx.report(
            EntityKind::Relationship,
            id,
            ViolationKind::RelationshipChainInconsistent,
            format!("{name} chain of node {node} has no previous relationship but is not its head"),
        );
    }

    if !is_null(prev) {
        let neighbour = records.relationship(prev)?;
        match neighbour_side(ctx, &neighbour, node, id, name, "previous") {
            Some(other) if neighbour.next(other) != id => ctx.report(
                EntityKind::Relationship,
                id,
                ViolationKind::RelationshipChainInconsistent,
                format!(
                    "{name} previous relationship {prev} continues with {} instead",
                    display_ref(neighbour.next(other))
                ),
            ),
            _ => {}
        }
    }

    let next = rel.next(side);
    if !is_null(next) {
        let neighbour = records.relationship(next)?;
        match neighbour_side(ctx, &neighbour, node, id, name, "next") {
            Some(other) if neighbour.prev(other) != id || neighbour.first_in_chain(other) => ctx
                .report(
                    EntityKind::Relationship,
                    id,
                    ViolationKind::RelationshipChainInconsistent,
                    format!(
                        "{name} next relationship {next} points back to {}",
                        display_ref(neighbour.prev(other))
                    ),
                ),
            _ => {}
        }
    }
    Ok(())
}

/// Side of `neighbour` that lies in `node`'s chain, reporting neighbours that
/// are unused or do not touch `node`.
fn neighbour_side(
    ctx: &Context<'_>,
    neighbour: &RelationshipRecord,
    node: u64,
    id: u64,
    side: &str,
    direction: &str,
) -> Option<Side> {
    if !neighbour.in_use {
        ctx.report(
            EntityKind::Relationship,
            id,
            ViolationKind::RelationshipChainNotInUse,
            format!(
                "{side} {direction} relationship {} is not in use",
                neighbour.id
            ),
        );
        return None;
    }
    let found = neighbour.side_of(node);
    if found.is_none() {
        ctx.report(
            EntityKind::Relationship,
            id,
            ViolationKind::RelationshipChainInconsistent,
            format!(
                "{side} {direction} relationship {} does not touch node {node}",
                neighbour.id
            ),
        );
    }
    found
}
