//! Relationship group checks for dense nodes.

use std::ops::Range;

use crate::storage::access::RecordStore;
use crate::storage::record::RelationshipGroupRecord;
use crate::types::{is_null, Result};

use super::cache::node_slots;
use super::checker::Context;
use super::property::display_ref;
use super::report::{EntityKind, ViolationKind};

/// Checks group owners that fall inside the resident window.
pub(crate) fn check_owners(ctx: &Context<'_>, ids: Range<u64>) -> Result<()> {
    let records = ctx.access.records.as_ref();
    for id in ids {
        let group = records.group(id)?;
        if !group.in_use || !ctx.cache.contains(group.owner) {
            continue;
        }
        if ctx.cache.get(group.owner, node_slots::IN_USE) == 0 {
            ctx.report(
                EntityKind::RelationshipGroup,
                id,
                ViolationKind::GroupOwnerNotInUse,
                format!("owner node {} is not in use", group.owner),
            );
        } else if ctx.cache.get(group.owner, node_slots::DENSE) == 0 {
            ctx.report(
                EntityKind::RelationshipGroup,
                id,
                ViolationKind::GroupOwnerNotDense,
                format!("owner node {} is not dense", group.owner),
            );
        }
    }
    Ok(())
}

/// Checks group records: type token, owner range, the next group and the
/// three chain heads.
pub(crate) fn check_groups(ctx: &Context<'_>, ids: Range<u64>) -> Result<()> {
    let records = ctx.access.records.as_ref();
    for id in ids {
        let group = records.group(id)?;
        if !group.in_use {
            continue;
        }
        if !ctx.relationship_type_live(group.ty) {
            ctx.report(
                EntityKind::RelationshipGroup,
                id,
                ViolationKind::GroupTypeTokenMissing,
                format!("relationship type {} has no token", group.ty),
            );
        }
        if group.owner >= ctx.node_high_id {
            ctx.report(
                EntityKind::RelationshipGroup,
                id,
                ViolationKind::GroupOwnerNotInUse,
                format!(
                    "owner node {} is beyond node high id {}",
                    display_ref(group.owner),
                    ctx.node_high_id
                ),
            );
        }
        check_next(ctx, records, &group)?;
        for head in Head::ALL {
            check_head(ctx, records, &group, head)?;
        }
    }
    Ok(())
}

fn check_next(ctx: &Context<'_>, records: &dyn RecordStore, group: &RelationshipGroupRecord) -> Result<()> {
    if is_null(group.next) {
        return Ok(());
    }
    let next = records.group(group.next)?;
    let kind = if !next.in_use {
        Some((
            ViolationKind::GroupNextNotInUse,
            format!("next group {} is not in use", group.next),
        ))
    } else if next.owner != group.owner {
        Some((
            ViolationKind::GroupNextOwnerMismatch,
            format!(
                "next group {} belongs to node {} instead of {}",
                group.next, next.owner, group.owner
            ),
        ))
    } else if next.ty <= group.ty {
        Some((
            ViolationKind::GroupTypeOrder,
            format!(
                "next group {} has type {}, not above {}",
                group.next, next.ty, group.ty
            ),
        ))
    } else {
        None
    };
    if let Some((kind, detail)) = kind {
        ctx.report(EntityKind::RelationshipGroup, group.id, kind, detail);
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Head {
    Out,
    In,
    Loop,
}

impl Head {
    const ALL: [Head; 3] = [Head::Out, Head::In, Head::Loop];

    fn name(self) -> &'static str {
        match self {
            Head::Out => "outgoing",
            Head::In => "incoming",
            Head::Loop => "loop",
        }
    }

    fn of(self, group: &RelationshipGroupRecord) -> u64 {
        match self {
            Head::Out => group.first_out,
            Head::In => group.first_in,
            Head::Loop => group.first_loop,
        }
    }
}

fn check_head(
    ctx: &Context<'_>,
    records: &dyn RecordStore,
    group: &RelationshipGroupRecord,
    head: Head,
) -> Result<()> {
    let first = head.of(group);
    if is_null(first) {
        return Ok(());
    }
    let rel = records.relationship(first)?;
    if !rel.in_use {
        ctx.report(
            EntityKind::RelationshipGroup,
            group.id,
            ViolationKind::GroupChainNotInUse,
            format!("first {} relationship {first} is not in use", head.name()),
        );
        return Ok(());
    }
    let owner = group.owner;
    let fits = rel.ty == group.ty
        && match head {
            Head::Out => rel.first_node == owner && !rel.is_loop() && rel.first_in_first_chain,
            Head::In => rel.second_node == owner && !rel.is_loop() && rel.first_in_second_chain,
            Head::Loop => rel.is_loop() && rel.first_node == owner && rel.first_in_first_chain,
        };
    if !fits {
        ctx.report(
            EntityKind::RelationshipGroup,
            group.id,
            ViolationKind::GroupChainMismatch,
            format!(
                "first {} relationship {first} ({} -[{}]-> {}) does not start that chain of node {owner}",
                head.name(),
                rel.first_node,
                rel.ty,
                rel.second_node
            ),
        );
    }
    Ok(())
}
