//! Record shapes as the checker sees them.
//!
//! Pointer fields hold raw record ids; [`NULL_REFERENCE`] marks an absent
//! pointer. A record read for an id that is out of range or unused comes
//! back with `in_use == false` and every pointer null.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::{LabelId, PropKeyId, TypeId, NULL_REFERENCE};

/// Inline label storage; most nodes carry only a handful of labels.
pub type LabelSet = SmallVec<[LabelId; 4]>;

fn null() -> u64 {
    NULL_REFERENCE
}

/// A node record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Record id.
    pub id: u64,
    /// Whether the record holds a live node.
    pub in_use: bool,
    /// Dense nodes keep their relationships in per-type groups.
    #[serde(default)]
    pub dense: bool,
    /// First property record of the node's property chain.
    #[serde(default = "null")]
    pub next_prop: u64,
    /// First relationship (sparse) or first relationship group (dense).
    #[serde(default = "null")]
    pub next_rel: u64,
    /// Label ids, expected sorted and free of duplicates.
    #[serde(default)]
    pub labels: LabelSet,
}

impl NodeRecord {
    /// A record for an id that holds no node.
    pub fn unused(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            dense: false,
            next_prop: NULL_REFERENCE,
            next_rel: NULL_REFERENCE,
            labels: LabelSet::new(),
        }
    }
}

/// Which end of a relationship a chain pointer belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The start node's chain.
    First,
    /// The end node's chain.
    Second,
}

impl Side {
    /// Both sides, first then second.
    pub const BOTH: [Side; 2] = [Side::First, Side::Second];

    /// Lowercase name used in violation details.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::First => "first",
            Side::Second => "second",
        }
    }
}

/// A relationship record, threaded into one chain per endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    /// Record id.
    pub id: u64,
    /// Whether the record holds a live relationship.
    pub in_use: bool,
    /// Start node id.
    pub first_node: u64,
    /// End node id.
    pub second_node: u64,
    /// Relationship type token.
    #[serde(rename = "type")]
    pub ty: TypeId,
    /// First property record.
    #[serde(default = "null")]
    pub next_prop: u64,
    /// Previous relationship in the start node's chain.
    #[serde(default = "null")]
    pub first_prev: u64,
    /// Next relationship in the start node's chain.
    #[serde(default = "null")]
    pub first_next: u64,
    /// Previous relationship in the end node's chain.
    #[serde(default = "null")]
    pub second_prev: u64,
    /// Next relationship in the end node's chain.
    #[serde(default = "null")]
    pub second_next: u64,
    /// Head of the start node's chain.
    #[serde(default)]
    pub first_in_first_chain: bool,
    /// Head of the end node's chain.
    #[serde(default)]
    pub first_in_second_chain: bool,
}

impl RelationshipRecord {
    /// A record for an id that holds no relationship.
    pub fn unused(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            first_node: NULL_REFERENCE,
            second_node: NULL_REFERENCE,
            ty: TypeId(0),
            next_prop: NULL_REFERENCE,
            first_prev: NULL_REFERENCE,
            first_next: NULL_REFERENCE,
            second_prev: NULL_REFERENCE,
            second_next: NULL_REFERENCE,
            first_in_first_chain: false,
            first_in_second_chain: false,
        }
    }

    /// Start and end nodes are the same.
    pub fn is_loop(&self) -> bool {
        self.first_node == self.second_node
    }

    /// Endpoint node of `side`.
    pub fn node(&self, side: Side) -> u64 {
        match side {
            Side::First => self.first_node,
            Side::Second => self.second_node,
        }
    }

    /// Previous pointer of `side`.
    pub fn prev(&self, side: Side) -> u64 {
        match side {
            Side::First => self.first_prev,
            Side::Second => self.second_prev,
        }
    }

    /// Next pointer of `side`.
    pub fn next(&self, side: Side) -> u64 {
        match side {
            Side::First => self.first_next,
            Side::Second => self.second_next,
        }
    }

    /// Head-of-chain flag of `side`.
    pub fn first_in_chain(&self, side: Side) -> bool {
        match side {
            Side::First => self.first_in_first_chain,
            Side::Second => self.first_in_second_chain,
        }
    }

    /// The side whose chain belongs to `node`. Loops answer with the first
    /// side; `None` when the relationship does not touch `node`.
    pub fn side_of(&self, node: u64) -> Option<Side> {
        if self.first_node == node {
            Some(Side::First)
        } else if self.second_node == node {
            Some(Side::Second)
        } else {
            None
        }
    }
}

/// A relationship group: one per (dense node, relationship type).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipGroupRecord {
    /// Record id.
    pub id: u64,
    /// Whether the record holds a live group.
    pub in_use: bool,
    /// Relationship type of every relationship in this group.
    #[serde(rename = "type")]
    pub ty: TypeId,
    /// Next group of the same owner, in increasing type order.
    #[serde(default = "null")]
    pub next: u64,
    /// Dense node owning the group.
    pub owner: u64,
    /// First outgoing relationship.
    #[serde(default = "null")]
    pub first_out: u64,
    /// First incoming relationship.
    #[serde(default = "null")]
    pub first_in: u64,
    /// First self-loop.
    #[serde(default = "null")]
    pub first_loop: u64,
}

impl RelationshipGroupRecord {
    /// A record for an id that holds no group.
    pub fn unused(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            ty: TypeId(0),
            next: NULL_REFERENCE,
            owner: NULL_REFERENCE,
            first_out: NULL_REFERENCE,
            first_in: NULL_REFERENCE,
            first_loop: NULL_REFERENCE,
        }
    }
}

/// One key/value pair inside a property record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyBlock {
    /// Property key token.
    pub key: PropKeyId,
    /// Encoded value, see [`crate::storage::props`].
    pub payload: Vec<u8>,
}

/// A property record, doubly linked with its neighbours in the owner's chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Record id.
    pub id: u64,
    /// Whether the record is live.
    pub in_use: bool,
    /// Previous record in the chain.
    #[serde(default = "null")]
    pub prev: u64,
    /// Next record in the chain.
    #[serde(default = "null")]
    pub next: u64,
    /// Key/value blocks held by this record.
    #[serde(default)]
    pub blocks: Vec<PropertyBlock>,
}

impl PropertyRecord {
    /// A record for an id that holds no properties.
    pub fn unused(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            prev: NULL_REFERENCE,
            next: NULL_REFERENCE,
            blocks: Vec::new(),
        }
    }
}

/// A named token (label, relationship type or property key).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token id.
    pub id: u32,
    /// Token name.
    pub name: String,
    /// Whether the token is live.
    #[serde(default = "live")]
    pub in_use: bool,
}

fn live() -> bool {
    true
}
