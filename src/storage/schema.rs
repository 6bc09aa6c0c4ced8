//! Schema metadata: index and constraint descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{LabelId, PropKeyId, TypeId};

/// Lifecycle state of an index as recorded in the schema store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Fully built and serving reads.
    Online,
    /// Still being built; entries are incomplete.
    Populating,
    /// Population failed; entries are unusable.
    Failed,
}

/// What an index covers.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSchema {
    /// Nodes carrying `label`, keyed on `keys`.
    Label {
        /// Indexed label.
        label: LabelId,
        /// Indexed property keys, in key order.
        keys: Vec<PropKeyId>,
    },
    /// Relationships of type `ty`, keyed on `keys`.
    RelType {
        /// Indexed relationship type.
        #[serde(rename = "type")]
        ty: TypeId,
        /// Indexed property keys, in key order.
        keys: Vec<PropKeyId>,
    },
}

impl IndexSchema {
    /// Indexed property keys.
    pub fn keys(&self) -> &[PropKeyId] {
        match self {
            IndexSchema::Label { keys, .. } | IndexSchema::RelType { keys, .. } => keys,
        }
    }
}

impl fmt::Display for IndexSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexSchema::Label { label, keys } => write!(f, "(:{label} {keys:?})"),
            IndexSchema::RelType { ty, keys } => write!(f, "[:{ty} {keys:?}]"),
        }
    }
}

/// A property index descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Schema record id.
    pub id: u64,
    /// User-facing name.
    pub name: String,
    /// Covered entities and keys.
    pub schema: IndexSchema,
    /// Whether at most one entity may hold a given value tuple.
    #[serde(default)]
    pub unique: bool,
    /// Lifecycle state.
    pub state: IndexState,
}

/// What a constraint enforces.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Backed by a unique index.
    Uniqueness {
        /// Id of the index that enforces the constraint.
        owned_index: u64,
    },
    /// Every node with `label` must have `key`.
    NodePropertyExistence {
        /// Constrained label.
        label: LabelId,
        /// Mandatory property key.
        key: PropKeyId,
    },
}

/// A constraint descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    /// Schema record id.
    pub id: u64,
    /// User-facing name.
    pub name: String,
    /// Constraint body.
    pub kind: ConstraintKind,
}
