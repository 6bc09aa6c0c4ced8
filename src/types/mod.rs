#![forbid(unsafe_code)]

//! Identifier newtypes and the error type shared by every store accessor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pointer value marking the absence of a referenced record.
pub const NULL_REFERENCE: u64 = u64::MAX;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
/// Label token id.
pub struct LabelId(pub u32);
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
/// Relationship type token id.
pub struct TypeId(pub u32);
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
/// Property key token id.
pub struct PropKeyId(pub u32);

/// The record collections a store exposes.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Node records.
    Node,
    /// Relationship records.
    Relationship,
    /// Relationship group records of dense nodes.
    RelationshipGroup,
    /// Property records.
    Property,
}

impl RecordType {
    /// Every record type, in scan order.
    pub const ALL: [RecordType; 4] = [
        RecordType::Node,
        RecordType::Relationship,
        RecordType::RelationshipGroup,
        RecordType::Property,
    ];

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Node => "node",
            RecordType::Relationship => "relationship",
            RecordType::RelationshipGroup => "relationship_group",
            RecordType::Property => "property",
        }
    }
}

/// Returns true when `reference` is the null sentinel.
#[inline]
pub fn is_null(reference: u64) -> bool {
    reference == NULL_REFERENCE
}

/// Error raised by a store accessor while reading.
///
/// Any of these aborts the running check; they are never reported as
/// inconsistencies.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Structure could not be decoded at all.
    #[error("corruption: {0}")]
    Corruption(String),
    /// A single record could not be read.
    #[error("{kind} {id} could not be read: {reason}")]
    Unreadable {
        /// Record kind.
        kind: &'static str,
        /// Record id.
        id: u64,
        /// Accessor-provided cause.
        reason: String,
    },
    /// An index id was asked for that the schema does not list.
    #[error("index {0} not found")]
    IndexNotFound(u64),
}

/// Result alias for store accessors.
pub type Result<T> = std::result::Result<T, StoreError>;

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PropKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<u32> for LabelId {
    fn from(value: u32) -> Self {
        LabelId(value)
    }
}

impl From<LabelId> for u32 {
    fn from(value: LabelId) -> Self {
        value.0
    }
}

impl From<u32> for TypeId {
    fn from(value: u32) -> Self {
        TypeId(value)
    }
}

impl From<TypeId> for u32 {
    fn from(value: TypeId) -> Self {
        value.0
    }
}

impl From<u32> for PropKeyId {
    fn from(value: u32) -> Self {
        PropKeyId(value)
    }
}

impl From<PropKeyId> for u32 {
    fn from(value: PropKeyId) -> Self {
        value.0
    }
}
