use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::admin::util::open_snapshot;
use crate::admin::Result;
use crate::storage::{
    IndexState, LabelIndexRead, RecordStore, SchemaRead, TokenRead,
};
use crate::types::RecordType;

/// Overview of a snapshot, printed by `graphcheck inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    /// Snapshot file path.
    pub path: String,
    /// Snapshot file size.
    pub size_bytes: u64,
    /// High id per record type.
    pub high_ids: BTreeMap<String, u64>,
    /// Token table sizes.
    pub tokens: TokenCounts,
    /// One past the highest node id in the label index.
    pub label_index_high_node_id: u64,
    /// Property indexes.
    pub indexes: Vec<IndexSummary>,
    /// Number of constraints.
    pub constraints: usize,
}

/// Token table sizes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenCounts {
    /// Label tokens.
    pub labels: usize,
    /// Relationship type tokens.
    pub relationship_types: usize,
    /// Property key tokens.
    pub property_keys: usize,
}

/// One property index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    /// Index id.
    pub id: u64,
    /// Index name.
    pub name: String,
    /// Covered schema, e.g. `(:0 [1])`.
    pub schema: String,
    /// Whether the index is unique.
    pub unique: bool,
    /// Lifecycle state.
    pub state: IndexState,
}

/// Summarizes the snapshot at `path` without checking it.
pub fn inspect(path: impl AsRef<Path>) -> Result<InspectReport> {
    let path = path.as_ref();
    let store = open_snapshot(path)?;
    let size_bytes = fs::metadata(path)?.len();
    let high_ids = RecordType::ALL
        .iter()
        .map(|ty| (ty.as_str().to_string(), store.high_id(*ty)))
        .collect();
    let tokens = TokenCounts {
        labels: store.labels().len(),
        relationship_types: store.relationship_types().len(),
        property_keys: store.property_keys().len(),
    };
    let indexes = store
        .indexes()
        .into_iter()
        .map(|index| IndexSummary {
            id: index.id,
            schema: index.schema.to_string(),
            name: index.name,
            unique: index.unique,
            state: index.state,
        })
        .collect();
    Ok(InspectReport {
        path: path.display().to_string(),
        size_bytes,
        high_ids,
        tokens,
        label_index_high_node_id: store.high_node_id(),
        indexes,
        constraints: store.constraints().len(),
    })
}
