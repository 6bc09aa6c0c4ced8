//! Read-only accessors the checker consumes.
//!
//! Implementations must be safe to share between worker threads without
//! extra locking; a check assumes nothing writes to the store while it runs.

use std::sync::Arc;

use crate::storage::counts::CountsKey;
use crate::storage::props::PropValue;
use crate::storage::record::{
    NodeRecord, PropertyRecord, RelationshipGroupRecord, RelationshipRecord, Token,
};
use crate::storage::schema::{ConstraintDescriptor, IndexDescriptor};
use crate::types::{LabelId, PropKeyId, RecordType, Result, TypeId};

/// Record collections addressed by id.
pub trait RecordStore: Send + Sync {
    /// One past the highest id ever allocated for `ty`.
    fn high_id(&self, ty: RecordType) -> u64;
    /// Node record at `id`; unused for ids out of range.
    fn node(&self, id: u64) -> Result<NodeRecord>;
    /// Relationship record at `id`.
    fn relationship(&self, id: u64) -> Result<RelationshipRecord>;
    /// Relationship group record at `id`.
    fn group(&self, id: u64) -> Result<RelationshipGroupRecord>;
    /// Property record at `id`.
    fn property(&self, id: u64) -> Result<PropertyRecord>;
}

/// Token tables.
pub trait TokenRead: Send + Sync {
    /// Label token `id`, if one was ever created.
    fn label(&self, id: LabelId) -> Option<Token>;
    /// Relationship type token `id`.
    fn relationship_type(&self, id: TypeId) -> Option<Token>;
    /// Property key token `id`.
    fn property_key(&self, id: PropKeyId) -> Option<Token>;
    /// Every label token.
    fn labels(&self) -> Vec<Token>;
    /// Every relationship type token.
    fn relationship_types(&self) -> Vec<Token>;
    /// Every property key token.
    fn property_keys(&self) -> Vec<Token>;
}

/// The label scan index: label to node ids and back.
pub trait LabelIndexRead: Send + Sync {
    /// Node ids indexed under `label`, ascending.
    fn nodes_with_label(&self, label: LabelId) -> Box<dyn Iterator<Item = u64> + '_>;
    /// Labels indexed for `node`, ascending.
    fn labels_of(&self, node: u64) -> Result<Vec<LabelId>>;
    /// One past the highest node id holding any entry.
    fn high_node_id(&self) -> u64;
    /// Label ids holding at least one entry, ascending, whether or not they
    /// have a token.
    fn indexed_labels(&self) -> Vec<LabelId>;
}

/// Schema descriptors and the entries of each property index.
pub trait SchemaRead: Send + Sync {
    /// All index descriptors.
    fn indexes(&self) -> Vec<IndexDescriptor>;
    /// All constraint descriptors.
    fn constraints(&self) -> Vec<ConstraintDescriptor>;
    /// Value tuples the index holds for `entity`.
    fn index_entries(&self, index: u64, entity: u64) -> Result<Vec<Vec<PropValue>>>;
    /// Entities the index holds under `values`.
    fn index_lookup(&self, index: u64, values: &[PropValue]) -> Result<Vec<u64>>;
    /// One past the highest entity id holding an entry in the index.
    fn index_high_entity_id(&self, index: u64) -> Result<u64>;
}

/// The persisted counts store.
pub trait CountsRead: Send + Sync {
    /// Stored count for `key`; zero when absent.
    fn expected(&self, key: &CountsKey) -> u64;
    /// Every key holding a stored count.
    fn keys(&self) -> Vec<CountsKey>;
}

/// The bundle of accessors a check run reads from.
#[derive(Clone)]
pub struct StoreAccess {
    /// Record collections.
    pub records: Arc<dyn RecordStore>,
    /// Token tables.
    pub tokens: Arc<dyn TokenRead>,
    /// Label scan index.
    pub label_index: Arc<dyn LabelIndexRead>,
    /// Schema and property indexes.
    pub schema: Arc<dyn SchemaRead>,
    /// Stored aggregate counts.
    pub counts: Arc<dyn CountsRead>,
}

impl StoreAccess {
    /// Uses one store for every accessor.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: RecordStore + TokenRead + LabelIndexRead + SchemaRead + CountsRead + 'static,
    {
        Self {
            records: store.clone(),
            tokens: store.clone(),
            label_index: store.clone(),
            schema: store.clone(),
            counts: store,
        }
    }
}
