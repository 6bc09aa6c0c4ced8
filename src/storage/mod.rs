//! Record model and the read-only store accessors a check consumes.

pub mod access;
pub mod builder;
pub mod counts;
pub mod memory;
pub mod props;
pub mod record;
pub mod schema;

pub use access::{CountsRead, LabelIndexRead, RecordStore, SchemaRead, StoreAccess, TokenRead};
pub use builder::GraphBuilder;
pub use counts::CountsKey;
pub use memory::{MemoryStore, Snapshot, SnapshotError};
pub use props::{decode_value, encode_tuple, encode_value, DecodeError, PropValue};
pub use record::{
    LabelSet, NodeRecord, PropertyBlock, PropertyRecord, RelationshipGroupRecord,
    RelationshipRecord, Side, Token,
};
pub use schema::{ConstraintDescriptor, ConstraintKind, IndexDescriptor, IndexSchema, IndexState};
