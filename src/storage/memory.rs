//! In-memory store implementing every accessor trait.
//!
//! The store is loaded from (and saved to) a JSON snapshot. Mutating helpers
//! exist so fixtures can be assembled record by record, including records that
//! are deliberately inconsistent.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::access::{CountsRead, LabelIndexRead, RecordStore, SchemaRead, TokenRead};
use crate::storage::counts::CountsKey;
use crate::storage::props::{decode_value, encode_tuple, PropValue};
use crate::storage::record::{
    NodeRecord, PropertyRecord, RelationshipGroupRecord, RelationshipRecord, Token,
};
use crate::storage::schema::{ConstraintDescriptor, IndexDescriptor, IndexSchema};
use crate::types::{is_null, LabelId, PropKeyId, RecordType, Result, StoreError, TypeId};

/// Serialized form of a [`MemoryStore`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Explicit high ids; ids beyond the highest record otherwise.
    #[serde(default)]
    pub high_ids: BTreeMap<RecordType, u64>,
    /// Node records.
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    /// Relationship records.
    #[serde(default)]
    pub relationships: Vec<RelationshipRecord>,
    /// Relationship group records.
    #[serde(default)]
    pub groups: Vec<RelationshipGroupRecord>,
    /// Property records.
    #[serde(default)]
    pub properties: Vec<PropertyRecord>,
    /// Token tables.
    #[serde(default)]
    pub tokens: TokenTables,
    /// Label index entries; derived from the node records when absent.
    #[serde(default)]
    pub label_index: Option<Vec<LabelIndexEntry>>,
    /// Property indexes with their entries.
    #[serde(default)]
    pub indexes: Vec<IndexSnapshot>,
    /// Constraint descriptors.
    #[serde(default)]
    pub constraints: Vec<ConstraintDescriptor>,
    /// Stored counts.
    #[serde(default)]
    pub counts: Vec<CountEntry>,
}

/// Token tables of a snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenTables {
    /// Label tokens.
    #[serde(default)]
    pub labels: Vec<Token>,
    /// Relationship type tokens.
    #[serde(default)]
    pub relationship_types: Vec<Token>,
    /// Property key tokens.
    #[serde(default)]
    pub property_keys: Vec<Token>,
}

/// All nodes indexed under one label.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LabelIndexEntry {
    /// Indexed label.
    pub label: LabelId,
    /// Node ids.
    pub nodes: Vec<u64>,
}

/// An index descriptor and its entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Descriptor.
    pub descriptor: IndexDescriptor,
    /// Entries; derived from the records when absent.
    #[serde(default)]
    pub entries: Option<Vec<IndexEntry>>,
}

/// One index entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Indexed node or relationship id.
    pub entity: u64,
    /// Indexed value tuple.
    pub values: Vec<PropValue>,
}

/// One stored count.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CountEntry {
    /// Counts key.
    pub key: CountsKey,
    /// Stored value.
    pub count: u64,
}

#[derive(Default)]
struct IndexData {
    descriptor: Option<IndexDescriptor>,
    by_entity: BTreeMap<u64, Vec<Vec<PropValue>>>,
    by_value: FxHashMap<Vec<u8>, BTreeSet<u64>>,
}

impl IndexData {
    fn insert(&mut self, entity: u64, values: Vec<PropValue>) {
        self.by_value
            .entry(encode_tuple(&values))
            .or_default()
            .insert(entity);
        self.by_entity.entry(entity).or_default().push(values);
    }

    fn remove(&mut self, entity: u64) {
        if let Some(tuples) = self.by_entity.remove(&entity) {
            for tuple in tuples {
                let key = encode_tuple(&tuple);
                if let Some(set) = self.by_value.get_mut(&key) {
                    set.remove(&entity);
                    if set.is_empty() {
                        self.by_value.remove(&key);
                    }
                }
            }
        }
    }
}

/// A store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    high_ids: BTreeMap<RecordType, u64>,
    nodes: FxHashMap<u64, NodeRecord>,
    relationships: FxHashMap<u64, RelationshipRecord>,
    groups: FxHashMap<u64, RelationshipGroupRecord>,
    properties: FxHashMap<u64, PropertyRecord>,
    labels: BTreeMap<u32, Token>,
    relationship_types: BTreeMap<u32, Token>,
    property_keys: BTreeMap<u32, Token>,
    label_to_nodes: BTreeMap<LabelId, BTreeSet<u64>>,
    node_to_labels: BTreeMap<u64, BTreeSet<LabelId>>,
    indexes: BTreeMap<u64, IndexData>,
    constraints: Vec<ConstraintDescriptor>,
    counts: BTreeMap<CountsKey, u64>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON snapshot from `path`.
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, SnapshotError> {
        let path = path.as_ref();
        let raw = fs::read(path)?;
        let snapshot: Snapshot = serde_json::from_slice(&raw)?;
        let store = Self::from_snapshot(snapshot)?;
        debug!(
            path = %path.display(),
            nodes = store.nodes.len(),
            relationships = store.relationships.len(),
            "storage.snapshot.loaded"
        );
        Ok(store)
    }

    /// Writes the store as a JSON snapshot to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> std::result::Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(&self.to_snapshot())?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Builds a store from its serialized form.
    pub fn from_snapshot(snapshot: Snapshot) -> std::result::Result<Self, SnapshotError> {
        let mut store = Self::new();
        store.high_ids = snapshot.high_ids;
        for node in snapshot.nodes {
            store.put_node(node);
        }
        for rel in snapshot.relationships {
            store.put_relationship(rel);
        }
        for group in snapshot.groups {
            store.put_group(group);
        }
        for prop in snapshot.properties {
            store.put_property(prop);
        }
        for token in snapshot.tokens.labels {
            store.labels.insert(token.id, token);
        }
        for token in snapshot.tokens.relationship_types {
            store.relationship_types.insert(token.id, token);
        }
        for token in snapshot.tokens.property_keys {
            store.property_keys.insert(token.id, token);
        }
        match snapshot.label_index {
            Some(entries) => {
                for entry in entries {
                    for node in entry.nodes {
                        store.index_label(entry.label, node);
                    }
                }
            }
            None => store.rebuild_label_index(),
        }
        for index in snapshot.indexes {
            let id = index.descriptor.id;
            if store.indexes.contains_key(&id) {
                return Err(SnapshotError::Invalid(format!("duplicate index id {id}")));
            }
            let derive = index.entries.is_none();
            store.add_index(index.descriptor);
            if derive {
                store.rebuild_index(id);
            } else if let Some(entries) = index.entries {
                for entry in entries {
                    store.add_index_entry(id, entry.entity, entry.values);
                }
            }
        }
        store.constraints = snapshot.constraints;
        for entry in snapshot.counts {
            store.counts.insert(entry.key, entry.count);
        }
        Ok(store)
    }

    /// Serializes the store.
    pub fn to_snapshot(&self) -> Snapshot {
        fn sorted<T: Clone>(map: &FxHashMap<u64, T>) -> Vec<T> {
            let mut ids: Vec<&u64> = map.keys().collect();
            ids.sort_unstable();
            ids.into_iter().map(|id| map[id].clone()).collect()
        }
        Snapshot {
            high_ids: self.high_ids.clone(),
            nodes: sorted(&self.nodes),
            relationships: sorted(&self.relationships),
            groups: sorted(&self.groups),
            properties: sorted(&self.properties),
            tokens: TokenTables {
                labels: self.labels.values().cloned().collect(),
                relationship_types: self.relationship_types.values().cloned().collect(),
                property_keys: self.property_keys.values().cloned().collect(),
            },
            label_index: Some(
                self.label_to_nodes
                    .iter()
                    .map(|(label, nodes)| LabelIndexEntry {
                        label: *label,
                        nodes: nodes.iter().copied().collect(),
                    })
                    .collect(),
            ),
            indexes: self
                .indexes
                .values()
                .filter_map(|data| {
                    let descriptor = data.descriptor.clone()?;
                    let entries = data
                        .by_entity
                        .iter()
                        .flat_map(|(entity, tuples)| {
                            tuples.iter().map(move |values| IndexEntry {
                                entity: *entity,
                                values: values.clone(),
                            })
                        })
                        .collect();
                    Some(IndexSnapshot {
                        descriptor,
                        entries: Some(entries),
                    })
                })
                .collect(),
            constraints: self.constraints.clone(),
            counts: self
                .counts
                .iter()
                .map(|(key, count)| CountEntry {
                    key: *key,
                    count: *count,
                })
                .collect(),
        }
    }

    /// Overrides the high id of `ty`.
    pub fn set_high_id(&mut self, ty: RecordType, high_id: u64) {
        self.high_ids.insert(ty, high_id);
    }

    /// Inserts or replaces a node record.
    pub fn put_node(&mut self, node: NodeRecord) {
        self.nodes.insert(node.id, node);
    }

    /// Inserts or replaces a relationship record.
    pub fn put_relationship(&mut self, rel: RelationshipRecord) {
        self.relationships.insert(rel.id, rel);
    }

    /// Inserts or replaces a relationship group record.
    pub fn put_group(&mut self, group: RelationshipGroupRecord) {
        self.groups.insert(group.id, group);
    }

    /// Inserts or replaces a property record.
    pub fn put_property(&mut self, prop: PropertyRecord) {
        self.properties.insert(prop.id, prop);
    }

    /// Mutable access to a stored node record.
    pub fn node_mut(&mut self, id: u64) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(&id)
    }

    /// Mutable access to a stored relationship record.
    pub fn relationship_mut(&mut self, id: u64) -> Option<&mut RelationshipRecord> {
        self.relationships.get_mut(&id)
    }

    /// Mutable access to a stored group record.
    pub fn group_mut(&mut self, id: u64) -> Option<&mut RelationshipGroupRecord> {
        self.groups.get_mut(&id)
    }

    /// Mutable access to a stored property record.
    pub fn property_mut(&mut self, id: u64) -> Option<&mut PropertyRecord> {
        self.properties.get_mut(&id)
    }

    /// Creates or replaces a label token.
    pub fn put_label_token(&mut self, id: u32, name: impl Into<String>) {
        self.labels.insert(id, live_token(id, name));
    }

    /// Creates or replaces a relationship type token.
    pub fn put_relationship_type_token(&mut self, id: u32, name: impl Into<String>) {
        self.relationship_types.insert(id, live_token(id, name));
    }

    /// Creates or replaces a property key token.
    pub fn put_property_key_token(&mut self, id: u32, name: impl Into<String>) {
        self.property_keys.insert(id, live_token(id, name));
    }

    /// Adds a label index entry.
    pub fn index_label(&mut self, label: LabelId, node: u64) {
        self.label_to_nodes.entry(label).or_default().insert(node);
        self.node_to_labels.entry(node).or_default().insert(label);
    }

    /// Removes a label index entry.
    pub fn unindex_label(&mut self, label: LabelId, node: u64) {
        if let Some(nodes) = self.label_to_nodes.get_mut(&label) {
            nodes.remove(&node);
        }
        if let Some(labels) = self.node_to_labels.get_mut(&node) {
            labels.remove(&label);
        }
    }

    /// Replaces the label index with entries derived from in-use nodes.
    pub fn rebuild_label_index(&mut self) {
        self.label_to_nodes.clear();
        self.node_to_labels.clear();
        let entries: Vec<(LabelId, u64)> = self
            .nodes
            .values()
            .filter(|node| node.in_use)
            .flat_map(|node| node.labels.iter().map(move |label| (*label, node.id)))
            .collect();
        for (label, node) in entries {
            self.index_label(label, node);
        }
    }

    /// Registers an index descriptor with no entries.
    pub fn add_index(&mut self, descriptor: IndexDescriptor) {
        let data = self.indexes.entry(descriptor.id).or_default();
        data.descriptor = Some(descriptor);
    }

    /// Adds one entry to an index.
    pub fn add_index_entry(&mut self, index: u64, entity: u64, values: Vec<PropValue>) {
        self.indexes
            .entry(index)
            .or_default()
            .insert(entity, values);
    }

    /// Removes every entry `entity` holds in an index.
    pub fn remove_index_entries(&mut self, index: u64, entity: u64) {
        if let Some(data) = self.indexes.get_mut(&index) {
            data.remove(entity);
        }
    }

    /// Replaces an index's entries with those derived from the records.
    pub fn rebuild_index(&mut self, index: u64) {
        let Some(descriptor) = self
            .indexes
            .get(&index)
            .and_then(|data| data.descriptor.clone())
        else {
            return;
        };
        let mut entries = Vec::new();
        match &descriptor.schema {
            IndexSchema::Label { label, keys } => {
                for node in self.nodes.values() {
                    if node.in_use && node.labels.contains(label) {
                        if let Some(values) = self.key_values(node.next_prop, keys) {
                            entries.push((node.id, values));
                        }
                    }
                }
            }
            IndexSchema::RelType { ty, keys } => {
                for rel in self.relationships.values() {
                    if rel.in_use && rel.ty == *ty {
                        if let Some(values) = self.key_values(rel.next_prop, keys) {
                            entries.push((rel.id, values));
                        }
                    }
                }
            }
        }
        let data = self.indexes.entry(index).or_default();
        data.by_entity.clear();
        data.by_value.clear();
        for (entity, values) in entries {
            data.insert(entity, values);
        }
    }

    /// Adds a constraint descriptor.
    pub fn add_constraint(&mut self, constraint: ConstraintDescriptor) {
        self.constraints.push(constraint);
    }

    /// Sets a stored count.
    pub fn set_count(&mut self, key: CountsKey, count: u64) {
        if count == 0 {
            self.counts.remove(&key);
        } else {
            self.counts.insert(key, count);
        }
    }

    /// Replaces the stored counts with those derived from in-use records.
    pub fn rebuild_counts(&mut self) {
        let mut counts: BTreeMap<CountsKey, u64> = BTreeMap::new();
        for node in self.nodes.values().filter(|node| node.in_use) {
            *counts.entry(CountsKey::nodes(None)).or_default() += 1;
            for label in distinct(&node.labels) {
                *counts.entry(CountsKey::nodes(Some(label))).or_default() += 1;
            }
        }
        for rel in self.relationships.values().filter(|rel| rel.in_use) {
            for ty in [None, Some(rel.ty)] {
                *counts
                    .entry(CountsKey::relationships(None, ty, None))
                    .or_default() += 1;
                if let Some(start) = self.nodes.get(&rel.first_node).filter(|n| n.in_use) {
                    for label in distinct(&start.labels) {
                        *counts
                            .entry(CountsKey::relationships(Some(label), ty, None))
                            .or_default() += 1;
                    }
                }
                if let Some(end) = self.nodes.get(&rel.second_node).filter(|n| n.in_use) {
                    for label in distinct(&end.labels) {
                        *counts
                            .entry(CountsKey::relationships(None, ty, Some(label)))
                            .or_default() += 1;
                    }
                }
            }
        }
        self.counts = counts;
    }

    /// Value tuple of `keys` found along a property chain, when every key is
    /// present and decodes.
    fn key_values(&self, first_prop: u64, keys: &[PropKeyId]) -> Option<Vec<PropValue>> {
        let mut found: BTreeMap<PropKeyId, PropValue> = BTreeMap::new();
        let mut cursor = first_prop;
        let mut steps = 0usize;
        while !is_null(cursor) && steps <= self.properties.len() {
            let record = self.properties.get(&cursor).filter(|p| p.in_use)?;
            for block in &record.blocks {
                if keys.contains(&block.key) {
                    if let Ok(value) = decode_value(&block.payload) {
                        found.entry(block.key).or_insert(value);
                    }
                }
            }
            cursor = record.next;
            steps += 1;
        }
        keys.iter().map(|key| found.remove(key)).collect()
    }

    fn implicit_high_id(&self, ty: RecordType) -> u64 {
        let max = match ty {
            RecordType::Node => self.nodes.keys().max(),
            RecordType::Relationship => self.relationships.keys().max(),
            RecordType::RelationshipGroup => self.groups.keys().max(),
            RecordType::Property => self.properties.keys().max(),
        };
        max.map(|id| id + 1).unwrap_or(0)
    }
}

fn distinct(labels: &[LabelId]) -> BTreeSet<LabelId> {
    labels.iter().copied().collect()
}

fn live_token(id: u32, name: impl Into<String>) -> Token {
    Token {
        id,
        name: name.into(),
        in_use: true,
    }
}

/// Error loading or saving a snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// File could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// File is not a valid snapshot document.
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    /// Document parsed but describes an impossible store.
    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

impl RecordStore for MemoryStore {
    fn high_id(&self, ty: RecordType) -> u64 {
        self.high_ids
            .get(&ty)
            .copied()
            .unwrap_or_else(|| self.implicit_high_id(ty))
    }

    fn node(&self, id: u64) -> Result<NodeRecord> {
        Ok(self
            .nodes
            .get(&id)
            .cloned()
            .unwrap_or_else(|| NodeRecord::unused(id)))
    }

    fn relationship(&self, id: u64) -> Result<RelationshipRecord> {
        Ok(self
            .relationships
            .get(&id)
            .cloned()
            .unwrap_or_else(|| RelationshipRecord::unused(id)))
    }

    fn group(&self, id: u64) -> Result<RelationshipGroupRecord> {
        Ok(self
            .groups
            .get(&id)
            .cloned()
            .unwrap_or_else(|| RelationshipGroupRecord::unused(id)))
    }

    fn property(&self, id: u64) -> Result<PropertyRecord> {
        Ok(self
            .properties
            .get(&id)
            .cloned()
            .unwrap_or_else(|| PropertyRecord::unused(id)))
    }
}

impl TokenRead for MemoryStore {
    fn label(&self, id: LabelId) -> Option<Token> {
        self.labels.get(&id.0).cloned()
    }

    fn relationship_type(&self, id: TypeId) -> Option<Token> {
        self.relationship_types.get(&id.0).cloned()
    }

    fn property_key(&self, id: PropKeyId) -> Option<Token> {
        self.property_keys.get(&id.0).cloned()
    }

    fn labels(&self) -> Vec<Token> {
        self.labels.values().cloned().collect()
    }

    fn relationship_types(&self) -> Vec<Token> {
        self.relationship_types.values().cloned().collect()
    }

    fn property_keys(&self) -> Vec<Token> {
        self.property_keys.values().cloned().collect()
    }
}

impl LabelIndexRead for MemoryStore {
    fn nodes_with_label(&self, label: LabelId) -> Box<dyn Iterator<Item = u64> + '_> {
        match self.label_to_nodes.get(&label) {
            Some(nodes) => Box::new(nodes.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn labels_of(&self, node: u64) -> Result<Vec<LabelId>> {
        Ok(self
            .node_to_labels
            .get(&node)
            .map(|labels| labels.iter().copied().collect())
            .unwrap_or_default())
    }

    fn high_node_id(&self) -> u64 {
        self.node_to_labels
            .iter()
            .rev()
            .find(|(_, labels)| !labels.is_empty())
            .map(|(node, _)| node + 1)
            .unwrap_or(0)
    }

    fn indexed_labels(&self) -> Vec<LabelId> {
        self.label_to_nodes
            .iter()
            .filter(|(_, nodes)| !nodes.is_empty())
            .map(|(label, _)| *label)
            .collect()
    }
}

impl SchemaRead for MemoryStore {
    fn indexes(&self) -> Vec<IndexDescriptor> {
        self.indexes
            .values()
            .filter_map(|data| data.descriptor.clone())
            .collect()
    }

    fn constraints(&self) -> Vec<ConstraintDescriptor> {
        self.constraints.clone()
    }

    fn index_entries(&self, index: u64, entity: u64) -> Result<Vec<Vec<PropValue>>> {
        let data = self
            .indexes
            .get(&index)
            .ok_or(StoreError::IndexNotFound(index))?;
        Ok(data.by_entity.get(&entity).cloned().unwrap_or_default())
    }

    fn index_lookup(&self, index: u64, values: &[PropValue]) -> Result<Vec<u64>> {
        let data = self
            .indexes
            .get(&index)
            .ok_or(StoreError::IndexNotFound(index))?;
        Ok(data
            .by_value
            .get(&encode_tuple(values))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn index_high_entity_id(&self, index: u64) -> Result<u64> {
        let data = self
            .indexes
            .get(&index)
            .ok_or(StoreError::IndexNotFound(index))?;
        Ok(data
            .by_entity
            .keys()
            .next_back()
            .map(|id| id + 1)
            .unwrap_or(0))
    }
}

impl CountsRead for MemoryStore {
    fn expected(&self, key: &CountsKey) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    fn keys(&self) -> Vec<CountsKey> {
        self.counts.keys().copied().collect()
    }
}
