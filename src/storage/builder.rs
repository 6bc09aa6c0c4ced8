//! Assembles consistent stores: chains threaded, groups sorted, label index,
//! property indexes and counts derived from the records.

use std::collections::BTreeMap;

use crate::storage::memory::MemoryStore;
use crate::storage::props::{encode_value, PropValue};
use crate::storage::record::{
    NodeRecord, PropertyBlock, PropertyRecord, RelationshipGroupRecord, RelationshipRecord, Side,
};
use crate::storage::schema::IndexDescriptor;
use crate::types::{is_null, LabelId, PropKeyId, TypeId, NULL_REFERENCE};

/// Property blocks stored per property record.
pub const BLOCKS_PER_RECORD: usize = 4;

/// Builds a [`MemoryStore`] whose records link up the way a writer would
/// leave them.
///
/// New relationships are inserted at the head of each endpoint's chain.
/// Dense nodes get one relationship group per type, chained in ascending type
/// order.
#[derive(Default)]
pub struct GraphBuilder {
    store: MemoryStore,
    nodes: BTreeMap<u64, NodeRecord>,
    relationships: BTreeMap<u64, RelationshipRecord>,
    groups: BTreeMap<u64, RelationshipGroupRecord>,
    next_node: u64,
    next_rel: u64,
    next_group: u64,
    next_prop: u64,
    indexes: Vec<u64>,
}

enum Head {
    Node(u64),
    Group(u64, Direction),
}

#[derive(Clone, Copy)]
enum Direction {
    Out,
    In,
    Loop,
}

impl GraphBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a label token.
    pub fn label(&mut self, id: u32, name: &str) -> LabelId {
        self.store.put_label_token(id, name);
        LabelId(id)
    }

    /// Registers a relationship type token.
    pub fn relationship_type(&mut self, id: u32, name: &str) -> TypeId {
        self.store.put_relationship_type_token(id, name);
        TypeId(id)
    }

    /// Registers a property key token.
    pub fn property_key(&mut self, id: u32, name: &str) -> PropKeyId {
        self.store.put_property_key_token(id, name);
        PropKeyId(id)
    }

    /// Creates a sparse node.
    pub fn node(&mut self, labels: &[LabelId], props: &[(PropKeyId, PropValue)]) -> u64 {
        self.create_node(labels, props, false)
    }

    /// Creates a dense node whose relationships live in groups.
    pub fn dense_node(&mut self, labels: &[LabelId], props: &[(PropKeyId, PropValue)]) -> u64 {
        self.create_node(labels, props, true)
    }

    /// Leaves an unused gap in the node id space.
    pub fn skip_node_ids(&mut self, count: u64) {
        self.next_node += count;
    }

    /// Creates a relationship and threads it into both endpoint chains.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint was not created by this builder.
    pub fn relationship(
        &mut self,
        start: u64,
        end: u64,
        ty: TypeId,
        props: &[(PropKeyId, PropValue)],
    ) -> u64 {
        assert!(self.nodes.contains_key(&start), "unknown start node {start}");
        assert!(self.nodes.contains_key(&end), "unknown end node {end}");
        let id = self.next_rel;
        self.next_rel += 1;
        let next_prop = self.property_chain(props);
        let mut rel = RelationshipRecord {
            in_use: true,
            first_node: start,
            second_node: end,
            ty,
            next_prop,
            ..RelationshipRecord::unused(id)
        };
        let sides: &[Side] = if start == end {
            &[Side::First]
        } else {
            &Side::BOTH
        };
        for &side in sides {
            let node = rel.node(side);
            let head = self.head_for(node, ty, direction(&rel, side));
            let old_first = self.head_value(&head);
            set_side(&mut rel, side, NULL_REFERENCE, old_first, true);
            if !is_null(old_first) {
                let mut previous_head = self.relationships[&old_first].clone();
                if let Some(prev_side) = previous_head.side_of(node) {
                    let next = previous_head.next(prev_side);
                    set_side(&mut previous_head, prev_side, id, next, false);
                }
                self.relationships.insert(old_first, previous_head);
            }
            self.set_head_value(&head, id);
        }
        self.relationships.insert(id, rel);
        id
    }

    /// Registers an index; its entries are derived at [`GraphBuilder::build`].
    pub fn index(&mut self, descriptor: IndexDescriptor) {
        self.indexes.push(descriptor.id);
        self.store.add_index(descriptor);
    }

    /// Finishes the store with derived label index, index entries and counts.
    pub fn build(mut self) -> MemoryStore {
        for node in std::mem::take(&mut self.nodes).into_values() {
            self.store.put_node(node);
        }
        for rel in std::mem::take(&mut self.relationships).into_values() {
            self.store.put_relationship(rel);
        }
        for group in std::mem::take(&mut self.groups).into_values() {
            self.store.put_group(group);
        }
        self.store.rebuild_label_index();
        for index in std::mem::take(&mut self.indexes) {
            self.store.rebuild_index(index);
        }
        self.store.rebuild_counts();
        self.store
    }

    fn create_node(
        &mut self,
        labels: &[LabelId],
        props: &[(PropKeyId, PropValue)],
        dense: bool,
    ) -> u64 {
        let id = self.next_node;
        self.next_node += 1;
        let mut sorted = labels.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let next_prop = self.property_chain(props);
        self.nodes.insert(
            id,
            NodeRecord {
                in_use: true,
                dense,
                next_prop,
                labels: sorted.into_iter().collect(),
                ..NodeRecord::unused(id)
            },
        );
        id
    }

    fn property_chain(&mut self, props: &[(PropKeyId, PropValue)]) -> u64 {
        let chunks: Vec<&[(PropKeyId, PropValue)]> = props.chunks(BLOCKS_PER_RECORD).collect();
        if chunks.is_empty() {
            return NULL_REFERENCE;
        }
        let first = self.next_prop;
        self.next_prop += chunks.len() as u64;
        for (offset, chunk) in chunks.iter().enumerate() {
            let id = first + offset as u64;
            let prev = if offset == 0 { NULL_REFERENCE } else { id - 1 };
            let next = if offset + 1 == chunks.len() {
                NULL_REFERENCE
            } else {
                id + 1
            };
            self.store.put_property(PropertyRecord {
                id,
                in_use: true,
                prev,
                next,
                blocks: chunk
                    .iter()
                    .map(|(key, value)| PropertyBlock {
                        key: *key,
                        payload: encode_value(value),
                    })
                    .collect(),
            });
        }
        first
    }

    fn head_for(&mut self, node: u64, ty: TypeId, dir: Direction) -> Head {
        if !self.nodes[&node].dense {
            return Head::Node(node);
        }
        let mut prev = NULL_REFERENCE;
        let mut cursor = self.nodes[&node].next_rel;
        while !is_null(cursor) {
            let group = &self.groups[&cursor];
            if group.ty == ty {
                return Head::Group(cursor, dir);
            }
            if group.ty > ty {
                break;
            }
            prev = cursor;
            cursor = group.next;
        }
        let id = self.next_group;
        self.next_group += 1;
        self.groups.insert(
            id,
            RelationshipGroupRecord {
                in_use: true,
                ty,
                next: cursor,
                owner: node,
                ..RelationshipGroupRecord::unused(id)
            },
        );
        if is_null(prev) {
            if let Some(owner) = self.nodes.get_mut(&node) {
                owner.next_rel = id;
            }
        } else if let Some(before) = self.groups.get_mut(&prev) {
            before.next = id;
        }
        Head::Group(id, dir)
    }

    fn head_value(&self, head: &Head) -> u64 {
        match *head {
            Head::Node(node) => self.nodes[&node].next_rel,
            Head::Group(group, dir) => {
                let group = &self.groups[&group];
                match dir {
                    Direction::Out => group.first_out,
                    Direction::In => group.first_in,
                    Direction::Loop => group.first_loop,
                }
            }
        }
    }

    fn set_head_value(&mut self, head: &Head, value: u64) {
        match *head {
            Head::Node(node) => {
                if let Some(node) = self.nodes.get_mut(&node) {
                    node.next_rel = value;
                }
            }
            Head::Group(group, dir) => {
                if let Some(group) = self.groups.get_mut(&group) {
                    match dir {
                        Direction::Out => group.first_out = value,
                        Direction::In => group.first_in = value,
                        Direction::Loop => group.first_loop = value,
                    }
                }
            }
        }
    }
}

fn direction(rel: &RelationshipRecord, side: Side) -> Direction {
    if rel.is_loop() {
        Direction::Loop
    } else if side == Side::First {
        Direction::Out
    } else {
        Direction::In
    }
}

/// Writes chain pointers for `side`; loops mirror them onto the second side.
fn set_side(rel: &mut RelationshipRecord, side: Side, prev: u64, next: u64, first: bool) {
    let sides: &[Side] = if rel.is_loop() { &Side::BOTH } else { &[side] };
    for side in sides {
        match side {
            Side::First => {
                rel.first_prev = prev;
                rel.first_next = next;
                rel.first_in_first_chain = first;
            }
            Side::Second => {
                rel.second_prev = prev;
                rel.second_next = next;
                rel.first_in_second_chain = first;
            }
        }
    }
}
