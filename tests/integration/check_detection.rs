#![allow(missing_docs)]

use std::sync::Arc;

use graphcheck::{
    check::{CheckConfig, ConsistencyChecker, ConsistencyFlags, ConsistencySummary, EntityKind, ViolationKind},
    storage::{
        CountsKey, GraphBuilder, IndexDescriptor, IndexSchema, IndexState, MemoryStore, PropValue,
        RecordStore, StoreAccess,
    },
    types::LabelId,
};

const PERSON: LabelId = LabelId(0);

/// Ids: hub 0 (dense), ann 1, ben 2, cid 3.
fn fixture() -> MemoryStore {
    let mut b = GraphBuilder::new();
    let person = b.label(0, "Person");
    let follows = b.relationship_type(0, "FOLLOWS");
    let likes = b.relationship_type(1, "LIKES");
    let name = b.property_key(0, "name");
    b.index(IndexDescriptor {
        id: 0,
        name: "person_name".into(),
        schema: IndexSchema::Label {
            label: person,
            keys: vec![name],
        },
        unique: false,
        state: IndexState::Online,
    });
    let hub = b.dense_node(&[person], &[(name, PropValue::Str("hub".into()))]);
    let ann = b.node(&[person], &[(name, PropValue::Str("ann".into()))]);
    let ben = b.node(&[person], &[(name, PropValue::Str("ben".into()))]);
    let cid = b.node(&[], &[]);
    b.relationship(ann, hub, follows, &[]);
    b.relationship(ben, hub, follows, &[]);
    b.relationship(hub, cid, likes, &[]);
    b.relationship(ann, ben, follows, &[]);
    b.relationship(ann, cid, likes, &[]);
    b.build()
}

fn check_with(store: MemoryStore, config: CheckConfig) -> ConsistencySummary {
    ConsistencyChecker::new(StoreAccess::from_store(Arc::new(store)), config)
        .run()
        .expect("check run")
}

fn check(store: MemoryStore) -> ConsistencySummary {
    check_with(
        store,
        CheckConfig {
            workers: 2,
            ids_per_chunk: 1,
            memory_ceiling: Some(32),
            ..CheckConfig::default()
        },
    )
}

#[test]
fn fixture_is_consistent() {
    let summary = check(fixture());
    assert!(summary.is_consistent(), "{:?}", summary.violations);
    assert!(summary.windows > 1);
}

#[test]
fn relationship_next_pointer_to_unused_record() {
    let mut store = fixture();
    let rel = store.relationship(3).unwrap();
    assert!(rel.in_use);
    if let Some(rel) = store.relationship_mut(3) {
        rel.first_next = 900;
    }
    let summary = check(store);
    assert!(summary.violations.iter().any(|v| {
        v.entity == EntityKind::Relationship
            && v.id == Some(3)
            && matches!(
                v.kind,
                ViolationKind::RelationshipChainNotInUse | ViolationKind::RelationshipChainInconsistent
            )
            && v.detail.contains("900")
    }));
}

#[test]
fn corrupted_label_count_is_one_mismatch() {
    let mut store = fixture();
    store.set_count(CountsKey::nodes(Some(PERSON)), 7);
    let summary = check(store);
    assert_eq!(summary.total_violations, 1, "{:?}", summary.violations);
    let violation = &summary.violations[0];
    assert_eq!(violation.kind, ViolationKind::CountsMismatch);
    assert_eq!(violation.entity, EntityKind::Counts);
    assert_eq!(violation.id, None);
    assert!(violation.detail.contains("stored 7, observed 3"));
}

#[test]
fn skipping_counts_hides_count_corruption() {
    let mut store = fixture();
    store.set_count(CountsKey::nodes(Some(PERSON)), 7);
    let summary = check_with(
        store,
        CheckConfig {
            flags: ConsistencyFlags {
                check_counts: false,
                ..ConsistencyFlags::ALL
            },
            ..CheckConfig::default()
        },
    );
    assert!(summary.is_consistent());
    assert!(!summary.phases.iter().any(|phase| phase == "counts"));
}

#[test]
fn label_index_disagreements_in_both_directions() {
    let mut store = fixture();
    store.unindex_label(PERSON, 2);
    store.index_label(PERSON, 3);
    store.index_label(PERSON, 50);
    let summary = check(store);
    assert_eq!(summary.count(ViolationKind::LabelIndexEntryMissing), 1);
    assert_eq!(summary.count(ViolationKind::LabelIndexEntryDangling), 2);
    let ids: Vec<Option<u64>> = summary
        .violations
        .iter()
        .filter(|v| v.entity == EntityKind::LabelIndex)
        .map(|v| v.id)
        .collect();
    assert_eq!(ids, [Some(2), Some(3), Some(50)]);
}

#[test]
fn deleted_endpoint_is_reported_by_its_relationships() {
    let mut store = fixture();
    if let Some(node) = store.node_mut(3) {
        node.in_use = false;
    }
    let summary = check(store);
    // cid is the end of relationships 2 and 4
    let reported: Vec<u64> = summary
        .violations
        .iter()
        .filter(|v| v.kind == ViolationKind::RelationshipNodeNotInUse)
        .filter_map(|v| v.id)
        .collect();
    assert_eq!(reported, [2, 4]);
}

#[test]
fn dense_node_chain_head_mismatch() {
    let mut store = fixture();
    // hub's first group: swap a head to a relationship hub does not start
    let hub = store.node(0).unwrap();
    assert!(hub.dense);
    let group = store.group(hub.next_rel).unwrap();
    if let Some(group) = store.group_mut(group.id) {
        group.first_out = 3;
    }
    let summary = check(store);
    assert!(summary.count(ViolationKind::GroupChainMismatch) >= 1);
}

#[test]
fn missing_index_entry() {
    let mut store = fixture();
    store.remove_index_entries(0, 1);
    let summary = check(store);
    assert_eq!(summary.count(ViolationKind::IndexEntryMissing), 1);
    assert!(summary
        .violations
        .iter()
        .any(|v| v.kind == ViolationKind::IndexEntryMissing && v.id == Some(1)));
}

#[test]
fn populating_index_is_skipped() {
    let mut store = fixture();
    store.add_index(IndexDescriptor {
        id: 1,
        name: "pending".into(),
        schema: IndexSchema::Label {
            label: PERSON,
            keys: vec![graphcheck::types::PropKeyId(0)],
        },
        unique: false,
        state: IndexState::Populating,
    });
    let summary = check(store);
    assert!(summary.is_consistent(), "{:?}", summary.violations);
    assert_eq!(summary.skipped_indexes, ["pending"]);
}

#[test]
fn retained_violations_are_capped_but_counted() {
    let mut store = fixture();
    store.set_count(CountsKey::nodes(Some(PERSON)), 7);
    store.set_count(CountsKey::nodes(None), 1);
    store.unindex_label(PERSON, 2);
    let summary = check_with(
        store,
        CheckConfig {
            max_retained_violations: Some(1),
            ..CheckConfig::default()
        },
    );
    assert_eq!(summary.total_violations, 3);
    assert_eq!(summary.violations.len(), 1);
    assert!(summary.violations_truncated);
    assert_eq!(summary.violations_by_kind[&ViolationKind::CountsMismatch], 2);
}
