#![allow(missing_docs)]

use std::sync::Arc;

use graphcheck::{
    check::{CheckConfig, ConsistencyChecker, ConsistencyFlags, ConsistencySummary, EntityKind, ViolationKind},
    storage::{GraphBuilder, MemoryStore, PropValue, RecordStore, StoreAccess},
    types::PropKeyId,
};

struct Fixture {
    store: MemoryStore,
    /// Node whose six properties span two records.
    owner: u64,
    first: u64,
    second: u64,
    /// Relationship carrying two properties in one record.
    rel: u64,
}

fn fixture() -> Fixture {
    let mut b = GraphBuilder::new();
    let t = b.relationship_type(0, "T");
    let keys: Vec<PropKeyId> = (0..6).map(|id| b.property_key(id, &format!("p{id}"))).collect();
    let props: Vec<(PropKeyId, PropValue)> = keys
        .iter()
        .map(|key| (*key, PropValue::Int(i64::from(key.0) * 100)))
        .collect();
    let owner = b.node(&[], &props);
    let other = b.node(&[], &[(keys[0], PropValue::Bool(true))]);
    let rel = b.relationship(
        owner,
        other,
        t,
        &[(keys[1], PropValue::Str("x".into())), (keys[2], PropValue::Null)],
    );
    let store = b.build();
    let first = store.node(owner).unwrap().next_prop;
    let second = store.property(first).unwrap().next;
    Fixture {
        store,
        owner,
        first,
        second,
        rel,
    }
}

fn check_with(store: MemoryStore, flags: ConsistencyFlags) -> ConsistencySummary {
    let config = CheckConfig {
        flags,
        workers: 3,
        ids_per_chunk: 1,
        ..CheckConfig::default()
    };
    ConsistencyChecker::new(StoreAccess::from_store(Arc::new(store)), config)
        .run()
        .expect("check run")
}

fn check(store: MemoryStore) -> ConsistencySummary {
    check_with(store, ConsistencyFlags::ALL)
}

#[test]
fn fixture_is_consistent() {
    let fixture = fixture();
    assert_ne!(fixture.second, u64::MAX);
    let summary = check(fixture.store);
    assert!(summary.is_consistent(), "{:?}", summary.violations);
}

#[test]
fn broken_back_pointer() {
    let Fixture {
        mut store,
        first,
        second,
        ..
    } = fixture();
    if let Some(record) = store.property_mut(second) {
        record.prev = 77;
    }
    let summary = check(store);
    let ids: Vec<Option<u64>> = summary
        .violations
        .iter()
        .filter(|v| v.entity == EntityKind::Property)
        .map(|v| v.id)
        .collect();
    // both neighbours see the broken link
    assert_eq!(ids, [Some(first), Some(second)]);
}

#[test]
fn cycle_is_reported_once_for_the_owner() {
    let Fixture {
        mut store,
        owner,
        first,
        second,
        ..
    } = fixture();
    if let Some(record) = store.property_mut(second) {
        record.next = first;
    }
    let summary = check(store);
    let cycles: Vec<_> = summary
        .violations
        .iter()
        .filter(|v| v.kind == ViolationKind::PropertyChainCycle)
        .collect();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].entity, EntityKind::Node);
    assert_eq!(cycles[0].id, Some(owner));
    assert!(summary.count(ViolationKind::PropertyChainInconsistent) >= 1);
}

#[test]
fn undecodable_block_and_unknown_key() {
    let Fixture {
        mut store, second, ..
    } = fixture();
    if let Some(record) = store.property_mut(second) {
        record.blocks[0].payload = vec![99];
        record.blocks[1].key = PropKeyId(42);
    }
    let summary = check(store);
    assert_eq!(summary.count(ViolationKind::PropertyBlockUndecodable), 1);
    assert_eq!(summary.count(ViolationKind::PropertyKeyTokenMissing), 1);
    assert!(summary
        .violations
        .iter()
        .all(|v| v.entity == EntityKind::Property && v.id == Some(second)));
}

#[test]
fn duplicate_key_on_relationship_chain() {
    let Fixture { mut store, rel, .. } = fixture();
    let first = store.relationship(rel).unwrap().next_prop;
    if let Some(record) = store.property_mut(first) {
        let key = record.blocks[0].key;
        record.blocks[1].key = key;
    }
    let summary = check(store);
    let duplicates: Vec<_> = summary
        .violations
        .iter()
        .filter(|v| v.kind == ViolationKind::PropertyDuplicateKey)
        .collect();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].entity, EntityKind::Relationship);
    assert_eq!(duplicates[0].id, Some(rel));
}

#[test]
fn dangling_first_property_pointer() {
    let Fixture {
        mut store, owner, ..
    } = fixture();
    if let Some(node) = store.node_mut(owner) {
        node.next_prop = 1_000;
    }
    let summary = check(store);
    assert_eq!(summary.count(ViolationKind::NodePropertyNotInUse), 1);
}

#[test]
fn property_checks_can_be_skipped() {
    let Fixture {
        mut store, second, ..
    } = fixture();
    if let Some(record) = store.property_mut(second) {
        record.blocks[0].payload = vec![99];
    }
    let summary = check_with(
        store,
        ConsistencyFlags {
            check_properties: false,
            ..ConsistencyFlags::ALL
        },
    );
    assert!(summary.is_consistent());
    assert!(!summary.phases.iter().any(|phase| phase == "properties"));
}
