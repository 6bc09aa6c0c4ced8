#![allow(missing_docs)]

use std::sync::Arc;

use graphcheck::{
    check::{CheckConfig, CheckError, ConsistencyChecker, ViolationKind},
    storage::{
        GraphBuilder, MemoryStore, NodeRecord, PropValue, PropertyRecord, RecordStore,
        RelationshipGroupRecord, RelationshipRecord, StoreAccess,
    },
    types::{LabelId, RecordType, Result, StoreError},
};

/// Record store that fails reading one property record.
struct FailingRecords {
    inner: Arc<MemoryStore>,
    broken_property: u64,
}

impl RecordStore for FailingRecords {
    fn high_id(&self, ty: RecordType) -> u64 {
        self.inner.high_id(ty)
    }

    fn node(&self, id: u64) -> Result<NodeRecord> {
        self.inner.node(id)
    }

    fn relationship(&self, id: u64) -> Result<RelationshipRecord> {
        self.inner.relationship(id)
    }

    fn group(&self, id: u64) -> Result<RelationshipGroupRecord> {
        self.inner.group(id)
    }

    fn property(&self, id: u64) -> Result<PropertyRecord> {
        if id == self.broken_property {
            return Err(StoreError::Unreadable {
                kind: "property",
                id,
                reason: "checksum mismatch".into(),
            });
        }
        self.inner.property(id)
    }
}

/// Returns the store and the id of the only property record a relationship
/// owns.
fn fixture() -> (MemoryStore, u64) {
    let mut b = GraphBuilder::new();
    let label = b.label(0, "L");
    let t = b.relationship_type(0, "T");
    let key = b.property_key(0, "weight");
    let nodes: Vec<u64> = (0..6).map(|_| b.node(&[label], &[])).collect();
    for pair in nodes.windows(2) {
        b.relationship(pair[0], pair[1], t, &[]);
    }
    let rel = b.relationship(nodes[0], nodes[5], t, &[(key, PropValue::Float(0.5))]);
    let store = b.build();
    let property = store.relationship(rel).unwrap().next_prop;
    (store, property)
}

#[test]
fn accessor_failure_aborts_with_partial_summary() {
    let (mut store, broken) = fixture();
    store.unindex_label(LabelId(0), 3);
    let store = Arc::new(store);
    let access = StoreAccess {
        records: Arc::new(FailingRecords {
            inner: store.clone(),
            broken_property: broken,
        }),
        ..StoreAccess::from_store(store)
    };
    let config = CheckConfig {
        workers: 4,
        ids_per_chunk: 1,
        ..CheckConfig::default()
    };

    let err = ConsistencyChecker::new(access, config).run().unwrap_err();
    let CheckError::ScanAborted {
        phase,
        source,
        summary,
    } = err
    else {
        panic!("expected an aborted scan");
    };
    assert_eq!(phase, "relationships");
    assert!(matches!(source, StoreError::Unreadable { id, .. } if id == broken));
    assert!(!summary.completed);
    assert_eq!(summary.count(ViolationKind::LabelIndexEntryMissing), 1);
    assert_eq!(
        summary.phases,
        ["populate", "nodes", "relationship_endpoints", "group_owners"]
    );
}

#[test]
fn budget_below_one_record_is_rejected() {
    let (store, _) = fixture();
    let config = CheckConfig {
        memory_ceiling: Some(8),
        ..CheckConfig::default()
    };
    let err = ConsistencyChecker::new(StoreAccess::from_store(Arc::new(store)), config)
        .run()
        .unwrap_err();
    assert!(matches!(
        err,
        CheckError::MemoryBudget {
            bytes_per_record: 16,
            budget: 8
        }
    ));
}

#[test]
fn available_memory_bounds_the_window() {
    let (store, _) = fixture();
    let config = CheckConfig {
        available_memory: Some(32),
        memory_ceiling: Some(1 << 20),
        ..CheckConfig::default()
    };
    let summary = ConsistencyChecker::new(StoreAccess::from_store(Arc::new(store)), config)
        .run()
        .unwrap();
    assert!(summary.is_consistent(), "{:?}", summary.violations);
    assert_eq!(summary.window_size, 2);
    assert_eq!(summary.windows, 3);
}

#[test]
fn zero_workers_is_a_configuration_error() {
    let (store, _) = fixture();
    let config = CheckConfig {
        workers: 0,
        ..CheckConfig::default()
    };
    let err = ConsistencyChecker::new(StoreAccess::from_store(Arc::new(store)), config)
        .run()
        .unwrap_err();
    assert!(matches!(err, CheckError::InvalidConfig(_)));
}

#[test]
fn empty_store_checks_cleanly() {
    let summary = ConsistencyChecker::new(
        StoreAccess::from_store(Arc::new(MemoryStore::new())),
        CheckConfig::default(),
    )
    .run()
    .unwrap();
    assert!(summary.completed);
    assert!(summary.is_consistent());
    assert_eq!(summary.windows, 0);
}
