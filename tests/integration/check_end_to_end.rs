#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Arc;

use graphcheck::{
    check::{CheckConfig, ConsistencyChecker, ConsistencySummary, Violation, ViolationKind},
    storage::{
        ConstraintDescriptor, ConstraintKind, GraphBuilder, IndexDescriptor, IndexSchema,
        IndexState, MemoryStore, PropValue, StoreAccess,
    },
    types::{LabelId, PropKeyId, TypeId},
};
use proptest::prelude::*;

fn run(access: &StoreAccess, workers: usize, ids_per_chunk: u64, ceiling: Option<u64>) -> ConsistencySummary {
    let config = CheckConfig {
        workers,
        ids_per_chunk,
        memory_ceiling: ceiling,
        ..CheckConfig::default()
    };
    ConsistencyChecker::new(access.clone(), config)
        .run()
        .expect("check run")
}

type Outcome<'a> = (
    bool,
    u64,
    &'a BTreeMap<ViolationKind, u64>,
    &'a Vec<Violation>,
    &'a BTreeMap<String, u64>,
    &'a BTreeMap<String, u64>,
    &'a Vec<String>,
);

/// Fields that must not depend on workers, chunking or windowing.
fn outcome(summary: &ConsistencySummary) -> Outcome<'_> {
    (
        summary.completed,
        summary.total_violations,
        &summary.violations_by_kind,
        &summary.violations,
        &summary.nodes_by_label,
        &summary.relationships_by_type,
        &summary.skipped_indexes,
    )
}

fn social_graph() -> MemoryStore {
    let mut b = GraphBuilder::new();
    let person = b.label(0, "Person");
    let admin = b.label(1, "Admin");
    let knows = b.relationship_type(0, "KNOWS");
    let owns = b.relationship_type(1, "OWNS");
    let name = b.property_key(0, "name");
    let age = b.property_key(1, "age");
    let tags = b.property_key(2, "tags");
    let bio = b.property_key(3, "bio");
    let avatar = b.property_key(4, "avatar");
    let since = b.property_key(5, "since");
    b.index(IndexDescriptor {
        id: 0,
        name: "person_name".into(),
        schema: IndexSchema::Label {
            label: person,
            keys: vec![name],
        },
        unique: true,
        state: IndexState::Online,
    });
    b.index(IndexDescriptor {
        id: 1,
        name: "knows_since".into(),
        schema: IndexSchema::RelType {
            ty: knows,
            keys: vec![since],
        },
        unique: false,
        state: IndexState::Online,
    });

    let alice = b.dense_node(
        &[admin, person],
        &[(name, PropValue::Str("alice".into())), (age, PropValue::Int(36))],
    );
    let bob = b.node(&[person], &[(name, PropValue::Str("bob".into()))]);
    b.skip_node_ids(2);
    let carol = b.node(
        &[person],
        &[
            (name, PropValue::Str("carol".into())),
            (age, PropValue::Int(41)),
            (tags, PropValue::IntArray(vec![3, 1, 4])),
            (bio, PropValue::Str("likes graphs".into())),
            (avatar, PropValue::Bytes(vec![0xde, 0xad])),
        ],
    );
    let dave = b.node(&[], &[(age, PropValue::Float(7.5))]);

    b.relationship(alice, bob, knows, &[(since, PropValue::Int(2019))]);
    b.relationship(bob, alice, knows, &[(since, PropValue::Int(2020))]);
    b.relationship(alice, alice, owns, &[]);
    b.relationship(carol, alice, owns, &[(since, PropValue::Null)]);
    b.relationship(alice, dave, knows, &[]);
    b.relationship(dave, dave, knows, &[]);
    b.relationship(bob, carol, knows, &[(since, PropValue::Int(2021))]);
    let mut store = b.build();
    store.add_constraint(ConstraintDescriptor {
        id: 10,
        name: "person_name_unique".into(),
        kind: ConstraintKind::Uniqueness { owned_index: 0 },
    });
    store.add_constraint(ConstraintDescriptor {
        id: 11,
        name: "person_has_name".into(),
        kind: ConstraintKind::NodePropertyExistence {
            label: person,
            key: name,
        },
    });
    store
}

#[test]
fn three_node_scenario_with_single_id_windows() {
    let mut b = GraphBuilder::new();
    let label_a = b.label(0, "LabelA");
    let t = b.relationship_type(0, "T");
    b.skip_node_ids(1);
    let first = b.node(&[label_a], &[]);
    let _second = b.node(&[], &[]);
    let third = b.node(&[label_a], &[]);
    b.relationship(first, third, t, &[]);
    let access = StoreAccess::from_store(Arc::new(b.build()));

    let summary = run(&access, 2, 1, Some(16));

    assert!(summary.completed);
    assert_eq!(summary.window_size, 1);
    assert_eq!(summary.windows, 4);
    assert_eq!(summary.total_violations, 0, "{:?}", summary.violations);
    let expected: BTreeMap<String, u64> = [("LabelA".to_string(), 2), ("T".to_string(), 1)]
        .into_iter()
        .collect();
    assert_eq!(summary.counts_by_token(), expected);
}

#[test]
fn consistent_store_has_no_violations_under_any_configuration() {
    let access = StoreAccess::from_store(Arc::new(social_graph()));
    for workers in [1, 3] {
        for chunk in [1, 2, 100] {
            for ceiling in [Some(16), Some(48), None] {
                let summary = run(&access, workers, chunk, ceiling);
                assert!(
                    summary.is_consistent(),
                    "workers={workers} chunk={chunk} ceiling={ceiling:?}: {:?}",
                    summary.violations
                );
                assert_eq!(summary.nodes_by_label["Person"], 3);
                assert_eq!(summary.nodes_by_label["Admin"], 1);
                assert_eq!(summary.relationships_by_type["KNOWS"], 5);
                assert_eq!(summary.relationships_by_type["OWNS"], 2);
            }
        }
    }
}

#[test]
fn every_phase_runs_in_order() {
    let access = StoreAccess::from_store(Arc::new(social_graph()));
    let summary = run(&access, 2, 10, None);
    assert_eq!(
        summary.phases,
        [
            "populate",
            "nodes",
            "relationship_endpoints",
            "group_owners",
            "relationships",
            "groups",
            "properties",
            "label_index",
            "schema",
            "counts"
        ]
    );
    assert_eq!(summary.windows, 1);
}

#[test]
fn violations_do_not_depend_on_partitioning() {
    let mut store = social_graph();
    store.set_count(
        graphcheck::storage::CountsKey::nodes(Some(LabelId(1))),
        9,
    );
    if let Some(node) = store.node_mut(1) {
        node.next_prop = 404;
    }
    store.unindex_label(LabelId(0), 4);
    let access = StoreAccess::from_store(Arc::new(store));

    let baseline = run(&access, 1, 100, None);
    assert!(baseline.total_violations >= 3);
    for (workers, chunk, ceiling) in [(4, 1, Some(16)), (2, 3, Some(32)), (3, 7, None)] {
        let summary = run(&access, workers, chunk, ceiling);
        assert_eq!(outcome(&summary), outcome(&baseline));
    }
}

#[derive(Debug, Clone)]
struct NodeSpec {
    labels: u8,
    dense: bool,
    props: usize,
    gap: bool,
}

#[derive(Debug, Clone)]
struct RelSpec {
    from: usize,
    to: usize,
    ty: u32,
    props: usize,
}

fn arb_node() -> impl Strategy<Value = NodeSpec> {
    (0u8..8, any::<bool>(), 0usize..7, prop::bool::weighted(0.2)).prop_map(
        |(labels, dense, props, gap)| NodeSpec {
            labels,
            dense,
            props,
            gap,
        },
    )
}

fn arb_rel() -> impl Strategy<Value = RelSpec> {
    (any::<usize>(), any::<usize>(), 0u32..3, 0usize..3).prop_map(|(from, to, ty, props)| RelSpec {
        from,
        to,
        ty,
        props,
    })
}

fn random_store(nodes: &[NodeSpec], rels: &[RelSpec]) -> MemoryStore {
    let mut b = GraphBuilder::new();
    let labels: Vec<LabelId> = (0..3).map(|id| b.label(id, &format!("L{id}"))).collect();
    let types: Vec<TypeId> = (0..3).map(|id| b.relationship_type(id, &format!("T{id}"))).collect();
    let keys: Vec<PropKeyId> = (0..6).map(|id| b.property_key(id, &format!("k{id}"))).collect();
    b.index(IndexDescriptor {
        id: 0,
        name: "l0_k0".into(),
        schema: IndexSchema::Label {
            label: labels[0],
            keys: vec![keys[0]],
        },
        unique: false,
        state: IndexState::Online,
    });
    let props = |count: usize, seed: usize| -> Vec<(PropKeyId, PropValue)> {
        keys.iter()
            .take(count)
            .enumerate()
            .map(|(i, key)| (*key, PropValue::Int((seed * 10 + i) as i64 % 4)))
            .collect()
    };

    let mut ids = Vec::new();
    for (seed, spec) in nodes.iter().enumerate() {
        if spec.gap {
            b.skip_node_ids(1);
        }
        let node_labels: Vec<LabelId> = labels
            .iter()
            .enumerate()
            .filter(|(bit, _)| spec.labels & (1 << bit) != 0)
            .map(|(_, label)| *label)
            .collect();
        let node_props = props(spec.props, seed);
        let id = if spec.dense {
            b.dense_node(&node_labels, &node_props)
        } else {
            b.node(&node_labels, &node_props)
        };
        ids.push(id);
    }
    for (seed, rel) in rels.iter().enumerate() {
        let from = ids[rel.from % ids.len()];
        let to = ids[rel.to % ids.len()];
        let rel_props = props(rel.props, seed);
        b.relationship(from, to, types[rel.ty as usize], &rel_props);
    }
    b.build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_built_stores_are_consistent_and_partition_independent(
        nodes in prop::collection::vec(arb_node(), 1..24),
        rels in prop::collection::vec(arb_rel(), 0..40),
        workers in 1usize..5,
        chunk in 1u64..6,
        window_records in 1u64..6,
    ) {
        let access = StoreAccess::from_store(Arc::new(random_store(&nodes, &rels)));
        let baseline = run(&access, 1, 100, None);
        prop_assert!(baseline.is_consistent(), "{:?}", baseline.violations);
        prop_assert_eq!(baseline.relationships_by_type.values().sum::<u64>(), rels.len() as u64);

        let windowed = run(&access, workers, chunk, Some(window_records * 16));
        prop_assert!(windowed.window_size >= 1 && windowed.window_size <= window_records);
        prop_assert_eq!(outcome(&windowed), outcome(&baseline));
    }
}
