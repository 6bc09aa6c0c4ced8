//! Violation sink and the summary a run produces.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

/// Kind of entity a violation is reported against.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Node record.
    Node,
    /// Relationship record.
    Relationship,
    /// Relationship group record.
    RelationshipGroup,
    /// Property record.
    Property,
    /// Label scan index entry; the id is the node id.
    LabelIndex,
    /// Property index; the id is the index id.
    Index,
    /// Constraint; the id is the constraint id.
    Constraint,
    /// Aggregate count; carries no id.
    Counts,
}

impl EntityKind {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Relationship => "relationship",
            EntityKind::RelationshipGroup => "relationship_group",
            EntityKind::Property => "property",
            EntityKind::LabelIndex => "label_index",
            EntityKind::Index => "index",
            EntityKind::Constraint => "constraint",
            EntityKind::Counts => "counts",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! violation_kinds {
    ($($(#[$doc:meta])* $variant:ident => $name:literal,)+) => {
        /// Every inconsistency the checker can report.
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum ViolationKind {
            $($(#[$doc])* $variant,)+
        }

        impl ViolationKind {
            /// Every kind, in declaration order.
            pub const ALL: &'static [ViolationKind] = &[$(ViolationKind::$variant,)+];

            /// Stable snake_case name, as used in summaries.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(ViolationKind::$variant => $name,)+
                }
            }
        }
    };
}

violation_kinds! {
    /// Node points at a property record that is not in use.
    NodePropertyNotInUse => "node_property_not_in_use",
    /// Sparse node points at a relationship that is not in use.
    NodeRelationshipNotInUse => "node_relationship_not_in_use",
    /// Sparse node's first relationship does not touch the node.
    NodeRelationshipNotOwned => "node_relationship_not_owned",
    /// Dense node points at a group that is not in use.
    NodeGroupNotInUse => "node_group_not_in_use",
    /// Dense node's first group belongs to another node.
    NodeGroupOwnerMismatch => "node_group_owner_mismatch",
    /// Label ids are not in ascending order.
    NodeLabelsUnsorted => "node_labels_unsorted",
    /// A label id appears more than once.
    NodeLabelDuplicate => "node_label_duplicate",
    /// A label id has no live token.
    NodeLabelTokenMissing => "node_label_token_missing",
    /// A node label has no label index entry.
    LabelIndexEntryMissing => "label_index_entry_missing",
    /// A label index entry names a label the node does not carry.
    LabelIndexEntryDangling => "label_index_entry_dangling",
    /// An endpoint of a relationship is not in use.
    RelationshipNodeNotInUse => "relationship_node_not_in_use",
    /// An endpoint id lies beyond the node high id.
    RelationshipNodeOutOfRange => "relationship_node_out_of_range",
    /// First-in-chain flag disagrees with the endpoint's chain head.
    RelationshipChainHeadMismatch => "relationship_chain_head_mismatch",
    /// A chain pointer references a relationship that is not in use.
    RelationshipChainNotInUse => "relationship_chain_not_in_use",
    /// A chain pointer is not answered by the neighbour's reverse pointer.
    RelationshipChainInconsistent => "relationship_chain_inconsistent",
    /// A self-loop's second-side pointers differ from its first side.
    RelationshipLoopMismatch => "relationship_loop_mismatch",
    /// Relationship type has no live token.
    RelationshipTypeTokenMissing => "relationship_type_token_missing",
    /// Relationship points at a property record that is not in use.
    RelationshipPropertyNotInUse => "relationship_property_not_in_use",
    /// Group type has no live token.
    GroupTypeTokenMissing => "group_type_token_missing",
    /// Group owner is not in use.
    GroupOwnerNotInUse => "group_owner_not_in_use",
    /// Group owner is a sparse node.
    GroupOwnerNotDense => "group_owner_not_dense",
    /// Next group is not in use.
    GroupNextNotInUse => "group_next_not_in_use",
    /// Next group belongs to another owner.
    GroupNextOwnerMismatch => "group_next_owner_mismatch",
    /// Next group's type is not greater than this group's type.
    GroupTypeOrder => "group_type_order",
    /// A group chain head is not in use.
    GroupChainNotInUse => "group_chain_not_in_use",
    /// A group chain head has the wrong type, endpoint or head flag.
    GroupChainMismatch => "group_chain_mismatch",
    /// A property chain pointer references a record that is not in use.
    PropertyChainNotInUse => "property_chain_not_in_use",
    /// A property chain pointer is not answered by its neighbour.
    PropertyChainInconsistent => "property_chain_inconsistent",
    /// Walking an owner's property chain revisits a record.
    PropertyChainCycle => "property_chain_cycle",
    /// An owner's property chain holds the same key twice.
    PropertyDuplicateKey => "property_duplicate_key",
    /// A property block does not decode.
    PropertyBlockUndecodable => "property_block_undecodable",
    /// A property key has no live token.
    PropertyKeyTokenMissing => "property_key_token_missing",
    /// A schema descriptor references a missing token.
    SchemaTokenMissing => "schema_token_missing",
    /// Index population failed.
    IndexFailed => "index_failed",
    /// Store entity is missing from an index that covers it.
    IndexEntryMissing => "index_entry_missing",
    /// Index holds an entry the store does not back.
    IndexEntryDangling => "index_entry_dangling",
    /// Unique index holds several entities under one value tuple.
    IndexDuplicateValue => "index_duplicate_value",
    /// Uniqueness constraint names an index that does not exist.
    ConstraintIndexMissing => "constraint_index_missing",
    /// Uniqueness constraint names a non-unique index.
    ConstraintIndexNotUnique => "constraint_index_not_unique",
    /// Node violates a property existence constraint.
    ConstraintPropertyMissing => "constraint_property_missing",
    /// Observed aggregate count differs from the stored one.
    CountsMismatch => "counts_mismatch",
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported inconsistency.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct Violation {
    /// Entity kind the violation is reported against.
    pub entity: EntityKind,
    /// Entity id; absent for aggregate counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// What is wrong.
    pub kind: ViolationKind,
    /// Human-readable detail naming the referenced ids.
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} {}: {}: {}", self.entity, id, self.kind, self.detail),
            None => write!(f, "{}: {}: {}", self.entity, self.kind, self.detail),
        }
    }
}

/// Thread-safe violation sink.
///
/// Counters are exact; retained violations stop growing at the configured
/// cap.
pub struct ConsistencyReporter {
    counters: Vec<AtomicU64>,
    retained: Mutex<Vec<Violation>>,
    max_retained: Option<usize>,
    dropped: AtomicU64,
}

impl ConsistencyReporter {
    /// Creates a reporter retaining at most `max_retained` violations.
    pub fn new(max_retained: Option<usize>) -> Self {
        Self {
            counters: ViolationKind::ALL.iter().map(|_| AtomicU64::new(0)).collect(),
            retained: Mutex::new(Vec::new()),
            max_retained,
            dropped: AtomicU64::new(0),
        }
    }

    /// Records a violation against entity `id`.
    pub fn report(&self, entity: EntityKind, id: u64, kind: ViolationKind, detail: impl Into<String>) {
        self.record(entity, Some(id), kind, detail.into());
    }

    /// Records a violation of an aggregate that has no entity id.
    pub fn report_aggregate(&self, entity: EntityKind, kind: ViolationKind, detail: impl Into<String>) {
        self.record(entity, None, kind, detail.into());
    }

    fn record(&self, entity: EntityKind, id: Option<u64>, kind: ViolationKind, detail: String) {
        warn!(
            entity = entity.as_str(),
            id,
            kind = kind.as_str(),
            detail = %detail,
            "check.violation"
        );
        self.counters[kind as usize].fetch_add(1, Ordering::Relaxed);
        let mut retained = self.retained.lock();
        if self.max_retained.is_some_and(|cap| retained.len() >= cap) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        retained.push(Violation {
            entity,
            id,
            kind,
            detail,
        });
    }

    /// Occurrences of `kind` so far.
    pub fn count(&self, kind: ViolationKind) -> u64 {
        self.counters[kind as usize].load(Ordering::Relaxed)
    }

    /// Occurrences of every kind so far.
    pub fn total(&self) -> u64 {
        self.counters
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .sum()
    }

    /// Fills the violation part of `summary`. Retained violations are sorted
    /// so that runs differing only in scheduling compare equal.
    pub(crate) fn fill(&self, summary: &mut ConsistencySummary) {
        summary.violations_by_kind = ViolationKind::ALL
            .iter()
            .filter_map(|&kind| {
                let count = self.count(kind);
                (count > 0).then_some((kind, count))
            })
            .collect();
        summary.total_violations = self.total();
        let mut violations = self.retained.lock().clone();
        violations.sort();
        summary.violations = violations;
        summary.violations_truncated = self.dropped.load(Ordering::Relaxed) > 0;
    }
}

impl Default for ConsistencyReporter {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Outcome of a check run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConsistencySummary {
    /// False when the run was aborted by an access failure.
    pub completed: bool,
    /// Phases that ran to the end, in order.
    pub phases: Vec<String>,
    /// Memory windows the node id space was split into.
    pub windows: u64,
    /// Node ids per window.
    pub window_size: u64,
    /// Violations of every kind.
    pub total_violations: u64,
    /// Occurrences per violation kind; kinds that never occurred are absent.
    pub violations_by_kind: BTreeMap<ViolationKind, u64>,
    /// Retained violations, sorted.
    pub violations: Vec<Violation>,
    /// Whether the retention cap dropped any violation.
    pub violations_truncated: bool,
    /// Observed in-use nodes per label name.
    pub nodes_by_label: BTreeMap<String, u64>,
    /// Observed in-use relationships per type name.
    pub relationships_by_type: BTreeMap<String, u64>,
    /// Indexes left out of the entry cross-check because they are not online.
    pub skipped_indexes: Vec<String>,
}

impl ConsistencySummary {
    /// True when the run completed without finding anything.
    pub fn is_consistent(&self) -> bool {
        self.completed && self.total_violations == 0
    }

    /// Occurrences of `kind`.
    pub fn count(&self, kind: ViolationKind) -> u64 {
        self.violations_by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Per-label and per-type counts in one map, keyed by token name.
    pub fn counts_by_token(&self) -> BTreeMap<String, u64> {
        let mut merged = self.nodes_by_label.clone();
        for (name, count) in &self.relationships_by_type {
            *merged.entry(name.clone()).or_default() += count;
        }
        merged
    }
}
