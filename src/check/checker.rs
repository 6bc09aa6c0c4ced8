//! The orchestrator: plans windows, runs every phase and assembles the
//! summary.

use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::primitives::concurrency::{NoProgress, ParallelExecution, ProgressListener};
use crate::storage::access::StoreAccess;
use crate::storage::record::LabelSet;
use crate::types::{LabelId, PropKeyId, RecordType, StoreError, TypeId};

use super::cache::{labels_from_bits, node_slots, CacheAccess, SlotSizes};
use super::config::{CheckConfig, ConsistencyFlags};
use super::counts::{check_counts, named_counts, CountsBatch, CountsState};
use super::error::{CheckError, PhaseFailure, Result};
use super::limiter::{available_memory, MemoryLimiter};
use super::report::{ConsistencyReporter, ConsistencySummary, EntityKind, ViolationKind};
use super::{group, node, property, relationship, schema};

/// Chunked check phases, in the order a run performs them.
///
/// The first four run once per memory window and read the node cache; the
/// rest run once over their own id space.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckKind {
    /// Cache node fields for the window.
    Populate,
    /// Node records of the window.
    Nodes,
    /// Relationship sides whose node is in the window.
    RelationshipEndpoints,
    /// Groups whose owner is in the window.
    GroupOwners,
    /// Relationship records and their chain pointers.
    Relationships,
    /// Group records.
    Groups,
    /// Property records.
    Properties,
}

impl CheckKind {
    /// Phases run for every window.
    pub const WINDOWED: [CheckKind; 4] = [
        CheckKind::Populate,
        CheckKind::Nodes,
        CheckKind::RelationshipEndpoints,
        CheckKind::GroupOwners,
    ];

    /// Phases run once after the window loop.
    pub const WINDOWLESS: [CheckKind; 3] = [
        CheckKind::Relationships,
        CheckKind::Groups,
        CheckKind::Properties,
    ];

    /// Stable name used for logs and progress.
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Populate => "populate",
            CheckKind::Nodes => "nodes",
            CheckKind::RelationshipEndpoints => "relationship_endpoints",
            CheckKind::GroupOwners => "group_owners",
            CheckKind::Relationships => "relationships",
            CheckKind::Groups => "groups",
            CheckKind::Properties => "properties",
        }
    }

    fn enabled(self, flags: &ConsistencyFlags) -> bool {
        match self {
            CheckKind::Populate | CheckKind::Nodes => {
                flags.check_graph
                    || flags.check_label_index
                    || flags.check_properties
                    || flags.check_counts
            }
            CheckKind::RelationshipEndpoints => flags.check_graph || flags.check_counts,
            CheckKind::GroupOwners | CheckKind::Groups => flags.check_graph,
            CheckKind::Relationships => {
                flags.check_graph || flags.check_properties || flags.check_counts
            }
            CheckKind::Properties => flags.check_properties,
        }
    }

    /// Ids one invocation covers.
    fn id_space(self, ctx: &Context<'_>) -> Range<u64> {
        let records = ctx.access.records.as_ref();
        match self {
            CheckKind::Populate | CheckKind::Nodes => ctx.cache.window(),
            CheckKind::RelationshipEndpoints | CheckKind::Relationships => {
                0..records.high_id(RecordType::Relationship)
            }
            CheckKind::GroupOwners | CheckKind::Groups => {
                0..records.high_id(RecordType::RelationshipGroup)
            }
            CheckKind::Properties => 0..records.high_id(RecordType::Property),
        }
    }

    fn check(self, ctx: &Context<'_>, ids: Range<u64>, batch: &mut CountsBatch) -> crate::types::Result<()> {
        match self {
            CheckKind::Populate => node::populate(ctx, ids),
            CheckKind::Nodes => node::check_nodes(ctx, ids, batch),
            CheckKind::RelationshipEndpoints => relationship::check_endpoints(ctx, ids, batch),
            CheckKind::GroupOwners => group::check_owners(ctx, ids),
            CheckKind::Relationships => relationship::check_relationships(ctx, ids, batch),
            CheckKind::Groups => group::check_groups(ctx, ids),
            CheckKind::Properties => property::check_properties(ctx, ids),
        }
    }
}

/// What every per-entity check reads from and writes to.
pub(crate) struct Context<'a> {
    pub(crate) access: &'a StoreAccess,
    pub(crate) cache: &'a CacheAccess,
    pub(crate) reporter: &'a ConsistencyReporter,
    pub(crate) flags: ConsistencyFlags,
    pub(crate) node_high_id: u64,
}

impl Context<'_> {
    pub(crate) fn report(&self, entity: EntityKind, id: u64, kind: ViolationKind, detail: String) {
        self.reporter.report(entity, id, kind, detail);
    }

    pub(crate) fn label_live(&self, label: LabelId) -> bool {
        self.access.tokens.label(label).is_some_and(|token| token.in_use)
    }

    pub(crate) fn relationship_type_live(&self, ty: TypeId) -> bool {
        self.access
            .tokens
            .relationship_type(ty)
            .is_some_and(|token| token.in_use)
    }

    pub(crate) fn property_key_live(&self, key: PropKeyId) -> bool {
        self.access
            .tokens
            .property_key(key)
            .is_some_and(|token| token.in_use)
    }

    /// Labels of a cached node, read from the record when the bit-set
    /// overflowed.
    pub(crate) fn cached_labels(&self, node: u64) -> crate::types::Result<LabelSet> {
        match labels_from_bits(self.cache.get(node, node_slots::LABELS)) {
            Some(labels) => Ok(labels),
            None => Ok(self.access.records.node(node)?.labels),
        }
    }
}

/// Runs a full consistency check over one store.
pub struct ConsistencyChecker {
    access: StoreAccess,
    config: CheckConfig,
    slot_sizes: SlotSizes,
    progress: Arc<dyn ProgressListener>,
}

/// Bookkeeping carried across phases so an aborted run can still describe
/// what it did.
#[derive(Default)]
struct RunState {
    phases: Vec<String>,
    skipped_indexes: Vec<String>,
}

impl ConsistencyChecker {
    /// A checker over `access` with the default node cache layout.
    pub fn new(access: StoreAccess, config: CheckConfig) -> Self {
        Self {
            access,
            config,
            slot_sizes: SlotSizes::default(),
            progress: Arc::new(NoProgress),
        }
    }

    /// Sends chunk progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressListener>) -> Self {
        self.progress = progress;
        self
    }

    /// The configuration the checker runs with.
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Runs every enabled phase.
    ///
    /// Inconsistencies end up in the summary. An accessor failure aborts the
    /// run with [`CheckError::ScanAborted`] carrying everything found so far.
    pub fn run(&self) -> Result<ConsistencySummary> {
        self.config.validate()?;
        let started = Instant::now();
        let flags = self.config.flags;
        let node_high_id = self.access.records.high_id(RecordType::Node);
        let available = self.config.available_memory.unwrap_or_else(available_memory);
        let limiter = MemoryLimiter::new(
            available,
            self.config.memory_ceiling,
            self.slot_sizes.bytes_per_record(),
            node_high_id,
        )?;
        info!(
            node_high_id,
            workers = self.config.workers,
            ids_per_chunk = self.config.ids_per_chunk,
            window_size = limiter.window_size(),
            windows = limiter.number_of_windows(),
            "check.start"
        );

        let reporter = ConsistencyReporter::new(self.config.max_retained_violations);
        let counts = CountsState::new();
        let exec = ParallelExecution::new(self.config.workers, self.config.ids_per_chunk)
            .with_progress(self.progress.clone());
        let mut cache = CacheAccess::new(&self.slot_sizes, limiter.budget());
        let mut state = RunState::default();

        let outcome = self.run_phases(&limiter, &mut cache, &reporter, &counts, &exec, &mut state);
        cache.release();
        let observed = counts.close();
        if outcome.is_ok() && flags.check_counts {
            info!(phase = "counts", "check.phase.start");
            check_counts(&observed, self.access.counts.as_ref(), &reporter);
            state.phases.push("counts".to_string());
        }

        let (nodes_by_label, relationships_by_type) =
            named_counts(&observed, self.access.tokens.as_ref());
        let mut summary = ConsistencySummary {
            completed: outcome.is_ok(),
            phases: state.phases,
            windows: limiter.number_of_windows(),
            window_size: limiter.window_size(),
            nodes_by_label,
            relationships_by_type,
            skipped_indexes: state.skipped_indexes,
            ..Default::default()
        };
        reporter.fill(&mut summary);

        match outcome {
            Ok(()) => {
                info!(
                    violations = summary.total_violations,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "check.completed"
                );
                Ok(summary)
            }
            Err(PhaseFailure { phase, source }) => {
                warn!(phase, error = %source, violations = summary.total_violations, "check.aborted");
                Err(CheckError::ScanAborted {
                    phase,
                    source,
                    summary: Box::new(summary),
                })
            }
        }
    }

    fn run_phases(
        &self,
        limiter: &MemoryLimiter,
        cache: &mut CacheAccess,
        reporter: &ConsistencyReporter,
        counts: &CountsState,
        exec: &ParallelExecution,
        state: &mut RunState,
    ) -> std::result::Result<(), PhaseFailure> {
        let flags = self.config.flags;
        let node_high_id = self.access.records.high_id(RecordType::Node);
        let windowed: Vec<CheckKind> = CheckKind::WINDOWED
            .into_iter()
            .filter(|kind| kind.enabled(&flags))
            .collect();

        if !windowed.is_empty() {
            for (index, window) in limiter.windows().enumerate() {
                cache.clear(window.clone());
                debug!(index, start = window.start, end = window.end, "check.window");
                let ctx = Context {
                    access: &self.access,
                    cache: &*cache,
                    reporter,
                    flags,
                    node_high_id,
                };
                for &kind in &windowed {
                    run_chunked(&ctx, exec, counts, kind)?;
                }
            }
            state
                .phases
                .extend(windowed.iter().map(|kind| kind.as_str().to_string()));
        }

        let ctx = Context {
            access: &self.access,
            cache: &*cache,
            reporter,
            flags,
            node_high_id,
        };
        for kind in CheckKind::WINDOWLESS {
            if kind.enabled(&flags) {
                info!(phase = kind.as_str(), "check.phase.start");
                run_chunked(&ctx, exec, counts, kind)?;
                state.phases.push(kind.as_str().to_string());
            }
        }

        if flags.check_label_index {
            node::check_label_index_tail(&ctx);
            state.phases.push("label_index".to_string());
        }

        if flags.check_indexes {
            info!(phase = "schema", "check.phase.start");
            state.skipped_indexes =
                schema::check_schema(&ctx, exec).map_err(|err| PhaseFailure::new("schema", err))?;
            state.phases.push("schema".to_string());
        }
        Ok(())
    }
}

fn run_chunked(
    ctx: &Context<'_>,
    exec: &ParallelExecution,
    counts: &CountsState,
    kind: CheckKind,
) -> std::result::Result<(), PhaseFailure> {
    let range = kind.id_space(ctx);
    exec.run(kind.as_str(), range, |ids| {
        let mut batch = CountsBatch::default();
        kind.check(ctx, ids, &mut batch)?;
        counts.merge(batch);
        Ok::<(), StoreError>(())
    })
    .map_err(|err| PhaseFailure::new(kind.as_str(), err))
}
