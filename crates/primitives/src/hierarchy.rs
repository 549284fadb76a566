//! Hierarchy denormalizer
//!
//! Materializes the ancestor closure of the group tree as
//! [`GroupDescendant`] rows: for every feature and each of its direct groups,
//! one edge per step up the parent chain, `depth` counting from 0 at the
//! direct group.
//!
//! ## Pipeline
//!
//! ```text
//! producer (caller thread) --bounded channel--> N batch writers --> store
//! ```
//!
//! The producer walks the tree and blocks when the channel is full, so memory
//! is bounded by `channel_capacity` rather than by the edge count. Each writer
//! buffers up to `batch_size` edges and commits them as one atomic batch.
//!
//! ## Failure model
//!
//! - A group key with no id, or a cycle in the parent chain, truncates that
//!   one path with a warning; the run continues
//! - A failed batch commit, cancellation or deadline is fatal: the first error
//!   is kept, every writer stops, and the producer stops sending
//! - The run is atomic per batch only; a failed run may leave some edges
//!   written
//!
//! Edges are upserted and stale edges are never deleted, so a group removed
//! from the tree keeps its old edges until they are cleaned up separately.

use crate::groups::{
    all_groups_statement, all_memberships_statement, FeatureGroupMapper, GroupDescendant,
    GroupDescendantMapper, WebFeatureGroupMapper,
};
use crossbeam::channel::{bounded, Receiver};
use keystone_core::{Context, Database, Error, Result};
use keystone_engine::{DenormalizerConfig, EntityStore};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

// ============================================================================
// Input
// ============================================================================

/// Snapshot of the tree and the direct memberships to denormalize
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyInput {
    /// Feature id to the keys of its direct groups
    pub leaf_groups: BTreeMap<String, Vec<String>>,
    /// Group key to group id
    pub group_ids: HashMap<String, String>,
    /// Child group key to parent group key
    pub parents: HashMap<String, String>,
}

impl HierarchyInput {
    /// Empty input
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group and, optionally, its parent
    pub fn with_group(
        mut self,
        group_key: impl Into<String>,
        group_id: impl Into<String>,
        parent_key: Option<&str>,
    ) -> Self {
        let group_key = group_key.into();
        if let Some(parent) = parent_key {
            self.parents.insert(group_key.clone(), parent.to_string());
        }
        self.group_ids.insert(group_key, group_id.into());
        self
    }

    /// Add a feature and its direct group keys
    pub fn with_leaf(mut self, web_feature_id: impl Into<String>, group_keys: &[&str]) -> Self {
        self.leaf_groups.insert(
            web_feature_id.into(),
            group_keys.iter().map(|k| k.to_string()).collect(),
        );
        self
    }

    /// Read groups and memberships from the store
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn load<D: Database>(store: &EntityStore<D>, ctx: &Context) -> Result<Self> {
        let mut input = Self::new();
        for group in store.read_all::<FeatureGroupMapper>(ctx, &all_groups_statement())? {
            match group.id {
                Some(id) => {
                    input.group_ids.insert(group.group_key.clone(), id);
                }
                None => warn!(
                    target: "keystone::hierarchy",
                    group_key = %group.group_key,
                    "Group has no id"
                ),
            }
            if let Some(parent) = group.parent_key {
                input.parents.insert(group.group_key, parent);
            }
        }
        for membership in store.read_all::<WebFeatureGroupMapper>(ctx, &all_memberships_statement())? {
            input
                .leaf_groups
                .insert(membership.web_feature_id, membership.group_keys);
        }
        Ok(input)
    }

    /// Edges of one feature, deduplicated to the minimum depth per ancestor
    ///
    /// Returns the edges in ancestor-id order and the number of truncated paths.
    pub fn edges_for(&self, web_feature_id: &str) -> (Vec<GroupDescendant>, usize) {
        let mut depths: BTreeMap<&str, i64> = BTreeMap::new();
        let mut truncated = 0;
        let direct = self
            .leaf_groups
            .get(web_feature_id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for start in direct {
            let mut visited = HashSet::new();
            let mut current = start.as_str();
            let mut depth = 0i64;
            loop {
                if !visited.insert(current) {
                    warn!(
                        target: "keystone::hierarchy",
                        web_feature_id,
                        group_key = current,
                        "Cycle in group parents, path truncated"
                    );
                    truncated += 1;
                    break;
                }
                let Some(group_id) = self.group_ids.get(current) else {
                    warn!(
                        target: "keystone::hierarchy",
                        web_feature_id,
                        group_key = current,
                        "Unknown group key, path truncated"
                    );
                    truncated += 1;
                    break;
                };
                depths
                    .entry(group_id.as_str())
                    .and_modify(|d| *d = (*d).min(depth))
                    .or_insert(depth);
                match self.parents.get(current) {
                    Some(parent) => {
                        current = parent.as_str();
                        depth += 1;
                    }
                    None => break,
                }
            }
        }

        let edges = depths
            .into_iter()
            .map(|(group_id, depth)| GroupDescendant {
                feature_group_id: group_id.to_string(),
                web_feature_id: web_feature_id.to_string(),
                depth,
            })
            .collect();
        (edges, truncated)
    }
}

// ============================================================================
// Run
// ============================================================================

/// Outcome of a successful run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DenormalizeReport {
    /// Features processed
    pub leaves: usize,
    /// Edges committed
    pub edges_written: usize,
    /// Batches committed
    pub batches_committed: usize,
    /// Paths cut short by a missing group or a cycle
    pub truncated_paths: usize,
}

/// Shared state between the producer and the writers
struct RunState {
    abort: AtomicBool,
    first_error: Mutex<Option<Error>>,
    edges_written: AtomicUsize,
    batches_committed: AtomicUsize,
}

impl RunState {
    fn new() -> Self {
        Self {
            abort: AtomicBool::new(false),
            first_error: Mutex::new(None),
            edges_written: AtomicUsize::new(0),
            batches_committed: AtomicUsize::new(0),
        }
    }

    fn fail(&self, err: Error) {
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.abort.store(true, Ordering::Release);
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }
}

/// Computes and writes the group descendant closure
#[derive(Debug, Clone)]
pub struct HierarchyDenormalizer<D> {
    store: EntityStore<D>,
    config: DenormalizerConfig,
}

impl<D: Database> HierarchyDenormalizer<D> {
    /// Denormalizer with the given pipeline settings
    pub fn new(store: EntityStore<D>, config: DenormalizerConfig) -> Self {
        Self { store, config }
    }

    /// Pipeline settings
    pub fn config(&self) -> &DenormalizerConfig {
        &self.config
    }

    /// Load the tree from the store and denormalize it
    ///
    /// # Errors
    ///
    /// As [`run`](Self::run), plus load failures.
    pub fn refresh(&self, ctx: &Context) -> Result<DenormalizeReport> {
        let input = HierarchyInput::load(&self.store, ctx)?;
        self.run(ctx, &input)
    }

    /// Denormalize `input` into the descendants table
    ///
    /// # Errors
    ///
    /// Returns the first batch commit failure, `Cancelled` or
    /// `DeadlineExceeded`. Batches committed before the failure stay written.
    pub fn run(&self, ctx: &Context, input: &HierarchyInput) -> Result<DenormalizeReport> {
        let workers = self.config.workers.max(1);
        let batch_size = self.config.batch_size.max(1);
        let (tx, rx) = bounded::<GroupDescendant>(self.config.channel_capacity.max(1));
        let state = RunState::new();
        let mut report = DenormalizeReport::default();

        thread::scope(|scope| {
            for i in 0..workers {
                let rx = rx.clone();
                let state = &state;
                let spawned = thread::Builder::new()
                    .name(format!("keystone-denorm-{}", i))
                    .spawn_scoped(scope, move || self.write_batches(ctx, rx, batch_size, state));
                if let Err(e) = spawned {
                    state.fail(Error::query("spawning batch writer", e));
                    break;
                }
            }
            drop(rx);

            'leaves: for leaf in input.leaf_groups.keys() {
                if state.aborted() {
                    break;
                }
                if let Err(e) = ctx.check() {
                    state.fail(e);
                    break;
                }
                let (edges, truncated) = input.edges_for(leaf);
                report.leaves += 1;
                report.truncated_paths += truncated;
                for edge in edges {
                    if tx.send(edge).is_err() {
                        state.fail(Error::internal("batch writers stopped"));
                        break 'leaves;
                    }
                }
            }
            drop(tx);
        });

        if let Some(err) = state.first_error.into_inner() {
            warn!(
                target: "keystone::hierarchy",
                error = %err,
                edges_written = state.edges_written.load(Ordering::Acquire),
                "Denormalization aborted"
            );
            return Err(err);
        }

        report.edges_written = state.edges_written.into_inner();
        report.batches_committed = state.batches_committed.into_inner();
        info!(
            target: "keystone::hierarchy",
            leaves = report.leaves,
            edges_written = report.edges_written,
            batches = report.batches_committed,
            truncated_paths = report.truncated_paths,
            "Denormalization complete"
        );
        Ok(report)
    }

    /// Writer loop: drain the channel, committing every `batch_size` edges
    fn write_batches(
        &self,
        ctx: &Context,
        rx: Receiver<GroupDescendant>,
        batch_size: usize,
        state: &RunState,
    ) {
        let mut batch = Vec::with_capacity(batch_size);
        for edge in rx.iter() {
            if state.aborted() {
                return;
            }
            batch.push(edge);
            if batch.len() >= batch_size && !self.flush(ctx, &mut batch, state) {
                return;
            }
        }
        if !batch.is_empty() && !state.aborted() {
            self.flush(ctx, &mut batch, state);
        }
    }

    fn flush(&self, ctx: &Context, batch: &mut Vec<GroupDescendant>, state: &RunState) -> bool {
        match self.store.write_batch::<GroupDescendantMapper>(ctx, batch) {
            Ok(()) => {
                state.edges_written.fetch_add(batch.len(), Ordering::AcqRel);
                state.batches_committed.fetch_add(1, Ordering::AcqRel);
                debug!(target: "keystone::hierarchy", edges = batch.len(), "Batch committed");
                batch.clear();
                true
            }
            Err(e) => {
                error!(
                    target: "keystone::hierarchy",
                    error = %e,
                    edges = batch.len(),
                    "Batch commit failed"
                );
                state.fail(e);
                false
            }
        }
    }
}
