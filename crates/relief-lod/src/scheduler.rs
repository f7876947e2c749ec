//! Closed-loop split/merge scheduling driven by rendered feedback.
//!
//! Each [`Scheduler::cycle`] installs finished builds, refreshes stale
//! geometry, aggregates the feedback images per tile, and then runs at most
//! one of the two structural passes: splits for leaves that are too coarse,
//! or merges for sibling groups that are all finer than needed. A pass is
//! never started while builds from an earlier split are still resolving.

use std::time::{Duration, Instant};

use relief_quadtree::{
    BuildError, BuiltTile, CompactId, NodeKey, SplitTicket, TileBuilder, TileNode, TileTree,
    TreeError,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::{BuildJob, BuildPool, BuildTag, Classification, FeedbackImages, TileSample, read_tile_data};

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Build worker threads; `0` picks one per spare core.
    pub worker_threads: usize,
    /// Builds allowed in flight at once.
    pub queue_budget: usize,
    pub max_splits_per_cycle: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            queue_budget: 256,
            max_splits_per_cycle: 16,
        }
    }
}

/// What one call to [`Scheduler::cycle`] or [`Scheduler::poll`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sampled_tiles: usize,
    pub too_low: usize,
    pub too_high: usize,
    pub just_right: usize,
    pub unsampled: usize,
    pub splits_started: usize,
    pub splits_completed: usize,
    pub splits_failed: usize,
    pub merges: usize,
    pub rebuilds_started: usize,
    pub rebuilds_completed: usize,
    /// The tree changed shape since the feedback was rendered; no pass ran.
    pub stale_feedback: bool,
    /// An earlier split was still resolving; no pass ran.
    pub deferred: bool,
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sampled={} low={} high={} right={} split={}/{}/{} merged={} rebuilt={}/{}",
            self.sampled_tiles,
            self.too_low,
            self.too_high,
            self.just_right,
            self.splits_started,
            self.splits_completed,
            self.splits_failed,
            self.merges,
            self.rebuilds_started,
            self.rebuilds_completed,
        )?;
        if self.stale_feedback {
            write!(f, " stale")?;
        }
        if self.deferred {
            write!(f, " deferred")?;
        }
        Ok(())
    }
}

struct PendingSplit {
    ticket: SplitTicket,
    results: [Option<Result<BuiltTile, BuildError>>; 4],
    outstanding: usize,
}

fn classify(node: &TileNode, samples: &FxHashMap<CompactId, TileSample>) -> Classification {
    Classification::of(
        node.zoom(),
        samples.get(&node.id()).map(|s| s.required_zoom),
    )
}

/// Leaves that are too coarse, idle and splittable, nearest first.
pub fn split_candidates(
    tree: &TileTree,
    samples: &FxHashMap<CompactId, TileSample>,
) -> Vec<NodeKey> {
    let mut candidates: Vec<(NodeKey, f64)> = tree
        .leaf_nodes()
        .into_iter()
        .filter_map(|key| {
            let node = tree.node(key)?;
            let sample = samples.get(&node.id())?;
            let wanted = classify(node, samples) == Classification::TooLow
                && !node.is_busy()
                && node.can_split();
            wanted.then_some((key, sample.min_distance))
        })
        .collect();
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
    candidates.into_iter().map(|(key, _)| key).collect()
}

/// Parents whose children are all idle leaves that are either finer than
/// required or not visible at all.
pub fn merge_candidates(
    tree: &TileTree,
    samples: &FxHashMap<CompactId, TileSample>,
) -> Vec<NodeKey> {
    let mut seen = FxHashSet::default();
    let mut parents = Vec::new();
    for leaf in tree.leaf_nodes() {
        let Some(parent) = tree.node(leaf).and_then(TileNode::parent) else {
            continue;
        };
        if !seen.insert(parent) {
            continue;
        }
        let Some(parent_node) = tree.node(parent) else {
            continue;
        };
        if parent_node.is_busy() || parent_node.geometry().is_none() {
            continue;
        }
        let mergeable = tree.siblings(leaf).iter().all(|&sibling| {
            tree.node(sibling).is_some_and(|n| {
                n.is_leaf() && !n.is_busy() && classify(n, samples).allows_merge()
            })
        });
        if mergeable {
            parents.push(parent);
        }
    }
    parents
}

/// Owns the build pool and the cross-cycle state of the feedback loop.
pub struct Scheduler {
    pool: BuildPool,
    pending_splits: FxHashMap<NodeKey, PendingSplit>,
    pending_rebuilds: FxHashSet<NodeKey>,
    split_in_progress: bool,
    merge_in_progress: bool,
    tiles_need_update: bool,
    max_splits_per_cycle: usize,
}

impl Scheduler {
    pub fn new(config: &SchedulerConfig, builder: TileBuilder) -> Self {
        Self {
            pool: BuildPool::new(config.worker_threads, config.queue_budget, builder),
            pending_splits: FxHashMap::default(),
            pending_rebuilds: FxHashSet::default(),
            split_in_progress: false,
            merge_in_progress: false,
            tiles_need_update: true,
            max_splits_per_cycle: config.max_splits_per_cycle,
        }
    }

    pub fn split_in_progress(&self) -> bool {
        self.split_in_progress
    }

    pub fn merge_in_progress(&self) -> bool {
        self.merge_in_progress
    }

    /// Set whenever rendered geometry changed; feedback should be re-rendered.
    pub fn tiles_need_update(&self) -> bool {
        self.tiles_need_update
    }

    /// No build is queued, running, or waiting to be installed.
    pub fn is_idle(&self) -> bool {
        self.pending_splits.is_empty() && self.pending_rebuilds.is_empty()
    }

    /// Install finished builds without consuming feedback.
    pub fn poll(&mut self, tree: &mut TileTree) -> CycleReport {
        let mut report = CycleReport::default();
        self.poll_into(tree, &mut report);
        self.refresh(tree, &mut report);
        report
    }

    /// Poll until every build has been installed or `timeout` elapses.
    pub fn settle(&mut self, tree: &mut TileTree, timeout: Duration) -> CycleReport {
        let start = Instant::now();
        let mut total = CycleReport::default();
        loop {
            let report = self.poll(tree);
            total.splits_completed += report.splits_completed;
            total.splits_failed += report.splits_failed;
            total.rebuilds_started += report.rebuilds_started;
            total.rebuilds_completed += report.rebuilds_completed;
            if self.is_idle() || start.elapsed() >= timeout {
                return total;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Run one feedback cycle against `images`, which must have been
    /// rendered from the tree as it stood after the previous call.
    pub fn cycle(&mut self, tree: &mut TileTree, images: &FeedbackImages) -> CycleReport {
        let mut report = CycleReport::default();
        let reshaped = self.poll_into(tree, &mut report);
        self.refresh(tree, &mut report);

        let samples = read_tile_data(images);
        report.sampled_tiles = samples.len();
        for key in tree.leaf_nodes() {
            let Some(node) = tree.node(key) else {
                continue;
            };
            match classify(node, &samples) {
                Classification::TooLow => report.too_low += 1,
                Classification::TooHigh => report.too_high += 1,
                Classification::JustRight => report.just_right += 1,
                Classification::Unsampled => report.unsampled += 1,
            }
        }

        if reshaped {
            report.stale_feedback = true;
        } else if self.split_in_progress || self.merge_in_progress {
            report.deferred = true;
        } else {
            self.split_pass(tree, &samples, &mut report);
            if !self.split_in_progress {
                self.merge_pass(tree, &samples, &mut report);
            }
            self.tiles_need_update = report.merges > 0 || report.rebuilds_completed > 0;
        }
        debug!(%report, "feedback cycle");
        report
    }

    fn split_pass(
        &mut self,
        tree: &mut TileTree,
        samples: &FxHashMap<CompactId, TileSample>,
        report: &mut CycleReport,
    ) {
        for key in split_candidates(tree, samples) {
            if report.splits_started >= self.max_splits_per_cycle || self.pool.remaining() < 4 {
                break;
            }
            match tree.begin_split(key) {
                Ok(ticket) => {
                    report.splits_started += 1;
                    self.dispatch_split(tree, ticket, report);
                }
                Err(TreeError::IdsExhausted { .. }) => break,
                Err(err) => debug!(node = %key, error = %err, "split skipped"),
            }
        }
        self.split_in_progress = !self.pending_splits.is_empty();
    }

    fn dispatch_split(&mut self, tree: &mut TileTree, ticket: SplitTicket, report: &mut CycleReport) {
        let parent = ticket.parent;
        let mut results: [Option<Result<BuiltTile, BuildError>>; 4] = Default::default();
        let mut outstanding = 0;
        for (child, request) in ticket.requests.iter().enumerate() {
            let job = BuildJob {
                tag: BuildTag::Split { parent, child },
                request: request.clone(),
            };
            match self.pool.submit(job) {
                Ok(()) => outstanding += 1,
                Err(job) => {
                    results[child] = Some(Err(BuildError::Cancelled(job.request.address)));
                }
            }
        }
        let pending = PendingSplit {
            ticket,
            results,
            outstanding,
        };
        if outstanding == 0 {
            self.finish_split(tree, pending, report);
        } else {
            self.pending_splits.insert(parent, pending);
        }
    }

    fn finish_split(&mut self, tree: &mut TileTree, pending: PendingSplit, report: &mut CycleReport) -> bool {
        let results = pending.results.into_iter().flatten().collect();
        match tree.complete_split(pending.ticket, results) {
            Ok(_) => {
                report.splits_completed += 1;
                self.tiles_need_update = true;
                true
            }
            Err(err) => {
                report.splits_failed += 1;
                debug!(error = %err, "split abandoned");
                false
            }
        }
    }

    fn merge_pass(
        &mut self,
        tree: &mut TileTree,
        samples: &FxHashMap<CompactId, TileSample>,
        report: &mut CycleReport,
    ) {
        self.merge_in_progress = true;
        for parent in merge_candidates(tree, samples) {
            match tree.merge(parent) {
                Ok(()) => report.merges += 1,
                Err(err) => warn!(node = %parent, error = %err, "merge failed"),
            }
        }
        self.merge_in_progress = false;
    }

    /// Start rebuilds for leaves whose geometry is missing or stale.
    fn refresh(&mut self, tree: &mut TileTree, report: &mut CycleReport) {
        for key in tree.stale_leaves() {
            if self.pool.remaining() == 0 {
                break;
            }
            let request = match tree.begin_rebuild(key) {
                Ok(request) => request,
                Err(err) => {
                    debug!(node = %key, error = %err, "rebuild skipped");
                    continue;
                }
            };
            match self.pool.submit(BuildJob {
                tag: BuildTag::Rebuild(key),
                request,
            }) {
                Ok(()) => {
                    self.pending_rebuilds.insert(key);
                    report.rebuilds_started += 1;
                }
                Err(job) => {
                    let _ = tree.complete_rebuild(key, Err(BuildError::Cancelled(job.request.address)));
                }
            }
        }
    }

    /// Install every finished build. Returns whether the leaf set changed.
    fn poll_into(&mut self, tree: &mut TileTree, report: &mut CycleReport) -> bool {
        let mut reshaped = false;
        for outcome in self.pool.drain_results() {
            match outcome.tag {
                BuildTag::Split { parent, child } => {
                    let Some(pending) = self.pending_splits.get_mut(&parent) else {
                        warn!(node = %parent, "build result for unknown split");
                        continue;
                    };
                    if let Some(slot) = pending.results.get_mut(child) {
                        *slot = Some(outcome.result);
                        pending.outstanding = pending.outstanding.saturating_sub(1);
                    }
                    if pending.outstanding == 0 {
                        if let Some(pending) = self.pending_splits.remove(&parent) {
                            reshaped |= self.finish_split(tree, pending, report);
                        }
                    }
                }
                BuildTag::Rebuild(key) => {
                    self.pending_rebuilds.remove(&key);
                    match tree.complete_rebuild(key, outcome.result) {
                        Ok(()) => {
                            report.rebuilds_completed += 1;
                            self.tiles_need_update = true;
                        }
                        Err(err) => debug!(node = %key, error = %err, "rebuild dropped"),
                    }
                }
            }
        }
        self.split_in_progress = !self.pending_splits.is_empty();
        reshaped
    }
}
