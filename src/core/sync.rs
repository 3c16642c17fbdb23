//! The sync orchestrator: the full run lifecycle — construct backends,
//! list both sides in parallel, build pairs, run the checker and
//! transferer pools, order destination deletions, and retry the whole
//! reconciliation while errors remain.
//!
//! One function drives the whole operation, building on the smaller
//! pieces underneath, the way a single top-level entry point composes a
//! tree of sub-operations.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::backend::types::{ListEntry, ListOptions, Object};
use crate::backend::Backend;
use crate::config::{DeleteMode, SyncConfig};
use crate::core::bandwidth::BandwidthLimiter;
use crate::core::pair;
use crate::core::retry::{self, AttemptOutcome};
use crate::core::stats::{self, Stats};
use crate::core::transfer::{self, PlannedOp};
use crate::error::Result;
use crate::filter::{FilterDecision, FilterList};

/// What kind of run this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// One-way, never deletes at the destination.
    Copy,
    /// One-way, deletes destination-only entries (subject to delete mode).
    Sync,
    /// Like `Copy`, then removes each successfully-transferred source
    /// object.
    Move,
    /// Equality-only: never mutates either side.
    Check,
}

/// Everything a run needs: the two backends, the direction, the active
/// filters, and the global config.
pub struct SyncPlan {
    pub src: Arc<dyn Backend>,
    pub dst: Arc<dyn Backend>,
    pub mode: SyncMode,
    pub filters: FilterList,
    pub config: SyncConfig,
}

/// Final tally for a completed run (possibly after several whole-run
/// retries), returned to the CLI layer for reporting and exit-code
/// selection.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub errors: u64,
    pub bytes_transferred: u64,
    pub checks: u64,
    pub transfers: u64,
    pub deletes: u64,
    /// Only meaningful for `SyncMode::Check`: objects whose content
    /// differs, excluding destination-only entries.
    pub mismatches: u64,
}

struct Attempt {
    errors: u64,
}

impl AttemptOutcome for Attempt {
    fn errors(&self) -> u64 {
        self.errors
    }
}

/// Run `plan` to completion, retrying the whole reconciliation up to
/// `plan.config.retries` times while errors remain.
pub async fn run(plan: &SyncPlan) -> Result<RunReport> {
    let cumulative = Stats::new();
    let reporter = stats::spawn_reporter(cumulative.clone(), plan.config.stats_interval);

    let mismatches = Arc::new(std::sync::atomic::AtomicU64::new(0));

    let final_attempt = retry::with_retry(plan.config.retries, Duration::from_secs(1), || {
        let stats = cumulative.clone();
        let mismatches = mismatches.clone();
        async move {
            let (errors, round_mismatches) = run_once(plan, &stats).await?;
            mismatches.store(round_mismatches, std::sync::atomic::Ordering::SeqCst);
            Ok(Attempt { errors })
        }
    })
    .await?;

    if let Some(handle) = reporter {
        handle.abort();
    }

    Ok(RunReport {
        errors: final_attempt.errors,
        bytes_transferred: cumulative.bytes_transferred(),
        checks: cumulative.checks(),
        transfers: cumulative.transfers(),
        deletes: cumulative.deletes(),
        mismatches: mismatches.load(std::sync::atomic::Ordering::SeqCst),
    })
}

/// One full reconciliation pass. Returns `(errors, mismatches)`.
async fn run_once(plan: &SyncPlan, stats: &Arc<Stats>) -> Result<(u64, u64)> {
    if !matches!(plan.mode, SyncMode::Check) && !plan.config.dry_run {
        plan.dst.mkdir().await?;
    }

    let (src_entries, dst_entries) =
        tokio::try_join!(list_objects(plan.src.as_ref()), list_objects(plan.dst.as_ref()))?;

    let src_objects: Vec<Object> = src_entries
        .into_iter()
        .filter(|o| plan.filters.decide(&o.remote, o.size, age_of(o)) == FilterDecision::Include)
        .collect();

    let mut dst_included = Vec::new();
    let mut dst_excluded = Vec::new();
    for obj in dst_entries {
        if plan.filters.decide(&obj.remote, obj.size, age_of(&obj)) == FilterDecision::Include {
            dst_included.push(obj);
        } else {
            dst_excluded.push(obj);
        }
    }

    let pairs = pair::build_pairs(src_objects.clone(), dst_included, plan.dst.case_insensitive());

    let ops = transfer::run_checkers(
        pairs,
        plan.config.checkers,
        plan.config.compare_mode(),
        plan.src.clone(),
        plan.dst.clone(),
        plan.config.modify_window,
        stats,
    )
    .await;

    if matches!(plan.mode, SyncMode::Check) {
        let mismatches = ops
            .iter()
            .filter(|op| !matches!(op, PlannedOp::DeleteCandidate { .. }))
            .count() as u64;
        if mismatches > 0 {
            tracing::info!(mismatches, "check found differing objects");
        }
        return Ok((0, mismatches));
    }

    let same_backend = plan
        .src
        .identity()
        .is_some_and(|id| plan.dst.identity() == Some(id));
    let prefer_move = matches!(plan.mode, SyncMode::Move);
    let bandwidth = BandwidthLimiter::new(plan.config.bwlimit);

    let mut transfer_ops = Vec::new();
    let mut delete_ops = Vec::new();
    for op in ops {
        match op {
            PlannedOp::DeleteCandidate { .. } if matches!(plan.mode, SyncMode::Sync) => delete_ops.push(op),
            PlannedOp::DeleteCandidate { .. } => {}
            other => transfer_ops.push(other),
        }
    }

    if matches!(plan.mode, SyncMode::Sync) && plan.config.delete_excluded {
        for obj in dst_excluded {
            delete_ops.push(PlannedOp::DeleteCandidate { dst: obj });
        }
    }

    let mut errors = 0u64;

    match plan.config.delete_mode {
        DeleteMode::Before => {
            errors += run_transfer_batch(plan, delete_ops, &bandwidth, same_backend, prefer_move, stats).await;
            errors += run_transfer_batch(plan, transfer_ops, &bandwidth, same_backend, prefer_move, stats).await;
        }
        DeleteMode::During => {
            let mut combined = transfer_ops;
            combined.extend(delete_ops);
            errors += run_transfer_batch(plan, combined, &bandwidth, same_backend, prefer_move, stats).await;
        }
        DeleteMode::After => {
            let transfer_errors =
                run_transfer_batch(plan, transfer_ops, &bandwidth, same_backend, prefer_move, stats).await;
            errors += transfer_errors;
            if transfer_errors == 0 {
                errors += run_transfer_batch(plan, delete_ops, &bandwidth, same_backend, prefer_move, stats).await;
            } else {
                tracing::warn!("skipping deferred deletions: transfer phase reported errors");
            }
        }
    }

    Ok((errors, 0))
}

#[allow(clippy::too_many_arguments)]
async fn run_transfer_batch(
    plan: &SyncPlan,
    ops: Vec<PlannedOp>,
    bandwidth: &BandwidthLimiter,
    same_backend: bool,
    prefer_move: bool,
    stats: &Arc<Stats>,
) -> u64 {
    if ops.is_empty() {
        return 0;
    }
    transfer::run_transferers(
        ops,
        plan.config.transfers,
        plan.src.clone(),
        plan.dst.clone(),
        same_backend,
        prefer_move,
        bandwidth.clone(),
        plan.config.dry_run,
        stats.clone(),
    )
    .await
}

async fn list_objects(backend: &dyn Backend) -> Result<Vec<Object>> {
    let mut stream = backend.list(ListOptions::default()).await?;
    let mut out = Vec::new();
    while let Some(entry) = stream.next().await {
        if let ListEntry::Object(obj) = entry? {
            if obj.storable {
                out.push(obj);
            }
        }
    }
    Ok(out)
}

fn age_of(obj: &Object) -> Option<Duration> {
    match obj.mod_time {
        crate::backend::types::ModTime::Known(t) => (chrono::Utc::now() - t).to_std().ok(),
        crate::backend::types::ModTime::Unknown => None,
    }
}
