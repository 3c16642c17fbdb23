//! The transfer scheduler: a Checker pool that evaluates the equality
//! oracle per pair, and a Transferer pool that executes the resulting
//! plan. Both pools are `ConcurrencyLimiter`-gated and run their work as
//! spawned tasks joined through a `tokio::task::JoinSet` — a
//! bounded-channel-fed pipeline for scheduling a whole tree of transfers
//! rather than dispatching one file at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::io::StreamReader;

use crate::backend::types::{ModTime, Object, Precision};
use crate::backend::Backend;
use crate::core::bandwidth::{BandwidthLimiter, ThrottledReader};
use crate::core::concurrency::ConcurrencyLimiter;
use crate::core::equality::{self, CompareMode, EqualityVerdict};
use crate::core::pair::Pair;
use crate::core::stats::Stats;
use crate::hash::HashKind;

/// A pair classified by the checker stage.
#[derive(Debug, Clone)]
pub enum PlannedOp {
    /// Source and destination already agree; nothing to do.
    Noop,
    /// Copy `src` to `remote` (destination absent, or content differs).
    Transfer { remote: String, src: Object },
    /// Content already matches; only the destination's mtime needs repair.
    FixModTime { remote: String, mod_time: ModTime },
    /// Destination-only entry, candidate for removal.
    DeleteCandidate { dst: Object },
}

/// Fetch `kind`'s hash for `obj` through `backend`, when the object didn't
/// already carry one from its listing. `LocalBackend` (and most real
/// adapters) never compute a hash while walking a tree — only on request —
/// so the checker stage fetches one lazily rather than the equality oracle
/// ever seeing an object's hash map as authoritative-but-empty: `Hash(kind)`
/// is a per-Object operation, not a listing side effect.
async fn lazy_hash(obj: &Object, backend: &dyn Backend, kind: HashKind) -> Option<String> {
    if let Some(existing) = obj.hash(kind) {
        return Some(existing.to_string());
    }
    let stream = backend.open(&obj.remote).await.ok()?;
    crate::hash::hash_async_stream(kind, stream).await.ok()
}

/// Before consulting the equality oracle, see whether fetching a common
/// hash could resolve a branch the oracle can't answer from pre-populated
/// data alone: `--checksum` mode always wants one when sizes agree; the
/// default mode wants one only to upgrade a same-content, stale-mtime pair
/// into a mtime-repair instead of a re-transfer. Mutates `pair` in place
/// when a hash was fetched.
async fn attach_lazy_hash(
    pair: &mut Pair,
    mode: CompareMode,
    src_backend: &dyn Backend,
    dst_backend: &dyn Backend,
    src_precision: Precision,
    dst_precision: Precision,
    modify_window: Duration,
) {
    let (Some(src), Some(dst)) = (pair.src.as_ref(), pair.dst.as_ref()) else {
        return;
    };
    if src.size != dst.size {
        return;
    }

    let worth_trying = match mode {
        CompareMode::Checksum => true,
        CompareMode::Default => {
            !equality::sizes_and_mtimes_match(src, dst, src_precision, dst_precision, modify_window)
        }
        CompareMode::IgnoreExisting | CompareMode::SizeOnly => false,
    };
    if !worth_trying {
        return;
    }

    let common = src_backend.hashes().intersect(&dst_backend.hashes());
    let Some(kind) = common.preferred() else {
        return;
    };
    if src.hash(kind).is_some() && dst.hash(kind).is_some() {
        return;
    }

    let (src_digest, dst_digest) = tokio::join!(
        lazy_hash(src, src_backend, kind),
        lazy_hash(dst, dst_backend, kind),
    );
    if let (Some(a), Some(b)) = (src_digest, dst_digest) {
        pair.src = pair.src.take().map(|o| o.with_hash(kind, a));
        pair.dst = pair.dst.take().map(|o| o.with_hash(kind, b));
    }
}

/// Checker stage: evaluate the equality oracle for one pair.
/// Pairs with only one side present never reach the oracle — a source-only
/// pair is an unconditional transfer, a destination-only pair an
/// unconditional deletion candidate.
pub fn classify(
    pair: Pair,
    mode: CompareMode,
    src_precision: Precision,
    dst_precision: Precision,
    modify_window: Duration,
) -> PlannedOp {
    match (pair.src, pair.dst) {
        (Some(src), Some(dst)) => {
            match equality::decide(&src, &dst, mode, src_precision, dst_precision, modify_window) {
                EqualityVerdict::Equal => PlannedOp::Noop,
                EqualityVerdict::Transfer => PlannedOp::Transfer { remote: pair.remote, src },
                EqualityVerdict::EqualFixModTime => PlannedOp::FixModTime {
                    remote: dst.remote.clone(),
                    mod_time: src.mod_time,
                },
            }
        }
        (Some(src), None) => PlannedOp::Transfer { remote: pair.remote, src },
        (None, Some(dst)) => PlannedOp::DeleteCandidate { dst },
        (None, None) => PlannedOp::Noop,
    }
}

/// Run the checker pool over `pairs`, bounded by `checkers` concurrent
/// evaluations, and return every non-`Noop` classification. `src`/`dst`
/// back the lazy same-content hash fetch described above; they are not
/// otherwise mutated.
#[allow(clippy::too_many_arguments)]
pub async fn run_checkers(
    pairs: Vec<Pair>,
    checkers: usize,
    mode: CompareMode,
    src: Arc<dyn Backend>,
    dst: Arc<dyn Backend>,
    modify_window: Duration,
    stats: &Arc<Stats>,
) -> Vec<PlannedOp> {
    let limiter = ConcurrencyLimiter::new(checkers);
    let mut set = tokio::task::JoinSet::new();
    let src_precision = src.precision();
    let dst_precision = dst.precision();

    for pair in pairs {
        let limiter = limiter.clone();
        let stats = stats.clone();
        let src = src.clone();
        let dst = dst.clone();
        set.spawn(async move {
            let _permit = limiter.acquire().await;
            let mut pair = pair;
            attach_lazy_hash(
                &mut pair,
                mode,
                src.as_ref(),
                dst.as_ref(),
                src_precision,
                dst_precision,
                modify_window,
            )
            .await;
            stats.record_check();
            classify(pair, mode, src_precision, dst_precision, modify_window)
        });
    }

    let mut out = Vec::new();
    while let Some(res) = set.join_next().await {
        match res {
            Ok(op) if !matches!(op, PlannedOp::Noop) => out.push(op),
            Ok(_) => {}
            Err(join_err) => tracing::warn!(error = %join_err, "checker task panicked"),
        }
    }
    out
}

/// Transferer stage: execute one planned operation. When source and
/// destination share a backend identity, prefers a native server-side
/// `Mover` (in move mode) or `Copier` over the generic path; otherwise
/// opens the source, wraps the reader in the bandwidth limiter, and pipes
/// into `Put`. In move mode, a successful native move has already removed
/// the source; the generic fallback path removes it explicitly afterward.
#[allow(clippy::too_many_arguments)]
pub async fn execute(
    op: PlannedOp,
    src: &dyn Backend,
    dst: &dyn Backend,
    same_backend: bool,
    prefer_move: bool,
    bandwidth: &BandwidthLimiter,
    dry_run: bool,
    stats: &Arc<Stats>,
) -> crate::error::Result<()> {
    match op {
        PlannedOp::Noop => Ok(()),

        PlannedOp::FixModTime { remote, mod_time } => {
            if dry_run {
                tracing::info!(remote, "dry-run: would fix mod time");
                return Ok(());
            }
            dst.set_mod_time(&remote, mod_time).await?;
            Ok(())
        }

        PlannedOp::Transfer { remote, src: src_obj } => {
            if dry_run {
                tracing::info!(remote, size = src_obj.size, "dry-run: would transfer");
                stats.record_transfer();
                return Ok(());
            }

            if same_backend {
                if prefer_move {
                    if let Some(mover) = src.as_mover() {
                        match mover.move_object(&src_obj.remote, dst.root(), &remote).await {
                            Ok(_) => {
                                stats.record_transfer();
                                return Ok(());
                            }
                            Err(e) if e.is_capability_mismatch() => {
                                // fall through to the generic open+put path
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                } else if let Some(copier) = src.as_copier() {
                    match copier.copy(&src_obj.remote, dst.root(), &remote).await {
                        Ok(_) => {
                            stats.record_transfer();
                            return Ok(());
                        }
                        Err(e) if e.is_capability_mismatch() => {
                            // fall through to the generic open+put path
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            stats.begin_transfer(remote.clone(), src_obj.size);
            let reader = src.open(&src_obj.remote).await?;

            let progress = Arc::new(AtomicU64::new(0));
            let stats_sink = stats.clone();
            let remote_sink = remote.clone();
            let progress_sink = progress.clone();

            let throttled = ThrottledReader::new(StreamReader::new(reader), bandwidth.clone())
                .with_stats_sink(Arc::new(move |n| {
                    stats_sink.add_bytes(n);
                    let total = progress_sink.fetch_add(n, Ordering::Relaxed) + n;
                    stats_sink.advance_transfer(&remote_sink, total);
                }));

            let result = dst.put(Box::new(throttled), &remote, src_obj.mod_time, src_obj.size).await;
            stats.finish_transfer(&remote);
            result?;
            stats.record_transfer();

            if prefer_move {
                src.remove(&src_obj.remote).await?;
            }
            Ok(())
        }

        PlannedOp::DeleteCandidate { dst: dst_obj } => {
            if dry_run {
                tracing::info!(remote = %dst_obj.remote, "dry-run: would delete");
                stats.record_delete();
                return Ok(());
            }
            dst.remove(&dst_obj.remote).await?;
            stats.record_delete();
            Ok(())
        }
    }
}

/// Run the transferer pool over `ops`, bounded by `transfers` concurrent
/// executions, and return the number of operations that failed.
#[allow(clippy::too_many_arguments)]
pub async fn run_transferers(
    ops: Vec<PlannedOp>,
    transfers: usize,
    src: Arc<dyn Backend>,
    dst: Arc<dyn Backend>,
    same_backend: bool,
    prefer_move: bool,
    bandwidth: BandwidthLimiter,
    dry_run: bool,
    stats: Arc<Stats>,
) -> u64 {
    let limiter = ConcurrencyLimiter::new(transfers);
    let mut set = tokio::task::JoinSet::new();

    for op in ops {
        let limiter = limiter.clone();
        let src = src.clone();
        let dst = dst.clone();
        let bandwidth = bandwidth.clone();
        let stats = stats.clone();
        set.spawn(async move {
            let _permit = limiter.acquire().await;
            execute(
                op,
                src.as_ref(),
                dst.as_ref(),
                same_backend,
                prefer_move,
                &bandwidth,
                dry_run,
                &stats,
            )
            .await
        });
    }

    let mut errors = 0u64;
    while let Some(res) = set.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "transfer failed");
                stats.record_error();
                errors += 1;
            }
            Err(join_err) => {
                tracing::warn!(error = %join_err, "transfer task panicked");
                stats.record_error();
                errors += 1;
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::ModTime;

    fn obj(remote: &str, size: i64) -> Object {
        Object::new(remote, size, ModTime::Unknown)
    }

    #[test]
    fn source_only_pair_is_always_a_transfer() {
        let pair = Pair {
            remote: "a.txt".into(),
            src: Some(obj("a.txt", 5)),
            dst: None,
        };
        let op = classify(pair, CompareMode::Default, Precision::NotSupported, Precision::NotSupported, Duration::ZERO);
        assert!(matches!(op, PlannedOp::Transfer { .. }));
    }

    #[test]
    fn destination_only_pair_is_a_deletion_candidate() {
        let pair = Pair {
            remote: "stale.txt".into(),
            src: None,
            dst: Some(obj("stale.txt", 5)),
        };
        let op = classify(pair, CompareMode::Default, Precision::NotSupported, Precision::NotSupported, Duration::ZERO);
        assert!(matches!(op, PlannedOp::DeleteCandidate { .. }));
    }

    #[test]
    fn equal_sizes_under_size_only_mode_produce_noop() {
        let pair = Pair {
            remote: "a.txt".into(),
            src: Some(obj("a.txt", 5)),
            dst: Some(obj("a.txt", 5)),
        };
        let op = classify(pair, CompareMode::SizeOnly, Precision::NotSupported, Precision::NotSupported, Duration::ZERO);
        assert!(matches!(op, PlannedOp::Noop));
    }

    #[tokio::test]
    async fn checker_pool_filters_out_noops() {
        use crate::backend::LocalBackend;

        let stats = Stats::new();
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let src: Arc<dyn Backend> = Arc::new(LocalBackend::new(src_dir.path()));
        let dst: Arc<dyn Backend> = Arc::new(LocalBackend::new(dst_dir.path()));

        let pairs = vec![
            Pair { remote: "same.txt".into(), src: Some(obj("same.txt", 1)), dst: Some(obj("same.txt", 1)) },
            Pair { remote: "new.txt".into(), src: Some(obj("new.txt", 1)), dst: None },
        ];
        let ops = run_checkers(pairs, 4, CompareMode::SizeOnly, src, dst, Duration::ZERO, &stats).await;
        assert_eq!(ops.len(), 1);
        assert_eq!(stats.checks(), 2);
    }

    #[tokio::test]
    async fn checker_pool_fetches_common_hash_to_repair_stale_mtime() {
        use crate::backend::LocalBackend;

        let stats = Stats::new();
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(src_dir.path().join("a.txt"), b"identical payload").await.unwrap();
        tokio::fs::write(dst_dir.path().join("a.txt"), b"identical payload").await.unwrap();

        let src: Arc<dyn Backend> = Arc::new(LocalBackend::new(src_dir.path()));
        let dst: Arc<dyn Backend> = Arc::new(LocalBackend::new(dst_dir.path()));

        // Same content, same size, but mtimes far enough apart to miss the
        // modify window: the checker should fetch a common hash on demand
        // and request a mtime repair rather than a re-transfer.
        let old = chrono::Utc::now() - chrono::Duration::hours(2);
        let new = chrono::Utc::now();
        let src_obj = Object::new("a.txt", 18, ModTime::known(new));
        let dst_obj = Object::new("a.txt", 18, ModTime::known(old));
        let pairs = vec![Pair { remote: "a.txt".into(), src: Some(src_obj), dst: Some(dst_obj) }];

        let ops = run_checkers(pairs, 4, CompareMode::Default, src, dst, Duration::from_secs(1), &stats).await;
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], PlannedOp::FixModTime { .. }));
    }
}
