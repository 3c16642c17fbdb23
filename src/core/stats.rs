//! Live stats aggregator: atomic counters updated from many concurrent
//! workers, with a periodic reporter that renders a human-readable
//! snapshot using the `format_bytes`/`format_duration` helpers from
//! `stats.rs`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::stats::{format_bytes, format_duration};

/// One transfer in flight, tracked for the periodic snapshot.
#[derive(Debug, Clone)]
pub struct InFlightTransfer {
    pub remote: String,
    pub bytes_done: u64,
    pub total_bytes: i64,
    pub started: Instant,
}

impl InFlightTransfer {
    pub fn rate_bytes_per_sec(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            self.bytes_done as f64 / elapsed
        }
    }
}

/// Thread-safe run-wide counters.
pub struct Stats {
    bytes_transferred: AtomicU64,
    checks: AtomicU64,
    transfers: AtomicU64,
    errors: AtomicU64,
    deletes: AtomicU64,
    started: Instant,
    in_flight: Mutex<Vec<InFlightTransfer>>,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            bytes_transferred: AtomicU64::new(0),
            checks: AtomicU64::new(0),
            transfers: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            started: Instant::now(),
            in_flight: Mutex::new(Vec::new()),
        })
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_transferred.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_check(&self) {
        self.checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transfer(&self) {
        self.transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    pub fn transfers(&self) -> u64 {
        self.transfers.load(Ordering::Relaxed)
    }

    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    pub fn begin_transfer(&self, remote: impl Into<String>, total_bytes: i64) {
        self.in_flight.lock().unwrap().push(InFlightTransfer {
            remote: remote.into(),
            bytes_done: 0,
            total_bytes,
            started: Instant::now(),
        });
    }

    pub fn advance_transfer(&self, remote: &str, bytes_done: u64) {
        if let Some(entry) = self
            .in_flight
            .lock()
            .unwrap()
            .iter_mut()
            .find(|t| t.remote == remote)
        {
            entry.bytes_done = bytes_done;
        }
    }

    pub fn finish_transfer(&self, remote: &str) {
        self.in_flight.lock().unwrap().retain(|t| t.remote != remote);
    }

    /// Render a human-readable snapshot: cumulative counters, in-flight
    /// transfers with rate, overall average rate, elapsed time.
    pub fn snapshot(&self) -> String {
        let elapsed = self.started.elapsed();
        let bytes = self.bytes_transferred();
        let avg_rate = if elapsed.as_secs_f64() > 0.0 {
            bytes as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let mut out = format!(
            "Transferred: {} ({}/s), Checks: {}, Transfers: {}, Deletes: {}, Errors: {}, Elapsed: {}\n",
            format_bytes(bytes),
            format_bytes(avg_rate as u64),
            self.checks(),
            self.transfers(),
            self.deletes(),
            self.errors(),
            format_duration(elapsed.as_millis() as u64),
        );

        for entry in self.in_flight.lock().unwrap().iter() {
            let total = if entry.total_bytes >= 0 {
                format_bytes(entry.total_bytes as u64)
            } else {
                "?".to_string()
            };
            out.push_str(&format!(
                " * {}: {}/{}, {}/s\n",
                entry.remote,
                format_bytes(entry.bytes_done),
                total,
                format_bytes(entry.rate_bytes_per_sec() as u64),
            ));
        }

        out
    }
}

/// Spawn the periodic reporter loop: wakes on `interval`, prints a
/// snapshot. `Duration::ZERO` disables reporting entirely.
pub fn spawn_reporter(stats: Arc<Stats>, interval: Duration) -> Option<tokio::task::JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            print!("{}", stats.snapshot());
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_calls() {
        let stats = Stats::new();
        stats.add_bytes(100);
        stats.add_bytes(50);
        stats.record_transfer();
        stats.record_error();

        assert_eq!(stats.bytes_transferred(), 150);
        assert_eq!(stats.transfers(), 1);
        assert_eq!(stats.errors(), 1);
    }

    #[test]
    fn in_flight_transfer_tracks_progress_and_clears_on_finish() {
        let stats = Stats::new();
        stats.begin_transfer("a.txt", 1000);
        stats.advance_transfer("a.txt", 500);

        let snapshot = stats.snapshot();
        assert!(snapshot.contains("a.txt"));

        stats.finish_transfer("a.txt");
        let snapshot = stats.snapshot();
        assert!(!snapshot.contains("a.txt"));
    }

    #[test]
    fn zero_interval_disables_reporter() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let stats = Stats::new();
            let handle = spawn_reporter(stats, Duration::ZERO);
            assert!(handle.is_none());
        });
    }
}
