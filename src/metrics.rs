//! Lightweight global metrics for shelfsnap.
//!
//! Thread-safe atomic counters for:
//! - Snapshot writing / retention
//! - Validation
//! - Restore

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// ----- Writer -----
static SNAPSHOTS_WRITTEN: AtomicU64 = AtomicU64::new(0);
static SNAPSHOT_BYTES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_PRUNED: AtomicU64 = AtomicU64::new(0);

// ----- Validator -----
static VALIDATION_FAILURES: AtomicU64 = AtomicU64::new(0);

// ----- Restore -----
static RESTORES_STARTED: AtomicU64 = AtomicU64::new(0);
static RESTORES_CANCELLED: AtomicU64 = AtomicU64::new(0);
static MANGA_RESTORED: AtomicU64 = AtomicU64::new(0);
static MANGA_FAILED: AtomicU64 = AtomicU64::new(0);
static MANGA_SKIPPED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Writer
    pub snapshots_written: u64,
    pub snapshot_bytes_written: u64,
    pub snapshots_pruned: u64,

    // Validator
    pub validation_failures: u64,

    // Restore
    pub restores_started: u64,
    pub restores_cancelled: u64,
    pub manga_restored: u64,
    pub manga_failed: u64,
    pub manga_skipped: u64,
}

impl MetricsSnapshot {
    pub fn avg_snapshot_bytes(&self) -> f64 {
        if self.snapshots_written == 0 {
            0.0
        } else {
            self.snapshot_bytes_written as f64 / self.snapshots_written as f64
        }
    }

    /// Share of processed manga groups that ended in an error.
    pub fn restore_failure_ratio(&self) -> f64 {
        let total = self.manga_restored + self.manga_failed;
        if total == 0 {
            0.0
        } else {
            self.manga_failed as f64 / total as f64
        }
    }
}

/// Counters plus derived gauges, as printed by `shelfsnap --metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub avg_snapshot_bytes: f64,
    pub restore_failure_ratio: f64,
}

impl From<MetricsSnapshot> for MetricsReport {
    fn from(counters: MetricsSnapshot) -> Self {
        Self {
            avg_snapshot_bytes: counters.avg_snapshot_bytes(),
            restore_failure_ratio: counters.restore_failure_ratio(),
            counters,
        }
    }
}

// ----- Recorders (Writer) -----
pub fn record_snapshot_written(bytes: usize) {
    SNAPSHOTS_WRITTEN.fetch_add(1, Ordering::Relaxed);
    SNAPSHOT_BYTES_WRITTEN.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub fn record_snapshot_pruned() {
    SNAPSHOTS_PRUNED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Validator) -----
pub fn record_validation_failure() {
    VALIDATION_FAILURES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Restore) -----
pub fn record_restore_started() {
    RESTORES_STARTED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_restore_cancelled() {
    RESTORES_CANCELLED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_manga_restored() {
    MANGA_RESTORED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_manga_failed() {
    MANGA_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_manga_skipped(n: usize) {
    MANGA_SKIPPED.fetch_add(n as u64, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        snapshots_written: SNAPSHOTS_WRITTEN.load(Ordering::Relaxed),
        snapshot_bytes_written: SNAPSHOT_BYTES_WRITTEN.load(Ordering::Relaxed),
        snapshots_pruned: SNAPSHOTS_PRUNED.load(Ordering::Relaxed),

        validation_failures: VALIDATION_FAILURES.load(Ordering::Relaxed),

        restores_started: RESTORES_STARTED.load(Ordering::Relaxed),
        restores_cancelled: RESTORES_CANCELLED.load(Ordering::Relaxed),
        manga_restored: MANGA_RESTORED.load(Ordering::Relaxed),
        manga_failed: MANGA_FAILED.load(Ordering::Relaxed),
        manga_skipped: MANGA_SKIPPED.load(Ordering::Relaxed),
    }
}

pub fn report() -> MetricsReport {
    snapshot().into()
}

pub fn reset() {
    SNAPSHOTS_WRITTEN.store(0, Ordering::Relaxed);
    SNAPSHOT_BYTES_WRITTEN.store(0, Ordering::Relaxed);
    SNAPSHOTS_PRUNED.store(0, Ordering::Relaxed);

    VALIDATION_FAILURES.store(0, Ordering::Relaxed);

    RESTORES_STARTED.store(0, Ordering::Relaxed);
    RESTORES_CANCELLED.store(0, Ordering::Relaxed);
    MANGA_RESTORED.store(0, Ordering::Relaxed);
    MANGA_FAILED.store(0, Ordering::Relaxed);
    MANGA_SKIPPED.store(0, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_gauges() {
        let empty = MetricsReport::from(MetricsSnapshot::default());
        assert_eq!(empty.avg_snapshot_bytes, 0.0);
        assert_eq!(empty.restore_failure_ratio, 0.0);

        let m = MetricsSnapshot {
            snapshots_written: 4,
            snapshot_bytes_written: 1000,
            manga_restored: 9,
            manga_failed: 1,
            ..Default::default()
        };
        let r = MetricsReport::from(m);
        assert_eq!(r.avg_snapshot_bytes, 250.0);
        assert!((r.restore_failure_ratio - 0.1).abs() < 1e-9);

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["snapshots_written"], 4);
        assert_eq!(json["avg_snapshot_bytes"], 250.0);
    }

    // the only unit test touching the global counters
    #[test]
    fn recorders_feed_the_report() {
        reset();
        record_snapshot_written(100);
        record_snapshot_written(300);
        record_manga_restored();
        record_manga_failed();
        record_manga_skipped(2);
        let r = report();
        assert_eq!(r.counters.snapshots_written, 2);
        assert_eq!(r.avg_snapshot_bytes, 200.0);
        assert_eq!(r.counters.manga_skipped, 2);
        assert_eq!(r.restore_failure_ratio, 0.5);
        reset();
        assert_eq!(snapshot().snapshots_written, 0);
    }
}
