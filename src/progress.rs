//! Progress surface and cooperative cancellation.
//!
//! The writer emits one indeterminate "started" signal and one finish signal;
//! the restore engine reports `(index, total, title)` per manga group and the
//! orchestrator reports the final completion once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};

use crate::orchestrator::RestoreReport;

pub trait BackupProgress {
    fn started(&self) {}
    fn finished(&self, _location: &str) {}
    fn failed(&self, _message: &str) {}
}

pub trait RestoreProgress {
    /// `index` is 1-based and never decreases within one run.
    fn advanced(&self, _index: usize, _total: usize, _title: &str) {}
    fn completed(&self, _report: &RestoreReport) {}
    fn failed(&self, _message: &str) {}
}

/// Discards every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl BackupProgress for NoProgress {}
impl RestoreProgress for NoProgress {}

/// Forwards signals to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl BackupProgress for LogProgress {
    fn started(&self) {
        info!("backup: creating snapshot");
    }

    fn finished(&self, location: &str) {
        info!("backup: snapshot written to {}", location);
    }

    fn failed(&self, message: &str) {
        error!("backup: failed: {}", message);
    }
}

impl RestoreProgress for LogProgress {
    fn advanced(&self, index: usize, total: usize, title: &str) {
        info!("restore: [{}/{}] {}", index, total, title);
    }

    fn completed(&self, report: &RestoreReport) {
        for line in report.to_string().lines() {
            info!("restore: {}", line);
        }
    }

    fn failed(&self, message: &str) {
        error!("restore: failed: {}", message);
    }
}

/// Cooperative cancellation flag shared between the caller and a running task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let t = CancelToken::new();
        let c = t.clone();
        assert!(!c.is_cancelled());
        t.cancel();
        assert!(c.is_cancelled());
    }
}
