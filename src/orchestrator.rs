//! Restore as a long-running, cancellable task.
//!
//! Decodes the snapshot (fatal on failure, nothing is touched), runs the
//! [`RestoreEngine`], writes the plain-text error log when something was
//! skipped or failed and hands back a [`RestoreReport`].

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;

use crate::codec;
use crate::config::SnapConfig;
use crate::error::SnapshotError;
use crate::lock::{try_acquire_lock, LockGuard, LockMode};
use crate::metrics::{record_restore_cancelled, record_restore_started};
use crate::progress::{CancelToken, RestoreProgress};
use crate::registry::{SourceRegistry, TrackerRegistry};
use crate::restore::{RestoreEngine, RestoreSummary};
use crate::storage::SnapshotStorage;
use crate::store::LibraryStore;

/// Whatever the host needs held so the task is not torn down mid-run.
pub trait KeepAlive {
    type Lease;
    fn acquire(&self) -> Result<Self::Lease>;
}

/// Host without any lease requirement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeepAlive;

impl KeepAlive for NoKeepAlive {
    type Lease = ();

    fn acquire(&self) -> Result<()> {
        Ok(())
    }
}

/// Exclusive advisory lock next to `path`; a second restore on the same
/// target fails fast instead of interleaving writes.
#[derive(Debug, Clone)]
pub struct FileLease {
    path: PathBuf,
}

impl FileLease {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl KeepAlive for FileLease {
    type Lease = LockGuard;

    fn acquire(&self) -> Result<LockGuard> {
        try_acquire_lock(&self.path, LockMode::Exclusive)
            .with_context(|| format!("restore lease {}", self.path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub outcome: RestoreOutcome,
    pub summary: RestoreSummary,
    pub elapsed: Duration,
    /// Set when the error log was written.
    pub error_log: Option<PathBuf>,
}

impl RestoreReport {
    pub fn is_cancelled(&self) -> bool {
        self.outcome == RestoreOutcome::Cancelled
    }
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.summary;
        match self.outcome {
            RestoreOutcome::Completed => writeln!(f, "Restore completed in {:.1?}", self.elapsed)?,
            RestoreOutcome::Cancelled => writeln!(f, "Restore cancelled after {:.1?}", self.elapsed)?,
        }
        if s.categories_restored > 0 {
            writeln!(f, "{} categories added", s.categories_restored)?;
        }
        writeln!(f, "Restored {} of {} manga", s.restored, s.total)?;
        writeln!(f, "{} errors", s.errors.len())?;
        if s.skipped > 0 {
            writeln!(
                f,
                "Skipped {} of {} manga from unsupported sources",
                s.skipped,
                s.total + s.skipped
            )?;
        }
        if self.outcome == RestoreOutcome::Cancelled {
            let left = s.total.saturating_sub(s.restored + s.errors.len());
            writeln!(f, "{} manga not processed because the restore was cancelled", left)?;
        }
        if let Some(p) = &self.error_log {
            write!(f, "Error log: {}", p.display())?;
        }
        Ok(())
    }
}

pub struct RestoreTask<'a, St, R> {
    storage: &'a St,
    registry: &'a R,
    config: &'a SnapConfig,
    cancel: CancelToken,
}

impl<'a, St, R> RestoreTask<'a, St, R>
where
    St: SnapshotStorage,
    R: SourceRegistry + TrackerRegistry,
{
    pub fn new(storage: &'a St, registry: &'a R, config: &'a SnapConfig) -> Self {
        Self {
            storage,
            registry,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the task between manga groups.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Restore the snapshot at `handle` into `store`.
    ///
    /// Decode problems and a cancel before any merge started are errors;
    /// a cancel mid-run yields a report with [`RestoreOutcome::Cancelled`].
    pub fn run<S, K>(
        &self,
        store: &mut S,
        handle: &St::Handle,
        keep_alive: &K,
        progress: &dyn RestoreProgress,
    ) -> Result<RestoreReport>
    where
        S: LibraryStore,
        K: KeepAlive,
    {
        record_restore_started();
        let res = self.run_inner(store, handle, keep_alive, progress);
        match &res {
            Ok(report) => progress.completed(report),
            Err(e) => {
                if SnapshotError::of(e) == Some(&SnapshotError::Cancelled) {
                    record_restore_cancelled();
                }
                progress.failed(&format!("{:#}", e));
            }
        }
        res
    }

    fn run_inner<S, K>(
        &self,
        store: &mut S,
        handle: &St::Handle,
        keep_alive: &K,
        progress: &dyn RestoreProgress,
    ) -> Result<RestoreReport>
    where
        S: LibraryStore,
        K: KeepAlive,
    {
        let _lease = keep_alive.acquire()?;
        let started = Instant::now();
        info!("restore: reading {}", handle);

        let snapshot = self
            .storage
            .open_read(handle)
            .and_then(|mut r| codec::read_snapshot(&mut r))
            .with_context(|| format!("read snapshot {}", handle))?;
        if !snapshot.is_restorable() {
            return Err(SnapshotError::Invalid("snapshot contains no manga".into()).into());
        }
        if self.cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled.into());
        }

        let engine = RestoreEngine::new(self.registry);
        let summary = engine.restore(store, &snapshot, &self.cancel, progress)?;
        let elapsed = started.elapsed();

        let path = self.config.error_log_path();
        let error_log = if summary.errors.is_empty() && summary.skipped_titles.is_empty() {
            // a log left by an earlier run must not outlive a clean one
            remove_stale_log(&path);
            None
        } else {
            match write_error_log(&path, &summary) {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!("restore: could not write error log {}: {:#}", path.display(), e);
                    None
                }
            }
        };

        let outcome = if summary.cancelled {
            record_restore_cancelled();
            RestoreOutcome::Cancelled
        } else {
            RestoreOutcome::Completed
        };

        Ok(RestoreReport {
            outcome,
            summary,
            elapsed,
            error_log,
        })
    }
}

fn remove_stale_log(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("restore: removed stale error log {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("restore: could not remove stale error log {}: {}", path.display(), e),
    }
}

/// Skipped titles first, then one `title - message` line per failed group.
pub fn write_error_log(path: &Path, summary: &RestoreSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
    }
    let f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("open error log {}", path.display()))?;
    let mut out = BufWriter::new(f);
    if !summary.skipped_titles.is_empty() {
        writeln!(out, "skipped titles:")?;
        for t in &summary.skipped_titles {
            writeln!(out, "{}", t)?;
        }
    }
    if !summary.errors.is_empty() {
        if !summary.skipped_titles.is_empty() {
            writeln!(out)?;
        }
        writeln!(out, "Errors:")?;
        for e in &summary.errors {
            writeln!(out, "{}", e)?;
        }
    }
    out.flush()?;
    Ok(())
}
