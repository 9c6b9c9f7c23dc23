//! Coarse health check of a snapshot file.
//!
//! Decodes the file and reports what the user should know before restoring:
//! how many manga it holds, which referenced trackers are installed but not
//! logged in, and whether any manga comes from the primary catalog source.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Serialize;

use crate::codec;
use crate::error::SnapshotError;
use crate::metrics::record_validation_failure;
use crate::model::Snapshot;
use crate::registry::{SourceRegistry, TrackerRegistry};
use crate::storage::SnapshotStorage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingTracker {
    pub service_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub manga_count: usize,
    pub category_count: usize,
    /// Display only; restoring still works without them.
    pub missing_trackers: Vec<MissingTracker>,
    pub references_primary_source: bool,
}

/// Read, decode and inspect the snapshot at `handle`.
pub fn validate<St, R>(storage: &St, handle: &St::Handle, registry: &R) -> Result<ValidationReport>
where
    St: SnapshotStorage,
    R: SourceRegistry + TrackerRegistry,
{
    let res = storage
        .open_read(handle)
        .and_then(|mut r| codec::read_snapshot(&mut r))
        .and_then(|snap| inspect(&snap, registry));
    match res {
        Ok(report) => {
            debug!(
                "validate: {} ok, manga={} missing_trackers={}",
                handle,
                report.manga_count,
                report.missing_trackers.len()
            );
            Ok(report)
        }
        Err(e) => {
            record_validation_failure();
            warn!("validate: {} failed: {:#}", handle, e);
            Err(e).with_context(|| format!("validate snapshot {}", handle))
        }
    }
}

/// Inspect an already decoded snapshot.
pub fn inspect<R>(snapshot: &Snapshot, registry: &R) -> Result<ValidationReport>
where
    R: SourceRegistry + TrackerRegistry,
{
    if !snapshot.is_restorable() {
        return Err(SnapshotError::Invalid("snapshot contains no manga".into()).into());
    }

    let referenced: BTreeSet<i32> = snapshot
        .manga
        .iter()
        .flat_map(|m| m.tracking.iter().map(|t| t.service_id))
        .collect();

    let missing_trackers = referenced
        .into_iter()
        .filter(|&id| registry.is_valid_tracker(id) && !registry.is_logged_in(id))
        .map(|id| MissingTracker {
            service_id: id,
            name: registry.tracker_name(id).unwrap_or_default().to_string(),
        })
        .collect();

    let primary = registry.primary_source_id();
    let references_primary_source = snapshot.manga.iter().any(|m| m.source_id == primary);

    Ok(ValidationReport {
        manga_count: snapshot.manga.len(),
        category_count: snapshot.categories.len(),
        missing_trackers,
        references_primary_source,
    })
}
