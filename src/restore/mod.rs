//! Merge-restore of a decoded snapshot into the local library.
//!
//! Order of work:
//! 1) partition manga into supported / unsupported sources (unsupported are only counted)
//! 2) group supported manga by source and remote content id, coalesce each group
//! 3) categories by name, in one transaction
//! 4) per group, sequentially: manga row, merge links, chapters, category links,
//!    history, tracks
//!
//! A failure inside one group is recorded and the next group proceeds. The
//! cancel token is checked before each group; merges already applied stay.

use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;

use crate::error::SnapshotError;
use crate::metrics::{record_manga_failed, record_manga_restored, record_manga_skipped};
use crate::model::{CategoryRecord, MangaRecord, Snapshot};
use crate::progress::{CancelToken, RestoreProgress};
use crate::registry::{SourceRegistry, TrackerRegistry};
use crate::store::{Category, CategoryId, LibraryStore, MangaId};

pub mod coalesce;
pub mod merge;

use coalesce::{coalesce, group_by_content_id};

/// One manga group that failed; the restore went on without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreItemError {
    pub title: String,
    pub message: String,
}

impl fmt::Display for RestoreItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.title, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    /// Groups merged without an escaping error.
    pub restored: usize,
    /// Manga from unsupported sources.
    pub skipped: usize,
    pub skipped_titles: Vec<String>,
    pub errors: Vec<RestoreItemError>,
    pub categories_restored: usize,
    /// Groups after coalescing.
    pub total: usize,
    /// Stopped early by the cancel token.
    pub cancelled: bool,
}

/// Counters threaded through one restore run.
#[derive(Debug)]
pub struct RestoreSession {
    summary: RestoreSummary,
    index: usize,
}

impl RestoreSession {
    pub fn new(total: usize, skipped_titles: Vec<String>) -> Self {
        Self {
            summary: RestoreSummary {
                skipped: skipped_titles.len(),
                skipped_titles,
                total,
                ..Default::default()
            },
            index: 0,
        }
    }

    /// 1-based position of the group about to be processed.
    pub fn advance(&mut self) -> usize {
        self.index += 1;
        self.index
    }

    pub fn total(&self) -> usize {
        self.summary.total
    }

    pub fn set_categories_restored(&mut self, n: usize) {
        self.summary.categories_restored = n;
    }

    pub fn record_restored(&mut self) {
        self.summary.restored += 1;
        record_manga_restored();
    }

    pub fn record_error(&mut self, title: &str, err: &anyhow::Error) {
        self.summary.errors.push(RestoreItemError {
            title: title.to_string(),
            message: format!("{:#}", err),
        });
        record_manga_failed();
    }

    pub fn mark_cancelled(&mut self) {
        self.summary.cancelled = true;
    }

    pub fn finish(self) -> RestoreSummary {
        self.summary
    }
}

/// Snapshot `order` -> authoritative local category id.
pub type CategoryMap = HashMap<i32, CategoryId>;

pub struct RestoreEngine<'a, R> {
    registry: &'a R,
}

impl<'a, R> RestoreEngine<'a, R>
where
    R: SourceRegistry + TrackerRegistry,
{
    pub fn new(registry: &'a R) -> Self {
        Self { registry }
    }

    /// Merge `snapshot` into `store`.
    ///
    /// Fails only before any manga is touched (empty snapshot, category
    /// transaction). Per-group failures land in the summary.
    pub fn restore<S: LibraryStore>(
        &self,
        store: &mut S,
        snapshot: &Snapshot,
        cancel: &CancelToken,
        progress: &dyn RestoreProgress,
    ) -> Result<RestoreSummary> {
        if !snapshot.is_restorable() {
            return Err(SnapshotError::Invalid("snapshot contains no manga".into()).into());
        }

        let (supported, unsupported): (Vec<MangaRecord>, Vec<MangaRecord>) = snapshot
            .manga
            .iter()
            .cloned()
            .partition(|m| self.registry.is_supported(m.source_id));
        let skipped_titles: Vec<String> = unsupported.into_iter().map(|m| m.title).collect();
        record_manga_skipped(skipped_titles.len());

        let groups: Vec<MangaRecord> = group_by_content_id(supported)
            .into_iter()
            .filter_map(coalesce)
            .collect();

        let mut session = RestoreSession::new(groups.len(), skipped_titles);
        info!(
            "restore: start, manga={}, groups={}, skipped={}, categories={}",
            snapshot.manga.len(),
            groups.len(),
            session.summary.skipped,
            snapshot.categories.len()
        );

        let categories = store
            .transaction(|s| restore_categories(s, &snapshot.categories))
            .context("restore categories")?;
        session.set_categories_restored(snapshot.categories.len());

        for rec in &groups {
            if cancel.is_cancelled() {
                info!(
                    "restore: cancelled after {}/{} group(s)",
                    session.index,
                    session.total()
                );
                session.mark_cancelled();
                break;
            }
            let idx = session.advance();
            progress.advanced(idx, session.total(), &rec.title);

            match self.restore_manga(store, rec, &snapshot.categories, &categories) {
                Ok(id) => {
                    debug!("restore: [{}] '{}' -> manga id={}", idx, rec.title, id);
                    session.record_restored();
                }
                Err(e) => {
                    warn!("restore: '{}' failed: {:#}", rec.title, e);
                    session.record_error(&rec.title, &e);
                }
            }
        }

        let summary = session.finish();
        info!(
            "restore: done, restored={}, errors={}, skipped={}, cancelled={}",
            summary.restored,
            summary.errors.len(),
            summary.skipped,
            summary.cancelled
        );
        Ok(summary)
    }

    fn restore_manga<S: LibraryStore>(
        &self,
        store: &mut S,
        rec: &MangaRecord,
        category_records: &[CategoryRecord],
        categories: &CategoryMap,
    ) -> Result<MangaId> {
        let manga_id = match store.manga_by_url(&rec.url, rec.source_id)? {
            Some(local) => {
                let merged = merge::merge_manga(&local, rec);
                store.update_manga(&merged)?;
                local.id
            }
            None => store.insert_manga(&merge::new_manga(rec))?,
        };

        restore_merge_sources(store, manga_id, rec)?;
        restore_chapters(store, manga_id, rec)?;
        restore_category_links(store, manga_id, rec, category_records, categories)?;
        restore_history(store, manga_id, rec)?;
        self.restore_tracks(store, manga_id, rec)?;
        Ok(manga_id)
    }

    fn restore_tracks<S: LibraryStore>(
        &self,
        store: &mut S,
        manga_id: MangaId,
        rec: &MangaRecord,
    ) -> Result<()> {
        let mut local = store.tracks(manga_id)?;
        for t in &rec.tracking {
            if !self.registry.is_valid_tracker(t.service_id) {
                debug!("restore: '{}' ignoring unknown tracker {}", rec.title, t.service_id);
                continue;
            }
            match local.iter_mut().find(|l| l.service_id == t.service_id) {
                Some(existing) => {
                    let merged = merge::merge_track(existing, t);
                    if merged != *existing {
                        store.update_track(&merged)?;
                        *existing = merged;
                    }
                }
                None => {
                    let mut row = merge::new_track(manga_id, t);
                    row.id = store
                        .insert_track(&row)
                        .with_context(|| format!("insert track service={}", t.service_id))?;
                    local.push(row);
                }
            }
        }
        Ok(())
    }
}

/// Reuse local categories by exact name, insert the rest.
fn restore_categories<S: LibraryStore>(store: &mut S, records: &[CategoryRecord]) -> Result<CategoryMap> {
    let mut local: Vec<Category> = store.categories()?;
    let mut map = CategoryMap::new();
    for rec in records {
        let id = match local.iter().find(|c| c.name == rec.name) {
            Some(c) => c.id,
            None => {
                let mut row = Category {
                    id: 0,
                    name: rec.name.clone(),
                    order: rec.order,
                    flags: rec.flags,
                };
                row.id = store
                    .insert_category(&row)
                    .with_context(|| format!("insert category '{}'", rec.name))?;
                debug!("restore: category '{}' created id={}", row.name, row.id);
                let id = row.id;
                local.push(row);
                id
            }
        };
        // the first record with a given order owns it
        map.entry(rec.order).or_insert(id);
    }
    Ok(map)
}

/// First link per merge type wins.
fn restore_merge_sources<S: LibraryStore>(store: &mut S, manga_id: MangaId, rec: &MangaRecord) -> Result<()> {
    let mut local = store.merge_sources(manga_id)?;
    for m in &rec.merge_sources {
        if local.iter().any(|l| l.merge_type == m.merge_type) {
            continue;
        }
        let mut row = merge::new_merge_source(manga_id, m);
        row.id = store.insert_merge_source(&row)?;
        local.push(row);
    }
    Ok(())
}

fn restore_chapters<S: LibraryStore>(store: &mut S, manga_id: MangaId, rec: &MangaRecord) -> Result<()> {
    let mut local = store.chapters(manga_id)?;
    for ch in &rec.chapters {
        match local.iter_mut().find(|l| l.url == ch.url) {
            Some(existing) => {
                let merged = merge::merge_chapter(existing, ch);
                if merged != *existing {
                    store.update_chapter(&merged)?;
                    *existing = merged;
                }
            }
            None => {
                let mut row = merge::new_chapter(manga_id, ch);
                row.id = store
                    .insert_chapter(&row)
                    .with_context(|| format!("insert chapter '{}'", ch.name))?;
                local.push(row);
            }
        }
    }
    Ok(())
}

/// Replace the manga's category links when at least one order resolves.
fn restore_category_links<S: LibraryStore>(
    store: &mut S,
    manga_id: MangaId,
    rec: &MangaRecord,
    category_records: &[CategoryRecord],
    categories: &CategoryMap,
) -> Result<()> {
    let mut ids: Vec<CategoryId> = Vec::with_capacity(rec.categories.len());
    for order in &rec.categories {
        if !category_records.iter().any(|c| c.order == *order) {
            debug!("restore: '{}' category order {} not in snapshot", rec.title, order);
            continue;
        }
        if let Some(&id) = categories.get(order) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    if ids.is_empty() {
        return Ok(());
    }
    store.set_manga_categories(manga_id, &ids)
}

/// History rows only exist for chapters present locally.
fn restore_history<S: LibraryStore>(store: &mut S, manga_id: MangaId, rec: &MangaRecord) -> Result<()> {
    if rec.history.is_empty() {
        return Ok(());
    }
    let chapters = store.chapters(manga_id)?;
    for h in &rec.history {
        let chapter = match chapters.iter().find(|c| c.url == h.chapter_url) {
            Some(c) => c,
            None => {
                debug!("restore: '{}' history for unknown chapter {}", rec.title, h.chapter_url);
                continue;
            }
        };
        match store.history_for_chapter(chapter.id)? {
            Some(existing) => {
                let merged = merge::merge_history(&existing, h);
                if merged != existing {
                    store.update_history(&merged)?;
                }
            }
            None => {
                store.insert_history(&merge::new_history(chapter.id, h))?;
            }
        }
    }
    Ok(())
}
