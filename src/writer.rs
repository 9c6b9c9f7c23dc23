//! Snapshot writer.
//!
//! Reads the local library, assembles a [`Snapshot`] according to the
//! inclusion flags, writes it through the codec and immediately re-validates
//! the written file.
//!
//! Flow:
//! 1) base set = favorites (+ read-but-not-in-library with READ_MANGA); empty => NoLibraryData
//! 2) per manga: chapters / categories / tracking / history by flag, merge links always
//! 3) all local categories, regardless of flags
//! 4) truncate-write, re-open, validate; on any failure the file is deleted
//! 5) automatic destination only: prune older snapshots beyond the retention cap

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::codec::{self, naming};
use crate::config::SnapConfig;
use crate::error::SnapshotError;
use crate::metrics::{record_snapshot_pruned, record_snapshot_written};
use crate::model::{
    BackupFlags, CategoryRecord, ChapterRecord, HistoryRecord, MangaRecord, MergeSourceRecord,
    Snapshot, TrackRecord,
};
use crate::progress::BackupProgress;
use crate::registry::{SourceRegistry, TrackerRegistry};
use crate::storage::SnapshotStorage;
use crate::store::{Category, Chapter, LibraryStore, Manga, MergeSource, Track};
use crate::validator::{self, ValidationReport};

/// Where a snapshot goes.
#[derive(Debug, Clone)]
pub enum Destination<H> {
    /// A user-chosen file; written as is, never pruned.
    Explicit(H),
    /// Scheduled snapshot: a generated name inside the automatic sub-directory
    /// of this base directory, with retention applied afterwards.
    Automatic(H),
}

#[derive(Debug, Clone)]
pub struct WriteOutcome<H> {
    pub handle: H,
    /// Compressed bytes written.
    pub bytes: usize,
    pub manga_count: usize,
    pub category_count: usize,
    /// Older scheduled snapshots deleted by retention.
    pub pruned: Vec<H>,
    pub validation: ValidationReport,
}

pub struct SnapshotWriter<'a, St, R> {
    storage: &'a St,
    registry: &'a R,
    config: &'a SnapConfig,
}

impl<'a, St, R> SnapshotWriter<'a, St, R>
where
    St: SnapshotStorage,
    R: SourceRegistry + TrackerRegistry,
{
    pub fn new(storage: &'a St, registry: &'a R, config: &'a SnapConfig) -> Self {
        Self {
            storage,
            registry,
            config,
        }
    }

    /// Create a snapshot of `store` at `dest`.
    pub fn write<L: LibraryStore>(
        &self,
        store: &L,
        flags: BackupFlags,
        dest: &Destination<St::Handle>,
        progress: &dyn BackupProgress,
    ) -> Result<WriteOutcome<St::Handle>> {
        progress.started();
        match self.write_inner(store, flags, dest) {
            Ok(out) => {
                progress.finished(&out.handle.to_string());
                Ok(out)
            }
            Err(e) => {
                progress.failed(&format!("{:#}", e));
                Err(e)
            }
        }
    }

    fn write_inner<L: LibraryStore>(
        &self,
        store: &L,
        flags: BackupFlags,
        dest: &Destination<St::Handle>,
    ) -> Result<WriteOutcome<St::Handle>> {
        let snapshot = build_snapshot(store, flags)?;

        let (handle, auto_dir) = match dest {
            Destination::Explicit(h) => (h.clone(), None),
            Destination::Automatic(base) => {
                let dir = self
                    .storage
                    .subdir(base, &self.config.automatic_dir_name)
                    .context("prepare automatic snapshot directory")?;
                let h = self.storage.child(&dir, &naming::snapshot_filename());
                (h, Some(dir))
            }
        };

        info!(
            "backup: start, dest={}, flags={}, manga={}, categories={}",
            handle,
            flags,
            snapshot.manga.len(),
            snapshot.categories.len()
        );

        let (bytes, validation) = match self.write_and_validate(&snapshot, &handle) {
            Ok(v) => v,
            Err(e) => {
                if let Err(de) = self.storage.delete(&handle) {
                    warn!("backup: could not delete partial snapshot {}: {:#}", handle, de);
                }
                return Err(e);
            }
        };
        record_snapshot_written(bytes);

        let pruned = match &auto_dir {
            Some(dir) => self.apply_retention(dir, &handle),
            None => Vec::new(),
        };

        info!(
            "backup: done, dest={}, bytes={}, pruned={}",
            handle,
            bytes,
            pruned.len()
        );

        Ok(WriteOutcome {
            handle,
            bytes,
            manga_count: snapshot.manga.len(),
            category_count: snapshot.categories.len(),
            pruned,
            validation,
        })
    }

    fn write_and_validate(
        &self,
        snapshot: &Snapshot,
        handle: &St::Handle,
    ) -> Result<(usize, ValidationReport)> {
        let bytes = {
            let mut w = self.storage.open_write(handle)?;
            codec::write_snapshot(&mut w, snapshot, self.config.compression_level)
                .with_context(|| format!("write snapshot {}", handle))?
        };
        let report = validator::validate(self.storage, handle, self.registry)?;
        Ok((bytes, report))
    }

    /// Keep the newest `retention_cap` snapshots (the new one included) in `dir`.
    /// Best effort: failures are logged, never surfaced.
    fn apply_retention(&self, dir: &St::Handle, newest: &St::Handle) -> Vec<St::Handle> {
        let newest_name = newest.to_string();
        let listed = match self.storage.list(dir, &naming::is_snapshot_filename) {
            Ok(v) => v,
            Err(e) => {
                warn!("backup: retention skipped, cannot list {}: {:#}", dir, e);
                return Vec::new();
            }
        };

        let mut older: Vec<_> = listed
            .into_iter()
            .filter(|(_, h)| h.to_string() != newest_name)
            .filter_map(|(name, h)| naming::parse_snapshot_filename(&name).map(|ts| (ts, h)))
            .collect();
        older.sort_by(|a, b| b.0.cmp(&a.0));

        let keep = self.config.retention_cap.saturating_sub(1);
        let mut pruned = Vec::new();
        for (_, h) in older.into_iter().skip(keep) {
            match self.storage.delete(&h) {
                Ok(()) => {
                    debug!("backup: pruned {}", h);
                    record_snapshot_pruned();
                    pruned.push(h);
                }
                Err(e) => warn!("backup: could not prune {}: {:#}", h, e),
            }
        }
        pruned
    }
}

/// Assemble the snapshot for `flags` without touching any storage.
pub fn build_snapshot<L: LibraryStore>(store: &L, flags: BackupFlags) -> Result<Snapshot> {
    let mut base = store.favorite_manga().context("load favorite manga")?;
    if flags.read_manga() {
        base.extend(
            store
                .read_manga_not_in_library()
                .context("load read manga outside the library")?,
        );
    }
    if base.is_empty() {
        return Err(SnapshotError::NoLibraryData.into());
    }

    let mut manga = Vec::with_capacity(base.len());
    for m in &base {
        let rec = manga_record(store, m, flags)
            .with_context(|| format!("collect manga '{}' ({})", m.title, m.url))?;
        manga.push(rec);
    }

    let categories = store
        .categories()
        .context("load categories")?
        .iter()
        .map(category_record)
        .collect();

    Ok(Snapshot::new(manga, categories))
}

fn manga_record<L: LibraryStore>(store: &L, m: &Manga, flags: BackupFlags) -> Result<MangaRecord> {
    let mut rec = MangaRecord {
        source_id: m.source_id,
        url: m.url.clone(),
        title: m.title.clone(),
        author: m.author.clone(),
        artist: m.artist.clone(),
        description: m.description.clone(),
        genres: m.genres.clone(),
        status: m.status,
        content_rating: m.content_rating,
        thumbnail_url: m.thumbnail_url.clone(),
        user_cover: m.user_cover.clone(),
        user_title: m.user_title.clone(),
        favorite: m.favorite,
        date_added: m.date_added,
        viewer_flags: m.viewer_flags,
        chapter_flags: m.chapter_flags,
        ..Default::default()
    };

    if flags.chapters() {
        rec.chapters = store.chapters(m.id)?.iter().map(chapter_record).collect();
    }
    if flags.categories() {
        rec.categories = store
            .categories_for_manga(m.id)?
            .iter()
            .map(|c| c.order)
            .collect();
    }
    if flags.tracking() {
        rec.tracking = store.tracks(m.id)?.iter().map(track_record).collect();
    }
    if flags.history() {
        for h in store.history_for_manga(m.id)? {
            // history is keyed by chapter url in the snapshot
            match store.chapter(h.chapter_id)? {
                Some(ch) => rec.history.push(HistoryRecord {
                    chapter_url: ch.url,
                    last_read: h.last_read,
                    read_duration: h.time_read,
                }),
                None => debug!("backup: history {} points at missing chapter {}", h.id, h.chapter_id),
            }
        }
    }
    rec.merge_sources = store.merge_sources(m.id)?.iter().map(merge_record).collect();

    Ok(rec)
}

fn chapter_record(c: &Chapter) -> ChapterRecord {
    ChapterRecord {
        url: c.url.clone(),
        name: c.name.clone(),
        scanlator: c.scanlator.clone(),
        read: c.read,
        bookmark: c.bookmark,
        last_page_read: c.last_page_read,
        chapter_number: c.chapter_number,
        source_order: c.source_order,
        date_fetch: c.date_fetch,
        date_upload: c.date_upload,
    }
}

fn track_record(t: &Track) -> TrackRecord {
    TrackRecord {
        service_id: t.service_id,
        media_id: t.media_id,
        library_id: t.library_id,
        title: t.title.clone(),
        last_chapter_read: t.last_chapter_read,
        total_chapters: t.total_chapters,
        score: t.score,
        status: t.status,
        tracking_url: t.tracking_url.clone(),
    }
}

fn category_record(c: &Category) -> CategoryRecord {
    CategoryRecord {
        name: c.name.clone(),
        order: c.order,
        flags: c.flags,
    }
}

fn merge_record(m: &MergeSource) -> MergeSourceRecord {
    MergeSourceRecord {
        merge_type: m.merge_type,
        url: m.url.clone(),
        title: m.title.clone(),
        cover_url: m.cover_url.clone(),
    }
}
