//! In-memory library tables.
//!
//! Constraints enforced on write (a violation is an `Err`, nothing is changed):
//! - manga: non-empty url, unique (source_id, url)
//! - chapter: non-empty url, existing manga, unique (manga_id, url)
//! - category: non-empty name, unique name
//! - category link: existing manga and categories
//! - track: existing manga, unique (manga_id, service_id)
//! - history: existing chapter, unique chapter_id
//! - merge link: existing manga, unique (manga_id, merge_type)
//!
//! Transactions clone the tables and restore them on error.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{
    Category, CategoryId, Chapter, ChapterId, History, LibraryStore, Manga, MangaId, MergeSource,
    Track,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    next_id: i64,
    manga: BTreeMap<i64, Manga>,
    chapters: BTreeMap<i64, Chapter>,
    categories: BTreeMap<i64, Category>,
    manga_categories: BTreeSet<(MangaId, CategoryId)>,
    tracks: BTreeMap<i64, Track>,
    history: BTreeMap<i64, History>,
    merge_sources: BTreeMap<i64, MergeSource>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn manga(&self, id: MangaId) -> Option<&Manga> {
        self.manga.get(&id)
    }

    pub fn manga_count(&self) -> usize {
        self.manga.len()
    }

    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    fn require_manga(&self, id: MangaId) -> Result<()> {
        if self.manga.contains_key(&id) {
            Ok(())
        } else {
            Err(anyhow!("manga id={} does not exist", id))
        }
    }
}

impl LibraryStore for MemoryStore {
    fn favorite_manga(&self) -> Result<Vec<Manga>> {
        Ok(self.manga.values().filter(|m| m.favorite).cloned().collect())
    }

    fn read_manga_not_in_library(&self) -> Result<Vec<Manga>> {
        let read_ids: BTreeSet<MangaId> = self
            .chapters
            .values()
            .filter(|c| c.read)
            .map(|c| c.manga_id)
            .collect();
        Ok(self
            .manga
            .values()
            .filter(|m| !m.favorite && read_ids.contains(&m.id))
            .cloned()
            .collect())
    }

    fn manga_by_url(&self, url: &str, source_id: i64) -> Result<Option<Manga>> {
        Ok(self
            .manga
            .values()
            .find(|m| m.url == url && m.source_id == source_id)
            .cloned())
    }

    fn insert_manga(&mut self, manga: &Manga) -> Result<MangaId> {
        if manga.url.is_empty() {
            return Err(anyhow!("manga '{}' has an empty url", manga.title));
        }
        if self.manga_by_url(&manga.url, manga.source_id)?.is_some() {
            return Err(anyhow!(
                "manga (source={}, url={}) already exists",
                manga.source_id,
                manga.url
            ));
        }
        let id = self.alloc_id();
        let mut row = manga.clone();
        row.id = id;
        self.manga.insert(id, row);
        Ok(id)
    }

    fn update_manga(&mut self, manga: &Manga) -> Result<()> {
        let clash = self
            .manga
            .values()
            .any(|m| m.id != manga.id && m.url == manga.url && m.source_id == manga.source_id);
        if clash {
            return Err(anyhow!("update would duplicate manga url {}", manga.url));
        }
        let slot = self
            .manga
            .get_mut(&manga.id)
            .ok_or_else(|| anyhow!("manga id={} does not exist", manga.id))?;
        *slot = manga.clone();
        Ok(())
    }

    fn chapters(&self, manga_id: MangaId) -> Result<Vec<Chapter>> {
        Ok(self
            .chapters
            .values()
            .filter(|c| c.manga_id == manga_id)
            .cloned()
            .collect())
    }

    fn chapter(&self, chapter_id: ChapterId) -> Result<Option<Chapter>> {
        Ok(self.chapters.get(&chapter_id).cloned())
    }

    fn insert_chapter(&mut self, chapter: &Chapter) -> Result<ChapterId> {
        if chapter.url.is_empty() {
            return Err(anyhow!("chapter '{}' has an empty url", chapter.name));
        }
        self.require_manga(chapter.manga_id)?;
        let dup = self
            .chapters
            .values()
            .any(|c| c.manga_id == chapter.manga_id && c.url == chapter.url);
        if dup {
            return Err(anyhow!("chapter url {} already exists", chapter.url));
        }
        let id = self.alloc_id();
        let mut row = chapter.clone();
        row.id = id;
        self.chapters.insert(id, row);
        Ok(id)
    }

    fn update_chapter(&mut self, chapter: &Chapter) -> Result<()> {
        let slot = self
            .chapters
            .get_mut(&chapter.id)
            .ok_or_else(|| anyhow!("chapter id={} does not exist", chapter.id))?;
        *slot = chapter.clone();
        Ok(())
    }

    fn categories(&self) -> Result<Vec<Category>> {
        let mut out: Vec<Category> = self.categories.values().cloned().collect();
        out.sort_by_key(|c| (c.order, c.id));
        Ok(out)
    }

    fn insert_category(&mut self, category: &Category) -> Result<CategoryId> {
        if category.name.is_empty() {
            return Err(anyhow!("category name must not be empty"));
        }
        if self.categories.values().any(|c| c.name == category.name) {
            return Err(anyhow!("category '{}' already exists", category.name));
        }
        let id = self.alloc_id();
        let mut row = category.clone();
        row.id = id;
        self.categories.insert(id, row);
        Ok(id)
    }

    fn categories_for_manga(&self, manga_id: MangaId) -> Result<Vec<Category>> {
        let mut out: Vec<Category> = self
            .manga_categories
            .iter()
            .filter(|(m, _)| *m == manga_id)
            .filter_map(|(_, c)| self.categories.get(c).cloned())
            .collect();
        out.sort_by_key(|c| (c.order, c.id));
        Ok(out)
    }

    fn set_manga_categories(&mut self, manga_id: MangaId, category_ids: &[CategoryId]) -> Result<()> {
        self.require_manga(manga_id)?;
        if let Some(missing) = category_ids.iter().find(|id| !self.categories.contains_key(*id)) {
            return Err(anyhow!("category id={} does not exist", missing));
        }
        self.manga_categories.retain(|(m, _)| *m != manga_id);
        for cid in category_ids {
            self.manga_categories.insert((manga_id, *cid));
        }
        Ok(())
    }

    fn tracks(&self, manga_id: MangaId) -> Result<Vec<Track>> {
        Ok(self
            .tracks
            .values()
            .filter(|t| t.manga_id == manga_id)
            .cloned()
            .collect())
    }

    fn insert_track(&mut self, track: &Track) -> Result<i64> {
        self.require_manga(track.manga_id)?;
        let dup = self
            .tracks
            .values()
            .any(|t| t.manga_id == track.manga_id && t.service_id == track.service_id);
        if dup {
            return Err(anyhow!(
                "track for service {} already exists on manga id={}",
                track.service_id,
                track.manga_id
            ));
        }
        let id = self.alloc_id();
        let mut row = track.clone();
        row.id = id;
        self.tracks.insert(id, row);
        Ok(id)
    }

    fn update_track(&mut self, track: &Track) -> Result<()> {
        let slot = self
            .tracks
            .get_mut(&track.id)
            .ok_or_else(|| anyhow!("track id={} does not exist", track.id))?;
        *slot = track.clone();
        Ok(())
    }

    fn history_for_manga(&self, manga_id: MangaId) -> Result<Vec<History>> {
        Ok(self
            .history
            .values()
            .filter(|h| {
                self.chapters
                    .get(&h.chapter_id)
                    .map(|c| c.manga_id == manga_id)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    fn history_for_chapter(&self, chapter_id: ChapterId) -> Result<Option<History>> {
        Ok(self
            .history
            .values()
            .find(|h| h.chapter_id == chapter_id)
            .cloned())
    }

    fn insert_history(&mut self, history: &History) -> Result<i64> {
        if !self.chapters.contains_key(&history.chapter_id) {
            return Err(anyhow!("chapter id={} does not exist", history.chapter_id));
        }
        if self.history_for_chapter(history.chapter_id)?.is_some() {
            return Err(anyhow!("history for chapter id={} already exists", history.chapter_id));
        }
        let id = self.alloc_id();
        let mut row = history.clone();
        row.id = id;
        self.history.insert(id, row);
        Ok(id)
    }

    fn update_history(&mut self, history: &History) -> Result<()> {
        let slot = self
            .history
            .get_mut(&history.id)
            .ok_or_else(|| anyhow!("history id={} does not exist", history.id))?;
        *slot = history.clone();
        Ok(())
    }

    fn merge_sources(&self, manga_id: MangaId) -> Result<Vec<MergeSource>> {
        Ok(self
            .merge_sources
            .values()
            .filter(|m| m.manga_id == manga_id)
            .cloned()
            .collect())
    }

    fn insert_merge_source(&mut self, merge: &MergeSource) -> Result<i64> {
        self.require_manga(merge.manga_id)?;
        let dup = self
            .merge_sources
            .values()
            .any(|m| m.manga_id == merge.manga_id && m.merge_type == merge.merge_type);
        if dup {
            return Err(anyhow!(
                "merge link {:?} already exists on manga id={}",
                merge.merge_type,
                merge.manga_id
            ));
        }
        let id = self.alloc_id();
        let mut row = merge.clone();
        row.id = id;
        self.merge_sources.insert(id, row);
        Ok(id)
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved = self.clone();
        match f(self) {
            Ok(v) => Ok(v),
            Err(e) => {
                *self = saved;
                Err(e)
            }
        }
    }
}
