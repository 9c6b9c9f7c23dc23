//! store: the local library the snapshot is taken from and restored into.
//!
//! [`LibraryStore`] is the row-level interface the writer and the restore engine
//! consume. Every call is synchronous and completes before returning.
//! `insert_*` ignore the `id` of the passed row and return the assigned id;
//! `update_*` match rows by `id`.
//!
//! Implementations:
//! - [`MemoryStore`]: in-memory tables with relational constraints and atomic transactions.
//! - [`LibraryFile`]: JSON persistence of a `MemoryStore` under an advisory lock.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::model::{ContentRating, MergeType, PublicationStatus};

pub mod file;
pub mod memory;

pub use file::LibraryFile;
pub use memory::MemoryStore;

pub type MangaId = i64;
pub type ChapterId = i64;
pub type CategoryId = i64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manga {
    pub id: MangaId,
    pub source_id: i64,
    pub url: String,
    pub title: String,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub status: PublicationStatus,
    pub content_rating: ContentRating,
    pub thumbnail_url: Option<String>,
    pub user_cover: Option<String>,
    pub user_title: Option<String>,
    pub favorite: bool,
    /// false => details must be re-fetched from the catalog.
    pub initialized: bool,
    pub date_added: i64,
    pub viewer_flags: i32,
    pub chapter_flags: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub manga_id: MangaId,
    pub url: String,
    pub name: String,
    pub scanlator: Option<String>,
    pub read: bool,
    pub bookmark: bool,
    pub last_page_read: i32,
    pub chapter_number: f32,
    pub source_order: i32,
    pub date_fetch: i64,
    pub date_upload: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub order: i32,
    pub flags: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub manga_id: MangaId,
    pub service_id: i32,
    pub media_id: i64,
    pub library_id: Option<i64>,
    pub title: String,
    pub last_chapter_read: f32,
    pub total_chapters: i32,
    pub score: f32,
    pub status: i32,
    pub tracking_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    pub id: i64,
    pub chapter_id: ChapterId,
    pub last_read: i64,
    pub time_read: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSource {
    pub id: i64,
    pub manga_id: MangaId,
    pub merge_type: MergeType,
    pub url: String,
    pub title: String,
    pub cover_url: Option<String>,
}

pub trait LibraryStore {
    // ----- manga -----
    fn favorite_manga(&self) -> Result<Vec<Manga>>;
    /// Manga outside the library that have at least one read chapter.
    fn read_manga_not_in_library(&self) -> Result<Vec<Manga>>;
    fn manga_by_url(&self, url: &str, source_id: i64) -> Result<Option<Manga>>;
    fn insert_manga(&mut self, manga: &Manga) -> Result<MangaId>;
    fn update_manga(&mut self, manga: &Manga) -> Result<()>;

    // ----- chapters -----
    fn chapters(&self, manga_id: MangaId) -> Result<Vec<Chapter>>;
    fn chapter(&self, chapter_id: ChapterId) -> Result<Option<Chapter>>;
    fn insert_chapter(&mut self, chapter: &Chapter) -> Result<ChapterId>;
    fn update_chapter(&mut self, chapter: &Chapter) -> Result<()>;

    // ----- categories -----
    fn categories(&self) -> Result<Vec<Category>>;
    fn insert_category(&mut self, category: &Category) -> Result<CategoryId>;
    fn categories_for_manga(&self, manga_id: MangaId) -> Result<Vec<Category>>;
    /// Replace all category links of a manga.
    fn set_manga_categories(&mut self, manga_id: MangaId, category_ids: &[CategoryId]) -> Result<()>;

    // ----- tracking -----
    fn tracks(&self, manga_id: MangaId) -> Result<Vec<Track>>;
    fn insert_track(&mut self, track: &Track) -> Result<i64>;
    fn update_track(&mut self, track: &Track) -> Result<()>;

    // ----- history -----
    fn history_for_manga(&self, manga_id: MangaId) -> Result<Vec<History>>;
    fn history_for_chapter(&self, chapter_id: ChapterId) -> Result<Option<History>>;
    fn insert_history(&mut self, history: &History) -> Result<i64>;
    fn update_history(&mut self, history: &History) -> Result<()>;

    // ----- merge links -----
    fn merge_sources(&self, manga_id: MangaId) -> Result<Vec<MergeSource>>;
    fn insert_merge_source(&mut self, merge: &MergeSource) -> Result<i64>;

    /// Run `f` atomically: on `Err` every change made inside is undone.
    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>;
}
