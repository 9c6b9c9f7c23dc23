//! model: records carried inside a library snapshot.
//!
//! Identity rules:
//! - MangaRecord: (source_id, url)
//! - ChapterRecord: url
//! - CategoryRecord: name (exact, case-sensitive); `order` only links manga to
//!   categories within the same snapshot
//! - TrackRecord: service_id within one manga
//! - HistoryRecord: chapter_url
//! - MergeSourceRecord: merge_type within one manga
//!
//! Local database ids never appear here: a snapshot is restorable into any library.

use serde::{Deserialize, Serialize};

pub mod flags;

pub use flags::BackupFlags;

/// Root container of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub manga: Vec<MangaRecord>,
    pub categories: Vec<CategoryRecord>,
}

impl Snapshot {
    pub fn new(manga: Vec<MangaRecord>, categories: Vec<CategoryRecord>) -> Self {
        Self { manga, categories }
    }

    pub fn is_restorable(&self) -> bool {
        !self.manga.is_empty()
    }
}

/// Publication status of a title as reported by its catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublicationStatus {
    #[default]
    Unknown,
    Ongoing,
    Completed,
    Licensed,
    PublicationComplete,
    Cancelled,
    Hiatus,
}

impl PublicationStatus {
    pub fn code(self) -> u8 {
        match self {
            PublicationStatus::Unknown => 0,
            PublicationStatus::Ongoing => 1,
            PublicationStatus::Completed => 2,
            PublicationStatus::Licensed => 3,
            PublicationStatus::PublicationComplete => 4,
            PublicationStatus::Cancelled => 5,
            PublicationStatus::Hiatus => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => PublicationStatus::Unknown,
            1 => PublicationStatus::Ongoing,
            2 => PublicationStatus::Completed,
            3 => PublicationStatus::Licensed,
            4 => PublicationStatus::PublicationComplete,
            5 => PublicationStatus::Cancelled,
            6 => PublicationStatus::Hiatus,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentRating {
    #[default]
    Unknown,
    Safe,
    Suggestive,
    Erotica,
    Pornographic,
}

impl ContentRating {
    pub fn code(self) -> u8 {
        match self {
            ContentRating::Unknown => 0,
            ContentRating::Safe => 1,
            ContentRating::Suggestive => 2,
            ContentRating::Erotica => 3,
            ContentRating::Pornographic => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => ContentRating::Unknown,
            1 => ContentRating::Safe,
            2 => ContentRating::Suggestive,
            3 => ContentRating::Erotica,
            4 => ContentRating::Pornographic,
            _ => return None,
        })
    }
}

/// Kind of alternate source a manga can be merged with. At most one link per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MergeType {
    MangaLife,
    Komga,
    Toonily,
    WeebCentral,
    Comick,
    Suwayomi,
}

impl MergeType {
    pub fn code(self) -> u8 {
        match self {
            MergeType::MangaLife => 0,
            MergeType::Komga => 1,
            MergeType::Toonily => 2,
            MergeType::WeebCentral => 3,
            MergeType::Comick => 4,
            MergeType::Suwayomi => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => MergeType::MangaLife,
            1 => MergeType::Komga,
            2 => MergeType::Toonily,
            3 => MergeType::WeebCentral,
            4 => MergeType::Comick,
            5 => MergeType::Suwayomi,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MangaRecord {
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
    /// User-chosen cover overriding the catalog one.
    pub user_cover: Option<String>,
    /// User-chosen title overriding the catalog one.
    pub user_title: Option<String>,
    pub favorite: bool,
    pub date_added: i64,
    pub viewer_flags: i32,
    pub chapter_flags: i32,
    pub chapters: Vec<ChapterRecord>,
    /// `order` values of CategoryRecords in the same snapshot.
    pub categories: Vec<i32>,
    pub tracking: Vec<TrackRecord>,
    pub history: Vec<HistoryRecord>,
    pub merge_sources: Vec<MergeSourceRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
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
pub struct CategoryRecord {
    pub name: String,
    pub order: i32,
    pub flags: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
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
pub struct HistoryRecord {
    pub chapter_url: String,
    /// Unix millis of the last read.
    pub last_read: i64,
    /// Accumulated reading time in millis.
    pub read_duration: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSourceRecord {
    pub merge_type: MergeType,
    pub url: String,
    pub title: String,
    pub cover_url: Option<String>,
}
