//! Pure merge rules between a local row and an incoming snapshot record.
//!
//! Every rule is max/OR based so applying the same record twice is a no-op.

use crate::model::{ChapterRecord, HistoryRecord, MangaRecord, MergeSourceRecord, TrackRecord};
use crate::store::{Chapter, ChapterId, History, Manga, MangaId, MergeSource, Track};

/// Row for a manga that does not exist locally yet.
pub fn new_manga(rec: &MangaRecord) -> Manga {
    Manga {
        id: 0,
        source_id: rec.source_id,
        url: rec.url.clone(),
        title: rec.title.clone(),
        author: rec.author.clone(),
        artist: rec.artist.clone(),
        description: rec.description.clone(),
        genres: rec.genres.clone(),
        status: rec.status,
        content_rating: rec.content_rating,
        thumbnail_url: rec.thumbnail_url.clone(),
        user_cover: rec.user_cover.clone(),
        user_title: rec.user_title.clone(),
        favorite: rec.favorite,
        initialized: false,
        date_added: rec.date_added,
        viewer_flags: rec.viewer_flags,
        chapter_flags: rec.chapter_flags,
    }
}

/// Copy incoming fields onto an existing manga.
///
/// `favorite` is OR-ed, user overrides are only replaced by present values,
/// `date_added` keeps the earliest known date and the row is flagged for a
/// metadata refresh.
pub fn merge_manga(local: &Manga, rec: &MangaRecord) -> Manga {
    let date_added = match (local.date_added, rec.date_added) {
        (0, inc) => inc,
        (loc, 0) => loc,
        (loc, inc) => loc.min(inc),
    };
    Manga {
        id: local.id,
        source_id: local.source_id,
        url: local.url.clone(),
        title: rec.title.clone(),
        author: rec.author.clone().or_else(|| local.author.clone()),
        artist: rec.artist.clone().or_else(|| local.artist.clone()),
        description: rec.description.clone().or_else(|| local.description.clone()),
        genres: if rec.genres.is_empty() {
            local.genres.clone()
        } else {
            rec.genres.clone()
        },
        status: rec.status,
        content_rating: rec.content_rating,
        thumbnail_url: rec.thumbnail_url.clone().or_else(|| local.thumbnail_url.clone()),
        user_cover: rec.user_cover.clone().or_else(|| local.user_cover.clone()),
        user_title: rec.user_title.clone().or_else(|| local.user_title.clone()),
        favorite: local.favorite || rec.favorite,
        initialized: false,
        date_added,
        viewer_flags: rec.viewer_flags,
        chapter_flags: rec.chapter_flags,
    }
}

pub fn new_chapter(manga_id: MangaId, rec: &ChapterRecord) -> Chapter {
    Chapter {
        id: 0,
        manga_id,
        url: rec.url.clone(),
        name: rec.name.clone(),
        scanlator: rec.scanlator.clone(),
        read: rec.read,
        bookmark: rec.bookmark,
        last_page_read: rec.last_page_read,
        chapter_number: rec.chapter_number,
        source_order: rec.source_order,
        date_fetch: rec.date_fetch,
        date_upload: rec.date_upload,
    }
}

/// Progress only moves forward; descriptive fields stay local.
pub fn merge_chapter(local: &Chapter, rec: &ChapterRecord) -> Chapter {
    Chapter {
        read: local.read || rec.read,
        bookmark: local.bookmark || rec.bookmark,
        last_page_read: local.last_page_read.max(rec.last_page_read),
        ..local.clone()
    }
}

pub fn new_history(chapter_id: ChapterId, rec: &HistoryRecord) -> History {
    History {
        id: 0,
        chapter_id,
        last_read: rec.last_read,
        time_read: rec.read_duration,
    }
}

/// Both fields take the max independently.
pub fn merge_history(local: &History, rec: &HistoryRecord) -> History {
    History {
        last_read: local.last_read.max(rec.last_read),
        time_read: local.time_read.max(rec.read_duration),
        ..local.clone()
    }
}

pub fn new_track(manga_id: MangaId, rec: &TrackRecord) -> Track {
    Track {
        id: 0,
        manga_id,
        service_id: rec.service_id,
        media_id: rec.media_id,
        library_id: rec.library_id,
        title: rec.title.clone(),
        last_chapter_read: rec.last_chapter_read,
        total_chapters: rec.total_chapters,
        score: rec.score,
        status: rec.status,
        tracking_url: rec.tracking_url.clone(),
    }
}

/// Remote ids follow the snapshot; read progress takes the max.
pub fn merge_track(local: &Track, rec: &TrackRecord) -> Track {
    let mut out = local.clone();
    if rec.media_id != local.media_id {
        out.media_id = rec.media_id;
    }
    if rec.library_id != local.library_id {
        out.library_id = rec.library_id;
    }
    out.last_chapter_read = local.last_chapter_read.max(rec.last_chapter_read);
    out
}

pub fn new_merge_source(manga_id: MangaId, rec: &MergeSourceRecord) -> MergeSource {
    MergeSource {
        id: 0,
        manga_id,
        merge_type: rec.merge_type,
        url: rec.url.clone(),
        title: rec.title.clone(),
        cover_url: rec.cover_url.clone(),
    }
}
