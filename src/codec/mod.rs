//! codec: binary snapshot format and its gzip container.
//!
//! Raw layout (before compression):
//!   [magic "SHSN" 4][format u16][body_len u32][crc32(body) u32] + body
//!
//! Body:
//!   [manga count u32] MangaRecord*
//!   [category count u32] CategoryRecord*
//!
//! Field order inside each record is fixed by `put_*`/`get_*` below; encoding is
//! deterministic so `decode(encode(s)) == s` and equal snapshots give equal bytes.
//! There is no version negotiation: anything that does not decode structurally is
//! treated as corrupt.
//!
//! Strings and sequences are limited to u32::MAX entries; longer ones fail with
//! `Encoding`. NaN is unsupported in f32 fields (chapter_number, track score,
//! last_chapter_read): the bits survive, but NaN != NaN so such a snapshot never
//! compares equal to its decoded copy.

use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::SnapshotError;
use crate::model::{
    CategoryRecord, ChapterRecord, ContentRating, HistoryRecord, MangaRecord, MergeSourceRecord,
    MergeType, PublicationStatus, Snapshot, TrackRecord,
};

pub mod naming;
pub mod wire;

use wire::{WireReader, WireWriter};

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"SHSN";
pub const SNAPSHOT_FORMAT: u16 = 1;
pub const HEADER_SIZE: usize = 4 + 2 + 4 + 4;

/// Encode to the raw (uncompressed) byte form.
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let mut body = WireWriter::with_capacity(4096);
    body.count(snapshot.manga.len());
    for m in &snapshot.manga {
        put_manga(&mut body, m);
    }
    body.count(snapshot.categories.len());
    for c in &snapshot.categories {
        put_category(&mut body, c);
    }
    let body = body.into_inner()?;
    let body_len = u32::try_from(body.len()).map_err(|_| {
        SnapshotError::Encoding(format!("body of {} bytes exceeds the u32 length field", body.len()))
    })?;

    let mut hasher = Crc32::new();
    hasher.update(&body);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(SNAPSHOT_MAGIC);
    let mut hdr = [0u8; HEADER_SIZE - 4];
    LittleEndian::write_u16(&mut hdr[0..2], SNAPSHOT_FORMAT);
    LittleEndian::write_u32(&mut hdr[2..6], body_len);
    LittleEndian::write_u32(&mut hdr[6..10], crc);
    out.extend_from_slice(&hdr);
    out.extend_from_slice(&body);

    if out.is_empty() {
        return Err(SnapshotError::Encoding("encoder produced no bytes".into()).into());
    }
    Ok(out)
}

/// Decode the raw (uncompressed) byte form.
pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
    if bytes.len() < HEADER_SIZE {
        return Err(SnapshotError::corrupt(format!(
            "snapshot too short: {} bytes, header needs {}",
            bytes.len(),
            HEADER_SIZE
        ))
        .into());
    }
    if &bytes[0..4] != SNAPSHOT_MAGIC {
        return Err(SnapshotError::corrupt("bad magic").into());
    }
    let format = LittleEndian::read_u16(&bytes[4..6]);
    if format != SNAPSHOT_FORMAT {
        return Err(SnapshotError::corrupt(format!("unknown format {}", format)).into());
    }
    let body_len = LittleEndian::read_u32(&bytes[6..10]) as usize;
    let crc_expected = LittleEndian::read_u32(&bytes[10..14]);
    let body = &bytes[HEADER_SIZE..];
    if body.len() != body_len {
        return Err(SnapshotError::corrupt(format!(
            "body length {} != header {}",
            body.len(),
            body_len
        ))
        .into());
    }
    let mut hasher = Crc32::new();
    hasher.update(body);
    if hasher.finalize() != crc_expected {
        return Err(SnapshotError::corrupt("body crc mismatch").into());
    }

    let mut r = WireReader::new(body);
    let manga_n = r.count("manga count")?;
    let mut manga = Vec::with_capacity(manga_n);
    for _ in 0..manga_n {
        manga.push(get_manga(&mut r)?);
    }
    let cat_n = r.count("category count")?;
    let mut categories = Vec::with_capacity(cat_n);
    for _ in 0..cat_n {
        categories.push(get_category(&mut r)?);
    }
    if r.remaining() != 0 {
        return Err(SnapshotError::corrupt(format!("{} trailing bytes", r.remaining())).into());
    }
    Ok(Snapshot { manga, categories })
}

/// Gzip the raw form.
pub fn compress(raw: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::with_capacity(raw.len() / 2 + 64), Compression::new(level));
    enc.write_all(raw).context("gzip write")?;
    enc.finish().context("gzip finish")
}

pub fn decompress(gz: &[u8]) -> Result<Vec<u8>> {
    let mut dec = GzDecoder::new(gz);
    let mut out = Vec::new();
    dec.read_to_end(&mut out)
        .map_err(|e| SnapshotError::corrupt(format!("decompress: {}", e)))?;
    Ok(out)
}

/// Encode + compress + write everything to `w`. Returns compressed byte count.
pub fn write_snapshot<W: Write>(w: &mut W, snapshot: &Snapshot, level: u32) -> Result<usize> {
    let raw = encode(snapshot)?;
    let gz = compress(&raw, level)?;
    w.write_all(&gz).context("write snapshot bytes")?;
    w.flush().context("flush snapshot")?;
    Ok(gz.len())
}

/// Read everything from `r`, decompress and decode.
pub fn read_snapshot<R: Read>(r: &mut R) -> Result<Snapshot> {
    let mut gz = Vec::new();
    r.read_to_end(&mut gz).context("read snapshot bytes")?;
    let raw = decompress(&gz)?;
    decode(&raw)
}

// ----------------- records -----------------

fn put_manga(w: &mut WireWriter, m: &MangaRecord) {
    w.i64(m.source_id);
    w.str(&m.url);
    w.str(&m.title);
    w.opt_str(m.author.as_deref());
    w.opt_str(m.artist.as_deref());
    w.opt_str(m.description.as_deref());
    w.count(m.genres.len());
    for g in &m.genres {
        w.str(g);
    }
    w.u8(m.status.code());
    w.u8(m.content_rating.code());
    w.opt_str(m.thumbnail_url.as_deref());
    w.opt_str(m.user_cover.as_deref());
    w.opt_str(m.user_title.as_deref());
    w.bool(m.favorite);
    w.i64(m.date_added);
    w.i32(m.viewer_flags);
    w.i32(m.chapter_flags);

    w.count(m.chapters.len());
    for c in &m.chapters {
        put_chapter(w, c);
    }
    w.count(m.categories.len());
    for order in &m.categories {
        w.i32(*order);
    }
    w.count(m.tracking.len());
    for t in &m.tracking {
        put_track(w, t);
    }
    w.count(m.history.len());
    for h in &m.history {
        w.str(&h.chapter_url);
        w.i64(h.last_read);
        w.i64(h.read_duration);
    }
    w.count(m.merge_sources.len());
    for ms in &m.merge_sources {
        w.u8(ms.merge_type.code());
        w.str(&ms.url);
        w.str(&ms.title);
        w.opt_str(ms.cover_url.as_deref());
    }
}

fn get_manga(r: &mut WireReader<'_>) -> Result<MangaRecord> {
    let source_id = r.i64("manga.source_id")?;
    let url = r.string("manga.url")?;
    let title = r.string("manga.title")?;
    let author = r.opt_string("manga.author")?;
    let artist = r.opt_string("manga.artist")?;
    let description = r.opt_string("manga.description")?;
    let genre_n = r.count("manga.genres")?;
    let mut genres = Vec::with_capacity(genre_n);
    for _ in 0..genre_n {
        genres.push(r.string("manga.genre")?);
    }
    let status_code = r.u8("manga.status")?;
    let status = PublicationStatus::from_code(status_code)
        .ok_or_else(|| SnapshotError::corrupt(format!("unknown status {}", status_code)))?;
    let rating_code = r.u8("manga.content_rating")?;
    let content_rating = ContentRating::from_code(rating_code)
        .ok_or_else(|| SnapshotError::corrupt(format!("unknown content rating {}", rating_code)))?;
    let thumbnail_url = r.opt_string("manga.thumbnail_url")?;
    let user_cover = r.opt_string("manga.user_cover")?;
    let user_title = r.opt_string("manga.user_title")?;
    let favorite = r.bool("manga.favorite")?;
    let date_added = r.i64("manga.date_added")?;
    let viewer_flags = r.i32("manga.viewer_flags")?;
    let chapter_flags = r.i32("manga.chapter_flags")?;

    let n = r.count("manga.chapters")?;
    let mut chapters = Vec::with_capacity(n);
    for _ in 0..n {
        chapters.push(get_chapter(r)?);
    }
    let n = r.count("manga.categories")?;
    let mut categories = Vec::with_capacity(n);
    for _ in 0..n {
        categories.push(r.i32("manga.category_order")?);
    }
    let n = r.count("manga.tracking")?;
    let mut tracking = Vec::with_capacity(n);
    for _ in 0..n {
        tracking.push(get_track(r)?);
    }
    let n = r.count("manga.history")?;
    let mut history = Vec::with_capacity(n);
    for _ in 0..n {
        history.push(HistoryRecord {
            chapter_url: r.string("history.chapter_url")?,
            last_read: r.i64("history.last_read")?,
            read_duration: r.i64("history.read_duration")?,
        });
    }
    let n = r.count("manga.merge_sources")?;
    let mut merge_sources = Vec::with_capacity(n);
    for _ in 0..n {
        let code = r.u8("merge.type")?;
        let merge_type = MergeType::from_code(code)
            .ok_or_else(|| SnapshotError::corrupt(format!("unknown merge type {}", code)))?;
        merge_sources.push(MergeSourceRecord {
            merge_type,
            url: r.string("merge.url")?,
            title: r.string("merge.title")?,
            cover_url: r.opt_string("merge.cover_url")?,
        });
    }

    Ok(MangaRecord {
        source_id,
        url,
        title,
        author,
        artist,
        description,
        genres,
        status,
        content_rating,
        thumbnail_url,
        user_cover,
        user_title,
        favorite,
        date_added,
        viewer_flags,
        chapter_flags,
        chapters,
        categories,
        tracking,
        history,
        merge_sources,
    })
}

fn put_chapter(w: &mut WireWriter, c: &ChapterRecord) {
    w.str(&c.url);
    w.str(&c.name);
    w.opt_str(c.scanlator.as_deref());
    w.bool(c.read);
    w.bool(c.bookmark);
    w.i32(c.last_page_read);
    w.f32(c.chapter_number);
    w.i32(c.source_order);
    w.i64(c.date_fetch);
    w.i64(c.date_upload);
}

fn get_chapter(r: &mut WireReader<'_>) -> Result<ChapterRecord> {
    Ok(ChapterRecord {
        url: r.string("chapter.url")?,
        name: r.string("chapter.name")?,
        scanlator: r.opt_string("chapter.scanlator")?,
        read: r.bool("chapter.read")?,
        bookmark: r.bool("chapter.bookmark")?,
        last_page_read: r.i32("chapter.last_page_read")?,
        chapter_number: r.f32("chapter.chapter_number")?,
        source_order: r.i32("chapter.source_order")?,
        date_fetch: r.i64("chapter.date_fetch")?,
        date_upload: r.i64("chapter.date_upload")?,
    })
}

fn put_track(w: &mut WireWriter, t: &TrackRecord) {
    w.i32(t.service_id);
    w.i64(t.media_id);
    w.opt_i64(t.library_id);
    w.str(&t.title);
    w.f32(t.last_chapter_read);
    w.i32(t.total_chapters);
    w.f32(t.score);
    w.i32(t.status);
    w.str(&t.tracking_url);
}

fn get_track(r: &mut WireReader<'_>) -> Result<TrackRecord> {
    Ok(TrackRecord {
        service_id: r.i32("track.service_id")?,
        media_id: r.i64("track.media_id")?,
        library_id: r.opt_i64("track.library_id")?,
        title: r.string("track.title")?,
        last_chapter_read: r.f32("track.last_chapter_read")?,
        total_chapters: r.i32("track.total_chapters")?,
        score: r.f32("track.score")?,
        status: r.i32("track.status")?,
        tracking_url: r.string("track.tracking_url")?,
    })
}

fn put_category(w: &mut WireWriter, c: &CategoryRecord) {
    w.str(&c.name);
    w.i32(c.order);
    w.i32(c.flags);
}

fn get_category(r: &mut WireReader<'_>) -> Result<CategoryRecord> {
    Ok(CategoryRecord {
        name: r.string("category.name")?,
        order: r.i32("category.order")?,
        flags: r.i32("category.flags")?,
    })
}
