//! Portable snapshot file names: `shelfsnap_YYYY-MM-DD_HH-MM-SS.snap.gz`.
//!
//! The timestamp is local time at creation. Names sort lexicographically in
//! creation order, but retention sorts by the parsed timestamp anyway.

use chrono::{Local, NaiveDateTime};

pub const FILE_PREFIX: &str = "shelfsnap_";
pub const FILE_SUFFIX: &str = ".snap.gz";
const TS_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// File name for a snapshot created now.
pub fn snapshot_filename() -> String {
    snapshot_filename_at(Local::now().naive_local())
}

pub fn snapshot_filename_at(ts: NaiveDateTime) -> String {
    format!("{}{}{}", FILE_PREFIX, ts.format(TS_FORMAT), FILE_SUFFIX)
}

/// Timestamp embedded in a snapshot file name, or None if the name does not match.
pub fn parse_snapshot_filename(name: &str) -> Option<NaiveDateTime> {
    let middle = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDateTime::parse_from_str(middle, TS_FORMAT).ok()
}

pub fn is_snapshot_filename(name: &str) -> bool {
    parse_snapshot_filename(name).is_some()
}
