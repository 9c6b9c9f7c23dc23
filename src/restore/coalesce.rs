//! Grouping pre-pass: snapshot records that point at the same remote title
//! are folded into one before anything touches the store.

use std::collections::HashMap;

use crate::model::MangaRecord;

/// Remote content id of a manga url.
///
/// `/title/<id>/<slug>` and `/manga/<id>` yield `<id>`. Urls without either
/// marker have no content id. Query strings and fragments are ignored.
pub fn content_id(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let mut segs = path.split('/').filter(|s| !s.is_empty());
    segs.find(|s| *s == "title" || *s == "manga")?;
    segs.next()
}

/// Grouping key. Records from different sources never share a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// Source id plus the marker content id.
    Content(i64, String),
    /// Source id plus the full url, for urls without a marker.
    Url(i64, String),
}

pub fn group_key(rec: &MangaRecord) -> GroupKey {
    match content_id(&rec.url) {
        Some(id) => GroupKey::Content(rec.source_id, id.to_string()),
        None => GroupKey::Url(rec.source_id, rec.url.clone()),
    }
}

/// Groups keyed by [`group_key`], in order of first appearance.
pub fn group_by_content_id(records: Vec<MangaRecord>) -> Vec<Vec<MangaRecord>> {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<MangaRecord>> = Vec::new();
    for rec in records {
        let key = group_key(&rec);
        match index.get(&key) {
            Some(&i) => groups[i].push(rec),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![rec]);
            }
        }
    }
    groups
}

/// Fold a group into one record.
///
/// Scalars come from the first member; chapters, history, tracking and
/// category orders are flattened across members with exact duplicates removed.
pub fn coalesce(mut group: Vec<MangaRecord>) -> Option<MangaRecord> {
    if group.len() <= 1 {
        return group.pop();
    }
    let mut rest = group.split_off(1);
    let mut first = group.pop()?;
    for other in rest.iter_mut() {
        first.chapters.append(&mut other.chapters);
        first.history.append(&mut other.history);
        first.tracking.append(&mut other.tracking);
        first.categories.append(&mut other.categories);
    }
    first.chapters = distinct(first.chapters);
    first.history = distinct(first.history);
    first.tracking = distinct(first.tracking);
    first.categories = distinct(first.categories);
    Some(first)
}

fn distinct<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for it in items {
        if !out.contains(&it) {
            out.push(it);
        }
    }
    out
}
