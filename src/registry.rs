//! Source and tracker lookup injected into the writer, validator and restore engine.

use std::collections::{BTreeMap, BTreeSet};

/// Catalog sources the app can restore into.
pub trait SourceRegistry {
    fn is_supported(&self, source_id: i64) -> bool;
    /// The catalog the app can actually browse.
    fn primary_source_id(&self) -> i64;
}

/// Tracking services known to this install.
pub trait TrackerRegistry {
    fn is_valid_tracker(&self, service_id: i32) -> bool;
    fn is_logged_in(&self, service_id: i32) -> bool;
    fn tracker_name(&self, service_id: i32) -> Option<&str>;
}

/// Well-known tracker ids.
pub mod trackers {
    pub const MYANIMELIST: i32 = 1;
    pub const ANILIST: i32 = 2;
    pub const KITSU: i32 = 3;
    pub const MANGA_UPDATES: i32 = 7;
    pub const MDLIST: i32 = 60;
}

/// Fixed tables; enough for the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    primary_source: i64,
    sources: BTreeSet<i64>,
    trackers: BTreeMap<i32, String>,
    logged_in: BTreeSet<i32>,
}

impl StaticRegistry {
    pub fn new(primary_source: i64) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(primary_source);
        Self {
            primary_source,
            sources,
            trackers: BTreeMap::new(),
            logged_in: BTreeSet::new(),
        }
    }

    /// Primary source plus the usual tracker set, none of them logged in.
    pub fn with_default_trackers(primary_source: i64) -> Self {
        Self::new(primary_source)
            .with_tracker(trackers::MYANIMELIST, "MyAnimeList")
            .with_tracker(trackers::ANILIST, "AniList")
            .with_tracker(trackers::KITSU, "Kitsu")
            .with_tracker(trackers::MANGA_UPDATES, "MangaUpdates")
            .with_tracker(trackers::MDLIST, "MDList")
    }

    pub fn with_source(mut self, source_id: i64) -> Self {
        self.sources.insert(source_id);
        self
    }

    pub fn with_tracker<S: Into<String>>(mut self, service_id: i32, name: S) -> Self {
        self.trackers.insert(service_id, name.into());
        self
    }

    pub fn with_login(mut self, service_id: i32) -> Self {
        self.logged_in.insert(service_id);
        self
    }
}

impl SourceRegistry for StaticRegistry {
    fn is_supported(&self, source_id: i64) -> bool {
        self.sources.contains(&source_id)
    }

    fn primary_source_id(&self) -> i64 {
        self.primary_source
    }
}

impl TrackerRegistry for StaticRegistry {
    fn is_valid_tracker(&self, service_id: i32) -> bool {
        self.trackers.contains_key(&service_id)
    }

    fn is_logged_in(&self, service_id: i32) -> bool {
        self.is_valid_tracker(service_id) && self.logged_in.contains(&service_id)
    }

    fn tracker_name(&self, service_id: i32) -> Option<&str> {
        self.trackers.get(&service_id).map(|s| s.as_str())
    }
}
