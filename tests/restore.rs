use anyhow::Result;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use oorandom::Rand64;

use shelfsnap::codec;
use shelfsnap::model::{
    CategoryRecord, ChapterRecord, HistoryRecord, MangaRecord, MergeSourceRecord, MergeType,
    Snapshot, TrackRecord,
};
use shelfsnap::registry::trackers;
use shelfsnap::store::{Category, Chapter, History, Manga, MergeSource, Track};
use shelfsnap::{
    build_snapshot, BackupFlags, CancelToken, FsPath, FsStorage, LibraryStore, MemoryStore,
    NoKeepAlive, NoProgress, RestoreEngine, RestoreOutcome, RestoreProgress, RestoreTask,
    SnapConfig, SnapshotError, StaticRegistry,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("shelfsnap-restore-{prefix}-{pid}-{t}-{id}"))
}

const SOURCE: i64 = 1;

fn registry() -> StaticRegistry {
    StaticRegistry::with_default_trackers(SOURCE)
}

fn manga(i: usize) -> MangaRecord {
    MangaRecord {
        source_id: SOURCE,
        url: format!("/title/m{}", i),
        title: format!("Manga {}", i),
        favorite: true,
        chapters: (0..3)
            .map(|c| ChapterRecord {
                url: format!("/chapter/m{}-{}", i, c),
                name: format!("Ch {}", c),
                read: c == 0,
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn write_snapshot_file(root: &PathBuf, snap: &Snapshot) -> Result<FsPath> {
    fs::create_dir_all(root)?;
    let path = root.join("in.snap.gz");
    let mut f = fs::File::create(&path)?;
    codec::write_snapshot(&mut f, snap, 6)?;
    Ok(FsPath::new(path))
}

/// Records every progress call.
#[derive(Default)]
struct Recorder {
    calls: RefCell<Vec<(usize, usize, String)>>,
    cancel_at: Option<(usize, CancelToken)>,
}

impl RestoreProgress for Recorder {
    fn advanced(&self, index: usize, total: usize, title: &str) {
        self.calls.borrow_mut().push((index, total, title.to_string()));
        if let Some((at, token)) = &self.cancel_at {
            if index == *at {
                token.cancel();
            }
        }
    }
}

#[test]
fn one_bad_manga_does_not_stop_the_rest() -> Result<()> {
    let mut records: Vec<MangaRecord> = (1..=10).map(manga).collect();
    // the local store rejects chapters without url
    records[4].chapters.push(ChapterRecord {
        url: String::new(),
        name: "broken".into(),
        ..Default::default()
    });
    let snap = Snapshot::new(records, vec![]);

    let reg = registry();
    let mut store = MemoryStore::new();
    let summary =
        RestoreEngine::new(&reg).restore(&mut store, &snap, &CancelToken::new(), &NoProgress)?;

    assert_eq!(summary.restored, 9);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].title, "Manga 5");
    assert!(!summary.cancelled);

    for i in (1..=10).filter(|&i| i != 5) {
        let m = store
            .manga_by_url(&format!("/title/m{}", i), SOURCE)?
            .expect("restored manga");
        assert!(m.favorite);
        assert!(!m.initialized);
        assert_eq!(store.chapters(m.id)?.len(), 3);
    }
    Ok(())
}

#[test]
fn unsupported_sources_are_skipped_and_logged() -> Result<()> {
    let root = unique_root("skip");
    let mut records: Vec<MangaRecord> = (1..=10).map(manga).collect();
    for i in [1usize, 4, 8] {
        records[i].source_id = 99;
    }
    let skipped: Vec<String> = [1usize, 4, 8].iter().map(|&i| records[i].title.clone()).collect();
    let handle = write_snapshot_file(&root, &Snapshot::new(records, vec![]))?;

    let reg = registry();
    let cfg = SnapConfig::default().with_error_log_dir(root.join("logs"));
    let mut store = MemoryStore::new();
    let report = RestoreTask::new(&FsStorage, &reg, &cfg).run(&mut store, &handle, &NoKeepAlive, &NoProgress)?;

    assert_eq!(report.outcome, RestoreOutcome::Completed);
    assert_eq!(report.summary.skipped, 3);
    assert_eq!(report.summary.restored + report.summary.skipped, 10);
    assert!(report.summary.errors.is_empty());
    assert_eq!(store.manga_count(), 7);
    assert!(store.manga_by_url("/title/m2", 99)?.is_none());

    let log_path = report.error_log.clone().expect("error log written");
    assert_eq!(log_path, cfg.error_log_path());
    let log = fs::read_to_string(&log_path)?;
    let mut lines = log.lines();
    assert_eq!(lines.next(), Some("skipped titles:"));
    let listed: Vec<String> = lines.take(3).map(|s| s.to_string()).collect();
    assert_eq!(listed, skipped);
    assert!(!log.contains("Errors:"));
    assert!(report.to_string().contains("Skipped 3 of 10"));

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn categories_are_merged_by_name() -> Result<()> {
    let mut store = MemoryStore::new();
    let local_a = store.insert_category(&Category {
        name: "A".into(),
        order: 5,
        ..Default::default()
    })?;
    store.insert_category(&Category {
        name: "B".into(),
        order: 6,
        ..Default::default()
    })?;

    let categories = vec![
        CategoryRecord { name: "A".into(), order: 0, flags: 0 },
        CategoryRecord { name: "B".into(), order: 1, flags: 0 },
        CategoryRecord { name: "C".into(), order: 2, flags: 0 },
        CategoryRecord { name: "D".into(), order: 3, flags: 0 },
    ];
    let mut m = manga(1);
    m.categories = vec![0, 2, 42];
    let snap = Snapshot::new(vec![m], categories);

    let reg = registry();
    let summary =
        RestoreEngine::new(&reg).restore(&mut store, &snap, &CancelToken::new(), &NoProgress)?;
    assert_eq!(summary.categories_restored, 4);

    let after = store.categories()?;
    assert_eq!(after.len(), 4, "exactly N - K new categories");
    let names: BTreeSet<_> = after.iter().map(|c| c.name.clone()).collect();
    assert_eq!(names.len(), after.len(), "no duplicate names");

    let id = store.manga_by_url("/title/m1", SOURCE)?.unwrap().id;
    let linked: Vec<String> = store
        .categories_for_manga(id)?
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(linked, vec!["C".to_string(), "A".to_string()]);
    assert!(store.categories_for_manga(id)?.iter().any(|c| c.id == local_a));
    Ok(())
}

#[test]
fn duplicate_category_order_resolves_to_first_record() -> Result<()> {
    let categories = vec![
        CategoryRecord { name: "A".into(), order: 0, flags: 0 },
        CategoryRecord { name: "B".into(), order: 0, flags: 0 },
    ];
    let mut m = manga(1);
    m.categories = vec![0];
    let snap = Snapshot::new(vec![m], categories);

    let reg = registry();
    let mut store = MemoryStore::new();
    RestoreEngine::new(&reg).restore(&mut store, &snap, &CancelToken::new(), &NoProgress)?;

    assert_eq!(store.categories()?.len(), 2);
    let id = store.manga_by_url("/title/m1", SOURCE)?.unwrap().id;
    let linked: Vec<String> = store
        .categories_for_manga(id)?
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(linked, vec!["A".to_string()]);
    Ok(())
}

#[test]
fn titles_from_different_sources_are_never_coalesced() -> Result<()> {
    let alpha = MangaRecord {
        source_id: 1,
        url: "https://a.example/series/1".into(),
        title: "Alpha".into(),
        favorite: true,
        ..Default::default()
    };
    let beta = MangaRecord {
        source_id: 2,
        url: "https://b.example/read/1".into(),
        title: "Beta".into(),
        favorite: true,
        ..Default::default()
    };
    // same marker id, different sources
    let gamma = MangaRecord {
        source_id: 1,
        url: "/title/shared".into(),
        title: "Gamma".into(),
        ..Default::default()
    };
    let delta = MangaRecord {
        source_id: 2,
        url: "/title/shared".into(),
        title: "Delta".into(),
        ..Default::default()
    };
    let snap = Snapshot::new(vec![alpha, beta, gamma, delta], vec![]);

    let reg = StaticRegistry::with_default_trackers(1).with_source(2);
    let mut store = MemoryStore::new();
    let summary =
        RestoreEngine::new(&reg).restore(&mut store, &snap, &CancelToken::new(), &NoProgress)?;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.restored, 4);
    assert_eq!(summary.skipped, 0);
    assert!(summary.errors.is_empty());
    assert_eq!(store.manga_count(), 4);
    assert_eq!(
        store.manga_by_url("https://b.example/read/1", 2)?.map(|m| m.title),
        Some("Beta".to_string())
    );
    assert_eq!(
        store.manga_by_url("/title/shared", 2)?.map(|m| m.title),
        Some("Delta".to_string())
    );
    Ok(())
}

#[test]
fn clean_restore_removes_a_stale_error_log() -> Result<()> {
    let root = unique_root("stalelog");
    let handle = write_snapshot_file(&root, &Snapshot::new(vec![manga(1)], vec![]))?;
    let reg = registry();
    let cfg = SnapConfig::default().with_error_log_dir(root.join("logs"));
    fs::create_dir_all(root.join("logs"))?;
    fs::write(cfg.error_log_path(), "skipped titles:\nOld run\n")?;

    let mut store = MemoryStore::new();
    let report = RestoreTask::new(&FsStorage, &reg, &cfg).run(&mut store, &handle, &NoKeepAlive, &NoProgress)?;

    assert!(report.summary.errors.is_empty());
    assert!(report.error_log.is_none());
    assert!(!cfg.error_log_path().exists());
    assert!(!report.to_string().contains("Error log"));

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn merge_never_discards_newer_local_progress() -> Result<()> {
    let mut store = MemoryStore::new();
    let id = store.insert_manga(&Manga {
        source_id: SOURCE,
        url: "/title/m1".into(),
        title: "Local".into(),
        favorite: true,
        initialized: true,
        ..Default::default()
    })?;
    let ch = store.insert_chapter(&Chapter {
        manga_id: id,
        url: "/chapter/m1-0".into(),
        name: "Local name".into(),
        read: true,
        bookmark: true,
        last_page_read: 10,
        ..Default::default()
    })?;
    store.insert_history(&History {
        chapter_id: ch,
        last_read: 500,
        time_read: 100,
        ..Default::default()
    })?;
    store.insert_track(&Track {
        manga_id: id,
        service_id: trackers::MYANIMELIST,
        media_id: 1,
        last_chapter_read: 9.0,
        ..Default::default()
    })?;
    store.insert_merge_source(&MergeSource {
        id: 0,
        manga_id: id,
        merge_type: MergeType::Komga,
        url: "/komga/local".into(),
        title: "local link".into(),
        cover_url: None,
    })?;

    let incoming = MangaRecord {
        source_id: SOURCE,
        url: "/title/m1".into(),
        title: "Snapshot".into(),
        favorite: false,
        chapters: vec![
            ChapterRecord {
                url: "/chapter/m1-0".into(),
                name: "Snapshot name".into(),
                read: false,
                bookmark: false,
                last_page_read: 3,
                ..Default::default()
            },
            ChapterRecord {
                url: "/chapter/m1-1".into(),
                read: true,
                last_page_read: 20,
                ..Default::default()
            },
        ],
        history: vec![
            HistoryRecord {
                chapter_url: "/chapter/m1-0".into(),
                last_read: 400,
                read_duration: 200,
            },
            HistoryRecord {
                chapter_url: "/chapter/elsewhere".into(),
                last_read: 1,
                read_duration: 1,
            },
        ],
        tracking: vec![
            TrackRecord {
                service_id: trackers::MYANIMELIST,
                media_id: 2,
                last_chapter_read: 4.0,
                ..Default::default()
            },
            TrackRecord {
                service_id: 4242,
                ..Default::default()
            },
        ],
        merge_sources: vec![
            MergeSourceRecord {
                merge_type: MergeType::Komga,
                url: "/komga/snapshot".into(),
                title: "snapshot link".into(),
                cover_url: None,
            },
            MergeSourceRecord {
                merge_type: MergeType::Toonily,
                url: "/toonily/x".into(),
                title: "toonily".into(),
                cover_url: None,
            },
        ],
        ..Default::default()
    };

    let reg = registry();
    let summary = RestoreEngine::new(&reg).restore(
        &mut store,
        &Snapshot::new(vec![incoming], vec![]),
        &CancelToken::new(),
        &NoProgress,
    )?;
    assert_eq!(summary.restored, 1);

    let m = store.manga(id).unwrap();
    assert!(m.favorite, "favorite is never cleared");
    assert!(!m.initialized);
    assert_eq!(m.title, "Snapshot");

    let chapters = store.chapters(id)?;
    assert_eq!(chapters.len(), 2);
    let c0 = chapters.iter().find(|c| c.url == "/chapter/m1-0").unwrap();
    assert!(c0.read && c0.bookmark);
    assert_eq!(c0.last_page_read, 10);
    assert_eq!(c0.name, "Local name");

    let h = store.history_for_chapter(ch)?.unwrap();
    assert_eq!((h.last_read, h.time_read), (500, 200));
    assert_eq!(store.history_for_manga(id)?.len(), 1);

    let tracks = store.tracks(id)?;
    assert_eq!(tracks.len(), 1, "unknown tracker ignored");
    assert_eq!(tracks[0].media_id, 2);
    assert_eq!(tracks[0].last_chapter_read, 9.0);

    let merges = store.merge_sources(id)?;
    assert_eq!(merges.len(), 2);
    let komga = merges.iter().find(|m| m.merge_type == MergeType::Komga).unwrap();
    assert_eq!(komga.url, "/komga/local", "first link per type wins");
    Ok(())
}

#[test]
fn duplicate_records_are_coalesced() -> Result<()> {
    let mut a = manga(1);
    a.url = "/title/same-id".into();
    a.title = "First copy".into();
    let mut b = manga(1);
    b.url = "/manga/same-id/".into();
    b.title = "Legacy copy".into();
    b.chapters.push(ChapterRecord {
        url: "/chapter/extra".into(),
        read: true,
        ..Default::default()
    });

    let reg = registry();
    let mut store = MemoryStore::new();
    let rec = Recorder::default();
    let summary = RestoreEngine::new(&reg).restore(
        &mut store,
        &Snapshot::new(vec![a, b], vec![]),
        &CancelToken::new(),
        &rec,
    )?;
    assert_eq!(summary.total, 1);
    assert_eq!(summary.restored, 1);
    assert_eq!(store.manga_count(), 1);
    assert_eq!(store.chapter_count(), 4);

    let m = store.manga_by_url("/title/same-id", SOURCE)?.unwrap();
    assert_eq!(m.title, "First copy");
    assert_eq!(rec.calls.borrow().len(), 1);
    Ok(())
}

#[test]
fn progress_is_one_based_and_monotonic() -> Result<()> {
    let snap = Snapshot::new((1..=6).map(manga).collect(), vec![]);
    let reg = registry();
    let mut store = MemoryStore::new();
    let rec = Recorder::default();
    RestoreEngine::new(&reg).restore(&mut store, &snap, &CancelToken::new(), &rec)?;

    let calls = rec.calls.borrow();
    let idx: Vec<usize> = calls.iter().map(|c| c.0).collect();
    assert_eq!(idx, vec![1, 2, 3, 4, 5, 6]);
    assert!(calls.iter().all(|c| c.1 == 6));
    assert_eq!(calls[2].2, "Manga 3");
    Ok(())
}

#[test]
fn cancel_mid_run_returns_partial_report() -> Result<()> {
    let root = unique_root("cancel");
    let handle = write_snapshot_file(&root, &Snapshot::new((1..=8).map(manga).collect(), vec![]))?;

    let reg = registry();
    let cfg = SnapConfig::default().with_error_log_dir(root.join("logs"));
    let task = RestoreTask::new(&FsStorage, &reg, &cfg);
    let rec = Recorder {
        cancel_at: Some((3, task.cancel_token())),
        ..Default::default()
    };
    let mut store = MemoryStore::new();
    let report = task.run(&mut store, &handle, &NoKeepAlive, &rec)?;

    assert_eq!(report.outcome, RestoreOutcome::Cancelled);
    assert!(report.is_cancelled());
    assert_eq!(report.summary.restored, 3);
    assert_eq!(report.summary.total, 8);
    assert_eq!(store.manga_count(), 3);
    assert!(report.error_log.is_none());
    assert!(report.to_string().contains("5 manga not processed"));

    // a re-run with a fresh token finishes the job
    let report = RestoreTask::new(&FsStorage, &reg, &cfg).run(&mut store, &handle, &NoKeepAlive, &NoProgress)?;
    assert_eq!(report.outcome, RestoreOutcome::Completed);
    assert_eq!(store.manga_count(), 8);
    assert_eq!(store.chapter_count(), 24);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn cancel_before_start_is_an_error_and_touches_nothing() -> Result<()> {
    let root = unique_root("precancel");
    let handle = write_snapshot_file(&root, &Snapshot::new(vec![manga(1)], vec![]))?;
    let reg = registry();
    let cfg = SnapConfig::default().with_error_log_dir(root.join("logs"));
    let token = CancelToken::new();
    token.cancel();

    let mut store = MemoryStore::new();
    let err = RestoreTask::new(&FsStorage, &reg, &cfg)
        .with_cancel_token(token)
        .run(&mut store, &handle, &NoKeepAlive, &NoProgress)
        .unwrap_err();
    assert_eq!(SnapshotError::of(&err), Some(&SnapshotError::Cancelled));
    assert_eq!(store, MemoryStore::new());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn corrupt_or_empty_snapshot_aborts_before_merging() -> Result<()> {
    let root = unique_root("corrupt");
    fs::create_dir_all(&root)?;
    let reg = registry();
    let cfg = SnapConfig::default().with_error_log_dir(root.join("logs"));
    let task = RestoreTask::new(&FsStorage, &reg, &cfg);
    let mut store = MemoryStore::new();

    let garbage = root.join("garbage.snap.gz");
    fs::write(&garbage, b"definitely not gzip")?;
    let err = task
        .run(&mut store, &FsPath::new(&garbage), &NoKeepAlive, &NoProgress)
        .unwrap_err();
    assert!(matches!(SnapshotError::of(&err), Some(SnapshotError::Corrupt(_))));

    let empty = write_snapshot_file(&root, &Snapshot::new(vec![], vec![CategoryRecord::default()]))?;
    let err = task.run(&mut store, &empty, &NoKeepAlive, &NoProgress).unwrap_err();
    assert!(matches!(SnapshotError::of(&err), Some(SnapshotError::Invalid(_))));

    assert_eq!(store, MemoryStore::new());
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

fn random_library_snapshot(seed: u128) -> Snapshot {
    let mut rng = Rand64::new(seed);
    let categories: Vec<CategoryRecord> = (0..4)
        .map(|i| CategoryRecord {
            name: format!("cat{}", i),
            order: i,
            flags: 0,
        })
        .collect();
    let mut records = Vec::new();
    for i in 0..rng.rand_range(3..15) {
        let mut m = manga(i as usize);
        // some duplicates to exercise coalescing
        if i % 5 == 4 {
            m.url = format!("/manga/m{}", i - 1);
        }
        for c in m.chapters.iter_mut() {
            c.read = rng.rand_range(0..2) == 1;
            c.bookmark = rng.rand_range(0..3) == 0;
            c.last_page_read = rng.rand_range(0..30) as i32;
        }
        let mut history = Vec::new();
        for c in &m.chapters {
            if rng.rand_range(0..2) == 1 {
                history.push(HistoryRecord {
                    chapter_url: c.url.clone(),
                    last_read: rng.rand_range(0..10_000) as i64,
                    read_duration: rng.rand_range(0..10_000) as i64,
                });
            }
        }
        m.history = history;
        m.categories = (0..4).filter(|_| rng.rand_range(0..2) == 1).collect();
        m.tracking = vec![TrackRecord {
            service_id: if rng.rand_range(0..2) == 1 { trackers::ANILIST } else { 4242 },
            media_id: rng.rand_range(1..100) as i64,
            last_chapter_read: rng.rand_range(0..50) as f32,
            ..Default::default()
        }];
        m.favorite = rng.rand_range(0..3) != 0;
        records.push(m);
    }
    Snapshot::new(records, categories)
}

#[test]
fn restoring_twice_changes_nothing_the_second_time() -> Result<()> {
    let reg = registry();
    for seed in 1..16u128 {
        let snap = random_library_snapshot(seed * 0xABCD);

        // local state that partially overlaps the snapshot
        let mut store = MemoryStore::new();
        let id = store.insert_manga(&Manga {
            source_id: SOURCE,
            url: "/title/m0".into(),
            title: "Local m0".into(),
            favorite: true,
            ..Default::default()
        })?;
        store.insert_chapter(&Chapter {
            manga_id: id,
            url: "/chapter/m0-1".into(),
            read: true,
            last_page_read: 25,
            ..Default::default()
        })?;
        store.insert_category(&Category {
            name: "cat2".into(),
            order: 9,
            ..Default::default()
        })?;

        let engine = RestoreEngine::new(&reg);
        let first = engine.restore(&mut store, &snap, &CancelToken::new(), &NoProgress)?;
        let after_first = store.clone();
        let second = engine.restore(&mut store, &snap, &CancelToken::new(), &NoProgress)?;

        assert_eq!(store, after_first, "seed {}", seed);
        assert_eq!(first.restored, second.restored);
        assert!(first.errors.is_empty());
    }
    Ok(())
}

#[test]
fn backup_then_restore_into_empty_library_reproduces_the_snapshot() -> Result<()> {
    let reg = registry();
    let mut seed_snap = random_library_snapshot(77);
    for m in seed_snap.manga.iter_mut() {
        m.favorite = true;
    }
    let mut source_lib = MemoryStore::new();
    RestoreEngine::new(&reg).restore(&mut source_lib, &seed_snap, &CancelToken::new(), &NoProgress)?;

    let flags = BackupFlags::library_default();
    let snap = build_snapshot(&source_lib, flags)?;

    let mut target = MemoryStore::new();
    let summary = RestoreEngine::new(&reg).restore(&mut target, &snap, &CancelToken::new(), &NoProgress)?;
    assert!(summary.errors.is_empty());
    assert_eq!(build_snapshot(&target, flags)?, snap);
    Ok(())
}
