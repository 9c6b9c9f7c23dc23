use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use shelfsnap::codec::naming::{is_snapshot_filename, parse_snapshot_filename};
use shelfsnap::{FsPath, FsStorage, SnapshotStorage};

#[derive(Serialize)]
struct Entry {
    name: String,
    created: String,
    bytes: u64,
}

pub fn exec(dir: PathBuf, json: bool) -> Result<()> {
    let listed = FsStorage.list(&FsPath::new(dir), &is_snapshot_filename)?;

    let mut entries: Vec<(chrono::NaiveDateTime, Entry)> = Vec::with_capacity(listed.len());
    for (name, handle) in listed {
        let ts = match parse_snapshot_filename(&name) {
            Some(ts) => ts,
            None => continue,
        };
        let bytes = std::fs::metadata(&handle.0).map(|m| m.len()).unwrap_or(0);
        entries.push((
            ts,
            Entry {
                name,
                created: ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                bytes,
            },
        ));
    }
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    let entries: Vec<Entry> = entries.into_iter().map(|(_, e)| e).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("no snapshots");
    } else {
        for e in &entries {
            println!("{}  {:>10} B  {}", e.created, e.bytes, e.name);
        }
    }
    Ok(())
}
