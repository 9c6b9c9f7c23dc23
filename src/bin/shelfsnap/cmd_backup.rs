use anyhow::{anyhow, Result};
use std::path::PathBuf;

use shelfsnap::model::BackupFlags;
use shelfsnap::{Destination, FsPath, FsStorage, LibraryFile, LogProgress, SnapConfig, SnapshotWriter};

use super::cli::RegistryArgs;
use super::util::build_registry;

pub fn exec(
    library: PathBuf,
    out: Option<PathBuf>,
    auto_dir: Option<PathBuf>,
    flags: Option<String>,
    registry: RegistryArgs,
) -> Result<()> {
    let cfg = SnapConfig::from_env();
    let flags = match flags {
        Some(s) => BackupFlags::parse(&s)?,
        None => cfg.default_flags,
    };
    let dest = match (out, auto_dir) {
        (Some(p), _) => Destination::Explicit(FsPath::new(p)),
        (None, Some(d)) => Destination::Automatic(FsPath::new(d)),
        (None, None) => return Err(anyhow!("either --out or --auto-dir is required")),
    };

    // backup only reads; restores hold the exclusive lock
    let store = LibraryFile::load_shared(&library)?;
    let reg = build_registry(&registry);
    let storage = FsStorage;
    let writer = SnapshotWriter::new(&storage, &reg, &cfg);
    let res = writer.write(&store, flags, &dest, &LogProgress)?;

    println!("snapshot: {}", res.handle);
    println!("  manga:      {}", res.manga_count);
    println!("  categories: {}", res.category_count);
    println!("  bytes:      {}", res.bytes);
    if !res.validation.missing_trackers.is_empty() {
        let names: Vec<&str> = res
            .validation
            .missing_trackers
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        println!("  trackers not logged in: {}", names.join(", "));
    }
    for p in &res.pruned {
        println!("  pruned: {}", p);
    }
    Ok(())
}
