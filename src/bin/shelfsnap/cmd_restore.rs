use anyhow::Result;
use log::info;
use std::path::PathBuf;

use shelfsnap::{FileLease, FsPath, FsStorage, LibraryFile, LogProgress, RestoreTask, SnapConfig};

use super::cli::RegistryArgs;
use super::util::build_registry;

pub fn exec(library: PathBuf, file: PathBuf, json: bool, registry: RegistryArgs) -> Result<()> {
    let cfg = SnapConfig::from_env();
    let reg = build_registry(&registry);
    let storage = FsStorage;

    let (lib, mut store) = LibraryFile::open(&library)?;
    // one restore per host at a time
    let lease = FileLease::new(cfg.error_log_path());
    let task = RestoreTask::new(&storage, &reg, &cfg);
    let report = task.run(&mut store, &FsPath::new(file), &lease, &LogProgress)?;
    lib.save(&store)?;
    info!("library saved to {}", lib.path().display());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
