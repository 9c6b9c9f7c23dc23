//! JSON-backed library file.
//!
//! `<path>` holds a pretty-printed [`MemoryStore`]; saves go through `<path>.tmp`
//! and a rename. An exclusive advisory lock on `<path>.lock` is held for the
//! lifetime of the handle so two commands never write the same library.

use anyhow::{Context, Result};
use log::debug;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::MemoryStore;
use crate::lock::{acquire_lock, LockGuard, LockMode};

pub struct LibraryFile {
    path: PathBuf,
    _lock: LockGuard,
}

impl LibraryFile {
    /// Lock and load the library at `path`. A missing file yields an empty library.
    pub fn open(path: &Path) -> Result<(Self, MemoryStore)> {
        let lock = acquire_lock(path, LockMode::Exclusive)?;
        debug!("library: holding {}", lock.path().display());
        let store = read_store(path)?;
        Ok((
            Self {
                path: path.to_path_buf(),
                _lock: lock,
            },
            store,
        ))
    }

    /// Load a read-only copy under a shared lock, released on return.
    /// Concurrent readers proceed; a writer holding [`LibraryFile::open`] blocks it.
    pub fn load_shared(path: &Path) -> Result<MemoryStore> {
        let _lock = acquire_lock(path, LockMode::Shared)?;
        read_store(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, store: &MemoryStore) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create library dir {}", parent.display()))?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(store).context("serialize library")?;
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)
                .with_context(|| format!("open tmp library {}", tmp.display()))?;
            f.write_all(json.as_bytes())?;
            f.flush()?;
            let _ = f.sync_all();
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;
        debug!("library: saved {} ({} bytes)", self.path.display(), json.len());
        Ok(())
    }
}

fn read_store(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        debug!("library: {} does not exist, starting empty", path.display());
        return Ok(MemoryStore::new());
    }
    let mut f = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("open library {}", path.display()))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    serde_json::from_str(&buf).with_context(|| format!("parse library json {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LibraryStore, Manga};

    fn temp_library(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("shelfsnap-libfile-{}-{}", tag, std::process::id()))
            .join("library.json")
    }

    #[test]
    fn saved_library_loads_back_shared() -> Result<()> {
        let path = temp_library("shared");
        {
            let (lib, mut store) = LibraryFile::open(&path)?;
            assert_eq!(store, MemoryStore::new());
            store.insert_manga(&Manga {
                source_id: 1,
                url: "/title/a".into(),
                title: "A".into(),
                favorite: true,
                ..Default::default()
            })?;
            lib.save(&store)?;
        }
        let first = LibraryFile::load_shared(&path)?;
        let second = LibraryFile::load_shared(&path)?;
        assert_eq!(first, second);
        assert_eq!(first.favorite_manga()?.len(), 1);

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
        Ok(())
    }
}
