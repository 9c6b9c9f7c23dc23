//! Opaque snapshot locations.
//!
//! The writer, validator and orchestrator only need four capabilities from
//! wherever snapshots live: open for write (truncating), open for read, list a
//! directory filtered by name, delete. [`FsStorage`] maps them onto the local
//! filesystem with `PathBuf` handles.

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

pub trait SnapshotStorage {
    type Handle: Clone + fmt::Display;

    /// Open (creating if needed) and truncate to zero length.
    fn open_write(&self, handle: &Self::Handle) -> Result<Box<dyn Write>>;

    fn open_read(&self, handle: &Self::Handle) -> Result<Box<dyn Read>>;

    /// Files directly inside `dir` whose name satisfies `matches`, as (name, handle).
    fn list(&self, dir: &Self::Handle, matches: &dyn Fn(&str) -> bool)
        -> Result<Vec<(String, Self::Handle)>>;

    fn delete(&self, handle: &Self::Handle) -> Result<()>;

    /// Sub-directory `name` of `dir`, created if missing.
    fn subdir(&self, dir: &Self::Handle, name: &str) -> Result<Self::Handle>;

    /// Handle of file `name` inside `dir` (not created).
    fn child(&self, dir: &Self::Handle, name: &str) -> Self::Handle;
}

/// Filesystem handle wrapper so `Display` is available.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FsPath(pub PathBuf);

impl FsPath {
    pub fn new<P: Into<PathBuf>>(p: P) -> Self {
        Self(p.into())
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

impl SnapshotStorage for FsStorage {
    type Handle = FsPath;

    fn open_write(&self, handle: &FsPath) -> Result<Box<dyn Write>> {
        if let Some(parent) = handle.0.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create dir {}", parent.display()))?;
            }
        }
        let f: File = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&handle.0)
            .with_context(|| format!("open {} for write", handle))?;
        Ok(Box::new(f))
    }

    fn open_read(&self, handle: &FsPath) -> Result<Box<dyn Read>> {
        let f = OpenOptions::new()
            .read(true)
            .open(&handle.0)
            .with_context(|| format!("open {} for read", handle))?;
        Ok(Box::new(f))
    }

    fn list(&self, dir: &FsPath, matches: &dyn Fn(&str) -> bool) -> Result<Vec<(String, FsPath)>> {
        let mut out = Vec::new();
        if !dir.0.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(&dir.0).with_context(|| format!("list {}", dir))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(n) => n,
                Err(_) => continue,
            };
            if matches(&name) {
                out.push((name, FsPath(entry.path())));
            }
        }
        Ok(out)
    }

    fn delete(&self, handle: &FsPath) -> Result<()> {
        fs::remove_file(&handle.0).with_context(|| format!("delete {}", handle))
    }

    fn subdir(&self, dir: &FsPath, name: &str) -> Result<FsPath> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(anyhow!("bad directory name '{}'", name));
        }
        let p = dir.0.join(name);
        if !p.exists() {
            fs::create_dir_all(&p).with_context(|| format!("create dir {}", p.display()))?;
        }
        Ok(FsPath(p))
    }

    fn child(&self, dir: &FsPath, name: &str) -> FsPath {
        FsPath(dir.0.join(name))
    }
}
