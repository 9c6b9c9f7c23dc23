//! Advisory file locks (fs2) guarding a library file against concurrent writers.
//!
//! - Exclusive: restore into a library, or a restore lease; one holder at a time.
//! - Shared: read-only library loads for backup; readers do not block each other.
//!
//! Lock file path: `<target>.lock` next to the guarded file.
//! Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

pub fn lock_file_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

fn open_lock_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create lock dir {}", parent.display()))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))
}

/// Acquire a lock on `target` in the requested mode. Blocks until acquired.
pub fn acquire_lock(target: &Path, mode: LockMode) -> Result<LockGuard> {
    let path = lock_file_path(target);
    let file = open_lock_file(&path)?;
    match mode {
        LockMode::Shared => file
            .lock_shared()
            .with_context(|| format!("lock_shared {}", path.display()))?,
        LockMode::Exclusive => file
            .lock_exclusive()
            .with_context(|| format!("lock_exclusive {}", path.display()))?,
    }
    Ok(LockGuard { file, path, mode })
}

/// Like [`acquire_lock`] but fails immediately when the lock is held elsewhere.
pub fn try_acquire_lock(target: &Path, mode: LockMode) -> Result<LockGuard> {
    let path = lock_file_path(target);
    let file = open_lock_file(&path)?;
    match mode {
        LockMode::Shared => file
            .try_lock_shared()
            .with_context(|| format!("{} is locked by another process", target.display()))?,
        LockMode::Exclusive => file
            .try_lock_exclusive()
            .with_context(|| format!("{} is locked by another process", target.display()))?,
    }
    Ok(LockGuard { file, path, mode })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_path_sits_next_to_target() {
        let p = lock_file_path(Path::new("/tmp/lib/library.json"));
        assert_eq!(p, PathBuf::from("/tmp/lib/library.json.lock"));
    }

    #[test]
    fn second_exclusive_try_fails() {
        let target = std::env::temp_dir().join(format!(
            "shelfsnap-lock-{}-{}.json",
            std::process::id(),
            line!()
        ));
        let g = try_acquire_lock(&target, LockMode::Exclusive).unwrap();
        assert_eq!(g.mode(), LockMode::Exclusive);
        assert!(try_acquire_lock(&target, LockMode::Exclusive).is_err());
        drop(g);
        assert!(try_acquire_lock(&target, LockMode::Exclusive).is_ok());
        let _ = std::fs::remove_file(lock_file_path(&target));
    }

    #[test]
    fn shared_locks_coexist_but_exclude_writers() {
        let target = std::env::temp_dir().join(format!(
            "shelfsnap-lock-{}-{}.json",
            std::process::id(),
            line!()
        ));
        let a = try_acquire_lock(&target, LockMode::Shared).unwrap();
        let b = try_acquire_lock(&target, LockMode::Shared).unwrap();
        assert_eq!(b.mode(), LockMode::Shared);
        assert!(try_acquire_lock(&target, LockMode::Exclusive).is_err());
        drop(a);
        drop(b);
        assert!(try_acquire_lock(&target, LockMode::Exclusive).is_ok());
        let _ = std::fs::remove_file(lock_file_path(&target));
    }
}
