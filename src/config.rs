//! Centralized configuration for snapshot writing and restoring.
//!
//! `SnapConfig::from_env()` reads the env vars below; fluent `with_*` setters
//! override single fields afterwards.
//!
//! - SHELFSNAP_RETENTION_CAP      scheduled snapshots kept (default 6, min 1)
//! - SHELFSNAP_COMPRESSION_LEVEL  gzip level 0..=9 (default 6)
//! - SHELFSNAP_AUTO_DIR           sub-directory for scheduled snapshots (default "automatic")
//! - SHELFSNAP_ERROR_LOG_DIR      where the restore error log goes (default: OS temp dir)
//! - SHELFSNAP_FLAGS              default inclusion flags, e.g. "chapters,history"

use std::fmt;
use std::path::PathBuf;

use log::warn;

use crate::model::BackupFlags;

pub const DEFAULT_RETENTION_CAP: usize = 6;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
pub const DEFAULT_AUTO_DIR: &str = "automatic";
pub const ERROR_LOG_FILE: &str = "shelfsnap_restore.log";

#[derive(Clone, Debug)]
pub struct SnapConfig {
    /// Maximum scheduled snapshots kept in the automatic directory, the new one included.
    pub retention_cap: usize,

    /// gzip level for the snapshot container.
    pub compression_level: u32,

    /// Name of the sub-directory used for scheduled snapshots.
    pub automatic_dir_name: String,

    /// Directory holding the fixed-name restore error log.
    pub error_log_dir: PathBuf,

    /// Flags used when a caller does not pass any.
    pub default_flags: BackupFlags,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            retention_cap: DEFAULT_RETENTION_CAP,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            automatic_dir_name: DEFAULT_AUTO_DIR.to_string(),
            error_log_dir: std::env::temp_dir(),
            default_flags: BackupFlags::library_default(),
        }
    }
}

impl SnapConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SHELFSNAP_RETENTION_CAP") {
            match v.trim().parse::<usize>() {
                Ok(n) => cfg.retention_cap = n.max(1),
                Err(_) => warn!("config: ignoring SHELFSNAP_RETENTION_CAP={:?}", v),
            }
        }

        if let Ok(v) = std::env::var("SHELFSNAP_COMPRESSION_LEVEL") {
            match v.trim().parse::<u32>() {
                Ok(n) => cfg.compression_level = n.min(9),
                Err(_) => warn!("config: ignoring SHELFSNAP_COMPRESSION_LEVEL={:?}", v),
            }
        }

        if let Ok(v) = std::env::var("SHELFSNAP_AUTO_DIR") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.automatic_dir_name = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("SHELFSNAP_ERROR_LOG_DIR") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.error_log_dir = PathBuf::from(s);
            }
        }

        if let Ok(v) = std::env::var("SHELFSNAP_FLAGS") {
            match BackupFlags::parse(&v) {
                Ok(f) => cfg.default_flags = f,
                Err(e) => warn!("config: ignoring SHELFSNAP_FLAGS: {}", e),
            }
        }

        cfg
    }

    pub fn with_retention_cap(mut self, cap: usize) -> Self {
        self.retention_cap = cap.max(1);
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn with_automatic_dir_name<S: Into<String>>(mut self, name: S) -> Self {
        self.automatic_dir_name = name.into();
        self
    }

    pub fn with_error_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.error_log_dir = dir.into();
        self
    }

    pub fn with_default_flags(mut self, flags: BackupFlags) -> Self {
        self.default_flags = flags;
        self
    }

    /// Fixed location of the restore error log.
    pub fn error_log_path(&self) -> PathBuf {
        self.error_log_dir.join(ERROR_LOG_FILE)
    }
}

impl fmt::Display for SnapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SnapConfig {{ \
             retention_cap: {}, \
             compression_level: {}, \
             automatic_dir_name: {}, \
             error_log: {}, \
             default_flags: {} \
             }}",
            self.retention_cap,
            self.compression_level,
            self.automatic_dir_name,
            self.error_log_path().display(),
            self.default_flags,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_clamp() {
        let cfg = SnapConfig::default()
            .with_retention_cap(0)
            .with_compression_level(42)
            .with_error_log_dir("/var/tmp");
        assert_eq!(cfg.retention_cap, 1);
        assert_eq!(cfg.compression_level, 9);
        assert_eq!(cfg.error_log_path(), PathBuf::from("/var/tmp").join(ERROR_LOG_FILE));
        assert!(cfg.to_string().contains("retention_cap: 1"));
    }
}
