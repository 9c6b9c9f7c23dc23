//! Inclusion bitmask for snapshot creation.
//!
//! Each part is a (mask, value) pair; a part is included when `bits & mask == value`.

use anyhow::{anyhow, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackupFlags(u32);

impl BackupFlags {
    pub const CATEGORY: u32 = 0x1;
    pub const CATEGORY_MASK: u32 = 0x1;
    pub const CHAPTER: u32 = 0x2;
    pub const CHAPTER_MASK: u32 = 0x2;
    pub const HISTORY: u32 = 0x4;
    pub const HISTORY_MASK: u32 = 0x4;
    pub const TRACK: u32 = 0x8;
    pub const TRACK_MASK: u32 = 0x8;
    pub const READ_MANGA: u32 = 0x10;
    pub const READ_MANGA_MASK: u32 = 0x10;

    const NAMES: [(&'static str, u32); 5] = [
        ("categories", Self::CATEGORY),
        ("chapters", Self::CHAPTER),
        ("history", Self::HISTORY),
        ("tracking", Self::TRACK),
        ("read-manga", Self::READ_MANGA),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn none() -> Self {
        Self(0)
    }

    /// Every part except read-but-not-in-library manga.
    pub const fn library_default() -> Self {
        Self(Self::CATEGORY | Self::CHAPTER | Self::HISTORY | Self::TRACK)
    }

    pub const fn all() -> Self {
        Self(Self::CATEGORY | Self::CHAPTER | Self::HISTORY | Self::TRACK | Self::READ_MANGA)
    }

    pub fn with(self, bit: u32) -> Self {
        Self(self.0 | bit)
    }

    pub fn without(self, bit: u32) -> Self {
        Self(self.0 & !bit)
    }

    #[inline]
    pub fn includes(self, mask: u32, value: u32) -> bool {
        self.0 & mask == value
    }

    pub fn categories(self) -> bool {
        self.includes(Self::CATEGORY_MASK, Self::CATEGORY)
    }

    pub fn chapters(self) -> bool {
        self.includes(Self::CHAPTER_MASK, Self::CHAPTER)
    }

    pub fn history(self) -> bool {
        self.includes(Self::HISTORY_MASK, Self::HISTORY)
    }

    pub fn tracking(self) -> bool {
        self.includes(Self::TRACK_MASK, Self::TRACK)
    }

    pub fn read_manga(self) -> bool {
        self.includes(Self::READ_MANGA_MASK, Self::READ_MANGA)
    }

    /// Parse a comma separated list ("chapters,history"). "all" and "none" are accepted.
    pub fn parse(s: &str) -> Result<Self> {
        let mut out = Self::none();
        for part in s.split(',').map(|p| p.trim().to_ascii_lowercase()) {
            if part.is_empty() {
                continue;
            }
            match part.as_str() {
                "all" => out = Self::all(),
                "none" => out = Self::none(),
                name => {
                    let bit = Self::NAMES
                        .iter()
                        .find(|(n, _)| *n == name)
                        .map(|(_, b)| *b)
                        .ok_or_else(|| anyhow!("unknown backup flag '{}'", name))?;
                    out = out.with(bit);
                }
            }
        }
        Ok(out)
    }
}

impl Default for BackupFlags {
    fn default() -> Self {
        Self::library_default()
    }
}

impl fmt::Display for BackupFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, bit)| self.includes(*bit, *bit))
            .map(|(n, _)| *n)
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(","))
        }
    }
}
