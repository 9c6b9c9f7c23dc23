//! Little-endian field primitives used by the snapshot body.
//!
//! Layout rules:
//! - integers: fixed width LE
//! - f32: IEEE bits as u32 LE
//! - bool: u8 (0|1, anything else is corrupt)
//! - str: [len u32][utf8 bytes]
//! - Option<T>: [tag u8 = 0|1][T if 1]
//! - sequences: [count u32][items]

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};

use crate::error::SnapshotError;

/// Field writer. Length prefixes that do not fit in u32 poison the writer;
/// the error surfaces from [`WireWriter::into_inner`].
pub struct WireWriter {
    buf: Vec<u8>,
    oversized: Option<usize>,
}

impl WireWriter {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
            oversized: None,
        }
    }

    pub fn into_inner(self) -> Result<Vec<u8>> {
        match self.oversized {
            Some(n) => Err(SnapshotError::Encoding(format!(
                "length {} does not fit a u32 prefix",
                n
            ))
            .into()),
            None => Ok(self.buf),
        }
    }

    fn len_prefix(&mut self, n: usize) {
        match u32::try_from(n) {
            Ok(v) => self.u32(v),
            Err(_) => {
                self.oversized.get_or_insert(n);
                self.u32(u32::MAX);
            }
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    pub fn i32(&mut self, v: i32) {
        let mut b = [0u8; 4];
        LittleEndian::write_i32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    pub fn i64(&mut self, v: i64) {
        let mut b = [0u8; 8];
        LittleEndian::write_i64(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    pub fn f32(&mut self, v: f32) {
        self.u32(v.to_bits());
    }

    pub fn str(&mut self, s: &str) {
        self.len_prefix(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn opt_str(&mut self, s: Option<&str>) {
        match s {
            Some(v) => {
                self.u8(1);
                self.str(v);
            }
            None => self.u8(0),
        }
    }

    pub fn opt_i64(&mut self, v: Option<i64>) {
        match v {
            Some(n) => {
                self.u8(1);
                self.i64(n);
            }
            None => self.u8(0),
        }
    }

    pub fn count(&mut self, n: usize) {
        self.len_prefix(n);
    }
}

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(SnapshotError::corrupt(format!(
                "truncated body reading {} at off={} (need {}, have {})",
                what,
                self.pos,
                n,
                self.remaining()
            ))
            .into());
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn bool(&mut self, what: &str) -> Result<bool> {
        match self.u8(what)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SnapshotError::corrupt(format!("bad bool {} for {}", other, what)).into()),
        }
    }

    pub fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4, what)?))
    }

    pub fn i32(&mut self, what: &str) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4, what)?))
    }

    pub fn i64(&mut self, what: &str) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8, what)?))
    }

    pub fn f32(&mut self, what: &str) -> Result<f32> {
        Ok(f32::from_bits(self.u32(what)?))
    }

    pub fn string(&mut self, what: &str) -> Result<String> {
        let len = self.u32(what)? as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SnapshotError::corrupt(format!("invalid utf-8 in {}", what)).into())
    }

    pub fn opt_string(&mut self, what: &str) -> Result<Option<String>> {
        match self.u8(what)? {
            0 => Ok(None),
            1 => Ok(Some(self.string(what)?)),
            other => Err(SnapshotError::corrupt(format!("bad option tag {} for {}", other, what)).into()),
        }
    }

    pub fn opt_i64(&mut self, what: &str) -> Result<Option<i64>> {
        match self.u8(what)? {
            0 => Ok(None),
            1 => Ok(Some(self.i64(what)?)),
            other => Err(SnapshotError::corrupt(format!("bad option tag {} for {}", other, what)).into()),
        }
    }

    /// Sequence length, bounded by the bytes left so a corrupt count cannot
    /// trigger a huge allocation.
    pub fn count(&mut self, what: &str) -> Result<usize> {
        let n = self.u32(what)? as usize;
        if n > self.remaining() {
            return Err(SnapshotError::corrupt(format!(
                "{} count {} exceeds remaining {} bytes",
                what,
                n,
                self.remaining()
            ))
            .into());
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_read_back() {
        let mut w = WireWriter::with_capacity(64);
        w.bool(true);
        w.i32(-7);
        w.i64(1 << 40);
        w.f32(12.5);
        w.str("héllo");
        w.opt_str(None);
        w.opt_i64(Some(-1));
        let buf = w.into_inner().unwrap();

        let mut r = WireReader::new(&buf);
        assert!(r.bool("b").unwrap());
        assert_eq!(r.i32("i").unwrap(), -7);
        assert_eq!(r.i64("l").unwrap(), 1 << 40);
        assert_eq!(r.f32("f").unwrap(), 12.5);
        assert_eq!(r.string("s").unwrap(), "héllo");
        assert_eq!(r.opt_string("o").unwrap(), None);
        assert_eq!(r.opt_i64("o").unwrap(), Some(-1));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn truncated_is_corrupt() {
        let mut w = WireWriter::with_capacity(8);
        w.str("abcdef");
        let buf = w.into_inner().unwrap();
        let mut r = WireReader::new(&buf[..6]);
        let err = r.string("title").unwrap_err();
        assert!(matches!(SnapshotError::of(&err), Some(SnapshotError::Corrupt(_))));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_count_fails_encoding() {
        let mut w = WireWriter::with_capacity(8);
        w.count(u32::MAX as usize);
        assert!(w.into_inner().is_ok());

        let mut w = WireWriter::with_capacity(8);
        w.count(u32::MAX as usize + 1);
        w.bool(true);
        let err = w.into_inner().unwrap_err();
        assert!(matches!(SnapshotError::of(&err), Some(SnapshotError::Encoding(_))));
    }

    #[test]
    fn bad_bool_is_corrupt() {
        let buf = [7u8];
        let mut r = WireReader::new(&buf);
        assert!(r.bool("read").is_err());
    }
}
