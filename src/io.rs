//! Cursor over the byte-range cache, and little-endian primitive decoding.
//!
//! Unlike a `std::io::Read` stream, a `Cursor` can seek anywhere in the
//! resource at any time (object-header walks jump between continuation
//! blocks, link targets, and heap records), so it owns a `pos` rather than
//! wrapping a `Read` impl directly. All reads still flow through the cache.

use std::sync::Arc;

use crate::cache::Cache;
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct Cursor {
    cache: Arc<Cache>,
    pos: u64,
}

impl Cursor {
    pub fn new(cache: Arc<Cache>, pos: u64) -> Self {
        Cursor { cache, pos }
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn advance(&mut self, count: u64) {
        self.pos += count;
    }

    /// Reads a little-endian unsigned integer of `width` bytes (1, 2, 4, or
    /// 8) and advances the cursor. Widths wider than 8 are rejected.
    pub fn read_field(&mut self, width: u8) -> Result<u64> {
        if width == 0 || width > 8 {
            return Err(Error::format(format!("unsupported field width {}", width)));
        }

        let bytes = self.cache.io_request(self.pos, width as u64)?;
        self.pos += width as u64;

        let mut value = 0u64;
        for (i, byte) in bytes.iter().enumerate() {
            value |= (*byte as u64) << (8 * i);
        }
        Ok(value)
    }

    /// Reads `count` raw bytes and advances the cursor.
    pub fn read_array(&mut self, count: u64) -> Result<Vec<u8>> {
        let bytes = self.cache.io_request(self.pos, count)?;
        self.pos += count;
        Ok(bytes)
    }

    /// Reads a NUL-terminated UTF-8 string starting at the cursor's current
    /// position (used for local-heap link names). Reads 64 bytes at a time
    /// looking for the terminator, rewinding past the unused tail.
    pub fn read_cstring(&mut self) -> Result<String> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read_array(64)?;
            if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                out.extend_from_slice(&chunk[..nul]);
                self.pos -= (chunk.len() - nul - 1) as u64;
                break;
            }
            out.extend_from_slice(&chunk);
        }
        String::from_utf8(out).map_err(|e| Error::format(format!("non-utf8 name: {}", e)))
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }
}

/// `2^(8*width) - 1`: the per-width null-address/null-length sentinel used
/// throughout the format (`INVALID_VALUE` in the original source).
pub fn invalid_value(width: u8) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * width)) - 1
    }
}

pub fn is_invalid(value: u64, width: u8) -> bool {
    value == invalid_value(width)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::SliceDriver;

    fn cursor_over(bytes: Vec<u8>, line_size: u64) -> Cursor {
        let cache = Arc::new(Cache::new(Box::new(SliceDriver::new(bytes)), line_size, 0));
        Cursor::new(cache, 0)
    }

    #[test]
    fn reads_little_endian_fields_of_each_width() {
        let mut cursor = cursor_over(vec![0x78, 0x56, 0x34, 0x12, 0, 0, 0, 0], 16);
        assert_eq!(cursor.read_field(1).unwrap(), 0x78);
        cursor.seek(0);
        assert_eq!(cursor.read_field(4).unwrap(), 0x1234_5678);
    }

    #[test]
    fn round_trips_every_width() {
        for width in [1u8, 2, 4, 8] {
            let max = if width == 8 { u64::MAX } else { (1u64 << (8 * width)) - 1 };
            for value in [0u64, 1, max / 2, max] {
                let mut bytes = value.to_le_bytes().to_vec();
                bytes.truncate(width as usize);
                let mut cursor = cursor_over(bytes, 16);
                assert_eq!(cursor.read_field(width).unwrap(), value);
            }
        }
    }

    #[test]
    fn invalid_value_sentinel_matches_width() {
        assert_eq!(invalid_value(4), 0xFFFF_FFFF);
        assert_eq!(invalid_value(8), u64::MAX);
        assert!(is_invalid(0xFFFF_FFFF, 4));
        assert!(!is_invalid(0, 4));
    }
}
