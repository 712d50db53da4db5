//! The one inbound collaborator this crate depends on: a byte-addressable
//! resource. HTTP range-get, object-store, and local-file drivers all
//! implement this trait; none of them are part of this crate.

use crate::error::Result;

/// `Send + Sync`: held behind `Arc<dyn Driver>` and called concurrently by
/// however many workers the coordinator fans a multi-path request out to
/// (see `cache::Cache`, which serializes only its line table, not reads
/// that miss it).
pub trait Driver: Send + Sync {
    /// Returns exactly `length` bytes read from `offset`, or a fatal error.
    /// A short read (fewer bytes than requested) must be reported as an
    /// error, not returned silently truncated.
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>>;
}

/// An in-memory driver over a byte slice, used by tests and small embedded
/// resources. Out-of-range reads are a format error, not a panic.
pub struct SliceDriver {
    bytes: Vec<u8>,
}

impl SliceDriver {
    pub fn new(bytes: Vec<u8>) -> Self {
        SliceDriver { bytes }
    }
}

impl Driver for SliceDriver {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let start = offset as usize;
        let end = start + length as usize;

        if end > self.bytes.len() {
            return Err(crate::error::Error::format(format!(
                "read past end of resource: requested [{}, {}), resource is {} bytes",
                start, end, self.bytes.len()
            )));
        }

        Ok(self.bytes[start..end].to_vec())
    }
}
