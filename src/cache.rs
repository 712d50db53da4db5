//! Byte-range cache: turns pointer-chasing reads into a bounded number of
//! coarse, aligned fetches. Lines are immutable once inserted, so readers
//! can clone an `Arc<[u8]>` and release the mutex before slicing it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::driver::Driver;
use crate::error::Result;

pub struct Cache {
    driver: Arc<dyn Driver>,
    line_size: u64,
    base_address: u64,
    lines: Mutex<HashMap<u64, Arc<[u8]>>>,
}

impl Cache {
    pub fn new(driver: Box<dyn Driver>, line_size: u64, base_address: u64) -> Self {
        Self::new_shared(Arc::from(driver), line_size, base_address)
    }

    /// Shares an already-`Arc`'d driver with another cache — used by the
    /// coordinator to rebuild the cache with the real base address once the
    /// superblock (read through a base_address=0 bootstrap cache) is known.
    pub fn new_shared(driver: Arc<dyn Driver>, line_size: u64, base_address: u64) -> Self {
        Cache {
            driver,
            line_size,
            base_address,
            lines: Mutex::new(HashMap::new()),
        }
    }

    pub fn driver(&self) -> Arc<dyn Driver> {
        self.driver.clone()
    }

    fn line_start(&self, abs: u64) -> u64 {
        abs - (abs % self.line_size)
    }

    fn fetch_line(&self, line_start: u64) -> Result<Arc<[u8]>> {
        {
            let lines = self.lines.lock().unwrap();
            if let Some(bytes) = lines.get(&line_start) {
                return Ok(bytes.clone());
            }
        }

        let fetched = self.driver.read(line_start, self.line_size)?;
        let bytes: Arc<[u8]> = Arc::from(fetched.into_boxed_slice());

        let mut lines = self.lines.lock().unwrap();
        let bytes = lines.entry(line_start).or_insert(bytes).clone();
        Ok(bytes)
    }

    /// Reads `size` bytes starting at file-native offset `pos` (base address
    /// not yet applied). Requests larger than the line size bypass the cache
    /// entirely; everything else is served from one or two spliced lines.
    pub fn io_request(&self, pos: u64, size: u64) -> Result<Vec<u8>> {
        let abs = pos + self.base_address;

        if size > self.line_size {
            return self.driver.read(abs, size);
        }
        if size == 0 {
            return Ok(Vec::new());
        }

        let line = self.line_start(abs);
        let within = (abs - line) as usize;
        let end = within + size as usize;

        let first = self.fetch_line(line)?;

        if end <= first.len() {
            return Ok(first[within..end].to_vec());
        }

        let next_line = line + self.line_size;
        let second = self.fetch_line(next_line)?;

        let mut out = Vec::with_capacity(size as usize);
        out.extend_from_slice(&first[within..]);
        out.extend_from_slice(&second[..end - first.len()]);
        Ok(out)
    }

    pub fn line_size(&self) -> u64 {
        self.line_size
    }
}
