//! Explicit, threaded configuration. Never a global: every module that
//! branches on these values takes a `&Config` or a `Config` (it is `Copy`).

/// Production default cache line: 4 MiB.
pub const DEFAULT_CACHE_LINE_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// When false, trusts offsets and skips signature/version checks.
    /// On by default: malformed byte ranges are cheaper to catch here
    /// than to chase as a garbled read downstream.
    pub error_checking: bool,

    /// Emits a trace of every structure visited through the `log` facade.
    pub verbose: bool,

    /// Granularity of the byte-range cache. Tests use small values (16-64 B)
    /// to exercise splicing without allocating megabytes per fixture.
    pub cache_line_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            error_checking: true,
            verbose: false,
            cache_line_size: DEFAULT_CACHE_LINE_SIZE,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_line_size(mut self, size: u64) -> Self {
        self.cache_line_size = size;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_error_checking(mut self, on: bool) -> Self {
        self.error_checking = on;
        self
    }
}
