//! Error taxonomy for the format decoder.
//!
//! A small closed enum, not a boxed-dyn catch-all: every fallible operation
//! returns `crate::error::Result<T>`.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;
pub type PassiveResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


#[derive(Debug)]
pub enum Error {
    /// Malformed or unexpected on-disk structure: bad signature, unsupported
    /// version, inconsistent field. Carries a description of what was found.
    Format(String),

    /// A recognized but unimplemented feature of the format (compound
    /// datatypes, non-DEFLATE/SHUFFLE filters, soft/external links, rank > 2).
    NotSupported(String),

    /// A request outside the bounds of the dataset (row range, declared size).
    Bounds(String),

    /// Failure inside the inflate or shuffle pipeline.
    Decompression(String),

    /// Propagated failure from the byte-range driver.
    Io(IoError),
}


impl Error {
    pub fn format(message: impl Into<String>) -> Self {
        Error::Format(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::NotSupported(message.into())
    }

    pub fn bounds(message: impl Into<String>) -> Self {
        Error::Bounds(message.into())
    }

    pub fn decompression(message: impl Into<String>) -> Self {
        Error::Decompression(message.into())
    }

    /// Only a malformed structure is skipped during header iteration — the
    /// rest of the header may still resolve the requested path even if one
    /// message in it doesn't parse. A recognized-but-unsupported feature
    /// (a soft link on the requested path, a filtered fractal heap, ...) is
    /// fatal: skipping it would silently resolve the read as though the
    /// feature weren't there instead of reporting that it is unsupported.
    pub fn is_skippable_in_header_walk(&self) -> bool {
        matches!(self, Error::Format(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Format(msg) => write!(f, "malformed HDF5 structure: {}", msg),
            Error::NotSupported(msg) => write!(f, "unsupported feature: {}", msg),
            Error::Bounds(msg) => write!(f, "out of bounds: {}", msg),
            Error::Decompression(msg) => write!(f, "decompression failed: {}", msg),
            Error::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Enable using the `?` operator on io::Result
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}
