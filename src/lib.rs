#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,
)]

#![deny(
    unused_must_use,
    trivial_numeric_casts,
    redundant_semicolon
)]

#![forbid(unsafe_code)]

//! Cloud-optimized reader for the HDF5 hierarchical binary file format.
//!
//! Given a byte-addressable resource (anything implementing [`driver::Driver`])
//! and a set of dataset paths, resolves the on-disk object-header graph from
//! the superblock down to each requested dataset and materializes its bytes,
//! without requiring a full HDF5 runtime and without downloading the whole
//! file: reads are coalesced through a range cache (see [`cache::Cache`]).

pub mod attribute;
pub mod cache;
pub mod chunk;
pub mod compression;
pub mod config;
pub mod coordinator;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod group;
pub mod io;
pub mod message;
pub mod object_header;
pub mod superblock;

pub use config::Config;
pub use coordinator::{open, DatasetResult, Handle};
pub use dataset::{Datatype, Layout, VariableMetadata, ALL_ROWS};
pub use driver::{Driver, SliceDriver};
pub use error::{Error, Result};

/// Re-exports of the types most commonly needed to open a file and read a
/// handful of datasets.
pub mod prelude {
    pub use crate::attribute::AttributeValue;
    pub use crate::config::Config;
    pub use crate::coordinator::{open, DatasetResult, Handle};
    pub use crate::dataset::{Datatype, Layout, VariableMetadata, ALL_ROWS};
    pub use crate::driver::Driver;
    pub use crate::error::{Error, Result};
}
