//! Request coordinator (§4.8): owns the shared cache/superblock/config and
//! dispatches one worker per requested dataset path, optionally running
//! them in parallel over a thread pool.

use std::collections::HashMap;
use std::sync::Arc;

use crate::attribute::AttributeValue;
use crate::cache::Cache;
use crate::config::Config;
use crate::dataset::{Datatype, DatasetState, Layout, VariableMetadata};
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::io::Cursor;
use crate::object_header;
use crate::chunk;
use crate::superblock::Superblock;

pub struct Handle {
    cache: Arc<Cache>,
    sb: Superblock,
    config: Config,
}

#[derive(Debug, Clone)]
pub struct DatasetResult {
    pub element_count: u64,
    pub data_bytes: u64,
    pub data: Vec<u8>,
    pub row_count: u64,
    pub col_count: u64,
    pub type_size: u64,
    pub datatype: Datatype,
    pub signed: bool,
}

pub fn open(driver: Box<dyn Driver>, config: Config) -> Result<Handle> {
    let driver: Arc<dyn Driver> = Arc::from(driver);

    let bootstrap_cache = Arc::new(Cache::new_shared(driver.clone(), config.cache_line_size, 0));
    let sb = Superblock::read(&bootstrap_cache)?;

    // The superblock's own fields were read through a base_address=0
    // bootstrap cache; every later read needs the real base address, so
    // the production cache shares the same driver with it baked in.
    let cache = Arc::new(Cache::new_shared(driver, config.cache_line_size, sb.base_address));

    if config.verbose {
        log::debug!(
            "superblock: offset_size={} length_size={} base_address={} root={}",
            sb.offset_size, sb.length_size, sb.base_address, sb.root_group_offset
        );
    }

    Ok(Handle { cache, sb, config })
}

impl Handle {
    pub fn read_datasets(
        &self,
        paths: &[&str],
        start_row: i64,
        num_rows: i64,
        meta_only: bool,
    ) -> HashMap<String, Result<DatasetResult>> {
        let jobs: Vec<String> = paths.iter().map(|p| p.to_string()).collect();

        #[cfg(feature = "rayon")]
        let results: Vec<(String, Result<DatasetResult>)> = {
            use rayon::prelude::*;
            jobs.par_iter()
                .map(|path| {
                    let result = self.read_one(path, start_row, num_rows, meta_only);
                    (path.clone(), result)
                })
                .collect()
        };

        #[cfg(not(feature = "rayon"))]
        let results: Vec<(String, Result<DatasetResult>)> = jobs
            .iter()
            .map(|path| {
                let result = self.read_one(path, start_row, num_rows, meta_only);
                (path.clone(), result)
            })
            .collect();

        results.into_iter().collect()
    }

    pub fn read_attribute(&self, path: &str) -> Result<AttributeValue> {
        let result = self.read_one(path, 0, crate::dataset::ALL_ROWS, false)?;
        Ok(AttributeValue::decode(result.datatype, result.signed, result.type_size, &result.data))
    }

    pub fn inspect_variable(&self, path: &str) -> Result<VariableMetadata> {
        let state = self.walk_to(path, 0, crate::dataset::ALL_ROWS, true)?;
        Ok(VariableMetadata::from(&state))
    }

    fn walk_to(&self, path: &str, start_row: i64, num_rows: i64, meta_only: bool) -> Result<DatasetState> {
        let components = split_path(path);
        let mut state = DatasetState::new(components, start_row, num_rows, meta_only);

        let mut cursor = Cursor::new(self.cache.clone(), 0);
        object_header::walk(&mut cursor, self.sb.root_group_offset, &self.sb, &mut state, &self.config)?;

        if !state.found {
            return Err(Error::format(format!("path not found: {}", path)));
        }

        Ok(state)
    }

    fn read_one(&self, path: &str, start_row: i64, num_rows: i64, meta_only: bool) -> Result<DatasetResult> {
        let state = self.walk_to(path, start_row, num_rows, meta_only)?;

        let datatype = state.datatype.ok_or_else(|| Error::format("missing datatype message"))?;
        if state.type_size == 0 {
            return Err(Error::format("zero-size datatype"));
        }

        let layout = state.layout.ok_or_else(|| Error::format("missing data layout message"))?;

        if meta_only {
            return Ok(DatasetResult {
                element_count: 0,
                data_bytes: 0,
                data: Vec::new(),
                row_count: 0,
                col_count: state.dimensions.get(1).copied().unwrap_or(1),
                type_size: state.type_size,
                datatype,
                signed: state.signed,
            });
        }

        let effective_start = state.start_row.max(0) as u64;
        let effective_rows = state.effective_num_rows();
        if effective_start + effective_rows > state.dimensions.first().copied().unwrap_or(effective_start + effective_rows) {
            return Err(Error::bounds(format!(
                "start_row + num_rows ({}) exceeds dimension 0 ({})",
                effective_start + effective_rows,
                state.dimensions.first().copied().unwrap_or(0)
            )));
        }

        let data = match layout {
            Layout::Compact => state.compact_data.clone().unwrap_or_default(),
            Layout::Contiguous => {
                let row_size = state.row_elements() * state.type_size;
                let offset = state.data_address + effective_start * row_size;
                let size = if state.ndims == 0 { state.data_size } else { effective_rows * row_size };
                let mut cursor = Cursor::new(self.cache.clone(), offset);
                cursor.read_array(size)?
            }
            Layout::Chunked => {
                let mut cursor = Cursor::new(self.cache.clone(), 0);
                chunk::read_chunked(&mut cursor, state.data_address, &self.sb, &state, &self.config)?
            }
        };

        let element_count = if state.type_size == 0 { 0 } else { data.len() as u64 / state.type_size };
        let col_count = state.dimensions.get(1).copied().unwrap_or(1);
        let row_count = if col_count == 0 { 0 } else { element_count / col_count.max(1) };

        Ok(DatasetResult {
            element_count,
            data_bytes: data.len() as u64,
            data,
            row_count,
            col_count,
            type_size: state.type_size,
            datatype,
            signed: state.signed,
        })
    }

    /// Enumerates the direct children of a group (names only). `path` may
    /// be empty to list the root group.
    pub fn list_group(&self, path: &str) -> Result<Vec<String>> {
        let components = split_path(path);
        let mut state = DatasetState::new(components, 0, crate::dataset::ALL_ROWS, true);
        state.list_mode = true;

        let mut cursor = Cursor::new(self.cache.clone(), 0);
        object_header::walk(&mut cursor, self.sb.root_group_offset, &self.sb, &mut state, &self.config)?;

        if !state.found {
            return Err(Error::format(format!("group not found: {}", path)));
        }

        Ok(state.listed_names)
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/').filter(|c| !c.is_empty()).map(str::to_string).collect()
}
