//! The mutable state threaded through one worker's walk to a single
//! dataset: everything the message handlers (§F) populate and the chunk
//! reconstructor (§H) consumes.

use smallvec::SmallVec;

pub const ALL_ROWS: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    FixedPoint,
    FloatingPoint,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Compact,
    Contiguous,
    Chunked,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Filters {
    pub deflate: bool,
    pub shuffle: bool,
    pub fletcher32: bool,
    pub szip: bool,
    pub nbit: bool,
    pub scaleoffset: bool,
}

/// Small fixed arrays use `SmallVec` since the format here is restricted to
/// rank <= 2 (see Non-goals): almost every dimension array fits inline.
pub type Dims = SmallVec<[u64; 2]>;

#[derive(Debug, Clone)]
pub struct DatasetState {
    pub path: Vec<String>,
    pub level: usize,
    pub found: bool,

    pub datatype: Option<Datatype>,
    pub signed: bool,
    pub type_size: u64,

    pub ndims: usize,
    pub dimensions: Dims,

    pub layout: Option<Layout>,
    pub data_address: u64,
    pub data_size: u64,
    pub compact_data: Option<Vec<u8>>,

    pub chunk_dims: Dims,
    pub chunk_elements: u64,
    pub element_size: u64,

    pub fill_size: u64,
    pub fill_value: Vec<u8>,

    pub filters: Filters,

    pub start_row: i64,
    pub num_rows: i64,

    pub meta_only: bool,

    /// When set, a symbol-table/link-info message encountered exactly at
    /// the target path enumerates its children's names instead of
    /// resolving the next path component.
    pub list_mode: bool,
    pub listed_names: Vec<String>,
}

impl DatasetState {
    pub fn new(path: Vec<String>, start_row: i64, num_rows: i64, meta_only: bool) -> Self {
        DatasetState {
            path,
            level: 0,
            found: false,
            datatype: None,
            signed: false,
            type_size: 0,
            ndims: 0,
            dimensions: Dims::new(),
            layout: None,
            data_address: u64::MAX,
            data_size: 0,
            compact_data: None,
            chunk_dims: Dims::new(),
            chunk_elements: 0,
            element_size: 0,
            fill_size: 0,
            fill_value: Vec::new(),
            filters: Filters::default(),
            start_row,
            num_rows,
            meta_only,
            list_mode: false,
            listed_names: Vec::new(),
        }
    }

    pub fn current_component(&self) -> Option<&str> {
        self.path.get(self.level).map(String::as_str)
    }

    pub fn is_last_component(&self) -> bool {
        self.level + 1 == self.path.len()
    }

    /// True once the walk has descended past every path component — i.e.
    /// the object header currently being parsed *is* the target object.
    pub fn at_target(&self) -> bool {
        self.level == self.path.len()
    }

    pub fn chunk_buf_size(&self) -> u64 {
        self.chunk_elements * self.type_size
    }

    pub fn row_elements(&self) -> u64 {
        self.dimensions.iter().skip(1).product::<u64>().max(1)
    }

    pub fn effective_num_rows(&self) -> u64 {
        if self.num_rows == ALL_ROWS {
            self.dimensions.first().copied().unwrap_or(0).saturating_sub(self.start_row as u64)
        } else {
            self.num_rows as u64
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariableMetadata {
    pub datatype: Datatype,
    pub signed: bool,
    pub type_size: u64,
    pub dimensions: Vec<u64>,
    pub layout: Layout,
    pub filters: Filters,
}

impl From<&DatasetState> for VariableMetadata {
    fn from(state: &DatasetState) -> Self {
        VariableMetadata {
            datatype: state.datatype.unwrap_or(Datatype::FixedPoint),
            signed: state.signed,
            type_size: state.type_size,
            dimensions: state.dimensions.iter().copied().collect(),
            layout: state.layout.unwrap_or(Layout::Contiguous),
            filters: state.filters,
        }
    }
}
