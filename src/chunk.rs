//! Chunk B-tree v1 (node-type 1) traversal and chunk reconstruction (§4.7):
//! locates the chunks overlapping a row range, decompresses/unshuffles
//! each into its slot, and re-flattens non-trivially-shaped chunks.

use smallvec::SmallVec;

use crate::compression;
use crate::config::Config;
use crate::dataset::DatasetState;
use crate::error::{Error, Result};
use crate::io::Cursor;
use crate::superblock::Superblock;

struct ChunkKey {
    chunk_size: u64,
    filter_mask: u32,
    slice: SmallVec<[u64; 2]>,
}

pub fn read_chunked(cursor: &mut Cursor, btree_addr: u64, sb: &Superblock, state: &DatasetState, config: &Config) -> Result<Vec<u8>> {
    if state.filters.fletcher32 || state.filters.szip || state.filters.nbit || state.filters.scaleoffset {
        return Err(Error::unsupported("filter pipeline includes an unimplemented filter (fletcher32/szip/nbit/scaleoffset)"));
    }
    if state.filters.shuffle && !state.filters.deflate {
        return Err(Error::unsupported("shuffle filter unsupported on uncompressed chunk"));
    }

    let row_size = state.row_elements() * state.type_size;
    let num_rows = state.effective_num_rows();
    let buffer_len = (num_rows * row_size) as usize;

    let mut buffer = vec![0u8; buffer_len];
    if state.fill_size > 0 {
        fill_with(&mut buffer, &state.fill_value);
    }

    let data_key1 = state.start_row as u64;
    let data_key2 = data_key1 + num_rows.saturating_sub(1);
    let buffer_offset = data_key1 * row_size;

    visit_btree_node(cursor, btree_addr, sb, state, config, data_key1, data_key2, buffer_offset, row_size, &mut buffer)?;

    let dims_mismatch = state.chunk_dims.len() > 1
        && state.chunk_dims.last().copied() != state.dimensions.last().copied();
    if dims_mismatch {
        return Ok(flatten(&buffer, state));
    }

    Ok(buffer)
}

fn fill_with(buffer: &mut [u8], fill_value: &[u8]) {
    if fill_value.is_empty() {
        return;
    }
    for chunk in buffer.chunks_mut(fill_value.len()) {
        let n = chunk.len();
        chunk.copy_from_slice(&fill_value[..n]);
    }
}

#[allow(clippy::too_many_arguments)]
fn visit_btree_node(
    cursor: &mut Cursor,
    addr: u64,
    sb: &Superblock,
    state: &DatasetState,
    config: &Config,
    data_key1: u64,
    data_key2: u64,
    buffer_offset: u64,
    row_size: u64,
    buffer: &mut [u8],
) -> Result<()> {
    cursor.seek(addr);
    let magic = cursor.read_array(4)?;
    if config.error_checking && &magic != b"TREE" {
        return Err(Error::format("missing TREE signature"));
    }
    let node_type = cursor.read_field(1)?;
    if config.error_checking && node_type != 1 {
        return Err(Error::format("expected chunk (node-type 1) b-tree node"));
    }
    let node_level = cursor.read_field(1)?;
    let entries_used = cursor.read_field(2)?;
    cursor.advance(2 * sb.offset_size as u64); // left/right sibling

    let ndims = state.chunk_dims.len();
    let mut keys = Vec::with_capacity(entries_used as usize + 1);
    let mut children = Vec::with_capacity(entries_used as usize);

    for _ in 0..entries_used {
        keys.push(read_chunk_key(cursor, ndims)?);
        children.push(cursor.read_field(sb.offset_size)?);
    }
    keys.push(read_chunk_key(cursor, ndims)?); // trailing sentinel key (chunk_size == 0)

    for (i, &child_addr) in children.iter().enumerate() {
        let row_lo = keys[i].slice.first().copied().unwrap_or(0);
        let row_hi_exclusive = if keys[i + 1].chunk_size == 0 {
            state.dimensions.first().copied().unwrap_or(u64::MAX)
        } else {
            keys[i + 1].slice.first().copied().unwrap_or(u64::MAX)
        };

        let overlaps = data_key1 <= row_hi_exclusive.saturating_sub(1) && data_key2 >= row_lo;
        if !overlaps {
            continue;
        }

        if node_level > 0 {
            visit_btree_node(cursor, child_addr, sb, state, config, data_key1, data_key2, buffer_offset, row_size, buffer)?;
        } else {
            place_chunk(cursor, child_addr, &keys[i], sb, state, buffer_offset, buffer)?;
        }
    }

    Ok(())
}

fn read_chunk_key(cursor: &mut Cursor, ndims: usize) -> Result<ChunkKey> {
    let chunk_size = cursor.read_field(4)?;
    let filter_mask = cursor.read_field(4)? as u32;

    let mut slice = SmallVec::new();
    for _ in 0..ndims.max(1) {
        slice.push(cursor.read_field(8)?);
    }
    cursor.advance(8); // trailing zero element index

    Ok(ChunkKey { chunk_size, filter_mask, slice })
}

fn place_chunk(
    cursor: &mut Cursor,
    child_addr: u64,
    key: &ChunkKey,
    sb: &Superblock,
    state: &DatasetState,
    buffer_offset: u64,
    buffer: &mut [u8],
) -> Result<()> {
    let chunk_offset = chunk_linear_offset(&key.slice, &state.dimensions, state.type_size);
    let chunk_buf_size = state.chunk_buf_size();

    let buffer_index = chunk_offset.saturating_sub(buffer_offset) as usize;
    let chunk_index = buffer_offset.saturating_sub(chunk_offset) as usize;

    if buffer_index >= buffer.len() {
        return Ok(()); // chunk entirely outside the requested range
    }

    let chunk_bytes = (chunk_buf_size as usize - chunk_index).min(buffer.len() - buffer_index);
    if chunk_bytes == 0 {
        return Ok(());
    }

    let _ = sb;
    cursor.seek(child_addr);

    if !state.filters.deflate && !state.filters.shuffle {
        let raw = cursor.read_array(chunk_bytes as u64)?;
        buffer[buffer_index..buffer_index + chunk_bytes].copy_from_slice(&raw);
        let _ = key.filter_mask;
        return Ok(());
    }

    let compressed = cursor.read_array(key.chunk_size as u64)?;

    let inflated = if state.filters.deflate {
        compression::inflate(&compressed, chunk_buf_size as usize)?
    } else {
        compressed
    };

    let unshuffled = if state.filters.shuffle {
        compression::unshuffle(&inflated, state.type_size as usize)
    } else {
        inflated
    };

    buffer[buffer_index..buffer_index + chunk_bytes]
        .copy_from_slice(&unshuffled[chunk_index..chunk_index + chunk_bytes]);

    Ok(())
}

/// Row-major linearization of a chunk's element-space origin.
fn chunk_linear_offset(slice: &[u64], dimensions: &[u64], type_size: u64) -> u64 {
    let mut offset = 0u64;
    for i in 0..slice.len() {
        let trailing_product: u64 = dimensions.iter().skip(i + 1).product::<u64>().max(1);
        offset += slice[i] * type_size * trailing_product;
    }
    offset
}

/// Scatters a fully-populated, chunk-order buffer into row-major order when
/// the inner chunk dimension doesn't span the whole dataset row.
fn flatten(buffer: &[u8], state: &DatasetState) -> Vec<u8> {
    let rows = state.dimensions.first().copied().unwrap_or(1);
    let cols = state.dimensions.get(1).copied().unwrap_or(1);
    let chunk_rows = state.chunk_dims.first().copied().unwrap_or(rows).max(1);
    let chunk_cols = state.chunk_dims.get(1).copied().unwrap_or(cols).max(1);

    let mut out = vec![0u8; buffer.len()];
    let element_size = state.type_size;

    let chunks_per_row = (cols + chunk_cols - 1) / chunk_cols;
    let mut src = 0usize;

    for chunk_row in 0..(rows + chunk_rows - 1) / chunk_rows {
        for chunk_col in 0..chunks_per_row {
            for inner_row in 0..chunk_rows {
                let row = chunk_row * chunk_rows + inner_row;
                if row >= rows {
                    src += (chunk_cols * element_size) as usize;
                    continue;
                }
                let col_start = chunk_col * chunk_cols;
                let width = chunk_cols.min(cols.saturating_sub(col_start));
                let dst = ((row * cols + col_start) * element_size) as usize;
                let len = (width * element_size) as usize;
                if src + len <= buffer.len() && dst + len <= out.len() {
                    out[dst..dst + len].copy_from_slice(&buffer[src..src + len]);
                }
                src += (chunk_cols * element_size) as usize;
            }
        }
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dataset::{Dims, Filters};
    use crate::driver::SliceDriver;
    use std::sync::Arc;

    fn sb() -> Superblock {
        Superblock { offset_size: 8, length_size: 8, base_address: 0, root_group_offset: 0 }
    }

    fn cursor_over(bytes: Vec<u8>) -> Cursor {
        let cache = Arc::new(crate::cache::Cache::new(Box::new(SliceDriver::new(bytes)), 64, 0));
        Cursor::new(cache, 0)
    }

    fn state_for(dims: &[u64]) -> DatasetState {
        let mut state = DatasetState::new(Vec::new(), 0, crate::dataset::ALL_ROWS, false);
        state.dimensions = Dims::from_slice(dims);
        state.chunk_dims = Dims::from_slice(dims);
        state.type_size = 8;
        state.chunk_elements = dims.iter().product::<u64>().max(1);
        state
    }

    /// TREE @0 with a single leaf chunk @200 covering the whole [0, 4) row
    /// range; the chunk itself holds four un-filtered f64 values.
    fn single_chunk_fixture() -> Vec<u8> {
        let mut bytes = vec![0u8; 256];

        bytes[0..4].copy_from_slice(b"TREE");
        bytes[4] = 1; // node_type: chunk b-tree
        bytes[5] = 0; // node_level: leaf
        bytes[6..8].copy_from_slice(&1u16.to_le_bytes()); // entries_used

        // first key: chunk_size=32, filter_mask=0, slice=[0]
        bytes[24..28].copy_from_slice(&32u32.to_le_bytes());
        bytes[32..40].copy_from_slice(&0u64.to_le_bytes());
        bytes[48..56].copy_from_slice(&200u64.to_le_bytes()); // child address

        // trailing sentinel key: chunk_size=0
        bytes[56..60].copy_from_slice(&0u32.to_le_bytes());

        for (i, v) in [1.0f64, 2.0, 3.0, 4.0].iter().enumerate() {
            bytes[200 + i * 8..200 + i * 8 + 8].copy_from_slice(&v.to_le_bytes());
        }

        bytes
    }

    #[test]
    fn reads_a_contiguous_unfiltered_chunk() {
        let mut cursor = cursor_over(single_chunk_fixture());
        let state = state_for(&[4]);
        let config = Config::new();

        let out = read_chunked(&mut cursor, 0, &sb(), &state, &config).unwrap();

        let values: Vec<f64> = out.chunks(8).map(|c| f64::from_le_bytes(c.try_into().unwrap())).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn shuffle_without_deflate_is_fatal() {
        let mut cursor = cursor_over(single_chunk_fixture());
        let mut state = state_for(&[4]);
        state.filters.shuffle = true;
        let config = Config::new();

        let err = read_chunked(&mut cursor, 0, &sb(), &state, &config).unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[test]
    fn unimplemented_filter_kind_is_fatal() {
        let mut cursor = cursor_over(single_chunk_fixture());
        let mut state = state_for(&[4]);
        state.filters = Filters { fletcher32: true, ..Default::default() };
        let config = Config::new();

        let err = read_chunked(&mut cursor, 0, &sb(), &state, &config).unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }
}
