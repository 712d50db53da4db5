//! One function per recognized object-header message type (§4.5). Each
//! handler receives a cursor positioned at the start of the message body
//! and mutates the dataset state; the caller (object-header walker) is
//! responsible for restoring the cursor to the message boundary afterward,
//! so handlers need not account for trailing padding themselves.

use crate::config::Config;
use crate::dataset::{Datatype, DatasetState, Dims, Layout};
use crate::error::{Error, Result};
use crate::group;
use crate::io::{is_invalid, Cursor};
use crate::object_header;
use crate::superblock::Superblock;

pub const MSG_DATASPACE: u16 = 0x1;
pub const MSG_LINKINFO: u16 = 0x2;
pub const MSG_DATATYPE: u16 = 0x3;
pub const MSG_FILLVALUE: u16 = 0x5;
pub const MSG_LINK: u16 = 0x6;
pub const MSG_DATALAYOUT: u16 = 0x8;
pub const MSG_FILTER: u16 = 0xB;
pub const MSG_ATTRIBUTE: u16 = 0xC;
pub const MSG_SYMBOLTABLE: u16 = 0x11;
pub const MSG_ATTRIBUTEINFO: u16 = 0x15;

pub fn dispatch(
    cursor: &mut Cursor,
    msg_type: u16,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
) -> Result<()> {
    match msg_type {
        MSG_DATASPACE => dataspace(cursor, sb, state),
        MSG_LINKINFO => link_info(cursor, sb, state, config),
        MSG_DATATYPE => datatype(cursor, state).map(|_| ()),
        MSG_FILLVALUE => fill_value(cursor, state),
        MSG_LINK => link(cursor, sb, state, config),
        MSG_DATALAYOUT => data_layout(cursor, sb, state),
        MSG_FILTER => filter(cursor, state),
        MSG_ATTRIBUTE => attribute(cursor, sb, state),
        MSG_SYMBOLTABLE => symbol_table(cursor, sb, state, config),
        MSG_ATTRIBUTEINFO => attribute_info(cursor, sb, state, config),
        _ => Ok(()), // unrecognized message: caller already knows to skip by size
    }
}

fn dataspace(cursor: &mut Cursor, sb: &Superblock, state: &mut DatasetState) -> Result<()> {
    let version = cursor.read_field(1)?;
    // The corrected predicate: the original source's check (`!= 1 or != 2`)
    // is tautologically true and rejects everything. The evident intent is
    // to reject anything outside {1, 2}.
    if version != 1 && version != 2 {
        return Err(Error::unsupported(format!("dataspace version {}", version)));
    }

    let dimensionality = cursor.read_field(1)?;
    let flags = cursor.read_field(1)?;

    if version == 1 {
        cursor.advance(5); // reserved
    } else {
        let _layout_class = cursor.read_field(1)?;
    }

    if flags & 0x2 != 0 {
        return Err(Error::unsupported("dataspace permutation indices"));
    }

    state.ndims = dimensionality.min(2) as usize;
    let mut dims = Dims::new();
    for i in 0..dimensionality {
        let value = cursor.read_field(sb.length_size)?;
        if i < 2 {
            dims.push(value);
        }
    }
    state.dimensions = dims;

    if flags & 0x1 != 0 {
        cursor.advance(dimensionality * sb.length_size as u64); // max dimensions, unused
    }

    Ok(())
}

fn link_info(cursor: &mut Cursor, sb: &Superblock, state: &mut DatasetState, config: &Config) -> Result<()> {
    let version = cursor.read_field(1)?;
    if config.error_checking && version != 0 {
        return Err(Error::unsupported(format!("link-info version {}", version)));
    }

    let flags = cursor.read_field(1)?;
    if flags & 0x1 != 0 {
        cursor.advance(8); // max creation index
    }

    let heap_address = cursor.read_field(sb.offset_size)?;
    let _name_index_address = cursor.read_field(sb.offset_size)?;
    if flags & 0x2 != 0 {
        cursor.advance(sb.offset_size as u64); // creation-order index address
    }

    // Corrected: descend when a heap is *actually present* (address is not
    // the null sentinel), not when it equals the sentinel.
    if !is_invalid(heap_address, sb.offset_size) {
        group::fractal_heap_lookup(cursor, heap_address, sb, state, config, group::HeapMessageKind::Link)?;
    }

    Ok(())
}

/// Returns `(datatype, signed, type_size)`.
pub fn datatype(cursor: &mut Cursor, state: &mut DatasetState) -> Result<(Datatype, bool, u64)> {
    let class_and_version = cursor.read_field(4)?;
    let class = (class_and_version & 0xF) as u8;
    let databits = (class_and_version >> 8) & 0x00FF_FFFF;
    let type_size = cursor.read_field(4)?;

    let (datatype, signed) = match class {
        0 => {
            // fixed point
            let signed = databits & 0x08 != 0;
            cursor.advance(4); // bit offset + precision
            (Datatype::FixedPoint, signed)
        }
        1 => {
            // floating point
            cursor.advance(12);
            (Datatype::FloatingPoint, true)
        }
        3 => (Datatype::String, true),
        2 => return Err(Error::unsupported("TIME datatype")),
        other => return Err(Error::unsupported(format!("datatype class {}", other))),
    };

    state.datatype = Some(datatype);
    state.signed = signed;
    state.type_size = if datatype == Datatype::String { 1 } else { type_size };

    Ok((datatype, signed, state.type_size))
}

fn fill_value(cursor: &mut Cursor, state: &mut DatasetState) -> Result<()> {
    let version = cursor.read_field(1)?;

    let defined = if version <= 2 {
        cursor.advance(2); // space/write allocation time
        cursor.read_field(1)? != 0
    } else {
        let flags = cursor.read_field(1)?;
        flags & 0x20 != 0
    };

    if defined {
        let fill_size = cursor.read_field(4)?;
        if fill_size > 0 {
            let value = cursor.read_array(fill_size)?;
            state.fill_size = fill_size;
            state.fill_value = value;
        }
    }

    Ok(())
}

fn link(cursor: &mut Cursor, sb: &Superblock, state: &mut DatasetState, config: &Config) -> Result<()> {
    let (name, link_type, target_addr) = parse_link_body(cursor, sb)?;

    if state.found {
        return Ok(());
    }

    if state.current_component() != Some(name.as_str()) {
        return Ok(());
    }

    if link_type != 0 {
        return Err(Error::unsupported("soft/external link on requested path"));
    }

    let saved_pos = cursor.pos();
    state.level += 1;
    object_header::walk(cursor, target_addr, sb, state, config)?;
    cursor.seek(saved_pos);

    Ok(())
}

/// Shared with fractal-heap direct-block scanning: link records there use
/// the same body layout as the link message, minus the message header.
pub fn parse_link_body(cursor: &mut Cursor, sb: &Superblock) -> Result<(String, u64, u64)> {
    let _version = cursor.read_field(1)?;
    let flags = cursor.read_field(1)?;

    let link_type = if flags & 0x08 != 0 { cursor.read_field(1)? } else { 0 };
    if flags & 0x04 != 0 {
        cursor.advance(8); // creation order
    }
    if flags & 0x10 != 0 {
        cursor.advance(1); // link name character set
    }

    let name_len_width = 1u8 << (flags & 0x3);
    let name_len = cursor.read_field(name_len_width)?;
    let name_bytes = cursor.read_array(name_len)?;
    let name = String::from_utf8(name_bytes).map_err(|e| Error::format(e.to_string()))?;

    let target_addr = match link_type {
        0 => cursor.read_field(sb.offset_size)?,
        1 => {
            let len = cursor.read_field(2)?;
            cursor.advance(len);
            0
        }
        64 => {
            let len = cursor.read_field(2)?;
            cursor.advance(len);
            0
        }
        other => return Err(Error::unsupported(format!("link type {}", other))),
    };

    Ok((name, link_type, target_addr))
}

fn data_layout(cursor: &mut Cursor, sb: &Superblock, state: &mut DatasetState) -> Result<()> {
    let version = cursor.read_field(1)?;
    if version != 3 {
        return Err(Error::unsupported(format!(
            "data layout version {} (only v3 is supported)",
            version
        )));
    }

    let class = cursor.read_field(1)?;

    match class {
        0 => {
            // compact
            let size = cursor.read_field(2)?;
            let data = cursor.read_array(size)?;
            state.layout = Some(Layout::Compact);
            state.data_size = size;
            state.compact_data = Some(data);
        }
        1 => {
            // contiguous
            let address = cursor.read_field(sb.offset_size)?;
            let size = cursor.read_field(sb.length_size)?;
            state.layout = Some(Layout::Contiguous);
            state.data_address = address;
            state.data_size = size;
        }
        2 => {
            // chunked
            let rank_plus_one = cursor.read_field(1)?;
            let btree_address = cursor.read_field(sb.offset_size)?;
            let chunk_rank = rank_plus_one.saturating_sub(1);

            let mut chunk_dims = Dims::new();
            for i in 0..chunk_rank {
                let dim = cursor.read_field(4)?;
                if i < 2 {
                    chunk_dims.push(dim);
                }
            }
            let element_size = cursor.read_field(4)?;

            state.layout = Some(Layout::Chunked);
            state.data_address = btree_address;
            state.chunk_dims = chunk_dims;
            state.element_size = element_size;
            state.chunk_elements = state.chunk_dims.iter().product::<u64>().max(1);
        }
        other => return Err(Error::unsupported(format!("data layout class {}", other))),
    }

    Ok(())
}

fn filter(cursor: &mut Cursor, state: &mut DatasetState) -> Result<()> {
    let version = cursor.read_field(1)?;
    cursor.advance(1); // reserved (v1 only, harmless on v2)
    let num_filters = cursor.read_field(1)?;

    for _ in 0..num_filters {
        let id = cursor.read_field(2)?;
        let name_len = if version == 1 || id >= 256 {
            cursor.read_field(2)?
        } else {
            0
        };
        let flags = cursor.read_field(2)?;
        let num_params = cursor.read_field(2)?;

        if name_len > 0 {
            let padded = align8(name_len);
            cursor.advance(padded);
        }

        cursor.advance(4 * num_params);

        if version == 1 && num_params % 2 != 0 {
            cursor.advance(4);
        }

        let _optional = flags; // OPTIONAL flag (0x1) not distinguished here

        match id {
            1 => state.filters.deflate = true,
            2 => state.filters.shuffle = true,
            3 => state.filters.fletcher32 = true,
            4 => state.filters.szip = true,
            5 => state.filters.nbit = true,
            6 => state.filters.scaleoffset = true,
            _ => return Err(Error::unsupported(format!("filter id {}", id))),
        }
    }

    Ok(())
}

fn align8(size: u64) -> u64 {
    let rem = size % 8;
    if rem == 0 { size } else { size + (8 - rem) }
}

fn attribute(cursor: &mut Cursor, sb: &Superblock, state: &mut DatasetState) -> Result<()> {
    let (name, value_address, value_size, value_datatype, value_signed, value_type_size) =
        parse_attribute_body(cursor, sb)?;

    if state.current_component() == Some(name.as_str()) && !state.found {
        state.layout = Some(Layout::Contiguous);
        state.filters = Default::default();
        state.datatype = Some(value_datatype);
        state.signed = value_signed;
        state.type_size = value_type_size;
        state.data_address = value_address;
        state.data_size = value_size;
        // An attribute's shape is unrelated to its parent object's
        // dataspace message (already applied to `state` while scanning
        // earlier siblings); clear it so the attribute reads as one flat
        // `data_size`-byte value rather than inheriting the parent's rows.
        state.ndims = 0;
        state.dimensions.clear();
        state.found = true;
    }

    Ok(())
}

/// Shared with fractal-heap direct-block scanning (attribute-info path).
/// Returns `(name, value_address, value_size, datatype, signed, type_size)`.
pub fn parse_attribute_body(
    cursor: &mut Cursor,
    sb: &Superblock,
) -> Result<(String, u64, u64, Datatype, bool, u64)> {
    let _version = cursor.read_field(1)?;
    cursor.advance(1); // reserved
    let name_size = cursor.read_field(2)?;
    let datatype_size = cursor.read_field(2)?;
    let dataspace_size = cursor.read_field(2)?;

    let name_bytes = cursor.read_array(align8(name_size))?;
    let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
    let name = String::from_utf8(name_bytes[..end].to_vec()).map_err(|e| Error::format(e.to_string()))?;

    let datatype_start = cursor.pos();
    let mut dummy = DatasetState::new(Vec::new(), 0, 0, true);
    let (dt, signed, type_size) = datatype(cursor, &mut dummy)?;
    cursor.seek(datatype_start + align8(datatype_size));

    let dataspace_start = cursor.pos();
    // reuse the dataspace parser's dimension-count logic to size the value
    let element_count = peek_dataspace_element_count(cursor, sb)?;
    cursor.seek(dataspace_start + align8(dataspace_size));

    let value_address = cursor.pos();
    let value_size = element_count * type_size;

    Ok((name, value_address, value_size, dt, signed, type_size))
}

fn peek_dataspace_element_count(cursor: &mut Cursor, sb: &Superblock) -> Result<u64> {
    let start = cursor.pos();
    let version = cursor.read_field(1)?;
    let dimensionality = cursor.read_field(1)?;
    let flags = cursor.read_field(1)?;

    if version == 1 {
        cursor.advance(5);
    } else {
        cursor.advance(1);
    }

    let mut count = 1u64;
    for _ in 0..dimensionality {
        count = count.saturating_mul(cursor.read_field(sb.length_size)?);
    }
    if flags & 0x1 != 0 {
        cursor.advance(dimensionality * sb.length_size as u64);
    }

    let _ = start;
    Ok(if dimensionality == 0 { 1 } else { count })
}

fn symbol_table(cursor: &mut Cursor, sb: &Superblock, state: &mut DatasetState, config: &Config) -> Result<()> {
    let btree_address = cursor.read_field(sb.offset_size)?;
    let heap_address = cursor.read_field(sb.offset_size)?;

    group::classic_lookup(cursor, btree_address, heap_address, sb, state, config)
}

fn attribute_info(cursor: &mut Cursor, sb: &Superblock, state: &mut DatasetState, config: &Config) -> Result<()> {
    let version = cursor.read_field(1)?;
    if config.error_checking && version != 0 {
        return Err(Error::unsupported(format!("attribute-info version {}", version)));
    }

    let flags = cursor.read_field(1)?;
    if flags & 0x1 != 0 {
        cursor.advance(2); // max creation index
    }

    let heap_address = cursor.read_field(sb.offset_size)?;
    let _name_index_address = cursor.read_field(sb.offset_size)?;
    if flags & 0x2 != 0 {
        cursor.advance(sb.offset_size as u64);
    }

    if !is_invalid(heap_address, sb.offset_size) {
        group::fractal_heap_lookup(cursor, heap_address, sb, state, config, group::HeapMessageKind::Attribute)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dataset::ALL_ROWS;
    use crate::driver::SliceDriver;
    use std::sync::Arc;

    fn sb() -> Superblock {
        Superblock { offset_size: 8, length_size: 8, base_address: 0, root_group_offset: 0 }
    }

    fn cursor_over(bytes: Vec<u8>) -> Cursor {
        let cache = Arc::new(crate::cache::Cache::new(Box::new(SliceDriver::new(bytes)), 64, 0));
        Cursor::new(cache, 0)
    }

    #[test]
    fn filter_message_records_all_six_kinds_without_erroring() {
        let mut bytes = Vec::new();
        bytes.push(2); // version
        bytes.push(0); // reserved
        bytes.push(6); // num_filters
        for id in 1u16..=6 {
            bytes.extend_from_slice(&id.to_le_bytes());
            bytes.extend_from_slice(&0u16.to_le_bytes()); // flags
            bytes.extend_from_slice(&0u16.to_le_bytes()); // num_params
        }
        bytes.resize(128, 0);

        let mut cursor = cursor_over(bytes);
        let mut state = DatasetState::new(Vec::new(), 0, ALL_ROWS, true);
        let config = Config::new();

        dispatch(&mut cursor, MSG_FILTER, &sb(), &mut state, &config).unwrap();

        assert!(state.filters.deflate);
        assert!(state.filters.shuffle);
        assert!(state.filters.fletcher32);
        assert!(state.filters.szip);
        assert!(state.filters.nbit);
        assert!(state.filters.scaleoffset);
    }

    #[test]
    fn filter_message_rejects_unknown_id() {
        let mut bytes = Vec::new();
        bytes.push(2); // version
        bytes.push(0); // reserved
        bytes.push(1); // num_filters
        bytes.extend_from_slice(&99u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes()); // flags
        bytes.extend_from_slice(&0u16.to_le_bytes()); // num_params
        bytes.resize(128, 0);

        let mut cursor = cursor_over(bytes);
        let mut state = DatasetState::new(Vec::new(), 0, ALL_ROWS, true);
        let config = Config::new();

        assert!(dispatch(&mut cursor, MSG_FILTER, &sb(), &mut state, &config).is_err());
    }

    #[test]
    fn link_message_with_soft_link_on_requested_path_is_fatal() {
        let mut bytes = Vec::new();
        bytes.push(1); // version
        bytes.push(0x08); // flags: link_type present, name_len_width = 1 byte
        bytes.push(1); // link_type: soft link
        bytes.push(1); // name_len
        bytes.push(b'x'); // name
        bytes.extend_from_slice(&0u16.to_le_bytes()); // soft link target length
        bytes.resize(128, 0);

        let mut cursor = cursor_over(bytes);
        let mut state = DatasetState::new(vec!["x".to_string()], 0, ALL_ROWS, true);
        let config = Config::new();

        let err = dispatch(&mut cursor, MSG_LINK, &sb(), &mut state, &config).unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[test]
    fn link_message_with_non_matching_name_is_ignored() {
        let mut bytes = Vec::new();
        bytes.push(1); // version
        bytes.push(0x00); // flags: hard link implied, name_len_width = 1 byte
        bytes.push(1); // name_len
        bytes.push(b'y'); // name
        bytes.extend_from_slice(&0u64.to_le_bytes()); // hard link target address
        bytes.resize(128, 0);

        let mut cursor = cursor_over(bytes);
        let mut state = DatasetState::new(vec!["x".to_string()], 0, ALL_ROWS, true);
        let config = Config::new();

        dispatch(&mut cursor, MSG_LINK, &sb(), &mut state, &config).unwrap();

        assert_eq!(state.level, 0);
        assert!(!state.found);
    }

    #[test]
    fn dataspace_message_rejects_unsupported_version() {
        let mut bytes = vec![3u8]; // version
        bytes.resize(128, 0);

        let mut cursor = cursor_over(bytes);
        let mut state = DatasetState::new(Vec::new(), 0, ALL_ROWS, true);
        let config = Config::new();

        assert!(dispatch(&mut cursor, MSG_DATASPACE, &sb(), &mut state, &config).is_err());
    }

    #[test]
    fn dataspace_message_parses_rank_one_dimensions() {
        let mut bytes = Vec::new();
        bytes.push(1); // version
        bytes.push(1); // dimensionality
        bytes.push(0); // flags
        bytes.extend_from_slice(&[0u8; 5]); // reserved
        bytes.extend_from_slice(&10u64.to_le_bytes()); // dimension 0
        bytes.resize(128, 0);

        let mut cursor = cursor_over(bytes);
        let mut state = DatasetState::new(Vec::new(), 0, ALL_ROWS, true);
        let config = Config::new();

        dispatch(&mut cursor, MSG_DATASPACE, &sb(), &mut state, &config).unwrap();

        assert_eq!(state.dimensions.as_slice(), &[10]);
        assert_eq!(state.ndims, 1);
    }
}
