//! Group navigation (§4.6): resolves one path component at a time, either
//! through a classic v1 B-tree + local heap, or through a new-format
//! fractal heap holding link/attribute records.

use crate::config::Config;
use crate::dataset::DatasetState;
use crate::error::{Error, Result};
use crate::io::{is_invalid, Cursor};
use crate::message;
use crate::object_header;
use crate::superblock::Superblock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapMessageKind {
    Link,
    Attribute,
}

// ---- classic group: v1 B-tree + local heap ----------------------------

pub fn classic_lookup(
    cursor: &mut Cursor,
    btree_addr: u64,
    heap_addr: u64,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
) -> Result<()> {
    let heap_data_addr = read_local_heap_data_address(cursor, heap_addr, sb, config)?;
    walk_group_btree(cursor, btree_addr, heap_data_addr, sb, state, config)?;

    if state.list_mode && state.at_target() {
        state.found = true;
    }
    Ok(())
}

fn read_local_heap_data_address(
    cursor: &mut Cursor,
    addr: u64,
    sb: &Superblock,
    config: &Config,
) -> Result<u64> {
    cursor.seek(addr);
    let magic = cursor.read_array(4)?;
    if config.error_checking && &magic != b"HEAP" {
        return Err(Error::format("missing HEAP signature"));
    }
    let version = cursor.read_field(1)?;
    if config.error_checking && version != 0 {
        return Err(Error::unsupported(format!("local heap version {}", version)));
    }
    cursor.advance(3); // reserved
    let _data_segment_size = cursor.read_field(sb.length_size)?;
    let _free_list_head_offset = cursor.read_field(sb.length_size)?;
    cursor.read_field(sb.offset_size)
}

fn walk_group_btree(
    cursor: &mut Cursor,
    addr: u64,
    heap_data_addr: u64,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
) -> Result<()> {
    if state.found {
        return Ok(());
    }

    cursor.seek(addr);
    let magic = cursor.read_array(4)?;
    if config.error_checking && &magic != b"TREE" {
        return Err(Error::format("missing TREE signature"));
    }
    let node_type = cursor.read_field(1)?;
    if config.error_checking && node_type != 0 {
        return Err(Error::format("expected group (node-type 0) b-tree node"));
    }
    let node_level = cursor.read_field(1)?;
    let entries_used = cursor.read_field(2)?;
    cursor.advance(2 * sb.offset_size as u64); // left/right sibling

    let mut children = Vec::with_capacity(entries_used as usize);
    for _ in 0..entries_used {
        cursor.advance(sb.length_size as u64); // key: local-heap offset of a name, unused (linear scan)
        let child = cursor.read_field(sb.offset_size)?;
        children.push(child);
    }
    cursor.advance(sb.length_size as u64); // trailing key

    for child in children {
        if state.found {
            break;
        }
        if node_level > 0 {
            walk_group_btree(cursor, child, heap_data_addr, sb, state, config)?;
        } else {
            parse_symbol_table_node(cursor, child, heap_data_addr, sb, state, config)?;
        }
    }

    Ok(())
}

fn parse_symbol_table_node(
    cursor: &mut Cursor,
    addr: u64,
    heap_data_addr: u64,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
) -> Result<()> {
    cursor.seek(addr);
    let magic = cursor.read_array(4)?;
    if config.error_checking && &magic != b"SNOD" {
        return Err(Error::format("missing SNOD signature"));
    }
    cursor.advance(1); // version
    cursor.advance(1); // reserved
    let num_symbols = cursor.read_field(2)?;

    for _ in 0..num_symbols {
        if state.found {
            break;
        }

        let link_name_offset = cursor.read_field(sb.offset_size)?;
        let obj_hdr_addr = cursor.read_field(sb.offset_size)?;
        let _cache_type = cursor.read_field(4)?;
        cursor.advance(16); // scratch-pad

        let saved_pos = cursor.pos();
        cursor.seek(heap_data_addr + link_name_offset);
        let name = cursor.read_cstring()?;
        cursor.seek(saved_pos);

        if state.list_mode && state.at_target() {
            state.listed_names.push(name);
            continue;
        }

        if state.current_component() == Some(name.as_str()) {
            state.level += 1;
            object_header::walk(cursor, obj_hdr_addr, sb, state, config)?;
            cursor.seek(saved_pos);
        }
    }

    Ok(())
}

// ---- new-format group: fractal heap -------------------------------------

struct FractalHeapInfo {
    table_width: u64,
    starting_blk_size: u64,
    max_direct_blk_size: u64,
    max_dblock_rows: u64,
    blk_offset_size: u64,
    root_blk_addr: u64,
    curr_num_rows: u64,
    dblk_checksum: bool,
}

pub fn fractal_heap_lookup(
    cursor: &mut Cursor,
    heap_addr: u64,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
    kind: HeapMessageKind,
) -> Result<()> {
    let info = read_fractal_heap_header(cursor, heap_addr, sb, config)?;

    if is_invalid(info.root_blk_addr, sb.offset_size) {
        return Ok(());
    }

    if info.curr_num_rows == 0 {
        parse_direct_block(cursor, info.root_blk_addr, info.starting_blk_size, &info, sb, state, config, kind)?;
    } else {
        let starting_rows = 2; // rows 0 and 1 both use starting_blk_size, per the doubling rule
        parse_indirect_block(
            cursor,
            info.root_blk_addr,
            info.curr_num_rows.max(starting_rows),
            &info,
            sb,
            state,
            config,
            kind,
        )?;
    }

    if state.list_mode && state.at_target() && kind == HeapMessageKind::Link {
        state.found = true;
    }
    Ok(())
}

fn read_fractal_heap_header(
    cursor: &mut Cursor,
    addr: u64,
    sb: &Superblock,
    config: &Config,
) -> Result<FractalHeapInfo> {
    cursor.seek(addr);
    let magic = cursor.read_array(4)?;
    if config.error_checking && &magic != b"FRHP" {
        return Err(Error::format("missing FRHP signature"));
    }
    let version = cursor.read_field(1)?;
    if config.error_checking && version != 0 {
        return Err(Error::unsupported(format!("fractal heap version {}", version)));
    }

    cursor.advance(2); // heap id length
    let io_filter_len = cursor.read_field(2)?;
    let flags = cursor.read_field(1)?;
    cursor.advance(4); // max size of managed objects
    cursor.advance(sb.length_size as u64); // next huge id
    cursor.advance(sb.offset_size as u64); // huge object btree addr
    cursor.advance(sb.length_size as u64); // free space size
    cursor.advance(sb.offset_size as u64); // free space manager addr
    cursor.advance(sb.length_size as u64); // managed space size
    cursor.advance(sb.length_size as u64); // allocated space size
    cursor.advance(sb.length_size as u64); // next direct block iterator offset
    cursor.advance(sb.length_size as u64); // managed object count
    cursor.advance(sb.length_size as u64); // huge object size
    cursor.advance(sb.length_size as u64); // huge object count
    cursor.advance(sb.length_size as u64); // tiny object size
    cursor.advance(sb.length_size as u64); // tiny object count

    let table_width = cursor.read_field(2)?;
    let starting_blk_size = cursor.read_field(sb.length_size)?;
    let max_direct_blk_size = cursor.read_field(sb.length_size)?;
    let max_heap_size = cursor.read_field(2)?;
    let _starting_num_rows = cursor.read_field(2)?;
    let root_blk_addr = cursor.read_field(sb.offset_size)?;
    let curr_num_rows = cursor.read_field(2)?;

    if io_filter_len > 0 {
        return Err(Error::unsupported("filtered fractal heap"));
    }

    let blk_offset_size = (max_heap_size + 7) / 8;
    let max_dblock_rows = log2(max_direct_blk_size) - log2(starting_blk_size) + 2;

    Ok(FractalHeapInfo {
        table_width,
        starting_blk_size,
        max_direct_blk_size,
        max_dblock_rows,
        blk_offset_size,
        root_blk_addr,
        curr_num_rows,
        dblk_checksum: flags & 0x02 != 0,
    })
}

fn log2(value: u64) -> u64 {
    if value == 0 { 0 } else { 63 - value.leading_zeros() as u64 }
}

fn block_size_for_row(row: u64, info: &FractalHeapInfo) -> u64 {
    if row <= 1 {
        info.starting_blk_size
    } else {
        info.starting_blk_size * (1u64 << (row - 1))
    }
}

fn parse_indirect_block(
    cursor: &mut Cursor,
    addr: u64,
    num_rows: u64,
    info: &FractalHeapInfo,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
    kind: HeapMessageKind,
) -> Result<()> {
    cursor.seek(addr);
    let magic = cursor.read_array(4)?;
    if config.error_checking && &magic != b"FHIB" {
        return Err(Error::format("missing FHIB signature"));
    }
    cursor.advance(1); // version
    cursor.advance(sb.offset_size as u64); // heap header address
    cursor.advance(info.blk_offset_size); // block offset

    for row in 0..num_rows {
        if state.found {
            break;
        }
        let block_size = block_size_for_row(row, info);

        for _ in 0..info.table_width {
            if state.found {
                break;
            }
            let child_addr = cursor.read_field(sb.offset_size)?;
            if is_invalid(child_addr, sb.offset_size) {
                continue;
            }

            if row < info.max_dblock_rows {
                parse_direct_block(cursor, child_addr, block_size, info, sb, state, config, kind)?;
            } else {
                parse_indirect_block(cursor, child_addr, num_rows - row, info, sb, state, config, kind)?;
            }
        }
    }

    Ok(())
}

fn parse_direct_block(
    cursor: &mut Cursor,
    addr: u64,
    block_size: u64,
    info: &FractalHeapInfo,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
    kind: HeapMessageKind,
) -> Result<()> {
    cursor.seek(addr);
    let magic = cursor.read_array(4)?;
    if config.error_checking && &magic != b"FHDB" {
        return Err(Error::format("missing FHDB signature"));
    }
    cursor.advance(1); // version
    cursor.advance(sb.offset_size as u64); // heap header address
    cursor.advance(info.blk_offset_size); // block offset
    if info.dblk_checksum {
        cursor.advance(4);
    }

    let data_end = addr + block_size;

    while cursor.pos() + 1 < data_end && !state.found {
        let peek = cursor.read_array(1)?;
        if peek[0] == 0 {
            break;
        }
        cursor.seek(cursor.pos() - 1);

        match kind {
            HeapMessageKind::Link => {
                let (name, link_type, target_addr) = message::parse_link_body(cursor, sb)?;

                if state.list_mode && state.at_target() {
                    state.listed_names.push(name);
                    continue;
                }

                if state.current_component() == Some(name.as_str()) {
                    if link_type != 0 {
                        return Err(Error::unsupported("soft/external link on requested path"));
                    }
                    let saved = cursor.pos();
                    state.level += 1;
                    object_header::walk(cursor, target_addr, sb, state, config)?;
                    cursor.seek(saved);
                }
            }
            HeapMessageKind::Attribute => {
                let (name, value_address, value_size, dt, signed, type_size) =
                    message::parse_attribute_body(cursor, sb)?;

                if state.current_component() == Some(name.as_str()) && !state.found {
                    use crate::dataset::Layout;
                    state.layout = Some(Layout::Contiguous);
                    state.filters = Default::default();
                    state.datatype = Some(dt);
                    state.signed = signed;
                    state.type_size = type_size;
                    state.data_address = value_address;
                    state.data_size = value_size;
                    state.ndims = 0;
                    state.dimensions.clear();
                    state.found = true;
                }
            }
        }
    }

    Ok(())
}
