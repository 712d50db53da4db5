//! Object-header walker (§4.4): decodes v1 and v0/v2 ("new format") object
//! headers, iterates their messages, and follows continuation blocks.
//! Short-circuits as soon as the dataset state's `found` flag flips.

use crate::config::Config;
use crate::dataset::DatasetState;
use crate::error::{Error, Result};
use crate::io::Cursor;
use crate::message;
use crate::superblock::Superblock;

/// Header-continuation messages inherited this flag from their parent
/// chunk; it selects v1-style message framing inside the continuation
/// block instead of the `OCHK` + v0 framing.
const CUSTOM_V1_FLAG: u8 = 0x80;

const MSG_HEADERCONT: u16 = 0x10;

pub fn walk(
    cursor: &mut Cursor,
    addr: u64,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
) -> Result<()> {
    cursor.seek(addr);
    let marker = cursor.read_field(1)?;

    let result = if marker == 1 {
        walk_v1(cursor, sb, state, config)
    } else {
        cursor.seek(addr);
        walk_v0(cursor, sb, state, config)
    };

    // Having fully parsed the object header at the end of the requested
    // path (whether group or dataset), the object itself is resolved —
    // no further named child is being searched for. An attribute match
    // nested inside this same header may already have set `found`; this
    // is the fallback for paths that name a group or dataset directly.
    if result.is_ok() && state.at_target() && !state.list_mode {
        state.found = true;
    }

    result
}

fn walk_v0(cursor: &mut Cursor, sb: &Superblock, state: &mut DatasetState, config: &Config) -> Result<()> {
    let magic = cursor.read_array(4)?;
    if config.error_checking && &magic != b"OHDR" {
        return Err(Error::format("missing OHDR signature"));
    }

    let version = cursor.read_field(1)?;
    if config.error_checking && version != 2 {
        return Err(Error::unsupported(format!("object header version {}", version)));
    }

    let flags = cursor.read_field(1)? as u8;

    if flags & 0x20 != 0 {
        cursor.advance(16); // four 4-byte timestamps
    }
    if flags & 0x10 != 0 {
        cursor.advance(4); // max compact / min dense attribute counts
    }

    let chunk_size_width = 1u8 << (flags & 0x3);
    let chunk0_size = cursor.read_field(chunk_size_width)?;

    let chunk0_end = cursor.pos() + chunk0_size;
    iterate_messages_v0(cursor, chunk0_end, flags, sb, state, config)?;

    Ok(())
}

fn iterate_messages_v0(
    cursor: &mut Cursor,
    chunk_end: u64,
    flags: u8,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
) -> Result<()> {
    let mut continuations = Vec::new();

    while cursor.pos() + 4 <= chunk_end && !state.found {
        let msg_type = cursor.read_field(1)? as u16;
        let msg_size = cursor.read_field(2)?;
        let _msg_flags = cursor.read_field(1)?;
        if flags & 0x04 != 0 {
            cursor.advance(2); // message creation order
        }

        let msg_start = cursor.pos();

        if msg_type == MSG_HEADERCONT {
            let offset = cursor.read_field(sb.offset_size)?;
            let length = cursor.read_field(sb.length_size)?;
            continuations.push((offset, length, flags | CUSTOM_V1_FLAG));
        } else {
            dispatch_or_skip(cursor, msg_type, sb, state, config)?;
        }

        cursor.seek(msg_start + msg_size);
    }

    for (offset, length, cont_flags) in continuations {
        if state.found {
            break;
        }
        walk_continuation_v0(cursor, offset, length, cont_flags, sb, state, config)?;
    }

    Ok(())
}

fn walk_continuation_v0(
    cursor: &mut Cursor,
    offset: u64,
    length: u64,
    flags: u8,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
) -> Result<()> {
    cursor.seek(offset);
    let magic = cursor.read_array(4)?;
    if config.error_checking && &magic != b"OCHK" {
        return Err(Error::format("missing OCHK signature"));
    }

    let end = offset + length - 4; // trailing checksum
    iterate_messages_v0(cursor, end, flags, sb, state, config)
}

fn walk_v1(cursor: &mut Cursor, sb: &Superblock, state: &mut DatasetState, config: &Config) -> Result<()> {
    cursor.advance(1); // reserved
    let num_messages = cursor.read_field(2)?;
    cursor.advance(4); // object reference count
    let header_size = cursor.read_field(sb.length_size)?;

    cursor.advance(align_to(cursor.pos(), 8) - cursor.pos());
    let end = cursor.pos() + header_size;

    iterate_messages_v1(cursor, end, num_messages, sb, state, config)
}

fn iterate_messages_v1(
    cursor: &mut Cursor,
    end: u64,
    num_messages: u64,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
) -> Result<()> {
    let mut continuations = Vec::new();
    let mut seen = 0u64;

    while seen < num_messages && cursor.pos() + 8 <= end && !state.found {
        let msg_type = cursor.read_field(2)? as u16;
        let msg_size = cursor.read_field(2)?;
        let _msg_flags = cursor.read_field(1)?;
        cursor.advance(3); // reserved

        let msg_start = cursor.pos();

        if msg_type == MSG_HEADERCONT {
            let offset = cursor.read_field(sb.offset_size)?;
            let length = cursor.read_field(sb.length_size)?;
            continuations.push((offset, length));
        } else {
            dispatch_or_skip(cursor, msg_type, sb, state, config)?;
        }

        let padded_size = align_to(msg_size, 8);
        cursor.seek(msg_start + padded_size);
        seen += 1;
    }

    cursor.seek(end);

    for (offset, length) in continuations {
        if state.found {
            break;
        }
        walk_continuation_v1(cursor, offset, length, sb, state, config)?;
    }

    Ok(())
}

fn walk_continuation_v1(
    cursor: &mut Cursor,
    offset: u64,
    length: u64,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
) -> Result<()> {
    cursor.seek(offset);
    let end = offset + length;
    let remaining_messages = u64::MAX; // v1 continuations carry no count; stop on space instead
    iterate_messages_v1(cursor, end, remaining_messages, sb, state, config)
}

fn dispatch_or_skip(
    cursor: &mut Cursor,
    msg_type: u16,
    sb: &Superblock,
    state: &mut DatasetState,
    config: &Config,
) -> Result<()> {
    if config.verbose {
        log::trace!("object header message type {:#x} at {}", msg_type, cursor.pos());
    }

    match message::dispatch(cursor, msg_type, sb, state, config) {
        Ok(()) => Ok(()),
        Err(err) if err.is_skippable_in_header_walk() => {
            log::debug!("skipping message type {:#x}: {}", msg_type, err);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn align_to(pos: u64, alignment: u64) -> u64 {
    let remainder = pos % alignment;
    if remainder == 0 { pos } else { pos + (alignment - remainder) }
}
