//! Superblock: the fixed structure at offset 0 describing global format
//! parameters and the root group address. Versions 0 and 2 are supported.

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::io::Cursor;
use std::sync::Arc;

pub const SIGNATURE: u64 = 0x0A1A_0A0D_4644_4889;

#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub offset_size: u8,
    pub length_size: u8,
    pub base_address: u64,
    pub root_group_offset: u64,
}

impl Superblock {
    /// Reads the superblock over an unscaled cache (base address 0, since
    /// the base address itself is one of the fields being discovered here).
    pub fn read(cache: &Arc<Cache>) -> Result<Self> {
        let mut cursor = Cursor::new(cache.clone(), 0);

        let signature = cursor.read_field(8)?;
        if signature != SIGNATURE {
            return Err(Error::format("missing HDF5 signature"));
        }

        let version = cursor.read_field(1)?;

        match version {
            0 => Self::read_v0(&mut cursor),
            2 => Self::read_v2(&mut cursor),
            other => Err(Error::unsupported(format!("superblock version {}", other))),
        }
    }

    fn read_v0(cursor: &mut Cursor) -> Result<Self> {
        cursor.seek(9);
        let free_space_version = cursor.read_field(1)?;
        let root_table_version = cursor.read_field(1)?;
        if free_space_version != 0 || root_table_version != 0 {
            return Err(Error::unsupported("superblock v0 non-zero sub-versions"));
        }

        cursor.seek(13);
        let offset_size = cursor.read_field(1)? as u8;
        let length_size = cursor.read_field(1)? as u8;

        cursor.seek(24);
        let base_address = cursor.read_field(offset_size)?;

        cursor.seek(24 + 5 * offset_size as u64);
        let root_group_offset = cursor.read_field(offset_size)?;

        Ok(Superblock { offset_size, length_size, base_address, root_group_offset })
    }

    fn read_v2(cursor: &mut Cursor) -> Result<Self> {
        cursor.seek(9);
        let offset_size = cursor.read_field(1)? as u8;
        let length_size = cursor.read_field(1)? as u8;

        cursor.seek(12);
        let base_address = cursor.read_field(offset_size)?;

        cursor.seek(12 + 3 * offset_size as u64);
        let root_group_offset = cursor.read_field(offset_size)?;

        Ok(Superblock { offset_size, length_size, base_address, root_group_offset })
    }
}
