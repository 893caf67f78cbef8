use crate::error::{Result, UfsError};
use crate::io::Disk;
use crate::node::{Inode, NDADDR};
use crate::sb::SuperBlock;

use log::trace;

/// Maps logical block `lblk` of `inode` to a filesystem block number.
///
/// Zero means the block is a hole. Files large enough to need the triple
/// indirect block are rejected with `NotImplemented`.
pub fn map_block<D: Disk + ?Sized>(
    disk: &mut D,
    sb: &SuperBlock,
    inode: &Inode,
    lblk: u64,
) -> Result<u64> {
    if lblk < NDADDR as u64 {
        return Ok(inode.direct(lblk as usize));
    }

    let per_block = sb.pointers_per_block();
    let mut rem = lblk - NDADDR as u64;
    if rem < per_block {
        return read_pointer(disk, sb, inode, inode.indirect(0), rem);
    }

    rem -= per_block;
    if rem < per_block * per_block {
        let single = read_pointer(disk, sb, inode, inode.indirect(1), rem / per_block)?;
        return read_pointer(disk, sb, inode, single, rem % per_block);
    }

    trace!("inode {} block {} needs triple indirection", inode.ino(), lblk);
    Err(UfsError::NotImplemented)
}

/// Reads entry `index` of the indirect block `table`. A missing table maps
/// every entry to a hole.
fn read_pointer<D: Disk + ?Sized>(
    disk: &mut D,
    sb: &SuperBlock,
    inode: &Inode,
    table: u64,
    index: u64,
) -> Result<u64> {
    if table == 0 {
        return Ok(0);
    }
    let width = sb.variant.pointer_size();
    let sector = sb.fsb_to_sector(table).ok_or_else(|| UfsError::Corrupt {
        ino: inode.ino(),
        detail: format!("indirect block {} out of range", table),
    })?;

    // Pointers are little endian, so a 4 byte pointer read into the low half
    // of a zeroed 8 byte buffer decodes the same way as an 8 byte one.
    let mut buf = [0; 8];
    disk.read(sector, index * width, &mut buf[..width as usize])?;
    Ok(u64::from_le_bytes(buf))
}
