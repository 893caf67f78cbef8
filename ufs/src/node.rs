use crate::error::{Result, UfsError};
use crate::io::{Disk, SECTOR_SIZE};
use crate::sb::{SuperBlock, Variant};

use log::trace;
use zerocopy::byteorder::{LittleEndian, I32, I64, U16, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Inode number of the root directory.
pub const ROOT_INO: u32 = 2;
/// Number of direct block pointers in an inode.
pub const NDADDR: usize = 12;
/// Number of indirect block pointers in an inode (single, double, triple).
pub const NIADDR: usize = 3;

const IFMT: u16 = 0o170000;
const IFDIR: u16 = 0o040000;
const IFREG: u16 = 0o100000;
const IFLNK: u16 = 0o120000;

/// Byte offset of the block pointer area inside each record. Short symlink
/// targets are stored there instead of pointers.
const UFS1_BLOCKS_OFFSET: usize = 40;
const UFS2_BLOCKS_OFFSET: usize = 112;

#[repr(C)]
#[allow(dead_code)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone)]
struct Ufs1Dinode {
    mode: U16<LittleEndian>,
    nlink: U16<LittleEndian>,
    /// Pre-32-bit owner and group ids, superseded by `uid`/`gid`.
    old_ids: [u8; 4],
    size: U64<LittleEndian>,
    atime: I32<LittleEndian>,
    atime_nsec: I32<LittleEndian>,
    mtime: I32<LittleEndian>,
    mtime_nsec: I32<LittleEndian>,
    ctime: I32<LittleEndian>,
    ctime_nsec: I32<LittleEndian>,
    db: [U32<LittleEndian>; NDADDR],
    ib: [U32<LittleEndian>; NIADDR],
    flags: U32<LittleEndian>,
    blocks: U32<LittleEndian>,
    gen: U32<LittleEndian>,
    uid: U32<LittleEndian>,
    gid: U32<LittleEndian>,
    spare: [u8; 8],
}

#[repr(C)]
#[allow(dead_code)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone)]
struct Ufs2Dinode {
    mode: U16<LittleEndian>,
    nlink: U16<LittleEndian>,
    uid: U32<LittleEndian>,
    gid: U32<LittleEndian>,
    blksize: U32<LittleEndian>,
    size: U64<LittleEndian>,
    blocks: U64<LittleEndian>,
    atime: I64<LittleEndian>,
    mtime: I64<LittleEndian>,
    ctime: I64<LittleEndian>,
    birthtime: I64<LittleEndian>,
    mtime_nsec: I32<LittleEndian>,
    atime_nsec: I32<LittleEndian>,
    ctime_nsec: I32<LittleEndian>,
    birth_nsec: I32<LittleEndian>,
    gen: U32<LittleEndian>,
    kernflags: U32<LittleEndian>,
    flags: U32<LittleEndian>,
    extsize: U32<LittleEndian>,
    extb: [U64<LittleEndian>; 2],
    db: [U64<LittleEndian>; NDADDR],
    ib: [U64<LittleEndian>; NIADDR],
    spare: [u8; 24],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    /// Devices, fifos, sockets and whiteouts. Never followed.
    Other,
}

#[derive(Clone)]
enum Record {
    Ufs1(Ufs1Dinode),
    Ufs2(Ufs2Dinode),
}

/// One decoded inode.
///
/// The two on-disk encodings are kept as they were read and every accessor
/// widens to the UFS2 shape, so callers never need to know which variant the
/// volume uses.
#[derive(Clone)]
pub struct Inode {
    ino: u32,
    record: Record,
}

impl Inode {
    /// Reads inode `ino` from the inode table of its cylinder group.
    pub fn read<D: Disk + ?Sized>(disk: &mut D, sb: &SuperBlock, ino: u32) -> Result<Self> {
        let record_size = sb.variant.inode_size();
        let per_sector = SECTOR_SIZE / record_size;

        let ipg = sb.inodes_per_group as u64;
        let group = ino as u64 / ipg;
        let within = ino as u64 % ipg;
        let group_start = group * sb.frags_per_group as u64;

        let sector = (sb.inode_blkno as u64)
            .checked_add(group_start)
            .and_then(|blk| sb.fsb_to_sector(blk))
            .and_then(|sector| sector.checked_add(within / per_sector))
            .ok_or_else(|| UfsError::Corrupt {
                ino,
                detail: "inode address overflows".to_string(),
            })?;
        let offset = (within % per_sector) * record_size;
        trace!("inode {} at sector {} offset {}", ino, sector, offset);

        let record = match sb.variant {
            Variant::Ufs1 => {
                let mut raw = Ufs1Dinode::new_zeroed();
                disk.read(sector, offset, raw.as_bytes_mut())?;
                Record::Ufs1(raw)
            }
            Variant::Ufs2 => {
                let mut raw = Ufs2Dinode::new_zeroed();
                disk.read(sector, offset, raw.as_bytes_mut())?;
                Record::Ufs2(raw)
            }
        };
        Ok(Inode { ino, record })
    }

    /// Decodes an inode from a record already in memory. The slice must be
    /// exactly one record of the variant's size.
    pub fn parse(variant: Variant, ino: u32, buf: &[u8]) -> Option<Self> {
        let record = match variant {
            Variant::Ufs1 => Record::Ufs1(Ufs1Dinode::read_from(buf)?),
            Variant::Ufs2 => Record::Ufs2(Ufs2Dinode::read_from(buf)?),
        };
        Some(Inode { ino, record })
    }

    pub fn ino(&self) -> u32 {
        self.ino
    }

    pub fn mode(&self) -> u16 {
        match &self.record {
            Record::Ufs1(raw) => raw.mode.get(),
            Record::Ufs2(raw) => raw.mode.get(),
        }
    }

    pub fn nlink(&self) -> u16 {
        match &self.record {
            Record::Ufs1(raw) => raw.nlink.get(),
            Record::Ufs2(raw) => raw.nlink.get(),
        }
    }

    pub fn uid(&self) -> u32 {
        match &self.record {
            Record::Ufs1(raw) => raw.uid.get(),
            Record::Ufs2(raw) => raw.uid.get(),
        }
    }

    pub fn gid(&self) -> u32 {
        match &self.record {
            Record::Ufs1(raw) => raw.gid.get(),
            Record::Ufs2(raw) => raw.gid.get(),
        }
    }

    /// Declared length of the file in bytes.
    pub fn size(&self) -> u64 {
        match &self.record {
            Record::Ufs1(raw) => raw.size.get(),
            Record::Ufs2(raw) => raw.size.get(),
        }
    }

    /// Direct block pointer `i`, `0 <= i < NDADDR`.
    pub fn direct(&self, i: usize) -> u64 {
        match &self.record {
            Record::Ufs1(raw) => raw.db[i].get() as u64,
            Record::Ufs2(raw) => raw.db[i].get(),
        }
    }

    /// Indirect block pointer `i`: 0 single, 1 double, 2 triple.
    pub fn indirect(&self, i: usize) -> u64 {
        match &self.record {
            Record::Ufs1(raw) => raw.ib[i].get() as u64,
            Record::Ufs2(raw) => raw.ib[i].get(),
        }
    }

    /// The block pointer area viewed as bytes, where short symlink targets
    /// live.
    pub fn inline_data(&self) -> &[u8] {
        match &self.record {
            Record::Ufs1(raw) => {
                let len = (NDADDR + NIADDR) * 4;
                &raw.as_bytes()[UFS1_BLOCKS_OFFSET..UFS1_BLOCKS_OFFSET + len]
            }
            Record::Ufs2(raw) => {
                let len = (NDADDR + NIADDR) * 8;
                &raw.as_bytes()[UFS2_BLOCKS_OFFSET..UFS2_BLOCKS_OFFSET + len]
            }
        }
    }

    pub fn file_type(&self) -> FileType {
        match self.mode() & IFMT {
            IFDIR => FileType::Directory,
            IFREG => FileType::Regular,
            IFLNK => FileType::Symlink,
            _ => FileType::Other,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == FileType::Symlink
    }
}

impl std::fmt::Debug for Inode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inode")
            .field("ino", &self.ino)
            .field("mode", &format_args!("{:o}", self.mode()))
            .field("nlink", &self.nlink())
            .field("size", &self.size())
            .finish()
    }
}
