use crate::error::{Result, UfsError};
use crate::io::{is_out_of_range, Disk};

use log::{debug, trace};
use zerocopy::byteorder::{LittleEndian, I32, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

pub const UFS1_MAGIC: u32 = 0x0001_1954;
pub const UFS2_MAGIC: u32 = 0x1954_0119;

/// Sectors probed for a superblock, most likely location first: the UFS2
/// default (64K), the UFS1 default (8K), the start of the partition and the
/// "piggy" location (256K).
pub const SBLOCK_SEARCH: [u64; 4] = [128, 16, 0, 512];

/// Length of the prefix of the superblock this driver decodes. It ends with
/// the magic number.
pub const SB_SIZE: usize = 1376;

const MIN_BSIZE: u32 = 512;
const MAX_BSIZE: u32 = 64 * 1024;
const MAX_FSBTODB: u32 = 16;

/// Which of the two on-disk encodings the volume uses. Chosen once from the
/// superblock magic and never re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Ufs1,
    Ufs2,
}

impl Variant {
    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            UFS1_MAGIC => Some(Variant::Ufs1),
            UFS2_MAGIC => Some(Variant::Ufs2),
            _ => None,
        }
    }

    /// Size in bytes of one on-disk inode record.
    pub fn inode_size(self) -> u64 {
        match self {
            Variant::Ufs1 => 128,
            Variant::Ufs2 => 256,
        }
    }

    /// Width in bytes of a block pointer, both inside the inode and inside
    /// indirect blocks.
    pub fn pointer_size(self) -> u64 {
        match self {
            Variant::Ufs1 => 4,
            Variant::Ufs2 => 8,
        }
    }
}

#[repr(C)]
#[allow(dead_code)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
struct RawSuperBlock {
    unused: [u8; 16],
    /// Offset of the inode table inside a cylinder group, in frags.
    iblkno: U32<LittleEndian>,
    unused2: [u8; 4],
    cgoffset: U32<LittleEndian>,
    unused3: [u8; 20],
    bsize: I32<LittleEndian>,
    unused4: [u8; 48],
    fsbtodb: U32<LittleEndian>,
    unused5: [u8; 80],
    ipg: U32<LittleEndian>,
    fpg: U32<LittleEndian>,
    unused6: [u8; 1180],
    magic: U32<LittleEndian>,
}

/// The geometry of a mounted volume.
///
/// Only the handful of fields needed to find inodes and translate block
/// numbers are kept. Everything is immutable after mount.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperBlock {
    pub variant: Variant,
    /// Size of a full filesystem block in bytes.
    pub block_size: u32,
    /// Shift turning a filesystem (fragment) block number into a sector.
    pub fsbtodb: u32,
    pub inode_blkno: u32,
    /// Cylinder group rotation offset. Always zero on volumes made by a modern
    /// newfs and not applied when locating inodes.
    pub cg_offset: u32,
    pub inodes_per_group: u32,
    pub frags_per_group: u32,
    /// The sector the superblock was found at.
    pub location: u64,
}

impl SuperBlock {
    /// Decodes a superblock record of exactly `SB_SIZE` bytes.
    ///
    /// Returns `Ok(None)` when the record carries neither magic number, and
    /// `BadFilesystem` when the magic matches but the geometry cannot be used
    /// without overflowing or dividing by zero.
    pub fn parse(buf: &[u8], location: u64) -> Result<Option<Self>> {
        let raw = match RawSuperBlock::read_from(buf) {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let variant = match Variant::from_magic(raw.magic.get()) {
            Some(variant) => variant,
            None => return Ok(None),
        };

        let bsize = raw.bsize.get();
        let sb = SuperBlock {
            variant,
            block_size: if bsize > 0 { bsize as u32 } else { 0 },
            fsbtodb: raw.fsbtodb.get(),
            inode_blkno: raw.iblkno.get(),
            cg_offset: raw.cgoffset.get(),
            inodes_per_group: raw.ipg.get(),
            frags_per_group: raw.fpg.get(),
            location,
        };
        sb.validate()?;
        Ok(Some(sb))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let bsize_ok = self.block_size.is_power_of_two()
            && (MIN_BSIZE..=MAX_BSIZE).contains(&self.block_size);
        if !bsize_ok || self.inodes_per_group == 0 || self.fsbtodb > MAX_FSBTODB {
            debug!(
                "rejecting superblock at sector {}: bsize={} ipg={} fsbtodb={}",
                self.location, self.block_size, self.inodes_per_group, self.fsbtodb
            );
            return Err(UfsError::BadFilesystem);
        }
        Ok(())
    }

    /// Probes every candidate location in order and returns the first record
    /// that carries a known magic number.
    pub fn locate<D: Disk + ?Sized>(disk: &mut D) -> Result<Self> {
        let mut buf = vec![0; SB_SIZE];
        for &sector in SBLOCK_SEARCH.iter() {
            match disk.read(sector, 0, &mut buf) {
                Ok(()) => (),
                // Small disks simply do not have the later candidates.
                Err(err) if is_out_of_range(&err) => {
                    trace!("superblock candidate {} is past end of disk", sector);
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            if let Some(sb) = SuperBlock::parse(&buf, sector)? {
                debug!("found {:?} superblock at sector {}", sb.variant, sector);
                return Ok(sb);
            }
        }
        Err(UfsError::BadFilesystem)
    }

    /// Converts a filesystem block number to the sector holding its first byte.
    /// `None` if the address does not fit in 64 bits.
    pub fn fsb_to_sector(&self, blk: u64) -> Option<u64> {
        blk.checked_mul(1 << self.fsbtodb)
    }

    /// Block pointers held by one indirect block.
    pub fn pointers_per_block(&self) -> u64 {
        self.block_size as u64 / self.variant.pointer_size()
    }
}
