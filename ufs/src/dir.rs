use crate::error::{Result, UfsError};
use crate::fs::Ufs;
use crate::io::Disk;
use crate::node::Inode;

use log::warn;
use std::borrow::Cow;
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// File type tags stored in directory entries.
pub const DT_DIR: u8 = 4;
pub const DT_LNK: u8 = 10;

const HEADER_SIZE: u64 = 8;

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
struct DirentHeader {
    ino: U32<LittleEndian>,
    /// Length of the whole record: header, name and padding.
    reclen: U16<LittleEndian>,
    d_type: u8,
    namlen: u8,
}

/// One name in a directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub ino: u32,
    pub reclen: u16,
    pub d_type: u8,
    /// Raw name bytes. Names on disk carry no encoding.
    pub name: Vec<u8>,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.d_type == DT_DIR
    }

    pub fn is_symlink(&self) -> bool {
        self.d_type == DT_LNK
    }

    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// Walks the records packed into a directory's content.
///
/// Each call to `Ufs::entries` starts again from offset zero. Unused slots
/// (inode number 0) are skipped. The first malformed record is reported as
/// `Corrupt` and ends the iteration.
pub struct DirIter<'s, 'd, D: Disk + ?Sized> {
    fs: &'s mut Ufs<'d, D>,
    dir: &'s Inode,
    pos: u64,
    done: bool,
}

impl<'d, D: Disk + ?Sized> Ufs<'d, D> {
    pub fn entries<'s>(&'s mut self, dir: &'s Inode) -> DirIter<'s, 'd, D> {
        DirIter {
            fs: self,
            dir,
            pos: 0,
            done: false,
        }
    }
}

impl<'s, 'd, D: Disk + ?Sized> DirIter<'s, 'd, D> {
    /// Offset of the next record within the directory.
    pub fn position(&self) -> u64 {
        self.pos
    }

    fn corrupt(&self, detail: String) -> UfsError {
        warn!(
            "directory inode {} offset {}: {}",
            self.dir.ino(),
            self.pos,
            detail
        );
        UfsError::Corrupt {
            ino: self.dir.ino(),
            detail,
        }
    }

    /// Reads the record at the current position and steps past it. `None`
    /// for an unused slot.
    fn read_entry(&mut self) -> Result<Option<DirEntry>> {
        let size = self.dir.size();

        let mut header = DirentHeader::new_zeroed();
        let read = self.fs.read_at(self.dir, self.pos, header.as_bytes_mut())?;
        if (read as u64) < HEADER_SIZE {
            return Err(self.corrupt("truncated entry header".to_string()));
        }

        let reclen = header.reclen.get() as u64;
        if reclen < HEADER_SIZE {
            return Err(self.corrupt(format!("entry length {}", reclen)));
        }
        if self.pos + reclen > size {
            return Err(self.corrupt(format!(
                "entry length {} runs past directory size {}",
                reclen, size
            )));
        }
        let namlen = header.namlen as u64;
        if HEADER_SIZE + namlen > reclen {
            return Err(self.corrupt(format!(
                "name length {} does not fit entry length {}",
                namlen, reclen
            )));
        }

        let start = self.pos;
        self.pos += reclen;
        if header.ino.get() == 0 {
            return Ok(None);
        }

        let mut name = vec![0; namlen as usize];
        self.fs.read_at(self.dir, start + HEADER_SIZE, &mut name)?;
        Ok(Some(DirEntry {
            ino: header.ino.get(),
            reclen: reclen as u16,
            d_type: header.d_type,
            name,
        }))
    }
}

impl<'s, 'd, D: Disk + ?Sized> Iterator for DirIter<'s, 'd, D> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.pos < self.dir.size() {
            match self.read_entry() {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
