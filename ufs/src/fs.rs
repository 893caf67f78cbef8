use crate::bmap;
use crate::error::{Result, UfsError};
use crate::io::Disk;
use crate::node::Inode;
use crate::path::check_path;
use crate::sb::SuperBlock;

use log::{debug, trace};
use std::cmp::min;

/// A mounted volume. One of these exists per `open` or `dir` call and holds
/// nothing but the superblock and the borrowed disk, so every resource is
/// released when it goes out of scope, whichever way the call ends.
pub struct Ufs<'d, D: Disk + ?Sized> {
    disk: &'d mut D,
    sb: SuperBlock,
}

impl<'d, D: Disk + ?Sized> Ufs<'d, D> {
    /// Finds the superblock and returns a session on the volume.
    ///
    /// # Errors
    ///
    /// `BadFilesystem` when no candidate location carries a UFS1 or UFS2
    /// magic number, `Io` when the disk fails.
    pub fn mount(disk: &'d mut D) -> Result<Self> {
        let sb = SuperBlock::locate(&mut *disk)?;
        Ok(Ufs { disk, sb })
    }

    /// Builds a session from an already decoded superblock without probing.
    ///
    /// The geometry is checked the same way a probed superblock is, so a
    /// hand made `SuperBlock` fails with `BadFilesystem` instead of dividing
    /// by zero later.
    pub fn with_superblock(disk: &'d mut D, sb: SuperBlock) -> Result<Self> {
        sb.validate()?;
        Ok(Ufs { disk, sb })
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.sb
    }

    pub fn read_inode(&mut self, ino: u32) -> Result<Inode> {
        Inode::read(&mut *self.disk, &self.sb, ino)
    }

    /// The filesystem block backing logical block `lblk` of `inode`, 0 for a
    /// hole.
    pub fn map_block(&mut self, inode: &Inode, lblk: u64) -> Result<u64> {
        bmap::map_block(&mut *self.disk, &self.sb, inode, lblk)
    }

    /// Reads file content starting at byte `pos` into `buf`.
    ///
    /// The read is cut short at the inode's declared size; the number of
    /// bytes produced is returned and is 0 at or past the end of the file.
    /// Holes read back as zeros.
    pub fn read_at(&mut self, inode: &Inode, pos: u64, buf: &mut [u8]) -> Result<usize> {
        self.read_range(inode, pos, buf, &mut |_, _, _| ())
    }

    /// Like `read_at`, but reports the disk location of every piece of data
    /// read as `hook(sector, offset, len)`. Holes are not reported.
    pub fn read_at_with_hook<F>(
        &mut self,
        inode: &Inode,
        pos: u64,
        buf: &mut [u8],
        mut hook: F,
    ) -> Result<usize>
    where
        F: FnMut(u64, u64, usize),
    {
        self.read_range(inode, pos, buf, &mut hook)
    }

    fn read_range(
        &mut self,
        inode: &Inode,
        pos: u64,
        buf: &mut [u8],
        hook: &mut dyn FnMut(u64, u64, usize),
    ) -> Result<usize> {
        let size = inode.size();
        if pos >= size {
            return Ok(0);
        }
        let len = min(buf.len() as u64, size - pos) as usize;
        let bsize = self.sb.block_size as u64;

        let mut done = 0;
        while done < len {
            let at = pos + done as u64;
            let skip = at % bsize;
            let chunk = min(bsize - skip, (len - done) as u64) as usize;
            let out = &mut buf[done..done + chunk];

            let lblk = at / bsize;
            match self.map_block(inode, lblk)? {
                0 => {
                    trace!("inode {} block {} is a hole", inode.ino(), lblk);
                    out.fill(0);
                }
                blk => {
                    let sector = self.sb.fsb_to_sector(blk).ok_or_else(|| UfsError::Corrupt {
                        ino: inode.ino(),
                        detail: format!("data block {} out of range", blk),
                    })?;
                    self.disk.read(sector, skip, out)?;
                    hook(sector, skip, chunk);
                }
            }
            done += chunk;
        }
        Ok(len)
    }

    /// Resolves `path` and hands back a readable file that owns this session.
    pub fn open(mut self, path: &str) -> Result<File<'d, D>> {
        let inode = self.lookup(path)?;
        debug!("opened {} as inode {} ({} bytes)", path, inode.ino(), inode.size());
        Ok(File {
            fs: self,
            inode,
            offset: 0,
        })
    }

    /// Lists the directory at `path`, calling `hook(name, is_directory)` per
    /// entry until it returns `true`.
    pub fn dir<F>(mut self, path: &str, mut hook: F) -> Result<()>
    where
        F: FnMut(&str, bool) -> bool,
    {
        let inode = self.lookup(path)?;
        if !inode.is_dir() {
            return Err(UfsError::BadFileType(path.to_string()));
        }
        for entry in self.entries(&inode) {
            let entry = entry?;
            if hook(&entry.name_lossy(), entry.is_dir()) {
                break;
            }
        }
        Ok(())
    }
}

/// Mounts `disk` and opens the file at the absolute `path`.
pub fn open<'d, D: Disk + ?Sized>(disk: &'d mut D, path: &str) -> Result<File<'d, D>> {
    check_path(path)?;
    Ufs::mount(disk)?.open(path)
}

/// Mounts `disk` and lists the directory at the absolute `path`.
pub fn dir<D, F>(disk: &mut D, path: &str, hook: F) -> Result<()>
where
    D: Disk + ?Sized,
    F: FnMut(&str, bool) -> bool,
{
    check_path(path)?;
    Ufs::mount(disk)?.dir(path, hook)
}

/// An open file. Reads advance an internal offset the way the bootloader's
/// file object does.
pub struct File<'d, D: Disk + ?Sized> {
    fs: Ufs<'d, D>,
    inode: Inode,
    offset: u64,
}

impl<'d, D: Disk + ?Sized> File<'d, D> {
    pub fn size(&self) -> u64 {
        self.inode.size()
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn seek(&mut self, pos: u64) {
        self.offset = pos;
    }

    /// Reads from the current offset and advances it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = self.fs.read_at(&self.inode, self.offset, buf)?;
        self.offset += read as u64;
        Ok(read)
    }

    /// Reads from the current offset and advances it, passing the disk
    /// location of each piece read to `hook(sector, offset, len)`.
    pub fn read_with_hook<F>(&mut self, buf: &mut [u8], hook: F) -> Result<usize>
    where
        F: FnMut(u64, u64, usize),
    {
        let read = self
            .fs
            .read_at_with_hook(&self.inode, self.offset, buf, hook)?;
        self.offset += read as u64;
        Ok(read)
    }

    /// Reads at `pos` without touching the offset.
    pub fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        self.fs.read_at(&self.inode, pos, buf)
    }

    /// Ends the session. Nothing is written back.
    pub fn close(self) {}
}

impl<'d, D: Disk + ?Sized> std::io::Read for File<'d, D> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        File::read(self, buf).map_err(|err| match err {
            UfsError::Io(err) => err,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        })
    }
}
