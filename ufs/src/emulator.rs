use crate::io::{Disk, SECTOR_SIZE};
use std::fs::File;
use std::io::prelude::*;
use std::io::{ErrorKind, SeekFrom};

/// A sector-addressed view of a disk image, optionally restricted to one
/// partition. This is how the driver is run outside of a bootloader: point it
/// at a raw image file (or any other `Read + Seek`) and mount.
pub struct ImageDisk<R> {
    inner: R,
    /// Absolute byte offset of the first byte of the partition.
    start: u64,
    /// Length of the partition in bytes, `None` when the window runs to the
    /// end of the image.
    len: Option<u64>,
}

impl<R: Read + Seek> ImageDisk<R> {
    /// Returns ownership of the underlying image to the caller.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl ImageDisk<File> {
    /// Opens a raw image file read-only, exposing the whole file as the disk.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        Ok(ImageDiskBuilder::from(File::open(path)?).build())
    }
}

impl<R: Read + Seek> Disk for ImageDisk<R> {
    fn read(&mut self, sector: u64, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let rel = sector
            .checked_mul(SECTOR_SIZE)
            .and_then(|b| b.checked_add(offset))
            .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "address overflow"))?;
        let end = rel
            .checked_add(buf.len() as u64)
            .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "address overflow"))?;
        if let Some(len) = self.len {
            if end > len {
                return Err(std::io::Error::new(
                    ErrorKind::InvalidInput,
                    "read beyond end of partition",
                ));
            }
        }

        self.inner.seek(SeekFrom::Start(self.start + rel))?;
        // Short images surface as UnexpectedEof.
        self.inner.read_exact(buf)
    }
}

pub struct ImageDiskBuilder<R> {
    inner: R,
    start: u64,
    len: Option<u64>,
}

impl<R: Read + Seek> From<R> for ImageDiskBuilder<R> {
    fn from(inner: R) -> Self {
        ImageDiskBuilder {
            inner,
            start: 0,
            len: None,
        }
    }
}

impl<R: Read + Seek> ImageDiskBuilder<R> {
    /// Restricts the disk to `sectors` sectors beginning at `start_sector` of
    /// the image, the same window a partition table entry describes.
    pub fn with_partition(mut self, start_sector: u64, sectors: u64) -> Self {
        self.start = start_sector * SECTOR_SIZE;
        self.len = Some(sectors * SECTOR_SIZE);
        self
    }

    pub fn build(self) -> ImageDisk<R> {
        ImageDisk {
            inner: self.inner,
            start: self.start,
            len: self.len,
        }
    }
}
