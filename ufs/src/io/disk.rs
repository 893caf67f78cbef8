/// Size of the disk's native addressing unit. Superblock candidates and every
/// address produced by `fsbtodb` are expressed in these units.
pub const SECTOR_SIZE: u64 = 512;

/// The raw read primitive the driver is layered on.
///
/// Kept as narrow as the bootloader's disk layer: a sector number in
/// `SECTOR_SIZE` units plus a byte offset relative to that sector. The offset
/// may exceed one sector; implementations read `buf.len()` bytes starting at
/// `sector * SECTOR_SIZE + offset`. All unit arithmetic is done by the caller.
pub trait Disk {
    /// Fills `buf` with bytes starting at `offset` bytes past `sector`.
    ///
    /// # Errors
    ///
    /// Reads that fall outside of the device return an error of kind
    /// `UnexpectedEof` or `InvalidInput`. Any other error is a device failure.
    fn read(&mut self, sector: u64, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;
}

impl<D: Disk + ?Sized> Disk for &mut D {
    fn read(&mut self, sector: u64, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        (**self).read(sector, offset, buf)
    }
}

/// Whether a read failure means "this address does not exist on the device"
/// rather than a broken device.
pub(crate) fn is_out_of_range(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidInput
    )
}
