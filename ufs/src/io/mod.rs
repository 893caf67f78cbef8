mod disk;

pub use disk::{Disk, SECTOR_SIZE};
pub(crate) use disk::is_out_of_range;
