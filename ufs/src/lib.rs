//! A read-only driver for UFS1 and UFS2 volumes, as found on the BSDs.
//!
//! Every operation mounts the volume, does its work and drops everything it
//! read: nothing is cached between calls. Reads go through the [`Disk`]
//! trait so the driver can sit on top of whatever sector reader the host
//! provides.
//!
//! ```no_run
//! use std::io::Read;
//!
//! let mut disk = ufs::emulator::ImageDisk::open("disk.img")?;
//! let mut kernel = ufs::open(&mut disk, "/boot/kernel/kernel")?;
//! let mut image = Vec::with_capacity(kernel.size() as usize);
//! kernel.read_to_end(&mut image)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod bmap;
pub mod dir;
pub mod emulator;
mod error;
pub mod fs;
pub mod io;
pub mod node;
mod path;
pub mod registry;
pub mod sb;

pub use crate::dir::{DirEntry, DirIter};
pub use crate::error::{Result, UfsError};
pub use crate::fs::{dir, open, File, Ufs};
pub use crate::io::Disk;
pub use crate::node::{FileType, Inode, ROOT_INO};
pub use crate::path::{MAXPATHLEN, MAX_SYMLINK_DEPTH};
pub use crate::registry::{Filesystem, OpenFile, Registry, UfsDriver};
pub use crate::sb::{SuperBlock, Variant};
