//! Driver registration for a virtual filesystem layer.
//!
//! A bootloader composes its drivers into a [`Registry`] and dispatches
//! `dir`/`open`/`label` by name or by probing a disk. There is no global
//! table; the registry lives exactly as long as its owner keeps it.

use crate::error::Result;
use crate::fs::{self, File};
use crate::io::Disk;

use log::debug;

/// The operations a filesystem driver exposes to the dispatcher.
pub trait Filesystem {
    fn name(&self) -> &'static str;

    fn dir(
        &self,
        disk: &mut dyn Disk,
        path: &str,
        hook: &mut dyn FnMut(&str, bool) -> bool,
    ) -> Result<()>;

    fn open<'d>(&self, disk: &'d mut dyn Disk, path: &str) -> Result<Box<dyn OpenFile + 'd>>;

    /// The volume label, if the format has one.
    fn label(&self, disk: &mut dyn Disk) -> Result<Option<String>>;
}

/// A file handed out by [`Filesystem::open`].
pub trait OpenFile {
    fn size(&self) -> u64;

    /// Reads from the current offset and advances it.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn close(self: Box<Self>);
}

impl<'d, D: Disk + ?Sized> OpenFile for File<'d, D> {
    fn size(&self) -> u64 {
        File::size(self)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        File::read(self, buf)
    }

    fn close(self: Box<Self>) {
        File::close(*self)
    }
}

/// The UFS1/UFS2 driver, registered as `ufs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UfsDriver;

impl Filesystem for UfsDriver {
    fn name(&self) -> &'static str {
        "ufs"
    }

    fn dir(
        &self,
        disk: &mut dyn Disk,
        path: &str,
        hook: &mut dyn FnMut(&str, bool) -> bool,
    ) -> Result<()> {
        fs::dir(disk, path, hook)
    }

    fn open<'d>(&self, disk: &'d mut dyn Disk, path: &str) -> Result<Box<dyn OpenFile + 'd>> {
        let file = fs::open(disk, path)?;
        Ok(Box::new(file))
    }

    /// UFS labels are not supported.
    fn label(&self, _disk: &mut dyn Disk) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct Registry {
    drivers: Vec<Box<dyn Filesystem>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every driver in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Registry::new();
        registry.register(Box::new(UfsDriver));
        registry
    }

    /// Adds a driver. Probing tries the most recently registered driver
    /// first; a driver with the same name replaces the old one.
    pub fn register(&mut self, driver: Box<dyn Filesystem>) {
        self.unregister(driver.name());
        debug!("registering filesystem {}", driver.name());
        self.drivers.insert(0, driver);
    }

    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Filesystem>> {
        let index = self.drivers.iter().position(|d| d.name() == name)?;
        Some(self.drivers.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Filesystem> {
        self.drivers
            .iter()
            .find(|d| d.name() == name)
            .map(|d| d.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.drivers.iter().map(|d| d.name())
    }

    /// Returns the first driver able to list the root directory of `disk`.
    pub fn probe(&self, disk: &mut dyn Disk) -> Option<&dyn Filesystem> {
        self.drivers
            .iter()
            .find(|d| d.dir(disk, "/", &mut |_, _| true).is_ok())
            .map(|d| d.as_ref())
    }
}
