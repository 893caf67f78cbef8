use crate::dir::DirEntry;
use crate::error::{Result, UfsError};
use crate::fs::Ufs;
use crate::io::Disk;
use crate::node::{Inode, ROOT_INO};

use log::{debug, trace};

/// How many symlinks one lookup may follow in total, nested or not.
/// Following one more fails with `SymlinkLoop`.
pub const MAX_SYMLINK_DEPTH: u32 = 8;

/// Longest symlink target that will be read.
pub const MAXPATHLEN: u64 = 1024;

/// Only absolute paths can be resolved.
pub(crate) fn check_path(path: &str) -> Result<()> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(UfsError::BadFilename(path.to_string()))
    }
}

impl<'d, D: Disk + ?Sized> Ufs<'d, D> {
    /// Resolves an absolute path to its inode, following symlinks.
    ///
    /// A trailing slash or an empty component ends the walk at the directory
    /// reached so far.
    pub fn lookup(&mut self, path: &str) -> Result<Inode> {
        check_path(path)?;
        let root = self.read_inode(ROOT_INO)?;
        let mut followed = 0;
        self.resolve(root, path, &mut followed)
    }

    /// Walks `path` starting at `start`. `followed` counts every symlink this
    /// lookup has followed so far, including those in enclosing targets.
    fn resolve(&mut self, start: Inode, path: &str, followed: &mut u32) -> Result<Inode> {
        let mut current = start;
        let relative = path.strip_prefix('/').unwrap_or(path);
        let mut components = relative.split('/').peekable();

        while let Some(name) = components.next() {
            if name.is_empty() {
                break;
            }
            if !current.is_dir() {
                return Err(UfsError::BadFileType(name.to_string()));
            }

            trace!("looking up {:?} in inode {}", name, current.ino());
            let entry = self
                .find_entry(&current, name)?
                .ok_or_else(|| UfsError::FileNotFound(name.to_string()))?;

            let inode = self.read_inode(entry.ino)?;
            let next = if inode.is_symlink() {
                self.follow_symlink(&inode, current, followed)?
            } else {
                inode
            };

            if components.peek().is_some() && !next.is_dir() {
                return Err(UfsError::BadFileType(name.to_string()));
            }
            current = next;
        }
        Ok(current)
    }

    fn find_entry(&mut self, dir: &Inode, name: &str) -> Result<Option<DirEntry>> {
        for entry in self.entries(dir) {
            let entry = entry?;
            if entry.name == name.as_bytes() {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Resolves the target of `link`, which was found in directory `parent`.
    fn follow_symlink(
        &mut self,
        link: &Inode,
        parent: Inode,
        followed: &mut u32,
    ) -> Result<Inode> {
        *followed += 1;
        if *followed > MAX_SYMLINK_DEPTH {
            return Err(UfsError::SymlinkLoop);
        }
        let target = self.read_link(link)?;
        debug!(
            "following symlink inode {} -> {:?} ({} followed)",
            link.ino(),
            target,
            followed
        );

        let start = if target.starts_with('/') {
            self.read_inode(ROOT_INO)?
        } else {
            parent
        };
        self.resolve(start, &target, followed)
    }

    /// Reads the target of a symlink. Short targets are stored in the inode
    /// itself, longer ones in its first data block.
    pub fn read_link(&mut self, link: &Inode) -> Result<String> {
        let size = link.size();
        let inline = link.inline_data();

        let bytes = if size < inline.len() as u64 {
            let raw = &inline[..size as usize];
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            raw[..end].to_vec()
        } else {
            if size > MAXPATHLEN {
                return Err(UfsError::BadFilename(format!(
                    "symlink inode {} target is {} bytes",
                    link.ino(),
                    size
                )));
            }
            let mut buf = vec![0; size as usize];
            let read = self.read_at(link, 0, &mut buf)?;
            buf.truncate(read);
            buf
        };

        String::from_utf8(bytes).map_err(|_| {
            UfsError::BadFilename(format!("symlink inode {} target is not utf-8", link.ino()))
        })
    }
}
