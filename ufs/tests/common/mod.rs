#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use tempfile::NamedTempFile;
use ufs::emulator::{ImageDisk, ImageDiskBuilder};
use ufs::sb::{UFS1_MAGIC, UFS2_MAGIC};
use ufs::{Variant, ROOT_INO};

pub const BSIZE: u64 = 4096;
pub const FSBTODB: u32 = 3;
const IBLKNO: u64 = 96;
const IPG: u32 = 64;
const FPG: u32 = 1024;
const FIRST_DATA_BLOCK: u64 = IBLKNO + 8;
const DIRBLKSIZ: usize = 512;

pub const DT_REG: u8 = 8;
pub const DT_DIR: u8 = 4;
pub const DT_LNK: u8 = 10;

const IFDIR: u16 = 0o040000;
const IFREG: u16 = 0o100000;
const IFLNK: u16 = 0o120000;

struct Node {
    mode: u16,
    nlink: u16,
    size: u64,
    db: [u64; 12],
    ib: [u64; 3],
    inline: Vec<u8>,
    entries: Vec<(Vec<u8>, u32, u8)>,
    raw_content: Option<Vec<u8>>,
}

impl Node {
    fn new(mode: u16) -> Self {
        Node {
            mode,
            nlink: 1,
            size: 0,
            db: [0; 12],
            ib: [0; 3],
            inline: Vec::new(),
            entries: Vec::new(),
            raw_content: None,
        }
    }
}

/// Lays out a small single cylinder group UFS1 or UFS2 volume in memory.
///
/// 4K blocks equal to fragments, inode table at block 96, data from block
/// 104 on. Directories are serialized when the image is built.
pub struct ImageBuilder {
    variant: Variant,
    image: Vec<u8>,
    nodes: BTreeMap<u32, Node>,
    next_ino: u32,
    next_block: u64,
    sb_sector: Option<u64>,
}

impl ImageBuilder {
    pub fn new(variant: Variant) -> Self {
        let mut root = Node::new(IFDIR | 0o755);
        root.nlink = 2;
        root.entries.push((b".".to_vec(), ROOT_INO, DT_DIR));
        root.entries.push((b"..".to_vec(), ROOT_INO, DT_DIR));

        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT_INO, root);
        ImageBuilder {
            variant,
            image: Vec::new(),
            nodes,
            next_ino: ROOT_INO + 1,
            next_block: FIRST_DATA_BLOCK,
            sb_sector: Some(match variant {
                Variant::Ufs1 => 16,
                Variant::Ufs2 => 128,
            }),
        }
    }

    /// Moves the superblock to `sector`, or leaves it out entirely.
    pub fn superblock_at(&mut self, sector: Option<u64>) -> &mut Self {
        self.sb_sector = sector;
        self
    }

    pub fn pointers_per_block(&self) -> u64 {
        BSIZE / self.ptr_size()
    }

    fn ptr_size(&self) -> u64 {
        match self.variant {
            Variant::Ufs1 => 4,
            Variant::Ufs2 => 8,
        }
    }

    fn inode_size(&self) -> u64 {
        match self.variant {
            Variant::Ufs1 => 128,
            Variant::Ufs2 => 256,
        }
    }

    fn inline_capacity(&self) -> usize {
        15 * self.ptr_size() as usize
    }

    fn ensure_len(&mut self, len: u64) {
        if (self.image.len() as u64) < len {
            self.image.resize(len as usize, 0);
        }
    }

    fn alloc_block(&mut self) -> u64 {
        let blk = self.next_block;
        self.next_block += 1;
        self.ensure_len((blk + 1) * BSIZE);
        blk
    }

    fn write_at(&mut self, at: u64, bytes: &[u8]) {
        self.ensure_len(at + bytes.len() as u64);
        self.image[at as usize..at as usize + bytes.len()].copy_from_slice(bytes);
    }

    fn write_ptr(&mut self, table: u64, index: u64, value: u64) {
        let width = self.ptr_size() as usize;
        let at = table * BSIZE + index * width as u64;
        self.write_at(at, &value.to_le_bytes()[..width]);
    }

    fn read_ptr(&self, table: u64, index: u64) -> u64 {
        let width = self.ptr_size() as usize;
        let at = (table * BSIZE + index * width as u64) as usize;
        let mut buf = [0; 8];
        buf[..width].copy_from_slice(&self.image[at..at + width]);
        u64::from_le_bytes(buf)
    }

    fn ensure_indirect(&mut self, ino: u32, level: usize) -> u64 {
        let existing = self.nodes[&ino].ib[level];
        if existing != 0 {
            return existing;
        }
        let blk = self.alloc_block();
        self.nodes.get_mut(&ino).unwrap().ib[level] = blk;
        blk
    }

    /// Points logical block `lblk` of `ino` at filesystem block `phys`,
    /// allocating indirect blocks on the way.
    pub fn set_block(&mut self, ino: u32, lblk: u64, phys: u64) {
        let per_block = self.pointers_per_block();
        if lblk < 12 {
            self.nodes.get_mut(&ino).unwrap().db[lblk as usize] = phys;
            return;
        }
        let mut rem = lblk - 12;
        if rem < per_block {
            let table = self.ensure_indirect(ino, 0);
            self.write_ptr(table, rem, phys);
            return;
        }
        rem -= per_block;
        assert!(rem < per_block * per_block, "triple indirect block");
        let double = self.ensure_indirect(ino, 1);
        let mut single = self.read_ptr(double, rem / per_block);
        if single == 0 {
            single = self.alloc_block();
            self.write_ptr(double, rem / per_block, single);
        }
        self.write_ptr(single, rem % per_block, phys);
    }

    fn new_node(&mut self, node: Node) -> u32 {
        let ino = self.next_ino;
        assert!(ino < IPG, "test images hold a single cylinder group");
        self.next_ino += 1;
        self.nodes.insert(ino, node);
        ino
    }

    /// Adds a name to `parent` pointing at `ino` without creating anything.
    pub fn link(&mut self, parent: u32, name: &str, ino: u32, d_type: u8) {
        self.nodes
            .get_mut(&parent)
            .unwrap()
            .entries
            .push((name.as_bytes().to_vec(), ino, d_type));
    }

    pub fn mkdir(&mut self, parent: u32, name: &str) -> u32 {
        let mut node = Node::new(IFDIR | 0o755);
        node.nlink = 2;
        let ino = self.new_node(node);
        {
            let dir = self.nodes.get_mut(&ino).unwrap();
            dir.entries.push((b".".to_vec(), ino, DT_DIR));
            dir.entries.push((b"..".to_vec(), parent, DT_DIR));
        }
        self.link(parent, name, ino, DT_DIR);
        ino
    }

    pub fn file(&mut self, parent: u32, name: &str, data: &[u8]) -> u32 {
        let ino = self.new_node(Node::new(IFREG | 0o644));
        for (lblk, chunk) in data.chunks(BSIZE as usize).enumerate() {
            let blk = self.alloc_block();
            self.write_at(blk * BSIZE, chunk);
            self.set_block(ino, lblk as u64, blk);
        }
        self.nodes.get_mut(&ino).unwrap().size = data.len() as u64;
        self.link(parent, name, ino, DT_REG);
        ino
    }

    /// A file of `size` bytes where only the listed logical blocks are
    /// allocated; everything else is a hole.
    pub fn sparse_file(
        &mut self,
        parent: u32,
        name: &str,
        size: u64,
        blocks: &[(u64, &[u8])],
    ) -> u32 {
        let ino = self.new_node(Node::new(IFREG | 0o644));
        for &(lblk, data) in blocks {
            assert!(data.len() as u64 <= BSIZE);
            let blk = self.alloc_block();
            self.write_at(blk * BSIZE, data);
            self.set_block(ino, lblk, blk);
        }
        self.nodes.get_mut(&ino).unwrap().size = size;
        self.link(parent, name, ino, DT_REG);
        ino
    }

    pub fn symlink(&mut self, parent: u32, name: &str, target: &str) -> u32 {
        self.symlink_bytes(parent, name, target.as_bytes())
    }

    /// A symlink whose target is stored verbatim, in the inode when shorter
    /// than the block pointer area and in one data block otherwise.
    pub fn symlink_bytes(&mut self, parent: u32, name: &str, target: &[u8]) -> u32 {
        assert!(target.len() as u64 <= BSIZE);
        let mut node = Node::new(IFLNK | 0o777);
        node.size = target.len() as u64;
        let inline = target.len() < self.inline_capacity();
        if inline {
            node.inline = target.to_vec();
        }
        let ino = self.new_node(node);
        if !inline {
            let blk = self.alloc_block();
            self.write_at(blk * BSIZE, target);
            self.set_block(ino, 0, blk);
        }
        self.link(parent, name, ino, DT_LNK);
        ino
    }

    /// Replaces the serialized content of directory `ino`.
    pub fn raw_dir_content(&mut self, ino: u32, content: Vec<u8>) {
        self.nodes.get_mut(&ino).unwrap().raw_content = Some(content);
    }

    fn dir_content(entries: &[(Vec<u8>, u32, u8)]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        let mut last: Option<usize> = None;
        for (name, ino, d_type) in entries {
            let reclen = (8 + name.len() + 1 + 3) & !3;
            let left = DIRBLKSIZ - out.len() % DIRBLKSIZ;
            if reclen > left {
                Self::stretch(&mut out, last, left);
            }
            last = Some(out.len());
            out.extend_from_slice(&ino.to_le_bytes());
            out.extend_from_slice(&(reclen as u16).to_le_bytes());
            out.push(*d_type);
            out.push(name.len() as u8);
            out.extend_from_slice(name);
            out.resize(last.unwrap() + reclen, 0);
        }
        let left = (DIRBLKSIZ - out.len() % DIRBLKSIZ) % DIRBLKSIZ;
        Self::stretch(&mut out, last, left);
        out
    }

    /// Grows the record at `last` by `by` bytes so it reaches the end of its
    /// directory block.
    fn stretch(out: &mut Vec<u8>, last: Option<usize>, by: usize) {
        if let Some(at) = last {
            let reclen = u16::from_le_bytes([out[at + 4], out[at + 5]]) as usize + by;
            out[at + 4..at + 6].copy_from_slice(&(reclen as u16).to_le_bytes());
            let len = out.len() + by;
            out.resize(len, 0);
        }
    }

    fn superblock(&self) -> Vec<u8> {
        let mut sb = vec![0; 1376];
        sb[16..20].copy_from_slice(&(IBLKNO as u32).to_le_bytes());
        sb[48..52].copy_from_slice(&(BSIZE as u32).to_le_bytes());
        sb[100..104].copy_from_slice(&FSBTODB.to_le_bytes());
        sb[184..188].copy_from_slice(&IPG.to_le_bytes());
        sb[188..192].copy_from_slice(&FPG.to_le_bytes());
        let magic = match self.variant {
            Variant::Ufs1 => UFS1_MAGIC,
            Variant::Ufs2 => UFS2_MAGIC,
        };
        sb[1372..1376].copy_from_slice(&magic.to_le_bytes());
        sb
    }

    fn encode_inode(&self, node: &Node) -> Vec<u8> {
        let mut buf = vec![0; self.inode_size() as usize];
        buf[0..2].copy_from_slice(&node.mode.to_le_bytes());
        buf[2..4].copy_from_slice(&node.nlink.to_le_bytes());
        let (size_at, blocks_at) = match self.variant {
            Variant::Ufs1 => (8, 40),
            Variant::Ufs2 => (16, 112),
        };
        buf[size_at..size_at + 8].copy_from_slice(&node.size.to_le_bytes());

        let width = self.ptr_size() as usize;
        if node.inline.is_empty() {
            let pointers = node.db.iter().chain(node.ib.iter());
            for (i, ptr) in pointers.enumerate() {
                let at = blocks_at + i * width;
                buf[at..at + width].copy_from_slice(&ptr.to_le_bytes()[..width]);
            }
        } else {
            buf[blocks_at..blocks_at + node.inline.len()].copy_from_slice(&node.inline);
        }
        buf
    }

    pub fn build(mut self) -> Vec<u8> {
        let dirs: Vec<u32> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.mode & 0o170000 == IFDIR)
            .map(|(&ino, _)| ino)
            .collect();
        for ino in dirs {
            let content = match self.nodes[&ino].raw_content.clone() {
                Some(raw) => raw,
                None => Self::dir_content(&self.nodes[&ino].entries),
            };
            let rounded = (content.len() + DIRBLKSIZ - 1) / DIRBLKSIZ * DIRBLKSIZ;
            for (lblk, chunk) in content.chunks(BSIZE as usize).enumerate() {
                let blk = self.alloc_block();
                self.write_at(blk * BSIZE, chunk);
                self.set_block(ino, lblk as u64, blk);
            }
            self.nodes.get_mut(&ino).unwrap().size = rounded as u64;
        }

        let table = IBLKNO * BSIZE;
        self.ensure_len(table + IPG as u64 * self.inode_size());
        let encoded: Vec<(u32, Vec<u8>)> = self
            .nodes
            .iter()
            .map(|(&ino, node)| (ino, self.encode_inode(node)))
            .collect();
        for (ino, bytes) in encoded {
            let at = table + ino as u64 * self.inode_size();
            self.write_at(at, &bytes);
        }

        if let Some(sector) = self.sb_sector {
            let sb = self.superblock();
            self.write_at(sector * 512, &sb);
        }
        self.image
    }

    pub fn disk(self) -> ImageDisk<Cursor<Vec<u8>>> {
        ImageDiskBuilder::from(Cursor::new(self.build())).build()
    }

    /// Writes the image to a temporary file.
    pub fn tempfile(self) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&self.build()).unwrap();
        file.flush().unwrap();
        file
    }
}

/// Deterministic, non-repeating-per-block content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 4096) as u8).collect()
}

/// Lists `path`, returning `(name, is_directory)` pairs.
pub fn list<D>(disk: &mut D, path: &str) -> ufs::Result<Vec<(String, bool)>>
where
    D: ufs::Disk + ?Sized,
{
    let mut names = Vec::new();
    ufs::dir(disk, path, |name, is_dir| {
        names.push((name.to_string(), is_dir));
        false
    })?;
    Ok(names)
}
