// Directories.
//
// A directory is an inode whose payload is a dense array of fixed-size
// entry records. Entry 0 is the self-reference "."; ".." never exists on
// disk and resolves through the inode's parent field instead. Removing an
// entry tombstones its slot, and later additions reuse tombstones before
// extending the directory.

use crate::filesys::FileSys;
use crate::inode::Inode;
use crate::param::NAME_MAX;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem::size_of;
use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

#[repr(C)]
#[derive(AsBytes, FromZeroes, FromBytes, Clone, Copy)]
struct DirEntry {
    sector: u32,
    name: [u8; NAME_MAX + 1], // NUL-terminated
    in_use: u8,
}

pub const DIR_ENTRY_SIZE: usize = size_of::<DirEntry>();
const_assert_eq!(DIR_ENTRY_SIZE, 20);

impl DirEntry {
    fn new(name: &str, sector: u32) -> Self {
        let mut e = DirEntry {
            sector,
            name: [0; NAME_MAX + 1],
            in_use: 1,
        };
        e.name[..name.len()].copy_from_slice(name.as_bytes());
        e
    }

    fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

// An open directory. The position is the readdir cursor and belongs to the
// handle, not the inode.
pub struct Dir {
    inode: Arc<Inode>,
    pos: usize,
}

impl Dir {
    pub fn open(inode: Arc<Inode>) -> Dir {
        Dir { inode, pos: 0 }
    }

    pub fn reopen(&self, fs: &FileSys) -> Dir {
        Dir {
            inode: fs.inodes.reopen(&self.inode),
            pos: 0,
        }
    }

    pub fn close(self, fs: &FileSys) {
        fs.inodes.close(&fs.cache, &fs.freemap, self.inode);
    }

    pub fn inumber(&self) -> u32 {
        self.inode.sector()
    }

    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    fn entry_at(&self, fs: &FileSys, off: usize) -> Option<DirEntry> {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        if self.inode.read_at(&fs.cache, &mut buf, off) != DIR_ENTRY_SIZE {
            return None;
        }
        DirEntry::read_from(&buf[..])
    }

    fn write_entry(&self, fs: &FileSys, off: usize, e: &DirEntry) -> bool {
        self.inode.write_at(&fs.cache, &fs.freemap, e.as_bytes(), off) == DIR_ENTRY_SIZE
    }

    // Find `name`, returning the entry's byte offset and child sector.
    fn find(&self, fs: &FileSys, name: &str) -> Option<(usize, u32)> {
        let len = self.inode.length();
        let mut off = 0;
        while off + DIR_ENTRY_SIZE <= len {
            let e = self.entry_at(fs, off)?;
            if e.in_use != 0 && e.name() == name {
                return Some((off, e.sector));
            }
            off += DIR_ENTRY_SIZE;
        }
        None
    }

    // Open the inode `name` refers to, if present.
    pub fn lookup(&self, fs: &FileSys, name: &str) -> Option<Arc<Inode>> {
        let (_, sector) = self.find(fs, name)?;
        Some(fs.inodes.open(&fs.cache, sector))
    }

    // Open this directory's parent.
    pub fn parent(&self, fs: &FileSys) -> Dir {
        let sector = self.inode.parent();
        Dir::open(fs.inodes.open(&fs.cache, sector))
    }

    // Add an entry mapping `name` to the inode at `sector` and point that
    // inode's parent back here. Tombstoned slots are reused.
    pub fn add(&self, fs: &FileSys, name: &str, sector: u32) -> bool {
        if name.is_empty() || name.len() > NAME_MAX || name == "." || name == ".." {
            return false;
        }
        if self.find(fs, name).is_some() {
            return false;
        }

        let child = fs.inodes.open(&fs.cache, sector);
        child.set_parent(self.inode.sector());
        fs.inodes.close(&fs.cache, &fs.freemap, child);

        let len = self.inode.length();
        let mut off = 0;
        while off + DIR_ENTRY_SIZE <= len {
            let e = match self.entry_at(fs, off) {
                Some(e) => e,
                None => return false,
            };
            if e.in_use == 0 {
                break;
            }
            off += DIR_ENTRY_SIZE;
        }
        self.write_entry(fs, off, &DirEntry::new(name, sector))
    }

    // True when nothing but the "." self-entry is live.
    fn is_empty(&self, fs: &FileSys) -> bool {
        let len = self.inode.length();
        let mut off = DIR_ENTRY_SIZE;
        while off + DIR_ENTRY_SIZE <= len {
            match self.entry_at(fs, off) {
                Some(e) if e.in_use != 0 => return false,
                _ => {}
            }
            off += DIR_ENTRY_SIZE;
        }
        true
    }

    // Remove `name`. A directory must be empty and must not be open
    // anywhere else; working-directory references hold their inode open, so
    // the open count covers them too.
    pub fn remove(&self, fs: &FileSys, name: &str) -> bool {
        if name == "." || name == ".." {
            return false;
        }
        let (off, sector) = match self.find(fs, name) {
            Some(hit) => hit,
            None => return false,
        };

        let child = fs.inodes.open(&fs.cache, sector);
        if child.is_dir() {
            let child_dir = Dir::open(fs.inodes.reopen(&child));
            let empty = child_dir.is_empty(fs);
            child_dir.close(fs);
            if !empty || child.open_cnt() > 1 {
                fs.inodes.close(&fs.cache, &fs.freemap, child);
                return false;
            }
        }

        let mut e = match self.entry_at(fs, off) {
            Some(e) => e,
            None => {
                fs.inodes.close(&fs.cache, &fs.freemap, child);
                return false;
            }
        };
        e.in_use = 0;
        if !self.write_entry(fs, off, &e) {
            fs.inodes.close(&fs.cache, &fs.freemap, child);
            return false;
        }
        child.mark_removed();
        fs.inodes.close(&fs.cache, &fs.freemap, child);
        true
    }

    // Next live entry name past the cursor, skipping "." and "..".
    pub fn read(&mut self, fs: &FileSys) -> Option<String> {
        let len = self.inode.length();
        while self.pos + DIR_ENTRY_SIZE <= len {
            let off = self.pos;
            self.pos += DIR_ENTRY_SIZE;
            if let Some(e) = self.entry_at(fs, off) {
                if e.in_use != 0 && e.name() != "." && e.name() != ".." {
                    return Some(String::from(e.name()));
                }
            }
        }
        None
    }

    // Write the "." self-entry a fresh directory starts with.
    pub(crate) fn init_self(&self, fs: &FileSys) -> bool {
        self.write_entry(fs, 0, &DirEntry::new(".", self.inode.sector()))
    }
}

// Split a path into its non-empty components and the tail name. A path
// ending in '/' has an empty tail, which callers treat like ".".
fn components(path: &str) -> (Vec<&str>, &str) {
    let mut parts: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if path.ends_with('/') || parts.is_empty() {
        (parts, "")
    } else {
        let tail = parts.pop().unwrap();
        (parts, tail)
    }
}

// Walk `path` to its enclosing directory. Absolute paths and threads
// without a working directory start at the root; every intermediate
// component must name a directory.
pub fn resolve<'a>(fs: &FileSys, path: &'a str, cwd: Option<&Dir>) -> Option<(Dir, &'a str)> {
    let mut dir = if path.starts_with('/') {
        fs.open_root()
    } else {
        match cwd {
            Some(d) => d.reopen(fs),
            None => fs.open_root(),
        }
    };

    let (walk, tail) = components(path);
    for name in walk {
        match name {
            "." => continue,
            ".." => {
                let parent = dir.parent(fs);
                dir.close(fs);
                dir = parent;
            }
            _ => {
                let next = match dir.lookup(fs, name) {
                    Some(ip) => ip,
                    None => {
                        dir.close(fs);
                        return None;
                    }
                };
                if !next.is_dir() {
                    fs.inodes.close(&fs.cache, &fs.freemap, next);
                    dir.close(fs);
                    return None;
                }
                dir.close(fs);
                dir = Dir::open(next);
            }
        }
    }
    Some((dir, tail))
}
