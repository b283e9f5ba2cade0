// Filesystem façade.
//
// Ties the device, buffer cache, free map and open-inode table together
// and exposes path-level operations. One filesystem-wide lock serializes
// the lookup-and-allocate sequences (create, open, remove, chdir); data
// reads and writes on open files bypass it and rely on the inode layer.

use crate::cache::Cache;
use crate::dir::{self, Dir};
use crate::disk::BlockDevice;
use crate::file::{File, Node};
use crate::freemap::{self, FreeMap};
use crate::inode::{self, InodeTable};
use crate::spinlock::Mutex;
use alloc::boxed::Box;

pub struct FileSys {
    pub cache: Cache,
    pub freemap: FreeMap,
    pub inodes: InodeTable,
    root: u32,
    lock: Mutex<()>,
}

impl FileSys {
    // Bring up the filesystem, formatting the device first when asked.
    pub fn new(device: Box<dyn BlockDevice>, format: bool) -> FileSys {
        let cache = Cache::new(device);
        let sectors = cache.sector_count();
        let root = freemap::FREE_MAP_START + freemap::map_sectors(sectors);
        let fs = FileSys {
            cache,
            freemap: FreeMap::new(sectors),
            inodes: InodeTable::new(),
            root,
            lock: Mutex::new((), "filesys"),
        };
        if format {
            fs.format();
        } else {
            fs.freemap.open(&fs.cache);
        }
        fs
    }

    fn format(&self) {
        self.freemap.format(self.root);
        if !inode::create(&self.cache, &self.freemap, self.root, 0, true, self.root) {
            panic!("filesys: root directory creation failed");
        }
        let root = self.open_root();
        if !root.init_self(self) {
            panic!("filesys: root directory creation failed");
        }
        root.close(self);
        self.freemap.close(&self.cache);
    }

    pub fn open_root(&self) -> Dir {
        Dir::open(self.inodes.open(&self.cache, self.root))
    }

    pub fn is_root(&self, dir: &Dir) -> bool {
        dir.inumber() == self.root
    }

    // Create a file or directory at `path`. Fails on a `.`/`..`/empty tail,
    // an existing name, or allocation exhaustion; the reserved inode sector
    // is handed back on any failure past its allocation.
    pub fn create(&self, path: &str, size: usize, is_dir: bool, cwd: Option<&Dir>) -> bool {
        let _l = self.lock.lock();
        let (parent, tail) = match dir::resolve(self, path, cwd) {
            Some(r) => r,
            None => return false,
        };
        if tail.is_empty() || tail == "." || tail == ".." {
            parent.close(self);
            return false;
        }

        let sector = match self.freemap.allocate(1) {
            Some(s) => s,
            None => {
                parent.close(self);
                return false;
            }
        };

        let mut ok = inode::create(&self.cache, &self.freemap, sector, size, is_dir, self.root);
        if ok && is_dir {
            let d = Dir::open(self.inodes.open(&self.cache, sector));
            ok = d.init_self(self);
            d.close(self);
        }
        if ok {
            ok = parent.add(self, tail, sector);
        }
        if !ok {
            self.freemap.release(sector, 1);
        }
        parent.close(self);
        ok
    }

    // Open `path` as a file or directory. A `..` tail opens the enclosing
    // directory's parent; a `.` or empty tail the enclosing directory
    // itself.
    pub fn open(&self, path: &str, cwd: Option<&Dir>) -> Option<Node> {
        if path.is_empty() {
            return None;
        }
        let _l = self.lock.lock();
        let (parent, tail) = dir::resolve(self, path, cwd)?;

        let inode = match tail {
            ".." => {
                let p = parent.parent(self);
                parent.close(self);
                return Some(Node::Dir(p));
            }
            "." | "" => return Some(Node::Dir(parent)),
            name => parent.lookup(self, name),
        };
        parent.close(self);

        let inode = inode?;
        Some(if inode.is_dir() {
            Node::Dir(Dir::open(inode))
        } else {
            Node::File(File::open(inode))
        })
    }

    // Open `path` strictly as a directory, for chdir.
    pub fn open_dir(&self, path: &str, cwd: Option<&Dir>) -> Option<Dir> {
        match self.open(path, cwd)? {
            Node::Dir(d) => Some(d),
            Node::File(f) => {
                f.close(self);
                None
            }
        }
    }

    pub fn remove(&self, path: &str, cwd: Option<&Dir>) -> bool {
        let _l = self.lock.lock();
        let (parent, tail) = match dir::resolve(self, path, cwd) {
            Some(r) => r,
            None => return false,
        };
        let ok = !tail.is_empty() && parent.remove(self, tail);
        parent.close(self);
        ok
    }

    // Flush everything and persist the free map. The cache is cleared, so
    // nothing dirty survives in memory.
    pub fn done(&self) {
        self.freemap.close(&self.cache);
        self.cache.flush_all(true);
    }
}
