// Open file objects. A descriptor resolves to either a file with a seek
// position or a directory with a readdir cursor; the two are told apart by
// the inode they wrap.

use crate::dir::Dir;
use crate::filesys::FileSys;
use crate::inode::Inode;
use alloc::sync::Arc;

pub struct File {
    inode: Arc<Inode>,
    pos: usize,
    deny: bool,
}

impl File {
    pub fn open(inode: Arc<Inode>) -> File {
        File {
            inode,
            pos: 0,
            deny: false,
        }
    }

    pub fn read(&mut self, fs: &FileSys, dst: &mut [u8]) -> usize {
        let n = self.inode.read_at(&fs.cache, dst, self.pos);
        self.pos += n;
        n
    }

    pub fn write(&mut self, fs: &FileSys, src: &[u8]) -> usize {
        let n = self.inode.write_at(&fs.cache, &fs.freemap, src, self.pos);
        self.pos += n;
        n
    }

    pub fn read_at(&self, fs: &FileSys, dst: &mut [u8], offset: usize) -> usize {
        self.inode.read_at(&fs.cache, dst, offset)
    }

    pub fn write_at(&self, fs: &FileSys, src: &[u8], offset: usize) -> usize {
        self.inode.write_at(&fs.cache, &fs.freemap, src, offset)
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn length(&self) -> usize {
        self.inode.length()
    }

    pub fn inumber(&self) -> u32 {
        self.inode.sector()
    }

    // Forbid writes through any handle for as long as this one is open.
    pub fn deny_write(&mut self) {
        if !self.deny {
            self.inode.deny_write();
            self.deny = true;
        }
    }

    pub fn close(self, fs: &FileSys) {
        if self.deny {
            self.inode.allow_write();
        }
        fs.inodes.close(&fs.cache, &fs.freemap, self.inode);
    }
}

// What a descriptor can name.
pub enum Node {
    File(File),
    Dir(Dir),
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    pub fn inumber(&self) -> u32 {
        match self {
            Node::File(f) => f.inumber(),
            Node::Dir(d) => d.inumber(),
        }
    }

    pub fn close(self, fs: &FileSys) {
        match self {
            Node::File(f) => f.close(fs),
            Node::Dir(d) => d.close(fs),
        }
    }
}
