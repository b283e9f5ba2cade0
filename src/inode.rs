// Inodes.
//
// An inode describes a single unnamed file. The on-disk form occupies
// exactly one sector and indexes its data through 4 direct slots, 9
// single-indirect sectors and one double-indirect sector, 128 pointers per
// indirect sector. Growth is sparse: the triple of cursors records how far
// index construction has advanced, and sectors are allocated one at a time
// in cursor order.
//
// The kernel keeps a table of open inodes so that opening a sector twice
// yields the same object with a higher open count. All inode I/O, data and
// index sectors alike, goes through the buffer cache.
//
// Writers may extend a file. A writer publishes the new `length` before
// copying bytes, while readers bound themselves by `read_length`, which is
// republished from `length` only when a write finishes or a read completes.
// A reader therefore never sees bytes of an extension that is still being
// written; outside an extension the two lengths are equal.

use crate::cache::Cache;
use crate::freemap::FreeMap;
use crate::param::{
    INODE_PTRS, MAX_SECTORS, NDIRECT, NINDIRECT, PTRS_PER_SECTOR, SECTOR_SIZE,
};
use crate::spinlock::Mutex;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem::size_of;
use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

pub const INODE_MAGIC: u32 = 0x494e_4f44;

// On-disk inode. The layout is bit-exact across runs.
#[repr(C)]
#[derive(AsBytes, FromZeroes, FromBytes)]
pub struct DiskInode {
    pub length: i32,
    pub magic: u32,
    pub unused: [u32; 107],
    pub direct_index: u32,
    pub indirect_index: u32,
    pub double_indirect_index: u32,
    pub blocks: [u32; INODE_PTRS],
    pub is_dir: u32,
    pub parent: u32,
}

const_assert_eq!(size_of::<DiskInode>(), SECTOR_SIZE);

#[repr(C)]
#[derive(AsBytes, FromZeroes, FromBytes)]
struct IndirectBlock {
    ptrs: [u32; PTRS_PER_SECTOR],
}

const_assert_eq!(size_of::<IndirectBlock>(), SECTOR_SIZE);

// In-memory inode.
pub struct Inode {
    sector: u32,
    // held across grow for regular files; directory growth is serialized
    // by the filesystem lock
    grow_lock: Mutex<()>,
    state: Mutex<InodeState>,
}

pub struct InodeState {
    pub open_cnt: u32,
    pub removed: bool,
    pub deny_write_cnt: u32,
    pub length: i32,
    pub read_length: i32,
    pub direct_index: u32,
    pub indirect_index: u32,
    pub double_indirect_index: u32,
    pub blocks: [u32; INODE_PTRS],
    pub is_dir: bool,
    pub parent: u32,
}

fn bytes_to_sectors(len: usize) -> usize {
    (len + SECTOR_SIZE - 1) / SECTOR_SIZE
}

fn read_indirect(cache: &Cache, sector: u32) -> IndirectBlock {
    let mut buf = [0u8; SECTOR_SIZE];
    cache.access(sector, false).read(0, &mut buf);
    IndirectBlock::read_from(&buf[..]).unwrap()
}

fn write_indirect(cache: &Cache, sector: u32, blk: &IndirectBlock) {
    cache.access(sector, true).write(0, blk.as_bytes());
}

// Allocate one data sector and zero it on disk.
fn alloc_zeroed(cache: &Cache, freemap: &FreeMap) -> Option<u32> {
    let s = freemap.allocate(1)?;
    cache.access(s, true).zero();
    Some(s)
}

impl InodeState {
    fn from_disk(d: &DiskInode) -> Self {
        Self {
            open_cnt: 1,
            removed: false,
            deny_write_cnt: 0,
            length: d.length,
            read_length: d.length,
            direct_index: d.direct_index,
            indirect_index: d.indirect_index,
            double_indirect_index: d.double_indirect_index,
            blocks: d.blocks,
            is_dir: d.is_dir != 0,
            parent: d.parent,
        }
    }

    fn to_disk(&self) -> DiskInode {
        DiskInode {
            length: self.length,
            magic: INODE_MAGIC,
            unused: [0; 107],
            direct_index: self.direct_index,
            indirect_index: self.indirect_index,
            double_indirect_index: self.double_indirect_index,
            blocks: self.blocks,
            is_dir: self.is_dir as u32,
            parent: self.parent,
        }
    }

    fn fresh() -> Self {
        Self {
            open_cnt: 1,
            removed: false,
            deny_write_cnt: 0,
            length: 0,
            read_length: 0,
            direct_index: 0,
            indirect_index: 0,
            double_indirect_index: 0,
            blocks: [0; INODE_PTRS],
            is_dir: false,
            parent: 0,
        }
    }

    // Sector holding byte `pos` of a file `length` bytes long, or None if
    // `pos` is past the end.
    fn byte_to_sector(&self, cache: &Cache, length: usize, pos: usize) -> Option<u32> {
        if pos >= length {
            return None;
        }
        if pos < NDIRECT * SECTOR_SIZE {
            return Some(self.blocks[pos / SECTOR_SIZE]);
        }
        let per_indirect = PTRS_PER_SECTOR * SECTOR_SIZE;
        if pos < (NDIRECT + NINDIRECT * PTRS_PER_SECTOR) * SECTOR_SIZE {
            let pos = pos - NDIRECT * SECTOR_SIZE;
            let idx = pos / per_indirect + NDIRECT;
            let blk = read_indirect(cache, self.blocks[idx]);
            return Some(blk.ptrs[pos % per_indirect / SECTOR_SIZE]);
        }
        let pos = pos - (NDIRECT + NINDIRECT * PTRS_PER_SECTOR) * SECTOR_SIZE;
        let level_one = read_indirect(cache, self.blocks[INODE_PTRS - 1]);
        let level_two = read_indirect(cache, level_one.ptrs[pos / per_indirect]);
        Some(level_two.ptrs[pos % per_indirect / SECTOR_SIZE])
    }

    // Extend the index tree to cover `new_length` bytes, zero-filling every
    // new data sector. The cursors walk direct slots first, then the nine
    // single-indirect sectors, then the double-indirect tree. Allocation
    // failure stops the walk; nothing already allocated is rolled back, and
    // the returned length covers exactly the sectors the file now owns.
    fn grow(&mut self, cache: &Cache, freemap: &FreeMap, new_length: usize) -> i32 {
        assert!(bytes_to_sectors(new_length) <= MAX_SECTORS, "inode: file too large");
        let old_sectors = bytes_to_sectors(self.length as usize);
        let mut left = bytes_to_sectors(new_length) - old_sectors;
        if left == 0 {
            return new_length as i32;
        }
        let want = left;

        // Direct slots.
        while (self.direct_index as usize) < NDIRECT && left > 0 {
            match alloc_zeroed(cache, freemap) {
                Some(s) => self.blocks[self.direct_index as usize] = s,
                None => return self.covered(new_length, want, left),
            }
            self.direct_index += 1;
            left -= 1;
        }

        // Single-indirect sectors.
        while (self.direct_index as usize) < INODE_PTRS - 1 && left > 0 {
            let di = self.direct_index as usize;
            let mut blk = if self.indirect_index == 0 {
                match freemap.allocate(1) {
                    Some(s) => {
                        self.blocks[di] = s;
                        IndirectBlock::new_zeroed()
                    }
                    None => return self.covered(new_length, want, left),
                }
            } else {
                read_indirect(cache, self.blocks[di])
            };

            while (self.indirect_index as usize) < PTRS_PER_SECTOR && left > 0 {
                match alloc_zeroed(cache, freemap) {
                    Some(s) => blk.ptrs[self.indirect_index as usize] = s,
                    None => {
                        write_indirect(cache, self.blocks[di], &blk);
                        return self.covered(new_length, want, left);
                    }
                }
                self.indirect_index += 1;
                left -= 1;
            }
            write_indirect(cache, self.blocks[di], &blk);

            if self.indirect_index as usize == PTRS_PER_SECTOR {
                self.indirect_index = 0;
                self.direct_index += 1;
            }
        }

        // Double-indirect tree. The indirect cursor indexes the level-one
        // sector here and the double cursor walks each level-two sector.
        if self.direct_index as usize == INODE_PTRS - 1 && left > 0 {
            let mut level_one = if self.double_indirect_index == 0 && self.indirect_index == 0 {
                match freemap.allocate(1) {
                    Some(s) => {
                        self.blocks[INODE_PTRS - 1] = s;
                        IndirectBlock::new_zeroed()
                    }
                    None => return self.covered(new_length, want, left),
                }
            } else {
                read_indirect(cache, self.blocks[INODE_PTRS - 1])
            };

            while (self.indirect_index as usize) < PTRS_PER_SECTOR && left > 0 {
                let ii = self.indirect_index as usize;
                let mut level_two = if self.double_indirect_index == 0 {
                    match freemap.allocate(1) {
                        Some(s) => {
                            level_one.ptrs[ii] = s;
                            IndirectBlock::new_zeroed()
                        }
                        None => break,
                    }
                } else {
                    read_indirect(cache, level_one.ptrs[ii])
                };

                while (self.double_indirect_index as usize) < PTRS_PER_SECTOR && left > 0 {
                    match alloc_zeroed(cache, freemap) {
                        Some(s) => level_two.ptrs[self.double_indirect_index as usize] = s,
                        None => break,
                    }
                    self.double_indirect_index += 1;
                    left -= 1;
                }
                write_indirect(cache, level_one.ptrs[ii], &level_two);

                if self.double_indirect_index as usize == PTRS_PER_SECTOR {
                    self.double_indirect_index = 0;
                    self.indirect_index += 1;
                } else {
                    break; // allocation failed or target reached
                }
            }
            write_indirect(cache, self.blocks[INODE_PTRS - 1], &level_one);
        }

        self.covered(new_length, want, left)
    }

    // Length actually reachable after a growth attempt that still needed
    // `left` of the `want` sectors it set out to add.
    fn covered(&self, new_length: usize, want: usize, left: usize) -> i32 {
        if left == 0 {
            new_length as i32
        } else {
            let sectors = bytes_to_sectors(self.length as usize) + (want - left);
            core::cmp::min(new_length, sectors * SECTOR_SIZE) as i32
        }
    }

    // Release every data and index sector the file owns. The walk is
    // driven by the length, which always reflects the allocated prefix.
    fn free(&self, cache: &Cache, freemap: &FreeMap) {
        let mut n = bytes_to_sectors(self.length as usize);
        let mut idx = 0;

        while idx < NDIRECT && n > 0 {
            freemap.release(self.blocks[idx], 1);
            n -= 1;
            idx += 1;
        }

        while idx < INODE_PTRS - 1 && n > 0 {
            let blk = read_indirect(cache, self.blocks[idx]);
            let cnt = core::cmp::min(n, PTRS_PER_SECTOR);
            for p in blk.ptrs.iter().take(cnt) {
                freemap.release(*p, 1);
            }
            n -= cnt;
            freemap.release(self.blocks[idx], 1);
            idx += 1;
        }

        if n > 0 {
            let level_one = read_indirect(cache, self.blocks[INODE_PTRS - 1]);
            let groups = (n + PTRS_PER_SECTOR - 1) / PTRS_PER_SECTOR;
            for g in 0..groups {
                let level_two = read_indirect(cache, level_one.ptrs[g]);
                let cnt = core::cmp::min(n, PTRS_PER_SECTOR);
                for p in level_two.ptrs.iter().take(cnt) {
                    freemap.release(*p, 1);
                }
                n -= cnt;
                freemap.release(level_one.ptrs[g], 1);
            }
            freemap.release(self.blocks[INODE_PTRS - 1], 1);
        }
    }
}

// Write a fresh inode of `length` bytes to `sector`. Returns false if the
// data sectors cannot all be allocated; the sectors the file came to own
// are released again before returning.
pub fn create(
    cache: &Cache,
    freemap: &FreeMap,
    sector: u32,
    length: usize,
    is_dir: bool,
    parent: u32,
) -> bool {
    let mut st = InodeState::fresh();
    st.is_dir = is_dir;
    st.parent = parent;
    let got = st.grow(cache, freemap, length);
    if (got as usize) < length {
        st.length = got;
        st.free(cache, freemap);
        return false;
    }
    st.length = length as i32;
    cache.access(sector, true).write(0, st.to_disk().as_bytes());
    true
}

pub struct InodeTable {
    list: Mutex<Vec<Arc<Inode>>>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self {
            list: Mutex::new(Vec::new(), "itable"),
        }
    }

    // Open the inode at `sector`, sharing the in-memory object if the
    // sector is already open.
    pub fn open(&self, cache: &Cache, sector: u32) -> Arc<Inode> {
        let mut list = self.list.lock();
        if let Some(ip) = list.iter().find(|ip| ip.sector == sector) {
            ip.state.lock().open_cnt += 1;
            return Arc::clone(ip);
        }

        let mut buf = [0u8; SECTOR_SIZE];
        cache.access(sector, false).read(0, &mut buf);
        let d = DiskInode::read_from(&buf[..]).unwrap();
        assert_eq!(d.magic, INODE_MAGIC, "inode {}: bad magic", sector);

        let ip = Arc::new(Inode {
            sector,
            grow_lock: Mutex::new((), "inode grow"),
            state: Mutex::new(InodeState::from_disk(&d), "inode"),
        });
        list.push(Arc::clone(&ip));
        ip
    }

    pub fn reopen(&self, ip: &Arc<Inode>) -> Arc<Inode> {
        ip.state.lock().open_cnt += 1;
        Arc::clone(ip)
    }

    // Drop one reference. The last closer either frees a removed inode's
    // sectors or writes the surviving state back to disk.
    pub fn close(&self, cache: &Cache, freemap: &FreeMap, ip: Arc<Inode>) {
        let mut list = self.list.lock();
        let mut st = ip.state.lock();
        assert!(st.open_cnt > 0, "inode {}: unbalanced close", ip.sector);
        st.open_cnt -= 1;
        if st.open_cnt > 0 {
            return;
        }

        list.retain(|other| other.sector != ip.sector);
        if st.removed {
            st.free(cache, freemap);
            freemap.release(ip.sector, 1);
        } else {
            cache
                .access(ip.sector, true)
                .write(0, st.to_disk().as_bytes());
        }
    }

    #[cfg(test)]
    pub fn open_count(&self) -> usize {
        self.list.lock().len()
    }
}

impl Inode {
    pub fn sector(&self) -> u32 {
        self.sector
    }

    pub fn length(&self) -> usize {
        self.state.lock().length as usize
    }

    pub fn is_dir(&self) -> bool {
        self.state.lock().is_dir
    }

    pub fn parent(&self) -> u32 {
        self.state.lock().parent
    }

    pub fn open_cnt(&self) -> u32 {
        self.state.lock().open_cnt
    }

    pub fn set_parent(&self, parent: u32) {
        self.state.lock().parent = parent;
    }

    pub fn mark_removed(&self) {
        self.state.lock().removed = true;
    }

    pub fn deny_write(&self) {
        let mut st = self.state.lock();
        st.deny_write_cnt += 1;
        assert!(st.deny_write_cnt <= st.open_cnt);
    }

    pub fn allow_write(&self) {
        let mut st = self.state.lock();
        assert!(st.deny_write_cnt > 0);
        st.deny_write_cnt -= 1;
    }

    // Read up to dst.len() bytes starting at `offset`, bounded by the
    // published read length. Each touched sector pins its cache entry for
    // the copy and queues its successor for read-ahead.
    pub fn read_at(&self, cache: &Cache, dst: &mut [u8], offset: usize) -> usize {
        let mut st = self.state.lock();
        let length = st.read_length as usize;
        if offset >= length {
            st.read_length = st.length;
            return 0;
        }

        let mut tot = 0;
        let mut off = offset;
        while tot < dst.len() {
            let sector = match st.byte_to_sector(cache, length, off) {
                Some(s) => s,
                None => break,
            };
            let sector_ofs = off % SECTOR_SIZE;
            let chunk = core::cmp::min(
                dst.len() - tot,
                core::cmp::min(SECTOR_SIZE - sector_ofs, length - off),
            );
            if chunk == 0 {
                break;
            }
            cache
                .access(sector, false)
                .read(sector_ofs, &mut dst[tot..tot + chunk]);
            cache.request_ahead(sector + 1);
            tot += chunk;
            off += chunk;
        }

        // Publish any extension a writer has completed meanwhile.
        st.read_length = st.length;
        tot
    }

    // Write src at `offset`, extending the file first if needed. Writers
    // denied by deny_write_cnt write nothing.
    pub fn write_at(&self, cache: &Cache, freemap: &FreeMap, src: &[u8], offset: usize) -> usize {
        {
            let st = self.state.lock();
            if st.deny_write_cnt > 0 {
                return 0;
            }
        }

        let needs_grow = {
            let st = self.state.lock();
            offset + src.len() > st.length as usize
        };
        if needs_grow {
            let st = self.state.lock();
            let is_dir = st.is_dir;
            drop(st);
            let _g = if !is_dir { Some(self.grow_lock.lock()) } else { None };
            let mut st = self.state.lock();
            if offset + src.len() > st.length as usize {
                let new_length = st.grow(cache, freemap, offset + src.len());
                st.length = new_length;
            }
        }

        let mut st = self.state.lock();
        let length = st.length as usize;
        let mut tot = 0;
        let mut off = offset;
        while tot < src.len() {
            let sector = match st.byte_to_sector(cache, length, off) {
                Some(s) => s,
                None => break,
            };
            let sector_ofs = off % SECTOR_SIZE;
            let chunk = core::cmp::min(
                src.len() - tot,
                core::cmp::min(SECTOR_SIZE - sector_ofs, length - off),
            );
            if chunk == 0 {
                break;
            }
            cache
                .access(sector, true)
                .write(sector_ofs, &src[tot..tot + chunk]);
            tot += chunk;
            off += chunk;
        }
        // The extension is fully written; let readers see it.
        st.read_length = st.length;
        tot
    }
}
