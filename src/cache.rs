// Buffer cache.
//
// A fixed table of 64 entries holds cached copies of disk sectors behind a
// single lock. Callers pin an entry with access(), copy bytes in or out
// through the returned guard, and unpin by dropping it. A pinned entry is
// never chosen for eviction, and a dirty entry is written back before its
// slot is reused.
//
// Replacement is second-chance: a rotating hand skips pinned entries,
// clears the accessed bit of recently used ones, and takes the first entry
// left with neither protection.
//
// A background thread flushes every dirty entry once per FLUSH_INTERVAL
// ticks, and the read path queues the next sector of a file for a one-shot
// read-ahead task.

use crate::disk::BlockDevice;
use crate::param::{CACHE_SIZE, SECTOR_SIZE};
use crate::spinlock::Mutex;
use alloc::boxed::Box;
use alloc::vec::Vec;
use array_macro::array;

struct Entry {
    sector: u32,
    free: bool,
    open_cnt: u32,
    accessed: bool,
    dirty: bool,
    data: [u8; SECTOR_SIZE],
}

impl Entry {
    const fn new() -> Self {
        Self {
            sector: 0,
            free: true,
            open_cnt: 0,
            accessed: false,
            dirty: false,
            data: [0; SECTOR_SIZE],
        }
    }

    fn reset(&mut self) {
        self.free = true;
        self.open_cnt = 0;
        self.accessed = false;
        self.dirty = false;
    }
}

struct Table {
    entries: [Entry; CACHE_SIZE],
    hand: usize,
}

pub struct Cache {
    device: Box<dyn BlockDevice>,
    table: Mutex<Table>,
    ahead: Mutex<Vec<u32>>,
}

// A pinned cache entry. The table lock is not held while a guard is alive;
// the pin alone keeps the entry resident and its identity stable.
pub struct CacheRef<'a> {
    cache: &'a Cache,
    idx: usize,
}

impl Cache {
    pub fn new(device: Box<dyn BlockDevice>) -> Self {
        Self {
            device,
            table: Mutex::new(
                Table {
                    entries: array![_ => Entry::new(); CACHE_SIZE],
                    hand: 0,
                },
                "cache",
            ),
            ahead: Mutex::new(Vec::new(), "readahead"),
        }
    }

    pub fn sector_count(&self) -> u32 {
        self.device.sector_count()
    }

    // Pin the entry holding `sector`, bringing it in from disk on a miss.
    pub fn access(&self, sector: u32, mark_dirty: bool) -> CacheRef<'_> {
        let mut t = self.table.lock();
        let idx = match t.find(sector) {
            Some(i) => {
                let e = &mut t.entries[i];
                e.open_cnt += 1;
                e.accessed = true;
                e.dirty |= mark_dirty;
                i
            }
            None => self.replace(&mut t, sector, mark_dirty),
        };
        drop(t);
        CacheRef { cache: self, idx }
    }

    // Claim a slot for `sector`: a free one if any, otherwise the victim of
    // a second-chance sweep. Returns the slot pinned and loaded.
    fn replace(&self, t: &mut Table, sector: u32, mark_dirty: bool) -> usize {
        let idx = match t.free_slot() {
            Some(i) => i,
            None => self.evict(t),
        };
        let e = &mut t.entries[idx];
        e.sector = sector;
        e.free = false;
        e.open_cnt = 1;
        e.accessed = true;
        e.dirty = mark_dirty;
        self.device.read(sector, &mut e.data);
        idx
    }

    // Second-chance sweep. Two full passes are enough to clear every
    // accessed bit and take a victim; finding none means every entry is
    // pinned, which callers must never let happen.
    fn evict(&self, t: &mut Table) -> usize {
        for _ in 0..3 * CACHE_SIZE {
            let i = t.hand;
            t.hand = (t.hand + 1) % CACHE_SIZE;
            let e = &mut t.entries[i];
            if e.open_cnt > 0 {
                continue;
            }
            if e.accessed {
                e.accessed = false;
                continue;
            }
            if e.dirty {
                self.device.write(e.sector, &e.data);
            }
            e.reset();
            return i;
        }
        panic!("cache: every entry pinned");
    }

    // Write every dirty entry back. With `clear` the whole table is also
    // reinitialized, which only makes sense at shutdown.
    pub fn flush_all(&self, clear: bool) {
        let mut t = self.table.lock();
        for e in t.entries.iter_mut() {
            if !e.free && e.dirty {
                self.device.write(e.sector, &e.data);
                e.dirty = false;
            }
            if clear {
                e.reset();
            }
        }
    }

    // Make sure `sector` is resident without leaving a pin behind. This is
    // the body of the read-ahead task.
    pub fn ensure_cached(&self, sector: u32) {
        let mut t = self.table.lock();
        if t.find(sector).is_none() {
            let idx = self.replace(&mut t, sector, false);
            t.entries[idx].open_cnt -= 1;
        }
    }

    // Queue `sector` for read-ahead. The kernel drains the queue into
    // one-shot tasks at its next opportunity.
    pub fn request_ahead(&self, sector: u32) {
        if sector >= self.device.sector_count() {
            return;
        }
        let mut q = self.ahead.lock();
        if !q.contains(&sector) {
            q.push(sector);
        }
    }

    pub fn take_ahead(&self) -> Vec<u32> {
        let mut q = self.ahead.lock();
        core::mem::take(&mut *q)
    }

    #[cfg(test)]
    fn pins(&self, sector: u32) -> u32 {
        let t = self.table.lock();
        t.find(sector).map(|i| t.entries[i].open_cnt).unwrap_or(0)
    }

    #[cfg(test)]
    fn resident(&self, sector: u32) -> bool {
        self.table.lock().find(sector).is_some()
    }
}

impl Table {
    fn find(&self, sector: u32) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| !e.free && e.sector == sector)
    }

    fn free_slot(&mut self) -> Option<usize> {
        self.entries.iter().position(|e| e.free)
    }
}

impl<'a> CacheRef<'a> {
    pub fn sector(&self) -> u32 {
        self.cache.table.lock().entries[self.idx].sector
    }

    pub fn read(&self, offset: usize, dst: &mut [u8]) {
        let t = self.cache.table.lock();
        let e = &t.entries[self.idx];
        dst.copy_from_slice(&e.data[offset..offset + dst.len()]);
    }

    pub fn write(&mut self, offset: usize, src: &[u8]) {
        let mut t = self.cache.table.lock();
        let e = &mut t.entries[self.idx];
        e.data[offset..offset + src.len()].copy_from_slice(src);
        e.dirty = true;
    }

    pub fn zero(&mut self) {
        let mut t = self.cache.table.lock();
        let e = &mut t.entries[self.idx];
        e.data = [0; SECTOR_SIZE];
        e.dirty = true;
    }
}

impl<'a> Drop for CacheRef<'a> {
    fn drop(&mut self) {
        let mut t = self.cache.table.lock();
        let e = &mut t.entries[self.idx];
        assert!(e.open_cnt > 0, "cache: unbalanced release");
        e.open_cnt -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemDisk;

    fn cache(sectors: u32) -> Cache {
        Cache::new(Box::new(MemDisk::new(sectors)))
    }

    #[test]
    fn hit_returns_same_entry() {
        let c = cache(16);
        let mut g = c.access(3, true);
        g.write(0, &[1, 2, 3]);
        drop(g);

        let g = c.access(3, false);
        let mut out = [0u8; 3];
        g.read(0, &mut out);
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(c.pins(3), 1);
    }

    #[test]
    fn pins_balance() {
        let c = cache(16);
        let a = c.access(5, false);
        let b = c.access(5, false);
        assert_eq!(c.pins(5), 2);
        drop(a);
        drop(b);
        assert_eq!(c.pins(5), 0);
    }

    #[test]
    fn write_back_on_flush() {
        let c = cache(256);
        c.access(7, true).write(0, b"persist");
        c.flush_all(false);

        // Fill the table so sector 7 is evicted, then fault it back in and
        // check the flushed bytes survived.
        for s in 8..8 + CACHE_SIZE as u32 {
            c.access(s, false);
        }
        let g = c.access(7, false);
        let mut out = [0u8; 7];
        g.read(0, &mut out);
        assert_eq!(&out, b"persist");
    }

    #[test]
    fn eviction_skips_pinned() {
        let c = cache(256);
        let pinned = c.access(1, true);

        // Touch enough distinct sectors to force eviction many times over.
        for s in 2..2 + 2 * CACHE_SIZE as u32 {
            c.access(s, false);
        }
        assert!(c.resident(1), "pinned entry was evicted");
        assert_eq!(c.pins(1), 1);
        drop(pinned);
    }

    #[test]
    fn dirty_victim_reaches_disk() {
        let c = cache(256);
        c.access(9, true).write(0, b"victim");
        // No flush; eviction itself must write the sector back.
        for s in 10..10 + 2 * CACHE_SIZE as u32 {
            c.access(s, false);
        }
        assert!(!c.resident(9));
        let g = c.access(9, false);
        let mut out = [0u8; 6];
        g.read(0, &mut out);
        assert_eq!(&out, b"victim");
    }

    #[test]
    #[should_panic(expected = "every entry pinned")]
    fn all_pinned_panics() {
        let c = cache(256);
        let mut guards = Vec::new();
        for s in 1..=CACHE_SIZE as u32 {
            guards.push(c.access(s, false));
        }
        c.access(200, false);
    }

    #[test]
    fn ahead_queue_dedups() {
        let c = cache(16);
        c.request_ahead(4);
        c.request_ahead(4);
        c.request_ahead(5);
        c.request_ahead(99); // out of range, dropped
        assert_eq!(c.take_ahead(), alloc::vec![4, 5]);
        assert!(c.take_ahead().is_empty());
    }

    #[test]
    fn clear_reinitializes() {
        let c = cache(16);
        c.access(3, true).write(0, b"x");
        c.flush_all(true);
        assert!(!c.resident(3));
    }
}
