// Kernel-wide tunables and layout constants.

pub const SECTOR_SIZE: usize = 512; // bytes per device sector
pub const CACHE_SIZE: usize = 64; // buffer cache entries
pub const NOFILE: usize = 128; // open files per thread

// Inode index geometry: 4 direct slots, 9 single-indirect slots and one
// double-indirect slot, each indirect sector holding 128 sector numbers.
pub const NDIRECT: usize = 4;
pub const NINDIRECT: usize = 9;
pub const INODE_PTRS: usize = 14;
pub const PTRS_PER_SECTOR: usize = 128;
pub const MAX_SECTORS: usize =
    NDIRECT + NINDIRECT * PTRS_PER_SECTOR + PTRS_PER_SECTOR * PTRS_PER_SECTOR;

pub const NAME_MAX: usize = 14; // directory entry name length

pub const TIMER_FREQ: u64 = 100; // timer ticks per second
pub const TIME_SLICE: u32 = 4; // ticks per scheduling quantum
pub const FLUSH_INTERVAL: u64 = 4 * TIMER_FREQ; // cache write-back period

pub const PRI_MIN: i32 = 0;
pub const PRI_DEFAULT: i32 = 31;
pub const PRI_MAX: i32 = 63;
pub const DONATE_DEPTH: usize = 8; // priority donation chain bound

pub const NICE_MIN: i32 = -20;
pub const NICE_MAX: i32 = 20;
