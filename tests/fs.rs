// Filesystem integration: the syscall surface driven over a RAM disk.

use kernel::disk::{BlockDevice, MemDisk};
use kernel::file::{File, Node};
use kernel::param::SECTOR_SIZE;
use kernel::{BootOpts, Kernel, NullConsole, Step};
use std::sync::Arc;

// Device handle the test keeps while the kernel owns another, so contents
// can be inspected across reboots.
struct SharedDisk(Arc<MemDisk>);

impl BlockDevice for SharedDisk {
    fn sector_count(&self) -> u32 {
        self.0.sector_count()
    }
    fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) {
        self.0.read(sector, buf)
    }
    fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) {
        self.0.write(sector, buf)
    }
}

fn boot(sectors: u32) -> Kernel {
    Kernel::boot(
        Box::new(MemDisk::new(sectors)),
        Box::new(NullConsole),
        BootOpts::default(),
    )
}

fn boot_on(disk: Arc<MemDisk>, format: bool) -> Kernel {
    Kernel::boot(
        Box::new(SharedDisk(disk)),
        Box::new(NullConsole),
        BootOpts {
            format,
            mlfqs: false,
        },
    )
}

#[test]
fn create_write_read_roundtrip() {
    let k = boot(4096);
    assert!(k.sys_create("/a", 0));

    let fd = k.sys_open("/a");
    assert!(fd >= 2);
    let data: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
    assert_eq!(k.sys_write(fd, &data), 1000);
    assert!(k.sys_close(fd));

    let fd = k.sys_open("/a");
    assert_eq!(k.sys_filesize(fd), 1000);
    let mut out = vec![0u8; 1000];
    assert_eq!(k.sys_read(fd, &mut out), 1000);
    assert_eq!(out, data);
    assert!(k.sys_close(fd));
}

#[test]
fn sparse_write_zero_fills_the_gap() {
    let k = boot(4096);
    assert!(k.sys_create("/s", 0));
    let fd = k.sys_open("/s");

    k.sys_seek(fd, 5000);
    assert_eq!(k.sys_write(fd, b"end"), 3);
    assert_eq!(k.sys_filesize(fd), 5003);

    k.sys_seek(fd, 0);
    let mut gap = vec![0xffu8; 5000];
    assert_eq!(k.sys_read(fd, &mut gap), 5000);
    assert!(gap.iter().all(|&b| b == 0));

    let mut tail = [0u8; 3];
    assert_eq!(k.sys_read(fd, &mut tail), 3);
    assert_eq!(&tail, b"end");
    assert!(k.sys_close(fd));
}

#[test]
fn growth_through_double_indirect() {
    let k = boot(4096);
    assert!(k.sys_create("/big", 0));
    let fd = k.sys_open("/big");

    assert_eq!(k.sys_write(fd, &[0u8; 1024]), 1024);

    // Past 4 direct + 9*128 single-indirect sectors (591,872 bytes), into
    // the double-indirect tree.
    let len = 700_000;
    k.sys_seek(fd, len - 3);
    assert_eq!(k.sys_write(fd, b"xyz"), 3);
    assert_eq!(k.sys_filesize(fd), len as i32);

    k.sys_seek(fd, 270_000);
    let mut mid = vec![1u8; 512];
    assert_eq!(k.sys_read(fd, &mut mid), 512);
    assert!(mid.iter().all(|&b| b == 0));

    k.sys_seek(fd, 650_000);
    let mut deep = vec![1u8; 512];
    assert_eq!(k.sys_read(fd, &mut deep), 512);
    assert!(deep.iter().all(|&b| b == 0));

    k.sys_seek(fd, len - 3);
    let mut tail = [0u8; 3];
    assert_eq!(k.sys_read(fd, &mut tail), 3);
    assert_eq!(&tail, b"xyz");
    assert!(k.sys_close(fd));
}

#[test]
fn contents_survive_reboot() {
    let disk = Arc::new(MemDisk::new(4096));
    let pattern: Vec<u8> = (0..3000).map(|i| (i * 7 % 256) as u8).collect();

    let k = boot_on(disk.clone(), true);
    assert!(k.sys_mkdir("/d"));
    assert!(k.sys_create("/d/p", 0));
    let fd = k.sys_open("/d/p");
    assert_eq!(k.sys_write(fd, &pattern), pattern.len() as i32);
    assert!(k.sys_close(fd));
    k.sys_halt();
    drop(k);

    let k = boot_on(disk, false);
    let fd = k.sys_open("/d/p");
    assert!(fd >= 2);
    let mut out = vec![0u8; pattern.len()];
    assert_eq!(k.sys_read(fd, &mut out), pattern.len() as i32);
    assert_eq!(out, pattern);
    assert!(k.sys_close(fd));
}

#[test]
fn flush_makes_reads_cache_independent() {
    let disk = Arc::new(MemDisk::new(4096));
    let k = boot_on(disk.clone(), true);
    assert!(k.sys_create("/c", 0));
    let fd = k.sys_open("/c");
    let data = vec![0x5au8; 4096];
    assert_eq!(k.sys_write(fd, &data), 4096);
    assert!(k.sys_close(fd));
    k.fs.cache.flush_all(false);

    // A second kernel over the same device sees every byte without any
    // help from the first kernel's cache.
    let k2 = boot_on(disk, false);
    let fd = k2.sys_open("/c");
    let mut out = vec![0u8; 4096];
    assert_eq!(k2.sys_read(fd, &mut out), 4096);
    assert_eq!(out, data);
    assert!(k2.sys_close(fd));
}

#[test]
fn directories_nest_and_list() {
    let k = boot(4096);
    assert!(k.sys_mkdir("/d"));
    assert!(k.sys_create("/d/f", 16));
    assert!(k.sys_mkdir("/d/sub"));

    let fd = k.sys_open("/d");
    assert!(k.sys_isdir(fd));
    let mut names = Vec::new();
    while let Some(n) = k.sys_readdir(fd) {
        names.push(n);
    }
    names.sort();
    assert_eq!(names, ["f", "sub"]);
    assert!(k.sys_close(fd));

    // A file descriptor is not a directory.
    let ffd = k.sys_open("/d/f");
    assert!(!k.sys_isdir(ffd));
    assert_eq!(k.sys_readdir(ffd), None);
    assert_eq!(k.sys_filesize(ffd), 16);
    assert!(k.sys_close(ffd));
}

#[test]
fn remove_rules() {
    let k = boot(4096);
    assert!(k.sys_mkdir("/d"));
    assert!(k.sys_create("/d/f", 0));

    // Non-empty directories stay.
    assert!(!k.sys_remove("/d"));
    assert!(k.sys_remove("/d/f"));
    assert_eq!(k.sys_open("/d/f"), -1);

    // A directory held open cannot be removed.
    let fd = k.sys_open("/d");
    assert!(!k.sys_remove("/d"));
    assert!(k.sys_close(fd));
    assert!(k.sys_remove("/d"));
    assert_eq!(k.sys_open("/d"), -1);

    // Nor can dot names or absent names.
    assert!(!k.sys_remove("/."));
    assert!(!k.sys_remove("/ghost"));
}

#[test]
fn path_resolution_normalizes() {
    let k = boot(4096);
    assert!(k.sys_mkdir("/a"));
    assert!(k.sys_mkdir("/a/b"));
    assert!(k.sys_create("/a/c", 0));

    let plain = k.sys_open("/a/c");
    let twisty = k.sys_open("/a/./b/../c");
    assert!(plain >= 2 && twisty >= 2);
    assert_eq!(k.sys_inumber(plain), k.sys_inumber(twisty));
    assert!(k.sys_close(plain));
    assert!(k.sys_close(twisty));

    // Intermediate components must be directories.
    assert_eq!(k.sys_open("/a/c/d"), -1);

    // "/" and "/." are the root; ".." of the root is the root.
    let root = k.sys_open("/");
    let dot = k.sys_open("/.");
    let up = k.sys_open("/..");
    assert!(k.sys_isdir(root));
    assert_eq!(k.sys_inumber(root), k.sys_inumber(dot));
    assert_eq!(k.sys_inumber(root), k.sys_inumber(up));
}

#[test]
fn chdir_rebases_relative_paths() {
    let k = boot(4096);
    assert!(k.sys_mkdir("/w"));
    assert!(k.sys_chdir("/w"));
    assert!(k.sys_create("rel", 0));
    assert!(k.sys_open("/w/rel") >= 2);

    assert!(k.sys_chdir(".."));
    assert!(k.sys_create("top", 0));
    assert!(k.sys_open("/top") >= 2);

    // The working directory is pinned against removal.
    assert!(k.sys_mkdir("/z"));
    assert!(k.sys_chdir("/z"));
    assert!(!k.sys_remove("/z"));
    assert!(k.sys_chdir("/"));
    assert!(k.sys_remove("/z"));

    assert!(!k.sys_chdir("/top")); // a file is not a directory
    assert!(!k.sys_chdir("/gone"));
}

#[test]
fn create_rejects_bad_names() {
    let k = boot(4096);
    assert!(!k.sys_create("/.", 0));
    assert!(!k.sys_create("/..", 0));
    assert!(!k.sys_create("", 0));
    assert!(!k.sys_create("/", 0));
    assert!(!k.sys_create("/fifteen_chars__", 0)); // over the name limit

    assert!(k.sys_create("/dup", 0));
    assert!(!k.sys_create("/dup", 0));
    assert!(!k.sys_mkdir("/dup"));
}

#[test]
fn tombstones_are_reused() {
    let k = boot(4096);
    assert!(k.sys_mkdir("/t"));
    for name in ["/t/a", "/t/b", "/t/c"] {
        assert!(k.sys_create(name, 0));
    }
    let len_before = match k.fs.open("/t", None) {
        Some(Node::Dir(d)) => {
            let len = d.inode().length();
            d.close(&k.fs);
            len
        }
        _ => panic!("expected directory"),
    };

    assert!(k.sys_remove("/t/b"));
    assert!(k.sys_create("/t/d", 0));

    let len_after = match k.fs.open("/t", None) {
        Some(Node::Dir(d)) => {
            let len = d.inode().length();
            d.close(&k.fs);
            len
        }
        _ => panic!("expected directory"),
    };
    assert_eq!(len_before, len_after);
}

#[test]
fn deny_write_stops_other_handles() {
    let k = boot(4096);
    assert!(k.sys_create("/x", 0));

    let mut exec_like = match k.fs.open("/x", None) {
        Some(Node::File(f)) => f,
        _ => panic!("expected file"),
    };
    exec_like.deny_write();

    let fd = k.sys_open("/x");
    assert_eq!(k.sys_write(fd, b"nope"), 0);

    exec_like.close(&k.fs);
    assert_eq!(k.sys_write(fd, b"yes!"), 4);
    assert!(k.sys_close(fd));
}

#[test]
fn console_fds() {
    let k = boot(1024);
    assert_eq!(k.sys_write(1, b"hello"), 5);
    let mut buf = [0u8; 4];
    assert_eq!(k.sys_read(0, &mut buf), 0); // NullConsole has no input
}

#[test]
fn reading_stdout_kills_the_caller() {
    let k = boot(1024);
    let me = k.current_tid();
    let mut buf = [0u8; 1];
    assert_eq!(k.sys_read(1, &mut buf), -1);
    assert!(!k.thread_alive(me));
}

#[test]
fn writing_stdin_kills_the_caller() {
    let k = boot(1024);
    let me = k.current_tid();
    assert_eq!(k.sys_write(0, b"x"), -1);
    assert!(!k.thread_alive(me));
}

#[test]
fn bad_descriptors_fail_softly() {
    let k = boot(1024);
    let mut buf = [0u8; 8];
    assert_eq!(k.sys_read(99, &mut buf), -1);
    assert_eq!(k.sys_write(99, &buf), -1);
    assert_eq!(k.sys_filesize(99), -1);
    assert_eq!(k.sys_tell(99), -1);
    assert!(!k.sys_close(99));
    assert!(!k.sys_isdir(99));
    assert_eq!(k.sys_inumber(99), -1);
}

#[test]
fn seek_and_tell() {
    let k = boot(4096);
    assert!(k.sys_create("/f", 0));
    let fd = k.sys_open("/f");
    assert_eq!(k.sys_write(fd, b"0123456789"), 10);
    k.sys_seek(fd, 4);
    assert_eq!(k.sys_tell(fd), 4);
    let mut b = [0u8; 2];
    assert_eq!(k.sys_read(fd, &mut b), 2);
    assert_eq!(&b, b"45");
    assert_eq!(k.sys_tell(fd), 6);
    assert!(k.sys_close(fd));
}

#[test]
fn read_ahead_tasks_run_and_exit() {
    let k = boot(4096);
    assert!(k.sys_create("/r", 0));
    let fd = k.sys_open("/r");
    assert_eq!(k.sys_write(fd, &[9u8; 3 * SECTOR_SIZE]), 3 * SECTOR_SIZE as i32);
    k.sys_seek(fd, 0);
    let mut out = vec![0u8; 3 * SECTOR_SIZE];
    assert_eq!(k.sys_read(fd, &mut out), 3 * SECTOR_SIZE as i32);
    assert!(k.sys_close(fd));

    // Let the spawned read-ahead tasks run to completion.
    k.sleep(3);
}

#[test]
fn concurrent_reader_never_sees_partial_extension() {
    const CHUNK: usize = SECTOR_SIZE;
    const CHUNKS: usize = 24;
    fn pat(i: usize) -> u8 {
        (i * 31 % 251) as u8
    }

    let k = boot(4096);
    assert!(k.sys_create("/rw", 0));

    // Writer thread: grow the file by one pattern chunk per quantum
    // through its own handle. A completed write publishes its whole
    // extension at once.
    let mut file: Option<File> = None;
    let mut wrote = 0usize;
    let writer = k.thread_create(
        "writer",
        31,
        Box::new(move |k: &Kernel| {
            if file.is_none() {
                file = match k.fs.open("/rw", None) {
                    Some(Node::File(f)) => Some(f),
                    _ => return Step::Exit(1),
                };
            }
            if wrote == CHUNKS {
                file.take().unwrap().close(&k.fs);
                return Step::Exit(0);
            }
            let mut chunk = [0u8; CHUNK];
            for (j, b) in chunk.iter_mut().enumerate() {
                *b = pat(wrote * CHUNK + j);
            }
            if file.as_mut().unwrap().write(&k.fs, &chunk) != CHUNK {
                return Step::Exit(1);
            }
            wrote += 1;
            Step::Yield
        }),
    );

    // Reader: interleave with the writer one quantum at a time. No read
    // may surface bytes past the writer's last published extension, so
    // the count stays a whole-chunk multiple, never shrinks, and every
    // readable byte already carries the pattern.
    let fd = k.sys_open("/rw");
    let mut buf = vec![0u8; CHUNKS * CHUNK];
    let mut seen = 0usize;
    for _ in 0..CHUNKS * 4 {
        k.yield_now();
        k.sys_seek(fd, 0);
        let n = k.sys_read(fd, &mut buf);
        assert!(n >= 0);
        let n = n as usize;
        assert_eq!(n % CHUNK, 0, "read observed a partially published extension");
        assert!(n >= seen, "published length went backwards");
        for (i, &b) in buf[..n].iter().enumerate() {
            assert_eq!(b, pat(i), "unpublished byte surfaced at offset {}", i);
        }
        seen = n;
        if seen == CHUNKS * CHUNK {
            break;
        }
    }
    assert_eq!(seen, CHUNKS * CHUNK);
    assert!(k.sys_close(fd));
    assert_eq!(k.wait(writer), 0);
}

#[test]
fn background_flusher_writes_back() {
    let disk = Arc::new(MemDisk::new(4096));
    let k = boot_on(disk.clone(), true);
    assert!(k.sys_create("/fl", 0));
    let fd = k.sys_open("/fl");
    assert_eq!(k.sys_write(fd, &[0xa5u8; 600]), 600);
    assert!(k.sys_close(fd));

    // Sleep past one flush interval; the background thread writes the
    // dirty entries out without an explicit flush call.
    k.sleep(4 * 100 + 5);

    let k2 = boot_on(disk, false);
    let fd = k2.sys_open("/fl");
    let mut out = vec![0u8; 600];
    assert_eq!(k2.sys_read(fd, &mut out), 600);
    assert!(out.iter().all(|&b| b == 0xa5));
}
