// Kernel wiring. One Kernel owns every process-wide singleton: the
// filesystem stack, the scheduler state and the console. It is built once
// at boot and torn down through halt().

use crate::disk::BlockDevice;
use crate::filesys::FileSys;
use crate::param::{FLUSH_INTERVAL, PRI_MIN};
use crate::proc::{Sched, Step};
use crate::spinlock::Mutex;
use alloc::boxed::Box;

pub struct BootOpts {
    pub format: bool,
    pub mlfqs: bool,
}

impl Default for BootOpts {
    fn default() -> Self {
        BootOpts {
            format: true,
            mlfqs: false,
        }
    }
}

// Console bottom half: fd 0 reads from it, fd 1 writes to it.
pub trait Console: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> usize;
    fn write(&self, buf: &[u8]) -> usize;
}

pub struct NullConsole;

impl Console for NullConsole {
    fn read(&self, _buf: &mut [u8]) -> usize {
        0
    }
    fn write(&self, buf: &[u8]) -> usize {
        buf.len()
    }
}

pub struct Kernel {
    pub fs: FileSys,
    pub(crate) sched: Mutex<Sched>,
    pub(crate) console: Box<dyn Console>,
}

impl Kernel {
    // Bring the kernel up: filesystem first, then the scheduler with the
    // caller registered as the boot thread, then the background cache
    // flusher. The flusher sleeps a flush interval before each write-back.
    pub fn boot(device: Box<dyn BlockDevice>, console: Box<dyn Console>, opts: BootOpts) -> Kernel {
        let k = Kernel {
            fs: FileSys::new(device, opts.format),
            sched: Mutex::new(Sched::new(opts.mlfqs), "sched"),
            console,
        };

        let mut primed = false;
        k.thread_create(
            "cache_writeback",
            PRI_MIN,
            Box::new(move |k: &Kernel| {
                if primed {
                    k.fs.cache.flush_all(false);
                } else {
                    primed = true;
                }
                Step::Sleep(FLUSH_INTERVAL)
            }),
        );
        k
    }

    // Flush everything and stop using the device. Power-off itself belongs
    // to the platform.
    pub fn halt(&self) {
        self.fs.done();
    }

    // Turn queued read-ahead requests into one-shot background loads.
    pub fn service_read_ahead(&self) {
        for sector in self.fs.cache.take_ahead() {
            self.thread_create(
                "cache_read_ahead",
                PRI_MIN,
                Box::new(move |k: &Kernel| {
                    k.fs.cache.ensure_cached(sector);
                    Step::Exit(0)
                }),
            );
        }
    }
}
