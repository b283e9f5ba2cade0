// System-call surface.
//
// The dispatch layer above validates user pointers and unpacks arguments;
// what arrives here is already-checked slices and strings. Descriptors are
// small integers into the calling thread's open-file table, starting at 2:
// fd 0 is the console's input, fd 1 its output. Reading fd 1 or writing
// fd 0 kills the offending thread with exit code -1. Bad descriptors fail
// the call, never the kernel.

use crate::dir::Dir;
use crate::file::Node;
use crate::kernel::Kernel;
use crate::proc::{ThreadFn, Tid};
use alloc::string::String;

const FD_BASE: i32 = 2;

impl Kernel {
    // Run `f` with the calling thread's working directory. The reference
    // is taken out of the thread while filesystem code runs so the
    // scheduler lock is not held across it.
    fn with_cwd<R>(&self, f: impl FnOnce(Option<&Dir>) -> R) -> R {
        let cwd = {
            let mut s = self.sched.lock();
            let cur = s.current;
            s.get_mut(cur).cwd.take()
        };
        let r = f(cwd.as_ref());
        let mut s = self.sched.lock();
        let cur = s.current;
        s.get_mut(cur).cwd = cwd;
        r
    }

    fn install_fd(&self, node: Node) -> i32 {
        let mut node = Some(node);
        {
            let mut s = self.sched.lock();
            let cur = s.current;
            let t = s.get_mut(cur);
            if let Some(i) = t.ofile.iter().position(|slot| slot.is_none()) {
                t.ofile[i] = node.take();
                return i as i32 + FD_BASE;
            }
        }
        // table full
        node.unwrap().close(&self.fs);
        -1
    }

    fn take_fd(&self, fd: i32) -> Option<Node> {
        if fd < FD_BASE {
            return None;
        }
        let idx = (fd - FD_BASE) as usize;
        let mut s = self.sched.lock();
        let cur = s.current;
        s.get_mut(cur).ofile.get_mut(idx)?.take()
    }

    // Borrow the node behind `fd` for the duration of `f`, again without
    // holding the scheduler lock while filesystem code runs.
    fn with_fd<R>(&self, fd: i32, f: impl FnOnce(&mut Node) -> R) -> Option<R> {
        let mut node = self.take_fd(fd)?;
        let r = f(&mut node);
        let idx = (fd - FD_BASE) as usize;
        let mut s = self.sched.lock();
        let cur = s.current;
        s.get_mut(cur).ofile[idx] = Some(node);
        Some(r)
    }

    pub fn sys_halt(&self) {
        self.halt();
    }

    pub fn sys_exit(&self, code: i32) {
        self.exit_current(code);
    }

    pub fn sys_exec(&self, name: &str, body: ThreadFn) -> Tid {
        self.exec(name, body)
    }

    pub fn sys_wait(&self, tid: Tid) -> i32 {
        self.wait(tid)
    }

    pub fn sys_create(&self, path: &str, size: usize) -> bool {
        self.with_cwd(|cwd| self.fs.create(path, size, false, cwd))
    }

    pub fn sys_mkdir(&self, path: &str) -> bool {
        self.with_cwd(|cwd| self.fs.create(path, 0, true, cwd))
    }

    pub fn sys_remove(&self, path: &str) -> bool {
        self.with_cwd(|cwd| self.fs.remove(path, cwd))
    }

    pub fn sys_open(&self, path: &str) -> i32 {
        match self.with_cwd(|cwd| self.fs.open(path, cwd)) {
            Some(node) => self.install_fd(node),
            None => -1,
        }
    }

    pub fn sys_close(&self, fd: i32) -> bool {
        match self.take_fd(fd) {
            Some(node) => {
                node.close(&self.fs);
                true
            }
            None => false,
        }
    }

    pub fn sys_filesize(&self, fd: i32) -> i32 {
        self.with_fd(fd, |n| match n {
            Node::File(f) => f.length() as i32,
            Node::Dir(_) => -1,
        })
        .unwrap_or(-1)
    }

    pub fn sys_read(&self, fd: i32, buf: &mut [u8]) -> i32 {
        if fd == 0 {
            return self.console.read(buf) as i32;
        }
        if fd == 1 {
            // reading the output stream is fatal to the caller
            self.exit_current(-1);
            return -1;
        }
        let r = self
            .with_fd(fd, |n| match n {
                Node::File(f) => f.read(&self.fs, buf) as i32,
                Node::Dir(_) => -1,
            })
            .unwrap_or(-1);
        self.service_read_ahead();
        r
    }

    pub fn sys_write(&self, fd: i32, buf: &[u8]) -> i32 {
        if fd == 1 {
            return self.console.write(buf) as i32;
        }
        if fd == 0 {
            // writing the input stream is fatal to the caller
            self.exit_current(-1);
            return -1;
        }
        self.with_fd(fd, |n| match n {
            Node::File(f) => f.write(&self.fs, buf) as i32,
            Node::Dir(_) => -1,
        })
        .unwrap_or(-1)
    }

    pub fn sys_seek(&self, fd: i32, pos: usize) {
        let _ = self.with_fd(fd, |n| {
            if let Node::File(f) = n {
                f.seek(pos);
            }
        });
    }

    pub fn sys_tell(&self, fd: i32) -> i32 {
        self.with_fd(fd, |n| match n {
            Node::File(f) => f.tell() as i32,
            Node::Dir(_) => -1,
        })
        .unwrap_or(-1)
    }

    pub fn sys_chdir(&self, path: &str) -> bool {
        let newdir = self.with_cwd(|cwd| self.fs.open_dir(path, cwd));
        match newdir {
            Some(d) => {
                let old = {
                    let mut s = self.sched.lock();
                    let cur = s.current;
                    s.get_mut(cur).cwd.replace(d)
                };
                if let Some(old) = old {
                    old.close(&self.fs);
                }
                true
            }
            None => false,
        }
    }

    pub fn sys_readdir(&self, fd: i32) -> Option<String> {
        self.with_fd(fd, |n| match n {
            Node::Dir(d) => d.read(&self.fs),
            Node::File(_) => None,
        })
        .flatten()
    }

    pub fn sys_isdir(&self, fd: i32) -> bool {
        self.with_fd(fd, |n| n.is_dir()).unwrap_or(false)
    }

    pub fn sys_inumber(&self, fd: i32) -> i32 {
        self.with_fd(fd, |n| n.inumber() as i32).unwrap_or(-1)
    }
}
