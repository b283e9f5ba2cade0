// Mutual exclusion locks guarding kernel tables. The kernel runs on one
// CPU, so a contended lock means a recursive acquisition or a lock leaked
// across a suspension point; after a bounded spin we panic with the lock's
// name rather than hang.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

const SPIN_LIMIT: u32 = 10_000_000;

#[derive(Debug)]
pub struct Mutex<T: ?Sized> {
    locked: AtomicBool,
    name: &'static str,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(data: T, name: &'static str) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        let mut spins = 0;
        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spins += 1;
            assert!(spins < SPIN_LIMIT, "mutex {}: possible deadlock", self.name);
            spin_loop();
        }
        MutexGuard { mutex: self }
    }

    // Release a guard and hand back the lock it came from, so the caller
    // can relock later without carrying a second reference.
    pub fn unlock(guard: MutexGuard<'_, T>) -> &Mutex<T> {
        guard.mutex
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<'a, T: ?Sized> Deref for MutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T: ?Sized> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for MutexGuard<'a, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_roundtrip() {
        let m = Mutex::new(1u32, "test");
        {
            let mut g = m.lock();
            *g += 1;
        }
        assert_eq!(*m.lock(), 2);
    }

    #[test]
    fn unlock_returns_lock() {
        let m = Mutex::new(0u32, "test");
        let g = m.lock();
        let back = Mutex::unlock(g);
        *back.lock() = 7;
        assert_eq!(*m.lock(), 7);
    }
}
