// Blocking synchronization primitives, built over the scheduler.
//
// Handles index slot arenas owned by the scheduler, so a thread blocked on
// a lock can be traced to the lock's holder by stable identifier. Locks
// track their holder and are the channel priority donation flows through;
// semaphores wake their highest-priority waiter first and hand the permit
// over directly.
//
// Interrupt context never blocks: a wakeup performed during a timer tick
// only requests a yield on the way out of the tick.

use crate::kernel::Kernel;
use crate::proc::{Sched, Tid, IDLE};
use crate::spinlock::MutexGuard;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Sema(pub(crate) usize);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Lock(pub(crate) usize);

impl Sched {
    // Take the lock for `tid` or enqueue it as a waiter, donating down the
    // holder chain. True means the lock is held on return.
    pub(crate) fn lock_try_or_enqueue(&mut self, tid: Tid, lock: Lock) -> bool {
        match self.locks[lock.0].holder {
            None => {
                self.locks[lock.0].holder = Some(tid);
                self.get_mut(tid).owned.push(lock);
                true
            }
            Some(holder) => {
                assert!(holder != tid, "lock: recursive acquire");
                self.get_mut(tid).awaited = Some(lock);
                if !self.mlfqs {
                    self.donate(tid);
                }
                self.locks[lock.0].waiters.push(tid);
                false
            }
        }
    }

    // Take a permit for `tid` or enqueue it. True means the permit was
    // available.
    pub(crate) fn sema_try_or_enqueue(&mut self, tid: Tid, sema: Sema) -> bool {
        if self.semas[sema.0].value > 0 {
            self.semas[sema.0].value -= 1;
            true
        } else {
            self.semas[sema.0].waiters.push(tid);
            false
        }
    }
}

impl Kernel {
    pub fn new_sema(&self, value: u32) -> Sema {
        self.sched.lock().alloc_sema(value)
    }

    pub fn new_lock(&self) -> Lock {
        self.sched.lock().alloc_lock()
    }

    pub fn sema_down(&self, sema: Sema) {
        let s = self.sched.lock();
        self.sema_down_locked(s, sema);
    }

    pub(crate) fn sema_down_locked<'a>(&'a self, mut s: MutexGuard<'a, Sched>, sema: Sema) {
        let cur = s.current;
        if s.sema_try_or_enqueue(cur, sema) {
            return;
        }
        self.block_current(s);
    }

    pub fn sema_up(&self, sema: Sema) {
        let mut s = self.sched.lock();
        if let Some(w) = self.sema_up_locked(&mut s, sema) {
            self.maybe_preempt(s, w);
        }
    }

    // Wake the highest-priority waiter, or bank the permit if nobody
    // waits. The woken thread owns the permit outright.
    pub(crate) fn sema_up_locked(
        &self,
        s: &mut MutexGuard<'_, Sched>,
        sema: Sema,
    ) -> Option<Tid> {
        let idx = s.highest_idx(&s.semas[sema.0].waiters);
        match idx {
            Some(i) => {
                let w = s.semas[sema.0].waiters.remove(i);
                s.unblock(w);
                Some(w)
            }
            None => {
                s.semas[sema.0].value += 1;
                None
            }
        }
    }

    // A freshly woken thread that outranks the running one takes the CPU
    // now; inside a tick the switch waits for the interrupt to return.
    fn maybe_preempt<'a>(&'a self, mut s: MutexGuard<'a, Sched>, woken: Tid) {
        let cur = s.current;
        if cur == IDLE || s.slot_of(cur).is_none() {
            return;
        }
        if s.get(woken).priority > s.get(cur).priority {
            // Inside a tick or a task-body quantum the switch happens at
            // the next dispatch point instead of here.
            if s.in_tick || s.body_running {
                s.yield_pending = true;
                return;
            }
            self.yield_locked(s);
        }
    }

    // Acquire a lock, donating priority down the holder chain while
    // blocked. The releaser hands the lock to its best waiter, so on
    // return the lock is ours.
    pub fn lock_acquire(&self, lock: Lock) {
        let mut s = self.sched.lock();
        let cur = s.current;
        if s.lock_try_or_enqueue(cur, lock) {
            return;
        }
        self.block_current(s);
    }

    // Release a lock: recompute our priority now that its donations are
    // gone, pass the lock to the highest-priority waiter and yield to the
    // waiter if it outranks us.
    pub fn lock_release(&self, lock: Lock) {
        let mut s = self.sched.lock();
        let cur = s.current;
        assert_eq!(
            s.locks[lock.0].holder,
            Some(cur),
            "lock: release of lock not held"
        );
        s.get_mut(cur).owned.retain(|l| l.0 != lock.0);
        s.locks[lock.0].holder = None;
        if !s.mlfqs {
            s.recompute_priority(cur);
        }

        let idx = s.highest_idx(&s.locks[lock.0].waiters);
        if let Some(i) = idx {
            let w = s.locks[lock.0].waiters.remove(i);
            s.locks[lock.0].holder = Some(w);
            let t = s.get_mut(w);
            t.awaited = None;
            t.owned.push(lock);
            s.unblock(w);
            self.maybe_preempt(s, w);
        }
    }

    pub fn lock_holder(&self, lock: Lock) -> Option<Tid> {
        self.sched.lock().locks[lock.0].holder
    }
}
