// Threads and the scheduler.
//
// One CPU, preemptive on timer ticks and voluntary yields. The ready queue
// is kept ordered by effective priority, FIFO among equals. Two modes are
// chosen at boot: priority scheduling with donation through lock chains,
// or a multilevel feedback queue driven by nice, recent_cpu and load_avg.
//
// The interrupt bottom half and the context-switch stub live below this
// crate, so control transfer is bookkeeping: kernel threads carry a body
// that the dispatcher runs one quantum at a time, and a blocking call made
// by the boot thread drives the dispatcher inline until the boot thread is
// runnable again. Task bodies block between quanta by returning a Step
// (Acquire, SemaDown, Sleep), never inside one. Each body quantum costs
// one timer tick; when nothing is runnable but sleepers exist, the
// dispatcher idles the clock forward.
//
// Parent and child threads are linked by jointly-owned child records, kept
// in a slot arena and freed by whichever side dies second. A record holds
// the child's exit code and the semaphore its parent waits on.

use crate::dir::Dir;
use crate::file::Node;
use crate::fixed::Fixed;
use crate::kernel::Kernel;
use crate::param::{
    DONATE_DEPTH, NICE_MAX, NICE_MIN, NOFILE, PRI_DEFAULT, PRI_MAX, PRI_MIN, TIMER_FREQ,
    TIME_SLICE,
};
use crate::spinlock::MutexGuard;
use crate::sync::{Lock, Sema};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use array_macro::array;

pub type Tid = i32;
pub const TID_ERROR: Tid = -1;

// Sentinel for "no thread is running", the idle CPU.
pub(crate) const IDLE: Tid = 0;

// What a kernel thread's body does at the end of its quantum. Bodies
// block between quanta, never inside one: Acquire and SemaDown enqueue
// the thread and it runs again once the lock or permit is handed over.
pub enum Step {
    Yield,
    Sleep(u64),
    Acquire(Lock),
    SemaDown(Sema),
    Exit(i32),
}

pub type ThreadFn = Box<dyn FnMut(&Kernel) -> Step + Send>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Running,
    Ready,
    Blocked,
    Dying,
}

pub(crate) struct Thread {
    pub tid: Tid,
    pub name: String,
    pub state: State,
    pub priority: i32,
    pub base_priority: i32,
    pub nice: i32,
    pub recent_cpu: Fixed,
    pub awaited: Option<Lock>,
    pub owned: Vec<Lock>,
    pub parent: Option<Tid>,
    pub children: Vec<usize>,
    pub as_child: Option<usize>,
    pub exec_sema: Sema,
    pub exec_ok: bool,
    pub wake_at: u64,
    pub body: Option<ThreadFn>,
    pub ofile: [Option<Node>; NOFILE],
    pub cwd: Option<Dir>,
}

// Shared between a parent and one of its children; refs counts the living
// participants and the second one to die frees the slot.
pub(crate) struct ChildRecord {
    pub tid: Tid,
    pub alive: bool,
    pub exit_code: i32,
    pub waited: bool,
    pub sema: Sema,
    pub refs: u8,
}

pub(crate) struct LockSlot {
    pub holder: Option<Tid>,
    pub waiters: Vec<Tid>,
}

pub(crate) struct SemaSlot {
    pub value: u32,
    pub waiters: Vec<Tid>,
}

pub(crate) struct Sched {
    pub threads: Vec<Option<Thread>>,
    pub ready: Vec<Tid>,
    pub sleepers: Vec<Tid>,
    pub current: Tid,
    pub next_tid: Tid,
    pub ticks: u64,
    pub slice: u32,
    pub load_avg: Fixed,
    pub mlfqs: bool,
    pub in_tick: bool,
    pub yield_pending: bool,
    // a task body is on the host stack right now
    pub body_running: bool,
    // threads whose host frames are parked in an active dispatch
    pub host_stack: Vec<Tid>,
    pub locks: Vec<LockSlot>,
    pub semas: Vec<SemaSlot>,
    pub children: Vec<Option<ChildRecord>>,
}

impl Sched {
    pub fn new(mlfqs: bool) -> Sched {
        let mut s = Sched {
            threads: Vec::new(),
            ready: Vec::new(),
            sleepers: Vec::new(),
            current: IDLE,
            next_tid: 1,
            ticks: 0,
            slice: 0,
            load_avg: Fixed::ZERO,
            mlfqs,
            in_tick: false,
            yield_pending: false,
            body_running: false,
            host_stack: Vec::new(),
            locks: Vec::new(),
            semas: Vec::new(),
            children: Vec::new(),
        };
        // The boot thread is the thread that called us.
        let tid = s.alloc_tid();
        let exec_sema = s.alloc_sema(0);
        let mut main = Thread::new(tid, "main", PRI_DEFAULT, exec_sema);
        main.state = State::Running;
        s.insert_thread(main);
        s.current = tid;
        s
    }

    fn alloc_tid(&mut self) -> Tid {
        let tid = self.next_tid;
        self.next_tid += 1;
        tid
    }

    pub fn alloc_sema(&mut self, value: u32) -> Sema {
        self.semas.push(SemaSlot {
            value,
            waiters: Vec::new(),
        });
        Sema(self.semas.len() - 1)
    }

    pub fn alloc_lock(&mut self) -> Lock {
        self.locks.push(LockSlot {
            holder: None,
            waiters: Vec::new(),
        });
        Lock(self.locks.len() - 1)
    }

    fn insert_thread(&mut self, t: Thread) {
        if let Some(slot) = self.threads.iter().position(|s| s.is_none()) {
            self.threads[slot] = Some(t);
        } else {
            self.threads.push(Some(t));
        }
    }

    pub fn slot_of(&self, tid: Tid) -> Option<usize> {
        self.threads
            .iter()
            .position(|t| t.as_ref().map(|t| t.tid) == Some(tid))
    }

    pub fn get(&self, tid: Tid) -> &Thread {
        self.threads
            .iter()
            .flatten()
            .find(|t| t.tid == tid)
            .expect("sched: no such thread")
    }

    pub fn get_mut(&mut self, tid: Tid) -> &mut Thread {
        self.threads
            .iter_mut()
            .flatten()
            .find(|t| t.tid == tid)
            .expect("sched: no such thread")
    }

    fn alive(&self, tid: Tid) -> bool {
        tid != IDLE && self.slot_of(tid).is_some()
    }

    // Ordered insert: after the last thread of equal priority.
    pub fn ready_insert(&mut self, tid: Tid) {
        let pri = self.get(tid).priority;
        let pos = self
            .ready
            .iter()
            .position(|&t| self.get(t).priority < pri)
            .unwrap_or(self.ready.len());
        self.ready.insert(pos, tid);
    }

    fn resort_ready(&mut self) {
        let mut r = core::mem::take(&mut self.ready);
        // stable, so FIFO order among equals survives
        r.sort_by_key(|&t| core::cmp::Reverse(self.get(t).priority));
        self.ready = r;
    }

    fn pick_ready(&mut self) -> Option<Tid> {
        if self.ready.is_empty() {
            None
        } else {
            Some(self.ready.remove(0))
        }
    }

    pub fn unblock(&mut self, tid: Tid) {
        self.sleepers.retain(|&t| t != tid);
        self.get_mut(tid).state = State::Ready;
        self.ready_insert(tid);
    }

    // First waiter with the highest effective priority.
    pub fn highest_idx(&self, waiters: &[Tid]) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for (i, &t) in waiters.iter().enumerate() {
            let p = self.get(t).priority;
            match best {
                Some((_, bp)) if p <= bp => {}
                _ => best = Some((i, p)),
            }
        }
        best.map(|(i, _)| i)
    }

    // Walk awaited-lock chains from `from`, raising each holder that is
    // outranked. The walk stops at the donation depth bound.
    pub fn donate(&mut self, from: Tid) {
        let mut t = from;
        for _ in 0..DONATE_DEPTH {
            let lock = match self.get(t).awaited {
                Some(l) => l,
                None => break,
            };
            let holder = match self.locks[lock.0].holder {
                Some(h) => h,
                None => break,
            };
            let pri = self.get(t).priority;
            if self.get(holder).priority < pri {
                self.get_mut(holder).priority = pri;
                if self.get(holder).state == State::Ready {
                    self.ready.retain(|&x| x != holder);
                    self.ready_insert(holder);
                }
            }
            t = holder;
        }
    }

    // Effective priority after dropping a donation source: the base, or
    // the highest priority still blocked on a lock this thread owns.
    pub fn recompute_priority(&mut self, tid: Tid) {
        let mut p = self.get(tid).base_priority;
        let owned = self.get(tid).owned.clone();
        for lock in owned {
            for i in 0..self.locks[lock.0].waiters.len() {
                let w = self.locks[lock.0].waiters[i];
                p = p.max(self.get(w).priority);
            }
        }
        self.get_mut(tid).priority = p;
        if self.get(tid).state == State::Ready {
            self.ready.retain(|&x| x != tid);
            self.ready_insert(tid);
        }
    }

    fn mlfq_priority(&self, tid: Tid) -> i32 {
        let t = self.get(tid);
        let p = PRI_MAX - t.recent_cpu.div_int(4).to_int() - 2 * t.nice;
        p.clamp(PRI_MIN, PRI_MAX)
    }

    fn mlfq_recompute_all(&mut self) {
        let tids: Vec<Tid> = self.threads.iter().flatten().map(|t| t.tid).collect();
        for tid in tids {
            let p = self.mlfq_priority(tid);
            let t = self.get_mut(tid);
            t.priority = p;
            t.base_priority = p;
        }
        self.resort_ready();
    }

    // Once a second: fold the ready count into load_avg, then decay every
    // thread's recent_cpu. The coefficient is computed before multiplying
    // so 2*load_avg*recent_cpu cannot overflow.
    fn mlfq_second(&mut self) {
        let running = if self.alive(self.current) { 1 } else { 0 };
        let ready_threads = self.ready.len() as i32 + running;
        self.load_avg = Fixed::from_int(59)
            .div(Fixed::from_int(60))
            .mul(self.load_avg)
            + Fixed::from_int(1)
                .div(Fixed::from_int(60))
                .mul(Fixed::from_int(ready_threads));

        let twice = self.load_avg.mul_int(2);
        let coef = twice.div(twice.add_int(1));
        for t in self.threads.iter_mut().flatten() {
            t.recent_cpu = coef.mul(t.recent_cpu).add_int(t.nice);
        }
    }

    // One timer tick: MLFQ accounting, sleeper wakeup, slice aging.
    pub fn on_tick(&mut self) {
        self.ticks += 1;
        let cur_alive = self.alive(self.current);

        if self.mlfqs {
            if cur_alive {
                let cur = self.current;
                let rc = self.get(cur).recent_cpu.add_int(1);
                self.get_mut(cur).recent_cpu = rc;
            }
            if self.ticks % 4 == 0 {
                self.mlfq_recompute_all();
            }
            if self.ticks % TIMER_FREQ == 0 {
                self.mlfq_second();
            }
        }

        let due: Vec<Tid> = {
            let ticks = self.ticks;
            self.sleepers
                .iter()
                .copied()
                .filter(|&t| self.get(t).wake_at <= ticks)
                .collect()
        };
        for tid in due {
            self.unblock(tid);
            if cur_alive && self.get(tid).priority > self.get(self.current).priority {
                self.yield_pending = true;
            }
        }

        self.slice += 1;
    }
}

impl Thread {
    fn new(tid: Tid, name: &str, priority: i32, exec_sema: Sema) -> Thread {
        Thread {
            tid,
            name: String::from(name),
            state: State::Ready,
            priority,
            base_priority: priority,
            nice: 0,
            recent_cpu: Fixed::ZERO,
            awaited: None,
            owned: Vec::new(),
            parent: None,
            children: Vec::new(),
            as_child: None,
            exec_sema,
            exec_ok: false,
            wake_at: 0,
            body: None,
            ofile: array![_ => None; NOFILE],
            cwd: None,
        }
    }
}

type SchedGuard<'a> = MutexGuard<'a, Sched>;

impl Kernel {
    pub fn current_tid(&self) -> Tid {
        self.sched.lock().current
    }

    pub fn ticks(&self) -> u64 {
        self.sched.lock().ticks
    }

    pub fn thread_alive(&self, tid: Tid) -> bool {
        self.sched.lock().slot_of(tid).is_some()
    }

    pub fn thread_priority(&self, tid: Tid) -> Option<i32> {
        let s = self.sched.lock();
        s.slot_of(tid).map(|slot| s.threads[slot].as_ref().unwrap().priority)
    }

    // Timer interrupt entry point. Slice expiry or the wakeup of a
    // higher-priority sleeper requests a yield, honored on the way out.
    pub fn tick(&self) {
        let mut s = self.sched.lock();
        s.in_tick = true;
        s.on_tick();
        s.in_tick = false;

        let preempt = s.yield_pending || s.slice >= TIME_SLICE;
        s.yield_pending = false;
        if preempt && s.alive(s.current) {
            self.yield_locked(s);
        }
    }

    pub fn yield_now(&self) {
        let s = self.sched.lock();
        // A task body reaches the dispatcher at the end of its quantum
        // anyway; only frame-capable threads switch here.
        if s.body_running {
            return;
        }
        self.yield_locked(s);
    }

    pub(crate) fn yield_locked<'a>(&'a self, mut s: SchedGuard<'a>) {
        let cur = s.current;
        if !s.alive(cur) {
            return;
        }
        s.get_mut(cur).state = State::Ready;
        s.ready_insert(cur);
        self.dispatch(s, cur);
    }

    // Mark the current thread blocked and run other threads until it is
    // scheduled again. Only frame-capable threads (the boot thread) may
    // block this way; task bodies block by returning a Step.
    pub(crate) fn block_current<'a>(&'a self, mut s: SchedGuard<'a>) {
        assert!(
            !s.body_running,
            "kernel task: blocking call inside a task body, return a Step instead"
        );
        let cur = s.current;
        s.get_mut(cur).state = State::Blocked;
        self.dispatch(s, cur);
    }

    // Core dispatch loop. Runs bodies of other threads (one quantum per
    // pick, each costing a tick), idles the clock when only sleepers
    // remain, and returns once `me` is scheduled again. Threads whose host
    // frames sit deeper in the call stack cannot be resumed from here and
    // are deferred until this frame unwinds.
    fn dispatch<'a>(&'a self, mut s: SchedGuard<'a>, me: Tid) {
        s.host_stack.push(me);
        let mut deferred: Vec<Tid> = Vec::new();
        let mut idle_ticks: u64 = 0;

        loop {
            match s.pick_ready() {
                Some(tid) => {
                    idle_ticks = 0;
                    if tid != me && s.host_stack.contains(&tid) {
                        deferred.push(tid);
                        continue;
                    }
                    s.current = tid;
                    s.slice = 0;
                    s.get_mut(tid).state = State::Running;
                    if tid == me {
                        break;
                    }

                    let mut body = match s.get_mut(tid).body.take() {
                        Some(f) => f,
                        None => panic!("dispatch: {} (tid {}) has no body", s.get(tid).name, tid),
                    };
                    let was_body = s.body_running;
                    s.body_running = true;
                    drop(s);
                    let step = body(self);
                    s = self.sched.lock();
                    s.body_running = was_body;

                    // The quantum just ran costs a tick.
                    s.in_tick = true;
                    s.on_tick();
                    s.in_tick = false;
                    s.yield_pending = false;

                    if s.slot_of(tid).is_none() {
                        // exited inside its own body
                        continue;
                    }
                    match step {
                        Step::Yield => {
                            let t = s.get_mut(tid);
                            t.body = Some(body);
                            t.state = State::Ready;
                            s.ready_insert(tid);
                        }
                        Step::Sleep(n) => {
                            let wake = s.ticks + n.max(1);
                            let t = s.get_mut(tid);
                            t.body = Some(body);
                            t.state = State::Blocked;
                            t.wake_at = wake;
                            s.sleepers.push(tid);
                        }
                        Step::Acquire(lock) => {
                            let granted = s.lock_try_or_enqueue(tid, lock);
                            let t = s.get_mut(tid);
                            t.body = Some(body);
                            if granted {
                                t.state = State::Ready;
                                s.ready_insert(tid);
                            } else {
                                t.state = State::Blocked;
                            }
                        }
                        Step::SemaDown(sema) => {
                            let granted = s.sema_try_or_enqueue(tid, sema);
                            let t = s.get_mut(tid);
                            t.body = Some(body);
                            if granted {
                                t.state = State::Ready;
                                s.ready_insert(tid);
                            } else {
                                t.state = State::Blocked;
                            }
                        }
                        Step::Exit(code) => {
                            drop(body);
                            s = self.exit_tid(s, tid, code);
                        }
                    }
                }
                None => {
                    assert!(
                        !s.sleepers.is_empty(),
                        "dispatch: deadlock, no runnable threads"
                    );
                    idle_ticks += 1;
                    assert!(idle_ticks < 10_000_000, "dispatch: stuck idle, deadlock");
                    s.current = IDLE;
                    s.in_tick = true;
                    s.on_tick();
                    s.in_tick = false;
                    s.yield_pending = false;
                }
            }
        }

        s.host_stack.pop();
        for tid in deferred {
            s.ready_insert(tid);
        }
    }

    // Create a kernel thread. The child records link it to its creator and
    // it inherits the creator's working directory. A newborn that outranks
    // the creator preempts it immediately.
    pub fn thread_create(&self, name: &str, priority: i32, body: ThreadFn) -> Tid {
        assert!((PRI_MIN..=PRI_MAX).contains(&priority), "bad priority");
        let mut s = self.sched.lock();

        let tid = s.alloc_tid();
        let exec_sema = s.alloc_sema(0);
        let wait_sema = s.alloc_sema(0);

        let parent = if s.alive(s.current) { Some(s.current) } else { None };
        let record = ChildRecord {
            tid,
            alive: true,
            exit_code: 0,
            waited: false,
            sema: wait_sema,
            refs: if parent.is_some() { 2 } else { 1 },
        };
        let rec_id = if let Some(i) = s.children.iter().position(|r| r.is_none()) {
            s.children[i] = Some(record);
            i
        } else {
            s.children.push(Some(record));
            s.children.len() - 1
        };

        let cwd = parent.and_then(|p| s.get(p).cwd.as_ref().map(|d| d.reopen(&self.fs)));

        let stored_pri = if s.mlfqs { PRI_MAX } else { priority };
        let mut t = Thread::new(tid, name, stored_pri, exec_sema);
        t.parent = parent;
        t.as_child = Some(rec_id);
        t.body = Some(body);
        t.cwd = cwd;
        s.insert_thread(t);
        if let Some(p) = parent {
            s.get_mut(p).children.push(rec_id);
        }
        s.ready_insert(tid);

        let cur = s.current;
        let preempt = s.alive(cur) && priority > s.get(cur).priority;
        if preempt {
            if s.in_tick || s.body_running {
                s.yield_pending = true;
            } else {
                self.yield_locked(s);
            }
        }
        tid
    }

    // Tear down `tid` (the current thread): close its descriptors and
    // working directory, orphan its children, publish the exit code to a
    // surviving parent and free the slot.
    pub(crate) fn exit_tid<'a>(
        &'a self,
        mut s: SchedGuard<'a>,
        tid: Tid,
        code: i32,
    ) -> SchedGuard<'a> {
        let (ofile, cwd) = {
            let t = s.get_mut(tid);
            (
                core::mem::replace(&mut t.ofile, array![_ => None; NOFILE]),
                t.cwd.take(),
            )
        };
        drop(s);
        for node in ofile {
            if let Some(node) = node {
                node.close(&self.fs);
            }
        }
        if let Some(d) = cwd {
            d.close(&self.fs);
        }

        let mut s = self.sched.lock();

        // Children lose their parent; each record drops one reference.
        let children = s.get(tid).children.clone();
        for id in children {
            let (alive, ctid, gone) = match s.children[id].as_mut() {
                Some(rec) => {
                    rec.refs -= 1;
                    (rec.alive, rec.tid, rec.refs == 0)
                }
                None => continue,
            };
            if alive {
                if let Some(slot) = s.slot_of(ctid) {
                    s.threads[slot].as_mut().unwrap().parent = None;
                }
            }
            if gone {
                s.children[id] = None;
            }
        }

        // As a child: publish the exit code if the parent still lives.
        let parent_alive = s.get(tid).parent.is_some();
        if let Some(id) = s.get(tid).as_child {
            if let Some(rec) = s.children[id].as_mut() {
                rec.alive = false;
                rec.exit_code = code;
                rec.refs -= 1;
                let waited = rec.waited;
                let sema = rec.sema;
                let gone = rec.refs == 0;
                if gone {
                    s.children[id] = None;
                }
                if parent_alive && waited {
                    self.sema_up_locked(&mut s, sema);
                }
            }
        }

        let slot = s.slot_of(tid).expect("exit: no such thread");
        s.threads[slot] = None;
        s
    }

    pub fn exit_current(&self, code: i32) {
        let s = self.sched.lock();
        let cur = s.current;
        let s = self.exit_tid(s, cur, code);
        drop(s);
    }

    // Wait for a child to die and collect its exit code. Each child can be
    // waited for once; unknown tids and repeats report failure.
    pub fn wait(&self, tid: Tid) -> i32 {
        let mut s = self.sched.lock();
        let cur = s.current;
        let ids = s.get(cur).children.clone();
        let rec_id = ids.into_iter().find(|&id| {
            s.children[id]
                .as_ref()
                .map(|r| r.tid == tid)
                .unwrap_or(false)
        });
        let id = match rec_id {
            Some(i) => i,
            None => return TID_ERROR,
        };

        let (alive, waited, code, sema) = {
            let r = s.children[id].as_ref().unwrap();
            (r.alive, r.waited, r.exit_code, r.sema)
        };
        if waited {
            return TID_ERROR;
        }
        s.children[id].as_mut().unwrap().waited = true;
        if !alive {
            return code;
        }

        self.sema_down_locked(s, sema);
        let s = self.sched.lock();
        s.children[id]
            .as_ref()
            .map(|r| r.exit_code)
            .unwrap_or(TID_ERROR)
    }

    // Spawn a program and block until it reports whether its load
    // succeeded. The child calls exec_publish from its first quantum.
    pub fn exec(&self, name: &str, body: ThreadFn) -> Tid {
        let tid = self.thread_create(name, PRI_DEFAULT, body);
        let (cur, sema) = {
            let s = self.sched.lock();
            let cur = s.current;
            (cur, s.get(cur).exec_sema)
        };
        self.sema_down(sema);

        let mut s = self.sched.lock();
        let ok = core::mem::replace(&mut s.get_mut(cur).exec_ok, false);
        if ok {
            tid
        } else {
            TID_ERROR
        }
    }

    // Called by a freshly spawned program to release its waiting parent.
    pub fn exec_publish(&self, ok: bool) {
        let mut s = self.sched.lock();
        let cur = s.current;
        let parent = s.get(cur).parent;
        if let Some(p) = parent {
            if s.slot_of(p).is_some() {
                s.get_mut(p).exec_ok = ok;
                let sema = s.get(p).exec_sema;
                self.sema_up_locked(&mut s, sema);
            }
        }
    }

    pub fn sleep(&self, ticks: u64) {
        let mut s = self.sched.lock();
        assert!(
            !s.body_running,
            "kernel task: blocking call inside a task body, return a Step instead"
        );
        let cur = s.current;
        let wake = s.ticks + ticks.max(1);
        let t = s.get_mut(cur);
        t.wake_at = wake;
        t.state = State::Blocked;
        s.sleepers.push(cur);
        self.dispatch(s, cur);
    }

    // Set the base priority. Donations that exceed it keep the effective
    // priority up; losing ground yields the CPU. Inert under MLFQ.
    pub fn set_priority(&self, priority: i32) {
        assert!((PRI_MIN..=PRI_MAX).contains(&priority), "bad priority");
        let mut s = self.sched.lock();
        if s.mlfqs {
            return;
        }
        let cur = s.current;
        let old = s.get(cur).priority;
        s.get_mut(cur).base_priority = priority;
        s.recompute_priority(cur);
        if s.get(cur).priority < old {
            self.yield_locked(s);
        }
    }

    pub fn priority(&self) -> i32 {
        let s = self.sched.lock();
        let cur = s.current;
        s.get(cur).priority
    }

    pub fn set_nice(&self, nice: i32) {
        assert!((NICE_MIN..=NICE_MAX).contains(&nice), "bad nice");
        let mut s = self.sched.lock();
        let cur = s.current;
        s.get_mut(cur).nice = nice;
        if s.mlfqs {
            let p = s.mlfq_priority(cur);
            let t = s.get_mut(cur);
            t.priority = p;
            t.base_priority = p;
        }
        if s.in_tick || s.body_running {
            s.yield_pending = true;
            return;
        }
        self.yield_locked(s);
    }

    pub fn nice(&self) -> i32 {
        let s = self.sched.lock();
        let cur = s.current;
        s.get(cur).nice
    }

    // 100 * load_avg, rounded.
    pub fn load_avg(&self) -> i32 {
        self.sched.lock().load_avg.mul_int(100).round()
    }

    // 100 * the current thread's recent_cpu, rounded.
    pub fn recent_cpu(&self) -> i32 {
        let s = self.sched.lock();
        let cur = s.current;
        s.get(cur).recent_cpu.mul_int(100).round()
    }
}
