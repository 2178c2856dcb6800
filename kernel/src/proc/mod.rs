//! Processes, the process table and the PID allocator.
//!
//! A process moves through `created -> alive -> zombie -> destroyed`:
//! [`Process::new`] builds it, [`ProcTable::setpid`] makes it alive and
//! reachable by PID, the last thread's [`detach_thread`] runs
//! [`proc_exit`] (resources released, exit semaphore posted exactly
//! once), and the parent's waitpid runs [`proc_destroy`] on the
//! remaining husk.
//!
//! Ownership: a process owns its address space, cwd reference,
//! descriptor array and child array. The process table and the parent's
//! child array hold the only long-lived `Arc`s; parents are recorded by
//! PID, not pointer, so there are no cycles.

use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};

use arrayvec::ArrayVec;
use otter_syscall::OpenFlags;
use otter_types::process::ProcId;

use crate::{
    error::KernelError,
    file::{self, FileDesc},
    memory::AddressSpace,
    param::{PID_MAX, PID_MIN, PROC_MAX, PROC_NAME_MAX},
    sync::{Semaphore, SleepLock, SleepLockGuard, SpinLock},
    table::{Table, TableFull},
    vfs::Vnode,
};

pub mod exec;

/// The register state a process re-enters user mode with. The trap
/// layer proper is machine code outside this subsystem; this is the
/// part it hands back and forth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrapFrame {
    /// User program counter.
    pub pc: usize,
    /// User stack pointer.
    pub sp: usize,
    /// First argument / return value register.
    pub a0: usize,
    /// Second argument register.
    pub a1: usize,
}

/// Pointer-sized state swapped under the short `p_lock`.
struct ProcPtrs {
    addrspace: Option<Arc<AddressSpace>>,
    cwd: Option<Vnode>,
    trapframe: Option<Box<TrapFrame>>,
    numthreads: u32,
}

/// State serialised by the per-process main lock: the descriptor array
/// and the child array.
pub(crate) struct ProcMain {
    pub(crate) fds: Vec<Option<FileDesc>>,
    pub(crate) children: Vec<Arc<Process>>,
}

pub struct Process {
    name: SpinLock<ArrayVec<u8, PROC_NAME_MAX>>,
    /// Installed once by `setpid`; 0 until then.
    pid: AtomicI32,
    /// Parent PID; 0 means no parent.
    ppid: AtomicI32,
    /// The p_lock: held only for pointer swaps, never across blocking.
    ptrs: SpinLock<ProcPtrs>,
    /// The main lock: serialises descriptor and child array changes.
    /// Not held across vnode I/O.
    main: SleepLock<ProcMain>,
    exited: AtomicBool,
    exit_val: AtomicI32,
    /// Posted exactly once, by `proc_exit`.
    exit_sem: Semaphore,
}

impl Process {
    /// Creates a bare process: no pid, no address space, no
    /// descriptors.
    pub fn new(name: &str) -> Arc<Self> {
        let proc = Self {
            name: SpinLock::new(ArrayVec::new()),
            pid: AtomicI32::new(0),
            ppid: AtomicI32::new(0),
            ptrs: SpinLock::new(ProcPtrs {
                addrspace: None,
                cwd: None,
                trapframe: None,
                numthreads: 0,
            }),
            main: SleepLock::new(ProcMain {
                fds: Vec::new(),
                children: Vec::new(),
            }),
            exited: AtomicBool::new(false),
            exit_val: AtomicI32::new(0),
            exit_sem: Semaphore::new(0),
        };
        proc.set_name(name);
        Arc::new(proc)
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.name.lock()).into_owned()
    }

    pub fn set_name(&self, name: &str) {
        let mut cur = self.name.lock();
        cur.clear();
        let len = usize::min(cur.capacity(), name.len());
        cur.try_extend_from_slice(&name.as_bytes()[..len]).unwrap();
    }

    pub fn pid(&self) -> Option<ProcId> {
        ProcId::from_raw(self.pid.load(Ordering::Acquire))
    }

    pub fn ppid(&self) -> Option<ProcId> {
        ProcId::from_raw(self.ppid.load(Ordering::Acquire))
    }

    pub fn exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn exit_val(&self) -> i32 {
        self.exit_val.load(Ordering::Acquire)
    }

    pub fn set_exit_val(&self, val: i32) {
        self.exit_val.store(val, Ordering::Release);
    }

    pub(crate) fn exit_sem(&self) -> &Semaphore {
        &self.exit_sem
    }

    /// Swaps in a new address space and returns the old one.
    pub fn setas(&self, aspace: Option<Arc<AddressSpace>>) -> Option<Arc<AddressSpace>> {
        let mut ptrs = self.ptrs.lock();
        core::mem::replace(&mut ptrs.addrspace, aspace)
    }

    /// Another reference to the current address space.
    pub fn addrspace(&self) -> Option<Arc<AddressSpace>> {
        self.ptrs.lock().addrspace.clone()
    }

    /// Another reference to the current directory.
    pub fn cwd(&self) -> Option<Vnode> {
        self.ptrs.lock().cwd.clone()
    }

    /// Swaps the current directory and returns the old reference.
    pub fn set_cwd(&self, cwd: Option<Vnode>) -> Option<Vnode> {
        let mut ptrs = self.ptrs.lock();
        core::mem::replace(&mut ptrs.cwd, cwd)
    }

    pub fn trapframe(&self) -> Option<TrapFrame> {
        self.ptrs.lock().trapframe.as_deref().copied()
    }

    pub fn set_trapframe(&self, tf: TrapFrame) {
        self.ptrs.lock().trapframe = Some(Box::new(tf));
    }

    pub(crate) fn lock_main(&self) -> SleepLockGuard<'_, ProcMain> {
        self.main.lock()
    }

    /// Accounts a thread entering this process.
    pub fn attach_thread(&self) {
        self.ptrs.lock().numthreads += 1;
    }

    fn remove_thread(&self) -> u32 {
        let mut ptrs = self.ptrs.lock();
        assert!(ptrs.numthreads > 0);
        ptrs.numthreads -= 1;
        ptrs.numthreads
    }
}

/// Accounts a thread leaving. The last thread's departure turns the
/// process into a zombie via [`proc_exit`].
pub fn detach_thread(proc: &Arc<Process>) {
    if proc.remove_thread() == 0 {
        proc_exit(proc);
    }
}

/// Releases everything except the husk waitpid needs: name, pid, exit
/// value, exit semaphore.
///
/// Runs once, on the final thread's exit path (or on a failed fork's
/// teardown). Ends with `exited` set and the exit semaphore posted.
pub fn proc_exit(proc: &Arc<Process>) {
    assert!(!Arc::ptr_eq(proc, kproc()), "kernel process exiting");
    assert!(!proc.exited());

    let (aspace, cwd, trapframe) = {
        let mut ptrs = proc.ptrs.lock();
        assert_eq!(ptrs.numthreads, 0);
        (
            ptrs.addrspace.take(),
            ptrs.cwd.take(),
            ptrs.trapframe.take(),
        )
    };
    drop(aspace);
    drop(cwd);
    drop(trapframe);

    {
        let mut main = proc.lock_main();
        for slot in main.fds.drain(..) {
            if let Some(fd) = slot {
                fd.close();
            }
        }
        main.children.clear();
    }

    log::debug!("proc {:?} ({}) exited", proc.pid(), proc.name());
    proc.exited.store(true, Ordering::Release);
    proc.exit_sem.post();
}

/// Frees the husk. Called by the reaping parent, or on a creation path
/// that failed before the process ever ran.
pub fn proc_destroy(proc: Arc<Process>) {
    assert!(
        proc.ptrs.lock().addrspace.is_none(),
        "destroying a process that has not exited"
    );

    if let Some(pid) = proc.pid() {
        proc_table().release(pid, &proc);
    }
    log::debug!("proc {:?} ({}) destroyed", proc.pid(), proc.name());
    drop(proc);
}

struct PidCtl {
    proc_num: usize,
    pid_ref: i32,
}

/// The process table: a sparse table indexed by PID, plus the circular
/// PID allocator state under its own spin lock.
pub struct ProcTable {
    table: Table<Arc<Process>>,
    ctl: SpinLock<PidCtl>,
    pid_min: i32,
    pid_max: i32,
    proc_max: usize,
}

impl ProcTable {
    /// A table handing out PIDs in `[pid_min, pid_max]` with at most
    /// `proc_max` live processes.
    pub fn new(pid_min: i32, pid_max: i32, proc_max: usize) -> Self {
        assert!(0 < pid_min && pid_min <= pid_max);
        let table = Table::new();
        table.setsize(usize::try_from(pid_max).unwrap() + 1);
        Self {
            table,
            ctl: SpinLock::new(PidCtl {
                proc_num: 0,
                pid_ref: pid_min,
            }),
            pid_min,
            pid_max,
            proc_max,
        }
    }

    /// Number of live (installed, not yet destroyed) processes.
    pub fn proc_num(&self) -> usize {
        self.ctl.lock().proc_num
    }

    pub fn get(&self, pid: ProcId) -> Option<Arc<Process>> {
        let raw = pid.value();
        if raw < self.pid_min || raw > self.pid_max {
            return None;
        }
        self.table.get(raw as usize)
    }

    /// Installs `proc` at the lowest free PID at or above the rolling
    /// cursor, wrapping to `pid_min` once before giving up.
    ///
    /// Freed low PIDs are reused on wrap, and the cursor only moves
    /// forward otherwise, so no allocation order starves.
    pub fn setpid(&self, proc: &Arc<Process>) -> Result<ProcId, KernelError> {
        let mut start = {
            let mut ctl = self.ctl.lock();
            if ctl.proc_num >= self.proc_max {
                return Err(KernelError::TooManyProcesses);
            }
            ctl.proc_num += 1;
            if ctl.pid_ref > self.pid_max {
                ctl.pid_ref = self.pid_min;
            }
            ctl.pid_ref
        };

        loop {
            match self.table.setfirst(Arc::clone(proc), start as usize) {
                Ok(index) => {
                    let pid = i32::try_from(index).unwrap();
                    proc.pid.store(pid, Ordering::Release);
                    let mut ctl = self.ctl.lock();
                    if pid >= ctl.pid_ref {
                        ctl.pid_ref = pid + 1;
                    }
                    return Ok(ProcId::from_raw(pid).unwrap());
                }
                Err(TableFull) => {
                    let mut ctl = self.ctl.lock();
                    if ctl.pid_ref != self.pid_min {
                        // No hole above the cursor; rewind and rescan
                        // the reusable low range once.
                        ctl.pid_ref = self.pid_min;
                        start = self.pid_min;
                    } else {
                        ctl.proc_num -= 1;
                        return Err(KernelError::TooManyProcesses);
                    }
                }
            }
        }
    }

    /// Drops the table's reference to `proc`, if `pid` still names it.
    pub fn release(&self, pid: ProcId, proc: &Arc<Process>) {
        let raw = pid.value();
        if raw < self.pid_min || raw > self.pid_max {
            return;
        }
        let index = raw as usize;
        if self
            .table
            .get(index)
            .is_some_and(|p| Arc::ptr_eq(&p, proc))
        {
            self.table.remove(index);
            self.ctl.lock().proc_num -= 1;
        }
    }
}

static PROC_TABLE: OnceLock<ProcTable> = OnceLock::new();
static KPROC: OnceLock<Arc<Process>> = OnceLock::new();

/// Creates the system process table.
///
/// # Panics
///
/// Panics on double bootstrap.
pub fn table_bootstrap() {
    PROC_TABLE
        .set(ProcTable::new(PID_MIN, PID_MAX, PROC_MAX))
        .unwrap_or_else(|_| panic!("process table already bootstrapped"));
    log::debug!("process table bootstrapped, pids {PID_MIN}..={PID_MAX}");
}

/// Creates the kernel process. Requires the process table.
///
/// # Panics
///
/// Panics on double bootstrap.
pub fn bootstrap() {
    KPROC
        .set(Process::new("[kernel]"))
        .unwrap_or_else(|_| panic!("kernel process already bootstrapped"));
    log::debug!("kernel process created");
}

/// The system process table.
///
/// # Panics
///
/// Panics before bootstrap.
pub fn proc_table() -> &'static ProcTable {
    PROC_TABLE.get().expect("process table not bootstrapped")
}

/// The kernel process.
///
/// # Panics
///
/// Panics before bootstrap.
pub fn kproc() -> &'static Arc<Process> {
    KPROC.get().expect("kernel process not bootstrapped")
}

/// Creates a process ready to run a user program: pid assigned, parent
/// wired up, and for a first process (parent is the kernel) the three
/// standard descriptors opened on the console.
///
/// Everything allocated so far is rolled back on failure.
pub fn new_user(name: &str, parent: &Arc<Process>) -> Result<Arc<Process>, KernelError> {
    let proc = Process::new(name);

    if let Err(e) = proc_table().setpid(&proc) {
        proc_destroy(proc);
        return Err(e);
    }

    let ppid = if Arc::ptr_eq(parent, kproc()) {
        0
    } else {
        parent.pid().map_or(0, ProcId::value)
    };
    proc.ppid.store(ppid, Ordering::Release);

    if ppid == 0 {
        let stds = [
            OpenFlags::READ_ONLY,
            OpenFlags::WRITE_ONLY,
            OpenFlags::WRITE_ONLY,
        ];
        let mut main = proc.lock_main();
        for flags in stds {
            match file::fh_add(flags, "con:", None) {
                Ok(fd) => main.fds.push(Some(fd)),
                Err(e) => {
                    for slot in main.fds.drain(..) {
                        if let Some(fd) = slot {
                            fd.close();
                        }
                    }
                    drop(main);
                    proc_destroy(proc);
                    return Err(e);
                }
            }
        }
    }

    // Share the parent's current directory; the reference is taken
    // under the parent's p_lock inside cwd().
    if let Some(cwd) = parent.cwd() {
        proc.ptrs.lock().cwd = Some(cwd);
    }

    log::debug!("proc {:?} ({name}) created, ppid {ppid}", proc.pid());
    Ok(proc)
}

/// Creates a child copying the parent: address space, descriptor table
/// (null slots stay null, occupied slots share the handle), cwd, and
/// the caller's trap frame with the child's return value zeroed.
///
/// The child is appended to the parent's child array and given its
/// first thread. A failure after pid assignment drives the half-built
/// child through [`proc_exit`] and [`proc_destroy`].
pub fn fork(parent: &Arc<Process>, tf: &TrapFrame) -> Result<Arc<Process>, KernelError> {
    // Heap copy of the caller's frame, alive past this stack.
    let mut child_tf = Box::new(*tf);
    child_tf.a0 = 0;

    let child = Process::new("Forked process");
    if let Err(e) = proc_table().setpid(&child) {
        proc_destroy(child);
        return Err(e);
    }

    let result: Result<(), KernelError> = (|| {
        child
            .ppid
            .store(parent.pid().map_or(0, ProcId::value), Ordering::Release);

        if let Some(aspace) = parent.addrspace() {
            child.setas(Some(Arc::new(aspace.copy())));
        }
        child.ptrs.lock().trapframe = Some(child_tf);

        let mut parent_main = parent.lock_main();
        let child_fds: Vec<Option<FileDesc>> = parent_main
            .fds
            .iter()
            .map(|slot| slot.as_ref().map(FileDesc::dup))
            .collect();
        child.lock_main().fds = child_fds;

        if let Some(cwd) = parent.cwd() {
            child.ptrs.lock().cwd = Some(cwd);
        }

        parent_main.children.push(Arc::clone(&child));
        Ok(())
    })();

    if let Err(e) = result {
        proc_exit(&child);
        proc_destroy(child);
        return Err(e);
    }

    // The forked thread.
    child.attach_thread();

    log::debug!(
        "proc {:?} forked child {:?}",
        parent.pid(),
        child.pid()
    );
    Ok(child)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn sequential_pids_then_wrap() {
        let tbl = ProcTable::new(2, 11, 4);
        let mut procs = Vec::new();

        for want in 2..=5 {
            let p = Process::new("process");
            assert_eq!(tbl.setpid(&p).unwrap().value(), want);
            procs.push(p);
        }
        for p in procs.drain(..) {
            tbl.release(p.pid().unwrap(), &p);
        }
        assert_eq!(tbl.proc_num(), 0);

        // The cursor keeps moving forward over freed pids...
        for want in 6..=9 {
            let p = Process::new("process");
            assert_eq!(tbl.setpid(&p).unwrap().value(), want);
            procs.push(p);
        }
        for p in procs.drain(..) {
            tbl.release(p.pid().unwrap(), &p);
        }

        // ...and wraps to the reusable low range at the end of the
        // namespace.
        for want in [10, 11, 2, 3] {
            let p = Process::new("process");
            assert_eq!(tbl.setpid(&p).unwrap().value(), want);
            procs.push(p);
        }
        for p in procs.drain(..) {
            tbl.release(p.pid().unwrap(), &p);
        }
    }

    #[test]
    fn full_namespace_coverage() {
        // 31 pids, 8 at a time: the allocator must eventually hand out
        // every value in range.
        let (pid_min, pid_max, proc_max) = (2_i32, 32_i32, 8_usize);
        let tbl = ProcTable::new(pid_min, pid_max, proc_max);
        let total = (pid_max - pid_min + 1) as usize;
        let rem = total % proc_max;
        let loops = total / proc_max;

        for j in 0..loops {
            let mut procs = Vec::new();
            for i in 0..proc_max {
                let p = Process::new("process");
                let want = (j * proc_max + i) as i32 + pid_min;
                assert_eq!(tbl.setpid(&p).unwrap().value(), want);
                procs.push(p);
            }
            for p in procs {
                tbl.release(p.pid().unwrap(), &p);
            }
        }

        let mut procs = Vec::new();
        for i in 0..rem {
            let p = Process::new("process");
            let want = (loops * proc_max + i) as i32 + pid_min;
            assert_eq!(tbl.setpid(&p).unwrap().value(), want);
            procs.push(p);
        }
        for i in rem..proc_max {
            let p = Process::new("process");
            let want = pid_min + (i - rem) as i32;
            assert_eq!(tbl.setpid(&p).unwrap().value(), want);
            procs.push(p);
        }

        // proc_max live processes: the next create must fail.
        let extra = Process::new("process");
        assert_eq!(
            tbl.setpid(&extra),
            Err(KernelError::TooManyProcesses)
        );

        for p in procs {
            tbl.release(p.pid().unwrap(), &p);
        }
        assert_eq!(tbl.proc_num(), 0);
    }

    #[test]
    fn rewind_finds_freed_low_pid() {
        let tbl = ProcTable::new(2, 5, 10);
        let mut procs = Vec::new();
        for _ in 2..=5 {
            let p = Process::new("process");
            tbl.setpid(&p).unwrap();
            procs.push(p);
        }

        // PID space exhausted even though proc_max is not.
        let extra = Process::new("process");
        assert_eq!(tbl.setpid(&extra), Err(KernelError::TooManyProcesses));
        assert_eq!(tbl.proc_num(), 4);

        // Free pid 3; the next allocation rewinds and finds it.
        let p3 = procs.remove(1);
        assert_eq!(p3.pid().unwrap().value(), 3);
        tbl.release(p3.pid().unwrap(), &p3);

        let p = Process::new("process");
        assert_eq!(tbl.setpid(&p).unwrap().value(), 3);
        procs.push(p);

        for p in procs {
            tbl.release(p.pid().unwrap(), &p);
        }
    }

    #[test]
    fn concurrent_storm_assigns_unique_pids() {
        let tbl = ProcTable::new(2, 200, 64);

        let per_thread: Vec<Vec<Arc<Process>>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let tbl = &tbl;
                    scope.spawn(move || {
                        let mut mine = Vec::new();
                        loop {
                            let p = Process::new("process");
                            match tbl.setpid(&p) {
                                Ok(_) => mine.push(p),
                                Err(_) => break,
                            }
                            thread::yield_now();
                        }
                        mine
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let all: Vec<Arc<Process>> = per_thread.into_iter().flatten().collect();
        assert_eq!(all.len(), 64);
        assert_eq!(tbl.proc_num(), 64);

        let mut pids: Vec<i32> = all.iter().map(|p| p.pid().unwrap().value()).collect();
        pids.sort_unstable();
        let before = pids.len();
        pids.dedup();
        assert_eq!(pids.len(), before);
        assert!(pids.iter().all(|&p| (2..=200).contains(&p)));

        for p in all {
            tbl.release(p.pid().unwrap(), &p);
        }
        assert_eq!(tbl.proc_num(), 0);
    }

    #[test]
    fn release_ignores_a_recycled_pid() {
        let tbl = ProcTable::new(2, 10, 5);
        let p1 = Process::new("one");
        let pid = tbl.setpid(&p1).unwrap();
        tbl.release(pid, &p1);

        // Same pid, different process: releasing through the stale
        // process must not disturb the new tenant.
        let p2 = Process::new("two");
        assert_eq!(tbl.setpid(&p2).unwrap().value(), pid.value() + 1);
        let p3 = Process::new("three");
        tbl.release(pid, &p3);
        assert_eq!(tbl.proc_num(), 1);

        tbl.release(p2.pid().unwrap(), &p2);
    }

    #[test]
    fn name_is_truncated_to_capacity() {
        let p = Process::new("a-very-long-process-name-indeed");
        assert_eq!(p.name().len(), PROC_NAME_MAX);
    }
}
