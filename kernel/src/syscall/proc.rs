//! Process syscalls.

use std::sync::Arc;

use otter_syscall::{SyscallError, wait::WaitStatus};
use otter_types::process::ProcId;

use crate::{
    error::KernelError,
    memory::VirtAddr,
    param::{PID_MAX, PID_MIN},
    proc::{self, Process, TrapFrame},
};

/// Creates a copy of the calling process and returns the child's pid.
/// The child is set up to resume from `tf` with a zero return value.
pub fn sys_fork(p: &Arc<Process>, tf: &TrapFrame) -> Result<ProcId, SyscallError> {
    let child = proc::fork(p, tf)?;
    Ok(child.pid().unwrap())
}

pub fn sys_getpid(p: &Arc<Process>) -> ProcId {
    p.pid().unwrap()
}

/// Records the encoded exit status and exits the calling thread. The
/// final thread's departure makes the process a zombie; the husk waits
/// for the parent's waitpid.
pub fn sys_exit(p: &Arc<Process>, code: i32) {
    p.set_exit_val(WaitStatus::make_exit(code).raw());
    proc::detach_thread(p);
}

/// Waits for the child named by `pid` to exit, stores its encoded wait
/// status through `status` (when non-null), reaps it, and returns its
/// pid.
pub fn sys_waitpid(
    p: &Arc<Process>,
    pid: i32,
    status: VirtAddr,
    options: i32,
) -> Result<ProcId, SyscallError> {
    if options != 0 {
        return Err(KernelError::InvalidWaitOptions.into());
    }
    if !(PID_MIN..=PID_MAX).contains(&pid) {
        return Err(KernelError::PidOutOfRange.into());
    }
    if !status.is_null() {
        let aspace = p.addrspace().ok_or(KernelError::BadAddress)?;
        aspace.check_range(status, size_of::<i32>())?;
    }

    let child = {
        let main = p.lock_main();
        main.children
            .iter()
            .find(|c| c.pid().is_some_and(|q| q.value() == pid))
            .cloned()
    }
    .ok_or(KernelError::NoWaitTarget)?;

    // Fast path if the child already posted; otherwise block on its
    // exit semaphore. Either way the post is consumed at most once.
    if !child.exited() {
        child.exit_sem().wait();
    }

    if !status.is_null() {
        let aspace = p.addrspace().ok_or(KernelError::BadAddress)?;
        aspace.copy_out_i32(status, child.exit_val())?;
    }

    {
        let mut main = p.lock_main();
        if let Some(i) = main.children.iter().position(|c| Arc::ptr_eq(c, &child)) {
            main.children.remove(i);
        }
    }

    let child_pid = child.pid().unwrap();
    proc::proc_destroy(child);
    Ok(child_pid)
}

/// Replaces the calling process's image. On success the process's trap
/// frame holds the new program's entry state and this call's "return"
/// is the jump into it, performed by the trap layer.
pub fn sys_execv(
    p: &Arc<Process>,
    upath: VirtAddr,
    uargv: VirtAddr,
) -> Result<(), SyscallError> {
    let aspace = p.addrspace().ok_or(KernelError::BadAddress)?;
    let path = super::copy_path_in(&aspace, upath)?;
    proc::exec::exec(p, &path, uargv)?;
    Ok(())
}
