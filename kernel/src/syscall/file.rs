//! File syscalls.
//!
//! The per-process main lock serialises descriptor-array changes (open,
//! close, dup2) and the path calls; it is never held across vnode I/O.
//! Transfers serialise on the shared handle's offset lock instead, so
//! dup'd descriptors stay consistent.

use std::sync::Arc;

use otter_syscall::{OpenFlags, SyscallError, Whence};
use otter_types::fs::RawFd;

use super::copy_path_in;
use crate::{
    error::KernelError,
    file::{self, FileHandle},
    memory::{AddressSpace, VirtAddr},
    param::OPEN_MAX,
    proc::Process,
    vfs,
};

fn aspace_of(p: &Arc<Process>) -> Result<Arc<AddressSpace>, KernelError> {
    p.addrspace().ok_or(KernelError::BadAddress)
}

/// Another reference to the handle behind `fd`.
fn handle_of(p: &Arc<Process>, fd: RawFd) -> Result<Arc<FileHandle>, KernelError> {
    let main = p.lock_main();
    main.fds
        .get(fd.get())
        .and_then(|slot| slot.as_ref())
        .map(|desc| Arc::clone(desc.handle()))
        .ok_or(KernelError::FileDescriptorNotFound(fd.get()))
}

/// Opens `path` and installs the new descriptor at the lowest free
/// slot.
pub fn sys_open(
    p: &Arc<Process>,
    upath: VirtAddr,
    flags: OpenFlags,
) -> Result<RawFd, SyscallError> {
    let aspace = aspace_of(p)?;

    let mut main = p.lock_main();
    let path = copy_path_in(&aspace, upath)?;

    let slot = main.fds.iter().position(|s| s.is_none());
    if slot.is_none() && main.fds.len() >= OPEN_MAX {
        return Err(KernelError::NoFreeFileDescriptorTableEntry.into());
    }

    let cwd = p.cwd();
    let desc = file::fh_add(flags, &path, cwd.as_ref())?;

    let fd = match slot {
        Some(i) => {
            main.fds[i] = Some(desc);
            i
        }
        None => {
            main.fds.push(Some(desc));
            main.fds.len() - 1
        }
    };
    Ok(RawFd::new(fd))
}

pub fn sys_close(p: &Arc<Process>, fd: RawFd) -> Result<(), SyscallError> {
    let mut main = p.lock_main();
    let desc = main
        .fds
        .get_mut(fd.get())
        .and_then(Option::take)
        .ok_or(KernelError::FileDescriptorNotFound(fd.get()))?;
    desc.close();
    Ok(())
}

pub fn sys_read(
    p: &Arc<Process>,
    fd: RawFd,
    ubuf: VirtAddr,
    len: usize,
) -> Result<usize, SyscallError> {
    let aspace = aspace_of(p)?;
    let handle = handle_of(p, fd)?;
    Ok(handle.read_user(&aspace, ubuf, len)?)
}

pub fn sys_write(
    p: &Arc<Process>,
    fd: RawFd,
    ubuf: VirtAddr,
    len: usize,
) -> Result<usize, SyscallError> {
    let aspace = aspace_of(p)?;
    let handle = handle_of(p, fd)?;
    Ok(handle.write_user(&aspace, ubuf, len)?)
}

/// Repositions the offset shared by every dup of `fd`. The 64-bit
/// result is split across the return registers by the trap layer.
pub fn sys_lseek(
    p: &Arc<Process>,
    fd: RawFd,
    pos: i64,
    whence: u32,
) -> Result<i64, SyscallError> {
    let whence = Whence::from_repr(whence).ok_or(KernelError::InvalidWhence)?;
    let handle = handle_of(p, fd)?;
    Ok(handle.seek(pos, whence)?)
}

/// Clones descriptor `old` onto `new`, closing whatever `new` held.
/// The two descriptors share handle, offset and mode.
pub fn sys_dup2(p: &Arc<Process>, old: RawFd, new: RawFd) -> Result<RawFd, SyscallError> {
    let (old, new) = (old.get(), new.get());

    let mut main = p.lock_main();
    if main.fds.get(old).and_then(|s| s.as_ref()).is_none() {
        return Err(KernelError::FileDescriptorNotFound(old).into());
    }
    if new >= OPEN_MAX {
        return Err(KernelError::FileDescriptorNotFound(new).into());
    }
    if old == new {
        return Ok(RawFd::new(new));
    }

    if new >= main.fds.len() {
        // Slots created by the growth stay null; only the target
        // receives the duplicate.
        main.fds.resize_with(new + 1, || None);
    }

    let dup = main.fds[old].as_ref().unwrap().dup();
    if let Some(prev) = main.fds[new].replace(dup) {
        prev.close();
    }
    Ok(RawFd::new(new))
}

pub fn sys_chdir(p: &Arc<Process>, upath: VirtAddr) -> Result<(), SyscallError> {
    let aspace = aspace_of(p)?;

    let _main = p.lock_main();
    let path = copy_path_in(&aspace, upath)?;
    let cwd = p.cwd();
    let vnode = vfs::resolve(&path, cwd.as_ref())?;
    if !vnode.is_dir() {
        return Err(KernelError::NotADirectory.into());
    }
    // Swap under the p_lock; the old reference drops here.
    p.set_cwd(Some(vnode));
    Ok(())
}

/// Copies the current directory's path, unterminated, into `ubuf` and
/// returns the byte count.
pub fn sys_getcwd(
    p: &Arc<Process>,
    ubuf: VirtAddr,
    len: usize,
) -> Result<usize, SyscallError> {
    let aspace = aspace_of(p)?;

    let _main = p.lock_main();
    let cwd = p.cwd().ok_or(KernelError::NoCurrentDirectory)?;
    let path = cwd.dir_path().ok_or(KernelError::NotADirectory)?;
    let n = usize::min(len, path.len());
    aspace.copy_out_bytes(ubuf, &path.as_bytes()[..n])?;
    Ok(n)
}
