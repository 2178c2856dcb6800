//! The syscall surface.
//!
//! Each entry point takes the calling process explicitly; the trap
//! layer that would supply "current" and do register packing is machine
//! code outside this subsystem. Errors cross the boundary as
//! [`otter_syscall::SyscallError`] values.

use std::sync::OnceLock;

use crate::{
    error::KernelError,
    memory::{AddressSpace, CopyStrError, VirtAddr},
    param::{ARG_MAX, PATH_MAX},
    sync::SleepLock,
};

pub mod file;
pub mod proc;

static ARG_BUFFER: OnceLock<SleepLock<Box<[u8]>>> = OnceLock::new();

/// Allocates the process-wide argv marshalling buffer.
///
/// # Panics
///
/// Panics on double bootstrap.
pub fn bootstrap() {
    ARG_BUFFER
        .set(SleepLock::new(vec![0; ARG_MAX].into_boxed_slice()))
        .unwrap_or_else(|_| panic!("syscall layer already bootstrapped"));
    log::debug!("syscall layer bootstrapped");
}

/// The argv marshalling buffer; its lock serialises concurrent execs.
///
/// # Panics
///
/// Panics before bootstrap.
pub(crate) fn arg_buffer() -> &'static SleepLock<Box<[u8]>> {
    ARG_BUFFER.get().expect("syscall layer not bootstrapped")
}

/// Copies a user path into a kernel string, growing the buffer
/// geometrically up to [`PATH_MAX`].
pub(crate) fn copy_path_in(
    aspace: &AddressSpace,
    upath: VirtAddr,
) -> Result<String, KernelError> {
    let mut cap = 64;
    loop {
        let mut buf = vec![0; cap];
        match aspace.copy_in_str(upath, &mut buf) {
            Ok(len) => {
                buf.truncate(len);
                return String::from_utf8(buf).map_err(|_| KernelError::FsEntryNotFound);
            }
            Err(CopyStrError::Overflow) => {
                if cap >= PATH_MAX {
                    return Err(KernelError::PathTooLong);
                }
                cap = usize::min(cap * 2, PATH_MAX);
            }
            Err(CopyStrError::BadAddress) => return Err(KernelError::BadAddress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn path_copy_grows_to_the_cap() {
        test_support::bootstrap();
        let aspace = AddressSpace::new();

        let long = "d".repeat(300);
        let mut bytes = long.clone().into_bytes();
        bytes.push(0);
        aspace.copy_out_bytes(VirtAddr::new(0), &bytes).unwrap();
        assert_eq!(copy_path_in(&aspace, VirtAddr::new(0)).unwrap(), long);

        let too_long = vec![b'e'; PATH_MAX];
        aspace.copy_out_bytes(VirtAddr::new(0), &too_long).unwrap();
        aspace
            .copy_out_bytes(VirtAddr::new(PATH_MAX), &[0])
            .unwrap();
        assert_eq!(
            copy_path_in(&aspace, VirtAddr::new(0)),
            Err(KernelError::PathTooLong)
        );
    }
}
