//! The address-space collaborator.
//!
//! The VM layer proper is outside this subsystem; what lives here is the
//! opaque handle the process code is contracted to: `copy` for fork,
//! `activate` on switch, `define_stack` for exec, and the user-memory
//! copy routines the syscall layer stages transfers through. User memory
//! is modelled as a flat, fixed-size image starting at address zero.

use core::fmt;

use crate::{error::KernelError, param::USER_MEM_SIZE, sync::RwSleepLock};

/// An address in user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl VirtAddr {
    /// The null user pointer.
    pub const NULL: Self = Self(0);

    #[must_use]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    #[must_use]
    pub const fn addr(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn byte_add(self, n: usize) -> Self {
        Self(self.0 + n)
    }
}

/// Failure modes of a user string copy, kept apart so path and argv
/// callers can map the overflow case to their own errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStrError {
    /// The scan ran off the end of user memory before the terminator.
    BadAddress,
    /// The destination buffer filled up before the terminator.
    Overflow,
}

/// A user address space.
///
/// Single-owner: exactly one process slot holds it at a time, handed
/// around by pointer swap under the owner's `p_lock`. The contents are
/// internally locked so transfers need no process lock.
pub struct AddressSpace {
    mem: RwSleepLock<Vec<u8>>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    pub fn new() -> Self {
        Self {
            mem: RwSleepLock::new(vec![0; USER_MEM_SIZE]),
        }
    }

    /// Duplicates the full image, for fork.
    pub fn copy(&self) -> Self {
        Self {
            mem: RwSleepLock::new(self.mem.read().clone()),
        }
    }

    /// Makes this the translation context of the current CPU. The host
    /// model has no MMU, so there is nothing to switch.
    pub fn activate(&self) {}

    /// Returns the initial user stack pointer, one past the highest
    /// usable address.
    pub fn define_stack(&self) -> VirtAddr {
        VirtAddr::new(self.size())
    }

    pub fn size(&self) -> usize {
        self.mem.read().len()
    }

    /// Checks that `[addr, addr + len)` lies inside user memory.
    pub fn check_range(&self, addr: VirtAddr, len: usize) -> Result<(), KernelError> {
        let end = addr
            .addr()
            .checked_add(len)
            .ok_or(KernelError::BadAddress)?;
        if end > self.size() {
            return Err(KernelError::BadAddress);
        }
        Ok(())
    }

    pub fn copy_in_bytes(&self, dst: &mut [u8], src: VirtAddr) -> Result<(), KernelError> {
        self.check_range(src, dst.len())?;
        let mem = self.mem.read();
        dst.copy_from_slice(&mem[src.addr()..src.addr() + dst.len()]);
        Ok(())
    }

    pub fn copy_out_bytes(&self, dst: VirtAddr, src: &[u8]) -> Result<(), KernelError> {
        self.check_range(dst, src.len())?;
        let mut mem = self.mem.write();
        mem[dst.addr()..dst.addr() + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Reads one user pointer.
    pub fn copy_in_ptr(&self, src: VirtAddr) -> Result<usize, KernelError> {
        let mut bytes = [0; size_of::<usize>()];
        self.copy_in_bytes(&mut bytes, src)?;
        Ok(usize::from_ne_bytes(bytes))
    }

    /// Writes one i32, for status stores.
    pub fn copy_out_i32(&self, dst: VirtAddr, val: i32) -> Result<(), KernelError> {
        self.copy_out_bytes(dst, &val.to_ne_bytes())
    }

    /// Copies a NUL-terminated user string into `dst`, without the
    /// terminator, and returns its length.
    ///
    /// [`CopyStrError::Overflow`] means `dst` is too small for the
    /// string; callers retry with a bigger buffer or give up with their
    /// own "too long" error.
    pub fn copy_in_str(&self, src: VirtAddr, dst: &mut [u8]) -> Result<usize, CopyStrError> {
        let mem = self.mem.read();
        let from = src.addr();
        if from >= mem.len() {
            return Err(CopyStrError::BadAddress);
        }

        for (i, slot) in dst.iter_mut().enumerate() {
            let Some(&byte) = mem.get(from + i) else {
                return Err(CopyStrError::BadAddress);
            };
            if byte == 0 {
                return Ok(i);
            }
            *slot = byte;
        }

        // No terminator within dst; distinguish a fault from a plain
        // overflow so growth loops stop at the memory boundary.
        match mem.get(from + dst.len()) {
            Some(_) => Err(CopyStrError::Overflow),
            None => Err(CopyStrError::BadAddress),
        }
    }
}
