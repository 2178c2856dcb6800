//! The user-visible syscall vocabulary: open flags, seek whence, errno
//! values and the wait-status encoding.
#![cfg_attr(not(test), no_std)]

use bitflags::bitflags;
use strum::FromRepr;

pub use self::error::SyscallError;

pub mod error;
pub mod wait;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct OpenFlags: u32 {
        const READ_ONLY = 0o0;
        const WRITE_ONLY = 0o1;
        const READ_WRITE = 0o2;
        const CREATE = 0o4;
        const EXCL = 0o10;
        const TRUNC = 0o20;
        const APPEND = 0o40;
    }
}

/// Mask selecting the access mode bits of [`OpenFlags`].
pub const ACCMODE_MASK: u32 = 0o3;

/// The access mode of an open file, decoded from the low flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum AccessMode {
    ReadOnly = 0o0,
    WriteOnly = 0o1,
    ReadWrite = 0o2,
}

impl AccessMode {
    /// Decodes the access mode of `flags`; `None` if the two mode bits
    /// hold the invalid combination.
    #[must_use]
    pub fn from_flags(flags: OpenFlags) -> Option<Self> {
        Self::from_repr(flags.bits() & ACCMODE_MASK)
    }

    #[must_use]
    pub fn readable(self) -> bool {
        !matches!(self, Self::WriteOnly)
    }

    #[must_use]
    pub fn writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// Interpretation of the `pos` argument to lseek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum Whence {
    Set = 0,
    Cur = 1,
    End = 2,
}

/// Metadata about an open vnode, as returned by the stat operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Size of the object in bytes.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_mode_decodes_low_bits_only() {
        let flags = OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNC;
        assert_eq!(AccessMode::from_flags(flags), Some(AccessMode::WriteOnly));
        assert_eq!(
            AccessMode::from_flags(OpenFlags::READ_ONLY),
            Some(AccessMode::ReadOnly)
        );
        assert_eq!(
            AccessMode::from_flags(OpenFlags::from_bits_retain(0o3)),
            None
        );
    }

    #[test]
    fn read_write_permissions() {
        assert!(AccessMode::ReadOnly.readable());
        assert!(!AccessMode::ReadOnly.writable());
        assert!(!AccessMode::WriteOnly.readable());
        assert!(AccessMode::WriteOnly.writable());
        assert!(AccessMode::ReadWrite.readable());
        assert!(AccessMode::ReadWrite.writable());
    }
}
