//! File handles and the system-wide open-file table.
//!
//! A [`FileHandle`] is the shared object behind one or more descriptors:
//! the vnode, the access mode and the seek offset. A [`FileDesc`] is one
//! ownership share of a handle, bound to the handle's slot in the
//! open-file table. Shares are taken with [`FileDesc::dup`] and released
//! with [`FileDesc::close`]; the last release removes the handle from
//! the table and drops its vnode reference. A handle is present in the
//! table exactly while its refcount is positive.

use std::sync::{Arc, OnceLock};

use otter_syscall::{AccessMode, OpenFlags, Whence};

use crate::{
    error::KernelError,
    memory::{AddressSpace, VirtAddr},
    param::OPEN_FILE_MAX,
    sync::{SleepLock, SpinLock},
    table::Table,
    vfs::{self, Vnode},
};

pub struct FileHandle {
    vnode: Vnode,
    mode: AccessMode,
    /// Seek position. Held across any vnode operation that observes it,
    /// so dup'd descriptors see a consistent offset.
    offset: SleepLock<i64>,
    /// Ownership shares. Guarded separately so inc/dec never sleep.
    refcount: SpinLock<u32>,
}

impl FileHandle {
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn refcount(&self) -> u32 {
        *self.refcount.lock()
    }

    pub fn offset(&self) -> i64 {
        *self.offset.lock()
    }

    /// Reads up to `len` bytes at the current offset into user memory.
    ///
    /// The offset advances by the transfer count, and only when both the
    /// vnode read and the user copy-out succeed.
    pub fn read_user(
        &self,
        aspace: &AddressSpace,
        dst: VirtAddr,
        len: usize,
    ) -> Result<usize, KernelError> {
        if !self.mode.readable() {
            return Err(KernelError::FileDescriptorNotReadable);
        }

        let mut kbuf = vec![0; len];
        let mut offset = self.offset.lock();
        let n = self.vnode.read_at(&mut kbuf, *offset)?;
        aspace.copy_out_bytes(dst, &kbuf[..n])?;
        *offset += n as i64;
        Ok(n)
    }

    /// Writes `len` bytes from user memory at the current offset.
    pub fn write_user(
        &self,
        aspace: &AddressSpace,
        src: VirtAddr,
        len: usize,
    ) -> Result<usize, KernelError> {
        if !self.mode.writable() {
            return Err(KernelError::FileDescriptorNotWritable);
        }

        let mut kbuf = vec![0; len];
        aspace.copy_in_bytes(&mut kbuf, src)?;

        let mut offset = self.offset.lock();
        let n = self.vnode.write_at(&kbuf, *offset)?;
        *offset += n as i64;
        Ok(n)
    }

    /// Moves the offset. A failed seek leaves it untouched.
    pub fn seek(&self, pos: i64, whence: Whence) -> Result<i64, KernelError> {
        if !self.vnode.is_seekable() {
            return Err(KernelError::NotSeekable);
        }

        let mut offset = self.offset.lock();
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => *offset,
            Whence::End => i64::try_from(self.vnode.stat().size)
                .map_err(|_| KernelError::NegativeSeekOffset)?,
        };
        let target = base
            .checked_add(pos)
            .ok_or(KernelError::NegativeSeekOffset)?;
        if target < 0 {
            return Err(KernelError::NegativeSeekOffset);
        }
        *offset = target;
        Ok(target)
    }
}

/// One ownership share of a file handle, bound to the handle's slot in
/// the open-file table.
pub struct FileDesc {
    index: usize,
    handle: Arc<FileHandle>,
}

impl std::fmt::Debug for FileDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDesc").field("index", &self.index).finish()
    }
}

impl FileDesc {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn handle(&self) -> &Arc<FileHandle> {
        &self.handle
    }

    /// Takes another share of the handle.
    pub fn dup(&self) -> Self {
        let mut refcount = self.handle.refcount.lock();
        assert!(*refcount >= 1);
        *refcount += 1;
        drop(refcount);

        Self {
            index: self.index,
            handle: Arc::clone(&self.handle),
        }
    }

    /// Releases this share. The last release removes the handle from the
    /// open-file table and closes the vnode.
    pub fn close(self) {
        // consume self to drop
        let _ = self;
    }
}

impl Drop for FileDesc {
    fn drop(&mut self) {
        let mut refcount = self.handle.refcount.lock();
        assert!(*refcount > 0);
        *refcount -= 1;
        let last = *refcount == 0;
        drop(refcount);

        if last {
            oft().table.remove(self.index);
        }
    }
}

struct Oft {
    table: Table<Arc<FileHandle>>,
}

impl Oft {
    fn new() -> Self {
        let table = Table::new();
        table.setsize(OPEN_FILE_MAX);
        Self { table }
    }
}

static OFT: OnceLock<Oft> = OnceLock::new();

/// Creates the open-file table.
///
/// # Panics
///
/// Panics on double bootstrap.
pub fn bootstrap() {
    OFT.set(Oft::new())
        .unwrap_or_else(|_| panic!("open-file table already bootstrapped"));
    log::debug!("open-file table bootstrapped, {OPEN_FILE_MAX} slots");
}

fn oft() -> &'static Oft {
    OFT.get().expect("open-file table not bootstrapped")
}

/// Number of live handles in the open-file table.
pub fn open_file_count() -> usize {
    oft().table.num()
}

/// Opens `path` and installs a fresh handle in the open-file table,
/// returning the first descriptor for it (refcount 1, offset 0).
pub fn fh_add(flags: OpenFlags, path: &str, cwd: Option<&Vnode>) -> Result<FileDesc, KernelError> {
    let mode = AccessMode::from_flags(flags).ok_or(KernelError::InvalidAccessMode)?;
    let vnode = vfs::open(path, flags, cwd)?;

    let handle = Arc::new(FileHandle {
        vnode,
        mode,
        offset: SleepLock::new(0),
        refcount: SpinLock::new(1),
    });

    // On failure the handle is dropped here, releasing the vnode
    // reference taken by the open.
    let index = oft()
        .table
        .setfirst(Arc::clone(&handle), 0)
        .map_err(|_| KernelError::NoFreeOpenFileTableEntry)?;

    Ok(FileDesc { index, handle })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::test_support;

    // The open-file table is a process-wide singleton; tests that count
    // or fill it run one at a time and leave it empty.
    static OFT_SERIAL: Mutex<()> = Mutex::new(());

    #[test]
    fn refcount_sweep() {
        test_support::bootstrap();
        let _serial = OFT_SERIAL.lock().unwrap();

        let mut fds = Vec::new();
        for i in 0..100 {
            let fd = fh_add(OpenFlags::READ_ONLY, "con:", None).unwrap();
            assert_eq!(fd.index(), i);
            assert_eq!(fd.handle().refcount(), 1);
            let dup = fd.dup();
            assert_eq!(fd.handle().refcount(), 2);
            fds.push((fd, dup));
        }
        assert_eq!(open_file_count(), 100);

        for (fd, dup) in fds {
            dup.close();
            assert_eq!(fd.handle().refcount(), 1);
            fd.close();
        }
        assert_eq!(open_file_count(), 0);
    }

    #[test]
    fn table_full_reports_enfile() {
        test_support::bootstrap();
        let _serial = OFT_SERIAL.lock().unwrap();

        let mut fds = Vec::new();
        for _ in 0..OPEN_FILE_MAX {
            fds.push(fh_add(OpenFlags::READ_ONLY, "con:", None).unwrap());
        }
        assert_eq!(
            fh_add(OpenFlags::READ_ONLY, "con:", None).unwrap_err(),
            KernelError::NoFreeOpenFileTableEntry
        );

        // Freeing one slot makes the table usable again.
        fds.pop().unwrap().close();
        let fd = fh_add(OpenFlags::WRITE_ONLY, "con:", None).unwrap();
        assert_eq!(fd.index(), OPEN_FILE_MAX - 1);
        fd.close();

        fds.clear();
        assert_eq!(open_file_count(), 0);
    }

    #[test]
    fn dup_then_close_is_a_no_op() {
        test_support::bootstrap();
        let _serial = OFT_SERIAL.lock().unwrap();

        let fd = fh_add(OpenFlags::READ_ONLY, "con:", None).unwrap();
        let before = fd.handle().refcount();
        fd.dup().close();
        assert_eq!(fd.handle().refcount(), before);
        fd.close();
        assert_eq!(open_file_count(), 0);
    }

    #[test]
    fn seek_contract() {
        test_support::bootstrap();
        let _serial = OFT_SERIAL.lock().unwrap();

        let con = fh_add(OpenFlags::READ_ONLY, "con:", None).unwrap();
        assert_eq!(
            con.handle().seek(0, Whence::Set),
            Err(KernelError::NotSeekable)
        );
        con.close();

        let fd = fh_add(
            OpenFlags::READ_WRITE | OpenFlags::CREATE,
            "/seek_contract",
            None,
        )
        .unwrap();
        let handle = fd.handle();

        // Grow the file to 100 bytes.
        let aspace = AddressSpace::new();
        aspace.copy_out_bytes(VirtAddr::new(0), &[7; 100]).unwrap();
        assert_eq!(handle.write_user(&aspace, VirtAddr::new(0), 100), Ok(100));

        assert_eq!(handle.seek(50, Whence::Set), Ok(50));
        assert_eq!(handle.seek(-10, Whence::End), Ok(90));
        assert_eq!(handle.seek(5, Whence::Cur), Ok(95));
        assert_eq!(
            handle.seek(-1000, Whence::End),
            Err(KernelError::NegativeSeekOffset)
        );
        // A failed seek leaves the offset where it was.
        assert_eq!(handle.offset(), 95);
        fd.close();
        assert_eq!(open_file_count(), 0);
    }

    #[test]
    fn transfer_failure_leaves_offset() {
        test_support::bootstrap();
        let _serial = OFT_SERIAL.lock().unwrap();

        let fd = fh_add(
            OpenFlags::READ_WRITE | OpenFlags::CREATE,
            "/offset_stays",
            None,
        )
        .unwrap();
        let handle = fd.handle();
        let aspace = AddressSpace::new();

        aspace.copy_out_bytes(VirtAddr::new(0), b"abcd").unwrap();
        assert_eq!(handle.write_user(&aspace, VirtAddr::new(0), 4), Ok(4));
        assert_eq!(handle.offset(), 4);

        // Faulting user source: no write, no offset motion.
        let top = VirtAddr::new(aspace.size());
        assert_eq!(
            handle.write_user(&aspace, top, 4),
            Err(KernelError::BadAddress)
        );
        assert_eq!(handle.offset(), 4);

        // Faulting user destination: the read fails before the offset
        // advances.
        handle.seek(0, Whence::Set).unwrap();
        assert_eq!(
            handle.read_user(&aspace, top, 4),
            Err(KernelError::BadAddress)
        );
        assert_eq!(handle.offset(), 0);

        fd.close();
        assert_eq!(open_file_count(), 0);
    }
}
