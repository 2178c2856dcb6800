//! The VFS collaborator.
//!
//! The real filesystem stack is outside this subsystem; this module
//! supplies the vnode contract the file layer consumes: refcounted
//! handles with `read_at` / `write_at` / `stat` / `is_seekable`, a
//! device namespace (`name:` paths, console preregistered) and a small
//! in-memory tree for seekable files and directories.
//!
//! A [`Vnode`] is one reference to the underlying object; cloning takes
//! another reference and dropping releases one, the last drop releasing
//! the object.

use std::sync::{Arc, OnceLock};

use otter_syscall::{AccessMode, OpenFlags, Stat};

pub use self::{
    console::{Console, console},
    device::{Device, register_device},
};
use self::ram::{DirNode, MemFile};
use crate::error::KernelError;

mod console;
mod device;
mod ram;

#[derive(Clone)]
pub struct Vnode {
    data: Arc<VnodeData>,
}

enum VnodeData {
    Device(Arc<dyn Device>),
    File(MemFile),
    Dir(DirNode),
}

impl Vnode {
    fn new_device(dev: Arc<dyn Device>) -> Self {
        Self {
            data: Arc::new(VnodeData::Device(dev)),
        }
    }

    fn new_file() -> Self {
        Self {
            data: Arc::new(VnodeData::File(MemFile::new())),
        }
    }

    fn new_dir(path: String) -> Self {
        Self {
            data: Arc::new(VnodeData::Dir(DirNode::new(path))),
        }
    }

    pub fn read_at(&self, buf: &mut [u8], offset: i64) -> Result<usize, KernelError> {
        match &*self.data {
            VnodeData::Device(dev) => dev.read(buf),
            VnodeData::File(file) => file.read_at(buf, offset),
            VnodeData::Dir(_) => Err(KernelError::IsADirectory),
        }
    }

    pub fn write_at(&self, buf: &[u8], offset: i64) -> Result<usize, KernelError> {
        match &*self.data {
            VnodeData::Device(dev) => dev.write(buf),
            VnodeData::File(file) => file.write_at(buf, offset),
            VnodeData::Dir(_) => Err(KernelError::IsADirectory),
        }
    }

    pub fn stat(&self) -> Stat {
        match &*self.data {
            VnodeData::File(file) => Stat { size: file.size() },
            VnodeData::Device(_) | VnodeData::Dir(_) => Stat::default(),
        }
    }

    /// Whether the offset means anything for this object. Devices are
    /// streams; only regular files seek.
    pub fn is_seekable(&self) -> bool {
        matches!(&*self.data, VnodeData::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(&*self.data, VnodeData::Dir(_))
    }

    /// The absolute path of a directory vnode, for getcwd.
    pub fn dir_path(&self) -> Option<&str> {
        match &*self.data {
            VnodeData::Dir(dir) => Some(dir.path()),
            _ => None,
        }
    }

    fn dir(&self) -> Result<&DirNode, KernelError> {
        match &*self.data {
            VnodeData::Dir(dir) => Ok(dir),
            _ => Err(KernelError::NotADirectory),
        }
    }
}

static ROOT: OnceLock<Vnode> = OnceLock::new();

/// Creates the root directory and registers the console device.
///
/// # Panics
///
/// Panics on double bootstrap.
pub fn bootstrap() {
    ROOT.set(Vnode::new_dir("/".to_owned()))
        .unwrap_or_else(|_| panic!("vfs already bootstrapped"));
    console::init();
    log::debug!("vfs bootstrapped");
}

/// The root directory.
///
/// # Panics
///
/// Panics before bootstrap.
pub fn root() -> Vnode {
    ROOT.get().expect("vfs not bootstrapped").clone()
}

/// Resolves `path` to a vnode.
///
/// `name:` paths name devices. Other paths walk the tree, from the root
/// when absolute, otherwise from `cwd` (the root stands in when the
/// caller has no cwd yet). `.` components are ignored; `..` is not
/// supported by this tree.
pub fn resolve(path: &str, cwd: Option<&Vnode>) -> Result<Vnode, KernelError> {
    if path.is_empty() {
        return Err(KernelError::FsEntryNotFound);
    }

    if let Some((name, rest)) = path.split_once(':') {
        if !rest.is_empty() {
            return Err(KernelError::DeviceNotFound);
        }
        return device::lookup(name).ok_or(KernelError::DeviceNotFound);
    }

    let mut cur = if path.starts_with('/') {
        root()
    } else {
        cwd.cloned().unwrap_or_else(root)
    };

    for comp in path.split('/') {
        if comp.is_empty() || comp == "." {
            continue;
        }
        cur = cur.dir()?.lookup(comp).ok_or(KernelError::FsEntryNotFound)?;
    }
    Ok(cur)
}

/// Splits `path` into its parent directory vnode and leaf name.
fn resolve_parent<'p>(path: &'p str, cwd: Option<&Vnode>) -> Result<(Vnode, &'p str), KernelError> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.contains(':') {
        return Err(KernelError::FsEntryNotFound);
    }
    match trimmed.rsplit_once('/') {
        Some(("", leaf)) => Ok((root(), leaf)),
        Some((dir, leaf)) => Ok((resolve(dir, cwd)?, leaf)),
        None => {
            let base = cwd.cloned().unwrap_or_else(root);
            Ok((base, trimmed))
        }
    }
}

/// Opens `path`, honouring `CREATE`, `EXCL` and `TRUNC`, and returns a
/// new reference to its vnode.
pub fn open(path: &str, flags: OpenFlags, cwd: Option<&Vnode>) -> Result<Vnode, KernelError> {
    let mode = AccessMode::from_flags(flags).ok_or(KernelError::InvalidAccessMode)?;

    match resolve(path, cwd) {
        Ok(vnode) => {
            if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
                return Err(KernelError::AlreadyExists);
            }
            if vnode.is_dir() && mode.writable() {
                return Err(KernelError::IsADirectory);
            }
            if flags.contains(OpenFlags::TRUNC) {
                if let VnodeData::File(file) = &*vnode.data {
                    file.truncate();
                }
            }
            Ok(vnode)
        }
        Err(KernelError::FsEntryNotFound) if flags.contains(OpenFlags::CREATE) => {
            let (parent, leaf) = resolve_parent(path, cwd)?;
            parent.dir()?.create_file(leaf)
        }
        Err(e) => Err(e),
    }
}

/// Creates a directory. Not part of the syscall surface; used by
/// bootstrap code and tests to lay out a tree.
pub fn mkdir(path: &str, cwd: Option<&Vnode>) -> Result<Vnode, KernelError> {
    let (parent, leaf) = resolve_parent(path, cwd)?;
    parent.dir()?.create_dir(leaf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn device_paths_resolve_to_the_console() {
        test_support::bootstrap();
        let con = resolve("con:", None).unwrap();
        assert!(!con.is_seekable());
        assert!(resolve("nodev:", None).is_err());
        assert!(matches!(
            resolve("con:extra", None),
            Err(KernelError::DeviceNotFound)
        ));
    }

    #[test]
    fn tree_walk_and_create() {
        test_support::bootstrap();
        mkdir("/walk", None).unwrap();
        mkdir("/walk/sub", None).unwrap();
        let f = open("/walk/sub/file", OpenFlags::CREATE, None).unwrap();
        assert!(f.is_seekable());

        let again = resolve("/walk/sub/file", None).unwrap();
        again.write_at(b"data", 0).unwrap();
        assert_eq!(f.stat().size, 4);

        // Relative resolution from a cwd.
        let sub = resolve("/walk/sub", None).unwrap();
        assert!(resolve("file", Some(&sub)).is_ok());
        assert_eq!(sub.dir_path(), Some("/walk/sub"));
    }

    #[test]
    fn open_flag_handling() {
        test_support::bootstrap();
        mkdir("/flags", None).unwrap();
        open("/flags/a", OpenFlags::CREATE, None).unwrap();
        assert!(matches!(
            open("/flags/a", OpenFlags::CREATE | OpenFlags::EXCL, None),
            Err(KernelError::AlreadyExists)
        ));
        assert!(matches!(
            open("/flags", OpenFlags::WRITE_ONLY, None),
            Err(KernelError::IsADirectory)
        ));

        let a = resolve("/flags/a", None).unwrap();
        a.write_at(b"xyz", 0).unwrap();
        open("/flags/a", OpenFlags::TRUNC, None).unwrap();
        assert_eq!(a.stat().size, 0);
    }

    #[test]
    fn file_write_past_end_zero_fills() {
        test_support::bootstrap();
        let f = open("/gap", OpenFlags::CREATE, None).unwrap();
        f.write_at(b"ab", 4).unwrap();
        assert_eq!(f.stat().size, 6);
        let mut buf = [0xff; 6];
        assert_eq!(f.read_at(&mut buf, 0).unwrap(), 6);
        assert_eq!(&buf, b"\0\0\0\0ab");
        assert_eq!(f.read_at(&mut buf, 6).unwrap(), 0);
    }
}
