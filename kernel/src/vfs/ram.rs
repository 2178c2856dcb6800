use std::collections::BTreeMap;

use super::Vnode;
use crate::{
    error::KernelError,
    sync::{RwSleepLock, SleepLock},
};

/// A regular in-memory file. Seekable; writes past the end zero-fill
/// the gap.
pub(super) struct MemFile {
    data: RwSleepLock<Vec<u8>>,
}

impl MemFile {
    pub(super) fn new() -> Self {
        Self {
            data: RwSleepLock::new(Vec::new()),
        }
    }

    pub(super) fn read_at(&self, buf: &mut [u8], offset: i64) -> Result<usize, KernelError> {
        let data = self.data.read();
        let offset = usize::try_from(offset).map_err(|_| KernelError::NegativeSeekOffset)?;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = usize::min(buf.len(), data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    pub(super) fn write_at(&self, buf: &[u8], offset: i64) -> Result<usize, KernelError> {
        let mut data = self.data.write();
        let offset = usize::try_from(offset).map_err(|_| KernelError::NegativeSeekOffset)?;
        let end = offset + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    pub(super) fn size(&self) -> u64 {
        self.data.read().len() as u64
    }

    pub(super) fn truncate(&self) {
        self.data.write().clear();
    }
}

/// A directory node. Knows its own absolute path so getcwd is a lookup,
/// not a reverse walk.
pub(super) struct DirNode {
    path: String,
    entries: SleepLock<BTreeMap<String, Vnode>>,
}

impl DirNode {
    pub(super) fn new(path: String) -> Self {
        Self {
            path,
            entries: SleepLock::new(BTreeMap::new()),
        }
    }

    pub(super) fn path(&self) -> &str {
        &self.path
    }

    pub(super) fn lookup(&self, name: &str) -> Option<Vnode> {
        self.entries.lock().get(name).cloned()
    }

    pub(super) fn create_file(&self, name: &str) -> Result<Vnode, KernelError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(name) {
            return Err(KernelError::AlreadyExists);
        }
        let vnode = Vnode::new_file();
        entries.insert(name.to_owned(), vnode.clone());
        Ok(vnode)
    }

    pub(super) fn create_dir(&self, name: &str) -> Result<Vnode, KernelError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(name) {
            return Err(KernelError::AlreadyExists);
        }
        let path = if self.path == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.path)
        };
        let vnode = Vnode::new_dir(path);
        entries.insert(name.to_owned(), vnode.clone());
        Ok(vnode)
    }
}
