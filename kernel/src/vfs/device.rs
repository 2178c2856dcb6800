use std::sync::Arc;

use super::Vnode;
use crate::{error::KernelError, sync::SpinLock};

/// A character device reachable through a `name:` path.
pub trait Device: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> Result<usize, KernelError>;
    fn write(&self, buf: &[u8]) -> Result<usize, KernelError>;
}

static DEVICES: SpinLock<Vec<(String, Vnode)>> = SpinLock::new(Vec::new());

/// Registers `dev` under `name`, so `name:` resolves to its vnode.
///
/// # Panics
///
/// Panics if the name is already taken; devices register once, at
/// bootstrap.
pub fn register_device(name: &str, dev: Arc<dyn Device>) {
    let mut devices = DEVICES.lock();
    assert!(
        !devices.iter().any(|(n, _)| n == name),
        "device {name} registered twice"
    );
    let vnode = Vnode::new_device(dev);
    devices.push((name.to_owned(), vnode));
}

pub(super) fn lookup(name: &str) -> Option<Vnode> {
    let devices = DEVICES.lock();
    devices
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
}
