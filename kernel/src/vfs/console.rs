use std::{
    collections::VecDeque,
    sync::{Arc, OnceLock},
};

use super::device::{self, Device};
use crate::{error::KernelError, sync::SpinLock};

/// The console device behind `con:`.
///
/// Reads drain an input queue, writes append to an output buffer; both
/// ends are exposed so tests (and an eventual interactive front end) can
/// feed keystrokes and collect output.
pub struct Console {
    input: SpinLock<VecDeque<u8>>,
    output: SpinLock<Vec<u8>>,
}

impl Console {
    fn new() -> Self {
        Self {
            input: SpinLock::new(VecDeque::new()),
            output: SpinLock::new(Vec::new()),
        }
    }

    /// Queues bytes for subsequent reads.
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    /// Drains everything written so far.
    pub fn take_output(&self) -> Vec<u8> {
        let mut output = self.output.lock();
        core::mem::take(&mut *output)
    }
}

impl Device for Console {
    fn read(&self, buf: &mut [u8]) -> Result<usize, KernelError> {
        let mut input = self.input.lock();
        let mut n = 0;
        while n < buf.len() {
            let Some(byte) = input.pop_front() else {
                break;
            };
            buf[n] = byte;
            n += 1;
        }
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, KernelError> {
        self.output.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
}

static CONSOLE: OnceLock<Arc<Console>> = OnceLock::new();

pub(super) fn init() {
    let console = Arc::new(Console::new());
    device::register_device("con", Arc::clone(&console) as Arc<dyn Device>);
    CONSOLE
        .set(console)
        .unwrap_or_else(|_| panic!("console already initialized"));
}

/// The system console.
///
/// # Panics
///
/// Panics before vfs bootstrap.
pub fn console() -> &'static Arc<Console> {
    CONSOLE.get().expect("console not initialized")
}
