//! The process and open-file subsystem of a teaching kernel, hosted.
//!
//! What would sit below this on real hardware (trap entry, the MMU,
//! the ELF loader, the scheduler) is modelled by small host-side
//! stand-ins with the same contracts, so the subsystem runs, and its
//! concurrency is exercised, as an ordinary library under `cargo test`.

pub mod error;
pub mod file;
pub mod memory;
pub mod param;
pub mod proc;
pub mod sync;
pub mod syscall;
pub mod table;
pub mod vfs;

/// Brings the subsystem up, in dependency order: vfs and devices, the
/// open-file table, the process table, the kernel process, syscall
/// buffers.
///
/// Idempotent, so test binaries and embedders can call it freely; the
/// individual stage bootstraps panic when run twice.
pub fn bootstrap() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        vfs::bootstrap();
        file::bootstrap();
        proc::table_bootstrap();
        proc::bootstrap();
        syscall::bootstrap();
        log::debug!("kernel subsystem up");
    });
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Unit tests share the global tables; bring them up once.
    pub fn bootstrap() {
        crate::bootstrap();
    }
}
