/// A slot number in one process's descriptor table.
///
/// Descriptor numbers are per-process and dense from zero. A first user
/// process is born with the three standard slots below already bound to
/// the console; everything else is handed out lowest-free-first by open
/// and dup2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct RawFd(usize);

impl RawFd {
    /// Standard input; opened read-only on the console for a first
    /// process.
    pub const STDIN: Self = Self(0);
    /// Standard output; opened write-only on the console.
    pub const STDOUT: Self = Self(1);
    /// Standard error; opened write-only on the console.
    pub const STDERR: Self = Self(2);

    #[must_use]
    pub const fn new(slot: usize) -> Self {
        Self(slot)
    }

    /// The descriptor-table slot this names.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Whether this is one of the slots preopened for a first process.
    #[must_use]
    pub const fn is_standard(self) -> bool {
        self.0 <= Self::STDERR.0
    }
}
