//! Compile-time limits.

/// Slots per table section.
pub const SECTION_SIZE: usize = 256;

/// Open files per process.
pub const OPEN_MAX: usize = 128;

/// Open files per system (capacity of the open-file table).
pub const OPEN_FILE_MAX: usize = 1024;

/// Lowest PID handed to a user process. 0 means "no parent", 1 is held back.
pub const PID_MIN: i32 = 2;

/// Highest PID.
pub const PID_MAX: i32 = 32767;

/// Live processes per system.
pub const PROC_MAX: usize = 128;

/// Longest path, including the terminator.
pub const PATH_MAX: usize = 1024;

/// Total bytes of argv strings plus the pointer vector passed to exec.
pub const ARG_MAX: usize = 65536;

/// Process name bytes kept for debugging.
pub const PROC_NAME_MAX: usize = 16;

/// Bytes of user memory backing one address space.
pub const USER_MEM_SIZE: usize = 1 << 20;
