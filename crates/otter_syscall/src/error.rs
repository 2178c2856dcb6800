use strum::FromRepr;

/// Errno-style error codes crossing the syscall boundary.
///
/// The numeric values are the wire encoding stored in the error return
/// register by the trap layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, thiserror::Error)]
#[repr(i32)]
pub enum SyscallError {
    // ENOENT
    #[error("no such file or directory")]
    FsEntryNotFound = 2,
    // ESRCH
    #[error("no such process")]
    ProcessNotFound = 3,
    // EIO
    #[error("input/output error")]
    Io = 5,
    // E2BIG
    #[error("argument list too long")]
    ArgumentListTooLong = 7,
    // ENOEXEC
    #[error("exec format error")]
    ExecFormat = 8,
    // EBADF
    #[error("bad file descriptor")]
    BadFileDescriptor = 9,
    // ECHILD
    #[error("no child process")]
    NoChildProcess = 10,
    // EMPROC (EAGAIN slot)
    #[error("too many processes")]
    TooManyProcesses = 11,
    // ENOMEM
    #[error("cannot allocate memory")]
    OutOfMemory = 12,
    // EFAULT
    #[error("bad address")]
    BadAddress = 14,
    // ENOTDIR
    #[error("not a directory")]
    NotADirectory = 20,
    // EISDIR
    #[error("is a directory")]
    IsADirectory = 21,
    // EINVAL
    #[error("invalid argument")]
    InvalidInput = 22,
    // ENFILE
    #[error("too many open files in system")]
    TooManyOpenFilesSystem = 23,
    // EMFILE
    #[error("too many open files")]
    TooManyOpenFiles = 24,
    // ESPIPE
    #[error("illegal seek")]
    NotSeekable = 29,
    // ENAMETOOLONG
    #[error("file name too long")]
    FilenameTooLong = 36,
}

impl SyscallError {
    /// The errno value as stored by the trap layer.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}
