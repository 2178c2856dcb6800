use otter_syscall::SyscallError;
use otter_types::process::ProcId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error("bad file descriptor: fd={0}")]
    FileDescriptorNotFound(usize),
    #[error("file descriptor not readable")]
    FileDescriptorNotReadable,
    #[error("file descriptor not writable")]
    FileDescriptorNotWritable,
    #[error("invalid access mode")]
    InvalidAccessMode,
    #[error("invalid whence")]
    InvalidWhence,
    #[error("negative seek offset")]
    NegativeSeekOffset,
    #[error("invalid wait options")]
    InvalidWaitOptions,
    #[error("pid out of range")]
    PidOutOfRange,
    #[error("process not found: {0}")]
    ProcessNotFound(ProcId),
    #[error("no child process")]
    NoWaitTarget,
    #[error("too many processes")]
    TooManyProcesses,
    #[error("no free file descriptor table entry")]
    NoFreeFileDescriptorTableEntry,
    #[error("no free open-file table entry")]
    NoFreeOpenFileTableEntry,
    #[error("path too long")]
    PathTooLong,
    #[error("argument list too large")]
    ArgumentListTooLarge,
    #[error("bad user address")]
    BadAddress,
    #[error("invalid executable")]
    InvalidExecutable,
    #[error("out of memory")]
    OutOfMemory,
    #[error("file system entry not found")]
    FsEntryNotFound,
    #[error("device not found")]
    DeviceNotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("not seekable")]
    NotSeekable,
    #[error("no current directory")]
    NoCurrentDirectory,
}

impl From<KernelError> for SyscallError {
    fn from(error: KernelError) -> Self {
        match error {
            KernelError::FileDescriptorNotFound(_)
            | KernelError::FileDescriptorNotReadable
            | KernelError::FileDescriptorNotWritable => Self::BadFileDescriptor,
            KernelError::InvalidAccessMode
            | KernelError::InvalidWhence
            | KernelError::NegativeSeekOffset
            | KernelError::InvalidWaitOptions
            | KernelError::AlreadyExists => Self::InvalidInput,
            KernelError::PidOutOfRange | KernelError::ProcessNotFound(_) => Self::ProcessNotFound,
            KernelError::NoWaitTarget => Self::NoChildProcess,
            KernelError::TooManyProcesses => Self::TooManyProcesses,
            KernelError::NoFreeFileDescriptorTableEntry => Self::TooManyOpenFiles,
            KernelError::NoFreeOpenFileTableEntry => Self::TooManyOpenFilesSystem,
            KernelError::PathTooLong => Self::FilenameTooLong,
            KernelError::ArgumentListTooLarge => Self::ArgumentListTooLong,
            KernelError::BadAddress => Self::BadAddress,
            KernelError::InvalidExecutable => Self::ExecFormat,
            KernelError::OutOfMemory => Self::OutOfMemory,
            KernelError::FsEntryNotFound
            | KernelError::DeviceNotFound
            | KernelError::NoCurrentDirectory => Self::FsEntryNotFound,
            KernelError::NotADirectory => Self::NotADirectory,
            KernelError::IsADirectory => Self::IsADirectory,
            KernelError::NotSeekable => Self::NotSeekable,
        }
    }
}
