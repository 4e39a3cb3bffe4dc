//! Error types for the virtual filesystem.

use thiserror::Error;

/// Errors raised by descriptor and file operations.
///
/// These are resource-level failures: the syscall layer reports them to the
/// guest as errno values and the guest is free to carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VfsError {
    /// The descriptor slot is unused, closed, or out of range.
    #[error("Bad descriptor: {0}")]
    BadDescriptor(u32),

    /// No entry with this exact path exists in the directory.
    #[error("Not found: '{path}' in directory '{directory}'")]
    NotFound {
        /// The directory that was searched.
        directory: String,
        /// The path that was requested.
        path: String,
    },

    /// A seek would move the cursor before the start of the file.
    #[error("Invalid offset: {offset} relative to {whence:?}")]
    InvalidOffset {
        /// The requested offset.
        offset: i64,
        /// The reference point of the seek.
        whence: crate::file::Whence,
    },

    /// A write would grow a file past its handle's size cap.
    #[error("File too large: {requested} bytes requested")]
    FileTooLarge {
        /// The end offset the write would have reached.
        requested: u64,
    },

    /// A file operation was attempted on a directory descriptor.
    #[error("Descriptor {0} is a directory")]
    IsADirectory(u32),

    /// A directory operation was attempted on a file descriptor.
    #[error("Descriptor {0} is not a directory")]
    NotADirectory(u32),

    /// The descriptor table cannot hold another entry.
    #[error("Descriptor table is full")]
    TableFull,
}

/// Result type for virtual filesystem operations.
pub type VfsResult<T> = std::result::Result<T, VfsError>;
