//! Error types for the host function system.

use hearth_vfs::VfsError;
use thiserror::Error;

use crate::abi::Errno;

/// Errors related to host functions.
///
/// Most variants are reported to the guest as an errno and the guest keeps
/// running. The rest are fatal: a syscall that hits one traps the run, and
/// linker failures stop a run before any guest code executes.
#[derive(Debug, Error)]
pub enum HostError {
    /// Memory export not found.
    #[error("Memory export 'memory' not found")]
    MemoryNotFound,

    /// Memory access out of bounds.
    #[error("Memory access out of bounds: offset={offset}, len={len}, memory_size={memory_size}")]
    MemoryAccessOutOfBounds {
        /// The offset attempted.
        offset: usize,
        /// The length attempted.
        len: usize,
        /// The actual memory size.
        memory_size: usize,
    },

    /// Invalid UTF-8 in string.
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// A descriptor or file operation failed.
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// A syscall rejected its arguments with a specific errno.
    #[error("Syscall failed with {0}")]
    Errno(Errno),

    /// A module import has no matching host function.
    #[error("Cannot resolve import '{module}::{name}': {reason}")]
    ImportResolution {
        /// The import module name.
        module: String,
        /// The import name.
        name: String,
        /// Why the import was rejected.
        reason: String,
    },

    /// Function registration failed.
    #[error("Failed to register function '{module}::{name}': {reason}")]
    RegistrationFailed {
        /// The module name.
        module: String,
        /// The function name.
        name: String,
        /// The reason for failure.
        reason: String,
    },

    /// Function already registered.
    #[error("Function already registered: {module}::{name}")]
    AlreadyRegistered {
        /// The module name.
        module: String,
        /// The function name.
        name: String,
    },

    /// Underlying Wasmtime error.
    #[error("Wasmtime error: {0}")]
    Wasmtime(#[from] wasmtime::Error),
}

impl HostError {
    /// The errno a syscall reports for this error, or `None` if it is fatal.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            HostError::MemoryAccessOutOfBounds { .. } => Some(Errno::Fault),
            HostError::InvalidUtf8(_) => Some(Errno::Ilseq),
            HostError::Vfs(err) => Some(Errno::from(err)),
            HostError::Errno(errno) => Some(*errno),
            HostError::MemoryNotFound
            | HostError::ImportResolution { .. }
            | HostError::RegistrationFailed { .. }
            | HostError::AlreadyRegistered { .. }
            | HostError::Wasmtime(_) => None,
        }
    }

    /// Whether this error ends the run instead of returning an errno.
    pub fn is_fatal(&self) -> bool {
        self.errno().is_none()
    }
}

impl From<Errno> for HostError {
    fn from(errno: Errno) -> Self {
        HostError::Errno(errno)
    }
}

/// Result type for host operations.
pub type HostResult<T> = std::result::Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        let err = HostError::from(VfsError::BadDescriptor(7));
        assert_eq!(err.errno(), Some(Errno::Badf));
        assert!(!err.is_fatal());

        let err = HostError::MemoryAccessOutOfBounds {
            offset: 70_000,
            len: 4,
            memory_size: 65_536,
        };
        assert_eq!(err.errno(), Some(Errno::Fault));
        assert_eq!(HostError::from(Errno::Nametoolong).errno(), Some(Errno::Nametoolong));
    }

    #[test]
    fn test_fatal_errors() {
        assert!(HostError::MemoryNotFound.is_fatal());
        assert!(
            HostError::ImportResolution {
                module: "env".into(),
                name: "f".into(),
                reason: "unknown".into(),
            }
            .is_fatal()
        );
    }
}
