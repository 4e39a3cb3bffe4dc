//! Errors from the Hearth runtime.

use hearth_core::{EngineError, ModuleError};
use hearth_host::HostError;

/// Errors from the Hearth runtime.
///
/// None of these describe guest behaviour: a guest that traps or exits with
/// a non-zero code still produces an `Ok` [`crate::RunOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Engine error.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The module could not be fetched or is not valid WebAssembly.
    #[error("Load error: {0}")]
    Load(#[from] ModuleError),

    /// A module import is not provided by the host.
    #[error("Cannot resolve import '{module}::{name}': {reason}")]
    ImportResolution {
        /// The import module name.
        module: String,
        /// The import name.
        name: String,
        /// Why the import was rejected.
        reason: String,
    },

    /// The module has no usable `_start` export.
    #[error("Missing entry point: {0}")]
    MissingEntryPoint(String),

    /// An operation was called in the wrong lifecycle state.
    #[error("Cannot {operation} in state {actual}; expected {expected}")]
    InvalidState {
        /// The operation that was refused.
        operation: &'static str,
        /// The state the operation requires.
        expected: &'static str,
        /// The state the runtime was in.
        actual: String,
    },

    /// Wasmtime refused to instantiate the module.
    #[error("Instantiation failed: {0:#}")]
    Instantiation(#[source] wasmtime::Error),

    /// Host function setup failed.
    #[error("Host error: {0}")]
    Host(HostError),
}

impl From<HostError> for RuntimeError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::ImportResolution {
                module,
                name,
                reason,
            } => RuntimeError::ImportResolution {
                module,
                name,
                reason,
            },
            other => RuntimeError::Host(other),
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
