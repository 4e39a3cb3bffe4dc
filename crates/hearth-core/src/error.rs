//! Core error types for Hearth.
//!
//! Engine and module errors are fatal to a run: they happen before any guest
//! code executes. Guest-side failures are not errors at this level; they are
//! described by [`TrapInfo`] and surface as a trapped outcome.

use thiserror::Error;

/// Top-level error type for Hearth core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error during engine creation or configuration.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Error during module loading or validation.
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),
}

/// Errors during engine creation and configuration.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid engine configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying Wasmtime error.
    #[error("Wasmtime error: {0}")]
    Wasmtime(#[from] wasmtime::Error),
}

/// Errors while fetching and compiling a module.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The bytes are not a valid WebAssembly module.
    #[error("Invalid WASM module: {0}")]
    Invalid(String),

    /// The module source could not deliver its bytes.
    #[error("Failed to fetch module from {source_name}: {error}")]
    Fetch {
        /// Description of the source.
        source_name: String,
        /// The underlying I/O failure.
        #[source]
        error: std::io::Error,
    },

    /// Underlying Wasmtime error.
    #[error("Wasmtime error: {0}")]
    Wasmtime(#[from] wasmtime::Error),
}

/// Information about a trap raised while guest code was running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapInfo {
    /// The trap code name, if available.
    pub code: Option<String>,
    /// Human-readable trap message.
    pub message: String,
    /// Guest stack backtrace, if available.
    pub backtrace: Option<String>,
}

impl TrapInfo {
    /// A trap caused by the host refusing to continue.
    pub fn host(message: impl Into<String>) -> Self {
        Self {
            code: Some("host".to_string()),
            message: message.into(),
            backtrace: None,
        }
    }

    /// Describe an error returned from a guest call.
    pub fn from_error(err: &wasmtime::Error) -> Self {
        let backtrace = err
            .downcast_ref::<wasmtime::WasmBacktrace>()
            .map(|bt| bt.to_string());

        match err.downcast_ref::<wasmtime::Trap>() {
            Some(trap) => Self {
                backtrace,
                ..Self::from(*trap)
            },
            None => Self {
                code: None,
                message: format!("{err:#}"),
                backtrace,
            },
        }
    }

    /// Whether the guest ran out of fuel.
    pub fn is_out_of_fuel(&self) -> bool {
        self.code.as_deref() == Some("OutOfFuel")
    }
}

impl std::fmt::Display for TrapInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "[{}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for TrapInfo {}

impl From<wasmtime::Trap> for TrapInfo {
    fn from(trap: wasmtime::Trap) -> Self {
        Self {
            code: Some(format!("{trap:?}")),
            message: trap.to_string(),
            backtrace: None,
        }
    }
}

/// Result type alias for Hearth core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result type alias for module operations.
pub type ModuleResult<T> = std::result::Result<T, ModuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trap_info_from_trap() {
        let info = TrapInfo::from(wasmtime::Trap::UnreachableCodeReached);
        assert_eq!(info.code.as_deref(), Some("UnreachableCodeReached"));
        assert!(info.to_string().starts_with("[UnreachableCodeReached]"));
    }

    #[test]
    fn test_trap_info_out_of_fuel() {
        assert!(TrapInfo::from(wasmtime::Trap::OutOfFuel).is_out_of_fuel());
        assert!(!TrapInfo::host("boom").is_out_of_fuel());
    }

    #[test]
    fn test_core_error_wraps_module_error() {
        let err: CoreError = ModuleError::Invalid("bad magic".to_string()).into();
        assert!(matches!(err, CoreError::Module(ModuleError::Invalid(_))));
        assert_eq!(err.to_string(), "Module error: Invalid WASM module: bad magic");
    }

    #[test]
    fn test_trap_info_from_plain_error() {
        let err = wasmtime::Error::msg("host gave up");
        let info = TrapInfo::from_error(&err);
        assert_eq!(info.code, None);
        assert_eq!(info.message, "host gave up");
    }
}
