//! Hearth Host Function System
//!
//! This crate binds the `wasi_snapshot_preview1` syscall surface to the
//! in-memory resources of `hearth-vfs`. It includes:
//!
//! - [`HostLinker`]: Wrapper around Wasmtime's Linker that checks imports
//! - [`HostContext`] and [`GuestMemory`]: Bounds-checked guest memory access
//! - [`WASI_IMPORTS`]: The enumerated table of functions a guest may import
//! - [`add_to_linker`]: The syscall implementations
//!
//! # Import Resolution
//!
//! Guests may only import functions listed in [`WASI_IMPORTS`], with exactly
//! the listed signatures. [`HostLinker::resolve_imports`] checks a module
//! before it is instantiated, so a module asking for anything else is
//! rejected before any of its code runs.
//!
//! # Example
//!
//! ```
//! use hearth_core::{HearthEngine, ModuleLoader, IntoShared};
//! use hearth_host::{HostLinker, WasiCtx, add_to_linker};
//!
//! let engine = HearthEngine::default_engine().unwrap().into_shared();
//! let module = ModuleLoader::new(engine.clone())
//!     .load_wat(r#"(module (import "wasi_snapshot_preview1" "sock_accept"
//!         (func (param i32 i32 i32) (result i32))))"#)
//!     .unwrap();
//!
//! let mut linker = HostLinker::<WasiCtx>::new(engine.inner());
//! add_to_linker(&mut linker).unwrap();
//! assert!(linker.resolve_imports(&module).is_err());
//! ```

pub mod abi;
pub mod context;
pub mod error;
pub mod linker;
pub mod wasi;

// Re-export main types
pub use abi::{Errno, FdFlags, OFlags, WASI_IMPORTS, WASI_MODULE, WasiImport, wasi_import};
pub use context::{GuestMemory, HostContext, IntoHostContext};
pub use error::{HostError, HostResult};
pub use linker::{HostLinker, RegisteredFunction};
pub use wasi::{ProcExit, WasiCtx, WasiView, add_to_linker};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::abi::Errno;
    pub use crate::error::{HostError, HostResult};
    pub use crate::linker::HostLinker;
    pub use crate::wasi::{ProcExit, WasiCtx, WasiView, add_to_linker};
}
