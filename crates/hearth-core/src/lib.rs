//! Hearth Core - engine and module loading
//!
//! This crate holds the pieces of the Hearth WASI host that know nothing
//! about WASI itself:
//!
//! - [`HearthEngine`]: The Wasmtime engine with Hearth's feature set
//! - [`ModuleLoader`]: Compiling and inspecting WASM modules
//! - [`ModuleSource`]: Where module bytes come from
//! - Configuration types for engine features and per-run limits
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use hearth_core::prelude::*;
//!
//! let engine = HearthEngine::default_engine().unwrap().into_shared();
//! let loader = ModuleLoader::new(Arc::clone(&engine));
//!
//! let module = loader
//!     .load_wat(r#"(module (memory (export "memory") 1) (func (export "_start")))"#)
//!     .unwrap();
//! assert!(module.has_export("_start"));
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            hearth-cli / app             │
//! ├─────────────────────────────────────────┤
//! │            hearth (facade)              │
//! ├─────────────────────────────────────────┤
//! │ hearth-core │ hearth-host │ hearth-vfs  │
//! ├─────────────────────────────────────────┤
//! │              Wasmtime                   │
//! └─────────────────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod module;
pub mod source;

// Re-export main types at crate root
pub use config::{EngineConfig, ResourceLimits, WASM_PAGE_SIZE};
pub use engine::{HearthEngine, IntoShared, SharedEngine};
pub use error::{
    CoreError, CoreResult, EngineError, EngineResult, ModuleError, ModuleResult, TrapInfo,
};
pub use module::{
    ExportInfo, ExportKind, FuncSignature, ImportInfo, ImportKind, MemoryInfo, ModuleLoader,
    ModuleMetadata, ValidatedModule, WasmValType,
};
pub use source::{BytesSource, FileSource, ModuleSource, ReaderSource};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{EngineConfig, ResourceLimits};
    pub use crate::engine::{HearthEngine, IntoShared, SharedEngine};
    pub use crate::error::{CoreError, ModuleError, TrapInfo};
    pub use crate::module::{ModuleLoader, ValidatedModule};
    pub use crate::source::ModuleSource;
}
