//! # Hearth - a minimal WASI preview1 host
//!
//! Hearth runs a single WebAssembly module against an in-memory world: an
//! argument vector, an environment, a descriptor table of virtual files and
//! preopened directories, and captured standard streams. Nothing the guest
//! does can reach the host filesystem, network or clock.
//!
//! ## Features
//!
//! - **Strict imports**: Only the enumerated `wasi_snapshot_preview1`
//!   functions, with exact signatures, are linked
//! - **Virtual files**: Every byte a guest can read was handed to the host
//!   up front
//! - **Resource control**: Memory limits and fuel-based CPU limits
//! - **Observability**: Per-syscall metrics, run reports and lifecycle events
//!
//! ## Quick Start
//!
//! ```
//! use hearth::prelude::*;
//!
//! let runtime = Hearth::builder()
//!     .with_memory_limit(16 * 1024 * 1024)
//!     .with_fuel_limit(1_000_000)
//!     .build()
//!     .unwrap();
//!
//! let wasm = wat::parse_str(r#"
//!     (module
//!         (import "wasi_snapshot_preview1" "fd_write"
//!             (func $fd_write (param i32 i32 i32 i32) (result i32)))
//!         (memory (export "memory") 1)
//!         (data (i32.const 8) "hello\n")
//!         (func (export "_start")
//!             (i32.store (i32.const 0) (i32.const 8))
//!             (i32.store (i32.const 4) (i32.const 6))
//!             (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 20)))))
//! "#).unwrap();
//!
//! let mut host = runtime.host(RunConfig::new().with_arg("hello")).unwrap();
//! let outcome = host.run(&mut BytesSource::new("hello.wasm", wasm)).unwrap();
//!
//! assert_eq!(outcome, RunOutcome::Exited(0));
//! assert_eq!(host.stdout(), b"hello\n");
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Your Application                     │
//! ├─────────────────────────────────────────────────────────┤
//! │                     hearth (facade)                     │
//! │          ┌────────────────┬──────────────────┐          │
//! │          │ HearthRuntime  │   HostRuntime    │          │
//! │          └───────┬────────┴────────┬─────────┘          │
//! │  ┌─────────────┬─┴───────────┬─────┴───────┬─────────┐  │
//! │  │ hearth-core │ hearth-host │ hearth-vfs  │ observe │  │
//! │  │ (engine,    │ (WASI ABI,  │ (files,     │ (report,│  │
//! │  │  modules)   │  syscalls)  │  fd table)  │  events)│  │
//! │  └─────────────┴─────────────┴─────────────┴─────────┘  │
//! ├─────────────────────────────────────────────────────────┤
//! │                        Wasmtime                         │
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::path::Path;
use std::sync::Arc;

use hearth_core::{
    EngineConfig, HearthEngine, ModuleLoader, ResourceLimits, SharedEngine, ValidatedModule,
};
use hearth_observe::{EventDispatcher, EventSubscriber};

pub mod config;
pub mod error;
pub mod runtime;

pub use config::RunConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{ENTRY_POINT, HostRuntime, RunOutcome, RunState, RuntimeState};

// Re-export from sub-crates
pub use hearth_core;
pub use hearth_host;
pub use hearth_observe;
pub use hearth_vfs;

/// Main entry point for Hearth.
pub struct Hearth;

impl Hearth {
    /// Create a new Hearth runtime builder.
    pub fn builder() -> HearthBuilder {
        HearthBuilder::new()
    }

    /// Create a runtime with default configuration.
    pub fn with_defaults() -> RuntimeResult<HearthRuntime> {
        HearthBuilder::new().build()
    }
}

/// Builder for configuring the Hearth runtime.
pub struct HearthBuilder {
    engine_config: EngineConfig,
    resource_limits: ResourceLimits,
    event_subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl HearthBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            engine_config: EngineConfig::default(),
            resource_limits: ResourceLimits::default(),
            event_subscribers: Vec::new(),
        }
    }

    // Engine configuration

    /// Replace the engine configuration.
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Enable or disable fuel accounting.
    pub fn with_fuel(mut self, enabled: bool) -> Self {
        self.engine_config.fuel_enabled = enabled;
        self
    }

    /// Enable debug info for better trap backtraces.
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.engine_config.debug_info = enabled;
        self
    }

    // Resource limits

    /// Set the maximum linear memory size in bytes.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.resource_limits.max_memory_bytes = bytes;
        self
    }

    /// Set the fuel budget of each run.
    pub fn with_fuel_limit(mut self, fuel: u64) -> Self {
        self.resource_limits.initial_fuel = fuel;
        self
    }

    /// Set the largest size a guest may grow any virtual file to.
    pub fn with_file_size_limit(mut self, bytes: u64) -> Self {
        self.resource_limits.max_file_bytes = bytes;
        self
    }

    /// Set custom resource limits.
    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    // Observability

    /// Add an event subscriber.
    pub fn with_event_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.event_subscribers.push(subscriber);
        self
    }

    /// Build the runtime.
    pub fn build(self) -> RuntimeResult<HearthRuntime> {
        let engine = HearthEngine::new(self.engine_config)?;

        let event_dispatcher = EventDispatcher::new();
        for subscriber in self.event_subscribers {
            event_dispatcher.subscribe(subscriber);
        }

        Ok(HearthRuntime {
            engine: Arc::new(engine),
            default_limits: self.resource_limits,
            event_dispatcher: Arc::new(event_dispatcher),
        })
    }
}

impl Default for HearthBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured Hearth runtime.
///
/// The runtime is cheap to share: it holds the compiled-code engine and the
/// defaults. Every call to [`HearthRuntime::host`] starts a fresh, isolated
/// run.
pub struct HearthRuntime {
    engine: SharedEngine,
    default_limits: ResourceLimits,
    event_dispatcher: Arc<EventDispatcher>,
}

impl HearthRuntime {
    /// Get a reference to the engine.
    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Get the default resource limits.
    pub fn default_limits(&self) -> &ResourceLimits {
        &self.default_limits
    }

    /// Get the event dispatcher.
    pub fn event_dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.event_dispatcher
    }

    /// Create a module loader.
    pub fn loader(&self) -> ModuleLoader {
        ModuleLoader::new(Arc::clone(&self.engine))
    }

    /// Load a module from bytes.
    pub fn load_bytes(&self, bytes: &[u8]) -> RuntimeResult<ValidatedModule> {
        Ok(self.loader().load_bytes(bytes)?)
    }

    /// Load a module from a file.
    pub fn load_file(&self, path: impl AsRef<Path>) -> RuntimeResult<ValidatedModule> {
        Ok(self.loader().load_file(path.as_ref())?)
    }

    /// Load a module from WAT text format.
    pub fn load_wat(&self, wat: &str) -> RuntimeResult<ValidatedModule> {
        Ok(self.loader().load_wat(wat)?)
    }

    /// Check that a module could run here: every import resolves and
    /// `_start` has type `() -> ()`. Nothing is instantiated.
    pub fn validate(&self, module: &ValidatedModule) -> RuntimeResult<()> {
        let linker = runtime::wasi_linker(&self.engine)?;
        runtime::check_module(&linker, module)
    }

    /// Prepare a fresh run with the given arguments, environment and
    /// descriptors.
    pub fn host(&self, config: RunConfig) -> RuntimeResult<HostRuntime> {
        HostRuntime::new(
            Arc::clone(&self.engine),
            self.default_limits.clone(),
            Arc::clone(&self.event_dispatcher),
            config,
        )
    }
}

impl std::fmt::Debug for HearthRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HearthRuntime")
            .field("engine", &self.engine)
            .field("default_limits", &self.default_limits)
            .finish()
    }
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Main types
    pub use crate::{
        Hearth, HearthBuilder, HearthRuntime, HostRuntime, RunConfig, RunOutcome, RuntimeError,
        RuntimeState,
    };

    // Core types
    pub use hearth_core::{
        BytesSource, EngineConfig, FileSource, ModuleLoader, ModuleSource, ReaderSource,
        ResourceLimits, TrapInfo, ValidatedModule,
    };

    // Virtual resources
    pub use hearth_vfs::{DescriptorInit, VirtualFile};

    // Observability types
    pub use hearth_observe::{
        CollectingSubscriber, EventDispatcher, EventSubscriber, ExecutionOutcome,
        LoggingSubscriber, RunReport, RuntimeEvent,
    };

    // Common std types
    pub use std::sync::Arc;
}
