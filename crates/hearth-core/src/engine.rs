//! Wasmtime engine wrapper for Hearth.
//!
//! This module provides the `HearthEngine` type, which wraps the Wasmtime
//! engine with Hearth-specific configuration.

use std::sync::Arc;

use tracing::info;
use wasmtime::{Config, Engine};

use crate::config::EngineConfig;
use crate::error::EngineResult;

/// The core Hearth engine that wraps Wasmtime.
///
/// One engine compiles any number of modules; each run gets its own store.
///
/// # Example
///
/// ```
/// use hearth_core::{EngineConfig, HearthEngine};
///
/// let engine = HearthEngine::new(EngineConfig::default()).unwrap();
/// assert!(engine.fuel_enabled());
/// ```
pub struct HearthEngine {
    /// The underlying Wasmtime engine.
    inner: Engine,
    /// Configuration used to create this engine.
    config: EngineConfig,
}

impl HearthEngine {
    /// Create a new Hearth engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime engine cannot be created with
    /// the given configuration.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.consume_fuel(config.fuel_enabled);
        wasmtime_config.max_wasm_stack(config.max_wasm_stack);
        wasmtime_config.debug_info(config.debug_info);
        wasmtime_config.wasm_backtrace(true);

        // WASI preview1 guests are core modules run synchronously.
        wasmtime_config.async_support(false);
        wasmtime_config.wasm_component_model(false);
        wasmtime_config.wasm_bulk_memory(true);
        wasmtime_config.wasm_multi_value(true);
        wasmtime_config.wasm_reference_types(true);
        wasmtime_config.wasm_simd(true);

        let inner = Engine::new(&wasmtime_config)?;

        info!(
            fuel = config.fuel_enabled,
            max_wasm_stack = config.max_wasm_stack,
            "Created Hearth engine"
        );

        Ok(Self { inner, config })
    }

    /// Create a new engine with default configuration.
    pub fn default_engine() -> EngineResult<Self> {
        Self::new(EngineConfig::default())
    }

    /// Get a reference to the underlying Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.inner
    }

    /// Get the configuration used to create this engine.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check if fuel-based limiting is enabled.
    pub fn fuel_enabled(&self) -> bool {
        self.config.fuel_enabled
    }
}

impl std::fmt::Debug for HearthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HearthEngine")
            .field("config", &self.config)
            .finish()
    }
}

/// A shared reference to a Hearth engine.
pub type SharedEngine = Arc<HearthEngine>;

/// Extension trait for creating shared engines.
pub trait IntoShared {
    /// Convert into a shared engine reference.
    fn into_shared(self) -> SharedEngine;
}

impl IntoShared for HearthEngine {
    fn into_shared(self) -> SharedEngine {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation() {
        let engine = HearthEngine::new(EngineConfig::default()).unwrap();
        assert!(engine.fuel_enabled());
    }

    #[test]
    fn test_engine_without_fuel() {
        let engine = HearthEngine::new(EngineConfig::unmetered()).unwrap();
        assert!(!engine.fuel_enabled());
        assert_eq!(engine.config().max_wasm_stack, 2 * 1024 * 1024);
    }

    #[test]
    fn test_shared_engine() {
        let engine = HearthEngine::default_engine().unwrap().into_shared();
        let other = Arc::clone(&engine);

        assert!(Arc::ptr_eq(&engine, &other));
        assert!(other.fuel_enabled());
    }
}
