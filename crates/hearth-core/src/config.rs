//! Engine settings and per-run limits.

/// Page size of wasm32 linear memory.
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

/// How the shared Wasmtime engine is built.
///
/// These settings are fixed for every module the engine compiles. Anything
/// that varies per run lives in [`ResourceLimits`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Meter guest instructions with fuel. A run that spends its
    /// [`ResourceLimits::initial_fuel`] traps with `OutOfFuel`.
    pub fuel_enabled: bool,

    /// Guest stack budget in bytes.
    pub max_wasm_stack: usize,

    /// Emit DWARF so trap backtraces name guest functions and lines.
    pub debug_info: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuel_enabled: true,
            max_wasm_stack: 1024 * 1024,
            debug_info: false,
        }
    }
}

impl EngineConfig {
    /// Fuel on, 1 MiB stack, no debug info.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine for trusted guests: no fuel metering, 2 MiB stack.
    pub fn unmetered() -> Self {
        Self {
            fuel_enabled: false,
            max_wasm_stack: 2 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// Toggle fuel metering.
    pub fn with_fuel(mut self, enabled: bool) -> Self {
        self.fuel_enabled = enabled;
        self
    }

    /// Set the guest stack budget.
    pub fn with_max_wasm_stack(mut self, bytes: usize) -> Self {
        self.max_wasm_stack = bytes;
        self
    }

    /// Toggle DWARF generation.
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }
}

/// Limits enforced on one run's store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Cap on the size of each linear memory, in bytes. Instantiation fails
    /// when a module's declared minimum exceeds it; `memory.grow` past it
    /// returns -1 to the guest.
    pub max_memory_bytes: usize,

    /// Number of linear memories a module may define.
    pub max_memories: u32,

    /// Cap on the elements of each table.
    pub max_table_elements: u32,

    /// Fuel given to the store before `_start` runs.
    pub initial_fuel: u64,

    /// Largest size a guest may grow any virtual file to, standard output
    /// and standard error included. Writes past it fail with `FBIG`.
    pub max_file_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: 1024 * WASM_PAGE_SIZE,
            max_memories: 1,
            max_table_elements: 10_000,
            initial_fuel: 1_000_000_000,
            max_file_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ResourceLimits {
    /// 64 MiB of memory, one memory, 10k table elements, 1e9 fuel, 64 MiB files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Small limits for tests and tiny guests: 2 MiB memory and files, 100k fuel.
    pub fn minimal() -> Self {
        Self {
            max_memory_bytes: 32 * WASM_PAGE_SIZE,
            max_table_elements: 1_000,
            initial_fuel: 100_000,
            max_file_bytes: 2 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// Set the memory cap in bytes.
    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    /// Set the memory cap in wasm pages.
    pub fn with_max_pages(self, pages: usize) -> Self {
        self.with_max_memory(pages.saturating_mul(WASM_PAGE_SIZE))
    }

    /// Set the fuel budget.
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.initial_fuel = fuel;
        self
    }

    /// Set the virtual file size cap in bytes.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    /// Set the table element cap.
    pub fn with_max_table_elements(mut self, elements: u32) -> Self {
        self.max_table_elements = elements;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfig::new()
            .with_fuel(false)
            .with_debug_info(true)
            .with_max_wasm_stack(512 * 1024);

        assert!(!config.fuel_enabled);
        assert!(config.debug_info);
        assert_eq!(config.max_wasm_stack, 512 * 1024);
        assert!(!EngineConfig::unmetered().fuel_enabled);
    }

    #[test]
    fn test_resource_limits() {
        let defaults = ResourceLimits::new();
        assert_eq!(defaults.max_memory_bytes, 64 * 1024 * 1024);

        let minimal = ResourceLimits::minimal();
        assert_eq!(minimal.max_memory_bytes, 2 * 1024 * 1024);
        assert_eq!(minimal.max_memories, 1);
        assert_eq!(minimal.max_file_bytes, 2 * 1024 * 1024);
        assert_eq!(defaults.max_file_bytes, 64 * 1024 * 1024);
        assert_eq!(
            ResourceLimits::new().with_max_file_size(1 << 20).max_file_bytes,
            1 << 20
        );

        let paged = ResourceLimits::new().with_max_pages(2).with_fuel(5);
        assert_eq!(paged.max_memory_bytes, 2 * WASM_PAGE_SIZE);
        assert_eq!(paged.initial_fuel, 5);
        assert_eq!(
            ResourceLimits::new().with_max_pages(usize::MAX).max_memory_bytes,
            usize::MAX
        );
    }
}
