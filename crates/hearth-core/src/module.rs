//! WASM module loading and validation.
//!
//! This module provides types for loading, validating, and inspecting
//! WebAssembly modules before they are linked against the host.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use wasmtime::{ExternType, FuncType, Module, ValType};

use crate::engine::HearthEngine;
use crate::error::{ModuleError, ModuleResult};
use crate::source::{FileSource, ModuleSource};

/// A compiled WebAssembly module ready for instantiation.
///
/// `ValidatedModule` wraps a Wasmtime module with metadata extracted at
/// load time, so imports can be checked before anything is instantiated.
#[derive(Clone)]
pub struct ValidatedModule {
    /// The underlying Wasmtime module.
    inner: Module,
    /// Metadata extracted from the module.
    metadata: ModuleMetadata,
}

impl ValidatedModule {
    /// Get a reference to the underlying Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }

    /// Get the module metadata.
    pub fn metadata(&self) -> &ModuleMetadata {
        &self.metadata
    }

    /// Get the module name, if set.
    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    /// Get the list of exports.
    pub fn exports(&self) -> &[ExportInfo] {
        &self.metadata.exports
    }

    /// Get the list of imports.
    pub fn imports(&self) -> &[ImportInfo] {
        &self.metadata.imports
    }

    /// Check if the module has a specific export.
    pub fn has_export(&self, name: &str) -> bool {
        self.export(name).is_some()
    }

    /// Look up an export by name.
    pub fn export(&self, name: &str) -> Option<&ExportInfo> {
        self.metadata.exports.iter().find(|e| e.name == name)
    }

    /// Check if the module requires a specific import.
    pub fn requires_import(&self, module: &str, name: &str) -> bool {
        self.metadata
            .imports
            .iter()
            .any(|i| i.module == module && i.name == name)
    }
}

impl std::fmt::Debug for ValidatedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedModule")
            .field("name", &self.metadata.name)
            .field("exports", &self.metadata.exports.len())
            .field("imports", &self.metadata.imports.len())
            .finish()
    }
}

/// Metadata extracted from a WASM module.
#[derive(Debug, Clone, Default)]
pub struct ModuleMetadata {
    /// Module name, if specified.
    pub name: Option<String>,
    /// Size of the module binary in bytes.
    pub size: usize,
    /// List of exported items.
    pub exports: Vec<ExportInfo>,
    /// List of required imports.
    pub imports: Vec<ImportInfo>,
    /// Exported memories.
    pub memories: Vec<MemoryInfo>,
}

/// A WebAssembly value type, as far as import checking cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WasmValType {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 128-bit vector.
    V128,
    /// Any reference type.
    Ref,
}

impl From<ValType> for WasmValType {
    fn from(ty: ValType) -> Self {
        match ty {
            ValType::I32 => WasmValType::I32,
            ValType::I64 => WasmValType::I64,
            ValType::F32 => WasmValType::F32,
            ValType::F64 => WasmValType::F64,
            ValType::V128 => WasmValType::V128,
            ValType::Ref(_) => WasmValType::Ref,
        }
    }
}

impl std::fmt::Display for WasmValType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WasmValType::I32 => "i32",
            WasmValType::I64 => "i64",
            WasmValType::F32 => "f32",
            WasmValType::F64 => "f64",
            WasmValType::V128 => "v128",
            WasmValType::Ref => "ref",
        };
        f.write_str(name)
    }
}

/// Parameter and result types of a function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncSignature {
    /// Parameter types, in order.
    pub params: Vec<WasmValType>,
    /// Result types, in order.
    pub results: Vec<WasmValType>,
}

impl FuncSignature {
    /// Build a signature from slices.
    pub fn new(params: &[WasmValType], results: &[WasmValType]) -> Self {
        Self {
            params: params.to_vec(),
            results: results.to_vec(),
        }
    }

    fn of(func: &FuncType) -> Self {
        Self {
            params: func.params().map(WasmValType::from).collect(),
            results: func.results().map(WasmValType::from).collect(),
        }
    }
}

impl std::fmt::Display for FuncSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |types: &[WasmValType]| {
            types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "({}) -> ({})", join(&self.params), join(&self.results))
    }
}

/// Information about an exported item.
#[derive(Debug, Clone)]
pub struct ExportInfo {
    /// Export name.
    pub name: String,
    /// Type of the export.
    pub kind: ExportKind,
}

/// The kind of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportKind {
    /// A function export.
    Function(FuncSignature),
    /// A memory export.
    Memory,
    /// A global export.
    Global,
    /// A table export.
    Table,
}

/// Information about a required import.
#[derive(Debug, Clone)]
pub struct ImportInfo {
    /// Import module name.
    pub module: String,
    /// Import name.
    pub name: String,
    /// Type of the import.
    pub kind: ImportKind,
}

/// The kind of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// A function import.
    Function(FuncSignature),
    /// A memory import.
    Memory,
    /// A global import.
    Global,
    /// A table import.
    Table,
}

/// Information about a memory definition.
#[derive(Debug, Clone)]
pub struct MemoryInfo {
    /// Export name of the memory.
    pub name: String,
    /// Minimum memory size in pages (64KB each).
    pub min_pages: u64,
    /// Maximum memory size in pages, if specified.
    pub max_pages: Option<u64>,
    /// Whether this is a 64-bit memory.
    pub memory64: bool,
}

/// Loader for WASM modules.
///
/// `ModuleLoader` compiles module bytes with a shared engine. Anything that
/// fails to parse or validate is reported as [`ModuleError::Invalid`].
pub struct ModuleLoader {
    /// Reference to the engine used for compilation.
    engine: Arc<HearthEngine>,
}

impl ModuleLoader {
    /// Create a new module loader with the given engine.
    pub fn new(engine: Arc<HearthEngine>) -> Self {
        Self { engine }
    }

    /// Load and validate a module from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid WASM module.
    pub fn load_bytes(&self, bytes: &[u8]) -> ModuleResult<ValidatedModule> {
        debug!(size = bytes.len(), "Loading WASM module from bytes");

        let module = Module::from_binary(self.engine.inner(), bytes)
            .map_err(|e| ModuleError::Invalid(format!("{e:#}")))?;
        let metadata = extract_metadata(&module, bytes.len());

        info!(
            name = ?metadata.name,
            exports = metadata.exports.len(),
            imports = metadata.imports.len(),
            "Loaded WASM module"
        );

        Ok(ValidatedModule {
            inner: module,
            metadata,
        })
    }

    /// Fetch bytes from `source` and load them.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Fetch`] if the source fails and
    /// [`ModuleError::Invalid`] if the bytes are not a module.
    pub fn load_source(&self, source: &mut dyn ModuleSource) -> ModuleResult<ValidatedModule> {
        let source_name = source.describe();
        debug!(source = %source_name, "Fetching WASM module");

        let bytes = source
            .fetch()
            .map_err(|error| ModuleError::Fetch { source_name, error })?;
        self.load_bytes(&bytes)
    }

    /// Load and validate a module from a file.
    pub fn load_file(&self, path: &Path) -> ModuleResult<ValidatedModule> {
        self.load_source(&mut FileSource::new(path))
    }

    /// Load and validate a module from WAT (WebAssembly Text) format.
    ///
    /// This is primarily useful for testing and development.
    pub fn load_wat(&self, wat: &str) -> ModuleResult<ValidatedModule> {
        debug!(size = wat.len(), "Loading WASM module from WAT");

        let wasm = wat::parse_str(wat).map_err(|e| ModuleError::Invalid(e.to_string()))?;
        self.load_bytes(&wasm)
    }
}

fn extract_metadata(module: &Module, size: usize) -> ModuleMetadata {
    let name = module.name().map(String::from);

    let exports = module
        .exports()
        .map(|export| ExportInfo {
            name: export.name().to_string(),
            kind: match export.ty() {
                ExternType::Func(func) => ExportKind::Function(FuncSignature::of(&func)),
                ExternType::Memory(_) => ExportKind::Memory,
                ExternType::Global(_) => ExportKind::Global,
                ExternType::Table(_) => ExportKind::Table,
            },
        })
        .collect();

    let imports = module
        .imports()
        .map(|import| ImportInfo {
            module: import.module().to_string(),
            name: import.name().to_string(),
            kind: match import.ty() {
                ExternType::Func(func) => ImportKind::Function(FuncSignature::of(&func)),
                ExternType::Memory(_) => ImportKind::Memory,
                ExternType::Global(_) => ImportKind::Global,
                ExternType::Table(_) => ImportKind::Table,
            },
        })
        .collect();

    let memories = module
        .exports()
        .filter_map(|export| match export.ty() {
            ExternType::Memory(mem) => Some(MemoryInfo {
                name: export.name().to_string(),
                min_pages: mem.minimum(),
                max_pages: mem.maximum(),
                memory64: mem.is_64(),
            }),
            _ => None,
        })
        .collect();

    ModuleMetadata {
        name,
        size,
        exports,
        imports,
        memories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::source::BytesSource;

    fn create_loader() -> ModuleLoader {
        let engine = Arc::new(HearthEngine::new(EngineConfig::default()).unwrap());
        ModuleLoader::new(engine)
    }

    #[test]
    fn test_load_simple_module() {
        let loader = create_loader();

        let module = loader
            .load_wat(
                r#"
            (module
                (memory (export "memory") 1)
                (func (export "_start"))
            )
        "#,
            )
            .unwrap();

        assert!(module.has_export("_start"));
        assert!(module.has_export("memory"));
        assert_eq!(module.imports().len(), 0);
        assert_eq!(
            module.export("_start").unwrap().kind,
            ExportKind::Function(FuncSignature::default())
        );
    }

    #[test]
    fn test_import_signatures_are_recorded() {
        let loader = create_loader();

        let module = loader
            .load_wat(
                r#"
            (module
                (import "wasi_snapshot_preview1" "fd_seek"
                    (func (param i32 i64 i32 i32) (result i32)))
                (import "wasi_snapshot_preview1" "proc_exit" (func (param i32)))
            )
        "#,
            )
            .unwrap();

        assert!(module.requires_import("wasi_snapshot_preview1", "proc_exit"));
        assert_eq!(
            module.imports()[0].kind,
            ImportKind::Function(FuncSignature::new(
                &[
                    WasmValType::I32,
                    WasmValType::I64,
                    WasmValType::I32,
                    WasmValType::I32
                ],
                &[WasmValType::I32],
            ))
        );
    }

    #[test]
    fn test_signature_display() {
        let sig = FuncSignature::new(&[WasmValType::I32, WasmValType::I64], &[WasmValType::I32]);
        assert_eq!(sig.to_string(), "(i32, i64) -> (i32)");
    }

    #[test]
    fn test_load_module_with_memory() {
        let loader = create_loader();

        let module = loader
            .load_wat(r#"(module (memory (export "memory") 1 10))"#)
            .unwrap();

        let memories = &module.metadata().memories;
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].name, "memory");
        assert_eq!(memories[0].min_pages, 1);
        assert_eq!(memories[0].max_pages, Some(10));
    }

    #[test]
    fn test_load_invalid_module() {
        let loader = create_loader();

        let result = loader.load_bytes(&[0, 1, 2, 3]);
        assert!(matches!(result, Err(ModuleError::Invalid(_))));
    }

    #[test]
    fn test_text_is_not_a_binary_module() {
        let loader = create_loader();

        let mut source = BytesSource::new("page", b"<html>not a module</html>".to_vec());
        let result = loader.load_source(&mut source);
        assert!(matches!(result, Err(ModuleError::Invalid(_))));
    }

    #[test]
    fn test_fetch_failure_is_reported() {
        let loader = create_loader();

        let result = loader.load_file(Path::new("/no/such/module.wasm"));
        assert!(matches!(result, Err(ModuleError::Fetch { .. })));
    }
}
