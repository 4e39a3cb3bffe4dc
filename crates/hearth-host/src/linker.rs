//! Linker wrapper with an explicit import registry.
//!
//! This module provides the `HostLinker` type which wraps Wasmtime's `Linker`
//! and remembers the signature of every host function it defines, so a
//! module's imports can be checked before instantiation.

use hearth_core::{FuncSignature, ImportKind, ValidatedModule};
use tracing::{debug, info};
use wasmtime::{Engine, Linker};

use crate::error::{HostError, HostResult};

/// Information about a registered host function.
#[derive(Debug, Clone)]
pub struct RegisteredFunction {
    /// The import module name.
    pub module: String,
    /// The function name.
    pub name: String,
    /// Parameter and result types the guest must import it with.
    pub signature: FuncSignature,
}

/// A wrapper around Wasmtime's `Linker` that tracks what it provides.
///
/// Every function is registered together with its signature. Modules are
/// checked against this registry with [`HostLinker::resolve_imports`], which
/// turns the first missing or mismatched import into a
/// [`HostError::ImportResolution`].
pub struct HostLinker<T> {
    /// The underlying Wasmtime linker.
    inner: Linker<T>,
    /// Registry of registered functions.
    registered: Vec<RegisteredFunction>,
}

impl<T> HostLinker<T> {
    /// Create a new linker for the given engine.
    pub fn new(engine: &Engine) -> Self {
        Self {
            inner: Linker::new(engine),
            registered: Vec::new(),
        }
    }

    /// Get a reference to the underlying Wasmtime linker.
    pub fn inner(&self) -> &Linker<T> {
        &self.inner
    }

    /// Consume this linker and return the underlying Wasmtime linker.
    pub fn into_inner(self) -> Linker<T> {
        self.inner
    }

    /// Get the list of registered functions.
    pub fn registered_functions(&self) -> &[RegisteredFunction] {
        &self.registered
    }

    /// Look up a registered function.
    pub fn lookup(&self, module: &str, name: &str) -> Option<&RegisteredFunction> {
        self.registered
            .iter()
            .find(|f| f.module == module && f.name == name)
    }

    /// Check if a function is already registered.
    pub fn is_registered(&self, module: &str, name: &str) -> bool {
        self.lookup(module, name).is_some()
    }

    /// Register a host function.
    ///
    /// `signature` must describe `func`; it is what module imports are
    /// checked against.
    pub fn func_wrap<Params, Results>(
        &mut self,
        module: &str,
        name: &str,
        signature: FuncSignature,
        func: impl wasmtime::IntoFunc<T, Params, Results>,
    ) -> HostResult<&mut Self>
    where
        T: 'static,
    {
        if self.is_registered(module, name) {
            return Err(HostError::AlreadyRegistered {
                module: module.to_string(),
                name: name.to_string(),
            });
        }

        self.inner
            .func_wrap(module, name, func)
            .map_err(|e| HostError::RegistrationFailed {
                module: module.to_string(),
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        debug!(module, name, %signature, "Registered host function");

        self.registered.push(RegisteredFunction {
            module: module.to_string(),
            name: name.to_string(),
            signature,
        });

        Ok(self)
    }

    /// Check every import of `module` against the registry.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ImportResolution`] for the first import that is
    /// not a registered function with exactly the registered signature.
    pub fn resolve_imports(&self, module: &ValidatedModule) -> HostResult<()> {
        for import in module.imports() {
            let reject = |reason: String| HostError::ImportResolution {
                module: import.module.clone(),
                name: import.name.clone(),
                reason,
            };

            let Some(registered) = self.lookup(&import.module, &import.name) else {
                return Err(reject("no host function provides this import".to_string()));
            };

            match &import.kind {
                ImportKind::Function(signature) if *signature == registered.signature => {}
                ImportKind::Function(signature) => {
                    return Err(reject(format!(
                        "signature mismatch: host provides {}, module expects {}",
                        registered.signature, signature
                    )));
                }
                other => {
                    return Err(reject(format!("expected a function import, found {other:?}")));
                }
            }
        }

        info!(
            module_name = ?module.name(),
            imports = module.imports().len(),
            "Resolved module imports"
        );
        Ok(())
    }
}

impl<T> std::fmt::Debug for HostLinker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostLinker")
            .field("registered_functions", &self.registered.len())
            .finish()
    }
}
