//! The host runtime: one module, one store, one run.

use std::sync::Arc;
use std::time::Instant;

use hearth_core::{
    ExportKind, FuncSignature, ModuleLoader, ModuleSource, ResourceLimits, SharedEngine, TrapInfo,
    ValidatedModule,
};
use hearth_host::{Errno, HostError, HostLinker, ProcExit, WasiCtx, WasiView, add_to_linker};
use hearth_observe::{
    EventDispatcher, ExecutionOutcome, MetricsCollector, ModuleInfo, RunId, RunReport,
    RuntimeEvent,
};
use hearth_vfs::{DescriptorTable, EnvironmentContext, StandardStreams};
use tracing::{debug, info, warn};
use wasmtime::{Instance, Store, StoreLimits, StoreLimitsBuilder, Trap};

use crate::config::RunConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// Name of the entry point export.
pub const ENTRY_POINT: &str = "_start";

/// Where a [`HostRuntime`] is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeState {
    /// No module yet.
    Unloaded,
    /// A module is compiled but not linked.
    Compiled,
    /// Imports resolved and the instance exists.
    Instantiated,
    /// `_start` is executing.
    Running,
    /// The guest finished with an exit code.
    Exited(i32),
    /// The guest trapped.
    Trapped(TrapInfo),
}

impl RuntimeState {
    /// Short state name.
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeState::Unloaded => "Unloaded",
            RuntimeState::Compiled => "Compiled",
            RuntimeState::Instantiated => "Instantiated",
            RuntimeState::Running => "Running",
            RuntimeState::Exited(_) => "Exited",
            RuntimeState::Trapped(_) => "Trapped",
        }
    }

    /// Whether the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RuntimeState::Exited(_) | RuntimeState::Trapped(_))
    }

    /// How the run ended, once it has.
    pub fn outcome(&self) -> Option<RunOutcome> {
        match self {
            RuntimeState::Exited(code) => Some(RunOutcome::Exited(*code)),
            RuntimeState::Trapped(trap) => Some(RunOutcome::Trapped(trap.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeState::Exited(code) => write!(f, "Exited({code})"),
            RuntimeState::Trapped(trap) => write!(f, "Trapped({trap})"),
            other => f.write_str(other.name()),
        }
    }
}

/// How a started guest finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Returned from `_start` (code 0) or called `proc_exit`.
    Exited(i32),
    /// Trapped, ran out of fuel, or hit a fatal host error.
    Trapped(TrapInfo),
}

impl RunOutcome {
    /// Process exit status: the low 8 bits of the guest's code, or 134 for a
    /// trap. A nonzero code whose low 8 bits are all zero maps to 1, so a
    /// failing guest never reports success.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Exited(0) => 0,
            RunOutcome::Exited(code) => match code & 0xff {
                0 => 1,
                status => status,
            },
            RunOutcome::Trapped(_) => 134,
        }
    }

    /// Classify an error raised while guest code was running.
    fn from_guest_error(err: &wasmtime::Error) -> Self {
        match err.downcast_ref::<ProcExit>() {
            Some(ProcExit(code)) => RunOutcome::Exited(*code),
            None => RunOutcome::Trapped(TrapInfo::from_error(err)),
        }
    }

    /// Whether the guest exited with status 0.
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Exited(0))
    }
}

impl From<&RunOutcome> for ExecutionOutcome {
    fn from(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Exited(code) => ExecutionOutcome::Exited { code: *code },
            RunOutcome::Trapped(trap) => ExecutionOutcome::Trapped {
                code: trap.code.clone(),
                message: trap.message.clone(),
            },
        }
    }
}

/// Store data of a run.
pub struct RunState {
    /// Descriptors and environment seen by the guest.
    pub wasi: WasiCtx,
    /// Memory and table limits.
    limits: StoreLimits,
    /// Metrics for this run.
    pub metrics: MetricsCollector,
}

impl WasiView for RunState {
    fn ctx(&self) -> &WasiCtx {
        &self.wasi
    }

    fn ctx_mut(&mut self) -> &mut WasiCtx {
        &mut self.wasi
    }

    fn on_syscall(&mut self, name: &'static str, errno: Errno) {
        self.metrics.record_syscall(name, errno != Errno::Success);
    }
}

/// Build a linker with the full WASI surface.
pub(crate) fn wasi_linker(engine: &SharedEngine) -> RuntimeResult<HostLinker<RunState>> {
    let mut linker = HostLinker::new(engine.inner());
    add_to_linker(&mut linker)?;
    Ok(linker)
}

/// Check imports and the entry point without instantiating.
pub(crate) fn check_module(
    linker: &HostLinker<RunState>,
    module: &ValidatedModule,
) -> RuntimeResult<()> {
    linker.resolve_imports(module)?;

    match module.export(ENTRY_POINT).map(|export| &export.kind) {
        Some(ExportKind::Function(signature)) if *signature == FuncSignature::default() => Ok(()),
        Some(ExportKind::Function(signature)) => Err(RuntimeError::MissingEntryPoint(format!(
            "'{ENTRY_POINT}' has signature {signature}, expected () -> ()"
        ))),
        Some(other) => Err(RuntimeError::MissingEntryPoint(format!(
            "'{ENTRY_POINT}' is a {other:?} export, not a function"
        ))),
        None => Err(RuntimeError::MissingEntryPoint(format!(
            "module does not export '{ENTRY_POINT}'"
        ))),
    }
}

/// A single execution of a WASI module.
///
/// The runtime owns one store, one descriptor table and one environment. It
/// moves through `Unloaded → Compiled → Instantiated → Running` and ends in
/// `Exited` or `Trapped`; every operation refuses to run in the wrong state.
///
/// # Example
///
/// ```
/// use hearth::prelude::*;
///
/// let runtime = Hearth::builder().build().unwrap();
/// let mut host = runtime.host(RunConfig::new().with_arg("hello")).unwrap();
///
/// let wat = r#"(module (memory (export "memory") 1) (func (export "_start")))"#;
/// let wasm = wat::parse_str(wat).unwrap();
/// let outcome = host.run(&mut BytesSource::new("hello.wasm", wasm)).unwrap();
///
/// assert_eq!(outcome, RunOutcome::Exited(0));
/// ```
pub struct HostRuntime {
    run_id: RunId,
    engine: SharedEngine,
    limits: ResourceLimits,
    dispatcher: Arc<EventDispatcher>,
    store: Store<RunState>,
    linker: HostLinker<RunState>,
    state: RuntimeState,
    module: Option<ValidatedModule>,
    module_source: Option<String>,
    instance: Option<Instance>,
    malformed_env: Vec<String>,
    failure: Option<String>,
}

impl HostRuntime {
    /// Build the sandboxed environment for one run.
    ///
    /// `default_limits` apply unless `config` carries its own.
    pub fn new(
        engine: SharedEngine,
        default_limits: ResourceLimits,
        dispatcher: Arc<EventDispatcher>,
        config: RunConfig,
    ) -> RuntimeResult<Self> {
        let run_id = RunId::new();
        let limits = config.limits.unwrap_or(default_limits);

        let environment = EnvironmentContext::new(config.args, config.env);
        let malformed_env: Vec<String> = environment.malformed_env().map(String::from).collect();
        for entry in &malformed_env {
            warn!(run_id = %run_id, entry = ?entry, "Environment entry is not KEY=VALUE");
            dispatcher.emit(RuntimeEvent::MalformedEnv {
                run_id,
                entry: entry.clone(),
            });
        }

        let mut streams = StandardStreams::new().with_stdin(config.stdin);
        if let Some(stdout) = config.stdout {
            streams = streams.with_stdout(stdout);
        }
        if let Some(stderr) = config.stderr {
            streams = streams.with_stderr(stderr);
        }
        let descriptors = DescriptorTable::install(streams, config.descriptors)
            .with_max_file_size(limits.max_file_bytes);

        let store_limits = StoreLimitsBuilder::new()
            .memory_size(limits.max_memory_bytes)
            .table_elements(limits.max_table_elements as usize)
            .instances(1)
            .tables(10)
            .memories(limits.max_memories as usize)
            .build();

        let data = RunState {
            wasi: WasiCtx::new(descriptors, environment),
            limits: store_limits,
            metrics: MetricsCollector::new(),
        };

        let mut store = Store::new(engine.inner(), data);
        store.limiter(|state| &mut state.limits);

        if engine.fuel_enabled() {
            store
                .set_fuel(limits.initial_fuel)
                .map_err(RuntimeError::Instantiation)?;
        }

        let linker = wasi_linker(&engine)?;

        info!(run_id = %run_id, "Created host runtime");

        Ok(Self {
            run_id,
            engine,
            limits,
            dispatcher,
            store,
            linker,
            state: RuntimeState::Unloaded,
            module: None,
            module_source: None,
            instance: None,
            malformed_env,
            failure: None,
        })
    }

    /// Unique ID of this run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// The compiled module, once loaded.
    pub fn module(&self) -> Option<&ValidatedModule> {
        self.module.as_ref()
    }

    /// The descriptor table of this run.
    pub fn descriptors(&self) -> &DescriptorTable {
        &self.store.data().wasi.descriptors
    }

    /// The arguments and environment of this run.
    pub fn environment(&self) -> &EnvironmentContext {
        &self.store.data().wasi.environment
    }

    /// Everything the guest wrote to standard output so far.
    pub fn stdout(&self) -> Vec<u8> {
        self.descriptors().stdout().contents()
    }

    /// Everything the guest wrote to standard error so far.
    pub fn stderr(&self) -> Vec<u8> {
        self.descriptors().stderr().contents()
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: RuntimeState,
    ) -> RuntimeResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RuntimeError::InvalidState {
                operation,
                expected: expected.name(),
                actual: self.state.to_string(),
            })
        }
    }

    fn fail<T>(&mut self, err: RuntimeError) -> RuntimeResult<T> {
        let message = err.to_string();
        self.dispatcher.emit(RuntimeEvent::Error {
            run_id: self.run_id,
            message: message.clone(),
        });
        self.failure = Some(message);
        Err(err)
    }

    /// Fetch and compile a module. `Unloaded → Compiled`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Load`] if the bytes cannot be fetched or are not a
    /// valid module; the runtime stays `Unloaded`.
    pub fn load(&mut self, source: &mut dyn ModuleSource) -> RuntimeResult<()> {
        self.expect_state("load", RuntimeState::Unloaded)?;

        let source_name = source.describe();
        let started = Instant::now();
        let loaded = ModuleLoader::new(Arc::clone(&self.engine)).load_source(source);
        self.store
            .data()
            .metrics
            .record_compilation_time(started.elapsed());

        match loaded {
            Ok(module) => {
                self.module_source = Some(source_name);
                self.accept_module(module);
                Ok(())
            }
            Err(err) => self.fail(err.into()),
        }
    }

    /// Use an already compiled module. `Unloaded → Compiled`.
    ///
    /// The module must have been compiled with this runtime's engine.
    pub fn load_module(&mut self, module: ValidatedModule) -> RuntimeResult<()> {
        self.expect_state("load", RuntimeState::Unloaded)?;
        self.accept_module(module);
        Ok(())
    }

    fn accept_module(&mut self, module: ValidatedModule) {
        debug!(
            run_id = %self.run_id,
            module_name = ?module.name(),
            "Module compiled"
        );
        self.dispatcher.emit(RuntimeEvent::ModuleLoaded {
            run_id: self.run_id,
            name: module.name().map(String::from),
            import_count: module.imports().len(),
            export_count: module.exports().len(),
        });
        self.module = Some(module);
        self.state = RuntimeState::Compiled;
    }

    /// Resolve imports and instantiate. `Compiled → Instantiated`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::ImportResolution`] if any import is not in the WASI
    /// table with the exact signature, [`RuntimeError::MissingEntryPoint`]
    /// if `_start` is absent or mistyped. No guest code runs in either case.
    ///
    /// A module with a wasm start function runs it here. If that code calls
    /// `proc_exit` or traps, the run is over: the state becomes `Exited` or
    /// `Trapped`, this returns `Ok`, and [`HostRuntime::start`] is refused.
    pub fn instantiate(&mut self) -> RuntimeResult<()> {
        self.expect_state("instantiate", RuntimeState::Compiled)?;
        let Some(module) = self.module.clone() else {
            return Err(RuntimeError::InvalidState {
                operation: "instantiate",
                expected: "Compiled",
                actual: "Compiled without a module".to_string(),
            });
        };

        let started = Instant::now();
        if let Err(err) = check_module(&self.linker, &module) {
            return self.fail(err);
        }

        let instance = match self.linker.inner().instantiate(&mut self.store, module.inner()) {
            Ok(instance) => instance,
            Err(err) if ran_guest_code(&err) => {
                debug!(run_id = %self.run_id, "Module start function ended the run");
                self.store
                    .data()
                    .metrics
                    .record_instantiation_time(started.elapsed());
                self.finish(RunOutcome::from_guest_error(&err), None);
                return Ok(());
            }
            Err(err) => return self.fail(RuntimeError::Instantiation(err)),
        };
        self.store
            .data()
            .metrics
            .record_instantiation_time(started.elapsed());

        self.instance = Some(instance);
        self.state = RuntimeState::Instantiated;

        info!(run_id = %self.run_id, module_name = ?module.name(), "Module instantiated");
        self.dispatcher.emit(RuntimeEvent::Instantiated {
            run_id: self.run_id,
            descriptors: self.descriptors().len(),
        });
        Ok(())
    }

    /// Call `_start` once. `Instantiated → Running → Exited | Trapped`.
    ///
    /// A trap or a `proc_exit` is an `Ok` outcome; errors are reserved for
    /// calling this in the wrong state.
    pub fn start(&mut self) -> RuntimeResult<RunOutcome> {
        self.expect_state("start", RuntimeState::Instantiated)?;
        let Some(instance) = self.instance else {
            return Err(RuntimeError::InvalidState {
                operation: "start",
                expected: "Instantiated",
                actual: "Instantiated without an instance".to_string(),
            });
        };

        let entry = instance
            .get_typed_func::<(), ()>(&mut self.store, ENTRY_POINT)
            .map_err(|e| RuntimeError::MissingEntryPoint(format!("{e:#}")))?;

        self.state = RuntimeState::Running;
        self.dispatcher.emit(RuntimeEvent::Started {
            run_id: self.run_id,
        });
        debug!(run_id = %self.run_id, "Calling entry point");

        self.store.data().metrics.record_start();
        let result = entry.call(&mut self.store, ());
        self.store.data().metrics.record_end();

        let outcome = match result {
            Ok(()) => RunOutcome::Exited(0),
            Err(err) => RunOutcome::from_guest_error(&err),
        };

        Ok(self.finish(outcome, Some(&instance)))
    }

    fn finish(&mut self, outcome: RunOutcome, instance: Option<&Instance>) -> RunOutcome {
        self.record_final_metrics(instance);

        match &outcome {
            RunOutcome::Exited(code) => {
                info!(run_id = %self.run_id, exit_code = code, "Guest exited");
                self.state = RuntimeState::Exited(*code);
            }
            RunOutcome::Trapped(trap) => {
                warn!(run_id = %self.run_id, trap = %trap, "Guest trapped");
                self.state = RuntimeState::Trapped(trap.clone());
            }
        }

        let duration = self
            .store
            .data()
            .metrics
            .snapshot()
            .timing
            .execution_time;
        self.dispatcher.emit(RuntimeEvent::Finished {
            run_id: self.run_id,
            outcome: ExecutionOutcome::from(&outcome),
            duration,
        });

        outcome
    }

    fn record_final_metrics(&mut self, instance: Option<&Instance>) {
        let remaining = if self.engine.fuel_enabled() {
            self.store.get_fuel().ok()
        } else {
            None
        };
        let memory = instance
            .and_then(|instance| instance.get_memory(&mut self.store, "memory"))
            .map(|memory| memory.data_size(&self.store));

        let state = self.store.data();
        if let Some(remaining) = remaining {
            state
                .metrics
                .record_fuel_consumed(self.limits.initial_fuel, remaining);
        }
        if let Some(bytes) = memory {
            state.metrics.record_final_memory(bytes);
        }
        let descriptors = &state.wasi.descriptors;
        state
            .metrics
            .record_streams(descriptors.stdout().len(), descriptors.stderr().len());
    }

    /// Load, instantiate and start in one go.
    pub fn run(&mut self, source: &mut dyn ModuleSource) -> RuntimeResult<RunOutcome> {
        self.load(source)?;
        self.instantiate()?;
        match self.state.outcome() {
            Some(outcome) => Ok(outcome),
            None => self.start(),
        }
    }

    /// Summarise the run so far.
    pub fn report(&self) -> RunReport {
        let module = self
            .module
            .as_ref()
            .map(|module| ModuleInfo {
                name: module.name().map(String::from),
                source: self.module_source.clone(),
                size: module.metadata().size,
                export_count: module.exports().len(),
                import_count: module.imports().len(),
            })
            .unwrap_or_else(|| ModuleInfo {
                source: self.module_source.clone(),
                ..ModuleInfo::default()
            });

        let outcome = match (&self.state, &self.failure) {
            (RuntimeState::Exited(code), _) => ExecutionOutcome::Exited { code: *code },
            (RuntimeState::Trapped(trap), _) => ExecutionOutcome::Trapped {
                code: trap.code.clone(),
                message: trap.message.clone(),
            },
            (_, Some(message)) => ExecutionOutcome::Error {
                message: message.clone(),
            },
            (state, None) => ExecutionOutcome::Error {
                message: format!("run did not finish (state: {state})"),
            },
        };

        let mut report = RunReport::new(
            self.run_id,
            module,
            outcome,
            self.store.data().metrics.snapshot(),
        );
        for entry in &self.malformed_env {
            report.add_warning(format!("environment entry is not KEY=VALUE: {entry:?}"));
        }
        if let RuntimeState::Trapped(trap) = &self.state {
            if trap.is_out_of_fuel() {
                report.add_error(format!(
                    "fuel limit of {} exhausted",
                    self.limits.initial_fuel
                ));
            }
            if let Some(backtrace) = &trap.backtrace {
                report.add_info(backtrace.clone());
            }
        }
        report
    }
}

/// Whether an instantiation error came from guest code (a start function)
/// rather than from linking or limits.
fn ran_guest_code(err: &wasmtime::Error) -> bool {
    err.downcast_ref::<ProcExit>().is_some()
        || err.downcast_ref::<Trap>().is_some()
        || err.downcast_ref::<HostError>().is_some()
}

impl std::fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRuntime")
            .field("run_id", &self.run_id)
            .field("state", &self.state)
            .field("module", &self.module)
            .finish()
    }
}
