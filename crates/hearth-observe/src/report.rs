//! Run reports.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::MetricsSnapshot;

/// Unique identifier for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Information about a module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module name, if set.
    pub name: Option<String>,
    /// Where the module bytes came from.
    pub source: Option<String>,
    /// Size of the module binary in bytes.
    pub size: usize,
    /// Number of exports.
    pub export_count: usize,
    /// Number of imports.
    pub import_count: usize,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The guest returned from `_start` or called `proc_exit`.
    Exited {
        /// Exit status.
        code: i32,
    },
    /// The guest trapped.
    Trapped {
        /// Trap code name.
        code: Option<String>,
        /// Trap message.
        message: String,
    },
    /// The run failed before or outside guest code.
    Error {
        /// Error message.
        message: String,
    },
}

impl ExecutionOutcome {
    /// Whether the guest exited with status 0.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Exited { code: 0 })
    }

    /// Check if the outcome is a failure.
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}

/// A diagnostic message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level.
    pub level: DiagnosticLevel,
    /// Message.
    pub message: String,
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    /// Informational.
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
}

/// Complete report of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run ID.
    pub run_id: RunId,
    /// Module information.
    pub module: ModuleInfo,
    /// How the run ended.
    pub outcome: ExecutionOutcome,
    /// Collected metrics.
    pub metrics: MetricsSnapshot,
    /// Diagnostic messages.
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    /// Create a new run report.
    pub fn new(
        run_id: RunId,
        module: ModuleInfo,
        outcome: ExecutionOutcome,
        metrics: MetricsSnapshot,
    ) -> Self {
        Self {
            run_id,
            module,
            outcome,
            metrics,
            diagnostics: Vec::new(),
        }
    }

    /// Add an info diagnostic.
    pub fn add_info(&mut self, message: impl Into<String>) {
        self.add(DiagnosticLevel::Info, message);
    }

    /// Add a warning diagnostic.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.add(DiagnosticLevel::Warning, message);
    }

    /// Add an error diagnostic.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.add(DiagnosticLevel::Error, message);
    }

    fn add(&mut self, level: DiagnosticLevel, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            level,
            message: message.into(),
        });
    }

    /// Check if the run was successful.
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Format as human-readable text.
    pub fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Run Report: {}\n", self.run_id));
        output.push_str(&format!(
            "Module: {}\n",
            self.module.name.as_deref().unwrap_or("<unnamed>")
        ));
        if let Some(source) = &self.module.source {
            output.push_str(&format!("Source: {source}\n"));
        }
        output.push('\n');

        match &self.outcome {
            ExecutionOutcome::Exited { code } => {
                output.push_str(&format!("Outcome: Exited with code {code}\n"));
            }
            ExecutionOutcome::Trapped { code, message } => match code {
                Some(code) => output.push_str(&format!("Outcome: Trapped [{code}] {message}\n")),
                None => output.push_str(&format!("Outcome: Trapped: {message}\n")),
            },
            ExecutionOutcome::Error { message } => {
                output.push_str(&format!("Outcome: Error: {message}\n"));
            }
        }

        let metrics = &self.metrics;
        output.push_str("\nMetrics:\n");
        output.push_str(&format!(
            "  Compilation Time: {:?}\n",
            metrics.timing.compilation_time
        ));
        output.push_str(&format!(
            "  Execution Time: {:?}\n",
            metrics.timing.execution_time
        ));
        output.push_str(&format!("  Fuel Consumed: {}\n", metrics.fuel.consumed_fuel));
        output.push_str(&format!(
            "  Final Memory: {} bytes\n",
            metrics.memory.final_memory
        ));
        output.push_str(&format!(
            "  Output: {} bytes stdout, {} bytes stderr\n",
            metrics.streams.stdout_bytes, metrics.streams.stderr_bytes
        ));

        if !metrics.syscalls.per_function.is_empty() {
            output.push_str(&format!(
                "\nSyscalls ({} calls, {} errors):\n",
                metrics.syscalls.total_calls(),
                metrics.syscalls.total_errors()
            ));
            for (name, counter) in &metrics.syscalls.per_function {
                output.push_str(&format!(
                    "  {name}: {} calls, {} errors\n",
                    counter.calls, counter.errors
                ));
            }
        }

        if !self.diagnostics.is_empty() {
            output.push_str("\nDiagnostics:\n");
            for diag in &self.diagnostics {
                let level = match diag.level {
                    DiagnosticLevel::Info => "INFO",
                    DiagnosticLevel::Warning => "WARN",
                    DiagnosticLevel::Error => "ERROR",
                };
                output.push_str(&format!("  [{}] {}\n", level, diag.message));
            }
        }

        output
    }

    /// Format as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Format as pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
