//! Hearth Observability
//!
//! This crate provides observability features for the Hearth WASI host,
//! including:
//!
//! - [`MetricsCollector`]: Timing, fuel and per-syscall counters
//! - [`RunReport`]: A serializable summary of one run
//! - [`EventDispatcher`]: Lifecycle events and subscribers
//!
//! # Run Reports
//!
//! ```
//! use hearth_observe::{ExecutionOutcome, MetricsCollector, ModuleInfo, RunId, RunReport};
//!
//! let metrics = MetricsCollector::new();
//! metrics.record_syscall("fd_write", false);
//!
//! let report = RunReport::new(
//!     RunId::new(),
//!     ModuleInfo::default(),
//!     ExecutionOutcome::Exited { code: 0 },
//!     metrics.snapshot(),
//! );
//!
//! assert!(report.is_success());
//! assert!(report.to_text().contains("fd_write: 1 calls"));
//! ```
//!
//! # Event Subscription
//!
//! ```
//! use std::sync::Arc;
//! use hearth_observe::{EventDispatcher, LoggingSubscriber, RunId, RuntimeEvent};
//!
//! let dispatcher = EventDispatcher::new();
//! dispatcher.subscribe(Arc::new(LoggingSubscriber::new()));
//! dispatcher.emit(RuntimeEvent::Started { run_id: RunId::new() });
//! ```

pub mod events;
pub mod metrics;
pub mod report;

// Re-export main types
pub use events::{
    CollectingSubscriber, EventDispatcher, EventSubscriber, LoggingSubscriber, RuntimeEvent,
};
pub use metrics::{
    FuelMetrics, MemoryMetrics, MetricsCollector, MetricsSnapshot, StreamMetrics, SyscallCounter,
    SyscallMetrics, TimingMetrics,
};
pub use report::{Diagnostic, DiagnosticLevel, ExecutionOutcome, ModuleInfo, RunId, RunReport};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::events::{EventDispatcher, EventSubscriber, RuntimeEvent};
    pub use crate::metrics::{MetricsCollector, MetricsSnapshot};
    pub use crate::report::{ExecutionOutcome, ModuleInfo, RunId, RunReport};
}
