//! Observable events during a run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::report::{ExecutionOutcome, RunId};

/// Events that can be observed while a module is loaded and run.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Module bytes were compiled.
    ModuleLoaded {
        /// Run the module belongs to.
        run_id: RunId,
        /// Module name, if available.
        name: Option<String>,
        /// Number of imports.
        import_count: usize,
        /// Number of exports.
        export_count: usize,
    },
    /// Imports resolved and the module was instantiated.
    Instantiated {
        /// Run the module belongs to.
        run_id: RunId,
        /// Number of descriptors installed.
        descriptors: usize,
    },
    /// An environment entry is not `KEY=VALUE`. It is passed on unchanged.
    MalformedEnv {
        /// Run the entry belongs to.
        run_id: RunId,
        /// The entry as supplied.
        entry: String,
    },
    /// `_start` was called.
    Started {
        /// Run being started.
        run_id: RunId,
    },
    /// The run reached a terminal state.
    Finished {
        /// Run that finished.
        run_id: RunId,
        /// How it ended.
        outcome: ExecutionOutcome,
        /// Time spent in guest code.
        duration: Duration,
    },
    /// An error stopped the run before guest code ran.
    Error {
        /// Run that failed.
        run_id: RunId,
        /// Error message.
        message: String,
    },
}

impl RuntimeEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            RuntimeEvent::ModuleLoaded { .. } => "module_loaded",
            RuntimeEvent::Instantiated { .. } => "instantiated",
            RuntimeEvent::MalformedEnv { .. } => "malformed_env",
            RuntimeEvent::Started { .. } => "started",
            RuntimeEvent::Finished { .. } => "finished",
            RuntimeEvent::Error { .. } => "error",
        }
    }

    /// The run this event belongs to.
    pub fn run_id(&self) -> RunId {
        match self {
            RuntimeEvent::ModuleLoaded { run_id, .. }
            | RuntimeEvent::Instantiated { run_id, .. }
            | RuntimeEvent::MalformedEnv { run_id, .. }
            | RuntimeEvent::Started { run_id }
            | RuntimeEvent::Finished { run_id, .. }
            | RuntimeEvent::Error { run_id, .. } => *run_id,
        }
    }
}

/// Subscriber for runtime events.
pub trait EventSubscriber: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &RuntimeEvent);

    /// Filter for event types this subscriber is interested in.
    /// Returns `None` to receive all events.
    fn event_filter(&self) -> Option<Vec<&'static str>> {
        None
    }
}

/// A subscriber that logs events through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingSubscriber;

impl LoggingSubscriber {
    /// Create a new logging subscriber.
    pub fn new() -> Self {
        Self
    }
}

impl EventSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &RuntimeEvent) {
        match event {
            RuntimeEvent::ModuleLoaded {
                run_id,
                name,
                import_count,
                export_count,
            } => {
                tracing::debug!(
                    event = "module_loaded",
                    run_id = %run_id,
                    name = ?name,
                    imports = import_count,
                    exports = export_count,
                    "Module loaded"
                );
            }
            RuntimeEvent::Instantiated {
                run_id,
                descriptors,
            } => {
                tracing::debug!(
                    event = "instantiated",
                    run_id = %run_id,
                    descriptors,
                    "Module instantiated"
                );
            }
            RuntimeEvent::MalformedEnv { run_id, entry } => {
                tracing::warn!(
                    event = "malformed_env",
                    run_id = %run_id,
                    entry = ?entry,
                    "Environment entry is not KEY=VALUE"
                );
            }
            RuntimeEvent::Started { run_id } => {
                tracing::debug!(event = "started", run_id = %run_id, "Entry point called");
            }
            RuntimeEvent::Finished {
                run_id,
                outcome,
                duration,
            } => match outcome {
                ExecutionOutcome::Exited { code } => {
                    tracing::info!(
                        event = "finished",
                        run_id = %run_id,
                        exit_code = code,
                        duration_ms = duration.as_millis(),
                        "Guest exited"
                    );
                }
                ExecutionOutcome::Trapped { code, message } => {
                    tracing::warn!(
                        event = "finished",
                        run_id = %run_id,
                        trap = ?code,
                        message = %message,
                        duration_ms = duration.as_millis(),
                        "Guest trapped"
                    );
                }
                ExecutionOutcome::Error { message } => {
                    tracing::error!(
                        event = "finished",
                        run_id = %run_id,
                        message = %message,
                        "Run failed"
                    );
                }
            },
            RuntimeEvent::Error { run_id, message } => {
                tracing::error!(
                    event = "error",
                    run_id = %run_id,
                    message = %message,
                    "Error occurred"
                );
            }
        }
    }
}

/// A subscriber that collects events for later analysis.
pub struct CollectingSubscriber {
    events: RwLock<Vec<(Instant, RuntimeEvent)>>,
    max_events: usize,
}

impl CollectingSubscriber {
    /// Create a new collecting subscriber.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events,
        }
    }

    /// Get collected events.
    pub fn events(&self) -> Vec<(Instant, RuntimeEvent)> {
        self.events.read().clone()
    }

    /// Event type names in the order they were received.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .read()
            .iter()
            .map(|(_, event)| event.event_type())
            .collect()
    }

    /// Clear collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSubscriber for CollectingSubscriber {
    fn on_event(&self, event: &RuntimeEvent) {
        let mut events = self.events.write();
        if events.len() < self.max_events {
            events.push((Instant::now(), event.clone()));
        }
    }
}

/// Event dispatcher that manages subscribers.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Remove all subscribers.
    pub fn clear_subscribers(&self) {
        self.subscribers.write().clear();
    }

    /// Get subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: RuntimeEvent) {
        let subscribers = self.subscribers.read();
        for subscriber in subscribers.iter() {
            if let Some(filter) = subscriber.event_filter() {
                if !filter.contains(&event.event_type()) {
                    continue;
                }
            }
            subscriber.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
