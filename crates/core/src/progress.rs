//! Progress and diagnostic reporting
//!
//! Solver components never talk to a user interface directly. They send
//! severity-tagged messages to a [`ProgressSink`] handed in by the caller.
//! Sinks observe; they never change control flow. A [`Severity::Fatal`]
//! message is always followed by an `Err` returned from the reporting call.

use std::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

/// Message category, mirroring the communication channels of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    None,
    Debug,
    /// Percent-complete of the current linear solve
    SolverProgress,
    /// Outer (time-step) iteration count
    OuterIterProgress,
    Warning,
    Failure,
    Fatal,
}

/// Receiver of progress and diagnostic messages
pub trait ProgressSink: Send + Sync {
    /// Handle one message
    fn message(&self, severity: Severity, text: &str);
}

/// Default sink that forwards every message to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn message(&self, severity: Severity, text: &str) {
        match severity {
            Severity::None => trace!("{}", text),
            Severity::Debug | Severity::SolverProgress => debug!("{}", text),
            Severity::OuterIterProgress => info!("{}", text),
            Severity::Warning => warn!("{}", text),
            Severity::Failure | Severity::Fatal => error!("{}", text),
        }
    }
}

/// Sink that keeps every message, for callers that need the history
#[derive(Debug, Default)]
pub struct RecordingProgress {
    messages: Mutex<Vec<(Severity, String)>>,
}

impl RecordingProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all messages received so far
    #[must_use]
    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Messages of one severity
    #[must_use]
    pub fn with_severity(&self, severity: Severity) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, text)| text)
            .collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn message(&self, severity: Severity, text: &str) {
        let mut messages = match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        messages.push((severity, text.to_string()));
    }
}
