//! Diagnostic events emitted by the core.
//!
//! Components never log directly. They report a [`Diagnostic`] to an
//! injected [`DiagnosticSink`]. The default [`TracingSink`] forwards to
//! `tracing`; tests inject a [`MemorySink`] and assert on what was recorded.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::error::BroadcastError;
use crate::pipeline::PipelinePhase;

/// Which pipeline stage a diagnostic concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Stage 1, the marker processor.
    Processing,
    /// Stage 2, the phenotype tracker.
    Tracking,
}

impl core::fmt::Display for StageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Processing => f.write_str("processing"),
            Self::Tracking => f.write_str("tracking"),
        }
    }
}

/// A structured diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A pipeline run moved to a new phase.
    PhaseEntered {
        /// The phase just entered.
        phase: PipelinePhase,
    },
    /// Pipeline input was rejected.
    InputRejected {
        /// The validation failure.
        reason: String,
    },
    /// A pipeline stage failed.
    StageFailed {
        /// The failing stage.
        stage: StageKind,
        /// The stage's error, including its cause chain.
        cause: String,
    },
    /// An observer failed during a broadcast.
    ObserverFailed {
        /// Position in the registration list.
        position: usize,
        /// Observer name.
        observer: String,
        /// The observer's error.
        cause: String,
    },
    /// An update named a parameter the tracker does not know.
    ParameterIgnored {
        /// The unknown parameter.
        parameter: String,
    },
    /// A parameter crossed its threshold.
    ThresholdExceeded {
        /// The parameter.
        parameter: String,
        /// The event message that was broadcast.
        message: String,
    },
}

/// Receiver for [`Diagnostic`] events.
pub trait DiagnosticSink: Send + Sync {
    /// Record one diagnostic.
    fn record(&self, diagnostic: Diagnostic);
}

/// Sink that forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::PhaseEntered { phase } => {
                debug!(?phase, "Pipeline phase entered");
            }
            Diagnostic::InputRejected { reason } => {
                warn!(%reason, "Pipeline input rejected");
            }
            Diagnostic::StageFailed { stage, cause } => {
                warn!(%stage, %cause, "Pipeline stage failed");
            }
            Diagnostic::ObserverFailed {
                position,
                observer,
                cause,
            } => {
                warn!(position, %observer, %cause, "Observer failed during broadcast");
            }
            Diagnostic::ParameterIgnored { parameter } => {
                debug!(%parameter, "Ignoring unknown phenotype parameter");
            }
            Diagnostic::ThresholdExceeded { parameter, message } => {
                info!(%parameter, %message, "Threshold exceeded");
            }
        }
    }
}

/// Sink that keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything recorded so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, diagnostic: Diagnostic) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}

/// Report every failure in a broadcast error as an observer diagnostic.
pub(crate) fn report_observer_failures(sink: &dyn DiagnosticSink, err: &BroadcastError) {
    for failure in &err.failures {
        sink.record(Diagnostic::ObserverFailed {
            position: failure.position,
            observer: failure.observer.clone(),
            cause: failure.source.to_string(),
        });
    }
}

/// Render an error and its `source` chain as `outer: inner: root`.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}
