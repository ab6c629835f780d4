//! Error types for the Phenowatch core.
//!
//! The taxonomy separates input rejection ([`ValidationError`]) from stage
//! failures ([`PipelineError::Processing`], [`PipelineError::Tracking`]) and
//! from observer failures ([`ObserverError`], collected into a
//! [`BroadcastError`]). Wrapping errors keep the original failure reachable
//! through [`std::error::Error::source`].

/// The message carried by every input-shape rejection.
pub const INVALID_INPUT_MESSAGE: &str = "Invalid input: expected a non-empty array.";

/// Failure reported by a single observer's `update`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ObserverError {
    message: String,
}

impl ObserverError {
    /// Create an observer error with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One observer that failed during a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("observer #{position} ({observer}) failed: {source}")]
pub struct ObserverFailure {
    /// Zero-based position of the observer in the registration list.
    pub position: usize,
    /// The observer's name.
    pub observer: String,
    /// What the observer reported.
    pub source: ObserverError,
}

/// Accumulated observer failures from one or more broadcasts.
///
/// Produced only after every registered observer has been notified.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{count} observer notification(s) failed", count = .failures.len())]
pub struct BroadcastError {
    /// Every failure, in notification order.
    pub failures: Vec<ObserverFailure>,
}

impl BroadcastError {
    /// Fold another broadcast's failures into this one.
    pub fn absorb(&mut self, other: Self) {
        self.failures.extend(other.failures);
    }
}

/// Rejection of pipeline input before any stage runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The input was not an array at all.
    #[error("Invalid input: expected a non-empty array.")]
    NotAnArray {
        /// JSON type name of what was supplied.
        found: &'static str,
    },

    /// The input was an empty array.
    #[error("Invalid input: expected a non-empty array.")]
    Empty,

    /// An element could not be read as a marker.
    #[error("invalid marker at index {index}: {reason}")]
    MalformedMarker {
        /// Position of the offending element.
        index: usize,
        /// Why it was rejected.
        reason: String,
    },
}

/// Failure raised by a pipeline stage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage could not complete its work.
    #[error("stage error: {message}")]
    Internal {
        /// Description of the error.
        message: String,
    },

    /// A parameter delta could not be represented.
    #[error("arithmetic overflow computing delta for {parameter}")]
    ArithmeticOverflow {
        /// The parameter whose delta overflowed.
        parameter: String,
    },

    /// Observers subscribed to the stage failed.
    #[error("observer broadcast failed: {source}")]
    Broadcast {
        /// The collected observer failures.
        #[from]
        source: BroadcastError,
    },
}

impl StageError {
    /// Convenience constructor for [`StageError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Errors returned by [`Pipeline::run`](crate::pipeline::Pipeline::run).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input was rejected before any stage ran.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The processing stage failed.
    #[error("Data processing failed")]
    Processing {
        /// The underlying stage error.
        source: StageError,
    },

    /// The tracking stage failed.
    #[error("Phenotype tracking failed")]
    Tracking {
        /// The underlying stage error.
        source: StageError,
    },
}
