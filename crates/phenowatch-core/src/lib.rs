//! Observer registry, threshold tracking, and the process/track pipeline
//! for Phenowatch.
//!
//! # Modules
//!
//! - [`subject`] -- [`Observer`] trait and the [`Subject`] registry that
//!   broadcasts events to every registered observer in order.
//! - [`tracker`] -- [`ThresholdTracker`], which owns parameter values and
//!   notifies when one rises above its threshold.
//! - [`stages`] -- Stage traits for the pipeline plus the pass-through and
//!   change-detecting implementations.
//! - [`pipeline`] -- [`Pipeline`], which validates input and runs the two
//!   stages in sequence.
//! - [`observers`] -- [`GrowthMonitor`] and [`LogObserver`].
//! - [`validation`] -- Input shape checks for typed and JSON batches.
//! - [`diagnostics`] -- Structured diagnostics and the sinks that receive
//!   them.
//! - [`config`] -- Loading `phenowatch-config.yaml`.
//! - [`error`] -- The error taxonomy.
//!
//! [`Observer`]: subject::Observer
//! [`Subject`]: subject::Subject
//! [`ThresholdTracker`]: tracker::ThresholdTracker
//! [`Pipeline`]: pipeline::Pipeline
//! [`GrowthMonitor`]: observers::GrowthMonitor
//! [`LogObserver`]: observers::LogObserver

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod observers;
pub mod pipeline;
pub mod stages;
pub mod subject;
pub mod tracker;
pub mod validation;

pub use config::PhenowatchConfig;
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, StageKind, TracingSink};
pub use error::{
    BroadcastError, INVALID_INPUT_MESSAGE, ObserverError, ObserverFailure, PipelineError,
    StageError, ValidationError,
};
pub use observers::{GrowthMonitor, GrowthRecord, LogObserver};
pub use pipeline::{Pipeline, PipelinePhase};
pub use stages::{ChangeTracker, MarkProcessed, MarkTracked, MarkerProcessor, PhenotypeTracker};
pub use subject::{Observer, ObserverHandle, Subject};
pub use tracker::ThresholdTracker;
