//! Stage traits for the pipeline and their stock implementations.
//!
//! A pipeline has two stages: a [`MarkerProcessor`] (stage 1) and a
//! [`PhenotypeTracker`] (stage 2). Both are asynchronous and the pipeline
//! only depends on these contracts.
//!
//! Stock implementations:
//!
//! - [`MarkProcessed`] / [`MarkTracked`] -- pass-through stages that only set
//!   the `processed` / `tracked` flags.
//! - [`ChangeTracker`] -- a tracking stage that compares each plant's
//!   readings with the previous ones and broadcasts significant changes to
//!   its observers.

use std::collections::BTreeMap;
use std::future::{self, Future};
use std::sync::{Arc, Mutex, PoisonError};

use phenowatch_types::{Marker, PhenotypeEvent, PlantId, ProcessedMarker, TrackedMarker};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::ChangeConfig;
use crate::diagnostics::{DiagnosticSink, TracingSink, report_observer_failures};
use crate::error::{BroadcastError, StageError};
use crate::subject::{Observer, ObserverHandle, Subject};

/// Stage 1: turns raw markers into processed markers.
pub trait MarkerProcessor {
    /// Process a batch of markers.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] if the batch cannot be processed.
    fn process(
        &self,
        markers: Vec<Marker>,
    ) -> impl Future<Output = Result<Vec<ProcessedMarker>, StageError>> + Send;
}

/// Stage 2: turns processed markers into tracked markers.
pub trait PhenotypeTracker {
    /// Track a batch of processed markers.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] if the batch cannot be tracked.
    fn track(
        &self,
        processed: Vec<ProcessedMarker>,
    ) -> impl Future<Output = Result<Vec<TrackedMarker>, StageError>> + Send;
}

/// Processor that flags every marker as processed and changes nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkProcessed;

impl MarkerProcessor for MarkProcessed {
    fn process(
        &self,
        markers: Vec<Marker>,
    ) -> impl Future<Output = Result<Vec<ProcessedMarker>, StageError>> + Send {
        future::ready(Ok(markers.into_iter().map(ProcessedMarker::new).collect()))
    }
}

/// Tracker that flags every marker as tracked and records no changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkTracked;

impl PhenotypeTracker for MarkTracked {
    fn track(
        &self,
        processed: Vec<ProcessedMarker>,
    ) -> impl Future<Output = Result<Vec<TrackedMarker>, StageError>> + Send {
        future::ready(Ok(processed.into_iter().map(TrackedMarker::new).collect()))
    }
}

/// Last reading per parameter for one plant.
type Readings = BTreeMap<String, Decimal>;

/// Tracking stage that detects significant per-plant phenotype changes.
///
/// For each marker with a plant id, every reading is compared with the last
/// reading seen for that plant and parameter (zero the first time). A delta
/// whose absolute value is at least the significance threshold is recorded
/// on the tracked marker. Once the whole batch is tracked, one
/// [`SignificantChange`](phenowatch_types::EventKind::SignificantChange)
/// event per marker with changes is broadcast to the observers.
pub struct ChangeTracker {
    significance: Decimal,
    last_seen: Mutex<BTreeMap<PlantId, Readings>>,
    subject: Subject<PhenotypeEvent>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl ChangeTracker {
    /// Create a tracker with the given significance threshold.
    pub fn new(significance: Decimal) -> Self {
        Self {
            significance,
            last_seen: Mutex::new(BTreeMap::new()),
            subject: Subject::new(),
            diagnostics: Arc::new(TracingSink),
        }
    }

    /// Create a tracker from the `changes` section of the configuration.
    pub fn from_config(config: &ChangeConfig) -> Self {
        Self::new(config.significance)
    }

    /// Route diagnostics to `sink` instead of `tracing`.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Register an observer for change events.
    pub fn subscribe(&mut self, observer: ObserverHandle<PhenotypeEvent>) {
        self.subject.subscribe(observer);
    }

    /// Remove every registration of `observer`.
    pub fn unsubscribe<O>(&mut self, observer: &Arc<O>) -> usize
    where
        O: Observer<PhenotypeEvent> + ?Sized,
    {
        self.subject.unsubscribe(observer)
    }

    /// The configured significance threshold.
    pub const fn significance(&self) -> Decimal {
        self.significance
    }

    /// Last reading seen for a plant's parameter.
    pub fn last_reading(&self, plant_id: PlantId, parameter: &str) -> Option<Decimal> {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&plant_id)
            .and_then(|readings| readings.get(parameter).copied())
    }

    /// Compute the significant deltas for one marker.
    ///
    /// Readings are compared with `staged` first, then with `committed`, and
    /// written to `staged` only.
    fn diff(
        &self,
        marker: &Marker,
        committed: &BTreeMap<PlantId, Readings>,
        staged: &mut BTreeMap<PlantId, Readings>,
    ) -> Result<BTreeMap<String, Decimal>, StageError> {
        let Some(plant_id) = marker.plant_id() else {
            return Ok(BTreeMap::new());
        };

        let mut changes = BTreeMap::new();
        let mut readings = Readings::new();
        for (parameter, value) in &marker.measurements {
            let previous = staged
                .get(&plant_id)
                .and_then(|r| r.get(parameter))
                .or_else(|| committed.get(&plant_id).and_then(|r| r.get(parameter)))
                .copied()
                .unwrap_or(Decimal::ZERO);
            let delta = value.checked_sub(previous).ok_or_else(|| {
                StageError::ArithmeticOverflow {
                    parameter: parameter.clone(),
                }
            })?;
            if delta.abs() >= self.significance {
                changes.insert(parameter.clone(), delta);
            }
            readings.insert(parameter.clone(), *value);
        }

        staged.entry(plant_id).or_default().extend(readings);
        Ok(changes)
    }

    /// Diff the whole batch, then commit its readings.
    ///
    /// Nothing is committed if any marker fails.
    fn track_batch(
        &self,
        processed: Vec<ProcessedMarker>,
    ) -> Result<Vec<TrackedMarker>, StageError> {
        let mut tracked = Vec::with_capacity(processed.len());
        {
            let mut last_seen = self
                .last_seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut staged = BTreeMap::new();
            for marker in processed {
                let changes = self.diff(&marker.marker, &last_seen, &mut staged)?;
                tracked.push(TrackedMarker::new(marker).with_changes(changes));
            }
            for (plant_id, readings) in staged {
                last_seen.entry(plant_id).or_default().extend(readings);
            }
        }

        let mut failed: Option<BroadcastError> = None;
        for entry in &tracked {
            let Some(plant_id) = entry.marker().plant_id() else {
                continue;
            };
            let Some(event) =
                PhenotypeEvent::significant_change(plant_id, entry.changed_phenotypes.clone())
            else {
                continue;
            };
            debug!(%plant_id, changes = event.changes.len(), "Significant phenotype change");

            if let Err(err) = self.subject.broadcast(&event) {
                report_observer_failures(self.diagnostics.as_ref(), &err);
                failed.get_or_insert_with(BroadcastError::default).absorb(err);
            }
        }

        failed.map_or(Ok(tracked), |err| Err(err.into()))
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::from_config(&ChangeConfig::default())
    }
}

impl core::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("significance", &self.significance)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl PhenotypeTracker for ChangeTracker {
    fn track(
        &self,
        processed: Vec<ProcessedMarker>,
    ) -> impl Future<Output = Result<Vec<TrackedMarker>, StageError>> + Send {
        future::ready(self.track_batch(processed))
    }
}
