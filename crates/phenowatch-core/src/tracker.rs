//! Threshold tracker: parameter state plus conditional notification.
//!
//! A [`ThresholdTracker`] owns the current value of each recognised
//! phenotype parameter and a fixed threshold table. Every update overwrites
//! the stored value and, when the new value is strictly greater than the
//! parameter's threshold, broadcasts a
//! [`ThresholdExceeded`](phenowatch_types::EventKind::ThresholdExceeded)
//! event through the tracker's own [`Subject`].
//!
//! Keys that are not recognised parameters are ignored. A recognised
//! parameter with no threshold is stored but never notifies.

use std::collections::BTreeMap;
use std::sync::Arc;

use phenowatch_types::{PhenotypeEvent, PlantId};
use rust_decimal::Decimal;

use crate::config::TrackerConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink, report_observer_failures};
use crate::error::BroadcastError;
use crate::subject::{Observer, ObserverHandle, Subject};

/// Tracks phenotype parameters against thresholds.
pub struct ThresholdTracker {
    parameters: BTreeMap<String, Decimal>,
    thresholds: BTreeMap<String, Decimal>,
    plant_id: Option<PlantId>,
    subject: Subject<PhenotypeEvent>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl ThresholdTracker {
    /// Create a tracker from initial parameter values and thresholds.
    pub fn new(
        parameters: BTreeMap<String, Decimal>,
        thresholds: BTreeMap<String, Decimal>,
    ) -> Self {
        Self {
            parameters,
            thresholds,
            plant_id: None,
            subject: Subject::new(),
            diagnostics: Arc::new(TracingSink),
        }
    }

    /// Create a tracker from the `tracker` section of the configuration.
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.initial.clone(), config.thresholds.clone())
    }

    /// Stamp every emitted event with `plant_id`.
    #[must_use]
    pub const fn for_plant(mut self, plant_id: PlantId) -> Self {
        self.plant_id = Some(plant_id);
        self
    }

    /// Route diagnostics to `sink` instead of `tracing`.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Register an observer for threshold events.
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

    /// Apply parameter changes, broadcasting one event per threshold
    /// crossing.
    ///
    /// Changes are applied in iteration order. Returns the number of events
    /// broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError`] carrying the observer failures of every
    /// broadcast in this update. All changes are still applied and every
    /// observer is still notified before the error is returned.
    pub fn update<I, K>(&mut self, changes: I) -> Result<usize, BroadcastError>
    where
        I: IntoIterator<Item = (K, Decimal)>,
        K: AsRef<str>,
    {
        let mut broadcasts: usize = 0;
        let mut failed: Option<BroadcastError> = None;

        for (key, value) in changes {
            let name = key.as_ref();
            let Some(slot) = self.parameters.get_mut(name) else {
                self.diagnostics.record(Diagnostic::ParameterIgnored {
                    parameter: name.to_owned(),
                });
                continue;
            };
            *slot = value;

            let Some(event) = self.check_threshold(name, value) else {
                continue;
            };
            broadcasts = broadcasts.saturating_add(1);
            self.diagnostics.record(Diagnostic::ThresholdExceeded {
                parameter: event.parameter.clone(),
                message: event.message.clone(),
            });

            if let Err(err) = self.subject.broadcast(&event) {
                report_observer_failures(self.diagnostics.as_ref(), &err);
                failed.get_or_insert_with(BroadcastError::default).absorb(err);
            }
        }

        failed.map_or(Ok(broadcasts), Err)
    }

    /// Build the event for `parameter` if `value` strictly exceeds its
    /// threshold.
    fn check_threshold(&self, parameter: &str, value: Decimal) -> Option<PhenotypeEvent> {
        let threshold = self.thresholds.get(parameter)?;
        if value <= *threshold {
            return None;
        }
        let mut event = PhenotypeEvent::threshold_exceeded(parameter, value);
        event.plant_id = self.plant_id;
        Some(event)
    }

    /// Current value of a parameter, if it is recognised.
    pub fn value(&self, parameter: &str) -> Option<Decimal> {
        self.parameters.get(parameter).copied()
    }

    /// Threshold of a parameter, if one is configured.
    pub fn threshold(&self, parameter: &str) -> Option<Decimal> {
        self.thresholds.get(parameter).copied()
    }

    /// All current parameter values.
    pub const fn parameters(&self) -> &BTreeMap<String, Decimal> {
        &self.parameters
    }

    /// Number of registered observers.
    pub const fn observer_count(&self) -> usize {
        self.subject.len()
    }
}

impl Default for ThresholdTracker {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

impl core::fmt::Debug for ThresholdTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThresholdTracker")
            .field("parameters", &self.parameters)
            .field("thresholds", &self.thresholds)
            .field("plant_id", &self.plant_id)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}
