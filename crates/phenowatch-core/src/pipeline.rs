//! The two-stage marker pipeline.
//!
//! A run validates its input, hands the whole batch to the
//! [`MarkerProcessor`], then hands the processor's output to the
//! [`PhenotypeTracker`]. Stage 2 never starts if stage 1 fails. Every
//! failure is reported to the diagnostic sink before it is returned.

use std::sync::Arc;

use phenowatch_types::{Marker, TrackedMarker};
use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticSink, StageKind, TracingSink, error_chain};
use crate::error::{PipelineError, StageError, ValidationError};
use crate::stages::{MarkProcessed, MarkTracked, MarkerProcessor, PhenotypeTracker};
use crate::validation::{validate_input, validate_markers};

/// Where a pipeline is in its most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelinePhase {
    /// No run has started.
    #[default]
    Idle,
    /// Checking the input shape.
    Validating,
    /// Stage 1 is running.
    Processing,
    /// Stage 2 is running.
    Tracking,
    /// The last run returned tracked markers.
    Completed,
    /// The last run returned an error.
    Failed,
}

/// Orchestrates one processing stage followed by one tracking stage.
pub struct Pipeline<P, T> {
    processor: P,
    tracker: T,
    diagnostics: Arc<dyn DiagnosticSink>,
    phase: PipelinePhase,
}

impl<P, T> Pipeline<P, T> {
    /// Build a pipeline from its two stages.
    pub fn new(processor: P, tracker: T) -> Self {
        Self {
            processor,
            tracker,
            diagnostics: Arc::new(TracingSink),
            phase: PipelinePhase::Idle,
        }
    }

    /// Route diagnostics to `sink` instead of `tracing`.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Phase reached by the most recent run.
    pub const fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// The stage 1 implementation.
    pub const fn processor(&self) -> &P {
        &self.processor
    }

    /// The stage 2 implementation.
    pub const fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Mutable access to stage 2, e.g. to subscribe observers.
    pub const fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    /// Move to `phase` and report the transition.
    fn enter(&mut self, phase: PipelinePhase) {
        self.phase = phase;
        self.diagnostics.record(Diagnostic::PhaseEntered { phase });
    }

    fn reject(&mut self, err: ValidationError) -> PipelineError {
        self.diagnostics.record(Diagnostic::InputRejected {
            reason: err.to_string(),
        });
        self.enter(PipelinePhase::Failed);
        PipelineError::Validation(err)
    }

    fn stage_failed(&mut self, stage: StageKind, source: StageError) -> PipelineError {
        let err = match stage {
            StageKind::Processing => PipelineError::Processing { source },
            StageKind::Tracking => PipelineError::Tracking { source },
        };
        self.diagnostics.record(Diagnostic::StageFailed {
            stage,
            cause: error_chain(&err),
        });
        self.enter(PipelinePhase::Failed);
        err
    }
}

impl Pipeline<MarkProcessed, MarkTracked> {
    /// A pipeline whose stages only set the `processed` / `tracked` flags.
    pub fn with_mock_stages() -> Self {
        Self::new(MarkProcessed, MarkTracked)
    }
}

impl<P, T> Pipeline<P, T>
where
    P: MarkerProcessor + Send + Sync,
    T: PhenotypeTracker + Send + Sync,
{
    /// Run a batch of markers through both stages.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] if `markers` is empty. No stage runs.
    /// - [`PipelineError::Processing`] if stage 1 fails. Stage 2 does not run.
    /// - [`PipelineError::Tracking`] if stage 2 fails.
    pub async fn run(&mut self, markers: Vec<Marker>) -> Result<Vec<TrackedMarker>, PipelineError> {
        self.enter(PipelinePhase::Validating);
        if let Err(err) = validate_markers(&markers) {
            return Err(self.reject(err));
        }
        self.run_stages(markers).await
    }

    /// Validate an untyped JSON batch, then run it through both stages.
    ///
    /// # Errors
    ///
    /// As [`Pipeline::run`], plus [`PipelineError::Validation`] when the
    /// value is not an array or an element is not a JSON object.
    pub async fn run_value(
        &mut self,
        input: &serde_json::Value,
    ) -> Result<Vec<TrackedMarker>, PipelineError> {
        self.enter(PipelinePhase::Validating);
        let markers = match validate_input(input) {
            Ok(markers) => markers,
            Err(err) => return Err(self.reject(err)),
        };
        self.run_stages(markers).await
    }

    async fn run_stages(
        &mut self,
        markers: Vec<Marker>,
    ) -> Result<Vec<TrackedMarker>, PipelineError> {
        let count = markers.len();
        debug!(markers = count, "Pipeline run started");

        self.enter(PipelinePhase::Processing);
        let processed = match self.processor.process(markers).await {
            Ok(processed) => processed,
            Err(source) => return Err(self.stage_failed(StageKind::Processing, source)),
        };

        self.enter(PipelinePhase::Tracking);
        let tracked = match self.tracker.track(processed).await {
            Ok(tracked) => tracked,
            Err(source) => return Err(self.stage_failed(StageKind::Tracking, source)),
        };

        self.enter(PipelinePhase::Completed);
        debug!(markers = count, tracked = tracked.len(), "Pipeline run completed");
        Ok(tracked)
    }
}

impl<P: core::fmt::Debug, T: core::fmt::Debug> core::fmt::Debug for Pipeline<P, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline")
            .field("processor", &self.processor)
            .field("tracker", &self.tracker)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error;
    use std::future::{self, Future};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use phenowatch_types::ProcessedMarker;
    use serde_json::json;

    use super::*;
    use crate::diagnostics::MemorySink;
    use crate::error::INVALID_INPUT_MESSAGE;

    /// Every phase transition recorded in `sink`, in order.
    fn phases(sink: &MemorySink) -> Vec<PipelinePhase> {
        sink.entries()
            .into_iter()
            .filter_map(|d| match d {
                Diagnostic::PhaseEntered { phase } => Some(phase),
                _ => None,
            })
            .collect()
    }

    fn current_phase(sink: &MemorySink) -> Option<PipelinePhase> {
        phases(sink).last().copied()
    }

    struct FailingProcessor;

    impl MarkerProcessor for FailingProcessor {
        fn process(
            &self,
            _markers: Vec<Marker>,
        ) -> impl Future<Output = Result<Vec<ProcessedMarker>, StageError>> + Send {
            future::ready(Err(StageError::internal("sequencer offline")))
        }
    }

    struct FailingTracker;

    impl PhenotypeTracker for FailingTracker {
        fn track(
            &self,
            _processed: Vec<ProcessedMarker>,
        ) -> impl Future<Output = Result<Vec<TrackedMarker>, StageError>> + Send {
            future::ready(Err(StageError::internal("lost plant")))
        }
    }

    /// Stage 1 that tags every marker and notes the phase it ran in.
    struct TaggingProcessor {
        diagnostics: Arc<MemorySink>,
        calls: AtomicUsize,
        ran_in: Mutex<Option<PipelinePhase>>,
    }

    impl TaggingProcessor {
        fn new(diagnostics: &Arc<MemorySink>) -> Self {
            Self {
                diagnostics: Arc::clone(diagnostics),
                calls: AtomicUsize::new(0),
                ran_in: Mutex::new(None),
            }
        }
    }

    impl MarkerProcessor for TaggingProcessor {
        fn process(
            &self,
            markers: Vec<Marker>,
        ) -> impl Future<Output = Result<Vec<ProcessedMarker>, StageError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.ran_in.lock().unwrap() = current_phase(&self.diagnostics);
            let processed = markers
                .into_iter()
                .map(|m| ProcessedMarker::new(m.with_field("stage", "sequenced")))
                .collect();
            future::ready(Ok(processed))
        }
    }

    /// Stage 2 that keeps what it was given and notes the phase it ran in.
    #[derive(Default)]
    struct RecordingTracker {
        diagnostics: Option<Arc<MemorySink>>,
        received: Mutex<Vec<ProcessedMarker>>,
        ran_in: Mutex<Option<PipelinePhase>>,
    }

    impl RecordingTracker {
        fn watching(diagnostics: &Arc<MemorySink>) -> Self {
            Self {
                diagnostics: Some(Arc::clone(diagnostics)),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    impl PhenotypeTracker for RecordingTracker {
        fn track(
            &self,
            processed: Vec<ProcessedMarker>,
        ) -> impl Future<Output = Result<Vec<TrackedMarker>, StageError>> + Send {
            *self.ran_in.lock().unwrap() = self.diagnostics.as_deref().and_then(current_phase);
            self.received.lock().unwrap().extend(processed.iter().cloned());
            MarkTracked.track(processed)
        }
    }

    #[tokio::test]
    async fn mock_stages_flag_every_marker() {
        let mut pipeline = Pipeline::with_mock_stages();
        let tracked = pipeline
            .run(vec![Marker::new("A"), Marker::new("B")])
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&tracked).unwrap(),
            json!([
                { "marker": "A", "processed": true, "tracked": true },
                { "marker": "B", "processed": true, "tracked": true },
            ])
        );
        assert_eq!(pipeline.phase(), PipelinePhase::Completed);
    }

    #[tokio::test]
    async fn stages_run_in_their_phases() {
        let diagnostics = Arc::new(MemorySink::new());
        let mut pipeline = Pipeline::new(
            TaggingProcessor::new(&diagnostics),
            RecordingTracker::watching(&diagnostics),
        )
        .with_diagnostics(diagnostics.clone());

        pipeline
            .run(vec![Marker::new("A"), Marker::new("B")])
            .await
            .unwrap();

        assert_eq!(
            *pipeline.processor().ran_in.lock().unwrap(),
            Some(PipelinePhase::Processing)
        );
        assert_eq!(
            *pipeline.tracker().ran_in.lock().unwrap(),
            Some(PipelinePhase::Tracking)
        );
        assert_eq!(
            phases(&diagnostics),
            vec![
                PipelinePhase::Validating,
                PipelinePhase::Processing,
                PipelinePhase::Tracking,
                PipelinePhase::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn tracker_receives_processor_output() {
        let diagnostics = Arc::new(MemorySink::new());
        let mut pipeline = Pipeline::new(
            TaggingProcessor::new(&diagnostics),
            RecordingTracker::default(),
        );

        let tracked = pipeline
            .run(vec![Marker::new("A"), Marker::new("B")])
            .await
            .unwrap();

        let received = pipeline.tracker().received.lock().unwrap().clone();
        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|m| m.processed));
        assert!(
            received
                .iter()
                .all(|m| m.marker.fields.get("stage") == Some(&json!("sequenced")))
        );
        assert_eq!(
            received.iter().map(|m| m.marker.marker.clone()).collect::<Vec<_>>(),
            vec![Some("A".to_owned()), Some("B".to_owned())]
        );
        assert_eq!(
            serde_json::to_value(tracked.first().unwrap()).unwrap(),
            json!({ "marker": "A", "stage": "sequenced", "processed": true, "tracked": true })
        );
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let diagnostics = Arc::new(MemorySink::new());
        let mut pipeline = Pipeline::with_mock_stages().with_diagnostics(diagnostics.clone());

        let err = pipeline.run(Vec::new()).await.unwrap_err();

        assert_eq!(err.to_string(), INVALID_INPUT_MESSAGE);
        assert_eq!(pipeline.phase(), PipelinePhase::Failed);
        assert!(
            diagnostics
                .entries()
                .iter()
                .any(|d| matches!(d, Diagnostic::InputRejected { .. }))
        );
        assert_eq!(
            phases(&diagnostics),
            vec![PipelinePhase::Validating, PipelinePhase::Failed]
        );
    }

    #[tokio::test]
    async fn non_array_values_are_rejected() {
        let mut pipeline = Pipeline::with_mock_stages();
        for input in [json!(null), json!({}), json!(""), json!([])] {
            let err = pipeline.run_value(&input).await.unwrap_err();
            assert!(matches!(err, PipelineError::Validation(_)));
            assert_eq!(err.to_string(), INVALID_INPUT_MESSAGE);
        }
    }

    #[tokio::test]
    async fn run_value_accepts_marker_array() {
        let mut pipeline = Pipeline::with_mock_stages();
        let tracked = pipeline
            .run_value(&json!([{ "marker": "A" }]))
            .await
            .unwrap();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked.first().unwrap().marker().marker.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn processing_failure_skips_tracking() {
        let diagnostics = Arc::new(MemorySink::new());
        let mut pipeline = Pipeline::new(FailingProcessor, RecordingTracker::default())
            .with_diagnostics(diagnostics.clone());

        let err = pipeline.run(vec![Marker::new("A")]).await.unwrap_err();

        assert_eq!(err.to_string(), "Data processing failed");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("stage error: sequencer offline")
        );
        assert_eq!(pipeline.tracker().calls(), 0);
        assert_eq!(pipeline.phase(), PipelinePhase::Failed);
        assert!(diagnostics.entries().contains(&Diagnostic::StageFailed {
            stage: StageKind::Processing,
            cause: "Data processing failed: stage error: sequencer offline".to_owned(),
        }));
        assert_eq!(
            phases(&diagnostics),
            vec![
                PipelinePhase::Validating,
                PipelinePhase::Processing,
                PipelinePhase::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn tracking_failure_is_wrapped() {
        let diagnostics = Arc::new(MemorySink::new());
        let mut pipeline =
            Pipeline::new(MarkProcessed, FailingTracker).with_diagnostics(diagnostics.clone());

        let err = pipeline.run(vec![Marker::new("A")]).await.unwrap_err();

        assert!(matches!(err, PipelineError::Tracking { .. }));
        assert_eq!(err.to_string(), "Phenotype tracking failed");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("stage error: lost plant")
        );
        assert!(diagnostics.entries().iter().any(|d| matches!(
            d,
            Diagnostic::StageFailed {
                stage: StageKind::Tracking,
                ..
            }
        )));
        assert_eq!(pipeline.phase(), PipelinePhase::Failed);
        assert_eq!(
            phases(&diagnostics),
            vec![
                PipelinePhase::Validating,
                PipelinePhase::Processing,
                PipelinePhase::Tracking,
                PipelinePhase::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn each_run_calls_each_stage_once() {
        let diagnostics = Arc::new(MemorySink::new());
        let mut pipeline = Pipeline::new(
            TaggingProcessor::new(&diagnostics),
            RecordingTracker::default(),
        );
        pipeline.run(vec![Marker::new("A")]).await.unwrap();
        pipeline.run(vec![Marker::new("B")]).await.unwrap();
        assert_eq!(pipeline.processor().calls.load(Ordering::SeqCst), 2);
        assert_eq!(pipeline.tracker().calls(), 2);
    }

    #[test]
    fn new_pipeline_is_idle() {
        assert_eq!(Pipeline::with_mock_stages().phase(), PipelinePhase::Idle);
    }
}
