//! Integration tests for the threshold tracker and its observers.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use phenowatch_core::{
    GrowthMonitor, LogObserver, Observer, ObserverError, ObserverHandle, PhenowatchConfig,
    ThresholdTracker,
};
use phenowatch_types::{CHLOROPHYLL_CONTENT, EventKind, LEAF_AREA, PhenotypeEvent, PlantId};
use rust_decimal_macros::dec;

/// Pushes its tag into a shared log on every event.
struct Tagged {
    tag: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Observer<PhenotypeEvent> for Tagged {
    fn name(&self) -> &str {
        self.tag
    }

    fn update(&self, _event: &PhenotypeEvent) -> Result<(), ObserverError> {
        self.log.lock().unwrap().push(self.tag);
        Ok(())
    }
}

#[test]
fn stock_scenario_notifies_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let first: ObserverHandle<PhenotypeEvent> = Arc::new(Tagged {
        tag: "first",
        log: Arc::clone(&log),
    });
    let second: ObserverHandle<PhenotypeEvent> = Arc::new(Tagged {
        tag: "second",
        log: Arc::clone(&log),
    });

    let mut tracker = ThresholdTracker::from_config(&PhenowatchConfig::default().tracker);
    tracker.subscribe(Arc::clone(&first));
    tracker.subscribe(second);
    tracker.subscribe(Arc::new(LogObserver));

    tracker.update([(LEAF_AREA, dec!(60))]).unwrap();
    tracker.update([(CHLOROPHYLL_CONTENT, dec!(3))]).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

    tracker.update([(CHLOROPHYLL_CONTENT, dec!(6))]).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["first", "second", "first", "second"]
    );

    assert_eq!(tracker.unsubscribe(&first), 1);
    tracker.update([(LEAF_AREA, dec!(61))]).unwrap();
    assert_eq!(log.lock().unwrap().last(), Some(&"second"));
    assert_eq!(tracker.observer_count(), 2);
}

#[test]
fn duplicate_registration_is_notified_twice() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let observer: ObserverHandle<PhenotypeEvent> = Arc::new(Tagged {
        tag: "dup",
        log: Arc::clone(&log),
    });

    let mut tracker = ThresholdTracker::default();
    tracker.subscribe(Arc::clone(&observer));
    tracker.subscribe(Arc::clone(&observer));

    tracker.update([(LEAF_AREA, dec!(75))]).unwrap();
    assert_eq!(log.lock().unwrap().len(), 2);

    assert_eq!(tracker.unsubscribe(&observer), 2);
    assert_eq!(tracker.observer_count(), 0);
}

#[test]
fn growth_monitor_records_threshold_readings_per_plant() {
    let plant = PlantId::new();
    let monitor = Arc::new(GrowthMonitor::new());
    let mut tracker = ThresholdTracker::default().for_plant(plant);
    tracker.subscribe(monitor.clone());

    tracker.update([(LEAF_AREA, dec!(52))]).unwrap();
    tracker.update([(LEAF_AREA, dec!(57))]).unwrap();

    let record = monitor.record(plant).unwrap();
    assert_eq!(record.updates, 2);
    assert_eq!(record.phenotypes.get(LEAF_AREA), Some(&dec!(57)));
}

#[test]
fn failing_observer_does_not_block_later_ones() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let mut tracker = ThresholdTracker::default();
    tracker.subscribe(Arc::new(
        |_: &PhenotypeEvent| -> Result<(), ObserverError> { Err(ObserverError::new("boom")) },
    ));
    tracker.subscribe(Arc::new(
        move |event: &PhenotypeEvent| -> Result<(), ObserverError> {
            sink.lock().unwrap().push(event.kind);
            Ok(())
        },
    ));

    let err = tracker.update([(LEAF_AREA, dec!(80))]).unwrap_err();

    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures.first().unwrap().position, 0);
    assert_eq!(*seen.lock().unwrap(), vec![EventKind::ThresholdExceeded]);
}
