//! Ready-made phenotype observers.
//!
//! - [`GrowthMonitor`] accumulates per-plant growth records.
//! - [`LogObserver`] writes each event message to `tracing`.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use phenowatch_types::{PhenotypeEvent, PlantId};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::error::ObserverError;
use crate::subject::Observer;

/// Latest known phenotype deltas for one plant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthRecord {
    /// The plant this record describes, or `None` for the record that
    /// collects events not tied to a plant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_id: Option<PlantId>,
    /// Parameter name to most recent delta (or reading).
    pub phenotypes: BTreeMap<String, Decimal>,
    /// How many events have been merged into this record.
    pub updates: u32,
    /// When the record was last merged into.
    pub last_updated: DateTime<Utc>,
}

impl GrowthRecord {
    const fn new(plant_id: Option<PlantId>, at: DateTime<Utc>) -> Self {
        Self {
            plant_id,
            phenotypes: BTreeMap::new(),
            updates: 0,
            last_updated: at,
        }
    }

    /// Merge changes, overwriting any parameter already present.
    fn merge(&mut self, changes: &BTreeMap<String, Decimal>, at: DateTime<Utc>) {
        for (name, delta) in changes {
            self.phenotypes.insert(name.clone(), *delta);
        }
        self.updates = self.updates.saturating_add(1);
        self.last_updated = at;
    }
}

/// Observer that keeps a growth record per plant.
///
/// Records are created on the first event for a plant and merged on every
/// later one; they are never removed. Events without a plant id, such as
/// those of a [`ThresholdTracker`](crate::tracker::ThresholdTracker) not
/// built with `for_plant`, all merge into one unassigned record.
#[derive(Debug, Default)]
pub struct GrowthMonitor {
    records: Mutex<BTreeMap<Option<PlantId>, GrowthRecord>>,
}

impl GrowthMonitor {
    /// Create a monitor with no records.
    pub const fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// The record for one plant.
    pub fn record(&self, plant_id: PlantId) -> Option<GrowthRecord> {
        self.lookup(Some(plant_id))
    }

    /// The record merging every event that carried no plant id.
    pub fn unassigned(&self) -> Option<GrowthRecord> {
        self.lookup(None)
    }

    fn lookup(&self, key: Option<PlantId>) -> Option<GrowthRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Every record, the unassigned one first, then ordered by plant id.
    pub fn records(&self) -> Vec<GrowthRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl Observer<PhenotypeEvent> for GrowthMonitor {
    fn name(&self) -> &str {
        "growth-monitor"
    }

    fn update(&self, event: &PhenotypeEvent) -> Result<(), ObserverError> {
        let plant_id = event.plant_id;
        let single;
        let changes = if event.changes.is_empty() {
            single = BTreeMap::from([(event.parameter.clone(), event.value)]);
            &single
        } else {
            &event.changes
        };

        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(plant_id)
            .or_insert_with(|| GrowthRecord::new(plant_id, event.created_at))
            .merge(changes, event.created_at);
        Ok(())
    }
}

/// Observer that logs every event message.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer<PhenotypeEvent> for LogObserver {
    fn name(&self) -> &str {
        "log"
    }

    fn update(&self, event: &PhenotypeEvent) -> Result<(), ObserverError> {
        info!(
            kind = ?event.kind,
            parameter = %event.parameter,
            value = %event.value,
            plant_id = ?event.plant_id,
            "[observer] {}",
            event.message
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use phenowatch_types::LEAF_AREA;
    use rust_decimal_macros::dec;

    use super::*;

    fn change_event(plant: PlantId, changes: &[(&str, Decimal)]) -> PhenotypeEvent {
        let changes = changes
            .iter()
            .map(|(name, delta)| ((*name).to_owned(), *delta))
            .collect();
        PhenotypeEvent::significant_change(plant, changes).unwrap()
    }

    #[test]
    fn first_event_creates_record() {
        let monitor = GrowthMonitor::new();
        let plant = PlantId::new();

        monitor
            .update(&change_event(plant, &[("leafArea", dec!(7))]))
            .unwrap();

        let record = monitor.record(plant).unwrap();
        assert_eq!(record.plant_id, Some(plant));
        assert_eq!(record.phenotypes.get("leafArea"), Some(&dec!(7)));
        assert_eq!(record.updates, 1);
    }

    #[test]
    fn later_events_merge_and_overwrite() {
        let monitor = GrowthMonitor::new();
        let plant = PlantId::new();

        monitor
            .update(&change_event(
                plant,
                &[("leafArea", dec!(7)), ("stemHeight", dec!(-6))],
            ))
            .unwrap();
        monitor
            .update(&change_event(plant, &[("leafArea", dec!(9))]))
            .unwrap();

        let record = monitor.record(plant).unwrap();
        assert_eq!(record.phenotypes.get("leafArea"), Some(&dec!(9)));
        assert_eq!(record.phenotypes.get("stemHeight"), Some(&dec!(-6)));
        assert_eq!(record.updates, 2);
        assert_eq!(monitor.records().len(), 1);
    }

    #[test]
    fn records_are_kept_per_plant() {
        let monitor = GrowthMonitor::new();
        let a = PlantId::new();
        let b = PlantId::new();

        monitor.update(&change_event(a, &[("leafArea", dec!(5))])).unwrap();
        monitor.update(&change_event(b, &[("leafArea", dec!(8))])).unwrap();

        assert_eq!(monitor.records().len(), 2);
        assert_eq!(
            monitor.record(b).and_then(|r| r.phenotypes.get("leafArea").copied()),
            Some(dec!(8))
        );
    }

    #[test]
    fn threshold_event_with_plant_records_reading() {
        let monitor = GrowthMonitor::new();
        let plant = PlantId::new();
        let event = PhenotypeEvent::threshold_exceeded(LEAF_AREA, dec!(60)).for_plant(plant);

        monitor.update(&event).unwrap();

        assert_eq!(
            monitor.record(plant).unwrap().phenotypes.get(LEAF_AREA),
            Some(&dec!(60))
        );
    }

    #[test]
    fn events_without_plant_share_unassigned_record() {
        let monitor = GrowthMonitor::new();
        monitor
            .update(&PhenotypeEvent::threshold_exceeded(LEAF_AREA, dec!(60)))
            .unwrap();
        monitor
            .update(&PhenotypeEvent::threshold_exceeded("stemHeight", dec!(35)))
            .unwrap();

        let record = monitor.unassigned().unwrap();
        assert_eq!(record.plant_id, None);
        assert_eq!(record.updates, 2);
        assert_eq!(record.phenotypes.get(LEAF_AREA), Some(&dec!(60)));
        assert_eq!(record.phenotypes.get("stemHeight"), Some(&dec!(35)));
        assert_eq!(monitor.records().len(), 1);
        assert!(
            serde_json::to_value(&record)
                .unwrap()
                .get("plantId")
                .is_none()
        );
    }

    #[test]
    fn log_observer_never_fails() {
        let event = PhenotypeEvent::threshold_exceeded(LEAF_AREA, dec!(60));
        assert!(LogObserver.update(&event).is_ok());
    }
}
