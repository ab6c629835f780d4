//! Phenotype event payloads broadcast to observers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, PlantId};

/// What produced a [`PhenotypeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A parameter's new value strictly exceeded its threshold.
    ThresholdExceeded,
    /// One or more parameters moved by at least the significance delta.
    SignificantChange,
}

/// An immutable notification payload.
///
/// Every event carries the parameter, value and human-readable message.
/// Change-tracking events additionally name the plant and carry every
/// significant delta observed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhenotypeEvent {
    /// Unique event identifier.
    pub id: EventId,
    /// What produced the event.
    pub kind: EventKind,
    /// The plant concerned, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant_id: Option<PlantId>,
    /// The parameter that triggered the event.
    pub parameter: String,
    /// The triggering value (a reading or a delta, depending on `kind`).
    pub value: Decimal,
    /// Human-readable description.
    pub message: String,
    /// Parameter name to delta, for multi-parameter changes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changes: BTreeMap<String, Decimal>,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
}

impl PhenotypeEvent {
    /// Build the event for a threshold crossing.
    pub fn threshold_exceeded(parameter: impl Into<String>, value: Decimal) -> Self {
        let parameter = parameter.into();
        let message = format!(
            "{parameter} exceeded threshold! Current value: {}",
            value.normalize()
        );
        Self {
            id: EventId::new(),
            kind: EventKind::ThresholdExceeded,
            plant_id: None,
            parameter,
            value,
            message,
            changes: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Build the event for a set of significant changes on one plant.
    ///
    /// `parameter` and `value` name the largest absolute delta; ties go to
    /// the parameter that sorts first. Returns `None` when `changes` is
    /// empty.
    pub fn significant_change(
        plant_id: PlantId,
        changes: BTreeMap<String, Decimal>,
    ) -> Option<Self> {
        let (parameter, value) = changes
            .iter()
            .fold(None::<(&String, &Decimal)>, |best, (name, delta)| match best {
                Some((_, best_delta)) if best_delta.abs() >= delta.abs() => best,
                _ => Some((name, delta)),
            })
            .map(|(name, delta)| (name.clone(), *delta))?;

        let message = format!(
            "plant {plant_id}: {} phenotype parameter(s) changed significantly, largest {parameter} by {}",
            changes.len(),
            value.normalize()
        );

        Some(Self {
            id: EventId::new(),
            kind: EventKind::SignificantChange,
            plant_id: Some(plant_id),
            parameter,
            value,
            message,
            changes,
            created_at: Utc::now(),
        })
    }

    /// Attach a plant id to the event.
    #[must_use]
    pub const fn for_plant(mut self, plant_id: PlantId) -> Self {
        self.plant_id = Some(plant_id);
        self
    }
}
