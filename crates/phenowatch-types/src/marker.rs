//! Marker records flowing through the processing pipeline.
//!
//! A [`Marker`] is one raw measurement record. Apart from the optional
//! `marker` label and `measurements` map it is opaque: every other field is
//! kept in [`Marker::fields`] and written back unchanged. The processing
//! stage wraps it into a [`ProcessedMarker`] and the tracking stage wraps
//! that into a [`TrackedMarker`]. Each wrapper flattens its inner record on
//! the wire, so a fully tracked marker serializes as
//! `{"marker": "A", "processed": true, "tracked": true}`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::ids::PlantId;

/// Wire key holding the plant a marker belongs to.
pub const PLANT_ID_FIELD: &str = "plantId";

/// A raw molecular marker measurement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    /// Marker label (for example `"A"`), if the record has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// Phenotype parameter readings taken alongside the marker.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub measurements: BTreeMap<String, Decimal>,
    /// Every other field of the record, passed through untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Marker {
    /// Create a labelled marker with no other fields.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: Some(marker.into()),
            ..Self::default()
        }
    }

    /// Attach the marker to a plant.
    #[must_use]
    pub fn for_plant(self, plant_id: PlantId) -> Self {
        self.with_field(PLANT_ID_FIELD, plant_id.to_string())
    }

    /// Add a phenotype reading.
    #[must_use]
    pub fn with_measurement(mut self, parameter: impl Into<String>, value: Decimal) -> Self {
        self.measurements.insert(parameter.into(), value);
        self
    }

    /// Set an arbitrary pass-through field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// The plant this record belongs to.
    ///
    /// `None` when there is no `plantId` field or it is not a UUID string.
    /// The field itself is kept either way.
    pub fn plant_id(&self) -> Option<PlantId> {
        self.fields
            .get(PLANT_ID_FIELD)
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .map(PlantId::from)
    }
}

/// A marker after the processing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedMarker {
    /// The original marker.
    #[serde(flatten)]
    pub marker: Marker,
    /// Whether the processing stage handled this marker.
    pub processed: bool,
}

impl ProcessedMarker {
    /// Mark a raw marker as processed.
    pub fn new(mut marker: Marker) -> Self {
        marker.fields.remove("processed");
        Self {
            marker,
            processed: true,
        }
    }
}

/// A marker after the tracking stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedMarker {
    /// The processed marker.
    #[serde(flatten)]
    pub processed: ProcessedMarker,
    /// Whether the tracking stage handled this marker.
    pub tracked: bool,
    /// Significant parameter deltas detected for this marker's plant.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changed_phenotypes: BTreeMap<String, Decimal>,
}

impl TrackedMarker {
    /// Mark a processed marker as tracked, with no phenotype changes.
    pub fn new(mut processed: ProcessedMarker) -> Self {
        let fields = &mut processed.marker.fields;
        fields.remove("tracked");
        fields.remove("changedPhenotypes");
        Self {
            processed,
            tracked: true,
            changed_phenotypes: BTreeMap::new(),
        }
    }

    /// Attach the significant changes detected for this marker.
    #[must_use]
    pub fn with_changes(mut self, changes: BTreeMap<String, Decimal>) -> Self {
        self.changed_phenotypes = changes;
        self
    }

    /// The raw marker underneath both stages.
    pub const fn marker(&self) -> &Marker {
        &self.processed.marker
    }
}
