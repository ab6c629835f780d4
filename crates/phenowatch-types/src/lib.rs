//! Shared type definitions for the Phenowatch phenotype tracker.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for plants and events
//! - [`marker`] -- Marker records passed between pipeline stages
//! - [`event`] -- Event payloads broadcast to observers

pub mod event;
pub mod ids;
pub mod marker;

pub use event::{EventKind, PhenotypeEvent};
pub use ids::{EventId, PlantId};
pub use marker::{Marker, PLANT_ID_FIELD, ProcessedMarker, TrackedMarker};

/// Leaf area phenotype parameter.
pub const LEAF_AREA: &str = "leafArea";

/// Stem height phenotype parameter.
pub const STEM_HEIGHT: &str = "stemHeight";

/// Chlorophyll content phenotype parameter.
pub const CHLOROPHYLL_CONTENT: &str = "chlorophyllContent";

/// Every parameter tracked by default, in declaration order.
pub const DEFAULT_PARAMETERS: [&str; 3] = [LEAF_AREA, STEM_HEIGHT, CHLOROPHYLL_CONTENT];
