//! Pipeline input validation.
//!
//! Typed callers hand the pipeline a `Vec<Marker>` and only emptiness needs
//! checking. Untyped callers hand it JSON, which must be a non-empty array
//! whose elements all read as markers.

use phenowatch_types::Marker;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ValidationError;

/// Check that a typed batch is non-empty.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for an empty batch.
pub const fn validate_markers(markers: &[Marker]) -> Result<(), ValidationError> {
    if markers.is_empty() {
        return Err(ValidationError::Empty);
    }
    Ok(())
}

/// Read a JSON value as a non-empty batch of markers.
///
/// # Errors
///
/// Returns [`ValidationError::NotAnArray`] for anything but an array,
/// [`ValidationError::Empty`] for `[]`, and
/// [`ValidationError::MalformedMarker`] for the first element that is not a
/// marker object.
pub fn validate_input(input: &Value) -> Result<Vec<Marker>, ValidationError> {
    let items = match input {
        Value::Array(items) => items,
        other => {
            return Err(ValidationError::NotAnArray {
                found: json_type_name(other),
            });
        }
    };

    if items.is_empty() {
        return Err(ValidationError::Empty);
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            Marker::deserialize(item).map_err(|e| ValidationError::MalformedMarker {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
