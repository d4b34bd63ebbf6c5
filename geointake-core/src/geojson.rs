//! Pure summary of a parsed GeoJSON document.
//!
//! Only `FeatureCollection` and `Feature` documents are accepted; a bare
//! `Feature` is treated as a collection of one. The coordinate system is
//! always [`DEFAULT_COORDINATE_SYSTEM`] because RFC 7946 fixes GeoJSON to
//! WGS84.

use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::bounds::BoundsAccumulator;
use crate::info::{
    AttributeField, AttributeType, DEFAULT_COORDINATE_SYSTEM, GeospatialInfo,
    UNKNOWN_GEOMETRY_TYPE,
};

/// Reasons a JSON document cannot be summarised as GeoJSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum GeoJsonError {
    /// The top-level value is not an object.
    #[error("GeoJSON document must be a JSON object")]
    NotAnObject,
    /// The top-level `type` is neither `FeatureCollection` nor `Feature`.
    #[error("unsupported GeoJSON type {found:?}; expected FeatureCollection or Feature")]
    UnsupportedType {
        /// Type found in the document (empty when absent).
        found: String,
    },
    /// A `FeatureCollection` without a `features` array.
    #[error("FeatureCollection has no features array")]
    MissingFeatures,
}

/// Summarise a GeoJSON document.
///
/// `default_layer` names the layer when the document carries no top-level
/// `name` member; callers usually pass the file stem.
///
/// # Errors
/// Returns [`GeoJsonError`] when the document is not a feature collection
/// or a single feature.
///
/// # Examples
/// ```
/// use geointake_core::summarise_geojson;
/// use serde_json::json;
///
/// let document = json!({
///     "type": "FeatureCollection",
///     "features": [{
///         "type": "Feature",
///         "geometry": {"type": "Point", "coordinates": [106.8, -6.2]},
///         "properties": {"name": "Jakarta"}
///     }]
/// });
/// let info = summarise_geojson(&document, "cities")?;
/// assert_eq!(info.feature_count, 1);
/// assert_eq!(info.geometry_type, "Point");
/// assert_eq!(info.layer_name, "cities");
/// # Ok::<(), geointake_core::GeoJsonError>(())
/// ```
pub fn summarise_geojson(
    document: &Value,
    default_layer: &str,
) -> Result<GeospatialInfo, GeoJsonError> {
    let object = document.as_object().ok_or(GeoJsonError::NotAnObject)?;
    let features = features_of(document, object)?;

    let mut bounds = BoundsAccumulator::default();
    let mut schema = AttributeSchema::default();
    for feature in &features {
        if let Some(geometry) = feature.get("geometry") {
            bounds.include_geometry(geometry);
        }
        if let Some(Value::Object(properties)) = feature.get("properties") {
            schema.observe(properties);
        }
    }

    let geometry_type = features
        .first()
        .and_then(|feature| feature.get("geometry"))
        .and_then(|geometry| geometry.get("type"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_GEOMETRY_TYPE)
        .to_owned();
    let layer_name = object
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(default_layer)
        .to_owned();

    Ok(GeospatialInfo {
        feature_count: u64::try_from(features.len()).unwrap_or(u64::MAX),
        geometry_type,
        bounding_box: bounds.finish(),
        coordinate_system: DEFAULT_COORDINATE_SYSTEM.to_owned(),
        attributes: schema.into_fields(),
        layer_name,
    })
}

fn features_of<'a>(
    document: &'a Value,
    object: &'a Map<String, Value>,
) -> Result<Vec<&'a Value>, GeoJsonError> {
    match object.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => object
            .get("features")
            .and_then(Value::as_array)
            .map(|features| features.iter().collect())
            .ok_or(GeoJsonError::MissingFeatures),
        Some("Feature") => Ok(vec![document]),
        other => Err(GeoJsonError::UnsupportedType {
            found: other.unwrap_or_default().to_owned(),
        }),
    }
}

/// Union of property keys in first-seen order, typed by first occurrence.
#[derive(Debug, Default)]
struct AttributeSchema {
    fields: Vec<AttributeField>,
    seen: HashSet<String>,
}

impl AttributeSchema {
    fn observe(&mut self, properties: &Map<String, Value>) {
        for (name, value) in properties {
            if self.seen.insert(name.clone()) {
                self.fields
                    .push(AttributeField::new(name.clone(), AttributeType::from_json_value(value)));
            }
        }
    }

    fn into_fields(self) -> Vec<AttributeField> {
        self.fields
    }
}
