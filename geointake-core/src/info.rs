//! Structural metadata derived from a geospatial dataset.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::bounds::BoundingBox;

/// Coordinate system reported when a dataset does not declare one.
///
/// Projected datasets without a declaration are mislabelled by this default;
/// callers that care should treat it as "undeclared".
pub const DEFAULT_COORDINATE_SYSTEM: &str = "WGS84";

/// Geometry type reported when the first feature carries no geometry.
pub const UNKNOWN_GEOMETRY_TYPE: &str = "Unknown";

/// Attribute type of a single field in the schema.
///
/// GeoJSON values only ever produce [`AttributeType::String`],
/// [`AttributeType::Integer`] and [`AttributeType::Real`]; tool reports may
/// name any OGR field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// Text, and the fallback for values without a better match.
    String,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Integer64,
    /// Floating-point number.
    Real,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    DateTime,
    /// Any other type name reported by an external tool.
    Other(String),
}

impl AttributeType {
    /// Type a GeoJSON property by its runtime value.
    ///
    /// Numbers without a fractional part count as integers, so `5.0` types
    /// as [`AttributeType::Integer`].
    ///
    /// # Examples
    /// ```
    /// use geointake_core::AttributeType;
    /// use serde_json::json;
    ///
    /// assert_eq!(AttributeType::from_json_value(&json!(3)), AttributeType::Integer);
    /// assert_eq!(AttributeType::from_json_value(&json!(3.5)), AttributeType::Real);
    /// assert_eq!(AttributeType::from_json_value(&json!(true)), AttributeType::String);
    /// ```
    #[must_use]
    pub fn from_json_value(value: &Value) -> Self {
        match value {
            Value::Number(number) if number.is_i64() || number.is_u64() => Self::Integer,
            Value::Number(number) => match number.as_f64() {
                Some(float) if float.is_finite() && float.fract().abs() < f64::EPSILON => {
                    Self::Integer
                }
                _ => Self::Real,
            },
            Value::Null | Value::Bool(_) | Value::String(_) | Value::Array(_) | Value::Object(_) => {
                Self::String
            }
        }
    }

    /// Map an OGR field type name (as printed by `ogrinfo`) onto a type.
    #[must_use]
    pub fn from_ogr_name(name: &str) -> Self {
        match name {
            "String" => Self::String,
            "Integer" => Self::Integer,
            "Integer64" => Self::Integer64,
            "Real" => Self::Real,
            "Date" => Self::Date,
            "Time" => Self::Time,
            "DateTime" => Self::DateTime,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Return the type name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Integer64 => "Integer64",
            Self::Real => "Real",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::DateTime => "DateTime",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AttributeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One named, typed attribute column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeField {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub field_type: AttributeType,
}

impl AttributeField {
    /// Construct a field.
    pub fn new(name: impl Into<String>, field_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Structural metadata describing one dataset layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeospatialInfo {
    /// Number of features in the layer.
    pub feature_count: u64,
    /// Geometry type of the layer, as named by GeoJSON or OGR.
    pub geometry_type: String,
    /// Extent of all geometry, or [`BoundingBox::EMPTY`].
    pub bounding_box: BoundingBox,
    /// `EPSG:<code>` label, raw WKT, or [`DEFAULT_COORDINATE_SYSTEM`].
    pub coordinate_system: String,
    /// Attribute schema in first-seen order.
    pub attributes: Vec<AttributeField>,
    /// Layer name.
    pub layer_name: String,
}
