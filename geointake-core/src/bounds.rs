//! Bounding boxes and the recursive coordinate reducer that builds them.
//!
//! GeoJSON stores coordinates as nested arrays whose depth depends on the
//! geometry type. The accumulator walks those arrays with a bounded depth,
//! treating any array that starts with two numbers as a position and
//! ignoring everything it cannot interpret.

use geo::{Coord, Rect};
use serde::Serialize;
use serde_json::Value;

/// Maximum array nesting visited when collecting coordinates.
///
/// `MultiPolygon` is the deepest GeoJSON geometry at four levels.
pub const MAX_COORDINATE_DEPTH: usize = 8;

/// Axis-aligned rectangle enclosing a dataset.
///
/// An empty dataset is represented by [`BoundingBox::EMPTY`], the all-zero
/// sentinel; partially infinite boxes never escape this type.
///
/// # Examples
/// ```
/// use geo::{Coord, Rect};
/// use geointake_core::BoundingBox;
///
/// let rect = Rect::new(Coord { x: 1.0, y: 2.0 }, Coord { x: -1.0, y: 4.0 });
/// let bbox = BoundingBox::from(rect);
/// assert_eq!(bbox.min_x, -1.0);
/// assert_eq!(bbox.max_y, 4.0);
/// assert!(BoundingBox::from_bounds(None).is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Smallest x ordinate (longitude for geographic data).
    pub min_x: f64,
    /// Smallest y ordinate (latitude for geographic data).
    pub min_y: f64,
    /// Largest x ordinate.
    pub max_x: f64,
    /// Largest y ordinate.
    pub max_y: f64,
}

impl BoundingBox {
    /// Sentinel used when no geometry was found.
    pub const EMPTY: Self = Self {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 0.0,
        max_y: 0.0,
    };

    /// Build a box from explicit extents, falling back to [`Self::EMPTY`]
    /// when any ordinate is not finite or the extents are inverted.
    #[must_use]
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let finite = [min_x, min_y, max_x, max_y].iter().all(|value| value.is_finite());
        if finite && min_x <= max_x && min_y <= max_y {
            Self {
                min_x,
                min_y,
                max_x,
                max_y,
            }
        } else {
            Self::EMPTY
        }
    }

    /// Convert optional bounds into a box, using the sentinel for `None`.
    #[must_use]
    pub fn from_bounds(bounds: Option<Rect<f64>>) -> Self {
        bounds.map_or(Self::EMPTY, Self::from)
    }

    /// Whether this is the all-zero sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Whether the point lies inside or on the edge of the box.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        let min = rect.min();
        let max = rect.max();
        Self::new(min.x, min.y, max.x, max.y)
    }
}

/// Reduces coordinates into a running bounding rectangle.
///
/// # Examples
/// ```
/// use geointake_core::BoundsAccumulator;
/// use serde_json::json;
///
/// let mut accumulator = BoundsAccumulator::default();
/// accumulator.include_geometry(&json!({
///     "type": "LineString",
///     "coordinates": [[0.0, 1.0], [2.0, -3.0]]
/// }));
/// let bbox = accumulator.finish();
/// assert_eq!((bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y), (0.0, -3.0, 2.0, 1.0));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundsAccumulator {
    bounds: Option<Rect<f64>>,
}

impl BoundsAccumulator {
    /// Widen the bounds to include a single position. Non-finite values are
    /// ignored.
    pub fn include_point(&mut self, x: f64, y: f64) {
        if !(x.is_finite() && y.is_finite()) {
            return;
        }
        let coordinate = Coord { x, y };
        self.include_bounds(Rect::new(coordinate, coordinate));
    }

    /// Widen the bounds to include another rectangle.
    pub fn include_bounds(&mut self, bounds: Rect<f64>) {
        match &mut self.bounds {
            Some(existing) => {
                let min = Coord {
                    x: existing.min().x.min(bounds.min().x),
                    y: existing.min().y.min(bounds.min().y),
                };
                let max = Coord {
                    x: existing.max().x.max(bounds.max().x),
                    y: existing.max().y.max(bounds.max().y),
                };
                *existing = Rect::new(min, max);
            }
            None => self.bounds = Some(bounds),
        }
    }

    /// Walk a nested coordinate array of any supported depth.
    pub fn include_coordinates(&mut self, coordinates: &Value) {
        self.visit_coordinates(coordinates, 0);
    }

    /// Include a GeoJSON geometry object, descending into
    /// `GeometryCollection` members.
    pub fn include_geometry(&mut self, geometry: &Value) {
        self.visit_geometry(geometry, 0);
    }

    /// Combine two partial accumulators.
    #[must_use]
    pub fn combine(mut self, other: Self) -> Self {
        if let Some(bounds) = other.bounds {
            self.include_bounds(bounds);
        }
        self
    }

    /// Bounds gathered so far, if any position was seen.
    #[must_use]
    pub const fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }

    /// Finish accumulation, returning the sentinel when nothing was seen.
    #[must_use]
    pub fn finish(self) -> BoundingBox {
        BoundingBox::from_bounds(self.bounds)
    }

    fn visit_coordinates(&mut self, node: &Value, depth: usize) {
        if depth > MAX_COORDINATE_DEPTH {
            return;
        }
        let Value::Array(items) = node else {
            return;
        };
        if let Some((x, y)) = as_position(items) {
            self.include_point(x, y);
            return;
        }
        for item in items {
            self.visit_coordinates(item, depth + 1);
        }
    }

    fn visit_geometry(&mut self, geometry: &Value, depth: usize) {
        if depth > MAX_COORDINATE_DEPTH {
            return;
        }
        let Some(object) = geometry.as_object() else {
            return;
        };
        if let Some(coordinates) = object.get("coordinates") {
            self.visit_coordinates(coordinates, 0);
        }
        if let Some(Value::Array(members)) = object.get("geometries") {
            for member in members {
                self.visit_geometry(member, depth + 1);
            }
        }
    }
}

/// Compute the bounds of a single coordinate tree.
///
/// # Examples
/// ```
/// use geointake_core::coordinate_bounds;
/// use serde_json::json;
///
/// assert!(coordinate_bounds(&json!([[["a", "b"]]])).is_none());
/// let rect = coordinate_bounds(&json!([[[1, 2], [3, 4]]])).expect("bounds");
/// assert_eq!(rect.max().y, 4.0);
/// ```
#[must_use]
pub fn coordinate_bounds(coordinates: &Value) -> Option<Rect<f64>> {
    let mut accumulator = BoundsAccumulator::default();
    accumulator.include_coordinates(coordinates);
    accumulator.bounds()
}

/// A position is an array whose members are all numbers, with at least two.
fn as_position(items: &[Value]) -> Option<(f64, f64)> {
    match items {
        [Value::Number(x), Value::Number(y), rest @ ..] if rest.iter().all(Value::is_number) => {
            Some((x.as_f64()?, y.as_f64()?))
        }
        _ => None,
    }
}
