//! Line scanner for the summary report printed by `ogrinfo -ro -so -al`.
//!
//! Only the first layer is read. The report looks like:
//!
//! ```text
//! Layer name: parcels
//! Geometry: Polygon
//! Feature Count: 120
//! Extent: (106.700000, -6.300000) - (106.900000, -6.100000)
//! Layer SRS WKT:
//! GEOGCRS["WGS 84",
//!     ...
//!     ID["EPSG",4326]]
//! Data axis to CRS axis mapping: 2,1
//! name: String (80.0)
//! area: Real (24.15)
//! ```

use geointake_core::{
    AttributeField, AttributeType, BoundingBox, DEFAULT_COORDINATE_SYSTEM, GeospatialInfo,
    UNKNOWN_GEOMETRY_TYPE,
};

const LAYER_NAME: &str = "Layer name:";
const GEOMETRY: &str = "Geometry:";
const FEATURE_COUNT: &str = "Feature Count:";
const EXTENT: &str = "Extent:";
const SRS_WKT: &str = "Layer SRS WKT:";
const SRS_TERMINATORS: [&str; 3] = [
    "Data axis to CRS axis mapping:",
    "FID Column",
    "Geometry Column",
];
const EPSG_MARKERS: [&str; 2] = ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Srs,
    Fields,
}

/// Parse an `ogrinfo` summary report.
///
/// Returns `None` when the report names no layer. Missing counts, extents
/// and geometry types fall back to zero, the empty box and `Unknown`.
///
/// # Examples
/// ```
/// use geointake_data::parse_ogrinfo_report;
///
/// let report = "Layer name: roads\nGeometry: Line String\nFeature Count: 3\n\
///               Extent: (0.000000, 1.000000) - (2.000000, 3.000000)\n\
///               Layer SRS WKT:\n(unknown)\nlanes: Integer (4.0)\n";
/// let info = parse_ogrinfo_report(report).expect("layer present");
/// assert_eq!(info.layer_name, "roads");
/// assert_eq!(info.feature_count, 3);
/// assert_eq!(info.coordinate_system, "WGS84");
/// assert_eq!(info.attributes[0].name, "lanes");
/// ```
#[must_use]
pub fn parse_ogrinfo_report(report: &str) -> Option<GeospatialInfo> {
    let mut layer_name: Option<String> = None;
    let mut geometry_type: Option<String> = None;
    let mut feature_count = 0_u64;
    let mut bounding_box = BoundingBox::EMPTY;
    let mut srs_lines: Vec<&str> = Vec::new();
    let mut attributes = Vec::new();
    let mut section = Section::Header;

    for raw in report.lines() {
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        if let Some(name) = trimmed.strip_prefix(LAYER_NAME) {
            if layer_name.is_some() {
                break;
            }
            layer_name = Some(name.trim().to_owned());
            continue;
        }
        if section == Section::Srs {
            if is_srs_terminator(trimmed) || parse_attribute_line(line).is_some() {
                section = Section::Fields;
            } else {
                srs_lines.push(line);
                continue;
            }
        }
        if section == Section::Fields
            && let Some(field) = parse_attribute_line(line)
        {
            attributes.push(field);
            continue;
        }
        if let Some(value) = trimmed.strip_prefix(GEOMETRY) {
            geometry_type = Some(value.trim().to_owned());
        } else if let Some(value) = trimmed.strip_prefix(FEATURE_COUNT) {
            feature_count = leading_digits(value).unwrap_or(0);
        } else if let Some(value) = trimmed.strip_prefix(EXTENT) {
            bounding_box = parse_extent(value);
        } else if trimmed.starts_with(SRS_WKT) {
            section = Section::Srs;
        } else if is_srs_terminator(trimmed) {
            section = Section::Fields;
        } else if let Some(field) = parse_attribute_line(line) {
            attributes.push(field);
        }
    }

    let layer_name = layer_name?;
    Some(GeospatialInfo {
        feature_count,
        geometry_type: geometry_type
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| UNKNOWN_GEOMETRY_TYPE.to_owned()),
        bounding_box,
        coordinate_system: coordinate_system(&srs_lines.join("\n")),
        attributes,
        layer_name,
    })
}

fn is_srs_terminator(line: &str) -> bool {
    SRS_TERMINATORS.iter().any(|prefix| line.starts_with(prefix))
}

fn leading_digits(value: &str) -> Option<u64> {
    let digits: String = value
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Read `(minx, miny) - (maxx, maxy)`, also accepting the 3D form.
fn parse_extent(value: &str) -> BoundingBox {
    let numbers: Vec<f64> = value
        .split(|ch: char| !(ch.is_ascii_digit() || matches!(ch, '.' | '-' | '+' | 'e' | 'E')))
        .filter_map(|token| token.parse().ok())
        .collect();
    match numbers.as_slice() {
        [min_x, min_y, max_x, max_y] | [min_x, min_y, _, max_x, max_y, _] => {
            BoundingBox::new(*min_x, *min_y, *max_x, *max_y)
        }
        _ => BoundingBox::EMPTY,
    }
}

/// Parse `name: Type (width.precision)`.
fn parse_attribute_line(line: &str) -> Option<AttributeField> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let (name, rest) = line.rsplit_once(": ")?;
    let (type_name, width) = rest.split_once(' ')?;
    let width = width.trim();
    let inner = width.strip_prefix('(')?.strip_suffix(')')?;
    let well_formed = !name.is_empty()
        && !type_name.is_empty()
        && inner.split('.').all(|part| part.chars().all(|ch| ch.is_ascii_digit()));
    well_formed.then(|| AttributeField::new(name, AttributeType::from_ogr_name(type_name)))
}

/// Derive a coordinate system label from the SRS block.
fn coordinate_system(srs: &str) -> String {
    let srs = srs.trim();
    if srs.is_empty() || srs == "(unknown)" {
        return DEFAULT_COORDINATE_SYSTEM.to_owned();
    }
    epsg_code(srs).map_or_else(|| srs.to_owned(), |code| format!("EPSG:{code}"))
}

/// The last EPSG authority in the text belongs to the outermost CRS.
fn epsg_code(wkt: &str) -> Option<u32> {
    EPSG_MARKERS
        .iter()
        .flat_map(|marker| {
            wkt.match_indices(marker)
                .filter_map(move |(index, _)| {
                    let rest = wkt.get(index + marker.len()..)?;
                    let code = leading_digits(rest.trim_start_matches('"'))?;
                    Some((index, u32::try_from(code).ok()?))
                })
        })
        .max_by_key(|(index, _)| *index)
        .map(|(_, code)| code)
}
