//! Geographic helpers for state queries
//!
//! Great-circle distance plus the longitude wraparound handling used by
//! bounding-box queries that cross the antimeridian.

use std::fmt;

/// Mean Earth radius used by the haversine formula
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Errors from longitude range mapping
#[derive(Debug, Clone, PartialEq)]
pub enum GeoError {
    /// Target range is empty or inverted
    InvalidRange { min: f64, max: f64 },
    /// Input value is NaN or infinite
    NotFinite(f64),
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoError::InvalidRange { min, max } => {
                write!(f, "Invalid longitude range: max ({}) must exceed min ({})", max, min)
            }
            GeoError::NotFinite(value) => write!(f, "Longitude is not a finite number ({})", value),
        }
    }
}

impl std::error::Error for GeoError {}

/// Great-circle distance between two points in kilometers (haversine formula)
///
/// All inputs are in degrees. Identical points yield exactly zero and antipodal
/// points yield half the Earth's circumference without special casing.
pub fn great_circle_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let h = (1.0 - delta_lat.cos() + lat1_rad.cos() * lat2_rad.cos() * (1.0 - delta_lon.cos()))
        / 2.0;

    // Rounding can push h a hair outside [0, 1] near antipodes
    2.0 * EARTH_RADIUS_KM * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Split a longitude range into sub-boxes that lie inside [-180, 180]
///
/// A caller may ask for a range that runs through the antimeridian, either as
/// `min > max` (e.g. 170 to -170) or with values outside [-180, 180]
/// (e.g. 160 to 200). The result is one box, or two boxes split at the seam,
/// whose union covers the same longitudes.
///
/// # Examples
///
/// ```
/// use skytrack::geo::normalize_longitude_bbox;
///
/// assert_eq!(normalize_longitude_bbox(10.0, 20.0), vec![(10.0, 20.0)]);
/// assert_eq!(
///     normalize_longitude_bbox(170.0, -170.0),
///     vec![(170.0, 180.0), (-180.0, -170.0)]
/// );
/// ```
pub fn normalize_longitude_bbox(lon_min: f64, lon_max: f64) -> Vec<(f64, f64)> {
    let mut span = lon_max - lon_min;
    if span < 0.0 {
        // Same as adding 360 until non-negative
        span = span.rem_euclid(360.0);
    }

    if span >= 360.0 {
        return vec![(-180.0, 180.0)];
    }

    let min = (lon_min + 180.0).rem_euclid(360.0) - 180.0;
    let max = min + span;

    if max <= 180.0 {
        vec![(min, max)]
    } else {
        vec![(min, 180.0), (-180.0, max - 360.0)]
    }
}

/// Shift a longitude by whole turns until it lies in `[range_min, range_max]`
///
/// This is the inverse of [`normalize_longitude_bbox`]: a value taken from a
/// normalized sub-box is re-expressed in the caller's own numbering. When the
/// range is narrower than a full turn and the value has no equivalent inside
/// it, the value is left at the first equivalent at or above `range_min`.
pub fn shift_longitude_into_range(lon: f64, range_min: f64, range_max: f64) -> Result<f64, GeoError> {
    if !lon.is_finite() {
        return Err(GeoError::NotFinite(lon));
    }
    if !range_min.is_finite() || !range_max.is_finite() || range_max <= range_min {
        return Err(GeoError::InvalidRange {
            min: range_min,
            max: range_max,
        });
    }

    if (range_min..=range_max).contains(&lon) {
        return Ok(lon);
    }

    Ok(range_min + (lon - range_min).rem_euclid(360.0))
}

/// Whether a longitude falls inside any of the given normalized sub-boxes
pub fn longitude_in_boxes(lon: f64, boxes: &[(f64, f64)]) -> bool {
    boxes.iter().any(|(min, max)| *min <= lon && lon <= *max)
}
