//! Spatial math for grid sizing and extent estimates.
//!
//! Grid sizing uses a spherical earth at a flat 111 km per degree with no
//! ellipsoidal correction, so cell sizes in meters are nominal.

use crate::models::BoundingBox;

/// Meters per degree of latitude on the spherical approximation.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate distance between two points in meters using Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Meters per degree of longitude at a given latitude.
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    METERS_PER_DEGREE * lat_deg.to_radians().cos()
}

/// Convert a north/south length in meters to degrees latitude.
pub fn meters_to_lat(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Convert an east/west length in meters to degrees longitude.
/// Requires the reference latitude for proper scaling.
pub fn meters_to_lon(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lon(ref_lat_deg)
}

/// Cell step `(dx, dy)` in degrees for a metric cell size, sized at the
/// box's mid latitude.
pub fn cell_steps_deg(bounds: &BoundingBox, cell_size_m: f64) -> (f64, f64) {
    let mid_lat = bounds.mid_lat();
    (meters_to_lon(cell_size_m, mid_lat), meters_to_lat(cell_size_m))
}

/// Number of values in the half-open range `[start, end)` stepped by `step`.
pub(crate) fn half_open_count(start: f64, end: f64, step: f64) -> usize {
    if !(end > start) || !step.is_finite() || step <= 0.0 {
        return 0;
    }
    let count = ((end - start) / step).ceil();
    if count.is_finite() && count > 0.0 {
        count as usize
    } else {
        0
    }
}

/// Approximate (width, height) of the box in meters, measured through
/// its mid latitude and mid longitude.
pub fn approx_extent_m(bounds: &BoundingBox) -> (f64, f64) {
    let mid_lat = bounds.mid_lat();
    let mid_lon = (bounds.min_x + bounds.max_x) / 2.0;
    let width = haversine_distance(mid_lat, bounds.min_x, mid_lat, bounds.max_x);
    let height = haversine_distance(bounds.min_y, mid_lon, bounds.max_y, mid_lon);
    (width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn test_haversine_same_point() {
        let dist = haversine_distance(11.0, 78.0, 11.0, 78.0);
        assert!(dist < 0.001);
    }

    #[test]
    fn longitude_step_widens_away_from_equator() {
        let equator = meters_to_lon(500.0, 0.0);
        let sixty = meters_to_lon(500.0, 60.0);
        assert!((equator - 500.0 / 111_000.0).abs() < 1e-12);
        assert!((sixty - 2.0 * equator).abs() < 1e-9);
    }

    #[test]
    fn cell_steps_use_mid_latitude() {
        let bounds = BoundingBox::new(77.0, 10.8, 78.3, 11.2);
        let (dx, dy) = cell_steps_deg(&bounds, 500.0);
        assert!((dy - 500.0 / 111_000.0).abs() < 1e-15);
        let expected_dx = 500.0 / (111_000.0 * 11.0_f64.to_radians().cos());
        assert!((dx - expected_dx).abs() < 1e-12);
    }

    #[test]
    fn half_open_count_matches_ceil() {
        assert_eq!(half_open_count(0.0, 1.0, 0.5), 2);
        assert_eq!(half_open_count(0.0, 1.0, 0.3), 4);
        assert_eq!(half_open_count(0.0, 0.0, 0.5), 0);
        assert_eq!(half_open_count(1.0, 0.0, 0.5), 0);
        assert_eq!(half_open_count(0.0, 1.0, 0.0), 0);
        assert_eq!(half_open_count(0.0, 1.0, f64::INFINITY), 0);
    }

    #[test]
    fn extent_of_fallback_region_is_district_sized() {
        let (width, height) = approx_extent_m(&BoundingBox::new(77.0, 10.8, 78.3, 11.2));
        assert!(width > 140_000.0 && width < 143_000.0, "width {width}");
        assert!(height > 44_000.0 && height < 45_000.0, "height {height}");
    }
}
