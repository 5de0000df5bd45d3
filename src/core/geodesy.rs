//! Great-circle distance and bearing on the mean Earth sphere.
//!
//! All downstream components (segment classification, crossover weighting,
//! sensor lay-back projection) share these primitives. Spherical haversine
//! math is accurate to well under 0.5% at survey scale, which is far below
//! GPS positioning error for a towed sensor.

use crate::types::Sample;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two geodetic points, in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// Initial bearing from point 1 to point 2, in degrees clockwise from north,
/// normalized to [0, 360)
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    let theta = y.atan2(x).to_degrees();
    (theta + 360.0) % 360.0
}

/// Direct geodetic problem: the point reached by travelling `distance_m`
/// meters from (lat, lon) along `bearing_deg`. Returns (lat, lon) in degrees.
pub fn destination(lat: f64, lon: f64, bearing_deg: f64, distance_m: f64) -> (f64, f64) {
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();
    let theta = bearing_deg.to_radians();
    let delta = distance_m / EARTH_RADIUS_M;

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    let mut lon2 = lambda2.to_degrees();
    if lon2 > 180.0 {
        lon2 -= 360.0;
    } else if lon2 < -180.0 {
        lon2 += 360.0;
    }
    (phi2.to_degrees(), lon2)
}

/// Cumulative along-track distance over a sample sequence, in meters
pub fn track_length(samples: &[Sample]) -> f64 {
    samples
        .windows(2)
        .map(|w| haversine_distance(w[0].lat, w[0].lon, w[1].lat, w[1].lon))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_haversine_zero_distance() {
        assert_eq!(haversine_distance(35.0, 139.0, 35.0, 139.0), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        // One degree of latitude is ~111.2 km on the mean sphere
        let d = haversine_distance(35.0, 139.0, 36.0, 139.0);
        assert_relative_eq!(d, 111_195.0, max_relative = 1e-3);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        assert_relative_eq!(initial_bearing(0.0, 0.0, 1.0, 0.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(initial_bearing(0.0, 0.0, 0.0, 1.0), 90.0, epsilon = 1e-9);
        assert_relative_eq!(initial_bearing(1.0, 0.0, 0.0, 0.0), 180.0, epsilon = 1e-9);
        assert_relative_eq!(initial_bearing(0.0, 1.0, 0.0, 0.0), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_destination_round_trip() {
        let (lat, lon) = destination(34.5, 138.2, 63.0, 5_000.0);
        let back = haversine_distance(34.5, 138.2, lat, lon);
        assert_relative_eq!(back, 5_000.0, max_relative = 1e-6);
        let bearing = initial_bearing(34.5, 138.2, lat, lon);
        assert_relative_eq!(bearing, 63.0, epsilon = 1e-3);
    }

    #[test]
    fn test_destination_wraps_antimeridian() {
        let (_, lon) = destination(0.0, 179.999, 90.0, 10_000.0);
        assert!(lon < -179.8, "expected wrap to west longitude, got {lon}");
    }
}
