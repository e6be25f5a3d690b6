//! # ECEF to Local Horizon Transform
//!
//! Converts raw satellite ECEF positions into elevation/azimuth as seen from
//! the observation site.
//!
//! The Earth is modelled as a sphere of radius [`EARTH_RADIUS_KM`] (no
//! flattening). Inputs share the unit of the modem's position fields (km); no
//! unit conversion is performed here.

use serde::{Deserialize, Serialize};

/// Spherical Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6378.137;

/// Observer location in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Direction to a satellite in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAngle {
    /// Elevation above the local horizon (may be negative)
    pub elevation_deg: f64,
    /// Azimuth clockwise from true north, in [0, 360)
    pub azimuth_deg: f64,
}

/// Local East-North-Up components of the observer-to-satellite vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Enu {
    pub east: f64,
    pub north: f64,
    pub up: f64,
}

/// Observer position in ECEF for a spherical Earth
pub fn observer_ecef(lat_deg: f64, lon_deg: f64) -> [f64; 3] {
    let (sin_lat, cos_lat) = lat_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon_deg.to_radians().sin_cos();
    [
        EARTH_RADIUS_KM * cos_lat * cos_lon,
        EARTH_RADIUS_KM * cos_lat * sin_lon,
        EARTH_RADIUS_KM * sin_lat,
    ]
}

/// Rotate the observer-to-satellite vector into the local ENU frame
pub fn ecef_to_enu(x: f64, y: f64, z: f64, lat_deg: f64, lon_deg: f64) -> Enu {
    let [ox, oy, oz] = observer_ecef(lat_deg, lon_deg);
    let (dx, dy, dz) = (x - ox, y - oy, z - oz);

    let (sin_lat, cos_lat) = lat_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon_deg.to_radians().sin_cos();

    Enu {
        east: -sin_lon * dx + cos_lon * dy,
        north: -sin_lat * cos_lon * dx - sin_lat * sin_lon * dy + cos_lat * dz,
        up: cos_lat * cos_lon * dx + cos_lat * sin_lon * dy + sin_lat * dz,
    }
}

/// Signed look angle from the observer to an ECEF point
///
/// Elevation is not clamped; below-horizon points have negative elevation.
pub fn look_angle(x: f64, y: f64, z: f64, lat_deg: f64, lon_deg: f64) -> LookAngle {
    let enu = ecef_to_enu(x, y, z, lat_deg, lon_deg);
    let horizontal = enu.east.hypot(enu.north);

    let elevation_deg = enu.up.atan2(horizontal).to_degrees();
    let mut azimuth_deg = enu.east.atan2(enu.north).to_degrees();
    if azimuth_deg < 0.0 {
        azimuth_deg += 360.0;
    }
    if azimuth_deg >= 360.0 {
        azimuth_deg -= 360.0;
    }

    LookAngle {
        elevation_deg,
        azimuth_deg,
    }
}

/// Elevation/azimuth of an ECEF point with elevation clamped to the horizon
///
/// Below-horizon geometry is reported as exactly 0°. This is lossy; use
/// [`look_angle`] when the signed elevation matters. NaN inputs propagate as
/// NaN rather than being clamped.
///
/// # Examples
///
/// ```
/// use site_survey::survey::geometry::{ecef_to_elev_az, EARTH_RADIUS_KM};
///
/// // Directly above an observer at 0°N 0°E
/// let (el, _az) = ecef_to_elev_az(EARTH_RADIUS_KM + 780.0, 0.0, 0.0, 0.0, 0.0);
/// assert!((el - 90.0).abs() < 1e-9);
/// ```
pub fn ecef_to_elev_az(x: f64, y: f64, z: f64, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
    let angle = look_angle(x, y, z, lat_deg, lon_deg);
    // `f64::max` would swallow NaN
    let elevation = if angle.elevation_deg < 0.0 {
        0.0
    } else {
        angle.elevation_deg
    };
    (elevation, angle.azimuth_deg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALTITUDE_KM: f64 = 780.0;

    fn above(lat: f64, lon: f64) -> [f64; 3] {
        let [x, y, z] = observer_ecef(lat, lon);
        let scale = (EARTH_RADIUS_KM + ALTITUDE_KM) / EARTH_RADIUS_KM;
        [x * scale, y * scale, z * scale]
    }

    #[test]
    fn test_zenith_is_ninety_degrees() {
        for &(lat, lon) in &[(0.0, 0.0), (51.5, -0.1), (-33.9, 151.2), (89.0, 45.0)] {
            let [x, y, z] = above(lat, lon);
            let (el, _) = ecef_to_elev_az(x, y, z, lat, lon);
            assert!((el - 90.0).abs() < 1e-6, "lat {} lon {} gave {}", lat, lon, el);
        }
    }

    #[test]
    fn test_cardinal_azimuths_at_equator() {
        let r = EARTH_RADIUS_KM;
        // North: displaced along +Z
        let (_, az) = ecef_to_elev_az(r + 100.0, 0.0, 2000.0, 0.0, 0.0);
        assert!(az.abs() < 1e-9 || (az - 360.0).abs() < 1e-9);
        // East: displaced along +Y
        let (_, az) = ecef_to_elev_az(r + 100.0, 2000.0, 0.0, 0.0, 0.0);
        assert!((az - 90.0).abs() < 1e-9);
        // South
        let (_, az) = ecef_to_elev_az(r + 100.0, 0.0, -2000.0, 0.0, 0.0);
        assert!((az - 180.0).abs() < 1e-9);
        // West
        let (_, az) = ecef_to_elev_az(r + 100.0, -2000.0, 0.0, 0.0, 0.0);
        assert!((az - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_below_horizon_clamped_to_zero() {
        // Antipodal point is far below the horizon
        let (el, _) = ecef_to_elev_az(-EARTH_RADIUS_KM - 780.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(el, 0.0);

        let raw = look_angle(-EARTH_RADIUS_KM - 780.0, 0.0, 0.0, 0.0, 0.0);
        assert!(raw.elevation_deg < 0.0);
    }

    #[test]
    fn test_azimuth_range() {
        for i in 0..36 {
            let theta = (i as f64 * 10.0).to_radians();
            let (_, az) = ecef_to_elev_az(
                EARTH_RADIUS_KM + 50.0,
                3000.0 * theta.sin(),
                3000.0 * theta.cos(),
                0.0,
                0.0,
            );
            assert!((0.0..360.0).contains(&az), "azimuth {} out of range", az);
        }
    }

    #[test]
    fn test_nan_propagates() {
        let (el, az) = ecef_to_elev_az(f64::NAN, 0.0, 0.0, 0.0, 0.0);
        assert!(el.is_nan());
        assert!(az.is_nan());
    }

    #[test]
    fn test_modem_sample_report() {
        // Sample report from a RockBLOCK log: 3716,-824,6052 km
        let (el, az) = ecef_to_elev_az(3716.0, -824.0, 6052.0, 52.0, -1.0);
        assert!(el > 0.0 && el <= 90.0);
        assert!((0.0..360.0).contains(&az));
    }
}
