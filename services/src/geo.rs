//! Great-circle distance on a spherical Earth.

use crate::error::AppError;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two points given in signed decimal degrees.
///
/// Symmetric, zero for identical points, never negative. Non-finite inputs
/// propagate as NaN; validate with [`validate_coordinates`] first.
pub fn distance_meters(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let phi_a = lat_a.to_radians();
    let phi_b = lat_b.to_radians();
    // abs() keeps the result bit-identical when the arguments are swapped.
    let d_phi = (lat_b - lat_a).abs().to_radians();
    let d_lambda = (lon_b - lon_a).abs().to_radians();

    let half_chord = (d_phi / 2.0).sin().powi(2)
        + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    let angle = 2.0 * half_chord.sqrt().atan2((1.0 - half_chord).max(0.0).sqrt());

    EARTH_RADIUS_M * angle
}

/// Rejects non-finite or out-of-range coordinates.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), AppError> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(AppError::Validation("Coordinates must be finite numbers".into()));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::Validation("Latitude must be between -90 and 90".into()));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::Validation("Longitude must be between -180 and 180".into()));
    }
    Ok(())
}
