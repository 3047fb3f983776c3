//! Astronomical constants and unit/magnitude conversions.

use std::f64::consts::{PI, TAU};

use glam::{DQuat, DVec3, Vec3};

pub const KM_PER_LY: f64 = 9_460_730_472_580.8;
pub const KM_PER_AU: f64 = 149_597_870.7;
pub const AU_PER_LY: f64 = KM_PER_LY / KM_PER_AU;
pub const LY_PER_PARSEC: f64 = 3.26156;

/// Julian date of the J2000 epoch.
pub const J2000: f64 = 2_451_545.0;
/// Obliquity of the ecliptic at J2000, in degrees.
pub const J2000_OBLIQUITY_DEG: f64 = 23.439_291_1;

/// Absolute visual magnitude of the Sun.
pub const SOLAR_ABSMAG: f32 = 4.83;
/// Solar luminosity in watts.
pub const SOLAR_POWER: f64 = 3.8462e26;

/// 2.5 / ln(10): converts natural-log luminosity ratios into magnitudes.
const LN_MAG: f32 = 1.085_736_2;

pub fn km_to_ly(km: f64) -> f64 {
    km / KM_PER_LY
}

pub fn ly_to_km(ly: f64) -> f64 {
    ly * KM_PER_LY
}

pub fn km_to_au(km: f64) -> f64 {
    km / KM_PER_AU
}

pub fn au_to_km(au: f64) -> f64 {
    au * KM_PER_AU
}

/// Apparent magnitude of an object of absolute magnitude `abs_mag` seen from
/// `ly` light years.
pub fn abs_to_app_mag(abs_mag: f32, ly: f32) -> f32 {
    abs_mag - 5.0 + 5.0 * (ly / LY_PER_PARSEC as f32).log10()
}

pub fn app_to_abs_mag(app_mag: f32, ly: f32) -> f32 {
    app_mag + 5.0 - 5.0 * (ly / LY_PER_PARSEC as f32).log10()
}

/// Absolute magnitude for a luminosity given in solar units.
pub fn lum_to_abs_mag(lum: f32) -> f32 {
    SOLAR_ABSMAG - lum.ln() * LN_MAG
}

/// Luminosity in solar units for an absolute magnitude.
pub fn abs_mag_to_lum(mag: f32) -> f32 {
    ((SOLAR_ABSMAG - mag) / LN_MAG).exp()
}

pub fn lum_to_app_mag(lum: f32, ly: f32) -> f32 {
    abs_to_app_mag(lum_to_abs_mag(lum), ly)
}

/// Point `distance` away at right ascension `ra` (hours) and declination
/// `dec` (degrees), in the ecliptic-aligned universal frame.
pub fn equatorial_to_celestial_cart(ra: f32, dec: f32, distance: f32) -> Vec3 {
    let theta = f64::from(ra) / 24.0 * TAU + PI;
    let phi = (f64::from(dec) / 90.0 - 1.0) * PI / 2.0;
    let equatorial = DVec3::new(
        theta.cos() * phi.sin(),
        phi.cos(),
        -theta.sin() * phi.sin(),
    ) * f64::from(distance);
    (DQuat::from_rotation_x(-J2000_OBLIQUITY_DEG.to_radians()) * equatorial).as_vec3()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_parsec_keeps_magnitude_offset() {
        // At 10 parsecs apparent and absolute magnitude coincide.
        let ten_pc = (10.0 * LY_PER_PARSEC) as f32;
        assert!((abs_to_app_mag(1.5, ten_pc) - 1.5).abs() < 1e-4);
        assert!((app_to_abs_mag(-1.46, ten_pc) + 1.46).abs() < 1e-4);
    }

    #[test]
    fn test_solar_luminosity_is_solar_magnitude() {
        assert!((lum_to_abs_mag(1.0) - SOLAR_ABSMAG).abs() < 1e-6);
        assert!((abs_mag_to_lum(SOLAR_ABSMAG) - 1.0).abs() < 1e-6);
        // A hundredfold luminosity is five magnitudes brighter.
        assert!((lum_to_abs_mag(100.0) - (SOLAR_ABSMAG - 5.0)).abs() < 1e-3);
    }

    #[test]
    fn test_sun_seen_from_earth() {
        let ly = km_to_ly(KM_PER_AU) as f32;
        let mag = lum_to_app_mag(1.0, ly);
        assert!((mag + 26.7).abs() < 0.2, "got {mag}");
    }

    #[test]
    fn test_distance_units() {
        assert!((ly_to_km(1.0) - KM_PER_LY).abs() < 1e-3);
        assert!((au_to_km(km_to_au(12345.0)) - 12345.0).abs() < 1e-6);
        assert!((AU_PER_LY - 63_241.077).abs() < 0.01);
    }

    #[test]
    fn test_celestial_pole_is_tilted_by_obliquity() {
        let pole = equatorial_to_celestial_cart(0.0, 90.0, 1.0);
        let tilt = J2000_OBLIQUITY_DEG.to_radians() as f32;
        assert!(pole.x.abs() < 1e-6);
        assert!((pole.y - tilt.cos()).abs() < 1e-5);
        assert!((pole.length() - 1.0).abs() < 1e-5);
        let equinox = equatorial_to_celestial_cart(0.0, 0.0, 10.0);
        assert!((equinox - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-4);
    }
}
