//! Solar system bodies: physical properties, surface appearance, rotation,
//! orbits, and the nested planetary systems they form.
//!
//! Distances are kilometers and times are Julian dates. Orbits are expressed
//! in the parent's frame with +Y toward the ecliptic (or equatorial) north
//! pole, so the orbital plane of an uninclined orbit is XZ.

use std::f64::consts::TAU;
use std::fmt;

use glam::{DQuat, DVec3, Quat};

use crate::astro;
use crate::color::Color;
use crate::flags::bit_flags;
use crate::texture::MultiResTexture;

/// Stable identity of a body within a universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

/// Handle to a mesh registered with the render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyClass {
    Planet,
    Moon,
    Asteroid,
    Comet,
    Spacecraft,
    Invisible,
}

impl BodyClass {
    /// Whether orbits of this class are drawn without being selected.
    pub fn shows_orbit(self) -> bool {
        matches!(self, Self::Planet | Self::Moon)
    }
}

bit_flags! {
    /// How a surface's textures combine.
    pub struct AppearanceFlags(u32) {
        /// Modulate the base texture by the surface color.
        const BLEND_TEXTURE = 0x01, "blend_texture";
        const APPLY_BUMP_MAP = 0x02, "apply_bump_map";
        const APPLY_NIGHT_MAP = 0x04, "apply_night_map";
        const SPECULAR_REFLECTION = 0x08, "specular_reflection";
        /// The specular texture is a gloss map rather than the base
        /// texture's alpha.
        const SEPARATE_SPECULAR_MAP = 0x10, "separate_specular_map";
        /// Self-lit; no sun shading.
        const EMISSIVE = 0x20, "emissive";
    }
}

/// Material description of a body's visible surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub color: Color,
    /// Rgb is the haze color; alpha is its density.
    pub haze_color: Color,
    pub specular_color: Color,
    pub specular_power: f32,
    pub base_texture: MultiResTexture,
    pub bump_texture: MultiResTexture,
    pub night_texture: MultiResTexture,
    pub specular_texture: MultiResTexture,
    pub bump_height: f32,
    pub appearance_flags: AppearanceFlags,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            haze_color: Color::new(0.0, 0.0, 0.0, 0.0),
            specular_color: Color::BLACK,
            specular_power: 0.0,
            base_texture: MultiResTexture::default(),
            bump_texture: MultiResTexture::default(),
            night_texture: MultiResTexture::default(),
            specular_texture: MultiResTexture::default(),
            bump_height: 0.0,
            appearance_flags: AppearanceFlags::NONE,
        }
    }
}

/// Atmosphere shell and optional cloud layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Atmosphere {
    /// Thickness above the surface (km).
    pub height: f32,
    pub lower_color: Color,
    pub upper_color: Color,
    /// Sky color seen from inside the atmosphere.
    pub sky_color: Color,
    /// Height of the cloud layer above the surface (km).
    pub cloud_height: f32,
    /// Cloud drift relative to the surface, radians per day.
    pub cloud_speed: f32,
    pub cloud_texture: MultiResTexture,
}

impl Default for Atmosphere {
    fn default() -> Self {
        Self {
            height: 0.0,
            lower_color: Color::BLACK,
            upper_color: Color::BLACK,
            sky_color: Color::BLACK,
            cloud_height: 0.0,
            cloud_speed: 0.0,
            cloud_texture: MultiResTexture::default(),
        }
    }
}

/// Planetary rings in the body's equatorial plane.
#[derive(Debug, Clone, PartialEq)]
pub struct RingSystem {
    /// Inner and outer radius from the body center (km).
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub color: Color,
    pub texture: MultiResTexture,
}

/// Spin axis and rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationElements {
    /// Sidereal rotation period (days).
    pub period: f64,
    /// Rotation angle at `epoch` (radians).
    pub offset: f64,
    pub epoch: f64,
    /// Tilt of the equator against the parent frame (radians).
    pub obliquity: f64,
    /// Longitude of the equator's ascending node (radians).
    pub ascending_node: f64,
    /// Ascending node drift (radians per day).
    pub precession_rate: f64,
}

impl Default for RotationElements {
    fn default() -> Self {
        Self {
            period: 1.0,
            offset: 0.0,
            epoch: astro::J2000,
            obliquity: 0.0,
            ascending_node: 0.0,
            precession_rate: 0.0,
        }
    }
}

impl RotationElements {
    /// Equatorial frame of the body relative to its parent frame.
    pub fn equator_orientation(&self, t: f64) -> DQuat {
        let node = self.ascending_node + self.precession_rate * (t - self.epoch);
        DQuat::from_rotation_y(node) * DQuat::from_rotation_x(self.obliquity)
    }

    /// Spin angle at `t`. Half a turn is added so longitude zero falls in
    /// the middle of a cylindrical texture map.
    pub fn rotation_angle(&self, t: f64) -> f64 {
        let rotations = (t - self.epoch) / self.period;
        let remainder = rotations - rotations.floor() + 0.5;
        remainder * TAU + self.offset
    }
}

/// Trajectory of a body around its parent.
pub trait Orbit: fmt::Debug + Send + Sync {
    /// Position (km) relative to the parent at Julian date `t`.
    fn position_at_time(&self, t: f64) -> DVec3;

    /// Orbital period in days.
    fn period(&self) -> f64;

    /// Radius of a sphere around the parent that contains the whole orbit.
    fn bounding_radius(&self) -> f64;

    /// Changes whenever the orbit's parameters change.
    fn revision(&self) -> u64 {
        0
    }

    /// Append `count` points evenly spaced in time over one period.
    fn sample(&self, start: f64, count: usize, out: &mut Vec<DVec3>) {
        let dt = self.period() / count as f64;
        out.extend((0..count).map(|i| self.position_at_time(start + dt * i as f64)));
    }
}

/// Classical orbital elements of an elliptical orbit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalElements {
    /// Pericenter distance (km).
    pub pericenter_distance: f64,
    pub eccentricity: f64,
    /// All angles in radians.
    pub inclination: f64,
    pub ascending_node: f64,
    pub arg_of_periapsis: f64,
    pub mean_anomaly_at_epoch: f64,
    /// Days.
    pub period: f64,
    pub epoch: f64,
}

impl OrbitalElements {
    /// A circular orbit in the reference plane.
    pub fn circular(radius: f64, period: f64) -> Self {
        Self {
            pericenter_distance: radius,
            eccentricity: 0.0,
            inclination: 0.0,
            ascending_node: 0.0,
            arg_of_periapsis: 0.0,
            mean_anomaly_at_epoch: 0.0,
            period,
            epoch: astro::J2000,
        }
    }
}

const KEPLER_ITERATIONS: usize = 12;
const KEPLER_TOLERANCE: f64 = 1.0e-12;

/// Elliptical Kepler orbit.
#[derive(Debug, Clone, PartialEq)]
pub struct KeplerOrbit {
    elements: OrbitalElements,
    revision: u64,
}

impl KeplerOrbit {
    pub fn new(elements: OrbitalElements) -> Self {
        debug_assert!(elements.eccentricity < 1.0, "only closed orbits are supported");
        Self {
            elements,
            revision: 0,
        }
    }

    pub fn elements(&self) -> &OrbitalElements {
        &self.elements
    }

    /// Replace the elements, bumping the revision so cached samples of the
    /// old path are discarded.
    pub fn set_elements(&mut self, elements: OrbitalElements) {
        self.elements = elements;
        self.revision += 1;
    }

    /// Solve Kepler's equation `E - e sin E = M` by Newton-Raphson.
    pub fn eccentric_anomaly(&self, mean_anomaly: f64) -> f64 {
        let e = self.elements.eccentricity;
        if e == 0.0 {
            return mean_anomaly;
        }
        let mut ecc_anomaly = if e < 0.8 { mean_anomaly } else { std::f64::consts::PI };
        for _ in 0..KEPLER_ITERATIONS {
            let f = ecc_anomaly - e * ecc_anomaly.sin() - mean_anomaly;
            let step = f / (1.0 - e * ecc_anomaly.cos());
            ecc_anomaly -= step;
            if step.abs() < KEPLER_TOLERANCE {
                break;
            }
        }
        ecc_anomaly
    }

    fn semi_major_axis(&self) -> f64 {
        self.elements.pericenter_distance / (1.0 - self.elements.eccentricity)
    }

    fn position_at_eccentric_anomaly(&self, ecc_anomaly: f64) -> DVec3 {
        let e = self.elements.eccentricity;
        let a = self.semi_major_axis();
        let x = a * (ecc_anomaly.cos() - e);
        let z = a * (1.0 - e * e).sqrt() * -ecc_anomaly.sin();
        let orientation = DQuat::from_rotation_y(self.elements.ascending_node)
            * DQuat::from_rotation_x(self.elements.inclination)
            * DQuat::from_rotation_y(self.elements.arg_of_periapsis);
        orientation * DVec3::new(x, 0.0, z)
    }
}

impl Orbit for KeplerOrbit {
    fn position_at_time(&self, t: f64) -> DVec3 {
        let mean_motion = TAU / self.elements.period;
        let mean_anomaly =
            self.elements.mean_anomaly_at_epoch + (t - self.elements.epoch) * mean_motion;
        self.position_at_eccentric_anomaly(self.eccentric_anomaly(mean_anomaly))
    }

    fn period(&self) -> f64 {
        self.elements.period
    }

    fn bounding_radius(&self) -> f64 {
        let e = self.elements.eccentricity;
        self.elements.pericenter_distance * (1.0 + e) / (1.0 - e)
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    /// Samples evenly in eccentric anomaly, which packs points near
    /// pericenter where the path curves most.
    fn sample(&self, _start: f64, count: usize, out: &mut Vec<DVec3>) {
        let step = TAU / count as f64;
        out.extend((0..count).map(|i| self.position_at_eccentric_anomaly(step * i as f64)));
    }
}

/// A body that stays put relative to its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedOrbit {
    pub position: DVec3,
}

impl Orbit for FixedOrbit {
    fn position_at_time(&self, _t: f64) -> DVec3 {
        self.position
    }

    fn period(&self) -> f64 {
        1.0
    }

    fn bounding_radius(&self) -> f64 {
        self.position.length()
    }
}

/// A planet, moon, asteroid, comet or spacecraft.
#[derive(Debug)]
pub struct Body {
    pub id: BodyId,
    pub name: String,
    pub class: BodyClass,
    /// Equatorial radius (km).
    pub radius: f32,
    pub oblateness: f32,
    pub albedo: f32,
    pub rotation: RotationElements,
    /// Extra fixed rotation applied in body space.
    pub orientation: Quat,
    pub surface: Surface,
    pub atmosphere: Option<Atmosphere>,
    pub rings: Option<RingSystem>,
    /// Replaces the procedural sphere.
    pub mesh: Option<MeshHandle>,
    pub orbit: Box<dyn Orbit>,
    pub satellites: Option<PlanetarySystem>,
}

impl Body {
    pub fn new(
        id: BodyId,
        name: impl Into<String>,
        class: BodyClass,
        radius: f32,
        orbit: Box<dyn Orbit>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            class,
            radius,
            oblateness: 0.0,
            albedo: 0.5,
            rotation: RotationElements::default(),
            orientation: Quat::IDENTITY,
            surface: Surface::default(),
            atmosphere: None,
            rings: None,
            mesh: None,
            orbit,
            satellites: None,
        }
    }

    /// Equatorial frame relative to the parent frame; satellites orbit in it.
    pub fn equator_orientation(&self, t: f64) -> DQuat {
        self.rotation.equator_orientation(t)
    }

    /// Body-fixed frame relative to the parent frame at `t`.
    pub fn body_orientation(&self, t: f64) -> Quat {
        let spin = DQuat::from_rotation_y(self.rotation.rotation_angle(t));
        (self.equator_orientation(t) * spin).as_quat() * self.orientation
    }

    /// Power reflected toward the viewer relative to the sun's output,
    /// for a body `distance_from_sun` km away from a star of
    /// `sun_luminosity` solar units.
    pub fn luminosity(&self, sun_luminosity: f32, distance_from_sun: f64) -> f32 {
        let power = astro::SOLAR_POWER * sun_luminosity as f64;
        let distance_m = distance_from_sun * 1000.0;
        let irradiance = power / (4.0 * std::f64::consts::PI * distance_m * distance_m);
        let radius_m = self.radius as f64 * 1000.0;
        let incident = irradiance * std::f64::consts::PI * radius_m * radius_m;
        (incident * self.albedo as f64 / astro::SOLAR_POWER) as f32
    }

    /// Apparent magnitude corrected for phase. `sun_to_body` and
    /// `viewer_to_body` are in km.
    pub fn apparent_magnitude(
        &self,
        sun_luminosity: f32,
        sun_to_body: DVec3,
        viewer_to_body: DVec3,
    ) -> f32 {
        let distance_to_viewer = viewer_to_body.length();
        let distance_to_sun = sun_to_body.length();
        let illuminated = if distance_to_viewer > 0.0 && distance_to_sun > 0.0 {
            (1.0 + (viewer_to_body / distance_to_viewer).dot(sun_to_body / distance_to_sun)) * 0.5
        } else {
            1.0
        };
        let lum = self.luminosity(sun_luminosity, distance_to_sun) * illuminated as f32;
        astro::lum_to_app_mag(lum, astro::km_to_ly(distance_to_viewer) as f32)
    }

    pub fn satellites(&self) -> Option<&PlanetarySystem> {
        self.satellites.as_ref()
    }
}

/// Bodies orbiting one primary.
#[derive(Debug, Default)]
pub struct PlanetarySystem {
    bodies: Vec<Body>,
}

impl PlanetarySystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, body: Body) {
        self.bodies.push(body);
    }

    #[must_use]
    pub fn with(mut self, body: Body) -> Self {
        self.add(body);
        self
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut [Body] {
        &mut self.bodies
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Depth-first search for a body by id.
    pub fn find(&self, id: BodyId) -> Option<&Body> {
        let mut stack: Vec<&PlanetarySystem> = vec![self];
        while let Some(system) = stack.pop() {
            for body in &system.bodies {
                if body.id == id {
                    return Some(body);
                }
                if let Some(satellites) = &body.satellites {
                    stack.push(satellites);
                }
            }
        }
        None
    }

    pub fn find_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        for body in &mut self.bodies {
            if body.id == id {
                return Some(body);
            }
            if let Some(found) = body.satellites.as_mut().and_then(|s| s.find_mut(id)) {
                return Some(found);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn earth_like() -> Body {
        let orbit = KeplerOrbit::new(OrbitalElements::circular(astro::KM_PER_AU, 365.25));
        let mut body = Body::new(BodyId(3), "Earth", BodyClass::Planet, 6378.0, Box::new(orbit));
        body.albedo = 0.3;
        body
    }

    #[test]
    fn test_kepler_solution_satisfies_equation() {
        let mut elements = OrbitalElements::circular(1.0e6, 10.0);
        for e in [0.1, 0.5, 0.95] {
            elements.eccentricity = e;
            let orbit = KeplerOrbit::new(elements);
            for m in [0.1, 1.0, 3.0, 5.5] {
                let ecc = orbit.eccentric_anomaly(m);
                assert!((ecc - e * ecc.sin() - m).abs() < 1e-9, "e={e} m={m}");
            }
        }
    }

    #[test]
    fn test_circular_orbit_radius_and_period() {
        let orbit = KeplerOrbit::new(OrbitalElements::circular(1000.0, 4.0));
        for t in [0.0, 1.0, 2.5] {
            let p = orbit.position_at_time(astro::J2000 + t);
            assert!((p.length() - 1000.0).abs() < 1e-6);
            assert!(p.y.abs() < 1e-9);
        }
        let a = orbit.position_at_time(astro::J2000);
        let b = orbit.position_at_time(astro::J2000 + 4.0);
        assert!((a - b).length() < 1e-6);
        assert_eq!(orbit.bounding_radius(), 1000.0);
    }

    #[test]
    fn test_eccentric_bounding_radius_is_apocenter() {
        let mut elements = OrbitalElements::circular(100.0, 1.0);
        elements.eccentricity = 0.5;
        let orbit = KeplerOrbit::new(elements);
        assert!((orbit.bounding_radius() - 300.0).abs() < 1e-9);
        let mut points = Vec::new();
        orbit.sample(0.0, 100, &mut points);
        assert_eq!(points.len(), 100);
        let max = points.iter().map(|p| p.length()).fold(0.0, f64::max);
        assert!(max <= orbit.bounding_radius() + 1e-6);
    }

    #[test]
    fn test_set_elements_bumps_revision() {
        let mut orbit = KeplerOrbit::new(OrbitalElements::circular(1.0, 1.0));
        assert_eq!(orbit.revision(), 0);
        orbit.set_elements(OrbitalElements::circular(2.0, 1.0));
        assert_eq!(orbit.revision(), 1);
        assert_eq!(orbit.elements().pericenter_distance, 2.0);
    }

    #[test]
    fn test_rotation_angle_wraps_and_offsets_half_turn() {
        let rotation = RotationElements::default();
        let angle = rotation.rotation_angle(astro::J2000);
        assert!((angle - std::f64::consts::PI).abs() < 1e-12);
        let later = rotation.rotation_angle(astro::J2000 + 10.25);
        assert!((later - 0.75 * TAU).abs() < 1e-9);
    }

    #[test]
    fn test_full_phase_is_brighter_than_crescent() {
        let earth = earth_like();
        let sun_to_body = DVec3::new(astro::KM_PER_AU, 0.0, 0.0);
        let full = earth.apparent_magnitude(1.0, sun_to_body, DVec3::new(1.0e6, 0.0, 0.0));
        let crescent = earth.apparent_magnitude(1.0, sun_to_body, DVec3::new(-1.0e6, 1.0e4, 0.0));
        assert!(full < crescent);
    }

    #[test]
    fn test_luminosity_falls_with_distance() {
        let earth = earth_like();
        let near = earth.luminosity(1.0, astro::KM_PER_AU);
        let far = earth.luminosity(1.0, 2.0 * astro::KM_PER_AU);
        assert!((near / far - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_find_nested_bodies() {
        let moon = Body::new(
            BodyId(31),
            "Moon",
            BodyClass::Moon,
            1737.0,
            Box::new(FixedOrbit {
                position: DVec3::new(384_400.0, 0.0, 0.0),
            }),
        );
        let mut earth = earth_like();
        earth.satellites = Some(PlanetarySystem::new().with(moon));
        let mut system = PlanetarySystem::new().with(earth);

        assert_eq!(system.find(BodyId(31)).map(|b| b.name.as_str()), Some("Moon"));
        assert!(system.find(BodyId(99)).is_none());
        system.find_mut(BodyId(31)).unwrap().radius = 1738.0;
        assert_eq!(system.find(BodyId(31)).unwrap().radius, 1738.0);
        assert_eq!(system.len(), 1);
    }

    #[test]
    fn test_body_orientation_spins_about_pole() {
        let body = earth_like();
        let q = body.body_orientation(astro::J2000 + 0.25);
        let pole = q * glam::Vec3::Y;
        assert!((pole - glam::Vec3::Y).length() < 1e-5);
    }
}
