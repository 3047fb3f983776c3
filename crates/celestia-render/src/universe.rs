//! The catalog the renderer draws from: stars and their planetary systems,
//! galaxies, constellation figures and boundaries.
//!
//! Star and galaxy positions are light years in the universal frame;
//! planetary systems are kilometers relative to their star.

use glam::{DVec3, Quat, Vec3};
use rustc_hash::FxHashMap;

use crate::astro;
use crate::body::PlanetarySystem;
use crate::color::Color;
use crate::frustum::{Frustum, Intersection};
use crate::texture::MultiResTexture;

/// Solar systems farther than this from the observer are ignored (ly).
pub const SOLAR_SYSTEM_SEARCH_RADIUS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectralClass {
    O,
    B,
    A,
    F,
    G,
    K,
    M,
    R,
    S,
    N,
    WhiteDwarf,
    NeutronStar,
    Unknown,
}

/// Which of the generic star surface textures a class uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StarTextureClass {
    B,
    A,
    G,
    M,
}

impl SpectralClass {
    /// Color of a point-like image of the star.
    pub fn apparent_color(self) -> Color {
        match self {
            Self::O => Color::rgb(0.7, 0.8, 1.0),
            Self::B => Color::rgb(0.8, 0.9, 1.0),
            Self::A => Color::rgb(1.0, 1.0, 1.0),
            Self::F => Color::rgb(1.0, 1.0, 0.88),
            Self::G => Color::rgb(1.0, 1.0, 0.75),
            Self::K => Color::rgb(1.0, 0.9, 0.7),
            Self::M => Color::rgb(1.0, 0.7, 0.7),
            Self::R | Self::S | Self::N => Color::rgb(1.0, 0.4, 0.4),
            Self::NeutronStar => Color::rgb(0.8, 0.9, 1.0),
            Self::WhiteDwarf | Self::Unknown => Color::WHITE,
        }
    }

    pub fn texture_class(self) -> StarTextureClass {
        match self {
            Self::O | Self::B => StarTextureClass::B,
            Self::G | Self::K => StarTextureClass::G,
            Self::M | Self::R | Self::S | Self::N => StarTextureClass::M,
            _ => StarTextureClass::A,
        }
    }

    /// Tint of the light the star casts on its planets.
    pub fn light_color(self) -> Color {
        match self {
            Self::O => Color::rgb(0.8, 0.8, 1.0),
            Self::B => Color::rgb(0.9, 0.9, 1.0),
            Self::K => Color::rgb(1.0, 0.9, 0.8),
            Self::M | Self::R | Self::S | Self::N => Color::rgb(1.0, 0.7, 0.7),
            _ => Color::WHITE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Star {
    pub id: StarId,
    pub name: String,
    /// Light years.
    pub position: DVec3,
    /// Kilometers.
    pub radius: f32,
    pub abs_mag: f32,
    pub spectral_class: SpectralClass,
    /// Days.
    pub rotation_period: f64,
    /// Replaces the generic texture for the spectral class.
    pub texture: Option<MultiResTexture>,
}

impl Star {
    pub fn new(
        id: StarId,
        name: impl Into<String>,
        position: DVec3,
        abs_mag: f32,
        spectral_class: SpectralClass,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            radius: 696_000.0,
            abs_mag,
            spectral_class,
            rotation_period: 25.4,
            texture: None,
        }
    }

    /// Luminosity in solar units.
    pub fn luminosity(&self) -> f32 {
        astro::abs_mag_to_lum(self.abs_mag)
    }

    pub fn apparent_magnitude(&self, distance_ly: f32) -> f32 {
        astro::abs_to_app_mag(self.abs_mag, distance_ly)
    }
}

/// A star together with the bodies orbiting it.
#[derive(Debug)]
pub struct SolarSystem {
    pub star: StarId,
    pub planets: PlanetarySystem,
}

/// A galaxy drawn as a cloud of soft points.
#[derive(Debug, Clone)]
pub struct Galaxy {
    pub name: String,
    /// Light years.
    pub position: DVec3,
    /// Light years.
    pub radius: f32,
    pub orientation: Quat,
    pub abs_mag: f32,
    /// Sample points inside the unit sphere, scaled by `radius`.
    pub points: Vec<Vec3>,
}

impl Galaxy {
    /// A two-armed spiral of `count` points.
    pub fn spiral(name: impl Into<String>, position: DVec3, radius: f32, count: usize) -> Self {
        let points = (0..count)
            .map(|i| {
                let t = i as f32 / count.max(1) as f32;
                let arm = if i % 2 == 0 { 0.0 } else { std::f32::consts::PI };
                let angle = arm + t * 3.0 * std::f32::consts::TAU;
                // Cheap deterministic jitter so the arms aren't perfect curves.
                let jitter = ((i as f32 * 12.9898).sin() * 43_758.547).fract() - 0.5;
                let r = t * (1.0 + 0.15 * jitter);
                Vec3::new(r * angle.cos(), 0.05 * jitter, r * angle.sin())
            })
            .collect();
        Self {
            name: name.into(),
            position,
            radius,
            orientation: Quat::IDENTITY,
            abs_mag: -20.0,
            points,
        }
    }
}

/// A constellation figure: chains of star positions joined by lines.
#[derive(Debug, Clone)]
pub struct Asterism {
    pub name: String,
    /// Light years.
    pub chains: Vec<Vec<DVec3>>,
}

impl Asterism {
    /// Average position of all stars in the figure, used to place its label.
    pub fn centroid(&self) -> Option<DVec3> {
        let (sum, n) = self
            .chains
            .iter()
            .flatten()
            .fold((DVec3::ZERO, 0usize), |(sum, n), p| (sum + *p, n + 1));
        (n > 0).then(|| sum / n as f64)
    }
}

/// Constellation boundary polylines (light years).
#[derive(Debug, Clone, Default)]
pub struct ConstellationBoundaries {
    pub chains: Vec<Vec<DVec3>>,
}

/// Visibility query for the star catalog.
#[derive(Debug, Clone)]
pub struct StarQuery {
    /// Observer position (ly).
    pub position: DVec3,
    /// Camera-to-world rotation.
    pub orientation: Quat,
    /// Vertical field of view (radians).
    pub fov: f32,
    pub aspect: f32,
    pub faintest_mag: f32,
}

/// Read-only view of the catalog during a frame.
pub trait Universe {
    /// The closest star with planets within [`SOLAR_SYSTEM_SEARCH_RADIUS`].
    fn nearest_solar_system(&self, position: DVec3) -> Option<&SolarSystem>;

    /// Call `visitor(star, distance_ly, app_mag)` for every star in view
    /// and brighter than the query's limit.
    fn find_visible_stars(&self, query: &StarQuery, visitor: &mut dyn FnMut(&Star, f32, f32));

    fn star(&self, id: StarId) -> Option<&Star>;

    fn solar_system_of(&self, star: StarId) -> Option<&SolarSystem>;

    fn galaxies(&self) -> &[Galaxy];

    fn asterisms(&self) -> &[Asterism];

    fn boundaries(&self) -> Option<&ConstellationBoundaries>;
}

/// In-memory catalog.
#[derive(Debug, Default)]
pub struct StaticUniverse {
    stars: Vec<Star>,
    star_index: FxHashMap<StarId, usize>,
    systems: FxHashMap<StarId, SolarSystem>,
    galaxies: Vec<Galaxy>,
    asterisms: Vec<Asterism>,
    boundaries: Option<ConstellationBoundaries>,
}

impl StaticUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_star(&mut self, star: Star) {
        match self.star_index.get(&star.id) {
            Some(&index) => self.stars[index] = star,
            None => {
                self.star_index.insert(star.id, self.stars.len());
                self.stars.push(star);
            }
        }
    }

    pub fn add_solar_system(&mut self, system: SolarSystem) {
        self.systems.insert(system.star, system);
    }

    pub fn solar_system_mut(&mut self, star: StarId) -> Option<&mut SolarSystem> {
        self.systems.get_mut(&star)
    }

    pub fn add_galaxy(&mut self, galaxy: Galaxy) {
        self.galaxies.push(galaxy);
    }

    pub fn add_asterism(&mut self, asterism: Asterism) {
        self.asterisms.push(asterism);
    }

    pub fn set_boundaries(&mut self, boundaries: ConstellationBoundaries) {
        self.boundaries = Some(boundaries);
    }

    pub fn stars(&self) -> &[Star] {
        &self.stars
    }
}

impl Universe for StaticUniverse {
    fn nearest_solar_system(&self, position: DVec3) -> Option<&SolarSystem> {
        let mut closest = SOLAR_SYSTEM_SEARCH_RADIUS;
        let mut found = None;
        for star in &self.stars {
            let distance = (star.position - position).length();
            if distance < closest
                && let Some(system) = self.systems.get(&star.id)
            {
                closest = distance;
                found = Some(system);
            }
        }
        found
    }

    fn find_visible_stars(&self, query: &StarQuery, visitor: &mut dyn FnMut(&Star, f32, f32)) {
        let frustum = Frustum::infinite(query.fov, query.aspect, 0.001);
        let to_camera = query.orientation.inverse();
        for star in &self.stars {
            let offset = star.position - query.position;
            let distance = offset.length() as f32;
            let app_mag = star.apparent_magnitude(distance);
            if app_mag > query.faintest_mag {
                continue;
            }
            // Stars close enough to be inside the near plane are still
            // handed out; the caller decides how to draw them.
            let eye = to_camera * offset.as_vec3();
            if distance > SOLAR_SYSTEM_SEARCH_RADIUS as f32
                && frustum.test_sphere(eye, 0.0) == Intersection::Outside
            {
                continue;
            }
            visitor(star, distance, app_mag);
        }
    }

    fn star(&self, id: StarId) -> Option<&Star> {
        self.star_index.get(&id).map(|&index| &self.stars[index])
    }

    fn solar_system_of(&self, star: StarId) -> Option<&SolarSystem> {
        self.systems.get(&star)
    }

    fn galaxies(&self) -> &[Galaxy] {
        &self.galaxies
    }

    fn asterisms(&self) -> &[Asterism] {
        &self.asterisms
    }

    fn boundaries(&self) -> Option<&ConstellationBoundaries> {
        self.boundaries.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sun() -> Star {
        Star::new(StarId(0), "Sol", DVec3::ZERO, astro::SOLAR_ABSMAG, SpectralClass::G)
    }

    fn query(faintest_mag: f32) -> StarQuery {
        StarQuery {
            position: DVec3::ZERO,
            orientation: Quat::IDENTITY,
            fov: 45f32.to_radians(),
            aspect: 1.0,
            faintest_mag,
        }
    }

    #[test]
    fn test_nearest_solar_system_within_one_light_year() {
        let mut universe = StaticUniverse::new();
        universe.add_star(sun());
        universe.add_solar_system(SolarSystem {
            star: StarId(0),
            planets: PlanetarySystem::new(),
        });

        assert!(universe.nearest_solar_system(DVec3::new(0.5, 0.0, 0.0)).is_some());
        assert!(universe.nearest_solar_system(DVec3::new(2.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_star_without_planets_is_not_a_solar_system() {
        let mut universe = StaticUniverse::new();
        universe.add_star(sun());
        assert!(universe.nearest_solar_system(DVec3::ZERO).is_none());
        assert_eq!(universe.star(StarId(0)).map(|s| s.name.as_str()), Some("Sol"));
    }

    #[test]
    fn test_visible_stars_filtered_by_magnitude_and_view() {
        let mut universe = StaticUniverse::new();
        // Ahead, bright.
        universe.add_star(Star::new(
            StarId(1),
            "Ahead",
            DVec3::new(0.0, 0.0, -10.0),
            0.0,
            SpectralClass::A,
        ));
        // Behind the camera.
        universe.add_star(Star::new(
            StarId(2),
            "Behind",
            DVec3::new(0.0, 0.0, 10.0),
            0.0,
            SpectralClass::A,
        ));
        // Ahead but far too faint.
        universe.add_star(Star::new(
            StarId(3),
            "Faint",
            DVec3::new(0.0, 0.0, -1000.0),
            15.0,
            SpectralClass::M,
        ));

        let mut seen = Vec::new();
        universe.find_visible_stars(&query(6.0), &mut |star, distance, _| {
            seen.push((star.id, distance));
        });
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, StarId(1));
        assert!((seen[0].1 - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_spectral_class_mappings() {
        assert_eq!(SpectralClass::O.texture_class(), StarTextureClass::B);
        assert_eq!(SpectralClass::K.texture_class(), StarTextureClass::G);
        assert_eq!(SpectralClass::N.texture_class(), StarTextureClass::M);
        assert_eq!(SpectralClass::WhiteDwarf.texture_class(), StarTextureClass::A);
        assert_eq!(SpectralClass::G.light_color(), Color::WHITE);
        assert_eq!(SpectralClass::M.light_color(), Color::rgb(1.0, 0.7, 0.7));
    }

    #[test]
    fn test_sun_luminosity_is_one() {
        assert!((sun().luminosity() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_asterism_centroid() {
        let asterism = Asterism {
            name: "Test".into(),
            chains: vec![vec![DVec3::X, DVec3::NEG_X], vec![DVec3::Y * 3.0]],
        };
        assert_eq!(asterism.centroid(), Some(DVec3::Y));
        let empty = Asterism {
            name: "Empty".into(),
            chains: Vec::new(),
        };
        assert!(empty.centroid().is_none());
    }

    #[test]
    fn test_spiral_galaxy_points_in_unit_sphere() {
        let galaxy = Galaxy::spiral("M31", DVec3::new(0.0, 0.0, -2.5e6), 1.0e5, 500);
        assert_eq!(galaxy.points.len(), 500);
        assert!(galaxy.points.iter().all(|p| p.length() <= 1.2));
    }
}
