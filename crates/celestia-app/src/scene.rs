//! The built-in scene: the Sun with a handful of bodies that exercise every
//! surface path, a deterministic background star field, a galaxy and one
//! constellation figure. Textures are generated procedurally and uploaded
//! through the render backend.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use celestia_render::astro::{self, KM_PER_AU};
use celestia_render::universe::ConstellationBoundaries;
use celestia_render::{
    AppearanceFlags, Asterism, Atmosphere, BackendError, Body, BodyClass, BodyId, Color,
    FixedOrbit, Galaxy, KeplerOrbit, MeshData, MultiResTexture, OrbitalElements, PlanetarySystem,
    RenderBackend, RingSystem, RotationElements, SolarSystem, SpectralClass, Star, StarId,
    StaticUniverse, Surface, TextureCatalog, TextureImage, TiledTexture, Universe,
};
use glam::{DQuat, DVec3};
use tracing::info;

pub const SUN: StarId = StarId(0);
pub const EARTH: BodyId = BodyId(3);
pub const MOON: BodyId = BodyId(301);
pub const SATURN: BodyId = BodyId(6);
pub const HALLEY: BodyId = BodyId(1001);
pub const CERES: BodyId = BodyId(2001);
/// A point in deep space near the Sun where nothing orbits.
pub const BEACON: BodyId = BodyId(9001);

const BACKGROUND_STARS: u32 = 600;

pub struct Scene {
    pub universe: StaticUniverse,
    pub textures: TextureCatalog,
    pub sun: StarId,
    /// Bodies the camera cycles through, in order.
    pub focus_order: Vec<BodyId>,
}

impl Scene {
    /// Heliocentric position of `id` at Julian date `now`, in km.
    pub fn body_position_km(&self, id: BodyId, now: f64) -> Option<DVec3> {
        let system = self.universe.solar_system_of(self.sun)?;
        locate(&system.planets, id, now, DQuat::IDENTITY, DVec3::ZERO)
    }

    /// Position of `id` in the universal frame, in light years.
    pub fn body_position_ly(&self, id: BodyId, now: f64) -> Option<DVec3> {
        let star = self.universe.star(self.sun)?;
        let km = self.body_position_km(id, now)?;
        Some(star.position + km / astro::KM_PER_LY)
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.universe.solar_system_of(self.sun)?.planets.find(id)
    }
}

fn locate(
    system: &PlanetarySystem,
    id: BodyId,
    now: f64,
    frame: DQuat,
    origin: DVec3,
) -> Option<DVec3> {
    for body in system.bodies() {
        let position = origin + frame * body.orbit.position_at_time(now);
        if body.id == id {
            return Some(position);
        }
        if let Some(satellites) = body.satellites()
            && let Some(found) = locate(
                satellites,
                id,
                now,
                frame * body.equator_orientation(now),
                position,
            )
        {
            return Some(found);
        }
    }
    None
}

/// Deterministic value in `[0, 1)` for integer `i`.
fn hash01(i: u32) -> f32 {
    let mut x = i.wrapping_mul(0x9E37_79B9) ^ 0x85EB_CA6B;
    x ^= x >> 16;
    x = x.wrapping_mul(0x7FEB_352D);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846C_A68B);
    x ^= x >> 16;
    (x >> 8) as f32 / (1u32 << 24) as f32
}

fn to_u8(x: f32) -> u8 {
    (x.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn rgba(r: f32, g: f32, b: f32, a: f32) -> [u8; 4] {
    [to_u8(r), to_u8(g), to_u8(b), to_u8(a)]
}

/// Longitude and latitude (radians) of an equirectangular texel.
fn lon_lat(u: f32, v: f32) -> (f32, f32) {
    (u * PI, -v * FRAC_PI_2)
}

/// Smooth pseudo-terrain in `[-1, 1]` built from a few low harmonics.
fn terrain(lon: f32, lat: f32) -> f32 {
    let a = (3.0 * lon).sin() * (2.0 * lat).cos();
    let b = (5.0 * lon + 1.3).sin() * (3.0 * lat).sin();
    let c = (9.0 * lon - 0.7).cos() * (7.0 * lat + 0.4).cos();
    (0.6 * a + 0.3 * b + 0.1 * c).clamp(-1.0, 1.0)
}

fn land(lon: f32, lat: f32) -> bool {
    terrain(lon, lat) > 0.15
}

fn earth_image() -> TextureImage {
    TextureImage::procedural("earth", 256, 128, |u, v| {
        let (lon, lat) = lon_lat(u, v);
        if lat.abs() > 1.3 {
            return rgba(0.95, 0.95, 0.97, 0.0);
        }
        if land(lon, lat) {
            let h = terrain(lon, lat);
            rgba(0.25 + 0.3 * h, 0.45 - 0.1 * h, 0.15, 0.0)
        } else {
            // Oceans carry the specular mask in alpha.
            rgba(0.05, 0.12, 0.35, 1.0)
        }
    })
}

fn earth_night_image() -> TextureImage {
    TextureImage::procedural("earth-night", 256, 128, |u, v| {
        let (lon, lat) = lon_lat(u, v);
        let cell = ((u + 1.0) * 64.0) as u32 * 131 + ((v + 1.0) * 32.0) as u32;
        if land(lon, lat) && lat.abs() < 1.1 && hash01(cell) > 0.7 {
            rgba(1.0, 0.85, 0.5, 1.0)
        } else {
            rgba(0.0, 0.0, 0.0, 1.0)
        }
    })
}

fn cloud_image() -> TextureImage {
    TextureImage::procedural("earth-clouds", 256, 128, |u, v| {
        let (lon, lat) = lon_lat(u, v);
        let swirl = ((4.0 * lon + 3.0 * lat.sin()).sin() * (6.0 * lat).cos()).max(0.0);
        rgba(1.0, 1.0, 1.0, swirl * 0.8)
    })
}

fn moon_image() -> TextureImage {
    TextureImage::procedural("moon", 128, 64, |u, v| {
        let (lon, lat) = lon_lat(u, v);
        let maria = (terrain(lon + 2.0, lat) * 0.5 + 0.5) * 0.3;
        let g = 0.75 - maria;
        rgba(g, g, g * 0.97, 1.0)
    })
}

/// Height field for bump mapping: red holds height.
fn moon_bump_image() -> TextureImage {
    TextureImage::procedural("moon-bump", 128, 64, |u, v| {
        let cell_u = ((u + 1.0) * 8.0).floor();
        let cell_v = ((v + 1.0) * 4.0).floor();
        let fu = (u + 1.0) * 8.0 - cell_u - 0.5;
        let fv = (v + 1.0) * 4.0 - cell_v - 0.5;
        let r = (fu * fu + fv * fv).sqrt();
        let crater = if r < 0.35 { 0.3 + r } else { 0.65 };
        rgba(crater, crater, crater, 1.0)
    })
}

fn saturn_image() -> TextureImage {
    TextureImage::procedural("saturn", 64, 256, |_, v| {
        let band = (v * 40.0).sin() * 0.08 + (v * 13.0).cos() * 0.05;
        rgba(0.85 + band, 0.75 + band, 0.55 + band * 0.5, 1.0)
    })
}

/// Radial ring profile: `u` runs from the inner to the outer edge.
fn ring_image() -> TextureImage {
    TextureImage::procedural("saturn-rings", 256, 1, |u, _| {
        let t = (u + 1.0) * 0.5;
        let cassini = (0.62..0.68).contains(&t);
        let density = if cassini {
            0.05
        } else {
            0.5 + 0.4 * (t * 60.0).sin().abs()
        };
        rgba(0.85, 0.8, 0.7, density)
    })
    .clamped()
}

/// Upload `image` and register it in `catalog` as a single-tile texture.
fn register<B: RenderBackend>(
    backend: &mut B,
    catalog: &mut TextureCatalog,
    image: &TextureImage,
) -> Result<MultiResTexture, BackendError> {
    let id = backend.create_texture(image)?;
    let handle = catalog.insert(TiledTexture::single(id, image.width, image.height));
    Ok(MultiResTexture::uniform(handle))
}

/// A unit sphere with lumpy radii, used for an irregular minor body.
pub fn lumpy_mesh(slices: u32, stacks: u32, seed: u32) -> MeshData {
    let mut mesh = MeshData {
        positions: Vec::new(),
        normals: Vec::new(),
        uvs: Vec::new(),
        indices: Vec::new(),
    };
    for stack in 0..=stacks {
        let phi = PI * stack as f32 / stacks as f32;
        for slice in 0..=slices {
            // The seam column repeats column 0 exactly so the hull stays closed.
            let key_slice = if slice == slices || stack == 0 || stack == stacks {
                0
            } else {
                slice
            };
            let theta = TAU * (slice % slices) as f32 / slices as f32;
            let lump = 0.8 + 0.35 * hash01(seed ^ (stack * 977 + key_slice * 31));
            let dir = [phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin()];
            mesh.positions.push(dir.map(|c| c * lump));
            mesh.normals.push(dir);
            mesh.uvs.push([
                slice as f32 / slices as f32,
                stack as f32 / stacks as f32,
            ]);
        }
    }
    let row = slices + 1;
    for stack in 0..stacks {
        for slice in 0..slices {
            let a = stack * row + slice;
            let b = a + row;
            mesh.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
        }
    }
    mesh
}

fn spectral_class(roll: f32) -> SpectralClass {
    match roll {
        r if r < 0.02 => SpectralClass::O,
        r if r < 0.08 => SpectralClass::B,
        r if r < 0.2 => SpectralClass::A,
        r if r < 0.35 => SpectralClass::F,
        r if r < 0.55 => SpectralClass::G,
        r if r < 0.8 => SpectralClass::K,
        r if r < 0.97 => SpectralClass::M,
        _ => SpectralClass::WhiteDwarf,
    }
}

fn background_stars() -> Vec<Star> {
    (1..=BACKGROUND_STARS)
        .map(|i| {
            let z = hash01(i * 3) * 2.0 - 1.0;
            let theta = hash01(i * 3 + 1) * TAU;
            let distance = 4.0 + 300.0 * hash01(i * 3 + 2).powi(2);
            let r = (1.0 - z * z).sqrt();
            let position = DVec3::new(
                (r * theta.cos()) as f64,
                z as f64,
                (r * theta.sin()) as f64,
            ) * distance as f64;
            let abs_mag = -2.0 + 12.0 * hash01(i * 7 + 5);
            Star::new(
                StarId(i),
                format!("HIP {}", 1000 + i * 17),
                position,
                abs_mag,
                spectral_class(hash01(i * 11 + 3)),
            )
        })
        .collect()
}

/// Upload textures and meshes through `backend` and assemble the scene.
pub fn build_scene<B: RenderBackend>(backend: &mut B) -> Result<Scene, BackendError> {
    let mut textures = TextureCatalog::new();
    let mut universe = StaticUniverse::new();

    universe.add_star(Star::new(
        SUN,
        "Sol",
        DVec3::ZERO,
        astro::SOLAR_ABSMAG,
        SpectralClass::G,
    ));
    for star in background_stars() {
        universe.add_star(star);
    }

    let mut earth = Body::new(
        EARTH,
        "Earth",
        BodyClass::Planet,
        6378.0,
        Box::new(KeplerOrbit::new(OrbitalElements {
            eccentricity: 0.0167,
            pericenter_distance: KM_PER_AU * (1.0 - 0.0167),
            ..OrbitalElements::circular(KM_PER_AU, 365.256)
        })),
    );
    earth.oblateness = 0.0034;
    earth.albedo = 0.3;
    earth.rotation = RotationElements {
        period: 0.997_27,
        obliquity: 23.44f64.to_radians(),
        ..RotationElements::default()
    };
    earth.surface = Surface {
        color: Color::WHITE,
        haze_color: Color::new(0.5, 0.6, 1.0, 0.3),
        specular_color: Color::rgb(0.8, 0.8, 0.85),
        specular_power: 25.0,
        base_texture: register(backend, &mut textures, &earth_image())?,
        night_texture: register(backend, &mut textures, &earth_night_image())?,
        appearance_flags: AppearanceFlags::SPECULAR_REFLECTION | AppearanceFlags::APPLY_NIGHT_MAP,
        ..Surface::default()
    };
    earth.atmosphere = Some(Atmosphere {
        height: 60.0,
        lower_color: Color::rgb(0.43, 0.52, 0.8),
        upper_color: Color::rgb(0.26, 0.47, 0.84),
        sky_color: Color::rgb(0.4, 0.6, 1.0),
        cloud_height: 7.0,
        cloud_speed: 0.25,
        cloud_texture: register(backend, &mut textures, &cloud_image())?,
    });

    let mut moon = Body::new(
        MOON,
        "Moon",
        BodyClass::Moon,
        1737.4,
        Box::new(KeplerOrbit::new(OrbitalElements {
            inclination: 5.145f64.to_radians(),
            ..OrbitalElements::circular(384_400.0, 27.321_66)
        })),
    );
    moon.albedo = 0.12;
    moon.rotation.period = 27.321_66;
    moon.surface = Surface {
        base_texture: register(backend, &mut textures, &moon_image())?,
        bump_texture: register(backend, &mut textures, &moon_bump_image())?,
        bump_height: 2.0,
        appearance_flags: AppearanceFlags::APPLY_BUMP_MAP,
        ..Surface::default()
    };
    earth.satellites = Some(PlanetarySystem::new().with(moon));

    let mut saturn = Body::new(
        SATURN,
        "Saturn",
        BodyClass::Planet,
        60_268.0,
        Box::new(KeplerOrbit::new(OrbitalElements {
            inclination: 2.485f64.to_radians(),
            mean_anomaly_at_epoch: 5.5,
            ..OrbitalElements::circular(9.537 * KM_PER_AU, 10_759.22)
        })),
    );
    saturn.oblateness = 0.098;
    saturn.albedo = 0.47;
    saturn.rotation = RotationElements {
        period: 0.444,
        obliquity: 26.73f64.to_radians(),
        ..RotationElements::default()
    };
    saturn.surface = Surface {
        base_texture: register(backend, &mut textures, &saturn_image())?,
        haze_color: Color::new(0.9, 0.8, 0.6, 0.15),
        ..Surface::default()
    };
    saturn.rings = Some(RingSystem {
        inner_radius: 74_500.0,
        outer_radius: 140_220.0,
        color: Color::rgb(0.85, 0.8, 0.7),
        texture: register(backend, &mut textures, &ring_image())?,
    });

    let mut halley = Body::new(
        HALLEY,
        "1P/Halley",
        BodyClass::Comet,
        5.5,
        Box::new(KeplerOrbit::new(OrbitalElements {
            pericenter_distance: 0.586 * KM_PER_AU,
            eccentricity: 0.967,
            inclination: 162.26f64.to_radians(),
            ascending_node: 58.42f64.to_radians(),
            arg_of_periapsis: 111.33f64.to_radians(),
            mean_anomaly_at_epoch: 0.1,
            period: 27_509.0,
            epoch: astro::J2000,
        })),
    );
    halley.albedo = 0.04;
    halley.surface.color = Color::rgb(0.3, 0.28, 0.25);

    let mut ceres = Body::new(
        CERES,
        "Ceres",
        BodyClass::Asteroid,
        473.0,
        Box::new(KeplerOrbit::new(OrbitalElements {
            inclination: 10.6f64.to_radians(),
            mean_anomaly_at_epoch: 1.2,
            ..OrbitalElements::circular(2.77 * KM_PER_AU, 1680.0)
        })),
    );
    ceres.albedo = 0.09;
    ceres.rotation.period = 0.378;
    ceres.surface.color = Color::rgb(0.55, 0.52, 0.5);
    ceres.mesh = Some(backend.create_mesh(&lumpy_mesh(24, 12, 0xCE7E5))?);

    let beacon = Body::new(
        BEACON,
        "Beacon",
        BodyClass::Invisible,
        1.0,
        Box::new(FixedOrbit {
            position: DVec3::new(0.0, 2.0 * KM_PER_AU, 0.0),
        }),
    );

    universe.add_solar_system(SolarSystem {
        star: SUN,
        planets: PlanetarySystem::new()
            .with(earth)
            .with(saturn)
            .with(halley)
            .with(ceres)
            .with(beacon),
    });

    universe.add_galaxy(Galaxy::spiral(
        "M31",
        DVec3::new(1.8e6, 0.9e6, -1.6e6),
        110_000.0,
        4000,
    ));

    let stars = universe.stars();
    let figure: Vec<DVec3> = stars[1..8].iter().map(|star| star.position).collect();
    let asterism = Asterism {
        name: "Lyra".into(),
        chains: vec![figure[..4].to_vec(), figure[3..].to_vec()],
    };
    let boundary = asterism
        .chains
        .iter()
        .flatten()
        .map(|p| *p * 1.1)
        .collect::<Vec<_>>();
    universe.add_asterism(asterism);
    universe.set_boundaries(ConstellationBoundaries {
        chains: vec![boundary],
    });

    info!(
        stars = universe.stars().len(),
        textures = textures.len(),
        "Scene built"
    );

    Ok(Scene {
        universe,
        textures,
        sun: SUN,
        focus_order: vec![EARTH, MOON, SATURN, CERES, HALLEY],
    })
}
