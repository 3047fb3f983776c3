//! Walk of a planetary system collecting the bodies worth drawing.
//!
//! Satellite systems are visited through an explicit stack, so arbitrarily
//! deep hierarchies cost no call depth. Each visited body gets a
//! [`BodyPlacement`] that later stages (eclipses, orbits) look up by id.

use glam::{DQuat, DVec3, Mat4, Quat};
use rustc_hash::FxHashMap;

use crate::body::{BodyClass, BodyId, PlanetarySystem};
use crate::flags::{LabelFlags, RenderFlags};
use crate::labels::{Label, body_label_style, project_to_window};
use crate::render_list::{EntryBounds, EntryObject, RenderListEntry};

/// Bounding radius of a comet's tail (km).
pub const COMET_TAIL_RADIUS: f32 = 1.0e7;

#[derive(Debug, Clone, Copy)]
pub struct TraversalParams {
    /// Observer position relative to the system's star (km).
    pub observer: DVec3,
    /// Rotation from the universal frame into eye space.
    pub camera: Quat,
    /// Projection used to place labels.
    pub projection: Mat4,
    pub viewport: (u32, u32),
    pub pixel_size: f32,
    pub faintest_planet_mag: f32,
    /// Star luminosity in solar units.
    pub sun_luminosity: f32,
    pub now: f64,
    pub flags: RenderFlags,
    pub label_mode: LabelFlags,
    /// Orbits must span this many pixels before their body is labelled.
    pub min_orbit_size: f32,
}

/// Where a body was this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyPlacement {
    /// Position relative to the star (km).
    pub position: DVec3,
    /// Body-to-universal rotation.
    pub orientation: Quat,
    /// Frame the body's orbit is expressed in.
    pub orbit_frame: DQuat,
    /// Center of the body's orbit relative to the star (km).
    pub orbit_origin: DVec3,
    pub parent: Option<BodyId>,
}

struct Level<'a> {
    system: &'a PlanetarySystem,
    frame: DQuat,
    origin: DVec3,
    parent: Option<BodyId>,
}

#[derive(Debug, Default)]
pub struct PlanetarySystemTraversal {
    placements: FxHashMap<BodyId, BodyPlacement>,
}

impl PlanetarySystemTraversal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add entries and labels for `system` and every satellite system bright
    /// enough to be seen.
    pub fn run(
        &mut self,
        system: &PlanetarySystem,
        params: &TraversalParams,
        entries: &mut Vec<RenderListEntry>,
        labels: &mut Vec<Label>,
    ) {
        self.placements.clear();
        let mut stack = vec![Level {
            system,
            frame: DQuat::IDENTITY,
            origin: DVec3::ZERO,
            parent: None,
        }];

        while let Some(level) = stack.pop() {
            for body in level.system.bodies() {
                let heliocentric =
                    level.origin + level.frame * body.orbit.position_at_time(params.now);
                let offset = heliocentric - params.observer;
                let distance = offset.length();
                self.placements.insert(
                    body.id,
                    BodyPlacement {
                        position: heliocentric,
                        orientation: level.frame.as_quat() * body.body_orientation(params.now),
                        orbit_frame: level.frame,
                        orbit_origin: level.origin,
                        parent: level.parent,
                    },
                );

                let app_mag = body.apparent_magnitude(params.sun_luminosity, heliocentric, offset);
                let disc_size = (body.radius as f64 / distance) as f32 / params.pixel_size;
                let position = offset.as_vec3();
                let sun = (-heliocentric).as_vec3();

                if body.class != BodyClass::Invisible
                    && (disc_size > 1.0 || app_mag < params.faintest_planet_mag)
                {
                    entries.push(RenderListEntry::new(
                        EntryObject::Body(body.id),
                        position,
                        sun,
                        body.radius,
                        disc_size,
                        app_mag,
                        EntryBounds::for_body(body, body.radius),
                    ));
                }

                if body.class == BodyClass::Comet
                    && params.flags.contains(RenderFlags::SHOW_COMET_TAILS)
                {
                    let tail_disc = (COMET_TAIL_RADIUS as f64 / distance) as f32 / params.pixel_size;
                    if tail_disc > 1.0 {
                        entries.push(RenderListEntry::new(
                            EntryObject::CometTail(body.id),
                            position,
                            sun,
                            COMET_TAIL_RADIUS,
                            tail_disc,
                            app_mag,
                            EntryBounds::sphere(COMET_TAIL_RADIUS),
                        ));
                    }
                }

                if let Some((mask, color)) = body_label_style(body.class)
                    && params.label_mode.contains(mask)
                {
                    let orbit_size =
                        (body.orbit.bounding_radius() / distance) as f32 / params.pixel_size;
                    let eye = params.camera * position;
                    if orbit_size > params.min_orbit_size
                        && let Some(window) =
                            project_to_window(eye, &params.projection, params.viewport)
                    {
                        labels.push(Label {
                            text: body.name.clone(),
                            color,
                            position: window,
                        });
                    }
                }

                if let Some(satellites) = body.satellites()
                    && app_mag < params.faintest_planet_mag
                {
                    stack.push(Level {
                        system: satellites,
                        frame: level.frame * body.equator_orientation(params.now),
                        origin: heliocentric,
                        parent: Some(body.id),
                    });
                }
            }
        }
        log::trace!("planetary traversal placed {} bodies", self.placements.len());
    }

    pub fn placement(&self, id: BodyId) -> Option<&BodyPlacement> {
        self.placements.get(&id)
    }

    /// Number of bodies visited by the last run.
    pub fn visited(&self) -> usize {
        self.placements.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::{self, KM_PER_AU};
    use crate::body::{Body, FixedOrbit, KeplerOrbit, OrbitalElements};

    const PIXEL_SIZE: f32 = 0.001_380_7;

    fn fixed(x: f64, y: f64, z: f64) -> Box<FixedOrbit> {
        Box::new(FixedOrbit {
            position: DVec3::new(x, y, z),
        })
    }

    fn earth_system() -> PlanetarySystem {
        let moon = Body::new(BodyId(31), "Moon", BodyClass::Moon, 1737.0, fixed(384_400.0, 0.0, 0.0));
        let mut earth = Body::new(BodyId(3), "Earth", BodyClass::Planet, 6378.0, fixed(KM_PER_AU, 0.0, 0.0));
        earth.albedo = 0.3;
        earth.satellites = Some(PlanetarySystem::new().with(moon));
        PlanetarySystem::new().with(earth)
    }

    fn params(observer: DVec3) -> TraversalParams {
        TraversalParams {
            observer,
            camera: Quat::IDENTITY,
            projection: Mat4::perspective_rh(45f32.to_radians(), 4.0 / 3.0, 0.5, 1.0e7),
            viewport: (800, 600),
            pixel_size: PIXEL_SIZE,
            faintest_planet_mag: 6.0,
            sun_luminosity: 1.0,
            now: astro::J2000,
            flags: RenderFlags::DEFAULT,
            label_mode: LabelFlags::NONE,
            min_orbit_size: 20.0,
        }
    }

    fn ids(entries: &[RenderListEntry]) -> Vec<EntryObject> {
        entries.iter().map(|e| e.object).collect()
    }

    #[test]
    fn test_nearby_planet_and_moon_are_listed() {
        let system = earth_system();
        // 20000 km in front of the Earth, looking down -Z at it.
        let observer = DVec3::new(KM_PER_AU, 0.0, 20_000.0);
        let mut traversal = PlanetarySystemTraversal::new();
        let mut entries = Vec::new();
        let mut labels = Vec::new();
        traversal.run(&system, &params(observer), &mut entries, &mut labels);

        assert_eq!(
            ids(&entries),
            vec![EntryObject::Body(BodyId(3)), EntryObject::Body(BodyId(31))]
        );
        let earth = &entries[0];
        assert!((earth.distance - 20_000.0).abs() < 1.0);
        assert!(earth.is_meshed());
        assert!(earth.sun.x < 0.0);

        let moon = traversal.placement(BodyId(31)).unwrap();
        assert_eq!(moon.parent, Some(BodyId(3)));
        assert!((moon.position.x - (KM_PER_AU + 384_400.0)).abs() < 1.0);
        assert!(labels.is_empty());
    }

    #[test]
    fn test_faint_body_and_its_satellites_are_skipped() {
        let pebble = Body::new(BodyId(90), "Pebble", BodyClass::Moon, 0.5, fixed(100.0, 0.0, 0.0));
        let mut rock = Body::new(BodyId(9), "Rock", BodyClass::Asteroid, 1.0, fixed(5.0 * KM_PER_AU, 0.0, 0.0));
        rock.satellites = Some(PlanetarySystem::new().with(pebble));
        let system = PlanetarySystem::new().with(rock);

        let mut traversal = PlanetarySystemTraversal::new();
        let mut entries = Vec::new();
        traversal.run(&system, &params(DVec3::new(KM_PER_AU, 0.0, 0.0)), &mut entries, &mut Vec::new());

        assert!(entries.is_empty());
        assert!(traversal.placement(BodyId(9)).is_some());
        assert!(traversal.placement(BodyId(90)).is_none());
        assert_eq!(traversal.visited(), 1);
    }

    #[test]
    fn test_satellites_follow_the_parent_equator() {
        let moon = Body::new(BodyId(2), "Moon", BodyClass::Moon, 100.0, fixed(0.0, 0.0, 10_000.0));
        let mut planet = Body::new(BodyId(1), "Planet", BodyClass::Planet, 5000.0, fixed(KM_PER_AU, 0.0, 0.0));
        planet.rotation.obliquity = std::f64::consts::FRAC_PI_2;
        planet.rotation.ascending_node = 0.0;
        let tilt = planet.equator_orientation(astro::J2000);
        planet.satellites = Some(PlanetarySystem::new().with(moon));
        let system = PlanetarySystem::new().with(planet);

        let mut traversal = PlanetarySystemTraversal::new();
        traversal.run(&system, &params(DVec3::new(KM_PER_AU, 0.0, 1.0e5)), &mut Vec::new(), &mut Vec::new());

        let placement = traversal.placement(BodyId(2)).unwrap();
        let expected = DVec3::new(KM_PER_AU, 0.0, 0.0) + tilt * DVec3::new(0.0, 0.0, 10_000.0);
        assert!((placement.position - expected).length() < 1e-3);
        assert!((placement.orbit_origin.x - KM_PER_AU).abs() < 1e-6);
    }

    #[test]
    fn test_comet_tail_gets_its_own_entry() {
        let orbit = KeplerOrbit::new(OrbitalElements::circular(0.5 * KM_PER_AU, 200.0));
        let comet = Body::new(BodyId(5), "Comet", BodyClass::Comet, 5.0, Box::new(orbit));
        let system = PlanetarySystem::new().with(comet);
        let mut p = params(DVec3::new(KM_PER_AU, 0.0, 0.0));
        p.flags.set(RenderFlags::SHOW_COMET_TAILS, true);

        let mut entries = Vec::new();
        PlanetarySystemTraversal::new().run(&system, &p, &mut entries, &mut Vec::new());
        assert!(entries.iter().any(|e| e.object == EntryObject::CometTail(BodyId(5))));

        p.flags.set(RenderFlags::SHOW_COMET_TAILS, false);
        entries.clear();
        PlanetarySystemTraversal::new().run(&system, &p, &mut entries, &mut Vec::new());
        assert!(entries.iter().all(|e| !e.is_comet_tail()));
    }

    #[test]
    fn test_labels_follow_label_mode() {
        let system = earth_system();
        let mut p = params(DVec3::new(KM_PER_AU, 0.0, 20_000.0));
        p.label_mode = LabelFlags::PLANET;
        let mut labels = Vec::new();
        PlanetarySystemTraversal::new().run(&system, &p, &mut Vec::new(), &mut labels);

        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].text, "Earth");
        assert!(labels[0].position.length() < 1.0);

        // Looking away hides the label.
        p.camera = Quat::from_rotation_y(std::f32::consts::PI);
        labels.clear();
        PlanetarySystemTraversal::new().run(&system, &p, &mut Vec::new(), &mut labels);
        assert!(labels.is_empty());
    }

    #[test]
    fn test_invisible_bodies_are_placed_but_not_listed() {
        let marker = Body::new(BodyId(7), "L1", BodyClass::Invisible, 1000.0, fixed(KM_PER_AU, 0.0, 0.0));
        let system = PlanetarySystem::new().with(marker);
        let mut entries = Vec::new();
        let mut traversal = PlanetarySystemTraversal::new();
        traversal.run(&system, &params(DVec3::new(KM_PER_AU, 0.0, 5000.0)), &mut entries, &mut Vec::new());
        assert!(entries.is_empty());
        assert!(traversal.placement(BodyId(7)).is_some());
    }
}
