//! Point-light rendering: the star field, glare, and bodies too small to
//! draw as spheres.
//!
//! Brightness maps magnitude to alpha linearly between the faintest
//! visible magnitude (alpha 0) and the saturation magnitude (alpha 1).
//! Objects brighter than saturation get a glare halo to make up for the
//! limited dynamic range of the display.

use glam::{DVec3, Mat4, Quat, Vec2, Vec3};

use crate::astro::{self, KM_PER_LY};
use crate::backend::{BlendMode, Frame, PrimitivePass, PrimitiveVertex, Topology, billboard_quad};
use crate::color::Color;
use crate::context::StaticTextures;
use crate::labels::{Label, STAR_LABEL_COLOR, project_to_window};
use crate::render_list::{EntryBounds, EntryObject, RenderListEntry};
use crate::universe::{StarQuery, Universe};

/// Distance (ly) at which stars closer than a light year are drawn.
pub const RENDER_DISTANCE: f32 = 50.0;
/// Faintest magnitude shown with auto-magnitude at a 45 degree field.
pub const FAINTEST_AUTO_MAG_45DEG: f32 = 12.5;
/// Stars brighter than this are labelled when star labels are on.
pub const STAR_LABEL_LIMIT_MAG: f32 = 1.5;

const REFERENCE_FOV: f32 = 45.0;
/// Stars closer than this (ly) get precise positions.
const NEAR_STAR_DISTANCE: f32 = 1.0;

/// Auto-magnitude factor; 1 at a 45 degree field.
pub fn auto_magnitude(fov_deg: f32) -> f32 {
    2.0 * REFERENCE_FOV / (fov_deg + REFERENCE_FOV)
}

/// Faintest and saturation magnitudes for the field of view.
pub fn limiting_magnitudes(
    faintest_night: f32,
    saturation_night: f32,
    fov_deg: f32,
    auto_mag: bool,
) -> (f32, f32) {
    if auto_mag {
        let factor = auto_magnitude(fov_deg);
        (
            FAINTEST_AUTO_MAG_45DEG * factor,
            saturation_night * (1.0 + factor * factor),
        )
    } else {
        (faintest_night, saturation_night)
    }
}

/// Planets are visible fainter than stars at narrow fields.
pub fn faintest_planet_mag(faintest_mag: f32, fov_deg: f32) -> f32 {
    let zoom = REFERENCE_FOV / fov_deg;
    faintest_mag + 2.5 * (zoom * zoom).log10()
}

pub fn brightness_scale(faintest_mag: f32, saturation_mag: f32) -> f32 {
    if faintest_mag - saturation_mag >= 4.0 {
        1.0 / (faintest_mag - saturation_mag)
    } else {
        0.25
    }
}

/// Sprite shrink factor; keeps the apparent size of points roughly
/// constant across fields of view.
pub fn fov_correction(fov_deg: f32) -> f32 {
    let ratio = fov_deg / REFERENCE_FOV;
    0.05 * ratio * ratio + 1.0
}

/// Glare halo size for an object `render_z` away whose point sprite has
/// half-size `size`.
fn glare_size(render_z: f32, app_mag: f32, saturation_mag: f32, fov_deg: f32, size: f32) -> f32 {
    let s = render_z * 0.001 * (3.0 - (app_mag - saturation_mag)) * 2.0;
    if s > size * 3.0 {
        s * 2.0 / (1.0 + REFERENCE_FOV / fov_deg)
    } else {
        size * 3.0
    }
}

fn glare_alpha(app_mag: f32, saturation_mag: f32) -> f32 {
    0.4 * ((app_mag - saturation_mag) * -0.8).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brightness {
    pub faintest_mag: f32,
    pub saturation_mag: f32,
    pub scale: f32,
    pub bias: f32,
}

impl Brightness {
    pub fn new(faintest_mag: f32, saturation_mag: f32, bias: f32) -> Self {
        Self {
            faintest_mag,
            saturation_mag,
            scale: brightness_scale(faintest_mag, saturation_mag),
            bias,
        }
    }

    /// Alpha of a point of `app_mag` against the limit `faintest_mag`.
    pub fn alpha(&self, faintest_mag: f32, app_mag: f32, scale: f32) -> f32 {
        ((faintest_mag - app_mag) * scale + self.bias).clamp(0.0, 1.0)
    }
}

/// View state shared by every particle in a frame.
#[derive(Debug, Clone, Copy)]
pub struct ParticleView {
    pub fov_deg: f32,
    pub pixel_size: f32,
    pub brightness: Brightness,
}

/// Draw an object as a fuzzy point, plus a glare halo when `use_halo` is
/// set and it is brighter than saturation.
///
/// `eye` is the object's eye-space position; the sprite is moved along
/// the view ray to depth `render_z` so it lands inside the current clip
/// range.
#[allow(clippy::too_many_arguments)]
pub fn render_body_as_particle(
    frame: &mut Frame,
    view: &ParticleView,
    textures: &StaticTextures,
    eye: Vec3,
    app_mag: f32,
    faintest_mag: f32,
    disc_size: f32,
    color: Color,
    render_z: f32,
    use_halo: bool,
) {
    if !(disc_size < 4.0 || use_halo) || eye.z >= 0.0 {
        return;
    }
    let brightness = &view.brightness;
    let alpha = if disc_size > 1.0 {
        (0.5 * (4.0 - disc_size)).clamp(0.0, 1.0)
    } else {
        brightness.alpha(faintest_mag, app_mag, brightness.scale)
    };

    let mut size = view.pixel_size * 1.6 * render_z / fov_correction(view.fov_deg);
    let center = eye * (render_z / eye.z).abs();
    let pass = PrimitivePass::new(Mat4::IDENTITY, BlendMode::AlphaAdditive).with_depth(true, false);

    frame.draw_billboard(
        pass.clone().with_texture(textures.star_disc),
        center,
        size,
        color.with_alpha(alpha),
    );

    if use_halo && app_mag < brightness.saturation_mag {
        let alpha = glare_alpha(app_mag, brightness.saturation_mag);
        size = glare_size(render_z, app_mag, brightness.saturation_mag, view.fov_deg, size);
        let real_size = disc_size * view.pixel_size * render_z;
        size = size.max(real_size * 10.0);
        frame.draw_billboard(pass.with_texture(textures.glare), center, size, color.with_alpha(alpha));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StarFieldParams {
    /// Observer position (ly).
    pub observer: DVec3,
    /// Camera-to-world rotation.
    pub orientation: Quat,
    pub fov_deg: f32,
    pub aspect: f32,
    pub pixel_size: f32,
    pub brightness: Brightness,
    /// Limit handed to the catalog query.
    pub faintest_mag_night: f32,
    /// Stars farther than this (ly) are skipped.
    pub distance_limit: f32,
    pub as_points: bool,
    pub labels: bool,
    pub projection: Mat4,
    pub viewport: (u32, u32),
}

/// Counters from one star field pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StarFieldStats {
    pub processed: usize,
    pub rendered: usize,
    pub bright: usize,
    pub close: usize,
}

struct Glare {
    center: Vec3,
    size: f32,
    color: Color,
}

/// Draw every visible star as a point. Stars close enough to show a disc
/// are appended to `entries` instead.
pub fn render_stars(
    frame: &mut Frame,
    universe: &dyn Universe,
    params: &StarFieldParams,
    textures: &StaticTextures,
    entries: &mut Vec<RenderListEntry>,
    labels: &mut Vec<Label>,
) -> StarFieldStats {
    let corr = fov_correction(params.fov_deg);
    let size = params.pixel_size * 1.6 / corr;
    let scale = params.brightness.scale * corr;
    let to_eye = params.orientation.conjugate();
    let view_normal = params.orientation * Vec3::NEG_Z;

    let mut stats = StarFieldStats::default();
    let mut points = Vec::new();
    let mut glares = Vec::new();

    let query = StarQuery {
        position: params.observer,
        orientation: params.orientation,
        fov: params.fov_deg.to_radians(),
        aspect: params.aspect,
        faintest_mag: params.faintest_mag_night,
    };
    universe.find_visible_stars(&query, &mut |star, distance, app_mag| {
        stats.processed += 1;
        if distance > params.distance_limit {
            return;
        }
        let offset = star.position - params.observer;
        if offset.as_vec3().dot(view_normal) <= 0.0 {
            return;
        }

        let color = star.spectral_class.apparent_color();
        let mut rel = offset.as_vec3();
        let mut app_mag = app_mag;
        let mut render_distance = distance;
        let mut disc_size = 0.0;

        if distance < NEAR_STAR_DISTANCE {
            let precise = offset.length();
            app_mag = astro::abs_to_app_mag(star.abs_mag, precise as f32);
            render_distance = RENDER_DISTANCE;
            rel = (offset / precise).as_vec3() * RENDER_DISTANCE;
            disc_size = star.radius / astro::ly_to_km(precise) as f32 / params.pixel_size;
            stats.close += 1;
        }

        if disc_size <= 1.0 {
            let alpha = params.brightness.alpha(params.brightness.faintest_mag, app_mag, scale);
            let eye = to_eye * rel;
            let sprite = render_distance * size;
            stats.rendered += 1;
            if params.as_points {
                points.push(PrimitiveVertex::new(eye, color.with_alpha(alpha), Vec2::splat(0.5)));
            } else {
                points.extend(billboard_quad(eye, sprite, color.with_alpha(alpha)));
            }

            let saturation = params.brightness.saturation_mag;
            if app_mag < saturation {
                glares.push(Glare {
                    center: eye,
                    size: glare_size(render_distance, app_mag, saturation, params.fov_deg, sprite),
                    color: color.with_alpha(glare_alpha(app_mag, saturation)),
                });
                stats.bright += 1;
            }

            if params.labels
                && app_mag < STAR_LABEL_LIMIT_MAG
                && let Some(position) = project_to_window(eye, &params.projection, params.viewport)
            {
                labels.push(Label {
                    text: star.name.clone(),
                    color: STAR_LABEL_COLOR,
                    position,
                });
            }
        } else {
            let position = (offset * KM_PER_LY).as_vec3();
            entries.push(RenderListEntry::new(
                EntryObject::Star(star.id),
                position,
                Vec3::ZERO,
                star.radius,
                disc_size,
                app_mag,
                EntryBounds::for_star(star),
            ));
        }
    });

    let pass = PrimitivePass::new(Mat4::IDENTITY, BlendMode::AlphaAdditive)
        .with_texture(textures.star_disc)
        .with_depth(false, false);
    let topology = if params.as_points {
        Topology::PointList
    } else {
        Topology::TriangleList
    };
    frame.draw_primitives(pass, topology, points);

    let glare_pass = PrimitivePass::new(Mat4::IDENTITY, BlendMode::AlphaAdditive)
        .with_texture(textures.glare)
        .with_depth(false, false);
    frame.draw_primitives(
        glare_pass,
        Topology::TriangleList,
        glares
            .iter()
            .flat_map(|glare| billboard_quad(glare.center, glare.size, glare.color)),
    );

    log::trace!(
        "stars: {} processed, {} drawn, {} bright, {} close",
        stats.processed,
        stats.rendered,
        stats.bright,
        stats.close
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Command;
    use crate::universe::{SpectralClass, Star, StarId, StaticUniverse};

    const PIXEL_SIZE: f32 = 0.001_380_7;

    fn textures() -> StaticTextures {
        use crate::texture::TextureId;
        StaticTextures {
            star_disc: Some(TextureId(1)),
            glare: Some(TextureId(2)),
            ..StaticTextures::default()
        }
    }

    fn params(observer: DVec3) -> StarFieldParams {
        StarFieldParams {
            observer,
            orientation: Quat::IDENTITY,
            fov_deg: 45.0,
            aspect: 4.0 / 3.0,
            pixel_size: PIXEL_SIZE,
            brightness: Brightness::new(6.0, 1.0, 0.0),
            faintest_mag_night: 6.0,
            distance_limit: 1.0e6,
            as_points: false,
            labels: false,
            projection: Mat4::perspective_rh(45f32.to_radians(), 4.0 / 3.0, 0.5, 1.0e7),
            viewport: (800, 600),
        }
    }

    fn star(id: u32, name: &str, position: DVec3, abs_mag: f32) -> Star {
        Star::new(StarId(id), name, position, abs_mag, SpectralClass::G)
    }

    fn draws(frame: &Frame) -> Vec<(Topology, Option<crate::texture::TextureId>, usize)> {
        frame
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawPrimitives {
                    pass,
                    topology,
                    vertices,
                } => Some((*topology, pass.texture, vertices.len())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_auto_magnitude_at_reference_field() {
        let (faintest, saturation) = limiting_magnitudes(6.0, 1.0, 45.0, true);
        assert!((faintest - 12.5).abs() < 1e-5);
        assert!((saturation - 2.0).abs() < 1e-5);
        assert_eq!(limiting_magnitudes(6.0, 1.0, 45.0, false), (6.0, 1.0));

        // Zooming in shows fainter stars.
        let (narrow, _) = limiting_magnitudes(6.0, 1.0, 5.0, true);
        assert!(narrow > faintest);
    }

    #[test]
    fn test_brightness_scale_gap() {
        assert!((brightness_scale(6.0, 1.0) - 0.2).abs() < 1e-6);
        assert_eq!(brightness_scale(3.0, 1.0), 0.25);
    }

    #[test]
    fn test_faintest_planet_mag_grows_when_zoomed() {
        assert!((faintest_planet_mag(6.0, 45.0) - 6.0).abs() < 1e-5);
        assert!((faintest_planet_mag(6.0, 4.5) - 11.0).abs() < 1e-4);
    }

    #[test]
    fn test_bright_star_gets_point_and_glare() {
        let mut universe = StaticUniverse::new();
        // Sirius-like, 8.6 ly straight ahead.
        universe.add_star(star(1, "Sirius", DVec3::new(0.0, 0.0, -8.6), 1.42));
        let mut frame = Frame::default();
        let mut entries = Vec::new();
        let stats = render_stars(&mut frame, &universe, &params(DVec3::ZERO), &textures(), &mut entries, &mut Vec::new());

        assert_eq!(stats.rendered, 1);
        assert_eq!(stats.bright, 1);
        assert!(entries.is_empty());
        let draws = draws(&frame);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0], (Topology::TriangleList, Some(crate::texture::TextureId(1)), 6));
        assert_eq!(draws[1].1, Some(crate::texture::TextureId(2)));

        let point = frame.primitive_vertices()[0];
        assert_eq!(point.color[3], 1.0);
    }

    #[test]
    fn test_stars_behind_or_beyond_limit_are_skipped() {
        let mut universe = StaticUniverse::new();
        universe.add_star(star(1, "Behind", DVec3::new(0.0, 0.0, 0.5), -5.0));
        universe.add_star(star(2, "Far", DVec3::new(0.0, 0.0, -500.0), -5.0));
        let mut p = params(DVec3::ZERO);
        p.distance_limit = 100.0;
        let mut frame = Frame::default();
        let stats = render_stars(&mut frame, &universe, &p, &textures(), &mut Vec::new(), &mut Vec::new());
        assert_eq!(stats.rendered, 0);
        assert!(frame.commands().is_empty());
    }

    #[test]
    fn test_nearby_star_with_disc_joins_render_list() {
        let mut universe = StaticUniverse::new();
        universe.add_star(star(1, "Sun", DVec3::ZERO, 4.83));
        // One AU from the sun, facing it.
        let observer = DVec3::new(0.0, 0.0, astro::KM_PER_AU / KM_PER_LY);
        let mut frame = Frame::default();
        let mut entries = Vec::new();
        let stats = render_stars(&mut frame, &universe, &params(observer), &textures(), &mut entries, &mut Vec::new());

        assert_eq!(stats.close, 1);
        assert_eq!(stats.rendered, 0);
        assert_eq!(entries.len(), 1);
        let sun = &entries[0];
        assert_eq!(sun.object, EntryObject::Star(StarId(1)));
        assert!((sun.distance - astro::KM_PER_AU as f32).abs() / sun.distance < 1e-4);
        // 696000 km at 1 AU is about 4.65 mrad, over three pixels.
        assert!(sun.disc_size > 3.0);
        assert!(sun.app_mag < -26.0);
    }

    #[test]
    fn test_points_mode_and_labels() {
        let mut universe = StaticUniverse::new();
        universe.add_star(star(1, "Vega", DVec3::new(0.0, 0.0, -25.0), 0.58));
        universe.add_star(star(2, "Dim", DVec3::new(1.0, 0.0, -25.0), 4.0));
        let mut p = params(DVec3::ZERO);
        p.as_points = true;
        p.labels = true;
        let mut frame = Frame::default();
        let mut labels = Vec::new();
        render_stars(&mut frame, &universe, &p, &textures(), &mut Vec::new(), &mut labels);

        assert_eq!(draws(&frame)[0].0, Topology::PointList);
        assert_eq!(draws(&frame)[0].2, 2);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].text, "Vega");
        assert!(labels[0].position.length() < 1.0);
    }

    #[test]
    fn test_particle_moves_to_render_depth() {
        let view = ParticleView {
            fov_deg: 45.0,
            pixel_size: PIXEL_SIZE,
            brightness: Brightness::new(6.0, 1.0, 0.0),
        };
        let mut frame = Frame::default();
        render_body_as_particle(
            &mut frame,
            &view,
            &textures(),
            Vec3::new(0.0, 0.0, -1.0e8),
            3.5,
            6.0,
            0.5,
            Color::WHITE,
            10.0,
            false,
        );
        let vertices = frame.primitive_vertices();
        assert_eq!(vertices.len(), 6);
        assert!(vertices.iter().all(|v| (v.position[2] + 10.0).abs() < 1e-4));
        assert!((vertices[0].color[3] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_large_disc_without_halo_draws_nothing() {
        let view = ParticleView {
            fov_deg: 45.0,
            pixel_size: PIXEL_SIZE,
            brightness: Brightness::new(6.0, 1.0, 0.0),
        };
        let mut frame = Frame::default();
        render_body_as_particle(&mut frame, &view, &textures(), Vec3::NEG_Z, -3.0, 6.0, 10.0, Color::WHITE, 1.0, false);
        assert!(frame.commands().is_empty());

        render_body_as_particle(&mut frame, &view, &textures(), Vec3::NEG_Z, -3.0, 6.0, 10.0, Color::WHITE, 1.0, true);
        // Point with zero alpha plus the halo.
        assert_eq!(frame.commands().len(), 2);
        assert_eq!(frame.primitive_vertices()[0].color[3], 0.0);
    }
}
