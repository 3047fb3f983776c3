//! Background layers: the celestial grid, galaxies, constellation figures
//! and boundaries, and the sky color seen from inside an atmosphere.

use glam::{DVec3, Mat4, Quat, Vec2, Vec3};

use crate::astro::equatorial_to_celestial_cart;
use crate::backend::{BlendMode, Frame, PrimitivePass, PrimitiveVertex, Topology, billboard_quad};
use crate::body::Atmosphere;
use crate::color::Color;
use crate::labels::{
    CONSTELLATION_LABEL_COLOR, GALAXY_LABEL_COLOR, GRID_LABEL_COLOR, Label, project_to_window,
};
use crate::render_list::RenderListEntry;
use crate::texture::TextureId;
use crate::universe::{Asterism, ConstellationBoundaries, Galaxy};

pub const GRID_RADIUS: f32 = 10.0;
pub const GRID_COLOR: Color = Color::new(0.3, 0.7, 0.7, 0.55);
pub const ASTERISM_COLOR: Color = Color::new(0.28, 0.0, 0.66, 0.96);
pub const BOUNDARY_COLOR: Color = Color::new(0.8, 0.33, 0.63, 0.35);

const RA_DIVISIONS: usize = 12;
const DEC_DIVISIONS: usize = 12;
const GRID_SECTIONS: usize = 60;

/// Galaxy sprites stop once they cover this fraction of the view distance.
const GALAXY_MAX_SCREEN_FRACTION: f32 = 0.05;

#[derive(Debug, Clone, Copy)]
pub struct SkyView {
    /// Observer position (ly).
    pub observer: DVec3,
    /// Rotation from the universal frame into eye space.
    pub camera: Quat,
    pub pixel_size: f32,
    pub projection: Mat4,
    pub viewport: (u32, u32),
    pub smooth_lines: bool,
}

impl SkyView {
    fn line_pass(&self) -> PrimitivePass {
        let mut pass = PrimitivePass::new(Mat4::from_quat(self.camera), BlendMode::Alpha)
            .with_depth(false, false);
        pass.smooth = self.smooth_lines;
        pass
    }

    fn label(&self, labels: &mut Vec<Label>, text: &str, color: Color, world: Vec3) {
        let eye = self.camera * world;
        if let Some(position) = project_to_window(eye, &self.projection, self.viewport) {
            labels.push(Label {
                text: text.to_owned(),
                color,
                position,
            });
        }
    }
}

fn grid_labels() -> Vec<(String, f32, f32)> {
    let mut labels: Vec<_> = (0..12)
        .map(|i| (format!("{}h", i * 2), (i * 2) as f32, 0.0))
        .collect();
    for ra in [0.0, 12.0] {
        for dec in [-75, -60, -45, -30, -15, 15, 30, 45, 60, 75] {
            labels.push((dec.to_string(), ra, dec as f32));
        }
    }
    labels
}

/// Right ascension meridians and declination circles on a sphere around
/// the eye, with coordinate labels.
pub fn render_celestial_grid(frame: &mut Frame, view: &SkyView, labels: &mut Vec<Label>) {
    let vertex = |ra: f32, dec: f32| {
        PrimitiveVertex::new(
            equatorial_to_celestial_cart(ra, dec, GRID_RADIUS),
            GRID_COLOR,
            Vec2::ZERO,
        )
    };

    for i in 0..RA_DIVISIONS {
        let ra = i as f32 / RA_DIVISIONS as f32 * 24.0;
        let meridian = (0..=GRID_SECTIONS)
            .map(|j| vertex(ra, j as f32 / GRID_SECTIONS as f32 * 180.0 - 90.0));
        frame.draw_primitives(view.line_pass(), Topology::LineStrip, meridian);
    }

    for i in 1..DEC_DIVISIONS {
        let dec = i as f32 / DEC_DIVISIONS as f32 * 180.0 - 90.0;
        let circle: Vec<_> = (0..GRID_SECTIONS)
            .map(|j| vertex(j as f32 / GRID_SECTIONS as f32 * 24.0, dec))
            .collect();
        frame.draw_line_loop(view.line_pass(), &circle);
    }

    for (text, ra, dec) in grid_labels() {
        view.label(labels, &text, GRID_LABEL_COLOR, equatorial_to_celestial_cart(ra, dec, GRID_RADIUS));
    }
}

/// Galaxies as clouds of soft sprites. Fainter limiting magnitudes show
/// them brighter; below magnitude 2 they vanish.
pub fn render_galaxies(
    frame: &mut Frame,
    view: &SkyView,
    galaxies: &[Galaxy],
    faintest_mag: f32,
    texture: Option<TextureId>,
) {
    let brightness = ((faintest_mag - 2.0) / 4.0).min(1.0);
    if brightness < 0.0 {
        return;
    }

    let mut sprites = Vec::new();
    for galaxy in galaxies {
        let offset = (galaxy.position - view.observer).as_vec3();
        let distance = (offset.length() - galaxy.radius).max(0.0);
        let min_feature = view.pixel_size * 0.5 * distance;

        let mut size = galaxy.radius;
        let mut pow2 = 1usize;
        for (i, point) in galaxy.points.iter().enumerate() {
            if i & pow2 != 0 {
                pow2 <<= 1;
                size /= 1.5;
                if size < min_feature {
                    break;
                }
            }
            let world = offset + galaxy.orientation * (*point * galaxy.radius);
            let screen_fraction = size / world.length();
            if screen_fraction < GALAXY_MAX_SCREEN_FRACTION {
                let alpha = 8.0 * (GALAXY_MAX_SCREEN_FRACTION - screen_fraction) * brightness;
                sprites.extend(billboard_quad(
                    view.camera * world,
                    size,
                    Color::WHITE.with_alpha(alpha),
                ));
            }
        }
    }

    let pass = PrimitivePass::new(Mat4::IDENTITY, BlendMode::Alpha)
        .with_texture(texture)
        .with_depth(false, false);
    frame.draw_primitives(pass, Topology::TriangleList, sprites);
}

fn render_chains(frame: &mut Frame, view: &SkyView, chains: &[Vec<DVec3>], color: Color) {
    for chain in chains {
        let strip = chain
            .iter()
            .map(|p| PrimitiveVertex::new((*p - view.observer).as_vec3(), color, Vec2::ZERO));
        frame.draw_primitives(view.line_pass(), Topology::LineStrip, strip);
    }
}

/// Constellation figures, one line strip per chain.
pub fn render_asterisms(frame: &mut Frame, view: &SkyView, asterisms: &[Asterism]) {
    for asterism in asterisms {
        render_chains(frame, view, &asterism.chains, ASTERISM_COLOR);
    }
}

pub fn render_boundaries(frame: &mut Frame, view: &SkyView, boundaries: &ConstellationBoundaries) {
    render_chains(frame, view, &boundaries.chains, BOUNDARY_COLOR);
}

pub fn label_galaxies(view: &SkyView, galaxies: &[Galaxy], labels: &mut Vec<Label>) {
    for galaxy in galaxies {
        let offset = (galaxy.position - view.observer).as_vec3();
        view.label(labels, &galaxy.name, GALAXY_LABEL_COLOR, offset);
    }
}

/// Constellation names at the centroid of their figures.
pub fn label_constellations(view: &SkyView, asterisms: &[Asterism], labels: &mut Vec<Label>) {
    for asterism in asterisms {
        if let Some(center) = asterism.centroid() {
            let offset = (center - view.observer).as_vec3();
            view.label(labels, &asterism.name, CONSTELLATION_LABEL_COLOR, offset);
        }
    }
}

/// How much a body's lit atmosphere brightens the sky around an observer
/// inside it; 0 outside the atmosphere.
pub fn sky_lightness(entry: &RenderListEntry, radius: f32, atmosphere: &Atmosphere) -> f32 {
    let height = atmosphere.height;
    if height <= 0.0 || entry.distance >= radius + height {
        return 0.0;
    }
    let density = (1.0 - (entry.distance - radius) / height).min(1.0);
    let normal = (-entry.position).normalize_or_zero();
    let sun = entry.sun.normalize_or_zero();
    let illumination = (sun.dot(normal) + 0.2).clamp(0.0, 1.0);
    illumination * density
}
