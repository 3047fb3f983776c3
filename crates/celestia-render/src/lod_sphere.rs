//! Adaptive unit-sphere tessellation.
//!
//! The sphere is parameterized on an integer grid: longitude (theta) over
//! `[0, MAX_DIVISIONS]` and latitude (phi) over `[0, MAX_DIVISIONS / 2]`. The
//! apparent size of the sphere picks a grid step. Fine steps split the
//! sphere into a quadtree of patches that is culled against the view
//! frustum in object space; each surviving leaf becomes one triangle strip
//! in the frame's sphere arena.

use glam::Vec3;

use crate::backend::{Frame, MAX_SPHERE_TEXTURES, PassId, SphereGeometry};
use crate::flags::bit_flags;
use crate::frustum::{Frustum, Intersection, Plane};
use crate::texture::{Texture, TextureId};
use crate::trig::TrigTables;

pub const MAX_DIVISIONS: usize = 16384;
pub const THETA_DIVISIONS: usize = MAX_DIVISIONS;
pub const PHI_DIVISIONS: usize = MAX_DIVISIONS / 2;
/// Coarsest step a single patch may be tessellated with before the sphere
/// is split into patches.
pub const MIN_STEP: usize = 128;

bit_flags! {
    /// Vertex channels requested from the tessellator.
    pub struct SphereAttributes(u32) {
        const NORMALS = 0x1, "normals";
        /// Per-vertex tangents for bump mapping.
        const TANGENTS = 0x2, "tangents";
        /// The caller has bound its own textures; patches carry no tiles.
        const MULTIPASS = 0x4, "multipass";
    }
}

impl SphereAttributes {
    /// Tangents are a custom vertex attribute; without a vertex processing
    /// stage nothing can consume them, so the channel is dropped.
    #[must_use]
    pub fn for_vertex_processing(mut self, available: bool) -> Self {
        if !available {
            self.set(Self::TANGENTS, false);
        }
        self
    }
}

/// LOD exponent for a sphere `disc_size` pixels across.
pub fn sphere_lod_bias(disc_size: f32) -> i32 {
    match disc_size {
        d if d < 10.0 => -3,
        d if d < 20.0 => -2,
        d if d < 50.0 => -1,
        d if d < 200.0 => 0,
        d if d < 1200.0 => 1,
        d if d < 7200.0 => 2,
        d if d < 53200.0 => 3,
        _ => 4,
    }
}

/// Grid step for a sphere `pixel_width` pixels across.
pub fn sphere_step(pixel_width: f32) -> usize {
    let bias = sphere_lod_bias(pixel_width);
    let lod = if bias < 0 { 64 >> -bias } else { 64 << bias };
    MAX_DIVISIONS / lod.clamp(2, MAX_DIVISIONS)
}

/// Indices in one patch strip, including the degenerate joins.
pub fn strip_index_count(rings: usize, slices: usize) -> usize {
    rings * (slices + 2) * 2 - 2
}

/// Texture coordinate mapping for one texture unit of a patch.
#[derive(Debug, Clone, Copy)]
struct TexCoords {
    u0: f32,
    v0: f32,
    du: f32,
    dv: f32,
}

impl Default for TexCoords {
    fn default() -> Self {
        Self {
            u0: 1.0,
            v0: 1.0,
            du: 1.0 / THETA_DIVISIONS as f32,
            dv: 1.0 / PHI_DIVISIONS as f32,
        }
    }
}

struct RenderInfo<'a> {
    pass: PassId,
    step: usize,
    attributes: SphereAttributes,
    frustum: &'a Frustum,
    /// Frustum corners in object space; `None` disables the separating
    /// plane test.
    corners: Option<[Vec3; 8]>,
    textures: &'a [&'a dyn Texture],
    tex_lod: [usize; MAX_SPHERE_TEXTURES],
}

/// Tessellates a unit sphere at a level of detail chosen from its apparent
/// size.
#[derive(Debug, Clone)]
pub struct LodSphereMesh {
    trig: TrigTables,
}

impl Default for LodSphereMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl LodSphereMesh {
    pub fn new() -> Self {
        Self {
            trig: TrigTables::new(THETA_DIVISIONS, PHI_DIVISIONS),
        }
    }

    pub fn trig(&self) -> &TrigTables {
        &self.trig
    }

    /// Append a unit sphere to `frame`, drawn with surface pass `pass`.
    ///
    /// `frustum` must already be in the sphere's object space.
    /// `pixel_width` is the apparent diameter in pixels and only selects the
    /// level of detail. At most [`MAX_SPHERE_TEXTURES`] textures are used;
    /// a texture split into tiles forces at least one patch per tile.
    /// Returns the number of patches emitted.
    pub fn render(
        &self,
        frame: &mut Frame,
        pass: PassId,
        attributes: SphereAttributes,
        frustum: &Frustum,
        pixel_width: f32,
        textures: &[&dyn Texture],
    ) -> usize {
        let textures = &textures[..textures.len().min(MAX_SPHERE_TEXTURES)];

        let mut step = sphere_step(pixel_width);
        let mut theta_extent = MAX_DIVISIONS;
        let mut phi_extent = theta_extent / 2;
        let mut split = 1;
        if step < MIN_STEP {
            split = MIN_STEP / step;
            theta_extent /= split;
            phi_extent /= split;
        }

        // Each patch binds one tile, so the patch grid is at least as fine
        // as the finest tile grid.
        let mut tex_lod = [0usize; MAX_SPHERE_TEXTURES];
        let mut min_split = 1;
        for (i, texture) in textures.iter().enumerate() {
            let pixels_per_texel = pixel_width * 2.0 / (texture.width().max(1) as f32 / 2.0);
            let level = pixels_per_texel.log2() as i64;
            let max_level = texture.lod_count().saturating_sub(1) as i64;
            tex_lod[i] = level.min(max_level).max(0) as usize;
            min_split = min_split
                .max(texture.u_tile_count(tex_lod[i]))
                .max(texture.v_tile_count(tex_lod[i]));
        }

        if split < min_split {
            theta_extent /= min_split / split;
            phi_extent /= min_split / split;
            split = min_split;
            if phi_extent <= step {
                step /= step / phi_extent;
            }
        }

        let mut ri = RenderInfo {
            pass,
            step,
            attributes,
            frustum,
            corners: None,
            textures,
            tex_lod,
        };

        if split == 1 {
            return self.render_section(frame, &ri, 0, 0, theta_extent);
        }

        ri.corners = frustum.corners();
        let extent = MAX_DIVISIONS / 2;
        let mut patches = 0;
        for i in 0..2 {
            for j in 0..2 {
                patches += self.render_patches(frame, &ri, i * extent / 2, j * extent, extent, split / 2);
            }
        }
        patches
    }

    fn render_patches(
        &self,
        frame: &mut Frame,
        ri: &RenderInfo<'_>,
        phi0: usize,
        theta0: usize,
        extent: usize,
        level: usize,
    ) -> usize {
        let theta_extent = extent;
        let phi_extent = extent / 2;

        let p0 = self.trig.sphere_point(theta0, phi0);
        let p1 = self.trig.sphere_point(theta0 + theta_extent, phi0);
        let p2 = self.trig.sphere_point(theta0 + theta_extent, phi0 + phi_extent);
        let p3 = self.trig.sphere_point(theta0, phi0 + phi_extent);

        // At a pole one edge collapses to a point, so take the longer one.
        let v0 = p1 - p0;
        let v2 = p3 - p2;
        let normal = if v0.length_squared() > v2.length_squared() {
            (p0 - p3).cross(v0)
        } else {
            (p2 - p1).cross(v2)
        };
        debug_assert!(normal.length_squared() > 0.0, "degenerate sphere patch");

        // The normal points into the sphere. If the whole frustum lies on
        // that side, the patch faces away from every visible point.
        if let Some(corners) = &ri.corners {
            let plane = Plane::from_point_normal(p0, normal.normalize_or_zero());
            if corners.iter().all(|c| plane.distance_to(*c) > 0.0) {
                return 0;
            }
        }

        let center = (p0 + p1 + p2 + p3) * 0.25;
        let radius = [p0, p1, p2, p3]
            .iter()
            .map(|p| center.distance(*p))
            .fold(0.0f32, f32::max);
        if ri.frustum.test_sphere(center, radius) == Intersection::Outside {
            return 0;
        }

        if level == 1 {
            return self.render_section(frame, ri, phi0, theta0, theta_extent);
        }

        let mut patches = 0;
        for i in 0..2 {
            for j in 0..2 {
                patches += self.render_patches(
                    frame,
                    ri,
                    phi0 + phi_extent / 2 * i,
                    theta0 + theta_extent / 2 * j,
                    extent / 2,
                    level / 2,
                );
            }
        }
        patches
    }

    /// Tessellate one patch `extent` wide in theta and half that in phi.
    fn render_section(
        &self,
        frame: &mut Frame,
        ri: &RenderInfo<'_>,
        phi0: usize,
        theta0: usize,
        extent: usize,
    ) -> usize {
        let theta_extent = extent;
        let phi_extent = extent / 2;
        let theta1 = theta0 + theta_extent;
        let phi1 = phi0 + phi_extent;
        let step = ri.step;

        let mut coords = [TexCoords::default(); MAX_SPHERE_TEXTURES];
        let mut tiles: [Option<TextureId>; MAX_SPHERE_TEXTURES] = [None; MAX_SPHERE_TEXTURES];
        for (tex, texture) in ri.textures.iter().enumerate() {
            let lod = ri.tex_lod[tex];
            let u_split = texture.u_tile_count(lod).max(1);
            let v_split = texture.v_tile_count(lod).max(1);
            let patch_split = MAX_DIVISIONS / extent;
            debug_assert!(patch_split >= u_split && patch_split >= v_split);
            let per_u = (patch_split / u_split).max(1);
            let per_v = (patch_split / v_split).max(1);

            let u = theta0 / theta_extent;
            let v = phi0 / phi_extent;
            let tc = &mut coords[tex];
            tc.du *= u_split as f32;
            tc.dv *= v_split as f32;
            tc.u0 = 1.0 - (u % per_u) as f32 / per_u as f32 + theta0 as f32 * tc.du;
            tc.v0 = 1.0 - (v % per_v) as f32 / per_v as f32 + phi0 as f32 * tc.dv;

            let tile = texture.tile(lod, u_split - u / per_u - 1, v_split - v / per_v - 1);
            tc.du *= tile.du;
            tc.dv *= tile.dv;
            tc.u0 = tc.u0 * tile.du + tile.u;
            tc.v0 = tc.v0 * tile.dv + tile.v;
            if !ri.attributes.contains(SphereAttributes::MULTIPASS) {
                tiles[tex] = tile.id;
            }
        }

        let tangents = ri.attributes.contains(SphereAttributes::TANGENTS);
        let tex_units = ri.textures.len();
        let stride = if tangents { 6 } else { 3 } + tex_units * 2;
        let rings = phi_extent / step;
        let slices = theta_extent / step;
        let vertex_count = (rings + 1) * (slices + 1);
        let index_count = strip_index_count(rings, slices);
        debug_assert!(vertex_count <= u16::MAX as usize);

        let Some(patch) = frame.map_sphere_patch(vertex_count * stride, index_count) else {
            log::debug!("sphere arena exhausted, skipping patch at ({theta0}, {phi0})");
            return 0;
        };

        let mut out = patch.vertices.iter_mut();
        let mut push = |value: f32| {
            if let Some(slot) = out.next() {
                *slot = value;
            }
        };
        for phi in (phi0..=phi1).step_by(step) {
            let cphi = self.trig.cos_phi(phi);
            let sphi = self.trig.sin_phi(phi);
            for theta in (theta0..=theta1).step_by(step) {
                let ctheta = self.trig.cos_theta(theta);
                let stheta = self.trig.sin_theta(theta);
                push(cphi * ctheta);
                push(sphi);
                push(cphi * stheta);
                if tangents {
                    push(stheta);
                    push(0.0);
                    push(-ctheta);
                }
                for tc in &coords[..tex_units] {
                    push(tc.u0 - theta as f32 * tc.du);
                    push(tc.v0 - phi as f32 * tc.dv);
                }
            }
        }

        let row = slices + 1;
        let mut k = 0;
        for i in 0..rings {
            if i > 0 {
                patch.indices[k] = (i * row) as u16;
                k += 1;
            }
            for j in 0..row {
                patch.indices[k] = (i * row + j) as u16;
                patch.indices[k + 1] = ((i + 1) * row + j) as u16;
                k += 2;
            }
            if i + 1 < rings {
                patch.indices[k] = ((i + 1) * row + slices) as u16;
                k += 1;
            }
        }
        debug_assert_eq!(k, index_count);

        let geometry = SphereGeometry {
            vertex_offset: patch.vertex_offset,
            vertex_count: vertex_count as u32,
            stride: stride as u32,
            has_tangents: tangents,
            tex_units: tex_units as u32,
            index_offset: patch.index_offset,
            index_count: index_count as u32,
            textures: tiles,
        };
        frame.draw_sphere(ri.pass, geometry);
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, SurfacePass, ShaderProgram};
    use crate::texture::TiledTexture;
    use glam::Mat4;
    use std::collections::HashSet;
    use std::f32::consts::FRAC_PI_4;

    /// Frustum in the object space of a unit sphere placed at `eye_pos` in
    /// eye coordinates.
    fn object_frustum(fov: f32, eye_pos: Vec3) -> Frustum {
        Frustum::new(fov, 1.0, 0.01, 100.0).transformed(&Mat4::from_translation(eye_pos))
    }

    fn setup() -> (LodSphereMesh, Frame, PassId) {
        let mut frame = Frame::default();
        let pass = frame.add_surface_pass(SurfacePass::new(Mat4::IDENTITY, ShaderProgram::Diffuse));
        (LodSphereMesh::new(), frame, pass)
    }

    #[test]
    fn test_lod_step_is_monotone() {
        let sizes = [0.5, 5.0, 15.0, 40.0, 100.0, 500.0, 2000.0, 10_000.0, 60_000.0, 1e7];
        let steps: Vec<usize> = sizes.iter().map(|&s| sphere_step(s)).collect();
        for pair in steps.windows(2) {
            assert!(pair[0] >= pair[1], "steps {steps:?}");
        }
        for step in steps {
            assert!((1..=MAX_DIVISIONS).contains(&step));
        }
        assert_eq!(sphere_step(5.0), 2048);
        assert_eq!(sphere_step(100.0), 256);
        assert_eq!(sphere_step(1e7), 16);
    }

    #[test]
    fn test_small_sphere_is_one_patch() {
        let (mesh, mut frame, pass) = setup();
        let frustum = object_frustum(FRAC_PI_4, Vec3::new(0.0, 0.0, -20.0));
        assert_eq!(mesh.render(&mut frame, pass, SphereAttributes::NORMALS, &frustum, 5.0, &[]), 1);

        let Command::DrawSphere { geometry, .. } = &frame.commands()[0] else {
            panic!("expected a sphere draw");
        };
        // step 2048: 8 slices around, 4 rings pole to pole
        assert_eq!(geometry.vertex_count, 5 * 9);
        assert_eq!(geometry.index_count as usize, strip_index_count(4, 8));
        assert_eq!(geometry.index_count, 78);
        assert_eq!(geometry.stride, 3);

        let indices = &frame.sphere_indices()[geometry.indices()];
        assert!(indices.iter().all(|&i| u32::from(i) < geometry.vertex_count));
        let vertices = &frame.sphere_vertices()[geometry.vertex_floats()];
        assert_eq!(&vertices[..3], &[0.0, -1.0, 0.0]);
        let last = vertices.len() - 3;
        assert_eq!(&vertices[last..], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_sphere_behind_eye_is_culled() {
        let (mesh, mut frame, pass) = setup();
        let frustum = object_frustum(FRAC_PI_4, Vec3::new(0.0, 0.0, 5.0));
        let patches = mesh.render(&mut frame, pass, SphereAttributes::NORMALS, &frustum, 2000.0, &[]);
        assert_eq!(patches, 0);
        assert!(frame.commands().is_empty());
    }

    #[test]
    fn test_sphere_inside_frustum_draws_every_leaf() {
        let (mesh, mut frame, pass) = setup();
        let frustum = object_frustum(FRAC_PI_4, Vec3::new(0.0, 0.0, -20.0));
        // step 64 splits the sphere 2 ways in each direction
        assert_eq!(mesh.render(&mut frame, pass, SphereAttributes::NORMALS, &frustum, 2000.0, &[]), 4);
        // step 32 splits it 4 ways
        let mut frame = Frame::default();
        assert_eq!(mesh.render(&mut frame, pass, SphereAttributes::NORMALS, &frustum, 10_000.0, &[]), 16);
        assert_eq!(frame.sphere_patch_count(), 16);
    }

    #[test]
    fn test_close_up_culls_far_patches() {
        let (mesh, mut frame, pass) = setup();
        let frustum = object_frustum(10f32.to_radians(), Vec3::new(0.0, 0.0, -1.2));
        let patches = mesh.render(&mut frame, pass, SphereAttributes::NORMALS, &frustum, 10_000.0, &[]);
        assert!(patches > 0 && patches < 16, "drew {patches} patches");
    }

    #[test]
    fn test_tiled_texture_forces_split() {
        let (mesh, mut frame, pass) = setup();
        let ids: Vec<TextureId> = (1..=16).map(TextureId).collect();
        let texture = TiledTexture::new(8192, 4096).with_level(4, 4, ids);
        let frustum = object_frustum(FRAC_PI_4, Vec3::new(0.0, 0.0, -20.0));
        let patches = mesh.render(&mut frame, pass, SphereAttributes::NORMALS, &frustum, 5.0, &[&texture]);
        assert!(patches >= 16);

        let bound: HashSet<TextureId> = frame
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawSphere { geometry, .. } => geometry.textures[0],
                _ => None,
            })
            .collect();
        assert_eq!(bound.len(), 16);
    }

    #[test]
    fn test_texture_coordinates_span_unit_square() {
        let (mesh, mut frame, pass) = setup();
        let texture = TiledTexture::single(TextureId(1), 1024, 512);
        let frustum = object_frustum(FRAC_PI_4, Vec3::new(0.0, 0.0, -20.0));
        mesh.render(&mut frame, pass, SphereAttributes::NORMALS, &frustum, 5.0, &[&texture]);
        let Command::DrawSphere { geometry, .. } = &frame.commands()[0] else {
            panic!("expected a sphere draw");
        };
        assert_eq!(geometry.stride, 5);
        assert_eq!(geometry.textures[0], Some(TextureId(1)));
        let uvs: Vec<(f32, f32)> = frame.sphere_vertices()[geometry.vertex_floats()]
            .chunks(5)
            .map(|v| (v[3], v[4]))
            .collect();
        assert_eq!(uvs[0], (1.0, 1.0));
        assert_eq!(*uvs.last().unwrap(), (0.0, 0.0));
        assert!(uvs.iter().all(|&(u, v)| (0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_tangents_need_vertex_processing() {
        let requested = SphereAttributes::NORMALS | SphereAttributes::TANGENTS;
        assert_eq!(requested.for_vertex_processing(true), requested);
        assert_eq!(requested.for_vertex_processing(false), SphereAttributes::NORMALS);
    }

    #[test]
    fn test_tangents_and_multipass() {
        let (mesh, mut frame, pass) = setup();
        let texture = TiledTexture::single(TextureId(3), 1024, 512);
        let frustum = object_frustum(FRAC_PI_4, Vec3::new(0.0, 0.0, -20.0));
        let attributes = SphereAttributes::NORMALS | SphereAttributes::TANGENTS | SphereAttributes::MULTIPASS;
        mesh.render(&mut frame, pass, attributes, &frustum, 5.0, &[&texture, &texture]);
        let Command::DrawSphere { geometry, .. } = &frame.commands()[0] else {
            panic!("expected a sphere draw");
        };
        assert!(geometry.has_tangents);
        assert_eq!(geometry.stride, 6 + 4);
        assert_eq!(geometry.textures, [None; MAX_SPHERE_TEXTURES]);
    }

    #[test]
    fn test_exhausted_arena_skips_patches() {
        let mesh = LodSphereMesh::new();
        let mut frame = Frame::new(16);
        let pass = frame.add_surface_pass(SurfacePass::new(Mat4::IDENTITY, ShaderProgram::Diffuse));
        let frustum = object_frustum(FRAC_PI_4, Vec3::new(0.0, 0.0, -20.0));
        assert_eq!(mesh.render(&mut frame, pass, SphereAttributes::NORMALS, &frustum, 5.0, &[]), 0);
        assert!(frame.commands().is_empty());
    }
}
