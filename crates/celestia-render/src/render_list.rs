//! The per-frame list of bodies and stars drawn as meshes, culling, and
//! depth buffer partitioning.
//!
//! A single depth buffer cannot hold a moon a few km away and a star light
//! years away with usable precision. Every entry larger than a pixel
//! therefore gets its own slice of the depth range and its own near/far
//! planes.

use glam::{Quat, Vec3};

use crate::body::{Body, BodyId};
use crate::frustum::{Frustum, Intersection};
use crate::universe::{Star, StarId};

/// Closest allowed near plane (km).
pub const MIN_NEAR_PLANE_DISTANCE: f32 = 0.0001;
/// Largest far/near ratio of a per-entry projection.
pub const MAX_FAR_NEAR_RATIO: f32 = 10_000.0;
/// Height of a star's glow relative to its radius.
pub const CORONA_HEIGHT: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryObject {
    Body(BodyId),
    Star(StarId),
    CometTail(BodyId),
}

/// Bounding sphere used for culling and near/far estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryBounds {
    /// Extent of the geometry; the outer ring edge for ringed bodies.
    pub radius: f32,
    /// Radius including atmosphere or corona.
    pub cull_radius: f32,
    /// Rings and meshes are not convex and need a two-sided depth span.
    pub convex: bool,
    pub oblateness: f32,
    pub cloud_height: f32,
}

impl EntryBounds {
    pub fn sphere(radius: f32) -> Self {
        Self {
            radius,
            cull_radius: radius,
            convex: true,
            oblateness: 0.0,
            cloud_height: 0.0,
        }
    }

    /// Bounds of `body` drawn with the given radius.
    pub fn for_body(body: &Body, radius: f32) -> Self {
        let mut bounds = Self::sphere(radius);
        bounds.oblateness = body.oblateness;
        if let Some(rings) = &body.rings {
            bounds.radius = rings.outer_radius;
            bounds.convex = false;
        }
        if body.mesh.is_some() {
            bounds.convex = false;
        }
        bounds.cull_radius = bounds.radius;
        if let Some(atmosphere) = &body.atmosphere {
            bounds.cull_radius += atmosphere.height;
            bounds.cloud_height = atmosphere.cloud_height;
        }
        bounds
    }

    pub fn for_star(star: &Star) -> Self {
        let mut bounds = Self::sphere(star.radius);
        bounds.cull_radius = star.radius * (1.0 + CORONA_HEIGHT);
        bounds
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderListEntry {
    pub object: EntryObject,
    /// Observer-relative position (km) in the universal frame.
    pub position: Vec3,
    /// From the object toward its sun (km).
    pub sun: Vec3,
    pub distance: f32,
    pub radius: f32,
    pub disc_size: f32,
    pub app_mag: f32,
    pub bounds: EntryBounds,
    /// Eye-space depth span, negative in front of the eye; set by culling.
    pub near_z: f32,
    pub far_z: f32,
    pub depth_bucket: Option<usize>,
}

impl RenderListEntry {
    pub fn new(
        object: EntryObject,
        position: Vec3,
        sun: Vec3,
        radius: f32,
        disc_size: f32,
        app_mag: f32,
        bounds: EntryBounds,
    ) -> Self {
        Self {
            object,
            position,
            sun,
            distance: position.length(),
            radius,
            disc_size,
            app_mag,
            bounds,
            near_z: -MIN_NEAR_PLANE_DISTANCE,
            far_z: -1.0,
            depth_bucket: None,
        }
    }

    /// Drawn as geometry rather than as a point.
    pub fn is_meshed(&self) -> bool {
        self.disc_size > 1.0
    }

    pub fn is_comet_tail(&self) -> bool {
        matches!(self.object, EntryObject::CometTail(_))
    }

    /// Near and far plane distances for drawing this entry.
    pub fn clip_distances(&self) -> (f32, f32) {
        let near = (self.near_z * -0.9).max(MIN_NEAR_PLANE_DISTANCE);
        let mut far = self.far_z * -1.1;
        if far / near > MAX_FAR_NEAR_RATIO {
            far = near * MAX_FAR_NEAR_RATIO;
        }
        (near, far.max(near * 1.001))
    }
}

/// View parameters for culling.
#[derive(Debug, Clone, Copy)]
pub struct CullView {
    pub fov: f32,
    pub viewport: (u32, u32),
    /// Rotation from the universal frame into eye space.
    pub world_to_eye: Quat,
}

/// Drop entries outside the view and compute each survivor's depth span.
pub fn cull_render_list(entries: &mut Vec<RenderListEntry>, view: &CullView) {
    let (width, height) = (view.viewport.0 as f32, view.viewport.1 as f32);
    let frustum = Frustum::infinite(view.fov, width / height, MIN_NEAR_PLANE_DISTANCE);
    let max_span = (width * width + height * height).sqrt();
    let half_fov_cos = (view.fov / 2.0).cos();

    entries.retain_mut(|entry| {
        let center = view.world_to_eye * entry.position;
        let bounds = entry.bounds;
        if frustum.test_sphere(center, bounds.cull_radius) == Intersection::Outside {
            return false;
        }

        let d = center.length();
        let near_z = -(d - bounds.radius) * half_fov_cos * (height / max_span);
        entry.near_z = near_z.min(-MIN_NEAR_PLANE_DISTANCE);

        if !bounds.convex {
            entry.far_z = center.z - bounds.radius;
            if entry.far_z / entry.near_z > MAX_FAR_NEAR_RATIO {
                entry.near_z = entry.far_z / MAX_FAR_NEAR_RATIO;
            }
        } else {
            let eradius = bounds.radius * (1.0 - bounds.oblateness);
            entry.far_z = if d > eradius {
                // Pad to avoid clipping the limb through rounding.
                (d * d - eradius * eradius).sqrt() * -1.1
            } else {
                entry.near_z * 2.0
            };
            if bounds.cloud_height > 0.0 && d < eradius + bounds.cloud_height {
                let cloud_radius = eradius + bounds.cloud_height;
                entry.far_z -= (cloud_radius * cloud_radius - eradius * eradius).sqrt();
            }
        }
        true
    });
}

/// Nearest first.
pub fn sort_render_list(entries: &mut [RenderListEntry]) {
    entries.sort_by(|a, b| a.distance.total_cmp(&b.distance));
}

/// Split of the depth range among meshed entries.
///
/// With `k` meshed entries there are `k + 1` buckets. Bucket 0 is the
/// nearest slice of the depth range and belongs to the nearest meshed
/// entry; bucket `k` is the farthest and holds whatever is drawn before the
/// first meshed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthPartition {
    bucket_count: usize,
}

impl DepthPartition {
    /// Assign buckets to the meshed entries of a list sorted nearest first.
    pub fn assign(entries: &mut [RenderListEntry]) -> Self {
        let mut next = 0;
        for entry in entries.iter_mut() {
            entry.depth_bucket = if entry.is_meshed() {
                next += 1;
                Some(next - 1)
            } else {
                None
            };
        }
        Self {
            bucket_count: next + 1,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn background(&self) -> usize {
        self.bucket_count - 1
    }

    /// `[near, far)` slice of the depth range for `bucket`.
    pub fn range(&self, bucket: usize) -> (f32, f32) {
        let size = 1.0 / self.bucket_count as f32;
        (bucket as f32 * size, (bucket + 1) as f32 * size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyClass, FixedOrbit, RingSystem};
    use crate::color::Color;
    use crate::texture::MultiResTexture;
    use glam::DVec3;

    fn entry(id: u32, z: f32, radius: f32, disc_size: f32) -> RenderListEntry {
        RenderListEntry::new(
            EntryObject::Body(BodyId(id)),
            Vec3::new(0.0, 0.0, z),
            Vec3::X,
            radius,
            disc_size,
            5.0,
            EntryBounds::sphere(radius),
        )
    }

    fn view() -> CullView {
        CullView {
            fov: 45f32.to_radians(),
            viewport: (800, 600),
            world_to_eye: Quat::IDENTITY,
        }
    }

    #[test]
    fn test_cull_drops_entries_behind_the_eye() {
        let mut entries = vec![entry(0, -1000.0, 10.0, 5.0), entry(1, 1000.0, 10.0, 5.0)];
        cull_render_list(&mut entries, &view());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].object, EntryObject::Body(BodyId(0)));
        let e = &entries[0];
        assert!(e.near_z < 0.0 && e.far_z < e.near_z);
    }

    #[test]
    fn test_cull_keeps_entry_straddling_view_edge() {
        // Center outside the frustum but the cull radius reaches in.
        let mut entries = vec![entry(0, -100.0, 60.0, 5.0)];
        entries[0].position = Vec3::new(80.0, 0.0, -100.0);
        entries[0].distance = entries[0].position.length();
        cull_render_list(&mut entries, &view());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_non_convex_depth_span_covers_far_side() {
        let mut body = Body::new(
            BodyId(3),
            "ringed",
            BodyClass::Planet,
            60_000.0,
            Box::new(FixedOrbit { position: DVec3::ZERO }),
        );
        body.rings = Some(RingSystem {
            inner_radius: 70_000.0,
            outer_radius: 140_000.0,
            color: Color::WHITE,
            texture: MultiResTexture::default(),
        });
        let bounds = EntryBounds::for_body(&body, body.radius);
        assert!(!bounds.convex);
        assert_eq!(bounds.radius, 140_000.0);

        let mut entries = vec![RenderListEntry::new(
            EntryObject::Body(body.id),
            Vec3::new(0.0, 0.0, -1e6),
            Vec3::X,
            body.radius,
            100.0,
            0.0,
            bounds,
        )];
        cull_render_list(&mut entries, &view());
        let e = &entries[0];
        assert_eq!(e.far_z, -1e6 - 140_000.0);
        assert!(e.far_z / e.near_z <= MAX_FAR_NEAR_RATIO * 1.0001);
    }

    #[test]
    fn test_inside_bounding_sphere_keeps_minimum_near() {
        let mut entries = vec![entry(0, -0.5, 10.0, 5000.0)];
        cull_render_list(&mut entries, &view());
        let e = &entries[0];
        assert_eq!(e.near_z, -MIN_NEAR_PLANE_DISTANCE);
        assert_eq!(e.far_z, e.near_z * 2.0);
        let (near, far) = e.clip_distances();
        assert!(near >= MIN_NEAR_PLANE_DISTANCE);
        assert!(far > near);
    }

    #[test]
    fn test_clip_distances_clamp_ratio() {
        let mut e = entry(0, -10.0, 1.0, 5.0);
        e.near_z = -0.001;
        e.far_z = -1e6;
        let (near, far) = e.clip_distances();
        assert!((far / near - MAX_FAR_NEAR_RATIO).abs() < 1.0);
    }

    #[test]
    fn test_sort_nearest_first_and_stable() {
        let mut entries = vec![
            entry(0, -300.0, 1.0, 5.0),
            entry(1, -100.0, 1.0, 5.0),
            entry(2, -200.0, 1.0, 5.0),
            entry(3, -100.0, 1.0, 0.5),
        ];
        sort_render_list(&mut entries);
        let order: Vec<EntryObject> = entries.iter().map(|e| e.object).collect();
        assert_eq!(
            order,
            vec![
                EntryObject::Body(BodyId(1)),
                EntryObject::Body(BodyId(3)),
                EntryObject::Body(BodyId(2)),
                EntryObject::Body(BodyId(0)),
            ]
        );
    }

    #[test]
    fn test_depth_partition_gives_meshed_entries_distinct_buckets() {
        let mut entries = vec![
            entry(0, -10.0, 1.0, 50.0),
            entry(1, -20.0, 1.0, 0.5),
            entry(2, -30.0, 1.0, 3.0),
            entry(3, -40.0, 1.0, 1.0),
            entry(4, -50.0, 1.0, 200.0),
        ];
        sort_render_list(&mut entries);
        let partition = DepthPartition::assign(&mut entries);

        assert_eq!(partition.bucket_count(), 4);
        let buckets: Vec<Option<usize>> = entries.iter().map(|e| e.depth_bucket).collect();
        assert_eq!(buckets, vec![Some(0), None, Some(1), None, Some(2)]);

        let mut previous_far = 0.0;
        for bucket in 0..partition.bucket_count() {
            let (near, far) = partition.range(bucket);
            assert_eq!(near, previous_far);
            assert!(far > near);
            previous_far = far;
        }
        assert!((previous_far - 1.0).abs() < 1e-6);
        assert_eq!(partition.background(), 3);
    }

    #[test]
    fn test_star_bounds_include_corona() {
        let star = Star::new(
            StarId(1),
            "Sol",
            DVec3::ZERO,
            4.83,
            crate::universe::SpectralClass::G,
        );
        let bounds = EntryBounds::for_star(&star);
        assert!((bounds.cull_radius - star.radius * 1.2).abs() < 1.0);
        assert!(bounds.convex);
    }
}
