//! View frustum with inward-facing planes, built in eye space and movable
//! into an object's local space for culling.
//!
//! Eye space follows the usual right-handed convention: the eye sits at the
//! origin looking down -Z with +Y up.

use glam::{Mat4, Vec3, Vec4};

const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// A plane `normal · p + d = 0`; points with a positive distance lie on the
/// side the normal points to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    /// Plane with the given normal passing through `point`.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self {
            normal,
            d: -normal.dot(point),
        }
    }

    #[inline]
    pub fn distance_to(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }

    fn as_vec4(&self) -> Vec4 {
        self.normal.extend(self.d)
    }

    fn from_vec4(v: Vec4) -> Self {
        let plane = Self::new(v.truncate(), v.w);
        plane.normalized()
    }

    /// Scale so the normal has unit length; degenerate planes are returned
    /// unchanged.
    pub fn normalized(self) -> Self {
        let len = self.normal.length();
        if len > 0.0 {
            Self::new(self.normal / len, self.d / len)
        } else {
            self
        }
    }

    /// The single point shared by three planes, or `None` if any two are
    /// parallel.
    pub fn intersection(p0: &Plane, p1: &Plane, p2: &Plane) -> Option<Vec3> {
        let n12 = p1.normal.cross(p2.normal);
        let det = p0.normal.dot(n12);
        if det.abs() < f32::EPSILON {
            return None;
        }
        let n20 = p2.normal.cross(p0.normal);
        let n01 = p0.normal.cross(p1.normal);
        Some((n12 * -p0.d + n20 * -p1.d + n01 * -p2.d) / det)
    }
}

/// Result of a bounding-volume test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersection {
    Inside,
    Intersecting,
    Outside,
}

/// A perspective view volume; infinite when built without a far distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
    infinite: bool,
}

impl Frustum {
    /// Infinite frustum with vertical field of view `fov` (radians).
    pub fn infinite(fov: f32, aspect: f32, near: f32) -> Self {
        let mut frustum = Self::new(fov, aspect, near, near * 2.0);
        frustum.infinite = true;
        frustum
    }

    /// Frustum with vertical field of view `fov` (radians) clipped to
    /// `[near, far]`.
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let h = (fov * 0.5).tan();
        let w = h * aspect;

        let mut planes = [Plane::new(Vec3::ZERO, 0.0); 6];
        planes[LEFT] = Plane::new(Vec3::new(1.0, 0.0, -w), 0.0).normalized();
        planes[RIGHT] = Plane::new(Vec3::new(-1.0, 0.0, -w), 0.0).normalized();
        planes[BOTTOM] = Plane::new(Vec3::new(0.0, 1.0, -h), 0.0).normalized();
        planes[TOP] = Plane::new(Vec3::new(0.0, -1.0, -h), 0.0).normalized();
        planes[NEAR] = Plane::new(Vec3::NEG_Z, -near);
        planes[FAR] = Plane::new(Vec3::Z, far);

        Self {
            planes,
            infinite: false,
        }
    }

    /// Extract planes from a combined view-projection matrix (Gribb-Hartmann,
    /// wgpu clip space with depth in `[0, 1]`).
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];
        let planes = [
            Plane::from_vec4(rows[3] + rows[0]),
            Plane::from_vec4(rows[3] - rows[0]),
            Plane::from_vec4(rows[3] + rows[1]),
            Plane::from_vec4(rows[3] - rows[1]),
            Plane::from_vec4(rows[2]),
            Plane::from_vec4(rows[3] - rows[2]),
        ];
        Self {
            planes,
            infinite: false,
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    pub fn near_plane(&self) -> &Plane {
        &self.planes[NEAR]
    }

    pub fn planes(&self) -> &[Plane] {
        if self.infinite {
            &self.planes[..FAR]
        } else {
            &self.planes
        }
    }

    /// Move the frustum into the space that `object_to_eye` maps from.
    ///
    /// Planes are renormalized afterwards, so distances are measured in the
    /// target space's units even when the matrix scales.
    pub fn transform(&mut self, object_to_eye: &Mat4) {
        let transpose = object_to_eye.transpose();
        for plane in &mut self.planes {
            *plane = Plane::from_vec4(transpose * plane.as_vec4());
        }
    }

    /// Copy of the frustum in the space that `object_to_eye` maps from.
    #[must_use]
    pub fn transformed(&self, object_to_eye: &Mat4) -> Self {
        let mut frustum = self.clone();
        frustum.transform(object_to_eye);
        frustum
    }

    /// Classify a sphere against the frustum.
    pub fn test_sphere(&self, center: Vec3, radius: f32) -> Intersection {
        let mut intersecting = false;
        for plane in self.planes() {
            let distance = plane.distance_to(center);
            if distance < -radius {
                return Intersection::Outside;
            }
            if distance <= radius {
                intersecting = true;
            }
        }
        if intersecting {
            Intersection::Intersecting
        } else {
            Intersection::Inside
        }
    }

    /// The eight corners: near then far, each top-left, top-right,
    /// bottom-left, bottom-right. `None` for an infinite frustum or a
    /// degenerate one.
    pub fn corners(&self) -> Option<[Vec3; 8]> {
        if self.infinite {
            return None;
        }
        let p = &self.planes;
        let mut corners = [Vec3::ZERO; 8];
        for (i, depth) in [NEAR, FAR].into_iter().enumerate() {
            let base = i * 4;
            corners[base] = Plane::intersection(&p[depth], &p[TOP], &p[LEFT])?;
            corners[base + 1] = Plane::intersection(&p[depth], &p[TOP], &p[RIGHT])?;
            corners[base + 2] = Plane::intersection(&p[depth], &p[BOTTOM], &p[LEFT])?;
            corners[base + 3] = Plane::intersection(&p[depth], &p[BOTTOM], &p[RIGHT])?;
        }
        Some(corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use std::f32::consts::FRAC_PI_4;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-3
    }

    #[test]
    fn test_sphere_classification() {
        let frustum = Frustum::new(FRAC_PI_4, 1.5, 1.0, 100.0);
        assert_eq!(
            frustum.test_sphere(Vec3::new(0.0, 0.0, -10.0), 1.0),
            Intersection::Inside
        );
        assert_eq!(
            frustum.test_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0),
            Intersection::Outside
        );
        assert_eq!(
            frustum.test_sphere(Vec3::new(0.0, 0.0, -1.0), 0.5),
            Intersection::Intersecting
        );
        assert_eq!(
            frustum.test_sphere(Vec3::new(0.0, 0.0, -200.0), 1.0),
            Intersection::Outside
        );
        assert_eq!(
            frustum.test_sphere(Vec3::new(500.0, 0.0, -10.0), 1.0),
            Intersection::Outside
        );
    }

    #[test]
    fn test_infinite_frustum_ignores_far_plane() {
        let frustum = Frustum::infinite(FRAC_PI_4, 1.0, 0.5);
        assert!(frustum.is_infinite());
        assert_eq!(frustum.planes().len(), 5);
        assert_eq!(
            frustum.test_sphere(Vec3::new(0.0, 0.0, -1.0e9), 1.0),
            Intersection::Inside
        );
        assert!(frustum.corners().is_none());
    }

    #[test]
    fn test_corners_lie_on_near_and_far_planes() {
        let frustum = Frustum::new(FRAC_PI_4 * 2.0, 1.0, 1.0, 10.0);
        let corners = frustum.corners().unwrap();
        // 90 degree fov, square aspect: corners at |x| = |y| = depth.
        assert!(approx(corners[0], Vec3::new(-1.0, 1.0, -1.0)));
        assert!(approx(corners[1], Vec3::new(1.0, 1.0, -1.0)));
        assert!(approx(corners[2], Vec3::new(-1.0, -1.0, -1.0)));
        assert!(approx(corners[3], Vec3::new(1.0, -1.0, -1.0)));
        assert!(approx(corners[4], Vec3::new(-10.0, 10.0, -10.0)));
        assert!(approx(corners[7], Vec3::new(10.0, -10.0, -10.0)));
    }

    #[test]
    fn test_transform_into_object_space() {
        // Object sits 10 units in front of the eye, scaled by 2.
        let object_to_eye =
            Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)) * Mat4::from_scale(Vec3::splat(2.0));
        let frustum = Frustum::new(FRAC_PI_4, 1.0, 1.0, 100.0).transformed(&object_to_eye);

        // The object origin is well inside; the eye (object-space z = 5) is
        // behind the near plane.
        assert_eq!(frustum.test_sphere(Vec3::ZERO, 1.0), Intersection::Inside);
        assert_eq!(
            frustum.test_sphere(Vec3::new(0.0, 0.0, 5.0), 0.1),
            Intersection::Outside
        );
        for plane in frustum.planes() {
            assert!((plane.normal.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_transform_with_rotation_moves_corners() {
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let frustum = Frustum::new(FRAC_PI_4, 1.0, 1.0, 10.0);
        let rotated = frustum.transformed(&Mat4::from_quat(rotation));
        let corners = rotated.corners().unwrap();
        let expected = rotation.inverse() * frustum.corners().unwrap()[5];
        assert!(approx(corners[5], expected));
    }

    #[test]
    fn test_from_view_projection_matches_direct_construction() {
        let proj = Mat4::perspective_rh(FRAC_PI_4, 1.0, 1.0, 100.0);
        let frustum = Frustum::from_view_projection(&proj);
        assert_eq!(
            frustum.test_sphere(Vec3::new(0.0, 0.0, -50.0), 1.0),
            Intersection::Inside
        );
        assert_eq!(
            frustum.test_sphere(Vec3::new(0.0, 0.0, -150.0), 1.0),
            Intersection::Outside
        );
        assert_eq!(
            frustum.test_sphere(Vec3::new(0.0, 0.0, 5.0), 1.0),
            Intersection::Outside
        );
    }

    #[test]
    fn test_three_plane_intersection() {
        let x = Plane::new(Vec3::X, -1.0);
        let y = Plane::new(Vec3::Y, -2.0);
        let z = Plane::new(Vec3::Z, -3.0);
        assert!(approx(
            Plane::intersection(&x, &y, &z).unwrap(),
            Vec3::new(1.0, 2.0, 3.0)
        ));
        assert!(Plane::intersection(&x, &x, &z).is_none());
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 2.0), Vec3::Z);
        assert_eq!(plane.distance_to(Vec3::new(5.0, 5.0, 3.0)), 1.0);
    }
}
