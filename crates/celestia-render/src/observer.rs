//! The viewpoint a frame is rendered from, and the current selection.

use glam::{DVec3, Quat, Vec3};

use crate::body::BodyId;
use crate::universe::StarId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObserverMode {
    #[default]
    Free,
    /// Moving along a scripted or goto path.
    Travelling,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observer {
    /// Light years in the universal frame.
    pub position: DVec3,
    /// Camera-to-world rotation. The camera looks down its local -Z.
    pub orientation: Quat,
    /// Vertical field of view (radians).
    pub fov: f32,
    pub mode: ObserverMode,
}

impl Default for Observer {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            orientation: Quat::IDENTITY,
            fov: 45f32.to_radians(),
            mode: ObserverMode::Free,
        }
    }
}

impl Observer {
    pub fn new(position: DVec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
            ..Self::default()
        }
    }

    /// Orient the camera toward `target` (ly) with `up` as the rough up
    /// direction.
    pub fn look_at(&mut self, target: DVec3, up: Vec3) {
        let forward = (target - self.position).normalize_or_zero().as_vec3();
        if forward == Vec3::ZERO {
            return;
        }
        let right = forward.cross(up).normalize_or_zero();
        if right == Vec3::ZERO {
            return;
        }
        let true_up = right.cross(forward);
        self.orientation =
            Quat::from_mat3(&glam::Mat3::from_cols(right, true_up, -forward)).normalize();
    }

    /// Direction the camera faces, in world space.
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }
}

/// What the user has picked, highlighted by orbit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Body(BodyId),
    Star(StarId),
}

impl Selection {
    pub fn is_body(&self, id: BodyId) -> bool {
        matches!(self, Self::Body(selected) if *selected == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_at_faces_target() {
        let mut observer = Observer::new(DVec3::new(0.0, 0.0, 10.0), Quat::IDENTITY);
        observer.look_at(DVec3::new(10.0, 0.0, 10.0), Vec3::Y);
        assert!((observer.forward() - Vec3::X).length() < 1e-5);
        assert!((observer.orientation * Vec3::Y - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_look_at_degenerate_keeps_orientation() {
        let mut observer = Observer::default();
        observer.look_at(DVec3::ZERO, Vec3::Y);
        assert_eq!(observer.orientation, Quat::IDENTITY);
        observer.look_at(DVec3::new(0.0, 5.0, 0.0), Vec3::Y);
        assert_eq!(observer.orientation, Quat::IDENTITY);
    }

    #[test]
    fn test_selection_matches_body() {
        let selection = Selection::Body(BodyId(4));
        assert!(selection.is_body(BodyId(4)));
        assert!(!selection.is_body(BodyId(5)));
        assert!(!Selection::Star(StarId(4)).is_body(BodyId(4)));
    }
}
