//! Orbit camera that circles the focused body.

use std::f64::consts::FRAC_PI_2;

use celestia_render::astro::km_to_ly;
use celestia_render::{BodyId, Observer};
use glam::{DVec3, Vec3};

/// Radians per key press.
pub const ROTATE_STEP: f64 = 0.05;
/// Distance factor per zoom step.
pub const ZOOM_STEP: f64 = 1.25;
/// Closest approach, in radii of the target.
pub const MIN_DISTANCE_RADII: f64 = 1.05;
pub const MAX_DISTANCE_KM: f64 = 1.0e12;
/// Kept short of the poles so `look_at` always has an up vector.
const MAX_PITCH: f64 = FRAC_PI_2 - 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraAction {
    YawLeft,
    YawRight,
    PitchUp,
    PitchDown,
    ZoomIn,
    ZoomOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub target: BodyId,
    /// Radius of the target, km.
    target_radius: f64,
    /// Distance from the target's center, km.
    distance: f64,
    yaw: f64,
    pitch: f64,
}

impl OrbitCamera {
    /// Start four radii from `target`, slightly above its equator.
    pub fn new(target: BodyId, target_radius: f32) -> Self {
        let target_radius = f64::from(target_radius);
        Self {
            target,
            target_radius,
            distance: target_radius * 4.0,
            yaw: 0.0,
            pitch: 0.2,
        }
    }

    /// Switch to a new target, keeping the viewing angles.
    pub fn retarget(&mut self, target: BodyId, target_radius: f32) {
        let angles = (self.yaw, self.pitch);
        *self = Self::new(target, target_radius);
        (self.yaw, self.pitch) = angles;
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn set_distance(&mut self, km: f64) {
        let min = self.target_radius * MIN_DISTANCE_RADII;
        self.distance = km.clamp(min, MAX_DISTANCE_KM.max(min));
    }

    pub fn apply(&mut self, action: CameraAction) {
        match action {
            CameraAction::YawLeft => self.yaw -= ROTATE_STEP,
            CameraAction::YawRight => self.yaw += ROTATE_STEP,
            CameraAction::PitchUp => self.pitch = (self.pitch + ROTATE_STEP).min(MAX_PITCH),
            CameraAction::PitchDown => self.pitch = (self.pitch - ROTATE_STEP).max(-MAX_PITCH),
            CameraAction::ZoomIn => self.set_distance(self.distance / ZOOM_STEP),
            CameraAction::ZoomOut => self.set_distance(self.distance * ZOOM_STEP),
        }
    }

    /// Unit vector from the target toward the camera.
    pub fn offset_direction(&self) -> DVec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        DVec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw)
    }

    /// Observer looking at a target located at `target_ly`.
    pub fn observer(&self, target_ly: DVec3) -> Observer {
        let position = target_ly + km_to_ly(self.distance) * self.offset_direction();
        let mut observer = Observer::new(position, glam::Quat::IDENTITY);
        observer.look_at(target_ly, Vec3::Y);
        observer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use celestia_render::astro::ly_to_km;

    #[test]
    fn test_observer_faces_target() {
        let camera = OrbitCamera::new(BodyId(3), 6378.0);
        let target = DVec3::new(1.0e-5, 0.0, 0.0);
        let observer = camera.observer(target);

        let to_target = (target - observer.position).normalize().as_vec3();
        assert!(observer.forward().dot(to_target) > 0.9999);
        let distance = ly_to_km((observer.position - target).length());
        assert!((distance - 4.0 * 6378.0).abs() < 1.0);
    }

    #[test]
    fn test_zoom_clamps_above_surface() {
        let mut camera = OrbitCamera::new(BodyId(3), 1000.0);
        for _ in 0..100 {
            camera.apply(CameraAction::ZoomIn);
        }
        assert!((camera.distance() - 1050.0).abs() < 1e-9);

        camera.apply(CameraAction::ZoomOut);
        assert!((camera.distance() - 1050.0 * ZOOM_STEP).abs() < 1e-9);
    }

    #[test]
    fn test_pitch_stops_short_of_pole() {
        let mut camera = OrbitCamera::new(BodyId(1), 1.0);
        for _ in 0..100 {
            camera.apply(CameraAction::PitchUp);
        }
        assert!(camera.offset_direction().y < 1.0);
        let observer = camera.observer(DVec3::ZERO);
        assert!(observer.orientation.is_normalized());
    }

    #[test]
    fn test_yaw_circles_target() {
        let mut camera = OrbitCamera::new(BodyId(1), 1.0);
        let before = camera.offset_direction();
        camera.apply(CameraAction::YawRight);
        let after = camera.offset_direction();
        assert!((before.length() - 1.0).abs() < 1e-12);
        assert!((after.length() - 1.0).abs() < 1e-12);
        assert!((before.y - after.y).abs() < 1e-12);
        assert!(before.dot(after) < 1.0);
    }

    #[test]
    fn test_retarget_keeps_angles_resets_distance() {
        let mut camera = OrbitCamera::new(BodyId(1), 100.0);
        camera.apply(CameraAction::YawLeft);
        camera.apply(CameraAction::ZoomOut);
        let direction = camera.offset_direction();

        camera.retarget(BodyId(2), 50.0);
        assert_eq!(camera.target, BodyId(2));
        assert_eq!(camera.offset_direction(), direction);
        assert!((camera.distance() - 200.0).abs() < 1e-9);
    }
}
