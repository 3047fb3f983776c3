//! Text labels, positioned in window pixels with the origin at the center
//! of the viewport and +Y up.

use glam::{Mat4, Vec2, Vec3};

use crate::body::BodyClass;
use crate::color::Color;
use crate::flags::LabelFlags;

pub const STAR_LABEL_COLOR: Color = Color::rgb(0.3, 0.3, 1.0);
pub const GALAXY_LABEL_COLOR: Color = Color::rgb(0.7, 0.7, 0.0);
pub const CONSTELLATION_LABEL_COLOR: Color = Color::new(0.5, 0.0, 1.0, 1.0);
pub const GRID_LABEL_COLOR: Color = Color::new(0.3, 0.7, 0.7, 0.85);

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
    pub color: Color,
    pub position: Vec2,
}

/// Window position of an eye-space point, or `None` when it is behind the
/// eye.
pub fn project_to_window(eye: Vec3, projection: &Mat4, viewport: (u32, u32)) -> Option<Vec2> {
    if eye.z >= 0.0 {
        return None;
    }
    let clip = *projection * eye.extend(1.0);
    if clip.w <= 0.0 {
        return None;
    }
    let ndc = Vec2::new(clip.x, clip.y) / clip.w;
    Some(ndc * Vec2::new(viewport.0 as f32, viewport.1 as f32) * 0.5)
}

/// Label mask bit and color for bodies of `class`; `None` for classes that
/// are never labelled.
pub fn body_label_style(class: BodyClass) -> Option<(LabelFlags, Color)> {
    match class {
        BodyClass::Planet => Some((LabelFlags::PLANET, Color::rgb(0.0, 1.0, 0.0))),
        BodyClass::Moon => Some((LabelFlags::MOON, Color::rgb(0.0, 0.65, 0.0))),
        BodyClass::Asteroid => Some((LabelFlags::ASTEROID, Color::rgb(0.7, 0.4, 0.0))),
        BodyClass::Comet => Some((LabelFlags::COMET, Color::rgb(0.0, 1.0, 1.0))),
        BodyClass::Spacecraft => Some((LabelFlags::SPACECRAFT, Color::rgb(0.6, 0.6, 0.6))),
        BodyClass::Invisible => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_centers_view_axis() {
        let projection = Mat4::perspective_rh(45f32.to_radians(), 4.0 / 3.0, 0.1, 100.0);
        let center = project_to_window(Vec3::new(0.0, 0.0, -10.0), &projection, (800, 600)).unwrap();
        assert!(center.length() < 1e-3);

        let right = project_to_window(Vec3::new(1.0, 0.0, -10.0), &projection, (800, 600)).unwrap();
        assert!(right.x > 0.0 && right.y.abs() < 1e-3);
        let up = project_to_window(Vec3::new(0.0, 1.0, -10.0), &projection, (800, 600)).unwrap();
        assert!(up.y > 0.0);
    }

    #[test]
    fn test_points_behind_eye_are_not_projected() {
        let projection = Mat4::perspective_rh(45f32.to_radians(), 1.0, 0.1, 100.0);
        assert!(project_to_window(Vec3::new(0.0, 0.0, 5.0), &projection, (100, 100)).is_none());
    }

    #[test]
    fn test_label_styles() {
        assert_eq!(body_label_style(BodyClass::Planet).unwrap().0, LabelFlags::PLANET);
        assert_eq!(body_label_style(BodyClass::Comet).unwrap().0, LabelFlags::COMET);
        assert!(body_label_style(BodyClass::Invisible).is_none());
    }
}
