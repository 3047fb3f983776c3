//! Eclipse shadows cast between bodies of one planetary system.
//!
//! Bodies are treated as spheres and the sun as far away compared to the
//! caster-receiver distance, so a shadow volume is a cylinder capped at the
//! caster.

use glam::{DVec3, Quat, Vec3, Vec4};

use crate::backend::TexGen;
use crate::body::Body;
use crate::texture::{ECLIPSE_SHADOW_BANDS, TextureId};

/// One shadow falling on a receiver this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EclipseShadow {
    /// Caster center relative to the receiver center (km).
    pub origin: Vec3,
    /// Unit direction from the sun through the caster.
    pub direction: Vec3,
    /// Radius of the penumbra at the receiver (km).
    pub penumbra_radius: f32,
    pub umbra_radius: f32,
}

/// Distance from `point` to the ray starting at `origin` along `direction`.
fn distance_to_ray(point: DVec3, origin: DVec3, direction: DVec3) -> f64 {
    let t = (point - origin).dot(direction) / direction.length_squared();
    if t <= 0.0 {
        point.distance(origin)
    } else {
        point.distance(origin + direction * t)
    }
}

/// Shadow cast by `caster` onto `receiver`, given both heliocentric
/// positions (km) and the radius of the sun (km).
///
/// Casters much smaller than the receiver and mesh casters are ignored.
pub fn test_eclipse(
    receiver: &Body,
    receiver_pos: DVec3,
    caster: &Body,
    caster_pos: DVec3,
    sun_radius: f64,
) -> Option<EclipseShadow> {
    let receiver_radius = f64::from(receiver.radius);
    let caster_radius = f64::from(caster.radius);
    if caster_radius * 100.0 < receiver_radius || caster.mesh.is_some() {
        return None;
    }

    let app_sun_radius = sun_radius / receiver_pos.length();
    let dir = caster_pos - receiver_pos;
    let dist_to_caster = dir.length() - receiver_radius;
    let app_occluder_radius = caster_radius / dist_to_caster;

    let shadow_radius = (1.0 + app_sun_radius / app_occluder_radius) * caster_radius;
    let reach = receiver_radius + shadow_radius;
    if distance_to_ray(receiver_pos, caster_pos, caster_pos) >= reach {
        return None;
    }

    Some(EclipseShadow {
        origin: dir.as_vec3(),
        direction: caster_pos.normalize().as_vec3(),
        penumbra_radius: shadow_radius as f32,
        umbra_radius: (caster_radius * (app_occluder_radius - app_sun_radius) / app_occluder_radius)
            as f32,
    })
}

/// Pick the shadow texture for an umbra:penumbra ratio. The last band is
/// the hard-edged disc.
pub fn shadow_band(umbra_radius: f32, penumbra_radius: f32) -> usize {
    let ratio = umbra_radius / penumbra_radius;
    if ratio < 0.1 {
        0
    } else if ratio < 0.35 {
        1
    } else if ratio < 0.6 {
        2
    } else if ratio < 0.9 {
        3
    } else {
        ECLIPSE_SHADOW_BANDS - 1
    }
}

/// Texture planes projecting a shadow disc onto a unit sphere.
///
/// `world_to_object` rotates world directions into the receiver's frame and
/// `radius` is the receiver's radius (km). The shadow center maps to
/// `(0.5, 0.5)` and the penumbra edge to the texture border.
pub fn shadow_tex_gen(
    shadow: &EclipseShadow,
    world_to_object: Quat,
    radius: f32,
    texture: Option<TextureId>,
) -> TexGen {
    let origin = world_to_object * shadow.origin;
    let dir = world_to_object * shadow.direction;
    let scale = radius / shadow.penumbra_radius;
    let (s_axis, t_axis) = projection_axes(dir, 0.5 * scale);

    TexGen {
        s: s_axis.extend(-origin.dot(s_axis) / radius + 0.5),
        t: t_axis.extend(-origin.dot(t_axis) / radius + 0.5),
        texture,
    }
}

/// Two axes of length `length` spanning the plane perpendicular to `dir`.
pub(crate) fn projection_axes(dir: Vec3, length: f32) -> (Vec3, Vec3) {
    let rotation = Quat::from_rotation_arc(Vec3::Y, dir.normalize_or(Vec3::Y));
    (rotation * Vec3::new(length, 0.0, 0.0), rotation * Vec3::new(0.0, 0.0, length))
}

/// Evaluate texgen coordinates at an object-space point.
pub fn tex_gen_coords(tex_gen: &TexGen, point: Vec3) -> (f32, f32) {
    let p = Vec4::new(point.x, point.y, point.z, 1.0);
    (tex_gen.s.dot(p), tex_gen.t.dot(p))
}
