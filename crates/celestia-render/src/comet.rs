//! Comet dust tails: a widening tube pointing away from the sun.

use glam::{DVec3, Mat4, Quat, Vec2, Vec3};

use crate::backend::{BlendMode, CullMode, Frame, PrimitivePass, PrimitiveVertex, Topology};
use crate::body::Body;
use crate::color::Color;

pub const TAIL_POINTS: usize = 20;
pub const TAIL_SLICES: usize = 16;

const TAIL_LINE_COLOR: Color = Color::new(0.0, 1.0, 1.0, 0.5);

struct TailVertex {
    point: Vec3,
    normal: Vec3,
    brightness: f32,
}

/// Rough visible length of the dust tail (km) for a comet `sun_distance`
/// km from its star.
pub fn dust_tail_length(radius: f32, sun_distance: f64) -> f32 {
    (1.0e8 / sun_distance as f32) * (radius / 5.0) * 1.0e7
}

/// Draw the tail of `body`, located `heliocentric` km from its star and
/// `position` km from the observer in the universal frame. `camera`
/// rotates the universal frame into eye space.
pub fn render_comet_tail(
    frame: &mut Frame,
    body: &Body,
    heliocentric: DVec3,
    position: Vec3,
    camera: Quat,
    now: f64,
) {
    let sun_distance = heliocentric.length();
    if sun_distance <= 0.0 {
        return;
    }
    let length = dust_tail_length(body.radius, sun_distance);
    let tail_radius = length * 0.1;
    let away = heliocentric.normalize().as_vec3();

    let points: Vec<Vec3> = (0..TAIL_POINTS)
        .map(|i| {
            let t = i as f32 / TAIL_POINTS as f32;
            away * (length * t * t)
        })
        .collect();

    // Tube axes: v along the tail, u and w across it.
    let q = body.equator_orientation(now).as_quat();
    let v = away;
    let u0 = q * Vec3::Y;
    let u1 = q * Vec3::X;
    let u = if u0.dot(v).abs() < u1.dot(v).abs() {
        v.cross(u0)
    } else {
        v.cross(u1)
    }
    .normalize_or(Vec3::X);
    let w = u.cross(v);

    let mut vertices = Vec::with_capacity(TAIL_POINTS * TAIL_SLICES);
    for (i, &point) in points.iter().enumerate() {
        let brightness = 1.0 - i as f32 / (TAIL_POINTS - 1) as f32;
        let section_length = if i == 0 {
            points[1].distance(points[0])
        } else {
            point.distance(points[i - 1])
        };
        let radius = i as f32 / TAIL_POINTS as f32 * tail_radius;
        let dr = (tail_radius / TAIL_POINTS as f32) / section_length;
        // The first sections flare wider than 45 degrees; keep the
        // normals real there.
        let w0 = dr.atan().min(1.0);
        let w1 = (1.0 - w0 * w0).max(0.0).sqrt();

        for j in 0..TAIL_SLICES {
            let theta = std::f32::consts::TAU * j as f32 / TAIL_SLICES as f32;
            let (s, c) = theta.sin_cos();
            vertices.push(TailVertex {
                point: point + u * (s * radius) + w * (c * radius),
                normal: u * (s * w1) + w * (c * w1) + v * w0,
                brightness,
            });
        }
    }

    let view_dir = position.normalize_or_zero();
    let shade = |vertex: &TailVertex| {
        let alpha = (view_dir.dot(vertex.normal) * vertex.brightness).abs();
        PrimitiveVertex::new(vertex.point, Color::new(0.0, 0.5, 1.0, alpha), Vec2::ZERO)
    };

    let model_view = Mat4::from_translation(camera * position) * Mat4::from_quat(camera);
    let mut pass = PrimitivePass::new(model_view, BlendMode::AlphaAdditive).with_depth(true, false);
    pass.cull = CullMode::None;

    for section in 0..TAIL_POINTS - 1 {
        let ring = section * TAIL_SLICES;
        let strip = (0..=TAIL_SLICES).flat_map(|j| {
            let j = j % TAIL_SLICES;
            [
                shade(&vertices[ring + j]),
                shade(&vertices[ring + j + TAIL_SLICES]),
            ]
        });
        frame.draw_primitives(pass.clone(), Topology::TriangleStrip, strip);
    }

    frame.draw_primitives(
        pass,
        Topology::LineStrip,
        points
            .iter()
            .map(|&p| PrimitiveVertex::new(p, TAIL_LINE_COLOR, Vec2::ZERO)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::{J2000, KM_PER_AU};
    use crate::backend::Command;
    use crate::body::{BodyClass, BodyId, FixedOrbit};

    fn comet() -> Body {
        Body::new(
            BodyId(5),
            "Halley",
            BodyClass::Comet,
            5.0,
            Box::new(FixedOrbit {
                position: DVec3::new(KM_PER_AU, 0.0, 0.0),
            }),
        )
    }

    fn draws(frame: &Frame) -> Vec<(Topology, std::ops::Range<u32>)> {
        frame
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawPrimitives {
                    topology, vertices, ..
                } => Some((*topology, vertices.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_tail_length_shrinks_with_sun_distance() {
        let near = dust_tail_length(5.0, 0.5 * KM_PER_AU);
        let far = dust_tail_length(5.0, KM_PER_AU);
        assert!((near / far - 2.0).abs() < 1e-3);
        assert!((far - 1.0e15 / KM_PER_AU as f32).abs() / far < 1e-4);
    }

    #[test]
    fn test_tail_is_strips_plus_centerline() {
        let mut frame = Frame::default();
        let position = Vec3::new(0.0, 0.0, -5.0e7);
        render_comet_tail(&mut frame, &comet(), DVec3::new(KM_PER_AU, 0.0, 0.0), position, Quat::IDENTITY, J2000);

        let draws = draws(&frame);
        assert_eq!(draws.len(), TAIL_POINTS);
        for (topology, range) in &draws[..TAIL_POINTS - 1] {
            assert_eq!(*topology, Topology::TriangleStrip);
            assert_eq!(range.len(), 2 * (TAIL_SLICES + 1));
        }
        let (topology, range) = &draws[TAIL_POINTS - 1];
        assert_eq!(*topology, Topology::LineStrip);
        assert_eq!(range.len(), TAIL_POINTS);

        for vertex in frame.primitive_vertices() {
            assert!(vertex.color[3].is_finite());
            assert!((0.0..=1.0).contains(&vertex.color[3]));
        }
    }

    #[test]
    fn test_tail_points_away_from_sun_and_fades() {
        let mut frame = Frame::default();
        render_comet_tail(
            &mut frame,
            &comet(),
            DVec3::new(KM_PER_AU, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -5.0e7),
            Quat::IDENTITY,
            J2000,
        );
        let vertices = frame.primitive_vertices();
        let tip = vertices[vertices.len() - 1].position;
        assert!(tip[0] > 0.0);
        assert!(tip[1].abs() < 1e-3 && tip[2].abs() < 1e-3);

        // The far ring of the last strip has zero brightness.
        let strip_end = (TAIL_POINTS - 1) * 2 * (TAIL_SLICES + 1);
        assert_eq!(vertices[strip_end - 1].color[3], 0.0);
    }

    #[test]
    fn test_pass_is_additive_without_depth_writes() {
        let mut frame = Frame::default();
        render_comet_tail(&mut frame, &comet(), DVec3::new(KM_PER_AU, 0.0, 0.0), Vec3::Z, Quat::IDENTITY, J2000);
        match &frame.commands()[0] {
            Command::DrawPrimitives { pass, .. } => {
                assert_eq!(pass.blend, BlendMode::AlphaAdditive);
                assert!(!pass.depth_write);
                assert_eq!(pass.cull, CullMode::None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
