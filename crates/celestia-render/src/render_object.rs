//! Drawing one body or star: the surface through the active shading
//! strategy, then night lights, rings, atmosphere, clouds and eclipse
//! shadows.
//!
//! Everything is drawn as a unit sphere scaled by the body's radius and
//! oblateness, so the tessellator never sees real dimensions.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use crate::backend::{
    BlendMode, CullMode, Frame, PrimitivePass, PrimitiveVertex, ShaderProgram, SurfacePass, TexGen,
    Topology,
};
use crate::body::{AppearanceFlags, Atmosphere, Body, MeshHandle, RingSystem, Surface};
use crate::color::Color;
use crate::context::RenderContext;
use crate::eclipse::{self, EclipseShadow};
use crate::flags::{RenderFlags, TextureResolution};
use crate::frustum::Frustum;
use crate::lod_sphere::SphereAttributes;
use crate::shading::ShadingStrategy;
use crate::texture::{Texture, TextureProvider};

/// Segments around a ring system.
pub const RING_SECTIONS: usize = 100;
/// Segments around an atmosphere fringe.
pub const ATMOSPHERE_SECTIONS: usize = 180;
/// Ringed bodies are tessellated no finer than LOD band 2, the largest
/// sphere width still in that band.
const RINGED_MAX_PIXEL_WIDTH: f32 = 7199.0;
/// Limb color where the terminator crosses the atmosphere.
const SUNSET_COLOR: Color = Color::rgb(1.0, 0.3, 0.0);

/// Textures resolved for one object. A missing texture draws untextured.
#[derive(Clone, Copy, Default)]
pub struct ObjectTextures<'a> {
    pub base: Option<&'a dyn Texture>,
    pub bump: Option<&'a dyn Texture>,
    pub night: Option<&'a dyn Texture>,
    pub gloss: Option<&'a dyn Texture>,
    pub clouds: Option<&'a dyn Texture>,
    pub rings: Option<&'a dyn Texture>,
}

impl<'a> ObjectTextures<'a> {
    /// The textures of `body` that the render flags and device allow.
    pub fn for_body(
        body: &Body,
        provider: &'a dyn TextureProvider,
        resolution: TextureResolution,
        flags: RenderFlags,
        bump_mapping: bool,
    ) -> Self {
        let surface = &body.surface;
        let appearance = surface.appearance_flags;
        let find = |texture: &crate::texture::MultiResTexture| texture.find(provider, resolution);

        let mut textures = Self {
            base: find(&surface.base_texture),
            ..Self::default()
        };
        if appearance.contains(AppearanceFlags::APPLY_BUMP_MAP) && bump_mapping {
            textures.bump = find(&surface.bump_texture);
        }
        if appearance.contains(AppearanceFlags::APPLY_NIGHT_MAP)
            && flags.contains(RenderFlags::SHOW_NIGHT_MAPS)
        {
            textures.night = find(&surface.night_texture);
        }
        if appearance.contains(AppearanceFlags::SEPARATE_SPECULAR_MAP) {
            textures.gloss = find(&surface.specular_texture);
        }
        if flags.contains(RenderFlags::SHOW_CLOUD_MAPS)
            && let Some(atmosphere) = &body.atmosphere
            && atmosphere.cloud_texture.is_set(resolution)
        {
            textures.clouds = find(&atmosphere.cloud_texture);
        }
        if let Some(rings) = &body.rings {
            textures.rings = find(&rings.texture);
        }
        textures
    }
}

/// What to draw for one object.
#[derive(Clone, Copy)]
pub struct RenderProperties<'a> {
    /// Equatorial radius (km).
    pub radius: f32,
    pub oblateness: f32,
    /// Object-to-world rotation.
    pub orientation: Quat,
    pub surface: &'a Surface,
    pub atmosphere: Option<&'a Atmosphere>,
    pub rings: Option<&'a RingSystem>,
    pub mesh: Option<MeshHandle>,
    pub eclipse_shadows: &'a [EclipseShadow],
    pub textures: ObjectTextures<'a>,
}

/// View state for one render list entry.
#[derive(Debug, Clone, Copy)]
pub struct ObjectView {
    /// World-to-eye rotation.
    pub camera: Quat,
    /// Vertical field of view (radians).
    pub fov: f32,
    pub aspect: f32,
    /// Angular size of a pixel (radians).
    pub pixel_size: f32,
    pub near: f32,
    pub far: f32,
    pub flags: RenderFlags,
    pub ambient: f32,
    /// Julian date.
    pub now: f64,
}

/// Lighting parameters shared by the passes of one object, in object
/// space.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInfo {
    pub color: Color,
    pub ambient: Color,
    pub sun_color: Color,
    /// Diffuse light after compensating for unnormalized normals.
    pub light_color: Color,
    pub sun_dir: Vec3,
    pub eye_dir: Vec3,
    /// Eye position in unit sphere coordinates.
    pub eye_pos: Vec3,
    pub half_angle: Vec3,
    pub specular_color: Color,
    pub specular_power: f32,
    /// Alpha is haze density.
    pub haze_color: Color,
    pub lit: bool,
    pub rescale_normals: bool,
    /// Apparent diameter in pixels.
    pub pixel_width: f32,
}

impl RenderInfo {
    fn new(
        ctx: &RenderContext,
        view: &ObjectView,
        position: Vec3,
        sun_direction: Vec3,
        sun_color: Color,
        props: &RenderProperties<'_>,
    ) -> Self {
        let surface = props.surface;
        let appearance = surface.appearance_flags;
        let radius = props.radius;
        let distance = position.length();
        let altitude = distance - radius;
        let pixel_width = radius / (view.near.max(altitude) * view.pixel_size);

        let to_object = props.orientation.inverse();
        let sun_dir = (to_object * sun_direction).normalize_or_zero();
        let eye_vec = to_object * -position;
        let eye_dir = eye_vec.normalize_or_zero();
        let eye_pos = eye_vec / Vec3::new(radius, radius * (1.0 - props.oblateness), radius);

        let color = if props.textures.base.is_none()
            || appearance.contains(AppearanceFlags::BLEND_TEXTURE)
        {
            surface.color
        } else {
            Color::WHITE
        };

        let rescale_normals = ctx.shading.rescale_normal();
        let light_color = if rescale_normals {
            sun_color
        } else {
            sun_color.scaled(radius)
        };

        let specular_color = if appearance.contains(AppearanceFlags::SPECULAR_REFLECTION) {
            surface.specular_color
        } else {
            Color::BLACK
        };
        let haze_density = if ctx.shading.quirks.buggy_vertex_program_emulation {
            0.0
        } else {
            surface.haze_color.a
        };

        Self {
            color,
            ambient: Color::rgb(view.ambient, view.ambient, view.ambient) * sun_color,
            sun_color,
            light_color,
            sun_dir,
            eye_dir,
            eye_pos,
            half_angle: (eye_dir + sun_dir).normalize_or_zero(),
            specular_color,
            specular_power: surface.specular_power,
            haze_color: surface.haze_color.with_alpha(haze_density),
            lit: !appearance.contains(AppearanceFlags::EMISSIVE),
            rescale_normals,
            pixel_width,
        }
    }

    /// A pass carrying this object's lighting.
    fn pass(&self, model_view: Mat4, program: ShaderProgram) -> SurfacePass {
        let mut pass = SurfacePass::new(model_view, program);
        pass.lit = self.lit;
        pass.sun_dir = self.sun_dir;
        pass.eye_pos = self.eye_pos;
        pass.half_angle = self.half_angle;
        pass.light_color = self.light_color;
        pass.ambient = self.ambient;
        pass.specular_color = self.specular_color * self.sun_color;
        pass.specular_power = self.specular_power;
        pass.haze_color = self.haze_color;
        pass.color = self.color;
        pass.rescale_normals = self.rescale_normals;
        pass
    }
}

/// Emits the passes of one object into the frame.
struct ObjectDraw<'a, 'f> {
    frame: &'f mut Frame,
    ctx: &'a RenderContext,
    frustum: Frustum,
    pixel_width: f32,
    mesh: Option<MeshHandle>,
}

impl ObjectDraw<'_, '_> {
    /// Draw the object's surface geometry, mesh or sphere, with `pass`.
    fn surface(&mut self, mut pass: SurfacePass, attributes: SphereAttributes, textures: &[&dyn Texture]) {
        match self.mesh {
            Some(mesh) => {
                for (slot, texture) in pass.textures.iter_mut().zip(textures) {
                    *slot = texture.tile(0, 0, 0).id;
                }
                let id = self.frame.add_surface_pass(pass);
                self.frame.draw_mesh(id, mesh);
            }
            None => {
                let frustum = self.frustum.clone();
                self.sphere(pass, attributes, &frustum, textures);
            }
        }
    }

    fn sphere(
        &mut self,
        pass: SurfacePass,
        attributes: SphereAttributes,
        frustum: &Frustum,
        textures: &[&dyn Texture],
    ) {
        let attributes = attributes.for_vertex_processing(self.ctx.shading.vertex_shaders());
        let id = self.frame.add_surface_pass(pass);
        self.ctx
            .sphere
            .render(self.frame, id, attributes, frustum, self.pixel_width, textures);
    }
}

/// Draw one object at `position` (km from the observer, world frame).
///
/// `sun_direction` points from the object toward its star in the world
/// frame. The projection and depth range are already set by the caller.
pub fn render_object(
    frame: &mut Frame,
    ctx: &RenderContext,
    view: &ObjectView,
    position: Vec3,
    sun_direction: Vec3,
    sun_color: Color,
    props: &RenderProperties<'_>,
) {
    let radius = props.radius;
    let distance = position.length();
    let ri = RenderInfo::new(ctx, view, position, sun_direction, sun_color, props);

    let model_view = Mat4::from_translation(view.camera * position)
        * Mat4::from_quat(view.camera * props.orientation)
        * Mat4::from_scale(Vec3::new(radius, radius * (1.0 - props.oblateness), radius));
    let frustum =
        Frustum::new(view.fov, view.aspect, view.near, view.far).transformed(&model_view);

    let mut pixel_width = ri.pixel_width;
    if props.rings.is_some() {
        pixel_width = pixel_width.min(RINGED_MAX_PIXEL_WIDTH);
    }

    let mut draw = ObjectDraw {
        frame,
        ctx,
        frustum,
        pixel_width,
        mesh: props.mesh,
    };

    render_surface(&mut draw, &ri, model_view, &props.textures);

    let ring_view = Mat4::from_translation(view.camera * position)
        * Mat4::from_quat(view.camera * props.orientation)
        * Mat4::from_scale(Vec3::splat(radius));
    let ring_shadows = ctx.shading.capabilities.simultaneous_textures > 1
        && view.flags.contains(RenderFlags::SHOW_RING_SHADOWS);

    if let Some(rings) = props.rings
        && distance <= rings.inner_radius
    {
        render_rings(draw.frame, ctx, &ri, rings, radius, ring_view, props.textures.rings, ring_shadows);
    }

    if let Some(atmosphere) = props.atmosphere {
        let fade = if distance - radius > 0.0 {
            let thickness = atmosphere.height / ((distance - radius) * view.pixel_size);
            (thickness - 2.0).clamp(0.0, 1.0)
        } else {
            1.0
        };
        if fade > 0.0 && view.flags.contains(RenderFlags::SHOW_ATMOSPHERES) {
            render_atmosphere(
                draw.frame,
                atmosphere,
                view.camera * position,
                radius,
                view.camera * sun_direction.normalize_or_zero(),
                ri.ambient,
                fade,
                ri.lit,
            );
        }

        if let Some(clouds) = props.textures.clouds {
            render_clouds(&mut draw, view, &ri, atmosphere, clouds, model_view, distance - radius, radius);
        }
    }

    if view.flags.contains(RenderFlags::SHOW_ECLIPSE_SHADOWS) {
        render_eclipse_shadows(&mut draw, &ri, props, model_view);
    }

    if let Some(rings) = props.rings
        && distance > rings.inner_radius
    {
        render_rings(draw.frame, ctx, &ri, rings, radius, ring_view, props.textures.rings, ring_shadows);
    }
}

fn render_surface(draw: &mut ObjectDraw<'_, '_>, ri: &RenderInfo, model_view: Mat4, textures: &ObjectTextures<'_>) {
    let base: Vec<&dyn Texture> = textures.base.into_iter().collect();

    if !ri.lit || draw.mesh.is_some() {
        draw.surface(ri.pass(model_view, ShaderProgram::FixedFunction), SphereAttributes::NORMALS, &base);
        return;
    }

    match draw.ctx.shading.strategy() {
        ShadingStrategy::FixedFunction => {
            draw.surface(ri.pass(model_view, ShaderProgram::FixedFunction), SphereAttributes::NORMALS, &base);
            render_night_lights(draw, ri, model_view, textures);
        }
        ShadingStrategy::FragmentCombiner => {
            let mut color = ri.color * ri.sun_color;
            color.a = ri.color.a;
            match (textures.base, textures.bump) {
                (Some(base), Some(bump)) => {
                    let mut pass = ri.pass(model_view, ShaderProgram::Unlit);
                    pass.color = color;
                    pass.lit = false;
                    draw.surface(pass, SphereAttributes::NORMALS, &[base]);

                    let mut pass = ri.pass(model_view, ShaderProgram::CombinerBump);
                    pass.blend = BlendMode::Multiply;
                    pass.depth_write = false;
                    draw.surface(pass, SphereAttributes::NORMALS | SphereAttributes::TANGENTS, &[bump]);
                }
                (Some(base), None) => {
                    let mut pass = ri.pass(model_view, ShaderProgram::CombinerSmooth);
                    pass.color = color;
                    draw.surface(pass, SphereAttributes::NORMALS, &[base]);
                    render_night_lights(draw, ri, model_view, textures);
                }
                (None, _) => {
                    draw.surface(ri.pass(model_view, ShaderProgram::FixedFunction), SphereAttributes::NORMALS, &[]);
                }
            }
        }
        ShadingStrategy::VertexAndFragment => {
            let hazy = ri.haze_color.a > 0.0;
            let specular = !ri.specular_color.is_black();
            match (textures.base, textures.bump) {
                (Some(base), Some(bump)) => {
                    let program = if hazy {
                        ShaderProgram::DiffuseBumpHaze
                    } else {
                        ShaderProgram::DiffuseBump
                    };
                    draw.surface(
                        ri.pass(model_view, program),
                        SphereAttributes::NORMALS | SphereAttributes::TANGENTS,
                        &[base, bump],
                    );
                    if specular {
                        let mut pass = ri.pass(model_view, ShaderProgram::Specular);
                        pass.blend = BlendMode::Additive;
                        pass.depth_write = false;
                        let gloss = textures.gloss.unwrap_or(base);
                        draw.surface(pass, SphereAttributes::NORMALS, &[gloss]);
                    }
                }
                _ if specular => {
                    let units: Vec<&dyn Texture> = match (textures.base, textures.gloss) {
                        (Some(base), Some(gloss)) => vec![base, gloss],
                        (Some(base), None) => vec![base, base],
                        (None, _) => Vec::new(),
                    };
                    draw.surface(ri.pass(model_view, ShaderProgram::Specular), SphereAttributes::NORMALS, &units);
                }
                _ => {
                    let program = if hazy {
                        ShaderProgram::DiffuseHaze
                    } else {
                        ShaderProgram::Diffuse
                    };
                    draw.surface(ri.pass(model_view, program), SphereAttributes::NORMALS, &base);
                }
            }
            render_night_lights(draw, ri, model_view, textures);
        }
    }
}

/// Night lights on the dark side, added over the lit surface.
fn render_night_lights(
    draw: &mut ObjectDraw<'_, '_>,
    ri: &RenderInfo,
    model_view: Mat4,
    textures: &ObjectTextures<'_>,
) {
    let Some(night) = textures.night else {
        return;
    };
    if !ri.lit || !draw.ctx.shading.night_pass() {
        return;
    }
    let mut pass = ri.pass(model_view, ShaderProgram::NightLights);
    pass.blend = BlendMode::Additive;
    pass.ambient = Color::BLACK;
    pass.color = Color::WHITE;
    pass.depth_write = false;
    draw.surface(pass, SphereAttributes::NORMALS, &[night]);
}

#[allow(clippy::too_many_arguments)]
fn render_clouds(
    draw: &mut ObjectDraw<'_, '_>,
    view: &ObjectView,
    ri: &RenderInfo,
    atmosphere: &Atmosphere,
    clouds: &dyn Texture,
    model_view: Mat4,
    altitude: f32,
    radius: f32,
) {
    let scale = 1.0 + atmosphere.cloud_height / radius;
    let cloud_view = model_view * Mat4::from_scale(Vec3::splat(scale));
    let frustum = Frustum::new(view.fov, view.aspect, view.near, view.far).transformed(&cloud_view);

    let program = if draw.ctx.shading.vertex_shaders() {
        ShaderProgram::DiffuseTexOffset
    } else {
        ShaderProgram::FixedFunction
    };
    let mut pass = ri.pass(cloud_view, program);
    pass.eye_pos = ri.eye_pos / scale;
    pass.blend = BlendMode::Alpha;
    pass.depth_write = false;
    pass.color = Color::WHITE;
    if altitude < atmosphere.cloud_height {
        // Below the clouds: show the inside of the shell.
        pass.cull = CullMode::Front;
    }
    if atmosphere.cloud_speed != 0.0 {
        let turns = (view.now * f64::from(atmosphere.cloud_speed) / std::f64::consts::TAU).rem_euclid(1.0);
        pass.tex_offset = Vec2::new(-(turns as f32), 0.0);
    }
    draw.sphere(pass, SphereAttributes::NORMALS, &frustum, &[clouds]);
}

fn render_eclipse_shadows(
    draw: &mut ObjectDraw<'_, '_>,
    ri: &RenderInfo,
    props: &RenderProperties<'_>,
    model_view: Mat4,
) {
    let to_object = props.orientation.inverse();
    let program = if draw.ctx.shading.vertex_shaders() && props.mesh.is_none() {
        ShaderProgram::ShadowTexture
    } else {
        ShaderProgram::FixedFunction
    };
    let add_ambient = draw.ctx.shading.capabilities.tex_env_combine;

    for shadow in props.eclipse_shadows {
        let band = eclipse::shadow_band(shadow.umbra_radius, shadow.penumbra_radius);
        let texture = draw.ctx.textures.eclipse[band];
        let mut pass = ri.pass(model_view, program);
        pass.blend = BlendMode::Multiply;
        pass.depth_write = false;
        pass.lit = false;
        pass.color = Color::WHITE;
        pass.ambient = if add_ambient { ri.ambient } else { Color::BLACK };
        pass.tex_gen = Some(eclipse::shadow_tex_gen(shadow, to_object, props.radius, texture));
        draw.surface(pass, SphereAttributes::NORMALS | SphereAttributes::MULTIPASS, &[]);
    }
}

/// Limb fringe drawn in eye space: a strip of quads from just below the
/// limb out to the top of the atmosphere.
#[allow(clippy::too_many_arguments)]
fn render_atmosphere(
    frame: &mut Frame,
    atmosphere: &Atmosphere,
    center: Vec3,
    radius: f32,
    sun_dir: Vec3,
    ambient: Color,
    fade: f32,
    lit: bool,
) {
    if atmosphere.height == 0.0 {
        return;
    }
    let center_dist = center.length();
    if center_dist <= radius {
        return;
    }

    let normal = center / center_dist;
    let tangent_length = (center_dist * center_dist - radius * radius).sqrt();
    let limb_radius = tangent_length * radius / center_dist;
    let limb_center = center - normal * (radius * radius / center_dist);

    let n = normal.abs();
    let u_axis = if n.x < n.y && n.x < n.z {
        Vec3::X.cross(normal)
    } else if n.y < n.z {
        Vec3::Y.cross(normal)
    } else {
        Vec3::Z.cross(normal)
    }
    .normalize();
    let v_axis = u_axis.cross(normal);
    let height = atmosphere.height / radius;

    let vertices = (0..=ATMOSPHERE_SECTIONS).flat_map(|i| {
        let theta = i as f32 / ATMOSPHERE_SECTIONS as f32 * TAU;
        let rim = u_axis * theta.cos() + v_axis * theta.sin();
        let base = limb_center + rim * limb_radius;
        let to_center = base - center;
        let cos_sun = to_center.dot(sun_dir) / radius;

        let mut bottom = atmosphere.lower_color;
        let mut top = atmosphere.upper_color;
        let mut brightness = 1.0;
        if lit && cos_sun < 0.2 {
            if cos_sun < -0.2 {
                brightness = 0.0;
            } else {
                let t = (0.2 + cos_sun) * 2.5;
                brightness = t;
                bottom = SUNSET_COLOR.lerp(bottom, t);
                top = SUNSET_COLOR.lerp(top, t);
            }
        }

        let alpha = 0.85 * fade * brightness + ambient.r;
        [
            PrimitiveVertex::new(base - to_center * height * 0.05, bottom.with_alpha(alpha), Vec2::ZERO),
            PrimitiveVertex::new(base + to_center * height, top.with_alpha(0.0), Vec2::ZERO),
        ]
    });

    let pass = PrimitivePass::new(Mat4::IDENTITY, BlendMode::Alpha).with_depth(true, false);
    frame.draw_primitives(pass, Topology::TriangleStrip, vertices);
}

/// Ring plane in units of the planet radius, split at the terminator so
/// the planet's shadow only darkens the far half.
#[allow(clippy::too_many_arguments)]
fn render_rings(
    frame: &mut Frame,
    ctx: &RenderContext,
    ri: &RenderInfo,
    rings: &RingSystem,
    radius: f32,
    model_view: Mat4,
    texture: Option<&dyn Texture>,
    shadows: bool,
) {
    let inner = rings.inner_radius / radius;
    let outer = rings.outer_radius / radius;

    // Brightness of a ring particle at the planet's center, lit from the
    // sun and seen from the eye.
    let illumination = (1.0 + ri.eye_dir.dot(ri.sun_dir)) / 2.0;
    let lit = if ctx.shading.vertex_shaders() {
        rings.color * ri.sun_color
    } else {
        rings.color
    };
    let color = (lit.scaled(illumination) + ri.ambient * ri.color).with_alpha(1.0);

    let texture_id = texture.and_then(|t| t.tile(0, 0, 0).id);
    let pass = PrimitivePass::new(model_view, BlendMode::Alpha)
        .with_texture(texture_id)
        .with_depth(true, true);

    let sun_angle = ri.sun_dir.z.atan2(ri.sun_dir.x);
    let half = RING_SECTIONS / 2;

    let mut shadowed = pass.clone();
    if shadows {
        let (s_axis, t_axis) = eclipse::projection_axes(ri.sun_dir, 0.5);
        shadowed.tex_gen = Some(TexGen {
            s: Vec4::new(s_axis.x, s_axis.y, s_axis.z, 0.5),
            t: Vec4::new(t_axis.x, t_axis.y, t_axis.z, 0.5),
            texture: ctx.textures.shadow,
        });
    }
    frame.draw_primitives(
        shadowed,
        Topology::TriangleStrip,
        ring_strip(inner, outer, sun_angle + FRAC_PI_2, sun_angle + 3.0 * FRAC_PI_2, half, color),
    );
    frame.draw_primitives(
        pass,
        Topology::TriangleStrip,
        ring_strip(inner, outer, sun_angle - FRAC_PI_2, sun_angle + FRAC_PI_2, half, color),
    );
}

fn ring_strip(
    inner: f32,
    outer: f32,
    begin: f32,
    end: f32,
    sections: usize,
    color: Color,
) -> impl Iterator<Item = PrimitiveVertex> {
    (0..=sections).flat_map(move |i| {
        let theta = begin + (end - begin) * (i as f32 / sections as f32);
        let (s, c) = theta.sin_cos();
        [
            PrimitiveVertex::new(Vec3::new(c * inner, 0.0, s * inner), color, Vec2::new(0.0, 0.0)),
            PrimitiveVertex::new(Vec3::new(c * outer, 0.0, s * outer), color, Vec2::new(1.0, 0.0)),
        ]
    })
}

/// Rotation of a star about its pole at `now` for a rotation `period`
/// in days.
pub fn star_rotation(now: f64, period: f64) -> Quat {
    if period == 0.0 {
        return Quat::IDENTITY;
    }
    let turns = (now / period).rem_euclid(1.0) as f32;
    Quat::from_rotation_y(-turns * 2.0 * PI)
}
