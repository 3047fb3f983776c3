//! Render pipelines for replaying frame commands, and the shader behind them.
//!
//! One WGSL module implements every [`ShaderProgram`]; the program index
//! travels in the per-draw uniforms. Pipelines differ only in fixed state
//! (topology, blending, culling, depth) and are built lazily per
//! [`PipelineKey`].

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use rustc_hash::FxHashMap;
use std::num::NonZeroU64;

use crate::backend::{BlendMode, CullMode, PrimitivePass, ShaderProgram, SurfacePass, TexGen, Topology};
use crate::buffer::{SurfaceVertex, primitive_vertex_layout};
use crate::depth::DepthBuffer;

/// Per-draw uniforms, bound at a dynamic offset.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub projection: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
    /// `w` is 1 for lit draws.
    pub sun_dir: [f32; 4],
    pub eye_pos: [f32; 4],
    /// `w` is the specular power.
    pub half_angle: [f32; 4],
    pub light_color: [f32; 4],
    pub ambient: [f32; 4],
    pub specular_color: [f32; 4],
    pub haze_color: [f32; 4],
    pub color: [f32; 4],
    pub tex_gen_s: [f32; 4],
    pub tex_gen_t: [f32; 4],
    /// Program index, texgen enabled, specular only.
    pub params: [u32; 4],
    pub tex_offset: [f32; 4],
}

impl DrawUniforms {
    pub fn surface(projection: Mat4, pass: &SurfacePass) -> Self {
        let (tex_gen_s, tex_gen_t, has_tex_gen) = tex_gen_planes(pass.tex_gen.as_ref());
        let specular_only =
            pass.program == ShaderProgram::Specular && pass.blend == BlendMode::Additive;
        Self {
            projection: projection.to_cols_array_2d(),
            model_view: pass.model_view.to_cols_array_2d(),
            sun_dir: pass.sun_dir.extend(if pass.lit { 1.0 } else { 0.0 }).to_array(),
            eye_pos: pass.eye_pos.extend(1.0).to_array(),
            half_angle: pass.half_angle.extend(pass.specular_power).to_array(),
            light_color: pass.light_color.to_array(),
            ambient: pass.ambient.to_array(),
            specular_color: pass.specular_color.to_array(),
            haze_color: pass.haze_color.to_array(),
            color: pass.color.to_array(),
            tex_gen_s,
            tex_gen_t,
            params: [program_index(pass.program), has_tex_gen, u32::from(specular_only), 0],
            tex_offset: [pass.tex_offset.x, pass.tex_offset.y, 0.0, 0.0],
        }
    }

    pub fn primitive(projection: Mat4, pass: &PrimitivePass) -> Self {
        let (tex_gen_s, tex_gen_t, has_tex_gen) = tex_gen_planes(pass.tex_gen.as_ref());
        Self {
            projection: projection.to_cols_array_2d(),
            model_view: pass.model_view.to_cols_array_2d(),
            tex_gen_s,
            tex_gen_t,
            params: [0, has_tex_gen, 0, 0],
            ..Self::zeroed()
        }
    }
}

fn tex_gen_planes(tex_gen: Option<&TexGen>) -> ([f32; 4], [f32; 4], u32) {
    match tex_gen {
        Some(tex_gen) => (tex_gen.s.to_array(), tex_gen.t.to_array(), 1),
        None => (Vec4::ZERO.to_array(), Vec4::ZERO.to_array(), 0),
    }
}

/// Distance between consecutive draws in the uniform buffer.
pub fn uniform_stride(min_alignment: u32) -> u64 {
    let alignment = u64::from(min_alignment.max(1));
    (std::mem::size_of::<DrawUniforms>() as u64).div_ceil(alignment) * alignment
}

/// Index of `program` in the shader's program switch.
pub fn program_index(program: ShaderProgram) -> u32 {
    match program {
        ShaderProgram::FixedFunction => 0,
        ShaderProgram::NightLights => 1,
        ShaderProgram::CombinerBump => 2,
        ShaderProgram::CombinerSmooth => 3,
        ShaderProgram::Diffuse => 4,
        ShaderProgram::DiffuseHaze => 5,
        ShaderProgram::DiffuseBump => 6,
        ShaderProgram::DiffuseBumpHaze => 7,
        ShaderProgram::Specular => 8,
        ShaderProgram::ShadowTexture => 9,
        ShaderProgram::DiffuseTexOffset => 10,
        ShaderProgram::RingIllum => 11,
        ShaderProgram::Unlit => 12,
    }
}

pub fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    let component = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    use wgpu::BlendFactor as F;
    match blend {
        BlendMode::Opaque => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: component(F::One, F::One),
            alpha: component(F::One, F::One),
        }),
        BlendMode::AlphaAdditive => Some(wgpu::BlendState {
            color: component(F::SrcAlpha, F::One),
            alpha: component(F::Zero, F::One),
        }),
        BlendMode::Multiply => Some(wgpu::BlendState {
            color: component(F::Dst, F::Zero),
            alpha: component(F::Zero, F::One),
        }),
    }
}

pub fn cull_face(cull: CullMode) -> Option<wgpu::Face> {
    match cull {
        CullMode::Back => Some(wgpu::Face::Back),
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::None => None,
    }
}

pub fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
        Topology::PointList => wgpu::PrimitiveTopology::PointList,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Indexed sphere patches (`u16` strips) and meshes (`u32` lists).
    Surface,
    /// Non-indexed lines, points, and billboards.
    Primitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub kind: PipelineKind,
    pub topology: Topology,
    pub blend: BlendMode,
    pub cull: CullMode,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl PipelineKey {
    pub fn sphere(pass: &SurfacePass) -> Self {
        Self::surface(pass, Topology::TriangleStrip)
    }

    pub fn mesh(pass: &SurfacePass) -> Self {
        Self::surface(pass, Topology::TriangleList)
    }

    fn surface(pass: &SurfacePass, topology: Topology) -> Self {
        Self {
            kind: PipelineKind::Surface,
            topology,
            blend: pass.blend,
            cull: pass.cull,
            depth_test: pass.depth_test,
            depth_write: pass.depth_write,
        }
    }

    pub fn primitive(pass: &PrimitivePass, topology: Topology) -> Self {
        Self {
            kind: PipelineKind::Primitive,
            topology,
            blend: pass.blend,
            cull: pass.cull,
            depth_test: pass.depth_test,
            depth_write: pass.depth_write,
        }
    }

    fn strip_index_format(&self) -> Option<wgpu::IndexFormat> {
        match (self.kind, self.topology) {
            (PipelineKind::Surface, Topology::TriangleStrip) => Some(wgpu::IndexFormat::Uint16),
            _ => None,
        }
    }
}

pub fn uniform_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("draw-uniform-layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(std::mem::size_of::<DrawUniforms>() as u64),
            },
            count: None,
        }],
    })
}

/// Lazily built pipelines sharing one shader and layout.
pub struct PipelineCache {
    shader: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    surface_format: wgpu::TextureFormat,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        uniform_layout: &wgpu::BindGroupLayout,
        texture_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("celestia-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("celestia-pipeline-layout"),
            bind_group_layouts: &[uniform_layout, texture_layout],
            immediate_size: 0,
        });
        Self {
            shader,
            layout,
            surface_format,
            pipelines: FxHashMap::default(),
        }
    }

    pub fn get(&mut self, device: &wgpu::Device, key: PipelineKey) -> &wgpu::RenderPipeline {
        if !self.pipelines.contains_key(&key) {
            log::debug!("Building pipeline {key:?}");
            let pipeline = self.build(device, key);
            self.pipelines.insert(key, pipeline);
        }
        &self.pipelines[&key]
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    fn build(&self, device: &wgpu::Device, key: PipelineKey) -> wgpu::RenderPipeline {
        let (vs_entry, fs_entry, buffers) = match key.kind {
            PipelineKind::Surface => ("vs_surface", "fs_surface", [SurfaceVertex::layout()]),
            PipelineKind::Primitive => ("vs_primitive", "fs_primitive", [primitive_vertex_layout()]),
        };
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("celestia-pipeline"),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some(vs_entry),
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: primitive_topology(key.topology),
                strip_index_format: key.strip_index_format(),
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: cull_face(key.cull),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(DepthBuffer::stencil_state(key.depth_test, key.depth_write)),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some(fs_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.surface_format,
                    blend: blend_state(key.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        })
    }
}

/// The WGSL source for every surface program and for primitives.
pub const SHADER_SOURCE: &str = r#"
struct Draw {
    projection: mat4x4<f32>,
    model_view: mat4x4<f32>,
    sun_dir: vec4<f32>,
    eye_pos: vec4<f32>,
    half_angle: vec4<f32>,
    light_color: vec4<f32>,
    ambient: vec4<f32>,
    specular_color: vec4<f32>,
    haze_color: vec4<f32>,
    color: vec4<f32>,
    tex_gen_s: vec4<f32>,
    tex_gen_t: vec4<f32>,
    params: vec4<u32>,
    tex_offset: vec4<f32>,
};

@group(0) @binding(0) var<uniform> draw: Draw;

@group(1) @binding(0) var tex0: texture_2d<f32>;
@group(1) @binding(1) var tex1: texture_2d<f32>;
@group(1) @binding(2) var tex2: texture_2d<f32>;
@group(1) @binding(3) var shadow_tex: texture_2d<f32>;
@group(1) @binding(4) var surface_sampler: sampler;
@group(1) @binding(5) var shadow_sampler: sampler;

const NIGHT_LIGHTS: u32 = 1u;
const COMBINER_BUMP: u32 = 2u;
const DIFFUSE_HAZE: u32 = 5u;
const DIFFUSE_BUMP: u32 = 6u;
const DIFFUSE_BUMP_HAZE: u32 = 7u;
const SPECULAR: u32 = 8u;
const SHADOW_TEXTURE: u32 = 9u;
const UNLIT: u32 = 12u;

struct SurfaceIn {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tangent: vec3<f32>,
    @location(3) uv0: vec2<f32>,
    @location(4) uv1: vec2<f32>,
    @location(5) uv2: vec2<f32>,
    @location(6) uv3: vec2<f32>,
};

struct SurfaceOut {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tangent: vec3<f32>,
    @location(3) uv0: vec2<f32>,
    @location(4) uv1: vec2<f32>,
    @location(5) shadow_uv: vec2<f32>,
};

fn tex_gen(position: vec3<f32>) -> vec2<f32> {
    let p = vec4<f32>(position, 1.0);
    return vec2<f32>(dot(draw.tex_gen_s, p), dot(draw.tex_gen_t, p));
}

@vertex
fn vs_surface(in: SurfaceIn) -> SurfaceOut {
    var out: SurfaceOut;
    out.clip_position = draw.projection * draw.model_view * vec4<f32>(in.position, 1.0);
    out.position = in.position;
    out.normal = in.normal;
    out.tangent = in.tangent;
    out.uv0 = in.uv0 + draw.tex_offset.xy;
    out.uv1 = in.uv1;
    out.shadow_uv = tex_gen(in.position);
    return out;
}

fn is_lit() -> bool {
    return draw.sun_dir.w > 0.5;
}

fn diffuse(n_dot_l: f32) -> vec3<f32> {
    if (!is_lit()) {
        return vec3<f32>(1.0);
    }
    return draw.ambient.rgb + draw.light_color.rgb * max(n_dot_l, 0.0);
}

// Light direction in the surface's tangent frame.
fn tangent_light(n: vec3<f32>, tangent: vec3<f32>) -> vec3<f32> {
    var t = tangent - n * dot(n, tangent);
    if (dot(t, t) < 1e-8) {
        t = cross(n, vec3<f32>(0.0, 1.0, 0.0));
        if (dot(t, t) < 1e-8) {
            t = vec3<f32>(1.0, 0.0, 0.0);
        }
    }
    t = normalize(t);
    let b = cross(n, t);
    let s = draw.sun_dir.xyz;
    return vec3<f32>(dot(s, t), dot(s, b), dot(s, n));
}

fn bump_normal(texel: vec4<f32>) -> vec3<f32> {
    return normalize(texel.rgb * 2.0 - 1.0);
}

fn with_haze(c: vec4<f32>, n: vec3<f32>, position: vec3<f32>) -> vec4<f32> {
    let v = normalize(draw.eye_pos.xyz - position);
    let edge = 1.0 - max(dot(n, v), 0.0);
    var light = 1.0;
    if (is_lit()) {
        light = max(dot(n, draw.sun_dir.xyz), 0.0);
    }
    let h = clamp(draw.haze_color.a * edge * light, 0.0, 1.0);
    return vec4<f32>(mix(c.rgb, draw.haze_color.rgb, h), c.a);
}

fn specular(n: vec3<f32>, gloss: f32) -> vec3<f32> {
    let h = normalize(draw.half_angle.xyz);
    let n_dot_l = dot(n, draw.sun_dir.xyz);
    let highlight = pow(max(dot(n, h), 0.0), max(draw.half_angle.w, 1.0));
    return draw.specular_color.rgb * highlight * gloss * select(0.0, 1.0, n_dot_l > 0.0);
}

@fragment
fn fs_surface(in: SurfaceOut) -> @location(0) vec4<f32> {
    // Sample up front; texture lookups need uniform control flow.
    let base = textureSample(tex0, surface_sampler, in.uv0);
    let detail = textureSample(tex1, surface_sampler, in.uv1);
    let shadow = textureSample(shadow_tex, shadow_sampler, in.shadow_uv);

    let program = draw.params.x;
    let n = normalize(in.normal);
    let n_dot_l = dot(n, draw.sun_dir.xyz);
    var out = draw.color * base;

    switch program {
        case NIGHT_LIGHTS: {
            let mask = clamp(-4.0 * n_dot_l, 0.0, 1.0);
            out = vec4<f32>(out.rgb * mask, out.a);
        }
        case COMBINER_BUMP: {
            let d = dot(bump_normal(base), normalize(tangent_light(n, in.tangent)));
            out = vec4<f32>(diffuse(d), 1.0);
        }
        case DIFFUSE_BUMP, DIFFUSE_BUMP_HAZE: {
            let d = dot(bump_normal(detail), normalize(tangent_light(n, in.tangent)));
            out = vec4<f32>(out.rgb * diffuse(min(d, n_dot_l * 4.0)), out.a);
            if (program == DIFFUSE_BUMP_HAZE) {
                out = with_haze(out, n, in.position);
            }
        }
        case SPECULAR: {
            if (draw.params.z != 0u) {
                out = vec4<f32>(specular(n, base.a), 0.0);
            } else {
                out = vec4<f32>(out.rgb * diffuse(n_dot_l) + specular(n, detail.a), out.a);
            }
        }
        case SHADOW_TEXTURE: {
            return vec4<f32>(mix(draw.ambient.rgb, vec3<f32>(1.0), shadow.rgb), 1.0);
        }
        case UNLIT: {
        }
        default: {
            out = vec4<f32>(out.rgb * diffuse(n_dot_l), out.a);
            if (program == DIFFUSE_HAZE) {
                out = with_haze(out, n, in.position);
            }
        }
    }

    if (draw.params.y != 0u) {
        out = vec4<f32>(out.rgb * shadow.rgb, out.a);
    }
    return out;
}

struct PrimitiveIn {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
    @location(2) uv: vec2<f32>,
};

struct PrimitiveOut {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) shadow_uv: vec2<f32>,
};

@vertex
fn vs_primitive(in: PrimitiveIn) -> PrimitiveOut {
    var out: PrimitiveOut;
    out.clip_position = draw.projection * draw.model_view * vec4<f32>(in.position, 1.0);
    out.color = in.color;
    out.uv = in.uv;
    out.shadow_uv = tex_gen(in.position);
    return out;
}

@fragment
fn fs_primitive(in: PrimitiveOut) -> @location(0) vec4<f32> {
    let texel = textureSample(tex0, surface_sampler, in.uv);
    let shadow = textureSample(shadow_tex, shadow_sampler, in.shadow_uv);
    var out = in.color * texel;
    if (draw.params.y != 0u) {
        out = vec4<f32>(out.rgb * shadow.rgb, out.a);
    }
    return out;
}
"#;
