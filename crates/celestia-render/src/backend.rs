//! The seam between scene logic and the GPU.
//!
//! The renderer records one [`Frame`] per call: a list of draw commands
//! plus the vertex data they reference. A [`RenderBackend`] replays it.
//! Keeping the whole frame as plain data lets the pipeline run headless
//! under test with [`RecordingBackend`].

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::body::MeshHandle;
use crate::color::Color;
use crate::labels::Label;
use crate::texture::{TextureId, TextureImage};

/// Texture units a sphere patch can carry coordinates for.
pub const MAX_SPHERE_TEXTURES: usize = 4;

/// Default sphere arena size in floats (16 MiB).
pub const DEFAULT_SPHERE_BUDGET: usize = 4 << 20;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("texture '{label}' holds {actual} bytes, expected {expected}")]
    TextureSize {
        label: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("texture '{0}' has zero dimensions")]
    ZeroDimensions(&'static str),
    #[error("mesh has no triangles")]
    EmptyMesh,
    #[error("render backend unavailable: {0}")]
    Unavailable(String),
}

/// What the device reports about itself at startup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceCapabilities {
    /// Adapter name; drives the quirks table.
    pub renderer: String,
    /// Feature names the adapter exposes.
    pub extensions: Vec<String>,
    pub max_texture_units: u32,
    pub max_texture_size: u32,
}

impl DeviceCapabilities {
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }
}

/// Triangle mesh uploaded once and drawn in place of a sphere.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

pub trait RenderBackend {
    fn capabilities(&self) -> DeviceCapabilities;
    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureId, BackendError>;
    fn create_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle, BackendError>;
    fn submit(&mut self, frame: &Frame);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    /// Standard alpha blending.
    Alpha,
    /// `src + dst`.
    Additive,
    /// `src * alpha + dst`.
    AlphaAdditive,
    /// `src * dst`; used to darken with shadow textures.
    Multiply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    Back,
    /// Show the inside of a sphere.
    Front,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    TriangleStrip,
    TriangleList,
    LineStrip,
    LineList,
    PointList,
}

/// Surface shading program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    /// Per-vertex lighting with one texture, normals transformed to eye space.
    FixedFunction,
    /// Night lights masked by the unlit side.
    NightLights,
    /// Tangent-space bump mapping with a normalization cube lookup.
    CombinerBump,
    /// Per-pixel diffuse without a bump map.
    CombinerSmooth,
    Diffuse,
    DiffuseHaze,
    DiffuseBump,
    DiffuseBumpHaze,
    /// Blinn specular with optional gloss map.
    Specular,
    /// Projected eclipse shadow, multiplied into the framebuffer.
    ShadowTexture,
    /// Diffuse with a scrolled texture, for clouds.
    DiffuseTexOffset,
    /// Ring plane lit from both sides.
    RingIllum,
    Unlit,
}

/// Object-linear texture coordinate generation: `s = dot(S, p)`,
/// `t = dot(T, p)` with `p` the object space position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexGen {
    pub s: Vec4,
    pub t: Vec4,
    pub texture: Option<TextureId>,
}

/// Light and material state for a surface draw, all directions in object
/// space.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfacePass {
    pub model_view: Mat4,
    pub program: ShaderProgram,
    pub blend: BlendMode,
    pub depth_write: bool,
    pub depth_test: bool,
    pub cull: CullMode,
    pub lit: bool,
    pub sun_dir: Vec3,
    pub eye_pos: Vec3,
    pub half_angle: Vec3,
    pub light_color: Color,
    pub ambient: Color,
    pub specular_color: Color,
    pub specular_power: f32,
    pub haze_color: Color,
    pub color: Color,
    /// Added to texture coordinate unit 0.
    pub tex_offset: Vec2,
    /// Eye-space normals are renormalized; otherwise `light_color` is
    /// pre-scaled to compensate for the model scale.
    pub rescale_normals: bool,
    pub tex_gen: Option<TexGen>,
    /// Textures bound to units without per-patch tiling.
    pub textures: [Option<TextureId>; MAX_SPHERE_TEXTURES],
}

impl SurfacePass {
    pub fn new(model_view: Mat4, program: ShaderProgram) -> Self {
        Self {
            model_view,
            program,
            blend: BlendMode::Opaque,
            depth_write: true,
            depth_test: true,
            cull: CullMode::Back,
            lit: true,
            sun_dir: Vec3::Z,
            eye_pos: Vec3::Z,
            half_angle: Vec3::Z,
            light_color: Color::WHITE,
            ambient: Color::BLACK,
            specular_color: Color::BLACK,
            specular_power: 1.0,
            haze_color: Color::new(0.0, 0.0, 0.0, 0.0),
            color: Color::WHITE,
            tex_offset: Vec2::ZERO,
            rescale_normals: true,
            tex_gen: None,
            textures: [None; MAX_SPHERE_TEXTURES],
        }
    }
}

/// Render state for lines, points, and billboards.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitivePass {
    pub model_view: Mat4,
    pub blend: BlendMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull: CullMode,
    pub texture: Option<TextureId>,
    pub tex_gen: Option<TexGen>,
    /// Antialiased lines were requested.
    pub smooth: bool,
}

impl PrimitivePass {
    pub fn new(model_view: Mat4, blend: BlendMode) -> Self {
        Self {
            model_view,
            blend,
            depth_test: false,
            depth_write: false,
            cull: CullMode::None,
            texture: None,
            tex_gen: None,
            smooth: false,
        }
    }

    #[must_use]
    pub fn with_texture(mut self, texture: Option<TextureId>) -> Self {
        self.texture = texture;
        self
    }

    #[must_use]
    pub fn with_depth(mut self, test: bool, write: bool) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PrimitiveVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl PrimitiveVertex {
    pub fn new(position: Vec3, color: Color, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
            uv: uv.to_array(),
        }
    }
}

/// Location of one tessellated sphere patch in the frame's arenas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereGeometry {
    /// First float of the patch's vertices.
    pub vertex_offset: u32,
    pub vertex_count: u32,
    /// Floats per vertex.
    pub stride: u32,
    pub has_tangents: bool,
    pub tex_units: u32,
    pub index_offset: u32,
    pub index_count: u32,
    /// Tile bound to each coordinate set.
    pub textures: [Option<TextureId>; MAX_SPHERE_TEXTURES],
}

impl SphereGeometry {
    pub fn vertex_floats(&self) -> Range<usize> {
        let start = self.vertex_offset as usize;
        start..start + (self.vertex_count * self.stride) as usize
    }

    pub fn indices(&self) -> Range<usize> {
        let start = self.index_offset as usize;
        start..start + self.index_count as usize
    }
}

/// Two triangles forming a square of half-size `size` around `center`,
/// facing +Z in eye space.
pub fn billboard_quad(center: Vec3, size: f32, color: Color) -> [PrimitiveVertex; 6] {
    let corner = |x: f32, y: f32| {
        PrimitiveVertex::new(
            center + Vec3::new(x * size, y * size, 0.0),
            color,
            Vec2::new((x + 1.0) * 0.5, (1.0 - y) * 0.5),
        )
    };
    [
        corner(-1.0, -1.0),
        corner(1.0, -1.0),
        corner(1.0, 1.0),
        corner(-1.0, -1.0),
        corner(1.0, 1.0),
        corner(-1.0, 1.0),
    ]
}

/// Index into a frame's surface pass table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetProjection(Mat4),
    /// Restrict depth output to `[near, far]` within `[0, 1]`.
    SetDepthRange { near: f32, far: f32 },
    DrawSphere { pass: PassId, geometry: SphereGeometry },
    DrawMesh { pass: PassId, mesh: MeshHandle },
    DrawPrimitives {
        pass: Box<PrimitivePass>,
        topology: Topology,
        vertices: Range<u32>,
    },
}

/// Writable space for one sphere patch.
pub struct SpherePatchMut<'a> {
    pub vertices: &'a mut [f32],
    pub indices: &'a mut [u16],
    pub vertex_offset: u32,
    pub index_offset: u32,
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub clear_color: Color,
    pub viewport: (u32, u32),
    commands: Vec<Command>,
    surface_passes: Vec<SurfacePass>,
    sphere_vertices: Vec<f32>,
    sphere_indices: Vec<u16>,
    sphere_budget: usize,
    primitive_vertices: Vec<PrimitiveVertex>,
    labels: Vec<Label>,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new(DEFAULT_SPHERE_BUDGET)
    }
}

impl Frame {
    /// A frame whose sphere arena holds at most `sphere_budget` floats.
    pub fn new(sphere_budget: usize) -> Self {
        Self {
            clear_color: Color::BLACK,
            viewport: (1, 1),
            commands: Vec::new(),
            surface_passes: Vec::new(),
            sphere_vertices: Vec::new(),
            sphere_indices: Vec::new(),
            sphere_budget,
            primitive_vertices: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Empty the frame for reuse, keeping allocations.
    pub fn reset(&mut self, clear_color: Color, viewport: (u32, u32)) {
        self.clear_color = clear_color;
        self.viewport = viewport;
        self.commands.clear();
        self.surface_passes.clear();
        self.sphere_vertices.clear();
        self.sphere_indices.clear();
        self.primitive_vertices.clear();
        self.labels.clear();
    }

    pub fn set_sphere_budget(&mut self, floats: usize) {
        self.sphere_budget = floats;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn surface_pass(&self, id: PassId) -> Option<&SurfacePass> {
        self.surface_passes.get(id.0 as usize)
    }

    pub fn sphere_vertices(&self) -> &[f32] {
        &self.sphere_vertices
    }

    pub fn sphere_indices(&self) -> &[u16] {
        &self.sphere_indices
    }

    pub fn primitive_vertices(&self) -> &[PrimitiveVertex] {
        &self.primitive_vertices
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.commands.push(Command::SetProjection(projection));
    }

    pub fn set_depth_range(&mut self, near: f32, far: f32) {
        debug_assert!(near <= far);
        self.commands.push(Command::SetDepthRange { near, far });
    }

    pub fn add_surface_pass(&mut self, pass: SurfacePass) -> PassId {
        self.surface_passes.push(pass);
        PassId(self.surface_passes.len() as u32 - 1)
    }

    /// Reserve arena space for a patch. Returns `None` when the sphere budget
    /// is exhausted; the caller skips the patch.
    pub fn map_sphere_patch(&mut self, floats: usize, indices: usize) -> Option<SpherePatchMut<'_>> {
        let vertex_offset = self.sphere_vertices.len();
        if vertex_offset + floats > self.sphere_budget {
            return None;
        }
        let index_offset = self.sphere_indices.len();
        self.sphere_vertices.resize(vertex_offset + floats, 0.0);
        self.sphere_indices.resize(index_offset + indices, 0);
        Some(SpherePatchMut {
            vertices: &mut self.sphere_vertices[vertex_offset..],
            indices: &mut self.sphere_indices[index_offset..],
            vertex_offset: vertex_offset as u32,
            index_offset: index_offset as u32,
        })
    }

    pub fn draw_sphere(&mut self, pass: PassId, geometry: SphereGeometry) {
        self.commands.push(Command::DrawSphere { pass, geometry });
    }

    pub fn draw_mesh(&mut self, pass: PassId, mesh: MeshHandle) {
        self.commands.push(Command::DrawMesh { pass, mesh });
    }

    /// Append vertices and a draw command for them. Empty input draws
    /// nothing.
    pub fn draw_primitives(
        &mut self,
        pass: PrimitivePass,
        topology: Topology,
        vertices: impl IntoIterator<Item = PrimitiveVertex>,
    ) {
        let start = self.primitive_vertices.len() as u32;
        self.primitive_vertices.extend(vertices);
        let end = self.primitive_vertices.len() as u32;
        if end > start {
            self.commands.push(Command::DrawPrimitives {
                pass: Box::new(pass),
                topology,
                vertices: start..end,
            });
        }
    }

    /// Draw a closed polyline by repeating its first vertex.
    pub fn draw_line_loop(&mut self, pass: PrimitivePass, vertices: &[PrimitiveVertex]) {
        let Some(first) = vertices.first() else {
            return;
        };
        self.draw_primitives(
            pass,
            Topology::LineStrip,
            vertices.iter().copied().chain(std::iter::once(*first)),
        );
    }

    /// Camera-facing quad of half-size `size` around `center` (eye space).
    pub fn draw_billboard(&mut self, pass: PrimitivePass, center: Vec3, size: f32, color: Color) {
        self.draw_primitives(pass, Topology::TriangleList, billboard_quad(center, size, color));
    }

    pub fn add_label(&mut self, label: Label) {
        self.labels.push(label);
    }

    /// Number of sphere patch draws in the frame.
    pub fn sphere_patch_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawSphere { .. }))
            .count()
    }
}

/// Headless backend that keeps the last submitted frame.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub capabilities: DeviceCapabilities,
    pub textures: Vec<&'static str>,
    pub meshes: Vec<MeshData>,
    pub last_frame: Option<Frame>,
    pub frames_submitted: usize,
    /// Make every texture upload fail.
    pub fail_textures: bool,
}

impl RecordingBackend {
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// A device with every optional feature the renderer can use.
    pub fn full_featured() -> Self {
        Self::new(DeviceCapabilities {
            renderer: "Recording".into(),
            extensions: crate::shading::ALL_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_texture_units: 4,
            max_texture_size: 8192,
        })
    }
}

impl RenderBackend for RecordingBackend {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.clone()
    }

    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureId, BackendError> {
        if self.fail_textures {
            return Err(BackendError::Unavailable("texture uploads disabled".into()));
        }
        if image.width == 0 || image.height == 0 {
            return Err(BackendError::ZeroDimensions(image.label));
        }
        let expected = (image.width * image.height * 4) as usize;
        if image.pixels.len() != expected {
            return Err(BackendError::TextureSize {
                label: image.label,
                expected,
                actual: image.pixels.len(),
            });
        }
        self.textures.push(image.label);
        Ok(TextureId(self.textures.len() as u32))
    }

    fn create_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle, BackendError> {
        if mesh.indices.len() < 3 {
            return Err(BackendError::EmptyMesh);
        }
        self.meshes.push(mesh.clone());
        Ok(MeshHandle(self.meshes.len() as u32 - 1))
    }

    fn submit(&mut self, frame: &Frame) {
        self.frames_submitted += 1;
        self.last_frame = Some(frame.clone());
    }
}
