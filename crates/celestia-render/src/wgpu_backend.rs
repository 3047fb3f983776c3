//! Replays recorded frames on the GPU.
//!
//! [`plan_frame`] flattens a [`Frame`] into draw operations plus the
//! vertex and uniform data they reference; [`WgpuBackend`] uploads that
//! data and encodes a single render pass. Depth buckets map to viewport
//! depth ranges.

use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use winit::window::Window;

use crate::backend::{
    BackendError, BlendMode, Command, DeviceCapabilities, Frame, MeshData, PrimitivePass,
    PrimitiveVertex, RenderBackend, Topology, billboard_quad,
};
use crate::body::MeshHandle;
use crate::buffer::{MeshBuffer, StreamBuffer, SurfaceVertex, expand_sphere_patch};
use crate::depth::DepthBuffer;
use crate::gpu::{GpuContext, GpuContextError, SurfaceError, init_gpu_context_blocking};
use crate::pipeline::{DrawUniforms, PipelineCache, PipelineKey, uniform_bind_group_layout, uniform_stride};
use crate::texture::{TextureId, TextureImage};
use crate::texture_store::{TextureSlots, TextureStore};

/// Half-size in pixels of the marker drawn for each label.
pub const LABEL_MARKER_SIZE: f32 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    DepthRange {
        near: f32,
        far: f32,
    },
    Sphere {
        key: PipelineKey,
        slots: TextureSlots,
        uniform: u32,
        indices: Range<u32>,
        base_vertex: i32,
    },
    Mesh {
        key: PipelineKey,
        slots: TextureSlots,
        uniform: u32,
        mesh: MeshHandle,
    },
    Primitives {
        key: PipelineKey,
        slots: TextureSlots,
        uniform: u32,
        vertices: Range<u32>,
    },
}

/// A frame flattened for upload.
#[derive(Debug, Default)]
pub struct FramePlan {
    pub ops: Vec<DrawOp>,
    pub uniforms: Vec<DrawUniforms>,
    pub surface_vertices: Vec<SurfaceVertex>,
    /// The frame's primitive vertices followed by label markers.
    pub primitive_vertices: Vec<PrimitiveVertex>,
}

impl FramePlan {
    /// Uniforms laid out `stride` bytes apart.
    pub fn uniform_bytes(&self, stride: u64) -> Vec<u8> {
        let stride = stride as usize;
        let mut bytes = vec![0u8; self.uniforms.len() * stride];
        for (chunk, uniforms) in bytes.chunks_exact_mut(stride).zip(&self.uniforms) {
            let data = bytemuck::bytes_of(uniforms);
            chunk[..data.len()].copy_from_slice(data);
        }
        bytes
    }
}

fn tex_gen_texture(tex_gen: Option<&crate::backend::TexGen>) -> Option<TextureId> {
    tex_gen.and_then(|t| t.texture)
}

fn primitive_slots(pass: &PrimitivePass) -> TextureSlots {
    [pass.texture, None, None, tex_gen_texture(pass.tex_gen.as_ref())]
}

/// Flatten `frame` into draw operations. Draws referencing a missing
/// surface pass are dropped.
pub fn plan_frame(frame: &Frame) -> FramePlan {
    let mut plan = FramePlan {
        primitive_vertices: frame.primitive_vertices().to_vec(),
        ..FramePlan::default()
    };
    let mut projection = Mat4::IDENTITY;

    for command in frame.commands() {
        match command {
            Command::SetProjection(matrix) => projection = *matrix,
            Command::SetDepthRange { near, far } => plan.ops.push(DrawOp::DepthRange {
                near: *near,
                far: *far,
            }),
            Command::DrawSphere { pass, geometry } => {
                let Some(surface) = frame.surface_pass(*pass) else {
                    log::warn!("Sphere draw references unknown pass {}", pass.0);
                    continue;
                };
                let base_vertex = plan.surface_vertices.len() as i32;
                expand_sphere_patch(frame.sphere_vertices(), geometry, &mut plan.surface_vertices);
                let mut slots = [None; 4];
                for (i, slot) in slots.iter_mut().take(3).enumerate() {
                    *slot = geometry.textures[i].or(surface.textures[i]);
                }
                slots[3] = tex_gen_texture(surface.tex_gen.as_ref());
                let indices = geometry.indices();
                plan.ops.push(DrawOp::Sphere {
                    key: PipelineKey::sphere(surface),
                    slots,
                    uniform: plan.uniforms.len() as u32,
                    indices: indices.start as u32..indices.end as u32,
                    base_vertex,
                });
                plan.uniforms.push(DrawUniforms::surface(projection, surface));
            }
            Command::DrawMesh { pass, mesh } => {
                let Some(surface) = frame.surface_pass(*pass) else {
                    log::warn!("Mesh draw references unknown pass {}", pass.0);
                    continue;
                };
                let mut slots = surface.textures;
                slots[3] = tex_gen_texture(surface.tex_gen.as_ref());
                plan.ops.push(DrawOp::Mesh {
                    key: PipelineKey::mesh(surface),
                    slots,
                    uniform: plan.uniforms.len() as u32,
                    mesh: *mesh,
                });
                plan.uniforms.push(DrawUniforms::surface(projection, surface));
            }
            Command::DrawPrimitives {
                pass,
                topology,
                vertices,
            } => {
                plan.ops.push(DrawOp::Primitives {
                    key: PipelineKey::primitive(pass, *topology),
                    slots: primitive_slots(pass),
                    uniform: plan.uniforms.len() as u32,
                    vertices: vertices.clone(),
                });
                plan.uniforms.push(DrawUniforms::primitive(projection, pass));
            }
        }
    }

    plan_labels(frame, &mut plan);
    plan
}

/// Labels become small squares over the whole depth range; text is left
/// to an overlay.
fn plan_labels(frame: &Frame, plan: &mut FramePlan) {
    if frame.labels().is_empty() {
        return;
    }
    let (width, height) = frame.viewport;
    let to_ndc = Mat4::from_scale(Vec3::new(2.0 / width.max(1) as f32, 2.0 / height.max(1) as f32, 1.0));
    let pass = PrimitivePass::new(to_ndc, BlendMode::Alpha);

    let start = plan.primitive_vertices.len() as u32;
    for label in frame.labels() {
        plan.primitive_vertices.extend(billboard_quad(
            label.position.extend(0.0),
            LABEL_MARKER_SIZE,
            label.color,
        ));
    }
    let end = plan.primitive_vertices.len() as u32;

    plan.ops.push(DrawOp::DepthRange { near: 0.0, far: 1.0 });
    plan.ops.push(DrawOp::Primitives {
        key: PipelineKey::primitive(&pass, Topology::TriangleList),
        slots: primitive_slots(&pass),
        uniform: plan.uniforms.len() as u32,
        vertices: start..end,
    });
    plan.uniforms.push(DrawUniforms::primitive(Mat4::IDENTITY, &pass));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Nothing,
    Spheres,
    Mesh(u32),
    Primitives,
}

/// [`RenderBackend`] on a wgpu device and window surface.
pub struct WgpuBackend {
    gpu: GpuContext,
    depth: DepthBuffer,
    textures: TextureStore,
    pipelines: PipelineCache,
    meshes: Vec<MeshBuffer>,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_stride: u64,
    uniforms: StreamBuffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_generation: u64,
    surface_vertices: StreamBuffer,
    sphere_indices: StreamBuffer,
    primitive_vertices: StreamBuffer,
}

impl WgpuBackend {
    /// Create the device and surface for `window`, blocking until ready.
    pub fn new(window: Arc<Window>, vsync: bool) -> Result<Self, GpuContextError> {
        Ok(Self::from_context(init_gpu_context_blocking(window, vsync)?))
    }

    pub fn from_context(gpu: GpuContext) -> Self {
        let device = &gpu.device;
        let (width, height) = gpu.size();
        let depth = DepthBuffer::new(device, width, height);
        let textures = TextureStore::new(device, &gpu.queue);
        let uniform_layout = uniform_bind_group_layout(device);
        let pipelines = PipelineCache::new(
            device,
            gpu.surface_format,
            &uniform_layout,
            textures.bind_group_layout(),
        );
        let uniform_stride = uniform_stride(device.limits().min_uniform_buffer_offset_alignment);
        let uniforms = StreamBuffer::new(device, "draw-uniforms", wgpu::BufferUsages::UNIFORM);
        let uniform_bind_group = create_uniform_bind_group(device, &uniform_layout, &uniforms);
        let uniform_generation = uniforms.generation();
        let surface_vertices = StreamBuffer::new(device, "surface-vertices", wgpu::BufferUsages::VERTEX);
        let sphere_indices = StreamBuffer::new(device, "sphere-indices", wgpu::BufferUsages::INDEX);
        let primitive_vertices =
            StreamBuffer::new(device, "primitive-vertices", wgpu::BufferUsages::VERTEX);

        Self {
            gpu,
            depth,
            textures,
            pipelines,
            meshes: Vec::new(),
            uniform_layout,
            uniform_stride,
            uniforms,
            uniform_bind_group,
            uniform_generation,
            surface_vertices,
            sphere_indices,
            primitive_vertices,
        }
    }

    /// Resize the surface and depth buffer. Zero sizes clamp to 1.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
        self.depth.resize(&self.gpu.device, width, height);
    }

    pub fn size(&self) -> (u32, u32) {
        self.gpu.size()
    }

    fn upload(&mut self, frame: &Frame, plan: &FramePlan) {
        let device = &self.gpu.device;
        let queue = &self.gpu.queue;
        self.uniforms
            .write(device, queue, &plan.uniform_bytes(self.uniform_stride));
        if self.uniforms.generation() != self.uniform_generation {
            self.uniform_bind_group =
                create_uniform_bind_group(device, &self.uniform_layout, &self.uniforms);
            self.uniform_generation = self.uniforms.generation();
        }
        self.surface_vertices
            .write(device, queue, bytemuck::cast_slice(&plan.surface_vertices));
        self.sphere_indices
            .write(device, queue, bytemuck::cast_slice(frame.sphere_indices()));
        self.primitive_vertices
            .write(device, queue, bytemuck::cast_slice(&plan.primitive_vertices));
    }
}

fn create_uniform_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniforms: &StreamBuffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("draw-uniforms"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: uniforms.buffer(),
                offset: 0,
                size: NonZeroU64::new(std::mem::size_of::<DrawUniforms>() as u64),
            }),
        }],
    })
}

impl RenderBackend for WgpuBackend {
    fn capabilities(&self) -> DeviceCapabilities {
        self.gpu.capabilities()
    }

    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureId, BackendError> {
        self.textures.create(&self.gpu.device, &self.gpu.queue, image)
    }

    fn create_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle, BackendError> {
        if mesh.indices.len() < 3 {
            return Err(BackendError::EmptyMesh);
        }
        let vertex_count = mesh.positions.len() as u32;
        if mesh.indices.iter().any(|&i| i >= vertex_count) {
            return Err(BackendError::Unavailable(format!(
                "mesh index out of range for {vertex_count} vertices"
            )));
        }
        let label = format!("mesh-{}", self.meshes.len());
        self.meshes.push(MeshBuffer::new(&self.gpu.device, &label, mesh));
        Ok(MeshHandle(self.meshes.len() as u32 - 1))
    }

    fn submit(&mut self, frame: &Frame) {
        let output = match self.gpu.get_current_texture() {
            Ok(texture) => texture,
            Err(SurfaceError::Timeout) => {
                log::debug!("Surface timeout, skipping frame");
                return;
            }
            Err(e) => {
                log::warn!("Skipping frame: {e}");
                return;
            }
        };
        let (width, height) = self.gpu.size();
        self.depth.resize(&self.gpu.device, width, height);

        let plan = plan_frame(frame);
        self.upload(frame, &plan);

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        {
            let clear = frame.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(clear.r),
                            g: f64::from(clear.g),
                            b: f64::from(clear.b),
                            a: f64::from(clear.a),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(DepthBuffer::CLEAR_VALUE),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let device = &self.gpu.device;
            let (w, h) = (width as f32, height as f32);
            let mut bound = Bound::Nothing;
            let mut current_key = None;

            for op in &plan.ops {
                let (key, slots, uniform) = match op {
                    DrawOp::DepthRange { near, far } => {
                        pass.set_viewport(0.0, 0.0, w, h, *near, *far);
                        continue;
                    }
                    DrawOp::Sphere {
                        key, slots, uniform, ..
                    }
                    | DrawOp::Mesh {
                        key, slots, uniform, ..
                    }
                    | DrawOp::Primitives {
                        key, slots, uniform, ..
                    } => (*key, *slots, *uniform),
                };
                if let DrawOp::Mesh { mesh, .. } = op
                    && self.meshes.get(mesh.0 as usize).is_none()
                {
                    log::warn!("Skipping draw of unknown mesh {}", mesh.0);
                    continue;
                }

                if current_key != Some(key) {
                    pass.set_pipeline(self.pipelines.get(device, key));
                    current_key = Some(key);
                }
                let offset = u64::from(uniform) * self.uniform_stride;
                pass.set_bind_group(0, &self.uniform_bind_group, &[offset as u32]);
                pass.set_bind_group(1, self.textures.bind_group(device, slots), &[]);

                match op {
                    DrawOp::Sphere {
                        indices,
                        base_vertex,
                        ..
                    } => {
                        if bound != Bound::Spheres {
                            pass.set_vertex_buffer(0, self.surface_vertices.buffer().slice(..));
                            pass.set_index_buffer(
                                self.sphere_indices.buffer().slice(..),
                                wgpu::IndexFormat::Uint16,
                            );
                            bound = Bound::Spheres;
                        }
                        pass.draw_indexed(indices.clone(), *base_vertex, 0..1);
                    }
                    DrawOp::Mesh { mesh, .. } => {
                        let Some(buffers) = self.meshes.get(mesh.0 as usize) else {
                            continue;
                        };
                        if bound != Bound::Mesh(mesh.0) {
                            buffers.bind(&mut pass);
                            bound = Bound::Mesh(mesh.0);
                        }
                        buffers.draw(&mut pass);
                    }
                    DrawOp::Primitives { vertices, .. } => {
                        if bound != Bound::Primitives {
                            pass.set_vertex_buffer(0, self.primitive_vertices.buffer().slice(..));
                            bound = Bound::Primitives;
                        }
                        pass.draw(vertices.clone(), 0..1);
                    }
                    DrawOp::DepthRange { .. } => {}
                }
            }
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}
