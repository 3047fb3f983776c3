//! Vertex formats and GPU buffers for replaying frames.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::backend::{MAX_SPHERE_TEXTURES, MeshData, PrimitiveVertex, SphereGeometry};

/// Surface vertex for sphere patches and meshes, in object space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SurfaceVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub uv: [[f32; 2]; MAX_SPHERE_TEXTURES],
}

impl SurfaceVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x3,
        3 => Float32x2,
        4 => Float32x2,
        5 => Float32x2,
        6 => Float32x2,
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SurfaceVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

const PRIMITIVE_ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x4,
    2 => Float32x2,
];

pub fn primitive_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<PrimitiveVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &PRIMITIVE_ATTRIBUTES,
    }
}

/// Unpack one patch from the frame's float arena. Sphere normals equal
/// the unit positions; coordinate sets the patch lacks repeat set 0.
pub fn expand_sphere_patch(arena: &[f32], geometry: &SphereGeometry, out: &mut Vec<SurfaceVertex>) {
    let stride = geometry.stride as usize;
    let uv_start = if geometry.has_tangents { 6 } else { 3 };
    let units = (geometry.tex_units as usize).min(MAX_SPHERE_TEXTURES);

    for vertex in arena[geometry.vertex_floats()].chunks_exact(stride) {
        let position = [vertex[0], vertex[1], vertex[2]];
        let tangent = if geometry.has_tangents {
            [vertex[3], vertex[4], vertex[5]]
        } else {
            [0.0; 3]
        };
        let mut uv = [[0.0; 2]; MAX_SPHERE_TEXTURES];
        for (unit, slot) in uv.iter_mut().enumerate() {
            let set = if unit < units { unit } else { 0 };
            if set < units {
                let at = uv_start + set * 2;
                *slot = [vertex[at], vertex[at + 1]];
            }
        }
        out.push(SurfaceVertex {
            position,
            normal: position,
            tangent,
            uv,
        });
    }
}

/// Surface vertices for an uploaded mesh; every unit uses the mesh's
/// single coordinate set.
pub fn mesh_vertices(mesh: &MeshData) -> Vec<SurfaceVertex> {
    mesh.positions
        .iter()
        .enumerate()
        .map(|(i, &position)| {
            let uv = mesh.uvs.get(i).copied().unwrap_or_default();
            SurfaceVertex {
                position,
                normal: mesh.normals.get(i).copied().unwrap_or(position),
                tangent: [0.0; 3],
                uv: [uv; MAX_SPHERE_TEXTURES],
            }
        })
        .collect()
}

/// Vertex and index buffers of an uploaded mesh.
pub struct MeshBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl MeshBuffer {
    pub fn new(device: &wgpu::Device, label: &str, mesh: &MeshData) -> Self {
        let vertices = mesh_vertices(mesh);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }

    pub fn bind(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    }

    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// Capacity for `needed` bytes: the next power of two, at least 4 KiB.
pub fn grown_capacity(needed: u64) -> u64 {
    needed.max(4096).next_power_of_two()
}

/// A buffer rewritten every frame, reallocated only when it must grow.
pub struct StreamBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: wgpu::Buffer,
    generation: u64,
}

impl StreamBuffer {
    pub fn new(device: &wgpu::Device, label: &'static str, usage: wgpu::BufferUsages) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        Self {
            label,
            usage,
            buffer: Self::allocate(device, label, usage, grown_capacity(0)),
            generation: 0,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        label: &'static str,
        usage: wgpu::BufferUsages,
        size: u64,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Upload `data` from offset 0, growing the buffer first if needed.
    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8]) {
        let needed = data.len() as u64;
        if needed > self.buffer.size() {
            let size = grown_capacity(needed);
            log::debug!("growing {} to {size} bytes", self.label);
            self.buffer = Self::allocate(device, self.label, self.usage, size);
            self.generation += 1;
        }
        // write_buffer needs a multiple of four bytes.
        let aligned = data.len() & !3;
        if aligned > 0 {
            queue.write_buffer(&self.buffer, 0, &data[..aligned]);
        }
        if aligned < data.len() {
            let mut tail = [0u8; 4];
            tail[..data.len() - aligned].copy_from_slice(&data[aligned..]);
            queue.write_buffer(&self.buffer, aligned as u64, &tail);
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Bumped whenever the buffer is replaced; bind groups that reference it
    /// must be rebuilt.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::TextureId;

    fn geometry(stride: u32, has_tangents: bool, tex_units: u32, count: u32) -> SphereGeometry {
        SphereGeometry {
            vertex_offset: 0,
            vertex_count: count,
            stride,
            has_tangents,
            tex_units,
            index_offset: 0,
            index_count: 0,
            textures: [Some(TextureId(1)), None, None, None],
        }
    }

    #[test]
    fn test_surface_vertex_size() {
        assert_eq!(std::mem::size_of::<SurfaceVertex>(), 68);
        assert_eq!(SurfaceVertex::layout().array_stride, 68);
        assert_eq!(primitive_vertex_layout().array_stride, 36);
    }

    #[test]
    fn test_expand_patch_with_tangents_and_two_units() {
        #[rustfmt::skip]
        let arena = [
            0.0, 1.0, 0.0,  1.0, 0.0, 0.0,  0.25, 0.5,  0.75, 1.0,
            1.0, 0.0, 0.0,  0.0, 0.0, -1.0, 0.0, 0.0,   0.5, 0.5,
        ];
        let mut out = Vec::new();
        expand_sphere_patch(&arena, &geometry(10, true, 2, 2), &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].position, [0.0, 1.0, 0.0]);
        assert_eq!(out[0].normal, out[0].position);
        assert_eq!(out[0].tangent, [1.0, 0.0, 0.0]);
        assert_eq!(out[0].uv[0], [0.25, 0.5]);
        assert_eq!(out[0].uv[1], [0.75, 1.0]);
        assert_eq!(out[0].uv[2], [0.25, 0.5]);
        assert_eq!(out[1].tangent, [0.0, 0.0, -1.0]);
    }

    #[test]
    fn test_expand_untextured_patch() {
        let arena = [0.0, 0.0, 1.0, 0.0, -1.0, 0.0];
        let mut out = Vec::new();
        expand_sphere_patch(&arena, &geometry(3, false, 0, 2), &mut out);
        assert_eq!(out[1].position, [0.0, -1.0, 0.0]);
        assert_eq!(out[1].uv, [[0.0; 2]; MAX_SPHERE_TEXTURES]);
        assert_eq!(out[1].tangent, [0.0; 3]);
    }

    #[test]
    fn test_mesh_vertices_fill_missing_attributes() {
        let mesh = MeshData {
            positions: vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            normals: vec![[0.0, 0.0, 1.0]],
            uvs: vec![[0.5, 0.5]],
            indices: vec![0, 1, 2],
        };
        let vertices = mesh_vertices(&mesh);
        assert_eq!(vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(vertices[1].normal, [0.0, 1.0, 0.0]);
        assert_eq!(vertices[0].uv[3], [0.5, 0.5]);
        assert_eq!(vertices[2].uv[0], [0.0, 0.0]);
    }

    #[test]
    fn test_grown_capacity() {
        assert_eq!(grown_capacity(0), 4096);
        assert_eq!(grown_capacity(4097), 8192);
        assert_eq!(grown_capacity(1 << 20), 1 << 20);
    }
}
