//! Static meshes used to invoke kernels.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// Full-screen quad vertex: clip-space position plus a uv payload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ScreenVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl ScreenVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ScreenVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Seed triangle vertex: clip-space position only.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SeedVertex {
    pub position: [f32; 3],
}

impl SeedVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SeedVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

/// Quad covering all of clip space. uv (0,0) is the bottom-left corner.
pub const SCREEN_QUAD_VERTICES: [ScreenVertex; 4] = [
    ScreenVertex { position: [1.0, 1.0, 0.0], uv: [1.0, 1.0] },
    ScreenVertex { position: [1.0, -1.0, 0.0], uv: [1.0, 0.0] },
    ScreenVertex { position: [-1.0, -1.0, 0.0], uv: [0.0, 0.0] },
    ScreenVertex { position: [-1.0, 1.0, 0.0], uv: [0.0, 1.0] },
];

pub const SCREEN_QUAD_INDICES: [u32; 6] = [0, 1, 3, 1, 2, 3];

/// Upward-pointing triangle of `size` pixels, centered on a
/// `width` x `height` grid.
pub fn seed_triangle(width: u32, height: u32, size: f32) -> [SeedVertex; 3] {
    let ox = size / width.max(1) as f32;
    let oy = size / height.max(1) as f32;
    [
        SeedVertex { position: [-ox, -oy, 0.0] },
        SeedVertex { position: [ox, -oy, 0.0] },
        SeedVertex { position: [0.0, oy, 0.0] },
    ]
}

/// Indexed mesh uploaded to the GPU.
pub struct Mesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl Mesh {
    pub fn screen_quad(device: &wgpu::Device) -> Self {
        Self::new(device, "Screen Quad", &SCREEN_QUAD_VERTICES, &SCREEN_QUAD_INDICES)
    }

    pub fn seed_triangle(device: &wgpu::Device, width: u32, height: u32, size: f32) -> Self {
        Self::new(
            device,
            "Seed Triangle",
            &seed_triangle(width, height, size),
            &[0, 1, 2],
        )
    }

    fn new<V: Pod>(device: &wgpu::Device, label: &str, vertices: &[V], indices: &[u32]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}
