//! Blocking texture readback for field inspection.
//!
//! Copies a field buffer into a mappable staging buffer, waits for the map,
//! and strips the row padding wgpu requires for texture-to-buffer copies.

use super::{await_buffer_map, GpuContext};
use crate::error::FlowResult;

/// Bytes per texel of an `Rgba32Float` field.
pub const TEXEL_BYTES: u32 = 16;

/// Row stride wgpu requires for a copy of `width` texels.
pub fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = width * TEXEL_BYTES;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Size of the staging buffer for a `width` x `height` readback. Computed in
/// u64: a padded 16k x 16k grid does not fit in u32.
pub fn staging_bytes(width: u32, height: u32) -> u64 {
    padded_row_bytes(width) as u64 * height as u64
}

/// CPU copy of one field buffer, rows top to bottom.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSnapshot {
    pub width: u32,
    pub height: u32,
    pub cells: Vec<[f32; 4]>,
}

impl FieldSnapshot {
    pub fn at(&self, x: u32, y: u32) -> [f32; 4] {
        self.cells[(y * self.width + x) as usize]
    }

    /// Sum of |r| + |g| + |b| over the grid: a scalar summary of how much
    /// dye (or velocity) the field holds.
    pub fn total_magnitude(&self) -> f64 {
        self.cells
            .iter()
            .map(|c| c[0].abs() as f64 + c[1].abs() as f64 + c[2].abs() as f64)
            .sum()
    }

    /// Largest absolute channel value over the first two channels.
    pub fn max_abs_xy(&self) -> f32 {
        self.cells
            .iter()
            .fold(0.0f32, |m, c| m.max(c[0].abs()).max(c[1].abs()))
    }

    /// Largest per-channel difference against another snapshot. Snapshots of
    /// different sizes are infinitely far apart.
    pub fn max_difference(&self, other: &FieldSnapshot) -> f32 {
        if (self.width, self.height) != (other.width, other.height) {
            return f32::INFINITY;
        }
        self.cells
            .iter()
            .zip(&other.cells)
            .flat_map(|(a, b)| (0..4).map(move |i| (a[i] - b[i]).abs()))
            .fold(0.0, f32::max)
    }
}

/// Read `texture` (an `Rgba32Float` field buffer) back to the CPU.
pub fn read_texture(
    ctx: &GpuContext,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
) -> FlowResult<FieldSnapshot> {
    let padded = padded_row_bytes(width);
    let unpadded = (width * TEXEL_BYTES) as usize;

    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Field Readback Staging"),
        size: staging_bytes(width, height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Field Readback Encoder"),
        });

    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    ctx.queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    ctx.device.poll(wgpu::Maintain::Wait);
    await_buffer_map(rx, ctx.device_lost_flag())?;

    let mut cells = Vec::with_capacity((width * height) as usize);
    {
        let data = slice.get_mapped_range();
        for row in 0..height as usize {
            let start = row * padded as usize;
            let texels: &[[f32; 4]] = bytemuck::cast_slice(&data[start..start + unpadded]);
            cells.extend_from_slice(texels);
        }
    }
    staging.unmap();

    Ok(FieldSnapshot {
        width,
        height,
        cells,
    })
}
