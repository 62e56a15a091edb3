//! Double-buffered grid quantities.
//!
//! A `Field` owns two equally sized render targets. The *current* buffer is
//! what kernels read; the *staging* buffer is what the next pass writes.
//! Passes never bind one texture as both input and output, and the roles
//! swap after every write so that current always holds the newest result.

use super::kernels::FIELD_FORMAT;
use super::readback::{read_texture, TEXEL_BYTES};
use super::GpuContext;
use crate::error::{FlowError, FlowResult};

pub use super::readback::FieldSnapshot;

/// Role bookkeeping for a pair of buffers.
#[derive(Clone, Debug)]
pub struct PingPong<T> {
    slots: [T; 2],
    front: usize,
}

impl<T> PingPong<T> {
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            front: 0,
        }
    }

    /// The buffer holding the newest result.
    pub fn current(&self) -> &T {
        &self.slots[self.front]
    }

    /// The buffer the next write goes to.
    pub fn staging(&self) -> &T {
        &self.slots[1 - self.front]
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }

    /// Index of the current slot; only used to observe swaps.
    pub fn front(&self) -> usize {
        self.front
    }

    pub fn both(&self) -> [&T; 2] {
        [&self.slots[0], &self.slots[1]]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Velocity,
    Pressure,
    Dye,
}

impl FieldKind {
    pub const ALL: [FieldKind; 3] = [FieldKind::Velocity, FieldKind::Pressure, FieldKind::Dye];

    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Velocity => "velocity",
            FieldKind::Pressure => "pressure",
            FieldKind::Dye => "dye",
        }
    }
}

/// A texture together with the view kernels bind.
pub struct FieldTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl FieldTexture {
    pub(crate) fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FIELD_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

pub struct Field {
    kind: FieldKind,
    width: u32,
    height: u32,
    buffers: PingPong<FieldTexture>,
}

impl Field {
    /// Create both buffers at `width` x `height`.
    ///
    /// Contents are undefined until the field is cleared or uploaded.
    pub fn allocate(ctx: &GpuContext, kind: FieldKind, width: u32, height: u32) -> FlowResult<Self> {
        let max = ctx.max_grid_dimension();
        if width == 0 || height == 0 || width > max || height > max {
            return Err(FlowError::InvalidDimensions { width, height });
        }

        ctx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let first = FieldTexture::new(&ctx.device, &format!("{} A", kind.name()), width, height);
        let second = FieldTexture::new(&ctx.device, &format!("{} B", kind.name()), width, height);

        let validation = pollster::block_on(ctx.device.pop_error_scope());
        let oom = pollster::block_on(ctx.device.pop_error_scope());
        if let Some(error) = validation.or(oom) {
            return Err(FlowError::RenderTarget {
                field: kind.name(),
                message: error.to_string(),
            });
        }

        log::debug!("allocated {} field {}x{}", kind.name(), width, height);
        Ok(Self {
            kind,
            width,
            height,
            buffers: PingPong::new(first, second),
        })
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// View of the current buffer, for binding as a kernel input.
    pub fn input(&self) -> &wgpu::TextureView {
        &self.buffers.current().view
    }

    /// View of the staging buffer, for use as a color attachment.
    pub fn output(&self) -> &wgpu::TextureView {
        &self.buffers.staging().view
    }

    pub fn current_texture(&self) -> &wgpu::Texture {
        &self.buffers.current().texture
    }

    pub fn swap(&mut self) {
        self.buffers.swap();
    }

    pub fn front(&self) -> usize {
        self.buffers.front()
    }

    /// Fill both buffers with `color`.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder, color: wgpu::Color) {
        for buffer in self.buffers.both() {
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Field Clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &buffer.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
    }

    /// Both buffer views, for passes that must stamp the same content into
    /// current and staging.
    pub fn views(&self) -> [&wgpu::TextureView; 2] {
        let [a, b] = self.buffers.both();
        [&a.view, &b.view]
    }

    /// Overwrite the current buffer with `cells`, rows top to bottom.
    pub fn upload(&self, queue: &wgpu::Queue, cells: &[[f32; 4]]) -> FlowResult<()> {
        let expected = (self.width * self.height) as usize;
        if cells.len() != expected {
            return Err(FlowError::RenderTarget {
                field: self.kind.name(),
                message: format!(
                    "upload of {} cells into a {}x{} grid",
                    cells.len(),
                    self.width,
                    self.height
                ),
            });
        }
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: self.current_texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(cells),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.width * TEXEL_BYTES),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Blocking copy of the current buffer.
    pub fn read(&self, ctx: &GpuContext) -> FlowResult<FieldSnapshot> {
        read_texture(ctx, self.current_texture(), self.width, self.height)
    }

    /// Copy the top-left overlap of `other`'s current buffer into ours.
    pub fn copy_overlap_from(&self, encoder: &mut wgpu::CommandEncoder, other: &Field) {
        let width = self.width.min(other.width);
        let height = self.height.min(other.height);
        if width == 0 || height == 0 {
            return;
        }
        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: other.current_texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: self.current_texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}
