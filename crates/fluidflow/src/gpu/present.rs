//! Blits the dye field onto the window surface.

use super::field::Field;
use super::geometry::Mesh;
use super::kernels::{Kernel, KernelProgram, ShaderLoader};
use super::params::PresentParams;
use super::GpuContext;
use crate::error::FlowResult;

/// Surface is cleared to white before the blit.
const CLEAR: wgpu::Color = wgpu::Color::WHITE;

pub struct Presenter {
    program: KernelProgram,
    params: wgpu::Buffer,
    quad: Mesh,
}

impl Presenter {
    pub fn new(
        ctx: &GpuContext,
        loader: &ShaderLoader,
        surface_format: wgpu::TextureFormat,
    ) -> FlowResult<Self> {
        let program = KernelProgram::load(ctx, loader, Kernel::Present, surface_format)?;
        let params = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Present Params"),
            size: std::mem::size_of::<PresentParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(Self {
            program,
            params,
            quad: Mesh::screen_quad(&ctx.device),
        })
    }

    /// Record the blit of `dye`'s current buffer into `target`.
    ///
    /// The grid is stretched to `surface_size`, so a grid that lags one
    /// resize behind the surface still covers the whole window.
    pub fn encode(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        dye: &Field,
        surface_size: (u32, u32),
    ) {
        let (grid_w, grid_h) = dye.size();
        let params = PresentParams {
            grid: [grid_w as f32, grid_h as f32],
            surface: [surface_size.0 as f32, surface_size.1 as f32],
        };
        ctx.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

        let bind_group = self.program.bind(&ctx.device, &self.params, &[dye.input()]);

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Present Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.program.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        self.quad.draw(&mut pass);
    }
}
