//! The stable-fluids pass sequence.
//!
//! `FluidPipeline` owns one `Field` per quantity and records, every tick:
//!
//! 1. advection of velocity by itself
//! 2. implicit viscous diffusion (Jacobi)
//! 3. the pointer force splat
//! 4. the pressure Poisson solve (Jacobi, warm-started)
//! 5. projection of velocity onto its divergence-free part
//! 6. wall conditions on velocity, then on pressure
//! 7. advection of dye
//!
//! Presentation is recorded separately by [`crate::gpu::present::Presenter`].
//! Every pass writes the staging buffer of exactly one field and swaps it
//! afterwards. All passes of a tick go into one command encoder, so each pass
//! slot has its own uniform buffer.

use crate::config::{ResizePolicy, SimConfig};
use crate::error::FlowResult;
use crate::gpu::field::{Field, FieldKind, FieldSnapshot, FieldTexture};
use crate::gpu::geometry::Mesh;
use crate::gpu::kernels::{KernelProgram, KernelSet, ShaderLoader};
use crate::gpu::params::{KernelParams, SeedParams, MODE_PRESSURE, MODE_VELOCITY};
use crate::gpu::GpuContext;
use crate::input::PointerForce;

const PASS_SLOTS: usize = 8;

/// Uniform slot per pass recorded in a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassSlot {
    Advect,
    Diffuse,
    Force,
    Pressure,
    Project,
    BoundaryVelocity,
    BoundaryPressure,
    AdvectDye,
}

impl PassSlot {
    pub const ALL: [PassSlot; PASS_SLOTS] = [
        PassSlot::Advect,
        PassSlot::Diffuse,
        PassSlot::Force,
        PassSlot::Pressure,
        PassSlot::Project,
        PassSlot::BoundaryVelocity,
        PassSlot::BoundaryPressure,
        PassSlot::AdvectDye,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Uniform contents for `slot` on a `width` x `height` grid.
pub fn pass_params(
    config: &SimConfig,
    slot: PassSlot,
    width: u32,
    height: u32,
    force: &PointerForce,
) -> KernelParams {
    let base = KernelParams::grid(width, height).with_step(config.time_step);
    let policy = config.wall_policy.selector();
    match slot {
        PassSlot::Advect | PassSlot::Pressure | PassSlot::Project => base,
        PassSlot::Diffuse => base.with_viscosity(config.viscosity),
        PassSlot::Force => base.with_force(
            force.origin,
            force.impulse(config.force_scale, config.time_step),
            config.force_radius,
        ),
        PassSlot::BoundaryVelocity => base.with_boundary(MODE_VELOCITY, policy),
        PassSlot::BoundaryPressure => base.with_boundary(MODE_PRESSURE, policy),
        PassSlot::AdvectDye => base.with_dissipation(config.dye_dissipation),
    }
}

/// Draw the full-screen quad with `program` into `output`.
fn encode_pass(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    quad: &Mesh,
    program: &KernelProgram,
    params: &wgpu::Buffer,
    inputs: &[&wgpu::TextureView],
    output: &wgpu::TextureView,
) {
    let bind_group = program.bind(device, params, inputs);
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(program.kernel.name()),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: output,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_pipeline(&program.pipeline);
    pass.set_bind_group(0, &bind_group, &[]);
    quad.draw(&mut pass);
}

/// Velocity, pressure and dye on one grid.
struct Grid {
    width: u32,
    height: u32,
    velocity: Field,
    pressure: Field,
    dye: Field,
    /// Velocity before diffusion, the right-hand side of every Jacobi step.
    rhs: FieldTexture,
    seed_mesh: Mesh,
}

impl Grid {
    fn allocate(ctx: &GpuContext, config: &SimConfig, width: u32, height: u32) -> FlowResult<Self> {
        let velocity = Field::allocate(ctx, FieldKind::Velocity, width, height)?;
        let pressure = Field::allocate(ctx, FieldKind::Pressure, width, height)?;
        let dye = Field::allocate(ctx, FieldKind::Dye, width, height)?;
        let rhs = FieldTexture::new(&ctx.device, "diffusion rhs", width, height);
        let seed_mesh = Mesh::seed_triangle(&ctx.device, width, height, config.seed_size);
        Ok(Self {
            width,
            height,
            velocity,
            pressure,
            dye,
            rhs,
            seed_mesh,
        })
    }
}

pub struct FluidPipeline {
    config: SimConfig,
    kernels: KernelSet,
    quad: Mesh,
    uniforms: [wgpu::Buffer; PASS_SLOTS],
    seed_params: wgpu::Buffer,
    grid: Grid,
    ticks: u64,
}

impl FluidPipeline {
    /// Compile every kernel, allocate the fields and seed initial conditions.
    pub fn new(ctx: &GpuContext, config: SimConfig, width: u32, height: u32) -> FlowResult<Self> {
        config.validate()?;

        let loader = ShaderLoader::new(config.shader_dir.clone());
        let kernels = KernelSet::load(ctx, &loader)?;
        let quad = Mesh::screen_quad(&ctx.device);

        let uniforms = std::array::from_fn(|i| {
            ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{:?} Params", PassSlot::ALL[i])),
                size: std::mem::size_of::<KernelParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let seed_params = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Seed Params"),
            size: std::mem::size_of::<SeedParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let grid = Grid::allocate(ctx, &config, width, height)?;

        let pipeline = Self {
            config,
            kernels,
            quad,
            uniforms,
            seed_params,
            grid,
            ticks: 0,
        };
        pipeline.reset(ctx);
        log::info!("fluid pipeline ready at {}x{}", width, height);
        Ok(pipeline)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        (self.grid.width, self.grid.height)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn field(&self, kind: FieldKind) -> &Field {
        match kind {
            FieldKind::Velocity => &self.grid.velocity,
            FieldKind::Pressure => &self.grid.pressure,
            FieldKind::Dye => &self.grid.dye,
        }
    }

    pub fn velocity(&self) -> &Field {
        &self.grid.velocity
    }

    pub fn pressure(&self) -> &Field {
        &self.grid.pressure
    }

    pub fn dye(&self) -> &Field {
        &self.grid.dye
    }

    fn write_params(&self, queue: &wgpu::Queue, slot: PassSlot, force: &PointerForce) {
        let params = pass_params(&self.config, slot, self.grid.width, self.grid.height, force);
        queue.write_buffer(&self.uniforms[slot.index()], 0, bytemuck::bytes_of(&params));
    }

    fn uniform(&self, slot: PassSlot) -> &wgpu::Buffer {
        &self.uniforms[slot.index()]
    }

    pub fn encode_advection(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder) {
        self.write_params(&ctx.queue, PassSlot::Advect, &PointerForce::NONE);
        let velocity = &self.grid.velocity;
        encode_pass(
            &ctx.device,
            encoder,
            &self.quad,
            &self.kernels.advect,
            self.uniform(PassSlot::Advect),
            &[velocity.input()],
            velocity.output(),
        );
        self.grid.velocity.swap();
    }

    /// Jacobi diffusion. Every iteration swaps velocity so the iterations
    /// compound instead of all reading the same input.
    pub fn encode_diffusion(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder) {
        self.write_params(&ctx.queue, PassSlot::Diffuse, &PointerForce::NONE);
        encoder.copy_texture_to_texture(
            self.grid.velocity.current_texture().as_image_copy(),
            self.grid.rhs.texture.as_image_copy(),
            wgpu::Extent3d {
                width: self.grid.width,
                height: self.grid.height,
                depth_or_array_layers: 1,
            },
        );
        for _ in 0..self.config.diffusion_iterations {
            let velocity = &self.grid.velocity;
            encode_pass(
                &ctx.device,
                encoder,
                &self.quad,
                &self.kernels.diffuse,
                self.uniform(PassSlot::Diffuse),
                &[&self.grid.rhs.view, velocity.input()],
                velocity.output(),
            );
            self.grid.velocity.swap();
        }
    }

    pub fn encode_force(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        force: &PointerForce,
    ) {
        self.write_params(&ctx.queue, PassSlot::Force, force);
        let velocity = &self.grid.velocity;
        encode_pass(
            &ctx.device,
            encoder,
            &self.quad,
            &self.kernels.force,
            self.uniform(PassSlot::Force),
            &[velocity.input()],
            velocity.output(),
        );
        self.grid.velocity.swap();
    }

    /// Jacobi pressure solve. Pressure swaps after every iteration so the
    /// iterations compound instead of all reading the same input.
    pub fn encode_pressure_solve(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder) {
        self.write_params(&ctx.queue, PassSlot::Pressure, &PointerForce::NONE);
        for _ in 0..self.config.pressure_iterations {
            let pressure = &self.grid.pressure;
            encode_pass(
                &ctx.device,
                encoder,
                &self.quad,
                &self.kernels.pressure,
                self.uniform(PassSlot::Pressure),
                &[pressure.input(), self.grid.velocity.input()],
                pressure.output(),
            );
            self.grid.pressure.swap();
        }
    }

    pub fn encode_projection(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder) {
        self.write_params(&ctx.queue, PassSlot::Project, &PointerForce::NONE);
        let velocity = &self.grid.velocity;
        encode_pass(
            &ctx.device,
            encoder,
            &self.quad,
            &self.kernels.project,
            self.uniform(PassSlot::Project),
            &[self.grid.pressure.input(), velocity.input()],
            velocity.output(),
        );
        self.grid.velocity.swap();
    }

    /// Wall conditions: velocity first, then pressure.
    pub fn encode_boundaries(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder) {
        self.write_params(&ctx.queue, PassSlot::BoundaryVelocity, &PointerForce::NONE);
        self.write_params(&ctx.queue, PassSlot::BoundaryPressure, &PointerForce::NONE);

        let velocity = &self.grid.velocity;
        encode_pass(
            &ctx.device,
            encoder,
            &self.quad,
            &self.kernels.boundary,
            self.uniform(PassSlot::BoundaryVelocity),
            &[velocity.input()],
            velocity.output(),
        );
        self.grid.velocity.swap();

        let pressure = &self.grid.pressure;
        encode_pass(
            &ctx.device,
            encoder,
            &self.quad,
            &self.kernels.boundary,
            self.uniform(PassSlot::BoundaryPressure),
            &[pressure.input()],
            pressure.output(),
        );
        self.grid.pressure.swap();
    }

    pub fn encode_dye_advection(&mut self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder) {
        self.write_params(&ctx.queue, PassSlot::AdvectDye, &PointerForce::NONE);
        let dye = &self.grid.dye;
        encode_pass(
            &ctx.device,
            encoder,
            &self.quad,
            &self.kernels.advect_dye,
            self.uniform(PassSlot::AdvectDye),
            &[self.grid.velocity.input(), dye.input()],
            dye.output(),
        );
        self.grid.dye.swap();
    }

    /// Record one full simulation step into `encoder`.
    pub fn encode_tick(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        force: &PointerForce,
    ) {
        log::trace!(
            "tick {}: force {:?} at {:?}",
            self.ticks,
            force.delta,
            force.origin
        );
        self.encode_advection(ctx, encoder);
        self.encode_diffusion(ctx, encoder);
        self.encode_force(ctx, encoder, force);
        self.encode_pressure_solve(ctx, encoder);
        self.encode_projection(ctx, encoder);
        self.encode_boundaries(ctx, encoder);
        self.encode_dye_advection(ctx, encoder);
        self.ticks += 1;
    }

    /// Record and submit one step on its own.
    pub fn tick(&mut self, ctx: &GpuContext, force: &PointerForce) {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Tick Encoder"),
            });
        self.encode_tick(ctx, &mut encoder, force);
        ctx.queue.submit(Some(encoder.finish()));
    }

    /// Reseed every field from its initial condition.
    pub fn reset(&self, ctx: &GpuContext) {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Seed Encoder"),
            });
        self.encode_initial_values(&mut encoder);
        self.encode_seed(ctx, &mut encoder);
        ctx.queue.submit(Some(encoder.finish()));
        log::debug!("seeded fields at {}x{}", self.grid.width, self.grid.height);
    }

    fn encode_initial_values(&self, encoder: &mut wgpu::CommandEncoder) {
        let grid = &self.grid;
        grid.velocity.clear(encoder, self.config.wgpu_initial_velocity());
        grid.pressure.clear(encoder, wgpu::Color::TRANSPARENT);
        grid.dye.clear(encoder, self.config.wgpu_background());
    }

    /// Stamp the seed triangle into both dye buffers.
    fn encode_seed(&self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder) {
        if self.config.seed_size <= 0.0 {
            return;
        }
        let params = SeedParams {
            color: self.config.dye_seed_color,
        };
        ctx.queue
            .write_buffer(&self.seed_params, 0, bytemuck::bytes_of(&params));
        let bind_group = self.kernels.seed.bind(&ctx.device, &self.seed_params, &[]);

        for view in self.grid.dye.views() {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Seed Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.kernels.seed.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            self.grid.seed_mesh.draw(&mut pass);
        }
    }

    /// Move every field to a `width` x `height` grid according to the
    /// configured resize policy.
    ///
    /// Zero-area sizes (a minimized window) are ignored and the current grid
    /// is kept. Resizing to the current size does nothing.
    pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) -> FlowResult<()> {
        if width == 0 || height == 0 {
            log::debug!("ignoring zero-area resize to {}x{}", width, height);
            return Ok(());
        }
        if (width, height) == self.size() {
            return Ok(());
        }

        let next = Grid::allocate(ctx, &self.config, width, height)?;
        let previous = std::mem::replace(&mut self.grid, next);

        match self.config.resize_policy {
            ResizePolicy::Reset => self.reset(ctx),
            ResizePolicy::Preserve => {
                let mut encoder = ctx
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("Resize Encoder"),
                    });
                self.encode_initial_values(&mut encoder);
                self.grid
                    .velocity
                    .copy_overlap_from(&mut encoder, &previous.velocity);
                self.grid
                    .pressure
                    .copy_overlap_from(&mut encoder, &previous.pressure);
                self.grid.dye.copy_overlap_from(&mut encoder, &previous.dye);
                ctx.queue.submit(Some(encoder.finish()));
            }
        }

        log::debug!(
            "resized grid {}x{} -> {}x{} ({:?})",
            previous.width,
            previous.height,
            width,
            height,
            self.config.resize_policy
        );
        Ok(())
    }

    /// Blocking copy of `kind`'s current buffer.
    pub fn read_field(&self, ctx: &GpuContext, kind: FieldKind) -> FlowResult<FieldSnapshot> {
        self.field(kind).read(ctx)
    }

    /// Overwrite `kind`'s current buffer, rows top to bottom.
    pub fn upload_field(&self, ctx: &GpuContext, kind: FieldKind, cells: &[[f32; 4]]) -> FlowResult<()> {
        self.field(kind).upload(&ctx.queue, cells)
    }
}
