//! Named kernel programs and the render pipelines built from them.
//!
//! Each kernel is a WGSL module evaluated once per grid cell by drawing the
//! full-screen quad into a field's staging buffer. Grid kernels share the
//! `common.wgsl` prelude (uniform layout, vertex stage, sampling helpers);
//! `seed` and `present` are standalone.

use std::path::PathBuf;

use super::geometry::{ScreenVertex, SeedVertex};
use super::GpuContext;
use crate::error::{FlowError, FlowResult};

/// Texture format of every field buffer.
pub const FIELD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

const COMMON_SOURCE: &str = include_str!("shaders/common.wgsl");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    Advect,
    Diffuse,
    Force,
    Pressure,
    Project,
    Boundary,
    AdvectDye,
    Seed,
    Present,
}

impl Kernel {
    /// Kernels run by the orchestrator every tick.
    pub const GRID: [Kernel; 7] = [
        Kernel::Advect,
        Kernel::Diffuse,
        Kernel::Force,
        Kernel::Pressure,
        Kernel::Project,
        Kernel::Boundary,
        Kernel::AdvectDye,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Kernel::Advect => "advect",
            Kernel::Diffuse => "diffuse",
            Kernel::Force => "force",
            Kernel::Pressure => "pressure",
            Kernel::Project => "project",
            Kernel::Boundary => "boundary",
            Kernel::AdvectDye => "advect_dye",
            Kernel::Seed => "seed",
            Kernel::Present => "present",
        }
    }

    /// Number of field textures bound after the uniform block.
    pub fn input_count(self) -> usize {
        match self {
            Kernel::Advect | Kernel::Force | Kernel::Boundary | Kernel::Present => 1,
            Kernel::Diffuse | Kernel::Pressure | Kernel::Project | Kernel::AdvectDye => 2,
            Kernel::Seed => 0,
        }
    }

    fn uses_prelude(self) -> bool {
        !matches!(self, Kernel::Seed | Kernel::Present)
    }

    fn embedded_source(self) -> &'static str {
        match self {
            Kernel::Advect => include_str!("shaders/advect.wgsl"),
            Kernel::Diffuse => include_str!("shaders/diffuse.wgsl"),
            Kernel::Force => include_str!("shaders/force.wgsl"),
            Kernel::Pressure => include_str!("shaders/pressure.wgsl"),
            Kernel::Project => include_str!("shaders/project.wgsl"),
            Kernel::Boundary => include_str!("shaders/boundary.wgsl"),
            Kernel::AdvectDye => include_str!("shaders/advect_dye.wgsl"),
            Kernel::Seed => include_str!("shaders/seed.wgsl"),
            Kernel::Present => include_str!("shaders/present.wgsl"),
        }
    }
}

/// Resolves kernel source text, either embedded or from a directory.
#[derive(Clone, Debug, Default)]
pub struct ShaderLoader {
    dir: Option<PathBuf>,
}

impl ShaderLoader {
    pub fn embedded() -> Self {
        Self { dir: None }
    }

    /// Read `<dir>/<kernel>.wgsl` (and `<dir>/common.wgsl`) instead of the
    /// embedded copies.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Complete module source for `kernel`, prelude included.
    pub fn source(&self, kernel: Kernel) -> FlowResult<String> {
        let body = self.read(kernel.name(), kernel.embedded_source())?;
        if kernel.uses_prelude() {
            let prelude = self.read("common", COMMON_SOURCE)?;
            Ok(format!("{prelude}\n{body}"))
        } else {
            Ok(body)
        }
    }

    fn read(&self, name: &str, embedded: &str) -> FlowResult<String> {
        match &self.dir {
            None => Ok(embedded.to_owned()),
            Some(dir) => {
                let path = dir.join(format!("{name}.wgsl"));
                std::fs::read_to_string(&path).map_err(|source| FlowError::ShaderSource { path, source })
            }
        }
    }
}

/// Compile `kernel` into a render pipeline writing `target` texels.
///
/// Shader and pipeline creation run inside a validation error scope so that
/// a broken kernel aborts startup instead of silently rendering garbage.
pub(crate) fn build_pipeline(
    ctx: &GpuContext,
    loader: &ShaderLoader,
    kernel: Kernel,
    layout: &wgpu::BindGroupLayout,
    target: wgpu::TextureFormat,
) -> FlowResult<wgpu::RenderPipeline> {
    let source = loader.source(kernel)?;
    let label = kernel.name();

    ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let pipeline_layout = ctx
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });

    let vertex_layout = match kernel {
        Kernel::Seed => SeedVertex::desc(),
        _ => ScreenVertex::desc(),
    };

    let pipeline = ctx
        .device
        .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

    if let Some(error) = pollster::block_on(ctx.device.pop_error_scope()) {
        return Err(FlowError::KernelCompile {
            kernel: label,
            message: error.to_string(),
        });
    }

    log::debug!("compiled kernel `{}`", label);
    Ok(pipeline)
}

/// Bind group layout: uniform block at binding 0, then `inputs` unfilterable
/// float textures at bindings 1..=inputs.
pub(crate) fn bind_group_layout(
    device: &wgpu::Device,
    label: &str,
    inputs: usize,
) -> wgpu::BindGroupLayout {
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }];
    for i in 0..inputs {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 1 + i as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// A compiled kernel plus the layout its bind groups must follow.
pub struct KernelProgram {
    pub kernel: Kernel,
    pub pipeline: wgpu::RenderPipeline,
    pub layout: wgpu::BindGroupLayout,
}

impl KernelProgram {
    pub fn load(
        ctx: &GpuContext,
        loader: &ShaderLoader,
        kernel: Kernel,
        target: wgpu::TextureFormat,
    ) -> FlowResult<Self> {
        let layout = bind_group_layout(&ctx.device, kernel.name(), kernel.input_count());
        let pipeline = build_pipeline(ctx, loader, kernel, &layout, target)?;
        Ok(Self {
            kernel,
            pipeline,
            layout,
        })
    }

    /// Bind `params` and the input views in binding order.
    pub fn bind(
        &self,
        device: &wgpu::Device,
        params: &wgpu::Buffer,
        inputs: &[&wgpu::TextureView],
    ) -> wgpu::BindGroup {
        debug_assert_eq!(inputs.len(), self.kernel.input_count(), "{}", self.kernel.name());
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: params.as_entire_binding(),
        }];
        for (i, view) in inputs.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.kernel.name()),
            layout: &self.layout,
            entries: &entries,
        })
    }
}

/// Every grid kernel, compiled for the field format.
pub struct KernelSet {
    pub advect: KernelProgram,
    pub diffuse: KernelProgram,
    pub force: KernelProgram,
    pub pressure: KernelProgram,
    pub project: KernelProgram,
    pub boundary: KernelProgram,
    pub advect_dye: KernelProgram,
    pub seed: KernelProgram,
}

impl KernelSet {
    pub fn load(ctx: &GpuContext, loader: &ShaderLoader) -> FlowResult<Self> {
        Ok(Self {
            advect: KernelProgram::load(ctx, loader, Kernel::Advect, FIELD_FORMAT)?,
            diffuse: KernelProgram::load(ctx, loader, Kernel::Diffuse, FIELD_FORMAT)?,
            force: KernelProgram::load(ctx, loader, Kernel::Force, FIELD_FORMAT)?,
            pressure: KernelProgram::load(ctx, loader, Kernel::Pressure, FIELD_FORMAT)?,
            project: KernelProgram::load(ctx, loader, Kernel::Project, FIELD_FORMAT)?,
            boundary: KernelProgram::load(ctx, loader, Kernel::Boundary, FIELD_FORMAT)?,
            advect_dye: KernelProgram::load(ctx, loader, Kernel::AdvectDye, FIELD_FORMAT)?,
            seed: KernelProgram::load(ctx, loader, Kernel::Seed, FIELD_FORMAT)?,
        })
    }
}
