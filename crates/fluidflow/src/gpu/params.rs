//! Uniform blocks uploaded to the kernels.
//!
//! These are `#[repr(C)]` mirrors of the WGSL structs in `shaders/`. The
//! layout tests at the bottom parse the shaders with naga and compare sizes
//! and member offsets, so a field added on one side only fails loudly.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Boundary kernel operates on the velocity field.
pub const MODE_VELOCITY: u32 = 1;
/// Boundary kernel operates on the pressure field.
pub const MODE_PRESSURE: u32 = 0;

/// Parameters shared by every grid kernel (48 bytes).
///
/// Kernels read only the members they need; the rest stay zero. Grid size is
/// passed as floats because every kernel works in continuous cell
/// coordinates.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    pub grid: [f32; 2],
    pub dt: f32,
    pub viscosity: f32,
    /// Impulse velocity (cells/s, y up) at the splat center.
    pub force: [f32; 2],
    /// Splat center in cells, y down.
    pub origin: [f32; 2],
    pub radius: f32,
    pub dissipation: f32,
    /// `MODE_VELOCITY` or `MODE_PRESSURE`.
    pub mode: u32,
    /// `WallPolicy::selector`.
    pub policy: u32,
}

impl KernelParams {
    pub fn grid(width: u32, height: u32) -> Self {
        Self {
            grid: [width as f32, height as f32],
            ..Self::default()
        }
    }

    pub fn with_step(mut self, dt: f32) -> Self {
        self.dt = dt;
        self
    }

    pub fn with_viscosity(mut self, viscosity: f32) -> Self {
        self.viscosity = viscosity;
        self
    }

    pub fn with_force(mut self, origin: Vec2, force: Vec2, radius: f32) -> Self {
        self.origin = origin.to_array();
        self.force = force.to_array();
        self.radius = radius;
        self
    }

    pub fn with_dissipation(mut self, dissipation: f32) -> Self {
        self.dissipation = dissipation;
        self
    }

    pub fn with_boundary(mut self, mode: u32, policy: u32) -> Self {
        self.mode = mode;
        self.policy = policy;
        self
    }
}

/// Color of the seed triangle (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SeedParams {
    pub color: [f32; 4],
}

/// Grid and surface sizes for the presentation blit (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct PresentParams {
    pub grid: [f32; 2],
    pub surface: [f32; 2],
}
