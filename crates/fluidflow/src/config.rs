//! Simulation configuration.
//!
//! Every numerically sensitive constant of the solver lives here instead of
//! in the passes themselves. The defaults reproduce the stock visualization:
//! a 1000x1000 window, 40 Jacobi iterations for both diffusion and pressure,
//! and a fixed 1/60 s step regardless of real frame time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};

/// Wall behavior applied by the boundary pass at the four grid edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallPolicy {
    /// Both velocity components vanish at the wall face.
    NoSlip,
    /// Only the wall-normal component vanishes; tangential flow slides along.
    FreeSlip,
}

impl WallPolicy {
    /// Selector value understood by the boundary kernel.
    pub fn selector(self) -> u32 {
        match self {
            WallPolicy::NoSlip => 0,
            WallPolicy::FreeSlip => 1,
        }
    }
}

/// What happens to field contents when the window (and therefore the grid)
/// changes size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizePolicy {
    /// Reallocate and reseed every field from its initial condition.
    Reset,
    /// Reallocate, then copy the top-left overlap of the old contents.
    Preserve,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,

    /// Fixed nominal step duration in seconds.
    pub time_step: f32,
    /// Kinematic viscosity in cells^2 per second.
    pub viscosity: f32,
    pub diffusion_iterations: u32,
    pub pressure_iterations: u32,

    /// Multiplier applied to pointer displacement before it becomes velocity.
    pub force_scale: f32,
    /// Gaussian radius of the force splat, in cells.
    pub force_radius: f32,
    /// Per-tick dye multiplier, 1.0 keeps dye forever.
    pub dye_dissipation: f32,

    /// Uniform velocity (cells/s, y up) the velocity field starts from.
    pub initial_velocity: [f32; 2],
    pub dye_background: [f32; 4],
    pub dye_seed_color: [f32; 4],
    /// Edge length of the seed triangle in pixels.
    pub seed_size: f32,

    pub wall_policy: WallPolicy,
    pub resize_policy: ResizePolicy,

    /// Directory holding `<kernel>.wgsl` overrides. Embedded kernels are used
    /// when unset.
    pub shader_dir: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            window_title: "FluidFlow".to_owned(),
            window_width: 1000,
            window_height: 1000,
            time_step: 1.0 / 60.0,
            viscosity: 0.01,
            diffusion_iterations: 40,
            pressure_iterations: 40,
            force_scale: 1.0,
            force_radius: 20.0,
            dye_dissipation: 1.0,
            initial_velocity: [0.0, 0.0],
            dye_background: [0.0, 0.0, 0.0, 1.0],
            dye_seed_color: [1.0, 0.55, 0.1, 1.0],
            seed_size: 500.0,
            wall_policy: WallPolicy::NoSlip,
            resize_policy: ResizePolicy::Preserve,
            shader_dir: None,
        }
    }
}

impl SimConfig {
    /// Check that every parameter is usable by the solver.
    pub fn validate(&self) -> FlowResult<()> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(FlowError::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window_width, self.window_height
            )));
        }
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(FlowError::Config(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if !(self.viscosity.is_finite() && self.viscosity >= 0.0) {
            return Err(FlowError::Config(format!(
                "viscosity must be non-negative, got {}",
                self.viscosity
            )));
        }
        if !(self.force_radius.is_finite() && self.force_radius > 0.0) {
            return Err(FlowError::Config(format!(
                "force_radius must be positive, got {}",
                self.force_radius
            )));
        }
        if !self.force_scale.is_finite() {
            return Err(FlowError::Config("force_scale must be finite".to_owned()));
        }
        if !(0.0..=1.0).contains(&self.dye_dissipation) {
            return Err(FlowError::Config(format!(
                "dye_dissipation must be within [0, 1], got {}",
                self.dye_dissipation
            )));
        }
        if !(self.seed_size.is_finite() && self.seed_size >= 0.0) {
            return Err(FlowError::Config(format!(
                "seed_size must be non-negative, got {}",
                self.seed_size
            )));
        }
        Ok(())
    }

    /// Load and validate configuration from a JSON file.
    pub fn load_json(path: &Path) -> FlowResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save_json(&self, path: &Path) -> FlowResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn wgpu_background(&self) -> wgpu::Color {
        to_wgpu_color(self.dye_background)
    }

    pub fn wgpu_initial_velocity(&self) -> wgpu::Color {
        wgpu::Color {
            r: self.initial_velocity[0] as f64,
            g: self.initial_velocity[1] as f64,
            b: 0.0,
            a: 0.0,
        }
    }
}

fn to_wgpu_color(c: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: c[0] as f64,
        g: c[1] as f64,
        b: c[2] as f64,
        a: c[3] as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.diffusion_iterations, 40);
        assert_eq!(config.pressure_iterations, 40);
        assert_eq!(config.initial_velocity, [0.0, 0.0]);
    }

    #[test]
    fn rejects_non_positive_time_step() {
        let config = SimConfig {
            time_step: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FlowError::Config(_))));

        let config = SimConfig {
            time_step: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_amplifying_dissipation() {
        let config = SimConfig {
            dye_dissipation: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{ "pressure_iterations": 80, "wall_policy": "FreeSlip" }"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pressure_iterations, 80);
        assert_eq!(config.wall_policy, WallPolicy::FreeSlip);
        assert_eq!(config.diffusion_iterations, 40);
        assert_eq!(config.resize_policy, ResizePolicy::Preserve);
    }

    #[test]
    fn json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("fluidflow_config_{}.json", std::process::id()));
        let config = SimConfig {
            viscosity: 0.2,
            resize_policy: ResizePolicy::Reset,
            ..Default::default()
        };
        config.save_json(&path).unwrap();
        let loaded = SimConfig::load_json(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn wall_policy_selectors_are_distinct() {
        assert_ne!(WallPolicy::NoSlip.selector(), WallPolicy::FreeSlip.selector());
    }
}
