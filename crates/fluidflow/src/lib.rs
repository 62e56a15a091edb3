//! Interactive stable-fluids dye visualization on the GPU.
//!
//! Velocity, pressure and dye live in double-buffered float textures
//! ([`gpu::field::Field`]). Every frame [`pipeline::FluidPipeline`] records
//! advection, diffusion, the pointer force, the pressure solve, projection,
//! wall conditions and dye advection as a fixed sequence of full-screen
//! render passes, then the dye is blitted to the window.

pub mod app;
pub mod config;
pub mod error;
pub mod gpu;
pub mod input;
pub mod pipeline;

pub use app::run;
pub use config::{ResizePolicy, SimConfig, WallPolicy};
pub use error::{FlowError, FlowResult};
pub use gpu::field::{Field, FieldKind, FieldSnapshot};
pub use gpu::GpuContext;
pub use input::{PointerForce, PointerSampler};
pub use pipeline::FluidPipeline;
