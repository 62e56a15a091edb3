//! Error types for startup, GPU resources and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can stop the visualization from starting (or, for readback,
/// from returning field data).
#[derive(Debug, Error)]
pub enum FlowError {
    /// No adapter could drive the requested surface (or any adapter at all).
    #[error("failed to find a GPU adapter")]
    AdapterNotFound,

    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("failed to create window surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    /// The surface reports no usable texture format for this adapter.
    #[error("window surface is not supported by the selected adapter")]
    SurfaceUnsupported,

    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    /// Kernel source could not be read from the shader directory.
    #[error("failed to read kernel source {path:?}: {source}")]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Shader module or render pipeline creation failed validation.
    #[error("kernel `{kernel}` failed to compile: {message}")]
    KernelCompile { kernel: &'static str, message: String },

    /// A field render target could not be created.
    #[error("render target for `{field}` is incomplete: {message}")]
    RenderTarget { field: &'static str, message: String },

    #[error("invalid grid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("buffer map failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    /// The device was lost earlier; no further readback is possible.
    #[error("GPU device lost")]
    DeviceLost,

    /// The map callback was dropped without reporting, usually a lost device.
    #[error("buffer map channel disconnected")]
    ChannelDisconnected,

    #[error("surface frame unavailable: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to access config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result type used throughout the crate.
pub type FlowResult<T> = Result<T, FlowError>;
