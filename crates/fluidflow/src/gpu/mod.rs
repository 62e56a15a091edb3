pub mod field;
pub mod geometry;
pub mod kernels;
pub mod params;
pub mod present;
pub mod readback;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use wgpu::SurfaceTarget;
use winit::window::Window;

use crate::error::{FlowError, FlowResult};

/// Wait for a buffer map operation to complete, returning Result instead of panicking.
///
/// `lost` is the owning context's device-lost flag. A map callback that is
/// dropped without reporting marks the device lost.
pub fn await_buffer_map(
    rx: std::sync::mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
    lost: &AtomicBool,
) -> FlowResult<()> {
    if lost.load(Ordering::SeqCst) {
        return Err(FlowError::DeviceLost);
    }
    match rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::error!("Buffer map failed: {:?}", e);
            Err(FlowError::BufferMap(e))
        }
        Err(_) => {
            log::error!("Buffer map channel disconnected - possible device lost");
            lost.store(true, Ordering::SeqCst);
            Err(FlowError::ChannelDisconnected)
        }
    }
}

/// Device and queue shared by the pipeline, the presenter and readback.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: wgpu::AdapterInfo,
    /// Set by the device's error and lost callbacks. Owned per context so
    /// that independent devices never see each other's failures.
    device_lost: Arc<AtomicBool>,
}

/// Window surface plus its current configuration.
pub struct WindowSurface {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Context with no surface, for tests and offline runs.
    pub fn headless() -> FlowResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(FlowError::AdapterNotFound)?;

        Self::from_adapter(&adapter)
    }

    /// Context able to present to `window`.
    pub fn for_window(window: Arc<Window>) -> FlowResult<(Self, WindowSurface)> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(SurfaceTarget::from(window))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or(FlowError::AdapterNotFound)?;

        let ctx = Self::from_adapter(&adapter)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(FlowError::SurfaceUnsupported)?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &config);

        Ok((ctx, WindowSurface { surface, config }))
    }

    fn from_adapter(adapter: &wgpu::Adapter) -> FlowResult<Self> {
        let adapter_info = adapter.get_info();
        log::info!("Using GPU: {:?}", adapter_info);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("FluidFlow Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))?;

        let device_lost = Arc::new(AtomicBool::new(false));

        let flag = device_lost.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("GPU uncaptured error: {:?}", error);
            if matches!(error, wgpu::Error::OutOfMemory { .. }) {
                flag.store(true, Ordering::SeqCst);
            }
        }));

        let flag = device_lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            log::error!("GPU device lost ({:?}): {}", reason, message);
            flag.store(true, Ordering::SeqCst);
        });

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            device_lost,
        })
    }

    /// Whether this context's device has been lost.
    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::SeqCst)
    }

    /// Flag this context's device as lost.
    pub fn mark_device_lost(&self) {
        self.device_lost.store(true, Ordering::SeqCst);
    }

    pub(crate) fn device_lost_flag(&self) -> &AtomicBool {
        &self.device_lost
    }

    /// Largest grid edge this device can allocate.
    pub fn max_grid_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

impl WindowSurface {
    pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&ctx.device, &self.config);
        }
    }

    /// Next frame to render into.
    pub fn acquire(&self) -> Result<wgpu::SurfaceTexture, wgpu::SurfaceError> {
        self.surface.get_current_texture()
    }

    /// Re-apply the current configuration after the surface was lost.
    pub fn reconfigure(&self, ctx: &GpuContext) {
        self.surface.configure(&ctx.device, &self.config);
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn map_fails_fast_once_device_is_lost() {
        let lost = AtomicBool::new(true);
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(())).unwrap();
        assert!(matches!(await_buffer_map(rx, &lost), Err(FlowError::DeviceLost)));
    }

    #[test]
    fn dropped_callback_marks_only_its_own_flag() {
        let lost = AtomicBool::new(false);
        let other = AtomicBool::new(false);

        let (tx, rx) = mpsc::channel::<Result<(), wgpu::BufferAsyncError>>();
        drop(tx);
        assert!(matches!(
            await_buffer_map(rx, &lost),
            Err(FlowError::ChannelDisconnected)
        ));
        assert!(lost.load(Ordering::SeqCst));
        assert!(!other.load(Ordering::SeqCst));

        let (tx, rx) = mpsc::channel();
        tx.send(Ok(())).unwrap();
        assert!(await_buffer_map(rx, &other).is_ok());
    }
}
