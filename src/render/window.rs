//! Windowed preview: `winit` window, `wgpu` swapchain, host-paced redraws.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use wgpu::{self, SurfaceError};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

use crate::error::FrameError;
use crate::events::ControlCommand;
use crate::frame::{
    CommandSubmitter, Completion, Drawable, FrameBudget, FrameScheduler, FrameStats, PixelFormat,
    PreparedFrame, PresentationSurface, SurfaceInfo,
};
use crate::params::Controls;
use crate::processing::develop::{DevelopFilter, DevelopedImage};
use crate::processing::fit::Rounding;
use crate::render::compose::compose;
use crate::tasks::controls::apply_command;

/// How often the poller thread lets wgpu fire completion callbacks.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Swapchain formats the compositor can write directly.
pub fn pick_surface_format(
    formats: &[wgpu::TextureFormat],
) -> Option<(wgpu::TextureFormat, PixelFormat)> {
    formats.iter().copied().find_map(|format| match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {
            Some((format, PixelFormat::Rgba8))
        }
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
            Some((format, PixelFormat::Bgra8))
        }
        _ => None,
    })
}

/// Keeps `device.poll` running so `on_submitted_work_done` callbacks fire
/// even while the frame loop is blocked waiting for a slot.
struct DevicePoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DevicePoller {
    fn for_device(device: wgpu::Device) -> Result<Self> {
        Self::spawn(move || {
            if let Err(err) = device.poll(wgpu::PollType::Poll) {
                warn!(error = %err, "device poll failed");
            }
        })
    }

    /// Runs `poll` every [`POLL_INTERVAL`] until dropped.
    fn spawn(mut poll: impl FnMut() + Send + 'static) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("wgpu-poll".into())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        poll();
                        thread::sleep(POLL_INTERVAL);
                    }
                })
                .context("failed to spawn device poll thread")?
        };
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for DevicePoller {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("device poll thread panicked");
            }
        }
    }
}

pub struct WindowDrawable {
    texture: wgpu::SurfaceTexture,
    info: SurfaceInfo,
}

impl Drawable for WindowDrawable {
    fn info(&self) -> SurfaceInfo {
        self.info
    }
}

pub struct WindowPresenter {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    format: PixelFormat,
    minimized: bool,
    _poller: DevicePoller,
}

impl WindowPresenter {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        let (texture_format, format) = pick_surface_format(&caps.formats)
            .ok_or_else(|| anyhow!("surface offers no 8-bit RGBA/BGRA format"))?;
        if !caps.usages.contains(wgpu::TextureUsages::COPY_DST) {
            bail!("surface textures cannot be written directly (no COPY_DST usage)");
        }

        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("raw-preview-device"),
            required_limits: limits,
            ..Default::default()
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format: texture_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "preview surface configured",
        );

        let poller = DevicePoller::for_device(device.clone())?;
        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            format,
            minimized: size.width == 0 || size.height == 0,
            _poller: poller,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.minimized = new_size.width == 0 || new_size.height == 0;
        if self.minimized {
            debug!("preview window minimized; frames will be dropped");
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        debug!(
            width = self.config.width,
            height = self.config.height,
            "preview surface resized",
        );
    }
}

impl PresentationSurface for WindowPresenter {
    type Drawable = WindowDrawable;

    fn current_drawable(&mut self) -> Option<WindowDrawable> {
        if self.minimized {
            return None;
        }
        match self.surface.get_current_texture() {
            Ok(texture) => Some(WindowDrawable {
                texture,
                info: SurfaceInfo {
                    width: self.config.width,
                    height: self.config.height,
                    format: self.format,
                },
            }),
            Err(SurfaceError::Outdated) | Err(SurfaceError::Lost) => {
                info!("preview surface lost; reconfiguring");
                let size = self.window.inner_size();
                self.resize(size);
                None
            }
            Err(SurfaceError::Timeout) => {
                debug!("preview surface acquisition timed out");
                None
            }
            Err(err) => {
                warn!(error = %err, "preview surface unavailable");
                None
            }
        }
    }
}

impl CommandSubmitter<PreparedFrame<DevelopedImage, WindowDrawable>> for WindowPresenter {
    fn submit(
        &mut self,
        frame: PreparedFrame<DevelopedImage, WindowDrawable>,
        on_complete: Completion,
    ) -> Result<()> {
        let PreparedFrame {
            index,
            image,
            plan,
            drawable,
        } = frame;
        let composed = compose(image.pixels(), &plan, drawable.info.format)?;
        let target = &drawable.texture.texture;
        let size = target.size();
        if size.width != composed.width || size.height != composed.height {
            bail!(
                "swapchain texture is {}x{}, frame is {}x{}",
                size.width,
                size.height,
                composed.width,
                composed.height
            );
        }

        self.queue.write_texture(
            target.as_image_copy(),
            &composed.bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * composed.width),
                rows_per_image: Some(composed.height),
            },
            wgpu::Extent3d {
                width: composed.width,
                height: composed.height,
                depth_or_array_layers: 1,
            },
        );
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("raw-preview-encoder"),
            });
        self.queue.submit(std::iter::once(encoder.finish()));
        self.queue.on_submitted_work_done(on_complete);
        self.window.pre_present_notify();
        drawable.texture.present();
        trace!(index, "frame presented to window");
        Ok(())
    }
}

#[derive(Debug)]
enum PreviewEvent {
    Cancelled,
}

struct PreviewApp {
    title: String,
    interval: Duration,
    budget: FrameBudget,
    rounding: Rounding,
    max_frames: Option<u64>,
    controls: Option<Controls<DevelopFilter>>,
    scheduler: Option<FrameScheduler<DevelopFilter, WindowPresenter>>,
    commands: mpsc::Receiver<ControlCommand>,
    cancel: CancellationToken,
    next_tick: Instant,
}

impl PreviewApp {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = WindowAttributes::default().with_title(self.title.clone());
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create preview window")?,
        );
        let presenter = WindowPresenter::new(window)?;
        let controls = self
            .controls
            .take()
            .ok_or_else(|| anyhow!("preview controls already consumed"))?;
        self.scheduler = Some(FrameScheduler::new(
            controls,
            presenter,
            self.budget.clone(),
            self.rounding,
        ));
        self.next_tick = Instant::now();
        Ok(())
    }

    fn drain_commands(&mut self, event_loop: &ActiveEventLoop) {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if let Err(err) = apply_command(scheduler.controls_mut(), &command) {
                        warn!(error = %err, "control command rejected");
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.cancel.is_cancelled() {
                        event_loop.exit();
                    }
                    break;
                }
            }
        }
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        self.drain_commands(event_loop);
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        if scheduler.stats().limit_reached(self.max_frames) {
            event_loop.exit();
            return;
        }
        match scheduler.tick_blocking() {
            Ok(outcome) => trace!(?outcome, "tick finished"),
            Err(FrameError::BudgetClosed) => {
                info!("frame budget closed; leaving event loop");
                event_loop.exit();
                return;
            }
            Err(err) => warn!(error = %err, "tick failed"),
        }
        if scheduler.stats().limit_reached(self.max_frames) {
            info!(frames = ?self.max_frames, "requested frame count presented");
            event_loop.exit();
        }
    }
}

impl ApplicationHandler<PreviewEvent> for PreviewApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }
        if self.scheduler.is_none() {
            if let Err(err) = self.init(event_loop) {
                error!(error = ?err, "failed to initialize preview window");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        if scheduler.presenter().window().id() != window_id {
            return;
        }
        match event {
            WindowEvent::CloseRequested => {
                info!("preview window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                scheduler.presenter_mut().resize(new_size);
            }
            WindowEvent::RedrawRequested => self.draw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(scheduler) = self.scheduler.as_ref() else {
            return;
        };
        let now = Instant::now();
        if now >= self.next_tick {
            scheduler.presenter().window().request_redraw();
            self.next_tick = now + self.interval;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_tick));
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: PreviewEvent) {
        match event {
            PreviewEvent::Cancelled => {
                info!("preview received cancellation");
                event_loop.exit();
            }
        }
    }
}

/// Settings for [`run_windowed`].
#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub title: String,
    pub interval: Duration,
    pub rounding: Rounding,
    pub max_frames: Option<u64>,
}

/// Runs the preview window on the calling (main) thread until it is closed,
/// `cancel` fires, or `max_frames` frames have been presented.
pub fn run_windowed(
    controls: Controls<DevelopFilter>,
    budget: FrameBudget,
    options: WindowOptions,
    commands: mpsc::Receiver<ControlCommand>,
    cancel: CancellationToken,
) -> Result<FrameStats> {
    let event_loop = EventLoop::<PreviewEvent>::with_user_event()
        .build()
        .context("failed to build preview event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(PreviewEvent::Cancelled);
        })
    };

    let mut app = PreviewApp {
        title: options.title,
        interval: options.interval,
        budget: budget.clone(),
        rounding: options.rounding,
        max_frames: options.max_frames,
        controls: Some(controls),
        scheduler: None,
        commands,
        cancel,
        next_tick: Instant::now(),
    };
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();
    budget.close();

    let stats = app
        .scheduler
        .as_ref()
        .map(|scheduler| scheduler.stats())
        .unwrap_or_default();
    run_result.context("preview event loop failed")?;
    Ok(stats)
}
