// =============================================================================
// FRAME PRESENTER DEMO
// =============================================================================
//
// Opens a window and presents frames through `FrameSession`. Every frame
// records one render pass that clears color and depth, which is enough to
// exercise acquire, pacing, presentation and chain rebuilds on resize,
// minimize and fullscreen toggles.
//
// KEYS:
//   F11 - toggle fullscreen
//   ESC - quit
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use frame_presenter::config::Config;
use frame_presenter::{ChainIdAllocator, FrameSession, OutputSurface, VulkanDevice};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

/// How long to sleep between size checks while the window has no area
const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(16);

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    init_logging();

    let config = Config::load();
    log::info!("Starting frame presenter");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!(
        "Present mode: {}, {} frames in flight",
        config.graphics.present_mode,
        config.frames_in_flight()
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// WINDOW SURFACE
// =============================================================================

/// The winit window as seen by the presentation engine
struct WinitSurface {
    window: Arc<Window>,
    resized: bool,
}

impl WinitSurface {
    fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            resized: false,
        }
    }

    fn mark_resized(&mut self) {
        self.resized = true;
    }
}

impl OutputSurface for WinitSurface {
    fn drawable_extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    // Called from inside the event loop, so events cannot be pumped here.
    // The size is re-queried from the window system after each sleep. On
    // Wayland `inner_size` only changes once events are dispatched, so a
    // window created minimized would spin here. `begin_frame` returns early
    // for a zero-area window and never gets here in steady state.
    fn wait_events(&mut self) {
        std::thread::sleep(MINIMIZED_POLL_INTERVAL);
    }

    fn was_resized(&self) -> bool {
        self.resized
    }

    fn reset_resized(&mut self) {
        self.resized = false;
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the session (and with it the device and
/// surface) must go before the window.
struct App {
    session: Option<FrameSession<VulkanDevice, WinitSurface>>,
    window: Option<Arc<Window>>,

    config: Config,
    is_fullscreen: bool,
    is_minimized: bool,
    fatal: Option<anyhow::Error>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            session: None,
            window: None,
            config,
            is_fullscreen,
            is_minimized: false,
            fatal: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let device = VulkanDevice::new(
            &self.config.window.title,
            self.config.debug.validation_layers,
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
        )?;

        let session = FrameSession::new(
            device,
            WinitSurface::new(window),
            self.config.session_settings(),
            ChainIdAllocator::new(),
        )
        .context("Failed to create frame session")?;

        log::info!(
            "Presenting {}x{} ({:?})",
            session.extent().width,
            session.extent().height,
            session.chain().present_mode()
        );
        self.session = Some(session);
        Ok(())
    }

    /// Returns whether a frame was presented.
    fn render_frame(&mut self) -> Result<bool> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };

        let Some(cmd) = session.begin_frame()? else {
            return Ok(false);
        };
        // Clearing is done by the render pass itself
        session.begin_render_pass(cmd);
        session.end_render_pass(cmd);
        session.end_frame()?;

        Ok(true)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Fatal error: {:#}", error);
        self.fatal = Some(error);
        event_loop.exit();
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            if let Some(session) = self.session.as_mut() {
                session.surface_mut().mark_resized();
            }
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    mode
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::anyhow!("Failed to create window: {}", e));
                return;
            }
        };

        self.window = Some(window.clone());

        if let Err(e) = self.init_vulkan(window) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref session) = self.session {
                    if let Err(e) = session.wait_idle() {
                        log::warn!("wait_idle failed: {}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                self.is_minimized = size.width == 0 || size.height == 0;
                if let Some(session) = self.session.as_mut() {
                    session.surface_mut().mark_resized();
                }
            }

            WindowEvent::RedrawRequested => {
                if self.is_minimized {
                    return;
                }
                match self.render_frame() {
                    Ok(true) => self.update_fps(),
                    Ok(false) => {}
                    Err(e) => self.fail(event_loop, e),
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // Session waits for the GPU, then releases chain, slots and device
        self.session.take();
    }
}
