// Frame session - what the renderer talks to
//
// Usage per tick:
//   if let Some(cmd) = session.begin_frame()? {
//       session.begin_render_pass(cmd);
//       ... draw ...
//       session.end_render_pass(cmd);
//       session.end_frame()?;
//   }
//
// `begin_frame` returning `None` means the chain was rebuilt and this tick
// has no frame. Calling things out of order panics.

use ash::vk;
use std::mem;
use std::sync::Arc;

use crate::backend::{
    ChainPreferences, FrameOutcome, ImageChain, PresentDevice, RenderPassBegin, RenderTarget,
};
use crate::error::{PresentError, PresentResult};
use crate::frame::{FrameSynchronizer, RecreationController};
use crate::id::ChainIdAllocator;
use crate::surface::{is_zero_area, OutputSurface};
use crate::MAX_FRAMES_IN_FLIGHT;

/// Everything a session needs besides the device and the window
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub chain: ChainPreferences,
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            chain: ChainPreferences::default(),
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenFrame {
    image_index: u32,
    command_buffer: vk::CommandBuffer,
    render_passes: u32,
    render_pass_open: bool,
}

#[derive(Debug, Clone, Copy)]
enum SessionState {
    Idle,
    Recording(OpenFrame),
}

pub struct FrameSession<D: PresentDevice, W: OutputSurface> {
    device: Arc<D>,
    synchronizer: FrameSynchronizer<D>,
    controller: RecreationController<D, W>,
    state: SessionState,
    rebuild_pending: bool,
    clear_color: [f32; 4],
    clear_depth: f32,
    frames_presented: u64,
}

impl<D: PresentDevice, W: OutputSurface> FrameSession<D, W> {
    pub fn new(
        device: Arc<D>,
        surface: W,
        settings: SessionSettings,
        ids: ChainIdAllocator,
    ) -> PresentResult<Self> {
        let controller = RecreationController::new(device.clone(), surface, settings.chain, ids)?;
        let mut synchronizer = FrameSynchronizer::new(device.clone(), settings.frames_in_flight)?;
        synchronizer.track_images(controller.chain().image_count());

        log::info!(
            "Frame session ready: {} frames in flight, {} images",
            settings.frames_in_flight,
            controller.chain().image_count()
        );

        Ok(Self {
            device,
            synchronizer,
            controller,
            state: SessionState::Idle,
            rebuild_pending: false,
            clear_color: settings.clear_color,
            clear_depth: settings.clear_depth,
            frames_presented: 0,
        })
    }

    /// Open a frame and return the command buffer to record it into.
    ///
    /// `Ok(None)` means no image was available, either because the chain
    /// had to be rebuilt or because the window has no area; try again next
    /// tick.
    ///
    /// # Panics
    ///
    /// If a frame is already open.
    pub fn begin_frame(&mut self) -> PresentResult<Option<vk::CommandBuffer>> {
        assert!(
            matches!(self.state, SessionState::Idle),
            "begin_frame called while a frame is already in progress"
        );

        if is_zero_area(self.controller.surface().drawable_extent()) {
            // Rebuild once the window has area again, without blocking here
            self.rebuild_pending = true;
            return Ok(None);
        }

        if self.rebuild_pending || self.controller.surface_changed() {
            self.rebuild()?;
        }

        self.synchronizer.begin_slot()?;

        let outcome = self.synchronizer.acquire_image(self.controller.chain())?;
        let (image_index, suboptimal) = match outcome {
            FrameOutcome::Ready(index) => (index, false),
            FrameOutcome::ShouldRebuildAfterUse(index) => (index, true),
            FrameOutcome::MustRebuildNow => {
                log::debug!("Acquire reported out of date, skipping frame");
                self.rebuild()?;
                return Ok(None);
            }
        };
        if suboptimal {
            self.rebuild_pending = true;
        }

        let command_buffer = self.synchronizer.command_buffer();
        self.device
            .begin_command_buffer(command_buffer)
            .map_err(|e| PresentError::from_vk(e, "command buffer recording"))?;

        self.state = SessionState::Recording(OpenFrame {
            image_index,
            command_buffer,
            render_passes: 0,
            render_pass_open: false,
        });

        log::trace!(
            "Frame opened: slot {}, image {}",
            self.synchronizer.frame_index(),
            image_index
        );
        Ok(Some(command_buffer))
    }

    /// Begin the chain's render pass on the acquired image, clearing color
    /// and depth, with viewport and scissor covering the whole extent.
    pub fn begin_render_pass(&mut self, cmd: vk::CommandBuffer) {
        let frame = open_frame(&mut self.state, cmd);
        assert!(
            frame.render_passes == 0,
            "only one render pass can be recorded per frame"
        );

        let chain = self.controller.chain();
        self.device.cmd_begin_render_pass(
            cmd,
            &RenderPassBegin {
                render_pass: chain.render_target().render_pass(),
                framebuffer: chain.framebuffer(frame.image_index),
                extent: chain.extent(),
                clear_color: self.clear_color,
                clear_depth: self.clear_depth,
            },
        );

        frame.render_passes += 1;
        frame.render_pass_open = true;
    }

    pub fn end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        let frame = open_frame(&mut self.state, cmd);
        assert!(frame.render_pass_open, "no render pass is open");
        self.device.cmd_end_render_pass(cmd);
        frame.render_pass_open = false;
    }

    /// Submit and present the open frame.
    ///
    /// A suboptimal or out-of-date presentation, or a resized window, makes
    /// the next `begin_frame` rebuild first.
    ///
    /// # Panics
    ///
    /// If no frame is open, or the frame did not record exactly one
    /// complete render pass.
    pub fn end_frame(&mut self) -> PresentResult<()> {
        let frame = match mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Recording(frame) => frame,
            SessionState::Idle => panic!("end_frame called with no frame in progress"),
        };
        assert!(!frame.render_pass_open, "render pass still open at end of frame");
        assert_eq!(
            frame.render_passes, 1,
            "exactly one render pass must be recorded per frame"
        );

        self.device
            .end_command_buffer(frame.command_buffer)
            .map_err(|e| PresentError::from_vk(e, "command buffer recording"))?;
        self.synchronizer.submit(frame.command_buffer)?;

        let outcome = self
            .synchronizer
            .present_and_advance(self.controller.chain(), frame.image_index)?;
        if outcome.wants_rebuild() || self.controller.surface_changed() {
            log::debug!("Rebuild requested after presenting image {}", frame.image_index);
            self.rebuild_pending = true;
        }

        self.frames_presented += 1;
        Ok(())
    }

    fn rebuild(&mut self) -> PresentResult<()> {
        self.controller.rebuild()?;
        self.synchronizer
            .track_images(self.controller.chain().image_count());
        self.rebuild_pending = false;
        Ok(())
    }

    /// Block until the GPU has finished everything. For shutdown.
    pub fn wait_idle(&self) -> PresentResult<()> {
        self.device
            .wait_idle()
            .map_err(|e| PresentError::from_vk(e, "device idle"))
    }

    pub fn is_frame_in_progress(&self) -> bool {
        matches!(self.state, SessionState::Recording(_))
    }

    /// Command buffer of the open frame
    pub fn command_buffer(&self) -> Option<vk::CommandBuffer> {
        match self.state {
            SessionState::Recording(frame) => Some(frame.command_buffer),
            SessionState::Idle => None,
        }
    }

    /// Acquired image of the open frame
    pub fn image_index(&self) -> Option<u32> {
        match self.state {
            SessionState::Recording(frame) => Some(frame.image_index),
            SessionState::Idle => None,
        }
    }

    /// Current frame slot, in `0..frames_in_flight`
    pub fn frame_index(&self) -> usize {
        self.synchronizer.frame_index()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn render_target(&self) -> &RenderTarget {
        self.controller.chain().render_target()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.controller.chain().aspect_ratio()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.controller.chain().extent()
    }

    pub fn chain(&self) -> &ImageChain<D> {
        self.controller.chain()
    }

    pub fn surface(&self) -> &W {
        self.controller.surface()
    }

    pub fn surface_mut(&mut self) -> &mut W {
        self.controller.surface_mut()
    }
}

impl<D: PresentDevice, W: OutputSurface> Drop for FrameSession<D, W> {
    fn drop(&mut self) {
        // Slots and chain are destroyed after this, nothing may be in flight
        if let Err(e) = self.device.wait_idle() {
            log::warn!("wait_idle failed while dropping frame session: {}", e);
        }
    }
}

/// The open frame, checked against the command buffer the caller records into.
fn open_frame(state: &mut SessionState, cmd: vk::CommandBuffer) -> &mut OpenFrame {
    match state {
        SessionState::Recording(frame) => {
            assert_eq!(
                cmd, frame.command_buffer,
                "command buffer does not belong to the open frame"
            );
            frame
        }
        SessionState::Idle => panic!("no frame in progress"),
    }
}
