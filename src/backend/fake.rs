// Scripted stand-ins for the GPU and the window, used by unit tests.
//
// The fake device hands out unique handles, logs every call and models the
// GPU timeline just enough to catch pacing bugs: a submission stays pending
// until its fence is waited on, waiting on a fence nobody will ever signal
// panics instead of hanging, and recording into an image whose previous
// submission has not completed is counted as a violation.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

use super::{FrameSubmission, PresentDevice, RenderPassBegin, SurfaceSupport, SwapchainDesc};
use crate::surface::OutputSurface;

/// Scripted result of an acquire or present call
#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    Index(u32),
    Suboptimal(u32),
    OutOfDate,
    Error(vk::Result),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateSwapchain { old: vk::SwapchainKHR, extent: vk::Extent2D },
    DestroySwapchain(vk::SwapchainKHR),
    CreateDepthImage(vk::Extent2D),
    DestroyFramebuffer(vk::Framebuffer),
    Acquire { signal: vk::Semaphore, result: Option<u32> },
    Present { image_index: u32, wait: vk::Semaphore },
    WaitForFence(vk::Fence),
    ResetFence(vk::Fence),
    Submit(FrameSubmission),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass { cmd: vk::CommandBuffer, framebuffer: vk::Framebuffer },
    EndRenderPass(vk::CommandBuffer),
    WaitIdle,
}

#[derive(Debug, Default, Clone, Copy)]
struct FenceState {
    signaled: bool,
    /// Serial of the submission that will signal this fence
    pending: Option<u64>,
    last_completed: u64,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    live: HashSet<u64>,
    calls: Vec<Call>,

    surface_formats: Vec<vk::SurfaceFormatKHR>,
    surface_error: Option<vk::Result>,
    zero_extent_queries: usize,
    depth_failure_after: Option<usize>,

    swapchain_images: HashMap<vk::SwapchainKHR, Vec<vk::Image>>,
    next_round_robin: u32,
    acquire_script: VecDeque<Scripted>,
    present_script: VecDeque<Scripted>,
    last_acquired: Option<u32>,

    fences: HashMap<vk::Fence, FenceState>,
    next_serial: u64,
    image_submissions: HashMap<u32, (vk::Fence, u64)>,
    busy_image_recordings: usize,
}

impl State {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.live.insert(self.next_handle);
        self.next_handle
    }

    fn release(&mut self, raw: u64) {
        assert!(self.live.remove(&raw), "handle {raw:#x} destroyed twice or never created");
    }

    fn image_busy(&self, index: u32) -> bool {
        match self.image_submissions.get(&index) {
            Some((fence, serial)) => self.fences[fence].last_completed < *serial,
            None => false,
        }
    }
}

pub struct FakeDevice {
    state: Mutex<State>,
}

impl FakeDevice {
    pub fn new() -> Self {
        let state = State {
            surface_formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn set_surface_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.state.lock().surface_formats = formats;
    }

    pub fn fail_surface_query(&self, error: vk::Result) {
        self.state.lock().surface_error = Some(error);
    }

    /// The next `queries` surface queries report a defined 0x0 extent, as
    /// a surface does while its window is minimized.
    pub fn report_zero_extent(&self, queries: usize) {
        self.state.lock().zero_extent_queries = queries;
    }

    /// The depth image created after `successes` more successful ones fails
    /// with out-of-device-memory, once.
    pub fn fail_depth_image_after(&self, successes: usize) {
        self.state.lock().depth_failure_after = Some(successes);
    }

    pub fn script_acquire(&self, results: impl IntoIterator<Item = Scripted>) {
        self.state.lock().acquire_script.extend(results);
    }

    pub fn script_present(&self, results: impl IntoIterator<Item = Scripted>) {
        self.state.lock().present_script.extend(results);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn live_objects(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_live<H: Handle>(&self, handle: H) -> bool {
        self.state.lock().live.contains(&handle.as_raw())
    }

    pub fn depth_extents(&self) -> Vec<vk::Extent2D> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateDepthImage(extent) => Some(extent),
                _ => None,
            })
            .collect()
    }

    /// Times recording started on an image whose previous submission had
    /// not completed yet
    pub fn busy_image_recordings(&self) -> usize {
        self.state.lock().busy_image_recordings
    }

    pub fn fence_is_signaled(&self, fence: vk::Fence) -> bool {
        self.state.lock().fences[&fence].signaled
    }
}

impl PresentDevice for FakeDevice {
    fn surface_support(&self) -> VkResult<SurfaceSupport> {
        let mut state = self.state.lock();
        if let Some(error) = state.surface_error {
            return Err(error);
        }
        let current_extent = if state.zero_extent_queries > 0 {
            state.zero_extent_queries -= 1;
            vk::Extent2D { width: 0, height: 0 }
        } else {
            vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            }
        };
        Ok(SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent,
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D {
                    width: 16384,
                    height: 16384,
                },
                ..Default::default()
            },
            formats: state.surface_formats.clone(),
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        })
    }

    fn format_properties(&self, _format: vk::Format) -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        let swapchain = vk::SwapchainKHR::from_raw(state.handle());
        let images: Vec<vk::Image> = (0..desc.min_image_count)
            .map(|_| {
                state.next_handle += 1;
                vk::Image::from_raw(state.next_handle)
            })
            .collect();
        state.swapchain_images.insert(swapchain, images);
        state.next_round_robin = 0;
        state.image_submissions.clear();
        state.calls.push(Call::CreateSwapchain {
            old: desc.old_swapchain,
            extent: desc.extent,
        });
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        Ok(self.state.lock().swapchain_images[&swapchain].clone())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        state.release(swapchain.as_raw());
        state.swapchain_images.remove(&swapchain);
        state.calls.push(Call::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state.lock();
        let image_count = state.swapchain_images[&swapchain].len() as u32;
        let result = match state.acquire_script.pop_front() {
            Some(Scripted::Index(i)) => Ok((i, false)),
            Some(Scripted::Suboptimal(i)) => Ok((i, true)),
            Some(Scripted::OutOfDate) => Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
            Some(Scripted::Error(e)) => Err(e),
            None => {
                let i = state.next_round_robin;
                state.next_round_robin = (i + 1) % image_count;
                Ok((i, false))
            }
        };
        let index = result.ok().map(|(i, _)| i);
        state.last_acquired = index;
        state.calls.push(Call::Acquire {
            signal,
            result: index,
        });
        result
    }

    fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut state = self.state.lock();
        state.calls.push(Call::Present { image_index, wait });
        match state.present_script.pop_front() {
            None | Some(Scripted::Index(_)) => Ok(false),
            Some(Scripted::Suboptimal(_)) => Ok(true),
            Some(Scripted::OutOfDate) => Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
            Some(Scripted::Error(e)) => Err(e),
        }
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.state.lock().handle()))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.lock().release(view.as_raw());
    }

    fn create_depth_image(&self, extent: vk::Extent2D, _format: vk::Format) -> VkResult<vk::Image> {
        let mut state = self.state.lock();
        state.calls.push(Call::CreateDepthImage(extent));
        match state.depth_failure_after {
            Some(0) => {
                state.depth_failure_after = None;
                return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            Some(n) => state.depth_failure_after = Some(n - 1),
            None => {}
        }
        Ok(vk::Image::from_raw(state.handle()))
    }

    fn destroy_depth_image(&self, image: vk::Image) {
        self.state.lock().release(image.as_raw());
    }

    fn create_render_pass(
        &self,
        attachments: &[vk::AttachmentDescription],
    ) -> VkResult<vk::RenderPass> {
        assert_eq!(attachments.len(), 2);
        Ok(vk::RenderPass::from_raw(self.state.lock().handle()))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.lock().release(render_pass.as_raw());
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        assert_eq!(attachments.len(), 2, "framebuffer binds color and depth");
        Ok(vk::Framebuffer::from_raw(self.state.lock().handle()))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut state = self.state.lock();
        state.release(framebuffer.as_raw());
        state.calls.push(Call::DestroyFramebuffer(framebuffer));
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.state.lock().handle()))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.lock().release(semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.lock();
        let fence = vk::Fence::from_raw(state.handle());
        state.fences.insert(
            fence,
            FenceState {
                signaled,
                ..Default::default()
            },
        );
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        state.release(fence.as_raw());
        state.fences.remove(&fence);
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::WaitForFence(fence));
        let entry = state.fences.get_mut(&fence).expect("waiting on unknown fence");
        if entry.signaled {
            return Ok(());
        }
        match entry.pending.take() {
            Some(serial) => {
                entry.signaled = true;
                entry.last_completed = serial;
                Ok(())
            }
            None => panic!("deadlock: waiting on fence {fence:?} that no submission will signal"),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::ResetFence(fence));
        let entry = state.fences.get_mut(&fence).expect("resetting unknown fence");
        assert!(entry.pending.is_none(), "fence {fence:?} reset while its submission is pending");
        entry.signaled = false;
        Ok(())
    }

    fn wait_idle(&self) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::WaitIdle);
        for entry in state.fences.values_mut() {
            if let Some(serial) = entry.pending.take() {
                entry.signaled = true;
                entry.last_completed = serial;
            }
        }
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(state.handle()))
            .collect())
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        for cmd in buffers {
            state.release(cmd.as_raw());
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::BeginCommandBuffer(cmd));
        if let Some(index) = state.last_acquired {
            if state.image_busy(index) {
                state.busy_image_recordings += 1;
            }
        }
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.state.lock().calls.push(Call::EndCommandBuffer(cmd));
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.state.lock().calls.push(Call::BeginRenderPass {
            cmd,
            framebuffer: begin.framebuffer,
        });
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.state.lock().calls.push(Call::EndRenderPass(cmd));
    }

    fn queue_submit(&self, submission: &FrameSubmission) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Submit(*submission));
        state.next_serial += 1;
        let serial = state.next_serial;
        let entry = state
            .fences
            .get_mut(&submission.fence)
            .expect("submitting with unknown fence");
        assert!(
            !entry.signaled && entry.pending.is_none(),
            "fence {:?} must be reset before submission",
            submission.fence
        );
        entry.pending = Some(serial);
        if let Some(index) = state.last_acquired {
            state.image_submissions.insert(index, (submission.fence, serial));
        }
        Ok(())
    }
}

/// Window stand-in with a scripted sequence of sizes.
pub struct FakeSurface {
    extent: vk::Extent2D,
    upcoming: VecDeque<vk::Extent2D>,
    resized: bool,
    pub waits: usize,
}

impl FakeSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: vk::Extent2D { width, height },
            upcoming: VecDeque::new(),
            resized: false,
            waits: 0,
        }
    }

    /// Resize the window as the window system would report it.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.extent = vk::Extent2D { width, height };
        self.resized = true;
    }

    /// Sizes reported after each successive `wait_events`.
    pub fn after_waits(&mut self, extents: impl IntoIterator<Item = (u32, u32)>) {
        self.upcoming
            .extend(extents.into_iter().map(|(width, height)| vk::Extent2D { width, height }));
    }
}

impl OutputSurface for FakeSurface {
    fn drawable_extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        match self.upcoming.pop_front() {
            Some(extent) => {
                self.extent = extent;
                self.resized = true;
            }
            None => panic!("wait_events would block forever: no window event scripted"),
        }
    }

    fn was_resized(&self) -> bool {
        self.resized
    }

    fn reset_resized(&mut self) {
        self.resized = false;
    }
}
