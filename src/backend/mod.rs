// Backend module - Vulkan abstraction layer
//
// Design: everything the presentation engine asks of the GPU goes through the
// `PresentDevice` trait. `VulkanDevice` implements it on top of ash; tests
// implement it with a scripted fake so frame pacing can be checked without a
// GPU.

pub mod device;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
pub(crate) mod fake;

use ash::prelude::VkResult;
use ash::vk;

pub use device::VulkanDevice;
pub use swapchain::{ChainPreferences, FrameOutcome, ImageChain, PresentableImage, RenderTarget};
pub use sync::FrameSlot;

/// What the surface supports right now
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Parameters of a swapchain creation
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Retired chain handed to the driver for resource reuse, or null
    pub old_swapchain: vk::SwapchainKHR,
}

/// One queue submission of a recorded frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSubmission {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Beginning of the chain's render pass on one framebuffer
#[derive(Debug, Clone, Copy)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

/// Device/command collaborator.
///
/// Handles are plain `ash::vk` handles. Every `create_*` has a matching
/// `destroy_*`; the caller owns what it creates. Memory backing depth images
/// is owned by the implementation and released in `destroy_depth_image`.
pub trait PresentDevice {
    // Surface queries
    fn surface_support(&self) -> VkResult<SurfaceSupport>;
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;

    // Swapchain
    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// Returns the image index and whether the swapchain is suboptimal.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;

    /// Returns whether the swapchain is suboptimal.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;

    // Images and attachments
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_depth_image(&self, extent: vk::Extent2D, format: vk::Format) -> VkResult<vk::Image>;
    fn destroy_depth_image(&self, image: vk::Image);
    fn create_render_pass(
        &self,
        attachments: &[vk::AttachmentDescription],
    ) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Synchronization
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Blocks without timeout until `fence` is signaled.
    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn wait_idle(&self) -> VkResult<()>;

    // Commands
    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]);
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    /// Begins the render pass and sets a full-extent dynamic viewport and scissor.
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn queue_submit(&self, submission: &FrameSubmission) -> VkResult<()>;
}
