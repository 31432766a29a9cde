// Swapchain - Window presentation
//
// An `ImageChain` is the swapchain plus everything sized to it: color views,
// one depth image per color image, the render pass pipelines are built
// against, and one framebuffer per image. All of it is created and destroyed
// together. Rebuilding creates a whole new chain next to the old one.

use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::{PresentDevice, SwapchainDesc};
use crate::error::{PresentError, PresentResult};
use crate::id::ChainId;
use crate::surface::is_zero_area;

/// Depth formats tried in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Result of acquiring or presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Image usable, surface matches the chain
    Ready(u32),
    /// Image usable, but the surface no longer matches exactly; rebuild once
    /// this frame is presented
    ShouldRebuildAfterUse(u32),
    /// No image is usable; rebuild before doing anything else
    MustRebuildNow,
}

impl FrameOutcome {
    pub fn image_index(self) -> Option<u32> {
        match self {
            FrameOutcome::Ready(index) | FrameOutcome::ShouldRebuildAfterUse(index) => Some(index),
            FrameOutcome::MustRebuildNow => None,
        }
    }

    pub fn wants_rebuild(self) -> bool {
        !matches!(self, FrameOutcome::Ready(_))
    }

    fn from_acquire(result: VkResult<(u32, bool)>) -> PresentResult<Self> {
        match result {
            Ok((index, false)) => Ok(FrameOutcome::Ready(index)),
            Ok((index, true)) => Ok(FrameOutcome::ShouldRebuildAfterUse(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(FrameOutcome::MustRebuildNow),
            Err(e) => Err(PresentError::from_vk(e, "acquired image")),
        }
    }

    fn from_present(result: VkResult<bool>, index: u32) -> PresentResult<Self> {
        match result {
            Ok(false) => Ok(FrameOutcome::Ready(index)),
            Ok(true) => Ok(FrameOutcome::ShouldRebuildAfterUse(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(FrameOutcome::MustRebuildNow),
            Err(e) => Err(PresentError::from_vk(e, "presentation")),
        }
    }
}

/// What the chain tries to get from the surface.
#[derive(Debug, Clone, Copy)]
pub struct ChainPreferences {
    pub surface_format: vk::SurfaceFormatKHR,
    /// Used when supported, FIFO otherwise
    pub present_mode: vk::PresentModeKHR,
}

impl Default for ChainPreferences {
    fn default() -> Self {
        Self {
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::MAILBOX,
        }
    }
}

/// The attachment layout pipelines must match to draw into the chain.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    render_pass: vk::RenderPass,
    color_format: vk::Format,
    depth_format: vk::Format,
}

impl RenderTarget {
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Pipelines built against `other` stay valid for `self`.
    pub fn is_compatible_with(&self, other: &RenderTarget) -> bool {
        self.color_format == other.color_format && self.depth_format == other.depth_format
    }
}

/// Handles belonging to one image of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentableImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub depth_image: vk::Image,
    pub depth_view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

/// Everything the chain created so far. Dropping it destroys exactly that,
/// which is what makes a failed build leak-free.
struct ChainResources<D: PresentDevice> {
    device: Arc<D>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    render_pass: vk::RenderPass,
    depth_images: Vec<vk::Image>,
    depth_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl<D: PresentDevice> ChainResources<D> {
    fn new(device: Arc<D>) -> Self {
        Self {
            device,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            render_pass: vk::RenderPass::null(),
            depth_images: Vec::new(),
            depth_views: Vec::new(),
            framebuffers: Vec::new(),
        }
    }
}

impl<D: PresentDevice> Drop for ChainResources<D> {
    fn drop(&mut self) {
        // Reverse creation order
        for &framebuffer in &self.framebuffers {
            self.device.destroy_framebuffer(framebuffer);
        }
        for &view in &self.depth_views {
            self.device.destroy_image_view(view);
        }
        for &image in &self.depth_images {
            self.device.destroy_depth_image(image);
        }
        if self.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(self.render_pass);
        }
        for &view in &self.views {
            self.device.destroy_image_view(view);
        }
        // Swapchain images are owned by the swapchain itself
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);
        }
    }
}

pub struct ImageChain<D: PresentDevice> {
    id: ChainId,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    render_target: RenderTarget,
    resources: ChainResources<D>,
}

impl<D: PresentDevice> ImageChain<D> {
    /// Build a chain for the surface as it is now.
    ///
    /// `output_extent` is the window's drawable size; it is only used when
    /// the surface leaves the extent up to the swapchain. With a
    /// `predecessor`, its swapchain is handed to the driver as the retired
    /// one; the predecessor itself is left untouched and remains valid
    /// whether or not this build succeeds.
    ///
    /// Fails with `ZeroExtent`, before anything is allocated, when the
    /// surface itself reports no area.
    pub fn build(
        device: Arc<D>,
        id: ChainId,
        preferences: &ChainPreferences,
        output_extent: vk::Extent2D,
        predecessor: Option<&ImageChain<D>>,
    ) -> PresentResult<Self> {
        assert!(
            !is_zero_area(output_extent),
            "image chain cannot be built for a zero-area extent"
        );

        let support = device
            .surface_support()
            .map_err(|e| PresentError::SurfaceLost(format!("capability query failed: {e}")))?;

        if support.formats.is_empty() {
            return Err(PresentError::NoSurfaceFormat);
        }

        let surface_format = choose_surface_format(&support.formats, preferences.surface_format);
        let present_mode = choose_present_mode(&support.present_modes, preferences.present_mode);
        let extent = choose_extent(&support.capabilities, output_extent);
        if is_zero_area(extent) {
            log::debug!(
                "Surface reports {}x{}, not building {}",
                extent.width,
                extent.height,
                id
            );
            return Err(PresentError::ZeroExtent);
        }
        let image_count = determine_image_count(&support.capabilities);
        let depth_format = find_depth_format(device.as_ref())?;

        let mut res = ChainResources::new(device.clone());

        let desc = SwapchainDesc {
            min_image_count: image_count,
            surface_format,
            extent,
            present_mode,
            pre_transform: support.capabilities.current_transform,
            old_swapchain: predecessor
                .map(|p| p.swapchain())
                .unwrap_or_else(vk::SwapchainKHR::null),
        };

        res.swapchain = device
            .create_swapchain(&desc)
            .map_err(|e| PresentError::from_vk(e, "swapchain"))?;
        res.images = device
            .swapchain_images(res.swapchain)
            .map_err(|e| PresentError::from_vk(e, "swapchain images"))?;

        for &image in &res.images {
            let view = device
                .create_image_view(image, surface_format.format, vk::ImageAspectFlags::COLOR)
                .map_err(|e| PresentError::from_vk(e, "color image view"))?;
            res.views.push(view);
        }

        let attachments = render_target_attachments(surface_format.format, depth_format);
        res.render_pass = device
            .create_render_pass(&attachments)
            .map_err(|e| PresentError::from_vk(e, "render pass"))?;

        for _ in 0..res.images.len() {
            let depth_image = device
                .create_depth_image(extent, depth_format)
                .map_err(|e| PresentError::from_vk(e, "depth image"))?;
            res.depth_images.push(depth_image);

            let depth_view = device
                .create_image_view(depth_image, depth_format, vk::ImageAspectFlags::DEPTH)
                .map_err(|e| PresentError::from_vk(e, "depth image view"))?;
            res.depth_views.push(depth_view);
        }

        for (&view, &depth_view) in res.views.iter().zip(&res.depth_views) {
            let framebuffer = device
                .create_framebuffer(res.render_pass, &[view, depth_view], extent)
                .map_err(|e| PresentError::from_vk(e, "framebuffer"))?;
            res.framebuffers.push(framebuffer);
        }

        log::info!(
            "Built {}: {}x{}, {} images, {:?}/{:?}, depth {:?}, {:?}",
            id,
            extent.width,
            extent.height,
            res.images.len(),
            surface_format.format,
            surface_format.color_space,
            depth_format,
            present_mode
        );

        let render_target = RenderTarget {
            render_pass: res.render_pass,
            color_format: surface_format.format,
            depth_format,
        };

        Ok(Self {
            id,
            surface_format,
            present_mode,
            extent,
            render_target,
            resources: res,
        })
    }

    /// Ask the presentation engine for the next image. `signal` is signaled
    /// once the image can actually be written.
    pub fn acquire_next(&self, signal: vk::Semaphore) -> PresentResult<FrameOutcome> {
        let result = self
            .resources
            .device
            .acquire_next_image(self.resources.swapchain, signal);
        FrameOutcome::from_acquire(result)
    }

    /// Queue `image_index` for presentation once `wait` is signaled.
    pub fn present(&self, wait: vk::Semaphore, image_index: u32) -> PresentResult<FrameOutcome> {
        let result = self
            .resources
            .device
            .queue_present(self.resources.swapchain, image_index, wait);
        FrameOutcome::from_present(result, image_index)
    }

    /// Same color and depth formats, so pipelines carry over.
    pub fn compatible_with(&self, other: &ImageChain<D>) -> bool {
        self.render_target.is_compatible_with(&other.render_target)
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.resources.swapchain
    }

    pub fn render_target(&self) -> &RenderTarget {
        &self.render_target
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    /// Width over height, for projection setup
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    pub fn image_count(&self) -> usize {
        self.resources.images.len()
    }

    /// # Panics
    ///
    /// If `index` is not an image of this chain.
    pub fn image(&self, index: u32) -> PresentableImage {
        let i = index as usize;
        assert!(
            i < self.image_count(),
            "image index {} out of range for {} ({} images)",
            index,
            self.id,
            self.image_count()
        );
        let res = &self.resources;
        PresentableImage {
            image: res.images[i],
            view: res.views[i],
            depth_image: res.depth_images[i],
            depth_view: res.depth_views[i],
            framebuffer: res.framebuffers[i],
        }
    }

    pub fn framebuffer(&self, index: u32) -> vk::Framebuffer {
        self.image(index).framebuffer
    }
}

impl<D: PresentDevice> Drop for ImageChain<D> {
    fn drop(&mut self) {
        log::info!(
            "Destroying {} ({}x{}, {} images)",
            self.id,
            self.extent.width,
            self.extent.height,
            self.resources.images.len()
        );
        // `resources` releases the handles right after this
    }
}

/// Prefers `preferred`; falls back to the first format the surface lists.
fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> vk::SurfaceFormatKHR {
    if let Some(&format) = formats
        .iter()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
    {
        log::debug!("Selected preferred surface format {:?}", format.format);
        return format;
    }

    log::warn!(
        "Surface does not support {:?}/{:?}, using {:?}",
        preferred.format,
        preferred.color_space,
        formats[0].format
    );
    formats[0]
}

fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        return preferred;
    }
    // FIFO is always supported
    log::warn!("Present mode {:?} not supported, falling back to FIFO", preferred);
    vk::PresentModeKHR::FIFO
}

/// The surface's own extent when it has one, otherwise the requested size
/// clamped to the surface limits.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    // 0 means no maximum
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn find_depth_format<D: PresentDevice + ?Sized>(device: &D) -> PresentResult<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .iter()
        .copied()
        .find(|&format| {
            device
                .format_properties(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(PresentError::NoDepthFormat)
}

/// Color cleared and stored for presentation; depth cleared and discarded.
fn render_target_attachments(
    color_format: vk::Format,
    depth_format: vk::Format,
) -> [vk::AttachmentDescription; 2] {
    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let depth = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    [color, depth]
}
