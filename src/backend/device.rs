// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Surface creation for the output window
// - Physical device selection (prefer discrete GPU that can present)
// - Logical device, queue, command pool
// - Depth image memory through gpu-allocator
//
// Implements `PresentDevice`, so everything the frame engine does ends up here.

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::{khr, vk, Entry};
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Arc;

use super::{FrameSubmission, PresentDevice, RenderPassBegin, SurfaceSupport, SwapchainDesc};

/// Allocator plus the allocations backing live depth images
struct DepthMemory {
    allocator: Allocator,
    allocations: HashMap<vk::Image, Allocation>,
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Dropped by hand before the device
    memory: ManuallyDrop<Mutex<DepthMemory>>,

    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    command_pool: vk::CommandPool,

    // Presentation
    surface: vk::SurfaceKHR,
    surface_loader: khr::surface::Instance,
    swapchain_loader: khr::swapchain::Device,

    // Debug utils (if validation enabled)
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    // Device properties (cached for performance)
    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanDevice {
    /// Create Vulkan device presenting to the given window
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers (debug only)
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let instance = Self::create_instance(&entry, app_name, enable_validation, display_handle)?;

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
        }
        .context("Failed to create window surface")?;
        let surface_loader = khr::surface::Instance::new(&entry, &instance);

        let (physical_device, graphics_queue_family) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        let (device, graphics_queue) =
            Self::create_logical_device(&instance, physical_device, graphics_queue_family)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        // RESET: command buffers are re-recorded every frame
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let swapchain_loader = khr::swapchain::Device::new(&instance, &device);

        Ok(Arc::new(Self {
            memory: ManuallyDrop::new(Mutex::new(DepthMemory {
                allocator,
                allocations: HashMap::new(),
            })),
            device,
            physical_device,
            instance,
            _entry: entry,
            graphics_queue,
            graphics_queue_family,
            command_pool,
            surface,
            surface_loader,
            swapchain_loader,
            debug_utils,
            properties,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display_handle: RawDisplayHandle,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("frame-presenter")?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        // Platform-specific surface extensions
        let mut extensions = ash_window::enumerate_required_extensions(display_handle)
            .context("Failed to query surface extensions")?
            .to_vec();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layer_names = if enable_validation {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;

        Ok((debug_utils, messenger))
    }

    /// Pick the best GPU with a queue family that can both draw and present
    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };

            let family = queue_families.iter().enumerate().find_map(|(i, family)| {
                let index = i as u32;
                let presents = unsafe {
                    surface_loader.get_physical_device_surface_support(device, index, surface)
                }
                .unwrap_or(false);
                (family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && presents).then_some(index)
            });

            if let Some(family) = family {
                // Score device (prefer discrete GPU)
                let score = match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
                    _ => 1,
                };

                if score > best_score {
                    best_score = score;
                    best_device = Some((device, family));
                }
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("No GPU can present to this window"))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities);

        let extensions = [khr::swapchain::NAME.as_ptr()];

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        Ok((device, graphics_queue))
    }
}

impl PresentDevice for VulkanDevice {
    fn surface_support(&self) -> VkResult<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface_loader
                    .get_physical_device_surface_capabilities(self.physical_device, self.surface)?,
                formats: self
                    .surface_loader
                    .get_physical_device_surface_formats(self.physical_device, self.surface)?,
                present_modes: self
                    .surface_loader
                    .get_physical_device_surface_present_modes(self.physical_device, self.surface)?,
            })
        }
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(desc.old_swapchain);

        unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader
                .queue_present(self.graphics_queue, &present_info)
        }
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device.create_image_view(&create_info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_depth_image(&self, extent: vk::Extent2D, format: vk::Format) -> VkResult<vk::Image> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { self.device.create_image(&image_info, None) }?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let mut memory = self.memory.lock();
        let allocation = match memory.allocator.allocate(&AllocationCreateDesc {
            name: "depth image",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                log::error!("Depth image allocation failed: {}", e);
                unsafe { self.device.destroy_image(image, None) };
                return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            unsafe { self.device.destroy_image(image, None) };
            if let Err(free_err) = memory.allocator.free(allocation) {
                log::warn!("Failed to free depth image memory: {}", free_err);
            }
            return Err(e);
        }

        memory.allocations.insert(image, allocation);
        Ok(image)
    }

    fn destroy_depth_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) };

        let mut memory = self.memory.lock();
        if let Some(allocation) = memory.allocations.remove(&image) {
            if let Err(e) = memory.allocator.free(allocation) {
                log::warn!("Failed to free depth image memory: {}", e);
            }
        }
    }

    fn create_render_pass(
        &self,
        attachments: &[vk::AttachmentDescription],
    ) -> VkResult<vk::RenderPass> {
        let color_attachment_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let depth_attachment_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        // Single subpass with color and depth
        let color_attachments = [color_attachment_ref];
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachments)
            .depth_stencil_attachment(&depth_attachment_ref);

        // Wait for the acquire semaphore's stage before writing attachments
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let subpasses = [subpass];
        let dependencies = [dependency];

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        unsafe { self.device.create_render_pass(&render_pass_info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        unsafe { self.device.create_framebuffer(&framebuffer_info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&semaphore_info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&fence_info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(self.command_pool, buffers) }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        // Implicit reset, the pool allows it
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        // Index 0 is color, index 1 is depth, matching the attachments
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: begin.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: begin.clear_depth,
                    stencil: 0,
                },
            },
        ];

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: begin.extent,
        };

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: begin.extent.width as f32,
            height: begin.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            self.device.cmd_set_viewport(cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(cmd, 0, &[render_area]);
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn queue_submit(&self, submission: &FrameSubmission) -> VkResult<()> {
        let wait_semaphores = [submission.wait_semaphore];
        let wait_stages = [submission.wait_stage];
        let command_buffers = [submission.command_buffer];
        let signal_semaphores = [submission.signal_semaphore];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], submission.fence)
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::warn!("wait_idle failed during shutdown: {}", e);
        }

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);

            // Allocator must go while the device is still alive
            ManuallyDrop::drop(&mut self.memory);

            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
