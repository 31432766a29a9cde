// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync
// Critical for correct and efficient multi-frame rendering

use ash::vk;
use std::sync::Arc;

use super::PresentDevice;
use crate::error::{PresentError, PresentResult};

/// Frame synchronization - one per frame in flight
///
/// Slots outlive image chains: a rebuild replaces images, never slots.
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    /// The fence starts signaled so the first wait on a fresh slot returns.
    pub fn new<D: PresentDevice>(
        device: &Arc<D>,
        command_buffer: vk::CommandBuffer,
    ) -> PresentResult<Self> {
        let image_available = device
            .create_semaphore()
            .map_err(|e| PresentError::from_vk(e, "semaphore"))?;
        let render_finished = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_available);
                return Err(PresentError::from_vk(e, "semaphore"));
            }
        };
        let in_flight_fence = match device.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_semaphore(render_finished);
                device.destroy_semaphore(image_available);
                return Err(PresentError::from_vk(e, "fence"));
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight_fence,
            command_buffer,
        })
    }

    /// The command buffer belongs to the pool and is freed by the owner.
    pub fn destroy<D: PresentDevice>(&self, device: &D) {
        device.destroy_semaphore(self.image_available);
        device.destroy_semaphore(self.render_finished);
        device.destroy_fence(self.in_flight_fence);
    }
}
