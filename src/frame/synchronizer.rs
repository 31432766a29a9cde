// Frame pacing
//
// N frame slots are round-robined independently of swapchain image indices.
// A slot's fence is the only thing the CPU ever blocks on during a frame.
// Because the presentation engine may hand out images in any order, each
// image also remembers which slot's fence last covered it.

use ash::vk;
use std::sync::Arc;

use crate::backend::{FrameOutcome, FrameSlot, FrameSubmission, ImageChain, PresentDevice};
use crate::error::{PresentError, PresentResult};

pub struct FrameSynchronizer<D: PresentDevice> {
    device: Arc<D>,
    slots: Vec<FrameSlot>,
    current: usize,
    /// Fence of the slot that last rendered into each image
    images_in_flight: Vec<Option<vk::Fence>>,
}

impl<D: PresentDevice> FrameSynchronizer<D> {
    pub fn new(device: Arc<D>, frames_in_flight: usize) -> PresentResult<Self> {
        assert!(frames_in_flight > 0, "at least one frame slot is required");

        let command_buffers = device
            .allocate_command_buffers(frames_in_flight as u32)
            .map_err(|e| PresentError::from_vk(e, "command buffers"))?;

        let mut slots = Vec::with_capacity(frames_in_flight);
        for &command_buffer in &command_buffers {
            match FrameSlot::new(&device, command_buffer) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in &slots {
                        slot.destroy(device.as_ref());
                    }
                    device.free_command_buffers(&command_buffers);
                    return Err(e);
                }
            }
        }

        log::debug!("Created {} frame slots", frames_in_flight);

        Ok(Self {
            device,
            slots,
            current: 0,
            images_in_flight: Vec::new(),
        })
    }

    /// Forget per-image fences and size the mapping for a freshly built chain.
    pub fn track_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }

    /// Block until the GPU is done with this slot's previous submission.
    pub fn begin_slot(&mut self) -> PresentResult<()> {
        let fence = self.slots[self.current].in_flight_fence;
        self.device
            .wait_for_fence(fence)
            .map_err(|e| PresentError::from_vk(e, "frame fence wait"))
    }

    /// Acquire the next image of `chain` for the current slot.
    ///
    /// If another slot still has work in flight on the returned image, waits
    /// for it before handing the image out. Rebuild outcomes are returned
    /// untouched.
    pub fn acquire_image(&mut self, chain: &ImageChain<D>) -> PresentResult<FrameOutcome> {
        let slot = &self.slots[self.current];
        let outcome = chain.acquire_next(slot.image_available)?;

        if let Some(index) = outcome.image_index() {
            let fence = slot.in_flight_fence;
            let tracked = self
                .images_in_flight
                .get_mut(index as usize)
                .unwrap_or_else(|| {
                    panic!("acquired image {index} is not tracked for {}", chain.id())
                });

            if let Some(previous) = tracked.replace(fence) {
                if previous != fence {
                    log::trace!("Image {} still owned by another slot, waiting", index);
                    self.device
                        .wait_for_fence(previous)
                        .map_err(|e| PresentError::from_vk(e, "image fence wait"))?;
                }
            }
        }

        Ok(outcome)
    }

    /// Submit the slot's recorded command buffer. The slot fence is re-armed
    /// here, so a frame that never reaches submission leaves it signaled.
    pub fn submit(&mut self, command_buffer: vk::CommandBuffer) -> PresentResult<()> {
        let slot = &self.slots[self.current];
        assert_eq!(
            command_buffer, slot.command_buffer,
            "submitted command buffer does not belong to the current frame slot"
        );

        self.device
            .reset_fence(slot.in_flight_fence)
            .map_err(|e| PresentError::from_vk(e, "frame fence reset"))?;

        self.device
            .queue_submit(&FrameSubmission {
                command_buffer,
                wait_semaphore: slot.image_available,
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore: slot.render_finished,
                fence: slot.in_flight_fence,
            })
            .map_err(|e| PresentError::from_vk(e, "queue submission"))
    }

    /// Present `image_index` once rendering finished, then move to the next
    /// slot whatever the outcome.
    pub fn present_and_advance(
        &mut self,
        chain: &ImageChain<D>,
        image_index: u32,
    ) -> PresentResult<FrameOutcome> {
        let wait = self.slots[self.current].render_finished;
        let outcome = chain.present(wait, image_index);
        self.current = (self.current + 1) % self.slots.len();
        outcome
    }

    pub fn frame_index(&self) -> usize {
        self.current
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn current_slot(&self) -> &FrameSlot {
        &self.slots[self.current]
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.slots[self.current].command_buffer
    }
}

impl<D: PresentDevice> Drop for FrameSynchronizer<D> {
    fn drop(&mut self) {
        let command_buffers: Vec<_> = self.slots.iter().map(|slot| slot.command_buffer).collect();
        for slot in &self.slots {
            slot.destroy(self.device.as_ref());
        }
        self.device.free_command_buffers(&command_buffers);
    }
}
