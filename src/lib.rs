// =============================================================================
// FRAME PRESENTER - Vulkan presentation and frame pacing
// =============================================================================
//
// LAYERS:
//   FrameSession          renderer-facing: begin_frame / render pass / end_frame
//     RecreationController  owns the live image chain, rebuilds it
//     FrameSynchronizer     N frame slots, fences, semaphores
//       ImageChain            swapchain + depth + framebuffers
//         PresentDevice       everything that touches the GPU
//
// The window side is reached only through `OutputSurface`.

pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod id;
pub mod surface;

/// Frame slots used unless configured otherwise
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

pub use backend::{
    ChainPreferences, FrameOutcome, ImageChain, PresentDevice, RenderTarget, VulkanDevice,
};
pub use error::{PresentError, PresentResult};
pub use frame::{FrameSession, SessionSettings};
pub use id::{ChainId, ChainIdAllocator};
pub use surface::OutputSurface;
