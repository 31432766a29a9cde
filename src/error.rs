// Error types for the presentation engine
//
// Transient surface conditions (out of date, suboptimal, zero extent) are not
// errors here: they travel as `FrameOutcome` values. Everything in this enum
// is fatal for the frame loop.

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresentError {
    /// Surface capability query failed or the surface went away
    #[error("surface lost: {0}")]
    SurfaceLost(String),

    /// A GPU allocation (image, framebuffer, sync object) failed
    #[error("out of memory while creating {0}")]
    OutOfMemory(&'static str),

    /// The surface reports no formats at all
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    /// The rebuilt chain can no longer be used with pipelines built
    /// against the previous render target
    #[error(
        "rebuilt image chain is incompatible with the previous render target \
         (color {previous_color:?} -> {rebuilt_color:?}, \
         depth {previous_depth:?} -> {rebuilt_depth:?})"
    )]
    IncompatibleRebuild {
        previous_color: vk::Format,
        rebuilt_color: vk::Format,
        previous_depth: vk::Format,
        rebuilt_depth: vk::Format,
    },

    /// The surface itself reports no drawable area (window minimized while
    /// the chain was being rebuilt). Nothing was allocated; wait and retry.
    #[error("surface reports a zero-area extent")]
    ZeroExtent,

    /// None of the candidate depth formats is usable as an attachment
    #[error("no supported depth format")]
    NoDepthFormat,

    /// Any other driver error
    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),
}

impl PresentError {
    /// Classify a driver result while creating `what`.
    pub fn from_vk(result: vk::Result, what: &'static str) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                PresentError::OutOfMemory(what)
            }
            vk::Result::ERROR_SURFACE_LOST_KHR => {
                PresentError::SurfaceLost(format!("{what}: {result}"))
            }
            other => PresentError::Vulkan(other),
        }
    }
}

impl From<vk::Result> for PresentError {
    fn from(result: vk::Result) -> Self {
        PresentError::from_vk(result, "Vulkan object")
    }
}

pub type PresentResult<T> = std::result::Result<T, PresentError>;
