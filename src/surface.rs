// Output surface - the window side of presentation
//
// The engine never talks to the windowing system directly. It asks this trait
// for the current drawable size, blocks on it while the window is minimized,
// and clears the "resized" flag once a rebuild has consumed it.

use ash::vk;

pub trait OutputSurface {
    /// Current drawable size in pixels. Zero in either dimension means the
    /// window is minimized and nothing can be built for it.
    fn drawable_extent(&self) -> vk::Extent2D;

    /// Block until the windowing system has something new to report.
    /// Must not spin.
    fn wait_events(&mut self);

    /// True once the window size changed since the last rebuild
    fn was_resized(&self) -> bool;

    fn reset_resized(&mut self);
}

pub fn is_zero_area(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}
