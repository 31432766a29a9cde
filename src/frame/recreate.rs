// Chain recreation
//
// The one place an image chain gets rebuilt. A rebuild waits out a minimized
// window, drains the GPU, builds the successor while the current chain is
// still alive, and only then lets the old one go.

use ash::vk;
use std::mem;
use std::sync::Arc;

use crate::backend::{ChainPreferences, ImageChain, PresentDevice};
use crate::error::{PresentError, PresentResult};
use crate::id::ChainIdAllocator;
use crate::surface::{is_zero_area, OutputSurface};

pub struct RecreationController<D: PresentDevice, W: OutputSurface> {
    device: Arc<D>,
    surface: W,
    preferences: ChainPreferences,
    ids: ChainIdAllocator,
    chain: ImageChain<D>,
    /// Chain being replaced, held only while its successor is checked
    predecessor: Option<ImageChain<D>>,
}

impl<D: PresentDevice, W: OutputSurface> RecreationController<D, W> {
    /// Build the first chain. Blocks while the surface has no area.
    pub fn new(
        device: Arc<D>,
        mut surface: W,
        preferences: ChainPreferences,
        mut ids: ChainIdAllocator,
    ) -> PresentResult<Self> {
        let chain = build_when_drawable(&device, &mut surface, &preferences, &mut ids, None)?;
        surface.reset_resized();

        Ok(Self {
            device,
            surface,
            preferences,
            ids,
            chain,
            predecessor: None,
        })
    }

    /// Replace the live chain with one matching the surface as it is now.
    ///
    /// On error the current chain is left in place and still usable.
    /// A successor whose formats differ from the current render target is a
    /// fatal `IncompatibleRebuild`.
    pub fn rebuild(&mut self) -> PresentResult<()> {
        self.device
            .wait_idle()
            .map_err(|e| PresentError::from_vk(e, "device idle before rebuild"))?;

        let rebuilt = build_when_drawable(
            &self.device,
            &mut self.surface,
            &self.preferences,
            &mut self.ids,
            Some(&self.chain),
        )?;

        self.predecessor = Some(mem::replace(&mut self.chain, rebuilt));
        let compatible = self.check_compatible();
        self.release_predecessor();
        compatible?;

        self.surface.reset_resized();
        log::info!(
            "Rebuilt image chain as {} ({}x{})",
            self.chain.id(),
            self.chain.width(),
            self.chain.height()
        );
        Ok(())
    }

    fn check_compatible(&self) -> PresentResult<()> {
        let Some(previous) = &self.predecessor else {
            return Ok(());
        };
        if self.chain.compatible_with(previous) {
            return Ok(());
        }

        let (previous, rebuilt) = (previous.render_target(), self.chain.render_target());
        log::error!(
            "{} cannot replace its predecessor: render target formats changed",
            self.chain.id()
        );
        Err(PresentError::IncompatibleRebuild {
            previous_color: previous.color_format(),
            rebuilt_color: rebuilt.color_format(),
            previous_depth: previous.depth_format(),
            rebuilt_depth: rebuilt.depth_format(),
        })
    }

    fn release_predecessor(&mut self) {
        // The device was idle before the rebuild, nothing can still use it
        if let Some(previous) = self.predecessor.take() {
            log::debug!("Releasing {}", previous.id());
        }
    }

    /// True when the window reported a size change since the last build
    pub fn surface_changed(&self) -> bool {
        self.surface.was_resized()
    }

    pub fn chain(&self) -> &ImageChain<D> {
        &self.chain
    }

    pub fn surface(&self) -> &W {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut W {
        &mut self.surface
    }
}

/// Build a chain for the surface, waiting on window events for as long as
/// either the window or the surface itself reports no area.
fn build_when_drawable<D: PresentDevice, W: OutputSurface>(
    device: &Arc<D>,
    surface: &mut W,
    preferences: &ChainPreferences,
    ids: &mut ChainIdAllocator,
    predecessor: Option<&ImageChain<D>>,
) -> PresentResult<ImageChain<D>> {
    loop {
        let extent = wait_for_drawable_extent(surface);
        match ImageChain::build(device.clone(), ids.allocate(), preferences, extent, predecessor) {
            Err(PresentError::ZeroExtent) => surface.wait_events(),
            built => return built,
        }
    }
}

/// Drawable extent of `surface`, waiting on window events while it is zero.
fn wait_for_drawable_extent<W: OutputSurface>(surface: &mut W) -> vk::Extent2D {
    loop {
        let extent = surface.drawable_extent();
        if !is_zero_area(extent) {
            return extent;
        }
        log::debug!("Surface is {}x{}, waiting for events", extent.width, extent.height);
        surface.wait_events();
    }
}
