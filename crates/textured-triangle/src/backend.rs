use std::fmt::Debug;
use std::time::Duration;

use crate::error::SampleResult;

/// Usage mode a surface image is in. Moving between modes requires an
/// explicit transition recorded into the command list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Present,
    RenderTarget,
}

/// Output rectangle the scene is drawn into, anchored at the origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// How long a fence or presentation wait may block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WaitTimeout {
    #[default]
    Infinite,
    After(Duration),
}

impl WaitTimeout {
    /// Milliseconds for OS wait calls, saturating below the OS "infinite" sentinel.
    pub fn as_millis_u32(&self) -> u32 {
        match self {
            WaitTimeout::Infinite => u32::MAX,
            WaitTimeout::After(duration) => duration.as_millis().min(u32::MAX as u128 - 1) as u32,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            WaitTimeout::Infinite => None,
            WaitTimeout::After(duration) => Some(*duration),
        }
    }
}

/// Everything the frame-pacing protocol needs from a graphics device.
///
/// Implementations own the device, the execution queue, the presentation
/// engine, the shared command list and the static pipeline resources.
/// Per-slot allocators and surface images are handed out to the caller, who
/// decides when they are dropped.
pub trait GpuBackend {
    /// Command-recording memory owned by one frame slot.
    type Allocator;
    /// A presentation surface image.
    type Image;
    /// Persistent render-target view handle for one surface image.
    type View: Copy + Eq + Debug;
    /// The command list the overlay appends to.
    type CommandList;
    /// What the overlay needs to create its own device objects.
    type OverlayBinding;

    fn create_allocator(&mut self) -> SampleResult<Self::Allocator>;

    /// View handle `index` of the render-target heap. Stable for the lifetime
    /// of the backend.
    fn view_handle(&self, index: usize) -> Self::View;

    fn overlay_binding(&self) -> Self::OverlayBinding;

    /// Highest fence value the device has retired.
    fn completed_value(&self) -> u64;

    /// Enqueues a fence signal of `value` behind all submitted work.
    fn signal(&mut self, value: u64) -> SampleResult<()>;

    /// Blocks until [`completed_value`](Self::completed_value) reaches `value`.
    fn wait_for_value(&mut self, value: u64, timeout: WaitTimeout) -> SampleResult<()>;

    /// Blocks until the presentation engine will accept another frame and,
    /// when `fence_value` is given, the fence has reached it. Both conditions
    /// are waited on together.
    fn wait_for_frame(&mut self, fence_value: Option<u64>, timeout: WaitTimeout)
        -> SampleResult<()>;

    /// (Re)creates the presentation surface at the given extent. All images
    /// previously returned by [`surface_image`](Self::surface_image) must
    /// already be dropped.
    fn recreate_surface(&mut self, width: u32, height: u32) -> SampleResult<()>;

    /// Drops the presentation surface, if any.
    fn release_surface(&mut self);

    fn surface_image(&self, index: usize) -> SampleResult<Self::Image>;

    /// Writes a render-target view of `image` into `view`.
    fn bind_view(&self, image: &Self::Image, view: Self::View);

    /// Image the presentation engine expects the next submission to target.
    fn current_image_index(&self) -> usize;

    fn present(&mut self) -> SampleResult<()>;

    /// Resets `allocator` and reopens the shared command list on it. Only
    /// valid once the slot owning `allocator` has retired.
    fn begin_frame(&mut self, allocator: &mut Self::Allocator) -> SampleResult<()>;

    fn transition(&mut self, image: &Self::Image, before: ResourceState, after: ResourceState);

    /// Clears `target`, binds the pipeline and draws the static geometry.
    fn draw_scene(&mut self, target: Self::View, viewport: Viewport);

    fn command_list(&mut self) -> &mut Self::CommandList;

    /// Closes the command list and hands it to the execution queue.
    fn submit(&mut self) -> SampleResult<()>;

    /// Records the copies that move static resources (the texture) from
    /// staging memory into device memory. Called once, between
    /// [`begin_frame`](Self::begin_frame) and [`submit`](Self::submit).
    fn record_uploads(&mut self) -> SampleResult<()>;

    /// Called once the upload submission has retired; staging memory may be
    /// released.
    fn finish_uploads(&mut self) -> SampleResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_timeout_maps_to_os_sentinel() {
        assert_eq!(WaitTimeout::Infinite.as_millis_u32(), u32::MAX);
        assert_eq!(WaitTimeout::Infinite.duration(), None);
    }

    #[test]
    fn bounded_timeout_never_becomes_infinite() {
        let huge = WaitTimeout::After(Duration::from_secs(u64::MAX / 2));
        assert_eq!(huge.as_millis_u32(), u32::MAX - 1);
        let short = WaitTimeout::After(Duration::from_millis(16));
        assert_eq!(short.as_millis_u32(), 16);
    }
}
