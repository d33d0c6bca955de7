//! Textured triangle sample with explicit CPU/GPU frame pacing.
//!
//! The pacing and resource-lifecycle protocol ([`Renderer`], [`FrameSlotPool`],
//! [`SynchronizationGate`], [`PresentationSurface`]) is written against the
//! [`GpuBackend`] trait. The Direct3D 12 backend lives in [`d3d12`] (Windows
//! only); [`headless`] simulates an in-order execution queue on the CPU.

pub mod backend;
pub mod checkerboard;
pub mod command_line;
pub mod error;
pub mod frame_slot;
pub mod geometry;
pub mod headless;
pub mod overlay;
pub mod renderer;
pub mod sample_runner;
pub mod surface;
pub mod sync_gate;

#[cfg(windows)]
pub mod d3d12;
#[cfg(windows)]
pub mod window_class;

pub use backend::GpuBackend;
pub use backend::ResourceState;
pub use backend::Viewport;
pub use backend::WaitTimeout;
pub use error::SampleResult;
pub use frame_slot::FrameSlot;
pub use frame_slot::FrameSlotPool;
pub use overlay::NoOverlay;
pub use overlay::Overlay;
pub use renderer::Renderer;
pub use surface::PresentationSurface;
pub use surface::SurfaceImage;
pub use sync_gate::SynchronizationGate;

/// Number of frame slots the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 3;

/// Number of images in the presentation surface.
pub const BACK_BUFFER_COUNT: usize = 3;

/// Colour the render target is cleared to at the start of every frame (RGBA).
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.2, 0.4, 1.0];
