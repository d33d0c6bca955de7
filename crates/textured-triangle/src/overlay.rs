use crate::backend::GpuBackend;
use crate::error::SampleResult;

/// An immediate-mode UI layer that draws on top of the scene.
///
/// The renderer calls [`initialize`](Overlay::initialize) once after the
/// backend is up, [`record`](Overlay::record) every frame while the target
/// image is in the render-target state, and [`shutdown`](Overlay::shutdown)
/// after the queue has drained.
pub trait Overlay<B: GpuBackend> {
    fn initialize(&mut self, binding: &B::OverlayBinding) -> SampleResult<()>;

    fn record(&mut self, command_list: &mut B::CommandList) -> SampleResult<()>;

    fn shutdown(&mut self);
}

/// Overlay that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl<B: GpuBackend> Overlay<B> for NoOverlay {
    fn initialize(&mut self, _binding: &B::OverlayBinding) -> SampleResult<()> {
        Ok(())
    }

    fn record(&mut self, _command_list: &mut B::CommandList) -> SampleResult<()> {
        Ok(())
    }

    fn shutdown(&mut self) {}
}
