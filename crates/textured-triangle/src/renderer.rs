use tracing::debug;
use tracing::error;
use tracing::info;

use crate::backend::GpuBackend;
use crate::backend::ResourceState;
use crate::backend::WaitTimeout;
use crate::error::SampleResult;
use crate::frame_slot::FrameSlotPool;
use crate::overlay::NoOverlay;
use crate::overlay::Overlay;
use crate::surface::PresentationSurface;
use crate::sync_gate::SynchronizationGate;
use crate::BACK_BUFFER_COUNT;
use crate::FRAMES_IN_FLIGHT;

/// Owns every per-frame resource and drives the record/submit/present cycle.
///
/// Fields drop top to bottom once [`finalize`](Self::finalize) (or `Drop`)
/// has drained the queue: overlay, frame slot allocators, surface images,
/// then the backend with its heaps, pipeline, swap chain, queue, device and
/// OS handles.
///
/// Surface images are released ahead of the descriptor heaps and pipeline
/// objects, which the backend owns and drops as one unit. Nothing on the GPU
/// references any of them past the drain.
pub struct Renderer<B: GpuBackend, O: Overlay<B> = NoOverlay> {
    overlay: O,
    slots: FrameSlotPool<B::Allocator, FRAMES_IN_FLIGHT>,
    surface: PresentationSurface<B::Image, B::View, BACK_BUFFER_COUNT>,
    gate: SynchronizationGate,
    backend: B,
    finalized: bool,
}

impl<B: GpuBackend> Renderer<B> {
    pub fn without_overlay(backend: B, timeout: WaitTimeout) -> SampleResult<Self> {
        Self::new(backend, NoOverlay, timeout)
    }
}

impl<B: GpuBackend, O: Overlay<B>> Renderer<B, O> {
    /// Creates the frame slots and persistent views, uploads static
    /// resources through the execution queue and initialises the overlay.
    /// The surface stays unconfigured until the first [`resize`](Self::resize).
    pub fn new(mut backend: B, mut overlay: O, timeout: WaitTimeout) -> SampleResult<Self> {
        let mut slots = FrameSlotPool::new(|| backend.create_allocator())?;
        let surface = PresentationSurface::new(&backend);
        let mut gate = SynchronizationGate::new(timeout);

        let upload_slot = slots.slot_mut(0)?;
        backend.begin_frame(&mut upload_slot.allocator)?;
        backend.record_uploads()?;
        backend.submit()?;
        gate.advance_and_record(&mut backend, upload_slot)?;
        gate.wait_for_slot(&mut backend, upload_slot)?;
        backend.finish_uploads()?;
        debug!(fence = gate.last_signalled(), "static resources uploaded");

        overlay.initialize(&backend.overlay_binding())?;

        info!(
            frames_in_flight = FRAMES_IN_FLIGHT,
            back_buffers = BACK_BUFFER_COUNT,
            "renderer initialized"
        );
        Ok(Self {
            overlay,
            slots,
            surface,
            gate,
            backend,
            finalized: false,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn gate(&self) -> &SynchronizationGate {
        &self.gate
    }

    pub fn slots(&self) -> &FrameSlotPool<B::Allocator, FRAMES_IN_FLIGHT> {
        &self.slots
    }

    pub fn surface(&self) -> &PresentationSurface<B::Image, B::View, BACK_BUFFER_COUNT> {
        &self.surface
    }

    /// Recreates the presentation surface at the new output size.
    pub fn resize(&mut self, width: u32, height: u32) -> SampleResult<()> {
        self.surface
            .configure(width, height, &self.gate, &mut self.backend)
    }

    /// Waits for the next frame slot and renders into it.
    pub fn frame(&mut self) -> SampleResult<usize> {
        let slot_index = self.slots.acquire_next(&self.gate, &mut self.backend)?;
        self.render(slot_index)?;
        Ok(slot_index)
    }

    /// Records, submits and presents one frame using frame slot
    /// `slot_index`. The slot must have retired; [`frame`](Self::frame)
    /// guarantees that.
    pub fn render(&mut self, slot_index: usize) -> SampleResult<()> {
        let viewport = self.surface.viewport()?;
        let image_index = self.surface.current_image_index(&self.backend);
        let target = self.surface.image(image_index)?;
        let slot = self.slots.slot_mut(slot_index)?;

        self.backend.begin_frame(&mut slot.allocator)?;
        self.backend.transition(
            &target.image,
            ResourceState::Present,
            ResourceState::RenderTarget,
        );
        self.backend.draw_scene(target.view, viewport);
        self.overlay.record(self.backend.command_list())?;
        self.backend.transition(
            &target.image,
            ResourceState::RenderTarget,
            ResourceState::Present,
        );
        self.backend.submit()?;
        self.backend.present()?;

        let marker = self.gate.advance_and_record(&mut self.backend, slot)?;
        debug!(slot = slot_index, image = image_index, marker, "frame submitted");
        Ok(())
    }

    /// Drains all in-flight work and shuts the overlay down; resources are
    /// released as `self` drops.
    pub fn finalize(mut self) -> SampleResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> SampleResult<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        self.gate
            .drain_slots(&mut self.backend, self.slots.slots_mut())?;
        self.overlay.shutdown();
        info!(
            frames = self.slots.frame_index(),
            last_fence = self.gate.last_signalled(),
            "renderer finalized"
        );
        Ok(())
    }
}

impl<B: GpuBackend, O: Overlay<B>> Drop for Renderer<B, O> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Error waiting for GPU idle on destroy: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::Command;
    use crate::headless::Event;
    use crate::headless::HeadlessBackend;

    fn renderer() -> Renderer<HeadlessBackend> {
        let mut renderer =
            Renderer::without_overlay(HeadlessBackend::new(), WaitTimeout::Infinite).unwrap();
        renderer.resize(800, 600).unwrap();
        renderer
    }

    fn executed(backend: &HeadlessBackend) -> Vec<Vec<Command>> {
        backend
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Execute(commands) => Some(commands),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn upload_goes_through_the_shared_counter() {
        let renderer = renderer();
        assert_eq!(renderer.gate().last_signalled(), 1);
        let events = renderer.backend().events();
        let upload = events
            .iter()
            .position(|event| matches!(event, Event::Signal(1)))
            .unwrap();
        let finished = events
            .iter()
            .position(|event| *event == Event::UploadsFinished)
            .unwrap();
        assert!(upload < finished);
        assert!(matches!(
            executed(renderer.backend())[0][..],
            [Command::CopyTexture { width: 256, height: 256, .. }]
        ));
    }

    #[test]
    fn render_wraps_the_draw_in_state_transitions() {
        let mut renderer = renderer();
        renderer.render(0).unwrap();

        let frames = executed(renderer.backend());
        let frame = frames.last().unwrap();
        assert_eq!(
            frame.first(),
            Some(&Command::Transition {
                image: 0,
                before: ResourceState::Present,
                after: ResourceState::RenderTarget,
            })
        );
        assert_eq!(
            frame.last(),
            Some(&Command::Transition {
                image: 0,
                before: ResourceState::RenderTarget,
                after: ResourceState::Present,
            })
        );
        assert!(frame.contains(&Command::Draw { vertex_count: 3 }));
    }

    #[test]
    fn render_records_a_fresh_marker_into_its_slot() {
        let mut renderer = renderer();
        renderer.render(1).unwrap();
        let marker = renderer.slots().slot(1).unwrap().completion_marker();
        assert_eq!(marker, renderer.gate().last_signalled());
        assert_eq!(marker, 2);
    }

    #[test]
    fn render_before_resize_is_an_error() {
        let mut renderer =
            Renderer::without_overlay(HeadlessBackend::new(), WaitTimeout::Infinite).unwrap();
        assert!(renderer.render(0).is_err());
    }

    #[test]
    fn render_rejects_unknown_slots() {
        let mut renderer = renderer();
        assert!(renderer.render(FRAMES_IN_FLIGHT).is_err());
    }

    #[test]
    fn frames_keep_allocators_safe_over_many_iterations() {
        let mut renderer = renderer();
        for _ in 0..20 {
            renderer.frame().unwrap();
        }
        assert_eq!(renderer.backend().frames_presented(), 20);
        assert_eq!(renderer.slots().frame_index(), 20);
    }

    #[test]
    fn resize_drains_before_releasing_images() {
        let mut renderer = renderer();
        renderer.render(0).unwrap();
        renderer.render(1).unwrap();
        let last = renderer.gate().last_signalled();
        let before = renderer.backend().events().len();

        renderer.resize(1024, 768).unwrap();

        let events = renderer.backend().events();
        let tail = &events[before..];
        let drained = tail
            .iter()
            .position(|event| *event == Event::Wait(last))
            .unwrap();
        let released = tail
            .iter()
            .position(|event| matches!(event, Event::ImageReleased { .. }))
            .unwrap();
        assert!(drained < released);
    }
}
