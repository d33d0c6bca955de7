//! CPU-only [`GpuBackend`] that simulates an in-order execution queue.
//!
//! Signals retire in submission order once more than `latency` of them are
//! outstanding, or immediately when something waits on them. A stalled queue
//! retires nothing until it is resumed, so bounded waits on it report
//! [`WaitTimedOut`] instead of completing. Every device
//! call is appended to a shared [`Journal`] so callers can check ordering,
//! and misuse that a real driver would turn into undefined behaviour
//! (resetting a busy allocator, recreating the surface while images are
//! alive or work is in flight) is reported as an error instead.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::rc::Rc;

use eyre::bail;
use eyre::eyre;
use tracing::trace;

use crate::backend::GpuBackend;
use crate::backend::ResourceState;
use crate::backend::Viewport;
use crate::backend::WaitTimeout;
use crate::checkerboard::Checkerboard;
use crate::error::NeverSignalled;
use crate::error::SampleResult;
use crate::error::WaitTimedOut;
use crate::geometry::TRIANGLE_VERTEX_COUNT;
use crate::BACK_BUFFER_COUNT;
use crate::FRAMES_IN_FLIGHT;

const RTV_HEAP_START: usize = 0x1000;
const RTV_DESCRIPTOR_SIZE: usize = 0x20;

pub type Journal = Rc<RefCell<Vec<Event>>>;

/// Simulated render-target view: the CPU address of a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeadlessView(pub usize);

/// Something the backend was asked to do, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    AllocatorCreated(usize),
    AllocatorReset(usize),
    AllocatorReleased(usize),
    Signal(u64),
    Wait(u64),
    FrameWait(Option<u64>),
    SurfaceRecreated {
        width: u32,
        height: u32,
        generation: u32,
    },
    SurfaceReleased,
    ViewBound {
        image: usize,
        view: HeadlessView,
    },
    ImageReleased {
        image: usize,
        generation: u32,
    },
    Execute(Vec<Command>),
    Present(usize),
    UploadsFinished,
}

/// A command recorded into the shared command list.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Transition {
        image: usize,
        before: ResourceState,
        after: ResourceState,
    },
    Clear(HeadlessView),
    SetViewport(Viewport),
    Draw {
        vertex_count: u32,
    },
    CopyTexture {
        width: u32,
        height: u32,
        bytes: usize,
    },
    Overlay(&'static str),
}

#[derive(Debug, Default)]
pub struct HeadlessCommandList {
    commands: Vec<Command>,
    open: bool,
}

impl HeadlessCommandList {
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Debug)]
pub struct HeadlessAllocator {
    id: usize,
    journal: Journal,
}

impl Drop for HeadlessAllocator {
    fn drop(&mut self) {
        self.journal
            .borrow_mut()
            .push(Event::AllocatorReleased(self.id));
    }
}

#[derive(Debug)]
pub struct HeadlessImage {
    index: usize,
    generation: u32,
    width: u32,
    height: u32,
    journal: Journal,
    live_images: Rc<Cell<usize>>,
}

impl HeadlessImage {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for HeadlessImage {
    fn drop(&mut self) {
        self.live_images.set(self.live_images.get() - 1);
        self.journal.borrow_mut().push(Event::ImageReleased {
            image: self.index,
            generation: self.generation,
        });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadlessOverlayBinding {
    pub frames_in_flight: usize,
    pub font_descriptor: usize,
}

#[derive(Debug)]
struct SurfaceState {
    width: u32,
    height: u32,
    generation: u32,
    current: usize,
}

pub struct HeadlessBackend {
    journal: Journal,
    latency: usize,
    stalled: bool,
    completed: u64,
    last_signalled: u64,
    in_flight: VecDeque<u64>,
    blocking_waits: usize,
    frame_waits: Vec<Option<u64>>,
    next_allocator_id: usize,
    // Allocators submitted since the last signal, then the fence value that retires each.
    unsignalled_allocators: Vec<usize>,
    allocator_fences: HashMap<usize, u64>,
    recording_allocator: Option<usize>,
    command_list: HeadlessCommandList,
    surface: Option<SurfaceState>,
    generation: u32,
    live_images: Rc<Cell<usize>>,
    presented: u64,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// A queue that keeps up to two signals in flight.
    pub fn new() -> Self {
        Self::with_latency(2)
    }

    /// A queue that keeps up to `latency` signals in flight before retiring
    /// the oldest one.
    pub fn with_latency(latency: usize) -> Self {
        Self {
            journal: Journal::default(),
            latency,
            stalled: false,
            completed: 0,
            last_signalled: 0,
            in_flight: VecDeque::new(),
            blocking_waits: 0,
            frame_waits: Vec::new(),
            next_allocator_id: 0,
            unsignalled_allocators: Vec::new(),
            allocator_fences: HashMap::new(),
            recording_allocator: None,
            command_list: HeadlessCommandList::default(),
            surface: None,
            generation: 0,
            live_images: Rc::new(Cell::new(0)),
            presented: 0,
        }
    }

    /// A queue that has stopped making progress: signals are accepted but
    /// never retire on their own.
    pub fn stalled() -> Self {
        let mut backend = Self::with_latency(usize::MAX);
        backend.stalled = true;
        backend
    }

    /// Stops or resumes retirement. While stalled, bounded waits on
    /// outstanding values fail with [`WaitTimedOut`] and unbounded ones fail
    /// rather than hang.
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn journal(&self) -> Journal {
        Rc::clone(&self.journal)
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal.borrow().clone()
    }

    /// Number of waits that actually had to block.
    pub fn blocking_waits(&self) -> usize {
        self.blocking_waits
    }

    /// Fence value each frame wait included, in call order.
    pub fn frame_waits(&self) -> &[Option<u64>] {
        &self.frame_waits
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Retires everything signalled so far, as if the GPU caught up.
    pub fn retire_all(&mut self) {
        if let Some(&last) = self.in_flight.back() {
            self.completed = last;
        }
        self.in_flight.clear();
    }

    fn log(&self, event: Event) {
        self.journal.borrow_mut().push(event);
    }

    fn retire_until(&mut self, value: u64, timeout: WaitTimeout) -> SampleResult<()> {
        if value > self.last_signalled {
            return Err(NeverSignalled {
                fence_value: value,
                last_signalled: self.last_signalled,
            }
            .into());
        }
        if self.completed >= value {
            return Ok(());
        }
        if self.stalled {
            return match timeout {
                WaitTimeout::After(timeout) => Err(WaitTimedOut {
                    fence_value: Some(value),
                    timeout,
                }
                .into()),
                WaitTimeout::Infinite => {
                    bail!("unbounded wait on fence value {value} while the queue is stalled")
                }
            };
        }
        self.blocking_waits += 1;
        while self.completed < value {
            match self.in_flight.pop_front() {
                Some(retired) => self.completed = retired,
                None => bail!("fence value {value} is signalled but not in flight"),
            }
        }
        Ok(())
    }
}

impl GpuBackend for HeadlessBackend {
    type Allocator = HeadlessAllocator;
    type Image = HeadlessImage;
    type View = HeadlessView;
    type CommandList = HeadlessCommandList;
    type OverlayBinding = HeadlessOverlayBinding;

    fn create_allocator(&mut self) -> SampleResult<Self::Allocator> {
        let id = self.next_allocator_id;
        self.next_allocator_id += 1;
        self.log(Event::AllocatorCreated(id));
        Ok(HeadlessAllocator {
            id,
            journal: self.journal(),
        })
    }

    fn view_handle(&self, index: usize) -> Self::View {
        HeadlessView(RTV_HEAP_START + index * RTV_DESCRIPTOR_SIZE)
    }

    fn overlay_binding(&self) -> Self::OverlayBinding {
        HeadlessOverlayBinding {
            frames_in_flight: FRAMES_IN_FLIGHT,
            font_descriptor: 0,
        }
    }

    fn completed_value(&self) -> u64 {
        self.completed
    }

    fn signal(&mut self, value: u64) -> SampleResult<()> {
        if value <= self.last_signalled {
            bail!(
                "fence values must increase: signalled {value} after {}",
                self.last_signalled
            );
        }
        self.log(Event::Signal(value));
        self.last_signalled = value;
        for id in self.unsignalled_allocators.drain(..) {
            self.allocator_fences.insert(id, value);
        }
        self.in_flight.push_back(value);
        while !self.stalled && self.in_flight.len() > self.latency {
            if let Some(retired) = self.in_flight.pop_front() {
                self.completed = retired;
            }
        }
        trace!(value, completed = self.completed, "headless signal");
        Ok(())
    }

    fn wait_for_value(&mut self, value: u64, timeout: WaitTimeout) -> SampleResult<()> {
        self.log(Event::Wait(value));
        self.retire_until(value, timeout)
    }

    fn wait_for_frame(
        &mut self,
        fence_value: Option<u64>,
        timeout: WaitTimeout,
    ) -> SampleResult<()> {
        self.log(Event::FrameWait(fence_value));
        self.frame_waits.push(fence_value);
        match fence_value {
            Some(value) => self.retire_until(value, timeout),
            None => Ok(()),
        }
    }

    fn recreate_surface(&mut self, width: u32, height: u32) -> SampleResult<()> {
        if self.live_images.get() != 0 {
            bail!(
                "surface recreated while {} of its images are still referenced",
                self.live_images.get()
            );
        }
        if self.completed < self.last_signalled {
            bail!(
                "surface recreated with work in flight (completed {}, signalled {})",
                self.completed,
                self.last_signalled
            );
        }
        self.generation += 1;
        self.surface = Some(SurfaceState {
            width,
            height,
            generation: self.generation,
            current: 0,
        });
        self.log(Event::SurfaceRecreated {
            width,
            height,
            generation: self.generation,
        });
        Ok(())
    }

    fn release_surface(&mut self) {
        if self.surface.take().is_some() {
            self.log(Event::SurfaceReleased);
        }
    }

    fn surface_image(&self, index: usize) -> SampleResult<Self::Image> {
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| eyre!("no presentation surface"))?;
        if index >= BACK_BUFFER_COUNT {
            bail!("surface image {index} out of range");
        }
        self.live_images.set(self.live_images.get() + 1);
        Ok(HeadlessImage {
            index,
            generation: surface.generation,
            width: surface.width,
            height: surface.height,
            journal: self.journal(),
            live_images: Rc::clone(&self.live_images),
        })
    }

    fn bind_view(&self, image: &Self::Image, view: Self::View) {
        self.log(Event::ViewBound {
            image: image.index,
            view,
        });
    }

    fn current_image_index(&self) -> usize {
        self.surface.as_ref().map_or(0, |surface| surface.current)
    }

    fn present(&mut self) -> SampleResult<()> {
        let surface = self
            .surface
            .as_mut()
            .ok_or_else(|| eyre!("present without a presentation surface"))?;
        let presented = surface.current;
        surface.current = (surface.current + 1) % BACK_BUFFER_COUNT;
        self.presented += 1;
        self.log(Event::Present(presented));
        Ok(())
    }

    fn begin_frame(&mut self, allocator: &mut Self::Allocator) -> SampleResult<()> {
        if self.command_list.open {
            bail!("command list reset while still recording");
        }
        if self.unsignalled_allocators.contains(&allocator.id) {
            bail!("allocator {} reset before its submission was fenced", allocator.id);
        }
        if let Some(&fence) = self.allocator_fences.get(&allocator.id) {
            if fence > self.completed {
                bail!(
                    "allocator {} reset while the GPU may still use it (fence {fence}, completed {})",
                    allocator.id,
                    self.completed
                );
            }
        }
        self.log(Event::AllocatorReset(allocator.id));
        self.recording_allocator = Some(allocator.id);
        self.command_list.commands.clear();
        self.command_list.open = true;
        Ok(())
    }

    fn transition(&mut self, image: &Self::Image, before: ResourceState, after: ResourceState) {
        self.command_list.push(Command::Transition {
            image: image.index,
            before,
            after,
        });
    }

    fn draw_scene(&mut self, target: Self::View, viewport: Viewport) {
        self.command_list.push(Command::Clear(target));
        self.command_list.push(Command::SetViewport(viewport));
        self.command_list.push(Command::Draw {
            vertex_count: TRIANGLE_VERTEX_COUNT,
        });
    }

    fn command_list(&mut self) -> &mut Self::CommandList {
        &mut self.command_list
    }

    fn submit(&mut self) -> SampleResult<()> {
        if !self.command_list.open {
            bail!("submit without an open command list");
        }
        self.command_list.open = false;
        if let Some(id) = self.recording_allocator.take() {
            self.unsignalled_allocators.push(id);
        }
        let commands = std::mem::take(&mut self.command_list.commands);
        self.log(Event::Execute(commands));
        Ok(())
    }

    fn record_uploads(&mut self) -> SampleResult<()> {
        if !self.command_list.open {
            bail!("uploads recorded without an open command list");
        }
        let texture = Checkerboard::default();
        self.command_list.push(Command::CopyTexture {
            width: texture.width(),
            height: texture.height(),
            bytes: texture.generate().len(),
        });
        Ok(())
    }

    fn finish_uploads(&mut self) -> SampleResult<()> {
        if self.completed < self.last_signalled {
            bail!("staging memory released before the upload retired");
        }
        self.log(Event::UploadsFinished);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn signals_retire_in_order_past_the_latency() {
        let mut backend = HeadlessBackend::with_latency(2);
        for value in 1..=3 {
            backend.signal(value).unwrap();
        }
        assert_eq!(backend.completed_value(), 1);
        assert_eq!(backend.in_flight(), 2);
    }

    #[test]
    fn waiting_on_an_unsignalled_value_is_an_error() {
        let mut backend = HeadlessBackend::new();
        backend.signal(1).unwrap();
        let err = backend
            .wait_for_value(5, WaitTimeout::Infinite)
            .unwrap_err();
        assert!(err.downcast_ref::<NeverSignalled>().is_some());
    }

    #[test]
    fn bounded_wait_on_a_stalled_queue_times_out() {
        let mut backend = HeadlessBackend::stalled();
        backend.signal(1).unwrap();
        let err = backend
            .wait_for_value(1, WaitTimeout::After(Duration::ZERO))
            .unwrap_err();
        let timed_out = err.downcast_ref::<WaitTimedOut>().unwrap();
        assert_eq!(timed_out.fence_value, Some(1));
        assert_eq!(timed_out.timeout, Duration::ZERO);
        assert_eq!(backend.completed_value(), 0);
        assert_eq!(backend.blocking_waits(), 0);
    }

    #[test]
    fn stalled_frame_wait_reports_the_fence_value() {
        let mut backend = HeadlessBackend::new();
        backend.set_stalled(true);
        for value in 1..=4 {
            backend.signal(value).unwrap();
        }
        assert_eq!(backend.completed_value(), 0);

        let timeout = Duration::from_millis(5);
        let err = backend
            .wait_for_frame(Some(3), WaitTimeout::After(timeout))
            .unwrap_err();
        let timed_out = err.downcast_ref::<WaitTimedOut>().unwrap();
        assert_eq!(timed_out.fence_value, Some(3));
        assert_eq!(timed_out.timeout, timeout);

        backend.wait_for_frame(None, WaitTimeout::After(timeout)).unwrap();
    }

    #[test]
    fn unbounded_wait_on_a_stalled_queue_fails_instead_of_hanging() {
        let mut backend = HeadlessBackend::stalled();
        backend.signal(1).unwrap();
        let err = backend.wait_for_value(1, WaitTimeout::Infinite).unwrap_err();
        assert!(err.downcast_ref::<WaitTimedOut>().is_none());

        backend.set_stalled(false);
        backend.wait_for_value(1, WaitTimeout::Infinite).unwrap();
        assert_eq!(backend.completed_value(), 1);
    }

    #[test]
    fn decreasing_signal_is_rejected() {
        let mut backend = HeadlessBackend::new();
        backend.signal(2).unwrap();
        assert!(backend.signal(2).is_err());
    }

    #[test]
    fn busy_allocator_cannot_be_reset() {
        let mut backend = HeadlessBackend::with_latency(4);
        let mut allocator = backend.create_allocator().unwrap();

        backend.begin_frame(&mut allocator).unwrap();
        backend.submit().unwrap();
        backend.signal(1).unwrap();
        assert!(backend.begin_frame(&mut allocator).is_err());

        backend.retire_all();
        backend.begin_frame(&mut allocator).unwrap();
    }

    #[test]
    fn surface_cannot_be_recreated_while_images_live() {
        let mut backend = HeadlessBackend::new();
        backend.recreate_surface(64, 64).unwrap();
        let image = backend.surface_image(0).unwrap();
        assert!(backend.recreate_surface(64, 64).is_err());
        drop(image);
        backend.recreate_surface(64, 64).unwrap();
    }

    #[test]
    fn present_rotates_the_current_image() {
        let mut backend = HeadlessBackend::new();
        backend.recreate_surface(64, 64).unwrap();
        let mut seen = Vec::new();
        for _ in 0..=BACK_BUFFER_COUNT {
            seen.push(backend.current_image_index());
            backend.present().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 0]);
    }

    #[test]
    fn releases_are_journaled() {
        let backend = HeadlessBackend::new();
        let journal = backend.journal();
        let mut backend = backend;
        let allocator = backend.create_allocator().unwrap();
        drop(allocator);
        assert_eq!(
            journal.borrow().as_slice(),
            &[Event::AllocatorCreated(0), Event::AllocatorReleased(0)]
        );
    }
}
