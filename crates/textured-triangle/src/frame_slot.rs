use eyre::eyre;
use tracing::trace;

use crate::backend::GpuBackend;
use crate::error::SampleResult;
use crate::sync_gate::SynchronizationGate;

/// One frame's worth of command-recording memory plus the fence value that
/// retires it. A marker of 0 means nothing is outstanding.
#[derive(Debug)]
pub struct FrameSlot<A> {
    pub allocator: A,
    completion_marker: u64,
}

impl<A> FrameSlot<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            completion_marker: 0,
        }
    }

    pub fn completion_marker(&self) -> u64 {
        self.completion_marker
    }

    /// The outstanding marker, if any, without clearing it.
    pub fn pending_marker(&self) -> Option<u64> {
        match self.completion_marker {
            0 => None,
            marker => Some(marker),
        }
    }

    pub(crate) fn record(&mut self, marker: u64) {
        self.completion_marker = marker;
    }

    /// Clears the marker, returning it if one was outstanding.
    pub(crate) fn take_marker(&mut self) -> Option<u64> {
        match std::mem::take(&mut self.completion_marker) {
            0 => None,
            marker => Some(marker),
        }
    }
}

/// Fixed ring of frame slots bounding how far the CPU may record ahead.
pub struct FrameSlotPool<A, const N: usize> {
    slots: [FrameSlot<A>; N],
    frame_index: u64,
}

impl<A, const N: usize> FrameSlotPool<A, N> {
    /// Creates `N` slots, one allocator each.
    pub fn new<F>(mut create_allocator: F) -> SampleResult<Self>
    where
        F: FnMut() -> SampleResult<A>,
    {
        let slots = array_init::try_array_init(|_| create_allocator().map(FrameSlot::new))?;
        Ok(Self {
            slots,
            frame_index: 0,
        })
    }

    pub const fn len(&self) -> usize {
        N
    }

    /// Total number of frames acquired so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Slot the most recent acquisition returned.
    pub fn current_index(&self) -> usize {
        (self.frame_index % N as u64) as usize
    }

    pub fn slot(&self, index: usize) -> SampleResult<&FrameSlot<A>> {
        self.slots
            .get(index)
            .ok_or_else(|| eyre!("frame slot {index} out of range (pool holds {N})"))
    }

    pub fn slot_mut(&mut self, index: usize) -> SampleResult<&mut FrameSlot<A>> {
        self.slots
            .get_mut(index)
            .ok_or_else(|| eyre!("frame slot {index} out of range (pool holds {N})"))
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut FrameSlot<A>> {
        self.slots.iter_mut()
    }

    /// Rotates to the next slot and blocks until both its previous
    /// submission has retired and the presentation engine can take another
    /// image. The two conditions are waited on jointly. If the wait fails the
    /// pool does not rotate and the slot keeps its marker.
    pub fn acquire_next<B>(
        &mut self,
        gate: &SynchronizationGate,
        backend: &mut B,
    ) -> SampleResult<usize>
    where
        B: GpuBackend<Allocator = A>,
    {
        let frame_index = self.frame_index + 1;
        let index = (frame_index % N as u64) as usize;
        let pending = self.slots[index].pending_marker();
        trace!(frame = frame_index, slot = index, ?pending, "acquiring frame slot");
        gate.wait_for_frame(backend, pending)?;
        self.slots[index].take_marker();
        self.frame_index = frame_index;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::WaitTimeout;
    use crate::error::WaitTimedOut;
    use crate::headless::HeadlessBackend;

    fn pool(backend: &mut HeadlessBackend) -> FrameSlotPool<crate::headless::HeadlessAllocator, 3> {
        FrameSlotPool::new(|| backend.create_allocator()).unwrap()
    }

    #[test]
    fn markers_start_at_zero() {
        let mut backend = HeadlessBackend::new();
        let pool = pool(&mut backend);
        for index in 0..pool.len() {
            assert_eq!(pool.slot(index).unwrap().completion_marker(), 0);
        }
    }

    #[test]
    fn rotation_returns_to_start_after_pool_len_acquisitions() {
        let mut backend = HeadlessBackend::new();
        let mut pool = pool(&mut backend);
        let gate = SynchronizationGate::default();

        let start = pool.current_index();
        let visited: Vec<usize> = (0..pool.len())
            .map(|_| pool.acquire_next(&gate, &mut backend).unwrap())
            .collect();

        assert_eq!(visited, vec![1, 2, 0]);
        assert_eq!(pool.current_index(), start);
        assert_eq!(pool.frame_index(), 3);
    }

    #[test]
    fn acquire_clears_the_slot_marker() {
        let mut backend = HeadlessBackend::new();
        let mut pool = pool(&mut backend);
        let mut gate = SynchronizationGate::default();

        let index = pool.acquire_next(&gate, &mut backend).unwrap();
        gate.advance_and_record(&mut backend, pool.slot_mut(index).unwrap())
            .unwrap();
        assert_eq!(pool.slot(index).unwrap().completion_marker(), 1);

        for _ in 0..pool.len() {
            pool.acquire_next(&gate, &mut backend).unwrap();
        }
        assert_eq!(pool.slot(index).unwrap().completion_marker(), 0);
    }

    #[test]
    fn timed_out_acquire_keeps_the_marker_and_slot() {
        let mut backend = HeadlessBackend::stalled();
        let mut pool = pool(&mut backend);
        let mut gate = SynchronizationGate::new(WaitTimeout::After(Duration::from_millis(1)));

        for _ in 0..pool.len() {
            let index = pool.acquire_next(&gate, &mut backend).unwrap();
            gate.advance_and_record(&mut backend, pool.slot_mut(index).unwrap())
                .unwrap();
        }
        assert_eq!(pool.frame_index(), 3);

        let err = pool.acquire_next(&gate, &mut backend).unwrap_err();
        assert_eq!(
            err.downcast_ref::<WaitTimedOut>().unwrap().fence_value,
            Some(1)
        );
        assert_eq!(pool.frame_index(), 3);
        assert_eq!(pool.slot(1).unwrap().pending_marker(), Some(1));

        backend.set_stalled(false);
        assert_eq!(pool.acquire_next(&gate, &mut backend).unwrap(), 1);
        assert_eq!(pool.slot(1).unwrap().pending_marker(), None);
        assert_eq!(pool.frame_index(), 4);
    }

    #[test]
    fn out_of_range_slot_is_an_error() {
        let mut backend = HeadlessBackend::new();
        let pool = pool(&mut backend);
        assert!(pool.slot(3).is_err());
    }
}
