use tracing::debug;
use tracing::trace;

use crate::backend::GpuBackend;
use crate::backend::WaitTimeout;
use crate::error::SampleResult;
use crate::frame_slot::FrameSlot;

/// Monotonic fence counter shared by every submission on the execution queue.
///
/// Work submitted before a signal of `n` has finished once the device reports
/// a completed value of at least `n`. The counter never decreases.
#[derive(Debug, Default)]
pub struct SynchronizationGate {
    last_signalled: u64,
    timeout: WaitTimeout,
}

impl SynchronizationGate {
    pub fn new(timeout: WaitTimeout) -> Self {
        Self {
            last_signalled: 0,
            timeout,
        }
    }

    pub fn last_signalled(&self) -> u64 {
        self.last_signalled
    }

    /// Blocks until the work last recorded into `slot` has retired, then
    /// clears the slot's marker. Returns immediately, without a blocking
    /// call, when nothing is outstanding or the marker already retired. A
    /// failed wait leaves the marker in place.
    pub fn wait_for_slot<B>(&self, backend: &mut B, slot: &mut FrameSlot<B::Allocator>) -> SampleResult<()>
    where
        B: GpuBackend,
    {
        let Some(marker) = slot.pending_marker() else {
            return Ok(());
        };
        if backend.completed_value() < marker {
            trace!(marker, "waiting for frame slot to retire");
            backend.wait_for_value(marker, self.timeout)?;
        }
        slot.take_marker();
        Ok(())
    }

    /// Signals the next counter value behind everything submitted so far and
    /// records it as `slot`'s completion marker.
    pub fn advance_and_record<B>(
        &mut self,
        backend: &mut B,
        slot: &mut FrameSlot<B::Allocator>,
    ) -> SampleResult<u64>
    where
        B: GpuBackend,
    {
        let value = self.signal_next(backend)?;
        slot.record(value);
        Ok(value)
    }

    /// Signals the next counter value without tying it to a frame slot.
    /// Used for one-off submissions such as resource uploads.
    pub fn signal_next<B: GpuBackend>(&mut self, backend: &mut B) -> SampleResult<u64> {
        let value = self.last_signalled + 1;
        backend.signal(value)?;
        self.last_signalled = value;
        Ok(value)
    }

    /// Joint wait used by frame acquisition: presentation engine ready and,
    /// if given, `marker` retired. An already retired marker is dropped from
    /// the wait.
    pub fn wait_for_frame<B: GpuBackend>(&self, backend: &mut B, marker: Option<u64>) -> SampleResult<()> {
        let marker = marker.filter(|&value| backend.completed_value() < value);
        backend.wait_for_frame(marker, self.timeout)
    }

    /// Blocks until everything ever signalled has retired.
    pub fn drain<B: GpuBackend>(&self, backend: &mut B) -> SampleResult<()> {
        if self.last_signalled == 0 || backend.completed_value() >= self.last_signalled {
            return Ok(());
        }
        debug!(value = self.last_signalled, "draining execution queue");
        backend.wait_for_value(self.last_signalled, self.timeout)
    }

    /// [`drain`](Self::drain), then clear every slot marker since they have
    /// all retired.
    pub fn drain_slots<'a, B, I>(&self, backend: &mut B, slots: I) -> SampleResult<()>
    where
        B: GpuBackend,
        B::Allocator: 'a,
        I: IntoIterator<Item = &'a mut FrameSlot<B::Allocator>>,
    {
        self.drain(backend)?;
        for slot in slots {
            slot.take_marker();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::WaitTimedOut;
    use crate::headless::HeadlessBackend;
    use crate::headless::HeadlessAllocator;

    fn slot(backend: &mut HeadlessBackend) -> FrameSlot<HeadlessAllocator> {
        FrameSlot::new(backend.create_allocator().unwrap())
    }

    #[test]
    fn counter_is_monotonic_and_recorded_in_slot() {
        let mut backend = HeadlessBackend::new();
        let mut gate = SynchronizationGate::default();
        let mut first = slot(&mut backend);
        let mut second = slot(&mut backend);

        assert_eq!(gate.advance_and_record(&mut backend, &mut first).unwrap(), 1);
        assert_eq!(gate.advance_and_record(&mut backend, &mut second).unwrap(), 2);
        assert_eq!(first.completion_marker(), 1);
        assert_eq!(second.completion_marker(), 2);
        assert_eq!(gate.last_signalled(), 2);
    }

    #[test]
    fn unsubmitted_slot_is_a_no_op() {
        let mut backend = HeadlessBackend::new();
        let gate = SynchronizationGate::default();
        let mut idle = slot(&mut backend);

        gate.wait_for_slot(&mut backend, &mut idle).unwrap();
        assert_eq!(backend.blocking_waits(), 0);
    }

    #[test]
    fn retired_marker_takes_the_fast_path() {
        let mut backend = HeadlessBackend::with_latency(0);
        let mut gate = SynchronizationGate::default();
        let mut submitted = slot(&mut backend);

        gate.advance_and_record(&mut backend, &mut submitted).unwrap();
        assert!(backend.completed_value() >= submitted.completion_marker());

        gate.wait_for_slot(&mut backend, &mut submitted).unwrap();
        assert_eq!(backend.blocking_waits(), 0);
        assert_eq!(submitted.completion_marker(), 0);
    }

    #[test]
    fn outstanding_marker_blocks_then_resets() {
        let mut backend = HeadlessBackend::with_latency(4);
        let mut gate = SynchronizationGate::default();
        let mut submitted = slot(&mut backend);

        gate.advance_and_record(&mut backend, &mut submitted).unwrap();
        assert_eq!(backend.completed_value(), 0);

        gate.wait_for_slot(&mut backend, &mut submitted).unwrap();
        assert_eq!(backend.blocking_waits(), 1);
        assert_eq!(backend.completed_value(), 1);
        assert_eq!(submitted.completion_marker(), 0);
    }

    #[test]
    fn timed_out_slot_wait_keeps_the_marker() {
        let mut backend = HeadlessBackend::stalled();
        let timeout = Duration::from_millis(1);
        let mut gate = SynchronizationGate::new(WaitTimeout::After(timeout));
        let mut submitted = slot(&mut backend);

        gate.advance_and_record(&mut backend, &mut submitted).unwrap();
        let err = gate.wait_for_slot(&mut backend, &mut submitted).unwrap_err();
        let timed_out = err.downcast_ref::<WaitTimedOut>().unwrap();
        assert_eq!(timed_out.fence_value, Some(1));
        assert_eq!(timed_out.timeout, timeout);
        assert_eq!(submitted.completion_marker(), 1);

        backend.set_stalled(false);
        gate.wait_for_slot(&mut backend, &mut submitted).unwrap();
        assert_eq!(submitted.completion_marker(), 0);
    }

    #[test]
    fn timed_out_drain_leaves_slot_markers() {
        let mut backend = HeadlessBackend::stalled();
        let mut gate = SynchronizationGate::new(WaitTimeout::After(Duration::ZERO));
        let mut slots = [slot(&mut backend), slot(&mut backend)];

        for slot in slots.iter_mut() {
            gate.advance_and_record(&mut backend, slot).unwrap();
        }
        let err = gate
            .drain_slots(&mut backend, slots.iter_mut())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<WaitTimedOut>().unwrap().fence_value,
            Some(2)
        );
        assert_eq!(slots[0].completion_marker(), 1);
        assert_eq!(slots[1].completion_marker(), 2);
    }

    #[test]
    fn drain_retires_everything_and_clears_markers() {
        let mut backend = HeadlessBackend::with_latency(8);
        let mut gate = SynchronizationGate::default();
        let mut slots = [slot(&mut backend), slot(&mut backend)];

        for slot in slots.iter_mut() {
            gate.advance_and_record(&mut backend, slot).unwrap();
        }
        gate.drain_slots(&mut backend, slots.iter_mut()).unwrap();

        assert_eq!(backend.completed_value(), gate.last_signalled());
        assert!(slots.iter().all(|slot| slot.completion_marker() == 0));
    }

    #[test]
    fn frame_wait_skips_retired_fence() {
        let mut backend = HeadlessBackend::with_latency(0);
        let mut gate = SynchronizationGate::default();
        let value = gate.signal_next(&mut backend).unwrap();

        gate.wait_for_frame(&mut backend, Some(value)).unwrap();
        assert_eq!(backend.frame_waits().last(), Some(&None));
    }
}
