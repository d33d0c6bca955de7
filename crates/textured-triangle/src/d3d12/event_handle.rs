use eyre::bail;
use eyre::WrapErr;
use tracing::warn;
use windows::Win32::Foundation::*;
use windows::Win32::System::Threading::*;

use crate::backend::WaitTimeout;
use crate::error::SampleResult;
use crate::error::WaitTimedOut;

/// Owned OS wait handle, closed on drop.
#[derive(Debug)]
pub struct EventHandle(HANDLE);

impl EventHandle {
    /// Auto-reset event, initially unsignalled.
    pub fn new() -> SampleResult<Self> {
        let handle = unsafe { CreateEventW(None, false, false, None) }
            .wrap_err("failed to create fence event")?;
        Self::from_raw(handle)
    }

    /// Takes ownership of `handle`.
    pub fn from_raw(handle: HANDLE) -> SampleResult<Self> {
        if handle.is_invalid() {
            bail!("invalid wait handle");
        }
        Ok(Self(handle))
    }

    pub fn raw(&self) -> HANDLE {
        self.0
    }

    pub fn wait(&self, timeout: WaitTimeout, fence_value: Option<u64>) -> SampleResult<()> {
        let result = unsafe { WaitForSingleObjectEx(self.0, timeout.as_millis_u32(), false) };
        check_wait(result, timeout, fence_value)
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.0) } {
            warn!("Failed to close wait handle: {:?}", e);
        }
    }
}

/// Blocks until every handle in `handles` is signalled.
pub fn wait_for_all(
    handles: &[HANDLE],
    timeout: WaitTimeout,
    fence_value: Option<u64>,
) -> SampleResult<()> {
    let result = unsafe { WaitForMultipleObjects(handles, true, timeout.as_millis_u32()) };
    check_wait(result, timeout, fence_value)
}

fn check_wait(result: WAIT_EVENT, timeout: WaitTimeout, fence_value: Option<u64>) -> SampleResult<()> {
    if result == WAIT_TIMEOUT {
        return Err(WaitTimedOut {
            fence_value,
            timeout: timeout.duration().unwrap_or_default(),
        }
        .into());
    }
    if result == WAIT_FAILED {
        return Err(std::io::Error::last_os_error()).wrap_err("wait on GPU event failed");
    }
    Ok(())
}
