use std::time::Duration;

/// Result type used across the sample. Every post-initialisation failure is
/// fatal and travels up to `main` as an [`eyre::Report`].
pub type SampleResult<T, E = eyre::Report> = core::result::Result<T, E>;

/// Raised when a bounded wait on the execution queue expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitTimedOut {
    pub fence_value: Option<u64>,
    pub timeout: Duration,
}

impl std::fmt::Display for WaitTimedOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.fence_value {
            Some(value) => write!(
                f,
                "GPU did not retire fence value {} within {:?}",
                value, self.timeout
            ),
            None => write!(
                f,
                "presentation engine did not release an image within {:?}",
                self.timeout
            ),
        }
    }
}

impl std::error::Error for WaitTimedOut {}

/// Raised when a wait targets a fence value that was never signalled and
/// would therefore block forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeverSignalled {
    pub fence_value: u64,
    pub last_signalled: u64,
}

impl std::fmt::Display for NeverSignalled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "wait on fence value {} but the queue has only been signalled up to {}",
            self.fence_value, self.last_signalled
        )
    }
}

impl std::error::Error for NeverSignalled {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_the_fence_value() {
        let err = WaitTimedOut {
            fence_value: Some(7),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "GPU did not retire fence value 7 within 250ms"
        );
    }

    #[test]
    fn reports_can_be_downcast() {
        let report: eyre::Report = NeverSignalled {
            fence_value: 3,
            last_signalled: 1,
        }
        .into();
        let inner = report.downcast_ref::<NeverSignalled>();
        assert_eq!(inner.map(|e| e.fence_value), Some(3));
    }
}
