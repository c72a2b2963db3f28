//! Progress reporting.

/// A sink for human-readable status messages.
///
/// Only the most recent message matters. Implementations should not assume
/// they will see every message, or see them in any particular order when
/// pages are being processed concurrently.
pub trait ProgressReporter: Send + Sync {
    /// Report a new status.
    fn report(&self, status: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, status: &str) {
        self(status)
    }
}

/// A reporter which discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _status: &str) {}
}
