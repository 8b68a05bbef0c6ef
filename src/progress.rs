//! Progress notifications and cooperative cancellation.

use tracing::info;

/// Cancellation predicate polled between page transitions.
pub type CancelFn<'a> = dyn Fn() -> bool + Send + Sync + 'a;

/// Predicate for runs that are never cancelled.
#[must_use]
pub fn never_cancel() -> bool {
    false
}

/// Receives fire-and-forget progress updates from a harvest run.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, page: u32, status: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u32, &str) + Send + Sync,
{
    fn notify(&self, page: u32, status: &str) {
        self(page, status);
    }
}

/// Forwards progress to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn notify(&self, page: u32, status: &str) {
        info!(page, "{status}");
    }
}
