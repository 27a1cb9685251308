use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::time::timeout;

use crate::types::Stats;

/// Upper bound of every wait in tests.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// An [`Arc<Notify>`] whose waits panic after a timeout.
#[derive(Clone)]
pub struct TimedNotify {
    notify: Arc<Notify>,
    timeout_duration: Duration,
}

impl TimedNotify {
    pub fn new(notify: Arc<Notify>) -> Self {
        Self::with_timeout(notify, DEFAULT_NOTIFY_TIMEOUT)
    }

    pub fn with_timeout(notify: Arc<Notify>, timeout_duration: Duration) -> Self {
        Self {
            notify,
            timeout_duration,
        }
    }

    /// Waits for the notification.
    ///
    /// # Panics
    ///
    /// Panics when the timeout elapses first.
    pub async fn notified(&self) {
        if timeout(self.timeout_duration, self.notify.notified())
            .await
            .is_err()
        {
            panic!(
                "test notification timed out after {:?}, the awaited condition was never reached",
                self.timeout_duration
            );
        }
    }
}

impl fmt::Debug for TimedNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedNotify")
            .field("timeout_duration", &self.timeout_duration)
            .finish()
    }
}

/// Waits until a progress snapshot satisfies `condition` and returns it.
///
/// # Panics
///
/// Panics after [`DEFAULT_NOTIFY_TIMEOUT`] or when the progress channel closes.
pub async fn wait_for_progress<F>(progress_rx: &mut watch::Receiver<Stats>, condition: F) -> Stats
where
    F: FnMut(&Stats) -> bool,
{
    let snapshot = timeout(DEFAULT_NOTIFY_TIMEOUT, progress_rx.wait_for(condition))
        .await
        .expect("progress condition was not reached in time")
        .expect("progress channel closed");

    *snapshot
}
