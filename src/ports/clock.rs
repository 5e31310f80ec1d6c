//! Clock port for reading the time and waiting.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Boxed future returned by [`Clock::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Provides the current time and suspends for a duration.
///
/// Backoff and cooldown waits go through this trait so tests can observe the
/// requested delays without actually waiting.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the calling task for `duration`.
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}
