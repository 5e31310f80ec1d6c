//! Clock that records requested sleeps instead of waiting.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::ports::clock::{Clock, SleepFuture};

/// Clock whose time only moves when something sleeps on it.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

struct ManualState {
    now: DateTime<Utc>,
    slept: Vec<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { state: Mutex::new(ManualState { now: start, slept: Vec::new() }) }
    }

    /// Every duration passed to [`Clock::sleep`], in call order.
    #[must_use]
    pub fn slept(&self) -> Vec<Duration> {
        self.state.lock().map(|s| s.slept.clone()).unwrap_or_default()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().map_or_else(|_| Utc::now(), |s| s.now)
    }

    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        if let Ok(mut state) = self.state.lock() {
            state.slept.push(duration);
            if let Ok(step) = chrono::Duration::from_std(duration) {
                state.now += step;
            }
        }
        Box::pin(std::future::ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn sleeping_advances_time_and_is_recorded() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);

        clock.sleep(Duration::from_secs(1)).await;
        clock.sleep(Duration::from_secs(2)).await;

        assert_eq!(clock.slept(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert_eq!(clock.now(), start + chrono::Duration::seconds(3));
    }
}
