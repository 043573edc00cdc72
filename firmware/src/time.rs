//! Monotonic clock abstraction used by every bounded wait in the firmware.
//!
//! The Wi-Fi connect poll and the keystroke pacing both go through [`Clock`],
//! so on the device they become executor yield points and in tests they
//! advance a virtual clock instantly.

use embassy_time::{Duration, Instant};

/// Source of monotonic time that can also suspend the caller.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

impl<C: Clock> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await
    }
}

/// Absolute point in time after which a bounded wait gives up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(clock: &impl Clock, timeout: Duration) -> Self {
        let at = clock.now().checked_add(timeout).unwrap_or(Instant::MAX);
        Self { at }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn has_passed(&self, clock: &impl Clock) -> bool {
        clock.now() >= self.at
    }

    pub fn remaining(&self, clock: &impl Clock) -> Duration {
        self.at
            .checked_duration_since(clock.now())
            .unwrap_or(Duration::from_ticks(0))
    }
}

/// Clock backed by the embassy time driver.
#[cfg(target_arch = "xtensa")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyClock;

#[cfg(target_arch = "xtensa")]
impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        embassy_time::Timer::after(duration).await
    }
}
