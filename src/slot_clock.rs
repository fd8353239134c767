//! Cycle and slot timing over a wrapping millisecond counter.
//!
//! The protocol's clock contract is a monotonic millisecond tick that wraps
//! at a fixed modulus, so every elapsed-time computation here is a modular
//! difference (`wrapping_sub`), never a signed subtraction. Deadline waits
//! are bounded polls with ~1 ms granularity rather than true sleeps: the
//! role tasks must stay responsive to their queues between checks, and no
//! wait may ever become indefinite.

use embassy_time::{Instant, Timer};

/// Sampling granularity of a deadline wait in milliseconds.
const POLL_GRANULARITY_MS: u64 = 1;

fn now_ticks() -> u32 {
    // Truncation is the wrap: the counter rolls over every ~49.7 days of
    // uptime and the modular math below stays correct across the roll.
    Instant::now().as_millis() as u32
}

/// Modular elapsed time between two tick values.
pub(crate) fn ticks_between(earlier: u32, later: u32) -> u32 {
    later.wrapping_sub(earlier)
}

/// A recorded point on the wrapping tick counter.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub(crate) struct Timestamp {
    ticks: u32,
}

impl Timestamp {
    pub(crate) fn now() -> Self {
        Timestamp { ticks: now_ticks() }
    }

    /// Milliseconds elapsed since this timestamp was recorded.
    pub(crate) fn elapsed_ms(&self) -> u32 {
        ticks_between(self.ticks, now_ticks())
    }
}

/// Records the start of a new cycle.
pub(crate) fn begin_cycle() -> Timestamp {
    Timestamp::now()
}

/// Idles until `offset_ms` after `origin`, polling at ~1 ms granularity.
/// Returns immediately if the deadline has already passed.
pub(crate) async fn wait_until(origin: Timestamp, offset_ms: u32) {
    while origin.elapsed_ms() < offset_ms {
        Timer::after_millis(POLL_GRANULARITY_MS).await;
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn ticks_between_counts_forward() {
        assert_eq!(ticks_between(100, 100), 0);
        assert_eq!(ticks_between(100, 350), 250);
    }

    #[test]
    fn ticks_between_survives_counter_wrap() {
        // 5 ticks before the wrap, 7 ticks after it
        assert_eq!(ticks_between(u32::MAX - 4, 2), 7);
        assert_eq!(ticks_between(u32::MAX, 0), 1);
    }

    #[test]
    fn elapsed_is_monotonic() {
        let stamp = Timestamp::now();
        let first = stamp.elapsed_ms();
        let second = stamp.elapsed_ms();
        assert!(second >= first);
    }

    #[test]
    fn wait_until_returns_for_passed_deadline() {
        let origin = Timestamp::now();
        // Offset zero is already reached; must not touch the timer.
        block_on(wait_until(origin, 0));
    }
}
