//! Real-time pacing for a running engine.

use std::time::{Duration, Instant};

/// Maps wall-clock time onto a target tick count.
///
/// The target is `anchor_ticks + elapsed * clock_hz * speed`. The pacer is
/// re-anchored whenever the engine's ticks move for reasons other than
/// real-time running (seeks, explicit runs, stalls, speed changes), so the
/// engine never tries to catch up on time it did not spend running.
#[derive(Debug, Clone)]
pub(crate) struct Pacer {
    clock_hz: u64,
    speed: u64,
    anchor_time: Instant,
    anchor_ticks: u64,
}

impl Pacer {
    pub(crate) fn new(clock_hz: u64) -> Self {
        Self {
            clock_hz,
            speed: 1,
            anchor_time: Instant::now(),
            anchor_ticks: 0,
        }
    }

    /// Restart pacing from `ticks` at `now`.
    pub(crate) fn anchor(&mut self, ticks: u64, now: Instant) {
        self.anchor_ticks = ticks;
        self.anchor_time = now;
    }

    /// Change the speed multiplier, re-anchoring at `ticks`.
    pub(crate) fn set_speed(&mut self, speed: u64, ticks: u64, now: Instant) {
        self.speed = speed.max(1);
        self.anchor(ticks, now);
    }

    /// Tick count the engine should have reached by `now`.
    pub(crate) fn target_ticks(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.anchor_time);
        self.anchor_ticks.saturating_add(self.ticks_in(elapsed))
    }

    fn ticks_in(&self, elapsed: Duration) -> u64 {
        let ticks = elapsed.as_nanos() * u128::from(self.clock_hz) * u128::from(self.speed)
            / 1_000_000_000;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}
