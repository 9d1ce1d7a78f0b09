//! Simulation Clock
//!
//! Monotonic tick counter with two modes:
//!
//! - **Fixed rate**: ticks are derived from elapsed wall time times the tick
//!   rate, so a process that falls behind catches up on its next call.
//! - **Uncapped**: every call advances exactly one tick (headless / batch).
//!
//! The start time can be rebased so a client can adopt the server's
//! authoritative game time.

use std::time::{Duration, Instant};
use tracing::warn;

use super::ids::Tick;

/// How ticks relate to wall time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockMode {
    /// Ticks follow wall time at the given rate (Hz).
    FixedRate(u32),
    /// One tick per call to [`Clock::tick`].
    Uncapped,
}

impl ClockMode {
    /// Fixed rate for `Some(rate)` with a non-zero rate, uncapped otherwise.
    pub fn from_rate(rate: Option<u32>) -> Self {
        match rate {
            Some(rate) if rate > 0 => ClockMode::FixedRate(rate),
            _ => ClockMode::Uncapped,
        }
    }
}

/// Tick counter.
#[derive(Clone, Debug)]
pub struct Clock {
    mode: ClockMode,
    start: Instant,
    tick: Tick,
}

impl Clock {
    /// Create a clock starting now at tick 0.
    pub fn new(mode: ClockMode) -> Self {
        Self::starting_at(mode, Instant::now())
    }

    /// Create a clock with an explicit start instant.
    pub fn starting_at(mode: ClockMode, start: Instant) -> Self {
        Self { mode, start, tick: 0 }
    }

    /// Current mode.
    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Change the tick rate (`None` or 0 switches to uncapped).
    pub fn set_tick_rate(&mut self, rate: Option<u32>) {
        self.mode = ClockMode::from_rate(rate);
    }

    /// Wall-clock length of one tick, if running at a fixed rate.
    pub fn tick_duration(&self) -> Option<Duration> {
        match self.mode {
            ClockMode::FixedRate(rate) => Some(Duration::from_secs_f64(1.0 / rate as f64)),
            ClockMode::Uncapped => None,
        }
    }

    /// Current tick.
    #[inline]
    pub fn ticks(&self) -> Tick {
        self.tick
    }

    /// Instant the game time is measured from.
    pub fn start_time(&self) -> Instant {
        self.start
    }

    /// Seconds of game time elapsed since start.
    pub fn game_time(&self) -> f64 {
        self.game_time_at(Instant::now())
    }

    /// Seconds of game time elapsed at `now`.
    pub fn game_time_at(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.start).as_secs_f64()
    }

    /// Rebase the start so that the current game time equals `game_time`.
    pub fn rebase(&mut self, game_time: f64) {
        self.rebase_at(game_time, Instant::now());
    }

    /// Rebase relative to an explicit `now`. A game time that cannot be
    /// represented as an offset from `now` leaves the start unchanged.
    pub fn rebase_at(&mut self, game_time: f64, now: Instant) {
        let start = Duration::try_from_secs_f64(game_time.max(0.0))
            .ok()
            .and_then(|offset| now.checked_sub(offset));
        match start {
            Some(start) => self.start = start,
            None => warn!(game_time, "Ignoring unrepresentable game time"),
        }
    }

    /// Advance the clock and return the new tick.
    pub fn tick(&mut self) -> Tick {
        self.tick_at(Instant::now())
    }

    /// Advance the clock as of `now`.
    pub fn tick_at(&mut self, now: Instant) -> Tick {
        match self.mode {
            ClockMode::FixedRate(rate) => {
                let derived = (self.game_time_at(now) * rate as f64).round() as Tick;
                // Monotonic even if the start was rebased forward.
                self.tick = self.tick.max(derived);
            }
            ClockMode::Uncapped => {
                self.tick += 1;
            }
        }
        self.tick
    }

    /// Force the tick counter (used when loading a persisted snapshot).
    pub fn set_ticks(&mut self, tick: Tick) {
        self.tick = tick;
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(ClockMode::Uncapped)
    }
}
