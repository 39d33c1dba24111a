//! Wall-clock to tick conversion.

use std::time::{Duration, Instant};

/// Turns elapsed wall-clock time into whole simulation ticks.
///
/// Leftover time carries into the next call. After a long stall at most
/// `max_catch_up` ticks are produced and the rest of the backlog is dropped.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: Duration,
    accumulator: Duration,
    max_catch_up: u32,
}

impl FixedTimestep {
    pub fn new(tick_rate_hz: u32, max_catch_up: u32) -> Self {
        assert!(tick_rate_hz > 0, "FixedTimestep needs a non-zero tick rate");
        Self {
            step: Duration::from_nanos(1_000_000_000 / u64::from(tick_rate_hz)),
            accumulator: Duration::ZERO,
            max_catch_up: max_catch_up.max(1),
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Add elapsed time; returns the number of ticks now due.
    pub fn accumulate(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;
        let mut ticks = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            ticks += 1;
            if ticks == self.max_catch_up {
                if self.accumulator >= self.step {
                    self.accumulator = Duration::from_nanos(
                        (self.accumulator.as_nanos() % self.step.as_nanos()) as u64,
                    );
                }
                break;
            }
        }
        ticks
    }

    /// Progress toward the next tick in `[0, 1)`, for render interpolation.
    pub fn alpha(&self) -> f64 {
        self.accumulator.as_secs_f64() / self.step.as_secs_f64()
    }

    /// Time until the next tick is due.
    pub fn until_next(&self) -> Duration {
        self.step.saturating_sub(self.accumulator)
    }
}

/// Milliseconds since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_ticks_and_remainder() {
        let mut timestep = FixedTimestep::new(50, 10);
        assert_eq!(timestep.accumulate(Duration::from_millis(10)), 0);
        assert_eq!(timestep.accumulate(Duration::from_millis(35)), 2);
        assert!((timestep.alpha() - 0.25).abs() < 1e-9);
        assert_eq!(timestep.until_next(), Duration::from_millis(15));
    }

    #[test]
    fn test_catch_up_is_capped() {
        let mut timestep = FixedTimestep::new(50, 3);
        assert_eq!(timestep.accumulate(Duration::from_millis(1_010)), 3);
        // Backlog is dropped, the sub-tick remainder is kept.
        assert_eq!(timestep.accumulate(Duration::from_millis(10)), 1);
        assert_eq!(timestep.accumulate(Duration::ZERO), 0);
    }

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
