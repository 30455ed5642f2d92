//! # Tick Clock
//!
//! Turns wall-clock time into a number of fixed-quantum ticks.
//!
//! The clock does not sleep or read the time itself; callers pass the
//! elapsed time in, which keeps it deterministic under test. A caller that
//! falls behind runs at most `max_ticks_per_update` ticks per update and the
//! rest of the backlog is dropped.

use std::time::Duration;

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Shortest tick observed.
    pub min_tick_us: u64,
    /// Longest tick observed.
    pub max_tick_us: u64,
    /// Rolling average.
    pub avg_tick_us: u64,
    /// Ticks that took longer than the quantum.
    pub late_ticks: u64,
    /// Ticks measured.
    pub total_ticks: u64,
    /// Ticks dropped by the catch-up cap.
    pub skipped_ticks: u64,
}

impl TickStats {
    fn fresh(quantum: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: duration_us(quantum),
            late_ticks: 0,
            total_ticks: 0,
            skipped_ticks: 0,
        }
    }
}

fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Fixed-timestep accumulator.
#[derive(Debug, Clone)]
pub struct TickClock {
    quantum: Duration,
    accumulator: Duration,
    max_ticks_per_update: u32,
    tick_count: u64,
    stats: TickStats,
}

impl TickClock {
    /// Creates a clock for `tick_rate` ticks per second.
    ///
    /// # Panics
    ///
    /// Panics if `tick_rate` is zero or so high the quantum rounds to zero
    /// nanoseconds. Configuration validation rejects both.
    #[must_use]
    pub fn new(tick_rate: u32, max_ticks_per_update: u32) -> Self {
        assert!(tick_rate > 0, "tick rate must be positive");
        let quantum = Duration::from_nanos(1_000_000_000 / u64::from(tick_rate));
        assert!(!quantum.is_zero(), "tick rate {tick_rate} gives a zero quantum");
        Self {
            quantum,
            accumulator: Duration::ZERO,
            max_ticks_per_update: max_ticks_per_update.max(1),
            tick_count: 0,
            stats: TickStats::fresh(quantum),
        }
    }

    /// Adds elapsed wall time and returns how many ticks are due now.
    pub fn accumulate(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;
        let due = self.accumulator.as_nanos() / self.quantum.as_nanos();
        let due = u32::try_from(due).unwrap_or(u32::MAX);
        let run = due.min(self.max_ticks_per_update);

        if due > run {
            let skipped = due - run;
            self.stats.skipped_ticks += u64::from(skipped);
            tracing::warn!(due, run, skipped, "Server fell behind, dropping ticks");
        }
        // Keep only the partial quantum.
        self.accumulator = Duration::from_nanos(
            u64::try_from(self.accumulator.as_nanos() % self.quantum.as_nanos()).unwrap_or(0),
        );
        self.tick_count += u64::from(run);
        run
    }

    /// Records how long one tick took.
    pub fn record_tick(&mut self, took: Duration) {
        let us = duration_us(took);
        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(us);
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + us) / 16;
        if took > self.quantum {
            self.stats.late_ticks += 1;
        }
    }

    /// Time left until the next tick is due.
    #[must_use]
    pub fn time_until_due(&self) -> Duration {
        self.quantum.saturating_sub(self.accumulator)
    }

    /// Fraction of the next quantum already elapsed, in `[0, 1)`.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        (self.accumulator.as_secs_f64() / self.quantum.as_secs_f64()) as f32
    }

    /// Clears the accumulator and statistics.
    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
        self.tick_count = 0;
        self.stats = TickStats::fresh(self.quantum);
    }

    /// Fixed tick length.
    #[must_use]
    pub const fn quantum(&self) -> Duration {
        self.quantum
    }

    /// Ticks handed out so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantum() {
        let clock = TickClock::new(50, 4);
        assert_eq!(clock.quantum(), Duration::from_millis(20));
        assert_eq!(clock.tick_count(), 0);
    }

    #[test]
    #[should_panic(expected = "zero quantum")]
    fn test_zero_quantum_is_refused() {
        let _ = TickClock::new(2_000_000_000, 4);
    }

    #[test]
    fn test_accumulates_partial_quanta() {
        let mut clock = TickClock::new(50, 4);
        assert_eq!(clock.accumulate(Duration::from_millis(15)), 0);
        assert_eq!(clock.time_until_due(), Duration::from_millis(5));
        assert_eq!(clock.accumulate(Duration::from_millis(15)), 1);
        assert_eq!(clock.accumulate(Duration::from_millis(30)), 2);
        assert_eq!(clock.tick_count(), 3);
    }

    #[test]
    fn test_catch_up_is_capped() {
        let mut clock = TickClock::new(50, 4);
        assert_eq!(clock.accumulate(Duration::from_millis(205)), 4);
        assert_eq!(clock.stats().skipped_ticks, 6);
        // The backlog is gone, only the remainder stays.
        assert_eq!(clock.accumulate(Duration::ZERO), 0);
        assert_eq!(clock.time_until_due(), Duration::from_millis(15));
    }

    #[test]
    fn test_stats_tracking() {
        let mut clock = TickClock::new(50, 4);
        clock.record_tick(Duration::from_millis(2));
        clock.record_tick(Duration::from_millis(30));
        let stats = clock.stats();
        assert_eq!(stats.total_ticks, 2);
        assert_eq!(stats.min_tick_us, 2_000);
        assert_eq!(stats.max_tick_us, 30_000);
        assert_eq!(stats.late_ticks, 1);

        clock.reset();
        assert_eq!(clock.stats().total_ticks, 0);
    }
}
