use crate::classify::Status;
use std::time::{Duration, Instant};

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(3);
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Cumulative production counters with a debounce window so a burst of
/// frames showing the same unit is counted once. Counters persist for the
/// process lifetime and survive stop/start of the capture loop.
#[derive(Debug, Default)]
pub struct SessionStats {
    total: u64,
    pass: u64,
    ng: u64,
    last_count_at: Option<Instant>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame verdict. Increments the counters only when the
    /// debounce window has elapsed since the last counted verdict;
    /// returns whether this verdict was counted.
    pub fn record(&mut self, status: Status, now: Instant) -> bool {
        let elapsed = self
            .last_count_at
            .map(|at| now.duration_since(at) >= DEBOUNCE_WINDOW)
            .unwrap_or(true);

        if !elapsed {
            return false;
        }

        self.total += 1;
        match status {
            Status::Pass => self.pass += 1,
            Status::Ng => self.ng += 1,
        }
        self.last_count_at = Some(now);
        true
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total,
            pass: self.pass,
            ng: self.ng,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total: u64,
    pub pass: u64,
    pub ng: u64,
}

impl StatsSnapshot {
    /// NG percentage rounded to one decimal; 0.0 before anything is counted.
    pub fn ng_rate(&self) -> f64 {
        let rate = self.ng as f64 / self.total.max(1) as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }
}

/// Frames-per-second over the last whole wall-clock second.
#[derive(Debug)]
pub struct FpsCounter {
    frames_in_window: u32,
    window_start: Instant,
    current: u32,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            frames_in_window: 0,
            window_start: now,
            current: 0,
        }
    }

    /// Counts one processed frame and returns the published FPS value,
    /// which only changes when a window boundary is crossed.
    pub fn tick(&mut self, now: Instant) -> u32 {
        self.frames_in_window += 1;
        if now.duration_since(self.window_start) >= FPS_WINDOW {
            self.current = self.frames_in_window;
            self.frames_in_window = 0;
            self.window_start = now;
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_verdict_is_always_counted() {
        let mut stats = SessionStats::new();
        let now = Instant::now();

        assert!(stats.record(Status::Pass, now));
        assert_eq!(stats.snapshot().total, 1);
        assert_eq!(stats.snapshot().pass, 1);
    }

    #[test]
    fn verdicts_inside_the_debounce_window_are_dropped() {
        let mut stats = SessionStats::new();
        let start = Instant::now();

        assert!(stats.record(Status::Ng, start));
        for millis in [100, 1000, 2999] {
            assert!(!stats.record(Status::Ng, start + Duration::from_millis(millis)));
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.ng, 1);
    }

    #[test]
    fn window_boundary_allows_exactly_one_more_count() {
        let mut stats = SessionStats::new();
        let start = Instant::now();

        stats.record(Status::Pass, start);
        assert!(stats.record(Status::Ng, start + Duration::from_secs(3)));
        assert!(!stats.record(Status::Ng, start + Duration::from_millis(3001)));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.pass, 1);
        assert_eq!(snapshot.ng, 1);
    }

    #[test]
    fn ng_rate_is_rounded_to_one_decimal() {
        let snapshot = StatsSnapshot {
            total: 3,
            pass: 2,
            ng: 1,
        };
        assert_eq!(snapshot.ng_rate(), 33.3);
    }

    #[test]
    fn ng_rate_with_no_counts_is_zero() {
        let snapshot = StatsSnapshot {
            total: 0,
            pass: 0,
            ng: 0,
        };
        assert_eq!(snapshot.ng_rate(), 0.0);
    }

    #[test]
    fn fps_reports_previous_window_count() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(start);

        for i in 1..=10 {
            assert_eq!(fps.tick(start + Duration::from_millis(i * 50)), 0);
        }
        // Crossing the one-second boundary publishes the window count.
        assert_eq!(fps.tick(start + Duration::from_millis(1000)), 11);
        // Counting restarts inside the new window.
        assert_eq!(fps.tick(start + Duration::from_millis(1100)), 11);
    }
}
