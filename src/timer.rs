use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::TimerError;

/// Source of monotonic time (for scheduling) and wall-clock time (for session records)
pub trait TimeSource {
    fn now(&self) -> Instant;
    fn wall_clock(&self) -> DateTime<Utc>;
}

/// Production time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time source that only moves when told to. Clones share the same clock.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    base: Instant,
    wall_base: DateTime<Utc>,
    offset: Rc<Cell<Duration>>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(wall_base: DateTime<Utc>) -> Self {
        Self {
            base: Instant::now(),
            wall_base,
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let offset = TimeDelta::from_std(self.offset.get()).unwrap_or(TimeDelta::MAX);
        self.wall_base + offset
    }
}

/// Identifies one scheduled wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickHandle(u64);

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    handle: TickHandle,
    deadline: Instant,
}

/// Holds at most one pending tick.
///
/// Scheduling while a tick is pending fails; the owner must `cancel` first.
#[derive(Debug, Default)]
pub struct TickTimer {
    next_id: u64,
    pending: Option<Scheduled>,
}

impl TickTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, deadline: Instant) -> Result<TickHandle, TimerError> {
        if self.pending.is_some() {
            return Err(TimerError::AlreadyPending);
        }

        self.next_id += 1;
        let handle = TickHandle(self.next_id);
        self.pending = Some(Scheduled { handle, deadline });
        Ok(handle)
    }

    /// Drop the pending tick, if any. Returns the handle that was cancelled.
    pub fn cancel(&mut self) -> Option<TickHandle> {
        self.pending.take().map(|s| s.handle)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|s| s.deadline)
    }

    /// Time left until the pending tick fires, saturating at zero
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline().map(|d| d.saturating_duration_since(now))
    }

    /// Fire the pending tick if its deadline has passed, returning that deadline
    pub fn take_due(&mut self, now: Instant) -> Option<Instant> {
        match self.pending {
            Some(s) if s.deadline <= now => {
                self.pending = None;
                Some(s.deadline)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn second_schedule_is_refused_until_cancelled() {
        let clock = ManualTimeSource::new();
        let mut timer = TickTimer::new();

        let first = timer
            .schedule_at(clock.now() + Duration::from_millis(100))
            .unwrap();
        assert_matches!(
            timer.schedule_at(clock.now() + Duration::from_millis(50)),
            Err(TimerError::AlreadyPending)
        );
        assert!(timer.is_pending());

        assert_eq!(timer.cancel(), Some(first));
        let second = timer
            .schedule_at(clock.now() + Duration::from_millis(50))
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn fires_only_after_deadline() {
        let clock = ManualTimeSource::new();
        let mut timer = TickTimer::new();
        timer
            .schedule_at(clock.now() + Duration::from_millis(100))
            .unwrap();

        clock.advance(Duration::from_millis(99));
        assert_eq!(timer.take_due(clock.now()), None);
        assert!(timer.is_pending());
        assert_eq!(timer.remaining(clock.now()), Some(Duration::from_millis(1)));

        clock.advance(Duration::from_millis(1));
        assert!(timer.take_due(clock.now()).is_some());
        assert!(!timer.is_pending());
        assert_eq!(timer.take_due(clock.now()), None);
    }

    #[test]
    fn cancelled_tick_never_fires() {
        let clock = ManualTimeSource::new();
        let mut timer = TickTimer::new();
        timer
            .schedule_at(clock.now() + Duration::from_millis(10))
            .unwrap();
        timer.cancel();

        clock.advance(Duration::from_secs(1));
        assert_eq!(timer.take_due(clock.now()), None);
        assert_eq!(timer.cancel(), None);
    }

    #[test]
    fn manual_clock_moves_wall_time_too() {
        let start = Utc::now();
        let clock = ManualTimeSource::starting_at(start);
        let shared = clock.clone();

        shared.advance(Duration::from_secs(90));

        assert_eq!(clock.elapsed(), Duration::from_secs(90));
        assert_eq!(clock.wall_clock() - start, TimeDelta::seconds(90));
    }
}
