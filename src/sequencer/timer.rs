/// Repeating timer that re-arms itself after each firing
///
/// The host calls `fire` with its current time; the timer never sleeps or
/// spawns anything itself. Cancelling takes effect immediately: no firing
/// happens after `cancel` until the timer is armed again.
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RepeatingTimer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl RepeatingTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arms the timer so the next `fire` at or after `now` runs.
    pub fn arm(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    /// Returns true when due, re-arming one interval after `now`.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    /// How long the host may wait before calling `fire` again.
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.next_due
            .map(|due| due.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unarmed_never_fires() {
        let mut timer = RepeatingTimer::new(Duration::from_millis(25));
        let now = Instant::now();
        assert!(!timer.fire(now));
        assert_eq!(timer.time_until_due(now), None);
    }

    #[test]
    fn test_rearms_after_interval() {
        let mut timer = RepeatingTimer::new(Duration::from_millis(25));
        let t0 = Instant::now();
        timer.arm(t0);
        assert!(timer.fire(t0));
        assert!(!timer.fire(t0 + Duration::from_millis(10)));
        assert_eq!(
            timer.time_until_due(t0 + Duration::from_millis(10)),
            Some(Duration::from_millis(15))
        );

        // a late firing re-arms relative to when it actually ran
        let late = t0 + Duration::from_millis(90);
        assert!(timer.fire(late));
        assert!(!timer.fire(late + Duration::from_millis(24)));
        assert!(timer.fire(late + Duration::from_millis(25)));
    }

    #[test]
    fn test_cancel_stops_future_firings() {
        let mut timer = RepeatingTimer::new(Duration::from_millis(25));
        let t0 = Instant::now();
        timer.arm(t0);
        timer.fire(t0);
        timer.cancel();
        assert!(!timer.is_armed());
        assert!(!timer.fire(t0 + Duration::from_secs(1)));
    }
}
