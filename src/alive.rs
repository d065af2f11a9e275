//! Heartbeat scheduling for one connection.
//!
//! The controller only keeps time; the connection sends the probes and owns
//! the pending entry that detects a missing `ALIVE_RESPONSE`.

use tokio::time::{Duration, Instant};

/// Tracks when the next `ALIVE_REQUEST` is due and which probe is in flight.
#[derive(Debug)]
pub struct AliveController {
    interval: Duration,
    next_probe_at: Instant,
    outstanding: Option<u16>,
}

impl AliveController {
    /// Schedule the first probe one `interval` after `now`.
    #[must_use]
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_probe_at: now + interval,
            outstanding: None,
        }
    }

    /// Record peer traffic, pushing the next probe back.
    pub fn touch(&mut self, now: Instant) { self.next_probe_at = now + self.interval; }

    /// Whether a probe should be sent at `now`.
    ///
    /// Never true while a probe is still waiting for its answer.
    #[must_use]
    pub fn due(&self, now: Instant) -> bool {
        self.outstanding.is_none() && now >= self.next_probe_at
    }

    /// Record that probe `id` was sent.
    pub fn probe_sent(&mut self, id: u16, now: Instant) {
        self.outstanding = Some(id);
        self.touch(now);
    }

    /// Whether `id` is the probe currently in flight.
    #[must_use]
    pub fn is_probe(&self, id: u16) -> bool { self.outstanding == Some(id) }

    /// Clear the in-flight probe if `id` answers it.
    pub fn acknowledge(&mut self, id: u16) -> bool {
        let answered = self.is_probe(id);
        if answered {
            self.outstanding = None;
        }
        answered
    }

    /// Id of the probe waiting for an answer.
    #[must_use]
    pub fn outstanding(&self) -> Option<u16> { self.outstanding }

    /// When the next probe is due.
    #[must_use]
    pub fn next_probe_at(&self) -> Instant { self.next_probe_at }

    /// Forget any probe in flight and restart the schedule.
    pub fn reset(&mut self, now: Instant) {
        self.outstanding = None;
        self.touch(now);
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    const INTERVAL: Duration = Duration::from_secs(5);

    #[fixture]
    fn start() -> Instant { Instant::now() }

    #[rstest]
    fn probe_is_due_after_interval(start: Instant) {
        let alive = AliveController::new(INTERVAL, start);
        assert!(!alive.due(start + INTERVAL - Duration::from_millis(1)));
        assert!(alive.due(start + INTERVAL));
    }

    #[rstest]
    fn traffic_postpones_probe(start: Instant) {
        let mut alive = AliveController::new(INTERVAL, start);
        alive.touch(start + Duration::from_secs(4));
        assert!(!alive.due(start + INTERVAL));
        assert!(alive.due(start + Duration::from_secs(9)));
    }

    #[rstest]
    fn only_one_probe_in_flight(start: Instant) {
        let mut alive = AliveController::new(INTERVAL, start);
        alive.probe_sent(42, start + INTERVAL);
        assert!(!alive.due(start + INTERVAL * 3));
        assert!(!alive.acknowledge(41));
        assert!(alive.acknowledge(42));
        assert!(alive.due(start + INTERVAL * 3));
    }

    #[rstest]
    fn reset_forgets_probe(start: Instant) {
        let mut alive = AliveController::new(INTERVAL, start);
        alive.probe_sent(7, start);
        alive.reset(start);
        assert_eq!(alive.outstanding(), None);
        assert_eq!(alive.next_probe_at(), start + INTERVAL);
    }
}
