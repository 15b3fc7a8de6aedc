//! Debounced threat alert.
//!
//! The controller separates "is a mite in this frame" (noisy, per frame) from
//! "should the beekeeper hear about it" (once per incident). An alert is
//! raised on the first frame that contains the target label while idle,
//! stays up for the configured duration regardless of what later frames
//! show, and then drops back to idle so the next sighting opens a new
//! episode.

use std::time::{Duration, Instant};

/// Default lifetime of a raised alert.
pub const DEFAULT_ALERT_DURATION: Duration = Duration::from_secs(20);

/// Current alert state. `raised_at` exists only while active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    Active { raised_at: Instant },
}

impl AlertState {
    pub fn is_active(&self) -> bool {
        matches!(self, AlertState::Active { .. })
    }

    pub fn raised_at(&self) -> Option<Instant> {
        match self {
            AlertState::Idle => None,
            AlertState::Active { raised_at } => Some(*raised_at),
        }
    }
}

/// What a tick asks the caller to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertEvent {
    /// Idle and nothing to report.
    Quiet,
    /// Rising edge: show the banner and send the notification.
    Raised,
    /// Alert still running: keep the banner on screen.
    Showing,
    /// The alert ran out this tick; state is idle again.
    Expired,
}

impl AlertEvent {
    /// True when the alert banner belongs on this frame.
    pub fn shows_banner(&self) -> bool {
        matches!(self, AlertEvent::Raised | AlertEvent::Showing)
    }
}

/// Owns the alert state; `tick` is the only way to change it.
#[derive(Debug)]
pub struct AlertController {
    state: AlertState,
    duration: Duration,
    episodes: u64,
}

impl AlertController {
    pub fn new(duration: Duration) -> Self {
        Self {
            state: AlertState::Idle,
            duration,
            episodes: 0,
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Number of alerts raised since start.
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    /// Advance the state machine by one frame.
    pub fn tick(&mut self, now: Instant, target_present: bool) -> AlertEvent {
        let (next, event) = transition(self.state, self.duration, now, target_present);
        match event {
            AlertEvent::Raised => {
                self.episodes += 1;
                log::info!("alert #{} raised", self.episodes);
            }
            AlertEvent::Expired => {
                log::info!("alert expired after {:?}", self.duration);
            }
            AlertEvent::Quiet | AlertEvent::Showing => {}
        }
        self.state = next;
        event
    }
}

impl Default for AlertController {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_DURATION)
    }
}

fn transition(
    state: AlertState,
    duration: Duration,
    now: Instant,
    target_present: bool,
) -> (AlertState, AlertEvent) {
    // Expiry is checked first so a sighting in the same tick opens a new
    // episode instead of being swallowed by the old one.
    let (state, expired) = match state {
        AlertState::Active { raised_at } if now.saturating_duration_since(raised_at) > duration => {
            (AlertState::Idle, true)
        }
        other => (other, false),
    };

    match state {
        AlertState::Idle if target_present => {
            (AlertState::Active { raised_at: now }, AlertEvent::Raised)
        }
        AlertState::Idle if expired => (AlertState::Idle, AlertEvent::Expired),
        AlertState::Idle => (AlertState::Idle, AlertEvent::Quiet),
        active @ AlertState::Active { .. } => (active, AlertEvent::Showing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_secs(2);

    #[test]
    fn idle_without_target_is_idempotent() {
        let mut ctl = AlertController::new(SHORT);
        let t0 = Instant::now();
        for i in 0..10 {
            let event = ctl.tick(t0 + Duration::from_secs(i), false);
            assert_eq!(event, AlertEvent::Quiet);
            assert_eq!(ctl.state(), AlertState::Idle);
        }
        assert_eq!(ctl.episodes(), 0);
    }

    #[test]
    fn first_sighting_raises_once() {
        let mut ctl = AlertController::new(Duration::from_secs(20));
        let t0 = Instant::now();

        assert_eq!(ctl.tick(t0, true), AlertEvent::Raised);
        assert_eq!(ctl.state(), AlertState::Active { raised_at: t0 });

        assert_eq!(ctl.tick(t0 + Duration::from_secs(1), true), AlertEvent::Showing);
        assert_eq!(ctl.state().raised_at(), Some(t0));
        assert_eq!(ctl.episodes(), 1);
    }

    #[test]
    fn expiry_needs_strictly_more_than_duration() {
        let mut ctl = AlertController::new(SHORT);
        let t0 = Instant::now();
        ctl.tick(t0, true);

        assert_eq!(ctl.tick(t0 + SHORT, false), AlertEvent::Showing);
        assert!(ctl.state().is_active());

        let later = t0 + SHORT + Duration::from_millis(1);
        assert_eq!(ctl.tick(later, false), AlertEvent::Expired);
        assert_eq!(ctl.state(), AlertState::Idle);
        assert_eq!(ctl.state().raised_at(), None);
    }

    #[test]
    fn presence_sequence_notifies_once_per_episode() {
        let mut ctl = AlertController::new(SHORT);
        let t0 = Instant::now();
        let presence = [true, true, true, false, false, true];
        let step = Duration::from_millis(500);

        let mut raised_at_ticks = Vec::new();
        for (i, present) in presence.iter().enumerate() {
            let event = ctl.tick(t0 + step * i as u32, *present);
            if event == AlertEvent::Raised {
                raised_at_ticks.push(i);
            }
        }
        // The last sighting lands at 2.5s, past the 2s lifetime.
        assert_eq!(raised_at_ticks, vec![0, 5]);
        assert_eq!(ctl.episodes(), 2);
    }

    #[test]
    fn sightings_while_active_do_not_extend_the_alert() {
        let mut ctl = AlertController::new(SHORT);
        let t0 = Instant::now();
        ctl.tick(t0, true);
        ctl.tick(t0 + Duration::from_secs(1), true);
        ctl.tick(t0 + Duration::from_millis(1900), true);

        let event = ctl.tick(t0 + Duration::from_millis(2100), false);
        assert_eq!(event, AlertEvent::Expired);
    }

    #[test]
    fn expiry_and_new_sighting_in_same_tick_start_new_episode() {
        let mut ctl = AlertController::new(SHORT);
        let t0 = Instant::now();
        ctl.tick(t0, true);

        let t1 = t0 + Duration::from_secs(3);
        assert_eq!(ctl.tick(t1, true), AlertEvent::Raised);
        assert_eq!(ctl.state(), AlertState::Active { raised_at: t1 });
    }

    #[test]
    fn banner_shown_only_while_active() {
        assert!(AlertEvent::Raised.shows_banner());
        assert!(AlertEvent::Showing.shows_banner());
        assert!(!AlertEvent::Expired.shows_banner());
        assert!(!AlertEvent::Quiet.shows_banner());
    }
}
