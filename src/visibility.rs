//! Fade-out state machine for the "status closed" condition.
//!
//! A closed status stays visible for the fade-out delay, fades for the
//! fade-out duration, then hides. Any non-closed status before the hide
//! completes cancels the fade.

use std::time::{Duration, Instant};

use crate::{config::VisibilityConfig, remote_status::RemoteStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hiding,
    Hidden,
}

/// Deadlines of the pending fade; there is never more than one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FadeDeadlines {
    hiding_at: Instant,
    hidden_at: Instant,
}

pub struct VisibilityTimer {
    state: Visibility,
    fade_out_delay: Duration,
    fade_out_duration: Duration,
    fade: Option<FadeDeadlines>,
}

impl VisibilityTimer {
    pub fn new(config: &VisibilityConfig) -> Self {
        Self {
            state: Visibility::Hidden,
            fade_out_delay: config.fade_out_delay(),
            fade_out_duration: config.fade_out_duration(),
            fade: None,
        }
    }

    /// New timings apply to the next fade; a fade in progress keeps its deadlines.
    pub fn apply_config(&mut self, config: &VisibilityConfig) {
        self.fade_out_delay = config.fade_out_delay();
        self.fade_out_duration = config.fade_out_duration();
    }

    pub fn state(&self) -> Visibility {
        self.state
    }

    /// Earliest instant at which [`VisibilityTimer::poll`] can change state.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.fade.map(|fade| match self.state {
            Visibility::Visible => fade.hiding_at,
            Visibility::Hiding | Visibility::Hidden => fade.hidden_at,
        })
    }

    /// Reacts to the current canonical status. Returns the new state when it changed.
    pub fn update(&mut self, status: Option<&RemoteStatus>, now: Instant) -> Option<Visibility> {
        match status {
            None => {
                self.fade = None;
                self.transition(Visibility::Hidden)
            }
            Some(status) if !status.is_closed() => {
                self.fade = None;
                self.transition(Visibility::Visible)
            }
            Some(_) => {
                if self.state != Visibility::Hidden && self.fade.is_none() {
                    let hiding_at = now + self.fade_out_delay;
                    self.fade = Some(FadeDeadlines {
                        hiding_at,
                        hidden_at: hiding_at + self.fade_out_duration,
                    });
                }
                self.poll(now)
            }
        }
    }

    /// Advances through elapsed fade deadlines. Returns the new state when it changed.
    pub fn poll(&mut self, now: Instant) -> Option<Visibility> {
        let fade = self.fade?;
        if now >= fade.hidden_at {
            self.fade = None;
            return self.transition(Visibility::Hidden);
        }
        if now >= fade.hiding_at {
            return self.transition(Visibility::Hiding);
        }
        None
    }

    /// Cancels any pending fade.
    pub fn teardown(&mut self) {
        self.fade = None;
    }

    fn transition(&mut self, next: Visibility) -> Option<Visibility> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::{Visibility, VisibilityTimer};
    use crate::config::VisibilityConfig;
    use crate::remote_status::{PausedStatus, RemoteStatus};
    use std::time::{Duration, Instant};

    fn timer() -> VisibilityTimer {
        VisibilityTimer::new(&VisibilityConfig {
            fade_out_delay_ms: 3_000,
            fade_out_duration_ms: 500,
        })
    }

    fn paused() -> RemoteStatus {
        RemoteStatus::Paused(PausedStatus::default())
    }

    #[test]
    fn test_no_status_is_hidden_without_timers() {
        let mut timer = timer();
        assert_eq!(timer.update(None, Instant::now()), None);
        assert_eq!(timer.state(), Visibility::Hidden);
        assert!(timer.next_deadline().is_none());
    }

    #[test]
    fn test_closed_fades_through_hiding_to_hidden() {
        let base = Instant::now();
        let mut timer = timer();
        assert_eq!(timer.update(Some(&paused()), base), Some(Visibility::Visible));

        assert_eq!(timer.update(Some(&RemoteStatus::Closed), base), None);
        assert_eq!(timer.state(), Visibility::Visible);
        assert_eq!(timer.next_deadline(), Some(base + Duration::from_millis(3_000)));

        assert_eq!(timer.poll(base + Duration::from_millis(2_999)), None);
        assert_eq!(
            timer.poll(base + Duration::from_millis(3_000)),
            Some(Visibility::Hiding)
        );
        assert_eq!(timer.next_deadline(), Some(base + Duration::from_millis(3_500)));
        assert_eq!(
            timer.poll(base + Duration::from_millis(3_500)),
            Some(Visibility::Hidden)
        );
        assert!(timer.next_deadline().is_none());
    }

    #[test]
    fn test_reopen_during_fade_cancels_timers() {
        let base = Instant::now();
        let mut timer = timer();
        timer.update(Some(&paused()), base);
        timer.update(Some(&RemoteStatus::Closed), base);
        timer.poll(base + Duration::from_millis(3_100));
        assert_eq!(timer.state(), Visibility::Hiding);

        assert_eq!(
            timer.update(Some(&paused()), base + Duration::from_millis(3_200)),
            Some(Visibility::Visible)
        );
        assert!(timer.next_deadline().is_none());
        assert_eq!(timer.poll(base + Duration::from_secs(10)), None);
        assert_eq!(timer.state(), Visibility::Visible);
    }

    #[test]
    fn test_repeated_closed_updates_do_not_restart_fade() {
        let base = Instant::now();
        let mut timer = timer();
        timer.update(Some(&paused()), base);
        timer.update(Some(&RemoteStatus::Closed), base);
        timer.update(
            Some(&RemoteStatus::Closed),
            base + Duration::from_millis(2_000),
        );

        assert_eq!(timer.next_deadline(), Some(base + Duration::from_millis(3_000)));
    }

    #[test]
    fn test_closed_while_hidden_stays_hidden() {
        let base = Instant::now();
        let mut timer = timer();
        assert_eq!(timer.update(Some(&RemoteStatus::Closed), base), None);
        assert_eq!(timer.state(), Visibility::Hidden);
        assert!(timer.next_deadline().is_none());
    }

    #[test]
    fn test_teardown_cancels_pending_fade() {
        let base = Instant::now();
        let mut timer = timer();
        timer.update(Some(&paused()), base);
        timer.update(Some(&RemoteStatus::Closed), base);
        timer.teardown();

        assert!(timer.next_deadline().is_none());
        assert_eq!(timer.poll(base + Duration::from_secs(10)), None);
    }
}
