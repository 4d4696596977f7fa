//! Smooth display position between discrete status snapshots.
//!
//! Each accepted snapshot re-anchors the interpolator at
//! `(position, wall-clock instant, rate)`. Between snapshots a frame loop
//! extrapolates `anchor.time + elapsed * anchor.rate`, clamped to the media
//! duration when known. The loop holds at most one pending frame, stops itself
//! once paused, and is restarted only by [`TimeInterpolator::update`].

use std::time::Instant;

use log::debug;

use crate::{
    frame_scheduler::{FrameId, FrameQueue, FrameScheduler},
    remote_status::{MediaIdentity, RemoteStatus},
};

/// Reference point used to extrapolate the display position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationAnchor {
    /// Position in seconds at `wall_clock_instant`.
    pub time: f64,
    pub wall_clock_instant: Instant,
    /// Seconds of media per second of wall clock.
    pub rate: f64,
    pub buffering: bool,
}

impl InterpolationAnchor {
    fn extrapolate(&self, frame_time: Instant, duration: Option<f64>) -> f64 {
        let elapsed_secs = frame_time
            .saturating_duration_since(self.wall_clock_instant)
            .as_secs_f64();
        let mut position = self.time + elapsed_secs * self.rate;
        if let Some(duration) = duration {
            position = position.min(duration);
        }
        if position.is_finite() {
            position.max(0.0)
        } else {
            self.time
        }
    }
}

/// Frame-driven display clock for one observer.
pub struct TimeInterpolator<S: FrameScheduler = FrameQueue> {
    scheduler: S,
    anchor: Option<InterpolationAnchor>,
    duration: Option<f64>,
    paused: bool,
    identity: Option<MediaIdentity>,
    display_time: f64,
    pending_frame: Option<FrameId>,
}

impl<S: FrameScheduler> TimeInterpolator<S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            anchor: None,
            duration: None,
            paused: false,
            identity: None,
            display_time: 0.0,
            pending_frame: None,
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn anchor(&self) -> Option<InterpolationAnchor> {
        self.anchor
    }

    pub fn display_time(&self) -> f64 {
        self.display_time
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// `true` while a frame callback is outstanding.
    pub fn is_running(&self) -> bool {
        self.pending_frame.is_some()
    }

    /// Position the next frame would show at `now`, without advancing state.
    pub fn sample(&self, now: Instant) -> f64 {
        match self.anchor {
            Some(anchor) if !self.paused => anchor.extrapolate(now, self.duration),
            _ => self.display_time,
        }
    }

    /// Re-anchors on a new canonical status.
    pub fn update(&mut self, status: &RemoteStatus, now: Instant) {
        self.track_identity(status);

        match status {
            RemoteStatus::Closed => {
                self.anchor = None;
                self.paused = false;
                self.stop_loop();
            }
            RemoteStatus::Paused(paused) => {
                if let Some(current_time) = paused.current_time {
                    self.anchor = Some(InterpolationAnchor {
                        time: current_time,
                        wall_clock_instant: now,
                        rate: 0.0,
                        buffering: false,
                    });
                    self.display_time = current_time;
                }
                self.paused = true;
                self.stop_loop();
            }
            RemoteStatus::Playing(playing) => {
                let Some(current_time) = playing.current_time else {
                    debug!("TimeInterpolator: playing snapshot without position, keeping anchor");
                    return;
                };
                let rate = playing.effective_rate();
                self.duration = playing.duration;
                let anchor = InterpolationAnchor {
                    time: current_time,
                    wall_clock_instant: now,
                    rate,
                    buffering: playing.is_buffering.unwrap_or(false),
                };
                self.display_time = anchor.extrapolate(now, self.duration);
                self.anchor = Some(anchor);
                self.paused = rate == 0.0;
                if self.paused {
                    self.stop_loop();
                } else {
                    self.start_loop();
                }
            }
        }
    }

    /// Handles one frame callback. Returns the new display time, or `None` for
    /// callbacks that were superseded or arrive after the loop stopped.
    pub fn on_frame(&mut self, frame: FrameId, frame_time: Instant) -> Option<f64> {
        if self.pending_frame != Some(frame) {
            return None;
        }
        self.pending_frame = None;
        if self.paused || self.anchor.is_none() {
            return None;
        }
        self.display_time = self.sample(frame_time);
        self.start_loop();
        Some(self.display_time)
    }

    /// Cancels any outstanding frame and forgets the anchor.
    pub fn teardown(&mut self) {
        self.stop_loop();
        self.anchor = None;
    }

    fn track_identity(&mut self, status: &RemoteStatus) {
        let Some(incoming) = status.media_identity() else {
            return;
        };
        match self.identity.as_mut() {
            Some(current) if current.differs_from(&incoming) => {
                debug!("TimeInterpolator: media changed, resetting display clock");
                self.anchor = None;
                self.duration = None;
                self.display_time = 0.0;
                self.paused = false;
                self.identity = Some(incoming);
            }
            Some(current) => {
                if incoming.video_id.is_some() {
                    current.video_id = incoming.video_id;
                }
                if incoming.music_id.is_some() {
                    current.music_id = incoming.music_id;
                }
            }
            None => {
                if !incoming.is_empty() {
                    self.identity = Some(incoming);
                }
            }
        }
    }

    fn start_loop(&mut self) {
        if self.pending_frame.is_none() {
            self.pending_frame = Some(self.scheduler.request_frame());
        }
    }

    fn stop_loop(&mut self) {
        if let Some(frame) = self.pending_frame.take() {
            self.scheduler.cancel_frame(frame);
        }
    }
}
