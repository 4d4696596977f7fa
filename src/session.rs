//! One observer's view: reconciler, display clock and visibility, wired together.

use std::time::Instant;

use log::{debug, warn};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::{
    config::Config,
    frame_scheduler::FrameQueue,
    interpolator::TimeInterpolator,
    reconciler::{IngestOutcome, StatusReconciler},
    remote_status::RemoteStatus,
    report::StatusReport,
    visibility::{Visibility, VisibilityTimer},
};

/// Observable effects of ingesting one report.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub outcome: IngestOutcome,
    /// New canonical status, when it changed.
    pub status: Option<RemoteStatus>,
    /// New visibility state, when it changed.
    pub visibility: Option<Visibility>,
}

pub struct ObserverSession {
    reconciler: StatusReconciler,
    status_changes: broadcast::Receiver<RemoteStatus>,
    interpolator: TimeInterpolator<FrameQueue>,
    visibility: VisibilityTimer,
}

impl ObserverSession {
    pub fn new(config: &Config) -> Self {
        let reconciler = StatusReconciler::new(&config.reconciler);
        let status_changes = reconciler.subscribe();
        Self {
            reconciler,
            status_changes,
            interpolator: TimeInterpolator::new(FrameQueue::new()),
            visibility: VisibilityTimer::new(&config.visibility),
        }
    }

    pub fn apply_config(&mut self, config: &Config) {
        self.reconciler.apply_config(&config.reconciler);
        self.visibility.apply_config(&config.visibility);
    }

    pub fn reconciler(&self) -> &StatusReconciler {
        &self.reconciler
    }

    pub fn status(&self) -> Option<&RemoteStatus> {
        self.reconciler.status()
    }

    pub fn display_time(&self) -> f64 {
        self.interpolator.display_time()
    }

    pub fn is_display_paused(&self) -> bool {
        self.interpolator.is_paused()
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility.state()
    }

    pub fn next_visibility_deadline(&self) -> Option<Instant> {
        self.visibility.next_deadline()
    }

    pub fn ingest(&mut self, report: StatusReport, now: Instant) -> SessionUpdate {
        let outcome = self.reconciler.ingest(report, now);
        self.propagate(outcome, now)
    }

    pub fn ingest_wire(&mut self, payload: &str, now: Instant) -> SessionUpdate {
        let outcome = self.reconciler.ingest_wire(payload, now);
        self.propagate(outcome, now)
    }

    /// Delivers every due frame callback. Returns the latest display time produced.
    pub fn on_frame(&mut self, now: Instant) -> Option<f64> {
        let due = self.interpolator.scheduler_mut().take_due();
        let mut shown = None;
        for frame in due {
            if let Some(display_time) = self.interpolator.on_frame(frame, now) {
                shown = Some(display_time);
            }
        }
        shown
    }

    pub fn poll_timers(&mut self, now: Instant) -> Option<Visibility> {
        self.visibility.poll(now)
    }

    /// Cancels the frame loop and any pending fade.
    pub fn teardown(&mut self) {
        self.interpolator.teardown();
        self.visibility.teardown();
        debug!("ObserverSession: torn down");
    }

    fn propagate(&mut self, outcome: IngestOutcome, now: Instant) -> SessionUpdate {
        let mut update = SessionUpdate {
            outcome,
            status: None,
            visibility: None,
        };
        loop {
            let status = match self.status_changes.try_recv() {
                Ok(status) => status,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("ObserverSession: status feed lagged by {} changes", skipped);
                    continue;
                }
            };
            self.interpolator.update(&status, now);
            if let Some(visibility) = self.visibility.update(Some(&status), now) {
                update.visibility = Some(visibility);
            }
            update.status = Some(status);
        }
        update
    }
}
