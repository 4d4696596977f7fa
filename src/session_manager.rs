//! Bus-driven runtime around one [`ObserverSession`].
//!
//! The manager drains delivered reports from the bus, drives the display
//! frame loop at a fixed cadence, polls fade deadlines, and publishes what an
//! observer should show. Display-time publications are throttled; status,
//! pause and visibility transitions always go out.

use std::num::NonZeroU32;
use std::thread;
use std::time::{Duration, Instant};

use governor::state::NotKeyed;
use governor::{Quota, RateLimiter};
use log::{debug, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::{
    config::Config,
    protocol::{ConfigMessage, Message, ReportMessage, SessionMessage, StatusMessage},
    reconciler::IngestOutcome,
    report::ReportChannel,
    session::{ObserverSession, SessionUpdate},
};

type DisplayLimiter =
    RateLimiter<NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

fn display_limiter(updates_per_second: u32) -> DisplayLimiter {
    let per_second = NonZeroU32::new(updates_per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(per_second))
}

/// Session runtime manager.
pub struct SessionManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    session: ObserverSession,
    frame_interval: Duration,
    display_limiter: DisplayLimiter,
}

impl SessionManager {
    /// Creates a session manager bound to the shared bus.
    pub fn new(bus_consumer: Receiver<Message>, bus_producer: Sender<Message>, config: &Config) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            session: ObserverSession::new(config),
            frame_interval: config.interpolation.frame_interval(),
            display_limiter: display_limiter(config.interpolation.display_updates_per_second),
        }
    }

    pub fn session(&self) -> &ObserverSession {
        &self.session
    }

    fn publish(&self, message: StatusMessage) {
        let _ = self.bus_producer.send(Message::Status(message));
    }

    fn publish_display(&self, seconds: f64, force: bool) {
        if !force && self.display_limiter.check().is_err() {
            return;
        }
        self.publish(StatusMessage::DisplayTimeChanged {
            seconds,
            paused: self.session.is_display_paused(),
        });
    }

    fn handle_report(&mut self, channel: ReportChannel, payload: &str, now: Instant) {
        let SessionUpdate {
            outcome,
            status,
            visibility,
        } = self.session.ingest_wire(payload, now);
        match outcome {
            IngestOutcome::Rejected(reason) => {
                debug!("SessionManager: {} report rejected ({:?})", channel, reason);
                self.publish(StatusMessage::ReportRejected { channel, reason });
            }
            IngestOutcome::Suppressed => {
                debug!("SessionManager: {} resume suppressed by pause", channel);
            }
            IngestOutcome::Applied | IngestOutcome::Clamped => {}
        }
        if let Some(status) = status {
            info!(
                "SessionManager: status now {} (via {})",
                status.kind(),
                channel
            );
            self.publish(StatusMessage::StatusChanged(status));
            self.publish_display(self.session.display_time(), true);
        }
        if let Some(visibility) = visibility {
            self.publish(StatusMessage::VisibilityChanged(visibility));
        }
    }

    fn apply_config(&mut self, config: &Config) {
        self.session.apply_config(config);
        self.frame_interval = config.interpolation.frame_interval();
        self.display_limiter = display_limiter(config.interpolation.display_updates_per_second);
    }

    /// Returns `true` when the manager should stop.
    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Report(ReportMessage::Delivered { channel, payload }) => {
                self.handle_report(channel, &payload, Instant::now());
                false
            }
            Message::Config(ConfigMessage::ConfigChanged(config)) => {
                self.apply_config(&config);
                false
            }
            Message::Session(SessionMessage::Shutdown) => true,
            Message::Status(_) => false,
        }
    }

    fn process_pending_bus_messages(&mut self) -> bool {
        loop {
            match self.bus_consumer.try_recv() {
                Ok(message) => {
                    if self.handle_message(message) {
                        return true;
                    }
                }
                Err(tokio::sync::broadcast::error::TryRecvError::Empty) => return false,
                Err(tokio::sync::broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("SessionManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::TryRecvError::Closed) => return true,
            }
        }
    }

    fn pump_frames(&mut self, now: Instant) {
        if let Some(display_time) = self.session.on_frame(now) {
            self.publish_display(display_time, false);
        }
    }

    fn poll_visibility(&mut self, now: Instant) {
        if let Some(visibility) = self.session.poll_timers(now) {
            self.publish(StatusMessage::VisibilityChanged(visibility));
        }
    }

    /// Starts the blocking session loop. Returns after `Shutdown` or when the bus closes.
    pub fn run(&mut self) {
        info!("SessionManager: started");
        loop {
            if self.process_pending_bus_messages() {
                break;
            }
            let now = Instant::now();
            self.pump_frames(now);
            self.poll_visibility(now);
            thread::sleep(self.frame_interval);
        }
        self.session.teardown();
        info!("SessionManager: stopped");
    }
}
