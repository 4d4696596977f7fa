//! Scripted stand-in for a remote player.
//!
//! Emits the report stream a real player produces: one push delivery per
//! state change, periodic poll deliveries that repeat the current sequence
//! number with a fresh trace id, and optionally a late echo of the previous
//! push to exercise stale rejection.

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use tokio::sync::broadcast::Sender;

use crate::{
    protocol::{Message, ReportMessage},
    remote_status::{PausedStatus, PlayingStatus, RemoteStatus},
    report::{ReportChannel, ReportMeta, StatusReport},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(900);
const SCRIPT_TICK: Duration = Duration::from_millis(50);

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// One scripted action on the simulated player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerAction {
    Play,
    Pause,
    Seek { to_secs: f64 },
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    /// Offset from the start of the script.
    pub at: Duration,
    pub action: PlayerAction,
}

/// Play, pause, resume, seek forward, close. Twelve seconds end to end.
pub fn default_script() -> Vec<ScriptStep> {
    let step = |at_ms: u64, action: PlayerAction| ScriptStep {
        at: Duration::from_millis(at_ms),
        action,
    };
    vec![
        step(0, PlayerAction::Play),
        step(4_000, PlayerAction::Pause),
        step(6_000, PlayerAction::Play),
        step(9_000, PlayerAction::Seek { to_secs: 20.0 }),
        step(12_000, PlayerAction::Close),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlayerState {
    Closed,
    Paused,
    Playing,
}

pub struct SimulatedPlayer {
    music_id: String,
    duration_secs: f64,
    state: PlayerState,
    /// Position at `anchor_ms`.
    anchor_position: f64,
    anchor_ms: i64,
    sequence_number: u64,
    last_push: Option<StatusReport>,
}

impl SimulatedPlayer {
    pub fn new(music_id: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            music_id: music_id.into(),
            duration_secs: duration_secs.max(0.0),
            state: PlayerState::Closed,
            anchor_position: 0.0,
            anchor_ms: 0,
            sequence_number: 0,
            last_push: None,
        }
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Playback position at `now_ms`, capped at the track duration.
    pub fn position(&self, now_ms: i64) -> f64 {
        match self.state {
            PlayerState::Playing => {
                let elapsed = (now_ms - self.anchor_ms).max(0) as f64 / 1_000.0;
                (self.anchor_position + elapsed).min(self.duration_secs)
            }
            PlayerState::Paused | PlayerState::Closed => self.anchor_position,
        }
    }

    pub fn apply(&mut self, action: &PlayerAction, now_ms: i64) -> StatusReport {
        let position = self.position(now_ms);
        match action {
            PlayerAction::Play => {
                if self.state == PlayerState::Closed {
                    self.anchor_position = 0.0;
                } else {
                    self.anchor_position = position;
                }
                self.state = PlayerState::Playing;
            }
            PlayerAction::Pause => {
                self.anchor_position = position;
                self.state = PlayerState::Paused;
            }
            PlayerAction::Seek { to_secs } => {
                self.anchor_position = to_secs.clamp(0.0, self.duration_secs);
                if self.state == PlayerState::Closed {
                    self.state = PlayerState::Paused;
                }
            }
            PlayerAction::Close => {
                self.anchor_position = 0.0;
                self.state = PlayerState::Closed;
            }
        }
        self.anchor_ms = now_ms;
        self.sequence_number += 1;

        let report = StatusReport::new(
            self.snapshot(now_ms),
            ReportMeta::fresh(self.sequence_number, now_ms, ReportChannel::Push),
        );
        self.last_push = Some(report.clone());
        report
    }

    /// Poll delivery: current state under the current sequence number, fresh trace id.
    pub fn poll_report(&self, now_ms: i64) -> Option<StatusReport> {
        if self.sequence_number == 0 {
            return None;
        }
        Some(StatusReport::new(
            self.snapshot(now_ms),
            ReportMeta::fresh(self.sequence_number, now_ms, ReportChannel::Poll),
        ))
    }

    /// The previous push delivery, replayed as a late arrival.
    pub fn stale_echo(&self) -> Option<StatusReport> {
        self.last_push.clone()
    }

    fn snapshot(&self, now_ms: i64) -> RemoteStatus {
        let current_time = Some(self.position(now_ms));
        match self.state {
            PlayerState::Closed => RemoteStatus::Closed,
            PlayerState::Paused => RemoteStatus::Paused(PausedStatus {
                music_id: Some(self.music_id.clone()),
                music_title: None,
                current_time,
            }),
            PlayerState::Playing => RemoteStatus::Playing(PlayingStatus {
                current_time,
                duration: Some(self.duration_secs),
                last_progress_update: Some(now_ms),
                playback_rate: Some(1.0),
                is_buffering: Some(false),
                consecutive_stalls: Some(0),
                music_id: Some(self.music_id.clone()),
                video_id: None,
            }),
        }
    }
}

fn deliver(bus_producer: &Sender<Message>, channel: ReportChannel, report: &StatusReport) -> bool {
    let payload = match report.encode() {
        Ok(payload) => payload,
        Err(err) => {
            warn!("Simulator: {}", err);
            return true;
        }
    };
    debug!("Simulator: {} delivery {}", channel, payload);
    bus_producer
        .send(Message::Report(ReportMessage::Delivered { channel, payload }))
        .is_ok()
}

/// Plays `script` in real time onto the bus. Blocks until the script finishes
/// or every bus receiver is gone.
pub fn run_simulation(
    bus_producer: Sender<Message>,
    script: Vec<ScriptStep>,
    poll_interval: Duration,
    echo_stale: bool,
) {
    info!("Simulator: running {} scripted steps", script.len());
    let mut player = SimulatedPlayer::new("demo-track", 30.0);
    let start_ms = now_unix_ms();
    let mut last_poll_ms = start_ms;
    let mut steps = script.into_iter().peekable();

    while let Some(step) = steps.peek() {
        let now_ms = now_unix_ms();
        let elapsed = Duration::from_millis((now_ms - start_ms).max(0) as u64);

        if elapsed >= step.at {
            let previous = player.stale_echo();
            let report = player.apply(&step.action, now_ms);
            if !deliver(&bus_producer, ReportChannel::Push, &report) {
                break;
            }
            if echo_stale {
                if let Some(previous) = previous {
                    deliver(&bus_producer, ReportChannel::Poll, &previous);
                }
            }
            steps.next();
            continue;
        }

        if now_ms - last_poll_ms >= poll_interval.as_millis() as i64 {
            last_poll_ms = now_ms;
            if let Some(report) = player.poll_report(now_ms) {
                if !deliver(&bus_producer, ReportChannel::Poll, &report) {
                    break;
                }
            }
        }
        thread::sleep(SCRIPT_TICK);
    }
    info!("Simulator: script finished");
}

#[cfg(test)]
mod tests {
    use super::{default_script, PlayerAction, SimulatedPlayer};
    use crate::config::Config;
    use crate::reconciler::{IngestOutcome, RejectReason};
    use crate::remote_status::RemoteStatus;
    use crate::session::ObserverSession;
    use std::time::{Duration, Instant};

    #[test]
    fn test_default_script_is_ordered() {
        let script = default_script();
        assert!(script.windows(2).all(|pair| pair[0].at < pair[1].at));
        assert_eq!(script.last().map(|step| &step.action), Some(&PlayerAction::Close));
    }

    #[test]
    fn test_player_advances_only_while_playing() {
        let mut player = SimulatedPlayer::new("track", 30.0);
        player.apply(&PlayerAction::Play, 0);
        assert_eq!(player.position(2_500), 2.5);

        player.apply(&PlayerAction::Pause, 4_000);
        assert_eq!(player.position(9_000), 4.0);
        assert_eq!(player.position(99_000), 4.0);

        player.apply(&PlayerAction::Play, 10_000);
        assert_eq!(player.position(100_000), 30.0);
    }

    #[test]
    fn test_each_action_bumps_sequence_and_polls_reuse_it() {
        let mut player = SimulatedPlayer::new("track", 30.0);
        assert!(player.poll_report(0).is_none());

        let push = player.apply(&PlayerAction::Play, 0);
        let poll = player.poll_report(900).expect("poll after first action");
        let push_meta = push.meta.expect("push meta");
        let poll_meta = poll.meta.expect("poll meta");

        assert_eq!(push_meta.sequence_number, 1);
        assert_eq!(poll_meta.sequence_number, 1);
        assert_ne!(push_meta.trace_id, poll_meta.trace_id);
        assert!(poll_meta.server_timestamp > push_meta.server_timestamp);
        assert!(poll_meta.trace_id.starts_with("poll-"));
    }

    #[test]
    fn test_simulated_stream_reconciles_cleanly() {
        let base = Instant::now();
        let mut session = ObserverSession::new(&Config::default());
        let mut player = SimulatedPlayer::new("track", 30.0);

        let play = player.apply(&PlayerAction::Play, 0);
        session.ingest(play, base);
        let poll = player.poll_report(900).expect("poll");
        assert_eq!(
            session.ingest(poll, base + Duration::from_millis(900)).outcome,
            IngestOutcome::Applied
        );

        let stale = player.stale_echo().expect("echo");
        let pause = player.apply(&PlayerAction::Pause, 4_000);
        session.ingest(pause, base + Duration::from_secs(4));
        assert_eq!(
            session.ingest(stale, base + Duration::from_secs(4)).outcome,
            IngestOutcome::Rejected(RejectReason::Stale)
        );

        let close = player.apply(&PlayerAction::Close, 6_000);
        session.ingest(close, base + Duration::from_secs(6));
        assert_eq!(session.status(), Some(&RemoteStatus::Closed));
    }
}
