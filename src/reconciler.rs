//! Status reconciliation engine.
//!
//! Reports for the same player arrive over two unordered, possibly duplicating
//! channels. [`StatusReconciler::ingest`] decides per report whether it may
//! touch the canonical status, using the source-assigned sequence number,
//! trace id and server timestamp, then applies the accepted payload through
//! the pause-suppression and drift-clamp policies.
//!
//! The reconciler is single-writer: callers serialize `ingest`. Readers either
//! poll [`StatusReconciler::status`] or hold a receiver from
//! [`StatusReconciler::subscribe`].

use std::time::Instant;

use log::debug;
use tokio::sync::broadcast;

use crate::{
    config::ReconcilerConfig,
    policy::{AuthoritativePause, DriftClamp, DriftResolution, PauseSuppressor, ResumeVerdict},
    remote_status::{PausedStatus, PlayingStatus, RemoteStatus},
    report::{parse_report, StatusReport},
};

const STATUS_CHANGE_CAPACITY: usize = 64;

/// Why a report was not allowed to touch the canonical status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Payload could not be decoded at all.
    Malformed,
    /// `_meta` missing or incomplete.
    MissingMeta,
    /// Sequence number older than the last accepted one.
    Stale,
    /// Same sequence number and trace id as the last accepted report.
    Duplicate,
    /// Same sequence number, different trace id, but not a later server timestamp.
    NotNewer,
}

/// What `ingest` did with a report. Purely informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Rejected(RejectReason),
    /// Payload applied as reported.
    Applied,
    /// Payload applied with a small backward position regression held.
    Clamped,
    /// Accepted, but the resume was judged an echo of a confirmed pause.
    Suppressed,
}

impl IngestOutcome {
    pub fn is_accepted(self) -> bool {
        !matches!(self, IngestOutcome::Rejected(_))
    }
}

/// Auxiliary memory owned by the reconciler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilerMemory {
    pub last_sequence_number: Option<u64>,
    pub last_server_timestamp: Option<i64>,
    pub last_trace_id: Option<String>,
    pub authoritative_pause: Option<AuthoritativePause>,
}

/// Owns the canonical [`RemoteStatus`] for one observing session.
pub struct StatusReconciler {
    status: Option<RemoteStatus>,
    last_sequence_number: Option<u64>,
    last_server_timestamp: Option<i64>,
    last_trace_id: Option<String>,
    pause_suppressor: PauseSuppressor,
    drift_clamp: DriftClamp,
    change_sender: broadcast::Sender<RemoteStatus>,
}

impl StatusReconciler {
    pub fn new(config: &ReconcilerConfig) -> Self {
        let (change_sender, _) = broadcast::channel(STATUS_CHANGE_CAPACITY);
        Self {
            status: None,
            last_sequence_number: None,
            last_server_timestamp: None,
            last_trace_id: None,
            pause_suppressor: PauseSuppressor::new(
                config.suppress_threshold_secs,
                config.suppress_window(),
            ),
            drift_clamp: DriftClamp::new(config.small_jitter_threshold_secs),
            change_sender,
        }
    }

    /// Replaces the policy tunables without touching canonical state.
    pub fn apply_config(&mut self, config: &ReconcilerConfig) {
        self.pause_suppressor
            .reconfigure(config.suppress_threshold_secs, config.suppress_window());
        self.drift_clamp = DriftClamp::new(config.small_jitter_threshold_secs);
    }

    /// Canonical status, or `None` before the first accepted report.
    pub fn status(&self) -> Option<&RemoteStatus> {
        self.status.as_ref()
    }

    pub fn memory(&self) -> ReconcilerMemory {
        ReconcilerMemory {
            last_sequence_number: self.last_sequence_number,
            last_server_timestamp: self.last_server_timestamp,
            last_trace_id: self.last_trace_id.clone(),
            authoritative_pause: self.pause_suppressor.authoritative_pause(),
        }
    }

    /// Receives every canonical status change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RemoteStatus> {
        self.change_sender.subscribe()
    }

    /// Decodes and ingests one wire payload.
    pub fn ingest_wire(&mut self, payload: &str, now: Instant) -> IngestOutcome {
        match parse_report(payload) {
            Ok(report) => self.ingest(report, now),
            Err(err) => {
                debug!("StatusReconciler: dropping undecodable report: {}", err);
                IngestOutcome::Rejected(RejectReason::Malformed)
            }
        }
    }

    /// Ingests one report. Never fails; rejected reports leave all state untouched.
    pub fn ingest(&mut self, report: StatusReport, now: Instant) -> IngestOutcome {
        let Some(meta) = report.meta else {
            debug!("StatusReconciler: dropping report without metadata");
            return IngestOutcome::Rejected(RejectReason::MissingMeta);
        };

        if let Some(reason) = self.acceptance_check(
            meta.sequence_number,
            meta.server_timestamp,
            &meta.trace_id,
        ) {
            debug!(
                "StatusReconciler: rejected seq={} ts={} trace={} ({:?})",
                meta.sequence_number, meta.server_timestamp, meta.trace_id, reason
            );
            return IngestOutcome::Rejected(reason);
        }

        self.last_sequence_number = Some(meta.sequence_number);
        self.last_server_timestamp = Some(meta.server_timestamp);
        self.last_trace_id = Some(meta.trace_id);

        let previous = self.status.clone();
        let (next, outcome) = self.resolve_payload(report.status, previous.as_ref(), now);
        if let Some(next) = next {
            if previous.as_ref() != Some(&next) {
                self.status = Some(next.clone());
                let _ = self.change_sender.send(next);
            }
        }
        outcome
    }

    fn acceptance_check(
        &self,
        sequence_number: u64,
        server_timestamp: i64,
        trace_id: &str,
    ) -> Option<RejectReason> {
        match self.last_sequence_number {
            None => return None,
            Some(last) if sequence_number < last => return Some(RejectReason::Stale),
            Some(last) if sequence_number > last => return None,
            Some(_) => {}
        }
        if self.last_trace_id.as_deref() == Some(trace_id) {
            return Some(RejectReason::Duplicate);
        }
        match self.last_server_timestamp {
            Some(last_server_timestamp) if server_timestamp > last_server_timestamp => None,
            Some(_) => Some(RejectReason::NotNewer),
            None => None,
        }
    }

    /// Returns the status to install (if any) and the outcome label.
    fn resolve_payload(
        &mut self,
        incoming: RemoteStatus,
        previous: Option<&RemoteStatus>,
        now: Instant,
    ) -> (Option<RemoteStatus>, IngestOutcome) {
        match incoming {
            RemoteStatus::Closed => {
                self.pause_suppressor.clear();
                (Some(RemoteStatus::Closed), IngestOutcome::Applied)
            }
            RemoteStatus::Paused(paused) => {
                let current_time = paused
                    .current_time
                    .or_else(|| previous.and_then(RemoteStatus::current_time));
                self.pause_suppressor.record_pause(current_time, now);
                (
                    Some(RemoteStatus::Paused(PausedStatus {
                        current_time,
                        ..paused
                    })),
                    IngestOutcome::Applied,
                )
            }
            RemoteStatus::Playing(playing) => {
                if self.pause_suppressor.judge_resume(playing.current_time, now)
                    == ResumeVerdict::Suppress
                {
                    debug!(
                        "StatusReconciler: holding pause against resume at {:?}",
                        playing.current_time
                    );
                    return (None, IngestOutcome::Suppressed);
                }
                let (playing, outcome) = self.clamp_drift(playing, previous);
                (Some(RemoteStatus::Playing(playing)), outcome)
            }
        }
    }

    fn clamp_drift(
        &self,
        mut playing: PlayingStatus,
        previous: Option<&RemoteStatus>,
    ) -> (PlayingStatus, IngestOutcome) {
        let Some(RemoteStatus::Playing(previous)) = previous else {
            return (playing, IngestOutcome::Applied);
        };
        if playing
            .media_identity()
            .differs_from(&previous.media_identity())
        {
            return (playing, IngestOutcome::Applied);
        }
        let (Some(previous_time), Some(next_time)) = (previous.current_time, playing.current_time)
        else {
            return (playing, IngestOutcome::Applied);
        };
        let resolution = self.drift_clamp.resolve(previous_time, next_time);
        playing.current_time = Some(resolution.position());
        match resolution {
            DriftResolution::Clamped(_) => {
                debug!(
                    "StatusReconciler: absorbed backward jitter {:.3}s -> {:.3}s",
                    previous_time, next_time
                );
                (playing, IngestOutcome::Clamped)
            }
            DriftResolution::Advance(_) | DriftResolution::Seek(_) => {
                (playing, IngestOutcome::Applied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{IngestOutcome, RejectReason, StatusReconciler};
    use crate::config::ReconcilerConfig;
    use crate::remote_status::{PausedStatus, PlayingStatus, RemoteStatus};
    use crate::report::{ReportMeta, StatusReport};
    use std::time::{Duration, Instant};

    const T: i64 = 1_700_000_000_000;

    fn reconciler() -> StatusReconciler {
        StatusReconciler::new(&ReconcilerConfig::default())
    }

    fn playing(current_time: f64) -> RemoteStatus {
        RemoteStatus::Playing(PlayingStatus {
            current_time: Some(current_time),
            ..PlayingStatus::default()
        })
    }

    fn paused(current_time: Option<f64>) -> RemoteStatus {
        RemoteStatus::Paused(PausedStatus {
            current_time,
            ..PausedStatus::default()
        })
    }

    fn report(status: RemoteStatus, seq: u64, ts: i64, trace_id: &str) -> StatusReport {
        StatusReport::new(status, ReportMeta::new(seq, ts, trace_id))
    }

    #[test]
    fn test_duplicate_trace_id_is_rejected_even_with_different_payload() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        assert_eq!(
            reconciler.ingest(report(playing(10.0), 10, T, "event-abc"), base),
            IngestOutcome::Applied
        );

        let outcome = reconciler.ingest(report(playing(12.0), 10, T, "event-abc"), base);

        assert_eq!(outcome, IngestOutcome::Rejected(RejectReason::Duplicate));
        assert_eq!(reconciler.status(), Some(&playing(10.0)));
    }

    #[test]
    fn test_same_sequence_later_timestamp_refines_canonical_status() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        reconciler.ingest(report(playing(10.0), 10, T, "event-abc"), base);

        let outcome = reconciler.ingest(report(playing(12.0), 10, T + 1_000, "poll-xyz"), base);

        assert_eq!(outcome, IngestOutcome::Applied);
        assert_eq!(reconciler.status(), Some(&playing(12.0)));
        let memory = reconciler.memory();
        assert_eq!(memory.last_server_timestamp, Some(T + 1_000));
        assert_eq!(memory.last_trace_id.as_deref(), Some("poll-xyz"));
    }

    #[test]
    fn test_same_sequence_not_later_timestamp_is_rejected() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        reconciler.ingest(report(playing(10.0), 10, T, "event-abc"), base);

        let equal = reconciler.ingest(report(playing(11.0), 10, T, "poll-1"), base);
        let earlier = reconciler.ingest(report(playing(11.0), 10, T - 5, "poll-2"), base);

        assert_eq!(equal, IngestOutcome::Rejected(RejectReason::NotNewer));
        assert_eq!(earlier, IngestOutcome::Rejected(RejectReason::NotNewer));
        assert_eq!(reconciler.status(), Some(&playing(10.0)));
    }

    #[test]
    fn test_older_sequence_is_rejected_and_state_untouched() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        reconciler.ingest(report(playing(10.0), 10, T, "a"), base);
        let memory_before = reconciler.memory();

        let outcome = reconciler.ingest(report(RemoteStatus::Closed, 9, T + 9_000, "b"), base);

        assert_eq!(outcome, IngestOutcome::Rejected(RejectReason::Stale));
        assert_eq!(reconciler.status(), Some(&playing(10.0)));
        assert_eq!(reconciler.memory(), memory_before);
    }

    #[test]
    fn test_newer_sequence_is_accepted_even_with_older_timestamp() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        reconciler.ingest(report(playing(10.0), 10, T, "a"), base);

        let outcome = reconciler.ingest(report(playing(15.0), 11, T - 1_000, "b"), base);

        assert_eq!(outcome, IngestOutcome::Applied);
        assert_eq!(reconciler.memory().last_sequence_number, Some(11));
        assert_eq!(reconciler.memory().last_server_timestamp, Some(T - 1_000));
    }

    #[test]
    fn test_missing_meta_and_malformed_payloads_are_silently_rejected() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        let outcome = reconciler.ingest(
            StatusReport {
                status: playing(3.0),
                meta: None,
            },
            base,
        );
        assert_eq!(outcome, IngestOutcome::Rejected(RejectReason::MissingMeta));
        assert_eq!(
            reconciler.ingest_wire("{not json", base),
            IngestOutcome::Rejected(RejectReason::Malformed)
        );
        assert_eq!(
            reconciler.ingest_wire(r#"{"type":"playing","currentTime":4}"#, base),
            IngestOutcome::Rejected(RejectReason::MissingMeta)
        );
        assert!(reconciler.status().is_none());
        assert_eq!(reconciler.memory().last_sequence_number, None);
    }

    #[test]
    fn test_small_backward_jitter_is_clamped_and_large_regression_seeks() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        reconciler.ingest(report(playing(30.0), 10, T, "a"), base);

        let jitter = reconciler.ingest(report(playing(29.4), 11, T + 100, "b"), base);
        assert_eq!(jitter, IngestOutcome::Clamped);
        assert_eq!(reconciler.status().and_then(RemoteStatus::current_time), Some(30.0));

        let seek = reconciler.ingest(report(playing(20.0), 12, T + 200, "c"), base);
        assert_eq!(seek, IngestOutcome::Applied);
        assert_eq!(reconciler.status().and_then(RemoteStatus::current_time), Some(20.0));
    }

    #[test]
    fn test_backward_jitter_across_media_change_is_not_clamped() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        let first = RemoteStatus::Playing(PlayingStatus {
            current_time: Some(30.0),
            video_id: Some("v1".to_string()),
            ..PlayingStatus::default()
        });
        let second = RemoteStatus::Playing(PlayingStatus {
            current_time: Some(29.5),
            video_id: Some("v2".to_string()),
            ..PlayingStatus::default()
        });
        reconciler.ingest(report(first, 1, T, "a"), base);

        assert_eq!(
            reconciler.ingest(report(second.clone(), 2, T, "b"), base),
            IngestOutcome::Applied
        );
        assert_eq!(reconciler.status(), Some(&second));
    }

    #[test]
    fn test_echoed_resume_after_pause_is_suppressed_then_real_resume_applies() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        reconciler.ingest(report(paused(Some(22.0)), 5, T, "pause"), base);

        let echo = reconciler.ingest(
            report(playing(22.1), 6, T + 1_000, "echo"),
            base + Duration::from_millis(1_000),
        );
        assert_eq!(echo, IngestOutcome::Suppressed);
        assert_eq!(reconciler.status(), Some(&paused(Some(22.0))));
        assert!(reconciler.memory().authoritative_pause.is_some());
        assert_eq!(reconciler.memory().last_sequence_number, Some(6));

        let resume = reconciler.ingest(
            report(playing(40.0), 7, T + 2_000, "resume"),
            base + Duration::from_millis(2_000),
        );
        assert_eq!(resume, IngestOutcome::Applied);
        assert_eq!(reconciler.status(), Some(&playing(40.0)));
        assert!(reconciler.memory().authoritative_pause.is_none());
    }

    #[test]
    fn test_resume_after_suppress_window_applies() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        reconciler.ingest(report(paused(Some(22.0)), 5, T, "pause"), base);

        let outcome = reconciler.ingest(
            report(playing(22.2), 6, T + 4_000, "resume"),
            base + Duration::from_millis(4_000),
        );

        assert_eq!(outcome, IngestOutcome::Applied);
        assert_eq!(reconciler.status(), Some(&playing(22.2)));
    }

    #[test]
    fn test_pause_without_position_inherits_previous_position() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        reconciler.ingest(report(playing(34.0), 1, T, "a"), base);

        reconciler.ingest(report(paused(None), 2, T + 10, "b"), base);

        assert_eq!(reconciler.status(), Some(&paused(Some(34.0))));
        let pause = reconciler
            .memory()
            .authoritative_pause
            .expect("pause should be remembered");
        assert_eq!(pause.time, Some(34.0));
    }

    #[test]
    fn test_closed_clears_pause_memory() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        reconciler.ingest(report(paused(Some(5.0)), 1, T, "a"), base);
        reconciler.ingest(report(RemoteStatus::Closed, 2, T + 1, "b"), base);

        assert_eq!(reconciler.status(), Some(&RemoteStatus::Closed));
        assert!(reconciler.memory().authoritative_pause.is_none());
    }

    #[test]
    fn test_subscribers_receive_only_canonical_changes() {
        let base = Instant::now();
        let mut reconciler = reconciler();
        let mut changes = reconciler.subscribe();

        reconciler.ingest(report(playing(10.0), 1, T, "a"), base);
        reconciler.ingest(report(playing(10.0), 1, T, "a"), base);
        reconciler.ingest(report(playing(10.0), 1, T + 5, "b"), base);
        reconciler.ingest(report(RemoteStatus::Closed, 2, T + 6, "c"), base);

        assert_eq!(changes.try_recv().ok(), Some(playing(10.0)));
        assert_eq!(changes.try_recv().ok(), Some(RemoteStatus::Closed));
        assert!(changes.try_recv().is_err());
    }
}
