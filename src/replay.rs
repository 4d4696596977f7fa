//! Offline replay of a captured report log through an [`ObserverSession`].
//!
//! One delivery per line, in arrival order, optionally prefixed with the
//! channel it came in on (`push ` or `poll `). Blank lines and `#` comments
//! are skipped. The observer clock is advanced by the server timestamp delta
//! between deliveries and never runs backwards.

use std::io::BufRead;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::{
    reconciler::IngestOutcome,
    report::{parse_report, ReportChannel},
    session::ObserverSession,
};

/// Counts of what the session did with each replayed delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub accepted: usize,
    pub rejected: usize,
    pub suppressed: usize,
    pub clamped: usize,
}

/// Splits one log line into its channel and payload. `None` for lines to skip.
pub fn parse_replay_line(line: &str) -> Option<(ReportChannel, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    if let Some((label, rest)) = trimmed.split_once(char::is_whitespace) {
        if let Some(channel) = ReportChannel::from_label(label) {
            return Some((channel, rest.trim_start()));
        }
    }
    Some((ReportChannel::Push, trimmed))
}

pub fn replay_reports(
    reader: impl BufRead,
    session: &mut ObserverSession,
    base: Instant,
) -> Result<ReplaySummary, String> {
    let mut summary = ReplaySummary::default();
    let mut first_timestamp: Option<i64> = None;
    let mut clock = base;

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| format!("failed to read line {}: {}", index + 1, err))?;
        let Some((channel, payload)) = parse_replay_line(&line) else {
            continue;
        };

        let update = match parse_report(payload) {
            Ok(report) => {
                if let Some(meta) = &report.meta {
                    let origin = *first_timestamp.get_or_insert(meta.server_timestamp);
                    let offset =
                        Duration::from_millis((meta.server_timestamp - origin).max(0) as u64);
                    clock = clock.max(base + offset);
                }
                session.ingest(report, clock)
            }
            // Undecodable lines still go through the session so they are counted as rejected.
            Err(_) => session.ingest_wire(payload, clock),
        };
        match update.outcome {
            IngestOutcome::Rejected(reason) => {
                summary.rejected += 1;
                debug!("Replay: line {} ({}) rejected: {:?}", index + 1, channel, reason);
            }
            IngestOutcome::Suppressed => {
                summary.accepted += 1;
                summary.suppressed += 1;
            }
            IngestOutcome::Clamped => {
                summary.accepted += 1;
                summary.clamped += 1;
            }
            IngestOutcome::Applied => summary.accepted += 1,
        }

        if let Some(status) = update.status {
            info!(
                "Replay: line {} ({}) -> {} at {:.2}s",
                index + 1,
                channel,
                status.kind(),
                session.display_time()
            );
        }
        session.on_frame(clock);
        session.poll_timers(clock);
    }

    Ok(summary)
}
