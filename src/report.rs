//! Wire codec for status reports delivered over the push and poll channels.
//!
//! Both channels carry the same JSON shape: a flat playback payload tagged by
//! `type` plus a `_meta` object with ordering metadata. Metadata problems are
//! not decode errors; they surface as `meta: None` so the reconciler can
//! reject the report quietly.

use serde_json::Value;

use crate::remote_status::{PausedStatus, PlayingStatus, RemoteStatus};

/// Delivery channel a report arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportChannel {
    /// Fired by the source on state change.
    Push,
    /// Fired on a fixed cadence, re-announcing the current state.
    Poll,
}

impl ReportChannel {
    pub fn label(self) -> &'static str {
        match self {
            ReportChannel::Push => "push",
            ReportChannel::Poll => "poll",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "push" => Some(ReportChannel::Push),
            "poll" => Some(ReportChannel::Poll),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordering metadata attached by the source to every physical delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMeta {
    /// Monotonic id of the logical state change.
    pub sequence_number: u64,
    /// Epoch milliseconds at which the source believed the state held.
    pub server_timestamp: i64,
    /// Unique id of this physical delivery.
    pub trace_id: String,
}

impl ReportMeta {
    pub fn new(sequence_number: u64, server_timestamp: i64, trace_id: impl Into<String>) -> Self {
        Self {
            sequence_number,
            server_timestamp,
            trace_id: trace_id.into(),
        }
    }

    /// Builds metadata with a fresh `<channel>-<uuid>` trace id.
    pub fn fresh(sequence_number: u64, server_timestamp: i64, channel: ReportChannel) -> Self {
        Self::new(
            sequence_number,
            server_timestamp,
            format!("{}-{}", channel.label(), uuid::Uuid::new_v4()),
        )
    }
}

/// One decoded report: a playback payload plus optional ordering metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: RemoteStatus,
    pub meta: Option<ReportMeta>,
}

impl StatusReport {
    pub fn new(status: RemoteStatus, meta: ReportMeta) -> Self {
        Self {
            status,
            meta: Some(meta),
        }
    }

    /// Encodes the report back into its JSON wire form.
    pub fn encode(&self) -> Result<String, String> {
        serde_json::to_string(&WireReport::from_report(self))
            .map_err(|err| format!("failed to encode status report: {err}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum WireKind {
    Playing,
    Paused,
    Closed,
}

#[derive(Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct WireReport {
    #[serde(rename = "type")]
    kind: WireKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    playback_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_buffering: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    consecutive_stalls: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    music_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    music_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_progress_update: Option<f64>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    meta: Option<Value>,
}

impl WireReport {
    fn from_report(report: &StatusReport) -> Self {
        let mut wire = WireReport {
            kind: WireKind::Closed,
            current_time: None,
            duration: None,
            playback_rate: None,
            is_buffering: None,
            consecutive_stalls: None,
            music_id: None,
            music_title: None,
            video_id: None,
            last_progress_update: None,
            meta: report.meta.as_ref().map(|meta| {
                serde_json::json!({
                    "sequenceNumber": meta.sequence_number,
                    "serverTimestamp": meta.server_timestamp,
                    "traceId": meta.trace_id,
                })
            }),
        };
        match &report.status {
            RemoteStatus::Closed => {}
            RemoteStatus::Paused(paused) => {
                wire.kind = WireKind::Paused;
                wire.current_time = paused.current_time;
                wire.music_id = paused.music_id.clone();
                wire.music_title = paused.music_title.clone();
            }
            RemoteStatus::Playing(playing) => {
                wire.kind = WireKind::Playing;
                wire.current_time = playing.current_time;
                wire.duration = playing.duration;
                wire.playback_rate = playing.playback_rate;
                wire.is_buffering = playing.is_buffering;
                wire.consecutive_stalls = playing.consecutive_stalls.map(f64::from);
                wire.music_id = playing.music_id.clone();
                wire.video_id = playing.video_id.clone();
                wire.last_progress_update = playing.last_progress_update.map(|millis| millis as f64);
            }
        }
        wire
    }

    fn into_status(self) -> RemoteStatus {
        match self.kind {
            WireKind::Closed => RemoteStatus::Closed,
            WireKind::Paused => RemoteStatus::Paused(PausedStatus {
                music_id: self.music_id,
                music_title: self.music_title,
                current_time: sanitize_seconds(self.current_time),
            }),
            WireKind::Playing => RemoteStatus::Playing(PlayingStatus {
                current_time: sanitize_seconds(self.current_time),
                duration: sanitize_seconds(self.duration).filter(|duration| *duration > 0.0),
                last_progress_update: sanitize_whole(self.last_progress_update),
                playback_rate: self.playback_rate.filter(|rate| rate.is_finite()),
                is_buffering: self.is_buffering,
                consecutive_stalls: sanitize_whole(self.consecutive_stalls)
                    .map(|stalls| stalls.min(u32::MAX as i64) as u32),
                music_id: self.music_id,
                video_id: self.video_id,
            }),
        }
    }
}

fn sanitize_seconds(value: Option<f64>) -> Option<f64> {
    value.filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
}

/// Rounds a counter or epoch-millis field; non-finite or negative values are dropped.
fn sanitize_whole(value: Option<f64>) -> Option<i64> {
    sanitize_seconds(value).map(|number| number.round() as i64)
}

fn meta_from_value(value: &Value) -> Option<ReportMeta> {
    let sequence_number = value.get("sequenceNumber").and_then(Value::as_u64)?;
    let server_timestamp = value.get("serverTimestamp").and_then(|timestamp| {
        timestamp
            .as_i64()
            .or_else(|| timestamp.as_f64().map(|millis| millis.round() as i64))
    })?;
    if server_timestamp < 0 {
        return None;
    }
    let trace_id = value
        .get("traceId")
        .and_then(Value::as_str)
        .filter(|trace_id| !trace_id.is_empty())?;
    Some(ReportMeta::new(sequence_number, server_timestamp, trace_id))
}

/// Decodes one wire report.
///
/// Fails only when the payload is not JSON or has no recognizable `type`.
pub fn parse_report(payload: &str) -> Result<StatusReport, String> {
    let wire: WireReport = serde_json::from_str(payload.trim())
        .map_err(|err| format!("failed to decode status report: {err}"))?;
    let meta = wire.meta.as_ref().and_then(meta_from_value);
    Ok(StatusReport {
        status: wire.into_status(),
        meta,
    })
}
