//! Canonical playback status model shared by the reconciler and its readers.

/// Ids identifying which piece of media a status describes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaIdentity {
    pub video_id: Option<String>,
    pub music_id: Option<String>,
}

impl MediaIdentity {
    /// Returns `true` when both identities carry an id of the same kind and the values differ.
    /// Absent ids never conflict.
    pub fn differs_from(&self, other: &MediaIdentity) -> bool {
        fn conflict(left: &Option<String>, right: &Option<String>) -> bool {
            matches!((left, right), (Some(left), Some(right)) if left != right)
        }
        conflict(&self.video_id, &other.video_id) || conflict(&self.music_id, &other.music_id)
    }

    pub fn is_empty(&self) -> bool {
        self.video_id.is_none() && self.music_id.is_none()
    }
}

/// Frozen playback position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PausedStatus {
    pub music_id: Option<String>,
    pub music_title: Option<String>,
    /// Position in seconds. Absent only when no earlier status ever carried one.
    pub current_time: Option<f64>,
}

/// Advancing playback position as last reported by the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayingStatus {
    /// Position in seconds at `last_progress_update`.
    pub current_time: Option<f64>,
    pub duration: Option<f64>,
    /// Epoch milliseconds at which the source sampled `current_time`.
    pub last_progress_update: Option<i64>,
    pub playback_rate: Option<f64>,
    pub is_buffering: Option<bool>,
    pub consecutive_stalls: Option<u32>,
    pub music_id: Option<String>,
    pub video_id: Option<String>,
}

impl PlayingStatus {
    pub fn media_identity(&self) -> MediaIdentity {
        MediaIdentity {
            video_id: self.video_id.clone(),
            music_id: self.music_id.clone(),
        }
    }

    /// Rate at which the position advances; zero while buffering or stalled.
    pub fn effective_rate(&self) -> f64 {
        let stalled = self.consecutive_stalls.unwrap_or(0) > 0;
        if self.is_buffering.unwrap_or(false) || stalled {
            return 0.0;
        }
        self.playback_rate
            .filter(|rate| rate.is_finite() && *rate >= 0.0)
            .unwrap_or(1.0)
    }
}

/// Discriminant of a [`RemoteStatus`], used in logs and bus messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Closed,
    Paused,
    Playing,
}

/// The single authoritative view of the remote player.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    Closed,
    Paused(PausedStatus),
    Playing(PlayingStatus),
}

impl RemoteStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            RemoteStatus::Closed => StatusKind::Closed,
            RemoteStatus::Paused(_) => StatusKind::Paused,
            RemoteStatus::Playing(_) => StatusKind::Playing,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, RemoteStatus::Closed)
    }

    pub fn current_time(&self) -> Option<f64> {
        match self {
            RemoteStatus::Closed => None,
            RemoteStatus::Paused(paused) => paused.current_time,
            RemoteStatus::Playing(playing) => playing.current_time,
        }
    }

    /// Media identity carried by the status; `None` for `Closed`.
    pub fn media_identity(&self) -> Option<MediaIdentity> {
        match self {
            RemoteStatus::Closed => None,
            RemoteStatus::Paused(paused) => Some(MediaIdentity {
                video_id: None,
                music_id: paused.music_id.clone(),
            }),
            RemoteStatus::Playing(playing) => Some(playing.media_identity()),
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StatusKind::Closed => "closed",
            StatusKind::Paused => "paused",
            StatusKind::Playing => "playing",
        };
        f.write_str(label)
    }
}
