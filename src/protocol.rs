//! Event-bus protocol shared by all runtime components.
//!
//! Transports publish delivered reports, the session manager publishes what an
//! observer should display, and anyone may publish config changes or a
//! shutdown request.

use crate::{
    config::Config,
    reconciler::RejectReason,
    remote_status::RemoteStatus,
    report::ReportChannel,
    visibility::Visibility,
};

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Report(ReportMessage),
    Status(StatusMessage),
    Config(ConfigMessage),
    Session(SessionMessage),
}

/// Inbound reports from the transport layer.
#[derive(Debug, Clone)]
pub enum ReportMessage {
    /// One physical delivery, still in wire form.
    Delivered {
        channel: ReportChannel,
        payload: String,
    },
}

/// Observer-facing notifications derived from the canonical status.
#[derive(Debug, Clone)]
pub enum StatusMessage {
    StatusChanged(RemoteStatus),
    ReportRejected {
        channel: ReportChannel,
        reason: RejectReason,
    },
    DisplayTimeChanged {
        seconds: f64,
        paused: bool,
    },
    VisibilityChanged(Visibility),
}

#[derive(Debug, Clone)]
pub enum ConfigMessage {
    ConfigChanged(Config),
}

#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// Tear the session down and stop the manager loop.
    Shutdown,
}
