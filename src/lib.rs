//! Observer-side reconciliation of remote playback status.
//!
//! Reports from a remote player arrive over a push channel and a poll
//! channel. [`reconciler::StatusReconciler`] turns them into one canonical
//! status, [`interpolator::TimeInterpolator`] extrapolates a smooth display
//! time from it, and [`visibility::VisibilityTimer`] fades the observer view
//! out after playback closes. [`session::ObserverSession`] wires the three
//! together and [`session_manager::SessionManager`] runs a session on the
//! event bus.

pub mod admin_lockout;
pub mod config;
pub mod config_persistence;
pub mod frame_scheduler;
pub mod interpolator;
pub mod policy;
pub mod protocol;
pub mod rate_limiter;
pub mod reconciler;
pub mod remote_status;
pub mod replay;
pub mod report;
pub mod session;
pub mod session_manager;
pub mod simulator;
pub mod visibility;
