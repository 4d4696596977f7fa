//! Noise policies applied by the reconciler to reports it has already accepted.

use std::time::{Duration, Instant};

/// Remembered pause position guarding against echoed resume reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthoritativePause {
    /// Position in seconds; `None` when the pause arrived before any position was known.
    pub time: Option<f64>,
    pub set_at: Instant,
}

/// Outcome of presenting a "playing" report to the [`PauseSuppressor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeVerdict {
    /// The resume is an echo of the pre-pause state; keep the pause.
    Suppress,
    /// The resume is genuine; the pause memory has been cleared.
    Release,
}

/// Keeps a stale or echoed "resumed" report from overriding a just-confirmed pause.
#[derive(Debug, Clone)]
pub struct PauseSuppressor {
    threshold_secs: f64,
    window: Duration,
    pause: Option<AuthoritativePause>,
}

impl PauseSuppressor {
    pub fn new(threshold_secs: f64, window: Duration) -> Self {
        Self {
            threshold_secs,
            window,
            pause: None,
        }
    }

    pub fn reconfigure(&mut self, threshold_secs: f64, window: Duration) {
        self.threshold_secs = threshold_secs;
        self.window = window;
    }

    pub fn authoritative_pause(&self) -> Option<AuthoritativePause> {
        self.pause
    }

    pub fn record_pause(&mut self, time: Option<f64>, now: Instant) {
        self.pause = Some(AuthoritativePause { time, set_at: now });
    }

    pub fn clear(&mut self) {
        self.pause = None;
    }

    /// Judges an accepted "playing" report against the remembered pause.
    ///
    /// Without a remembered pause every resume is released. An unknown
    /// position on either side counts as zero drift.
    pub fn judge_resume(&mut self, resume_time: Option<f64>, now: Instant) -> ResumeVerdict {
        let Some(pause) = self.pause else {
            return ResumeVerdict::Release;
        };
        let drift = match (resume_time, pause.time) {
            (Some(resume_time), Some(pause_time)) => (resume_time - pause_time).abs(),
            _ => 0.0,
        };
        let age = now.saturating_duration_since(pause.set_at);
        if drift < self.threshold_secs && age < self.window {
            return ResumeVerdict::Suppress;
        }
        self.pause = None;
        ResumeVerdict::Release
    }
}

/// Position chosen by the [`DriftClamp`] for a playing-to-playing transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftResolution {
    /// Forward or unchanged movement, applied as reported.
    Advance(f64),
    /// Sub-threshold regression, held at the previous position.
    Clamped(f64),
    /// Regression at or beyond the threshold, applied as a seek.
    Seek(f64),
}

impl DriftResolution {
    pub fn position(self) -> f64 {
        match self {
            DriftResolution::Advance(position)
            | DriftResolution::Clamped(position)
            | DriftResolution::Seek(position) => position,
        }
    }
}

/// Absorbs small backward position jitter for the same media.
#[derive(Debug, Clone, Copy)]
pub struct DriftClamp {
    threshold_secs: f64,
}

impl DriftClamp {
    pub fn new(threshold_secs: f64) -> Self {
        Self { threshold_secs }
    }

    pub fn resolve(&self, previous: f64, next: f64) -> DriftResolution {
        if next >= previous {
            return DriftResolution::Advance(next);
        }
        if previous - next < self.threshold_secs {
            DriftResolution::Clamped(previous)
        } else {
            DriftResolution::Seek(next)
        }
    }
}
