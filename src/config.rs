//! Persistent configuration model and defaults.

use std::time::Duration;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Acceptance and noise-suppression tunables.
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    /// Closed-status fade-out timing.
    pub visibility: VisibilityConfig,
    #[serde(default)]
    /// Frame cadence and display publication rate.
    pub interpolation: InterpolationConfig,
    #[serde(default)]
    /// Per-key sliding window limits.
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    /// Consecutive-failure lockout.
    pub lockout: LockoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tunables applied by the status reconciler.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ReconcilerConfig {
    /// Max distance in seconds between a resume report and the remembered pause
    /// position for the resume to be treated as an echo.
    #[serde(default = "default_suppress_threshold_secs")]
    pub suppress_threshold_secs: f64,
    /// How long a confirmed pause guards against echoed resumes.
    #[serde(default = "default_suppress_window_ms")]
    pub suppress_window_ms: u64,
    /// Backward position regressions below this many seconds are jitter, not seeks.
    #[serde(default = "default_small_jitter_threshold_secs")]
    pub small_jitter_threshold_secs: f64,
}

/// Fade-out timing for the "status closed" condition.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VisibilityConfig {
    #[serde(default = "default_fade_out_delay_ms")]
    pub fade_out_delay_ms: u64,
    #[serde(default = "default_fade_out_duration_ms")]
    pub fade_out_duration_ms: u64,
}

/// Frame loop cadence used by the session runtime.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct InterpolationConfig {
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Upper bound on display-time bus publications per second.
    #[serde(default = "default_display_updates_per_second")]
    pub display_updates_per_second: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_rate_limit_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LockoutConfig {
    #[serde(default = "default_lockout_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_lockout_duration_ms")]
    pub lock_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    /// One of `error`, `warn`, `info`, `debug`, `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl ReconcilerConfig {
    pub fn suppress_window(&self) -> Duration {
        Duration::from_millis(self.suppress_window_ms)
    }
}

impl VisibilityConfig {
    pub fn fade_out_delay(&self) -> Duration {
        Duration::from_millis(self.fade_out_delay_ms)
    }

    pub fn fade_out_duration(&self) -> Duration {
        Duration::from_millis(self.fade_out_duration_ms)
    }
}

impl InterpolationConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl LockoutConfig {
    pub fn lock_duration(&self) -> Duration {
        Duration::from_millis(self.lock_duration_ms)
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level
            .trim()
            .parse::<log::LevelFilter>()
            .unwrap_or(log::LevelFilter::Info)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            suppress_threshold_secs: default_suppress_threshold_secs(),
            suppress_window_ms: default_suppress_window_ms(),
            small_jitter_threshold_secs: default_small_jitter_threshold_secs(),
        }
    }
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            fade_out_delay_ms: default_fade_out_delay_ms(),
            fade_out_duration_ms: default_fade_out_duration_ms(),
        }
    }
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
            display_updates_per_second: default_display_updates_per_second(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_rate_limit_window_ms(),
            max_attempts: default_rate_limit_max_attempts(),
        }
    }
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_lockout_failure_threshold(),
            lock_duration_ms: default_lockout_duration_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_suppress_threshold_secs() -> f64 {
    2.0
}

fn default_suppress_window_ms() -> u64 {
    3_000
}

fn default_small_jitter_threshold_secs() -> f64 {
    2.0
}

fn default_fade_out_delay_ms() -> u64 {
    3_000
}

fn default_fade_out_duration_ms() -> u64 {
    700
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_display_updates_per_second() -> u32 {
    10
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

fn default_rate_limit_max_attempts() -> u32 {
    5
}

fn default_lockout_failure_threshold() -> u32 {
    5
}

fn default_lockout_duration_ms() -> u64 {
    15 * 60 * 1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn clamp_secs(value: f64, fallback: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// Clamps every tunable into a usable range.
pub fn sanitize_config(config: Config) -> Config {
    Config {
        reconciler: ReconcilerConfig {
            suppress_threshold_secs: clamp_secs(
                config.reconciler.suppress_threshold_secs,
                default_suppress_threshold_secs(),
                0.0,
                60.0,
            ),
            suppress_window_ms: config.reconciler.suppress_window_ms.min(60_000),
            small_jitter_threshold_secs: clamp_secs(
                config.reconciler.small_jitter_threshold_secs,
                default_small_jitter_threshold_secs(),
                0.0,
                60.0,
            ),
        },
        visibility: VisibilityConfig {
            fade_out_delay_ms: config.visibility.fade_out_delay_ms.min(60_000),
            fade_out_duration_ms: config.visibility.fade_out_duration_ms.min(10_000),
        },
        interpolation: InterpolationConfig {
            frame_interval_ms: config.interpolation.frame_interval_ms.clamp(4, 1_000),
            display_updates_per_second: config
                .interpolation
                .display_updates_per_second
                .clamp(1, 240),
        },
        rate_limit: RateLimitConfig {
            window_ms: config.rate_limit.window_ms.max(1),
            max_attempts: config.rate_limit.max_attempts.max(1),
        },
        lockout: LockoutConfig {
            failure_threshold: config.lockout.failure_threshold.max(1),
            lock_duration_ms: config.lockout.lock_duration_ms,
        },
        logging: config.logging,
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_config, Config, InterpolationConfig, ReconcilerConfig};

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();

        assert_eq!(config.reconciler.suppress_threshold_secs, 2.0);
        assert_eq!(config.reconciler.suppress_window_ms, 3_000);
        assert_eq!(config.reconciler.small_jitter_threshold_secs, 2.0);
        assert_eq!(config.visibility.fade_out_delay_ms, 3_000);
        assert_eq!(config.visibility.fade_out_duration_ms, 700);
        assert_eq!(config.interpolation.frame_interval_ms, 16);
        assert_eq!(config.interpolation.display_updates_per_second, 10);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.rate_limit.max_attempts, 5);
        assert_eq!(config.lockout.failure_threshold, 5);
        assert_eq!(config.lockout.lock_duration_ms, 900_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_fills_missing_fields_with_defaults() {
        let config: Config = toml::from_str(
            r#"
[reconciler]
suppress_window_ms = 5000

[visibility]
fade_out_duration_ms = 250
"#,
        )
        .expect("partial config should parse");

        assert_eq!(config.reconciler.suppress_window_ms, 5_000);
        assert_eq!(config.reconciler.suppress_threshold_secs, 2.0);
        assert_eq!(config.visibility.fade_out_duration_ms, 250);
        assert_eq!(config.visibility.fade_out_delay_ms, 3_000);
        assert_eq!(config.interpolation, InterpolationConfig::default());
    }

    #[test]
    fn test_sanitize_config_clamps_out_of_range_values() {
        let config = sanitize_config(Config {
            reconciler: ReconcilerConfig {
                suppress_threshold_secs: f64::NAN,
                suppress_window_ms: 600_000,
                small_jitter_threshold_secs: -4.0,
            },
            interpolation: InterpolationConfig {
                frame_interval_ms: 0,
                display_updates_per_second: 0,
            },
            ..Config::default()
        });

        assert_eq!(config.reconciler.suppress_threshold_secs, 2.0);
        assert_eq!(config.reconciler.suppress_window_ms, 60_000);
        assert_eq!(config.reconciler.small_jitter_threshold_secs, 0.0);
        assert_eq!(config.interpolation.frame_interval_ms, 4);
        assert_eq!(config.interpolation.display_updates_per_second, 1);
    }

    #[test]
    fn test_log_level_falls_back_to_info() {
        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.logging.level_filter(), log::LevelFilter::Debug);
        config.logging.level = "loud".to_string();
        assert_eq!(config.logging.level_filter(), log::LevelFilter::Info);
    }
}
