use crate::subtitles::model::AutoPausePreference;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the synchronization engine
///
/// Every field has a default, so a partial JSON document is enough to
/// override a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Period of the play-mode control loop
    pub poll_interval_ms: u64,
    /// Look-ahead used to flag subtitles that just started or will stop soon
    pub showing_check_radius_ms: i64,
    /// Seek latency assumed before the first condensed-mode seek is measured
    pub default_seek_latency_ms: f64,
    /// Added to the measured seek latency before condensed mode skips a gap
    pub condensed_safety_buffer_ms: f64,
    /// Minimum silence ahead before fast-forward raises the rate
    pub fast_forward_gap_ms: f64,
    pub fast_forward_playback_rate: f64,
    pub auto_pause_preference: AutoPausePreference,
    /// Subtitles on each side of a mined line
    pub surrounding_subtitles_count_radius: usize,
    pub surrounding_subtitles_time_radius_ms: i64,
    /// `init` attempts before the handshake gives up
    pub ready_retries: u32,
    pub ready_timeout_ms: u64,
    /// Pause and jump back to 0 once the clock reaches the end of the track
    pub rewind_at_end: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            showing_check_radius_ms: 100,
            default_seek_latency_ms: 1000.0,
            condensed_safety_buffer_ms: 500.0,
            fast_forward_gap_ms: 1000.0,
            fast_forward_playback_rate: 2.7,
            auto_pause_preference: AutoPausePreference::AtEnd,
            surrounding_subtitles_count_radius: 2,
            surrounding_subtitles_time_radius_ms: 10_000,
            ready_retries: 5,
            ready_timeout_ms: 1000,
            rewind_at_end: true,
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid engine configuration")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"fastForwardPlaybackRate": 3.0, "autoPausePreference": 1}"#)
            .unwrap();

        assert_eq!(config.fast_forward_playback_rate, 3.0);
        assert_eq!(config.auto_pause_preference, AutoPausePreference::AtStart);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.ready_retries, 5);
    }

    #[test]
    fn test_package_identity() {
        assert_eq!(app_name(), "minesync");
        assert!(version().split('.').count() >= 3);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(EngineConfig::from_json("{\"pollIntervalMs\": \"fast\"}").is_err());
    }
}
