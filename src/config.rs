//! Connection engine configuration. Mirrors SPEC_FULL.md §6.4, with the
//! rate-limit, backpressure and continuation thresholds from §4.6/§4.7
//! folded in as fields rather than hardcoded constants (see SPEC_FULL.md
//! §9's decision on the historical heuristic-constant critique). Grounded
//! on the teacher's `enum_map!` settings literal in `connection.rs`.

use std::time::Duration;

#[cfg_attr(feature = "config-toml", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-toml", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Advertised `SETTINGS_MAX_CONCURRENT_STREAMS`.
    pub max_concurrent_streams: u32,
    /// Advertised `SETTINGS_INITIAL_WINDOW_SIZE`.
    pub initial_window_size: u32,
    /// Advertised `SETTINGS_MAX_FRAME_SIZE`.
    pub max_frame_size: u32,
    /// Advertised `SETTINGS_MAX_HEADER_LIST_SIZE`.
    pub max_header_list_size: u32,
    /// Advertised `SETTINGS_HEADER_TABLE_SIZE`.
    pub header_table_size: u32,
    /// Advertised `SETTINGS_ENABLE_PUSH`.
    pub enable_push: u32,

    /// Per-connection lifetime cap on streams ever opened.
    pub max_total_streams: u64,

    pub max_workers: usize,
    pub worker_queue: usize,

    #[cfg_attr(feature = "config-toml", serde(with = "duration_secs"))]
    pub settings_ack_timeout: Duration,
    #[cfg_attr(feature = "config-toml", serde(with = "duration_secs"))]
    pub closed_stream_grace: Duration,

    pub rapid_reset_threshold: u32,
    #[cfg_attr(feature = "config-toml", serde(with = "duration_secs"))]
    pub rapid_reset_window: Duration,

    pub settings_rate_limit_per_sec: u32,
    pub ping_rate_limit_per_sec: u32,
    pub priority_rate_limit_per_sec: u32,
    pub rst_stream_rate_limit_per_sec: u32,
    pub window_update_rate_limit_per_sec: u32,

    pub continuation_max_frames: u32,
    pub continuation_max_bytes: usize,

    /// Per-stream send/receive buffering watermark before backpressure
    /// applies to the handler.
    pub stream_backpressure_watermark: usize,
    /// Connection-wide buffering watermark across all streams.
    pub connection_backpressure_watermark: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8443,

            max_concurrent_streams: 100,
            initial_window_size: 65_535,
            max_frame_size: 16_384,
            max_header_list_size: 8_192,
            header_table_size: 4_096,
            enable_push: 0,

            max_total_streams: 10_000,

            max_workers: 200,
            worker_queue: 2_000,

            settings_ack_timeout: Duration::from_secs(10),
            closed_stream_grace: Duration::from_secs(2),

            rapid_reset_threshold: 100,
            rapid_reset_window: Duration::from_secs(10),

            settings_rate_limit_per_sec: 10,
            ping_rate_limit_per_sec: 10,
            priority_rate_limit_per_sec: 100,
            rst_stream_rate_limit_per_sec: 100,
            window_update_rate_limit_per_sec: 100,

            continuation_max_frames: 20,
            continuation_max_bytes: 32 * 1024,

            stream_backpressure_watermark: 1024 * 1024,
            connection_backpressure_watermark: 16 * 1024 * 1024,
        }
    }
}

#[cfg(feature = "config-toml")]
mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = Config::default();
        assert_eq!(config.port, 8443);
        assert_eq!(config.max_concurrent_streams, 100);
        assert_eq!(config.initial_window_size, 65_535);
        assert_eq!(config.max_frame_size, 16_384);
        assert_eq!(config.max_total_streams, 10_000);
        assert_eq!(config.rapid_reset_threshold, 100);
        assert_eq!(config.settings_ack_timeout, Duration::from_secs(10));
    }
}
