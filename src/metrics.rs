//! Dependency-free connection/process counters. No I/O, no exporter: a
//! snapshot method is the entire public surface, matching SPEC_FULL.md
//! §10.5 — wiring these into Prometheus/OpenTelemetry is left to an
//! external adapter.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub frames_received: AtomicU64,
    pub frames_sent: AtomicU64,
    pub streams_opened: AtomicU64,
    pub streams_closed: AtomicU64,
    pub streams_reset: AtomicU64,
    pub rate_limit_trips: AtomicU64,
    pub rapid_reset_trips: AtomicU64,
    pub header_list_overflows: AtomicU64,
    pub bytes_buffered: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub streams_opened: u64,
    pub streams_closed: u64,
    pub streams_reset: u64,
    pub rate_limit_trips: u64,
    pub rapid_reset_trips: u64,
    pub header_list_overflows: u64,
    pub bytes_buffered: u64,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_opened(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_closed(&self) {
        self.streams_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_reset(&self) {
        self.streams_reset.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_trip(&self) {
        self.rate_limit_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rapid_reset_trip(&self) {
        self.rapid_reset_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_header_list_overflow(&self) {
        self.header_list_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_buffered(&self, delta: i64) {
        if delta >= 0 {
            self.bytes_buffered.fetch_add(delta as u64, Ordering::Relaxed);
        } else {
            self.bytes_buffered.fetch_sub((-delta) as u64, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
            streams_closed: self.streams_closed.load(Ordering::Relaxed),
            streams_reset: self.streams_reset.load(Ordering::Relaxed),
            rate_limit_trips: self.rate_limit_trips.load(Ordering::Relaxed),
            rapid_reset_trips: self.rapid_reset_trips.load(Ordering::Relaxed),
            header_list_overflows: self.header_list_overflows.load(Ordering::Relaxed),
            bytes_buffered: self.bytes_buffered.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let metrics = Metrics::new();
        metrics.record_frame_received();
        metrics.record_frame_received();
        metrics.record_stream_opened();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.streams_opened, 1);
    }
}
