//! DoS mitigations: per-frame-type token-bucket rate limiters, the
//! CVE-2023-44487 rapid-reset tracker, and the CONTINUATION-flood cap.
//! New code (the teacher has no server-side security layer at all), built
//! the way `Atte-http2` structures its other per-connection state: small
//! plain structs owned by the connection, no interior mutability.

use crate::error::ConnectionError;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Refills to `capacity` once per second; never exceeds `capacity`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u32,
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.tokens = self.capacity;
            self.last_refill = Instant::now();
        }
    }

    /// Returns `true` and consumes one token if available.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }
}

/// One bucket per rate-limited frame type, sized from `Config`.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub settings: TokenBucket,
    pub ping: TokenBucket,
    pub priority: TokenBucket,
    pub rst_stream: TokenBucket,
    pub window_update: TokenBucket,
}

impl RateLimiters {
    #[must_use]
    pub fn new(
        settings_per_sec: u32,
        ping_per_sec: u32,
        priority_per_sec: u32,
        rst_stream_per_sec: u32,
        window_update_per_sec: u32,
    ) -> Self {
        Self {
            settings: TokenBucket::new(settings_per_sec),
            ping: TokenBucket::new(ping_per_sec),
            priority: TokenBucket::new(priority_per_sec),
            rst_stream: TokenBucket::new(rst_stream_per_sec),
            window_update: TokenBucket::new(window_update_per_sec),
        }
    }
}

/// Tracks stream open/cancel events in a sliding window to catch
/// CVE-2023-44487-style rapid reset: a client opening and immediately
/// resetting many streams to burn server-side work without ever reading a
/// response.
#[derive(Debug)]
pub struct RapidResetTracker {
    window: Duration,
    threshold: u32,
    events: VecDeque<Instant>,
}

impl RapidResetTracker {
    #[must_use]
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            window,
            threshold,
            events: VecDeque::new(),
        }
    }

    fn evict_stale(&mut self, now: Instant) {
        while let Some(&front) = self.events.front() {
            if now.duration_since(front) > self.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a stream cancellation (RST_STREAM observed in either
    /// direction after the stream had done real work) and report whether
    /// the connection has now crossed the rapid-reset threshold.
    pub fn record_reset(&mut self) -> bool {
        let now = Instant::now();
        self.evict_stale(now);
        self.events.push_back(now);
        self.events.len() as u32 >= self.threshold
    }

    #[must_use]
    pub fn score(&mut self) -> u32 {
        self.evict_stale(Instant::now());
        self.events.len() as u32
    }
}

/// Bounds a single HEADERS/CONTINUATION* header block: at most
/// `max_frames` frames and `max_bytes` of cumulative fragment bytes.
/// Re-armed by the caller at the start of every new header block.
#[derive(Debug, Clone, Copy)]
pub struct ContinuationGuard {
    max_frames: u32,
    max_bytes: usize,
    frames_seen: u32,
    bytes_seen: usize,
}

impl ContinuationGuard {
    #[must_use]
    pub fn new(max_frames: u32, max_bytes: usize) -> Self {
        Self {
            max_frames,
            max_bytes,
            frames_seen: 0,
            bytes_seen: 0,
        }
    }

    pub fn reset(&mut self) {
        self.frames_seen = 0;
        self.bytes_seen = 0;
    }

    /// Call once per HEADERS/CONTINUATION frame contributing to the current
    /// block, with that frame's fragment length.
    pub fn on_fragment(&mut self, len: usize) -> Result<(), ConnectionError> {
        self.frames_seen += 1;
        self.bytes_seen += len;
        if self.frames_seen > self.max_frames || self.bytes_seen > self.max_bytes {
            return Err(ConnectionError::compression());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_bucket_exhausts_then_blocks() {
        let mut bucket = TokenBucket::new(2);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn rapid_reset_trips_at_threshold() {
        let mut tracker = RapidResetTracker::new(3, Duration::from_secs(10));
        assert!(!tracker.record_reset());
        assert!(!tracker.record_reset());
        assert!(tracker.record_reset());
    }

    #[test]
    fn continuation_guard_trips_on_frame_count() {
        let mut guard = ContinuationGuard::new(2, 1 << 20);
        guard.on_fragment(10).unwrap();
        guard.on_fragment(10).unwrap();
        assert!(guard.on_fragment(10).is_err());
    }

    #[test]
    fn continuation_guard_trips_on_cumulative_bytes() {
        let mut guard = ContinuationGuard::new(100, 16);
        guard.on_fragment(10).unwrap();
        assert!(guard.on_fragment(10).is_err());
    }
}
