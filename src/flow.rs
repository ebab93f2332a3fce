//! Flow-control windows: signed 31-bit send/receive counters per stream and
//! per connection, checked arithmetic throughout, plus the adaptive
//! receive-window updater described in SPEC_FULL.md §4.3. The teacher never
//! implemented flow control (its `Connection` is a blocking client with no
//! windows at all); this module is grounded on the window-accounting rules
//! of RFC 7540 §6.9 rather than on teacher code.

use crate::error::ConnectionError;
use crate::types::U31_MAX;
use std::time::{Duration, Instant};

/// One directional 31-bit flow-control counter. Represented as `i64` so
/// intermediate arithmetic can't silently wrap before the bounds check runs.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    value: i64,
}

impl Window {
    #[must_use]
    pub fn new(initial: u32) -> Self {
        Self {
            value: i64::from(initial),
        }
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Applies a `WINDOW_UPDATE` increment or a `SETTINGS_INITIAL_WINDOW_SIZE`
    /// fan-out delta (which may be negative). Only the upper bound is
    /// enforced here — a shrink is allowed to leave the window negative.
    pub fn apply_delta(&mut self, delta: i64) -> Result<(), ConnectionError> {
        let new = self
            .value
            .checked_add(delta)
            .ok_or_else(ConnectionError::flow_control)?;
        if new > i64::from(U31_MAX) {
            return Err(ConnectionError::flow_control());
        }
        self.value = new;
        Ok(())
    }

    /// Debits the window on the receive side for `amount` bytes of incoming
    /// DATA. A result below zero means the peer sent more than it was
    /// entitled to: a connection `FLOW_CONTROL_ERROR`.
    pub fn consume(&mut self, amount: u32) -> Result<(), ConnectionError> {
        let new = self.value - i64::from(amount);
        if new < 0 {
            return Err(ConnectionError::flow_control());
        }
        self.value = new;
        Ok(())
    }

    /// Debits the window on the send side after the caller has already
    /// confirmed `amount <= self.value`; never produces a negative window
    /// by itself.
    pub fn debit(&mut self, amount: u32) {
        debug_assert!(i64::from(amount) <= self.value, "send debit exceeds window");
        self.value -= i64::from(amount);
    }

    #[must_use]
    pub fn has_capacity(&self, amount: u32) -> bool {
        self.value >= i64::from(amount)
    }
}

/// Send + receive windows for one entity (a stream, or the connection as a
/// whole). Both start at `SETTINGS_INITIAL_WINDOW_SIZE`, but only the
/// stream's send window moves in lockstep with `SETTINGS_INITIAL_WINDOW_SIZE`
/// updates — the connection window is only ever moved by `WINDOW_UPDATE`.
#[derive(Debug, Clone, Copy)]
pub struct Windows {
    pub send: Window,
    pub receive: Window,
}

impl Windows {
    #[must_use]
    pub fn new(initial_send: u32, initial_receive: u32) -> Self {
        Self {
            send: Window::new(initial_send),
            receive: Window::new(initial_receive),
        }
    }
}

/// Adaptive receive-window updater (SPEC_FULL.md §4.3): tracks the
/// consumption rate over a rolling ~1s sample and slides the refill
/// threshold between 25% (bursty) and 75% (steady low-rate) of
/// `initial_window`, with 50% as the starting point.
#[derive(Debug)]
pub struct AdaptiveWindowUpdater {
    initial_window: u32,
    threshold_fraction: f64,
    sample_start: Instant,
    bytes_in_sample: u64,
}

const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

impl AdaptiveWindowUpdater {
    #[must_use]
    pub fn new(initial_window: u32) -> Self {
        Self {
            initial_window,
            threshold_fraction: 0.5,
            sample_start: Instant::now(),
            bytes_in_sample: 0,
        }
    }

    /// Call after debiting `current_window` by `bytes_received` bytes of
    /// DATA. Returns the increment to send via `WINDOW_UPDATE`, if the
    /// window has fallen far enough below the current threshold.
    pub fn on_bytes_received(&mut self, current_window: i64, bytes_received: u32) -> Option<u32> {
        self.bytes_in_sample += u64::from(bytes_received);
        let elapsed = self.sample_start.elapsed();
        if elapsed >= SAMPLE_PERIOD {
            let rate = self.bytes_in_sample as f64 / elapsed.as_secs_f64();
            self.threshold_fraction = if rate > f64::from(self.initial_window) {
                0.25 // bursty: refill sooner, in smaller/more frequent updates
            } else {
                0.75 // steady and slow: coalesce into fewer, larger updates
            };
            self.sample_start = Instant::now();
            self.bytes_in_sample = 0;
        }

        let threshold = (f64::from(self.initial_window) * self.threshold_fraction) as i64;
        if current_window > threshold {
            return None;
        }
        let target = i64::from(self.initial_window);
        let increment = (target - current_window).clamp(0, i64::from(U31_MAX));
        if increment == 0 {
            None
        } else {
            Some(increment as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_update_increases_send_window() {
        let mut w = Window::new(65_535);
        w.apply_delta(1000).unwrap();
        assert_eq!(w.value(), 66_535);
    }

    #[test]
    fn window_update_overflow_is_flow_control_error() {
        let mut w = Window::new(U31_MAX);
        assert!(w.apply_delta(1).is_err());
    }

    #[test]
    fn shrinking_initial_window_size_allows_negative_send_window() {
        let mut w = Window::new(100);
        w.apply_delta(-150).unwrap();
        assert_eq!(w.value(), -50);
    }

    #[test]
    fn receive_consume_below_zero_is_flow_control_error() {
        let mut w = Window::new(10);
        assert!(w.consume(11).is_err());
    }

    #[test]
    fn adaptive_updater_emits_increment_once_below_threshold() {
        let mut updater = AdaptiveWindowUpdater::new(1000);
        // Window still above the 50% starting threshold: no update yet.
        assert_eq!(updater.on_bytes_received(600, 100), None);
        // Window has dropped to 400, below the 500 threshold.
        assert_eq!(updater.on_bytes_received(400, 100), Some(600));
    }
}
