//! Per-stream state: the RFC 7540 §5.1 state machine, header-block
//! accumulation, priority and flow-control windows. Grounded on the
//! teacher's `StreamState`/`Continuing` enums (`Atte-http2/src/stream.rs`);
//! `handle_frame`'s body referenced types that don't exist anywhere in that
//! repo, so the transition logic below is a full rewrite against
//! SPEC_FULL.md §4.4 rather than a port.

use crate::error::StreamError;
use crate::flow::{AdaptiveWindowUpdater, Windows};
use crate::frame::Priority;
use crate::security::ContinuationGuard;
use crate::types::{ErrorCode, NonZeroStreamId};
use bytes::{Bytes, BytesMut};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// Which side (if any) is still mid-header-block, i.e. has sent/received a
/// HEADERS or PUSH_PROMISE without END_HEADERS and owes CONTINUATION frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuing {
    Headers,
    PushPromise,
}

#[derive(Debug)]
pub struct Stream {
    pub id: NonZeroStreamId,
    pub state: StreamState,
    pub windows: Windows,
    pub priority: Priority,
    /// Drives WINDOW_UPDATE emission for this stream's receive window,
    /// independent of the connection-level updater.
    pub recv_updater: AdaptiveWindowUpdater,

    /// Accumulated header-block fragment across HEADERS + CONTINUATION*,
    /// handed to HPACK once `headers_complete` is true.
    pub header_block: BytesMut,
    pub headers_complete: bool,
    pub continuing: Option<Continuing>,
    pub continuation_guard: ContinuationGuard,
    /// Set once a HEADERS frame without a body has arrived; a second HEADERS
    /// frame (trailers) is only legal if it carries END_STREAM.
    pub seen_initial_headers: bool,

    /// Local vs remote half of END_STREAM/RST_STREAM, tracked independently
    /// so `state` can be derived instead of duplicated ad hoc.
    local_closed: bool,
    remote_closed: bool,
    /// `true` once a RST_STREAM was sent or received; distinguishes a clean
    /// half-close sequence from an abrupt reset for the CLOSED-state matrix.
    reset: bool,
    /// `true` if CLOSED was reached by our own RST_STREAM rather than the
    /// peer's — governs whether a late frame from the peer is tolerated
    /// (they may not have observed the close yet) or a PROTOCOL_ERROR.
    closed_locally: bool,
    pub closed_at: Option<Instant>,
}

impl Stream {
    #[must_use]
    pub fn new_idle(
        id: NonZeroStreamId,
        initial_window: u32,
        continuation_max_frames: u32,
        continuation_max_bytes: usize,
    ) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            windows: Windows::new(initial_window, initial_window),
            recv_updater: AdaptiveWindowUpdater::new(initial_window),
            priority: Priority {
                exclusive: false,
                dependency: 0,
                weight: 15, // default weight 16 (wire value + 1)
            },
            header_block: BytesMut::new(),
            headers_complete: false,
            continuing: None,
            continuation_guard: ContinuationGuard::new(continuation_max_frames, continuation_max_bytes),
            seen_initial_headers: false,
            local_closed: false,
            remote_closed: false,
            reset: false,
            closed_locally: false,
            closed_at: None,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    fn close(&mut self, locally: bool) {
        self.state = StreamState::Closed;
        self.closed_locally = locally;
        self.closed_at = Some(Instant::now());
    }

    fn recompute_state(&mut self) {
        if self.reset {
            return; // close() already set Closed
        }
        self.state = match (self.local_closed, self.remote_closed) {
            (false, false) => StreamState::Open,
            (true, false) => StreamState::HalfClosedLocal,
            (false, true) => StreamState::HalfClosedRemote,
            (true, true) => {
                self.close(false);
                return;
            }
        };
    }

    /// IDLE -> OPEN on either side's first HEADERS.
    pub fn on_headers(&mut self, sent: bool, end_stream: bool) -> Result<(), StreamError> {
        match self.state {
            StreamState::Idle => {
                self.state = StreamState::Open;
                self.seen_initial_headers = true;
            }
            StreamState::Open | StreamState::HalfClosedLocal | StreamState::HalfClosedRemote => {
                if self.seen_initial_headers && !end_stream {
                    // Trailers (a second HEADERS) MUST carry END_STREAM.
                    return Err(StreamError::protocol(self.id.get()));
                }
                self.seen_initial_headers = true;
            }
            StreamState::Closed => return self.late_frame_on_closed(),
            StreamState::ReservedLocal | StreamState::ReservedRemote => {
                return Err(StreamError::protocol(self.id.get()))
            }
        }
        if end_stream {
            self.apply_end_stream(sent);
        }
        Ok(())
    }

    pub fn on_data(&mut self, sent: bool, end_stream: bool) -> Result<(), StreamError> {
        match self.state {
            StreamState::Open => {}
            StreamState::HalfClosedLocal if sent => {
                return Err(StreamError::stream_closed(self.id.get()))
            }
            StreamState::HalfClosedRemote if !sent => {
                return Err(StreamError::stream_closed(self.id.get()))
            }
            StreamState::HalfClosedLocal | StreamState::HalfClosedRemote => {}
            StreamState::Closed => return self.late_frame_on_closed(),
            _ => return Err(StreamError::protocol(self.id.get())),
        }
        if end_stream {
            self.apply_end_stream(sent);
        }
        Ok(())
    }

    fn apply_end_stream(&mut self, sent: bool) {
        if sent {
            self.local_closed = true;
        } else {
            self.remote_closed = true;
        }
        self.recompute_state();
    }

    pub fn on_rst_stream(&mut self, sent: bool) {
        self.reset = true;
        self.close(sent);
    }

    pub fn on_push_promise(&mut self, sent: bool) -> Result<(), StreamError> {
        if self.state != StreamState::Idle {
            return Err(StreamError::protocol(self.id.get()));
        }
        self.state = if sent {
            StreamState::ReservedLocal
        } else {
            StreamState::ReservedRemote
        };
        Ok(())
    }

    /// Generic per-frame-type admission check for frames that don't carry
    /// their own bespoke transition (PRIORITY, WINDOW_UPDATE, RST_STREAM
    /// itself is handled via `on_rst_stream`).
    pub fn check_frame_allowed(&self, grace_elapsed: bool) -> Result<(), StreamError> {
        if self.state != StreamState::Closed {
            return Ok(());
        }
        if !grace_elapsed {
            return Ok(());
        }
        self.late_frame_on_closed()
    }

    fn late_frame_on_closed(&self) -> Result<(), StreamError> {
        if self.closed_locally {
            Err(StreamError::protocol(self.id.get()))
        } else {
            Err(StreamError::stream_closed(self.id.get()))
        }
    }

    /// Self-dependency in PRIORITY or the priority fields of HEADERS: a
    /// stream-level PROTOCOL_ERROR regardless of current state.
    pub fn check_priority_self_dependency(&self, dependency: u32) -> Result<(), StreamError> {
        if dependency == self.id.get() {
            return Err(StreamError::protocol(self.id.get()));
        }
        Ok(())
    }

    pub fn begin_header_block(&mut self, continuing: Continuing) {
        self.continuing = Some(continuing);
        self.headers_complete = false;
        self.header_block.clear();
        self.continuation_guard.reset();
    }

    pub fn append_header_fragment(&mut self, fragment: &[u8]) -> Result<(), StreamError> {
        self.continuation_guard
            .on_fragment(fragment.len())
            .map_err(|_| StreamError::new(self.id.get(), ErrorCode::CompressionError))?;
        self.header_block.extend_from_slice(fragment);
        Ok(())
    }

    pub fn end_header_block(&mut self) -> Bytes {
        self.headers_complete = true;
        self.continuing = None;
        self.header_block.split().freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn stream() -> Stream {
        Stream::new_idle(NonZeroU32::new(1).unwrap(), 65_535, 20, 32 * 1024)
    }

    #[test]
    fn idle_to_open_on_headers() {
        let mut s = stream();
        s.on_headers(false, false).unwrap();
        assert_eq!(s.state, StreamState::Open);
    }

    #[test]
    fn open_to_half_closed_remote_on_received_end_stream() {
        let mut s = stream();
        s.on_headers(false, true).unwrap();
        assert_eq!(s.state, StreamState::HalfClosedRemote);
    }

    #[test]
    fn both_sides_end_stream_closes() {
        let mut s = stream();
        s.on_headers(false, false).unwrap();
        s.on_data(false, true).unwrap();
        assert_eq!(s.state, StreamState::HalfClosedRemote);
        s.on_data(true, true).unwrap();
        assert_eq!(s.state, StreamState::Closed);
    }

    #[test]
    fn data_after_half_closed_remote_is_stream_closed_error() {
        let mut s = stream();
        s.on_headers(false, true).unwrap();
        let err = s.on_data(false, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::StreamClosed);
    }

    #[test]
    fn trailers_without_end_stream_is_protocol_error() {
        let mut s = stream();
        s.on_headers(false, false).unwrap();
        let err = s.on_headers(false, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::ProtocolError);
    }

    #[test]
    fn rst_stream_closes_immediately() {
        let mut s = stream();
        s.on_headers(false, false).unwrap();
        s.on_rst_stream(false);
        assert_eq!(s.state, StreamState::Closed);
    }

    #[test]
    fn priority_self_dependency_is_protocol_error() {
        let s = stream();
        assert!(s.check_priority_self_dependency(1).is_err());
        assert!(s.check_priority_self_dependency(2).is_ok());
    }

    #[test]
    fn late_frame_after_local_reset_is_protocol_error() {
        let mut s = stream();
        s.on_rst_stream(true);
        let err = s.check_frame_allowed(true).unwrap_err();
        assert_eq!(err.code, ErrorCode::ProtocolError);
    }

    #[test]
    fn late_frame_after_remote_reset_is_stream_closed() {
        let mut s = stream();
        s.on_rst_stream(false);
        let err = s.check_frame_allowed(true).unwrap_err();
        assert_eq!(err.code, ErrorCode::StreamClosed);
    }

    #[test]
    fn frame_within_grace_window_is_tolerated() {
        let mut s = stream();
        s.on_rst_stream(false);
        assert!(s.check_frame_allowed(false).is_ok());
    }
}
