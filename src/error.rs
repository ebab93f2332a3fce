//! Error taxonomy: connection errors (fatal, answered with GOAWAY), stream
//! errors (local, answered with RST_STREAM) and frame-codec errors that get
//! classified into one of the two above by the caller. See SPEC_FULL.md §7.

use crate::types::{ErrorCode, StreamId};
use thiserror::Error;

/// A connection-scope violation. Terminal: the read loop converts this into
/// a GOAWAY carrying `code` and the last processed stream id, then closes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("connection error: {code:?}")]
pub struct ConnectionError {
    pub code: ErrorCode,
}

impl ConnectionError {
    #[must_use]
    pub fn new(code: ErrorCode) -> Self {
        Self { code }
    }

    #[must_use]
    pub fn protocol() -> Self {
        Self::new(ErrorCode::ProtocolError)
    }

    #[must_use]
    pub fn flow_control() -> Self {
        Self::new(ErrorCode::FlowControlError)
    }

    #[must_use]
    pub fn frame_size() -> Self {
        Self::new(ErrorCode::FrameSizeError)
    }

    #[must_use]
    pub fn compression() -> Self {
        Self::new(ErrorCode::CompressionError)
    }

    #[must_use]
    pub fn enhance_your_calm() -> Self {
        Self::new(ErrorCode::EnhanceYourCalm)
    }

    #[must_use]
    pub fn settings_timeout() -> Self {
        Self::new(ErrorCode::SettingsTimeout)
    }

    #[must_use]
    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalError)
    }
}

/// A stream-scope violation. Recoverable: the owning stream is reset with
/// `code` and moves to CLOSED; the connection keeps running.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stream {stream_id} error: {code:?}")]
pub struct StreamError {
    pub stream_id: StreamId,
    pub code: ErrorCode,
}

impl StreamError {
    #[must_use]
    pub fn new(stream_id: StreamId, code: ErrorCode) -> Self {
        Self { stream_id, code }
    }

    #[must_use]
    pub fn protocol(stream_id: StreamId) -> Self {
        Self::new(stream_id, ErrorCode::ProtocolError)
    }

    #[must_use]
    pub fn stream_closed(stream_id: StreamId) -> Self {
        Self::new(stream_id, ErrorCode::StreamClosed)
    }

    #[must_use]
    pub fn refused(stream_id: StreamId) -> Self {
        Self::new(stream_id, ErrorCode::RefusedStream)
    }

    #[must_use]
    pub fn internal(stream_id: StreamId) -> Self {
        Self::new(stream_id, ErrorCode::InternalError)
    }

    #[must_use]
    pub fn frame_size(stream_id: StreamId) -> Self {
        Self::new(stream_id, ErrorCode::FrameSizeError)
    }
}

/// Either scope, for call sites (frame parsing, HPACK decode) that can raise
/// either depending on context.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum H2Error {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl H2Error {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            H2Error::Connection(e) => e.code,
            H2Error::Stream(e) => e.code,
        }
    }
}

/// Errors raised by the frame codec (`frame::parse`). Always a
/// connection-level concern per §4.1, except where individually noted at
/// the call site (e.g. a padding violation on DATA is stream-level).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown frame type {0}")]
    UnknownType(u8),
    #[error("frame payload shorter than required")]
    PayloadTooShort,
    #[error("frame payload longer than expected for a fixed-size frame")]
    PayloadTooLong,
    #[error("stream id must be non-zero for this frame type")]
    ZeroStreamId,
    #[error("stream id must be zero for this frame type")]
    NonZeroStreamId,
    #[error("window increment of zero is not allowed")]
    ZeroWindowIncrement,
    #[error("SETTINGS payload length {0} is not a multiple of 6")]
    SettingsNotMultipleOf6,
    #[error("SETTINGS ACK must carry an empty payload")]
    SettingsAckWithPayload,
    #[error("padding length {pad_len} is not less than the payload length {payload_len}")]
    InvalidPadding { pad_len: usize, payload_len: usize },
    #[error("unknown error code {0}")]
    UnknownErrorCode(u32),
}

impl From<FrameError> for ConnectionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::SettingsAckWithPayload
            | FrameError::PayloadTooShort
            | FrameError::PayloadTooLong
            | FrameError::SettingsNotMultipleOf6 => ConnectionError::frame_size(),
            _ => ConnectionError::protocol(),
        }
    }
}
