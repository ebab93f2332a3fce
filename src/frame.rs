//! The ten HTTP/2 frame types: parsing, wire-level validation and
//! serialization. Grounded on the teacher's `Frame::try_from_stream` /
//! `write_into` pair (`Atte-http2/src/frame.rs`), generalized from a single
//! untyped payload `Vec<u8>` to one typed struct per frame with the fields
//! the connection engine and stream state machine actually need.

use crate::buffer_pool::BufferPool;
use crate::error::FrameError;
use crate::flags::{
    ContinuationFlags, DataFlags, HeadersFlags, PingFlags, PushPromiseFlags, SettingsFlags,
};
use crate::types::{ErrorCode, FrameType, NonZeroStreamId, SettingsParameter, StreamId, U31_MAX};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_traits::{FromPrimitive, ToPrimitive};
use tokio::io::{AsyncRead, AsyncReadExt};

/// 9-byte frame header, already byte-order-decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub type_byte: u8,
    pub flags: u8,
    pub stream_id: StreamId,
}

pub const HEADER_LEN: usize = 9;

impl FrameHeader {
    #[must_use]
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.type_byte)
    }

    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Self {
        let length = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        let stream_id = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & U31_MAX;
        Self {
            length,
            type_byte: bytes[3],
            flags: bytes[4],
            stream_id,
        }
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_slice(&self.length.to_be_bytes()[1..]);
        out.put_u8(self.type_byte);
        out.put_u8(self.flags);
        out.put_u32(self.stream_id & U31_MAX);
    }
}

/// Reads exactly one frame header + payload from `reader`, enforcing
/// `max_frame_size` before the payload is read. Returns `Ok(None)` on a
/// clean EOF between frames (the caller treats this as orderly closure).
/// The payload buffer is drawn from `pool` rather than allocated fresh each
/// time, so steady-state frame traffic settles into reusing a small set of
/// size-bucketed buffers instead of churning the allocator per frame.
pub async fn read_raw(
    reader: &mut (impl AsyncRead + Unpin),
    max_frame_size: u32,
    pool: &BufferPool,
) -> std::io::Result<Option<(FrameHeader, Bytes)>> {
    let mut header_buf = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let header = FrameHeader::parse(&header_buf);
    if header.length > max_frame_size {
        // Caller maps this to FRAME_SIZE_ERROR; we still must not read an
        // unbounded amount, so bail before touching the payload.
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame length exceeds max_frame_size",
        ));
    }
    let len = header.length as usize;
    let mut payload = pool.acquire(len);
    payload.resize(len, 0);
    reader.read_exact(&mut payload).await?;
    Ok(Some((header, payload.freeze())))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: NonZeroStreamId,
    pub flags: DataFlags,
    pub data: Bytes,
    /// Full on-wire frame length including any padding; this, not
    /// `data.len()`, is what flow control debits.
    pub frame_len: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub exclusive: bool,
    pub dependency: StreamId,
    /// Raw wire byte; the actual weight (1-256) is `weight as u16 + 1`.
    pub weight: u8,
}

impl Priority {
    fn parse(bytes: &[u8; 5]) -> Self {
        let raw = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Self {
            exclusive: raw & 0x8000_0000 != 0,
            dependency: raw & U31_MAX,
            weight: bytes[4],
        }
    }

    fn write(&self, out: &mut BytesMut) {
        let mut raw = self.dependency & U31_MAX;
        if self.exclusive {
            raw |= 0x8000_0000;
        }
        out.put_u32(raw);
        out.put_u8(self.weight);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: NonZeroStreamId,
    pub flags: HeadersFlags,
    pub priority: Option<Priority>,
    pub header_block: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFrame {
    pub stream_id: NonZeroStreamId,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: NonZeroStreamId,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettingsFrame {
    pub ack: bool,
    /// Ordered as received on the wire: later duplicate parameters must
    /// override earlier ones atomically (see SPEC_FULL.md §9), which the
    /// connection engine can only do correctly if order survives parsing.
    pub params: Vec<(SettingsParameter, u32)>,
}

impl SettingsFrame {
    #[must_use]
    pub fn ack() -> Self {
        Self {
            ack: true,
            params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPromiseFrame {
    pub stream_id: NonZeroStreamId,
    pub flags: PushPromiseFlags,
    pub promised_stream_id: StreamId,
    pub header_block: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub ack: bool,
    pub data: [u8; 8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub last_stream_id: StreamId,
    pub error_code: ErrorCode,
    pub debug_data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    pub stream_id: StreamId,
    pub increment: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationFrame {
    pub stream_id: NonZeroStreamId,
    pub end_headers: bool,
    pub header_block: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Headers(HeadersFrame),
    Priority(PriorityFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    PushPromise(PushPromiseFrame),
    Ping(PingFrame),
    GoAway(GoAwayFrame),
    WindowUpdate(WindowUpdateFrame),
    Continuation(ContinuationFrame),
    /// A frame type unrecognized by this implementation. Per RFC 7540 §4.1
    /// unknown types MUST be ignored, not errored; we keep it only so
    /// callers can log/count it before discarding.
    Unknown { type_byte: u8, stream_id: StreamId },
}

impl Frame {
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data(f) => f.stream_id.get(),
            Frame::Headers(f) => f.stream_id.get(),
            Frame::Priority(f) => f.stream_id.get(),
            Frame::RstStream(f) => f.stream_id.get(),
            Frame::Settings(_) => 0,
            Frame::PushPromise(f) => f.stream_id.get(),
            Frame::Ping(_) => 0,
            Frame::GoAway(_) => 0,
            Frame::WindowUpdate(f) => f.stream_id,
            Frame::Continuation(f) => f.stream_id.get(),
            Frame::Unknown { stream_id, .. } => *stream_id,
        }
    }

    /// Parses a single frame from its already-read header and payload.
    /// `error_code` on unknown codes still needs a valid discriminant: the
    /// caller passes zero-length slices through `ErrorCode::try_from`.
    pub fn parse(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
        let Some(ty) = header.frame_type() else {
            return Ok(Frame::Unknown {
                type_byte: header.type_byte,
                stream_id: header.stream_id,
            });
        };
        match ty {
            FrameType::Data => parse_data(header, payload),
            FrameType::Headers => parse_headers(header, payload),
            FrameType::Priority => parse_priority(header, payload),
            FrameType::ResetStream => parse_rst_stream(header, payload),
            FrameType::Settings => parse_settings(header, payload),
            FrameType::PushPromise => parse_push_promise(header, payload),
            FrameType::Ping => parse_ping(header, payload),
            FrameType::GoAway => parse_go_away(header, payload),
            FrameType::WindowUpdate => parse_window_update(header, payload),
            FrameType::Continuation => parse_continuation(header, payload),
        }
    }

    pub fn write(&self, out: &mut BytesMut) {
        match self {
            Frame::Data(f) => write_data(f, out),
            Frame::Headers(f) => write_headers(f, out),
            Frame::Priority(f) => write_priority(f, out),
            Frame::RstStream(f) => write_rst_stream(f, out),
            Frame::Settings(f) => write_settings(f, out),
            Frame::PushPromise(f) => write_push_promise(f, out),
            Frame::Ping(f) => write_ping(f, out),
            Frame::GoAway(f) => write_go_away(f, out),
            Frame::WindowUpdate(f) => write_window_update(f, out),
            Frame::Continuation(f) => write_continuation(f, out),
            Frame::Unknown { .. } => {}
        }
    }
}

fn non_zero_stream(header: &FrameHeader) -> Result<NonZeroStreamId, FrameError> {
    NonZeroStreamId::new(header.stream_id).ok_or(FrameError::ZeroStreamId)
}

fn zero_stream(header: &FrameHeader) -> Result<(), FrameError> {
    if header.stream_id == 0 {
        Ok(())
    } else {
        Err(FrameError::NonZeroStreamId)
    }
}

fn error_code(raw: u32) -> Result<ErrorCode, FrameError> {
    ErrorCode::from_u32(raw).ok_or(FrameError::UnknownErrorCode(raw))
}

/// Strips an optional `[pad_len(1)] payload [padding]` envelope, returning
/// the inner slice. `padded` comes from the frame's PADDED flag bit.
fn strip_padding(mut payload: Bytes, padded: bool) -> Result<Bytes, FrameError> {
    if !padded {
        return Ok(payload);
    }
    if payload.is_empty() {
        return Err(FrameError::PayloadTooShort);
    }
    let pad_len = payload.get_u8() as usize;
    let remaining = payload.len();
    if pad_len > remaining {
        return Err(FrameError::InvalidPadding {
            pad_len,
            payload_len: remaining,
        });
    }
    let content_len = remaining - pad_len;
    Ok(payload.split_to(content_len))
}

fn parse_data(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
    let stream_id = non_zero_stream(&header)?;
    let flags = DataFlags::from_bits_truncate(header.flags);
    let data = strip_padding(payload, flags.contains(DataFlags::PADDED))?;
    Ok(Frame::Data(DataFrame {
        stream_id,
        flags,
        data,
        frame_len: header.length,
    }))
}

fn write_data(f: &DataFrame, out: &mut BytesMut) {
    FrameHeader {
        length: f.data.len() as u32,
        type_byte: FrameType::Data.to_u8().unwrap(),
        flags: f.flags.bits(),
        stream_id: f.stream_id.get(),
    }
    .write(out);
    out.put_slice(&f.data);
}

fn parse_headers(header: FrameHeader, mut payload: Bytes) -> Result<Frame, FrameError> {
    let stream_id = non_zero_stream(&header)?;
    let flags = HeadersFlags::from_bits_truncate(header.flags);

    if flags.contains(HeadersFlags::PADDED) {
        if payload.is_empty() {
            return Err(FrameError::PayloadTooShort);
        }
        let pad_len = payload.get_u8() as usize;
        if pad_len > payload.len() {
            return Err(FrameError::InvalidPadding {
                pad_len,
                payload_len: payload.len(),
            });
        }
        let content_len = payload.len() - pad_len;
        payload = payload.split_to(content_len);
    }

    let priority = if flags.contains(HeadersFlags::PRIORITY) {
        if payload.len() < 5 {
            return Err(FrameError::PayloadTooShort);
        }
        let mut buf = [0u8; 5];
        buf.copy_from_slice(&payload.split_to(5));
        Some(Priority::parse(&buf))
    } else {
        None
    };

    Ok(Frame::Headers(HeadersFrame {
        stream_id,
        flags,
        priority,
        header_block: payload,
    }))
}

fn write_headers(f: &HeadersFrame, out: &mut BytesMut) {
    let mut payload = BytesMut::new();
    if let Some(priority) = &f.priority {
        priority.write(&mut payload);
    }
    payload.put_slice(&f.header_block);
    FrameHeader {
        length: payload.len() as u32,
        type_byte: FrameType::Headers.to_u8().unwrap(),
        flags: f.flags.bits(),
        stream_id: f.stream_id.get(),
    }
    .write(out);
    out.put_slice(&payload);
}

fn parse_priority(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
    let stream_id = non_zero_stream(&header)?;
    if payload.len() != 5 {
        return Err(if payload.len() < 5 {
            FrameError::PayloadTooShort
        } else {
            FrameError::PayloadTooLong
        });
    }
    let mut buf = [0u8; 5];
    buf.copy_from_slice(&payload);
    Ok(Frame::Priority(PriorityFrame {
        stream_id,
        priority: Priority::parse(&buf),
    }))
}

fn write_priority(f: &PriorityFrame, out: &mut BytesMut) {
    let mut payload = BytesMut::new();
    f.priority.write(&mut payload);
    FrameHeader {
        length: payload.len() as u32,
        type_byte: FrameType::Priority.to_u8().unwrap(),
        flags: 0,
        stream_id: f.stream_id.get(),
    }
    .write(out);
    out.put_slice(&payload);
}

fn parse_rst_stream(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
    let stream_id = non_zero_stream(&header)?;
    if payload.len() != 4 {
        return Err(if payload.len() < 4 {
            FrameError::PayloadTooShort
        } else {
            FrameError::PayloadTooLong
        });
    }
    let code = error_code(u32::from_be_bytes(payload[..4].try_into().unwrap()))?;
    Ok(Frame::RstStream(RstStreamFrame {
        stream_id,
        error_code: code,
    }))
}

fn write_rst_stream(f: &RstStreamFrame, out: &mut BytesMut) {
    FrameHeader {
        length: 4,
        type_byte: FrameType::ResetStream.to_u8().unwrap(),
        flags: 0,
        stream_id: f.stream_id.get(),
    }
    .write(out);
    out.put_u32(f.error_code.to_u32().unwrap());
}

fn parse_settings(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
    zero_stream(&header)?;
    let ack = SettingsFlags::from_bits_truncate(header.flags).contains(SettingsFlags::ACK);
    if ack {
        if !payload.is_empty() {
            return Err(FrameError::SettingsAckWithPayload);
        }
        return Ok(Frame::Settings(SettingsFrame::ack()));
    }
    if payload.len() % 6 != 0 {
        return Err(FrameError::SettingsNotMultipleOf6);
    }
    let mut params = Vec::with_capacity(payload.len() / 6);
    for chunk in payload.chunks(6) {
        let id = u16::from_be_bytes([chunk[0], chunk[1]]);
        let value = u32::from_be_bytes(chunk[2..6].try_into().unwrap());
        // Unknown settings identifiers MUST be ignored (RFC 7540 §6.5.2).
        if let Some(param) = SettingsParameter::from_u16(id) {
            params.push((param, value));
        }
    }
    Ok(Frame::Settings(SettingsFrame { ack: false, params }))
}

fn write_settings(f: &SettingsFrame, out: &mut BytesMut) {
    let mut payload = BytesMut::with_capacity(f.params.len() * 6);
    for (param, value) in &f.params {
        payload.put_u16(param.to_u16().unwrap());
        payload.put_u32(*value);
    }
    FrameHeader {
        length: payload.len() as u32,
        type_byte: FrameType::Settings.to_u8().unwrap(),
        flags: if f.ack { SettingsFlags::ACK.bits() } else { 0 },
        stream_id: 0,
    }
    .write(out);
    out.put_slice(&payload);
}

fn parse_push_promise(header: FrameHeader, mut payload: Bytes) -> Result<Frame, FrameError> {
    let stream_id = non_zero_stream(&header)?;
    let flags = PushPromiseFlags::from_bits_truncate(header.flags);

    if flags.contains(PushPromiseFlags::PADDED) {
        if payload.is_empty() {
            return Err(FrameError::PayloadTooShort);
        }
        let pad_len = payload.get_u8() as usize;
        if pad_len > payload.len() {
            return Err(FrameError::InvalidPadding {
                pad_len,
                payload_len: payload.len(),
            });
        }
        let content_len = payload.len() - pad_len;
        payload = payload.split_to(content_len);
    }

    if payload.len() < 4 {
        return Err(FrameError::PayloadTooShort);
    }
    let promised_stream_id = payload.get_u32() & U31_MAX;

    Ok(Frame::PushPromise(PushPromiseFrame {
        stream_id,
        flags,
        promised_stream_id,
        header_block: payload,
    }))
}

fn write_push_promise(f: &PushPromiseFrame, out: &mut BytesMut) {
    let mut payload = BytesMut::with_capacity(4 + f.header_block.len());
    payload.put_u32(f.promised_stream_id & U31_MAX);
    payload.put_slice(&f.header_block);
    FrameHeader {
        length: payload.len() as u32,
        type_byte: FrameType::PushPromise.to_u8().unwrap(),
        flags: f.flags.bits(),
        stream_id: f.stream_id.get(),
    }
    .write(out);
    out.put_slice(&payload);
}

fn parse_ping(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
    zero_stream(&header)?;
    if payload.len() != 8 {
        return Err(if payload.len() < 8 {
            FrameError::PayloadTooShort
        } else {
            FrameError::PayloadTooLong
        });
    }
    let ack = PingFlags::from_bits_truncate(header.flags).contains(PingFlags::ACK);
    let mut data = [0u8; 8];
    data.copy_from_slice(&payload);
    Ok(Frame::Ping(PingFrame { ack, data }))
}

fn write_ping(f: &PingFrame, out: &mut BytesMut) {
    FrameHeader {
        length: 8,
        type_byte: FrameType::Ping.to_u8().unwrap(),
        flags: if f.ack { PingFlags::ACK.bits() } else { 0 },
        stream_id: 0,
    }
    .write(out);
    out.put_slice(&f.data);
}

fn parse_go_away(header: FrameHeader, mut payload: Bytes) -> Result<Frame, FrameError> {
    zero_stream(&header)?;
    if payload.len() < 8 {
        return Err(FrameError::PayloadTooShort);
    }
    let last_stream_id = payload.get_u32() & U31_MAX;
    let code = error_code(payload.get_u32())?;
    Ok(Frame::GoAway(GoAwayFrame {
        last_stream_id,
        error_code: code,
        debug_data: payload,
    }))
}

fn write_go_away(f: &GoAwayFrame, out: &mut BytesMut) {
    let mut payload = BytesMut::with_capacity(8 + f.debug_data.len());
    payload.put_u32(f.last_stream_id & U31_MAX);
    payload.put_u32(f.error_code.to_u32().unwrap());
    payload.put_slice(&f.debug_data);
    FrameHeader {
        length: payload.len() as u32,
        type_byte: FrameType::GoAway.to_u8().unwrap(),
        flags: 0,
        stream_id: 0,
    }
    .write(out);
    out.put_slice(&payload);
}

fn parse_window_update(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
    if payload.len() != 4 {
        return Err(if payload.len() < 4 {
            FrameError::PayloadTooShort
        } else {
            FrameError::PayloadTooLong
        });
    }
    let increment = u32::from_be_bytes(payload[..4].try_into().unwrap()) & U31_MAX;
    if increment == 0 {
        return Err(FrameError::ZeroWindowIncrement);
    }
    Ok(Frame::WindowUpdate(WindowUpdateFrame {
        stream_id: header.stream_id,
        increment,
    }))
}

fn write_window_update(f: &WindowUpdateFrame, out: &mut BytesMut) {
    FrameHeader {
        length: 4,
        type_byte: FrameType::WindowUpdate.to_u8().unwrap(),
        flags: 0,
        stream_id: f.stream_id,
    }
    .write(out);
    out.put_u32(f.increment & U31_MAX);
}

fn parse_continuation(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
    let stream_id = non_zero_stream(&header)?;
    let end_headers =
        ContinuationFlags::from_bits_truncate(header.flags).contains(ContinuationFlags::END_HEADERS);
    Ok(Frame::Continuation(ContinuationFrame {
        stream_id,
        end_headers,
        header_block: payload,
    }))
}

fn write_continuation(f: &ContinuationFrame, out: &mut BytesMut) {
    FrameHeader {
        length: f.header_block.len() as u32,
        type_byte: FrameType::Continuation.to_u8().unwrap(),
        flags: if f.end_headers {
            ContinuationFlags::END_HEADERS.bits()
        } else {
            0
        },
        stream_id: f.stream_id.get(),
    }
    .write(out);
    out.put_slice(&f.header_block);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) -> Frame {
        let mut buf = BytesMut::new();
        frame.write(&mut buf);
        let mut header_bytes = [0u8; HEADER_LEN];
        header_bytes.copy_from_slice(&buf[..HEADER_LEN]);
        let header = FrameHeader::parse(&header_bytes);
        let payload = buf.split_off(HEADER_LEN).freeze();
        Frame::parse(header, payload).expect("roundtrip parse")
    }

    #[test]
    fn data_frame_roundtrip() {
        let frame = Frame::Data(DataFrame {
            stream_id: NonZeroStreamId::new(1).unwrap(),
            flags: DataFlags::END_STREAM,
            data: Bytes::from_static(b"hello"),
            frame_len: 5,
        });
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn data_frame_zero_stream_rejected() {
        let header = FrameHeader {
            length: 0,
            type_byte: FrameType::Data.to_u8().unwrap(),
            flags: 0,
            stream_id: 0,
        };
        assert_eq!(
            Frame::parse(header, Bytes::new()),
            Err(FrameError::ZeroStreamId)
        );
    }

    #[test]
    fn padded_data_rejects_oversized_pad_len() {
        let header = FrameHeader {
            length: 2,
            type_byte: FrameType::Data.to_u8().unwrap(),
            flags: DataFlags::PADDED.bits(),
            stream_id: 1,
        };
        // pad_len byte says 5, but there's only 1 byte left.
        let payload = Bytes::from_static(&[5, b'x']);
        assert!(matches!(
            Frame::parse(header, payload),
            Err(FrameError::InvalidPadding { .. })
        ));
    }

    #[test]
    fn settings_ack_with_payload_is_frame_size_error() {
        let header = FrameHeader {
            length: 6,
            type_byte: FrameType::Settings.to_u8().unwrap(),
            flags: SettingsFlags::ACK.bits(),
            stream_id: 0,
        };
        let payload = Bytes::from_static(&[0, 1, 0, 0, 0x10, 0]);
        assert_eq!(
            Frame::parse(header, payload),
            Err(FrameError::SettingsAckWithPayload)
        );
    }

    #[test]
    fn settings_unknown_parameter_ignored() {
        let header = FrameHeader {
            length: 6,
            type_byte: FrameType::Settings.to_u8().unwrap(),
            flags: 0,
            stream_id: 0,
        };
        // identifier 0x99 is unknown and must be silently dropped.
        let payload = Bytes::from_static(&[0, 0x99, 0, 0, 0, 1]);
        let Frame::Settings(settings) = Frame::parse(header, payload).unwrap() else {
            panic!("expected settings frame");
        };
        assert!(settings.params.is_empty());
    }

    #[test]
    fn window_update_zero_increment_rejected() {
        let header = FrameHeader {
            length: 4,
            type_byte: FrameType::WindowUpdate.to_u8().unwrap(),
            flags: 0,
            stream_id: 1,
        };
        let payload = Bytes::from_static(&[0, 0, 0, 0]);
        assert_eq!(
            Frame::parse(header, payload),
            Err(FrameError::ZeroWindowIncrement)
        );
    }

    #[test]
    fn unknown_frame_type_is_ignored_not_errored() {
        let header = FrameHeader {
            length: 3,
            type_byte: 0x7f,
            flags: 0,
            stream_id: 0,
        };
        let frame = Frame::parse(header, Bytes::from_static(b"abc")).unwrap();
        assert!(matches!(frame, Frame::Unknown { type_byte: 0x7f, .. }));
    }

    #[test]
    fn priority_roundtrip_preserves_exclusive_and_weight() {
        let frame = Frame::Priority(PriorityFrame {
            stream_id: NonZeroStreamId::new(3).unwrap(),
            priority: Priority {
                exclusive: true,
                dependency: 1,
                weight: 15,
            },
        });
        assert_eq!(roundtrip(frame.clone()), frame);
    }
}
