//! Wire-level identifiers shared across the frame codec, HPACK, and the
//! connection engine: frame types, error codes, settings parameters and the
//! stream id aliases. Bit flags live in [`crate::flags`].

use num_derive::{FromPrimitive, ToPrimitive};
use std::num::NonZeroU32;

/// Largest value a 31-bit unsigned field (stream id, window size) can hold.
pub const U31_MAX: u32 = u32::MAX >> 1;

pub type StreamId = u32;
pub type NonZeroStreamId = NonZeroU32;

/// <https://httpwg.org/specs/rfc7540.html#FrameTypes>
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    ResetStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

/// <https://httpwg.org/specs/rfc7540.html#ErrorCodes>
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

/// <https://httpwg.org/specs/rfc7540.html#SettingValues>
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    FromPrimitive,
    ToPrimitive,
    enum_map::Enum,
)]
#[repr(u16)]
pub enum SettingsParameter {
    /// Maximum size of the header compression table used to decode header
    /// blocks, in octets. Initial value 4,096.
    HeaderTableSize = 0x1,
    /// `0` or `1`. Any other value is a connection `PROTOCOL_ERROR`.
    EnablePush = 0x2,
    /// Directional cap on concurrently OPEN/HALF_CLOSED streams the sender
    /// permits the receiver to create.
    MaxConcurrentStreams = 0x3,
    /// Initial flow-control window size for new streams, in octets.
    /// Values above `2^31-1` are a connection `FLOW_CONTROL_ERROR`.
    InitialWindowSize = 0x4,
    /// Largest frame payload the sender is willing to receive. Must stay
    /// within `[2^14, 2^24-1]`.
    MaxFrameSize = 0x5,
    /// Advisory cap on the uncompressed size of a header list (name + value
    /// + 32 per field).
    MaxHeaderListSize = 0x6,
}

/// The six `SETTINGS` parameters a peer (or we) advertises, keyed for O(1)
/// lookup via `enum_map` — the same shape the teacher built inline with
/// `enum_map! { SettingsParameter::... => ... }` in `Connection::connect`.
pub type SettingsTable = enum_map::EnumMap<SettingsParameter, u32>;

/// Our own advertised defaults, per SPEC_FULL.md §6.4.
#[must_use]
pub fn default_settings() -> SettingsTable {
    enum_map::enum_map! {
        SettingsParameter::HeaderTableSize => 4096,
        SettingsParameter::EnablePush => 0,
        SettingsParameter::MaxConcurrentStreams => 100,
        SettingsParameter::InitialWindowSize => 65_535,
        SettingsParameter::MaxFrameSize => 16_384,
        SettingsParameter::MaxHeaderListSize => 8_192,
    }
}

/// Peer's assumed settings before its first SETTINGS frame arrives — the
/// RFC 7540 protocol defaults, not our own preferences.
#[must_use]
pub fn peer_initial_settings() -> SettingsTable {
    enum_map::enum_map! {
        SettingsParameter::HeaderTableSize => 4096,
        SettingsParameter::EnablePush => 1,
        SettingsParameter::MaxConcurrentStreams => u32::MAX,
        SettingsParameter::InitialWindowSize => 65_535,
        SettingsParameter::MaxFrameSize => 16_384,
        SettingsParameter::MaxHeaderListSize => u32::MAX,
    }
}

/// Fixed 24-byte client connection preface.
pub const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
