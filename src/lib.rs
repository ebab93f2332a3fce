#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::too_many_lines,
)]

//! A standalone HTTP/2 (RFC 7540) and HPACK (RFC 7541) server core: frame
//! codec, stream state machine, flow control, header compression, and the
//! connection-level security mitigations needed to run behind a real TLS or
//! h2c listener. This crate owns none of the transport itself — callers hand
//! [`Connection::handshake`] anything that implements `AsyncRead +
//! AsyncWrite` and a [`Handler`] to run admitted requests against.

mod backpressure;
mod buffer_pool;
mod config;
mod connection;
mod error;
mod flags;
mod flow;
mod frame;
mod handler;
mod hpack;
mod metrics;
mod security;
mod stream;
mod types;
mod worker;

pub use bytes::Bytes;

pub use buffer_pool::BufferPool;
pub use config::Config;
pub use connection::{Connection, HandshakeError, TransportKind};
pub use error::{ConnectionError, H2Error, StreamError};
pub use handler::{BodyChunk, Handler, HandlerFuture, Request, RequestBody, ResponseClosed, ResponseWriter};
pub use hpack::HeaderField;
pub use metrics::{Metrics, MetricsSnapshot};
pub use types::{ErrorCode, SettingsParameter};
