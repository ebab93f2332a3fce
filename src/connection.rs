//! The per-connection engine (SPEC_FULL.md §4.5): preface handshake,
//! SETTINGS negotiation, the frame read loop, flow control, HPACK, the
//! security mitigations of §4.6, and dispatch into the worker pool of
//! §4.7. The teacher's `Connection` (`Atte-http2/src/connection.rs`) is a
//! blocking HTTP/2 *client* built around a request/response `Condvar` pair
//! over a shared `Socket` — this is a full rewrite into an async tokio
//! server engine, but keeps the teacher's shape of "one task reads frames
//! off the wire, one task owns writes, per-request work happens off to the
//! side" rather than inventing a new concurrency model from scratch.

use crate::backpressure::Backpressure;
use crate::buffer_pool::BufferPool;
use crate::config::Config;
use crate::error::{ConnectionError, FrameError, H2Error, StreamError};
use crate::flags::{DataFlags, HeadersFlags};
use crate::flow::{AdaptiveWindowUpdater, Window};
use crate::frame::{
    self, ContinuationFrame, DataFrame, Frame, FrameHeader, GoAwayFrame, HeadersFrame, PingFrame,
    PriorityFrame, RstStreamFrame, SettingsFrame, WindowUpdateFrame,
};
use crate::handler::{BodyChunk, Handler, Request, RequestBody, ResponseWriter};
use crate::hpack::{self, HeaderField};
use crate::metrics::Metrics;
use crate::security::{RapidResetTracker, RateLimiters};
use crate::stream::{Continuing, Stream};
use crate::types::{
    default_settings, peer_initial_settings, ErrorCode, NonZeroStreamId, SettingsParameter,
    SettingsTable, StreamId, PREFACE,
};
use crate::worker::{Job, WorkerPool};
use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant as TokioInstant};

/// How the transport reached us, per SPEC_FULL.md §6.2: the core never
/// speaks TLS or parses an h2c Upgrade request itself, but it still needs to
/// know which preface convention the caller already validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// TLS handshake completed and the caller confirmed ALPN negotiated `h2`.
    TlsNegotiatedH2,
    /// Cleartext, prior-knowledge: the caller is handing us the socket right
    /// after (or instead of) reading the 24-byte preface itself.
    Cleartext,
}

/// Failure during the preface/SETTINGS handshake, before a [`Connection`]
/// exists to run a normal GOAWAY-and-drain shutdown.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection preface did not match the expected 24 bytes")]
    BadPreface,
    #[error("peer's first frame was not an unacked SETTINGS frame")]
    FirstFrameNotSettings,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

struct HeaderBlockInProgress {
    stream_id: StreamId,
    kind: Continuing,
}

/// Outbound body bytes queued for a stream, paired with whether this is the
/// last chunk the handler will ever produce for that stream.
type PendingChunk = (Bytes, bool);

/// Per-stream outbound bookkeeping the engine needs beyond the state machine
/// in [`Stream`] itself. One extra chunk of "lookahead" (`last_data`) lets
/// the engine learn whether a DATA chunk is the final one — and so whether
/// it should carry END_STREAM — without delaying the body by more than one
/// message, since `ResponseWriter::send_data` carries no such flag itself.
#[derive(Default)]
struct OutboundState {
    head_sent: bool,
    last_data: Option<Bytes>,
    pending: VecDeque<PendingChunk>,
    trailers_pending: Option<Vec<HeaderField>>,
}

/// Message from a stream's handler task (relayed through a tiny per-stream
/// forwarder) into the engine's single inbox. All HPACK encoding and frame
/// emission happens in the engine task, so ordering across streams is
/// trivially correct without a shared encoder lock.
enum EngineEvent {
    Response {
        stream_id: StreamId,
        message: crate::handler::InternalResponseMessage,
    },
    StreamDone {
        stream_id: StreamId,
    },
}

const WRITE_CHANNEL_CAPACITY: usize = 1024;
const ENGINE_CHANNEL_CAPACITY: usize = 1024;
const RESPONSE_CHANNEL_CAPACITY: usize = 32;
const BODY_CHANNEL_CAPACITY: usize = 32;
const GC_TICK: std::time::Duration = std::time::Duration::from_secs(1);

/// One live HTTP/2 connection. Generic over the transport so a TLS or h2c
/// collaborator can hand over anything that implements `AsyncRead +
/// AsyncWrite`, without this crate depending on a TLS stack itself.
pub struct Connection<T> {
    config: Config,

    local_settings: SettingsTable,
    remote_settings: SettingsTable,

    conn_send_window: Window,
    conn_recv_window: Window,
    conn_recv_updater: AdaptiveWindowUpdater,

    streams: BTreeMap<StreamId, Stream>,
    outbound: HashMap<StreamId, OutboundState>,
    body_senders: HashMap<StreamId, mpsc::Sender<BodyChunk>>,

    last_peer_stream_id: StreamId,
    total_streams_created: u64,
    header_block: Option<HeaderBlockInProgress>,

    encoder: hpack::Encoder,
    decoder: hpack::Decoder,

    reader: ReadHalf<T>,
    write_tx: mpsc::Sender<Bytes>,

    rate_limiters: RateLimiters,
    rapid_reset: RapidResetTracker,
    metrics: Arc<Metrics>,
    buffer_pool: Arc<BufferPool>,
    backpressure: Arc<Backpressure>,

    goaway_sent: bool,
    goaway_received: bool,
    settings_ack_deadline: Option<Instant>,

    engine_tx: mpsc::Sender<EngineEvent>,
    engine_rx: mpsc::Receiver<EngineEvent>,
}

enum Outcome {
    Connection(ConnectionError),
    Stream(StreamError),
}

impl From<H2Error> for Outcome {
    fn from(err: H2Error) -> Self {
        match err {
            H2Error::Connection(e) => Outcome::Connection(e),
            H2Error::Stream(e) => Outcome::Stream(e),
        }
    }
}

impl From<ConnectionError> for Outcome {
    fn from(err: ConnectionError) -> Self {
        Outcome::Connection(err)
    }
}

impl From<StreamError> for Outcome {
    fn from(err: StreamError) -> Self {
        Outcome::Stream(err)
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Reads the 24-byte client preface, exchanges SETTINGS, and returns a
    /// connection ready for [`Connection::run`]. `kind` is purely
    /// informational today (the core treats both the same way) but keeps the
    /// ALPN-vs-prior-knowledge distinction visible at the call site per
    /// SPEC_FULL.md §6.2.
    pub async fn handshake(
        mut transport: T,
        _kind: TransportKind,
        config: Config,
        metrics: Arc<Metrics>,
        buffer_pool: Arc<BufferPool>,
    ) -> Result<Self, HandshakeError> {
        let mut preface = [0u8; PREFACE.len()];
        transport.read_exact(&mut preface).await?;
        if &preface != PREFACE {
            return Err(HandshakeError::BadPreface);
        }

        let (reader, writer) = split(transport);
        let (write_tx, write_rx) = mpsc::channel(WRITE_CHANNEL_CAPACITY);
        tokio::spawn(write_task(writer, write_rx, Arc::clone(&buffer_pool)));

        let local_settings = local_settings_from_config(&config);
        send_settings_frame(&write_tx, &local_settings).await;
        if config.initial_window_size > 65_535 {
            send_raw(
                &write_tx,
                &Frame::WindowUpdate(WindowUpdateFrame {
                    stream_id: 0,
                    increment: config.initial_window_size - 65_535,
                }),
            )
            .await;
        }

        let mut reader = reader;
        let Some((header, payload)) = frame::read_raw(
            &mut reader,
            local_settings[SettingsParameter::MaxFrameSize],
            &buffer_pool,
        )
        .await?
        else {
            return Err(HandshakeError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before SETTINGS",
            )));
        };
        let first = Frame::parse(header, payload).map_err(ConnectionError::from)?;
        let Frame::Settings(settings) = first else {
            send_raw(
                &write_tx,
                &Frame::GoAway(GoAwayFrame {
                    last_stream_id: 0,
                    error_code: ErrorCode::ProtocolError,
                    debug_data: Bytes::new(),
                }),
            )
            .await;
            return Err(HandshakeError::FirstFrameNotSettings);
        };
        if settings.ack {
            return Err(HandshakeError::FirstFrameNotSettings);
        }

        let conn_recv_initial =
            local_settings[SettingsParameter::InitialWindowSize].max(config.initial_window_size);
        let (engine_tx, engine_rx) = mpsc::channel(ENGINE_CHANNEL_CAPACITY);
        let backpressure = Backpressure::new(
            config.connection_backpressure_watermark,
            config.stream_backpressure_watermark,
            Arc::clone(&metrics),
        );

        let mut conn = Self {
            local_settings,
            remote_settings: peer_initial_settings(),
            conn_send_window: Window::new(65_535),
            conn_recv_window: Window::new(conn_recv_initial),
            conn_recv_updater: AdaptiveWindowUpdater::new(conn_recv_initial),
            streams: BTreeMap::new(),
            outbound: HashMap::new(),
            body_senders: HashMap::new(),
            last_peer_stream_id: 0,
            total_streams_created: 0,
            header_block: None,
            encoder: hpack::Encoder::new(4096),
            decoder: hpack::Decoder::new(
                config.header_table_size as usize,
                config.max_header_list_size as usize,
            ),
            reader,
            write_tx: write_tx.clone(),
            rate_limiters: RateLimiters::new(
                config.settings_rate_limit_per_sec,
                config.ping_rate_limit_per_sec,
                config.priority_rate_limit_per_sec,
                config.rst_stream_rate_limit_per_sec,
                config.window_update_rate_limit_per_sec,
            ),
            rapid_reset: RapidResetTracker::new(
                config.rapid_reset_threshold,
                config.rapid_reset_window,
            ),
            metrics,
            buffer_pool,
            backpressure,
            goaway_sent: false,
            goaway_received: false,
            settings_ack_deadline: Some(Instant::now() + config.settings_ack_timeout),
            engine_tx,
            engine_rx,
            config,
        };

        conn.apply_remote_settings(&settings)
            .map_err(HandshakeError::Connection)?;
        send_raw(&write_tx, &Frame::Settings(SettingsFrame::ack())).await;

        Ok(conn)
    }

    /// Drives the connection to completion: read loop, SETTINGS-ACK timeout,
    /// periodic closed-stream GC, and dispatch of admitted requests into the
    /// worker pool. Returns once the connection is fully torn down.
    pub async fn run(mut self, handler: Arc<dyn Handler>) {
        let worker_pool =
            WorkerPool::spawn(handler, self.config.max_workers, self.config.worker_queue);
        let mut gc_interval = tokio::time::interval(GC_TICK);

        loop {
            let max_frame = self.local_settings[SettingsParameter::MaxFrameSize];
            let deadline = self.settings_ack_deadline.map(TokioInstant::from_std);

            tokio::select! {
                raw = frame::read_raw(&mut self.reader, max_frame, &self.buffer_pool) => {
                    match raw {
                        Ok(Some((header, payload))) => {
                            if let Err(outcome) = self.handle_raw_frame(header, payload, &worker_pool).await {
                                match outcome {
                                    Outcome::Connection(err) => {
                                        self.send_goaway(err.code).await;
                                        break;
                                    }
                                    Outcome::Stream(err) => {
                                        self.reset_stream(err.stream_id, err.code, true).await;
                                    }
                                }
                            }
                        }
                        Ok(None) => {
                            debug!("peer closed the connection");
                            break;
                        }
                        Err(e) => {
                            warn!("frame codec error, closing connection: {e}");
                            self.send_goaway(ErrorCode::FrameSizeError).await;
                            break;
                        }
                    }
                }
                event = self.engine_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_engine_event(event).await;
                    }
                }
                _ = gc_interval.tick() => {
                    self.gc_closed_streams();
                }
                _ = sleep_until(deadline.unwrap_or_else(|| TokioInstant::now() + std::time::Duration::from_secs(3600))), if deadline.is_some() => {
                    warn!("peer never acknowledged SETTINGS within the deadline");
                    self.send_goaway(ErrorCode::SettingsTimeout).await;
                    break;
                }
            }

            if self.goaway_sent && self.streams.is_empty() {
                break;
            }
        }

        self.drain().await;
    }

    async fn drain(&mut self) {
        if !self.goaway_sent {
            self.send_goaway(ErrorCode::NoError).await;
        }
        // Give in-flight handler tasks a bounded window to finish writing
        // before the write channel is dropped out from under them.
        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        while !self.streams.is_empty() && Instant::now() < deadline {
            tokio::select! {
                event = self.engine_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_engine_event(event).await;
                    }
                }
                _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
            }
            self.gc_closed_streams();
        }
    }

    // ---- frame dispatch -------------------------------------------------

    async fn handle_raw_frame(
        &mut self,
        header: FrameHeader,
        payload: Bytes,
        worker_pool: &WorkerPool,
    ) -> Result<(), Outcome> {
        self.metrics.record_frame_received();

        if let Some(in_progress) = &self.header_block {
            let is_continuation =
                header.frame_type() == Some(crate::types::FrameType::Continuation);
            if !is_continuation || header.stream_id != in_progress.stream_id {
                return Err(ConnectionError::protocol().into());
            }
        }

        let frame = match Frame::parse(header, payload) {
            Ok(frame) => frame,
            // A malformed PRIORITY frame is a stream-level FRAME_SIZE_ERROR
            // per RFC 7540 §6.3, not the connection-level error the generic
            // FrameError conversion would otherwise produce.
            Err(FrameError::PayloadTooShort | FrameError::PayloadTooLong)
                if header.frame_type() == Some(crate::types::FrameType::Priority) =>
            {
                return Err(StreamError::frame_size(header.stream_id).into());
            }
            Err(err) => return Err(ConnectionError::from(err).into()),
        };
        match frame {
            Frame::Data(f) => self.handle_data(f).await?,
            Frame::Headers(f) => self.handle_headers(f, worker_pool).await?,
            Frame::Priority(f) => self.handle_priority(f)?,
            Frame::RstStream(f) => self.handle_rst_stream(f).await?,
            Frame::Settings(f) => self.handle_settings(f).await?,
            Frame::PushPromise(_) => return Err(ConnectionError::protocol().into()),
            Frame::Ping(f) => self.handle_ping(f).await?,
            Frame::GoAway(f) => self.handle_goaway(f).await,
            Frame::WindowUpdate(f) => self.handle_window_update(f).await?,
            Frame::Continuation(f) => self.handle_continuation(f, worker_pool).await?,
            Frame::Unknown { type_byte, .. } => {
                trace!("ignoring unknown frame type {type_byte:#x}");
            }
        }
        Ok(())
    }

    async fn handle_data(&mut self, f: DataFrame) -> Result<(), Outcome> {
        let stream_id = f.stream_id.get();
        let frame_len = f.frame_len;
        let end_stream = f.flags.contains(DataFlags::END_STREAM);

        self.conn_recv_window
            .consume(frame_len)
            .map_err(ConnectionError::from)?;
        let conn_increment = self
            .conn_recv_updater
            .on_bytes_received(self.conn_recv_window.value(), frame_len);
        // Connection-level flow control applies regardless of the stream's
        // state (RFC 7540 §6.9.1), so this must be settled before any
        // stream-scoped early return below — otherwise DATA arriving after a
        // stream is closed-and-reaped debits the connection window with no
        // replenishment.
        if let Some(inc) = conn_increment {
            self.conn_recv_window
                .apply_delta(i64::from(inc))
                .map_err(ConnectionError::from)?;
            self.send_window_update(0, inc).await;
        }

        let stream_increment = {
            let Some(stream) = self.streams.get_mut(&stream_id) else {
                if stream_id > self.last_peer_stream_id {
                    // Never admitted: genuinely IDLE. RFC 7540 §5.1 treats any
                    // frame but HEADERS/PRIORITY on an IDLE stream as a
                    // connection error, not a per-stream one.
                    return Err(ConnectionError::protocol().into());
                }
                return Err(StreamError::stream_closed(stream_id).into());
            };
            stream
                .windows
                .receive
                .consume(frame_len)
                .map_err(ConnectionError::from)?;
            let inc = stream
                .recv_updater
                .on_bytes_received(stream.windows.receive.value(), frame_len);
            stream.on_data(false, end_stream)?;
            inc
        };

        if let Some(inc) = stream_increment {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream
                    .windows
                    .receive
                    .apply_delta(i64::from(inc))
                    .map_err(ConnectionError::from)?;
            }
            self.send_window_update(stream_id, inc).await;
        }

        if !f.data.is_empty() {
            if let Some(tx) = self.body_senders.get(&stream_id) {
                let _ = tx.send(BodyChunk::Data(f.data)).await;
            }
        }
        if end_stream {
            self.body_senders.remove(&stream_id);
        }
        self.maybe_finalize_closed_stream(stream_id);
        Ok(())
    }

    async fn handle_headers(
        &mut self,
        f: HeadersFrame,
        worker_pool: &WorkerPool,
    ) -> Result<(), Outcome> {
        let stream_id = f.stream_id.get();
        let end_stream = f.flags.contains(HeadersFlags::END_STREAM);
        let end_headers = f.flags.contains(HeadersFlags::END_HEADERS);

        if let Some(priority) = &f.priority {
            if priority.dependency == stream_id {
                return Err(StreamError::protocol(stream_id).into());
            }
        }

        if !self.streams.contains_key(&stream_id) {
            self.admit_stream(stream_id)?;
        }

        let stream = self
            .streams
            .get_mut(&stream_id)
            .expect("just admitted or already present");
        stream.on_headers(false, end_stream)?;
        if let Some(priority) = f.priority {
            stream.priority = priority;
        }
        stream.begin_header_block(Continuing::Headers);
        stream.append_header_fragment(&f.header_block)?;

        if end_headers {
            self.finish_header_block(stream_id, worker_pool).await?;
        } else {
            self.header_block = Some(HeaderBlockInProgress {
                stream_id,
                kind: Continuing::Headers,
            });
        }
        Ok(())
    }

    async fn handle_continuation(
        &mut self,
        f: ContinuationFrame,
        worker_pool: &WorkerPool,
    ) -> Result<(), Outcome> {
        let stream_id = f.stream_id.get();
        let Some(in_progress) = &self.header_block else {
            return Err(ConnectionError::protocol().into());
        };
        if in_progress.stream_id != stream_id {
            return Err(ConnectionError::protocol().into());
        }
        let kind = in_progress.kind;

        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Err(ConnectionError::protocol().into());
        };
        stream.append_header_fragment(&f.header_block)?;

        if f.end_headers {
            self.header_block = None;
            match kind {
                Continuing::Headers => self.finish_header_block(stream_id, worker_pool).await?,
                Continuing::PushPromise => {} // we never admit push; unreachable in practice
            }
        }
        Ok(())
    }

    /// HPACK-decodes the accumulated header block, builds the [`Request`],
    /// and submits it to the worker pool (or rejects the stream if the
    /// decoded headers are malformed, oversized, or the pool is full).
    async fn finish_header_block(
        &mut self,
        stream_id: StreamId,
        worker_pool: &WorkerPool,
    ) -> Result<(), Outcome> {
        let block = {
            let stream = self.streams.get_mut(&stream_id).expect("stream exists");
            stream.end_header_block()
        };
        let decoded = self.decoder.decode(block).map_err(Outcome::from)?;

        if decoded.malformed_name {
            return Err(StreamError::protocol(stream_id).into());
        }
        if decoded.size_exceeded {
            self.metrics.record_header_list_overflow();
            self.reset_stream(stream_id, ErrorCode::RefusedStream, false)
                .await;
            return Ok(());
        }

        let stream_closed_after_headers = {
            let stream = self.streams.get(&stream_id).expect("stream exists");
            stream.state == crate::stream::StreamState::HalfClosedRemote
                || stream.state == crate::stream::StreamState::Closed
        };

        let mut method = Bytes::new();
        let mut scheme = Bytes::new();
        let mut authority = Bytes::new();
        let mut path = Bytes::new();
        let mut headers = Vec::with_capacity(decoded.fields.len());
        for field in decoded.fields {
            match field.name.as_ref() {
                b":method" => method = field.value,
                b":scheme" => scheme = field.value,
                b":authority" => authority = field.value,
                b":path" => path = field.value,
                name if name.starts_with(b":") => {
                    return Err(StreamError::protocol(stream_id).into());
                }
                _ => headers.push(field),
            }
        }
        if method.is_empty() || scheme.is_empty() || path.is_empty() {
            return Err(StreamError::protocol(stream_id).into());
        }

        let request = Request {
            method,
            scheme,
            authority,
            path,
            headers,
        };

        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        if !stream_closed_after_headers {
            self.body_senders.insert(stream_id, body_tx);
        }
        let (resp_tx, mut resp_rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let engine_tx = self.engine_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = resp_rx.recv().await {
                if engine_tx
                    .send(EngineEvent::Response { stream_id, message })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            let _ = engine_tx.send(EngineEvent::StreamDone { stream_id }).await;
        });

        let job = Job {
            request,
            body: RequestBody::new(body_rx),
            response: ResponseWriter::new(resp_tx, stream_id, Arc::clone(&self.backpressure)),
        };
        if worker_pool.try_submit(job).is_err() {
            self.reset_stream(stream_id, ErrorCode::RefusedStream, false)
                .await;
        }
        Ok(())
    }

    fn handle_priority(&mut self, f: PriorityFrame) -> Result<(), Outcome> {
        if !self.rate_limiters.priority.try_acquire() {
            self.metrics.record_rate_limit_trip();
            return Err(ConnectionError::enhance_your_calm().into());
        }
        if f.priority.dependency == f.stream_id.get() {
            return Err(StreamError::protocol(f.stream_id.get()).into());
        }
        if let Some(stream) = self.streams.get_mut(&f.stream_id.get()) {
            let grace_elapsed = stream
                .closed_at
                .is_some_and(|at| at.elapsed() >= self.config.closed_stream_grace);
            stream.check_frame_allowed(grace_elapsed)?;
            stream.priority = f.priority;
        }
        // PRIORITY on a stream we've never heard of is legal (it may arrive
        // before HEADERS) and simply has no effect until the stream exists.
        Ok(())
    }

    async fn handle_rst_stream(&mut self, f: RstStreamFrame) -> Result<(), Outcome> {
        if !self.rate_limiters.rst_stream.try_acquire() {
            self.metrics.record_rate_limit_trip();
            return Err(ConnectionError::enhance_your_calm().into());
        }
        let stream_id = f.stream_id.get();
        if !self.streams.contains_key(&stream_id) && stream_id > self.last_peer_stream_id {
            // Never admitted and still numerically in the future: genuinely
            // IDLE, not merely closed-and-reaped. RFC 7540 §6.4 forbids
            // RST_STREAM on an IDLE stream.
            return Err(ConnectionError::protocol().into());
        }
        let had_work = self
            .streams
            .get(&stream_id)
            .is_some_and(|s| s.headers_complete);
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.on_rst_stream(false);
        }
        self.body_senders.remove(&stream_id);
        self.outbound.remove(&stream_id);
        self.backpressure.forget_stream(stream_id);
        self.metrics.record_stream_reset();

        if had_work && self.rapid_reset.record_reset() {
            self.metrics.record_rapid_reset_trip();
            return Err(ConnectionError::enhance_your_calm().into());
        }
        Ok(())
    }

    async fn handle_settings(&mut self, f: SettingsFrame) -> Result<(), Outcome> {
        if f.ack {
            if self.settings_ack_deadline.take().is_none() {
                debug!("unexpected SETTINGS ACK");
            }
            return Ok(());
        }
        if !self.rate_limiters.settings.try_acquire() {
            self.metrics.record_rate_limit_trip();
            return Err(ConnectionError::enhance_your_calm().into());
        }
        self.apply_remote_settings(&f).map_err(Outcome::from)?;
        send_raw(&self.write_tx, &Frame::Settings(SettingsFrame::ack())).await;
        self.metrics.record_frame_sent();
        Ok(())
    }

    /// Validates every parameter before committing any of them, then applies
    /// wire order (later duplicates override earlier ones within the same
    /// frame), per the Open Question decision recorded in SPEC_FULL.md §9.
    fn apply_remote_settings(&mut self, f: &SettingsFrame) -> Result<(), ConnectionError> {
        let mut staged = self.remote_settings;
        for &(param, value) in &f.params {
            match param {
                SettingsParameter::EnablePush if value > 1 => {
                    return Err(ConnectionError::protocol())
                }
                SettingsParameter::InitialWindowSize if value > crate::types::U31_MAX => {
                    return Err(ConnectionError::flow_control())
                }
                SettingsParameter::MaxFrameSize if !(16_384..=16_777_215).contains(&value) => {
                    return Err(ConnectionError::protocol())
                }
                _ => {}
            }
            staged[param] = value;
        }

        let old_initial_window = self.remote_settings[SettingsParameter::InitialWindowSize];
        let new_initial_window = staged[SettingsParameter::InitialWindowSize];
        if new_initial_window != old_initial_window {
            let delta = i64::from(new_initial_window) - i64::from(old_initial_window);
            for stream in self.streams.values_mut() {
                stream.windows.send.apply_delta(delta)?;
            }
        }

        // The peer's SETTINGS_HEADER_TABLE_SIZE bounds what WE may use when
        // encoding headers to them — it governs our encoder, never our
        // decoder. Our decoder's ceiling is our own advertised
        // header_table_size/max_header_list_size from local config, which
        // never changes post-handshake (see RFC 7541 §4.2/§6.3).
        let new_table_size = staged[SettingsParameter::HeaderTableSize] as usize;
        if new_table_size != self.remote_settings[SettingsParameter::HeaderTableSize] as usize {
            self.encoder.set_max_dynamic_table_size(new_table_size);
        }

        self.remote_settings = staged;
        Ok(())
    }

    async fn handle_ping(&mut self, f: PingFrame) -> Result<(), Outcome> {
        if f.ack {
            return Ok(());
        }
        if !self.rate_limiters.ping.try_acquire() {
            self.metrics.record_rate_limit_trip();
            return Err(ConnectionError::enhance_your_calm().into());
        }
        send_raw(
            &self.write_tx,
            &Frame::Ping(PingFrame {
                ack: true,
                data: f.data,
            }),
        )
        .await;
        self.metrics.record_frame_sent();
        Ok(())
    }

    async fn handle_goaway(&mut self, f: GoAwayFrame) {
        self.goaway_received = true;
        debug!(
            "peer sent GOAWAY code={:?} last_stream_id={}",
            f.error_code, f.last_stream_id
        );
        let to_cancel: Vec<StreamId> = self
            .streams
            .keys()
            .copied()
            .filter(|id| *id > f.last_stream_id)
            .collect();
        for id in to_cancel {
            self.reset_stream(id, ErrorCode::RefusedStream, true).await;
        }
    }

    async fn handle_window_update(&mut self, f: WindowUpdateFrame) -> Result<(), Outcome> {
        if !self.rate_limiters.window_update.try_acquire() {
            self.metrics.record_rate_limit_trip();
            return Err(ConnectionError::enhance_your_calm().into());
        }
        if f.stream_id == 0 {
            self.conn_send_window
                .apply_delta(i64::from(f.increment))
                .map_err(ConnectionError::from)?;
            let stalled: Vec<StreamId> = self.streams.keys().copied().collect();
            for id in stalled {
                self.try_flush_pending(id).await;
            }
        } else if let Some(stream) = self.streams.get_mut(&f.stream_id) {
            stream
                .windows
                .send
                .apply_delta(i64::from(f.increment))
                .map_err(|e| StreamError::new(f.stream_id, e.code))?;
            self.try_flush_pending(f.stream_id).await;
        }
        Ok(())
    }

    // ---- stream admission ------------------------------------------------

    fn admit_stream(&mut self, stream_id: StreamId) -> Result<(), ConnectionError> {
        if stream_id % 2 == 0 || stream_id <= self.last_peer_stream_id {
            return Err(ConnectionError::protocol());
        }
        let open_count = self.streams.values().filter(|s| !s.is_closed()).count() as u32;
        if open_count >= self.local_settings[SettingsParameter::MaxConcurrentStreams] {
            return Err(ConnectionError::enhance_your_calm());
        }
        if self.total_streams_created >= self.config.max_total_streams {
            return Err(ConnectionError::enhance_your_calm());
        }
        if self.rapid_reset.score() >= self.config.rapid_reset_threshold {
            return Err(ConnectionError::enhance_your_calm());
        }

        self.last_peer_stream_id = stream_id;
        self.total_streams_created += 1;
        self.metrics.record_stream_opened();
        let id =
            NonZeroStreamId::new(stream_id).expect("stream_id checked non-zero by frame codec");
        let initial_window = self.local_settings[SettingsParameter::InitialWindowSize];
        self.streams.insert(
            stream_id,
            Stream::new_idle(
                id,
                initial_window,
                self.config.continuation_max_frames,
                self.config.continuation_max_bytes,
            ),
        );
        Ok(())
    }

    fn gc_closed_streams(&mut self) {
        let grace = self.config.closed_stream_grace;
        let expired: Vec<StreamId> = self
            .streams
            .iter()
            .filter_map(|(id, s)| s.closed_at.filter(|at| at.elapsed() >= grace).map(|_| *id))
            .collect();
        for id in expired {
            self.streams.remove(&id);
            self.outbound.remove(&id);
            self.body_senders.remove(&id);
            self.backpressure.forget_stream(id);
        }
    }

    fn maybe_finalize_closed_stream(&mut self, stream_id: StreamId) {
        if self.streams.get(&stream_id).is_some_and(Stream::is_closed) {
            self.metrics.record_stream_closed();
        }
    }

    // ---- outbound response handling -------------------------------------

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Response { stream_id, message } => {
                self.handle_response_message(stream_id, message).await;
            }
            EngineEvent::StreamDone { stream_id } => {
                self.finalize_outbound(stream_id).await;
            }
        }
    }

    async fn handle_response_message(
        &mut self,
        stream_id: StreamId,
        message: crate::handler::InternalResponseMessage,
    ) {
        use crate::handler::InternalResponseMessage as M;
        if !self.streams.contains_key(&stream_id) {
            return; // stream already gone (reset, GOAWAY-cancelled, GC'd)
        }
        match message {
            M::Head { status, headers } => {
                self.send_response_headers(stream_id, status, headers).await;
            }
            M::Data(bytes) => {
                self.backpressure.on_enqueue(stream_id, bytes.len());
                let state = self.outbound.entry(stream_id).or_default();
                if let Some(prev) = state.last_data.take() {
                    state.pending.push_back((prev, false));
                }
                state.last_data = Some(bytes);
                self.try_flush_pending(stream_id).await;
            }
            M::Trailers(fields) => {
                let state = self.outbound.entry(stream_id).or_default();
                if let Some(prev) = state.last_data.take() {
                    state.pending.push_back((prev, false));
                }
                state.trailers_pending = Some(fields);
                self.try_flush_pending(stream_id).await;
            }
        }
    }

    async fn send_response_headers(
        &mut self,
        stream_id: StreamId,
        status: u16,
        headers: Vec<HeaderField>,
    ) {
        let mut fields = Vec::with_capacity(headers.len() + 1);
        fields.push(HeaderField::new(
            &b":status"[..],
            status.to_string().into_bytes(),
        ));
        fields.extend(headers);
        let block = self.encoder.encode(&fields);
        self.write_header_block(stream_id, block, false).await;
        self.outbound.entry(stream_id).or_default().head_sent = true;
    }

    /// Writes a HEADERS frame for `block`, splitting into CONTINUATION
    /// frames if it exceeds the peer's advertised MAX_FRAME_SIZE. `end_stream`
    /// is only ever `true` here for trailers (a headers-only response with no
    /// body closes via an empty terminal DATA frame instead, in
    /// `try_flush_pending`).
    async fn write_header_block(&mut self, stream_id: StreamId, mut block: Bytes, end_stream: bool) {
        let max_frame = self.remote_settings[SettingsParameter::MaxFrameSize] as usize;
        let Some(id) = NonZeroStreamId::new(stream_id) else {
            return;
        };
        let first_len = block.len().min(max_frame);
        let first_chunk = block.split_to(first_len);
        let end_headers = block.is_empty();
        send_raw(
            &self.write_tx,
            &Frame::Headers(HeadersFrame {
                stream_id: id,
                flags: headers_flags(end_stream, end_headers),
                priority: None,
                header_block: first_chunk,
            }),
        )
        .await;
        self.metrics.record_frame_sent();
        while !block.is_empty() {
            let len = block.len().min(max_frame);
            let chunk = block.split_to(len);
            let end_headers = block.is_empty();
            send_raw(
                &self.write_tx,
                &Frame::Continuation(ContinuationFrame {
                    stream_id: id,
                    end_headers,
                    header_block: chunk,
                }),
            )
            .await;
            self.metrics.record_frame_sent();
        }
        if end_stream {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                let _ = stream.on_headers(true, true);
            }
            self.maybe_finalize_closed_stream(stream_id);
        }
    }

    /// Drains as much of a stream's pending DATA backlog as the connection
    /// and stream send windows allow, chunked to MAX_FRAME_SIZE. Whatever
    /// can't be sent yet stays queued in FIFO order for the next
    /// WINDOW_UPDATE or SETTINGS-driven fan-out.
    async fn try_flush_pending(&mut self, stream_id: StreamId) {
        let max_frame = self.remote_settings[SettingsParameter::MaxFrameSize] as usize;
        loop {
            let Some((chunk, marked_end)) = self
                .outbound
                .get_mut(&stream_id)
                .and_then(|s| s.pending.pop_front())
            else {
                break;
            };

            let conn_avail = self.conn_send_window.value().max(0) as usize;
            let stream_avail = self
                .streams
                .get(&stream_id)
                .map_or(0, |s| s.windows.send.value().max(0) as usize);
            let avail = conn_avail.min(stream_avail);

            if avail == 0 && !chunk.is_empty() {
                // Stalled: put it back and stop until a WINDOW_UPDATE arrives.
                if let Some(state) = self.outbound.get_mut(&stream_id) {
                    state.pending.push_front((chunk, marked_end));
                }
                return;
            }

            let send_len = chunk.len().min(avail).min(max_frame);
            let mut chunk = chunk;
            let rest = if send_len < chunk.len() {
                Some(chunk.split_off(send_len))
            } else {
                None
            };
            let end_stream_now = marked_end && rest.is_none();

            let Some(id) = NonZeroStreamId::new(stream_id) else {
                return;
            };
            let frame_len = chunk.len() as u32;
            send_raw(
                &self.write_tx,
                &Frame::Data(DataFrame {
                    stream_id: id,
                    flags: if end_stream_now {
                        DataFlags::END_STREAM
                    } else {
                        DataFlags::empty()
                    },
                    data: chunk,
                    frame_len,
                }),
            )
            .await;
            self.metrics.record_frame_sent();
            self.backpressure.on_dequeue(stream_id, frame_len as usize);
            self.conn_send_window.debit(frame_len);
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.windows.send.debit(frame_len);
            }

            if let Some(rest) = rest {
                if let Some(state) = self.outbound.get_mut(&stream_id) {
                    state.pending.push_front((rest, marked_end));
                }
                continue;
            }
            if end_stream_now {
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    let _ = stream.on_data(true, true);
                }
                self.maybe_finalize_closed_stream(stream_id);
            }
        }

        let trailers_ready = self
            .outbound
            .get(&stream_id)
            .is_some_and(|s| s.pending.is_empty() && s.trailers_pending.is_some());
        if trailers_ready {
            let fields = self
                .outbound
                .get_mut(&stream_id)
                .and_then(|s| s.trailers_pending.take())
                .unwrap_or_default();
            let block = self.encoder.encode(&fields);
            self.write_header_block(stream_id, block, true).await;
        }
    }

    /// Called once a stream's handler has finished (its response channel
    /// closed). Flushes the buffered last chunk as the true final one, or —
    /// if nothing was ever sent — closes the stream outright.
    async fn finalize_outbound(&mut self, stream_id: StreamId) {
        let head_sent = self.outbound.get(&stream_id).is_some_and(|s| s.head_sent);
        if !head_sent {
            self.reset_stream(stream_id, ErrorCode::InternalError, false)
                .await;
            return;
        }
        let state = self.outbound.entry(stream_id).or_default();
        let has_trailers = state.trailers_pending.is_some();
        if let Some(last) = state.last_data.take() {
            state.pending.push_back((last, !has_trailers));
        } else if !has_trailers && state.pending.is_empty() {
            state.pending.push_back((Bytes::new(), true));
        }
        self.try_flush_pending(stream_id).await;
    }

    // ---- sending helpers --------------------------------------------------

    async fn send_window_update(&mut self, stream_id: StreamId, increment: u32) {
        send_raw(
            &self.write_tx,
            &Frame::WindowUpdate(WindowUpdateFrame {
                stream_id,
                increment,
            }),
        )
        .await;
        self.metrics.record_frame_sent();
    }

    async fn send_goaway(&mut self, code: ErrorCode) {
        if self.goaway_sent {
            return;
        }
        self.goaway_sent = true;
        send_raw(
            &self.write_tx,
            &Frame::GoAway(GoAwayFrame {
                last_stream_id: self.last_peer_stream_id,
                error_code: code,
                debug_data: Bytes::new(),
            }),
        )
        .await;
        self.metrics.record_frame_sent();
    }

    async fn reset_stream(&mut self, stream_id: StreamId, code: ErrorCode, by_peer: bool) {
        if let Some(id) = NonZeroStreamId::new(stream_id) {
            send_raw(
                &self.write_tx,
                &Frame::RstStream(RstStreamFrame {
                    stream_id: id,
                    error_code: code,
                }),
            )
            .await;
            self.metrics.record_frame_sent();
        }
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.on_rst_stream(!by_peer);
        }
        self.body_senders.remove(&stream_id);
        self.outbound.remove(&stream_id);
        self.backpressure.forget_stream(stream_id);
        self.metrics.record_stream_reset();
    }
}

fn headers_flags(end_stream: bool, end_headers: bool) -> HeadersFlags {
    let mut flags = HeadersFlags::empty();
    if end_stream {
        flags |= HeadersFlags::END_STREAM;
    }
    if end_headers {
        flags |= HeadersFlags::END_HEADERS;
    }
    flags
}

fn local_settings_from_config(config: &Config) -> SettingsTable {
    let mut settings = default_settings();
    settings[SettingsParameter::HeaderTableSize] = config.header_table_size;
    settings[SettingsParameter::EnablePush] = config.enable_push;
    settings[SettingsParameter::MaxConcurrentStreams] = config.max_concurrent_streams;
    settings[SettingsParameter::InitialWindowSize] = config.initial_window_size;
    settings[SettingsParameter::MaxFrameSize] = config.max_frame_size;
    settings[SettingsParameter::MaxHeaderListSize] = config.max_header_list_size;
    settings
}

async fn send_settings_frame(write_tx: &mpsc::Sender<Bytes>, settings: &SettingsTable) {
    let params = vec![
        (
            SettingsParameter::HeaderTableSize,
            settings[SettingsParameter::HeaderTableSize],
        ),
        (SettingsParameter::EnablePush, settings[SettingsParameter::EnablePush]),
        (
            SettingsParameter::MaxConcurrentStreams,
            settings[SettingsParameter::MaxConcurrentStreams],
        ),
        (
            SettingsParameter::InitialWindowSize,
            settings[SettingsParameter::InitialWindowSize],
        ),
        (
            SettingsParameter::MaxFrameSize,
            settings[SettingsParameter::MaxFrameSize],
        ),
        (
            SettingsParameter::MaxHeaderListSize,
            settings[SettingsParameter::MaxHeaderListSize],
        ),
    ];
    send_raw(write_tx, &Frame::Settings(SettingsFrame { ack: false, params })).await;
}

async fn send_raw(write_tx: &mpsc::Sender<Bytes>, frame: &Frame) {
    let mut buf = BytesMut::new();
    frame.write(&mut buf);
    if write_tx.send(buf.freeze()).await.is_err() {
        debug!("write task gone; dropping outbound frame");
    }
}

/// Single writer task owning the transport's write half. Frames queued
/// faster than the socket can drain are coalesced into one `write_all` call
/// rather than issued one syscall per frame — a simplification of true
/// vectored I/O noted in DESIGN.md, chosen because `tokio`'s default
/// `poll_write_vectored` already falls back to writing only the first
/// buffer on most transports. The coalescing buffer itself is drawn from
/// and returned to `pool` on every batch, the other half of the round trip
/// `frame::read_raw` draws from on the read side.
async fn write_task<W>(mut writer: W, mut rx: mpsc::Receiver<Bytes>, pool: Arc<BufferPool>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut batch = pool.acquire(first.len());
        batch.extend_from_slice(&first);
        while let Ok(next) = rx.try_recv() {
            batch.extend_from_slice(&next);
        }
        let result = writer.write_all(&batch).await;
        pool.release(batch);
        if let Err(e) = result {
            warn!("write_task: {e}");
            return;
        }
    }
    let _ = writer.shutdown().await;
}
