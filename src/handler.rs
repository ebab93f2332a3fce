//! The application handler contract (SPEC_FULL.md §6.3): what the worker
//! pool hands to application code, and the capability handles the handler
//! uses to read the request body and write the response. New code — the
//! teacher is a client with no handler concept — shaped like the channel
//! based request/response split the teacher already uses between
//! `spawn_request_sender`/`spawn_response_receiver` in `connection.rs`.

use crate::backpressure::Backpressure;
use crate::hpack::HeaderField;
use crate::types::StreamId;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Bytes,
    pub scheme: Bytes,
    pub authority: Bytes,
    pub path: Bytes,
    /// Lowercased by the HPACK decoder; pseudo-headers excluded.
    pub headers: Vec<HeaderField>,
}

/// One chunk of an incoming request body, delivered in order.
#[derive(Debug, Clone)]
pub enum BodyChunk {
    Data(Bytes),
    Trailers(Vec<HeaderField>),
}

/// Readable request body handle. Backed by the stream's internal body
/// buffer; the connection engine feeds it from the read loop and applies
/// receive-side flow control as chunks are handed off.
pub struct RequestBody {
    rx: mpsc::Receiver<BodyChunk>,
}

impl RequestBody {
    #[must_use]
    pub fn new(rx: mpsc::Receiver<BodyChunk>) -> Self {
        Self { rx }
    }

    pub async fn next_chunk(&mut self) -> Option<BodyChunk> {
        self.rx.recv().await
    }
}

#[derive(Debug)]
pub(crate) enum ResponseMessage {
    Head { status: u16, headers: Vec<HeaderField> },
    Data(Bytes),
    Trailers(Vec<HeaderField>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response channel closed: connection or stream is shutting down")]
pub struct ResponseClosed;

/// Writable response handle. The handler MUST eventually drop this (or call
/// [`ResponseWriter::close`]) to signal END_STREAM; dropping without ever
/// calling `send_head` is treated by the connection engine as an internal
/// error on that stream.
pub struct ResponseWriter {
    tx: mpsc::Sender<ResponseMessage>,
    head_sent: bool,
    stream_id: StreamId,
    backpressure: Arc<Backpressure>,
}

impl ResponseWriter {
    #[must_use]
    pub fn new(
        tx: mpsc::Sender<ResponseMessage>,
        stream_id: StreamId,
        backpressure: Arc<Backpressure>,
    ) -> Self {
        Self {
            tx,
            head_sent: false,
            stream_id,
            backpressure,
        }
    }

    pub async fn send_head(
        &mut self,
        status: u16,
        headers: Vec<HeaderField>,
    ) -> Result<(), ResponseClosed> {
        self.head_sent = true;
        self.tx
            .send(ResponseMessage::Head { status, headers })
            .await
            .map_err(|_| ResponseClosed)
    }

    /// Sends one body chunk, then suspends at this await point — never
    /// blocking the connection's read loop, only this handler task — while
    /// the stream or connection is above its backpressure high watermark
    /// (SPEC_FULL.md §4.7, suspension point (vi) in §5).
    pub async fn send_data(&mut self, data: Bytes) -> Result<(), ResponseClosed> {
        self.tx
            .send(ResponseMessage::Data(data))
            .await
            .map_err(|_| ResponseClosed)?;
        self.backpressure.wait_while_paused(self.stream_id).await;
        Ok(())
    }

    pub async fn send_trailers(&mut self, trailers: Vec<HeaderField>) -> Result<(), ResponseClosed> {
        self.tx
            .send(ResponseMessage::Trailers(trailers))
            .await
            .map_err(|_| ResponseClosed)
    }

    #[must_use]
    pub fn head_sent(&self) -> bool {
        self.head_sent
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Application code implements this trait once per server; the worker pool
/// drives one invocation per admitted stream.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request, body: RequestBody, response: ResponseWriter) -> HandlerFuture;
}

impl<F> Handler for F
where
    F: Fn(Request, RequestBody, ResponseWriter) -> HandlerFuture + Send + Sync + 'static,
{
    fn handle(&self, request: Request, body: RequestBody, response: ResponseWriter) -> HandlerFuture {
        self(request, body, response)
    }
}

pub(crate) use ResponseMessage as InternalResponseMessage;
