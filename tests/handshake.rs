//! Preface + SETTINGS exchange (SPEC_FULL.md §8 scenario 1), driven over an
//! in-memory duplex transport instead of a real socket, per §10.4. Mirrors
//! the teacher's flat `tests/basic.rs` layout — one file, a couple of
//! `#[tokio::test]` functions, no shared support crate.

use h2_core::{BufferPool, Config, Connection, Handler, HandlerFuture, Metrics, Request, RequestBody, ResponseWriter, TransportKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
/// Server always advertises exactly six SETTINGS parameters (§6.4), so its
/// opening SETTINGS frame payload is always 6 * 6 = 36 bytes.
const SERVER_SETTINGS_PAYLOAD_LEN: usize = 36;

fn frame_header(length: u32, frame_type: u8, flags: u8, stream_id: u32) -> [u8; 9] {
    let mut buf = [0u8; 9];
    buf[..3].copy_from_slice(&length.to_be_bytes()[1..]);
    buf[3] = frame_type;
    buf[4] = flags;
    buf[5..9].copy_from_slice(&stream_id.to_be_bytes());
    buf
}

fn empty_settings_frame() -> Vec<u8> {
    frame_header(0, 0x4, 0, 0).to_vec()
}

struct Echo;
impl Handler for Echo {
    fn handle(&self, _req: Request, _body: RequestBody, _resp: ResponseWriter) -> HandlerFuture {
        Box::pin(async move {})
    }
}

async fn read_exact_with_timeout(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    len: usize,
) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(2), reader.read_exact(&mut buf))
        .await
        .expect("timed out waiting for server bytes")
        .expect("read error");
    buf
}

#[tokio::test]
async fn server_sends_settings_then_acks_peer_settings() {
    let (client, server) = duplex(4096);
    let config = Config::default();
    let metrics = Arc::new(Metrics::new());
    let pool = Arc::new(BufferPool::new(8));

    let (mut client_read, mut client_write) = tokio::io::split(client);
    client_write
        .write_all(PREFACE)
        .await
        .expect("write preface");
    client_write
        .write_all(&empty_settings_frame())
        .await
        .expect("write empty SETTINGS");

    tokio::spawn(async move {
        let conn = Connection::handshake(server, TransportKind::Cleartext, config, metrics, pool)
            .await
            .expect("handshake should succeed");
        conn.run(Arc::new(Echo)).await;
    });

    // Server's first frame is its own SETTINGS (non-ACK, stream 0).
    let header = read_exact_with_timeout(&mut client_read, 9).await;
    let length = u32::from_be_bytes([0, header[0], header[1], header[2]]) as usize;
    assert_eq!(header[3], 0x4, "expected frame type SETTINGS");
    assert_eq!(header[4] & 0x1, 0, "first SETTINGS must not carry ACK");
    assert_eq!(&header[5..9], &[0, 0, 0, 0], "SETTINGS is connection-level");
    assert_eq!(length, SERVER_SETTINGS_PAYLOAD_LEN);
    let _payload = read_exact_with_timeout(&mut client_read, length).await;

    // Followed by a zero-length SETTINGS ACK acknowledging the client's
    // empty SETTINGS frame.
    let ack_header = read_exact_with_timeout(&mut client_read, 9).await;
    assert_eq!(ack_header, frame_header(0, 0x4, 0x1, 0));
}

#[tokio::test]
async fn bad_preface_is_rejected() {
    let (client, server) = duplex(4096);
    let config = Config::default();
    let metrics = Arc::new(Metrics::new());
    let pool = Arc::new(BufferPool::new(8));

    let (_client_read, mut client_write) = tokio::io::split(client);
    client_write
        .write_all(b"GET / HTTP/1.1\r\n\r\n")
        .await
        .expect("write garbage preface");

    let result = Connection::handshake(server, TransportKind::Cleartext, config, metrics, pool).await;
    assert!(matches!(result, Err(h2_core::HandshakeError::BadPreface)));
}
