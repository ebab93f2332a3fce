//! Simple GET request/response cycle (SPEC_FULL.md §8 scenario 2), driven
//! over an in-memory duplex transport per §10.4.

use h2_core::{
    BufferPool, Config, Connection, HandlerFuture, Metrics, Request, RequestBody, ResponseWriter,
    TransportKind,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
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

/// A HEADERS frame for stream 1 carrying `:method: GET`, `:scheme: https`,
/// `:path: /` as static-table indexed representations (RFC 7541 Appendix A
/// indices 2, 7, 4), with END_HEADERS|END_STREAM set since this request
/// carries no body.
fn get_request_headers_frame() -> Vec<u8> {
    let block: &[u8] = &[0x82, 0x87, 0x84];
    let mut out = frame_header(block.len() as u32, 0x1, 0x5, 1).to_vec();
    out.extend_from_slice(block);
    out
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

/// Responds 200 with no body to every request.
struct RespondOk;
impl h2_core::Handler for RespondOk {
    fn handle(&self, _req: Request, _body: RequestBody, mut resp: ResponseWriter) -> HandlerFuture {
        Box::pin(async move {
            let _ = resp.send_head(200, vec![]).await;
        })
    }
}

#[tokio::test]
async fn get_request_receives_200_response() {
    let (client, server) = duplex(8192);
    let config = Config::default();
    let metrics = Arc::new(Metrics::new());
    let pool = Arc::new(BufferPool::new(8));

    let (mut client_read, mut client_write) = tokio::io::split(client);
    client_write.write_all(PREFACE).await.expect("write preface");
    client_write
        .write_all(&empty_settings_frame())
        .await
        .expect("write empty SETTINGS");
    client_write
        .write_all(&get_request_headers_frame())
        .await
        .expect("write GET HEADERS frame");

    tokio::spawn(async move {
        let conn = Connection::handshake(server, TransportKind::Cleartext, config, metrics, pool)
            .await
            .expect("handshake should succeed");
        conn.run(Arc::new(RespondOk)).await;
    });

    // Skip past the server's opening SETTINGS frame and its ACK of ours.
    let settings_header = read_exact_with_timeout(&mut client_read, 9).await;
    assert_eq!(settings_header[3], 0x4);
    let _ = read_exact_with_timeout(&mut client_read, SERVER_SETTINGS_PAYLOAD_LEN).await;
    let ack_header = read_exact_with_timeout(&mut client_read, 9).await;
    assert_eq!(ack_header, frame_header(0, 0x4, 0x1, 0));

    // Next is the HEADERS frame carrying our :status response.
    let resp_headers_header = read_exact_with_timeout(&mut client_read, 9).await;
    assert_eq!(resp_headers_header[3], 0x1, "expected frame type HEADERS");
    assert_eq!(&resp_headers_header[5..9], &1u32.to_be_bytes());
    let resp_len = u32::from_be_bytes([
        0,
        resp_headers_header[0],
        resp_headers_header[1],
        resp_headers_header[2],
    ]) as usize;
    let resp_block = read_exact_with_timeout(&mut client_read, resp_len).await;
    // `:status: 200` is an exact match for static-table entry 8, so the
    // encoder emits it as a single fully-indexed byte (0x80 | 8).
    assert_eq!(resp_block, vec![0x88]);

    // Headers-only response closes via a zero-length terminal DATA frame.
    let data_header = read_exact_with_timeout(&mut client_read, 9).await;
    assert_eq!(data_header, frame_header(0, 0x0, 0x1, 1));
}
