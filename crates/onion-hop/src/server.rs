use crate::forward::process_frame;
use crate::state::HopState;
use onion_types::{OnionError, OnionResult};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
const HEADER_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind and run the hop's accept loop (§4.C). One task per connection, raw
/// HTTP/1.1 request-line/header parsing, exact `Content-Length`-driven body
/// reads, generalized from this stack's daemon API server, which reads a
/// single `read_line` for the body because its bodies are newline-terminated
/// JSON; onion frames are arbitrary binary, so the body is read as exactly
/// `Content-Length` bytes instead.
pub async fn run(state: Arc<HopState>) -> OnionResult<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", state.config.port)
        .parse()
        .map_err(|e| OnionError::Config(format!("invalid bind address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| OnionError::Internal(format!("failed to bind hop listener: {e}")))?;

    info!(addr = %addr, this_node = %state.config.this_node, "hop listening");

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        debug!(peer = %peer_addr, error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "accept error");
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<HopState>) -> OnionResult<()> {
    let mut reader = BufReader::new(stream);
    let (method, path, content_length) = read_request_head(&mut reader).await?;

    let body = if content_length > 0 {
        if content_length > MAX_BODY_BYTES {
            return send_error(reader.get_mut(), 413, "request body too large").await;
        }
        let mut buf = vec![0u8; content_length];
        tokio::time::timeout(HEADER_TIMEOUT, reader.read_exact(&mut buf))
            .await
            .map_err(|_| OnionError::Internal("timed out reading request body".into()))?
            .map_err(|e| OnionError::Internal(format!("failed to read request body: {e}")))?;
        buf
    } else {
        Vec::new()
    };

    let stream = reader.get_mut();
    match (method.as_str(), path.as_str()) {
        ("GET", "/get-public-key") => serve_public_key(stream, &state).await,
        ("GET", "/info") => serve_info(stream, &state).await,
        ("POST", "/") => serve_forward(stream, &state, &body).await,
        _ => send_error(stream, 404, &format!("unknown endpoint: {method} {path}")).await,
    }
}

/// Parses the request line and headers off `reader`, leaving any bytes the
/// `BufReader` has already buffered past the blank line in place for the
/// subsequent body `read_exact` on the same reader; splitting this into a
/// function that hands back a fresh stream reference would silently drop
/// those buffered bytes.
async fn read_request_head(
    reader: &mut BufReader<TcpStream>,
) -> OnionResult<(String, String, usize)> {
    let mut request_line = String::new();

    tokio::time::timeout(HEADER_TIMEOUT, read_line(reader, &mut request_line))
        .await
        .map_err(|_| OnionError::Internal("timed out reading request line".into()))?
        .map_err(|e| OnionError::Internal(format!("failed to read request line: {e}")))?;

    let mut parts = request_line.trim().split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();
    if method.is_empty() || path.is_empty() {
        return Err(OnionError::Internal("malformed request line".into()));
    }

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        tokio::time::timeout(HEADER_TIMEOUT, read_line(reader, &mut line))
            .await
            .map_err(|_| OnionError::Internal("timed out reading headers".into()))?
            .map_err(|e| OnionError::Internal(format!("failed to read headers: {e}")))?;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    Ok((method, path, content_length))
}

async fn read_line<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut String,
) -> std::io::Result<usize> {
    tokio::io::AsyncBufReadExt::read_line(reader, buf).await
}

async fn serve_public_key(stream: &mut TcpStream, state: &HopState) -> OnionResult<()> {
    send_response(stream, 200, "application/x-pem-file", state.public_key_pem.as_bytes()).await
}

async fn serve_info(stream: &mut TcpStream, state: &HopState) -> OnionResult<()> {
    let body = json!({
        "this_node": state.config.this_node,
        "directory_node": state.config.directory_node,
        "tracking_id": state.config.tracking_id,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "requests_handled": state.request_count(),
    });
    send_response(stream, 200, "application/json", body.to_string().as_bytes()).await
}

async fn serve_forward(stream: &mut TcpStream, state: &HopState, body: &[u8]) -> OnionResult<()> {
    state.record_request();
    match process_frame(state, body).await {
        Ok(frame_bytes) => send_response(stream, 200, "application/octet-stream", &frame_bytes).await,
        Err(message) => {
            warn!(error = %message, "forwarding pass failed");
            send_response(stream, 200, "text/plain", message.as_bytes()).await
        }
    }
}

async fn send_error(stream: &mut TcpStream, status: u16, message: &str) -> OnionResult<()> {
    send_response(stream, status, "text/plain", message.as_bytes()).await
}

/// Write an HTTP/1.1 response with an exact `Content-Length` body. Shared by
/// every endpoint above, binary (frames, PEM) and text (errors, JSON)
/// responses alike, since the body is always already a byte slice here.
async fn send_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> OnionResult<()> {
    let status_text = match status {
        200 => "OK",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    };

    let header = format!(
        "HTTP/1.1 {status} {status_text}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    stream
        .write_all(header.as_bytes())
        .await
        .map_err(|e| OnionError::Internal(format!("failed to write response header: {e}")))?;
    stream
        .write_all(body)
        .await
        .map_err(|e| OnionError::Internal(format!("failed to write response body: {e}")))?;

    Ok(())
}
