use crate::allocation::draw_three_distinct;
use crate::orchestrator::HopLaunchSpec;
use crate::state::DirectoryState;
use onion_types::{CircuitOutcome, NodeId, OnionError, OnionResult, TrackingId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 1024 * 1024;
const HEADER_TIMEOUT: Duration = Duration::from_secs(5);

/// Base port each launched hop listens on; the node identifier offsets it so
/// every hop on one machine gets a distinct local port (ambient, not part
/// of the wire protocol, only needed by the local-process orchestrator).
const HOP_BASE_PORT: u16 = 9000;

pub async fn run(state: Arc<DirectoryState>) -> OnionResult<()> {
    let addr = SocketAddr::new(state.config.bind_address, state.config.port);
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        OnionError::Internal(format!("failed to bind directory listener: {e}"))
    })?;

    info!(%addr, "directory listening");

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        tracing::debug!(peer = %peer_addr, error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => error!(error = %e, "accept error"),
        }
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<DirectoryState>) -> OnionResult<()> {
    let mut reader = BufReader::new(stream);
    let (method, path, content_length) = read_request_head(&mut reader).await?;

    let body = if content_length > 0 {
        if content_length > MAX_BODY_BYTES {
            return send_json(reader.get_mut(), 413, &json!({"error": "request body too large"})).await;
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
        ("GET", "/") => serve_diagnostics(stream, &state).await,
        ("POST", "/route") => serve_route(stream, &state, &body).await,
        ("POST", "/notify") => serve_notify(stream, &state, &body).await,
        ("POST", "/check") => serve_check(stream, &state, &body).await,
        _ => send_json(stream, 404, &json!({"error": format!("unknown endpoint: {method} {path}")})).await,
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

    tokio::time::timeout(
        HEADER_TIMEOUT,
        tokio::io::AsyncBufReadExt::read_line(reader, &mut request_line),
    )
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
        tokio::time::timeout(
            HEADER_TIMEOUT,
            tokio::io::AsyncBufReadExt::read_line(reader, &mut line),
        )
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

#[derive(Deserialize)]
struct RouteRequest {
    public_key: Option<String>,
}

#[derive(Serialize)]
struct RouteResponse {
    tracking_id: String,
    route: [String; 3],
}

async fn serve_route(stream: &mut TcpStream, state: &DirectoryState, body: &[u8]) -> OnionResult<()> {
    let request: RouteRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return send_json(stream, 400, &json!({"error": format!("malformed request body: {e}")})).await,
    };

    let Some(public_key) = request.public_key.filter(|s| !s.is_empty()) else {
        return send_json(stream, 400, &json!({"error": "public_key is required"})).await;
    };

    let in_use = state.registry.live_node_ids().await;
    let ids = draw_three_distinct(state.config.id_range(), &in_use);
    let ids: [NodeId; 3] = [ids[0], ids[1], ids[2]];

    let tracking_id = TrackingId::new();
    let hops: [String; 3] = std::array::from_fn(|i| state.config.node_url(ids[i]));

    let launch_results = {
        let specs: Vec<HopLaunchSpec> = ids
            .iter()
            .zip(hops.iter())
            .map(|(id, hop_url)| HopLaunchSpec {
                port: HOP_BASE_PORT + id.value() as u16,
                directory_node: state.config.node_url_template.clone(),
                this_node: hop_url.clone(),
                tracking_id: tracking_id.to_hex(),
                public_key_pem: public_key.clone(),
            })
            .collect();

        let orchestrator = state.orchestrator.clone();
        let node_labels: Vec<String> = ids.iter().map(|id| id.node_name()).collect();

        tokio::try_join!(
            orchestrator.launch(&node_labels[0], &specs[0]),
            orchestrator.launch(&node_labels[1], &specs[1]),
            orchestrator.launch(&node_labels[2], &specs[2]),
        )
    };

    if let Err(e) = launch_results {
        warn!(error = %e, "route launch failed, tearing down partial circuit");
        for id in &ids {
            let _ = state.orchestrator.teardown(&id.node_name()).await;
        }
        return send_json(stream, 500, &json!({"error": format!("failed to launch circuit: {e}")})).await;
    }

    state.registry.insert(tracking_id, ids, hops.clone()).await;

    let response = RouteResponse {
        tracking_id: tracking_id.to_hex(),
        route: hops,
    };
    send_json(stream, 200, &response).await
}

#[derive(Deserialize)]
struct NotifyRequest {
    status: String,
    node_address: String,
    tracking_id: String,
}

async fn serve_notify(stream: &mut TcpStream, state: &DirectoryState, body: &[u8]) -> OnionResult<()> {
    let request: NotifyRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return send_json(stream, 400, &json!({"error": format!("malformed request body: {e}")})).await,
    };

    let Some(tracking_id) = TrackingId::from_hex(&request.tracking_id) else {
        return send_json(stream, 400, &json!({"error": "malformed tracking_id"})).await;
    };

    state
        .registry
        .record_notify(tracking_id, &request.node_address, &request.status)
        .await;

    send_json(stream, 200, &json!({"success": true})).await
}

#[derive(Deserialize)]
struct CheckRequest {
    tracking_id: String,
}

async fn serve_check(stream: &mut TcpStream, state: &DirectoryState, body: &[u8]) -> OnionResult<()> {
    let request: CheckRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return send_json(stream, 400, &json!({"error": format!("malformed request body: {e}")})).await,
    };

    let Some(tracking_id) = TrackingId::from_hex(&request.tracking_id) else {
        return send_json(stream, 400, &json!({"error": "malformed tracking_id"})).await;
    };

    let outcome = wait_for_terminal_outcome(state, &tracking_id).await;

    let ids = state.registry.node_ids(&tracking_id).await;
    state.registry.remove(&tracking_id).await;
    if let Some(ids) = ids {
        teardown_hops(state, &ids).await;
    }

    match outcome {
        Some(CircuitOutcome::Success) => send_json(stream, 200, &json!({"status": "success"})).await,
        Some(CircuitOutcome::Error(msg)) => send_json(stream, 200, &json!({"error": msg})).await,
        Some(CircuitOutcome::Pending) | None => send_json(stream, 200, &json!({"error": "timeout"})).await,
    }
}

/// Wait up to `check_timeout` for the circuit to reach a terminal state,
/// driven by the per-circuit `Notify` rather than by polling (§4.D, §9).
async fn wait_for_terminal_outcome(
    state: &DirectoryState,
    tracking_id: &TrackingId,
) -> Option<CircuitOutcome> {
    let deadline = tokio::time::Instant::now() + state.config.check_timeout;

    loop {
        match state.registry.outcome(tracking_id).await {
            Some(CircuitOutcome::Pending) | None => {}
            terminal => return terminal,
        }

        let Some(notify) = state.registry.notifier(tracking_id).await else {
            return None;
        };

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return state.registry.outcome(tracking_id).await;
        }

        let _ = tokio::time::timeout(remaining, notify.notified()).await;
    }
}

/// Fire-and-forget teardown of all three hops, in parallel (§4.D, §5).
async fn teardown_hops(state: &DirectoryState, ids: &[NodeId; 3]) {
    let _ = tokio::join!(
        state.orchestrator.teardown(&ids[0].node_name()),
        state.orchestrator.teardown(&ids[1].node_name()),
        state.orchestrator.teardown(&ids[2].node_name()),
    );
}

async fn serve_diagnostics(stream: &mut TcpStream, state: &DirectoryState) -> OnionResult<()> {
    let snapshot = state.registry.snapshot().await;
    send_json(stream, 200, &snapshot).await
}

async fn send_json<T: Serialize>(stream: &mut TcpStream, status: u16, body: &T) -> OnionResult<()> {
    let payload = serde_json::to_vec(body)
        .map_err(|e| OnionError::Internal(format!("failed to serialize response: {e}")))?;

    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    };

    let header = format!(
        "HTTP/1.1 {status} {status_text}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    );

    stream
        .write_all(header.as_bytes())
        .await
        .map_err(|e| OnionError::Internal(format!("failed to write response header: {e}")))?;
    stream
        .write_all(&payload)
        .await
        .map_err(|e| OnionError::Internal(format!("failed to write response body: {e}")))?;

    Ok(())
}
