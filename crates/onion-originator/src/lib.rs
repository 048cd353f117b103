#![forbid(unsafe_code)]

//! The originator driver (component E, §2): fetches a fresh circuit from
//! the directory, layer-encrypts a request for it, posts the nested packet
//! to the first hop, and peels the nested response. Carries no state beyond
//! a single `connect()` call.

use onion_codec::OnionFrame;
use onion_crypto::{RsaPrivateKey, RsaPublicKey};
use onion_types::{OnionError, OnionResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const TERMINAL_REQUEST_MARKER: &[u8] = b"GET ";

#[derive(Deserialize)]
struct RouteResponse {
    tracking_id: String,
    route: [String; 3],
}

#[derive(Serialize)]
struct CheckRequest<'a> {
    tracking_id: &'a str,
}

#[derive(Deserialize)]
struct CheckResponse {
    status: Option<String>,
    error: Option<String>,
}

/// Request a fresh circuit, send one request through it, and return the
/// destination's response body as a string (§6). This is what the
/// out-of-scope HTML form would call through a thin web handler in a full
/// deployment.
pub async fn connect(directory_url: &str, service_url: &str) -> OnionResult<String> {
    let client = reqwest::Client::new();

    let (originator_public, originator_private) = onion_crypto::generate_keypair()?;
    let originator_public_pem = onion_crypto::public_key_to_pem(&originator_public)?;

    let route = request_route(&client, directory_url, &originator_public_pem).await?;
    info!(tracking_id = %route.tracking_id, "circuit allocated");

    let hop_keys = fetch_hop_public_keys(&client, &route.route).await?;

    let packet = build_nested_packet(&hop_keys, &route.route, service_url)?;

    let response_bytes = post_frame(&client, &route.route[0], &packet).await?;

    let result = peel_response(&response_bytes, &originator_private)?;

    let outcome = check_circuit(&client, directory_url, &route.tracking_id).await?;
    match outcome {
        CircuitOutcome::Success => Ok(result),
        CircuitOutcome::Error(msg) => Err(OnionError::Upstream(msg)),
    }
}

enum CircuitOutcome {
    Success,
    Error(String),
}

#[derive(Serialize)]
struct RouteRequest<'a> {
    public_key: &'a str,
}

async fn request_route(
    client: &reqwest::Client,
    directory_url: &str,
    public_key_pem: &str,
) -> OnionResult<RouteResponse> {
    let url = format!("{directory_url}/route");
    let response = client
        .post(&url)
        .json(&RouteRequest {
            public_key: public_key_pem,
        })
        .send()
        .await
        .map_err(|e| OnionError::Upstream(format!("failed to reach directory: {e}")))?;

    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OnionError::Upstream(format!("directory rejected route request: {body}")));
    }

    response
        .json::<RouteResponse>()
        .await
        .map_err(|e| OnionError::Upstream(format!("malformed route response: {e}")))
}

async fn fetch_hop_public_keys(
    client: &reqwest::Client,
    route: &[String; 3],
) -> OnionResult<[RsaPublicKey; 3]> {
    let (pem1, pem2, pem3) = tokio::try_join!(
        fetch_public_key(client, &route[0]),
        fetch_public_key(client, &route[1]),
        fetch_public_key(client, &route[2]),
    )?;

    Ok([
        onion_crypto::public_key_from_pem(&pem1)?,
        onion_crypto::public_key_from_pem(&pem2)?,
        onion_crypto::public_key_from_pem(&pem3)?,
    ])
}

async fn fetch_public_key(client: &reqwest::Client, hop_url: &str) -> OnionResult<String> {
    let url = format!("{hop_url}/get-public-key");
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| OnionError::Upstream(format!("failed to fetch public key from {hop_url}: {e}")))?;

    response
        .text()
        .await
        .map_err(|e| OnionError::Upstream(format!("failed to read public key from {hop_url}: {e}")))
}

/// Layer the request from innermost (destination) to outermost (hop 1),
/// per §8 S3/"Nested layers": each wrap step's plaintext is the previous
/// step's encoded frame, and each frame's address names where the *next*
/// hop should forward to.
fn build_nested_packet(
    hop_keys: &[RsaPublicKey; 3],
    route: &[String; 3],
    service_url: &str,
) -> OnionResult<Vec<u8>> {
    let (wrapped_key, nonce, ciphertext) =
        onion_crypto::wrap(&hop_keys[2], TERMINAL_REQUEST_MARKER)?;
    let innermost = OnionFrame::new(wrapped_key, nonce, service_url.to_string(), ciphertext)
        .map_err(|e| OnionError::Frame(e.to_string()))?;

    let (wrapped_key, nonce, ciphertext) = onion_crypto::wrap(&hop_keys[1], &innermost.encode())?;
    let middle = OnionFrame::new(wrapped_key, nonce, route[2].clone(), ciphertext)
        .map_err(|e| OnionError::Frame(e.to_string()))?;

    let (wrapped_key, nonce, ciphertext) = onion_crypto::wrap(&hop_keys[0], &middle.encode())?;
    let outermost = OnionFrame::new(wrapped_key, nonce, route[1].clone(), ciphertext)
        .map_err(|e| OnionError::Frame(e.to_string()))?;

    Ok(outermost.encode())
}

async fn post_frame(client: &reqwest::Client, hop1_url: &str, packet: &[u8]) -> OnionResult<Vec<u8>> {
    let response = client
        .post(hop1_url)
        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
        .body(packet.to_vec())
        .send()
        .await
        .map_err(|e| OnionError::Upstream(format!("failed to post to first hop: {e}")))?;

    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| OnionError::Upstream(format!("failed to read first hop response: {e}")))
}

/// Peel the three response layers, each wrapped under the originator's own
/// public key (§4.C step 6), recovering the destination's raw response body.
fn peel_response(response_bytes: &[u8], originator_private: &RsaPrivateKey) -> OnionResult<String> {
    let mut current = response_bytes.to_vec();

    for layer in 0..3 {
        let frame = OnionFrame::decode(&current).map_err(|e| OnionError::Frame(e.to_string()))?;
        current = onion_crypto::unwrap(
            originator_private,
            &frame.wrapped_key,
            &frame.nonce,
            &frame.ciphertext,
        )?;
        debug!(layer, bytes = current.len(), "peeled response layer");
    }

    Ok(String::from_utf8_lossy(&current).into_owned())
}

async fn check_circuit(
    client: &reqwest::Client,
    directory_url: &str,
    tracking_id: &str,
) -> OnionResult<CircuitOutcome> {
    let url = format!("{directory_url}/check");
    let response = client
        .post(&url)
        .json(&CheckRequest { tracking_id })
        .send()
        .await
        .map_err(|e| OnionError::Upstream(format!("failed to reach directory for check: {e}")))?;

    let body: CheckResponse = response
        .json()
        .await
        .map_err(|e| OnionError::Upstream(format!("malformed check response: {e}")))?;

    match (body.status, body.error) {
        (Some(status), _) if status == "success" => Ok(CircuitOutcome::Success),
        (_, Some(msg)) => Ok(CircuitOutcome::Error(msg)),
        _ => Ok(CircuitOutcome::Error("malformed check response".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises the full three-layer build/peel round trip offline, acting
    /// out each hop's own unwrap/forward/wrap step in place of a real
    /// network hop (§8 S3).
    #[test]
    fn nested_packet_round_trips_through_three_simulated_hops() {
        let (pub1, priv1) = onion_crypto::generate_keypair().unwrap();
        let (pub2, priv2) = onion_crypto::generate_keypair().unwrap();
        let (pub3, priv3) = onion_crypto::generate_keypair().unwrap();
        let (origin_pub, origin_priv) = onion_crypto::generate_keypair().unwrap();

        let route = [
            "https://node-001.example".to_string(),
            "https://node-002.example".to_string(),
            "https://node-003.example".to_string(),
        ];
        let service_url = "https://service.example/resource".to_string();

        let packet = build_nested_packet(&[pub1, pub2, pub3], &route, &service_url).unwrap();

        // hop1
        let frame = OnionFrame::decode(&packet).unwrap();
        assert_eq!(frame.address, route[1]);
        let inner1 = onion_crypto::unwrap(&priv1, &frame.wrapped_key, &frame.nonce, &frame.ciphertext).unwrap();

        // hop2
        let frame = OnionFrame::decode(&inner1).unwrap();
        assert_eq!(frame.address, route[2]);
        let inner2 = onion_crypto::unwrap(&priv2, &frame.wrapped_key, &frame.nonce, &frame.ciphertext).unwrap();

        // hop3
        let frame = OnionFrame::decode(&inner2).unwrap();
        assert_eq!(frame.address, service_url);
        let inner3 = onion_crypto::unwrap(&priv3, &frame.wrapped_key, &frame.nonce, &frame.ciphertext).unwrap();
        assert_eq!(inner3, TERMINAL_REQUEST_MARKER);

        // simulate the destination response, then the three WRAP_RESPONSE steps
        let destination_body = b"hello from destination".to_vec();
        let (wk, n, ct) = onion_crypto::wrap(&origin_pub, &destination_body).unwrap();
        let response3 = OnionFrame::terminal(wk, n, ct).encode();

        let (wk, n, ct) = onion_crypto::wrap(&origin_pub, &response3).unwrap();
        let response2 = OnionFrame::terminal(wk, n, ct).encode();

        let (wk, n, ct) = onion_crypto::wrap(&origin_pub, &response2).unwrap();
        let response1 = OnionFrame::terminal(wk, n, ct).encode();

        let peeled = peel_response(&response1, &origin_priv).unwrap();
        assert_eq!(peeled.as_bytes(), destination_body.as_slice());
    }

    #[test]
    fn build_nested_packet_rejects_nothing_for_well_formed_route() {
        let (pub1, _) = onion_crypto::generate_keypair().unwrap();
        let (pub2, _) = onion_crypto::generate_keypair().unwrap();
        let (pub3, _) = onion_crypto::generate_keypair().unwrap();

        let route = [
            "https://node-001.example".to_string(),
            "https://node-002.example".to_string(),
            "https://node-003.example".to_string(),
        ];

        let packet = build_nested_packet(&[pub1, pub2, pub3], &route, "https://service.example").unwrap();
        assert!(!packet.is_empty());
    }
}
