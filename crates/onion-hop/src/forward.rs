use crate::notify::notify;
use crate::state::HopState;
use onion_codec::OnionFrame;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

const GET_MARKER: &[u8] = b"GET ";

/// The `POST /` state machine (§4.C):
/// `RECV → DECODE → UNWRAP → NOTIFY(parse) → FORWARD → RECV_INNER → WRAP_RESPONSE → NOTIFY(wrap) → RETURN`.
///
/// Returns the encoded response frame on success, or a plain-text error body
/// on failure; a hop never notifies success for a pass that did not
/// complete (§4.C, §7).
pub async fn process_frame(state: &HopState, frame_bytes: &[u8]) -> Result<Vec<u8>, String> {
    let frame = OnionFrame::decode(frame_bytes).map_err(|e| format!("frame error: {e}"))?;

    let next_host = frame.address.clone();

    let inner_payload = onion_crypto::unwrap(
        state.private_key(),
        &frame.wrapped_key,
        &frame.nonce,
        &frame.ciphertext,
    )
    .map_err(|e| format!("crypto error: {e}"))?;

    notify(state, "success").await;
    debug!(next_host = %next_host, "parsed inbound layer, notified directory");

    let response_bytes = match forward_payload(state, &next_host, &inner_payload).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let message = format!("upstream error: {e}");
            notify(state, &message).await;
            return Err(message);
        }
    };

    let (wrapped_key, nonce, ciphertext) = onion_crypto::wrap(&state.originator_public_key, &response_bytes)
        .map_err(|e| format!("crypto error: {e}"))?;

    let response_frame = OnionFrame::terminal(wrapped_key, nonce, ciphertext);

    notify(state, "success").await;
    info!(next_host = %next_host, "forwarded pass complete");

    Ok(response_frame.encode())
}

/// Inspect the first bytes of the inner payload (§4.C step 4): a literal
/// `GET ` marker means this is the last hop and the inner payload names a
/// terminal HTTP request against `next_host`; anything else is forwarded
/// as an opaque binary POST to the next hop.
async fn forward_payload(
    state: &HopState,
    next_host: &str,
    inner_payload: &[u8],
) -> Result<Vec<u8>, reqwest::Error> {
    if inner_payload.starts_with(GET_MARKER) {
        let response = state.http_client.get(next_host).send().await?;
        Ok(response.bytes().await?.to_vec())
    } else {
        let response = state
            .http_client
            .post(next_host)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(inner_payload.to_vec())
            .send()
            .await?;
        Ok(response.bytes().await?.to_vec())
    }
}
