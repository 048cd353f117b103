use crate::state::HopState;
use serde::Serialize;
use tracing::warn;

/// The single notification payload shape used for both the parse-pass and the
/// wrap-pass notify (`SPEC_FULL.md` §4.C step 3 and step 7; the source's
/// divergent second-payload shape, §9, is not reproduced: both notifications
/// carry the same fields).
#[derive(Serialize)]
struct NotifyRequest<'a> {
    status: &'a str,
    node_address: &'a str,
    tracking_id: &'a str,
}

/// POST `/notify` to the directory. Transport failures are logged and
/// swallowed (§7 `NotifyTransportError`): notify failure never aborts
/// forwarding.
pub async fn notify(state: &HopState, status: &str) {
    let url = format!("{}/notify", state.config.directory_node);
    let body = NotifyRequest {
        status,
        node_address: &state.config.this_node,
        tracking_id: &state.config.tracking_id,
    };

    match state.http_client.post(&url).json(&body).send().await {
        Ok(resp) if resp.status().is_success() => {}
        Ok(resp) => {
            warn!(url = %url, status = %resp.status(), "notify returned non-success status");
        }
        Err(e) => {
            warn!(url = %url, error = %e, "notify transport failed, continuing anyway");
        }
    }
}
