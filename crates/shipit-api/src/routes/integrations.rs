//! Inbound CI integration endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use shipit_deployer::{CiOutcome, CiPayload};
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

pub const SIGNATURE_HEADER: &str = "x-shipit-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/ci", post(ci_webhook))
}

/// Accept a CI build-result payload and trigger auto-deploys.
async fn ci_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if let Some(secret) = &state.integration_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if !verify_signature(secret, &body, signature) {
            warn!("Rejected CI payload with bad signature");
            return Err(ApiError::Unauthorized("invalid payload signature".to_string()));
        }
    }

    let payload: CiPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid payload: {e}")))?;

    info!(
        repo = %format!("{}/{}", payload.repository.org_name, payload.repository.name),
        status = %payload.status,
        event = %payload.event,
        "Received CI payload"
    );

    match state.integration.handle(&payload).await? {
        CiOutcome::Deployed(deploys) => {
            let ids: Vec<String> = deploys.iter().map(|d| d.id.to_string()).collect();
            Ok((
                StatusCode::CREATED,
                Json(json!({ "outcome": "deployed", "deploys": ids })),
            ))
        }
        CiOutcome::Ignored(reason) => Ok((
            StatusCode::OK,
            Json(json!({ "outcome": "ignored", "reason": reason })),
        )),
    }
}

/// Check an HMAC-SHA256 signature in `sha256=<hex>` form over the raw body.
fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key");
    mac.update(body);
    mac.verify_slice(&sig_bytes).is_ok()
}

/// Sign a payload the way CI callers are expected to.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip() {
        let body = br#"{"status":"passed"}"#;
        let signature = sign_payload("hunter2", body);
        assert!(verify_signature("hunter2", body, Some(&signature)));
        assert!(!verify_signature("other", body, Some(&signature)));
        assert!(!verify_signature("hunter2", b"tampered", Some(&signature)));
        assert!(!verify_signature("hunter2", body, None));
        assert!(!verify_signature("hunter2", body, Some("md5=abcd")));
    }
}
