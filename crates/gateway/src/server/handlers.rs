//! Axum request handlers for all service endpoints.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::{
    protocol::{HealthResponse, KeyExchangeRequest, DATA_KEY_HEADER, SESSION_ID_HEADER},
    ResponseEnvelope, ServiceError,
};
use serde::{Deserialize, Serialize};
use shoulder_crypto::{
    transport::{unwrap_data_key, wrap_data_key, DataKey, TransportCipher},
    CryptoError,
};
use tracing::{info, warn};

use super::state::AppState;

/// Query string of the public key endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyQuery {
    pub key_pair_id: Option<String>,
}

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ResponseEnvelope::success(data))).into_response()
}

fn failure(error: ServiceError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ResponseEnvelope::<()>::error(error.code(), error.to_string());
    (status, Json(body)).into_response()
}

fn crypto_failure(operation: &'static str, error: impl Into<CryptoError>) -> Response {
    let error = error.into();
    warn!(operation, error = %error, "request failed");
    failure(error.into())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Response> {
    match headers.get(name) {
        Some(v) => v.to_str().map_err(|_| {
            failure(ServiceError::BadRequest(format!(
                "{name} header contains non-ASCII characters"
            )))
        }),
        None => Err(failure(ServiceError::BadRequest(format!(
            "missing {name} header"
        )))),
    }
}

/// `POST <negotiation path>`: answer a key exchange.
pub async fn negotiate(
    State(state): State<AppState>,
    body: Result<Json<KeyExchangeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return failure(ServiceError::BadRequest(rejection.body_text())),
    };
    match state.responder.respond(&request).await {
        Ok(response) => success(response),
        Err(e) => crypto_failure("negotiate", e),
    }
}

/// `GET|POST <public key path>[?keyPairId=..]`: base64 SPKI public key.
///
/// Without `keyPairId` the default pair is returned, generated on first use.
pub async fn public_key(
    State(state): State<AppState>,
    Query(query): Query<PublicKeyQuery>,
) -> Response {
    match state.asymmetric.public_key(query.key_pair_id.as_deref()) {
        Ok(key) => success(key),
        Err(e) => crypto_failure("public_key", e),
    }
}

/// `POST /secure/echo`: decrypt a transport payload and send it back
/// re-encrypted under the same session with a fresh data key.
///
/// Requires `X-Session-Id` and `X-Dk`; the reply carries its own wrapped key
/// in `X-Dk`. Unknown or expired sessions answer 401 so the caller
/// renegotiates.
pub async fn secure_echo(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let (x_session_id, x_dk) = match (
        header(&headers, SESSION_ID_HEADER),
        header(&headers, DATA_KEY_HEADER),
    ) {
        (Ok(sid), Ok(dk)) => (sid, dk),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    let result: Result<(String, String), CryptoError> = async {
        let session = state.sessions.get(x_session_id).await?;
        let data_key = unwrap_data_key(&session, x_dk)?;
        let plaintext =
            TransportCipher::decryptor(Arc::clone(&session), data_key).decrypt(&body)?;

        let reply_key = DataKey::generate(session.key_length())?;
        let reply_dk = wrap_data_key(&session, &reply_key)?;
        let payload = TransportCipher::encryptor(session, reply_key).encrypt(&plaintext)?;
        Ok((reply_dk, payload))
    }
    .await;

    match result {
        Ok((reply_dk, payload)) => {
            info!(x_session_id, "secure echo served");
            let mut resp = success(payload);
            match HeaderValue::from_str(&reply_dk) {
                Ok(value) => {
                    resp.headers_mut().insert(DATA_KEY_HEADER, value);
                    resp
                }
                Err(_) => failure(ServiceError::Internal("unencodable data key".into())),
            }
        }
        Err(e) => crypto_failure("secure_echo", e),
    }
}

/// `POST /local/encrypt`: encrypt a text body with the primary local scheme.
pub async fn local_encrypt(State(state): State<AppState>, body: String) -> Response {
    match state.local_cipher.encrypt(&body) {
        Ok(cipher_text) => success(cipher_text),
        Err(e) => crypto_failure("local_encrypt", e),
    }
}

/// `POST /local/decrypt`: decrypt a text body with the scheme its header names.
pub async fn local_decrypt(State(state): State<AppState>, body: String) -> Response {
    match state.local_cipher.decrypt(body.trim()) {
        Ok(text) => success(text),
        Err(e) => crypto_failure("local_decrypt", e),
    }
}

/// `GET /health`: liveness and readiness check.
///
/// Returns `200 OK` when the local cipher keys are loaded and the default key
/// pair exists, `503 Service Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let local_cipher_ready = state.local_cipher.is_ready();
    let key_pair_ready = state.asymmetric.has_key_pair(None).unwrap_or(false);
    let sessions = state.sessions.len().await;

    let (status_code, status_str) = if local_cipher_ready && key_pair_ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        local_cipher_ready,
        key_pair_ready,
        sessions,
    };
    (status_code, Json(ResponseEnvelope::success(body))).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> Response {
    failure(ServiceError::NotFound(
        "the requested resource does not exist".into(),
    ))
}
