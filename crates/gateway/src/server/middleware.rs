//! Axum middleware applied to the router.
//!
//! Includes request tracing, timeout enforcement, response compression, and
//! the key exchange path guard.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::KEY_EXCHANGE_HEADER, ResponseEnvelope};
use tracing::warn;

use super::state::AppState;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reject requests that carry the key exchange marker header anywhere but the
/// negotiation endpoint. The protocol handler is never reached for them.
pub async fn key_exchange_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.headers().contains_key(KEY_EXCHANGE_HEADER)
        && !state.endpoint.matches(request.uri().path())
    {
        warn!(
            path = request.uri().path(),
            pattern = state.endpoint.pattern(),
            "key exchange request on a non-negotiation path"
        );
        let body = ResponseEnvelope::<()>::error(
            "bad_request",
            format!("{KEY_EXCHANGE_HEADER} is only accepted on the negotiation endpoint"),
        );
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }
    next.run(request).await
}
