//! Axum router construction.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route(&state.routes.negotiation_path, post(handlers::negotiate))
        .route(
            &state.routes.public_key_path,
            get(handlers::public_key).post(handlers::public_key),
        )
        .route("/secure/echo", post(handlers::secure_echo))
        .route("/local/encrypt", post(handlers::local_encrypt))
        .route("/local/decrypt", post(handlers::local_decrypt))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::key_exchange_guard,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use common::protocol::{KeyExchangeResponse, KEY_EXCHANGE_HEADER};
    use common::ResponseEnvelope;

    fn server(state: AppState) -> TestServer {
        TestServer::new(build(state)).unwrap()
    }

    fn marker() -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-key-exchange"),
            HeaderValue::from_static("true"),
        )
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let resp = server(AppState::default()).get("/unknown").await;
        resp.assert_status(StatusCode::NOT_FOUND);
        let body: ResponseEnvelope<()> = resp.json();
        assert_eq!(body.code, "not_found");
    }

    #[tokio::test]
    async fn public_key_default_and_unknown_id() {
        let server = server(AppState::default());

        let first: ResponseEnvelope<String> = server.get("/security/publicKey").await.json();
        assert!(first.is_success());
        let second: ResponseEnvelope<String> = server.post("/security/publicKey").await.json();
        assert_eq!(first.data, second.data);

        let resp = server
            .get("/security/publicKey")
            .add_query_param("keyPairId", "ghost")
            .await;
        resp.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn key_exchange_marker_rejected_off_endpoint() {
        let server = server(AppState::default());
        let (name, value) = marker();
        let resp = server.get("/health").add_header(name, value).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: ResponseEnvelope<()> = resp.json();
        assert!(body.msg.contains(KEY_EXCHANGE_HEADER));
    }

    #[tokio::test]
    async fn malformed_negotiation_body_is_bad_request() {
        let server = server(AppState::default());
        let (name, value) = marker();
        let resp = server
            .post("/security/negotiate")
            .add_header(name, value)
            .json(&serde_json::json!({ "publicKey": 1 }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_public_key_is_bad_request() {
        let server = server(AppState::default());
        let resp = server
            .post("/security/negotiate")
            .json(&serde_json::json!({
                "publicKey": "bm90IGEga2V5",
                "keyExchangeAlgorithm": "ECDH",
                "keyLength": 256,
                "algorithm": "AES/CBC/PKCS5Padding",
                "token": "AAAAAAAAAAAAAAAAAAAAAA==",
                "timestamp": chrono_now(),
            }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: ResponseEnvelope<KeyExchangeResponse> = resp.json();
        assert_eq!(body.code, "bad_request");
        assert!(body.data.is_none());
    }

    fn chrono_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap()
    }
}
