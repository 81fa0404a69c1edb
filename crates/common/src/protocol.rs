//! Request and response types exchanged between services.
//!
//! These types are serialised as camelCase JSON over the public HTTP API. Every
//! response body is wrapped in a [`ResponseEnvelope`].

use serde::{Deserialize, Serialize};

/// Envelope code used for successful responses.
pub const SUCCESS_CODE: &str = "0";

/// Envelope message used for successful responses.
pub const SUCCESS_MSG: &str = "success";

/// Marker header carried by key exchange requests.
pub const KEY_EXCHANGE_HEADER: &str = "X-Key-Exchange";

/// Header naming the negotiated session a transport request belongs to.
pub const SESSION_ID_HEADER: &str = "X-Session-Id";

/// Header carrying the per-request data key, wrapped by the session key.
pub const DATA_KEY_HEADER: &str = "X-Dk";

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Standard response wrapper: `{"code": .., "msg": .., "data": ..}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    /// `"0"` on success, a short machine-readable error code otherwise.
    pub code: String,
    /// Human-readable message safe to expose to callers.
    pub msg: String,
    /// Payload; absent on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ResponseEnvelope<T> {
    /// Wrap a successful payload.
    pub fn success(data: T) -> Self {
        Self {
            code: SUCCESS_CODE.into(),
            msg: SUCCESS_MSG.into(),
            data: Some(data),
        }
    }

    /// Build an error envelope with no payload.
    pub fn error(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            msg: msg.into(),
            data: None,
        }
    }

    /// Returns `true` if the envelope carries the success code.
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

// ---------------------------------------------------------------------------
// Key exchange
// ---------------------------------------------------------------------------

/// Body of `POST <negotiation-path>`, sent by the initiator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExchangeRequest {
    /// Initiator's ephemeral public key (base64 SPKI DER).
    pub public_key: String,
    /// Key agreement algorithm; only `"ECDH"` is accepted.
    pub key_exchange_algorithm: String,
    /// Length in bits of the symmetric key to derive.
    pub key_length: u16,
    /// Transport cipher the derived key is meant for, e.g. `"AES/CBC/PKCS5Padding"`.
    pub algorithm: String,
    /// Random base64 nonce, used as the key derivation salt.
    pub token: String,
    /// Initiator clock, epoch millis.
    pub timestamp: i64,
    /// Responder key pair to agree with; the responder's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_pair_id: Option<String>,
}

/// Payload returned by the responder for a successful key exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExchangeResponse {
    /// Responder public key the agreement was computed with (base64 SPKI DER).
    pub public_key: String,
    /// Session identifier under which both sides cache the result.
    pub x_session_id: String,
    /// Expiry of the negotiated key, epoch millis.
    pub expire_time: i64,
    /// Echo of the negotiated key length in bits.
    pub key_length: u16,
    /// Echo of the transport cipher name.
    pub algorithm: String,
    /// Responder signature over the exchange transcript (base64).
    pub signature: String,
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether every local cipher scheme has its keys loaded.
    pub local_cipher_ready: bool,
    /// Whether the default key pair exists.
    pub key_pair_ready: bool,
    /// Number of negotiated sessions currently cached (expired ones included).
    pub sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_exchange_request_uses_camel_case() {
        let req = KeyExchangeRequest {
            public_key: "pk".into(),
            key_exchange_algorithm: "ECDH".into(),
            key_length: 256,
            algorithm: "AES/CBC/PKCS5Padding".into(),
            token: "dG9rZW4=".into(),
            timestamp: 1,
            key_pair_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["publicKey"], "pk");
        assert_eq!(json["keyExchangeAlgorithm"], "ECDH");
        assert!(json.get("keyPairId").is_none());
    }

    #[test]
    fn response_field_is_x_session_id() {
        let json = r#"{
            "publicKey": "pk",
            "xSessionId": "abc",
            "expireTime": 10,
            "keyLength": 128,
            "algorithm": "AES/CBC/PKCS5Padding",
            "signature": "sig"
        }"#;
        let resp: KeyExchangeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.x_session_id, "abc");
        assert_eq!(resp.key_length, 128);
    }

    #[test]
    fn envelope_success_and_error() {
        let ok = ResponseEnvelope::success("pk".to_string());
        assert!(ok.is_success());
        assert_eq!(ok.msg, "success");

        let err: ResponseEnvelope<String> = ResponseEnvelope::error("bad_request", "nope");
        assert!(!err.is_success());
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("data").is_none());
    }

    /// Generic over any payload type, including ones without `Default`.
    fn parse_envelope<T: serde::de::DeserializeOwned>(json: &str) -> ResponseEnvelope<T> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn error_envelope_without_data_parses_for_any_payload() {
        let env: ResponseEnvelope<KeyExchangeResponse> =
            parse_envelope(r#"{"code":"not_found","msg":"not found: key pair ghost"}"#);
        assert_eq!(env.code, "not_found");
        assert!(env.data.is_none());
    }

    #[test]
    fn health_response_serde() {
        let h = HealthResponse {
            status: "ok".into(),
            local_cipher_ready: true,
            key_pair_ready: true,
            sessions: 3,
        };
        let json = serde_json::to_string(&h).unwrap();
        let decoded: HealthResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.sessions, 3);
    }
}
