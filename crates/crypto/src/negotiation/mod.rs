//! ECDH session key negotiation between two services.
//!
//! The initiator sends an ephemeral P-256 public key and a random token; the
//! responder agrees with its cached key pair, assigns a session id and signs
//! the transcript. Both sides then derive the same symmetric key and IV with
//! [`derive_session_key`]. The key itself never crosses the wire.
//!
//! ```text
//! Init ──request──▶ Requested ──verified response──▶ Negotiated
//!                        └──────── any failure ────────▶ Failed
//! ```

pub mod endpoint;
pub mod initiator;
pub mod responder;
pub mod result;
pub mod session;

pub use endpoint::NegotiationEndpoint;
pub use initiator::{Handshake, Initiator, NegotiationState, NegotiationTransport};
pub use responder::{Responder, ResponderSettings};
pub use result::KeyExchangeResult;
pub use session::SessionStore;

use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

use crate::asymmetric::AsymmetricCryptoError;
use crate::symmetric::{KeyBits, BLOCK_LEN};

/// The only key agreement algorithm accepted on the wire.
pub const KEY_EXCHANGE_ALGORITHM: &str = "ECDH";

/// Raw length of the random token sent by the initiator.
pub const TOKEN_LEN: usize = 16;

/// Length of the IV derived next to the session key.
pub const SESSION_IV_LEN: usize = BLOCK_LEN;

const KDF_INFO: &[u8] = b"shoulder-key-exchange";

/// Errors produced while negotiating or using a session.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// The peer public key is not a valid P-256 SPKI key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Algorithm, key length, or transport cipher not accepted.
    #[error("unsupported negotiation parameter: {0}")]
    UnsupportedParameter(String),

    /// Request timestamp too far from the local clock.
    #[error("request timestamp outside the allowed skew ({skew_ms} ms)")]
    StaleRequest { skew_ms: i64 },

    /// The negotiation URL does not match the registered endpoint.
    #[error("path {path} does not match negotiation endpoint {pattern}")]
    EndpointMismatch { path: String, pattern: String },

    /// The responder could not be reached.
    #[error("negotiation endpoint unreachable: {0}")]
    Unreachable(String),

    /// The responder answered with an error envelope.
    #[error("negotiation rejected ({code}): {msg}")]
    Rejected { code: String, msg: String },

    /// The response does not match the request or its signature is invalid.
    #[error("negotiation response verification failed: {0}")]
    Verification(String),

    #[error("unknown session {0}")]
    UnknownSession(String),

    #[error("session {0} has expired")]
    Expired(String),

    #[error(transparent)]
    Asymmetric(#[from] AsymmetricCryptoError),

    #[error("session key derivation failed")]
    Derivation,
}

/// Derive the session key and IV from an ECDH shared secret.
///
/// HKDF-SHA256 with the token as salt and `"shoulder-key-exchange" ||
/// key_bits (big endian u16)` as info, expanded to `key_bits / 8` key bytes
/// followed by [`SESSION_IV_LEN`] IV bytes.
pub fn derive_session_key(
    shared_secret: &[u8],
    token: &[u8],
    key_bits: u16,
) -> Result<(Vec<u8>, Vec<u8>), NegotiationError> {
    let key_len = KeyBits::from_bits(key_bits)
        .map_err(|_| NegotiationError::UnsupportedParameter(format!("key length {key_bits}")))?
        .key_len();

    let mut info = Vec::with_capacity(KDF_INFO.len() + 2);
    info.extend_from_slice(KDF_INFO);
    info.extend_from_slice(&key_bits.to_be_bytes());

    let mut okm = vec![0u8; key_len + SESSION_IV_LEN];
    Hkdf::<Sha256>::new(Some(token), shared_secret)
        .expand(&info, &mut okm)
        .map_err(|_| NegotiationError::Derivation)?;
    let iv = okm.split_off(key_len);
    Ok((okm, iv))
}

/// Bytes the responder signs and the initiator verifies.
pub(crate) fn transcript(
    x_session_id: &str,
    expire_time: i64,
    key_length: u16,
    initiator_public_key: &str,
    responder_public_key: &str,
    token: &str,
) -> Vec<u8> {
    [
        x_session_id,
        expire_time.to_string().as_str(),
        key_length.to_string().as_str(),
        initiator_public_key,
        responder_public_key,
        token,
    ]
    .join("|")
    .into_bytes()
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_and_sized() {
        let (k1, iv1) = derive_session_key(b"shared", b"token", 256).unwrap();
        let (k2, iv2) = derive_session_key(b"shared", b"token", 256).unwrap();
        assert_eq!((k1.len(), iv1.len()), (32, 16));
        assert_eq!(k1, k2);
        assert_eq!(iv1, iv2);

        let (k128, _) = derive_session_key(b"shared", b"token", 128).unwrap();
        assert_eq!(k128.len(), 16);
        assert_ne!(&k1[..16], &k128[..]);
    }

    #[test]
    fn token_changes_the_key() {
        let (a, _) = derive_session_key(b"shared", b"token-a", 192).unwrap();
        let (b, _) = derive_session_key(b"shared", b"token-b", 192).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn odd_key_length_rejected() {
        assert!(matches!(
            derive_session_key(b"shared", b"token", 100),
            Err(NegotiationError::UnsupportedParameter(_))
        ));
    }
}
