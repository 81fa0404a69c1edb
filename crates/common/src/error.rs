//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes and envelope codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::NegotiationRequired`] → 401
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::CryptoFailure`] → 500
/// - [`ServiceError::Unavailable`] → 503
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: missing header, bad parameters, invalid key.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The session is unknown or expired; the caller must negotiate again.
    #[error("negotiation required: {0}")]
    NegotiationRequired(String),

    /// A named resource (key pair, route) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Encryption or decryption failed in the crypto layer.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// A backing store is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::NegotiationRequired(_) => 401,
            ServiceError::NotFound(_) => 404,
            ServiceError::CryptoFailure(_) => 500,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Returns the envelope `code` for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::NegotiationRequired(_) => "negotiation_required",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::CryptoFailure(_) => "crypto_failure",
            ServiceError::Unavailable(_) => "service_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(ServiceError::BadRequest("x".into()).http_status(), 400);
        assert_eq!(
            ServiceError::NegotiationRequired("x".into()).http_status(),
            401
        );
        assert_eq!(ServiceError::NotFound("x".into()).http_status(), 404);
        assert_eq!(ServiceError::CryptoFailure("x".into()).http_status(), 500);
        assert_eq!(ServiceError::Unavailable("x".into()).http_status(), 503);
        assert_eq!(ServiceError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            ServiceError::NegotiationRequired("x".into()).code(),
            "negotiation_required"
        );
        assert_eq!(ServiceError::BadRequest("x".into()).code(), "bad_request");
    }

    #[test]
    fn display_includes_message() {
        let e = ServiceError::BadRequest("malformed public key".into());
        assert!(e.to_string().contains("malformed public key"));
    }
}
