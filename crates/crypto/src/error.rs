//! [`CryptoError`]: every failure the crate can report, and its HTTP mapping.

use common::ServiceError;
use thiserror::Error;

use crate::asymmetric::AsymmetricCryptoError;
use crate::keypair::KeyPairError;
use crate::local::{HeaderNotMatchDecryptError, LocalCipherError};
use crate::negotiation::NegotiationError;
use crate::symmetric::SymmetricCryptoError;
use crate::transport::TransportCryptoError;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error(transparent)]
    Symmetric(#[from] SymmetricCryptoError),

    #[error(transparent)]
    Asymmetric(#[from] AsymmetricCryptoError),

    #[error(transparent)]
    HeaderNotMatch(#[from] HeaderNotMatchDecryptError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Transport(#[from] TransportCryptoError),

    #[error(transparent)]
    Local(#[from] LocalCipherError),
}

impl From<KeyPairError> for CryptoError {
    fn from(e: KeyPairError) -> Self {
        CryptoError::Asymmetric(e.into())
    }
}

fn from_key_pair(e: &KeyPairError) -> ServiceError {
    match e {
        KeyPairError::NoSuchKeyPair(id) => ServiceError::NotFound(format!("key pair {id}")),
        KeyPairError::InvalidId(_) => ServiceError::BadRequest(e.to_string()),
        KeyPairError::Storage(_) => ServiceError::Unavailable("key pair store unavailable".into()),
    }
}

fn from_asymmetric(e: &AsymmetricCryptoError) -> ServiceError {
    match e {
        AsymmetricCryptoError::KeyPair(inner) => from_key_pair(inner),
        AsymmetricCryptoError::InvalidKey(_) => ServiceError::BadRequest(e.to_string()),
        AsymmetricCryptoError::Unsupported { .. } => ServiceError::BadRequest(e.to_string()),
        AsymmetricCryptoError::AlgorithmMismatch { .. }
        | AsymmetricCryptoError::KeyGeneration(_) => ServiceError::Internal(e.to_string()),
        AsymmetricCryptoError::Encrypt
        | AsymmetricCryptoError::Decrypt
        | AsymmetricCryptoError::Sign => ServiceError::CryptoFailure(e.to_string()),
    }
}

fn from_negotiation(e: &NegotiationError) -> ServiceError {
    match e {
        NegotiationError::InvalidPublicKey(_)
        | NegotiationError::UnsupportedParameter(_)
        | NegotiationError::StaleRequest { .. }
        | NegotiationError::EndpointMismatch { .. } => ServiceError::BadRequest(e.to_string()),
        NegotiationError::UnknownSession(_) | NegotiationError::Expired(_) => {
            ServiceError::NegotiationRequired(e.to_string())
        }
        NegotiationError::Unreachable(_) | NegotiationError::Rejected { .. } => {
            ServiceError::Unavailable(e.to_string())
        }
        NegotiationError::Verification(_) | NegotiationError::Derivation => {
            ServiceError::CryptoFailure(e.to_string())
        }
        NegotiationError::Asymmetric(inner) => from_asymmetric(inner),
    }
}

impl From<CryptoError> for ServiceError {
    fn from(e: CryptoError) -> Self {
        match &e {
            CryptoError::Symmetric(_) => ServiceError::CryptoFailure(e.to_string()),
            CryptoError::Asymmetric(inner) => from_asymmetric(inner),
            CryptoError::HeaderNotMatch(_) => ServiceError::BadRequest(e.to_string()),
            CryptoError::Negotiation(inner) => from_negotiation(inner),
            CryptoError::Transport(_) => ServiceError::BadRequest(e.to_string()),
            CryptoError::Local(inner) => match inner {
                LocalCipherError::HeaderNotMatch(_) | LocalCipherError::MalformedCiphertext => {
                    ServiceError::BadRequest(e.to_string())
                }
                LocalCipherError::Symmetric(_) | LocalCipherError::NotUtf8 => {
                    ServiceError::CryptoFailure(e.to_string())
                }
                LocalCipherError::MetaInfo { .. } | LocalCipherError::NoScheme => {
                    ServiceError::Internal(e.to_string())
                }
                LocalCipherError::Repository(_) => {
                    ServiceError::Unavailable("crypto info repository unavailable".into())
                }
            },
        }
    }
}
