//! Asymmetric key pairs: generation, public-key distribution, encryption and
//! signatures over EC (NIST P-256) or RSA.
//!
//! [`AsymmetricCipher`] resolves key pairs through a [`KeyPairCache`]. The
//! default pair is generated on first use; any other id must have been created
//! with [`AsymmetricCipher::generate_key_pair`] (or stored by another instance
//! sharing the cache).
//!
//! # Encodings
//!
//! - Public keys: base64 SPKI DER.
//! - Private keys: base64 PKCS#8 DER (only ever inside [`KeyPairDto`]).
//! - EC signatures: ASN.1 DER ECDSA; RSA signatures: PKCS#1 v1.5 over SHA-256.
//!
//! [`KeyPairCache`]: crate::keypair::KeyPairCache
//! [`KeyPairDto`]: crate::keypair::KeyPairDto

pub mod cipher;
pub mod ec;
pub mod rsa;

pub use cipher::AsymmetricCipher;

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::keypair::KeyPairError;

/// Default RSA modulus size.
pub const DEFAULT_RSA_BITS: usize = 2048;

/// Errors produced by the asymmetric layer.
#[derive(Debug, Error)]
pub enum AsymmetricCryptoError {
    /// Key pair lookup or persistence failed.
    #[error(transparent)]
    KeyPair(#[from] KeyPairError),

    /// A key could not be decoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A stored pair was created for another algorithm.
    #[error("key pair algorithm mismatch: expected {expected}, found {found}")]
    AlgorithmMismatch { expected: String, found: String },

    /// The operation is not defined for the engine's algorithm.
    #[error("{operation} is not supported with {algorithm}")]
    Unsupported {
        operation: &'static str,
        algorithm: AsymmetricAlgorithm,
    },

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("asymmetric encryption failed")]
    Encrypt,

    #[error("asymmetric decryption failed")]
    Decrypt,

    #[error("signing failed")]
    Sign,
}

/// Asymmetric algorithm family, selected by qualifier (`"EC"`, `"RSA"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsymmetricAlgorithm {
    /// ECDSA / ECDH / ECIES on NIST P-256.
    Ec,
    /// RSA with the given modulus size.
    Rsa { bits: usize },
}

impl AsymmetricAlgorithm {
    /// Qualifier stored in [`KeyPairDto::algorithm`](crate::keypair::KeyPairDto).
    pub fn qualifier(&self) -> &'static str {
        match self {
            AsymmetricAlgorithm::Ec => "EC",
            AsymmetricAlgorithm::Rsa { .. } => "RSA",
        }
    }
}

impl fmt::Display for AsymmetricAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsymmetricAlgorithm::Ec => f.write_str("EC(P-256)"),
            AsymmetricAlgorithm::Rsa { bits } => write!(f, "RSA({bits})"),
        }
    }
}

impl FromStr for AsymmetricAlgorithm {
    type Err = AsymmetricCryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EC" | "ECC" | "ECDSA" | "P-256" => Ok(AsymmetricAlgorithm::Ec),
            "RSA" => Ok(AsymmetricAlgorithm::Rsa {
                bits: DEFAULT_RSA_BITS,
            }),
            other => Err(AsymmetricCryptoError::InvalidKey(format!(
                "unknown asymmetric algorithm {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifiers_parse() {
        assert_eq!("ecc".parse::<AsymmetricAlgorithm>().unwrap(), AsymmetricAlgorithm::Ec);
        assert_eq!(
            "RSA".parse::<AsymmetricAlgorithm>().unwrap(),
            AsymmetricAlgorithm::Rsa {
                bits: DEFAULT_RSA_BITS
            }
        );
        assert!("DSA".parse::<AsymmetricAlgorithm>().is_err());
    }

    #[test]
    fn no_such_key_pair_is_a_key_pair_error() {
        let e = AsymmetricCryptoError::from(KeyPairError::NoSuchKeyPair("k".into()));
        assert!(matches!(
            e,
            AsymmetricCryptoError::KeyPair(KeyPairError::NoSuchKeyPair(_))
        ));
        assert!(e.to_string().contains("no such key pair"));
    }
}
