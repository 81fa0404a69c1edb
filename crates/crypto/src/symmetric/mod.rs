//! Stateless AES encryption of byte buffers.
//!
//! Every call receives its key and IV as parameters; [`SymmetricCipher`] holds
//! nothing but the selected [`SymmetricAlgorithm`], so a single instance can
//! be shared freely across threads.
//!
//! # Supported algorithms
//!
//! | canonical name          | key bits      | IV            |
//! |-------------------------|---------------|---------------|
//! | `AES/CBC/PKCS5Padding`  | 128, 192, 256 | 16 bytes      |
//! | `AES/CBC/NoPadding`     | 128, 192, 256 | 16 bytes      |
//! | `AES/ECB/PKCS5Padding`  | 128, 192, 256 | ignored       |
//! | `AES/ECB/NoPadding`     | 128, 192, 256 | ignored       |
//! | `AES/GCM-SIV/NoPadding` | 128, 256      | 12-byte nonce |

pub mod algorithm;
pub mod cipher;

pub use algorithm::{KeyBits, Mode, Padding, SymmetricAlgorithm, BLOCK_LEN, NONCE_LEN};
pub use cipher::SymmetricCipher;

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// Errors produced by the symmetric layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymmetricCryptoError {
    /// Unknown algorithm name, key size, or mode/padding combination.
    #[error("unsupported symmetric algorithm: {0}")]
    Unsupported(String),

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid IV length: expected {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    /// Plaintext must be block aligned when no padding is configured.
    #[error("input length {0} is not a multiple of the AES block size")]
    UnalignedInput(usize),

    /// Ciphertext is truncated, empty, or not block aligned.
    #[error("malformed ciphertext")]
    MalformedCiphertext,

    /// PKCS#7 padding was invalid after decryption (usually a wrong key).
    #[error("padding check failed")]
    Padding,

    /// AEAD tag verification failed (wrong key or tampered data).
    #[error("authenticated decryption failed")]
    Authentication,
}

/// Generate a random key of `bits` length from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`SymmetricCryptoError::Unsupported`] for lengths other than
/// 128/192/256.
pub fn generate_key(bits: u16) -> Result<Vec<u8>, SymmetricCryptoError> {
    let bits = KeyBits::from_bits(bits)?;
    Ok(random_bytes(bits.key_len()))
}

/// Generate `len` random bytes, e.g. a CBC IV or a GCM-SIV nonce.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}
