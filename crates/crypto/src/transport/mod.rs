//! Per-request payload encryption over a negotiated session.
//!
//! A request carries a fresh data key (`dk`) wrapped with the session key in
//! the `X-Dk` header; the payload itself is AES-CBC/PKCS7 under the data key
//! and the session IV, base64 encoded.

use std::{fmt, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use crate::error::CryptoError;
use crate::negotiation::{KeyExchangeResult, NegotiationError};
use crate::symmetric::{
    generate_key, KeyBits, Mode, Padding, SymmetricAlgorithm, SymmetricCipher,
};

/// Errors specific to transport payloads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportCryptoError {
    /// Body or header is not valid base64.
    #[error("malformed transport payload")]
    MalformedPayload,

    /// The unwrapped data key has an impossible length.
    #[error("invalid data key")]
    InvalidDataKey,
}

/// Per-request AES key.
pub struct DataKey(Box<[u8]>);

impl DataKey {
    /// Fresh random key of `key_bits` (128/192/256).
    pub fn generate(key_bits: u16) -> Result<Self, CryptoError> {
        Ok(Self(generate_key(key_bits)?.into_boxed_slice()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        key_bits(bytes.len())?;
        Ok(Self(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for DataKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

fn key_bits(len: usize) -> Result<KeyBits, CryptoError> {
    u16::try_from(len * 8)
        .ok()
        .and_then(|bits| KeyBits::from_bits(bits).ok())
        .ok_or_else(|| TransportCryptoError::InvalidDataKey.into())
}

fn cbc(key_bits: KeyBits) -> SymmetricCipher {
    SymmetricCipher::new(SymmetricAlgorithm {
        mode: Mode::Cbc,
        padding: Padding::Pkcs7,
        key_bits,
    })
}

fn live(result: &KeyExchangeResult) -> Result<(), CryptoError> {
    if result.is_expired() {
        return Err(NegotiationError::Expired(result.x_session_id().to_owned()).into());
    }
    Ok(())
}

fn decode(payload: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(payload.trim())
        .map_err(|_| TransportCryptoError::MalformedPayload.into())
}

/// Wrap `dk` with the session key for the `X-Dk` header.
pub fn wrap_data_key(result: &KeyExchangeResult, dk: &DataKey) -> Result<String, CryptoError> {
    live(result)?;
    let wrapped = cbc(KeyBits::from_bits(result.key_length())?).encrypt(
        result.local_key(),
        result.local_iv(),
        dk.as_bytes(),
    )?;
    Ok(STANDARD.encode(wrapped))
}

/// Inverse of [`wrap_data_key`].
pub fn unwrap_data_key(result: &KeyExchangeResult, x_dk: &str) -> Result<DataKey, CryptoError> {
    live(result)?;
    let mut raw = cbc(KeyBits::from_bits(result.key_length())?).decrypt(
        result.local_key(),
        result.local_iv(),
        &decode(x_dk)?,
    )?;
    let dk = DataKey::from_bytes(&raw);
    raw.fill(0);
    dk
}

/// Which way a [`TransportCipher`] may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Session-scoped payload cipher restricted to one direction.
///
/// Calling the other direction is a programming error and panics.
#[derive(Debug)]
pub struct TransportCipher {
    result: Arc<KeyExchangeResult>,
    data_key: DataKey,
    direction: Direction,
}

impl TransportCipher {
    pub fn encryptor(result: Arc<KeyExchangeResult>, data_key: DataKey) -> Self {
        Self {
            result,
            data_key,
            direction: Direction::Encrypt,
        }
    }

    pub fn decryptor(result: Arc<KeyExchangeResult>, data_key: DataKey) -> Self {
        Self {
            result,
            data_key,
            direction: Direction::Decrypt,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn x_session_id(&self) -> &str {
        self.result.x_session_id()
    }

    /// Encrypt `plaintext` to base64.
    ///
    /// # Panics
    ///
    /// If this is a decryptor.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        assert!(
            self.direction == Direction::Encrypt,
            "transport cipher is decrypt-only"
        );
        live(&self.result)?;
        let ciphertext = self.cipher()?.encrypt(
            self.data_key.as_bytes(),
            self.result.local_iv(),
            plaintext,
        )?;
        Ok(STANDARD.encode(ciphertext))
    }

    /// Decrypt a base64 payload.
    ///
    /// # Panics
    ///
    /// If this is an encryptor.
    pub fn decrypt(&self, payload: &str) -> Result<Vec<u8>, CryptoError> {
        assert!(
            self.direction == Direction::Decrypt,
            "transport cipher is encrypt-only"
        );
        live(&self.result)?;
        Ok(self.cipher()?.decrypt(
            self.data_key.as_bytes(),
            self.result.local_iv(),
            &decode(payload)?,
        )?)
    }

    fn cipher(&self) -> Result<SymmetricCipher, CryptoError> {
        Ok(cbc(key_bits(self.data_key.as_bytes().len())?))
    }
}
