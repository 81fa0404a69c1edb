//! Local text cipher schemes, one per mark header.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use super::{HeaderNotMatchDecryptError, LocalCipherError, SchemeKeys};
use crate::symmetric::{random_bytes, SymmetricAlgorithm, SymmetricCipher, NONCE_LEN};

/// A local text cipher that can tell its own ciphertext apart.
pub trait JudgeableLocalTextCipher: Send + Sync {
    /// Prefix of every ciphertext this scheme produces, e.g. `"v1."`.
    fn mark_header(&self) -> &'static str;

    /// Registry position; lowest is primary.
    fn order(&self) -> i32;

    /// Data key length in bytes.
    fn key_len(&self) -> usize {
        32
    }

    /// Length of the stored per-application IV; `0` if none.
    fn iv_len(&self) -> usize;

    fn support(&self, cipher_text: &str) -> bool {
        cipher_text.starts_with(self.mark_header())
    }

    fn encrypt(&self, keys: &SchemeKeys, text: &str) -> Result<String, LocalCipherError>;

    /// # Errors
    ///
    /// Returns [`LocalCipherError::HeaderNotMatch`] if `cipher_text` belongs
    /// to another scheme.
    fn decrypt(&self, keys: &SchemeKeys, cipher_text: &str) -> Result<String, LocalCipherError>;
}

fn strip_header<'a>(
    scheme: &dyn JudgeableLocalTextCipher,
    cipher_text: &'a str,
) -> Result<&'a str, HeaderNotMatchDecryptError> {
    cipher_text
        .strip_prefix(scheme.mark_header())
        .ok_or(HeaderNotMatchDecryptError)
}

fn utf8(bytes: Vec<u8>) -> Result<String, LocalCipherError> {
    String::from_utf8(bytes).map_err(|_| LocalCipherError::NotUtf8)
}

/// `v1.`: AES-256-CBC/PKCS7 with the application's stored IV.
///
/// Deterministic: equal plaintexts give equal ciphertexts, which keeps
/// encrypted columns searchable by equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesCbcScheme;

impl JudgeableLocalTextCipher for AesCbcScheme {
    fn mark_header(&self) -> &'static str {
        "v1."
    }

    fn order(&self) -> i32 {
        0
    }

    fn iv_len(&self) -> usize {
        SymmetricAlgorithm::AES_256_CBC.iv_len()
    }

    fn encrypt(&self, keys: &SchemeKeys, text: &str) -> Result<String, LocalCipherError> {
        let ciphertext = SymmetricCipher::new(SymmetricAlgorithm::AES_256_CBC).encrypt(
            keys.data_key(),
            keys.iv(),
            text.as_bytes(),
        )?;
        Ok(format!(
            "{}{}",
            self.mark_header(),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    fn decrypt(&self, keys: &SchemeKeys, cipher_text: &str) -> Result<String, LocalCipherError> {
        let body = strip_header(self, cipher_text)?;
        let ciphertext = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| LocalCipherError::MalformedCiphertext)?;
        let plaintext = SymmetricCipher::new(SymmetricAlgorithm::AES_256_CBC).decrypt(
            keys.data_key(),
            keys.iv(),
            &ciphertext,
        )?;
        utf8(plaintext)
    }
}

/// `v2.`: AES-256-GCM-SIV with a random nonce per message.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmSivScheme;

impl JudgeableLocalTextCipher for AesGcmSivScheme {
    fn mark_header(&self) -> &'static str {
        "v2."
    }

    fn order(&self) -> i32 {
        10
    }

    fn iv_len(&self) -> usize {
        0
    }

    fn encrypt(&self, keys: &SchemeKeys, text: &str) -> Result<String, LocalCipherError> {
        let nonce = random_bytes(NONCE_LEN);
        let ciphertext = SymmetricCipher::new(SymmetricAlgorithm::AES_256_GCM_SIV).encrypt(
            keys.data_key(),
            &nonce,
            text.as_bytes(),
        )?;
        Ok(format!(
            "{}{}.{}",
            self.mark_header(),
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(ciphertext),
        ))
    }

    fn decrypt(&self, keys: &SchemeKeys, cipher_text: &str) -> Result<String, LocalCipherError> {
        let body = strip_header(self, cipher_text)?;
        let (nonce, ciphertext) = body
            .split_once('.')
            .ok_or(LocalCipherError::MalformedCiphertext)?;
        let nonce = URL_SAFE_NO_PAD
            .decode(nonce)
            .map_err(|_| LocalCipherError::MalformedCiphertext)?;
        if nonce.len() != NONCE_LEN {
            return Err(LocalCipherError::MalformedCiphertext);
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext)
            .map_err(|_| LocalCipherError::MalformedCiphertext)?;
        let plaintext = SymmetricCipher::new(SymmetricAlgorithm::AES_256_GCM_SIV).decrypt(
            keys.data_key(),
            &nonce,
            &ciphertext,
        )?;
        utf8(plaintext)
    }
}
