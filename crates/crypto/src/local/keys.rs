//! Root key derivation and data key wrapping for [`LocalCryptoMetaInfo`].

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use super::{LocalCipherError, LocalCryptoMetaInfo};
use crate::symmetric::{random_bytes, SymmetricAlgorithm, SymmetricCipher, NONCE_LEN};

/// PBKDF2-HMAC-SHA256 rounds for the root key.
pub const ROOT_KEY_ITERATIONS: u32 = 10_000;

const ROOT_KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// Unwrapped key material of one scheme.
pub struct SchemeKeys {
    data_key: Box<[u8]>,
    iv: Box<[u8]>,
}

impl SchemeKeys {
    pub fn new(data_key: &[u8], iv: &[u8]) -> Self {
        Self {
            data_key: data_key.into(),
            iv: iv.into(),
        }
    }

    pub fn data_key(&self) -> &[u8] {
        &self.data_key
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }
}

impl Drop for SchemeKeys {
    fn drop(&mut self) {
        self.data_key.iter_mut().for_each(|b| *b = 0);
        self.iv.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for SchemeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SchemeKeys([REDACTED])")
    }
}

/// Create a record with a fresh data key of `key_len` bytes and an IV of
/// `iv_len` bytes (none when `0`).
pub fn create_meta_info(
    app_id: &str,
    mark_header: &str,
    secret: &[u8],
    key_len: usize,
    iv_len: usize,
) -> Result<LocalCryptoMetaInfo, LocalCipherError> {
    let salt = random_bytes(SALT_LEN);
    let root_key = root_key(secret, &salt);
    let mut data_key = random_bytes(key_len);

    let nonce = random_bytes(NONCE_LEN);
    let wrapped = SymmetricCipher::new(SymmetricAlgorithm::AES_256_GCM_SIV)
        .encrypt(&root_key, &nonce, &data_key)?;
    data_key.fill(0);

    let mut encrypted_data_key = nonce;
    encrypted_data_key.extend_from_slice(&wrapped);

    Ok(LocalCryptoMetaInfo {
        app_id: app_id.to_owned(),
        mark_header: mark_header.to_owned(),
        root_key_salt: STANDARD.encode(salt),
        encrypted_data_key: STANDARD.encode(encrypted_data_key),
        iv: STANDARD.encode(random_bytes(iv_len)),
        created_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Recover the scheme keys of a record with the application secret.
///
/// # Errors
///
/// Returns [`LocalCipherError::MetaInfo`] when a field is not base64 or the
/// secret does not unwrap the data key.
pub fn unwrap_meta_info(
    meta: &LocalCryptoMetaInfo,
    secret: &[u8],
) -> Result<SchemeKeys, LocalCipherError> {
    let invalid = |reason: &str| LocalCipherError::MetaInfo {
        app_id: meta.app_id.clone(),
        mark_header: meta.mark_header.clone(),
        reason: reason.to_owned(),
    };

    let salt = STANDARD
        .decode(&meta.root_key_salt)
        .map_err(|_| invalid("salt is not base64"))?;
    let wrapped = STANDARD
        .decode(&meta.encrypted_data_key)
        .map_err(|_| invalid("data key is not base64"))?;
    let iv = STANDARD
        .decode(&meta.iv)
        .map_err(|_| invalid("iv is not base64"))?;
    if wrapped.len() <= NONCE_LEN {
        return Err(invalid("data key is truncated"));
    }

    let (nonce, ciphertext) = wrapped.split_at(NONCE_LEN);
    let mut data_key = SymmetricCipher::new(SymmetricAlgorithm::AES_256_GCM_SIV)
        .decrypt(&root_key(secret, &salt), nonce, ciphertext)
        .map_err(|_| invalid("data key does not unwrap with the configured secret"))?;
    let keys = SchemeKeys::new(&data_key, &iv);
    data_key.fill(0);
    Ok(keys)
}

fn root_key(secret: &[u8], salt: &[u8]) -> [u8; ROOT_KEY_LEN] {
    let mut key = [0u8; ROOT_KEY_LEN];
    pbkdf2_hmac::<Sha256>(secret, salt, ROOT_KEY_ITERATIONS, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap() {
        let meta = create_meta_info("app", "v1.", b"secret", 32, 16).unwrap();
        assert_eq!(meta.mark_header, "v1.");
        assert!(chrono::DateTime::parse_from_rfc3339(&meta.created_at).is_ok());

        let a = unwrap_meta_info(&meta, b"secret").unwrap();
        let b = unwrap_meta_info(&meta, b"secret").unwrap();
        assert_eq!(a.data_key().len(), 32);
        assert_eq!(a.iv().len(), 16);
        assert_eq!(a.data_key(), b.data_key());
    }

    #[test]
    fn data_key_not_stored_in_clear() {
        let meta = create_meta_info("app", "v1.", b"secret", 32, 16).unwrap();
        let keys = unwrap_meta_info(&meta, b"secret").unwrap();
        let stored = STANDARD.decode(&meta.encrypted_data_key).unwrap();
        assert!(!stored
            .windows(keys.data_key().len())
            .any(|w| w == keys.data_key()));
    }

    #[test]
    fn wrong_secret_rejected() {
        let meta = create_meta_info("app", "v2.", b"secret", 32, 0).unwrap();
        assert!(matches!(
            unwrap_meta_info(&meta, b"other"),
            Err(LocalCipherError::MetaInfo { .. })
        ));
    }

    #[test]
    fn corrupt_fields_rejected() {
        let mut meta = create_meta_info("app", "v1.", b"secret", 32, 16).unwrap();
        meta.root_key_salt = "%%".into();
        assert!(unwrap_meta_info(&meta, b"secret").is_err());
    }
}
