//! Local (at-rest) text encryption with self-describing ciphertext.
//!
//! Every scheme prefixes its output with a mark header (`v1.`, `v2.`) so the
//! [`LocalTextCipher`] registry can route a ciphertext back to the scheme that
//! produced it. Scheme keys come from [`LocalCryptoMetaInfo`] records kept in a
//! [`CryptoInfoRepository`]; the data key in a record is wrapped with a root
//! key derived from the application secret.
//!
//! # Ciphertext formats
//!
//! ```text
//! v1.<base64url-no-pad(AES-256-CBC ciphertext)>
//! v2.<base64url-no-pad(nonce)>.<base64url-no-pad(ciphertext+tag)>
//! ```

pub mod cipher;
pub mod keys;
pub mod repository;
pub mod scheme;

pub use cipher::LocalTextCipher;
pub use keys::SchemeKeys;
pub use repository::{
    CryptoInfoRepository, FileCryptoInfoRepository, MemoryCryptoInfoRepository,
    SqliteCryptoInfoRepository,
};
pub use scheme::{AesCbcScheme, AesGcmSivScheme, JudgeableLocalTextCipher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::symmetric::SymmetricCryptoError;

/// No registered scheme recognises the ciphertext's mark header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no local cipher scheme matches the ciphertext header")]
pub struct HeaderNotMatchDecryptError;

/// Errors produced by the local text cipher.
#[derive(Debug, Error)]
pub enum LocalCipherError {
    #[error(transparent)]
    HeaderNotMatch(#[from] HeaderNotMatchDecryptError),

    #[error(transparent)]
    Symmetric(#[from] SymmetricCryptoError),

    /// The ciphertext has the right header but a broken body.
    #[error("malformed local ciphertext")]
    MalformedCiphertext,

    /// Decrypted bytes are not UTF-8.
    #[error("decrypted text is not valid UTF-8")]
    NotUtf8,

    /// A stored record cannot be used (wrong secret or corrupt fields).
    #[error("invalid crypto meta info for {app_id}/{mark_header}: {reason}")]
    MetaInfo {
        app_id: String,
        mark_header: String,
        reason: String,
    },

    /// The cipher was built with an empty scheme registry.
    #[error("no local cipher scheme registered")]
    NoScheme,

    #[error("crypto info repository failure: {0}")]
    Repository(String),
}

impl From<std::io::Error> for LocalCipherError {
    fn from(e: std::io::Error) -> Self {
        LocalCipherError::Repository(e.to_string())
    }
}

impl From<serde_json::Error> for LocalCipherError {
    fn from(e: serde_json::Error) -> Self {
        LocalCipherError::Repository(e.to_string())
    }
}

impl From<rusqlite::Error> for LocalCipherError {
    fn from(e: rusqlite::Error) -> Self {
        LocalCipherError::Repository(e.to_string())
    }
}

/// Persisted key material of one scheme for one application.
///
/// Keyed by `(app_id, mark_header)`. Binary fields are standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCryptoMetaInfo {
    pub app_id: String,
    pub mark_header: String,
    /// PBKDF2 salt for the root key.
    pub root_key_salt: String,
    /// `nonce || AES-256-GCM-SIV(root key, data key)`.
    pub encrypted_data_key: String,
    /// Scheme IV; empty for schemes that draw a nonce per message.
    pub iv: String,
    /// RFC 3339.
    pub created_at: String,
}
