//! Asymmetric key-pair persistence.
//!
//! [`KeyPairCache`] stores [`KeyPairDto`] values by identifier. Three backends
//! behave identically from the caller's point of view:
//!
//! - [`MemoryKeyPairCache`]: instance-local, lost on restart.
//! - [`FileKeyPairCache`]: one JSON document per id under a directory.
//! - [`SqliteKeyPairCache`]: a single `key_pair` table.
//!
//! A clustered deployment must use a shared backend (file on a shared volume,
//! or SQLite) so every instance answers with the same public key.

pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileKeyPairCache;
pub use memory::MemoryKeyPairCache;
pub use sqlite::SqliteKeyPairCache;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the key-pair layer.
#[derive(Debug, Error)]
pub enum KeyPairError {
    /// No key pair is stored under the requested id.
    #[error("no such key pair: {0}")]
    NoSuchKeyPair(String),

    /// The id is empty or contains characters outside `[A-Za-z0-9._-]`.
    #[error("invalid key pair id: {0:?}")]
    InvalidId(String),

    /// The backing store failed (I/O, SQL, or a corrupt record).
    #[error("key pair storage failure: {0}")]
    Storage(String),
}

impl From<std::io::Error> for KeyPairError {
    fn from(e: std::io::Error) -> Self {
        KeyPairError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for KeyPairError {
    fn from(e: serde_json::Error) -> Self {
        KeyPairError::Storage(e.to_string())
    }
}

impl From<rusqlite::Error> for KeyPairError {
    fn from(e: rusqlite::Error) -> Self {
        KeyPairError::Storage(e.to_string())
    }
}

/// Serializable public/private key pair.
///
/// Keys are base64 (standard alphabet) DER: SPKI for the public half, PKCS#8
/// for the private half. Created by the asymmetric engine and never mutated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairDto {
    /// `"EC"` or `"RSA"`.
    pub algorithm: String,
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for KeyPairDto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPairDto")
            .field("algorithm", &self.algorithm)
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Storage of key pairs by identifier.
///
/// Implementations must be safe under concurrent `set`/`get`.
#[cfg_attr(test, mockall::automock)]
pub trait KeyPairCache: Send + Sync {
    /// Store (or replace) the pair under `id`.
    fn set(&self, id: &str, key_pair: KeyPairDto) -> Result<(), KeyPairError>;

    /// Fetch the pair stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyPairError::NoSuchKeyPair`] if nothing is stored under `id`.
    fn get(&self, id: &str) -> Result<KeyPairDto, KeyPairError>;

    /// Remove every stored pair.
    fn destroy(&self) -> Result<(), KeyPairError>;
}

/// Reject ids that are empty or could escape a file-backed store.
pub fn validate_id(id: &str) -> Result<(), KeyPairError> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && id != "."
        && id != "..";
    if valid {
        Ok(())
    } else {
        Err(KeyPairError::InvalidId(id.to_owned()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample(tag: &str) -> KeyPairDto {
        KeyPairDto {
            algorithm: "EC".into(),
            public_key: format!("pub-{tag}"),
            private_key: format!("priv-{tag}"),
        }
    }

    /// Behaviour every backend must share.
    pub(crate) fn exercise_backend(cache: &dyn KeyPairCache) {
        assert!(matches!(
            cache.get("missing"),
            Err(KeyPairError::NoSuchKeyPair(id)) if id == "missing"
        ));

        cache.set("a", sample("a")).unwrap();
        cache.set("b", sample("b")).unwrap();
        assert_eq!(cache.get("a").unwrap(), sample("a"));

        cache.set("a", sample("a2")).unwrap();
        assert_eq!(cache.get("a").unwrap(), sample("a2"));

        assert!(matches!(
            cache.set("../escape", sample("x")),
            Err(KeyPairError::InvalidId(_))
        ));

        cache.destroy().unwrap();
        assert!(matches!(
            cache.get("b"),
            Err(KeyPairError::NoSuchKeyPair(_))
        ));
    }

    #[test]
    fn id_validation() {
        assert!(validate_id("default").is_ok());
        assert!(validate_id("svc-a.v2_1").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("..").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("a b").is_err());
    }

    #[test]
    fn private_key_redacted_in_debug() {
        let dto = sample("x");
        let dbg = format!("{dto:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("priv-x"));
    }

    #[test]
    fn dto_serialises_camel_case() {
        let json = serde_json::to_value(sample("x")).unwrap();
        assert_eq!(json["publicKey"], "pub-x");
        assert_eq!(json["privateKey"], "priv-x");
    }
}
