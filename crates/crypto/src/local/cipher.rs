//! [`LocalTextCipher`]: ordered registry of local cipher schemes.

use std::{fmt, sync::Arc};

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use super::{
    keys, AesCbcScheme, AesGcmSivScheme, CryptoInfoRepository, HeaderNotMatchDecryptError,
    JudgeableLocalTextCipher, LocalCipherError, SchemeKeys,
};

struct Slot {
    scheme: Box<dyn JudgeableLocalTextCipher>,
    keys: OnceCell<SchemeKeys>,
}

/// Encrypts with the primary scheme and decrypts with whichever scheme
/// recognises the ciphertext.
///
/// Scheme keys are loaded lazily on first use and then cached for the life of
/// the instance.
pub struct LocalTextCipher {
    app_id: String,
    secret: Vec<u8>,
    repository: Arc<dyn CryptoInfoRepository>,
    slots: Vec<Slot>,
}

impl fmt::Debug for LocalTextCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTextCipher")
            .field("app_id", &self.app_id)
            .field("schemes", &self.mark_headers())
            .finish_non_exhaustive()
    }
}

impl LocalTextCipher {
    /// Registry with the built-in `v1.` (primary) and `v2.` schemes.
    pub fn new(
        app_id: impl Into<String>,
        secret: impl AsRef<[u8]>,
        repository: Arc<dyn CryptoInfoRepository>,
    ) -> Self {
        Self::with_schemes(
            app_id,
            secret,
            repository,
            vec![Box::new(AesCbcScheme), Box::new(AesGcmSivScheme)],
        )
    }

    /// Registry over custom schemes, sorted by [`JudgeableLocalTextCipher::order`].
    pub fn with_schemes(
        app_id: impl Into<String>,
        secret: impl AsRef<[u8]>,
        repository: Arc<dyn CryptoInfoRepository>,
        schemes: Vec<Box<dyn JudgeableLocalTextCipher>>,
    ) -> Self {
        let mut slots: Vec<Slot> = schemes
            .into_iter()
            .map(|scheme| Slot {
                scheme,
                keys: OnceCell::new(),
            })
            .collect();
        slots.sort_by_key(|slot| slot.scheme.order());
        Self {
            app_id: app_id.into(),
            secret: secret.as_ref().to_vec(),
            repository,
            slots,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Mark headers in registry order.
    pub fn mark_headers(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.scheme.mark_header()).collect()
    }

    /// Encrypt with the primary scheme.
    pub fn encrypt(&self, text: &str) -> Result<String, LocalCipherError> {
        let slot = self.slots.first().ok_or(LocalCipherError::NoScheme)?;
        slot.scheme.encrypt(self.keys(slot)?, text)
    }

    /// Decrypt with the first scheme whose header matches.
    ///
    /// # Errors
    ///
    /// Returns [`LocalCipherError::HeaderNotMatch`] if no scheme supports
    /// `cipher_text`.
    pub fn decrypt(&self, cipher_text: &str) -> Result<String, LocalCipherError> {
        let slot = self
            .slots
            .iter()
            .find(|slot| slot.scheme.support(cipher_text))
            .ok_or(HeaderNotMatchDecryptError)?;
        slot.scheme.decrypt(self.keys(slot)?, cipher_text)
    }

    /// Load the keys of every scheme now instead of on first use.
    pub fn ensure_init(&self) -> Result<(), LocalCipherError> {
        for slot in &self.slots {
            self.keys(slot)?;
        }
        Ok(())
    }

    /// Returns `true` once every scheme has its keys loaded.
    pub fn is_ready(&self) -> bool {
        self.slots.iter().all(|slot| slot.keys.get().is_some())
    }

    fn keys<'a>(&self, slot: &'a Slot) -> Result<&'a SchemeKeys, LocalCipherError> {
        slot.keys.get_or_try_init(|| self.load_keys(slot.scheme.as_ref()))
    }

    fn load_keys(
        &self,
        scheme: &dyn JudgeableLocalTextCipher,
    ) -> Result<SchemeKeys, LocalCipherError> {
        let header = scheme.mark_header();
        let meta = match self.repository.get(&self.app_id, header)? {
            Some(meta) => {
                debug!(app_id = %self.app_id, mark_header = header, "loaded crypto meta info");
                meta
            }
            None => {
                let created = keys::create_meta_info(
                    &self.app_id,
                    header,
                    &self.secret,
                    scheme.key_len(),
                    scheme.iv_len(),
                )?;
                let stored = self.repository.save(created)?;
                info!(app_id = %self.app_id, mark_header = header, "created crypto meta info");
                stored
            }
        };
        keys::unwrap_meta_info(&meta, &self.secret)
    }
}

impl Drop for LocalTextCipher {
    fn drop(&mut self) {
        self.secret.iter_mut().for_each(|b| *b = 0);
    }
}
