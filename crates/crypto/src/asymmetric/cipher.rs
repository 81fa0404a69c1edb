//! [`AsymmetricCipher`]: key-pair-aware asymmetric engine.

use std::sync::{Arc, Mutex};

use p256::PublicKey;
use tracing::info;

use super::{ec, rsa, AsymmetricAlgorithm, AsymmetricCryptoError};
use crate::keypair::{KeyPairCache, KeyPairDto, KeyPairError};

/// Asymmetric engine bound to one algorithm and one key-pair cache.
///
/// Every operation names a key pair by id; `None` means the default pair,
/// which is generated and stored on first use. Explicit ids are never
/// generated implicitly.
pub struct AsymmetricCipher {
    algorithm: AsymmetricAlgorithm,
    cache: Arc<dyn KeyPairCache>,
    default_key_pair_id: String,
    // Serialises generation of the default pair so concurrent first callers
    // agree on one key.
    generation: Mutex<()>,
}

impl std::fmt::Debug for AsymmetricCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsymmetricCipher")
            .field("algorithm", &self.algorithm)
            .field("default_key_pair_id", &self.default_key_pair_id)
            .finish_non_exhaustive()
    }
}

impl AsymmetricCipher {
    pub fn new(
        algorithm: AsymmetricAlgorithm,
        cache: Arc<dyn KeyPairCache>,
        default_key_pair_id: impl Into<String>,
    ) -> Self {
        Self {
            algorithm,
            cache,
            default_key_pair_id: default_key_pair_id.into(),
            generation: Mutex::new(()),
        }
    }

    pub fn algorithm(&self) -> AsymmetricAlgorithm {
        self.algorithm
    }

    pub fn default_key_pair_id(&self) -> &str {
        &self.default_key_pair_id
    }

    /// Generate a new pair and store it under `id`, replacing any previous one.
    pub fn generate_key_pair(&self, id: &str) -> Result<KeyPairDto, AsymmetricCryptoError> {
        let key_pair = match self.algorithm {
            AsymmetricAlgorithm::Ec => ec::generate()?,
            AsymmetricAlgorithm::Rsa { bits } => rsa::generate(bits)?,
        };
        self.cache.set(id, key_pair.clone())?;
        info!(key_pair_id = id, algorithm = %self.algorithm, "key pair generated");
        Ok(key_pair)
    }

    /// Returns `true` if the pair `id` (or the default) is already stored.
    pub fn has_key_pair(&self, id: Option<&str>) -> Result<bool, AsymmetricCryptoError> {
        match self.cache.get(id.unwrap_or(&self.default_key_pair_id)) {
            Ok(_) => Ok(true),
            Err(KeyPairError::NoSuchKeyPair(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Base64 SPKI public key of `id`, or of the default pair.
    ///
    /// # Errors
    ///
    /// Returns [`KeyPairError::NoSuchKeyPair`] (wrapped) for an unknown
    /// explicit id.
    pub fn public_key(&self, id: Option<&str>) -> Result<String, AsymmetricCryptoError> {
        Ok(self.key_pair(id)?.public_key)
    }

    pub fn encrypt(
        &self,
        id: Option<&str>,
        data: &[u8],
    ) -> Result<Vec<u8>, AsymmetricCryptoError> {
        let key_pair = self.key_pair(id)?;
        match self.algorithm {
            AsymmetricAlgorithm::Ec => {
                ec::encrypt(&ec::decode_public_key(&key_pair.public_key)?, data)
            }
            AsymmetricAlgorithm::Rsa { .. } => {
                rsa::encrypt(&rsa::decode_public_key(&key_pair.public_key)?, data)
            }
        }
    }

    pub fn decrypt(
        &self,
        id: Option<&str>,
        data: &[u8],
    ) -> Result<Vec<u8>, AsymmetricCryptoError> {
        let key_pair = self.key_pair(id)?;
        match self.algorithm {
            AsymmetricAlgorithm::Ec => {
                ec::decrypt(&ec::decode_secret_key(&key_pair.private_key)?, data)
            }
            AsymmetricAlgorithm::Rsa { .. } => {
                rsa::decrypt(&rsa::decode_private_key(&key_pair.private_key)?, data)
            }
        }
    }

    pub fn sign(&self, id: Option<&str>, data: &[u8]) -> Result<Vec<u8>, AsymmetricCryptoError> {
        let key_pair = self.key_pair(id)?;
        match self.algorithm {
            AsymmetricAlgorithm::Ec => {
                Ok(ec::sign(&ec::decode_secret_key(&key_pair.private_key)?, data))
            }
            AsymmetricAlgorithm::Rsa { .. } => {
                rsa::sign(&rsa::decode_private_key(&key_pair.private_key)?, data)
            }
        }
    }

    /// Verify `signature` over `data` with the stored pair `id`.
    pub fn verify(
        &self,
        id: Option<&str>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, AsymmetricCryptoError> {
        let key_pair = self.key_pair(id)?;
        self.verify_with_public_key(&key_pair.public_key, data, signature)
    }

    /// Verify with a peer's public key that is not in the cache.
    pub fn verify_with_public_key(
        &self,
        public_key: &str,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, AsymmetricCryptoError> {
        Ok(match self.algorithm {
            AsymmetricAlgorithm::Ec => {
                ec::verify(&ec::decode_public_key(public_key)?, data, signature)
            }
            AsymmetricAlgorithm::Rsa { .. } => {
                rsa::verify(&rsa::decode_public_key(public_key)?, data, signature)
            }
        })
    }

    /// Raw ECDH shared secret between the stored pair `id` and `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`AsymmetricCryptoError::Unsupported`] for RSA engines.
    pub fn diffie_hellman(
        &self,
        id: Option<&str>,
        peer: &PublicKey,
    ) -> Result<Vec<u8>, AsymmetricCryptoError> {
        if !matches!(self.algorithm, AsymmetricAlgorithm::Ec) {
            return Err(AsymmetricCryptoError::Unsupported {
                operation: "key agreement",
                algorithm: self.algorithm,
            });
        }
        let key_pair = self.key_pair(id)?;
        Ok(ec::shared_secret(
            &ec::decode_secret_key(&key_pair.private_key)?,
            peer,
        ))
    }

    fn key_pair(&self, id: Option<&str>) -> Result<KeyPairDto, AsymmetricCryptoError> {
        let id = id.unwrap_or(&self.default_key_pair_id);
        let key_pair = match self.cache.get(id) {
            Ok(kp) => kp,
            Err(KeyPairError::NoSuchKeyPair(_)) if id == self.default_key_pair_id => {
                self.generate_default()?
            }
            Err(e) => return Err(e.into()),
        };
        self.check_algorithm(&key_pair)?;
        Ok(key_pair)
    }

    fn generate_default(&self) -> Result<KeyPairDto, AsymmetricCryptoError> {
        let _guard = self
            .generation
            .lock()
            .map_err(|_| KeyPairError::Storage("key generation lock poisoned".into()))?;
        // Another caller may have won the race while we waited.
        match self.cache.get(&self.default_key_pair_id) {
            Ok(kp) => Ok(kp),
            Err(KeyPairError::NoSuchKeyPair(_)) => {
                self.generate_key_pair(&self.default_key_pair_id)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn check_algorithm(&self, key_pair: &KeyPairDto) -> Result<(), AsymmetricCryptoError> {
        let expected = self.algorithm.qualifier();
        if key_pair.algorithm != expected {
            return Err(AsymmetricCryptoError::AlgorithmMismatch {
                expected: expected.into(),
                found: key_pair.algorithm.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::{MemoryKeyPairCache, MockKeyPairCache};

    fn ec_engine() -> AsymmetricCipher {
        AsymmetricCipher::new(
            AsymmetricAlgorithm::Ec,
            Arc::new(MemoryKeyPairCache::new()),
            "default",
        )
    }

    #[test]
    fn default_pair_generated_on_demand_and_stable() {
        let engine = ec_engine();
        assert!(!engine.has_key_pair(None).unwrap());
        let first = engine.public_key(None).unwrap();
        assert!(engine.has_key_pair(None).unwrap());
        assert_eq!(engine.public_key(None).unwrap(), first);
        assert_eq!(engine.public_key(Some("default")).unwrap(), first);
    }

    #[test]
    fn unknown_id_is_no_such_key_pair() {
        let engine = ec_engine();
        for result in [
            engine.public_key(Some("nope")).map(|_| ()),
            engine.decrypt(Some("nope"), b"x").map(|_| ()),
            engine.sign(Some("nope"), b"x").map(|_| ()),
        ] {
            assert!(matches!(
                result,
                Err(AsymmetricCryptoError::KeyPair(KeyPairError::NoSuchKeyPair(ref id)))
                    if id == "nope"
            ));
        }
    }

    #[test]
    fn ec_encrypt_decrypt_sign_verify() {
        let engine = ec_engine();
        engine.generate_key_pair("svc").unwrap();

        let ct = engine.encrypt(Some("svc"), b"payload").unwrap();
        assert_eq!(engine.decrypt(Some("svc"), &ct).unwrap(), b"payload");
        assert!(engine.decrypt(None, &ct).is_err());

        let sig = engine.sign(Some("svc"), b"payload").unwrap();
        assert!(engine.verify(Some("svc"), b"payload", &sig).unwrap());
        assert!(!engine.verify(None, b"payload", &sig).unwrap());

        let public = engine.public_key(Some("svc")).unwrap();
        assert!(engine
            .verify_with_public_key(&public, b"payload", &sig)
            .unwrap());
    }

    #[test]
    fn rsa_engine_round_trip() {
        let engine = AsymmetricCipher::new(
            AsymmetricAlgorithm::Rsa { bits: 1024 },
            Arc::new(MemoryKeyPairCache::new()),
            "default",
        );
        let ct = engine.encrypt(None, b"rsa").unwrap();
        assert_eq!(engine.decrypt(None, &ct).unwrap(), b"rsa");
        let sig = engine.sign(None, b"rsa").unwrap();
        assert!(engine.verify(None, b"rsa", &sig).unwrap());

        let peer = ec::decode_public_key(&ec::generate().unwrap().public_key).unwrap();
        assert!(matches!(
            engine.diffie_hellman(None, &peer),
            Err(AsymmetricCryptoError::Unsupported { .. })
        ));
    }

    #[test]
    fn diffie_hellman_matches_peer_side() {
        let engine = ec_engine();
        let peer_dto = ec::generate().unwrap();
        let peer_secret = ec::decode_secret_key(&peer_dto.private_key).unwrap();
        let peer_public = ec::decode_public_key(&peer_dto.public_key).unwrap();

        let ours = engine.diffie_hellman(None, &peer_public).unwrap();
        let engine_public = ec::decode_public_key(&engine.public_key(None).unwrap()).unwrap();
        assert_eq!(ours, ec::shared_secret(&peer_secret, &engine_public));
    }

    #[test]
    fn algorithm_mismatch_detected() {
        let cache = Arc::new(MemoryKeyPairCache::new());
        cache.set("default", ec::generate().unwrap()).unwrap();
        let engine =
            AsymmetricCipher::new(AsymmetricAlgorithm::Rsa { bits: 1024 }, cache, "default");
        assert!(matches!(
            engine.public_key(None),
            Err(AsymmetricCryptoError::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn storage_failure_is_not_masked_by_generation() {
        let mut cache = MockKeyPairCache::new();
        cache
            .expect_get()
            .returning(|_| Err(KeyPairError::Storage("disk gone".into())));
        cache.expect_set().never();
        let engine = AsymmetricCipher::new(AsymmetricAlgorithm::Ec, Arc::new(cache), "default");
        assert!(matches!(
            engine.public_key(None),
            Err(AsymmetricCryptoError::KeyPair(KeyPairError::Storage(_)))
        ));
    }

    #[test]
    fn concurrent_first_use_yields_one_default_pair() {
        let engine = Arc::new(ec_engine());
        let keys: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let engine = Arc::clone(&engine);
                    s.spawn(move || engine.public_key(None).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
    }
}
