//! RSA primitives: OAEP-SHA256 encryption and PKCS#1 v1.5 SHA-256 signatures.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
};
use sha2::{Digest, Sha256};

use super::{AsymmetricAlgorithm, AsymmetricCryptoError};
use crate::keypair::KeyPairDto;

/// Generate a fresh RSA key pair with a `bits`-bit modulus.
pub fn generate(bits: usize) -> Result<KeyPairDto, AsymmetricCryptoError> {
    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| AsymmetricCryptoError::KeyGeneration(e.to_string()))?;
    let private_der = private
        .to_pkcs8_der()
        .map_err(|e| AsymmetricCryptoError::KeyGeneration(e.to_string()))?;
    let public_der = RsaPublicKey::from(&private)
        .to_public_key_der()
        .map_err(|e| AsymmetricCryptoError::KeyGeneration(e.to_string()))?;

    Ok(KeyPairDto {
        algorithm: AsymmetricAlgorithm::Rsa { bits }.qualifier().into(),
        public_key: STANDARD.encode(public_der.as_bytes()),
        private_key: STANDARD.encode(private_der.as_bytes()),
    })
}

pub fn decode_public_key(encoded: &str) -> Result<RsaPublicKey, AsymmetricCryptoError> {
    let der = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AsymmetricCryptoError::InvalidKey("public key is not base64".into()))?;
    RsaPublicKey::from_public_key_der(&der)
        .map_err(|_| AsymmetricCryptoError::InvalidKey("not an RSA SPKI public key".into()))
}

pub(crate) fn decode_private_key(encoded: &str) -> Result<RsaPrivateKey, AsymmetricCryptoError> {
    let der = STANDARD
        .decode(encoded)
        .map_err(|_| AsymmetricCryptoError::InvalidKey("private key is not base64".into()))?;
    RsaPrivateKey::from_pkcs8_der(&der)
        .map_err(|_| AsymmetricCryptoError::InvalidKey("not an RSA PKCS#8 private key".into()))
}

pub fn encrypt(public: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, AsymmetricCryptoError> {
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|_| AsymmetricCryptoError::Encrypt)
}

pub fn decrypt(
    private: &RsaPrivateKey,
    ciphertext: &[u8],
) -> Result<Vec<u8>, AsymmetricCryptoError> {
    private
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|_| AsymmetricCryptoError::Decrypt)
}

pub fn sign(private: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, AsymmetricCryptoError> {
    let digest = Sha256::digest(data);
    private
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|_| AsymmetricCryptoError::Sign)
}

pub fn verify(public: &RsaPublicKey, data: &[u8], signature: &[u8]) -> bool {
    let digest = Sha256::digest(data);
    public
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .is_ok()
}
