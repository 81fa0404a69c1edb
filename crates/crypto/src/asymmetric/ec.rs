//! NIST P-256 primitives: key encoding, ECDH, ECDSA and ECIES.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use p256::{
    ecdh::diffie_hellman,
    ecdsa::{
        signature::{Signer, Verifier},
        DerSignature, Signature, SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    PublicKey, SecretKey,
};
use rand::rngs::OsRng;
use sha2::Sha256;

use super::{AsymmetricAlgorithm, AsymmetricCryptoError};
use crate::keypair::KeyPairDto;
use crate::symmetric::{random_bytes, SymmetricAlgorithm, SymmetricCipher, NONCE_LEN};

/// Length of an uncompressed SEC1 P-256 point.
const POINT_LEN: usize = 65;

const ECIES_INFO: &[u8] = b"ecies-p256-aes-256-gcm-siv";

/// Generate a fresh P-256 key pair.
pub fn generate() -> Result<KeyPairDto, AsymmetricCryptoError> {
    let secret = SecretKey::random(&mut OsRng);
    let private_key = secret
        .to_pkcs8_der()
        .map_err(|e| AsymmetricCryptoError::KeyGeneration(e.to_string()))?;
    Ok(KeyPairDto {
        algorithm: AsymmetricAlgorithm::Ec.qualifier().into(),
        public_key: encode_public_key(&secret.public_key())?,
        private_key: STANDARD.encode(private_key.as_bytes()),
    })
}

/// Encode a public key as base64 SPKI DER.
pub fn encode_public_key(key: &PublicKey) -> Result<String, AsymmetricCryptoError> {
    let der = key
        .to_public_key_der()
        .map_err(|e| AsymmetricCryptoError::InvalidKey(e.to_string()))?;
    Ok(STANDARD.encode(der.as_bytes()))
}

/// Decode a base64 SPKI DER public key.
///
/// # Errors
///
/// Returns [`AsymmetricCryptoError::InvalidKey`] for bad base64, a non-P-256
/// key, or a point not on the curve.
pub fn decode_public_key(encoded: &str) -> Result<PublicKey, AsymmetricCryptoError> {
    let der = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AsymmetricCryptoError::InvalidKey("public key is not base64".into()))?;
    PublicKey::from_public_key_der(&der)
        .map_err(|_| AsymmetricCryptoError::InvalidKey("not a P-256 SPKI public key".into()))
}

pub(crate) fn decode_secret_key(encoded: &str) -> Result<SecretKey, AsymmetricCryptoError> {
    let der = STANDARD
        .decode(encoded)
        .map_err(|_| AsymmetricCryptoError::InvalidKey("private key is not base64".into()))?;
    SecretKey::from_pkcs8_der(&der)
        .map_err(|_| AsymmetricCryptoError::InvalidKey("not a P-256 PKCS#8 private key".into()))
}

/// Raw ECDH shared secret (the x-coordinate, 32 bytes).
pub fn shared_secret(secret: &SecretKey, peer: &PublicKey) -> Vec<u8> {
    diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine())
        .raw_secret_bytes()
        .to_vec()
}

/// ECDSA-SHA256 signature, DER encoded.
pub fn sign(secret: &SecretKey, data: &[u8]) -> Vec<u8> {
    let signing_key = SigningKey::from(secret);
    let signature: DerSignature = signing_key.sign(data);
    signature.as_bytes().to_vec()
}

/// Verify a DER ECDSA-SHA256 signature. Malformed signatures verify as `false`.
pub fn verify(public: &PublicKey, data: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = Signature::from_der(signature) else {
        return false;
    };
    VerifyingKey::from(public).verify(data, &signature).is_ok()
}

/// ECIES: ephemeral ECDH, HKDF-SHA256, then AES-256-GCM-SIV.
///
/// Output layout: `ephemeral point (65) || nonce (12) || ciphertext+tag`.
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, AsymmetricCryptoError> {
    let ephemeral = SecretKey::random(&mut OsRng);
    let point = ephemeral.public_key().to_encoded_point(false);
    let key = ecies_key(&shared_secret(&ephemeral, recipient), point.as_bytes())?;
    let nonce = random_bytes(NONCE_LEN);

    let ciphertext = SymmetricCipher::new(SymmetricAlgorithm::AES_256_GCM_SIV)
        .encrypt(&key, &nonce, plaintext)
        .map_err(|_| AsymmetricCryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(POINT_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(point.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`encrypt`].
pub fn decrypt(secret: &SecretKey, data: &[u8]) -> Result<Vec<u8>, AsymmetricCryptoError> {
    if data.len() < POINT_LEN + NONCE_LEN {
        return Err(AsymmetricCryptoError::Decrypt);
    }
    let (point, rest) = data.split_at(POINT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let ephemeral =
        PublicKey::from_sec1_bytes(point).map_err(|_| AsymmetricCryptoError::Decrypt)?;
    let key = ecies_key(&shared_secret(secret, &ephemeral), point)?;

    SymmetricCipher::new(SymmetricAlgorithm::AES_256_GCM_SIV)
        .decrypt(&key, nonce, ciphertext)
        .map_err(|_| AsymmetricCryptoError::Decrypt)
}

fn ecies_key(shared: &[u8], salt: &[u8]) -> Result<[u8; 32], AsymmetricCryptoError> {
    let mut key = [0u8; 32];
    Hkdf::<Sha256>::new(Some(salt), shared)
        .expand(ECIES_INFO, &mut key)
        .map_err(|_| AsymmetricCryptoError::Encrypt)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (SecretKey, PublicKey) {
        let dto = generate().unwrap();
        (
            decode_secret_key(&dto.private_key).unwrap(),
            decode_public_key(&dto.public_key).unwrap(),
        )
    }

    #[test]
    fn generated_pair_is_consistent() {
        let (secret, public) = pair();
        assert_eq!(secret.public_key(), public);
    }

    #[test]
    fn ecdh_is_symmetric() {
        let (a_secret, a_public) = pair();
        let (b_secret, b_public) = pair();
        assert_eq!(
            shared_secret(&a_secret, &b_public),
            shared_secret(&b_secret, &a_public)
        );
    }

    #[test]
    fn sign_verify() {
        let (secret, public) = pair();
        let sig = sign(&secret, b"transcript");
        assert!(verify(&public, b"transcript", &sig));
        assert!(!verify(&public, b"other", &sig));
        assert!(!verify(&public, b"transcript", b"garbage"));
    }

    #[test]
    fn ecies_round_trip() {
        let (secret, public) = pair();
        let ct = encrypt(&public, b"hello ecies").unwrap();
        assert_eq!(decrypt(&secret, &ct).unwrap(), b"hello ecies");
    }

    #[test]
    fn ecies_wrong_key_fails() {
        let (_, public) = pair();
        let (other_secret, _) = pair();
        let ct = encrypt(&public, b"secret").unwrap();
        assert!(decrypt(&other_secret, &ct).is_err());
        assert!(decrypt(&other_secret, &ct[..10]).is_err());
    }

    #[test]
    fn malformed_public_key_rejected() {
        assert!(decode_public_key("!!!").is_err());
        assert!(decode_public_key(&STANDARD.encode(b"not der")).is_err());
    }
}
