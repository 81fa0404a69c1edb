//! [`SymmetricCipher`]: AES-CBC, AES-ECB and AES-GCM-SIV over byte slices.

use aes::cipher::{
    block_padding::{NoPadding, Pkcs7},
    BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
};
use aes_gcm_siv::{
    aead::{self, Aead},
    Aes128GcmSiv, Aes256GcmSiv,
};

use super::algorithm::{KeyBits, Mode, Padding, SymmetricAlgorithm, BLOCK_LEN, NONCE_LEN};
use super::SymmetricCryptoError;

/// Expand `$body` once per AES key size with `$aes` bound to the block cipher.
macro_rules! with_aes {
    ($bits:expr, $aes:ident => $body:expr) => {
        match $bits {
            KeyBits::Aes128 => {
                type $aes = aes::Aes128;
                $body
            }
            KeyBits::Aes192 => {
                type $aes = aes::Aes192;
                $body
            }
            KeyBits::Aes256 => {
                type $aes = aes::Aes256;
                $body
            }
        }
    };
}

/// Stateless AES engine bound to one [`SymmetricAlgorithm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymmetricCipher {
    algorithm: SymmetricAlgorithm,
}

impl SymmetricCipher {
    pub fn new(algorithm: SymmetricAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Shorthand for [`SymmetricAlgorithm::parse`] followed by [`SymmetricCipher::new`].
    pub fn from_name(name: &str, key_bits: u16) -> Result<Self, SymmetricCryptoError> {
        SymmetricAlgorithm::parse(name, key_bits).map(Self::new)
    }

    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    /// Encrypt `plaintext` under `key` and `iv`.
    ///
    /// # Errors
    ///
    /// Returns [`SymmetricCryptoError::InvalidKeyLength`] or
    /// [`SymmetricCryptoError::InvalidIvLength`] when the inputs do not fit the
    /// algorithm, and [`SymmetricCryptoError::UnalignedInput`] for unpadded
    /// modes given a partial block.
    pub fn encrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SymmetricCryptoError> {
        self.check_key(key)?;
        let SymmetricAlgorithm {
            mode,
            padding,
            key_bits,
        } = self.algorithm;

        match mode {
            Mode::Cbc => {
                self.check_iv(iv)?;
                with_aes!(key_bits, C => {
                    let enc = cbc::Encryptor::<C>::new_from_slices(key, iv)
                        .map_err(|_| self.key_length_error(key))?;
                    seal_blocks(enc, padding, plaintext)
                })
            }
            Mode::Ecb => with_aes!(key_bits, C => {
                let enc = ecb::Encryptor::<C>::new_from_slice(key)
                    .map_err(|_| self.key_length_error(key))?;
                seal_blocks(enc, padding, plaintext)
            }),
            Mode::GcmSiv => {
                self.check_iv(iv)?;
                match key_bits {
                    KeyBits::Aes128 => aead_seal::<Aes128GcmSiv>(key, iv, plaintext),
                    KeyBits::Aes256 => aead_seal::<Aes256GcmSiv>(key, iv, plaintext),
                    KeyBits::Aes192 => Err(SymmetricCryptoError::Unsupported(
                        self.algorithm.to_string(),
                    )),
                }
            }
        }
    }

    /// Decrypt `ciphertext` under `key` and `iv`.
    ///
    /// # Errors
    ///
    /// Besides the key/IV checks of [`SymmetricCipher::encrypt`], returns
    /// [`SymmetricCryptoError::MalformedCiphertext`] for truncated input,
    /// [`SymmetricCryptoError::Padding`] when PKCS#7 unpadding fails, and
    /// [`SymmetricCryptoError::Authentication`] when a GCM-SIV tag does not verify.
    pub fn decrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SymmetricCryptoError> {
        self.check_key(key)?;
        let SymmetricAlgorithm {
            mode,
            padding,
            key_bits,
        } = self.algorithm;

        match mode {
            Mode::Cbc => {
                self.check_iv(iv)?;
                with_aes!(key_bits, C => {
                    let dec = cbc::Decryptor::<C>::new_from_slices(key, iv)
                        .map_err(|_| self.key_length_error(key))?;
                    open_blocks(dec, padding, ciphertext)
                })
            }
            Mode::Ecb => with_aes!(key_bits, C => {
                let dec = ecb::Decryptor::<C>::new_from_slice(key)
                    .map_err(|_| self.key_length_error(key))?;
                open_blocks(dec, padding, ciphertext)
            }),
            Mode::GcmSiv => {
                self.check_iv(iv)?;
                match key_bits {
                    KeyBits::Aes128 => aead_open::<Aes128GcmSiv>(key, iv, ciphertext),
                    KeyBits::Aes256 => aead_open::<Aes256GcmSiv>(key, iv, ciphertext),
                    KeyBits::Aes192 => Err(SymmetricCryptoError::Unsupported(
                        self.algorithm.to_string(),
                    )),
                }
            }
        }
    }

    fn check_key(&self, key: &[u8]) -> Result<(), SymmetricCryptoError> {
        if key.len() != self.algorithm.key_bits.key_len() {
            return Err(self.key_length_error(key));
        }
        Ok(())
    }

    fn check_iv(&self, iv: &[u8]) -> Result<(), SymmetricCryptoError> {
        let expected = self.algorithm.iv_len();
        if iv.len() != expected {
            return Err(SymmetricCryptoError::InvalidIvLength {
                expected,
                actual: iv.len(),
            });
        }
        Ok(())
    }

    fn key_length_error(&self, key: &[u8]) -> SymmetricCryptoError {
        SymmetricCryptoError::InvalidKeyLength {
            expected: self.algorithm.key_bits.key_len(),
            actual: key.len(),
        }
    }
}

fn seal_blocks<E: BlockEncryptMut>(
    enc: E,
    padding: Padding,
    plaintext: &[u8],
) -> Result<Vec<u8>, SymmetricCryptoError> {
    match padding {
        Padding::Pkcs7 => Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        Padding::None => {
            if plaintext.len() % BLOCK_LEN != 0 {
                return Err(SymmetricCryptoError::UnalignedInput(plaintext.len()));
            }
            Ok(enc.encrypt_padded_vec_mut::<NoPadding>(plaintext))
        }
    }
}

fn open_blocks<D: BlockDecryptMut>(
    dec: D,
    padding: Padding,
    ciphertext: &[u8],
) -> Result<Vec<u8>, SymmetricCryptoError> {
    if ciphertext.len() % BLOCK_LEN != 0 {
        return Err(SymmetricCryptoError::MalformedCiphertext);
    }
    match padding {
        Padding::Pkcs7 => {
            // A padded message is never empty: PKCS#7 always adds a block.
            if ciphertext.is_empty() {
                return Err(SymmetricCryptoError::MalformedCiphertext);
            }
            dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| SymmetricCryptoError::Padding)
        }
        Padding::None => dec
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| SymmetricCryptoError::MalformedCiphertext),
    }
}

fn aead_seal<A: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, SymmetricCryptoError> {
    debug_assert_eq!(nonce.len(), NONCE_LEN);
    let cipher = A::new_from_slice(key).map_err(|_| SymmetricCryptoError::InvalidKeyLength {
        expected: A::key_size(),
        actual: key.len(),
    })?;
    cipher
        .encrypt(aead::Nonce::<A>::from_slice(nonce), plaintext)
        .map_err(|_| SymmetricCryptoError::Authentication)
}

fn aead_open<A: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, SymmetricCryptoError> {
    debug_assert_eq!(nonce.len(), NONCE_LEN);
    let cipher = A::new_from_slice(key).map_err(|_| SymmetricCryptoError::InvalidKeyLength {
        expected: A::key_size(),
        actual: key.len(),
    })?;
    cipher
        .decrypt(aead::Nonce::<A>::from_slice(nonce), ciphertext)
        .map_err(|_| SymmetricCryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetric::{generate_key, random_bytes};

    const ALL: [(&str, u16); 13] = [
        ("AES/CBC/PKCS5Padding", 128),
        ("AES/CBC/PKCS5Padding", 192),
        ("AES/CBC/PKCS5Padding", 256),
        ("AES/CBC/NoPadding", 128),
        ("AES/CBC/NoPadding", 256),
        ("AES/ECB/PKCS5Padding", 128),
        ("AES/ECB/PKCS5Padding", 192),
        ("AES/ECB/PKCS5Padding", 256),
        ("AES/ECB/NoPadding", 128),
        ("AES/ECB/NoPadding", 192),
        ("AES/ECB/NoPadding", 256),
        ("AES/GCM-SIV/NoPadding", 128),
        ("AES/GCM-SIV/NoPadding", 256),
    ];

    fn material(alg: SymmetricAlgorithm) -> (Vec<u8>, Vec<u8>) {
        (
            generate_key(alg.key_bits.bits()).unwrap(),
            random_bytes(alg.iv_len()),
        )
    }

    #[test]
    fn every_algorithm_round_trips() {
        // Block-aligned so the unpadded modes accept it too.
        let plaintext = b"0123456789abcdef0123456789abcdef";
        for (name, bits) in ALL {
            let cipher = SymmetricCipher::from_name(name, bits).unwrap();
            let (key, iv) = material(cipher.algorithm());
            let ct = cipher.encrypt(&key, &iv, plaintext).unwrap();
            assert_ne!(&ct[..], &plaintext[..], "{name}/{bits} left data in clear");
            let pt = cipher.decrypt(&key, &iv, &ct).unwrap();
            assert_eq!(pt, plaintext, "{name}/{bits}");
        }
    }

    #[test]
    fn padded_modes_accept_any_length() {
        let cipher = SymmetricCipher::new(SymmetricAlgorithm::AES_256_CBC);
        let (key, iv) = material(cipher.algorithm());
        for len in [0usize, 1, 15, 16, 17, 100] {
            let plaintext = vec![0x5a; len];
            let ct = cipher.encrypt(&key, &iv, &plaintext).unwrap();
            assert_eq!(ct.len() % BLOCK_LEN, 0);
            assert_eq!(cipher.decrypt(&key, &iv, &ct).unwrap(), plaintext);
        }
    }

    #[test]
    fn unpadded_modes_reject_partial_blocks() {
        let cipher = SymmetricCipher::from_name("AES/CBC/NoPadding", 128).unwrap();
        let (key, iv) = material(cipher.algorithm());
        assert_eq!(
            cipher.encrypt(&key, &iv, b"short"),
            Err(SymmetricCryptoError::UnalignedInput(5))
        );
    }

    #[test]
    fn wrong_key_length_rejected() {
        let cipher = SymmetricCipher::new(SymmetricAlgorithm::AES_256_CBC);
        let err = cipher.encrypt(&[0u8; 16], &[0u8; 16], b"x").unwrap_err();
        assert_eq!(
            err,
            SymmetricCryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            }
        );
    }

    #[test]
    fn wrong_iv_length_rejected() {
        let cipher = SymmetricCipher::new(SymmetricAlgorithm::AES_256_CBC);
        let key = generate_key(256).unwrap();
        assert!(matches!(
            cipher.encrypt(&key, &[0u8; 8], b"x"),
            Err(SymmetricCryptoError::InvalidIvLength { expected: 16, .. })
        ));
    }

    #[test]
    fn ecb_ignores_iv() {
        let cipher = SymmetricCipher::from_name("AES/ECB/PKCS5Padding", 128).unwrap();
        let key = generate_key(128).unwrap();
        let ct = cipher.encrypt(&key, &[], b"hello").unwrap();
        assert_eq!(cipher.decrypt(&key, &[], &ct).unwrap(), b"hello");
    }

    #[test]
    fn truncated_ciphertext_is_malformed() {
        let cipher = SymmetricCipher::new(SymmetricAlgorithm::AES_256_CBC);
        let (key, iv) = material(cipher.algorithm());
        let ct = cipher.encrypt(&key, &iv, b"hello world").unwrap();
        assert_eq!(
            cipher.decrypt(&key, &iv, &ct[..ct.len() - 1]),
            Err(SymmetricCryptoError::MalformedCiphertext)
        );
        assert_eq!(
            cipher.decrypt(&key, &iv, &[]),
            Err(SymmetricCryptoError::MalformedCiphertext)
        );
    }

    #[test]
    fn wrong_key_fails_padding_or_garbles() {
        let cipher = SymmetricCipher::new(SymmetricAlgorithm::AES_256_CBC);
        let (key, iv) = material(cipher.algorithm());
        let other = generate_key(256).unwrap();
        let ct = cipher.encrypt(&key, &iv, b"attack at dawn").unwrap();
        match cipher.decrypt(&other, &iv, &ct) {
            Err(SymmetricCryptoError::Padding) => {}
            Ok(pt) => assert_ne!(pt, b"attack at dawn"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn tampered_gcm_siv_fails_auth() {
        let cipher = SymmetricCipher::new(SymmetricAlgorithm::AES_256_GCM_SIV);
        let (key, nonce) = material(cipher.algorithm());
        let mut ct = cipher.encrypt(&key, &nonce, b"tamper me").unwrap();
        ct[0] ^= 0xFF;
        assert_eq!(
            cipher.decrypt(&key, &nonce, &ct),
            Err(SymmetricCryptoError::Authentication)
        );
    }
}
