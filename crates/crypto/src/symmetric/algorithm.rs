//! Canonical names and parameters of the supported AES variants.

use std::fmt;

use super::SymmetricCryptoError;

/// Byte length of an AES block and of a CBC IV.
pub const BLOCK_LEN: usize = 16;

/// Byte length of an AES-GCM-SIV nonce (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES key size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyBits {
    Aes128,
    Aes192,
    Aes256,
}

impl KeyBits {
    /// Map a bit count (128/192/256) to a key size.
    pub fn from_bits(bits: u16) -> Result<Self, SymmetricCryptoError> {
        match bits {
            128 => Ok(KeyBits::Aes128),
            192 => Ok(KeyBits::Aes192),
            256 => Ok(KeyBits::Aes256),
            other => Err(SymmetricCryptoError::Unsupported(format!(
                "AES key length {other}"
            ))),
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            KeyBits::Aes128 => 128,
            KeyBits::Aes192 => 192,
            KeyBits::Aes256 => 256,
        }
    }

    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        usize::from(self.bits()) / 8
    }
}

/// Block cipher mode of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Cbc,
    Ecb,
    /// AES-GCM-SIV (RFC 8452). Authenticated; padding does not apply.
    GcmSiv,
}

/// Block padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Padding {
    /// PKCS#7, spelled `PKCS5Padding` in canonical names.
    Pkcs7,
    None,
}

/// A fully specified symmetric algorithm: mode, padding and key size.
///
/// Parsed from a canonical `AES/<mode>/<padding>` name plus a key length, e.g.
/// `("AES/CBC/PKCS5Padding", 256)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymmetricAlgorithm {
    pub mode: Mode,
    pub padding: Padding,
    pub key_bits: KeyBits,
}

impl SymmetricAlgorithm {
    /// AES-256-CBC with PKCS#7 padding, the transport default.
    pub const AES_256_CBC: SymmetricAlgorithm = SymmetricAlgorithm {
        mode: Mode::Cbc,
        padding: Padding::Pkcs7,
        key_bits: KeyBits::Aes256,
    };

    /// AES-256-GCM-SIV.
    pub const AES_256_GCM_SIV: SymmetricAlgorithm = SymmetricAlgorithm {
        mode: Mode::GcmSiv,
        padding: Padding::None,
        key_bits: KeyBits::Aes256,
    };

    /// Parse a canonical name and key length.
    ///
    /// # Errors
    ///
    /// Returns [`SymmetricCryptoError::Unsupported`] for unknown names, key
    /// lengths other than 128/192/256, or combinations the mode cannot express
    /// (GCM-SIV with padding or with a 192-bit key).
    pub fn parse(name: &str, key_bits: u16) -> Result<Self, SymmetricCryptoError> {
        let key_bits = KeyBits::from_bits(key_bits)?;
        let unsupported = || SymmetricCryptoError::Unsupported(name.to_owned());

        let mut parts = name.trim().split('/');
        let (Some(cipher), Some(mode), Some(padding), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(unsupported());
        };
        if !cipher.eq_ignore_ascii_case("AES") {
            return Err(unsupported());
        }

        let mode = match mode.to_ascii_uppercase().as_str() {
            "CBC" => Mode::Cbc,
            "ECB" => Mode::Ecb,
            "GCM-SIV" | "GCMSIV" => Mode::GcmSiv,
            _ => return Err(unsupported()),
        };
        let padding = match padding.to_ascii_uppercase().as_str() {
            "PKCS5PADDING" | "PKCS7PADDING" => Padding::Pkcs7,
            "NOPADDING" => Padding::None,
            _ => return Err(unsupported()),
        };

        if mode == Mode::GcmSiv && (padding != Padding::None || key_bits == KeyBits::Aes192) {
            return Err(unsupported());
        }

        Ok(Self {
            mode,
            padding,
            key_bits,
        })
    }

    /// Canonical name without the key length, e.g. `AES/CBC/PKCS5Padding`.
    pub fn canonical_name(&self) -> &'static str {
        match (self.mode, self.padding) {
            (Mode::Cbc, Padding::Pkcs7) => "AES/CBC/PKCS5Padding",
            (Mode::Cbc, Padding::None) => "AES/CBC/NoPadding",
            (Mode::Ecb, Padding::Pkcs7) => "AES/ECB/PKCS5Padding",
            (Mode::Ecb, Padding::None) => "AES/ECB/NoPadding",
            (Mode::GcmSiv, _) => "AES/GCM-SIV/NoPadding",
        }
    }

    /// IV length the mode requires; `0` when the IV is ignored (ECB).
    pub fn iv_len(&self) -> usize {
        match self.mode {
            Mode::Cbc => BLOCK_LEN,
            Mode::Ecb => 0,
            Mode::GcmSiv => NONCE_LEN,
        }
    }
}

impl fmt::Display for SymmetricAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.canonical_name(), self.key_bits.bits())
    }
}
