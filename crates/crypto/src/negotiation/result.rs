//! [`KeyExchangeResult`]: the outcome of a successful negotiation.

use std::fmt;

use super::now_millis;

/// Session key material agreed with a peer.
///
/// Key and IV bytes are copied in on construction and only lent out as
/// shared borrows. They are zeroed when the result is dropped.
pub struct KeyExchangeResult {
    peer_public_key: String,
    x_session_id: String,
    local_key: Box<[u8]>,
    local_iv: Box<[u8]>,
    key_length: u16,
    expire_time: i64,
}

impl KeyExchangeResult {
    pub fn new(
        peer_public_key: impl Into<String>,
        x_session_id: impl Into<String>,
        local_key: &[u8],
        local_iv: &[u8],
        key_length: u16,
        expire_time: i64,
    ) -> Self {
        Self {
            peer_public_key: peer_public_key.into(),
            x_session_id: x_session_id.into(),
            local_key: local_key.into(),
            local_iv: local_iv.into(),
            key_length,
            expire_time,
        }
    }

    /// Public key of the other party (base64 SPKI DER).
    pub fn peer_public_key(&self) -> &str {
        &self.peer_public_key
    }

    pub fn x_session_id(&self) -> &str {
        &self.x_session_id
    }

    pub fn local_key(&self) -> &[u8] {
        &self.local_key
    }

    pub fn local_iv(&self) -> &[u8] {
        &self.local_iv
    }

    /// Key length in bits.
    pub fn key_length(&self) -> u16 {
        self.key_length
    }

    /// Expiry, epoch millis.
    pub fn expire_time(&self) -> i64 {
        self.expire_time
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis > self.expire_time
    }
}

impl Drop for KeyExchangeResult {
    fn drop(&mut self) {
        self.local_key.iter_mut().for_each(|b| *b = 0);
        self.local_iv.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for KeyExchangeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyExchangeResult")
            .field("x_session_id", &self.x_session_id)
            .field("key_length", &self.key_length)
            .field("expire_time", &self.expire_time)
            .field("local_key", &"[REDACTED]")
            .field("local_iv", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_are_copied() {
        let mut key = vec![7u8; 32];
        let result = KeyExchangeResult::new("pk", "sid", &key, &[1u8; 16], 256, i64::MAX);
        key.fill(0);
        assert_eq!(result.local_key(), &[7u8; 32]);
    }

    #[test]
    fn expiry_is_strictly_after() {
        let result = KeyExchangeResult::new("pk", "sid", &[0; 16], &[0; 16], 128, 1_000);
        assert!(!result.is_expired_at(1_000));
        assert!(result.is_expired_at(1_001));
        assert!(result.is_expired());
    }

    #[test]
    fn key_material_redacted_in_debug() {
        let result = KeyExchangeResult::new("pk", "sid", &[0xAB; 16], &[0xCD; 16], 128, 0);
        let dbg = format!("{result:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(dbg.contains("sid"));
        assert!(!dbg.contains("171"));
    }
}
