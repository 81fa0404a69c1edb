//! [`Responder`]: the serving side of a key exchange.

use std::{sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::protocol::{KeyExchangeRequest, KeyExchangeResponse};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    derive_session_key, now_millis, transcript, KeyExchangeResult, NegotiationError, SessionStore,
    KEY_EXCHANGE_ALGORITHM, TOKEN_LEN,
};
use crate::asymmetric::{ec, AsymmetricCipher};
use crate::symmetric::{Mode, SymmetricAlgorithm};

/// Tunables of the responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponderSettings {
    /// Lifetime of a negotiated session.
    pub session_ttl: Duration,
    /// Largest accepted difference between the request timestamp and now.
    pub max_clock_skew: Duration,
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(1800),
            max_clock_skew: Duration::from_secs(300),
        }
    }
}

/// Answers [`KeyExchangeRequest`]s with the engine's EC key pair.
#[derive(Debug, Clone)]
pub struct Responder {
    cipher: Arc<AsymmetricCipher>,
    sessions: SessionStore,
    settings: ResponderSettings,
}

impl Responder {
    pub fn new(
        cipher: Arc<AsymmetricCipher>,
        sessions: SessionStore,
        settings: ResponderSettings,
    ) -> Self {
        Self {
            cipher,
            sessions,
            settings,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Public key initiators should agree with, for discovery endpoints.
    pub fn public_key(&self, key_pair_id: Option<&str>) -> Result<String, NegotiationError> {
        Ok(self.cipher.public_key(key_pair_id)?)
    }

    /// Validate a request, agree a session key and store the session.
    ///
    /// # Errors
    ///
    /// - [`NegotiationError::UnsupportedParameter`] or
    ///   [`NegotiationError::StaleRequest`] for rejected parameters.
    /// - [`NegotiationError::InvalidPublicKey`] if the initiator key is malformed.
    /// - [`NegotiationError::Asymmetric`] if the requested key pair is unknown.
    pub async fn respond(
        &self,
        request: &KeyExchangeRequest,
    ) -> Result<KeyExchangeResponse, NegotiationError> {
        self.validate(request)?;

        let initiator = ec::decode_public_key(&request.public_key)
            .map_err(|e| NegotiationError::InvalidPublicKey(e.to_string()))?;
        let token = STANDARD
            .decode(&request.token)
            .map_err(|_| NegotiationError::UnsupportedParameter("token is not base64".into()))?;
        if token.len() < TOKEN_LEN {
            return Err(NegotiationError::UnsupportedParameter(format!(
                "token shorter than {TOKEN_LEN} bytes"
            )));
        }

        let key_pair_id = request.key_pair_id.as_deref();
        let shared = self.cipher.diffie_hellman(key_pair_id, &initiator)?;
        let responder_public_key = self.cipher.public_key(key_pair_id)?;
        let (mut key, mut iv) = derive_session_key(&shared, &token, request.key_length)?;

        let x_session_id = Uuid::new_v4().to_string();
        let ttl_ms = i64::try_from(self.settings.session_ttl.as_millis()).unwrap_or(i64::MAX);
        let expire_time = now_millis().saturating_add(ttl_ms);

        let signed = transcript(
            &x_session_id,
            expire_time,
            request.key_length,
            &request.public_key,
            &responder_public_key,
            &request.token,
        );
        let signature = self.cipher.sign(key_pair_id, &signed)?;

        self.sessions
            .insert(KeyExchangeResult::new(
                request.public_key.clone(),
                x_session_id.clone(),
                &key,
                &iv,
                request.key_length,
                expire_time,
            ))
            .await;
        key.fill(0);
        iv.fill(0);

        info!(
            x_session_id = %x_session_id,
            key_length = request.key_length,
            expire_time,
            "key exchange completed"
        );

        Ok(KeyExchangeResponse {
            public_key: responder_public_key,
            x_session_id,
            expire_time,
            key_length: request.key_length,
            algorithm: request.algorithm.clone(),
            signature: STANDARD.encode(signature),
        })
    }

    fn validate(&self, request: &KeyExchangeRequest) -> Result<(), NegotiationError> {
        if !request
            .key_exchange_algorithm
            .eq_ignore_ascii_case(KEY_EXCHANGE_ALGORITHM)
        {
            return Err(NegotiationError::UnsupportedParameter(format!(
                "key exchange algorithm {}",
                request.key_exchange_algorithm
            )));
        }

        let algorithm = SymmetricAlgorithm::parse(&request.algorithm, request.key_length)
            .map_err(|e| NegotiationError::UnsupportedParameter(e.to_string()))?;
        if algorithm.mode != Mode::Cbc {
            return Err(NegotiationError::UnsupportedParameter(format!(
                "transport algorithm {algorithm} has no IV"
            )));
        }

        let skew_ms = (now_millis() - request.timestamp).abs();
        let max_ms = i64::try_from(self.settings.max_clock_skew.as_millis()).unwrap_or(i64::MAX);
        if skew_ms > max_ms {
            debug!(skew_ms, max_ms, "stale key exchange request");
            return Err(NegotiationError::StaleRequest { skew_ms });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::asymmetric::{AsymmetricAlgorithm, AsymmetricCryptoError};
    use crate::keypair::{KeyPairError, MemoryKeyPairCache};

    pub(crate) fn responder() -> Responder {
        let cipher = AsymmetricCipher::new(
            AsymmetricAlgorithm::Ec,
            Arc::new(MemoryKeyPairCache::new()),
            "default",
        );
        Responder::new(Arc::new(cipher), SessionStore::new(), ResponderSettings::default())
    }

    fn request() -> KeyExchangeRequest {
        let ephemeral = ec::generate().unwrap();
        KeyExchangeRequest {
            public_key: ephemeral.public_key,
            key_exchange_algorithm: "ECDH".into(),
            key_length: 256,
            algorithm: "AES/CBC/PKCS5Padding".into(),
            token: STANDARD.encode([9u8; TOKEN_LEN]),
            timestamp: now_millis(),
            key_pair_id: None,
        }
    }

    #[tokio::test]
    async fn accepted_request_creates_session() {
        let responder = responder();
        let response = responder.respond(&request()).await.unwrap();
        assert_eq!(response.key_length, 256);
        assert!(response.expire_time > now_millis());
        let session = responder.sessions().get(&response.x_session_id).await.unwrap();
        assert_eq!(session.local_key().len(), 32);
        assert_eq!(session.local_iv().len(), 16);
    }

    #[tokio::test]
    async fn rejects_bad_parameters() {
        let responder = responder();

        let mut req = request();
        req.key_exchange_algorithm = "DH".into();
        assert!(matches!(
            responder.respond(&req).await,
            Err(NegotiationError::UnsupportedParameter(_))
        ));

        let mut req = request();
        req.key_length = 512;
        assert!(matches!(
            responder.respond(&req).await,
            Err(NegotiationError::UnsupportedParameter(_))
        ));

        let mut req = request();
        req.algorithm = "AES/ECB/PKCS5Padding".into();
        assert!(matches!(
            responder.respond(&req).await,
            Err(NegotiationError::UnsupportedParameter(_))
        ));

        let mut req = request();
        req.timestamp -= 10 * 60 * 1000;
        assert!(matches!(
            responder.respond(&req).await,
            Err(NegotiationError::StaleRequest { .. })
        ));
        assert!(responder.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn malformed_public_key_is_a_negotiation_error() {
        let mut req = request();
        req.public_key = "not-a-key".into();
        assert!(matches!(
            responder().respond(&req).await,
            Err(NegotiationError::InvalidPublicKey(_))
        ));
    }

    #[tokio::test]
    async fn unknown_key_pair_id() {
        let mut req = request();
        req.key_pair_id = Some("ghost".into());
        assert!(matches!(
            responder().respond(&req).await,
            Err(NegotiationError::Asymmetric(AsymmetricCryptoError::KeyPair(
                KeyPairError::NoSuchKeyPair(_)
            )))
        ));
    }
}
