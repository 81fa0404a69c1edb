//! [`Initiator`]: the calling side of a key exchange.

use std::{future::Future, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::protocol::{KeyExchangeRequest, KeyExchangeResponse};
use p256::SecretKey;
use rand::rngs::OsRng;
use tracing::{info, warn};

use super::{
    derive_session_key, now_millis, transcript, KeyExchangeResult, NegotiationEndpoint,
    NegotiationError, SessionStore, KEY_EXCHANGE_ALGORITHM, TOKEN_LEN,
};
use crate::asymmetric::ec;
use crate::symmetric::{random_bytes, SymmetricAlgorithm};

/// How the initiator reaches a responder.
///
/// Implementations map I/O failures to [`NegotiationError::Unreachable`] and
/// error envelopes to [`NegotiationError::Rejected`].
pub trait NegotiationTransport: Send + Sync {
    /// POST a key exchange request to `url`.
    fn exchange(
        &self,
        url: &str,
        request: &KeyExchangeRequest,
    ) -> impl Future<Output = Result<KeyExchangeResponse, NegotiationError>> + Send;

    /// Fetch the responder's base64 public key from `url`.
    fn fetch_public_key(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<String, NegotiationError>> + Send;
}

/// Progress of a single [`Handshake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Init,
    Requested,
    Negotiated,
    Failed,
}

/// Negotiates sessions with remote responders and records them in a
/// [`SessionStore`].
#[derive(Debug)]
pub struct Initiator<T> {
    transport: T,
    endpoint: NegotiationEndpoint,
    sessions: SessionStore,
    algorithm: SymmetricAlgorithm,
}

impl<T: NegotiationTransport> Initiator<T> {
    /// `algorithm` is the transport cipher; its key size is the negotiated
    /// key length.
    pub fn new(
        transport: T,
        endpoint: NegotiationEndpoint,
        sessions: SessionStore,
        algorithm: SymmetricAlgorithm,
    ) -> Self {
        Self {
            transport,
            endpoint,
            sessions,
            algorithm,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Start a fresh handshake.
    pub fn handshake(&self) -> Handshake<'_, T> {
        Handshake {
            initiator: self,
            state: NegotiationState::Init,
        }
    }

    /// Negotiate with a responder whose public key is already known.
    pub async fn negotiate(
        &self,
        url: &str,
        responder_public_key: &str,
        key_pair_id: Option<&str>,
    ) -> Result<Arc<KeyExchangeResult>, NegotiationError> {
        self.handshake()
            .negotiate(url, responder_public_key, key_pair_id)
            .await
    }

    /// Fetch the responder's public key from `public_key_url`, then negotiate.
    pub async fn discover_and_negotiate(
        &self,
        url: &str,
        public_key_url: &str,
        key_pair_id: Option<&str>,
    ) -> Result<Arc<KeyExchangeResult>, NegotiationError> {
        let public_key = self.transport.fetch_public_key(public_key_url).await?;
        self.negotiate(url, &public_key, key_pair_id).await
    }
}

/// One key exchange attempt. Not reusable once it leaves [`NegotiationState::Init`].
#[derive(Debug)]
pub struct Handshake<'a, T> {
    initiator: &'a Initiator<T>,
    state: NegotiationState,
}

impl<T: NegotiationTransport> Handshake<'_, T> {
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Run the exchange against `url`.
    ///
    /// # Errors
    ///
    /// - [`NegotiationError::InvalidPublicKey`] for a malformed responder key.
    /// - [`NegotiationError::EndpointMismatch`] before any I/O if `url` does
    ///   not match the registered endpoint.
    /// - Transport errors as returned by [`NegotiationTransport::exchange`].
    /// - [`NegotiationError::Verification`] if the response does not match.
    pub async fn negotiate(
        &mut self,
        url: &str,
        responder_public_key: &str,
        key_pair_id: Option<&str>,
    ) -> Result<Arc<KeyExchangeResult>, NegotiationError> {
        if self.state != NegotiationState::Init {
            return Err(NegotiationError::Verification(format!(
                "handshake already {:?}",
                self.state
            )));
        }
        match self.run(url, responder_public_key, key_pair_id).await {
            Ok(result) => {
                self.state = NegotiationState::Negotiated;
                info!(x_session_id = result.x_session_id(), url, "session negotiated");
                Ok(result)
            }
            Err(e) => {
                self.state = NegotiationState::Failed;
                warn!(url, error = %e, "key exchange failed");
                Err(e)
            }
        }
    }

    async fn run(
        &mut self,
        url: &str,
        responder_public_key: &str,
        key_pair_id: Option<&str>,
    ) -> Result<Arc<KeyExchangeResult>, NegotiationError> {
        let initiator = self.initiator;
        let responder = ec::decode_public_key(responder_public_key)
            .map_err(|e| NegotiationError::InvalidPublicKey(e.to_string()))?;
        initiator.endpoint.check_url(url)?;

        let ephemeral = SecretKey::random(&mut OsRng);
        let public_key = ec::encode_public_key(&ephemeral.public_key())?;
        let token_bytes = random_bytes(TOKEN_LEN);
        let token = STANDARD.encode(&token_bytes);
        let key_length = initiator.algorithm.key_bits.bits();
        let (mut key, mut iv) = derive_session_key(
            &ec::shared_secret(&ephemeral, &responder),
            &token_bytes,
            key_length,
        )?;

        let request = KeyExchangeRequest {
            public_key,
            key_exchange_algorithm: KEY_EXCHANGE_ALGORITHM.into(),
            key_length,
            algorithm: initiator.algorithm.canonical_name().into(),
            token,
            timestamp: now_millis(),
            key_pair_id: key_pair_id.map(str::to_owned),
        };
        self.state = NegotiationState::Requested;
        let response = initiator.transport.exchange(url, &request).await?;

        verify_response(&request, &response, &responder)?;

        let result = KeyExchangeResult::new(
            response.public_key,
            response.x_session_id,
            &key,
            &iv,
            key_length,
            response.expire_time,
        );
        key.fill(0);
        iv.fill(0);
        Ok(initiator.sessions.insert(result).await)
    }
}

fn verify_response(
    request: &KeyExchangeRequest,
    response: &KeyExchangeResponse,
    responder: &p256::PublicKey,
) -> Result<(), NegotiationError> {
    let echoed = ec::decode_public_key(&response.public_key)
        .map_err(|e| NegotiationError::Verification(e.to_string()))?;
    if &echoed != responder {
        return Err(NegotiationError::Verification(
            "responder answered with another public key".into(),
        ));
    }
    if response.key_length != request.key_length {
        return Err(NegotiationError::Verification(format!(
            "key length {} does not match requested {}",
            response.key_length, request.key_length
        )));
    }
    let signature = STANDARD
        .decode(&response.signature)
        .map_err(|_| NegotiationError::Verification("signature is not base64".into()))?;
    let signed = transcript(
        &response.x_session_id,
        response.expire_time,
        response.key_length,
        &request.public_key,
        &response.public_key,
        &request.token,
    );
    if !ec::verify(responder, &signed, &signature) {
        return Err(NegotiationError::Verification("bad transcript signature".into()));
    }
    Ok(())
}
