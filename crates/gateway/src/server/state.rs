//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use shoulder_crypto::{
    asymmetric::{AsymmetricAlgorithm, AsymmetricCipher},
    keypair::MemoryKeyPairCache,
    local::{LocalTextCipher, MemoryCryptoInfoRepository},
    negotiation::{NegotiationEndpoint, Responder, ResponderSettings, SessionStore},
};

/// Routes whose paths come from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub negotiation_path: String,
    pub public_key_path: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            negotiation_path: "/security/negotiate".into(),
            public_key_path: "/security/publicKey".into(),
        }
    }
}

/// Application state shared across all request handlers.
///
/// All fields are `Arc`-wrapped or `Arc`-backed so that Axum can clone the
/// state for each request cheaply.
#[derive(Clone)]
pub struct AppState {
    /// EC engine answering key exchanges and public key lookups.
    pub asymmetric: Arc<AsymmetricCipher>,
    pub responder: Responder,
    /// Sessions negotiated by peers with this gateway.
    pub sessions: SessionStore,
    pub local_cipher: Arc<LocalTextCipher>,
    /// Pattern key exchange requests must match.
    pub endpoint: Arc<NegotiationEndpoint>,
    pub routes: Arc<Routes>,
}

impl AppState {
    /// Wire the responder and endpoint around the given engines.
    pub fn new(
        asymmetric: Arc<AsymmetricCipher>,
        local_cipher: Arc<LocalTextCipher>,
        settings: ResponderSettings,
        routes: Routes,
    ) -> Self {
        let sessions = SessionStore::new();
        Self {
            responder: Responder::new(Arc::clone(&asymmetric), sessions.clone(), settings),
            asymmetric,
            sessions,
            local_cipher,
            endpoint: Arc::new(NegotiationEndpoint::new(routes.negotiation_path.clone())),
            routes: Arc::new(routes),
        }
    }
}

impl Default for AppState {
    /// In-memory stores and default routes, suitable for tests.
    fn default() -> Self {
        let asymmetric = AsymmetricCipher::new(
            AsymmetricAlgorithm::Ec,
            Arc::new(MemoryKeyPairCache::new()),
            "default",
        );
        let local_cipher = LocalTextCipher::new(
            "test-app",
            "test-secret",
            Arc::new(MemoryCryptoInfoRepository::new()),
        );
        Self::new(
            Arc::new(asymmetric),
            Arc::new(local_cipher),
            ResponderSettings::default(),
            Routes::default(),
        )
    }
}
