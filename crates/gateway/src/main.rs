//! `crypto-gateway`: binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (OTEL + tracing).
//! 3. Open the key-pair cache and make sure the default key pair exists.
//! 4. Open the crypto info repository and load the local cipher keys.
//! 5. Build the Axum router.
//! 6. Bind the listener; optionally negotiate with a configured peer.
//! 7. Serve until Ctrl-C.

mod client;
mod config;
mod server;
mod telemetry;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use shoulder_crypto::{
    asymmetric::{AsymmetricAlgorithm, AsymmetricCipher},
    keypair::{FileKeyPairCache, KeyPairCache, MemoryKeyPairCache, SqliteKeyPairCache},
    local::{
        CryptoInfoRepository, FileCryptoInfoRepository, LocalTextCipher,
        MemoryCryptoInfoRepository, SqliteCryptoInfoRepository,
    },
    negotiation::{Initiator, NegotiationEndpoint, ResponderSettings, SessionStore},
};
use tracing::{error, info, warn};

use client::HttpNegotiationTransport;
use config::{Config, StoreKind};
use server::state::{AppState, Routes};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.listen_port,
        app_id = %cfg.app_id,
        "crypto-gateway starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key pairs
    // -----------------------------------------------------------------------
    let asymmetric = Arc::new(AsymmetricCipher::new(
        AsymmetricAlgorithm::Ec,
        open_key_pair_cache(&cfg)?,
        cfg.default_key_pair_id.clone(),
    ));
    asymmetric
        .public_key(None)
        .context("failed to load or generate the default key pair")?;
    info!(
        key_pair_id = asymmetric.default_key_pair_id(),
        store = ?cfg.key_pair_store,
        "default key pair ready"
    );

    // -----------------------------------------------------------------------
    // 4. Local text cipher
    // -----------------------------------------------------------------------
    let local_cipher = Arc::new(LocalTextCipher::new(
        cfg.app_id.clone(),
        cfg.local_crypto_secret.as_bytes(),
        open_crypto_info_repository(&cfg)?,
    ));
    local_cipher
        .ensure_init()
        .context("failed to initialise local cipher keys")?;
    info!(
        mark_headers = ?local_cipher.mark_headers(),
        store = ?cfg.crypto_info_store,
        "local cipher ready"
    );

    // -----------------------------------------------------------------------
    // 5. Router
    // -----------------------------------------------------------------------
    let settings = ResponderSettings {
        session_ttl: Duration::from_secs(cfg.session_ttl_secs),
        max_clock_skew: Duration::from_secs(cfg.max_clock_skew_secs),
    };
    let routes = Routes {
        negotiation_path: cfg.negotiation_path.clone(),
        public_key_path: cfg.public_key_path.clone(),
    };
    let state = AppState::new(asymmetric, local_cipher, settings, routes);
    let router = server::router::build(state);

    // -----------------------------------------------------------------------
    // 6. Listener and peer negotiation
    // -----------------------------------------------------------------------
    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    if let Some(peer) = cfg.peer_base_url.clone() {
        let _peer_check = tokio::spawn(negotiate_with_peer(cfg.clone(), peer));
    }

    // -----------------------------------------------------------------------
    // 7. Serve
    // -----------------------------------------------------------------------
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("crypto-gateway stopped");
    telemetry::shutdown_telemetry();
    Ok(())
}

fn open_key_pair_cache(cfg: &Config) -> Result<Arc<dyn KeyPairCache>> {
    let path = cfg.key_pair_store_path.as_deref().unwrap_or_default();
    Ok(match cfg.key_pair_store {
        StoreKind::Memory => Arc::new(MemoryKeyPairCache::new()),
        StoreKind::File => Arc::new(
            FileKeyPairCache::open(path)
                .with_context(|| format!("failed to open key pair directory {path}"))?,
        ),
        StoreKind::Sqlite => Arc::new(
            SqliteKeyPairCache::open(path)
                .with_context(|| format!("failed to open key pair database {path}"))?,
        ),
    })
}

fn open_crypto_info_repository(cfg: &Config) -> Result<Arc<dyn CryptoInfoRepository>> {
    let path = cfg.crypto_info_store_path.as_deref().unwrap_or_default();
    Ok(match cfg.crypto_info_store {
        StoreKind::Memory => {
            warn!("crypto info kept in memory; local ciphertext will not survive a restart");
            Arc::new(MemoryCryptoInfoRepository::new())
        }
        StoreKind::File => Arc::new(
            FileCryptoInfoRepository::open(path)
                .with_context(|| format!("failed to open crypto info directory {path}"))?,
        ),
        StoreKind::Sqlite => Arc::new(
            SqliteCryptoInfoRepository::open(path)
                .with_context(|| format!("failed to open crypto info database {path}"))?,
        ),
    })
}

/// Negotiate a session with `peer` and probe it with one secure echo.
///
/// Failures are logged; the gateway keeps serving either way.
async fn negotiate_with_peer(cfg: Config, peer: String) {
    if let Err(e) = try_negotiate_with_peer(&cfg, &peer).await {
        error!(peer = %peer, error = %format!("{e:#}"), "peer negotiation failed");
    }
}

async fn try_negotiate_with_peer(cfg: &Config, peer: &str) -> Result<()> {
    let base = peer.trim_end_matches('/');
    let transport =
        HttpNegotiationTransport::new(Duration::from_secs(cfg.negotiation_timeout_secs))?;
    let initiator = Initiator::new(
        transport.clone(),
        NegotiationEndpoint::new(cfg.negotiation_path.clone()),
        SessionStore::new(),
        cfg.transport_algorithm()?,
    );

    let session = initiator
        .discover_and_negotiate(
            &format!("{base}{}", cfg.negotiation_path),
            &format!("{base}{}", cfg.public_key_path),
            None,
        )
        .await?;

    let probe = cfg.app_id.as_bytes();
    let reply = transport
        .secure_echo(&format!("{base}/secure/echo"), Arc::clone(&session), probe)
        .await?;
    if reply != probe {
        anyhow::bail!("secure echo reply does not match the probe");
    }
    info!(
        peer = base,
        x_session_id = session.x_session_id(),
        expire_time = session.expire_time(),
        "peer session verified"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
