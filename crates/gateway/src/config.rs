//! Configuration loading and validation for the crypto gateway.
//!
//! All values are read from environment variables at startup. The process
//! exits with a clear error message if any required variable is missing or
//! invalid.

use anyhow::{Context, Result};
use serde::Deserialize;
use shoulder_crypto::symmetric::{Mode, SymmetricAlgorithm};

/// Backend for key pairs or crypto meta info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    File,
    Sqlite,
}

/// Validated gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application id the local cipher keys are stored under. **Required.**
    pub app_id: String,

    /// Secret the local root key is derived from. **Required.**
    pub local_crypto_secret: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Route (and endpoint pattern) accepting key exchange requests.
    #[serde(default = "default_negotiation_path")]
    pub negotiation_path: String,

    /// Route serving the responder public key.
    #[serde(default = "default_public_key_path")]
    pub public_key_path: String,

    /// Lifetime of a negotiated session, seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Accepted clock difference on key exchange requests, seconds.
    #[serde(default = "default_max_clock_skew")]
    pub max_clock_skew_secs: u64,

    /// Transport cipher name; must be a CBC variant.
    #[serde(default = "default_transport_algorithm")]
    pub transport_algorithm: String,

    #[serde(default = "default_transport_key_bits")]
    pub transport_key_bits: u16,

    #[serde(default = "default_key_pair_id")]
    pub default_key_pair_id: String,

    #[serde(default = "default_store")]
    pub key_pair_store: StoreKind,

    /// Directory (file) or database path (sqlite). Required unless `memory`.
    #[serde(default)]
    pub key_pair_store_path: Option<String>,

    #[serde(default = "default_store")]
    pub crypto_info_store: StoreKind,

    #[serde(default)]
    pub crypto_info_store_path: Option<String>,

    /// Base URL of a peer gateway to negotiate with at startup.
    #[serde(default)]
    pub peer_base_url: Option<String>,

    /// HTTP client timeout for outgoing negotiation, seconds.
    #[serde(default = "default_negotiation_timeout")]
    pub negotiation_timeout_secs: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP collector endpoint; span export is disabled when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

fn default_listen_port() -> u16 {
    8080
}
fn default_negotiation_path() -> String {
    "/security/negotiate".into()
}
fn default_public_key_path() -> String {
    "/security/publicKey".into()
}
fn default_session_ttl() -> u64 {
    1800
}
fn default_max_clock_skew() -> u64 {
    300
}
fn default_transport_algorithm() -> String {
    "AES/CBC/PKCS5Padding".into()
}
fn default_transport_key_bits() -> u16 {
    256
}
fn default_key_pair_id() -> String {
    "default".into()
}
fn default_store() -> StoreKind {
    StoreKind::Memory
}
fn default_negotiation_timeout() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// The transport cipher described by `TRANSPORT_ALGORITHM` / `TRANSPORT_KEY_BITS`.
    pub fn transport_algorithm(&self) -> Result<SymmetricAlgorithm> {
        let algorithm =
            SymmetricAlgorithm::parse(&self.transport_algorithm, self.transport_key_bits)
                .context("TRANSPORT_ALGORITHM / TRANSPORT_KEY_BITS invalid")?;
        if algorithm.mode != Mode::Cbc {
            anyhow::bail!("TRANSPORT_ALGORITHM must be a CBC cipher, got {algorithm}");
        }
        Ok(algorithm)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.app_id, "APP_ID")?;
        ensure_non_empty(&self.local_crypto_secret, "LOCAL_CRYPTO_SECRET")?;
        ensure_non_empty(&self.default_key_pair_id, "DEFAULT_KEY_PAIR_ID")?;
        ensure_path(&self.negotiation_path, "NEGOTIATION_PATH")?;
        ensure_path(&self.public_key_path, "PUBLIC_KEY_PATH")?;
        if self.negotiation_path == self.public_key_path {
            anyhow::bail!("NEGOTIATION_PATH and PUBLIC_KEY_PATH must differ");
        }

        if self.session_ttl_secs == 0 {
            anyhow::bail!("SESSION_TTL_SECS must be > 0");
        }
        if self.negotiation_timeout_secs == 0 {
            anyhow::bail!("NEGOTIATION_TIMEOUT_SECS must be > 0");
        }
        self.transport_algorithm()?;

        if self.key_pair_store != StoreKind::Memory {
            ensure_non_empty(
                self.key_pair_store_path.as_deref().unwrap_or_default(),
                "KEY_PAIR_STORE_PATH",
            )?;
        }
        if self.crypto_info_store != StoreKind::Memory {
            ensure_non_empty(
                self.crypto_info_store_path.as_deref().unwrap_or_default(),
                "CRYPTO_INFO_STORE_PATH",
            )?;
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

fn ensure_path(value: &str, name: &str) -> Result<()> {
    if !value.starts_with('/') || value.contains('*') {
        anyhow::bail!("{name} must be a concrete absolute path, got {value:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            app_id: "demo-app".into(),
            local_crypto_secret: "s3cret".into(),
            listen_port: default_listen_port(),
            negotiation_path: default_negotiation_path(),
            public_key_path: default_public_key_path(),
            session_ttl_secs: default_session_ttl(),
            max_clock_skew_secs: default_max_clock_skew(),
            transport_algorithm: default_transport_algorithm(),
            transport_key_bits: default_transport_key_bits(),
            default_key_pair_id: default_key_pair_id(),
            key_pair_store: StoreKind::Memory,
            key_pair_store_path: None,
            crypto_info_store: StoreKind::Memory,
            crypto_info_store_path: None,
            peer_base_url: None,
            negotiation_timeout_secs: default_negotiation_timeout(),
            log_level: default_log_level(),
            otel_exporter_otlp_endpoint: None,
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_listen_port(), 8080);
        assert_eq!(default_negotiation_path(), "/security/negotiate");
        assert_eq!(default_public_key_path(), "/security/publicKey");
        assert_eq!(default_session_ttl(), 1800);
        assert_eq!(default_max_clock_skew(), 300);
        assert_eq!(default_store(), StoreKind::Memory);
        assert_eq!(default_log_level(), "info");
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_secret() {
        let cfg = Config {
            local_crypto_secret: " ".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_cbc_transport() {
        let cfg = Config {
            transport_algorithm: "AES/ECB/PKCS5Padding".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            transport_key_bits: 100,
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn persistent_store_needs_path() {
        let cfg = Config {
            key_pair_store: StoreKind::Sqlite,
            ..valid()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            key_pair_store: StoreKind::Sqlite,
            key_pair_store_path: Some("/var/lib/gw/keys.db".into()),
            ..valid()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn wildcard_route_rejected() {
        let cfg = Config {
            negotiation_path: "/security/**".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }
}
