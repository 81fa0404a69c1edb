//! Outgoing side of the gateway: negotiating with a peer over HTTP and
//! sending it transport-encrypted requests.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use common::{
    protocol::{
        KeyExchangeRequest, KeyExchangeResponse, DATA_KEY_HEADER, KEY_EXCHANGE_HEADER,
        SESSION_ID_HEADER, SUCCESS_CODE,
    },
    ResponseEnvelope,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use shoulder_crypto::{
    negotiation::{KeyExchangeResult, NegotiationError, NegotiationTransport},
    transport::{unwrap_data_key, wrap_data_key, DataKey, TransportCipher},
};
use tracing::debug;

/// [`NegotiationTransport`] backed by a [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpNegotiationTransport {
    http: Client,
}

impl HttpNegotiationTransport {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }

    /// POST `plaintext` to a peer's `/secure/echo` under `session` and return
    /// the decrypted reply.
    ///
    /// A fresh data key is generated per call and sent wrapped in `X-Dk`; the
    /// reply is decrypted with the key the peer returns in its own `X-Dk`.
    pub async fn secure_echo(
        &self,
        url: &str,
        session: Arc<KeyExchangeResult>,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let data_key = DataKey::generate(session.key_length())?;
        let x_dk = wrap_data_key(&session, &data_key)?;
        let body = TransportCipher::encryptor(Arc::clone(&session), data_key).encrypt(plaintext)?;

        let resp = self
            .http
            .post(url)
            .header(SESSION_ID_HEADER, session.x_session_id())
            .header(DATA_KEY_HEADER, x_dk)
            .body(body)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;
        let reply_dk = resp
            .headers()
            .get(DATA_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let envelope: ResponseEnvelope<String> = resp
            .json()
            .await
            .context("secure echo returned an unreadable body")?;
        if !envelope.is_success() {
            anyhow::bail!("secure echo rejected ({}): {}", envelope.code, envelope.msg);
        }
        let payload = envelope
            .data
            .context("secure echo returned no payload")?;
        let reply_dk = reply_dk.context("secure echo reply carries no data key")?;
        let reply_key = unwrap_data_key(&session, &reply_dk)?;
        Ok(TransportCipher::decryptor(session, reply_key).decrypt(&payload)?)
    }
}

impl NegotiationTransport for HttpNegotiationTransport {
    async fn exchange(
        &self,
        url: &str,
        request: &KeyExchangeRequest,
    ) -> Result<KeyExchangeResponse, NegotiationError> {
        debug!(url, "sending key exchange request");
        let resp = self
            .http
            .post(url)
            .header(KEY_EXCHANGE_HEADER, "true")
            .json(request)
            .send()
            .await
            .map_err(|e| NegotiationError::Unreachable(format!("{url}: {e}")))?;
        read_envelope(resp).await
    }

    async fn fetch_public_key(&self, url: &str) -> Result<String, NegotiationError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| NegotiationError::Unreachable(format!("{url}: {e}")))?;
        read_envelope(resp).await
    }
}

async fn read_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, NegotiationError> {
    let status = resp.status();
    let ResponseEnvelope { code, msg, data } = resp
        .json::<ResponseEnvelope<T>>()
        .await
        .map_err(|e| NegotiationError::Rejected {
            code: status.as_u16().to_string(),
            msg: format!("unreadable response body: {e}"),
        })?;
    if code != SUCCESS_CODE {
        return Err(NegotiationError::Rejected { code, msg });
    }
    data.ok_or_else(|| NegotiationError::Rejected {
        code,
        msg: "response envelope carries no data".into(),
    })
}
