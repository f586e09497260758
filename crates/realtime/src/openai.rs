//! OpenAI Realtime adapter.
//!
//! Mints ephemeral client secrets via `POST /v1/realtime/client_secrets`.
//! The token lets the client establish the WebRTC/WebSocket connection;
//! the session itself outlives the connect window.

use chrono::{TimeZone, Utc};
use serde_json::Value;

use porter_domain::config::RealtimeConfig;
use porter_domain::error::{Error, Result};

use crate::{CredentialIssuer, EphemeralCredential};

/// How long a minted token is assumed valid when the provider response
/// omits an expiry (connect windows are ~60 seconds).
const FALLBACK_TTL_SECS: i64 = 60;

pub struct OpenAiRealtimeIssuer {
    base_url: String,
    api_key: String,
    model: Option<String>,
    client: reqwest::Client,
}

impl OpenAiRealtimeIssuer {
    /// Build the issuer from config. The API key is read from the env
    /// var named by `api_key_env`; a missing key is a config error the
    /// caller may downgrade to the disabled issuer.
    pub fn from_config(cfg: &RealtimeConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config(format!("env var {} is not set", cfg.api_key_env)))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl CredentialIssuer for OpenAiRealtimeIssuer {
    async fn issue(&self, session_id: &str) -> Result<EphemeralCredential> {
        let url = format!("{}/v1/realtime/client_secrets", self.base_url);

        // The endpoint is strict about its body: an empty object is the
        // reliable request; the model is only named when configured.
        let body = match &self.model {
            Some(model) => serde_json::json!({ "session": { "model": model } }),
            None => serde_json::json!({}),
        };

        tracing::debug!(session_id = %session_id, "requesting ephemeral realtime token");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ServiceUnavailable(format!("realtime provider: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            tracing::error!(
                session_id = %session_id,
                status = %status,
                "realtime token request rejected"
            );
            return Err(Error::ServiceUnavailable(format!(
                "realtime provider returned {status}: {detail}"
            )));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| Error::ServiceUnavailable(format!("realtime provider: {e}")))?;

        let credential = parse_client_secret(&payload)?;
        tracing::info!(
            session_id = %session_id,
            expires_at = %credential.expires_at,
            "ephemeral realtime token issued"
        );
        Ok(credential)
    }

    fn provider_id(&self) -> &str {
        "openai-realtime"
    }
}

/// Extract the token and expiry from the provider response. Handles both
/// the wrapped (`client_secret.value`) and flat (`value`) layouts.
fn parse_client_secret(payload: &Value) -> Result<EphemeralCredential> {
    let token = payload
        .pointer("/client_secret/value")
        .or_else(|| payload.get("value"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::ServiceUnavailable("realtime provider response carried no client secret".into())
        })?
        .to_owned();

    let expires_at = payload
        .pointer("/client_secret/expires_at")
        .or_else(|| payload.get("expires_at"))
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(FALLBACK_TTL_SECS));

    Ok(EphemeralCredential { token, expires_at })
}
