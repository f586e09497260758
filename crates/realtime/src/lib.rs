//! Realtime credential issuing.
//!
//! The concierge never touches media bytes: it only mints a short-lived
//! credential that lets the kiosk/web client open an audio connection
//! directly with the realtime model provider. The issuer is the one
//! outbound-network seam of the core, kept behind a trait so tests can
//! substitute a stub.

use chrono::{DateTime, Utc};

use porter_domain::error::Result;

pub mod openai;

pub use openai::OpenAiRealtimeIssuer;

/// A short-lived credential bound to one concierge session.
#[derive(Debug, Clone)]
pub struct EphemeralCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints ephemeral realtime connection credentials.
#[async_trait::async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Request a credential scoped to `session_id`. Unreachable or
    /// failing providers surface as `Error::ServiceUnavailable`.
    async fn issue(&self, session_id: &str) -> Result<EphemeralCredential>;

    /// A unique identifier for this issuer instance.
    fn provider_id(&self) -> &str;
}

/// Fallback issuer used when no provider API key is configured: every
/// session start fails cleanly as ServiceUnavailable instead of the
/// server refusing to boot. Dev mode: the rest of the API still works.
pub struct DisabledIssuer;

#[async_trait::async_trait]
impl CredentialIssuer for DisabledIssuer {
    async fn issue(&self, _session_id: &str) -> Result<EphemeralCredential> {
        Err(porter_domain::Error::ServiceUnavailable(
            "realtime credential issuer is not configured".into(),
        ))
    }

    fn provider_id(&self) -> &str {
        "disabled"
    }
}
