//! Application state construction and background loops.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use porter_concierge::ConciergeService;
use porter_directory::{NotificationStore, UnitDirectory, VisitStore};
use porter_domain::config::Config;
use porter_realtime::{CredentialIssuer, DisabledIssuer, OpenAiRealtimeIssuer};

use crate::hub::registry::HubRegistry;
use crate::state::AppState;

/// Build the shared application state: stores, credential issuer, and
/// the concierge core.
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let directory = Arc::new(UnitDirectory::load(&config.directory.path)?);
    let visits = Arc::new(VisitStore::new(&config.directory.state_path)?);
    let notifications = Arc::new(NotificationStore::new(&config.directory.state_path));

    // No API key is a degraded mode, not a startup failure: session
    // starts fail with ServiceUnavailable while everything else works.
    let issuer: Arc<dyn CredentialIssuer> =
        match OpenAiRealtimeIssuer::from_config(&config.realtime) {
            Ok(issuer) => Arc::new(issuer),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "realtime issuer not configured — concierge session starts will fail"
                );
                Arc::new(DisabledIssuer)
            }
        };

    let concierge = Arc::new(ConciergeService::new(
        config.concierge.clone(),
        Arc::clone(&directory),
        Arc::clone(&visits),
        Arc::clone(&notifications),
        issuer,
    ));

    let api_token_hash = std::env::var("PORTER_API_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .map(|t| Sha256::digest(t.as_bytes()).to_vec());
    if api_token_hash.is_none() {
        tracing::warn!("PORTER_API_TOKEN not set — API auth disabled (dev mode)");
    }

    Ok(AppState {
        config,
        concierge,
        directory,
        visits,
        notifications,
        hubs: Arc::new(HubRegistry::new()),
        api_token_hash,
    })
}

/// Spawn the periodic maintenance loops.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Approval + session expiry sweep ──────────────────────────────
    {
        let concierge = state.concierge.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                concierge.sweep(chrono::Utc::now()).await;
            }
        });
    }

    // ── Stale hub pruning ────────────────────────────────────────────
    {
        let hubs = state.hubs.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                hubs.prune_stale(120);
            }
        });
    }
}
