use std::sync::Arc;

use porter_concierge::ConciergeService;
use porter_directory::{NotificationStore, UnitDirectory, VisitStore};
use porter_domain::config::Config;

use crate::hub::registry::HubRegistry;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Concierge core ────────────────────────────────────────────
    pub concierge: Arc<ConciergeService>,

    // ── Stores ────────────────────────────────────────────────────
    pub directory: Arc<UnitDirectory>,
    pub visits: Arc<VisitStore>,
    pub notifications: Arc<NotificationStore>,

    // ── Hubs ──────────────────────────────────────────────────────
    pub hubs: Arc<HubRegistry>,

    // ── Security (startup-computed) ───────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
