use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub concierge: ConciergeConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Per-IP rate limiting. `None` disables it.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default = "d_256")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            cors: CorsConfig::default(),
            rate_limit: None,
            max_concurrent_requests: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. A trailing `:*` matches any port on that host;
    /// a literal `"*"` allows everything (not recommended).
    #[serde(default = "d_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Concierge sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConciergeConfig {
    /// Maximum session age before it is expired as timed out.
    #[serde(default = "d_15")]
    pub session_max_minutes: u32,
    /// How long a resident has to answer before the request is
    /// implicitly denied.
    #[serde(default = "d_15")]
    pub approval_timeout_minutes: u32,
    /// How many prior visits the house-context primer includes.
    #[serde(default = "d_5")]
    pub context_visit_limit: usize,
    /// Capacity of the hub event broadcast channel.
    #[serde(default = "d_64")]
    pub hub_event_buffer: usize,
}

impl Default for ConciergeConfig {
    fn default() -> Self {
        Self {
            session_max_minutes: 15,
            approval_timeout_minutes: 15,
            context_visit_limit: 5,
            hub_event_buffer: 64,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Realtime credential provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "d_realtime_url")]
    pub base_url: String,
    /// Env var holding the provider API key (never stored in the file).
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Optional realtime model requested for the session.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "d_10000")]
    pub timeout_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: d_realtime_url(),
            api_key_env: d_api_key_env(),
            model: None,
            timeout_ms: 10_000,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Directory & persistence paths
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Seeded units/residents directory file.
    #[serde(default = "d_directory_path")]
    pub path: PathBuf,
    /// Root for persisted stores (visits, notifications).
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: d_directory_path(),
            state_path: d_state_path(),
        }
    }
}

// ── serde default helpers ──────────────────────────────────────────

fn d_port() -> u16 {
    8090
}
fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_origins() -> Vec<String> {
    vec!["http://localhost:*".into()]
}
fn d_256() -> usize {
    256
}
fn d_15() -> u32 {
    15
}
fn d_5() -> usize {
    5
}
fn d_64() -> usize {
    64
}
fn d_realtime_url() -> String {
    "https://api.openai.com".into()
}
fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_10000() -> u64 {
    10_000
}
fn d_directory_path() -> PathBuf {
    PathBuf::from("./data/directory.json")
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.port, 8090);
        assert_eq!(cfg.concierge.session_max_minutes, 15);
        assert_eq!(cfg.concierge.approval_timeout_minutes, 15);
        assert!(cfg.server.rate_limit.is_none());
        assert_eq!(cfg.realtime.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [server.rate_limit]
            requests_per_second = 10
            burst_size = 20

            [concierge]
            approval_timeout_minutes = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.rate_limit.unwrap().burst_size, 20);
        assert_eq!(cfg.concierge.approval_timeout_minutes, 5);
        assert_eq!(cfg.concierge.session_max_minutes, 15);
    }
}
