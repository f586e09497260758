//! Command-line interface and configuration loading.

use clap::{Parser, Subcommand};

use porter_domain::config::Config;

#[derive(Parser)]
#[command(name = "porterd", version, about = "Condominium concierge gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway server (default).
    Serve,
    /// Configuration helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Check the configuration and environment for problems.
    Validate,
    /// Print the effective configuration as TOML.
    Show,
}

/// Load the configuration from `PORTER_CONFIG` (default `config.toml`).
/// A missing file yields the built-in defaults.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("PORTER_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

/// Validate the configuration. Returns `false` when a problem would
/// degrade the running server.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let mut ok = true;

    println!("config: {config_path}");

    if !config.directory.path.exists() {
        println!(
            "  warn: directory seed {} does not exist — unit lookups will fail",
            config.directory.path.display()
        );
        ok = false;
    }

    if std::env::var(&config.realtime.api_key_env)
        .ok()
        .filter(|k| !k.is_empty())
        .is_none()
    {
        println!(
            "  warn: env var {} is not set — concierge session starts will fail",
            config.realtime.api_key_env
        );
        ok = false;
    }

    if config.concierge.session_max_minutes == 0 {
        println!("  warn: concierge.session_max_minutes is 0 — sessions expire immediately");
        ok = false;
    }
    if config.concierge.approval_timeout_minutes == 0 {
        println!("  warn: concierge.approval_timeout_minutes is 0 — approvals expire immediately");
        ok = false;
    }

    if std::env::var("PORTER_API_TOKEN").ok().filter(|t| !t.is_empty()).is_none() {
        println!("  note: PORTER_API_TOKEN not set — API auth disabled (dev mode)");
    }

    if ok {
        println!("  ok");
    }
    ok
}

/// Print the effective configuration as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => println!("failed to render config: {e}"),
    }
}
