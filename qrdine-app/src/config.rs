//! Application configuration
//!
//! 命令行参数优先，其次环境变量 (`.env` 由 dotenvy 在启动时加载)。

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use qrdine_client::ClientConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Settings shared by every subcommand
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Backend project URL
    #[arg(long, env = "QRDINE_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Public (anon) API key
    #[arg(long, env = "QRDINE_ANON_KEY", global = true, hide_env_values = true)]
    pub anon_key: Option<String>,

    /// Realtime websocket URL (derived from the API URL when absent)
    #[arg(long, env = "QRDINE_REALTIME_URL", global = true)]
    pub realtime_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "QRDINE_TIMEOUT", default_value_t = 30, global = true)]
    pub timeout: u64,

    /// Directory for the menu snapshot cache
    #[arg(long, env = "QRDINE_CACHE_DIR", default_value = ".qrdine/cache", global = true)]
    pub cache_dir: PathBuf,

    #[arg(long, env = "QRDINE_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Write daily-rolling log files here
    #[arg(long, env = "QRDINE_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    #[arg(long, env = "QRDINE_LOG_JSON", default_value_t = false, global = true)]
    pub log_json: bool,

    /// Public address of the ordering app, used in table links
    #[arg(long, env = "QRDINE_APP_URL", default_value = "http://localhost:5173/", global = true)]
    pub app_url: String,

    /// QR image service
    #[arg(
        long,
        env = "QRDINE_QR_SERVICE_URL",
        default_value = "https://api.qrserver.com/v1/create-qr-code/",
        global = true
    )]
    pub qr_service_url: String,

    /// Menu scanner endpoint
    #[arg(long, env = "QRDINE_SCANNER_URL", global = true)]
    pub scanner_url: Option<String>,

    #[arg(long, env = "QRDINE_SCANNER_KEY", global = true, hide_env_values = true)]
    pub scanner_key: Option<String>,
}

impl AppConfig {
    /// Backend client settings; fails when the URL or key is missing
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let api_url = self
            .api_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("QRDINE_API_URL"))?;
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: "QRDINE_API_URL",
                reason: format!("expected an http(s) URL, got {api_url}"),
            });
        }
        let anon_key = self
            .anon_key
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("QRDINE_ANON_KEY"))?;

        let mut config = ClientConfig::new(api_url, anon_key).with_timeout(self.timeout);
        if let Some(url) = self.realtime_url.as_deref().filter(|s| !s.is_empty()) {
            config = config.with_realtime_url(url);
        }
        Ok(config)
    }
}

/// QRDine command line
#[derive(Debug, Parser)]
#[command(name = "qrdine", version, about = "QRDine restaurant ordering client")]
pub struct Cli {
    #[command(flatten)]
    pub config: AppConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Parse a table link and show how it resolves (offline)
    Resolve { url: String },

    /// Open a location against the backend and print the landing view
    Open {
        url: String,
        #[arg(long, env = "QRDINE_EMAIL")]
        email: Option<String>,
        #[arg(long, env = "QRDINE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Follow live orders and requests of a restaurant
    Watch {
        restaurant_id: String,
        #[arg(long, env = "QRDINE_EMAIL")]
        email: Option<String>,
        #[arg(long, env = "QRDINE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Build the table link and QR image URL for a table
    QrLink {
        restaurant_id: String,
        table_id: String,
        table_number: i32,
        #[arg(long, default_value_t = 300)]
        size: u32,
    },

    /// Scan a menu photo and print the reviewed candidates
    Scan {
        image: PathBuf,
        #[arg(long)]
        restaurant_id: String,
    },

    /// Run an in-memory guest/staff walkthrough
    Demo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_client_config_requires_url_and_key() {
        let cli = parse(&["qrdine", "--api-url", "https://abc.example.co", "demo"]);
        assert!(matches!(
            cli.config.client_config(),
            Err(ConfigError::Missing("QRDINE_ANON_KEY"))
        ));

        let cli = parse(&[
            "qrdine",
            "--api-url",
            "https://abc.example.co",
            "--anon-key",
            "anon",
            "--timeout",
            "5",
            "demo",
        ]);
        let config = cli.config.client_config().unwrap();
        assert_eq!(config.timeout, 5);
        assert_eq!(config.api_key, "anon");
    }

    #[test]
    fn test_rejects_non_http_url() {
        let cli = parse(&["qrdine", "--api-url", "abc.example.co", "--anon-key", "k", "demo"]);
        assert!(matches!(
            cli.config.client_config(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_subcommands() {
        let cli = parse(&["qrdine", "qr-link", "r-1", "t-1", "5", "--size", "200"]);
        assert!(matches!(
            cli.command,
            Command::QrLink { table_number: 5, size: 200, .. }
        ));

        let cli = parse(&["qrdine", "resolve", "https://x.test/?rid=R1"]);
        assert!(matches!(cli.command, Command::Resolve { .. }));
    }
}
