use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

/// Default EVM JSON-RPC endpoint used for contract-wallet signature checks.
pub const DEFAULT_RPC_URL: &str = "https://mainnet.base.org";

/// Default nonce sweep period (10 minutes).
pub const DEFAULT_NONCE_SWEEP_INTERVAL_SECS: u64 = 600;

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!(
                "LOG_FORMAT must be 'text' or 'json', got '{}'",
                other
            )),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// EVM JSON-RPC URL used to inspect and simulate contract wallets
    pub rpc_url: String,

    /// Socket address the API server binds to
    pub bind_addr: SocketAddr,

    /// Nonce sweep period in seconds (0 disables the sweep)
    pub nonce_sweep_interval_secs: u64,

    /// Apply EIP-4361 address and validity-window checks to parseable messages
    pub siwe_strict: bool,

    /// Log output format
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            rpc_url: std::env::var("RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string()),
            bind_addr: std::env::var("BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BIND_ADDR must be a valid socket address"))?,
            nonce_sweep_interval_secs: std::env::var("NONCE_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| DEFAULT_NONCE_SWEEP_INTERVAL_SECS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NONCE_SWEEP_INTERVAL_SECS must be a valid u64"))?,
            siwe_strict: std::env::var("SIWE_STRICT")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SIWE_STRICT must be 'true' or 'false'"))?,
            log_format: std::env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "text".to_string())
                .parse()?,
        })
    }

    /// Sweep interval as a `Duration`, or `None` when sweeping is disabled.
    pub fn nonce_sweep_interval(&self) -> Option<Duration> {
        match self.nonce_sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            nonce_sweep_interval_secs: DEFAULT_NONCE_SWEEP_INTERVAL_SECS,
            siwe_strict: true,
            log_format: LogFormat::Text,
        }
    }
}
