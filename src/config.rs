//! Layered configuration for the CLI sample driver: a `Lime.toml` file on
//! disk, read once at startup. CLI flags given alongside `--config` override
//! individual fields at the call site rather than here (see [`crate::cli`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// The on-disk configuration for the `lime-client` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
#[non_exhaustive]
pub struct Config {
    /// The server's hostname, e.g. `lime.example.com`.
    pub server: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    #[serde(with = "humantime_serde", default = "defaults::connection_timeout")]
    pub connection_timeout: Duration,
    #[serde(with = "humantime_serde", default = "defaults::handshake_timeout")]
    pub handshake_timeout: Duration,
    #[serde(default = "defaults::buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "defaults::auto_reply_pings")]
    pub auto_reply_pings: bool,
    #[serde(default = "defaults::fill_envelope_recipients")]
    pub fill_envelope_recipients: bool,
    #[serde(default)]
    pub trust_certificate: Option<PathBuf>,
}

impl Config {
    pub async fn load(config_path: impl AsRef<Path>) -> Result<Config, anyhow::Error> {
        let mut config: Config =
            toml::from_str(&tokio::fs::read_to_string(&config_path).await?)?;

        if let Some(cert) = &config.trust_certificate {
            if cert.is_relative() {
                if let Some(config_dir) = config_path.as_ref().parent() {
                    config.trust_certificate = Some(config_dir.join(cert));
                }
            }
        }

        Ok(config)
    }

    /// The `net.tcp` URI this configuration connects to.
    pub fn uri(&self) -> String {
        format!("net.tcp://{}:{}", self.server, self.port)
    }
}
