//! Client configuration
//!
//! Defaults, then an optional `telestream.toml`, then `TELESTREAM_*`
//! environment variables.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the signaling registry
    pub api_url: String,
    /// Seconds to wait for the first video track
    pub startup_timeout_secs: u64,
}

impl ClientConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default("startup_timeout_secs", DEFAULT_STARTUP_TIMEOUT_SECS)?;

        let builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name("telestream").required(false)),
        };

        let config = builder
            .add_source(config::Environment::with_prefix("TELESTREAM").try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
        }
    }
}
