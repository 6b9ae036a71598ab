use std::time::Duration;

use anyhow::{Context, Error};
use config::Config;

use crate::domain::FailurePolicy;

#[derive(Debug, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Watch a single namespace instead of the whole cluster.
    pub namespace: Option<String>,
    pub listen_address: String,
    pub failure_policy: FailurePolicy,
    pub resync_interval_secs: Option<u64>,
    pub error_backoff_secs: u64,
    pub conflict_backoff_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            listen_address: "0.0.0.0:3000".to_string(),
            failure_policy: FailurePolicy::BestEffort,
            resync_interval_secs: None,
            error_backoff_secs: 15,
            conflict_backoff_secs: 1,
        }
    }
}

impl AppConfig {
    pub fn resync_interval(&self) -> Option<Duration> {
        self.resync_interval_secs.map(Duration::from_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn conflict_backoff(&self) -> Duration {
        Duration::from_secs(self.conflict_backoff_secs)
    }
}

pub fn load_config() -> Result<AppConfig, Error> {
    let config = Config::builder()
        .add_source(config::Environment::with_prefix("applicationmgr").try_parsing(true))
        .build()
        .context("Can't load configuration")?;

    config
        .try_deserialize()
        .context("Can't deserialize AppConfig from loaded configuration")
}
