use std::{collections::HashMap, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::domain::models::PaymentRequestParams;
use crate::domain::poller::PollerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub poll: PollConfig,
    pub request: RequestConfig,
    pub issuer: IssuerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where the key issuance API lives, as seen by the requester.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    pub interval_ms: u64,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl From<&PollConfig> for PollerConfig {
    fn from(value: &PollConfig) -> Self {
        PollerConfig {
            interval: Duration::from_millis(value.interval_ms),
            max_attempts: value.max_attempts,
        }
    }
}

/// Defaults for the key request binary.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    pub days: u32,
    #[serde(default)]
    pub renew_key: Option<String>,
}

impl From<&RequestConfig> for PaymentRequestParams {
    fn from(value: &RequestConfig) -> Self {
        let params = PaymentRequestParams::new(value.days);
        match &value.renew_key {
            Some(key) => params.renewing(key.clone()),
            None => params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuerConfig {
    pub qr_base_url: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("server.host", "localhost")?
            .set_default("server.port", 3000)?
            .set_default("api.base_url", "http://localhost:3000")?
            .set_default("api.timeout_secs", 10)?
            .set_default("poll.interval_ms", 2000)?
            .set_default("request.days", 365)?
            .set_default("issuer.qr_base_url", "https://xumm.app/sign")?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format APP_API__BASE_URL or APP_POLL__INTERVAL_MS
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        let config: Self = builder.build()?.try_deserialize()?;
        PollerConfig::from(&config.poll)
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}
