//! Configuration management
//!
//! Layers, lowest priority first: built-in defaults, an optional TOML file,
//! then `TELEPHONY__SECTION__KEY` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::shared::{Result, TelephonyError};

const ENV_PREFIX: &str = "TELEPHONY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub polling: PollingConfig,
    pub keys: KeysConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: Option<SessionConfig>,
}

/// GraphQL endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    pub api_url: String,
    pub realtime_url: String,
    pub region: String,
    pub request_timeout_secs: u64,
}

/// Object store used for MMS media
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub region: String,
    pub bucket: String,
    /// Bucket outgoing media is uploaded to before sending
    pub transient_bucket: String,
    /// Custom S3-compatible endpoint, e.g. a local MinIO
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Polling of long running backend operations (number search, provisioning)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeysConfig {
    /// Prefix of every key store entry
    pub namespace: String,
    /// Directory of the file key store; keys stay in memory when unset
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive
    pub filter: String,
}

/// Static credentials for the bundled binary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub access_token: String,
    pub subject: String,
    pub identity_id: String,
    /// Pre-signed ownership proof, only needed to provision numbers
    #[serde(default)]
    pub ownership_proof: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                api_url: "http://localhost:4000/graphql".to_string(),
                realtime_url: "ws://localhost:4000/graphql/realtime".to_string(),
                region: "us-east-1".to_string(),
                request_timeout_secs: 30,
            },
            storage: StorageConfig {
                region: "us-east-1".to_string(),
                bucket: "telephony-media".to_string(),
                transient_bucket: "telephony-media-transient".to_string(),
                endpoint: None,
            },
            polling: PollingConfig {
                interval_ms: 1000,
                max_attempts: 60,
            },
            keys: KeysConfig {
                namespace: "tel".to_string(),
                store_dir: None,
            },
            logging: LoggingConfig {
                filter: "info".to_string(),
            },
            session: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, `path` and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default()).map_err(invalid)?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(invalid)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let api = url::Url::parse(&self.api.api_url)
            .map_err(|e| TelephonyError::InvalidConfig(format!("api.api_url: {}", e)))?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(TelephonyError::InvalidConfig(format!(
                "api.api_url must be http(s), got {}",
                api.scheme()
            )));
        }

        let realtime = url::Url::parse(&self.api.realtime_url)
            .map_err(|e| TelephonyError::InvalidConfig(format!("api.realtime_url: {}", e)))?;
        if !matches!(realtime.scheme(), "ws" | "wss") {
            return Err(TelephonyError::InvalidConfig(format!(
                "api.realtime_url must be ws(s), got {}",
                realtime.scheme()
            )));
        }

        if self.storage.transient_bucket.is_empty() {
            return Err(TelephonyError::InvalidConfig(
                "storage.transient_bucket is empty".to_string(),
            ));
        }
        if self.polling.max_attempts == 0 {
            return Err(TelephonyError::InvalidConfig(
                "polling.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.keys.namespace.is_empty() {
            return Err(TelephonyError::InvalidConfig(
                "keys.namespace is empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    /// Default configuration rendered as TOML, a starting point for a config file
    pub fn sample_toml() -> Result<String> {
        toml::to_string_pretty(&Config::default()).map_err(|e| {
            TelephonyError::InvalidConfig(format!("cannot render configuration: {}", e))
        })
    }
}

fn invalid(e: config::ConfigError) -> TelephonyError {
    TelephonyError::InvalidConfig(e.to_string())
}
