//! Process configuration (§6 configuration table), loaded via the `config`
//! crate from environment variables (prefix `BTD_`) with file-based
//! defaults layered underneath. Missing or malformed required keys are
//! fatal at boot, never discovered mid-request.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct CachingSettings {
    #[serde(default = "default_caching_enabled")]
    pub enabled: bool,
    #[serde(default = "default_caching_expiration_sec")]
    pub expiration_sec: u64,
}

fn default_caching_enabled() -> bool {
    true
}

fn default_caching_expiration_sec() -> u64 {
    300
}

impl Default for CachingSettings {
    fn default() -> Self {
        CachingSettings {
            enabled: default_caching_enabled(),
            expiration_sec: default_caching_expiration_sec(),
        }
    }
}

impl CachingSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.expiration_sec)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_days_before_expiry")]
    pub default_days_before_expiry: i64,
    #[serde(default = "default_issuer_valid_days")]
    pub default_issuer_valid_days: i64,
    #[serde(default = "default_v3_buffer")]
    pub v3_buffer: usize,
    #[serde(default = "default_v3_key_duration_days")]
    pub v3_key_duration_days: i64,
    #[serde(default = "default_rotation_interval_sec")]
    pub rotation_interval_sec: u64,
    #[serde(default)]
    pub caching: CachingSettings,
    #[serde(default)]
    pub dynamodb_endpoint: Option<String>,
    pub db_connection_uri: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connection: u32,
}

fn default_listen_port() -> u16 {
    2416
}

fn default_metrics_port() -> u16 {
    2417
}

fn default_max_tokens() -> usize {
    100
}

fn default_days_before_expiry() -> i64 {
    7
}

fn default_issuer_valid_days() -> i64 {
    30
}

fn default_v3_buffer() -> usize {
    2
}

fn default_v3_key_duration_days() -> i64 {
    7
}

fn default_rotation_interval_sec() -> u64 {
    3600
}

impl Settings {
    pub fn v3_key_duration(&self) -> time::Duration {
        time::Duration::days(self.v3_key_duration_days)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_sec)
    }
}

fn default_max_connections() -> u32 {
    10
}

impl Settings {
    /// Loads settings from (in ascending priority) `config/default.toml`,
    /// an optional `config/local.toml`, and `BTD_`-prefixed environment
    /// variables, mirroring the layering the teacher's own deployment
    /// config uses.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("BTD").separator("__"));

        let settings: Settings = builder
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "<config>",
                reason: e.to_string(),
            })?
            .try_deserialize()
            .map_err(|e| ConfigError::Invalid {
                key: "<config>",
                reason: e.to_string(),
            })?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_port == self.metrics_port {
            return Err(ConfigError::Invalid {
                key: "metrics_port",
                reason: "must differ from listen_port".into(),
            });
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                key: "max_tokens",
                reason: "must be greater than zero".into(),
            });
        }
        #[cfg(feature = "postgres")]
        if self.db_connection_uri.is_none() {
            return Err(ConfigError::MissingKey("db_connection_uri"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_matching_listen_and_metrics_ports() {
        let settings = Settings {
            listen_port: 2416,
            metrics_port: 2416,
            max_tokens: 100,
            default_days_before_expiry: 7,
            default_issuer_valid_days: 30,
            v3_buffer: default_v3_buffer(),
            v3_key_duration_days: default_v3_key_duration_days(),
            rotation_interval_sec: default_rotation_interval_sec(),
            caching: CachingSettings::default(),
            dynamodb_endpoint: None,
            db_connection_uri: Some("postgres://localhost/test".into()),
            max_connection: 10,
        };
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_zero_max_tokens() {
        let settings = Settings {
            listen_port: 2416,
            metrics_port: 2417,
            max_tokens: 0,
            default_days_before_expiry: 7,
            default_issuer_valid_days: 30,
            v3_buffer: default_v3_buffer(),
            v3_key_duration_days: default_v3_key_duration_days(),
            rotation_interval_sec: default_rotation_interval_sec(),
            caching: CachingSettings::default(),
            dynamodb_endpoint: None,
            db_connection_uri: Some("postgres://localhost/test".into()),
            max_connection: 10,
        };
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid { .. })));
    }
}
