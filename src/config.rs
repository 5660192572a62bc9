use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Environment variables honoured on top of the layered config sources.
pub const REGISTRATION_KEY_ENV: &str = "SERVICE_REGISTRATION_KEY";
pub const ADMIN_KEY_ENV: &str = "ADMIN_API_KEY";
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BeaconConfig {
    #[serde(default)]
    pub registration_key: Option<String>,
    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub health: HealthCheckConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3002,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub ttl_ms: u64,
    pub scheme: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            batch_size: 100,
            max_concurrent: 10,
            ttl_ms: 2_000,
            scheme: "https".to_string(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl BeaconConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut config: Self = Config::builder()
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("BEACON").separator("__"))
            .build()?
            .try_deserialize()?;

        config.apply_well_known_env()?;
        Ok(config)
    }

    /// Overlays the canonical deployment variables over whatever the layered
    /// sources produced. These names predate the prefixed scheme and remain
    /// the documented contract.
    fn apply_well_known_env(&mut self) -> Result<(), ConfigError> {
        if let Some(key) = non_empty_env(REGISTRATION_KEY_ENV) {
            self.registration_key = Some(key);
        }
        if let Some(key) = non_empty_env(ADMIN_KEY_ENV) {
            self.admin_key = Some(key);
        }
        if let Some(port) = non_empty_env(PORT_ENV) {
            self.http.port = port.parse().map_err(|_| {
                ConfigError::Message(format!("{PORT_ENV} must be a valid port, found `{port}`"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.registration_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::Message(format!(
                "{REGISTRATION_KEY_ENV} must be set to a non-empty shared secret"
            ))),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
