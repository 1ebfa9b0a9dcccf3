use crate::models::DeliveryConfig;
use crate::services::backoff::BackoffPolicy;
use crate::services::dispatcher::DispatcherSettings;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub delivery: DeliverySettings,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliverySettings {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Ceiling for a subscription's `retry_delay_ms`.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_timeout")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub default_retry_attempts: u32,
    #[serde(default = "default_dead_letter_threshold")]
    pub dead_letter_threshold: u32,
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_response_body")]
    pub max_response_body: usize,
    /// Finished deliveries older than this are purged (0 = keep forever).
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            default_timeout_ms: default_timeout(),
            default_retry_attempts: default_retry_attempts(),
            dead_letter_threshold: default_dead_letter_threshold(),
            signature_header: default_signature_header(),
            user_agent: default_user_agent(),
            max_response_body: default_max_response_body(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl DeliverySettings {
    /// Defaults applied to every new subscription before caller overrides.
    pub fn subscription_defaults(&self) -> DeliveryConfig {
        DeliveryConfig {
            timeout_ms: self.default_timeout_ms,
            retry_attempts: self.default_retry_attempts,
            retry_delay_ms: self.base_delay_ms,
            signature_header: self.signature_header.clone(),
            headers: Default::default(),
        }
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            backoff: BackoffPolicy::new(
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            ),
            dead_letter_threshold: self.dead_letter_threshold,
            max_response_body: self.max_response_body,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_payload_version")]
    pub payload_version: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            environment: default_environment(),
            payload_version: default_payload_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    #[serde(default = "default_min_deliveries")]
    pub min_deliveries: usize,
    #[serde(default = "default_max_retry_queue")]
    pub max_retry_queue: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            min_success_rate: default_min_success_rate(),
            min_deliveries: default_min_deliveries(),
            max_retry_queue: default_max_retry_queue(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_tick_interval() -> u64 {
    5
}

fn default_base_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    300_000
}

fn default_timeout() -> u64 {
    10_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_dead_letter_threshold() -> u32 {
    5
}

fn default_signature_header() -> String {
    "X-Webhook-Signature".to_string()
}

fn default_user_agent() -> String {
    format!("webhook-events/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_response_body() -> usize {
    4096
}

fn default_retention_hours() -> u64 {
    168
}

fn default_history_limit() -> usize {
    1000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_payload_version() -> String {
    "1.0".to_string()
}

fn default_health_interval() -> u64 {
    300
}

fn default_min_success_rate() -> f64 {
    90.0
}

fn default_min_deliveries() -> usize {
    10
}

fn default_max_retry_queue() -> usize {
    100
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!(
                "Could not read config file '{}': {}. Run `webhook-events init` to create one.",
                path.display(),
                e
            )
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.delivery;
        if d.tick_interval_secs == 0 {
            anyhow::bail!("delivery.tick_interval_secs must be greater than 0");
        }
        if d.base_delay_ms == 0 {
            anyhow::bail!("delivery.base_delay_ms must be greater than 0");
        }
        if d.base_delay_ms > d.max_delay_ms {
            anyhow::bail!("delivery.base_delay_ms must not exceed delivery.max_delay_ms");
        }
        if d.default_timeout_ms == 0 {
            anyhow::bail!("delivery.default_timeout_ms must be greater than 0");
        }
        if d.default_retry_attempts == 0 {
            anyhow::bail!("delivery.default_retry_attempts must be at least 1");
        }
        if d.dead_letter_threshold == 0 {
            anyhow::bail!("delivery.dead_letter_threshold must be at least 1");
        }
        if d.signature_header.trim().is_empty() {
            anyhow::bail!("delivery.signature_header must not be empty");
        }
        if self.events.history_limit == 0 {
            anyhow::bail!("events.history_limit must be greater than 0");
        }
        if self.health.interval_secs == 0 {
            anyhow::bail!("health.interval_secs must be greater than 0");
        }
        if !(0.0..=100.0).contains(&self.health.min_success_rate) {
            anyhow::bail!("health.min_success_rate must be between 0 and 100");
        }
        Ok(())
    }
}
