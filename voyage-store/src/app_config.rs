use serde::Deserialize;
use std::env;
use voyage_payment::GatewayConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    pub payment: GatewayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_hold_window")]
    pub hold_window_seconds: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch_size: i64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_hold_window() -> i64 { voyage_core::booking::DEFAULT_HOLD_WINDOW_SECONDS }
fn default_sweep_interval() -> u64 { 60 }
fn default_sweep_batch() -> i64 { 200 }
fn default_rate_limit() -> i64 { 100 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            hold_window_seconds: default_hold_window(),
            sweep_interval_seconds: default_sweep_interval(),
            sweep_batch_size: default_sweep_batch(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `VOYAGE__PAYMENT__API_KEY=...` sets `payment.api_key`
            .add_source(config::Environment::with_prefix("VOYAGE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};
    use voyage_core::PaymentMode;

    const MINIMAL: &str = r#"
        [server]
        port = 8080

        [database]
        url = "postgres://localhost/voyage"

        [auth]
        jwt_secret = "secret"

        [payment]
        merchant_id = "ec000002"
        api_key = "k"
        mode = "purchase"
        qr_endpoint = "https://q"
        purchase_endpoint = "https://p"
        check_endpoint = "https://c"
        callback_url = "https://cb"
    "#;

    #[test]
    fn test_optional_sections_and_rule_defaults() {
        let config: Config = config::Config::builder()
            .add_source(File::from_str(MINIMAL, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.redis.is_none());
        assert!(config.kafka.is_none());
        assert_eq!(config.business_rules.hold_window_seconds, 600);
        assert_eq!(config.business_rules.sweep_interval_seconds, 60);
        assert_eq!(config.payment.mode, PaymentMode::Purchase);
        assert!(config.payment.webhook_secret.is_none());
    }
}
