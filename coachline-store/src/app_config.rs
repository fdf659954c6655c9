use coachline_shared::pii::Masked;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    pub vnpay: VnpayConfig,
}

/// Timings that govern holds, deadlines and sweeps.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BusinessRules {
    pub seat_lock_minutes: i64,
    pub cash_approval_minutes: i64,
    pub transfer_payment_minutes: i64,
    pub refund_cutoff_hours: i64,
    pub lock_sweep_seconds: u64,
    pub booking_sweep_seconds: u64,
    pub rate_limit_per_minute: i64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            seat_lock_minutes: 10,
            cash_approval_minutes: 60,
            transfer_payment_minutes: 15,
            refund_cutoff_hours: 12,
            lock_sweep_seconds: 60,
            booking_sweep_seconds: 300,
            rate_limit_per_minute: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VnpayConfig {
    pub tmn_code: String,
    pub hash_secret: Masked<String>,
    pub pay_url: String,
    pub return_url: String,
    /// Merchant web API endpoint used for refunds.
    pub api_url: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_order_type")]
    pub order_type: String,
}

fn default_version() -> String { "2.1.0".to_string() }
fn default_locale() -> String { "vn".to_string() }
fn default_currency() -> String { "VND".to_string() }
fn default_order_type() -> String { "other".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Masked<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `COACHLINE__VNPAY__HASH_SECRET=...` sets `vnpay.hash_secret`
            .add_source(config::Environment::with_prefix("COACHLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_fall_back_to_defaults() {
        let rules: BusinessRules = serde_json::from_str(r#"{"seat_lock_minutes": 5}"#).unwrap();
        assert_eq!(rules.seat_lock_minutes, 5);
        assert_eq!(rules.transfer_payment_minutes, 15);
        assert_eq!(rules.refund_cutoff_hours, 12);
    }

    #[test]
    fn test_vnpay_secret_is_masked() {
        let cfg: VnpayConfig = serde_json::from_value(serde_json::json!({
            "tmn_code": "TMN01",
            "hash_secret": "SECRET",
            "pay_url": "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html",
            "return_url": "http://localhost:3000/payment/return",
            "api_url": "https://sandbox.vnpayment.vn/merchant_webapi/api/transaction"
        }))
        .unwrap();
        assert_eq!(cfg.version, "2.1.0");
        assert!(!format!("{:?}", cfg).contains("SECRET"));
        assert_eq!(cfg.hash_secret.expose(), "SECRET");
    }
}
