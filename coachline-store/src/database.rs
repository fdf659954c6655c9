use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlays rows of the `business_rules` table on top of `defaults`.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
                .fetch_all(&self.pool)
                .await?;

        Ok(apply_rule_overrides(defaults, rows))
    }
}

/// Expected row format: `{"value": <number>}`. Unknown keys are ignored.
pub fn apply_rule_overrides(defaults: BusinessRules, rows: Vec<(String, Value)>) -> BusinessRules {
    let mut rules = defaults;

    for (key, value) in rows {
        let Some(v) = value.get("value") else {
            continue;
        };
        match key.as_str() {
            "seat_lock_minutes" => {
                if let Some(n) = v.as_i64() {
                    rules.seat_lock_minutes = n;
                }
            }
            "cash_approval_minutes" => {
                if let Some(n) = v.as_i64() {
                    rules.cash_approval_minutes = n;
                }
            }
            "transfer_payment_minutes" => {
                if let Some(n) = v.as_i64() {
                    rules.transfer_payment_minutes = n;
                }
            }
            "refund_cutoff_hours" => {
                if let Some(n) = v.as_i64() {
                    rules.refund_cutoff_hours = n;
                }
            }
            "lock_sweep_seconds" => {
                if let Some(n) = v.as_u64() {
                    rules.lock_sweep_seconds = n;
                }
            }
            "booking_sweep_seconds" => {
                if let Some(n) = v.as_u64() {
                    rules.booking_sweep_seconds = n;
                }
            }
            "rate_limit_per_minute" => {
                if let Some(n) = v.as_i64() {
                    rules.rate_limit_per_minute = n;
                }
            }
            _ => {}
        }
    }

    rules
}
