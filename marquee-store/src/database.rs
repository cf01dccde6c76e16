use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::{BusinessRules, MAX_SWEEP_INTERVAL_SECONDS, MAX_VERIFICATION_TTL_MINUTES};

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

    /// Rows in `business_rules` override the configured defaults.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for (key, value) in rows {
            apply_rule(&mut rules, &key, &value);
        }
        Ok(rules)
    }
}

/// Expected format: `{"value": <number|bool>}`. Unknown keys and
/// mistyped or out-of-range values are ignored.
pub fn apply_rule(rules: &mut BusinessRules, key: &str, raw: &Value) {
    let Some(v) = raw.get("value") else {
        warn!(key, "Business rule without a value field");
        return;
    };

    match key {
        "hold_seats_pending_verification" => {
            if let Some(b) = v.as_bool() {
                rules.hold_seats_pending_verification = b;
            }
        }
        "verification_ttl_minutes" => {
            if let Some(n) = v.as_i64().filter(|n| (1..=MAX_VERIFICATION_TTL_MINUTES).contains(n)) {
                rules.verification_ttl_minutes = n;
            }
        }
        "sweep_interval_seconds" => {
            if let Some(n) = v.as_u64().filter(|n| (1..=MAX_SWEEP_INTERVAL_SECONDS).contains(n)) {
                rules.sweep_interval_seconds = n;
            }
        }
        "backfill_missing_references" => {
            if let Some(b) = v.as_bool() {
                rules.backfill_missing_references = b;
            }
        }
        "max_proof_bytes" => {
            if let Some(n) = v.as_u64().filter(|n| *n > 0).and_then(|n| usize::try_from(n).ok()) {
                rules.max_proof_bytes = n;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> BusinessRules {
        BusinessRules {
            hold_seats_pending_verification: true,
            verification_ttl_minutes: 30,
            sweep_interval_seconds: 60,
            backfill_missing_references: false,
            max_proof_bytes: 1024,
        }
    }

    #[test]
    fn test_rules_override_defaults() {
        let mut rules = defaults();
        apply_rule(&mut rules, "verification_ttl_minutes", &json!({"value": 45}));
        apply_rule(&mut rules, "hold_seats_pending_verification", &json!({"value": false}));
        apply_rule(&mut rules, "backfill_missing_references", &json!({"value": true}));

        assert_eq!(rules.verification_ttl_minutes, 45);
        assert!(!rules.hold_seats_pending_verification);
        assert!(rules.backfill_missing_references);
    }

    #[test]
    fn test_bad_rules_are_ignored() {
        let mut rules = defaults();
        apply_rule(&mut rules, "verification_ttl_minutes", &json!({"value": "soon"}));
        apply_rule(&mut rules, "verification_ttl_minutes", &json!({"value": -5}));
        apply_rule(&mut rules, "sweep_interval_seconds", &json!(12));
        apply_rule(&mut rules, "unknown_rule", &json!({"value": 1}));
        apply_rule(&mut rules, "verification_ttl_minutes", &json!({"value": i64::MAX}));
        apply_rule(&mut rules, "sweep_interval_seconds", &json!({"value": 0}));
        apply_rule(&mut rules, "max_proof_bytes", &json!({"value": 0}));

        assert_eq!(rules.verification_ttl_minutes, 30);
        assert_eq!(rules.sweep_interval_seconds, 60);
        assert_eq!(rules.max_proof_bytes, 1024);
    }
}
