//! Engine configuration loading.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use stockledger_inventory::CostingPolicy;

use crate::retry::RetryPolicy;

pub const ENV_MAX_RETRIES: &str = "STOCKLEDGER_MAX_RETRIES";
pub const ENV_RETRY_BASE_MS: &str = "STOCKLEDGER_RETRY_BASE_MS";
pub const ENV_RETRY_MAX_MS: &str = "STOCKLEDGER_RETRY_MAX_MS";
pub const ENV_VARIANCE_EPSILON: &str = "STOCKLEDGER_VARIANCE_EPSILON";
pub const ENV_COSTING_POLICY: &str = "STOCKLEDGER_COSTING_POLICY";

/// Tunables shared by the services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// Variances with `|variance| <= epsilon` are treated as rounding noise.
    pub variance_epsilon: Decimal,
    pub default_policy: CostingPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            variance_epsilon: Decimal::new(1, 4),
            default_policy: CostingPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `STOCKLEDGER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_attempts = parse_or(&lookup, ENV_MAX_RETRIES, defaults.retry.max_attempts);
        let base_ms = parse_or(
            &lookup,
            ENV_RETRY_BASE_MS,
            defaults.retry.base_delay.as_millis() as u64,
        );
        let max_ms = parse_or(&lookup, ENV_RETRY_MAX_MS, defaults.retry.max_delay.as_millis() as u64);

        let mut variance_epsilon = parse_or(&lookup, ENV_VARIANCE_EPSILON, defaults.variance_epsilon);
        if variance_epsilon < Decimal::ZERO {
            warn!(key = ENV_VARIANCE_EPSILON, %variance_epsilon, "negative epsilon, using default");
            variance_epsilon = defaults.variance_epsilon;
        }

        Self {
            retry: RetryPolicy::exponential(
                max_attempts.max(1),
                Duration::from_millis(base_ms),
                Duration::from_millis(max_ms.max(base_ms)),
            ),
            variance_epsilon,
            default_policy: parse_or(&lookup, ENV_COSTING_POLICY, defaults.default_policy),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, %default, "invalid configuration value, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = EngineConfig::from_lookup(|_| None);
        assert_eq!(config.variance_epsilon, Decimal::new(1, 4));
        assert_eq!(config.default_policy, CostingPolicy::Fifo);
        assert_eq!(config.retry.max_attempts, RetryPolicy::default().max_attempts);
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_MAX_RETRIES, "9"),
            (ENV_RETRY_BASE_MS, "2"),
            (ENV_RETRY_MAX_MS, "40"),
            (ENV_VARIANCE_EPSILON, "0.01"),
            (ENV_COSTING_POLICY, "lifo"),
        ]));
        assert_eq!(config.retry.max_attempts, 9);
        assert_eq!(config.retry.base_delay, Duration::from_millis(2));
        assert_eq!(config.retry.max_delay, Duration::from_millis(40));
        assert_eq!(config.variance_epsilon, Decimal::new(1, 2));
        assert_eq!(config.default_policy, CostingPolicy::Lifo);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_MAX_RETRIES, "many"),
            (ENV_VARIANCE_EPSILON, "-1"),
            (ENV_COSTING_POLICY, "hifo"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn config_file_shape() {
        let raw = r#"{
            "retry": {
                "max_attempts": 3,
                "base_delay": { "secs": 0, "nanos": 5000000 },
                "max_delay": { "secs": 1, "nanos": 0 },
                "strategy": "linear",
                "jitter": 0.0
            },
            "variance_epsilon": "0.001",
            "default_policy": "weighted_average"
        }"#;
        let config: EngineConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.retry.strategy, crate::retry::BackoffStrategy::Linear);
        assert_eq!(config.retry.delay_for_attempt(2), Duration::from_millis(10));
        assert_eq!(config.variance_epsilon, Decimal::new(1, 3));
        assert_eq!(config.default_policy, CostingPolicy::WeightedAverage);
    }
}
