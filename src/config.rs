//! Runtime configuration read from the environment (`.env` is honoured by
//! the binary through `dotenvy`).

use std::env;
use std::str::FromStr;

use crate::domain::aggregates::order::PricingPolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Postgres connection string; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub session_ttl_hours: i64,
    pub pricing: PricingPolicy,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError { pub key: &'static str, pub value: String }

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8083,
            database_url: None,
            nats_url: None,
            session_ttl_hours: 72,
            pricing: PricingPolicy {
                shipping_fee: 30_000,
                free_shipping_threshold: 500_000,
                tax_rate_percent: 0,
                loyalty_point_value: 1_000,
                loyalty_earn_divisor: 10_000,
            },
            admin_email: None,
            admin_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            port: parse_or("PORT", defaults.port)?,
            database_url: optional("DATABASE_URL"),
            nats_url: optional("NATS_URL"),
            session_ttl_hours: parse_or("SESSION_TTL_HOURS", defaults.session_ttl_hours)?,
            pricing: PricingPolicy {
                shipping_fee: parse_or("SHIPPING_FEE", defaults.pricing.shipping_fee)?,
                free_shipping_threshold: parse_or("FREE_SHIPPING_THRESHOLD", defaults.pricing.free_shipping_threshold)?,
                tax_rate_percent: parse_or("TAX_RATE_PERCENT", defaults.pricing.tax_rate_percent)?,
                loyalty_point_value: parse_or("LOYALTY_POINT_VALUE", defaults.pricing.loyalty_point_value)?,
                loyalty_earn_divisor: parse_or("LOYALTY_EARN_DIVISOR", defaults.pricing.loyalty_earn_divisor)?,
            },
            admin_email: optional("ADMIN_EMAIL"),
            admin_password: optional("ADMIN_PASSWORD"),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_reports_key() {
        env::set_var("OPENSASE_TEST_BAD_PORT", "eighty");
        let err = parse_or::<u16>("OPENSASE_TEST_BAD_PORT", 1).unwrap_err();
        assert_eq!(err.key, "OPENSASE_TEST_BAD_PORT");
        assert_eq!(parse_or::<u16>("OPENSASE_TEST_UNSET_PORT", 8083).unwrap(), 8083);
    }
}
