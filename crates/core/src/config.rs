//! Engine configuration.
//!
//! Defaults match the operating assumptions of the pricing engine; every value can
//! be overridden from the environment by the hosting application.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::Percentage;

pub const ENV_DEFAULT_SHIPPING_TAX_RATE: &str = "ATELIER_DEFAULT_SHIPPING_TAX_RATE";
pub const ENV_CREDIT_NOTE_VALIDITY_DAYS: &str = "ATELIER_CREDIT_NOTE_VALIDITY_DAYS";
pub const ENV_ORDER_REFERENCE_PREFIX: &str = "ATELIER_ORDER_REFERENCE_PREFIX";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tax applied to shipping when the order does not carry its own rate.
    pub default_shipping_tax_rate: Percentage,
    /// Lifetime of a freshly issued credit note.
    pub credit_note_validity_days: u32,
    /// Prefix of generated order references (`ORD-2025-0001`).
    pub order_reference_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_shipping_tax_rate: Percentage::whole(20),
            credit_note_validity_days: 365,
            order_reference_prefix: "ORD".to_string(),
        }
    }
}

impl EngineConfig {
    /// Build from process environment, falling back to defaults per key.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests, embedded settings).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let default_shipping_tax_rate = parse_or(
            &lookup,
            ENV_DEFAULT_SHIPPING_TAX_RATE,
            defaults.default_shipping_tax_rate,
            |raw| {
                Decimal::from_str(raw)
                    .ok()
                    .and_then(|d| Percentage::new(d).ok())
            },
        );
        let credit_note_validity_days = parse_or(
            &lookup,
            ENV_CREDIT_NOTE_VALIDITY_DAYS,
            defaults.credit_note_validity_days,
            |raw| raw.parse::<u32>().ok().filter(|days| *days > 0),
        );
        let order_reference_prefix = parse_or(
            &lookup,
            ENV_ORDER_REFERENCE_PREFIX,
            defaults.order_reference_prefix,
            |raw| {
                let trimmed = raw.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            },
        );

        Self {
            default_shipping_tax_rate,
            credit_note_validity_days,
            order_reference_prefix,
        }
    }
}

fn parse_or<F, T, P>(lookup: &F, key: &str, default: T, parse: P) -> T
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    match lookup(key) {
        None => default,
        Some(raw) => parse(&raw).unwrap_or_else(|| {
            tracing::warn!(key, value = %raw, "invalid configuration value; using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(|_| None);
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.default_shipping_tax_rate.value(), dec!(20));
        assert_eq!(config.credit_note_validity_days, 365);
        assert_eq!(config.order_reference_prefix, "ORD");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            (ENV_DEFAULT_SHIPPING_TAX_RATE, "5.5"),
            (ENV_CREDIT_NOTE_VALIDITY_DAYS, "90"),
            (ENV_ORDER_REFERENCE_PREFIX, " CMD "),
        ]));
        assert_eq!(config.default_shipping_tax_rate.value(), dec!(5.5));
        assert_eq!(config.credit_note_validity_days, 90);
        assert_eq!(config.order_reference_prefix, "CMD");
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            (ENV_DEFAULT_SHIPPING_TAX_RATE, "-3"),
            (ENV_CREDIT_NOTE_VALIDITY_DAYS, "0"),
            (ENV_ORDER_REFERENCE_PREFIX, "   "),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn deserializes_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"credit_note_validity_days": 30}"#).unwrap();
        assert_eq!(config.credit_note_validity_days, 30);
        assert_eq!(config.order_reference_prefix, "ORD");
    }
}
