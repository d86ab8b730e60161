//! Environment-driven configuration.
//!
//! Tax rate, shipping and discount are deliberately configuration values
//! rather than constants in the checkout code.

use anyhow::Context;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::domain::plan::Charges;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub tax_rate: Decimal,
    pub shipping_amount: Decimal,
    pub discount_amount: Decimal,
    pub payment_timeout: Duration,
    pub payment_success_rate: f64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            port: env_parsed("PORT", "8080")?,
            tax_rate: env_parsed("TAX_RATE", "0.08")?,
            shipping_amount: env_parsed("SHIPPING_AMOUNT", "0")?,
            discount_amount: env_parsed("DISCOUNT_AMOUNT", "0")?,
            payment_timeout: Duration::from_millis(env_parsed("PAYMENT_TIMEOUT_MS", "5000")?),
            payment_success_rate: env_parsed("PAYMENT_SUCCESS_RATE", "0.95")?,
        })
    }

    pub fn charges(&self) -> Charges {
        Charges {
            tax_rate: self.tax_rate,
            shipping_amount: self.shipping_amount,
            discount_amount: self.discount_amount,
        }
    }
}

fn env_parsed<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid {key} ({raw}): {e}"))
}
