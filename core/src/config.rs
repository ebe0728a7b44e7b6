//! Lending policy knobs, loaded from `{data_dir}/lending.json`.
//!
//! The defaults are the production constants. The period-length table in
//! `types.rs` is deliberately not configurable.

use crate::types::PaymentFrequency;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LendingConfig {
    /// Share of the current balance charged per overdue period past grace.
    pub late_fee_rate: Decimal,
    /// Single-installment loans accrue interest once this many periods overdue.
    pub interest_accrual_threshold: Decimal,
    pub default_grace_period_days: u32,
    pub default_frequency: PaymentFrequency,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            late_fee_rate:              dec!(0.01),
            interest_accrual_threshold: dec!(0.5),
            default_grace_period_days:  3,
            default_frequency:          PaymentFrequency::Monthly,
        }
    }
}

impl LendingConfig {
    /// Load from the data/ directory.
    /// In tests, use LendingConfig::default().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/lending.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LendingConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file means defaults.
    pub fn load_or_default(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/lending.json");
        if !Path::new(&path).exists() {
            log::warn!("{path} not found; using default lending policy");
            return Ok(Self::default());
        }
        Self::load(data_dir)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.late_fee_rate < Decimal::ZERO {
            anyhow::bail!("late_fee_rate must be a non-negative number, got {}", self.late_fee_rate);
        }
        if self.interest_accrual_threshold < Decimal::ZERO {
            anyhow::bail!(
                "interest_accrual_threshold must be a non-negative number, got {}",
                self.interest_accrual_threshold
            );
        }
        Ok(())
    }
}
