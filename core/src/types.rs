//! Shared primitive types used across the ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable, unique identifier for a loan.
pub type LoanId = String;

/// A stable, unique identifier for a payment.
pub type PaymentId = String;

/// Seconds in one ledger day. Day arithmetic never looks at time zones.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Decimal places kept on every computed charge (late fee, interest,
/// scheduled installment). Payment amounts keep the scale they arrive with.
pub const CHARGE_SCALE: u32 = 10;

/// How often a loan expects an installment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

/// One row of the canonical frequency table.
///
/// Every period-length approximation in the engine reads from here:
/// a month is 30 days, a biweekly period is 15 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodShape {
    /// Fixed length of one period in days.
    pub days:       i64,
    /// Approximate periods per month. Divides the monthly rate into a
    /// per-period rate, and monthly interest into per-period interest.
    pub per_month:  i64,
}

impl PaymentFrequency {
    pub const ALL: [PaymentFrequency; 4] = [
        PaymentFrequency::Daily,
        PaymentFrequency::Weekly,
        PaymentFrequency::Biweekly,
        PaymentFrequency::Monthly,
    ];

    pub fn shape(self) -> PeriodShape {
        match self {
            PaymentFrequency::Daily    => PeriodShape { days: 1,  per_month: 30 },
            PaymentFrequency::Weekly   => PeriodShape { days: 7,  per_month: 4 },
            PaymentFrequency::Biweekly => PeriodShape { days: 15, per_month: 2 },
            PaymentFrequency::Monthly  => PeriodShape { days: 30, per_month: 1 },
        }
    }

    pub fn period_days(self) -> i64 {
        self.shape().days
    }

    pub fn periods_per_month(self) -> Decimal {
        Decimal::from(self.shape().per_month)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentFrequency::Daily    => "daily",
            PaymentFrequency::Weekly   => "weekly",
            PaymentFrequency::Biweekly => "biweekly",
            PaymentFrequency::Monthly  => "monthly",
        }
    }
}

impl fmt::Display for PaymentFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentFrequency::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Loan lifecycle status.
///
/// `Active → Completed` is driven by payment application.
/// `Active → Defaulted` is an administrative decision only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Completed,
    Defaulted,
}

impl LoanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Active    => "active",
            LoanStatus::Completed => "completed",
            LoanStatus::Defaulted => "defaulted",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, LoanStatus::Active)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active"    => Ok(LoanStatus::Active),
            "completed" => Ok(LoanStatus::Completed),
            "defaulted" => Ok(LoanStatus::Defaulted),
            other       => Err(other.to_string()),
        }
    }
}
