//! Loan and payment records, and the transient payment breakdown.

use crate::{
    error::{LedgerError, LedgerResult},
    types::{LoanId, LoanStatus, PaymentFrequency, PaymentId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id:            LoanId,
    pub client_name:        String,
    /// Original principal. Fixed at creation.
    pub amount:             Decimal,
    /// Nominal annual rate, in percent.
    pub interest_rate:      Decimal,
    pub payment_frequency:  PaymentFrequency,
    pub start_date:         DateTime<Utc>,
    pub end_date:           DateTime<Utc>,
    /// Days after a due date before late fees accrue.
    pub grace_period:       u32,
    pub remaining_balance:  Decimal,
    pub status:             LoanStatus,
    pub created_at:         DateTime<Utc>,
    pub installments:       u32,
    /// Scheduled installment. Present iff `installments > 1`.
    #[serde(default)]
    pub installment_amount: Option<Decimal>,
    pub next_payment_date:  DateTime<Utc>,
    /// Unapplied overpayment carried forward.
    #[serde(default)]
    pub capital_advance:    Decimal,
    #[serde(default)]
    pub apply_advance_to_capital: bool,
    /// Bumped on every stored update; guards against stale writes.
    #[serde(default)]
    pub version:            i64,
}

impl Loan {
    pub fn is_single_installment(&self) -> bool {
        self.installments == 1
    }

    /// The regular installment, zero when none is scheduled.
    pub fn scheduled_installment(&self) -> Decimal {
        self.installment_amount.unwrap_or(Decimal::ZERO)
    }

    /// Reject snapshots the engine cannot compute against.
    pub fn validate(&self) -> LedgerResult<()> {
        let reject = |reason: String| Err(LedgerError::invalid_loan(&self.loan_id, reason));

        if self.installments < 1 {
            return reject(format!("installments must be at least 1, got {}", self.installments));
        }
        for (field, value) in [
            ("amount", self.amount),
            ("interest_rate", self.interest_rate),
            ("remaining_balance", self.remaining_balance),
            ("capital_advance", self.capital_advance),
        ] {
            if value < Decimal::ZERO {
                return reject(format!("{field} must be non-negative, got {value}"));
            }
        }
        if let Some(installment) = self.installment_amount {
            if installment < Decimal::ZERO {
                return reject(format!("installment_amount must be non-negative, got {installment}"));
            }
        }
        Ok(())
    }
}

/// Caller-supplied terms for a new loan. Everything else is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLoan {
    pub client_name:       String,
    pub amount:            Decimal,
    pub interest_rate:     Decimal,
    #[serde(default)]
    pub installments:      Option<u32>,
    #[serde(default)]
    pub payment_frequency: Option<PaymentFrequency>,
    #[serde(default)]
    pub grace_period:      Option<u32>,
    #[serde(default)]
    pub apply_advance_to_capital: bool,
}

impl NewLoan {
    pub fn validate(&self) -> LedgerResult<()> {
        let reject = |reason: String| Err(LedgerError::invalid_loan("<new>", reason));

        if self.client_name.trim().is_empty() {
            return reject("client_name is required".into());
        }
        if self.amount <= Decimal::ZERO {
            return reject(format!("amount must be positive, got {}", self.amount));
        }
        if self.interest_rate < Decimal::ZERO {
            return reject(format!("interest_rate must be non-negative, got {}", self.interest_rate));
        }
        if self.installments == Some(0) {
            return reject("installments must be at least 1, got 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id:      PaymentId,
    pub loan_id:         LoanId,
    /// Gross amount paid.
    pub amount:          Decimal,
    pub payment_date:    DateTime<Utc>,
    pub is_late:         bool,
    pub late_fee:        Decimal,
    /// Same value as `late_fee`; both columns are kept for older readers.
    pub late_fee_amount: Decimal,
    pub interest_amount: Decimal,
    pub capital_amount:  Decimal,
    pub advance_amount:  Decimal,
}

impl Payment {
    pub fn from_breakdown(
        payment_id: PaymentId,
        loan_id: LoanId,
        payment_date: DateTime<Utc>,
        breakdown: &PaymentBreakdown,
    ) -> Self {
        Self {
            payment_id,
            loan_id,
            amount:          breakdown.total,
            payment_date,
            is_late:         breakdown.late_fee > Decimal::ZERO,
            late_fee:        breakdown.late_fee,
            late_fee_amount: breakdown.late_fee,
            interest_amount: breakdown.interest,
            capital_amount:  breakdown.capital,
            advance_amount:  breakdown.advance,
        }
    }
}

/// How a payment splits across the four components. Never stored as-is.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    pub late_fee: Decimal,
    pub interest: Decimal,
    pub capital:  Decimal,
    pub advance:  Decimal,
    /// Always the gross payment amount.
    pub total:    Decimal,
}

impl PaymentBreakdown {
    pub fn components_sum(&self) -> Decimal {
        self.late_fee + self.interest + self.capital + self.advance
    }
}

/// What happened to the advance portion of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdvanceTreatment {
    /// No advance in this payment.
    NoAdvance,
    /// Added to the carried `capital_advance` buffer.
    Buffered,
    /// Taken off principal and the schedule re-amortized.
    AppliedToCapital { remaining_installments: i64 },
}

/// New values for the mutable loan fields after one payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanUpdate {
    pub remaining_balance:  Decimal,
    pub installment_amount: Option<Decimal>,
    pub capital_advance:    Decimal,
    pub next_payment_date:  DateTime<Utc>,
    pub status:             LoanStatus,
    pub apply_advance_to_capital: bool,
    pub advance_treatment:  AdvanceTreatment,
}

impl LoanUpdate {
    /// Fold this update into a snapshot, producing the next snapshot.
    pub fn apply_to(&self, loan: &Loan) -> Loan {
        Loan {
            remaining_balance:  self.remaining_balance,
            installment_amount: self.installment_amount,
            capital_advance:    self.capital_advance,
            next_payment_date:  self.next_payment_date,
            status:             self.status,
            apply_advance_to_capital: self.apply_advance_to_capital,
            version:            loan.version + 1,
            ..loan.clone()
        }
    }
}
