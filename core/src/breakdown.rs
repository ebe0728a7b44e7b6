//! Payment breakdown: splits a payment into late fee, interest,
//! capital and advance.
//!
//! Payments fill each tier in priority order. A tier the payment cannot
//! fully cover takes whatever is left and every lower tier gets zero, so
//! no component is ever negative and the four always add up to the payment.
//!
//! Single-installment loans only accrue interest once overdue; loans with
//! a schedule owe one period of interest plus the scheduled capital.

use crate::{
    clock::whole_days_between,
    config::LendingConfig,
    error::{LedgerError, LedgerResult},
    model::{Loan, PaymentBreakdown},
    types::CHARGE_SCALE,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// The payment engine. Holds policy only; every call is a pure function
/// of the loan snapshot, the amount and `now`.
#[derive(Debug, Clone, Default)]
pub struct PaymentCalculator {
    pub(crate) config: LendingConfig,
}

/// Remaining payment as it flows down the priority tiers.
struct Waterfall {
    remaining: Decimal,
}

impl Waterfall {
    fn new(amount: Decimal) -> Self {
        Self { remaining: amount }
    }

    /// Pay `owed` in full if possible, else everything that is left.
    fn take(&mut self, owed: Decimal) -> Decimal {
        if self.remaining >= owed {
            self.remaining -= owed;
            owed
        } else {
            std::mem::take(&mut self.remaining)
        }
    }

    fn split(payment_amount: Decimal, owed: [Decimal; 3]) -> PaymentBreakdown {
        let mut waterfall = Waterfall::new(payment_amount);
        let [late_fee, interest, capital] = owed.map(|tier| waterfall.take(tier));
        PaymentBreakdown {
            late_fee,
            interest,
            capital,
            advance: waterfall.remaining,
            total: payment_amount,
        }
    }
}

/// Charge arithmetic that may leave the `Decimal` range is reported, not panicked on.
fn charge(loan: &Loan, operation: &'static str, value: Option<Decimal>) -> LedgerResult<Decimal> {
    value
        .map(|v| v.round_dp(CHARGE_SCALE))
        .ok_or_else(|| LedgerError::degenerate(&loan.loan_id, operation))
}

impl PaymentCalculator {
    pub fn new(config: LendingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    pub fn calculate_payment_breakdown(
        &self,
        loan: &Loan,
        payment_amount: Decimal,
        now: DateTime<Utc>,
    ) -> LedgerResult<PaymentBreakdown> {
        loan.validate()?;
        if payment_amount < Decimal::ZERO {
            log::warn!("loan={} rejected payment amount {payment_amount}", loan.loan_id);
            return Err(LedgerError::InvalidPaymentAmount { amount: payment_amount });
        }

        let breakdown = if loan.is_single_installment() {
            self.single_installment_breakdown(loan, payment_amount, now)?
        } else {
            self.multi_installment_breakdown(loan, payment_amount, now)?
        };

        log::debug!(
            "loan={} payment={payment_amount} -> late_fee={} interest={} capital={} advance={}",
            loan.loan_id, breakdown.late_fee, breakdown.interest, breakdown.capital, breakdown.advance
        );
        Ok(breakdown)
    }

    /// Fractional periods elapsed since the due date; zero when not yet due.
    pub fn periods_overdue(&self, loan: &Loan, now: DateTime<Utc>) -> Decimal {
        let days_late = whole_days_between(loan.next_payment_date, now);
        if days_late <= 0 {
            return Decimal::ZERO;
        }
        Decimal::from(days_late) / Decimal::from(loan.payment_frequency.period_days())
    }

    /// A share of the current balance for every started period past grace.
    pub fn late_fee(&self, loan: &Loan, periods_overdue: Decimal) -> LedgerResult<Decimal> {
        if periods_overdue <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        let grace_periods = Decimal::from(loan.grace_period)
            / Decimal::from(loan.payment_frequency.period_days());
        let overdue_after_grace = periods_overdue.ceil() - grace_periods;
        if overdue_after_grace <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        charge(
            loan,
            "late fee",
            loan.remaining_balance
                .checked_mul(self.config.late_fee_rate)
                .and_then(|v| v.checked_mul(overdue_after_grace)),
        )
    }

    fn single_installment_breakdown(
        &self,
        loan: &Loan,
        payment_amount: Decimal,
        now: DateTime<Utc>,
    ) -> LedgerResult<PaymentBreakdown> {
        let periods_overdue = self.periods_overdue(loan, now);
        let late_fee_owed = self.late_fee(loan, periods_overdue)?;

        let interest_owed = if periods_overdue >= self.config.interest_accrual_threshold {
            charge(
                loan,
                "overdue interest",
                loan.remaining_balance
                    .checked_mul(loan.interest_rate / dec!(100))
                    .and_then(|v| v.checked_mul(periods_overdue.ceil())),
            )?
        } else {
            Decimal::ZERO
        };

        Ok(Waterfall::split(
            payment_amount,
            [late_fee_owed, interest_owed, loan.remaining_balance],
        ))
    }

    fn multi_installment_breakdown(
        &self,
        loan: &Loan,
        payment_amount: Decimal,
        now: DateTime<Utc>,
    ) -> LedgerResult<PaymentBreakdown> {
        let periods_overdue = self.periods_overdue(loan, now);
        let late_fee_owed = self.late_fee(loan, periods_overdue)?;

        let interest_owed = charge(
            loan,
            "period interest",
            loan.remaining_balance
                .checked_mul(loan.interest_rate / dec!(100))
                .map(|annual| annual / dec!(12) / loan.payment_frequency.periods_per_month()),
        )?;

        // Capital portion of the regular installment, never below zero and
        // never more than is still owed.
        let installment_capital = (loan.scheduled_installment() - interest_owed)
            .max(Decimal::ZERO)
            .min(loan.remaining_balance);

        Ok(Waterfall::split(
            payment_amount,
            [late_fee_owed, interest_owed, installment_capital],
        ))
    }
}
