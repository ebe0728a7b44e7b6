//! Loan lifecycle: folds a payment breakdown into the next loan state.
//!
//! An advance either joins the carried buffer or, when the borrower asks
//! for it on a scheduled loan, comes off principal and the remaining
//! schedule is re-amortized. The two branches are exclusive.

use crate::{
    amortization::compute_installment_amount,
    breakdown::PaymentCalculator,
    clock::{add_days, whole_days_between},
    error::{LedgerError, LedgerResult},
    model::{AdvanceTreatment, Loan, LoanUpdate, PaymentBreakdown},
    types::LoanStatus,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Balance, installment and buffer after the advance has been dealt with.
struct Rebalanced {
    remaining_balance:  Decimal,
    installment_amount: Option<Decimal>,
    capital_advance:    Decimal,
    treatment:          AdvanceTreatment,
}

impl PaymentCalculator {
    /// Due date one fixed period after `payment_date`.
    pub fn calculate_next_payment_date(
        &self,
        loan: &Loan,
        payment_date: DateTime<Utc>,
    ) -> LedgerResult<DateTime<Utc>> {
        add_days(payment_date, loan.payment_frequency.period_days())
            .ok_or_else(|| LedgerError::invalid_loan(&loan.loan_id, "next due date is out of range"))
    }

    /// Periods left until the loan's end date, rounded up. Zero once past it.
    pub fn remaining_installments(&self, loan: &Loan, now: DateTime<Utc>) -> i64 {
        let remaining_days = whole_days_between(now, loan.end_date).max(0);
        let period_days = loan.payment_frequency.period_days();
        (remaining_days + period_days - 1) / period_days
    }

    pub fn apply_payment(
        &self,
        loan: &Loan,
        breakdown: &PaymentBreakdown,
        apply_advance_to_capital: bool,
        now: DateTime<Utc>,
    ) -> LedgerResult<LoanUpdate> {
        loan.validate()?;

        let rebalanced = if breakdown.advance > Decimal::ZERO
            && apply_advance_to_capital
            && !loan.is_single_installment()
        {
            self.reamortize_with_advance(loan, breakdown, now)?
        } else {
            Self::reduce_by_capital(loan, breakdown)
        };

        let moves_due_date = breakdown.capital > Decimal::ZERO || breakdown.advance > Decimal::ZERO;
        let next_payment_date = if moves_due_date {
            self.calculate_next_payment_date(loan, now)?
        } else {
            loan.next_payment_date
        };

        let status = if rebalanced.remaining_balance <= Decimal::ZERO {
            LoanStatus::Completed
        } else {
            loan.status
        };

        log::debug!(
            "loan={} balance {} -> {} status {} -> {} ({:?})",
            loan.loan_id, loan.remaining_balance, rebalanced.remaining_balance,
            loan.status, status, rebalanced.treatment
        );

        Ok(LoanUpdate {
            remaining_balance:  rebalanced.remaining_balance,
            installment_amount: rebalanced.installment_amount,
            capital_advance:    rebalanced.capital_advance,
            next_payment_date,
            status,
            apply_advance_to_capital,
            advance_treatment:  rebalanced.treatment,
        })
    }

    /// Capital comes off the balance; any advance is carried as a buffer.
    fn reduce_by_capital(loan: &Loan, breakdown: &PaymentBreakdown) -> Rebalanced {
        Rebalanced {
            remaining_balance:  loan.remaining_balance - breakdown.capital,
            installment_amount: loan.installment_amount,
            capital_advance:    loan.capital_advance + breakdown.advance,
            treatment: if breakdown.advance > Decimal::ZERO {
                AdvanceTreatment::Buffered
            } else {
                AdvanceTreatment::NoAdvance
            },
        }
    }

    /// The advance shrinks principal and the installment is recomputed over
    /// the periods left before the end date.
    ///
    /// Only the advance is subtracted here. The scheduled capital of the same
    /// payment does not reduce the balance on this branch.
    fn reamortize_with_advance(
        &self,
        loan: &Loan,
        breakdown: &PaymentBreakdown,
        now: DateTime<Utc>,
    ) -> LedgerResult<Rebalanced> {
        let remaining_installments = self.remaining_installments(loan, now);
        let treatment = AdvanceTreatment::AppliedToCapital { remaining_installments };

        if remaining_installments <= 0 {
            return Ok(Rebalanced {
                remaining_balance:  Decimal::ZERO,
                installment_amount: Some(Decimal::ZERO),
                capital_advance:    Decimal::ZERO,
                treatment,
            });
        }

        let remaining_balance = (loan.remaining_balance - breakdown.advance).max(Decimal::ZERO);
        let installment_amount = if remaining_balance > Decimal::ZERO {
            compute_installment_amount(
                remaining_balance,
                loan.interest_rate,
                loan.payment_frequency,
                u32::try_from(remaining_installments).unwrap_or(u32::MAX),
            )
            .ok_or_else(|| LedgerError::degenerate(&loan.loan_id, "re-amortized installment"))?
        } else {
            Decimal::ZERO
        };

        Ok(Rebalanced {
            remaining_balance,
            installment_amount: Some(installment_amount),
            capital_advance: Decimal::ZERO,
            treatment,
        })
    }
}
