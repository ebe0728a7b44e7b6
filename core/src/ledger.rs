//! The loan ledger: origination and payment recording on top of the store.
//!
//! RULE: every write for one payment (payment row, loan update, audit
//! events) commits together or not at all, and the loan update is
//! conditional on the version that was read.

use crate::{
    amortization::compute_installment_amount,
    breakdown::PaymentCalculator,
    clock::{add_days, add_one_month, Clock, FixedClock},
    config::LendingConfig,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    model::{AdvanceTreatment, Loan, NewLoan, Payment, PaymentBreakdown},
    report::DailyReport,
    store::LoanStore,
    types::{LoanStatus, PaymentFrequency},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub struct LoanLedger {
    store:      LoanStore,
    calculator: PaymentCalculator,
    clock:      Box<dyn Clock>,
}

/// The stored payment and the loan as it stands afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub loan:    Loan,
}

impl LoanLedger {
    pub fn new(store: LoanStore, config: LendingConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            store,
            calculator: PaymentCalculator::new(config),
            clock,
        }
    }

    /// In-memory, migrated ledger with default policy, driven by `clock`.
    pub fn build_test(clock: FixedClock) -> LedgerResult<Self> {
        let store = LoanStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, LendingConfig::default(), Box::new(clock)))
    }

    pub fn store(&self) -> &LoanStore {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Origination ───────────────────────────────────────────────

    pub fn create_loan(&self, terms: NewLoan) -> LedgerResult<Loan> {
        terms.validate()?;
        let config = self.calculator.config();
        let now = self.now();

        let frequency = terms.payment_frequency.unwrap_or(config.default_frequency);
        let installments = terms.installments.unwrap_or(1);
        let period_days = frequency.period_days();

        let out_of_range = |what: &str| {
            let reason = format!("{what} is out of range for {installments} installments");
            LedgerError::invalid_loan("<new>", reason)
        };
        let end_date = add_days(now, period_days * i64::from(installments))
            .ok_or_else(|| out_of_range("end date"))?;
        let next_payment_date =
            first_payment_date(now, frequency).ok_or_else(|| out_of_range("first due date"))?;
        let installment_amount = (installments > 1)
            .then(|| {
                compute_installment_amount(terms.amount, terms.interest_rate, frequency, installments)
                    .ok_or_else(|| out_of_range("installment amount"))
            })
            .transpose()?;

        let loan = Loan {
            loan_id:            Uuid::new_v4().to_string(),
            client_name:        terms.client_name.trim().to_string(),
            amount:             terms.amount,
            interest_rate:      terms.interest_rate,
            payment_frequency:  frequency,
            start_date:         now,
            end_date,
            grace_period:       terms.grace_period.unwrap_or(config.default_grace_period_days),
            remaining_balance:  terms.amount,
            status:             LoanStatus::Active,
            created_at:         now,
            installments,
            installment_amount,
            next_payment_date,
            capital_advance:    Decimal::ZERO,
            apply_advance_to_capital: terms.apply_advance_to_capital,
            version:            0,
        };

        self.store.in_transaction(|store| {
            store.insert_loan(&loan)?;
            store.append_event(
                &LedgerEvent::LoanCreated {
                    loan_id:            loan.loan_id.clone(),
                    amount:             loan.amount,
                    installments:       loan.installments,
                    installment_amount: loan.installment_amount,
                },
                now,
            )
        })?;

        log::info!(
            "loan={} created for {} amount={} installments={} frequency={}",
            loan.loan_id, loan.client_name, loan.amount, loan.installments, frequency
        );
        Ok(loan)
    }

    // ── Queries ───────────────────────────────────────────────────

    pub fn get_loan(&self, loan_id: &str) -> LedgerResult<Loan> {
        self.store.require_loan(loan_id)
    }

    pub fn list_loans(&self) -> LedgerResult<Vec<Loan>> {
        self.store.list_loans()
    }

    pub fn loan_payments(&self, loan_id: &str) -> LedgerResult<Vec<Payment>> {
        self.store.require_loan(loan_id)?;
        self.store.list_payments_for_loan(loan_id)
    }

    /// What a payment would do today, without recording it.
    pub fn preview_payment(&self, loan_id: &str, amount: Decimal) -> LedgerResult<PaymentBreakdown> {
        let loan = self.store.require_loan(loan_id)?;
        self.calculator.calculate_payment_breakdown(&loan, amount, self.now())
    }

    // ── Payments ──────────────────────────────────────────────────

    pub fn record_payment(
        &self,
        loan_id: &str,
        amount: Decimal,
        apply_advance_to_capital: bool,
    ) -> LedgerResult<PaymentReceipt> {
        let now = self.now();
        let calculator = &self.calculator;

        let receipt = self.store.in_transaction(|store| {
            let loan = store.require_loan(loan_id)?;
            if loan.status.is_terminal() {
                log::warn!("loan={loan_id} payment recorded against {} loan", loan.status);
            }

            let breakdown = calculator.calculate_payment_breakdown(&loan, amount, now)?;
            let update = calculator.apply_payment(&loan, &breakdown, apply_advance_to_capital, now)?;
            let payment = Payment::from_breakdown(
                Uuid::new_v4().to_string(),
                loan.loan_id.clone(),
                now,
                &breakdown,
            );

            store.insert_payment(&payment)?;
            store.update_loan(&loan.loan_id, &update, loan.version)?;

            store.append_event(
                &LedgerEvent::PaymentRecorded {
                    loan_id:    loan.loan_id.clone(),
                    payment_id: payment.payment_id.clone(),
                    amount,
                    late_fee:   breakdown.late_fee,
                    interest:   breakdown.interest,
                    capital:    breakdown.capital,
                    advance:    breakdown.advance,
                },
                now,
            )?;
            if let AdvanceTreatment::AppliedToCapital { remaining_installments } =
                update.advance_treatment
            {
                store.append_event(
                    &LedgerEvent::InstallmentRecalculated {
                        loan_id:            loan.loan_id.clone(),
                        remaining_balance:  update.remaining_balance,
                        installment_amount: update.installment_amount.unwrap_or(Decimal::ZERO),
                        remaining_installments,
                    },
                    now,
                )?;
            }
            if update.status == LoanStatus::Completed && loan.status != LoanStatus::Completed {
                store.append_event(
                    &LedgerEvent::LoanCompleted { loan_id: loan.loan_id.clone() },
                    now,
                )?;
            }

            Ok(PaymentReceipt {
                loan: update.apply_to(&loan),
                payment,
            })
        })?;

        log::info!(
            "loan={loan_id} payment={} amount={amount} balance={} status={}",
            receipt.payment.payment_id, receipt.loan.remaining_balance, receipt.loan.status
        );
        Ok(receipt)
    }

    // ── Administration ────────────────────────────────────────────

    /// The only way a loan becomes `defaulted`.
    pub fn set_status(&self, loan_id: &str, status: LoanStatus) -> LedgerResult<Loan> {
        let now = self.now();
        let loan = self.store.in_transaction(|store| {
            let loan = store.require_loan(loan_id)?;
            if loan.status == status {
                return Ok(loan);
            }
            store.set_loan_status(loan_id, status, loan.version)?;
            store.append_event(
                &LedgerEvent::StatusChanged {
                    loan_id: loan_id.to_string(),
                    from:    loan.status,
                    to:      status,
                },
                now,
            )?;
            Ok(Loan {
                status,
                version: loan.version + 1,
                ..loan
            })
        })?;
        log::info!("loan={loan_id} status set to {status}");
        Ok(loan)
    }

    // ── Reports ───────────────────────────────────────────────────

    pub fn daily_report(&self, date: NaiveDate) -> LedgerResult<DailyReport> {
        let loans = self.store.list_loans_created_on(date)?;
        let mut payments = Vec::new();
        for loan in &loans {
            payments.extend(self.store.list_payments_for_loan(&loan.loan_id)?);
        }
        Ok(DailyReport::build(date, &loans, &payments, self.now()))
    }
}

/// First due date: one period after the start, where a monthly period is
/// a calendar month. `None` past the end of the calendar.
pub fn first_payment_date(start: DateTime<Utc>, frequency: PaymentFrequency) -> Option<DateTime<Utc>> {
    match frequency {
        PaymentFrequency::Monthly => add_one_month(start),
        other => add_days(start, other.period_days()),
    }
}
