//! Daily origination report.

use crate::{
    model::{Loan, Payment},
    types::{LoanId, LoanStatus},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether a loan has run past its end date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoanStanding {
    Current,
    Overdue,
}

impl LoanStanding {
    pub fn of(loan: &Loan, now: DateTime<Utc>) -> Self {
        if now > loan.end_date {
            LoanStanding::Overdue
        } else {
            LoanStanding::Current
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoanReportLine {
    pub loan_id:           LoanId,
    pub client_name:       String,
    pub amount:            Decimal,
    pub remaining_balance: Decimal,
    pub status:            LoanStatus,
    pub standing:          LoanStanding,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyReport {
    pub date:            NaiveDate,
    pub loans:           Vec<LoanReportLine>,
    pub total_loaned:    Decimal,
    /// Gross payments received on the day's loans, at any date.
    pub total_payments:  Decimal,
    pub total_late_fees: Decimal,
}

impl DailyReport {
    /// `payments` must be the payments of `loans` and nothing else.
    pub fn build(date: NaiveDate, loans: &[Loan], payments: &[Payment], now: DateTime<Utc>) -> Self {
        let lines = loans
            .iter()
            .map(|loan| LoanReportLine {
                loan_id:           loan.loan_id.clone(),
                client_name:       loan.client_name.clone(),
                amount:            loan.amount,
                remaining_balance: loan.remaining_balance,
                status:            loan.status,
                standing:          LoanStanding::of(loan, now),
            })
            .collect();

        Self {
            date,
            loans:           lines,
            total_loaned:    loans.iter().map(|l| l.amount).sum(),
            total_payments:  payments.iter().map(|p| p.amount).sum(),
            total_late_fees: payments.iter().map(|p| p.late_fee).sum(),
        }
    }
}
