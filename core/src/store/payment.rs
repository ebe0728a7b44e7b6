use super::{parse_money, LoanStore};
use crate::{
    error::{LedgerError, LedgerResult},
    model::Payment,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

/// A payment row as stored; money columns are still text.
struct PaymentRow {
    payment_id:      String,
    loan_id:         String,
    amount:          String,
    payment_date:    DateTime<Utc>,
    is_late:         bool,
    late_fee:        String,
    late_fee_amount: String,
    interest_amount: String,
    capital_amount:  String,
    advance_amount:  String,
}

impl PaymentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            payment_id:      row.get(0)?,
            loan_id:         row.get(1)?,
            amount:          row.get(2)?,
            payment_date:    row.get(3)?,
            is_late:         row.get::<_, i32>(4)? != 0,
            late_fee:        row.get(5)?,
            late_fee_amount: row.get(6)?,
            interest_amount: row.get(7)?,
            capital_amount:  row.get(8)?,
            advance_amount:  row.get(9)?,
        })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = LedgerError;

    fn try_from(row: PaymentRow) -> LedgerResult<Self> {
        Ok(Payment {
            payment_id:      row.payment_id,
            loan_id:         row.loan_id,
            amount:          parse_money("amount", row.amount)?,
            payment_date:    row.payment_date,
            is_late:         row.is_late,
            late_fee:        parse_money("late_fee", row.late_fee)?,
            late_fee_amount: parse_money("late_fee_amount", row.late_fee_amount)?,
            interest_amount: parse_money("interest_amount", row.interest_amount)?,
            capital_amount:  parse_money("capital_amount", row.capital_amount)?,
            advance_amount:  parse_money("advance_amount", row.advance_amount)?,
        })
    }
}

impl LoanStore {
    // ── Payment ───────────────────────────────────────────────────

    pub fn insert_payment(&self, p: &Payment) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO payment (
                payment_id, loan_id, amount, payment_date, is_late, late_fee,
                late_fee_amount, interest_amount, capital_amount, advance_amount
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &p.payment_id,
                &p.loan_id,
                p.amount.to_string(),
                p.payment_date,
                if p.is_late { 1 } else { 0 },
                p.late_fee.to_string(),
                p.late_fee_amount.to_string(),
                p.interest_amount.to_string(),
                p.capital_amount.to_string(),
                p.advance_amount.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Payments for one loan, most recent first.
    pub fn list_payments_for_loan(&self, loan_id: &str) -> LedgerResult<Vec<Payment>> {
        let mut stmt = self.conn.prepare(
            "SELECT payment_id, loan_id, amount, payment_date, is_late, late_fee,
                    late_fee_amount, interest_amount, capital_amount, advance_amount
             FROM payment WHERE loan_id = ?1
             ORDER BY payment_date DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map(params![loan_id], PaymentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Payment::try_from).collect()
    }
}
