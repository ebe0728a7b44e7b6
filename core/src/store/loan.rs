use super::{parse_money, LoanStore};
use crate::{
    clock::add_days,
    error::{LedgerError, LedgerResult},
    model::{Loan, LoanUpdate},
    types::{LoanStatus, PaymentFrequency},
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension, Row};

const LOAN_COLUMNS: &str = "loan_id, client_name, amount, interest_rate, payment_frequency,
    start_date, end_date, grace_period, remaining_balance, status, created_at,
    installments, installment_amount, next_payment_date, capital_advance,
    apply_advance_to_capital, version";

/// A loan row as stored; enum and money columns are still text.
struct LoanRow {
    loan_id:            String,
    client_name:        String,
    amount:             String,
    interest_rate:      String,
    payment_frequency:  String,
    start_date:         DateTime<Utc>,
    end_date:           DateTime<Utc>,
    grace_period:       u32,
    remaining_balance:  String,
    status:             String,
    created_at:         DateTime<Utc>,
    installments:       u32,
    installment_amount: Option<String>,
    next_payment_date:  DateTime<Utc>,
    capital_advance:    String,
    apply_advance_to_capital: bool,
    version:            i64,
}

impl LoanRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            loan_id:            row.get(0)?,
            client_name:        row.get(1)?,
            amount:             row.get(2)?,
            interest_rate:      row.get(3)?,
            payment_frequency:  row.get(4)?,
            start_date:         row.get(5)?,
            end_date:           row.get(6)?,
            grace_period:       row.get(7)?,
            remaining_balance:  row.get(8)?,
            status:             row.get(9)?,
            created_at:         row.get(10)?,
            installments:       row.get(11)?,
            installment_amount: row.get(12)?,
            next_payment_date:  row.get(13)?,
            capital_advance:    row.get(14)?,
            apply_advance_to_capital: row.get::<_, i32>(15)? != 0,
            version:            row.get(16)?,
        })
    }
}

impl TryFrom<LoanRow> for Loan {
    type Error = LedgerError;

    fn try_from(row: LoanRow) -> LedgerResult<Self> {
        let payment_frequency = row.payment_frequency.parse::<PaymentFrequency>().map_err(|value| {
            LedgerError::InvalidRecord { field: "payment_frequency", value }
        })?;
        let status = row
            .status
            .parse::<LoanStatus>()
            .map_err(|value| LedgerError::InvalidRecord { field: "status", value })?;

        Ok(Loan {
            loan_id:            row.loan_id,
            client_name:        row.client_name,
            amount:             parse_money("amount", row.amount)?,
            interest_rate:      parse_money("interest_rate", row.interest_rate)?,
            payment_frequency,
            start_date:         row.start_date,
            end_date:           row.end_date,
            grace_period:       row.grace_period,
            remaining_balance:  parse_money("remaining_balance", row.remaining_balance)?,
            status,
            created_at:         row.created_at,
            installments:       row.installments,
            installment_amount: row
                .installment_amount
                .map(|text| parse_money("installment_amount", text))
                .transpose()?,
            next_payment_date:  row.next_payment_date,
            capital_advance:    parse_money("capital_advance", row.capital_advance)?,
            apply_advance_to_capital: row.apply_advance_to_capital,
            version:            row.version,
        })
    }
}

impl LoanStore {
    // ── Loan ──────────────────────────────────────────────────────

    pub fn insert_loan(&self, loan: &Loan) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO loan (
                loan_id, client_name, amount, interest_rate, payment_frequency,
                start_date, end_date, grace_period, remaining_balance, status, created_at,
                installments, installment_amount, next_payment_date, capital_advance,
                apply_advance_to_capital, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                &loan.loan_id,
                &loan.client_name,
                loan.amount.to_string(),
                loan.interest_rate.to_string(),
                loan.payment_frequency.as_str(),
                loan.start_date,
                loan.end_date,
                loan.grace_period,
                loan.remaining_balance.to_string(),
                loan.status.as_str(),
                loan.created_at,
                loan.installments,
                loan.installment_amount.map(|a| a.to_string()),
                loan.next_payment_date,
                loan.capital_advance.to_string(),
                if loan.apply_advance_to_capital { 1 } else { 0 },
                loan.version,
            ],
        )?;
        Ok(())
    }

    pub fn get_loan_by_id(&self, loan_id: &str) -> LedgerResult<Option<Loan>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {LOAN_COLUMNS} FROM loan WHERE loan_id = ?1"),
                params![loan_id],
                LoanRow::from_row,
            )
            .optional()?;
        row.map(Loan::try_from).transpose()
    }

    /// Like `get_loan_by_id`, but absence is an error.
    pub fn require_loan(&self, loan_id: &str) -> LedgerResult<Loan> {
        self.get_loan_by_id(loan_id)?.ok_or_else(|| LedgerError::LoanNotFound {
            loan_id: loan_id.to_string(),
        })
    }

    /// All loans, newest first.
    pub fn list_loans(&self) -> LedgerResult<Vec<Loan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOAN_COLUMNS} FROM loan ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
            .query_map([], LoanRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Loan::try_from).collect()
    }

    /// Loans whose creation falls on `date` (UTC day), newest first.
    pub fn list_loans_created_on(&self, date: NaiveDate) -> LedgerResult<Vec<Loan>> {
        let day_start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        let day_end = add_days(day_start, 1).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOAN_COLUMNS} FROM loan
             WHERE created_at >= ?1 AND created_at < ?2
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
            .query_map(params![day_start, day_end], LoanRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Loan::try_from).collect()
    }

    /// Write the mutable fields of a loan, provided nobody else has written
    /// it since `expected_version` was read. Bumps the version.
    pub fn update_loan(
        &self,
        loan_id: &str,
        update: &LoanUpdate,
        expected_version: i64,
    ) -> LedgerResult<()> {
        let changed = self.conn.execute(
            "UPDATE loan SET
                remaining_balance = ?1,
                installment_amount = ?2,
                capital_advance = ?3,
                next_payment_date = ?4,
                status = ?5,
                apply_advance_to_capital = ?6,
                version = version + 1
             WHERE loan_id = ?7 AND version = ?8",
            params![
                update.remaining_balance.to_string(),
                update.installment_amount.map(|a| a.to_string()),
                update.capital_advance.to_string(),
                update.next_payment_date,
                update.status.as_str(),
                if update.apply_advance_to_capital { 1 } else { 0 },
                loan_id,
                expected_version,
            ],
        )?;
        self.check_versioned_write(loan_id, changed, expected_version)
    }

    /// Administrative status change, version-checked like `update_loan`.
    pub fn set_loan_status(
        &self,
        loan_id: &str,
        status: LoanStatus,
        expected_version: i64,
    ) -> LedgerResult<()> {
        let changed = self.conn.execute(
            "UPDATE loan SET status = ?1, version = version + 1
             WHERE loan_id = ?2 AND version = ?3",
            params![status.as_str(), loan_id, expected_version],
        )?;
        self.check_versioned_write(loan_id, changed, expected_version)
    }

    fn check_versioned_write(
        &self,
        loan_id: &str,
        changed: usize,
        expected_version: i64,
    ) -> LedgerResult<()> {
        if changed == 1 {
            return Ok(());
        }
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT version FROM loan WHERE loan_id = ?1",
                params![loan_id],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            None => Err(LedgerError::LoanNotFound { loan_id: loan_id.to_string() }),
            Some(_) => Err(LedgerError::StaleLoanSnapshot {
                loan_id: loan_id.to_string(),
                expected_version,
            }),
        }
    }
}
