//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The ledger calls store methods; it never executes SQL directly.

use crate::{
    error::{LedgerError, LedgerResult},
    event::{EventLogEntry, LedgerEvent},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use std::str::FromStr;

mod loan;
mod payment;

pub struct LoanStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl LoanStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// A second connection to the same database file, e.g. for another
    /// ledger handle. An in-memory store has nothing to share and yields a
    /// fresh empty database.
    pub fn reopen(&self) -> LedgerResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_loans.sql"))?;
        Ok(())
    }

    /// Run `f` inside one IMMEDIATE transaction: the write lock is taken
    /// up front, so two writers on the same database serialize here.
    /// Any error rolls everything back.
    pub fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Self) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, event: &LedgerEvent, recorded_at: DateTime<Utc>) -> LedgerResult<()> {
        let entry = EventLogEntry::from_event(event, recorded_at)?;
        self.conn.execute(
            "INSERT INTO ledger_event (loan_id, event_type, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.loan_id, entry.event_type, entry.payload, entry.recorded_at],
        )?;
        Ok(())
    }

    pub fn events_for_loan(&self, loan_id: &str) -> LedgerResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, loan_id, event_type, payload, recorded_at
             FROM ledger_event WHERE loan_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![loan_id], |row| {
                Ok(EventLogEntry {
                    id:          Some(row.get(0)?),
                    loan_id:     row.get(1)?,
                    event_type:  row.get(2)?,
                    payload:     row.get(3)?,
                    recorded_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

/// Money columns hold `Decimal::to_string` text.
fn parse_money(field: &'static str, text: String) -> LedgerResult<Decimal> {
    Decimal::from_str(&text).map_err(|_| LedgerError::InvalidRecord { field, value: text })
}
