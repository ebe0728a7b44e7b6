//! Microloan ledger core: amortization, payment breakdown, loan lifecycle,
//! and the SQLite-backed ledger built on them.

pub mod amortization;
pub mod breakdown;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod lifecycle;
pub mod model;
pub mod report;
pub mod store;
pub mod types;

pub use breakdown::PaymentCalculator;
pub use error::{LedgerError, LedgerResult};
pub use ledger::{LoanLedger, PaymentReceipt};
pub use model::{Loan, LoanUpdate, NewLoan, Payment, PaymentBreakdown};
