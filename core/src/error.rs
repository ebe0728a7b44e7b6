use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid loan state for '{loan_id}': {reason}")]
    InvalidLoanState { loan_id: String, reason: String },

    #[error("Invalid payment amount: {amount}")]
    InvalidPaymentAmount { amount: Decimal },

    #[error("Arithmetic out of range for '{loan_id}' while computing {operation}")]
    ArithmeticDegenerate { loan_id: String, operation: &'static str },

    #[error("Loan '{loan_id}' not found")]
    LoanNotFound { loan_id: String },

    #[error("Loan '{loan_id}' changed since version {expected_version} was read")]
    StaleLoanSnapshot { loan_id: String, expected_version: i64 },

    #[error("Invalid stored value for {field}: '{value}'")]
    InvalidRecord { field: &'static str, value: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn invalid_loan(loan_id: &str, reason: impl Into<String>) -> Self {
        LedgerError::InvalidLoanState {
            loan_id: loan_id.to_string(),
            reason:  reason.into(),
        }
    }

    pub fn degenerate(loan_id: &str, operation: &'static str) -> Self {
        LedgerError::ArithmeticDegenerate { loan_id: loan_id.to_string(), operation }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
