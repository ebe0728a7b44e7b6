//! Ledger audit events.
//!
//! RULE: every persisted state change appends exactly one event per fact.
//! Variants are added over time, never removed or reordered.

use crate::types::{LoanId, LoanStatus, PaymentId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    LoanCreated {
        loan_id:            LoanId,
        amount:             Decimal,
        installments:       u32,
        installment_amount: Option<Decimal>,
    },
    PaymentRecorded {
        loan_id:    LoanId,
        payment_id: PaymentId,
        amount:     Decimal,
        late_fee:   Decimal,
        interest:   Decimal,
        capital:    Decimal,
        advance:    Decimal,
    },
    InstallmentRecalculated {
        loan_id:                LoanId,
        remaining_balance:      Decimal,
        installment_amount:     Decimal,
        remaining_installments: i64,
    },
    LoanCompleted {
        loan_id: LoanId,
    },
    StatusChanged {
        loan_id: LoanId,
        from:    LoanStatus,
        to:      LoanStatus,
    },
}

impl LedgerEvent {
    pub fn loan_id(&self) -> &str {
        match self {
            LedgerEvent::LoanCreated { loan_id, .. }
            | LedgerEvent::PaymentRecorded { loan_id, .. }
            | LedgerEvent::InstallmentRecalculated { loan_id, .. }
            | LedgerEvent::LoanCompleted { loan_id }
            | LedgerEvent::StatusChanged { loan_id, .. } => loan_id,
        }
    }

    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            LedgerEvent::LoanCreated { .. }             => "loan_created",
            LedgerEvent::PaymentRecorded { .. }         => "payment_recorded",
            LedgerEvent::InstallmentRecalculated { .. } => "installment_recalculated",
            LedgerEvent::LoanCompleted { .. }           => "loan_completed",
            LedgerEvent::StatusChanged { .. }           => "status_changed",
        }
    }
}

/// One row of the ledger_event table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:          Option<i64>,
    pub loan_id:     LoanId,
    pub event_type:  String,
    pub payload:     String,
    pub recorded_at: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn from_event(event: &LedgerEvent, recorded_at: DateTime<Utc>) -> serde_json::Result<Self> {
        Ok(Self {
            id:          None,
            loan_id:     event.loan_id().to_string(),
            event_type:  event.type_name().to_string(),
            payload:     serde_json::to_string(event)?,
            recorded_at,
        })
    }

    pub fn decode(&self) -> serde_json::Result<LedgerEvent> {
        serde_json::from_str(&self.payload)
    }
}
