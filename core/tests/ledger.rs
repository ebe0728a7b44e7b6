//! Ledger tests: origination, payment recording, completion,
//! re-amortization and the audit trail, against an in-memory store,
//! plus two ledger handles sharing one database file.

use chrono::{DateTime, Duration, TimeZone, Utc};
use microloan_core::{
    clock::{Clock, FixedClock},
    config::LendingConfig,
    event::LedgerEvent,
    model::NewLoan,
    store::LoanStore,
    types::{LoanStatus, PaymentFrequency},
    LedgerError, LoanLedger, PaymentCalculator,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use uuid::Uuid;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
}

fn build() -> (LoanLedger, FixedClock) {
    let clock = FixedClock::new(start());
    let ledger = LoanLedger::build_test(clock.clone()).expect("build test ledger");
    (ledger, clock)
}

fn terms(amount: Decimal, rate: Decimal, installments: u32, frequency: PaymentFrequency) -> NewLoan {
    NewLoan {
        client_name:       "María Torres".into(),
        amount,
        interest_rate:     rate,
        installments:      Some(installments),
        payment_frequency: Some(frequency),
        grace_period:      None,
        apply_advance_to_capital: false,
    }
}

/// A database file removed again when the test ends.
struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        Self { path: std::env::temp_dir().join(format!("microloan-{}.db", Uuid::new_v4())) }
    }

    fn open(&self) -> LoanStore {
        let store = LoanStore::open(self.path.to_str().expect("utf-8 temp path")).expect("open db file");
        store.migrate().expect("migrate");
        store
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

fn ledger_on(store: LoanStore, clock: &FixedClock) -> LoanLedger {
    LoanLedger::new(store, LendingConfig::default(), Box::new(clock.clone()))
}

#[test]
fn new_loan_derives_schedule() {
    let (ledger, _) = build();
    let loan = ledger
        .create_loan(terms(dec!(1200), Decimal::ZERO, 4, PaymentFrequency::Weekly))
        .unwrap();

    assert_eq!(loan.remaining_balance, dec!(1200));
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.installment_amount, Some(dec!(300)));
    assert_eq!(loan.end_date, start() + Duration::days(28));
    assert_eq!(loan.next_payment_date, start() + Duration::days(7));
    assert_eq!(loan.grace_period, 3, "grace period defaults from config");
    assert_eq!(loan.capital_advance, Decimal::ZERO);

    let stored = ledger.get_loan(&loan.loan_id).unwrap();
    assert_eq!(stored, loan);
}

#[test]
fn single_installment_loan_has_no_schedule_amount() {
    let (ledger, _) = build();
    let loan = ledger
        .create_loan(terms(dec!(500), dec!(10), 1, PaymentFrequency::Monthly))
        .unwrap();
    assert_eq!(loan.installment_amount, None);
    // Monthly first due date follows the calendar month.
    assert_eq!(loan.next_payment_date, Utc.with_ymd_and_hms(2024, 2, 15, 10, 0, 0).unwrap());
    assert_eq!(loan.end_date, start() + Duration::days(30));
}

#[test]
fn invalid_terms_rejected() {
    let (ledger, _) = build();
    for bad in [
        terms(Decimal::ZERO, dec!(5), 3, PaymentFrequency::Weekly),
        terms(dec!(100), dec!(-1), 3, PaymentFrequency::Weekly),
        terms(dec!(100), dec!(5), 0, PaymentFrequency::Weekly),
        NewLoan { client_name: "  ".into(), ..terms(dec!(100), dec!(5), 3, PaymentFrequency::Weekly) },
    ] {
        let result = ledger.create_loan(bad);
        assert!(
            matches!(result, Err(LedgerError::InvalidLoanState { .. })),
            "expected InvalidLoanState, got {result:?}"
        );
    }
    assert!(ledger.list_loans().unwrap().is_empty());
}

#[test]
fn terms_beyond_calendar_or_decimal_range_rejected() {
    let (ledger, _) = build();
    // Ten million monthly periods end past the last representable date.
    // Fifty million daily periods fit the calendar, but the annuity growth
    // factor at 18% does not fit a Decimal.
    for bad in [
        terms(dec!(1000), dec!(18), 10_000_000, PaymentFrequency::Monthly),
        terms(dec!(1000), Decimal::ZERO, 10_000_000, PaymentFrequency::Monthly),
        terms(dec!(1000), dec!(18), 50_000_000, PaymentFrequency::Daily),
    ] {
        let result = ledger.create_loan(bad);
        assert!(
            matches!(result, Err(LedgerError::InvalidLoanState { .. })),
            "expected InvalidLoanState, got {result:?}"
        );
    }
    assert!(ledger.list_loans().unwrap().is_empty());

    // A long but representable schedule is still accepted.
    let loan = ledger
        .create_loan(terms(dec!(1000), dec!(18), 360, PaymentFrequency::Monthly))
        .unwrap();
    assert!(loan.installment_amount.unwrap() > dec!(15));
}

#[test]
fn on_time_full_payment_completes_single_loan() {
    let (ledger, clock) = build();
    let loan = ledger
        .create_loan(terms(dec!(1000), Decimal::ZERO, 1, PaymentFrequency::Monthly))
        .unwrap();
    clock.set(loan.next_payment_date);

    let receipt = ledger.record_payment(&loan.loan_id, dec!(1000), false).unwrap();
    assert_eq!(receipt.payment.capital_amount, dec!(1000));
    assert_eq!(receipt.payment.late_fee, Decimal::ZERO);
    assert!(!receipt.payment.is_late);
    assert_eq!(receipt.loan.remaining_balance, Decimal::ZERO);
    assert_eq!(receipt.loan.status, LoanStatus::Completed);

    let stored = ledger.get_loan(&loan.loan_id).unwrap();
    assert_eq!(stored.status, LoanStatus::Completed);
    assert_eq!(stored.version, 1);
    assert_eq!(stored, receipt.loan);
}

#[test]
fn late_payment_records_fee_twice_and_flags_late() {
    let (ledger, clock) = build();
    let loan = ledger
        .create_loan(terms(dec!(1000), Decimal::ZERO, 1, PaymentFrequency::Monthly))
        .unwrap();
    clock.set(loan.next_payment_date + Duration::days(40));

    let receipt = ledger.record_payment(&loan.loan_id, dec!(19), false).unwrap();
    let p = &receipt.payment;
    assert!(p.is_late);
    assert_eq!(p.late_fee, p.late_fee_amount);
    assert_eq!(p.late_fee, dec!(19));
    assert_eq!(p.capital_amount, Decimal::ZERO);
    assert_eq!(p.advance_amount, Decimal::ZERO);
    assert_eq!(p.late_fee_amount + p.interest_amount + p.capital_amount + p.advance_amount, p.amount);

    let stored = ledger.get_loan(&loan.loan_id).unwrap();
    assert_eq!(stored.remaining_balance, dec!(1000));
    assert_eq!(stored.status, LoanStatus::Active);
    assert_eq!(ledger.loan_payments(&loan.loan_id).unwrap(), vec![receipt.payment]);
}

#[test]
fn balance_never_increases_across_payments() {
    let (ledger, clock) = build();
    let loan = ledger
        .create_loan(terms(dec!(2000), dec!(30), 8, PaymentFrequency::Biweekly))
        .unwrap();
    let installment = loan.installment_amount.unwrap();

    let mut balance = loan.remaining_balance;
    for (days, amount) in [
        (15, installment),
        (20, installment * dec!(0.5)),
        (45, installment * dec!(2)),
        (10, Decimal::ZERO),
    ] {
        clock.advance_days(days);
        let receipt = ledger.record_payment(&loan.loan_id, amount, false).unwrap();
        let p = &receipt.payment;
        assert_eq!(p.late_fee + p.interest_amount + p.capital_amount + p.advance_amount, amount);
        assert!(
            receipt.loan.remaining_balance <= balance,
            "balance rose from {balance} to {}", receipt.loan.remaining_balance
        );
        balance = receipt.loan.remaining_balance;
    }
    assert_eq!(ledger.loan_payments(&loan.loan_id).unwrap().len(), 4);
}

#[test]
fn buffered_advance_accumulates() {
    let (ledger, clock) = build();
    let loan = ledger
        .create_loan(terms(dec!(1200), Decimal::ZERO, 4, PaymentFrequency::Weekly))
        .unwrap();
    clock.set(loan.next_payment_date);

    ledger.record_payment(&loan.loan_id, dec!(350), false).unwrap();
    clock.advance_days(7);
    let receipt = ledger.record_payment(&loan.loan_id, dec!(320), false).unwrap();

    assert_eq!(receipt.loan.capital_advance, dec!(70));
    assert_eq!(receipt.loan.remaining_balance, dec!(600));
    assert_eq!(receipt.loan.installment_amount, Some(dec!(300)));
}

#[test]
fn advance_to_capital_reamortizes_and_is_logged() {
    let (ledger, clock) = build();
    let loan = ledger
        .create_loan(terms(dec!(1200), Decimal::ZERO, 4, PaymentFrequency::Weekly))
        .unwrap();
    clock.set(loan.next_payment_date);

    // 300 scheduled capital + 300 advance; 21 days (3 weeks) remain.
    let receipt = ledger.record_payment(&loan.loan_id, dec!(600), true).unwrap();
    assert_eq!(receipt.payment.capital_amount, dec!(300));
    assert_eq!(receipt.payment.advance_amount, dec!(300));

    // Only the advance comes off the balance on this branch.
    assert_eq!(receipt.loan.remaining_balance, dec!(900));
    assert_eq!(receipt.loan.installment_amount, Some(dec!(300)));
    assert_eq!(receipt.loan.capital_advance, Decimal::ZERO);
    assert!(receipt.loan.apply_advance_to_capital);

    let entries = ledger.store().events_for_loan(&loan.loan_id).unwrap();
    let types: Vec<&str> = entries.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["loan_created", "payment_recorded", "installment_recalculated"]);

    assert_eq!(
        entries[2].decode().unwrap(),
        LedgerEvent::InstallmentRecalculated {
            loan_id:                loan.loan_id.clone(),
            remaining_balance:      dec!(900),
            installment_amount:     dec!(300),
            remaining_installments: 3,
        }
    );
}

#[test]
fn advance_after_end_date_closes_out_loan() {
    let (ledger, clock) = build();
    let loan = ledger
        .create_loan(terms(dec!(1200), dec!(12), 4, PaymentFrequency::Weekly))
        .unwrap();
    clock.set(loan.end_date + Duration::days(2));

    let receipt = ledger.record_payment(&loan.loan_id, dec!(5000), true).unwrap();
    assert!(receipt.payment.advance_amount > Decimal::ZERO);
    assert_eq!(receipt.loan.installment_amount, Some(Decimal::ZERO));
    assert_eq!(receipt.loan.remaining_balance, Decimal::ZERO);
    assert_eq!(receipt.loan.capital_advance, Decimal::ZERO);
    assert_eq!(receipt.loan.status, LoanStatus::Completed);

    let last = ledger.store().events_for_loan(&loan.loan_id).unwrap().pop().unwrap();
    assert_eq!(last.event_type, "loan_completed");
}

#[test]
fn preview_does_not_persist() {
    let (ledger, clock) = build();
    let loan = ledger
        .create_loan(terms(dec!(800), dec!(20), 1, PaymentFrequency::Weekly))
        .unwrap();
    clock.set(loan.next_payment_date + Duration::days(14));

    let preview = ledger.preview_payment(&loan.loan_id, dec!(900)).unwrap();
    assert!(preview.late_fee > Decimal::ZERO);
    assert!(preview.interest > Decimal::ZERO);
    assert_eq!(preview.total, dec!(900));
    assert_eq!(preview.components_sum(), dec!(900));

    assert!(ledger.loan_payments(&loan.loan_id).unwrap().is_empty());
    assert_eq!(ledger.get_loan(&loan.loan_id).unwrap(), loan);
}

#[test]
fn unknown_loan_is_not_found() {
    let (ledger, _) = build();
    assert!(matches!(
        ledger.record_payment("missing", dec!(10), false),
        Err(LedgerError::LoanNotFound { .. })
    ));
    assert!(matches!(ledger.get_loan("missing"), Err(LedgerError::LoanNotFound { .. })));
}

#[test]
fn rejected_payment_leaves_no_trace() {
    let (ledger, _) = build();
    let loan = ledger
        .create_loan(terms(dec!(300), dec!(5), 3, PaymentFrequency::Daily))
        .unwrap();
    assert!(matches!(
        ledger.record_payment(&loan.loan_id, dec!(-5), false),
        Err(LedgerError::InvalidPaymentAmount { .. })
    ));
    assert!(ledger.loan_payments(&loan.loan_id).unwrap().is_empty());
    assert_eq!(ledger.store().events_for_loan(&loan.loan_id).unwrap().len(), 1);
}

#[test]
fn default_is_administrative_only() {
    let (ledger, clock) = build();
    let loan = ledger
        .create_loan(terms(dec!(500), dec!(10), 5, PaymentFrequency::Monthly))
        .unwrap();
    clock.advance_days(400);
    ledger.record_payment(&loan.loan_id, dec!(10), false).unwrap();
    assert_eq!(ledger.get_loan(&loan.loan_id).unwrap().status, LoanStatus::Active);

    let defaulted = ledger.set_status(&loan.loan_id, LoanStatus::Defaulted).unwrap();
    assert_eq!(defaulted.status, LoanStatus::Defaulted);
    assert_eq!(ledger.get_loan(&loan.loan_id).unwrap(), defaulted);

    let last = ledger.store().events_for_loan(&loan.loan_id).unwrap().pop().unwrap();
    assert_eq!(last.event_type, "status_changed");
}

#[test]
fn second_connection_cannot_write_from_a_stale_snapshot() {
    let db = TempDb::new();
    let clock = FixedClock::new(start());
    let first_store = db.open();
    let second_store = first_store.reopen().unwrap();
    let first = ledger_on(first_store, &clock);
    let second = ledger_on(second_store, &clock);

    let loan = first
        .create_loan(terms(dec!(1200), Decimal::ZERO, 4, PaymentFrequency::Weekly))
        .unwrap();
    clock.set(loan.next_payment_date);

    // The second handle reads the loan, then the first handle pays.
    let snapshot = second.get_loan(&loan.loan_id).unwrap();
    first.record_payment(&loan.loan_id, dec!(300), false).unwrap();

    // Applying the same payment to the old snapshot would double-count it.
    let calc = PaymentCalculator::default();
    let breakdown = calc.calculate_payment_breakdown(&snapshot, dec!(300), clock.now()).unwrap();
    let update = calc.apply_payment(&snapshot, &breakdown, false, clock.now()).unwrap();
    assert!(matches!(
        second.store().update_loan(&loan.loan_id, &update, snapshot.version),
        Err(LedgerError::StaleLoanSnapshot { expected_version: 0, .. })
    ));

    // record_payment reads the loan inside its own transaction, so it sees
    // the first handle's write.
    let receipt = second.record_payment(&loan.loan_id, dec!(300), false).unwrap();
    assert_eq!(receipt.loan.remaining_balance, dec!(600));
    assert_eq!(receipt.loan.version, 2);
    assert_eq!(first.get_loan(&loan.loan_id).unwrap(), receipt.loan);
    assert_eq!(first.loan_payments(&loan.loan_id).unwrap().len(), 2);
}

#[test]
fn concurrent_payments_on_one_file_all_apply() {
    let db = TempDb::new();
    let clock = FixedClock::new(start());
    let store = db.open();
    let ledger = ledger_on(store.reopen().unwrap(), &clock);
    let loan = ledger
        .create_loan(terms(dec!(1200), Decimal::ZERO, 4, PaymentFrequency::Weekly))
        .unwrap();
    clock.set(loan.next_payment_date);

    let workers: Vec<_> = [store.reopen().unwrap(), store.reopen().unwrap()]
        .into_iter()
        .map(|worker_store| {
            let worker = ledger_on(worker_store, &clock);
            let loan_id = loan.loan_id.clone();
            std::thread::spawn(move || {
                for _ in 0..5 {
                    worker.record_payment(&loan_id, dec!(10), false).expect("payment recorded");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread");
    }

    let stored = ledger.get_loan(&loan.loan_id).unwrap();
    assert_eq!(stored.remaining_balance, dec!(1100));
    assert_eq!(stored.version, 10);
    assert_eq!(ledger.loan_payments(&loan.loan_id).unwrap().len(), 10);
}
