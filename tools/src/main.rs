//! loan-desk: operator front end for the microloan ledger.
//!
//! Usage:
//!   loan-desk --db loans.db --data-dir ./data            (JSON-lines on stdin)
//!   loan-desk --db loans.db --summary
//!
//! Amounts may be sent as JSON numbers or as decimal strings ("125.50");
//! responses always carry them as strings.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use microloan_core::{
    clock::SystemClock,
    config::LendingConfig,
    model::NewLoan,
    store::LoanStore,
    types::LoanStatus,
    LoanLedger,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::env;
use std::io::{self, BufRead, Write};

/// One request per input line.
#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeskRequest {
    CreateLoan {
        #[serde(flatten)]
        terms: NewLoan,
    },
    GetLoan {
        loan_id: String,
    },
    ListLoans,
    PreviewPayment {
        loan_id: String,
        amount:  Decimal,
    },
    RecordPayment {
        loan_id: String,
        amount:  Decimal,
        #[serde(default)]
        apply_advance_to_capital: bool,
    },
    Payments {
        loan_id: String,
    },
    SetStatus {
        loan_id: String,
        status:  LoanStatus,
    },
    Report {
        #[serde(default)]
        date: Option<NaiveDate>,
    },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let summary_only = args.iter().any(|a| a == "--summary");

    let config = LendingConfig::load_or_default(data_dir)?;
    let store = LoanStore::open(db)?;
    store.migrate()?;
    log::info!("loan-desk: db={db} data_dir={data_dir}");

    let ledger = LoanLedger::new(store, config, Box::new(SystemClock));

    if summary_only {
        print_summary(&ledger)
    } else {
        run_request_loop(&ledger)
    }
}

fn run_request_loop(ledger: &LoanLedger) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let request: DeskRequest = match serde_json::from_str(&buffer) {
            Ok(r) => r,
            Err(e) => {
                writeln!(stdout, "{}", json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(request, DeskRequest::Quit) {
            break;
        }

        let response = match handle_request(ledger, request) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("request failed: {e}");
                json!({ "error": e.to_string() })
            }
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_request(ledger: &LoanLedger, request: DeskRequest) -> Result<Value> {
    let value = match request {
        DeskRequest::CreateLoan { terms } => serde_json::to_value(ledger.create_loan(terms)?)?,
        DeskRequest::GetLoan { loan_id } => serde_json::to_value(ledger.get_loan(&loan_id)?)?,
        DeskRequest::ListLoans => serde_json::to_value(ledger.list_loans()?)?,
        DeskRequest::PreviewPayment { loan_id, amount } => {
            serde_json::to_value(ledger.preview_payment(&loan_id, amount)?)?
        }
        DeskRequest::RecordPayment { loan_id, amount, apply_advance_to_capital } => {
            serde_json::to_value(ledger.record_payment(&loan_id, amount, apply_advance_to_capital)?)?
        }
        DeskRequest::Payments { loan_id } => serde_json::to_value(ledger.loan_payments(&loan_id)?)?,
        DeskRequest::SetStatus { loan_id, status } => {
            serde_json::to_value(ledger.set_status(&loan_id, status)?)?
        }
        DeskRequest::Report { date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            serde_json::to_value(ledger.daily_report(date)?)?
        }
        DeskRequest::Quit => Value::Null,
    };
    Ok(value)
}

fn print_summary(ledger: &LoanLedger) -> Result<()> {
    let loans = ledger.list_loans()?;
    let outstanding: Decimal = loans
        .iter()
        .filter(|l| l.status == LoanStatus::Active)
        .map(|l| l.remaining_balance)
        .sum();

    println!("=== LOAN BOOK ===");
    for l in &loans {
        println!(
            "  {} | {:<20} | {:>10.2} | bal {:>10.2} | {:<9} | next {}",
            &l.loan_id[..8.min(l.loan_id.len())],
            l.client_name,
            l.amount,
            l.remaining_balance,
            l.status.as_str(),
            l.next_payment_date.format("%Y-%m-%d"),
        );
    }
    println!();
    println!("  loans:       {}", loans.len());
    println!("  outstanding: {outstanding:.2}");
    Ok(())
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
