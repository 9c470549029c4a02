//! JSON-lines driver: one [`LedgerCommand`] in, one result record out.

use std::io::{self, BufRead, Write};

use serde::Serialize;
use tracing::warn;

use crate::ledger::{
    Amount, CommandOutcome, InterestRate, Ledger, LedgerCommand, LedgerError, LedgerSnapshot,
    LoanRegistry,
};

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Record<'a> {
    Ok(&'a CommandOutcome),
    Error {
        line: usize,
        kind: &'static str,
        message: String,
    },
    Snapshot(&'a LedgerSnapshot),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScriptSummary {
    pub applied: usize,
    pub rejected: usize,
    pub malformed: usize,
}

fn write_record<W: Write>(out: &mut W, record: &Record<'_>) -> io::Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    out.write_all(b"\n")
}

fn emit<W: Write>(
    out: &mut W,
    line: usize,
    result: &Result<CommandOutcome, LedgerError>,
    summary: &mut ScriptSummary,
) -> io::Result<()> {
    match result {
        Ok(outcome) => {
            summary.applied += 1;
            write_record(out, &Record::Ok(outcome))
        }
        Err(err) => {
            summary.rejected += 1;
            write_record(
                out,
                &Record::Error {
                    line,
                    kind: err.kind(),
                    message: err.to_string(),
                },
            )
        }
    }
}

/// Applies every command read from `input`, writing one record per command.
///
/// Blank lines and `#` comments are skipped. A line that does not parse is
/// reported as a `parse_error` record and the script carries on.
pub fn run_script<R: BufRead, W: Write>(
    ledger: &mut Ledger,
    input: R,
    out: &mut W,
) -> io::Result<ScriptSummary> {
    let mut summary = ScriptSummary::default();
    for (idx, line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<LedgerCommand>(trimmed) {
            Ok(command) => {
                let result = ledger.execute(command);
                emit(out, line_no, &result, &mut summary)?;
            }
            Err(err) => {
                warn!(line = line_no, error = %err, "malformed command");
                summary.malformed += 1;
                write_record(
                    out,
                    &Record::Error {
                        line: line_no,
                        kind: "parse_error",
                        message: err.to_string(),
                    },
                )?;
            }
        }
    }
    Ok(summary)
}

/// Applies an in-memory command list, numbering records from 1.
pub fn run_commands<W: Write>(
    ledger: &mut Ledger,
    commands: impl IntoIterator<Item = LedgerCommand>,
    out: &mut W,
) -> io::Result<ScriptSummary> {
    let mut summary = ScriptSummary::default();
    for (idx, command) in commands.into_iter().enumerate() {
        let result = ledger.execute(command);
        emit(out, idx + 1, &result, &mut summary)?;
    }
    Ok(summary)
}

pub fn write_snapshot<W: Write>(ledger: &Ledger, out: &mut W) -> io::Result<()> {
    write_record(out, &Record::Snapshot(&ledger.snapshot()))
}

/// The walkthrough the ledger was first exercised with: Alice and Bob sign
/// up, Alice borrows 75 and then tries to pay back 85.
pub fn demo_commands() -> Vec<LedgerCommand> {
    let first_loan = LoanRegistry::new().next_id();
    vec![
        LedgerCommand::Register {
            name: "Alice".into(),
            wallet: Amount::from(100u32),
        },
        LedgerCommand::Register {
            name: "Bob".into(),
            wallet: Amount::from(50u32),
        },
        LedgerCommand::CreateLoan {
            borrower: "Alice".into(),
            principal: Amount::from(75u32),
            interest: InterestRate(0.1),
        },
        LedgerCommand::RepayLoan {
            loan_id: first_loan,
            payment: Amount::from(85u32),
        },
        LedgerCommand::QueryUser {
            name: "Alice".into(),
        },
        LedgerCommand::QueryLoan {
            loan_id: first_loan,
        },
    ]
}
