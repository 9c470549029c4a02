//! Borrower and loan accounting over arbitrary-precision amounts.
//!
//! * [`ledger`]: the state machine: user and loan registries, issuance,
//!   repayment, snapshots, and a lock-guarded handle for concurrent callers.
//! * [`config`]: ledger policy loaded from JSON.
//! * [`script`]: JSON-lines command driver used by the CLI.
//! * [`chain`]: the boundary to an external settlement network; the ledger
//!   itself never calls into it.

pub mod chain;
pub mod config;
pub mod ledger;
pub mod script;

pub use config::{LedgerConfig, OverpaymentPolicy};
pub use ledger::{
    Amount, Ledger, LedgerError, LedgerSnapshot, Loan, LoanId, RepaymentOutcome, SharedLedger,
    User,
};
