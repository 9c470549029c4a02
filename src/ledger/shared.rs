use std::sync::Arc;

use parking_lot::RwLock;

use super::{
    Amount, CommandOutcome, InterestRate, Ledger, LedgerCommand, LedgerError, LedgerSnapshot, Loan,
    LoanId, RepaymentOutcome, User,
};

/// Cloneable handle for concurrent callers.
///
/// Each mutator holds the write lock for its whole validate-then-mutate step;
/// queries hold the read lock and hand back owned copies.
#[derive(Clone, Debug, Default)]
pub struct SharedLedger {
    inner: Arc<RwLock<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    pub fn register(&self, name: &str, wallet: Amount) -> Result<(), LedgerError> {
        self.inner.write().register(name, wallet)
    }

    pub fn create_loan(
        &self,
        borrower: &str,
        principal: Amount,
        interest: InterestRate,
    ) -> Result<LoanId, LedgerError> {
        self.inner.write().create_loan(borrower, principal, interest)
    }

    pub fn repay_loan(
        &self,
        loan_id: &LoanId,
        payment: Amount,
    ) -> Result<RepaymentOutcome, LedgerError> {
        self.inner.write().repay_loan(loan_id, payment)
    }

    pub fn execute(&self, command: LedgerCommand) -> Result<CommandOutcome, LedgerError> {
        self.inner.write().execute(command)
    }

    pub fn query_user(&self, name: &str) -> Result<User, LedgerError> {
        self.inner.read().query_user(name).cloned()
    }

    pub fn query_loan(&self, loan_id: &LoanId) -> Result<Loan, LedgerError> {
        self.inner.read().query_loan(loan_id).cloned()
    }

    pub fn loans_of(&self, name: &str) -> Result<Vec<Loan>, LedgerError> {
        let ledger = self.inner.read();
        Ok(ledger.loans_of(name)?.into_iter().cloned().collect())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.inner.read().snapshot()
    }

    /// Runs `f` against a consistent view of the ledger.
    pub fn read<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.inner.read())
    }
}

impl From<Ledger> for SharedLedger {
    fn from(ledger: Ledger) -> Self {
        Self::new(ledger)
    }
}
