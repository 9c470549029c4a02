use std::collections::BTreeMap;

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{LedgerConfig, OverpaymentPolicy};

mod command;
mod registry;
mod shared;

pub use command::{CommandOutcome, LedgerCommand};
pub use registry::{
    InterestRate, Loan, LoanId, LoanIdParseError, LoanRegistry, User, UserRegistry,
};
pub use shared::SharedLedger;

pub type UserName = String;
pub type Amount = BigUint;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown user {name}")]
    UserNotFound { name: UserName },
    #[error("user {name} is already registered")]
    DuplicateUser { name: UserName },
    #[error("user name must not be empty")]
    InvalidName,
    #[error("unknown loan {loan_id}")]
    LoanNotFound { loan_id: LoanId },
    #[error("loan {loan_id} is already repaid")]
    AlreadyRepaid { loan_id: LoanId },
    #[error("insufficient funds for {name}: requires {required}, wallet holds {available}")]
    InsufficientFunds {
        name: UserName,
        required: Amount,
        available: Amount,
    },
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Amount, reason: &'static str },
    #[error("invalid interest rate {rate}")]
    InvalidInterestRate { rate: InterestRate },
}

impl LedgerError {
    /// Stable identifier for callers that branch on the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::UserNotFound { .. } => "user_not_found",
            LedgerError::DuplicateUser { .. } => "duplicate_user",
            LedgerError::InvalidName => "invalid_name",
            LedgerError::LoanNotFound { .. } => "loan_not_found",
            LedgerError::AlreadyRepaid { .. } => "already_repaid",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::InvalidAmount { .. } => "invalid_amount",
            LedgerError::InvalidInterestRate { .. } => "invalid_interest_rate",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepaymentOutcome {
    /// The loan is settled; `paid` is the amount actually taken from the wallet.
    Repaid {
        #[serde(with = "serde_amount")]
        paid: Amount,
    },
    PartiallyRepaid {
        #[serde(with = "serde_amount")]
        remaining: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LedgerSnapshot {
    pub next_loan_id: LoanId,
    pub users: BTreeMap<UserName, User>,
    pub loans: BTreeMap<LoanId, Loan>,
    /// Hex SHA-256 merkle root over users and loans.
    pub state_root: String,
}

/// In-memory lending ledger. Sole owner and mutator of users and loans.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    config: LedgerConfig,
    users: UserRegistry,
    loans: LoanRegistry,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub fn loans(&self) -> &LoanRegistry {
        &self.loans
    }

    pub fn register(&mut self, name: &str, wallet: Amount) -> Result<(), LedgerError> {
        self.users
            .register(name, wallet.clone())
            .inspect_err(|err| debug!(%name, error = %err, "registration rejected"))?;
        info!(%name, %wallet, "user registered");
        Ok(())
    }

    pub fn create_loan(
        &mut self,
        borrower: &str,
        principal: Amount,
        interest: InterestRate,
    ) -> Result<LoanId, LedgerError> {
        let user = self
            .users
            .lookup_mut(borrower)
            .inspect_err(|err| debug!(%borrower, error = %err, "loan rejected"))?;
        if principal.is_zero() {
            debug!(%borrower, "loan rejected: zero principal");
            return Err(LedgerError::InvalidAmount {
                amount: principal,
                reason: "principal must be positive",
            });
        }
        if !interest.is_valid() {
            debug!(%borrower, %interest, "loan rejected: bad interest rate");
            return Err(LedgerError::InvalidInterestRate { rate: interest });
        }

        user.borrowed += &principal;
        let loan_id = self.loans.issue(borrower, principal.clone(), interest);
        info!(%loan_id, %borrower, %principal, %interest, "loan issued");
        Ok(loan_id)
    }

    /// Applies a payment against an active loan.
    ///
    /// Validation happens in full before any state is touched:
    /// * the loan must exist and still be active;
    /// * the payment must be positive and, under [`OverpaymentPolicy::Reject`],
    ///   no larger than the outstanding principal (under
    ///   [`OverpaymentPolicy::Settle`] it is clamped to it);
    /// * the principal left after the payment must not exceed the borrower's
    ///   wallet, and the wallet must cover the payment itself.
    pub fn repay_loan(
        &mut self,
        loan_id: &LoanId,
        payment: Amount,
    ) -> Result<RepaymentOutcome, LedgerError> {
        self.validate_repayment(loan_id, payment)
            .and_then(|(borrower, applied, remaining)| {
                self.apply_repayment(loan_id, &borrower, applied, remaining)
            })
            .inspect_err(|err| debug!(%loan_id, error = %err, "repayment rejected"))
    }

    fn validate_repayment(
        &self,
        loan_id: &LoanId,
        payment: Amount,
    ) -> Result<(UserName, Amount, Amount), LedgerError> {
        let loan = self.loans.lookup(loan_id)?;
        if loan.repaid {
            return Err(LedgerError::AlreadyRepaid { loan_id: *loan_id });
        }
        if payment.is_zero() {
            return Err(LedgerError::InvalidAmount {
                amount: payment,
                reason: "payment must be positive",
            });
        }
        let applied = if payment > loan.amount {
            match self.config.overpayment {
                OverpaymentPolicy::Reject => {
                    return Err(LedgerError::InvalidAmount {
                        amount: payment,
                        reason: "payment exceeds outstanding principal",
                    })
                }
                OverpaymentPolicy::Settle => loan.amount.clone(),
            }
        } else {
            payment
        };
        let remaining = &loan.amount - &applied;

        let borrower = self.users.lookup(&loan.borrower)?;
        // The remaining principal, not the payment, is weighed against the wallet.
        if remaining > borrower.wallet {
            return Err(LedgerError::InsufficientFunds {
                name: borrower.name.clone(),
                required: remaining,
                available: borrower.wallet.clone(),
            });
        }
        if applied > borrower.wallet {
            return Err(LedgerError::InsufficientFunds {
                name: borrower.name.clone(),
                required: applied,
                available: borrower.wallet.clone(),
            });
        }
        Ok((borrower.name.clone(), applied, remaining))
    }

    fn apply_repayment(
        &mut self,
        loan_id: &LoanId,
        borrower: &str,
        applied: Amount,
        remaining: Amount,
    ) -> Result<RepaymentOutcome, LedgerError> {
        let user = self.users.lookup_mut(borrower)?;
        let loan = self.loans.lookup_mut(loan_id)?;
        user.wallet -= &applied;
        user.borrowed -= &applied;

        if remaining.is_zero() {
            loan.repaid = true;
            loan.amount = Amount::zero();
            info!(%loan_id, %borrower, paid = %applied, "loan repaid");
            Ok(RepaymentOutcome::Repaid { paid: applied })
        } else {
            loan.amount = remaining.clone();
            info!(%loan_id, %borrower, paid = %applied, %remaining, "loan partially repaid");
            Ok(RepaymentOutcome::PartiallyRepaid { remaining })
        }
    }

    pub fn query_user(&self, name: &str) -> Result<&User, LedgerError> {
        self.users.lookup(name)
    }

    pub fn query_loan(&self, loan_id: &LoanId) -> Result<&Loan, LedgerError> {
        self.loans.lookup(loan_id)
    }

    /// Loans borrowed by `name`, in issuance order.
    pub fn loans_of(&self, name: &str) -> Result<Vec<&Loan>, LedgerError> {
        self.users.lookup(name)?;
        Ok(self.loans.borrowed_by(name))
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let users: BTreeMap<_, _> = self
            .users
            .iter()
            .map(|user| (user.name.clone(), user.clone()))
            .collect();
        let loans: BTreeMap<_, _> = self.loans.iter().map(|loan| (loan.id, loan.clone())).collect();
        LedgerSnapshot {
            next_loan_id: self.loans.next_id(),
            state_root: hex::encode(compute_state_root(&users, &loans)),
            users,
            loans,
        }
    }
}

fn compute_state_root(
    users: &BTreeMap<UserName, User>,
    loans: &BTreeMap<LoanId, Loan>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for user in users.values() {
        let mut hasher = Sha256::new();
        hasher.update(b"user");
        update_field(&mut hasher, user.name.as_bytes());
        update_field(&mut hasher, &user.wallet.to_bytes_le());
        update_field(&mut hasher, &user.borrowed.to_bytes_le());
        leaves.push(hasher.finalize().into());
    }
    for loan in loans.values() {
        let mut hasher = Sha256::new();
        hasher.update(b"loan");
        hasher.update(loan.id.sequence().to_le_bytes());
        update_field(&mut hasher, loan.borrower.as_bytes());
        update_field(&mut hasher, &loan.principal.to_bytes_le());
        update_field(&mut hasher, &loan.amount.to_bytes_le());
        hasher.update(loan.interest.0.to_bits().to_le_bytes());
        hasher.update([u8::from(loan.repaid)]);
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"lending-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

/// Amounts travel as base-10 strings; plain JSON integers are accepted on input.
pub mod serde_amount {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::Amount;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => {
                if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(D::Error::custom(format!(
                        "amount {text:?} is not a base-10 integer"
                    )));
                }
                text.parse::<Amount>().map_err(D::Error::custom)
            }
            Repr::Number(n) => Ok(Amount::from(n)),
        }
    }
}
