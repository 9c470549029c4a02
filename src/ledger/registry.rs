use std::{collections::BTreeMap, fmt, str::FromStr};

use num_traits::Zero;
use serde::{Deserialize, Serialize};

use super::{serde_amount, Amount, LedgerError, UserName};

const LOAN_ID_PREFIX: &str = "Loan";

/// Identifier of a loan, rendered as `Loan<n>`.
///
/// Ordering follows the sequence number, so `Loan9 < Loan10`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LoanId(u64);

impl LoanId {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{LOAN_ID_PREFIX}{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed loan id {0:?}, expected Loan<n>")]
pub struct LoanIdParseError(String);

impl FromStr for LoanId {
    type Err = LoanIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(LOAN_ID_PREFIX)
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| LoanIdParseError(s.to_string()))?;
        digits
            .parse()
            .map(LoanId)
            .map_err(|_| LoanIdParseError(s.to_string()))
    }
}

impl TryFrom<String> for LoanId {
    type Error = LoanIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LoanId> for String {
    fn from(id: LoanId) -> Self {
        id.to_string()
    }
}

/// Informational rate recorded on a loan. Never compounded or applied.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct InterestRate(pub f64);

impl InterestRate {
    pub fn is_valid(&self) -> bool {
        self.0.is_finite() && self.0 >= 0.0
    }
}

impl fmt::Display for InterestRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub name: UserName,
    #[serde(with = "serde_amount")]
    pub wallet: Amount,
    /// Outstanding principal across this user's active loans.
    #[serde(with = "serde_amount")]
    pub borrowed: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: UserName,
    /// Principal requested at issuance.
    #[serde(with = "serde_amount")]
    pub principal: Amount,
    /// Principal still owed; zero once repaid.
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    pub interest: InterestRate,
    pub repaid: bool,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        !self.repaid
    }
}

#[derive(Clone, Debug, Default)]
pub struct UserRegistry {
    users: BTreeMap<UserName, User>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, wallet: Amount) -> Result<(), LedgerError> {
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidName);
        }
        if self.users.contains_key(name) {
            return Err(LedgerError::DuplicateUser {
                name: name.to_string(),
            });
        }
        self.users.insert(
            name.to_string(),
            User {
                name: name.to_string(),
                wallet,
                borrowed: Amount::zero(),
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&User, LedgerError> {
        self.users
            .get(name)
            .ok_or_else(|| LedgerError::UserNotFound {
                name: name.to_string(),
            })
    }

    pub(crate) fn lookup_mut(&mut self, name: &str) -> Result<&mut User, LedgerError> {
        self.users
            .get_mut(name)
            .ok_or_else(|| LedgerError::UserNotFound {
                name: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Loans keyed by id, plus the sequence counter that issues those ids.
#[derive(Clone, Debug, Default)]
pub struct LoanRegistry {
    loans: BTreeMap<LoanId, Loan>,
    next_sequence: u64,
}

impl LoanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peeks at the id the next issuance will receive.
    pub fn next_id(&self) -> LoanId {
        LoanId(self.next_sequence)
    }

    /// Allocates a fresh id and stores the loan under it in one step.
    pub(crate) fn issue(
        &mut self,
        borrower: &str,
        principal: Amount,
        interest: InterestRate,
    ) -> LoanId {
        let id = self.next_id();
        self.next_sequence += 1;
        self.loans.insert(
            id,
            Loan {
                id,
                borrower: borrower.to_string(),
                amount: principal.clone(),
                principal,
                interest,
                repaid: false,
            },
        );
        id
    }

    pub fn lookup(&self, id: &LoanId) -> Result<&Loan, LedgerError> {
        self.loans
            .get(id)
            .ok_or(LedgerError::LoanNotFound { loan_id: *id })
    }

    pub(crate) fn lookup_mut(&mut self, id: &LoanId) -> Result<&mut Loan, LedgerError> {
        self.loans
            .get_mut(id)
            .ok_or(LedgerError::LoanNotFound { loan_id: *id })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values()
    }

    /// Loans borrowed by `name`, in id order.
    pub fn borrowed_by(&self, name: &str) -> Vec<&Loan> {
        self.loans
            .values()
            .filter(|loan| loan.borrower == name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loan_ids_render_and_parse() {
        let id = LoanId(42);
        assert_eq!(id.to_string(), "Loan42");
        assert_eq!("Loan42".parse::<LoanId>().unwrap(), id);
        assert!("loan42".parse::<LoanId>().is_err());
        assert!("Loan".parse::<LoanId>().is_err());
        assert!("Loan-1".parse::<LoanId>().is_err());
        assert!("Loan4x".parse::<LoanId>().is_err());
    }

    #[test]
    fn loan_ids_order_numerically() {
        assert!(LoanId(9) < LoanId(10));
        let json = serde_json::to_string(&LoanId(10)).unwrap();
        assert_eq!(json, "\"Loan10\"");
        let back: LoanId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LoanId(10));
    }

    #[test]
    fn registry_rejects_duplicates_and_blank_names() {
        let mut users = UserRegistry::new();
        users.register("alice", Amount::from(10u32)).unwrap();
        let err = users.register("alice", Amount::from(99u32)).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateUser { ref name } if name == "alice"));
        assert_eq!(users.lookup("alice").unwrap().wallet, Amount::from(10u32));
        assert!(matches!(
            users.register("  ", Amount::zero()),
            Err(LedgerError::InvalidName)
        ));
        assert_eq!(users.len(), 1);
        assert!(!users.is_empty());
    }

    #[test]
    fn issue_advances_sequence_once_per_loan() {
        let mut loans = LoanRegistry::new();
        assert!(loans.is_empty());
        assert_eq!(loans.next_id(), LoanId(0));
        let first = loans.issue("alice", Amount::from(5u32), InterestRate(0.1));
        let second = loans.issue("bob", Amount::from(7u32), InterestRate(0.2));
        assert_eq!(first, LoanId(0));
        assert_eq!(second, LoanId(1));
        assert_eq!(loans.next_id(), LoanId(2));
        let loan = loans.lookup(&second).unwrap();
        assert_eq!(loan.principal, loan.amount);
        assert!(loan.is_active());
        assert_eq!(loans.len(), 2);
        assert_eq!(loans.borrowed_by("alice").len(), 1);
        assert!(loans.borrowed_by("carol").is_empty());
        assert!(matches!(
            loans.lookup(&LoanId(7)),
            Err(LedgerError::LoanNotFound { loan_id }) if loan_id == LoanId(7)
        ));
    }

    #[test]
    fn interest_rate_validation() {
        assert!(InterestRate(0.0).is_valid());
        assert!(InterestRate(0.1).is_valid());
        assert!(!InterestRate(-0.1).is_valid());
        assert!(!InterestRate(f64::NAN).is_valid());
        assert!(!InterestRate(f64::INFINITY).is_valid());
    }
}
