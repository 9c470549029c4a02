use serde::{Deserialize, Serialize};

use super::{
    serde_amount, Amount, InterestRate, Ledger, LedgerError, Loan, LoanId, RepaymentOutcome, User,
    UserName,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerCommand {
    Register {
        name: UserName,
        #[serde(with = "serde_amount")]
        wallet: Amount,
    },
    CreateLoan {
        borrower: UserName,
        #[serde(with = "serde_amount")]
        principal: Amount,
        interest: InterestRate,
    },
    RepayLoan {
        loan_id: LoanId,
        #[serde(with = "serde_amount")]
        payment: Amount,
    },
    QueryUser {
        name: UserName,
    },
    QueryLoan {
        loan_id: LoanId,
    },
    LoansOf {
        name: UserName,
    },
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandOutcome {
    Registered {
        name: UserName,
    },
    LoanCreated {
        loan_id: LoanId,
    },
    Repayment {
        loan_id: LoanId,
        outcome: RepaymentOutcome,
    },
    User {
        user: User,
    },
    Loan {
        loan: Loan,
    },
    Loans {
        name: UserName,
        loans: Vec<Loan>,
    },
}

impl Ledger {
    pub fn execute(&mut self, command: LedgerCommand) -> Result<CommandOutcome, LedgerError> {
        match command {
            LedgerCommand::Register { name, wallet } => {
                self.register(&name, wallet)?;
                Ok(CommandOutcome::Registered { name })
            }
            LedgerCommand::CreateLoan {
                borrower,
                principal,
                interest,
            } => {
                let loan_id = self.create_loan(&borrower, principal, interest)?;
                Ok(CommandOutcome::LoanCreated { loan_id })
            }
            LedgerCommand::RepayLoan { loan_id, payment } => {
                let outcome = self.repay_loan(&loan_id, payment)?;
                Ok(CommandOutcome::Repayment { loan_id, outcome })
            }
            LedgerCommand::QueryUser { name } => Ok(CommandOutcome::User {
                user: self.query_user(&name)?.clone(),
            }),
            LedgerCommand::QueryLoan { loan_id } => Ok(CommandOutcome::Loan {
                loan: self.query_loan(&loan_id)?.clone(),
            }),
            LedgerCommand::LoansOf { name } => {
                let loans = self.loans_of(&name)?.into_iter().cloned().collect();
                Ok(CommandOutcome::Loans { name, loans })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> LedgerCommand {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn commands_parse_from_tagged_json() {
        assert_eq!(
            parse(r#"{"type":"register","name":"Alice","wallet":"100"}"#),
            LedgerCommand::Register {
                name: "Alice".into(),
                wallet: Amount::from(100u32),
            }
        );
        assert_eq!(
            parse(r#"{"type":"create_loan","borrower":"Alice","principal":75,"interest":0.5}"#),
            LedgerCommand::CreateLoan {
                borrower: "Alice".into(),
                principal: Amount::from(75u32),
                interest: InterestRate(0.5),
            }
        );
        assert_eq!(
            parse(r#"{"type":"repay_loan","loan_id":"Loan3","payment":"18446744073709551616"}"#),
            LedgerCommand::RepayLoan {
                loan_id: "Loan3".parse().unwrap(),
                payment: Amount::from(u64::MAX) + 1u32,
            }
        );
    }

    #[test]
    fn malformed_commands_are_rejected() {
        assert!(serde_json::from_str::<LedgerCommand>(
            r#"{"type":"register","name":"Alice","wallet":"-5"}"#
        )
        .is_err());
        assert!(serde_json::from_str::<LedgerCommand>(
            r#"{"type":"repay_loan","loan_id":"L1","payment":"5"}"#
        )
        .is_err());
        assert!(serde_json::from_str::<LedgerCommand>(r#"{"type":"withdraw"}"#).is_err());
    }

    #[test]
    fn execute_dispatches_every_command() {
        let mut ledger = Ledger::new();
        let script = [
            r#"{"type":"register","name":"Alice","wallet":"100"}"#,
            r#"{"type":"create_loan","borrower":"Alice","principal":"75","interest":0.5}"#,
            r#"{"type":"repay_loan","loan_id":"Loan0","payment":"25"}"#,
        ];
        let outcomes: Vec<_> = script
            .iter()
            .map(|line| ledger.execute(parse(line)).unwrap())
            .collect();
        assert_eq!(
            outcomes[2],
            CommandOutcome::Repayment {
                loan_id: "Loan0".parse().unwrap(),
                outcome: RepaymentOutcome::PartiallyRepaid {
                    remaining: Amount::from(50u32),
                },
            }
        );

        match ledger.execute(parse(r#"{"type":"query_user","name":"Alice"}"#)).unwrap() {
            CommandOutcome::User { user } => {
                assert_eq!(user.wallet, Amount::from(75u32));
                assert_eq!(user.borrowed, Amount::from(50u32));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        match ledger.execute(parse(r#"{"type":"loans_of","name":"Alice"}"#)).unwrap() {
            CommandOutcome::Loans { loans, .. } => assert_eq!(loans.len(), 1),
            other => panic!("unexpected outcome {other:?}"),
        }
        let err = ledger
            .execute(parse(r#"{"type":"query_loan","loan_id":"Loan9"}"#))
            .unwrap_err();
        assert_eq!(err.kind(), "loan_not_found");
    }

    #[test]
    fn outcomes_serialize_with_string_amounts() {
        let outcome = CommandOutcome::Repayment {
            loan_id: "Loan0".parse().unwrap(),
            outcome: RepaymentOutcome::Repaid {
                paid: Amount::from(75u32),
            },
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["type"], "repayment");
        assert_eq!(value["loan_id"], "Loan0");
        assert_eq!(value["outcome"]["status"], "repaid");
        assert_eq!(value["outcome"]["paid"], "75");
    }
}
