use super::command_reader::{CommandKind, LedgerCommand};
use crate::application::ledger::LedgerService;
use crate::application::requests::{
    ConsumptionRequest, DebtPaymentRequest, DepositRequest, GrantCreditRequest,
    IssueCreditCardRequest, IssueDebitCardRequest, MobileTransferRequest, OpenAccountRequest,
    TransferRequest, WithdrawalRequest, WithdrawalSource,
};
use crate::config::LedgerConfig;
use crate::domain::account::AccountType;
use crate::domain::debt::ProductId;
use crate::domain::money::Amount;
use crate::domain::ports::Stores;
use crate::error::{LedgerError, Result};
use crate::infrastructure::clock::ManualClock;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::debug;

/// What a command produced, for logging.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Posted(String),
    Opened(String),
    Accrued { entries: usize },
}

/// Replays ledger commands against a [`LedgerService`] whose clock follows
/// each command's `date` column.
pub struct CommandRunner {
    ledger: Arc<LedgerService>,
    clock: ManualClock,
}

impl CommandRunner {
    pub fn new(stores: Stores, config: &LedgerConfig) -> Self {
        let clock = ManualClock::new(Utc::now());
        let ledger = LedgerService::new(stores, Arc::new(clock.clone()), config);
        Self {
            ledger: Arc::new(ledger),
            clock,
        }
    }

    pub fn ledger(&self) -> Arc<LedgerService> {
        Arc::clone(&self.ledger)
    }

    pub fn set_date(&self, date: NaiveDate) {
        self.clock.set_date(date);
    }

    pub async fn run(&self, command: LedgerCommand) -> Result<CommandOutcome> {
        if let Some(date) = command.date {
            self.set_date(date);
        }
        debug!(op = ?command.op, "Running command");

        let ledger = &self.ledger;
        let outcome = match command.op {
            CommandKind::OpenAccount => {
                let account_type = match command.product.as_deref() {
                    None | Some("savings") => AccountType::Savings,
                    Some("checking") => AccountType::Checking,
                    Some(other) => {
                        return Err(LedgerError::ValidationError(format!(
                            "Unknown account type '{other}'"
                        )));
                    }
                };
                let account = ledger
                    .open_account(OpenAccountRequest {
                        number: command.account()?.to_string(),
                        account_type,
                        currency: command.currency()?.to_string(),
                        holder: command.document()?.to_string(),
                        phone_number: command.counterparty.clone(),
                        monthly_transaction_limit: None,
                        maintenance_commission: true,
                    })
                    .await?;
                CommandOutcome::Opened(account.number)
            }
            CommandKind::IssueDebitCard => {
                let linked_accounts = command
                    .account()?
                    .split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                let card = ledger
                    .issue_debit_card(IssueDebitCardRequest {
                        number: command.product()?.to_string(),
                        linked_accounts,
                    })
                    .await?;
                CommandOutcome::Opened(card.number)
            }
            CommandKind::GrantCredit => {
                let tx = ledger
                    .grant_credit(GrantCreditRequest {
                        id: ProductId::from(command.product()?),
                        document_number: command.document()?.to_string(),
                        account_number: command.account()?.to_string(),
                        principal: Amount::new(command.amount()?)?,
                        annual_rate: command.rate()?,
                        annual_late_rate: command.late_rate()?,
                        term: command.term()?,
                        payment_day: command.payment_day()?,
                    })
                    .await?;
                CommandOutcome::Posted(tx.operation_number.to_string())
            }
            CommandKind::IssueCreditCard => {
                let id = ProductId::from(command.product()?);
                ledger
                    .issue_credit_card(IssueCreditCardRequest {
                        id: id.clone(),
                        document_number: command.document()?.to_string(),
                        account_number: command.account()?.to_string(),
                        credit_limit: Amount::new(command.amount()?)?,
                        annual_rate: command.rate()?,
                        annual_late_rate: command.late_rate()?,
                        payment_day: command.payment_day()?,
                    })
                    .await?;
                CommandOutcome::Opened(id.0)
            }
            CommandKind::Deposit => {
                let tx = ledger
                    .post_deposit(DepositRequest {
                        account: command.account()?.to_string(),
                        amount: Amount::new(command.amount()?)?,
                    })
                    .await?;
                CommandOutcome::Posted(tx.operation_number.to_string())
            }
            CommandKind::Withdrawal | CommandKind::CardWithdrawal => {
                let source = if command.op == CommandKind::Withdrawal {
                    WithdrawalSource::Account(command.account()?.to_string())
                } else {
                    WithdrawalSource::DebitCard(command.product()?.to_string())
                };
                let tx = ledger
                    .post_withdrawal(WithdrawalRequest {
                        source,
                        amount: Amount::new(command.amount()?)?,
                    })
                    .await?;
                CommandOutcome::Posted(tx.operation_number.to_string())
            }
            CommandKind::Transfer => {
                let tx = ledger
                    .post_transfer(TransferRequest {
                        from: command.account()?.to_string(),
                        to: command.counterparty()?.to_string(),
                        amount: Amount::new(command.amount()?)?,
                    })
                    .await?;
                CommandOutcome::Posted(tx.operation_number.to_string())
            }
            CommandKind::MobileTransfer => {
                let tx = ledger
                    .post_mobile_transfer(MobileTransferRequest {
                        from: command.account()?.to_string(),
                        phone_number: command.counterparty()?.to_string(),
                        amount: Amount::new(command.amount()?)?,
                    })
                    .await?;
                CommandOutcome::Posted(tx.operation_number.to_string())
            }
            CommandKind::PayCredit | CommandKind::PayCard => {
                let request = DebtPaymentRequest {
                    product: ProductId::from(command.product()?),
                    from_account: command.account.clone(),
                    amount: Amount::new(command.amount()?)?,
                };
                let tx = if command.op == CommandKind::PayCredit {
                    ledger.post_credit_payment(request).await?
                } else {
                    ledger.post_card_payment(request).await?
                };
                CommandOutcome::Posted(tx.operation_number.to_string())
            }
            CommandKind::Consume => {
                let tx = ledger
                    .post_consumption(ConsumptionRequest {
                        card: ProductId::from(command.product()?),
                        amount: Amount::new(command.amount()?)?,
                        installments: command.term()?,
                    })
                    .await?;
                CommandOutcome::Posted(tx.operation_number.to_string())
            }
            CommandKind::Accrue => {
                let report = ledger.accrue_overdue().await?;
                CommandOutcome::Accrued {
                    entries: report.accrued,
                }
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::in_memory_stores;
    use crate::interfaces::csv::command_reader::{COMMAND_HEADER, CommandReader};
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;

    async fn replay(runner: &CommandRunner, rows: &str) -> Vec<Result<CommandOutcome>> {
        let data = format!("{COMMAND_HEADER}\n{rows}");
        let mut outcomes = Vec::new();
        for command in CommandReader::new(data.as_bytes()).commands() {
            outcomes.push(runner.run(command.unwrap()).await);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_runner_follows_command_dates() {
        let runner = CommandRunner::new(in_memory_stores(), &LedgerConfig::default());
        let outcomes = replay(
            &runner,
            "open-account,2025-01-10,ACC-1,,,,,,,,PEN,12345678\n\
             grant-credit,2025-01-10,ACC-1,,CR-1,300,12,36.5,3,15,,12345678\n\
             accrue,2025-01-25,,,,,,,,,,\n",
        )
        .await;

        assert!(outcomes.iter().all(Result::is_ok));
        assert!(matches!(outcomes[2], Ok(CommandOutcome::Accrued { entries: 1 })));

        let ledger = runner.ledger();
        let account = ledger.account("ACC-1").await.unwrap();
        assert_eq!(account.balance, Money::new(dec!(300)));
        let schedule = ledger.schedule_of(&ProductId::from("CR-1")).await.unwrap();
        assert_eq!(schedule[0].due_date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert_eq!(schedule[0].late_fee, Money::new(dec!(1.02)));
    }

    #[tokio::test]
    async fn test_runner_reports_missing_columns() {
        let runner = CommandRunner::new(in_memory_stores(), &LedgerConfig::default());
        let outcomes = replay(&runner, "deposit,2025-01-10,ACC-1,,,,,,,,,\n").await;

        assert!(matches!(outcomes[0], Err(LedgerError::ValidationError(_))));
    }
}
