use crate::config::CommissionConfig;
use crate::domain::account::Account;
use crate::domain::money::Money;
use crate::domain::ports::TransactionStoreArc;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Charges a flat fee once an account has moved money more than the free
/// number of times in the current calendar month.
#[derive(Clone)]
pub struct CommissionAssessor {
    transactions: TransactionStoreArc,
    config: CommissionConfig,
}

impl CommissionAssessor {
    pub fn new(transactions: TransactionStoreArc, config: CommissionConfig) -> Self {
        Self {
            transactions,
            config,
        }
    }

    /// Deposits and withdrawals involving the account in the month of `now`.
    pub async fn monthly_count(&self, account_number: &str, now: DateTime<Utc>) -> Result<usize> {
        let (from, to) = month_bounds(now)?;
        let transactions = self
            .transactions
            .for_account_between(account_number, from, to)
            .await?;
        Ok(transactions
            .iter()
            .filter(|tx| tx.active && tx.r#type.counts_for_commission())
            .count())
    }

    /// The commission due on the next deposit or withdrawal, after enforcing
    /// the account's monthly movement cap. Accounts without maintenance
    /// commission never pay.
    pub async fn assess(&self, account: &Account, now: DateTime<Utc>) -> Result<Money> {
        let count = self.monthly_count(&account.number, now).await?;
        if let Some(limit) = account
            .monthly_transaction_limit
            .filter(|&limit| count >= limit as usize)
        {
            return Err(LedgerError::ValidationError(format!(
                "Account {} reached its limit of {limit} movements this month",
                account.number
            )));
        }
        if !account.maintenance_commission {
            return Ok(Money::ZERO);
        }
        Ok(self.fee_for(count))
    }

    pub fn fee_for(&self, monthly_count: usize) -> Money {
        if monthly_count > self.config.free_transactions {
            Money::new(self.config.fee)
        } else {
            Money::ZERO
        }
    }
}

/// `[first instant of the month, first instant of the next month)`.
pub fn month_bounds(now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (year, month) = (now.year(), now.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let start = NaiveDate::from_ymd_opt(year, month, 1);
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1);
    match (start, end) {
        (Some(start), Some(end)) => Ok((
            start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end.and_time(chrono::NaiveTime::MIN).and_utc(),
        )),
        _ => Err(LedgerError::ValidationError(format!(
            "No calendar month around {now}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountType;
    use crate::domain::transaction::{OperationNumber, Party, Transaction, TransactionType};
    use crate::infrastructure::in_memory::InMemoryTransactionStore;
    use crate::domain::ports::TransactionStore;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn seed(store: &InMemoryTransactionStore, seq: u64, r#type: TransactionType, at: DateTime<Utc>) {
        let tx = Transaction::new(
            OperationNumber::from_sequence(seq).unwrap(),
            r#type,
            Money::new(dec!(1)),
            at,
        )
        .to_party(Party::Account("ACC-1".to_string()))
        .post();
        store.store(tx).await.unwrap();
    }

    fn account(number: &str, now: DateTime<Utc>) -> Account {
        Account::new(number, AccountType::Savings, "PEN", "Ana", now)
    }

    #[test]
    fn test_month_bounds_december() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let (from, to) = month_bounds(now).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_fee_only_above_threshold() {
        let store = InMemoryTransactionStore::new();
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap();
        let assessor = CommissionAssessor::new(Arc::new(store.clone()), CommissionConfig::default());

        for seq in 1..=10 {
            seed(&store, seq, TransactionType::Deposit, now).await;
        }
        let acc1 = account("ACC-1", now);
        assert_eq!(assessor.assess(&acc1, now).await.unwrap(), Money::ZERO);

        seed(&store, 11, TransactionType::Withdrawal, now).await;
        assert_eq!(assessor.assess(&acc1, now).await.unwrap(), Money::new(dec!(1.99)));
        assert_eq!(
            assessor.assess(&account("ACC-2", now), now).await.unwrap(),
            Money::ZERO
        );

        let mut exempt = acc1.clone();
        exempt.maintenance_commission = false;
        assert_eq!(assessor.assess(&exempt, now).await.unwrap(), Money::ZERO);
    }

    #[tokio::test]
    async fn test_only_deposits_and_withdrawals_this_month_count() {
        let store = InMemoryTransactionStore::new();
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap();
        let last_month = Utc.with_ymd_and_hms(2025, 2, 28, 23, 0, 0).unwrap();

        for seq in 1..=20 {
            seed(&store, seq, TransactionType::Deposit, last_month).await;
        }
        for seq in 21..=40 {
            seed(&store, seq, TransactionType::Transfer, now).await;
        }
        seed(&store, 41, TransactionType::Deposit, now).await;

        let assessor = CommissionAssessor::new(Arc::new(store), CommissionConfig::default());
        assert_eq!(assessor.monthly_count("ACC-1", now).await.unwrap(), 1);
        assert_eq!(
            assessor.assess(&account("ACC-1", now), now).await.unwrap(),
            Money::ZERO
        );
    }

    #[tokio::test]
    async fn test_monthly_cap_rejects_further_movements() {
        let store = InMemoryTransactionStore::new();
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap();
        for seq in 1..=3 {
            seed(&store, seq, TransactionType::Deposit, now).await;
        }
        let assessor = CommissionAssessor::new(Arc::new(store), CommissionConfig::default());

        let mut capped = account("ACC-1", now);
        capped.monthly_transaction_limit = Some(4);
        assert_eq!(assessor.assess(&capped, now).await.unwrap(), Money::ZERO);

        capped.monthly_transaction_limit = Some(3);
        let err = assessor.assess(&capped, now).await.unwrap_err();
        assert!(matches!(err, LedgerError::ValidationError(_)));
        assert!(err.to_string().contains("limit of 3"));
    }
}
