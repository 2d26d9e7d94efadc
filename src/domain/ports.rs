use super::account::{Account, DebitCard};
use super::debt::{DebtProduct, ProductId};
use super::schedule::{EntryId, ScheduleEntry};
use super::transaction::{OperationNumber, Transaction};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Accounts keyed by account number.
///
/// `update` is a compare-and-swap on [`Account::version`]: it fails with
/// `ConcurrencyConflict` when the stored version moved on, and returns the
/// stored account with its version bumped otherwise.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert(&self, account: Account) -> Result<()>;
    async fn get(&self, number: &str) -> Result<Option<Account>>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>>;
    async fn update(&self, account: Account) -> Result<Account>;
    async fn get_all(&self) -> Result<Vec<Account>>;
}

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn insert(&self, card: DebitCard) -> Result<()>;
    async fn get(&self, number: &str) -> Result<Option<DebitCard>>;
}

/// Credits and credit cards. `update` is versioned like [`AccountStore::update`].
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert(&self, product: DebtProduct) -> Result<()>;
    async fn get(&self, id: &ProductId) -> Result<Option<DebtProduct>>;
    async fn update(&self, product: DebtProduct) -> Result<DebtProduct>;
    /// Drops a product whose origination did not complete.
    async fn remove(&self, id: &ProductId) -> Result<()>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert_all(&self, entries: Vec<ScheduleEntry>) -> Result<()>;
    async fn get(&self, id: &EntryId) -> Result<Option<ScheduleEntry>>;
    /// Every entry of a product, ordered by sequence.
    async fn for_product(&self, product: &ProductId) -> Result<Vec<ScheduleEntry>>;
    /// Unpaid entries with `due_date <= today`, across all products.
    async fn unpaid_due_by(&self, today: NaiveDate) -> Result<Vec<ScheduleEntry>>;
    /// Versioned batch update: either every entry is written or none is.
    async fn update_all(&self, entries: Vec<ScheduleEntry>) -> Result<()>;
    /// Drops entries inserted by an operation that did not complete.
    async fn remove_all(&self, ids: Vec<EntryId>) -> Result<()>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn store(&self, tx: Transaction) -> Result<()>;
    async fn get(&self, number: &OperationNumber) -> Result<Option<Transaction>>;
    /// Transactions touching `account_number` created in `[from, to)`.
    async fn for_account_between(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>>;
}

/// Durable named counters with an atomic increment.
#[async_trait]
pub trait OperationCounter: Send + Sync {
    /// Increments the counter and returns the new value.
    async fn increment(&self, name: &str) -> Result<u64>;
    async fn current(&self, name: &str) -> Result<u64>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub type AccountStoreArc = Arc<dyn AccountStore>;
pub type CardStoreArc = Arc<dyn CardStore>;
pub type ProductStoreArc = Arc<dyn ProductStore>;
pub type ScheduleStoreArc = Arc<dyn ScheduleStore>;
pub type TransactionStoreArc = Arc<dyn TransactionStore>;
pub type OperationCounterArc = Arc<dyn OperationCounter>;
pub type ClockArc = Arc<dyn Clock>;

/// Every persistence port the ledger needs, shared between services.
#[derive(Clone)]
pub struct Stores {
    pub accounts: AccountStoreArc,
    pub cards: CardStoreArc,
    pub products: ProductStoreArc,
    pub schedules: ScheduleStoreArc,
    pub transactions: TransactionStoreArc,
    pub counter: OperationCounterArc,
}
