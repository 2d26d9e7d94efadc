use crate::domain::account::{Account, DebitCard};
use crate::domain::debt::{AmortizedDebt, DebtProduct, ProductId};
use crate::domain::ports::{
    AccountStore, CardStore, OperationCounter, ProductStore, ScheduleStore, Stores,
    TransactionStore,
};
use crate::domain::schedule::{EntryId, ScheduleEntry};
use crate::domain::transaction::{OperationNumber, Transaction};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A thread-safe in-memory store for accounts.
///
/// Uses `Arc<RwLock<HashMap<String, Account>>>` to allow shared concurrent access.
/// The version check and the write of `update` happen under one write lock.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryAccountStore {
    /// Creates a new, empty in-memory account store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert(&self, account: Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.number) {
            return Err(LedgerError::ValidationError(format!(
                "Account {} already exists",
                account.number
            )));
        }
        accounts.insert(account.number.clone(), account);
        Ok(())
    }

    async fn get(&self, number: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(number).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.phone_number.as_deref() == Some(phone))
            .cloned())
    }

    async fn update(&self, mut account: Account) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        let stored = accounts
            .get(&account.number)
            .ok_or_else(|| LedgerError::not_found("account", &account.number))?;
        if stored.version != account.version {
            return Err(LedgerError::conflict("account", &account.number));
        }
        account.version += 1;
        accounts.insert(account.number.clone(), account.clone());
        Ok(account)
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(all)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCardStore {
    cards: Arc<RwLock<HashMap<String, DebitCard>>>,
}

impl InMemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn insert(&self, card: DebitCard) -> Result<()> {
        let mut cards = self.cards.write().await;
        if cards.contains_key(&card.number) {
            return Err(LedgerError::ValidationError(format!(
                "Card {} already exists",
                card.number
            )));
        }
        cards.insert(card.number.clone(), card);
        Ok(())
    }

    async fn get(&self, number: &str) -> Result<Option<DebitCard>> {
        let cards = self.cards.read().await;
        Ok(cards.get(number).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryProductStore {
    products: Arc<RwLock<HashMap<ProductId, DebtProduct>>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn insert(&self, product: DebtProduct) -> Result<()> {
        let mut products = self.products.write().await;
        if products.contains_key(product.id()) {
            return Err(LedgerError::ValidationError(format!(
                "Product {} already exists",
                product.id()
            )));
        }
        products.insert(product.id().clone(), product);
        Ok(())
    }

    async fn get(&self, id: &ProductId) -> Result<Option<DebtProduct>> {
        let products = self.products.read().await;
        Ok(products.get(id).cloned())
    }

    async fn update(&self, mut product: DebtProduct) -> Result<DebtProduct> {
        let mut products = self.products.write().await;
        let stored = products
            .get(product.id())
            .ok_or_else(|| LedgerError::not_found(product.kind().label(), &product.id().0))?;
        if stored.version() != product.version() {
            return Err(LedgerError::conflict(product.kind().label(), &product.id().0));
        }
        product.set_version(product.version() + 1);
        products.insert(product.id().clone(), product.clone());
        Ok(product)
    }

    async fn remove(&self, id: &ProductId) -> Result<()> {
        self.products.write().await.remove(id);
        Ok(())
    }
}

/// Schedule entries ordered by product then sequence.
#[derive(Default, Clone)]
pub struct InMemoryScheduleStore {
    entries: Arc<RwLock<BTreeMap<EntryId, ScheduleEntry>>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn insert_all(&self, new_entries: Vec<ScheduleEntry>) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(dup) = new_entries.iter().find(|e| entries.contains_key(&e.id)) {
            return Err(LedgerError::ValidationError(format!(
                "Schedule entry {} already exists",
                dup.id
            )));
        }
        for entry in new_entries {
            entries.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    async fn get(&self, id: &EntryId) -> Result<Option<ScheduleEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(id).cloned())
    }

    async fn for_product(&self, product: &ProductId) -> Result<Vec<ScheduleEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| &e.id.product == product)
            .cloned()
            .collect())
    }

    async fn unpaid_due_by(&self, today: NaiveDate) -> Result<Vec<ScheduleEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| e.is_due(today))
            .cloned()
            .collect())
    }

    async fn update_all(&self, updated: Vec<ScheduleEntry>) -> Result<()> {
        let mut entries = self.entries.write().await;
        for entry in &updated {
            let stored = entries
                .get(&entry.id)
                .ok_or_else(|| LedgerError::not_found("schedule entry", entry.id.to_string()))?;
            if stored.version != entry.version {
                return Err(LedgerError::conflict("schedule entry", entry.id.to_string()));
            }
        }
        for mut entry in updated {
            entry.version += 1;
            entries.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    async fn remove_all(&self, ids: Vec<EntryId>) -> Result<()> {
        let mut entries = self.entries.write().await;
        for id in &ids {
            entries.remove(id);
        }
        Ok(())
    }
}

/// A thread-safe in-memory store for transactions.
///
/// Keyed by operation number; a `BTreeMap` keeps them in issue order.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<BTreeMap<OperationNumber, Transaction>>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn store(&self, tx: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&tx.operation_number) {
            return Err(LedgerError::ValidationError(format!(
                "Operation {} already recorded",
                tx.operation_number
            )));
        }
        transactions.insert(tx.operation_number.clone(), tx);
        Ok(())
    }

    async fn get(&self, number: &OperationNumber) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(number).cloned())
    }

    async fn for_account_between(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|tx| tx.involves(account_number) && tx.created_at >= from && tx.created_at < to)
            .cloned()
            .collect())
    }
}

/// Named counters; each increment is one locked read-modify-write.
#[derive(Default, Clone)]
pub struct InMemoryCounter {
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl InMemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter whose next increment for `name` yields `start + 1`.
    pub fn starting_at(name: &str, start: u64) -> Self {
        let counters = HashMap::from([(name.to_string(), start)]);
        Self {
            counters: Arc::new(Mutex::new(counters)),
        }
    }
}

#[async_trait]
impl OperationCounter for InMemoryCounter {
    async fn increment(&self, name: &str) -> Result<u64> {
        let mut counters = self.counters.lock().await;
        let value = counters.entry(name.to_string()).or_insert(0);
        *value = value.checked_add(1).ok_or(LedgerError::CounterExhausted)?;
        Ok(*value)
    }

    async fn current(&self, name: &str) -> Result<u64> {
        let counters = self.counters.lock().await;
        Ok(counters.get(name).copied().unwrap_or(0))
    }
}

/// Fresh in-memory adapters for every port.
pub fn in_memory_stores() -> Stores {
    Stores {
        accounts: Arc::new(InMemoryAccountStore::new()),
        cards: Arc::new(InMemoryCardStore::new()),
        products: Arc::new(InMemoryProductStore::new()),
        schedules: Arc::new(InMemoryScheduleStore::new()),
        transactions: Arc::new(InMemoryTransactionStore::new()),
        counter: Arc::new(InMemoryCounter::new()),
    }
}
