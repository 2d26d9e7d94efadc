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
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch, WriteOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for account state.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for debit cards.
pub const CF_CARDS: &str = "cards";
/// Column Family for credits and credit cards.
pub const CF_PRODUCTS: &str = "products";
/// Column Family for schedule entries, keyed `product \0 seq`.
pub const CF_ENTRIES: &str = "entries";
/// Column Family for posted transactions, keyed by operation number.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for named counters.
pub const CF_COUNTERS: &str = "counters";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_ACCOUNTS,
    CF_CARDS,
    CF_PRODUCTS,
    CF_ENTRIES,
    CF_TRANSACTIONS,
    CF_COUNTERS,
];

/// A persistent store implementation using RocksDB.
///
/// Implements every ledger port over separate Column Families with JSON
/// values. Versioned updates and counter increments are read-modify-write
/// sequences serialized through `write_lock`, so they are atomic for every
/// clone of this store.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Every port backed by this database.
    pub fn stores(self) -> Stores {
        Stores {
            accounts: Arc::new(self.clone()),
            cards: Arc::new(self.clone()),
            products: Arc::new(self.clone()),
            schedules: Arc::new(self.clone()),
            transactions: Arc::new(self.clone()),
            counter: Arc::new(self),
        }
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LedgerError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &'static str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &'static str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn exists(&self, cf_name: &'static str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    /// Deserializes every value of a column family whose key starts with `prefix`.
    fn scan<T: DeserializeOwned>(&self, cf_name: &'static str, prefix: &[u8]) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mode = if prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(prefix, rocksdb::Direction::Forward)
        };

        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }
}

fn entry_key(id: &EntryId) -> Vec<u8> {
    format!("{}\0{:010}", id.product, id.seq).into_bytes()
}

fn product_prefix(product: &ProductId) -> Vec<u8> {
    format!("{product}\0").into_bytes()
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn insert(&self, account: Account) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.exists(CF_ACCOUNTS, account.number.as_bytes())? {
            return Err(LedgerError::ValidationError(format!(
                "Account {} already exists",
                account.number
            )));
        }
        self.write(CF_ACCOUNTS, account.number.as_bytes(), &account)
    }

    async fn get(&self, number: &str) -> Result<Option<Account>> {
        self.read(CF_ACCOUNTS, number.as_bytes())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>> {
        let accounts: Vec<Account> = self.scan(CF_ACCOUNTS, b"")?;
        Ok(accounts
            .into_iter()
            .find(|a| a.phone_number.as_deref() == Some(phone)))
    }

    async fn update(&self, mut account: Account) -> Result<Account> {
        let _guard = self.write_lock.lock().await;
        let stored: Account = self
            .read(CF_ACCOUNTS, account.number.as_bytes())?
            .ok_or_else(|| LedgerError::not_found("account", &account.number))?;
        if stored.version != account.version {
            return Err(LedgerError::conflict("account", &account.number));
        }
        account.version += 1;
        self.write(CF_ACCOUNTS, account.number.as_bytes(), &account)?;
        Ok(account)
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        self.scan(CF_ACCOUNTS, b"")
    }
}

#[async_trait]
impl CardStore for RocksDBStore {
    async fn insert(&self, card: DebitCard) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.exists(CF_CARDS, card.number.as_bytes())? {
            return Err(LedgerError::ValidationError(format!(
                "Card {} already exists",
                card.number
            )));
        }
        self.write(CF_CARDS, card.number.as_bytes(), &card)
    }

    async fn get(&self, number: &str) -> Result<Option<DebitCard>> {
        self.read(CF_CARDS, number.as_bytes())
    }
}

#[async_trait]
impl ProductStore for RocksDBStore {
    async fn insert(&self, product: DebtProduct) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = product.id().0.as_bytes();
        if self.exists(CF_PRODUCTS, key)? {
            return Err(LedgerError::ValidationError(format!(
                "Product {} already exists",
                product.id()
            )));
        }
        self.write(CF_PRODUCTS, key, &product)
    }

    async fn get(&self, id: &ProductId) -> Result<Option<DebtProduct>> {
        self.read(CF_PRODUCTS, id.0.as_bytes())
    }

    async fn update(&self, mut product: DebtProduct) -> Result<DebtProduct> {
        let _guard = self.write_lock.lock().await;
        let stored: DebtProduct = self
            .read(CF_PRODUCTS, product.id().0.as_bytes())?
            .ok_or_else(|| LedgerError::not_found(product.kind().label(), &product.id().0))?;
        if stored.version() != product.version() {
            return Err(LedgerError::conflict(product.kind().label(), &product.id().0));
        }
        product.set_version(product.version() + 1);
        self.write(CF_PRODUCTS, product.id().0.as_bytes(), &product)?;
        Ok(product)
    }

    async fn remove(&self, id: &ProductId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_PRODUCTS)?;
        self.db.delete_cf(cf, id.0.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for RocksDBStore {
    async fn insert_all(&self, entries: Vec<ScheduleEntry>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_ENTRIES)?;
        let mut batch = WriteBatch::default();
        for entry in &entries {
            let key = entry_key(&entry.id);
            if self.exists(CF_ENTRIES, &key)? {
                return Err(LedgerError::ValidationError(format!(
                    "Schedule entry {} already exists",
                    entry.id
                )));
            }
            batch.put_cf(cf, key, serde_json::to_vec(entry)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: &EntryId) -> Result<Option<ScheduleEntry>> {
        self.read(CF_ENTRIES, &entry_key(id))
    }

    async fn for_product(&self, product: &ProductId) -> Result<Vec<ScheduleEntry>> {
        self.scan(CF_ENTRIES, &product_prefix(product))
    }

    async fn unpaid_due_by(&self, today: NaiveDate) -> Result<Vec<ScheduleEntry>> {
        let entries: Vec<ScheduleEntry> = self.scan(CF_ENTRIES, b"")?;
        Ok(entries.into_iter().filter(|e| e.is_due(today)).collect())
    }

    async fn update_all(&self, entries: Vec<ScheduleEntry>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_ENTRIES)?;
        let mut batch = WriteBatch::default();
        for mut entry in entries {
            let key = entry_key(&entry.id);
            let stored: ScheduleEntry = self
                .read(CF_ENTRIES, &key)?
                .ok_or_else(|| LedgerError::not_found("schedule entry", entry.id.to_string()))?;
            if stored.version != entry.version {
                return Err(LedgerError::conflict("schedule entry", entry.id.to_string()));
            }
            entry.version += 1;
            batch.put_cf(cf, key, serde_json::to_vec(&entry)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn remove_all(&self, ids: Vec<EntryId>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_ENTRIES)?;
        let mut batch = WriteBatch::default();
        for id in &ids {
            batch.delete_cf(cf, entry_key(id));
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn store(&self, tx: Transaction) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = tx.operation_number.as_str().as_bytes();
        if self.exists(CF_TRANSACTIONS, key)? {
            return Err(LedgerError::ValidationError(format!(
                "Operation {} already recorded",
                tx.operation_number
            )));
        }
        self.write(CF_TRANSACTIONS, key, &tx)
    }

    async fn get(&self, number: &OperationNumber) -> Result<Option<Transaction>> {
        self.read(CF_TRANSACTIONS, number.as_str().as_bytes())
    }

    async fn for_account_between(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let transactions: Vec<Transaction> = self.scan(CF_TRANSACTIONS, b"")?;
        Ok(transactions
            .into_iter()
            .filter(|tx| tx.involves(account_number) && tx.created_at >= from && tx.created_at < to)
            .collect())
    }
}

#[async_trait]
impl OperationCounter for RocksDBStore {
    async fn increment(&self, name: &str) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_COUNTERS)?;
        let current = match self.db.get_cf(cf, name.as_bytes())? {
            Some(bytes) => decode_counter(&bytes)?,
            None => 0,
        };
        let next = current.checked_add(1).ok_or(LedgerError::CounterExhausted)?;

        // The counter must be on disk before the number is handed out.
        let mut sync = WriteOptions::default();
        sync.set_sync(true);
        self.db.put_cf_opt(cf, name.as_bytes(), next.to_be_bytes(), &sync)?;
        Ok(next)
    }

    async fn current(&self, name: &str) -> Result<u64> {
        let cf = self.cf(CF_COUNTERS)?;
        match self.db.get_cf(cf, name.as_bytes())? {
            Some(bytes) => decode_counter(&bytes),
            None => Ok(0),
        }
    }
}

fn decode_counter(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        LedgerError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Corrupted counter value",
        )))
    })?;
    Ok(u64::from_be_bytes(raw))
}
