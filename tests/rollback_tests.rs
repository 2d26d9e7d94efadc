use async_trait::async_trait;
use chrono::{DateTime, Utc};
use credit_ledger::application::ledger::LedgerService;
use credit_ledger::application::requests::{
    ConsumptionRequest, DebtPaymentRequest, DepositRequest, GrantCreditRequest, TransferRequest,
    WithdrawalRequest, WithdrawalSource,
};
use credit_ledger::domain::debt::{AmortizedDebt, DebtProduct, ProductId};
use credit_ledger::domain::money::Money;
use credit_ledger::domain::ports::{
    ProductStore, ProductStoreArc, Stores, TransactionStore, TransactionStoreArc,
};
use credit_ledger::domain::transaction::{OperationNumber, Transaction};
use credit_ledger::error::{LedgerError, Result};
use credit_ledger::infrastructure::clock::ManualClock;
use credit_ledger::infrastructure::in_memory::in_memory_stores;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod common;
use common::{Harness, amount, date, money, test_config};

/// Switch shared by the failing adapters and the test driving them.
#[derive(Clone, Default)]
struct Outage(Arc<AtomicBool>);

impl Outage {
    fn start(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    fn end(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
    fn check(&self) -> Result<()> {
        if self.0.load(Ordering::SeqCst) {
            return Err(LedgerError::InternalError("disk full".into()));
        }
        Ok(())
    }
}

/// Refuses to persist transactions during an outage.
struct FailingTransactionStore {
    inner: TransactionStoreArc,
    outage: Outage,
}

#[async_trait]
impl TransactionStore for FailingTransactionStore {
    async fn store(&self, tx: Transaction) -> Result<()> {
        self.outage.check()?;
        self.inner.store(tx).await
    }
    async fn get(&self, number: &OperationNumber) -> Result<Option<Transaction>> {
        self.inner.get(number).await
    }
    async fn for_account_between(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        self.inner.for_account_between(account_number, from, to).await
    }
}

/// Refuses product updates during an outage.
struct FailingProductStore {
    inner: ProductStoreArc,
    outage: Outage,
}

#[async_trait]
impl ProductStore for FailingProductStore {
    async fn insert(&self, product: DebtProduct) -> Result<()> {
        self.inner.insert(product).await
    }
    async fn get(&self, id: &ProductId) -> Result<Option<DebtProduct>> {
        self.inner.get(id).await
    }
    async fn update(&self, product: DebtProduct) -> Result<DebtProduct> {
        self.outage.check()?;
        self.inner.update(product).await
    }
    async fn remove(&self, id: &ProductId) -> Result<()> {
        self.inner.remove(id).await
    }
}

fn harness(
    day: chrono::NaiveDate,
    transactions: Option<&Outage>,
    products: Option<&Outage>,
) -> Harness {
    let mut stores = in_memory_stores();
    if let Some(outage) = transactions {
        stores = Stores {
            transactions: Arc::new(FailingTransactionStore {
                inner: stores.transactions.clone(),
                outage: outage.clone(),
            }),
            ..stores
        };
    }
    if let Some(outage) = products {
        stores = Stores {
            products: Arc::new(FailingProductStore {
                inner: stores.products.clone(),
                outage: outage.clone(),
            }),
            ..stores
        };
    }
    let clock = ManualClock::on(day);
    let ledger = LedgerService::new(stores.clone(), Arc::new(clock.clone()), &test_config());
    Harness {
        ledger: Arc::new(ledger),
        clock,
        stores,
    }
}

fn is_disk_full<T>(result: &Result<T>) -> bool {
    matches!(result, Err(LedgerError::InternalError(e)) if e.to_string() == "disk full")
}

fn grant_request(id: &str) -> GrantCreditRequest {
    GrantCreditRequest {
        id: ProductId::from(id),
        document_number: "12345678".to_string(),
        account_number: "ACC-1".to_string(),
        principal: amount(dec!(300)),
        annual_rate: dec!(12),
        annual_late_rate: dec!(36.5),
        term: 3,
        payment_day: 15,
    }
}

fn pay(product: &ProductId, value: rust_decimal::Decimal) -> DebtPaymentRequest {
    DebtPaymentRequest {
        product: product.clone(),
        from_account: None,
        amount: amount(value),
    }
}

#[tokio::test]
async fn test_unrecorded_deposit_leaves_balance_unchanged() {
    let outage = Outage::default();
    let h = harness(date(2025, 3, 10), Some(&outage), None);
    h.open("ACC-1", dec!(100)).await;

    outage.start();
    let result = h
        .ledger
        .post_deposit(DepositRequest {
            account: "ACC-1".to_string(),
            amount: amount(dec!(50)),
        })
        .await;

    assert!(is_disk_full(&result));
    assert_eq!(h.balance("ACC-1").await, money(dec!(100)));
}

#[tokio::test]
async fn test_unrecorded_withdrawal_leaves_balance_unchanged() {
    let outage = Outage::default();
    let h = harness(date(2025, 3, 10), Some(&outage), None);
    h.open("ACC-1", dec!(100)).await;

    outage.start();
    let result = h
        .ledger
        .post_withdrawal(WithdrawalRequest {
            source: WithdrawalSource::Account("ACC-1".to_string()),
            amount: amount(dec!(40)),
        })
        .await;

    assert!(is_disk_full(&result));
    assert_eq!(h.balance("ACC-1").await, money(dec!(100)));
}

#[tokio::test]
async fn test_unrecorded_transfer_restores_both_accounts() {
    let outage = Outage::default();
    let h = harness(date(2025, 3, 10), Some(&outage), None);
    h.open("A", dec!(100)).await;
    h.open("B", dec!(0)).await;

    outage.start();
    let result = h
        .ledger
        .post_transfer(TransferRequest {
            from: "A".to_string(),
            to: "B".to_string(),
            amount: amount(dec!(30)),
        })
        .await;

    assert!(is_disk_full(&result));
    assert_eq!(h.balance("A").await, money(dec!(100)));
    assert_eq!(h.balance("B").await, Money::ZERO);
}

#[tokio::test]
async fn test_unrecorded_credit_payoff_is_undone() {
    let outage = Outage::default();
    let h = harness(date(2025, 1, 10), Some(&outage), None);
    h.open("ACC-1", dec!(500)).await;
    let id = h.grant_reference_credit("CR-1", "ACC-1").await;
    let before = h.ledger.schedule_of(&id).await.unwrap();
    h.clock.set_date(date(2025, 1, 20));

    outage.start();
    let result = h.ledger.post_credit_payment(pay(&id, dec!(306.02))).await;

    assert!(is_disk_full(&result));
    assert_eq!(h.balance("ACC-1").await, money(dec!(800)));
    assert!(h.ledger.product(&id).await.unwrap().is_active());
    let after = h.ledger.schedule_of(&id).await.unwrap();
    for (old, new) in before.iter().zip(&after) {
        assert!(!new.paid);
        assert_eq!(new.outstanding, old.outstanding);
        assert_eq!(new.principal, old.principal);
        assert_eq!(new.interest, old.interest);
    }
    assert_eq!(
        h.ledger.position(&id).await.unwrap().total_debt(),
        money(dec!(306.02))
    );

    outage.end();
    h.ledger
        .post_credit_payment(pay(&id, dec!(306.02)))
        .await
        .unwrap();
    assert_eq!(h.balance("ACC-1").await, money(dec!(493.98)));
    assert!(!h.ledger.product(&id).await.unwrap().is_active());
}

#[tokio::test]
async fn test_rejected_product_update_undoes_payment() {
    let outage = Outage::default();
    let h = harness(date(2025, 1, 10), None, Some(&outage));
    h.open("ACC-1", dec!(500)).await;
    let id = h.grant_reference_credit("CR-1", "ACC-1").await;
    h.clock.set_date(date(2025, 1, 20));

    outage.start();
    let result = h.ledger.post_credit_payment(pay(&id, dec!(102.01))).await;

    assert!(is_disk_full(&result));
    assert_eq!(h.balance("ACC-1").await, money(dec!(800)));
    let schedule = h.ledger.schedule_of(&id).await.unwrap();
    assert!(schedule.iter().all(|e| !e.paid));
    assert_eq!(schedule[0].outstanding, money(dec!(102.01)));

    outage.end();
    h.ledger
        .post_credit_payment(pay(&id, dec!(102.01)))
        .await
        .unwrap();
    assert!(h.ledger.schedule_of(&id).await.unwrap()[0].paid);
}

#[tokio::test]
async fn test_unrecorded_grant_leaves_no_product_behind() {
    let outage = Outage::default();
    let h = harness(date(2025, 1, 10), Some(&outage), None);
    h.open("ACC-1", dec!(500)).await;

    outage.start();
    let result = h.ledger.grant_credit(grant_request("CR-1")).await;

    assert!(is_disk_full(&result));
    assert_eq!(h.balance("ACC-1").await, money(dec!(500)));
    let id = ProductId::from("CR-1");
    assert!(matches!(
        h.ledger.product(&id).await,
        Err(LedgerError::NotFound { .. })
    ));
    assert!(h.ledger.schedule_of(&id).await.unwrap().is_empty());

    outage.end();
    h.ledger.grant_credit(grant_request("CR-1")).await.unwrap();
    assert_eq!(h.ledger.schedule_of(&id).await.unwrap().len(), 3);
    assert_eq!(h.balance("ACC-1").await, money(dec!(800)));
}

#[tokio::test]
async fn test_unrecorded_consumption_releases_the_draw() {
    let outage = Outage::default();
    let h = harness(date(2025, 1, 10), Some(&outage), None);
    h.open("ACC-1", dec!(0)).await;
    let card = h.issue_card("CC-1", "ACC-1", dec!(1000)).await;
    let purchase = || ConsumptionRequest {
        card: card.clone(),
        amount: amount(dec!(300)),
        installments: 3,
    };

    outage.start();
    let result = h.ledger.post_consumption(purchase()).await;

    assert!(is_disk_full(&result));
    match h.ledger.product(&card).await.unwrap() {
        DebtProduct::CreditCard(c) => assert_eq!(c.available_credit, money(dec!(1000))),
        DebtProduct::Credit(_) => panic!("not a card"),
    }
    assert!(h.ledger.schedule_of(&card).await.unwrap().is_empty());

    outage.end();
    h.ledger.post_consumption(purchase()).await.unwrap();
    let schedule = h.ledger.schedule_of(&card).await.unwrap();
    assert_eq!(schedule.iter().map(|e| e.id.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
}
