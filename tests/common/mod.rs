#![allow(dead_code)]

use chrono::NaiveDate;
use credit_ledger::application::ledger::LedgerService;
use credit_ledger::application::requests::{
    DepositRequest, GrantCreditRequest, IssueCreditCardRequest, OpenAccountRequest,
};
use credit_ledger::config::{LedgerConfig, RetryConfig};
use credit_ledger::domain::account::{Account, AccountType};
use credit_ledger::domain::debt::ProductId;
use credit_ledger::domain::money::{Amount, Money};
use credit_ledger::domain::ports::Stores;
use credit_ledger::infrastructure::clock::ManualClock;
use credit_ledger::infrastructure::in_memory::in_memory_stores;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub const HEADER: [&str; 12] = [
    "op",
    "date",
    "account",
    "counterparty",
    "product",
    "amount",
    "rate",
    "late_rate",
    "term",
    "payment_day",
    "currency",
    "document",
];

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn money(value: Decimal) -> Money {
    Money::new(value)
}

/// A ledger over fresh in-memory stores with a clock the test controls.
pub struct Harness {
    pub ledger: Arc<LedgerService>,
    pub clock: ManualClock,
    pub stores: Stores,
}

impl Harness {
    pub fn on(day: NaiveDate) -> Self {
        Self::with_config(day, test_config())
    }

    pub fn with_config(day: NaiveDate, config: LedgerConfig) -> Self {
        let stores = in_memory_stores();
        let clock = ManualClock::on(day);
        let ledger = LedgerService::new(stores.clone(), Arc::new(clock.clone()), &config);
        Self {
            ledger: Arc::new(ledger),
            clock,
            stores,
        }
    }

    pub async fn open(&self, number: &str, balance: Decimal) -> Account {
        self.open_with(number, "PEN", None, balance).await
    }

    pub async fn open_with(
        &self,
        number: &str,
        currency: &str,
        phone: Option<&str>,
        balance: Decimal,
    ) -> Account {
        self.ledger
            .open_account(OpenAccountRequest {
                number: number.to_string(),
                account_type: AccountType::Savings,
                currency: currency.to_string(),
                holder: "12345678".to_string(),
                phone_number: phone.map(str::to_string),
                monthly_transaction_limit: None,
                maintenance_commission: true,
            })
            .await
            .unwrap();
        if balance > Decimal::ZERO {
            self.ledger
                .post_deposit(DepositRequest {
                    account: number.to_string(),
                    amount: amount(balance),
                })
                .await
                .unwrap();
        }
        self.ledger.account(number).await.unwrap()
    }

    /// 300 at 12% over 3 months, paid on the 15th, granted on the clock's date.
    pub async fn grant_reference_credit(&self, id: &str, account: &str) -> ProductId {
        let id = ProductId::from(id);
        self.ledger
            .grant_credit(GrantCreditRequest {
                id: id.clone(),
                document_number: "12345678".to_string(),
                account_number: account.to_string(),
                principal: amount(dec!(300)),
                annual_rate: dec!(12),
                annual_late_rate: dec!(36.5),
                term: 3,
                payment_day: 15,
            })
            .await
            .unwrap();
        id
    }

    pub async fn issue_card(&self, id: &str, account: &str, limit: Decimal) -> ProductId {
        let id = ProductId::from(id);
        self.ledger
            .issue_credit_card(IssueCreditCardRequest {
                id: id.clone(),
                document_number: "12345678".to_string(),
                account_number: account.to_string(),
                credit_limit: amount(limit),
                annual_rate: dec!(24),
                annual_late_rate: dec!(36.5),
                payment_day: 5,
            })
            .await
            .unwrap();
        id
    }

    pub async fn balance(&self, number: &str) -> Money {
        self.ledger.account(number).await.unwrap().balance
    }
}

/// Defaults with a short backoff so contention tests stay fast.
pub fn test_config() -> LedgerConfig {
    LedgerConfig {
        retry: RetryConfig {
            max_retries: 50,
            min_delay_ms: 1,
            max_delay_ms: 10,
        },
        ..LedgerConfig::default()
    }
}

/// Writes a command file with `rows` deposits of 1.00 into `ACC-1`.
pub fn generate_deposits_csv(path: &Path, rows: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(HEADER)?;
    wtr.write_record([
        "open-account", "2025-01-01", "ACC-1", "", "", "", "", "", "", "", "PEN", "12345678",
    ])?;
    for _ in 1..=rows {
        wtr.write_record([
            "deposit", "2025-01-02", "ACC-1", "", "", "1.00", "", "", "", "", "", "",
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
