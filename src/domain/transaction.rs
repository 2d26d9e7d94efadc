use super::money::Money;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a formatted operation number.
pub const OPERATION_NUMBER_WIDTH: usize = 12;

/// Largest counter value that still fits the fixed width.
pub const MAX_OPERATION_SEQUENCE: u64 = 999_999_999_999;

/// Public, monotonic identifier of a posted transaction (`000000000042`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationNumber(String);

impl OperationNumber {
    pub fn from_sequence(sequence: u64) -> Result<Self> {
        if sequence > MAX_OPERATION_SEQUENCE {
            return Err(LedgerError::CounterExhausted);
        }
        Ok(Self(format!(
            "{:0width$}",
            sequence,
            width = OPERATION_NUMBER_WIDTH
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn sequence(&self) -> u64 {
        self.0.parse().unwrap_or_default()
    }
}

impl fmt::Display for OperationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    MobileTransfer,
    PayCredit,
    PayCard,
    ConsumptionCharge,
    CreditDisbursement,
}

impl TransactionType {
    /// Types that count towards the monthly commission threshold.
    pub fn counts_for_commission(&self) -> bool {
        matches!(self, TransactionType::Deposit | TransactionType::Withdrawal)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Created,
    Posted,
}

/// What a transaction leg points at. Weak references by identifier only.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum Party {
    Account(String),
    DebitCard(String),
    Product(String),
}

impl Party {
    pub fn account_number(&self) -> Option<&str> {
        match self {
            Party::Account(number) => Some(number),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub operation_number: OperationNumber,
    pub r#type: TransactionType,
    pub source: Option<Party>,
    pub destination: Option<Party>,
    /// Accounts whose balance this transaction moved.
    pub accounts: Vec<String>,
    pub amount: Money,
    pub commission: Money,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl Transaction {
    pub fn new(
        operation_number: OperationNumber,
        r#type: TransactionType,
        amount: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            operation_number,
            r#type,
            source: None,
            destination: None,
            accounts: Vec::new(),
            amount,
            commission: Money::ZERO,
            status: TransactionStatus::Created,
            created_at,
            active: true,
        }
    }

    pub fn from_party(mut self, party: Party) -> Self {
        if let Some(number) = party.account_number() {
            self.accounts.push(number.to_string());
        }
        self.source = Some(party);
        self
    }

    pub fn to_party(mut self, party: Party) -> Self {
        if let Some(number) = party.account_number() {
            self.accounts.push(number.to_string());
        }
        self.destination = Some(party);
        self
    }

    /// Records a balance movement on an account that is neither leg, such as
    /// the account a debit card withdrawal was drawn from.
    pub fn touching(mut self, account_number: impl Into<String>) -> Self {
        self.accounts.push(account_number.into());
        self
    }

    pub fn with_commission(mut self, commission: Money) -> Self {
        self.commission = commission;
        self
    }

    pub fn involves(&self, account_number: &str) -> bool {
        self.accounts.iter().any(|a| a == account_number)
    }

    /// `created -> posted`; the only transition a transaction makes.
    pub fn post(mut self) -> Self {
        self.status = TransactionStatus::Posted;
        self
    }
}
