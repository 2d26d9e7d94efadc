use super::money::Money;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Savings,
    Checking,
}

/// A customer deposit account.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub number: String,
    pub account_type: AccountType,
    pub currency: String,
    pub balance: Money,
    /// Maximum deposits and withdrawals per calendar month, if capped.
    pub monthly_transaction_limit: Option<u32>,
    pub maintenance_commission: bool,
    pub active: bool,
    pub blocked: bool,
    pub holders: Vec<String>,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub version: u64,
}

impl Account {
    pub fn new(
        number: impl Into<String>,
        account_type: AccountType,
        currency: impl Into<String>,
        holder: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            number: number.into(),
            account_type,
            currency: currency.into(),
            balance: Money::ZERO,
            monthly_transaction_limit: None,
            maintenance_commission: true,
            active: true,
            blocked: false,
            holders: vec![holder.into()],
            phone_number: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Whether the account may take part in a balance change.
    pub fn is_operable(&self) -> bool {
        self.active && !self.blocked
    }

    pub fn covers(&self, amount: Money) -> bool {
        self.balance >= amount
    }

    /// Posts funds to the balance.
    pub fn credit(&mut self, amount: Money, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ensure_operable()?;
        self.balance = self.balance.checked_add(amount)?;
        self.updated_at = now;
        Ok(())
    }

    /// Takes funds from the balance if sufficient.
    pub fn debit(&mut self, amount: Money, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ensure_operable()?;
        if !self.covers(amount) {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: self.balance,
            });
        }
        self.balance = self.balance.checked_sub(amount)?;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_operable(&self) -> Result<(), LedgerError> {
        if self.is_operable() {
            Ok(())
        } else {
            Err(LedgerError::not_found("account", &self.number))
        }
    }
}

/// A debit card drawing on one or more accounts, in priority order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct DebitCard {
    pub number: String,
    pub linked_accounts: Vec<String>,
    pub active: bool,
}
