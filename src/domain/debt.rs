//! Amortized debt products: term credits and revolving credit cards.
//!
//! Both carry a schedule of installments, a late-interest rate and a linked
//! settlement account. The waterfall and the overdue accrual only see them
//! through [`AmortizedDebt`].

use super::money::Money;
use super::rates::daily_rate;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductKind {
    Credit,
    CreditCard,
}

impl ProductKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProductKind::Credit => "credit",
            ProductKind::CreditCard => "credit card",
        }
    }
}

/// Common surface of every product that owns an installment schedule.
pub trait AmortizedDebt {
    fn id(&self) -> &ProductId;
    fn kind(&self) -> ProductKind;
    fn linked_account(&self) -> &str;
    fn annual_rate(&self) -> Decimal;
    fn annual_late_rate(&self) -> Decimal;
    fn payment_day(&self) -> u32;
    fn is_active(&self) -> bool;

    /// Called once every installment has been paid.
    fn on_settled(&mut self);

    /// Called with the principal repaid by a payment.
    fn on_principal_repaid(&mut self, _principal: Money) {}

    fn daily_late_rate(&self) -> Decimal {
        daily_rate(self.annual_late_rate())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    pub id: ProductId,
    pub document_number: String,
    pub account_number: String,
    pub principal: Money,
    pub annual_rate: Decimal,
    pub annual_late_rate: Decimal,
    pub term: u32,
    pub payment_day: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl AmortizedDebt for Credit {
    fn id(&self) -> &ProductId {
        &self.id
    }
    fn kind(&self) -> ProductKind {
        ProductKind::Credit
    }
    fn linked_account(&self) -> &str {
        &self.account_number
    }
    fn annual_rate(&self) -> Decimal {
        self.annual_rate
    }
    fn annual_late_rate(&self) -> Decimal {
        self.annual_late_rate
    }
    fn payment_day(&self) -> u32 {
        self.payment_day
    }
    fn is_active(&self) -> bool {
        self.active
    }

    // A term credit is closed (never deleted) once paid off.
    fn on_settled(&mut self) {
        self.active = false;
    }
}

/// A revolving card: purchases draw down `available_credit` and are
/// repaid through installments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCard {
    pub id: ProductId,
    pub document_number: String,
    pub account_number: String,
    pub credit_limit: Money,
    pub available_credit: Money,
    pub annual_rate: Decimal,
    pub annual_late_rate: Decimal,
    pub payment_day: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl CreditCard {
    /// Reserves `amount` of the credit line for a purchase.
    pub fn draw(&mut self, amount: Money) -> bool {
        if amount > self.available_credit {
            return false;
        }
        self.available_credit -= amount;
        true
    }
}

impl AmortizedDebt for CreditCard {
    fn id(&self) -> &ProductId {
        &self.id
    }
    fn kind(&self) -> ProductKind {
        ProductKind::CreditCard
    }
    fn linked_account(&self) -> &str {
        &self.account_number
    }
    fn annual_rate(&self) -> Decimal {
        self.annual_rate
    }
    fn annual_late_rate(&self) -> Decimal {
        self.annual_late_rate
    }
    fn payment_day(&self) -> u32 {
        self.payment_day
    }
    fn is_active(&self) -> bool {
        self.active
    }

    // Settled cards are closed with their full line released.
    fn on_settled(&mut self) {
        self.available_credit = self.credit_limit;
        self.active = false;
    }

    fn on_principal_repaid(&mut self, principal: Money) {
        self.available_credit = (self.available_credit + principal).min(self.credit_limit);
    }
}

/// Stored form of any amortized product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DebtProduct {
    Credit(Credit),
    CreditCard(CreditCard),
}

impl DebtProduct {
    pub fn version(&self) -> u64 {
        match self {
            DebtProduct::Credit(credit) => credit.version,
            DebtProduct::CreditCard(card) => card.version,
        }
    }

    pub fn set_version(&mut self, version: u64) {
        match self {
            DebtProduct::Credit(credit) => credit.version = version,
            DebtProduct::CreditCard(card) => card.version = version,
        }
    }

    pub fn as_card_mut(&mut self) -> Option<&mut CreditCard> {
        match self {
            DebtProduct::CreditCard(card) => Some(card),
            DebtProduct::Credit(_) => None,
        }
    }

    fn inner(&self) -> &dyn AmortizedDebt {
        match self {
            DebtProduct::Credit(credit) => credit,
            DebtProduct::CreditCard(card) => card,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn AmortizedDebt {
        match self {
            DebtProduct::Credit(credit) => credit,
            DebtProduct::CreditCard(card) => card,
        }
    }
}

impl AmortizedDebt for DebtProduct {
    fn id(&self) -> &ProductId {
        self.inner().id()
    }
    fn kind(&self) -> ProductKind {
        self.inner().kind()
    }
    fn linked_account(&self) -> &str {
        self.inner().linked_account()
    }
    fn annual_rate(&self) -> Decimal {
        self.inner().annual_rate()
    }
    fn annual_late_rate(&self) -> Decimal {
        self.inner().annual_late_rate()
    }
    fn payment_day(&self) -> u32 {
        self.inner().payment_day()
    }
    fn is_active(&self) -> bool {
        self.inner().is_active()
    }
    fn on_settled(&mut self) {
        self.inner_mut().on_settled()
    }
    fn on_principal_repaid(&mut self, principal: Money) {
        self.inner_mut().on_principal_repaid(principal)
    }
}
