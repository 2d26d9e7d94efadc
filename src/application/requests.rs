//! Inputs of the ledger operations.
//!
//! Amounts are [`Amount`]s, so a request can only be built with a strictly
//! positive value.

use crate::domain::account::AccountType;
use crate::domain::debt::ProductId;
use crate::domain::money::Amount;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct OpenAccountRequest {
    pub number: String,
    pub account_type: AccountType,
    pub currency: String,
    pub holder: String,
    pub phone_number: Option<String>,
    pub monthly_transaction_limit: Option<u32>,
    pub maintenance_commission: bool,
}

#[derive(Debug, Clone)]
pub struct IssueDebitCardRequest {
    pub number: String,
    /// Accounts the card draws on, highest priority first.
    pub linked_accounts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GrantCreditRequest {
    pub id: ProductId,
    pub document_number: String,
    pub account_number: String,
    pub principal: Amount,
    /// Nominal annual rate in percent.
    pub annual_rate: Decimal,
    pub annual_late_rate: Decimal,
    pub term: u32,
    pub payment_day: u32,
}

#[derive(Debug, Clone)]
pub struct IssueCreditCardRequest {
    pub id: ProductId,
    pub document_number: String,
    pub account_number: String,
    pub credit_limit: Amount,
    pub annual_rate: Decimal,
    pub annual_late_rate: Decimal,
    pub payment_day: u32,
}

#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub account: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalSource {
    Account(String),
    /// Draws on the first linked account that covers amount plus commission.
    DebitCard(String),
}

#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub source: WithdrawalSource,
    pub amount: Amount,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: Amount,
}

/// Transfer to whichever account is registered under a phone number.
#[derive(Debug, Clone)]
pub struct MobileTransferRequest {
    pub from: String,
    pub phone_number: String,
    pub amount: Amount,
}

/// Payment towards a credit or credit card.
#[derive(Debug, Clone)]
pub struct DebtPaymentRequest {
    pub product: ProductId,
    /// Paying account; the product's linked account when absent.
    pub from_account: Option<String>,
    pub amount: Amount,
}

/// A purchase charged to a credit card and repaid in installments.
#[derive(Debug, Clone)]
pub struct ConsumptionRequest {
    pub card: ProductId,
    pub amount: Amount,
    pub installments: u32,
}
