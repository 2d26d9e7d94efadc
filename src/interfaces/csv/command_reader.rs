use crate::error::{LedgerError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// Header every command file starts with.
pub const COMMAND_HEADER: &str =
    "op,date,account,counterparty,product,amount,rate,late_rate,term,payment_day,currency,document";

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    OpenAccount,
    IssueDebitCard,
    GrantCredit,
    IssueCreditCard,
    Deposit,
    Withdrawal,
    CardWithdrawal,
    Transfer,
    MobileTransfer,
    PayCredit,
    PayCard,
    Consume,
    Accrue,
}

/// One row of a ledger command file.
///
/// Columns are shared between operations; each operation reads only the ones
/// it needs:
///
/// | op | columns |
/// |----|---------|
/// | `open-account` | `account`, `currency`, `document` (holder), `counterparty` (phone, optional), `product` (`savings`/`checking`, optional) |
/// | `issue-debit-card` | `product` (card number), `account` (`;`-separated, by priority) |
/// | `grant-credit` | `product`, `account`, `document`, `amount`, `rate`, `late_rate`, `term`, `payment_day` |
/// | `issue-credit-card` | `product`, `account`, `document`, `amount` (limit), `rate`, `late_rate`, `payment_day` |
/// | `deposit`, `withdrawal` | `account`, `amount` |
/// | `card-withdrawal` | `product` (debit card number), `amount` |
/// | `transfer` | `account`, `counterparty` (destination account), `amount` |
/// | `mobile-transfer` | `account`, `counterparty` (phone number), `amount` |
/// | `pay-credit`, `pay-card` | `product`, `amount`, `account` (payer, optional) |
/// | `consume` | `product` (credit card), `amount`, `term` (installments) |
/// | `accrue` | none |
///
/// `date` sets the business date the command runs on.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct LedgerCommand {
    pub op: CommandKind,
    pub date: Option<NaiveDate>,
    pub account: Option<String>,
    pub counterparty: Option<String>,
    pub product: Option<String>,
    pub amount: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub late_rate: Option<Decimal>,
    pub term: Option<u32>,
    pub payment_day: Option<u32>,
    pub currency: Option<String>,
    pub document: Option<String>,
}

impl LedgerCommand {
    pub fn account(&self) -> Result<&str> {
        required(self.op, "account", self.account.as_deref())
    }

    pub fn counterparty(&self) -> Result<&str> {
        required(self.op, "counterparty", self.counterparty.as_deref())
    }

    pub fn product(&self) -> Result<&str> {
        required(self.op, "product", self.product.as_deref())
    }

    pub fn document(&self) -> Result<&str> {
        required(self.op, "document", self.document.as_deref())
    }

    pub fn currency(&self) -> Result<&str> {
        required(self.op, "currency", self.currency.as_deref())
    }

    pub fn amount(&self) -> Result<Decimal> {
        required(self.op, "amount", self.amount)
    }

    pub fn rate(&self) -> Result<Decimal> {
        required(self.op, "rate", self.rate)
    }

    pub fn late_rate(&self) -> Result<Decimal> {
        required(self.op, "late_rate", self.late_rate)
    }

    pub fn term(&self) -> Result<u32> {
        required(self.op, "term", self.term)
    }

    pub fn payment_day(&self) -> Result<u32> {
        required(self.op, "payment_day", self.payment_day)
    }
}

fn required<T>(op: CommandKind, column: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| LedgerError::ValidationError(format!("{op:?} requires the '{column}' column")))
}

/// Reads ledger commands from a CSV source.
///
/// Wraps `csv::Reader`, trimming whitespace and accepting short rows, and
/// yields commands lazily so large files stream.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<LedgerCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
