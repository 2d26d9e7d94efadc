use crate::domain::account::Account;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct AccountRow<'a> {
    account: &'a str,
    currency: &'a str,
    balance: String,
    active: bool,
}

/// Writes account balances as `account,currency,balance,active`.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, accounts: &[Account]) -> Result<()> {
        if accounts.is_empty() {
            self.writer
                .write_record(["account", "currency", "balance", "active"])?;
        }
        for account in accounts {
            self.writer.serialize(AccountRow {
                account: &account.number,
                currency: &account.currency,
                balance: account.balance.round().to_string(),
                active: account.active,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountType;
    use crate::domain::money::Money;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_header_and_rows() {
        let mut account = Account::new("ACC-1", AccountType::Savings, "PEN", "12345678", Utc::now());
        account.balance = Money::new(dec!(98.010));

        let mut out = Vec::new();
        AccountWriter::new(&mut out)
            .write_accounts(&[account])
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "account,currency,balance,active\nACC-1,PEN,98.01,true\n");
    }

    #[test]
    fn test_empty_ledger_still_has_header() {
        let mut out = Vec::new();
        AccountWriter::new(&mut out).write_accounts(&[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "account,currency,balance,active\n");
    }
}
