use super::debt::ProductId;
use super::money::{MAX_AMOUNT, Money};
use super::rates::{installment_amount, monthly_rate, validate_rates};
use crate::error::{LedgerError, Result};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one installment: the owning product plus its 1-based sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId {
    pub product: ProductId,
    pub seq: u32,
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:03}", self.product, self.seq)
    }
}

/// One due payment obligation of a credit or credit card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: EntryId,
    pub due_date: NaiveDate,
    pub principal: Money,
    pub interest: Money,
    pub late_fee: Money,
    /// Always `principal + interest + late_fee`.
    pub outstanding: Money,
    /// Principal still owed on the product once this installment is paid.
    pub remaining_balance: Money,
    pub paid: bool,
    pub last_accrual_date: Option<NaiveDate>,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub version: u64,
}

impl ScheduleEntry {
    pub fn is_due(&self, today: NaiveDate) -> bool {
        !self.paid && self.due_date <= today
    }

    pub fn recompute_outstanding(&mut self) {
        self.outstanding = self.principal + self.interest + self.late_fee;
    }

    /// Zeroes every component and marks the entry paid.
    pub fn settle(&mut self) {
        self.principal = Money::ZERO;
        self.interest = Money::ZERO;
        self.late_fee = Money::ZERO;
        self.outstanding = Money::ZERO;
        self.paid = true;
    }

    /// Adds late interest for the days since the last accrual (or since the
    /// due date when the entry has never accrued) up to `today`.
    ///
    /// Returns the amount added. Calling it again with the same `today` adds
    /// nothing. Leaves the entry untouched if the new fee would leave the
    /// decimal range.
    pub fn accrue_late_interest(&mut self, daily_late_rate: Decimal, today: NaiveDate) -> Result<Money> {
        if !self.is_due(today) {
            return Ok(Money::ZERO);
        }
        let from = match self.last_accrual_date {
            Some(last) if last > self.due_date => last,
            _ => self.due_date,
        };
        let days = (today - from).num_days();
        if days <= 0 {
            return Ok(Money::ZERO);
        }

        let accrued = self
            .outstanding
            .checked_mul(daily_late_rate)?
            .checked_mul(Decimal::from(days))?
            .round();
        let late_fee = self.late_fee.checked_add(accrued)?;
        let outstanding = self.outstanding.checked_add(accrued)?;
        self.late_fee = late_fee;
        self.outstanding = outstanding;
        self.last_accrual_date = Some(today);
        Ok(accrued)
    }
}

/// Longest schedule a credit or purchase may be split into, in months.
pub const MAX_TERM: u32 = 600;

/// Parameters of a newly granted credit or card purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleTerms {
    pub principal: Money,
    pub annual_rate: Decimal,
    pub annual_late_rate: Decimal,
    pub term: u32,
    pub payment_day: u32,
    pub granted_on: NaiveDate,
}

/// Builds the reducing-balance amortization schedule for `terms`.
///
/// Installment, interest and principal portions are settled to cents; the
/// last installment takes whatever principal is left so the portions add up
/// to the granted principal exactly.
pub fn generate_schedule(product: &ProductId, terms: &ScheduleTerms) -> Result<Vec<ScheduleEntry>> {
    if terms.principal.value() <= Decimal::ZERO || terms.principal.value() > MAX_AMOUNT {
        return Err(LedgerError::ValidationError(format!(
            "Principal must be positive and at most {MAX_AMOUNT}"
        )));
    }
    if terms.term > MAX_TERM {
        return Err(LedgerError::InvalidTerm(i64::from(terms.term)));
    }
    validate_rates(terms.annual_rate, terms.annual_late_rate)?;
    let rate = monthly_rate(terms.annual_rate);
    let installment = installment_amount(terms.principal, rate, i64::from(terms.term))?.round();
    let first_due = first_due_date(terms.granted_on, terms.payment_day)?;

    let mut remaining = terms.principal;
    let mut entries = Vec::with_capacity(terms.term as usize);

    for i in 1..=terms.term {
        let interest = (remaining * rate).round();
        let principal = if i == terms.term {
            remaining
        } else {
            (installment - interest).min(remaining)
        };
        remaining -= principal;

        entries.push(ScheduleEntry {
            id: EntryId {
                product: product.clone(),
                seq: i,
            },
            due_date: add_months(first_due, i - 1, terms.payment_day)?,
            principal,
            interest,
            late_fee: Money::ZERO,
            outstanding: principal + interest,
            remaining_balance: remaining,
            paid: false,
            last_accrual_date: None,
            version: 0,
        });
    }

    Ok(entries)
}

/// First occurrence of `payment_day` strictly after `granted_on`, clamped to
/// the end of shorter months.
pub fn first_due_date(granted_on: NaiveDate, payment_day: u32) -> Result<NaiveDate> {
    if !(1..=31).contains(&payment_day) {
        return Err(LedgerError::ValidationError(format!(
            "Payment day {payment_day} is not a day of the month"
        )));
    }
    let this_month = clamped_date(granted_on.year(), granted_on.month0(), payment_day)?;
    if this_month > granted_on {
        Ok(this_month)
    } else {
        add_months(this_month, 1, payment_day)
    }
}

fn add_months(date: NaiveDate, months: u32, payment_day: u32) -> Result<NaiveDate> {
    clamped_date(date.year(), date.month0() + months, payment_day)
}

fn clamped_date(year: i32, month0: u32, day: u32) -> Result<NaiveDate> {
    let year = year + (month0 / 12) as i32;
    let month = month0 % 12 + 1;
    let last_day = last_day_of_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.min(last_day))
        .ok_or_else(|| LedgerError::ValidationError(format!("Invalid date {year}-{month}-{day}")))
}

pub fn last_day_of_month(year: i32, month: u32) -> Result<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .ok_or_else(|| LedgerError::ValidationError(format!("Invalid month {year}-{month}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn terms(principal: Decimal, rate: Decimal, term: u32) -> ScheduleTerms {
        ScheduleTerms {
            principal: Money::new(principal),
            annual_rate: rate,
            annual_late_rate: dec!(36.5),
            term,
            payment_day: 15,
            granted_on: date(2025, 1, 10),
        }
    }

    #[test]
    fn test_reference_schedule() {
        let entries = generate_schedule(&ProductId::from("CR-1"), &terms(dec!(300), dec!(12), 3)).unwrap();

        assert_eq!(entries.len(), 3);
        let principal: Money = entries.iter().map(|e| e.principal).sum();
        assert_eq!(principal, Money::new(dec!(300)));

        assert_eq!(entries[0].interest, Money::new(dec!(3.00)));
        assert_eq!(entries[0].principal, Money::new(dec!(99.01)));
        assert_eq!(entries[0].outstanding, Money::new(dec!(102.01)));
        assert_eq!(entries[0].remaining_balance, Money::new(dec!(200.99)));
        assert_eq!(entries[2].remaining_balance, Money::ZERO);
        assert!(entries.iter().all(|e| !e.paid && e.late_fee.is_zero()));
    }

    #[test]
    fn test_due_dates_follow_payment_day() {
        let entries = generate_schedule(&ProductId::from("CR-1"), &terms(dec!(300), dec!(12), 3)).unwrap();
        let dates: Vec<_> = entries.iter().map(|e| e.due_date).collect();
        assert_eq!(dates, vec![date(2025, 1, 15), date(2025, 2, 15), date(2025, 3, 15)]);
    }

    #[test]
    fn test_due_dates_clamp_to_month_end() {
        let mut t = terms(dec!(1200), dec!(18), 4);
        t.payment_day = 31;
        t.granted_on = date(2024, 12, 31);
        let entries = generate_schedule(&ProductId::from("CR-2"), &t).unwrap();
        let dates: Vec<_> = entries.iter().map(|e| e.due_date).collect();
        assert_eq!(
            dates,
            vec![date(2025, 1, 31), date(2025, 2, 28), date(2025, 3, 31), date(2025, 4, 30)]
        );
    }

    #[test]
    fn test_principal_sums_exactly_for_awkward_inputs() {
        for (principal, rate, term) in [
            (dec!(1000), dec!(19.99), 7),
            (dec!(12345.67), dec!(3.3), 36),
            (dec!(99.99), dec!(0), 12),
            (dec!(50000), dec!(45), 60),
        ] {
            let entries = generate_schedule(&ProductId::from("CR-X"), &terms(principal, rate, term)).unwrap();
            let sum: Money = entries.iter().map(|e| e.principal).sum();
            assert_eq!(sum, Money::new(principal), "principal {principal} rate {rate} term {term}");
            for e in &entries {
                assert_eq!(e.outstanding, e.principal + e.interest + e.late_fee);
            }
        }
    }

    #[test]
    fn test_zero_term_rejected() {
        let result = generate_schedule(&ProductId::from("CR-1"), &terms(dec!(300), dec!(12), 0));
        assert!(matches!(result, Err(LedgerError::InvalidTerm(0))));
    }

    #[test]
    fn test_oversized_term_rejected_before_allocating() {
        let result = generate_schedule(
            &ProductId::from("CR-1"),
            &terms(dec!(300), Decimal::ZERO, u32::MAX),
        );
        assert!(matches!(result, Err(LedgerError::InvalidTerm(t)) if t == i64::from(u32::MAX)));

        let longest = generate_schedule(&ProductId::from("CR-1"), &terms(dec!(300), dec!(12), MAX_TERM));
        assert_eq!(longest.unwrap().len(), MAX_TERM as usize);
    }

    #[test]
    fn test_out_of_range_inputs_are_rejected() {
        assert!(matches!(
            generate_schedule(&ProductId::from("CR-1"), &terms(Decimal::MAX, dec!(12), 3)),
            Err(LedgerError::ValidationError(_))
        ));
        assert!(matches!(
            generate_schedule(&ProductId::from("CR-1"), &terms(dec!(300), Decimal::MAX, 3)),
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invalid_payment_day_rejected() {
        let mut t = terms(dec!(300), dec!(12), 3);
        t.payment_day = 0;
        assert!(matches!(
            generate_schedule(&ProductId::from("CR-1"), &t),
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_accrual_is_incremental() {
        let mut entries = generate_schedule(&ProductId::from("CR-1"), &terms(dec!(300), dec!(12), 3)).unwrap();
        let entry = &mut entries[0];
        // 36.5% a year is 0.1% a day; due 2025-01-15.
        let daily = dec!(0.001);

        let first = entry.accrue_late_interest(daily, date(2025, 1, 25)).unwrap();
        assert_eq!(first, Money::new(dec!(1.02)));
        assert_eq!(entry.accrue_late_interest(daily, date(2025, 1, 25)).unwrap(), Money::ZERO);

        let second = entry.accrue_late_interest(daily, date(2025, 1, 26)).unwrap();
        assert_eq!(second, Money::new(dec!(0.10)));
        assert_eq!(entry.late_fee, Money::new(dec!(1.12)));
        assert_eq!(entry.outstanding, entry.principal + entry.interest + entry.late_fee);
    }

    #[test]
    fn test_accrual_skips_entries_not_yet_due() {
        let mut entries = generate_schedule(&ProductId::from("CR-1"), &terms(dec!(300), dec!(12), 3)).unwrap();
        let before = entries[1].clone();
        assert_eq!(
            entries[1].accrue_late_interest(dec!(0.001), date(2025, 1, 25)).unwrap(),
            Money::ZERO
        );
        assert_eq!(entries[1], before);
    }

    #[test]
    fn test_accrual_past_decimal_range_leaves_entry_untouched() {
        let mut entries = generate_schedule(&ProductId::from("CR-1"), &terms(dec!(300), dec!(12), 3)).unwrap();
        let entry = &mut entries[0];
        entry.outstanding = Money::new(Decimal::MAX);
        let before = entry.clone();

        let result = entry.accrue_late_interest(dec!(0.001), date(2025, 1, 25));
        assert!(matches!(result, Err(LedgerError::ValidationError(_))));
        assert_eq!(*entry, before);
    }
}
