//! Allocation of a payment across a product's installments.
//!
//! Each installment is paid late fee first, then interest, then principal.
//! A payment that matches the whole debt settles every installment, due or
//! not; anything smaller only reaches installments already due, oldest first.

use super::money::Money;
use super::schedule::{EntryId, ScheduleEntry};
use crate::error::{LedgerError, Result};
use chrono::NaiveDate;

/// Split of a product's unpaid debt around a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebtPosition {
    /// Outstanding on installments due on or before the reference date.
    pub current_due: Money,
    /// Outstanding on installments not yet due.
    pub future: Money,
}

impl DebtPosition {
    pub fn total_debt(&self) -> Money {
        self.current_due + self.future
    }
}

/// Fails with `ValidationError` when the debt does not fit the decimal range,
/// so [`DebtPosition::total_debt`] of a returned position never overflows.
pub fn debt_position(entries: &[ScheduleEntry], today: NaiveDate) -> Result<DebtPosition> {
    let mut position = DebtPosition::default();
    for e in entries.iter().filter(|e| !e.paid) {
        if e.due_date <= today {
            position.current_due = position.current_due.checked_add(e.outstanding)?;
        } else {
            position.future = position.future.checked_add(e.outstanding)?;
        }
    }
    position.current_due.checked_add(position.future)?;
    Ok(position)
}

/// How a payment was spread over a schedule.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaymentAllocation {
    pub applied: Money,
    /// Part of the payment that found no due installment to pay.
    pub unapplied: Money,
    pub late_fee_paid: Money,
    pub interest_paid: Money,
    pub principal_paid: Money,
    /// Installments changed by the payment, in the order they were paid.
    pub touched: Vec<EntryId>,
    /// Every installment of the schedule is now paid.
    pub fully_settled: bool,
}

impl PaymentAllocation {
    fn record(&mut self, id: &EntryId, split: EntrySplit) {
        self.late_fee_paid += split.late_fee;
        self.interest_paid += split.interest;
        self.principal_paid += split.principal;
        self.applied += split.total();
        self.touched.push(id.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct EntrySplit {
    late_fee: Money,
    interest: Money,
    principal: Money,
}

impl EntrySplit {
    fn total(&self) -> Money {
        self.late_fee + self.interest + self.principal
    }
}

/// Applies `amount` to `entries` as of `today`, mutating them in place.
///
/// Fails with [`LedgerError::Overpayment`] without touching anything when the
/// amount exceeds the total outstanding debt.
pub fn apply_payment(
    entries: &mut [ScheduleEntry],
    amount: Money,
    today: NaiveDate,
) -> Result<PaymentAllocation> {
    if amount.value().is_sign_negative() || amount.is_zero() {
        return Err(LedgerError::ValidationError(
            "Payment amount must be positive".to_string(),
        ));
    }

    let total_debt = debt_position(entries, today)?.total_debt();
    if amount > total_debt {
        return Err(LedgerError::Overpayment { amount, total_debt });
    }

    let mut order: Vec<usize> = (0..entries.len()).filter(|&i| !entries[i].paid).collect();
    order.sort_by(|&a, &b| {
        (entries[a].due_date, entries[a].id.seq).cmp(&(entries[b].due_date, entries[b].id.seq))
    });

    let mut allocation = PaymentAllocation::default();

    if amount == total_debt {
        for i in order {
            let entry = &mut entries[i];
            let split = settle_entry(entry);
            allocation.record(&entry.id, split);
        }
    } else {
        let mut remaining = amount;
        for i in order {
            if remaining.is_zero() {
                break;
            }
            let entry = &mut entries[i];
            if !entry.is_due(today) {
                continue;
            }
            let split = allocate_to_entry(entry, remaining);
            remaining -= split.total();
            allocation.record(&entry.id, split);
        }
        allocation.unapplied = remaining;
    }

    allocation.fully_settled = entries.iter().all(|e| e.paid);
    Ok(allocation)
}

fn settle_entry(entry: &mut ScheduleEntry) -> EntrySplit {
    let split = EntrySplit {
        late_fee: entry.late_fee,
        interest: entry.interest,
        principal: entry.principal,
    };
    entry.settle();
    split
}

/// Pays as much of one installment as `available` allows.
fn allocate_to_entry(entry: &mut ScheduleEntry, available: Money) -> EntrySplit {
    if available >= entry.outstanding {
        return settle_entry(entry);
    }

    let mut left = available;
    let late_fee = left.min(entry.late_fee);
    left -= late_fee;
    let interest = left.min(entry.interest);
    left -= interest;
    let principal = left.min(entry.principal);

    entry.late_fee -= late_fee;
    entry.interest -= interest;
    entry.principal -= principal;
    entry.recompute_outstanding();

    EntrySplit {
        late_fee,
        interest,
        principal,
    }
}
