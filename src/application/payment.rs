use super::retry::retry_on_conflict;
use crate::domain::debt::ProductId;
use crate::domain::money::Money;
use crate::domain::ports::ScheduleStoreArc;
use crate::domain::schedule::ScheduleEntry;
use crate::domain::waterfall::{DebtPosition, PaymentAllocation, apply_payment, debt_position};
use crate::error::Result;
use backon::ExponentialBuilder;
use chrono::NaiveDate;

/// A persisted payment and the touched entries as they were before it.
#[derive(Debug, Clone)]
pub struct AppliedPayment {
    pub allocation: PaymentAllocation,
    previous: Vec<ScheduleEntry>,
}

/// Runs the payment waterfall against stored schedules.
#[derive(Clone)]
pub struct PaymentService {
    schedules: ScheduleStoreArc,
    backoff: ExponentialBuilder,
}

impl PaymentService {
    pub fn new(schedules: ScheduleStoreArc, backoff: ExponentialBuilder) -> Self {
        Self { schedules, backoff }
    }

    pub async fn position(&self, product: &ProductId, today: NaiveDate) -> Result<DebtPosition> {
        let entries = self.schedules.for_product(product).await?;
        debt_position(&entries, today)
    }

    /// What `apply` would do right now, without saving anything.
    pub async fn preview(
        &self,
        product: &ProductId,
        amount: Money,
        today: NaiveDate,
    ) -> Result<PaymentAllocation> {
        let mut entries = self.schedules.for_product(product).await?;
        apply_payment(&mut entries, amount, today)
    }

    /// Applies `amount` and saves every installment it touched in one
    /// versioned batch. A conflicting write re-reads the schedule and
    /// allocates again.
    pub async fn apply(
        &self,
        product: &ProductId,
        amount: Money,
        today: NaiveDate,
    ) -> Result<AppliedPayment> {
        let schedules = &self.schedules;
        retry_on_conflict(self.backoff, "schedule", move || async move {
            let mut entries = schedules.for_product(product).await?;
            let before = entries.clone();
            let allocation = apply_payment(&mut entries, amount, today)?;
            let touched: Vec<ScheduleEntry> = entries
                .into_iter()
                .filter(|e| allocation.touched.contains(&e.id))
                .collect();
            let previous = before
                .into_iter()
                .filter(|e| allocation.touched.contains(&e.id))
                .collect();
            schedules.update_all(touched).await?;
            Ok(AppliedPayment {
                allocation,
                previous,
            })
        })
        .await
    }

    /// Writes the entries touched by `payment` back to their earlier state.
    /// Fails with a conflict when any of them changed since.
    pub async fn revert(&self, payment: AppliedPayment) -> Result<()> {
        let restored = payment
            .previous
            .into_iter()
            .map(|mut entry| {
                entry.version += 1;
                entry
            })
            .collect();
        self.schedules.update_all(restored).await
    }
}
