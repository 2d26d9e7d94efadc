use super::retry::retry_on_conflict;
use crate::domain::debt::{AmortizedDebt, ProductId};
use crate::domain::money::Money;
use crate::domain::ports::{ClockArc, ProductStoreArc, ScheduleStoreArc};
use crate::domain::schedule::EntryId;
use crate::error::{LedgerError, Result};
use backon::ExponentialBuilder;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

/// Outcome of one accrual run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccrualReport {
    /// Unpaid entries due on or before the run date.
    pub scanned: usize,
    /// Entries that received late interest in this run.
    pub accrued: usize,
    pub total_accrued: Money,
}

/// Adds late interest to overdue installments.
///
/// Each entry remembers the last date it accrued to, so a run only charges
/// the days since then and repeating a run on the same date is a no-op.
#[derive(Clone)]
pub struct OverdueAccrualJob {
    products: ProductStoreArc,
    schedules: ScheduleStoreArc,
    backoff: ExponentialBuilder,
}

impl OverdueAccrualJob {
    pub fn new(products: ProductStoreArc, schedules: ScheduleStoreArc, backoff: ExponentialBuilder) -> Self {
        Self {
            products,
            schedules,
            backoff,
        }
    }

    #[instrument(name = "ledger.accrue_overdue", skip(self))]
    pub async fn accrue_overdue(&self, today: NaiveDate) -> Result<AccrualReport> {
        let overdue = self.schedules.unpaid_due_by(today).await?;
        let mut rates: HashMap<ProductId, Decimal> = HashMap::new();
        let mut report = AccrualReport {
            scanned: overdue.len(),
            ..Default::default()
        };

        for entry in overdue {
            let rate = match rates.get(&entry.id.product) {
                Some(rate) => *rate,
                None => {
                    let product = self
                        .products
                        .get(&entry.id.product)
                        .await?
                        .ok_or_else(|| LedgerError::not_found("product", &entry.id.product.0))?;
                    let rate = product.daily_late_rate();
                    rates.insert(entry.id.product.clone(), rate);
                    rate
                }
            };

            let added = match self.accrue_entry(&entry.id, rate, today).await {
                Ok(added) => added,
                Err(e @ LedgerError::ValidationError(_)) => {
                    error!(entry = %entry.id, error = %e, "Late interest skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !added.is_zero() {
                debug!(entry = %entry.id, %added, "Late interest accrued");
                report.accrued += 1;
                report.total_accrued = report.total_accrued.checked_add(added)?;
            }
        }

        info!(
            %today,
            scanned = report.scanned,
            accrued = report.accrued,
            total = %report.total_accrued,
            "Overdue accrual completed"
        );
        Ok(report)
    }

    /// Re-reads the entry on every attempt so a concurrent payment is never
    /// overwritten.
    async fn accrue_entry(&self, id: &EntryId, daily_rate: Decimal, today: NaiveDate) -> Result<Money> {
        retry_on_conflict(self.backoff, "schedule entry", || {
            let schedules = self.schedules.clone();
            let id = id.clone();
            async move {
                let Some(mut entry) = schedules.get(&id).await? else {
                    return Err(LedgerError::not_found("schedule entry", id.to_string()));
                };
                let added = entry.accrue_late_interest(daily_rate, today)?;
                if !added.is_zero() {
                    schedules.update_all(vec![entry]).await?;
                }
                Ok(added)
            }
        })
        .await
    }

    /// Runs the job against the clock's current date every `period` (one day
    /// unless configured otherwise) until the returned handle is aborted.
    pub fn spawn_daily(self: Arc<Self>, clock: ClockArc, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = self.accrue_overdue(clock.today()).await {
                    error!(error = %e, "Overdue accrual failed");
                }
            }
        })
    }
}
