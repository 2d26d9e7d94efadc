use super::accrual::{AccrualReport, OverdueAccrualJob};
use super::commission::CommissionAssessor;
use super::operation_number::OperationNumberIssuer;
use super::payment::{AppliedPayment, PaymentService};
use super::requests::{
    DebtPaymentRequest, DepositRequest, MobileTransferRequest, TransferRequest, WithdrawalRequest,
    WithdrawalSource,
};
use super::retry::{conflict_backoff, retry_on_conflict};
use crate::config::LedgerConfig;
use crate::domain::account::Account;
use crate::domain::debt::{AmortizedDebt, DebtProduct, ProductId, ProductKind};
use crate::domain::money::Money;
use crate::domain::ports::{ClockArc, Stores};
use crate::domain::schedule::ScheduleEntry;
use crate::domain::transaction::{OperationNumber, Party, Transaction, TransactionType};
use crate::domain::waterfall::DebtPosition;
use crate::error::{LedgerError, Result};
use backon::ExponentialBuilder;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// A balance change an operation has already written.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Posted<'a> {
    Credited(&'a str, Money),
    Debited(&'a str, Money),
}

/// Entry point for every money-moving operation.
///
/// One instance is shared (behind an `Arc`) by all callers. Preconditions are
/// checked before anything is written; balance and schedule writes are
/// versioned and retried on conflict. When a step fails after the first
/// write, the writes already made are undone before the error is returned.
pub struct LedgerService {
    pub(crate) stores: Stores,
    pub(crate) clock: ClockArc,
    pub(crate) issuer: OperationNumberIssuer,
    pub(crate) commission: CommissionAssessor,
    pub(crate) payments: PaymentService,
    pub(crate) accrual: Arc<OverdueAccrualJob>,
    pub(crate) backoff: ExponentialBuilder,
}

impl LedgerService {
    pub fn new(stores: Stores, clock: ClockArc, config: &LedgerConfig) -> Self {
        let backoff = conflict_backoff(&config.retry);
        Self {
            issuer: OperationNumberIssuer::new(stores.counter.clone()),
            commission: CommissionAssessor::new(
                stores.transactions.clone(),
                config.commission.clone(),
            ),
            payments: PaymentService::new(stores.schedules.clone(), backoff),
            accrual: Arc::new(OverdueAccrualJob::new(
                stores.products.clone(),
                stores.schedules.clone(),
                backoff,
            )),
            stores,
            clock,
            backoff,
        }
    }

    #[instrument(name = "ledger.deposit", skip(self, request), fields(account = %request.account))]
    pub async fn post_deposit(&self, request: DepositRequest) -> Result<Transaction> {
        let amount = Money::from(request.amount);
        let now = self.clock.now();
        let account = self.operable_account(&request.account).await?;

        let commission = self.commission.assess(&account, now).await?;
        if commission >= amount {
            return Err(LedgerError::ValidationError(format!(
                "Deposit of {amount} does not cover the {commission} commission"
            )));
        }
        let net = amount - commission;

        let operation_number = self.issuer.next().await?;
        self.mutate_account(&account.number, |a| a.credit(net, now))
            .await?;

        let tx = Transaction::new(operation_number, TransactionType::Deposit, amount, now)
            .to_party(Party::Account(account.number.clone()))
            .with_commission(commission)
            .post();
        let tx = self
            .record(tx, &[Posted::Credited(&account.number, net)], now)
            .await?;

        info!(operation = %tx.operation_number, %amount, %commission, "Deposit posted");
        Ok(tx)
    }

    #[instrument(name = "ledger.withdrawal", skip(self, request), fields(source = ?request.source))]
    pub async fn post_withdrawal(&self, request: WithdrawalRequest) -> Result<Transaction> {
        let amount = Money::from(request.amount);
        let now = self.clock.now();

        let (account, commission, via) = match &request.source {
            WithdrawalSource::Account(number) => {
                let account = self.operable_account(number).await?;
                let commission = self.commission.assess(&account, now).await?;
                let required = amount + commission;
                if !account.covers(required) {
                    return Err(LedgerError::InsufficientFunds {
                        required,
                        available: account.balance,
                    });
                }
                (account, commission, Party::Account(number.clone()))
            }
            WithdrawalSource::DebitCard(card) => {
                let (account, commission) = self.select_card_account(card, amount, now).await?;
                (account, commission, Party::DebitCard(card.clone()))
            }
        };

        let required = amount + commission;
        let operation_number = self.issuer.next().await?;
        self.mutate_account(&account.number, |a| a.debit(required, now))
            .await?;

        let mut tx = Transaction::new(operation_number, TransactionType::Withdrawal, amount, now)
            .from_party(via)
            .with_commission(commission);
        if tx.accounts.is_empty() {
            tx = tx.touching(account.number.clone());
        }
        let tx = self
            .record(tx.post(), &[Posted::Debited(&account.number, required)], now)
            .await?;

        info!(
            operation = %tx.operation_number,
            account = %account.number,
            %amount,
            %commission,
            "Withdrawal posted"
        );
        Ok(tx)
    }

    /// Walks the card's linked accounts in priority order and returns the
    /// first that covers the amount plus its own commission. Nothing is
    /// written for the accounts it skips.
    async fn select_card_account(
        &self,
        card_number: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(Account, Money)> {
        let card = self
            .stores
            .cards
            .get(card_number)
            .await?
            .filter(|c| c.active)
            .ok_or_else(|| LedgerError::not_found("debit card", card_number))?;

        let mut best_available = Money::ZERO;
        for number in &card.linked_accounts {
            let Some(account) = self
                .stores
                .accounts
                .get(number)
                .await?
                .filter(Account::is_operable)
            else {
                continue;
            };
            let commission = self.commission.assess(&account, now).await?;
            if account.covers(amount + commission) {
                return Ok((account, commission));
            }
            best_available = best_available.max(account.balance);
        }

        Err(LedgerError::InsufficientFunds {
            required: amount,
            available: best_available,
        })
    }

    #[instrument(name = "ledger.transfer", skip(self, request), fields(from = %request.from, to = %request.to))]
    pub async fn post_transfer(&self, request: TransferRequest) -> Result<Transaction> {
        self.move_between(
            &request.from,
            &request.to,
            Money::from(request.amount),
            TransactionType::Transfer,
        )
        .await
    }

    #[instrument(name = "ledger.mobile_transfer", skip(self, request), fields(from = %request.from))]
    pub async fn post_mobile_transfer(&self, request: MobileTransferRequest) -> Result<Transaction> {
        let destination = self
            .stores
            .accounts
            .find_by_phone(&request.phone_number)
            .await?
            .ok_or_else(|| LedgerError::not_found("phone number", &request.phone_number))?;
        self.move_between(
            &request.from,
            &destination.number,
            Money::from(request.amount),
            TransactionType::MobileTransfer,
        )
        .await
    }

    /// Debits `from`, then credits `to`. A failed credit or transaction write
    /// puts the money back before the error is returned.
    async fn move_between(
        &self,
        from: &str,
        to: &str,
        amount: Money,
        r#type: TransactionType,
    ) -> Result<Transaction> {
        if from == to {
            return Err(LedgerError::ValidationError(
                "Source and destination accounts must differ".to_string(),
            ));
        }
        let now = self.clock.now();
        let source = self.operable_account(from).await?;
        let destination = self.operable_account(to).await?;
        if source.currency != destination.currency {
            return Err(LedgerError::ValidationError(format!(
                "Currency mismatch: {} vs {}",
                source.currency, destination.currency
            )));
        }
        if !source.covers(amount) {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: source.balance,
            });
        }

        let operation_number = self.issuer.next().await?;
        self.mutate_account(from, |a| a.debit(amount, now)).await?;
        let debit = Posted::Debited(from, amount);
        if let Err(e) = self.mutate_account(to, |a| a.credit(amount, now)).await {
            self.roll_back(&[debit], now).await;
            return Err(e);
        }

        let tx = Transaction::new(operation_number, r#type, amount, now)
            .from_party(Party::Account(from.to_string()))
            .to_party(Party::Account(to.to_string()))
            .post();
        let tx = self
            .record(tx, &[debit, Posted::Credited(to, amount)], now)
            .await?;

        info!(operation = %tx.operation_number, %amount, "Transfer posted");
        Ok(tx)
    }

    #[instrument(name = "ledger.pay_credit", skip(self, request), fields(product = %request.product))]
    pub async fn post_credit_payment(&self, request: DebtPaymentRequest) -> Result<Transaction> {
        self.pay_debt(request, ProductKind::Credit).await
    }

    #[instrument(name = "ledger.pay_card", skip(self, request), fields(product = %request.product))]
    pub async fn post_card_payment(&self, request: DebtPaymentRequest) -> Result<Transaction> {
        self.pay_debt(request, ProductKind::CreditCard).await
    }

    async fn pay_debt(&self, request: DebtPaymentRequest, kind: ProductKind) -> Result<Transaction> {
        let amount = Money::from(request.amount);
        let now = self.clock.now();
        let today = now.date_naive();

        let product = self.active_product(&request.product, kind).await?;
        let payer = request
            .from_account
            .unwrap_or_else(|| product.linked_account().to_string());
        let account = self.operable_account(&payer).await?;

        let preview = self.payments.preview(product.id(), amount, today).await?;
        if preview.applied.is_zero() {
            return Err(LedgerError::ValidationError(format!(
                "Nothing is due on {} '{}' before {today}",
                kind.label(),
                product.id()
            )));
        }
        let charge = preview.applied;
        if !account.covers(charge) {
            return Err(LedgerError::InsufficientFunds {
                required: charge,
                available: account.balance,
            });
        }

        let operation_number = self.issuer.next().await?;
        self.mutate_account(&account.number, |a| a.debit(charge, now))
            .await?;
        let mut posted = vec![Posted::Debited(&account.number, charge)];

        let payment = match self.payments.apply(product.id(), charge, today).await {
            Ok(payment) => payment,
            Err(e) => {
                self.roll_back(&posted, now).await;
                return Err(e);
            }
        };
        let allocation = payment.allocation.clone();
        if allocation.applied < charge {
            let remainder = charge - allocation.applied;
            if let Err(e) = self
                .mutate_account(&account.number, |a| a.credit(remainder, now))
                .await
            {
                self.undo_payment(payment, None, &posted, now).await;
                return Err(e);
            }
            posted.push(Posted::Credited(&account.number, remainder));
        }

        let mut previous_product = None;
        if !allocation.principal_paid.is_zero() || allocation.fully_settled {
            let principal = allocation.principal_paid;
            let settled = allocation.fully_settled;
            let updated = self
                .mutate_product(product.id(), |p| {
                    p.on_principal_repaid(principal);
                    if settled {
                        p.on_settled();
                    }
                    Ok(())
                })
                .await;
            match updated {
                Ok(previous) => previous_product = Some(previous),
                Err(e) => {
                    self.undo_payment(payment, None, &posted, now).await;
                    return Err(e);
                }
            }
        }

        let r#type = match kind {
            ProductKind::Credit => TransactionType::PayCredit,
            ProductKind::CreditCard => TransactionType::PayCard,
        };
        let tx = Transaction::new(operation_number, r#type, allocation.applied, now)
            .from_party(Party::Account(account.number.clone()))
            .to_party(Party::Product(product.id().0.clone()))
            .post();
        if let Err(e) = self.stores.transactions.store(tx.clone()).await {
            self.undo_payment(payment, previous_product, &posted, now).await;
            return Err(e);
        }

        info!(
            operation = %tx.operation_number,
            applied = %allocation.applied,
            late_fee = %allocation.late_fee_paid,
            interest = %allocation.interest_paid,
            principal = %allocation.principal_paid,
            settled = allocation.fully_settled,
            "Debt payment posted"
        );
        Ok(tx)
    }

    /// Runs the overdue accrual for the clock's current date.
    pub async fn accrue_overdue(&self) -> Result<AccrualReport> {
        self.accrual.accrue_overdue(self.clock.today()).await
    }

    /// The most recent operation number handed out, if any.
    pub async fn last_operation_number(&self) -> Result<Option<OperationNumber>> {
        self.issuer.last().await
    }

    pub fn accrual_job(&self) -> Arc<OverdueAccrualJob> {
        Arc::clone(&self.accrual)
    }

    pub fn clock(&self) -> ClockArc {
        Arc::clone(&self.clock)
    }

    pub async fn account(&self, number: &str) -> Result<Account> {
        self.stores
            .accounts
            .get(number)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", number))
    }

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.stores.accounts.get_all().await
    }

    pub async fn product(&self, id: &ProductId) -> Result<DebtProduct> {
        self.stores
            .products
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("product", &id.0))
    }

    pub async fn schedule_of(&self, id: &ProductId) -> Result<Vec<ScheduleEntry>> {
        self.stores.schedules.for_product(id).await
    }

    pub async fn position(&self, id: &ProductId) -> Result<DebtPosition> {
        self.payments.position(id, self.clock.today()).await
    }

    pub(crate) async fn operable_account(&self, number: &str) -> Result<Account> {
        self.stores
            .accounts
            .get(number)
            .await?
            .filter(Account::is_operable)
            .ok_or_else(|| LedgerError::not_found("account", number))
    }

    pub(crate) async fn active_product(&self, id: &ProductId, kind: ProductKind) -> Result<DebtProduct> {
        self.stores
            .products
            .get(id)
            .await?
            .filter(|p| p.is_active() && p.kind() == kind)
            .ok_or_else(|| LedgerError::not_found(kind.label(), &id.0))
    }

    /// Re-reads the account, applies `change` and writes it back with a
    /// version check, retrying on conflict. `change` sees fresh state on every
    /// attempt, so sufficiency is re-checked after a lost race.
    pub(crate) async fn mutate_account<F>(&self, number: &str, change: F) -> Result<Account>
    where
        F: Fn(&mut Account) -> Result<()> + Sync,
    {
        let accounts = &self.stores.accounts;
        let change = &change;
        retry_on_conflict(self.backoff, "account", move || async move {
            let mut account = accounts
                .get(number)
                .await?
                .ok_or_else(|| LedgerError::not_found("account", number))?;
            change(&mut account)?;
            accounts.update(account).await
        })
        .await
    }

    /// Versioned read-modify-write of a product, like [`Self::mutate_account`].
    ///
    /// Returns the product as it was before `change`, carrying the version
    /// now stored: writing it back undoes the change unless another write
    /// landed in between.
    pub(crate) async fn mutate_product<F>(&self, id: &ProductId, change: F) -> Result<DebtProduct>
    where
        F: Fn(&mut DebtProduct) -> Result<()> + Sync,
    {
        let products = &self.stores.products;
        let change = &change;
        retry_on_conflict(self.backoff, "product", move || async move {
            let mut product = products
                .get(id)
                .await?
                .ok_or_else(|| LedgerError::not_found("product", &id.0))?;
            let mut previous = product.clone();
            change(&mut product)?;
            let stored = products.update(product).await?;
            previous.set_version(stored.version());
            Ok(previous)
        })
        .await
    }

    /// Persists `tx` as the last step of an operation. If the store rejects
    /// it, the balance changes in `posted` are undone first.
    pub(crate) async fn record(
        &self,
        tx: Transaction,
        posted: &[Posted<'_>],
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        if let Err(e) = self.stores.transactions.store(tx.clone()).await {
            self.roll_back(posted, now).await;
            return Err(e);
        }
        Ok(tx)
    }

    /// Undoes balance changes, newest first. A change that cannot be undone
    /// is logged; the caller still returns its original error.
    pub(crate) async fn roll_back(&self, posted: &[Posted<'_>], now: DateTime<Utc>) {
        for change in posted.iter().rev() {
            let (number, amount, result) = match *change {
                Posted::Credited(number, amount) => (
                    number,
                    amount,
                    self.mutate_account(number, |a| a.debit(amount, now)).await,
                ),
                Posted::Debited(number, amount) => (
                    number,
                    amount,
                    self.mutate_account(number, |a| a.credit(amount, now)).await,
                ),
            };
            if let Err(e) = result {
                error!(account = number, %amount, error = %e, "Balance rollback failed");
            }
        }
    }

    /// Undoes a debt payment whose waterfall was already persisted.
    async fn undo_payment(
        &self,
        payment: AppliedPayment,
        previous_product: Option<DebtProduct>,
        posted: &[Posted<'_>],
        now: DateTime<Utc>,
    ) {
        if let Some(previous) = previous_product {
            let id = previous.id().clone();
            if let Err(e) = self.stores.products.update(previous).await {
                error!(product = %id, error = %e, "Product rollback failed");
            }
        }
        if let Err(e) = self.payments.revert(payment).await {
            error!(error = %e, "Schedule rollback failed");
        }
        self.roll_back(posted, now).await;
    }
}
