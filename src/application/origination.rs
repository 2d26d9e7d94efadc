//! Opening accounts and cards, granting credits and charging card purchases.

use super::ledger::{LedgerService, Posted};
use super::requests::{
    ConsumptionRequest, GrantCreditRequest, IssueCreditCardRequest, IssueDebitCardRequest,
    OpenAccountRequest,
};
use crate::domain::account::{Account, DebitCard};
use crate::domain::debt::{AmortizedDebt, Credit, CreditCard, DebtProduct, ProductId, ProductKind};
use crate::domain::money::Money;
use crate::domain::rates::validate_rates;
use crate::domain::schedule::{EntryId, ScheduleTerms, generate_schedule};
use crate::domain::transaction::{Party, Transaction, TransactionType};
use crate::error::{LedgerError, Result};
use tracing::{error, info, instrument};

impl LedgerService {
    #[instrument(name = "ledger.open_account", skip(self, request), fields(account = %request.number))]
    pub async fn open_account(&self, request: OpenAccountRequest) -> Result<Account> {
        if let Some(phone) = &request.phone_number {
            if self.stores.accounts.find_by_phone(phone).await?.is_some() {
                return Err(LedgerError::ValidationError(format!(
                    "Phone number {phone} is already registered"
                )));
            }
        }

        let mut account = Account::new(
            request.number,
            request.account_type,
            request.currency,
            request.holder,
            self.clock.now(),
        );
        account.phone_number = request.phone_number;
        account.monthly_transaction_limit = request.monthly_transaction_limit;
        account.maintenance_commission = request.maintenance_commission;

        self.stores.accounts.insert(account.clone()).await?;
        info!(currency = %account.currency, "Account opened");
        Ok(account)
    }

    #[instrument(name = "ledger.issue_debit_card", skip(self, request), fields(card = %request.number))]
    pub async fn issue_debit_card(&self, request: IssueDebitCardRequest) -> Result<DebitCard> {
        if request.linked_accounts.is_empty() {
            return Err(LedgerError::ValidationError(
                "A debit card needs at least one linked account".to_string(),
            ));
        }
        for number in &request.linked_accounts {
            self.operable_account(number).await?;
        }

        let card = DebitCard {
            number: request.number,
            linked_accounts: request.linked_accounts,
            active: true,
        };
        self.stores.cards.insert(card.clone()).await?;
        info!(linked = card.linked_accounts.len(), "Debit card issued");
        Ok(card)
    }

    /// Creates the credit with its full schedule and pays the principal out
    /// to the linked account. A failure after the product is stored removes
    /// it again, with its schedule and the payout.
    #[instrument(name = "ledger.grant_credit", skip(self, request), fields(product = %request.id))]
    pub async fn grant_credit(&self, request: GrantCreditRequest) -> Result<Transaction> {
        let principal = Money::from(request.principal);
        let now = self.clock.now();

        validate_rates(request.annual_rate, request.annual_late_rate)?;
        let account = self.operable_account(&request.account_number).await?;
        self.ensure_new_product(&request.id).await?;

        let entries = generate_schedule(
            &request.id,
            &ScheduleTerms {
                principal,
                annual_rate: request.annual_rate,
                annual_late_rate: request.annual_late_rate,
                term: request.term,
                payment_day: request.payment_day,
                granted_on: now.date_naive(),
            },
        )?;

        let operation_number = self.issuer.next().await?;
        let credit = Credit {
            id: request.id.clone(),
            document_number: request.document_number,
            account_number: account.number.clone(),
            principal,
            annual_rate: request.annual_rate,
            annual_late_rate: request.annual_late_rate,
            term: request.term,
            payment_day: request.payment_day,
            active: true,
            created_at: now,
            version: 0,
        };
        let entry_ids: Vec<EntryId> = entries.iter().map(|e| e.id.clone()).collect();
        self.stores.products.insert(DebtProduct::Credit(credit)).await?;
        if let Err(e) = self.stores.schedules.insert_all(entries).await {
            self.discard_product(&request.id, Vec::new()).await;
            return Err(e);
        }
        if let Err(e) = self
            .mutate_account(&account.number, |a| a.credit(principal, now))
            .await
        {
            self.discard_product(&request.id, entry_ids).await;
            return Err(e);
        }

        let tx = Transaction::new(
            operation_number,
            TransactionType::CreditDisbursement,
            principal,
            now,
        )
        .from_party(Party::Product(request.id.0.clone()))
        .to_party(Party::Account(account.number.clone()))
        .post();
        if let Err(e) = self.stores.transactions.store(tx.clone()).await {
            self.roll_back(&[Posted::Credited(&account.number, principal)], now)
                .await;
            self.discard_product(&request.id, entry_ids).await;
            return Err(e);
        }

        info!(operation = %tx.operation_number, %principal, term = request.term, "Credit granted");
        Ok(tx)
    }

    #[instrument(name = "ledger.issue_credit_card", skip(self, request), fields(product = %request.id))]
    pub async fn issue_credit_card(&self, request: IssueCreditCardRequest) -> Result<DebtProduct> {
        validate_rates(request.annual_rate, request.annual_late_rate)?;
        if !(1..=31).contains(&request.payment_day) {
            return Err(LedgerError::ValidationError(format!(
                "Payment day {} is not a day of the month",
                request.payment_day
            )));
        }
        let account = self.operable_account(&request.account_number).await?;
        self.ensure_new_product(&request.id).await?;

        let limit = Money::from(request.credit_limit);
        let card = DebtProduct::CreditCard(CreditCard {
            id: request.id,
            document_number: request.document_number,
            account_number: account.number,
            credit_limit: limit,
            available_credit: limit,
            annual_rate: request.annual_rate,
            annual_late_rate: request.annual_late_rate,
            payment_day: request.payment_day,
            active: true,
            created_at: self.clock.now(),
            version: 0,
        });
        self.stores.products.insert(card.clone()).await?;
        info!(%limit, "Credit card issued");
        Ok(card)
    }

    /// Charges a purchase to a credit card: draws the credit line and appends
    /// an installment schedule for the amount. No account balance moves. A
    /// failure after the draw releases it and drops the new installments.
    #[instrument(name = "ledger.consumption", skip(self, request), fields(product = %request.card))]
    pub async fn post_consumption(&self, request: ConsumptionRequest) -> Result<Transaction> {
        let amount = Money::from(request.amount);
        let now = self.clock.now();

        let card = self
            .active_product(&request.card, ProductKind::CreditCard)
            .await?;
        if request.installments == 0 {
            return Err(LedgerError::InvalidTerm(0));
        }
        let existing = self.stores.schedules.for_product(card.id()).await?;
        let offset = existing.iter().map(|e| e.id.seq).max().unwrap_or(0);

        let mut entries = generate_schedule(
            card.id(),
            &ScheduleTerms {
                principal: amount,
                annual_rate: card.annual_rate(),
                annual_late_rate: card.annual_late_rate(),
                term: request.installments,
                payment_day: card.payment_day(),
                granted_on: now.date_naive(),
            },
        )?;
        for entry in &mut entries {
            entry.id.seq += offset;
        }

        let operation_number = self.issuer.next().await?;
        self.mutate_product(card.id(), |product| {
            let Some(card) = product.as_card_mut() else {
                return Err(LedgerError::not_found("credit card", &request.card.0));
            };
            if card.draw(amount) {
                Ok(())
            } else {
                Err(LedgerError::InsufficientFunds {
                    required: amount,
                    available: card.available_credit,
                })
            }
        })
        .await?;
        let entry_ids: Vec<EntryId> = entries.iter().map(|e| e.id.clone()).collect();
        if let Err(e) = self.stores.schedules.insert_all(entries).await {
            self.release_credit(card.id(), amount).await;
            return Err(e);
        }

        let tx = Transaction::new(
            operation_number,
            TransactionType::ConsumptionCharge,
            amount,
            now,
        )
        .from_party(Party::Product(request.card.0.clone()))
        .post();
        if let Err(e) = self.stores.transactions.store(tx.clone()).await {
            self.discard_entries(entry_ids).await;
            self.release_credit(card.id(), amount).await;
            return Err(e);
        }

        info!(
            operation = %tx.operation_number,
            %amount,
            installments = request.installments,
            "Consumption charged"
        );
        Ok(tx)
    }

    async fn release_credit(&self, id: &ProductId, amount: Money) {
        let released = self
            .mutate_product(id, |p| {
                p.on_principal_repaid(amount);
                Ok(())
            })
            .await;
        if let Err(e) = released {
            error!(card = %id, %amount, error = %e, "Releasing drawn credit failed");
        }
    }

    async fn discard_entries(&self, ids: Vec<EntryId>) {
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.stores.schedules.remove_all(ids).await {
            error!(error = %e, "Removing schedule entries failed");
        }
    }

    /// Removes a product stored by an operation that did not complete.
    async fn discard_product(&self, id: &ProductId, entries: Vec<EntryId>) {
        self.discard_entries(entries).await;
        if let Err(e) = self.stores.products.remove(id).await {
            error!(product = %id, error = %e, "Removing product failed");
        }
    }

    async fn ensure_new_product(&self, id: &ProductId) -> Result<()> {
        if self.stores.products.get(id).await?.is_some() {
            return Err(LedgerError::ValidationError(format!(
                "Product {id} already exists"
            )));
        }
        Ok(())
    }
}
