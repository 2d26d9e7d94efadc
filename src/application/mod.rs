//! Application layer: orchestration of the ledger operations.
//!
//! [`ledger::LedgerService`] is the facade every caller goes through. It
//! composes the operation number issuer, the commission assessor, the
//! persisted payment waterfall and the overdue accrual job over the
//! persistence ports in [`crate::domain::ports`].

pub mod accrual;
pub mod commission;
pub mod ledger;
pub mod operation_number;
pub mod origination;
pub mod payment;
pub mod requests;
pub mod retry;
