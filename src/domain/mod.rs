//! Ledger entities, value objects and the pure algorithms over them.
//!
//! Nothing in here performs I/O; persistence is reached through the traits
//! in [`ports`].

pub mod account;
pub mod debt;
pub mod money;
pub mod ports;
pub mod rates;
pub mod schedule;
pub mod transaction;
pub mod waterfall;
