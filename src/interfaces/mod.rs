//! Outer adapters that drive the ledger.

pub mod csv;
