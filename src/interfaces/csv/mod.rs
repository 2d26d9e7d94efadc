//! CSV command input and balance/schedule output.

pub mod account_writer;
pub mod command_reader;
pub mod runner;
pub mod schedule_writer;
