use crate::domain::schedule::ScheduleEntry;
use crate::error::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct EntryRow {
    seq: u32,
    due_date: NaiveDate,
    principal: String,
    interest: String,
    late_fee: String,
    outstanding: String,
    remaining_balance: String,
    paid: bool,
}

impl From<&ScheduleEntry> for EntryRow {
    fn from(entry: &ScheduleEntry) -> Self {
        Self {
            seq: entry.id.seq,
            due_date: entry.due_date,
            principal: entry.principal.to_string(),
            interest: entry.interest.to_string(),
            late_fee: entry.late_fee.to_string(),
            outstanding: entry.outstanding.to_string(),
            remaining_balance: entry.remaining_balance.to_string(),
            paid: entry.paid,
        }
    }
}

/// Writes an installment schedule, one row per entry.
pub struct ScheduleWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ScheduleWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_schedule(&mut self, entries: &[ScheduleEntry]) -> Result<()> {
        for entry in entries {
            self.writer.serialize(EntryRow::from(entry))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
