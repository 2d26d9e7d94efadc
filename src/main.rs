use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use credit_ledger::application::ledger::LedgerService;
use credit_ledger::config::LedgerConfig;
use credit_ledger::domain::debt::ProductId;
use credit_ledger::domain::money::Amount;
use credit_ledger::domain::ports::{ClockArc, Stores};
use credit_ledger::domain::schedule::{ScheduleTerms, generate_schedule};
use credit_ledger::infrastructure::clock::{ManualClock, SystemClock};
use credit_ledger::infrastructure::in_memory::in_memory_stores;
use credit_ledger::interfaces::csv::account_writer::AccountWriter;
use credit_ledger::interfaces::csv::command_reader::CommandReader;
use credit_ledger::interfaces::csv::runner::CommandRunner;
use credit_ledger::interfaces::csv::schedule_writer::ScheduleWriter;
use credit_ledger::telemetry::init_tracing;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file (also read from CREDIT_LEDGER_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the amortization schedule of a credit as CSV
    Schedule {
        #[arg(long)]
        principal: Decimal,
        /// Annual interest rate in percent
        #[arg(long)]
        rate: Decimal,
        /// Annual late-interest rate in percent
        #[arg(long, default_value = "0")]
        late_rate: Decimal,
        #[arg(long)]
        term: u32,
        #[arg(long)]
        payment_day: u32,
        /// Grant date (YYYY-MM-DD)
        #[arg(long)]
        granted_on: NaiveDate,
    },
    /// Apply a CSV file of ledger commands and print the resulting balances
    Process {
        /// Input commands CSV file
        input: PathBuf,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Add late interest to overdue installments and print what was accrued
    Accrue {
        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Accrue as of this date instead of today (YYYY-MM-DD)
        #[arg(long)]
        on: Option<NaiveDate>,

        /// Keep running and accrue once per configured interval until Ctrl-C
        #[arg(long, conflicts_with = "on")]
        daemon: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = LedgerConfig::load(cli.config.as_deref()).into_diagnostic()?;

    match cli.command {
        Command::Schedule {
            principal,
            rate,
            late_rate,
            term,
            payment_day,
            granted_on,
        } => {
            let terms = ScheduleTerms {
                principal: Amount::new(principal).into_diagnostic()?.into(),
                annual_rate: rate,
                annual_late_rate: late_rate,
                term,
                payment_day,
                granted_on,
            };
            let entries = generate_schedule(&ProductId::from("schedule"), &terms).into_diagnostic()?;
            ScheduleWriter::new(io::stdout().lock())
                .write_schedule(&entries)
                .into_diagnostic()?;
        }
        Command::Process { input, db_path } => {
            let stores = open_stores(db_path)?;
            process(input, stores, &config).await?;
        }
        Command::Accrue {
            db_path,
            on,
            daemon,
        } => {
            let stores = open_stores(db_path)?;
            accrue(stores, on, daemon, &config).await?;
        }
    }

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    use credit_ledger::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => Ok(RocksDBStore::open(path).into_diagnostic()?.stores()),
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but the 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(in_memory_stores())
}

async fn process(input: PathBuf, stores: Stores, config: &LedgerConfig) -> Result<()> {
    let runner = CommandRunner::new(stores, config);

    let file = File::open(input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    let (mut applied, mut failed) = (0usize, 0usize);
    for (line, command) in reader.commands().enumerate() {
        match command {
            Ok(command) => match runner.run(command).await {
                Ok(outcome) => {
                    applied += 1;
                    info!(line = line + 2, ?outcome, "Command applied");
                }
                Err(e) => {
                    failed += 1;
                    warn!(line = line + 2, error = %e, "Command rejected");
                }
            },
            Err(e) => {
                failed += 1;
                warn!(line = line + 2, error = %e, "Unreadable command");
            }
        }
    }
    let last = runner.ledger().last_operation_number().await.into_diagnostic()?;
    info!(
        applied,
        failed,
        last_operation = last.as_ref().map_or("none", |n| n.as_str()),
        "Input processed"
    );

    let accounts = runner.ledger().accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(&accounts).into_diagnostic()?;

    Ok(())
}

async fn accrue(
    stores: Stores,
    on: Option<NaiveDate>,
    daemon: bool,
    config: &LedgerConfig,
) -> Result<()> {
    let clock: ClockArc = match on {
        Some(day) => Arc::new(ManualClock::on(day)),
        None => Arc::new(SystemClock),
    };
    let ledger = LedgerService::new(stores, clock, config);

    if daemon {
        let period = config.accrual.interval();
        let job = ledger.accrual_job().spawn_daily(ledger.clock(), period);
        info!(interval_secs = config.accrual.interval_secs, "Overdue accrual scheduled");
        tokio::signal::ctrl_c().await.into_diagnostic()?;
        job.abort();
        info!("Overdue accrual stopped");
        return Ok(());
    }

    let report = ledger.accrue_overdue().await.into_diagnostic()?;
    let mut wtr = csv::Writer::from_writer(io::stdout().lock());
    wtr.write_record(["scanned", "accrued", "total_accrued"])
        .into_diagnostic()?;
    wtr.write_record([
        report.scanned.to_string(),
        report.accrued.to_string(),
        report.total_accrued.to_string(),
    ])
    .into_diagnostic()?;
    wtr.flush().into_diagnostic()?;

    Ok(())
}
