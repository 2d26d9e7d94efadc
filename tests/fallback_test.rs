use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "op,date,account,counterparty,product,amount,rate,late_rate,term,payment_day,currency,document").unwrap();
    writeln!(csv, "open-account,2025-01-02,ACC-1,,,,,,,,PEN,1").unwrap();
    writeln!(csv, "deposit,2025-01-03,ACC-1,,,100,,,,,,").unwrap();

    let mut cmd = Command::new(cargo_bin!("credit-ledger"));
    cmd.arg("process").arg(csv.path()).arg("--db-path").arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Falling back to in-memory storage"))
        .stdout(predicate::str::contains("ACC-1,PEN,100,true"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "op,date,account,counterparty,product,amount,rate,late_rate,term,payment_day,currency,document").unwrap();
    writeln!(csv, "open-account,2025-01-02,ACC-1,,,,,,,,PEN,1").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("credit-ledger"));
    cmd.arg("process").arg(csv.path()).arg("--db-path").arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Falling back").not());
}
