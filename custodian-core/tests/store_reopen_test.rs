//! File-backed store: reopening, schema setup and persisted imports
//!
//! Run with: cargo test --test store_reopen_test -- --nocapture

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tempfile::TempDir;

use custodian_core::adapters::duckdb::DuckDbRepository;
use custodian_core::domain::{Account, AccountType, AssetSubClass, Institution, Instrument};
use custodian_core::ports::{AbortOnUnknown, Repository};
use custodian_core::services::{EntryPoint, ImportRequest, NullReporter};
use custodian_core::CustodianContext;

/// Opening the same file repeatedly must leave schema and data intact
#[test]
fn test_sequential_connections() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("custodian.duckdb");

    {
        let repo = DuckDbRepository::new(&db_path).unwrap();
        repo.ensure_schema().unwrap();
        repo.add_institution(&Institution::new("UBS", "UBS Switzerland AG"))
            .unwrap();
    }

    for i in 0..5 {
        let start = Instant::now();
        let repo = DuckDbRepository::new(&db_path).unwrap();
        repo.ensure_schema().unwrap();
        println!("Connection {}: opened in {:?}", i, start.elapsed());
        assert_eq!(repo.get_institutions().unwrap().len(), 1);
    }
}

#[test]
fn test_context_persists_imports() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let statement = temp_dir.path().join("UBS_20241231.csv");
    std::fs::write(
        &statement,
        "Account,Description,ISIN,Currency,Quantity,Price,Date\n\
         A-1,Apple Inc,US0378331005,USD,10,250.10,2024-12-31\n",
    )
    .unwrap();

    {
        let ctx = CustodianContext::new(&data_dir, EntryPoint::Library).unwrap();
        let ubs = Institution::new("UBS", "UBS Switzerland AG");
        ctx.repository.add_institution(&ubs).unwrap();
        ctx.repository
            .add_account(&Account::new(ubs.id, "A-1", "Custody", "USD", AccountType::Custody))
            .unwrap();
        ctx.repository
            .add_instrument(
                &Instrument::new("Apple Inc", "USD", AssetSubClass::Equity)
                    .with_isin("US0378331005"),
            )
            .unwrap();

        let summary = ctx
            .import_service
            .import_statement(
                &ImportRequest::new(&statement, "UBS"),
                &mut AbortOnUnknown,
                &NullReporter,
            )
            .unwrap();
        assert_eq!(summary.parsed_rows, 1);
    }

    let ctx = CustodianContext::new(&data_dir, EntryPoint::Library).unwrap();
    let positions = ctx.repository.get_positions(None).unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].position.price, Some("250.10".parse::<Decimal>().unwrap()));
    assert_eq!(positions[0].isin.as_deref(), Some("US0378331005"));

    // The file hash survived the reopen, so the same statement is refused
    let err = ctx
        .import_service
        .import_statement(
            &ImportRequest::new(&statement, "UBS"),
            &mut AbortOnUnknown,
            &NullReporter,
        )
        .unwrap_err();
    assert_eq!(err.kind(), "duplicate_file");

    let status = ctx.status_service.get_status().unwrap();
    assert_eq!(status.total_positions, 1);
    assert_eq!(status.date_range.latest.as_deref(), Some("2024-12-31"));

    let logs = ctx.logging_service.as_ref().map(Arc::clone).unwrap();
    assert_eq!(logs.import_log_lines(10).unwrap().len(), 2);
}
