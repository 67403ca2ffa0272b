//! Imports running on worker threads against a shared data directory
//!
//! Run with: cargo test --test concurrent_import_test -- --nocapture

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use custodian_core::adapters::duckdb::DuckDbRepository;
use custodian_core::adapters::parsers::ParserRegistry;
use custodian_core::domain::{
    Account, AccountType, AssetSubClass, ImportError, InstrumentDecision, Institution, Instrument,
    NewInstrument, PromptRequest, SessionStatus,
};
use custodian_core::ports::{AbortOnUnknown, Repository};
use custodian_core::services::{ImportRequest, ImportService, NullReporter};
use custodian_core::Error;

const HEADER: &str = "Account,Description,ISIN,Currency,Quantity,Price,Date";

fn seeded_store() -> Arc<DuckDbRepository> {
    let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
    let ubs = Institution::new("UBS", "UBS Switzerland AG");
    repo.add_institution(&ubs).unwrap();
    repo.add_account(&Account::new(ubs.id, "A-1", "Custody", "CHF", AccountType::Custody))
        .unwrap();
    repo.add_instrument(
        &Instrument::new("Nestle SA", "CHF", AssetSubClass::Equity).with_isin("CH0038863350"),
    )
    .unwrap();
    repo
}

fn service(repo: &Arc<DuckDbRepository>, data_dir: &Path) -> Arc<ImportService> {
    Arc::new(ImportService::new(
        repo.clone(),
        Arc::new(ParserRegistry::with_builtin()),
        Some(data_dir),
    ))
}

/// Second row is an instrument the store does not know
fn statement(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let lines = [
        HEADER,
        "A-1,Nestle SA,CH0038863350,CHF,100,95.50,2024-12-31",
        "A-1,Novartis AG,CH0012005267,CHF,40,88.10,2024-12-31",
    ];
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn known_only(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let lines = [HEADER, "A-1,Nestle SA,CH0038863350,CHF,7,95.50,2024-12-31"];
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

#[test]
fn test_pending_import_blocks_others() {
    let dir = TempDir::new().unwrap();
    let repo = seeded_store();
    let first = service(&repo, dir.path());
    let second = service(&repo, dir.path());

    let handle = first
        .spawn_import(
            ImportRequest::new(statement(dir.path(), "UBS_20241231.csv"), "UBS"),
            Arc::new(NullReporter),
        )
        .unwrap();

    // The worker holds the lock while it waits for an answer
    let pending = handle.next_prompt().expect("prompt for the unknown instrument");
    match pending.request() {
        PromptRequest::UnknownInstrument(proposal) => {
            assert_eq!(proposal.isin.as_deref(), Some("CH0012005267"));
            assert_eq!(proposal.source.line, 3);
        }
        other => panic!("unexpected prompt {:?}", other),
    }

    let other_file = known_only(dir.path(), "UBS_20250131.csv");
    let request = ImportRequest::new(&other_file, "UBS");

    // Another service on the same data directory sees the file lock
    let err = second
        .import_statement(&request, &mut AbortOnUnknown, &NullReporter)
        .unwrap_err();
    assert!(matches!(err, ImportError::Busy { .. }));

    // The same service sees its own flag
    let err = first
        .import_statement(&request, &mut AbortOnUnknown, &NullReporter)
        .unwrap_err();
    assert_eq!(err.kind(), "busy");

    assert!(matches!(
        first.delete_positions("UBS", None),
        Err(Error::Validation(_))
    ));

    pending.answer_instrument(InstrumentDecision::Save(NewInstrument {
        name: "Novartis AG".to_string(),
        isin: Some("CH0012005267".to_string()),
        ticker: None,
        currency: "CHF".to_string(),
        sub_class: AssetSubClass::Equity,
    }));
    let summary = handle.join().unwrap();
    assert_eq!(summary.parsed_rows, 2);

    // Lock released once the worker is done
    let summary = second
        .import_statement(&request, &mut AbortOnUnknown, &NullReporter)
        .unwrap();
    assert_eq!(summary.parsed_rows, 1);
    assert_eq!(repo.get_positions(None).unwrap().len(), 3);
}

#[test]
fn test_unanswered_prompt_aborts() {
    let dir = TempDir::new().unwrap();
    let repo = seeded_store();
    let service = service(&repo, dir.path());

    let handle = service
        .spawn_import(
            ImportRequest::new(statement(dir.path(), "UBS_20241231.csv"), "UBS"),
            Arc::new(NullReporter),
        )
        .unwrap();
    let err = handle.join().unwrap_err();

    match err {
        ImportError::ResolutionAborted { rows_processed, .. } => assert_eq!(rows_processed, 1),
        other => panic!("expected ResolutionAborted, got {:?}", other),
    }
    assert!(repo.get_positions(None).unwrap().is_empty());
    assert_eq!(repo.get_sessions(5).unwrap()[0].status, SessionStatus::Failed);
}

#[test]
fn test_dropped_prompt_aborts() {
    let dir = TempDir::new().unwrap();
    let repo = seeded_store();
    let service = service(&repo, dir.path());

    let handle = service
        .spawn_import(
            ImportRequest::new(statement(dir.path(), "UBS_20241231.csv"), "UBS"),
            Arc::new(NullReporter),
        )
        .unwrap();
    drop(handle.next_prompt());

    assert!(matches!(
        handle.join(),
        Err(ImportError::ResolutionAborted { .. })
    ));
    assert!(repo.find_instruments_by_isin("CH0012005267").unwrap().is_empty());
}

#[test]
fn test_sequential_imports_from_threads() {
    let dir = TempDir::new().unwrap();
    let repo = seeded_store();
    let service = service(&repo, dir.path());

    for (i, name) in ["UBS_20241031.csv", "UBS_20241130.csv"].iter().enumerate() {
        let path = dir.path().join(name);
        let lines = [
            HEADER.to_string(),
            format!("A-1,Nestle SA,CH0038863350,CHF,{},95.50,2024-12-31", 10 + i),
        ];
        std::fs::write(&path, lines.join("\n")).unwrap();
        let handle = service
            .spawn_import(ImportRequest::new(&path, "UBS"), Arc::new(NullReporter))
            .unwrap();
        assert!(handle.next_prompt().is_none());
        assert_eq!(handle.join().unwrap().parsed_rows, 1);
    }
    assert_eq!(repo.get_sessions(5).unwrap().len(), 2);
}
