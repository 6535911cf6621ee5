/*!
End-to-end tests over the whole backup pipeline: fixture archives in,
repository state out, and the reverse direction through export.

Fixtures live in `tests/fixtures/`. `450-150.json` is a current-revision
document; `150.json` carries the same books in the oldest supported shape.
*/

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use ledgerpack_core::{
    ArchiveCodec, ArchiveEntry, BackupError, BackupManifest, CancelToken, DataObserver, Entity,
    EntityKind, EntityRepository, ExportConfig, ExportEngine, ImportEngine, ImportResult,
    MemoryDatastore, Repositories, Result as BackupResult, Theme, ZipArchiveCodec,
    DOCUMENT_ENTRY_NAME, MANIFEST_ENTRY_NAME,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;

/// Row counts of the `450-150.json` fixture, by kind.
const FIXTURE_COUNTS: [(EntityKind, usize); 10] = [
    (EntityKind::Account, 2),
    (EntityKind::Category, 3),
    (EntityKind::Tag, 2),
    (EntityKind::Settings, 1),
    (EntityKind::Budget, 1),
    (EntityKind::Loan, 1),
    (EntityKind::PlannedPaymentRule, 1),
    (EntityKind::Transaction, 4),
    (EntityKind::LoanRecord, 1),
    (EntityKind::TagAssociation, 2),
];

const FIXTURE_TOTAL_ROWS: usize = 18;

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("fixture {name}: {e}"))
}

fn id(text: &str) -> Uuid {
    text.parse().unwrap()
}

/// A full engine wiring over a fresh in-memory store.
struct Harness {
    repos: Repositories,
    observer: Arc<DataObserver>,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryDatastore::new();
        let observer = Arc::new(DataObserver::new());
        let repos = store.repositories(&observer);
        Self { repos, observer }
    }

    fn importer(&self) -> ImportEngine<ZipArchiveCodec> {
        ImportEngine::new(
            self.repos.clone(),
            ZipArchiveCodec::new(),
            Arc::clone(&self.observer),
        )
    }

    fn exporter(&self, config: ExportConfig) -> ExportEngine<ZipArchiveCodec> {
        ExportEngine::new(self.repos.clone(), ZipArchiveCodec::new(), config)
    }

    fn import(&self, source: &[u8]) -> ImportResult {
        self.importer().import_backup(source, |_| {}).unwrap()
    }
}

/// Repository stub whose every operation fails, for fault injection.
struct FailingRepository<T: Entity> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> FailingRepository<T> {
    fn shared() -> Arc<dyn EntityRepository<T>> {
        Arc::new(Self {
            _marker: PhantomData,
        })
    }

    fn fail<R>() -> BackupResult<R> {
        Err(BackupError::repository("injected store failure"))
    }
}

impl<T: Entity> EntityRepository<T> for FailingRepository<T> {
    fn find_all(&self, _include_deleted: bool) -> BackupResult<Vec<T>> {
        Self::fail()
    }

    fn find_by_id(&self, _key: &T::Key) -> BackupResult<Option<T>> {
        Self::fail()
    }

    fn save(&self, _row: T) -> BackupResult<()> {
        Self::fail()
    }

    fn save_many(&self, _rows: Vec<T>) -> BackupResult<()> {
        Self::fail()
    }

    fn delete_all(&self) -> BackupResult<()> {
        Self::fail()
    }
}

#[test]
fn test_document_import_fills_every_table() {
    let harness = Harness::new();

    let result = harness.import(&fixture("450-150.json"));

    assert!(result.is_fully_successful());
    assert!(!result.was_cancelled);
    for (kind, rows) in FIXTURE_COUNTS {
        assert_eq!(result.imported_count(kind), rows, "imported {kind}");
    }
    assert_eq!(result.total_imported(), FIXTURE_TOTAL_ROWS);

    // The tombstoned transaction reached the store but stays out of live
    // reads.
    assert_eq!(harness.repos.transactions.find_all(false).unwrap().len(), 3);
    assert_eq!(harness.repos.transactions.find_all(true).unwrap().len(), 4);
}

#[test]
fn test_archive_import_verifies_manifest_and_skips_attachments() {
    let document = fixture("450-150.json");
    let manifest = BackupManifest::for_document(
        450,
        &document,
        BTreeMap::from([("accounts".to_string(), 2), ("transactions".to_string(), 4)]),
    );
    let codec = ZipArchiveCodec::new();
    let archive = codec
        .write_entries(&[
            ArchiveEntry::new(DOCUMENT_ENTRY_NAME, document),
            ArchiveEntry::new(MANIFEST_ENTRY_NAME, serde_json::to_vec(&manifest).unwrap()),
            ArchiveEntry::new("attachments/receipt-001.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0]),
        ])
        .unwrap();

    let harness = Harness::new();
    let result = harness.import(&archive);

    assert!(result.is_fully_successful());
    assert_eq!(result.total_imported(), FIXTURE_TOTAL_ROWS);
}

#[test]
fn test_archive_with_renamed_document_entry_still_imports() {
    let codec = ZipArchiveCodec::new();
    let archive = codec
        .write_entries(&[ArchiveEntry::new(
            "finances-2023-03.json",
            fixture("450-150.json"),
        )])
        .unwrap();

    let harness = Harness::new();
    let result = harness.import(&archive);

    assert!(result.is_fully_successful());
    assert_eq!(result.imported_count(EntityKind::Account), 2);
}

#[test]
fn test_tampered_archive_is_rejected_before_any_write() {
    let document = fixture("450-150.json");
    // Manifest hashed over different bytes than the document entry.
    let manifest = BackupManifest::for_document(450, b"other bytes entirely", BTreeMap::new());
    let codec = ZipArchiveCodec::new();
    let archive = codec
        .write_entries(&[
            ArchiveEntry::new(DOCUMENT_ENTRY_NAME, document),
            ArchiveEntry::new(MANIFEST_ENTRY_NAME, serde_json::to_vec(&manifest).unwrap()),
        ])
        .unwrap();

    let harness = Harness::new();
    let err = harness
        .importer()
        .import_backup(&archive, |_| {})
        .unwrap_err();

    assert!(matches!(err, BackupError::ChecksumMismatch { .. }));
    assert!(harness.repos.accounts.find_all(true).unwrap().is_empty());
}

#[test]
fn test_oldest_supported_revision_upgrades_in_full() {
    let harness = Harness::new();

    let result = harness.import(&fixture("150.json"));

    assert!(result.is_fully_successful());
    assert_eq!(result.imported_count(EntityKind::Account), 2);
    assert_eq!(result.imported_count(EntityKind::Category), 3);
    assert_eq!(result.imported_count(EntityKind::Transaction), 4);
    assert_eq!(result.imported_count(EntityKind::Budget), 1);
    assert_eq!(result.imported_count(EntityKind::Loan), 1);
    assert_eq!(result.imported_count(EntityKind::LoanRecord), 1);
    assert_eq!(result.imported_count(EntityKind::PlannedPaymentRule), 1);
    assert_eq!(result.imported_count(EntityKind::Settings), 1);
    // The tag collections postdate revision 150.
    assert_eq!(result.imported_count(EntityKind::Tag), 0);
    assert_eq!(result.imported_count(EntityKind::TagAssociation), 0);

    // `date` rows came through as proper timestamps.
    let groceries = harness
        .repos
        .transactions
        .find_by_id(&id("11000000-0000-0000-0000-000000000001"))
        .unwrap()
        .unwrap();
    assert_eq!(
        groceries.date_time,
        Some("2023-03-10T14:30:00Z".parse().unwrap())
    );

    // Comma-joined budget id lists became real arrays.
    let budget = harness
        .repos
        .budgets
        .find_by_id(&id("bb000000-0000-0000-0000-000000000001"))
        .unwrap()
        .unwrap();
    assert_eq!(
        budget.category_ids,
        vec![
            id("cc000000-0000-0000-0000-000000000001"),
            id("cc000000-0000-0000-0000-000000000003"),
        ]
    );
    assert!(budget.account_ids.is_empty());

    // The bare settings object became the canonical row.
    let settings = harness.repos.settings.find_all(true).unwrap();
    assert_eq!(settings.len(), 1);
    assert_eq!(settings[0].id, id("5e000000-0000-0000-0000-000000000002"));
}

#[test]
fn test_export_import_round_trip_preserves_everything() {
    let source = Harness::new();
    source.import(&fixture("450-150.json"));

    let (archive, summary) = source
        .exporter(ExportConfig::default_zip())
        .export_to_bytes()
        .unwrap();
    assert_eq!(summary.total_rows(), FIXTURE_TOTAL_ROWS);

    let target = Harness::new();
    let result = target.import(&archive);

    assert!(result.is_fully_successful());
    for (kind, rows) in FIXTURE_COUNTS {
        assert_eq!(result.imported_count(kind), rows, "round-tripped {kind}");
    }

    // Tombstones travel: the deleted transaction is intact on the far side.
    let cancelled_order = target
        .repos
        .transactions
        .find_by_id(&id("11000000-0000-0000-0000-000000000004"))
        .unwrap()
        .unwrap();
    assert!(cancelled_order.is_deleted);
    assert_eq!(cancelled_order.amount, 18.2);
}

#[test]
fn test_reimport_is_idempotent() {
    let harness = Harness::new();
    let first = harness.import(&fixture("450-150.json"));
    let second = harness.import(&fixture("450-150.json"));

    assert!(second.is_fully_successful());
    assert_eq!(second.counts, first.counts);
    assert_eq!(harness.repos.accounts.find_all(true).unwrap().len(), 2);
    assert_eq!(harness.repos.transactions.find_all(true).unwrap().len(), 4);
    assert_eq!(harness.repos.settings.find_all(true).unwrap().len(), 1);
}

#[test]
fn test_collection_order_in_document_is_irrelevant() {
    // Transactions listed ahead of the account they reference; processing
    // order is fixed by kind, not by document layout.
    let document = br#"{
        "version": 450,
        "transactions": [{
            "id": "11000000-0000-0000-0000-000000000099",
            "accountId": "aa000000-0000-0000-0000-000000000009",
            "type": "EXPENSE",
            "amount": 12.0,
            "isDeleted": false
        }],
        "accounts": [{
            "id": "aa000000-0000-0000-0000-000000000009",
            "name": "Wallet",
            "currency": "EUR",
            "orderNum": 0.0,
            "isDeleted": false
        }]
    }"#;

    let harness = Harness::new();
    let result = harness.import(document);

    assert!(result.is_fully_successful());
    assert_eq!(result.imported_count(EntityKind::Account), 1);
    assert_eq!(result.imported_count(EntityKind::Transaction), 1);
}

#[test]
fn test_unknown_account_reference_fails_only_that_row() {
    let mut document: Value = serde_json::from_slice(&fixture("450-150.json")).unwrap();
    document["transactions"][0]["accountId"] = json!("99999999-9999-9999-9999-999999999999");
    let bytes = serde_json::to_vec(&document).unwrap();

    let harness = Harness::new();
    let result = harness.import(&bytes);

    assert!(!result.is_fully_successful());
    assert_eq!(result.imported_count(EntityKind::Transaction), 3);
    assert_eq!(result.counts.failed(EntityKind::Transaction), 1);
    assert_eq!(result.failed_rows.len(), 1);
    assert_eq!(result.failed_rows[0].kind, EntityKind::Transaction);
    assert_eq!(
        result.failed_rows[0].raw_id.as_deref(),
        Some("11000000-0000-0000-0000-000000000001")
    );
    assert!(result.failed_rows[0].reason.contains("unknown accountId"));
    // Every other kind is unaffected.
    assert_eq!(result.imported_count(EntityKind::Account), 2);
    assert_eq!(result.imported_count(EntityKind::TagAssociation), 2);
}

#[test]
fn test_failing_transaction_store_abandons_only_that_kind() {
    let mut harness = Harness::new();
    harness.repos.transactions = FailingRepository::shared();

    let result = harness.import(&fixture("450-150.json"));

    assert!(!result.is_fully_successful());
    assert_eq!(result.imported_count(EntityKind::Transaction), 0);
    assert_eq!(result.batch_errors.len(), 1);
    assert_eq!(result.batch_errors[0].kind, EntityKind::Transaction);
    assert!(result.batch_errors[0].message.contains("injected store failure"));
    // Kinds ordered after transactions still ran.
    assert_eq!(result.imported_count(EntityKind::Account), 2);
    assert_eq!(result.imported_count(EntityKind::LoanRecord), 1);
    assert_eq!(result.imported_count(EntityKind::TagAssociation), 2);
}

#[test]
fn test_cancellation_stops_between_batches() {
    let harness = Harness::new();
    let token = CancelToken::new();
    let hook = token.clone();

    let result = harness
        .importer()
        .import_with_token(&fixture("450-150.json"), &token, |counts| {
            if counts.imported(EntityKind::Account) > 0 {
                hook.cancel();
            }
        })
        .unwrap();

    assert!(result.was_cancelled);
    assert!(!result.is_fully_successful());
    // The accounts batch committed before the token was honored.
    assert_eq!(result.imported_count(EntityKind::Account), 2);
    assert_eq!(result.imported_count(EntityKind::Category), 0);
    assert_eq!(harness.repos.accounts.find_all(true).unwrap().len(), 2);
    assert!(harness.repos.categories.find_all(true).unwrap().is_empty());
}

#[test]
fn test_failed_export_leaves_existing_file_untouched() {
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("backup.zip");
    std::fs::write(&destination, b"previous good backup").unwrap();

    let mut harness = Harness::new();
    harness.repos.accounts = FailingRepository::shared();

    let err = harness
        .exporter(ExportConfig::default_zip())
        .export_to_file(&destination)
        .unwrap_err();

    assert!(matches!(err, BackupError::Repository(_)));
    assert_eq!(std::fs::read(&destination).unwrap(), b"previous good backup");
}

#[test]
fn test_settings_singleton_survives_cross_archive_imports() {
    let harness = Harness::new();
    harness.import(&fixture("450-150.json"));

    // A second archive bringing a different settings row id: the stored
    // canonical row keeps its id and takes the new values.
    let result = harness.import(&fixture("150.json"));

    assert!(result.is_fully_successful());
    let settings = harness.repos.settings.find_all(true).unwrap();
    assert_eq!(settings.len(), 1);
    assert_eq!(settings[0].id, id("5e000000-0000-0000-0000-000000000001"));
    assert_eq!(settings[0].theme, Theme::Light);
    assert_eq!(harness.repos.accounts.find_all(true).unwrap().len(), 2);
}
