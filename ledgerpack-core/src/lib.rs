/*!
# Ledgerpack Core Engine

Portable backup and restore engine for personal finance data.

This crate provides the core functionality for exporting a complete
financial dataset (accounts, categories, transactions, tags, budgets,
loans, planned payments, settings) into a single portable archive, and
restoring such archives later, with support for:

- Format detection across bare JSON documents and zip archives
- Schema migration from every historically supported revision
- Dependency-ordered batch restore with per-row failure accounting
- Cooperative cancellation and incremental progress reporting
- Checksummed archive manifests and atomic file export

## Architecture

The engines are isolated from infrastructure concerns:
- The data store is reached only through per-kind repository traits
- The archive container is an adapter behind the `ArchiveCodec` trait
- `MemoryDatastore` and `ZipArchiveCodec` ship as reference adapters

## Usage

```rust
use std::sync::Arc;
use ledgerpack_core::{
    DataObserver, ExportConfig, ExportEngine, ImportEngine, MemoryDatastore, ZipArchiveCodec,
};

let store = MemoryDatastore::new();
let observer = Arc::new(DataObserver::new());
let repos = store.repositories(&observer);

// Restore a backup produced by any supported schema revision.
let mut importer =
    ImportEngine::new(repos.clone(), ZipArchiveCodec::new(), Arc::clone(&observer));
let source = br#"{"version": 450, "accounts": [], "transactions": []}"#;
let result = importer.import_backup(source, |_progress| {}).unwrap();
assert!(result.is_fully_successful());

// Write the store back out as a portable archive.
let exporter = ExportEngine::new(repos, ZipArchiveCodec::new(), ExportConfig::default_zip());
let (bytes, summary) = exporter.export_to_bytes().unwrap();
assert_eq!(summary.bytes_written, bytes.len());
```
*/

pub mod archive;
pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod import;
pub mod manifest;
pub mod migration;
pub mod model;
pub mod observability;
pub mod observer;
pub mod ordering;
pub mod payload;
pub mod repository;
pub mod result;

pub use archive::{
    ArchiveCodec, ArchiveEntry, ZipArchiveCodec, DOCUMENT_ENTRY_NAME, MANIFEST_ENTRY_NAME,
};
pub use config::{ExportConfig, ExportFormat};
pub use error::{BackupError, Result};
pub use export::{ExportEngine, ExportSummary};
pub use format::{detect, DetectedBackup, SourceFormat};
pub use import::{CancelToken, ImportEngine};
pub use manifest::BackupManifest;
pub use migration::{migrate_to_current, SchemaVersion};
pub use model::{
    Account, Budget, Category, Entity, EntityKind, IntervalKind, Loan, LoanKind, LoanRecord,
    PlannedPaymentRule, Settings, Tag, TagAssociation, Theme, Transaction, TransactionKind,
};
pub use observability::{init_default_tracing, init_tracing};
pub use observer::{DataObserver, WriteEvent};
pub use payload::{BackupPayload, RawBatches};
pub use repository::{EntityRepository, MemoRepository, MemoryDatastore, Repositories};
pub use result::{BatchError, FailedRow, ImportCounts, ImportResult, ResultAccumulator};
