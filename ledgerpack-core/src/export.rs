/*!
Export engine: snapshots the repositories into a portable backup.

Exports always include soft-deleted rows, so restoring the output
reproduces tombstones instead of resurrecting data on synced devices.
File output goes through a temp file in the destination directory and a
rename, so a crash mid-export never leaves a truncated backup behind.
*/

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::archive::{ArchiveCodec, ArchiveEntry, MANIFEST_ENTRY_NAME};
use crate::config::{ExportConfig, ExportFormat};
use crate::error::{BackupError, Result};
use crate::manifest::{compute_checksum, BackupManifest};
use crate::migration::SchemaVersion;
use crate::model::EntityKind;
use crate::payload::BackupPayload;
use crate::repository::Repositories;

/// What one export run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Size of the final output, container included.
    pub bytes_written: usize,
    /// Rows written per collection.
    pub row_counts: BTreeMap<EntityKind, usize>,
    /// SHA-256 of the document bytes (the manifest checksum, when one is
    /// written).
    pub checksum: String,
}

impl ExportSummary {
    /// Total rows across every collection.
    pub fn total_rows(&self) -> usize {
        self.row_counts.values().sum()
    }
}

/// Main engine for producing backups.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use ledgerpack_core::{
///     DataObserver, ExportConfig, ExportEngine, MemoryDatastore, ZipArchiveCodec,
/// };
///
/// let store = MemoryDatastore::new();
/// let observer = Arc::new(DataObserver::new());
/// let repos = store.repositories(&observer);
///
/// let engine = ExportEngine::new(repos, ZipArchiveCodec::new(), ExportConfig::default_zip());
/// let (bytes, summary) = engine.export_to_bytes().unwrap();
/// assert_eq!(summary.bytes_written, bytes.len());
/// ```
pub struct ExportEngine<A: ArchiveCodec> {
    repos: Repositories,
    codec: A,
    config: ExportConfig,
}

impl<A: ArchiveCodec> ExportEngine<A> {
    /// Create an export engine over the given repositories.
    ///
    /// # Arguments
    /// * `repos` - per-kind repository handles of the source store
    /// * `codec` - container codec used for archive output
    /// * `config` - packaging and rendering options
    pub fn new(repos: Repositories, codec: A, config: ExportConfig) -> Self {
        Self {
            repos,
            codec,
            config,
        }
    }

    /// Snapshot every collection into a typed payload.
    ///
    /// # Errors
    /// `BackupError::Repository` when any collection cannot be read; a
    /// partial snapshot is never returned.
    pub fn export_snapshot(&self) -> Result<BackupPayload> {
        Ok(BackupPayload {
            accounts: self.repos.accounts.find_all(true)?,
            categories: self.repos.categories.find_all(true)?,
            tags: self.repos.tags.find_all(true)?,
            tag_associations: self.repos.tag_associations.find_all(true)?,
            budgets: self.repos.budgets.find_all(true)?,
            loans: self.repos.loans.find_all(true)?,
            loan_records: self.repos.loan_records.find_all(true)?,
            planned_payment_rules: self.repos.planned_payment_rules.find_all(true)?,
            transactions: self.repos.transactions.find_all(true)?,
            settings: self.repos.settings.find_all(true)?,
        })
    }

    /// Produce the backup as in-memory bytes.
    ///
    /// This method:
    /// 1. Validates the configuration
    /// 2. Snapshots the repositories, soft-deleted rows included
    /// 3. Serializes the current-version document
    /// 4. Packages it per the configured format, adding a checksummed
    ///    manifest entry for archive output
    ///
    /// # Returns
    /// The output bytes and a summary describing them.
    pub fn export_to_bytes(&self) -> Result<(Vec<u8>, ExportSummary)> {
        self.config.validate()?;

        let payload = self.export_snapshot()?;
        let row_counts = payload.counts();
        let document = payload.to_document()?;
        let document_bytes = if self.config.pretty {
            serde_json::to_vec_pretty(&document)?
        } else {
            serde_json::to_vec(&document)?
        };
        let checksum = compute_checksum(&document_bytes);

        let bytes = match self.config.format {
            ExportFormat::JsonDocument => document_bytes,
            ExportFormat::Zip => {
                let manifest_counts = row_counts
                    .iter()
                    .map(|(kind, rows)| (kind.payload_key().to_string(), *rows))
                    .collect();
                let manifest = BackupManifest::for_document(
                    SchemaVersion::CURRENT.tag(),
                    &document_bytes,
                    manifest_counts,
                );
                let manifest_bytes = serde_json::to_vec(&manifest)?;
                self.codec.write_entries(&[
                    ArchiveEntry::new(self.config.document_entry_name.as_str(), document_bytes),
                    ArchiveEntry::new(MANIFEST_ENTRY_NAME, manifest_bytes),
                ])?
            }
        };

        let summary = ExportSummary {
            bytes_written: bytes.len(),
            row_counts,
            checksum,
        };
        tracing::info!(
            rows = summary.total_rows(),
            bytes = summary.bytes_written,
            format = ?self.config.format,
            "exported backup"
        );
        Ok((bytes, summary))
    }

    /// Write the backup to a file.
    ///
    /// The output lands via a temp file in the destination directory and a
    /// rename, so `path` either holds the complete previous content or the
    /// complete new backup, never a partial write. Missing parent
    /// directories are created.
    ///
    /// # Errors
    /// `BackupError::Io` for any filesystem failure; read and packaging
    /// errors as [`ExportEngine::export_to_bytes`].
    pub fn export_to_file(&self, path: &Path) -> Result<ExportSummary> {
        let (bytes, summary) = self.export_to_bytes()?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(path).map_err(|e| BackupError::Io(e.error))?;

        tracing::info!(
            path = %path.display(),
            bytes = summary.bytes_written,
            "wrote backup file"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ZipArchiveCodec, DOCUMENT_ENTRY_NAME};
    use crate::model::Account;
    use crate::observer::DataObserver;
    use crate::repository::MemoryDatastore;
    use std::sync::Arc;
    use uuid::Uuid;

    fn seeded_repos() -> Repositories {
        let store = MemoryDatastore::new();
        let observer = Arc::new(DataObserver::new());
        let repos = store.repositories(&observer);
        repos
            .accounts
            .save(Account {
                id: Uuid::from_bytes([1; 16]),
                name: "Cash".to_string(),
                currency: "EUR".to_string(),
                order_num: 0.0,
                color: None,
                icon: None,
                is_deleted: false,
            })
            .unwrap();
        repos
            .accounts
            .save(Account {
                id: Uuid::from_bytes([2; 16]),
                name: "Closed".to_string(),
                currency: "EUR".to_string(),
                order_num: 1.0,
                color: None,
                icon: None,
                is_deleted: true,
            })
            .unwrap();
        repos
    }

    #[test]
    fn test_document_export_includes_tombstones() {
        let engine = ExportEngine::new(
            seeded_repos(),
            ZipArchiveCodec::new(),
            ExportConfig::json_document(),
        );

        let (bytes, summary) = engine.export_to_bytes().unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(doc["version"], SchemaVersion::CURRENT.tag());
        assert_eq!(doc["accounts"].as_array().unwrap().len(), 2);
        assert_eq!(summary.row_counts[&EntityKind::Account], 2);
        assert_eq!(summary.row_counts[&EntityKind::Transaction], 0);
        assert_eq!(summary.total_rows(), 2);
        // Bare-document output is exactly the document bytes.
        assert_eq!(summary.checksum, compute_checksum(&bytes));
    }

    #[test]
    fn test_zip_export_carries_verifiable_manifest() {
        let codec = ZipArchiveCodec::new();
        let engine = ExportEngine::new(seeded_repos(), codec.clone(), ExportConfig::default_zip());

        let (bytes, summary) = engine.export_to_bytes().unwrap();
        assert!(codec.matches_signature(&bytes));

        let entries = codec.read_entries(&bytes).unwrap();
        let document = entries
            .iter()
            .find(|e| e.name == DOCUMENT_ENTRY_NAME)
            .unwrap();
        let manifest_entry = entries
            .iter()
            .find(|e| e.name == MANIFEST_ENTRY_NAME)
            .unwrap();

        let manifest: BackupManifest = serde_json::from_slice(&manifest_entry.data).unwrap();
        manifest.verify(&document.data).unwrap();
        assert_eq!(manifest.checksum, summary.checksum);
        assert_eq!(manifest.format_version, SchemaVersion::CURRENT.tag());
        assert_eq!(manifest.row_counts["accounts"], 2);
    }

    #[test]
    fn test_custom_document_entry_name() {
        let codec = ZipArchiveCodec::new();
        let config = ExportConfig::default_zip().with_document_entry_name("finances.json");
        let engine = ExportEngine::new(seeded_repos(), codec.clone(), config);

        let (bytes, _) = engine.export_to_bytes().unwrap();
        let entries = codec.read_entries(&bytes).unwrap();
        assert!(entries.iter().any(|e| e.name == "finances.json"));
        assert!(entries.iter().all(|e| e.name != DOCUMENT_ENTRY_NAME));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_reads() {
        let config = ExportConfig::default_zip().with_document_entry_name("data.bin");
        let engine = ExportEngine::new(seeded_repos(), ZipArchiveCodec::new(), config);

        let err = engine.export_to_bytes().unwrap_err();
        assert!(matches!(err, BackupError::Validation(_)));
    }

    #[test]
    fn test_pretty_rendering_is_multiline() {
        let engine = ExportEngine::new(
            seeded_repos(),
            ZipArchiveCodec::new(),
            ExportConfig::json_document().with_pretty(true),
        );

        let (bytes, _) = engine.export_to_bytes().unwrap();
        assert!(bytes.contains(&b'\n'));
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["accounts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_file_export_creates_parents_and_matches_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/backups/export.zip");

        let engine = ExportEngine::new(
            seeded_repos(),
            ZipArchiveCodec::new(),
            ExportConfig::default_zip(),
        );
        let summary = engine.export_to_file(&path).unwrap();

        let on_disk = fs::read(&path).unwrap();
        assert_eq!(on_disk.len(), summary.bytes_written);
        assert!(ZipArchiveCodec::new().matches_signature(&on_disk));
    }

    #[test]
    fn test_file_export_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        fs::write(&path, b"old content").unwrap();

        let engine = ExportEngine::new(
            seeded_repos(),
            ZipArchiveCodec::new(),
            ExportConfig::json_document(),
        );
        engine.export_to_file(&path).unwrap();

        let doc: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc["accounts"].as_array().unwrap().len(), 2);
    }
}
