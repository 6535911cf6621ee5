/*!
Backup source detection.

Classifies raw input bytes as either a bare JSON backup document or an
archive container, pulls the document (and optional manifest) out of
archives, and extracts the declared schema version. Detection is read-only
and fails before anything touches the store.
*/

use serde_json::Value;

use crate::archive::{ArchiveCodec, ArchiveEntry, DOCUMENT_ENTRY_NAME, MANIFEST_ENTRY_NAME};
use crate::error::{BackupError, Result};
use crate::manifest::BackupManifest;
use crate::migration::SchemaVersion;

/// How the backup source was packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// A bare JSON document.
    Document,
    /// A multi-entry archive container holding the document.
    Archive,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Document => f.write_str("document"),
            SourceFormat::Archive => f.write_str("archive"),
        }
    }
}

/// Outcome of source detection: the parsed document plus everything known
/// about its packaging.
#[derive(Debug)]
pub struct DetectedBackup {
    pub format: SourceFormat,
    pub version: SchemaVersion,
    pub document: Value,
    /// Present only for archives that carried a manifest entry; its
    /// checksum has already been verified.
    pub manifest: Option<BackupManifest>,
}

/// Classify and unpack a backup source.
///
/// # Errors
/// `UnsupportedFormat` when the bytes are neither a recognized container
/// nor a JSON object document, or when an archive holds no document entry;
/// `UnsupportedVersion` for a version tag outside the supported range;
/// `ChecksumMismatch` when a present manifest disagrees with the document
/// entry bytes.
pub fn detect(source: &[u8], codec: &dyn ArchiveCodec) -> Result<DetectedBackup> {
    if codec.matches_signature(source) {
        detect_archive(source, codec)
    } else {
        detect_document(source)
    }
}

fn detect_document(source: &[u8]) -> Result<DetectedBackup> {
    let document: Value = serde_json::from_slice(source).map_err(|_| {
        BackupError::unsupported_format(
            "source is neither a recognized archive nor a JSON backup document",
        )
    })?;
    let version = extract_version(&document)?;
    tracing::debug!(%version, "detected bare backup document");

    Ok(DetectedBackup {
        format: SourceFormat::Document,
        version,
        document,
        manifest: None,
    })
}

fn detect_archive(source: &[u8], codec: &dyn ArchiveCodec) -> Result<DetectedBackup> {
    let entries = codec.read_entries(source)?;
    let document_entry = select_document_entry(&entries).ok_or_else(|| {
        BackupError::unsupported_format(format!(
            "{} archive holds no backup document entry",
            codec.format_name()
        ))
    })?;

    let manifest = entries
        .iter()
        .find(|entry| entry.name == MANIFEST_ENTRY_NAME)
        .map(|entry| serde_json::from_slice::<BackupManifest>(&entry.data))
        .transpose()
        .map_err(|e| BackupError::unsupported_format(format!("invalid manifest entry: {e}")))?;
    if let Some(manifest) = &manifest {
        manifest.verify(&document_entry.data)?;
    }

    let document: Value = serde_json::from_slice(&document_entry.data).map_err(|_| {
        BackupError::unsupported_format(format!(
            "archive entry {} is not a JSON backup document",
            document_entry.name
        ))
    })?;
    let version = extract_version(&document)?;

    if let Some(manifest) = &manifest {
        if manifest.format_version != version.tag() {
            tracing::warn!(
                manifest_version = manifest.format_version,
                document_version = %version,
                "manifest and document disagree on version; trusting the document"
            );
        }
    }
    tracing::debug!(entry = %document_entry.name, %version, "detected backup archive");

    Ok(DetectedBackup {
        format: SourceFormat::Archive,
        version,
        document,
        manifest,
    })
}

/// The canonical entry name wins; otherwise the first JSON entry that is
/// not the manifest (historical exports used ad-hoc document names).
/// Non-JSON entries (attachments) never qualify.
fn select_document_entry(entries: &[ArchiveEntry]) -> Option<&ArchiveEntry> {
    entries
        .iter()
        .find(|entry| entry.name == DOCUMENT_ENTRY_NAME)
        .or_else(|| {
            entries
                .iter()
                .find(|entry| entry.name != MANIFEST_ENTRY_NAME && entry.name.ends_with(".json"))
        })
}

fn extract_version(document: &Value) -> Result<SchemaVersion> {
    if !document.is_object() {
        return Err(BackupError::unsupported_format(
            "backup document is not a JSON object",
        ));
    }
    let tag = document.get("version").ok_or_else(|| {
        BackupError::unsupported_format("backup document has no version tag")
    })?;
    SchemaVersion::parse_tag(tag)
}
