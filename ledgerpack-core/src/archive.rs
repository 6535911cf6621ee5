/*!
Archive container adapters for backup data.

A backup travels either as a bare JSON document or inside a multi-entry
container holding the document under a known entry name. This module
defines the container abstraction and the zip implementation the app's
archives use. Codecs work entirely over in-memory buffers; file I/O stays
with the engines.
*/

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{BackupError, Result};

/// Entry name of the backup document inside an archive.
pub const DOCUMENT_ENTRY_NAME: &str = "backup.json";

/// Entry name of the optional manifest sidecar.
pub const MANIFEST_ENTRY_NAME: &str = "backup-meta.json";

/// One named blob inside an archive container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new<S: Into<String>>(name: S, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Container abstraction for multi-entry backup archives.
///
/// The engine only ever needs to sniff a container signature, read a full
/// entry set, and write one; implementations stay free to pick their
/// on-disk format.
pub trait ArchiveCodec: Send + Sync {
    /// Whether the leading bytes look like this container format.
    fn matches_signature(&self, data: &[u8]) -> bool;

    /// Read every file entry of the container.
    ///
    /// # Returns
    /// The entries in container order, directories excluded.
    fn read_entries(&self, data: &[u8]) -> Result<Vec<ArchiveEntry>>;

    /// Build a container holding the given entries.
    fn write_entries(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>>;

    /// Name of the container format (for diagnostics).
    fn format_name(&self) -> &str;
}

/// Zip container codec, matching the archives the app has always produced.
///
/// # Example
/// ```rust
/// use ledgerpack_core::{ArchiveCodec, ArchiveEntry, ZipArchiveCodec};
///
/// let codec = ZipArchiveCodec::new();
/// let entries = vec![ArchiveEntry::new("backup.json", b"{}".to_vec())];
/// let bytes = codec.write_entries(&entries).unwrap();
/// assert!(codec.matches_signature(&bytes));
/// assert_eq!(codec.read_entries(&bytes).unwrap(), entries);
/// ```
#[derive(Debug, Clone)]
pub struct ZipArchiveCodec {
    method: CompressionMethod,
}

impl ZipArchiveCodec {
    /// Create a codec writing Deflate-compressed entries.
    pub fn new() -> Self {
        Self {
            method: CompressionMethod::Deflated,
        }
    }

    /// Create a codec writing uncompressed entries.
    pub fn stored() -> Self {
        Self {
            method: CompressionMethod::Stored,
        }
    }
}

impl Default for ZipArchiveCodec {
    fn default() -> Self {
        Self::new()
    }
}

// Local file header magic; empty archives (end-of-central-directory only)
// intentionally do not match, they hold no document anyway.
const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

impl ArchiveCodec for ZipArchiveCodec {
    fn matches_signature(&self, data: &[u8]) -> bool {
        data.len() >= ZIP_SIGNATURE.len() && data[..ZIP_SIGNATURE.len()] == ZIP_SIGNATURE
    }

    fn read_entries(&self, data: &[u8]) -> Result<Vec<ArchiveEntry>> {
        let mut archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| BackupError::archive(format!("invalid zip archive: {e}")))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| BackupError::archive(format!("failed to read zip entry {index}: {e}")))?;

            if entry.is_dir() {
                continue;
            }
            // Skip entries whose names escape the archive root.
            if entry.enclosed_name().is_none() {
                tracing::warn!(name = entry.name(), "skipping zip entry with unsafe path");
                continue;
            }

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| BackupError::archive(format!("failed to decompress zip entry: {e}")))?;
            entries.push(ArchiveEntry::new(entry.name().to_string(), data));
        }
        Ok(entries)
    }

    fn write_entries(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(self.method);

        for entry in entries {
            writer
                .start_file(entry.name.as_str(), options)
                .map_err(|e| {
                    BackupError::archive(format!("failed to start zip entry {}: {e}", entry.name))
                })?;
            writer.write_all(&entry.data).map_err(|e| {
                BackupError::archive(format!("failed to write zip entry {}: {e}", entry.name))
            })?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| BackupError::archive(format!("failed to finish zip archive: {e}")))?;
        Ok(cursor.into_inner())
    }

    fn format_name(&self) -> &str {
        "zip"
    }
}
