/*!
Backup manifest: the integrity sidecar written next to the document entry
in archive exports.

The manifest is optional on import (archives from older app revisions have
none), but when present its checksum must match the raw document entry
bytes before anything is written.
*/

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BackupError, Result};

/// Integrity and provenance data for one backup archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    /// Schema version tag of the document entry.
    pub format_version: u16,

    /// When the archive was written.
    pub created_at: DateTime<Utc>,

    /// SHA-256 of the raw document entry bytes, hex encoded.
    pub checksum: String,

    /// Row count per collection key, as written.
    #[serde(default)]
    pub row_counts: BTreeMap<String, usize>,
}

impl BackupManifest {
    /// Build a manifest for the given document bytes.
    pub fn for_document(
        format_version: u16,
        document: &[u8],
        row_counts: BTreeMap<String, usize>,
    ) -> Self {
        Self {
            format_version,
            created_at: Utc::now(),
            checksum: compute_checksum(document),
            row_counts,
        }
    }

    /// Verify the stored checksum against document bytes.
    ///
    /// # Returns
    /// `Ok(())` when the hash matches, `BackupError::ChecksumMismatch`
    /// otherwise.
    pub fn verify(&self, document: &[u8]) -> Result<()> {
        let actual = compute_checksum(document);
        if actual == self.checksum {
            Ok(())
        } else {
            Err(BackupError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual,
            })
        }
    }
}

/// SHA-256 of `data` as a lowercase hex string.
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
