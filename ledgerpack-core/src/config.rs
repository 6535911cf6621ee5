/*!
Export configuration: output packaging, document entry naming, and
document rendering options.
*/

use std::ffi::OsStr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::archive::{DOCUMENT_ENTRY_NAME, MANIFEST_ENTRY_NAME};
use crate::error::{BackupError, Result};

/// Supported export packagings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    /// Zip archive holding the document entry plus a manifest sidecar.
    Zip,
    /// Bare JSON document, no container and no manifest.
    JsonDocument,
}

/// Configuration for one export run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output packaging to produce.
    pub format: ExportFormat,
    /// Archive entry name for the document. Ignored for bare-document
    /// output.
    pub document_entry_name: String,
    /// Pretty-print the document. Larger output, easier to diff.
    pub pretty: bool,
}

impl ExportConfig {
    /// Default archive export: zip with a manifest, compact document
    /// under the canonical entry name.
    pub fn default_zip() -> Self {
        ExportConfig {
            format: ExportFormat::Zip,
            document_entry_name: DOCUMENT_ENTRY_NAME.to_string(),
            pretty: false,
        }
    }

    /// Bare-document export, compact.
    pub fn json_document() -> Self {
        ExportConfig {
            format: ExportFormat::JsonDocument,
            document_entry_name: DOCUMENT_ENTRY_NAME.to_string(),
            pretty: false,
        }
    }

    /// Infer the packaging from a destination file name.
    ///
    /// A `.json` extension selects the bare document; everything else gets
    /// the archive packaging.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(OsStr::to_str) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::json_document(),
            _ => Self::default_zip(),
        }
    }

    /// Override the archive entry name of the document.
    pub fn with_document_entry_name(mut self, name: impl Into<String>) -> Self {
        self.document_entry_name = name.into();
        self
    }

    /// Toggle pretty-printing of the document.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Validate the configuration.
    ///
    /// Archive output requires a document entry name that importers will
    /// find again: non-empty, `.json` suffixed, and distinct from the
    /// manifest entry name.
    pub fn validate(&self) -> Result<()> {
        match self.format {
            ExportFormat::Zip => {
                if self.document_entry_name.is_empty() {
                    return Err(BackupError::validation(
                        "archive export requires a document entry name",
                    ));
                }
                if self.document_entry_name == MANIFEST_ENTRY_NAME {
                    return Err(BackupError::validation(format!(
                        "document entry name collides with the manifest entry \"{MANIFEST_ENTRY_NAME}\""
                    )));
                }
                if !self.document_entry_name.ends_with(".json") {
                    return Err(BackupError::validation(format!(
                        "document entry name \"{}\" must end in .json",
                        self.document_entry_name
                    )));
                }
            }
            ExportFormat::JsonDocument => {}
        }
        Ok(())
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::default_zip()
    }
}
