/*!
Schema version migration for backup documents.

Every supported revision is one enum variant, and upgrades run strictly
version to version with no skipping, each step a pure transform over the
parsed document. A document already at a step's target shape passes
through unchanged, so replaying the chain on migrated data is a no-op.

Revision history:
- 150: transactions carried `date`; rows had no `isDeleted` flag.
- 300: `date` became `dateTime`; soft-delete flags everywhere.
- 420: `settings` became a list; categories gained `parentCategoryId`;
  explicit `orderNum` on accounts and categories.
- 450 (current): budget id lists became real arrays instead of
  comma-joined strings; tags and tag associations joined the document.
*/

use serde_json::{Map, Value};

use crate::error::{BackupError, Result};
use crate::model::EntityKind;
use crate::payload::json_type_name;

/// A supported backup document revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaVersion {
    V150,
    V300,
    V420,
    V450,
}

impl SchemaVersion {
    /// The revision this engine reads and writes natively.
    pub const CURRENT: SchemaVersion = SchemaVersion::V450;

    /// The oldest revision the migration chain still accepts.
    pub const OLDEST_SUPPORTED: SchemaVersion = SchemaVersion::V150;

    /// Numeric tag written into the document's `version` field.
    pub fn tag(&self) -> u16 {
        match self {
            SchemaVersion::V150 => 150,
            SchemaVersion::V300 => 300,
            SchemaVersion::V420 => 420,
            SchemaVersion::V450 => 450,
        }
    }

    /// Look up a revision by its numeric tag.
    pub fn from_tag(tag: u16) -> Option<SchemaVersion> {
        match tag {
            150 => Some(SchemaVersion::V150),
            300 => Some(SchemaVersion::V300),
            420 => Some(SchemaVersion::V420),
            450 => Some(SchemaVersion::V450),
            _ => None,
        }
    }

    /// The next revision in the chain, `None` at the current one.
    pub fn next(&self) -> Option<SchemaVersion> {
        match self {
            SchemaVersion::V150 => Some(SchemaVersion::V300),
            SchemaVersion::V300 => Some(SchemaVersion::V420),
            SchemaVersion::V420 => Some(SchemaVersion::V450),
            SchemaVersion::V450 => None,
        }
    }

    /// Parse the `version` field of a backup document.
    ///
    /// Both `450` and `"450"` are accepted; the tag has been written both
    /// ways over the app's history. A non-numeric tag is a format error, a
    /// numeric tag outside the supported set a version error.
    pub fn parse_tag(value: &Value) -> Result<SchemaVersion> {
        let tag: u64 = match value {
            Value::Number(n) => n.as_u64().ok_or_else(|| {
                BackupError::unsupported_format(format!("version tag is not an integer: {n}"))
            })?,
            Value::String(s) => s.trim().parse().map_err(|_| {
                BackupError::unsupported_format(format!("version tag is not numeric: {s:?}"))
            })?,
            other => {
                return Err(BackupError::unsupported_format(format!(
                    "version tag is {} instead of a number",
                    json_type_name(other)
                )))
            }
        };

        u16::try_from(tag)
            .ok()
            .and_then(SchemaVersion::from_tag)
            .ok_or_else(|| unsupported_version(tag))
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

fn unsupported_version(tag: impl std::fmt::Display) -> BackupError {
    BackupError::UnsupportedVersion {
        version: tag.to_string(),
        oldest: SchemaVersion::OLDEST_SUPPORTED.tag(),
        current: SchemaVersion::CURRENT.tag(),
    }
}

/// Upgrade a document from `from` to [`SchemaVersion::CURRENT`].
///
/// Applies every step in order; a document already at the current revision
/// comes back untouched.
pub fn migrate_to_current(mut document: Value, from: SchemaVersion) -> Result<Value> {
    let mut version = from;
    while let Some(next) = version.next() {
        apply_step(&mut document, version);
        tracing::debug!(from = %version, to = %next, "migrated backup document");
        version = next;
    }
    Ok(document)
}

fn apply_step(document: &mut Value, from: SchemaVersion) {
    match from {
        SchemaVersion::V150 => step_150_to_300(document),
        SchemaVersion::V300 => step_300_to_420(document),
        SchemaVersion::V420 => step_420_to_450(document),
        SchemaVersion::V450 => {}
    }
}

/// 150 -> 300: `date` becomes `dateTime` on transactions and planned
/// payment rules; every row gains an explicit `isDeleted` flag.
fn step_150_to_300(document: &mut Value) {
    for key in ["transactions", "plannedPaymentRules"] {
        for row in rows_mut(document, key) {
            if row.contains_key("dateTime") {
                row.remove("date");
            } else if let Some(date) = row.remove("date") {
                row.insert("dateTime".to_string(), date);
            }
        }
    }

    for kind in EntityKind::IMPORT_ORDER {
        for row in rows_mut(document, kind.payload_key()) {
            row.entry("isDeleted").or_insert(Value::Bool(false));
        }
    }
}

/// 300 -> 420: the settings object becomes a one-element list; categories
/// gain `parentCategoryId`; accounts and categories gain `orderNum`.
fn step_300_to_420(document: &mut Value) {
    if let Some(settings) = document.get_mut("settings") {
        if settings.is_object() {
            let row = settings.take();
            *settings = Value::Array(vec![row]);
        }
    }

    for row in rows_mut(document, "categories") {
        row.entry("parentCategoryId").or_insert(Value::Null);
        row.entry("orderNum").or_insert(Value::from(0.0));
    }
    for row in rows_mut(document, "accounts") {
        row.entry("orderNum").or_insert(Value::from(0.0));
    }
}

/// 420 -> 450: budget id lists turn from comma-joined strings into real
/// arrays; the tag collections appear (empty when the archive predates
/// them).
fn step_420_to_450(document: &mut Value) {
    for row in rows_mut(document, "budgets") {
        split_serialized_ids(row, "categoryIdsSerialized", "categoryIds");
        split_serialized_ids(row, "accountIdsSerialized", "accountIds");
    }

    if let Some(doc) = document.as_object_mut() {
        doc.entry("tags").or_insert(Value::Array(Vec::new()));
        doc.entry("tagAssociations").or_insert(Value::Array(Vec::new()));
    }
}

fn split_serialized_ids(row: &mut Map<String, Value>, old_key: &str, new_key: &str) {
    let serialized = row.remove(old_key);
    if row.contains_key(new_key) {
        return;
    }
    let ids = match serialized {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| Value::String(part.to_string()))
            .collect(),
        _ => Vec::new(),
    };
    row.insert(new_key.to_string(), Value::Array(ids));
}

/// Mutable view over the object rows of one collection, tolerating a
/// missing collection and skipping non-object rows.
fn rows_mut<'a>(
    document: &'a mut Value,
    key: &str,
) -> impl Iterator<Item = &'a mut Map<String, Value>> {
    document
        .get_mut(key)
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}
