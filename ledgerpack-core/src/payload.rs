/*!
Backup document containers.

[`BackupPayload`] is the fully-typed snapshot used on the export side.
[`RawBatches`] is the import-side view: per-kind arrays of raw JSON rows,
kept untyped so each row can be decoded individually and a malformed row
fails alone instead of poisoning its whole batch.
*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BackupError, Result};
use crate::migration::SchemaVersion;
use crate::model::{
    Account, Budget, Category, EntityKind, Loan, LoanRecord, PlannedPaymentRule, Settings, Tag,
    TagAssociation, Transaction,
};

/// A complete, typed snapshot of every entity collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayload {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub tag_associations: Vec<TagAssociation>,
    #[serde(default)]
    pub budgets: Vec<Budget>,
    #[serde(default)]
    pub loans: Vec<Loan>,
    #[serde(default)]
    pub loan_records: Vec<LoanRecord>,
    #[serde(default)]
    pub planned_payment_rules: Vec<PlannedPaymentRule>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub settings: Vec<Settings>,
}

impl BackupPayload {
    /// Serialize into the canonical current-version backup document.
    pub fn to_document(&self) -> Result<Value> {
        let mut doc = serde_json::to_value(self)?;
        match doc.as_object_mut() {
            Some(map) => {
                map.insert(
                    "version".to_string(),
                    Value::from(SchemaVersion::CURRENT.tag()),
                );
            }
            None => {
                return Err(BackupError::validation(
                    "payload did not serialize to an object",
                ))
            }
        }
        Ok(doc)
    }

    /// Row count per entity kind.
    pub fn counts(&self) -> BTreeMap<EntityKind, usize> {
        let mut counts = BTreeMap::new();
        counts.insert(EntityKind::Account, self.accounts.len());
        counts.insert(EntityKind::Category, self.categories.len());
        counts.insert(EntityKind::Tag, self.tags.len());
        counts.insert(EntityKind::TagAssociation, self.tag_associations.len());
        counts.insert(EntityKind::Budget, self.budgets.len());
        counts.insert(EntityKind::Loan, self.loans.len());
        counts.insert(EntityKind::LoanRecord, self.loan_records.len());
        counts.insert(
            EntityKind::PlannedPaymentRule,
            self.planned_payment_rules.len(),
        );
        counts.insert(EntityKind::Transaction, self.transactions.len());
        counts.insert(EntityKind::Settings, self.settings.len());
        counts
    }

    pub fn total_rows(&self) -> usize {
        self.counts().values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }
}

/// Per-kind raw rows pulled out of a canonical (already migrated) document.
#[derive(Debug, Default)]
pub struct RawBatches {
    batches: BTreeMap<EntityKind, Vec<Value>>,
}

impl RawBatches {
    /// Split a canonical document into per-kind row batches.
    ///
    /// Missing collection keys mean empty batches; a collection key bound to
    /// anything but an array is a structural error.
    pub fn from_document(document: Value) -> Result<RawBatches> {
        let mut doc = match document {
            Value::Object(map) => map,
            _ => {
                return Err(BackupError::unsupported_format(
                    "backup document is not a JSON object",
                ))
            }
        };

        let mut batches = BTreeMap::new();
        for kind in EntityKind::IMPORT_ORDER {
            let rows = match doc.remove(kind.payload_key()) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(rows)) => rows,
                Some(other) => {
                    return Err(BackupError::unsupported_format(format!(
                        "\"{}\" is {} instead of an array",
                        kind.payload_key(),
                        json_type_name(&other)
                    )))
                }
            };
            batches.insert(kind, rows);
        }
        Ok(RawBatches { batches })
    }

    /// Remove and return the rows for one kind.
    pub fn take(&mut self, kind: EntityKind) -> Vec<Value> {
        self.batches.remove(&kind).unwrap_or_default()
    }

    pub fn row_count(&self, kind: EntityKind) -> usize {
        self.batches.get(&kind).map_or(0, Vec::len)
    }

    pub fn total_rows(&self) -> usize {
        self.batches.values().map(Vec::len).sum()
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_carries_version_and_collections() {
        let payload = BackupPayload::default();
        let doc = payload.to_document().unwrap();

        assert_eq!(doc["version"], SchemaVersion::CURRENT.tag());
        assert!(doc["accounts"].is_array());
        assert!(doc["tagAssociations"].is_array());
        assert!(doc["plannedPaymentRules"].is_array());
        assert!(doc["settings"].is_array());
    }

    #[test]
    fn test_missing_collections_are_empty_batches() {
        let mut batches = RawBatches::from_document(json!({
            "version": 450,
            "accounts": [{"id": "x"}]
        }))
        .unwrap();

        assert_eq!(batches.row_count(EntityKind::Account), 1);
        assert_eq!(batches.row_count(EntityKind::Transaction), 0);
        assert!(batches.take(EntityKind::Budget).is_empty());
    }

    #[test]
    fn test_non_array_collection_is_rejected() {
        let err = RawBatches::from_document(json!({
            "accounts": "not rows"
        }))
        .unwrap_err();

        match err {
            BackupError::UnsupportedFormat(msg) => {
                assert!(msg.contains("accounts"), "{msg}");
                assert!(msg.contains("a string"), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_object_document_is_rejected() {
        let err = RawBatches::from_document(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, BackupError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_take_drains_the_batch() {
        let mut batches = RawBatches::from_document(json!({
            "tags": [{"id": "a"}, {"id": "b"}]
        }))
        .unwrap();

        assert_eq!(batches.take(EntityKind::Tag).len(), 2);
        assert_eq!(batches.take(EntityKind::Tag).len(), 0);
    }
}
