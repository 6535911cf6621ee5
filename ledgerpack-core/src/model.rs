/*!
Domain model: the entity types carried by a backup archive.

Wire names follow the canonical backup document (camelCase, `type` for the
kind discriminators). Unknown fields in historical archives are ignored on
read; optional fields absent from old revisions fall back to defaults so a
row decoded from any supported revision is a complete value.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The ten entity types a backup archive carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Account,
    Category,
    Tag,
    Settings,
    Budget,
    Loan,
    PlannedPaymentRule,
    Transaction,
    LoanRecord,
    TagAssociation,
}

impl EntityKind {
    /// Key of this kind's row array in the backup document.
    pub fn payload_key(&self) -> &'static str {
        match self {
            EntityKind::Account => "accounts",
            EntityKind::Category => "categories",
            EntityKind::Tag => "tags",
            EntityKind::Settings => "settings",
            EntityKind::Budget => "budgets",
            EntityKind::Loan => "loans",
            EntityKind::PlannedPaymentRule => "plannedPaymentRules",
            EntityKind::Transaction => "transactions",
            EntityKind::LoanRecord => "loanRecords",
            EntityKind::TagAssociation => "tagAssociations",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.payload_key())
    }
}

/// Behavior shared by every entity type: a stable upsert key, the kind it
/// belongs to, its soft-delete state, and local (single-row) validation.
pub trait Entity: Clone + Send + 'static {
    /// Stable identity used as the upsert key. Writing a row whose key is
    /// already present overwrites that row; it never duplicates.
    type Key: Ord + Eq + std::hash::Hash + Clone + std::fmt::Debug + Send;

    fn key(&self) -> Self::Key;

    fn kind() -> EntityKind;

    /// Soft-deleted rows stay in the store and in exports but are excluded
    /// from live reads.
    fn is_deleted(&self) -> bool;

    /// Single-row semantic checks, independent of any other row.
    /// Returns a human-readable reason on failure.
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

/// Direction of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanKind {
    Lend,
    Borrow,
}

/// Repeat interval unit for planned payment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntervalKind {
    Day,
    Week,
    Month,
    Year,
}

/// UI theme stored in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Theme {
    Light,
    Dark,
    Auto,
}

/// A money account (bank account, cash, card).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    /// ISO 4217 currency code of the account.
    pub currency: String,
    #[serde(default)]
    pub order_num: f64,
    pub color: Option<i64>,
    pub icon: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Entity for Account {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Account
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be blank".to_string());
        }
        if self.currency.trim().is_empty() {
            return Err("currency must not be blank".to_string());
        }
        Ok(())
    }
}

/// A transaction category, optionally nested under a parent category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub order_num: f64,
    pub color: Option<i64>,
    pub icon: Option<String>,
    pub parent_category_id: Option<Uuid>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Entity for Category {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Category
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be blank".to_string());
        }
        Ok(())
    }
}

/// A single financial transaction.
///
/// `amount` is always non-negative; direction comes from `kind`. Transfers
/// additionally carry the receiving account and, for cross-currency
/// transfers, the received amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    /// Absent means the owning account's currency.
    pub currency: Option<String>,
    pub to_account_id: Option<Uuid>,
    pub to_amount: Option<f64>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Absent means the transaction is planned, not yet happened.
    #[serde(default, with = "flexible_time_opt")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(default, with = "flexible_time_opt")]
    pub due_date: Option<DateTime<Utc>>,
    pub category_id: Option<Uuid>,
    pub recurring_rule_id: Option<Uuid>,
    pub loan_id: Option<Uuid>,
    pub loan_record_id: Option<Uuid>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Entity for Transaction {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Transaction
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.amount < 0.0 {
            return Err("amount must not be negative".to_string());
        }
        if self.kind == TransactionKind::Transfer && self.to_account_id.is_none() {
            return Err("transfer requires toAccountId".to_string());
        }
        if matches!(self.to_amount, Some(a) if a < 0.0) {
            return Err("toAmount must not be negative".to_string());
        }
        Ok(())
    }
}

/// A user-defined tag attachable to other records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<i64>,
    #[serde(with = "flexible_time")]
    pub creation_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Entity for Tag {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Tag
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be blank".to_string());
        }
        Ok(())
    }
}

/// Links a tag to some record.
///
/// `associated_id` is opaque: it may point at a transaction today and some
/// other record type tomorrow, so it is preserved verbatim and never
/// resolved or validated. Identity is the (tag, target) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagAssociation {
    pub tag_id: Uuid,
    pub associated_id: Uuid,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Entity for TagAssociation {
    type Key = (Uuid, Uuid);

    fn key(&self) -> (Uuid, Uuid) {
        (self.tag_id, self.associated_id)
    }

    fn kind() -> EntityKind {
        EntityKind::TagAssociation
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
}

/// A spending budget over a set of categories and accounts.
///
/// The id lists are weak references: entries pointing at missing rows are
/// preserved as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: Uuid,
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    #[serde(default)]
    pub account_ids: Vec<Uuid>,
    #[serde(default)]
    pub order_id: f64,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Entity for Budget {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Budget
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be blank".to_string());
        }
        if self.amount < 0.0 {
            return Err("amount must not be negative".to_string());
        }
        Ok(())
    }
}

/// Money lent to or borrowed from someone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: Uuid,
    pub name: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: LoanKind,
    pub color: Option<i64>,
    pub icon: Option<String>,
    #[serde(default)]
    pub order_num: f64,
    pub account_id: Option<Uuid>,
    #[serde(default, with = "flexible_time_opt")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Entity for Loan {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Loan
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be blank".to_string());
        }
        if self.amount < 0.0 {
            return Err("amount must not be negative".to_string());
        }
        Ok(())
    }
}

/// A repayment or interest record against a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRecord {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: f64,
    pub note: Option<String>,
    #[serde(with = "flexible_time")]
    pub date_time: DateTime<Utc>,
    #[serde(default)]
    pub interest: bool,
    pub account_id: Option<Uuid>,
    pub converted_amount: Option<f64>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Entity for LoanRecord {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::LoanRecord
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.amount < 0.0 {
            return Err("amount must not be negative".to_string());
        }
        Ok(())
    }
}

/// A scheduled one-time or recurring payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedPaymentRule {
    pub id: Uuid,
    #[serde(default, with = "flexible_time_opt")]
    pub start_date: Option<DateTime<Utc>>,
    pub interval_n: Option<i32>,
    pub interval_type: Option<IntervalKind>,
    #[serde(default)]
    pub one_time: bool,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub account_id: Uuid,
    pub amount: f64,
    pub category_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Entity for PlannedPaymentRule {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::PlannedPaymentRule
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.amount < 0.0 {
            return Err("amount must not be negative".to_string());
        }
        if !self.one_time {
            let n = self.interval_n.unwrap_or(0);
            if n <= 0 || self.interval_type.is_none() {
                return Err("recurring rule requires intervalN and intervalType".to_string());
            }
        }
        Ok(())
    }
}

/// App-wide user settings. At most one canonical row exists in a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub id: Uuid,
    pub theme: Theme,
    /// Base currency for reports and the buffer.
    pub currency: String,
    #[serde(default)]
    pub buffer_amount: f64,
    /// Display name of the user.
    #[serde(default)]
    pub name: String,
}

impl Entity for Settings {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Settings
    }

    // Settings carries no soft-delete flag; the singleton row is only ever
    // overwritten.
    fn is_deleted(&self) -> bool {
        false
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.currency.trim().is_empty() {
            return Err("currency must not be blank".to_string());
        }
        Ok(())
    }
}

/// Serde helpers for timestamps.
///
/// Canonical output is RFC 3339 UTC with millisecond precision. Input also
/// accepts the zone-less `YYYY-MM-DDTHH:MM:SS[.fff]` form older archives
/// used, interpreted as UTC.
mod flexible_time {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub(super) fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| format!("invalid timestamp: {raw}"))
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// [`flexible_time`] over optional timestamps; missing and null both map
/// to `None`.
mod flexible_time_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => ser.serialize_str(&super::flexible_time::format(dt)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(de)?;
        raw.map(|s| super::flexible_time::parse(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
