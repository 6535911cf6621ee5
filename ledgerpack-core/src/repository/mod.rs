/*!
Repository contracts over the collaborator data store.

The engine never talks to a concrete store; it sees one repository per
entity kind, each offering the same five operations. Adapters own the
actual persistence. This module defines the port, the bundle handed to
the engines, plus the shipped adapters: an in-memory store and a memoizing
wrapper kept coherent through write events.
*/

pub mod memo;
pub mod memory;

use std::sync::Arc;

use crate::error::Result;
use crate::model::{
    Account, Budget, Category, Entity, Loan, LoanRecord, PlannedPaymentRule, Settings, Tag,
    TagAssociation, Transaction,
};

/// Store operations for one entity kind.
///
/// Writes are upserts keyed by [`Entity::Key`]: saving an existing key
/// overwrites that row. A `save_many` call either writes its whole row
/// slice or fails it as a unit; callers chunk large batches.
pub trait EntityRepository<T: Entity>: Send + Sync {
    /// Read rows of this kind.
    ///
    /// # Arguments
    /// * `include_deleted` - when false, soft-deleted rows are filtered out
    ///
    /// # Returns
    /// The rows in a deterministic store order.
    fn find_all(&self, include_deleted: bool) -> Result<Vec<T>>;

    /// Look up one row by key, soft-deleted rows included.
    fn find_by_id(&self, key: &T::Key) -> Result<Option<T>>;

    /// Upsert one row.
    fn save(&self, row: T) -> Result<()>;

    /// Upsert a batch of rows as a unit.
    fn save_many(&self, rows: Vec<T>) -> Result<()>;

    /// Remove every row of this kind. Never called implicitly by import.
    fn delete_all(&self) -> Result<()>;
}

/// The per-kind repositories an engine works against.
///
/// Fields are plain trait-object handles so a composing application (or a
/// test) can swap any single repository for its own adapter.
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn EntityRepository<Account>>,
    pub categories: Arc<dyn EntityRepository<Category>>,
    pub tags: Arc<dyn EntityRepository<Tag>>,
    pub settings: Arc<dyn EntityRepository<Settings>>,
    pub budgets: Arc<dyn EntityRepository<Budget>>,
    pub loans: Arc<dyn EntityRepository<Loan>>,
    pub planned_payment_rules: Arc<dyn EntityRepository<PlannedPaymentRule>>,
    pub transactions: Arc<dyn EntityRepository<Transaction>>,
    pub loan_records: Arc<dyn EntityRepository<LoanRecord>>,
    pub tag_associations: Arc<dyn EntityRepository<TagAssociation>>,
}

// Re-export types for convenience
pub use memo::MemoRepository;
pub use memory::MemoryDatastore;
