/*!
In-memory reference datastore.

The store is an explicitly constructed client object: the composing
application creates it, hands out `Arc`/clone handles, and drops it to
tear it down. There is no process-global instance. Tables are id-keyed
maps, which makes every write an upsert and keeps read order
deterministic.
*/

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::model::{
    Account, Budget, Category, Entity, Loan, LoanRecord, PlannedPaymentRule, Settings, Tag,
    TagAssociation, Transaction,
};
use crate::observer::DataObserver;
use crate::repository::memo::MemoRepository;
use crate::repository::{EntityRepository, Repositories};

type Table<T> = Arc<Mutex<BTreeMap<<T as Entity>::Key, T>>>;

/// Reference store keeping every table in memory.
#[derive(Clone, Default)]
pub struct MemoryDatastore {
    accounts: Table<Account>,
    categories: Table<Category>,
    tags: Table<Tag>,
    settings: Table<Settings>,
    budgets: Table<Budget>,
    loans: Table<Loan>,
    planned_payment_rules: Table<PlannedPaymentRule>,
    transactions: Table<Transaction>,
    loan_records: Table<LoanRecord>,
    tag_associations: Table<TagAssociation>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full memoizing repository bundle over this store.
    ///
    /// Every repository shares the given observer: its writes post events
    /// through it and its memo listens for bulk invalidation.
    pub fn repositories(&self, observer: &Arc<DataObserver>) -> Repositories {
        Repositories {
            accounts: memoized(self.accounts_repository(), observer, Some(sort_accounts)),
            categories: memoized(
                self.categories_repository(),
                observer,
                Some(sort_categories),
            ),
            tags: memoized(self.tags_repository(), observer, Some(sort_tags)),
            settings: memoized(self.settings_repository(), observer, None),
            budgets: memoized(self.budgets_repository(), observer, Some(sort_budgets)),
            loans: memoized(self.loans_repository(), observer, Some(sort_loans)),
            planned_payment_rules: memoized(
                self.planned_payment_rules_repository(),
                observer,
                None,
            ),
            transactions: memoized(
                self.transactions_repository(),
                observer,
                Some(sort_transactions),
            ),
            loan_records: memoized(self.loan_records_repository(), observer, None),
            tag_associations: memoized(self.tag_associations_repository(), observer, None),
        }
    }

    pub fn accounts_repository(&self) -> Arc<dyn EntityRepository<Account>> {
        raw(&self.accounts)
    }

    pub fn categories_repository(&self) -> Arc<dyn EntityRepository<Category>> {
        raw(&self.categories)
    }

    pub fn tags_repository(&self) -> Arc<dyn EntityRepository<Tag>> {
        raw(&self.tags)
    }

    pub fn settings_repository(&self) -> Arc<dyn EntityRepository<Settings>> {
        raw(&self.settings)
    }

    pub fn budgets_repository(&self) -> Arc<dyn EntityRepository<Budget>> {
        raw(&self.budgets)
    }

    pub fn loans_repository(&self) -> Arc<dyn EntityRepository<Loan>> {
        raw(&self.loans)
    }

    pub fn planned_payment_rules_repository(
        &self,
    ) -> Arc<dyn EntityRepository<PlannedPaymentRule>> {
        raw(&self.planned_payment_rules)
    }

    pub fn transactions_repository(&self) -> Arc<dyn EntityRepository<Transaction>> {
        raw(&self.transactions)
    }

    pub fn loan_records_repository(&self) -> Arc<dyn EntityRepository<LoanRecord>> {
        raw(&self.loan_records)
    }

    pub fn tag_associations_repository(&self) -> Arc<dyn EntityRepository<TagAssociation>> {
        raw(&self.tag_associations)
    }
}

fn raw<T: Entity>(table: &Table<T>) -> Arc<dyn EntityRepository<T>> {
    Arc::new(MemoryRepository {
        table: Arc::clone(table),
    })
}

fn memoized<T: Entity>(
    inner: Arc<dyn EntityRepository<T>>,
    observer: &Arc<DataObserver>,
    sort: Option<fn(&mut Vec<T>)>,
) -> Arc<dyn EntityRepository<T>> {
    Arc::new(MemoRepository::new(inner, Arc::clone(observer), sort))
}

struct MemoryRepository<T: Entity> {
    table: Table<T>,
}

impl<T: Entity> MemoryRepository<T> {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<T::Key, T>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Entity> EntityRepository<T> for MemoryRepository<T> {
    fn find_all(&self, include_deleted: bool) -> Result<Vec<T>> {
        Ok(self
            .lock()
            .values()
            .filter(|row| include_deleted || !row.is_deleted())
            .cloned()
            .collect())
    }

    fn find_by_id(&self, key: &T::Key) -> Result<Option<T>> {
        Ok(self.lock().get(key).cloned())
    }

    fn save(&self, row: T) -> Result<()> {
        self.lock().insert(row.key(), row);
        Ok(())
    }

    fn save_many(&self, rows: Vec<T>) -> Result<()> {
        let mut table = self.lock();
        for row in rows {
            table.insert(row.key(), row);
        }
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

pub(crate) fn sort_accounts(rows: &mut Vec<Account>) {
    rows.sort_by(|a, b| cmp_f64(a.order_num, b.order_num));
}

pub(crate) fn sort_categories(rows: &mut Vec<Category>) {
    rows.sort_by(|a, b| cmp_f64(a.order_num, b.order_num));
}

pub(crate) fn sort_loans(rows: &mut Vec<Loan>) {
    rows.sort_by(|a, b| cmp_f64(a.order_num, b.order_num));
}

pub(crate) fn sort_budgets(rows: &mut Vec<Budget>) {
    rows.sort_by(|a, b| cmp_f64(a.order_id, b.order_id));
}

// Newest first, matching the app's tag picker.
pub(crate) fn sort_tags(rows: &mut Vec<Tag>) {
    rows.sort_by(|a, b| b.creation_timestamp.cmp(&a.creation_timestamp));
}

// Most recent first; dateless (planned) rows sink to the end.
pub(crate) fn sort_transactions(rows: &mut Vec<Transaction>) {
    rows.sort_by(|a, b| b.date_time.cmp(&a.date_time));
}
