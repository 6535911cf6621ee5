/*!
Memoizing repository wrapper.

Live reads are served from an explicit per-repository cache once it is
warm. The cache stays coherent because every write goes through this
wrapper: writes update the memo synchronously before posting their event,
and a bulk `AllDataChanged` event from another writer invalidates it. The
cache holds live rows only; reads that include soft-deleted rows always go
to the store.
*/

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::model::Entity;
use crate::observer::{DataObserver, WriteEvent};
use crate::repository::EntityRepository;

struct Memo<T: Entity> {
    live: BTreeMap<T::Key, T>,
    /// Whether `live` holds the complete live row set.
    complete: bool,
}

impl<T: Entity> Memo<T> {
    fn invalidate(&mut self) {
        self.live.clear();
        self.complete = false;
    }

    fn apply(&mut self, row: &T) {
        if row.is_deleted() {
            self.live.remove(&row.key());
        } else {
            self.live.insert(row.key(), row.clone());
        }
    }
}

impl<T: Entity> Default for Memo<T> {
    fn default() -> Self {
        Self {
            live: BTreeMap::new(),
            complete: false,
        }
    }
}

/// Caching wrapper around an [`EntityRepository`].
pub struct MemoRepository<T: Entity> {
    inner: Arc<dyn EntityRepository<T>>,
    observer: Arc<DataObserver>,
    memo: Arc<Mutex<Memo<T>>>,
    sort: Option<fn(&mut Vec<T>)>,
}

impl<T: Entity> MemoRepository<T> {
    /// Wrap a repository, registering for bulk invalidation events.
    ///
    /// # Arguments
    /// * `sort` - optional ordering applied to live reads (the store's own
    ///   order is keyed by id, which is rarely the display order)
    pub fn new(
        inner: Arc<dyn EntityRepository<T>>,
        observer: Arc<DataObserver>,
        sort: Option<fn(&mut Vec<T>)>,
    ) -> Self {
        let memo = Arc::new(Mutex::new(Memo::default()));
        let listener_memo = Arc::clone(&memo);
        observer.subscribe(move |event| {
            if matches!(event, WriteEvent::AllDataChanged) {
                listener_memo
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .invalidate();
            }
        });

        Self {
            inner,
            observer,
            memo,
            sort,
        }
    }

    fn lock_memo(&self) -> MutexGuard<'_, Memo<T>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sorted(&self, mut rows: Vec<T>) -> Vec<T> {
        if let Some(sort) = self.sort {
            sort(&mut rows);
        }
        rows
    }
}

impl<T: Entity> EntityRepository<T> for MemoRepository<T> {
    fn find_all(&self, include_deleted: bool) -> Result<Vec<T>> {
        if include_deleted {
            // Lossless reads bypass the memo; it holds live rows only.
            return self.inner.find_all(true);
        }

        {
            let memo = self.lock_memo();
            if memo.complete {
                return Ok(self.sorted(memo.live.values().cloned().collect()));
            }
        }

        let rows = self.inner.find_all(false)?;
        let mut memo = self.lock_memo();
        memo.live = rows.iter().map(|row| (row.key(), row.clone())).collect();
        memo.complete = true;
        drop(memo);

        Ok(self.sorted(rows))
    }

    fn find_by_id(&self, key: &T::Key) -> Result<Option<T>> {
        if let Some(row) = self.lock_memo().live.get(key) {
            return Ok(Some(row.clone()));
        }
        // A miss is not authoritative: the row may exist soft-deleted.
        let row = self.inner.find_by_id(key)?;
        if let Some(row) = &row {
            if !row.is_deleted() {
                self.lock_memo().apply(row);
            }
        }
        Ok(row)
    }

    fn save(&self, row: T) -> Result<()> {
        self.inner.save(row.clone())?;
        self.lock_memo().apply(&row);
        self.observer.post(&WriteEvent::Saved {
            kind: T::kind(),
            rows: 1,
        });
        Ok(())
    }

    fn save_many(&self, rows: Vec<T>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let count = rows.len();
        self.inner.save_many(rows.clone())?;
        {
            let mut memo = self.lock_memo();
            for row in &rows {
                memo.apply(row);
            }
        }
        self.observer.post(&WriteEvent::Saved {
            kind: T::kind(),
            rows: count,
        });
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.inner.delete_all()?;
        {
            let mut memo = self.lock_memo();
            // The store is now empty, which the memo can represent exactly.
            memo.live.clear();
            memo.complete = true;
        }
        self.observer.post(&WriteEvent::DeletedAll { kind: T::kind() });
        Ok(())
    }
}
