/*!
Import engine: restores a backup source into the repositories.

The pipeline is detect, migrate, then write batches in the fixed
dependency order. Each row decodes and validates on its own, so one bad
row costs exactly that row; a collaborator rejecting a batch write costs
that kind only. Progress and cancellation are handled strictly between
batches, never inside one.
*/

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::archive::ArchiveCodec;
use crate::error::Result;
use crate::format;
use crate::migration;
use crate::model::{
    Account, Budget, Category, Entity, EntityKind, Loan, LoanRecord, PlannedPaymentRule, Settings,
    Tag, TagAssociation, Transaction,
};
use crate::observer::{DataObserver, WriteEvent};
use crate::payload::RawBatches;
use crate::repository::{EntityRepository, Repositories};
use crate::result::{ImportCounts, ImportResult, ResultAccumulator};

/// Rows handed to one collaborator `save_many` call. Batches larger than
/// this are written in several calls, mirroring the parameter limits of
/// embedded SQL stores.
const BATCH_CHUNK_ROWS: usize = 500;

/// Cooperative cancellation handle for a running import.
///
/// Cloned handles share one flag. Cancellation is honored between entity
/// batches only: the batch in flight finishes (or fails) first, committed
/// batches stay committed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation at the next between-batch point.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Ids already written (this run or previously present), used for
/// referential checks of strong references.
struct ImportContext {
    accounts: HashSet<Uuid>,
    tags: HashSet<Uuid>,
    loans: HashSet<Uuid>,
}

impl ImportContext {
    /// Seed with every id already in the store, soft-deleted included, so
    /// a partial archive restored on top of existing data validates
    /// against rows written in earlier runs.
    fn seed(repos: &Repositories) -> Result<Self> {
        Ok(Self {
            accounts: repos
                .accounts
                .find_all(true)?
                .iter()
                .map(|row| row.id)
                .collect(),
            tags: repos.tags.find_all(true)?.iter().map(|row| row.id).collect(),
            loans: repos
                .loans
                .find_all(true)?
                .iter()
                .map(|row| row.id)
                .collect(),
        })
    }
}

/// Main engine for restoring backups.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use ledgerpack_core::{DataObserver, ImportEngine, MemoryDatastore, ZipArchiveCodec};
///
/// let store = MemoryDatastore::new();
/// let observer = Arc::new(DataObserver::new());
/// let repos = store.repositories(&observer);
/// let mut engine = ImportEngine::new(repos, ZipArchiveCodec::new(), observer);
///
/// let source = br#"{"version": 450, "accounts": []}"#;
/// let result = engine.import_backup(source, |_progress| {}).unwrap();
/// assert!(result.is_fully_successful());
/// ```
pub struct ImportEngine<A: ArchiveCodec> {
    repos: Repositories,
    codec: A,
    observer: Arc<DataObserver>,
}

impl<A: ArchiveCodec> ImportEngine<A> {
    /// Create an import engine over the given repositories.
    ///
    /// # Arguments
    /// * `repos` - per-kind repository handles of the target store
    /// * `codec` - container codec for archive sources
    /// * `observer` - receives a bulk change event once the run finishes
    pub fn new(repos: Repositories, codec: A, observer: Arc<DataObserver>) -> Self {
        Self {
            repos,
            codec,
            observer,
        }
    }

    /// Import a backup from raw bytes.
    ///
    /// `on_progress` receives the cumulative counts before the first batch
    /// and after every completed one.
    pub fn import_backup<F>(&mut self, source: &[u8], on_progress: F) -> Result<ImportResult>
    where
        F: FnMut(&ImportCounts),
    {
        self.import_with_token(source, &CancelToken::new(), on_progress)
    }

    /// Import a backup read from a file.
    ///
    /// # Errors
    /// `BackupError::Io` when the file cannot be read; otherwise as
    /// [`ImportEngine::import_backup`].
    pub fn import_backup_file<F>(&mut self, path: &Path, on_progress: F) -> Result<ImportResult>
    where
        F: FnMut(&ImportCounts),
    {
        let source = std::fs::read(path)?;
        tracing::info!(path = %path.display(), bytes = source.len(), "read backup file");
        self.import_backup(&source, on_progress)
    }

    /// Import with an explicit cancellation token.
    ///
    /// This method:
    /// 1. Detects the source packaging and extracts the document
    /// 2. Migrates the document to the current schema revision
    /// 3. Writes one batch per entity kind in the fixed dependency order,
    ///    checking the token and emitting progress between batches
    /// 4. Posts a bulk change event and seals the result
    ///
    /// # Returns
    /// The aggregated result; row and batch failures are recorded in it
    /// rather than failing the run.
    ///
    /// # Errors
    /// Only fatal, before-any-write conditions: unsupported format or
    /// version, checksum mismatch, or an unreadable store.
    pub fn import_with_token<F>(
        &mut self,
        source: &[u8],
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<ImportResult>
    where
        F: FnMut(&ImportCounts),
    {
        let detected = format::detect(source, &self.codec)?;
        tracing::info!(
            format = %detected.format,
            version = %detected.version,
            bytes = source.len(),
            "importing backup"
        );

        let document = migration::migrate_to_current(detected.document, detected.version)?;
        let mut batches = RawBatches::from_document(document)?;

        let mut ctx = ImportContext::seed(&self.repos)?;
        let mut acc = ResultAccumulator::new();
        let mut cancelled = false;

        on_progress(acc.counts());
        for kind in EntityKind::IMPORT_ORDER {
            if cancel.is_cancelled() {
                cancelled = true;
                tracing::warn!(next = %kind, "import cancelled; skipping remaining batches");
                break;
            }
            let rows = batches.take(kind);
            self.apply_batch(kind, rows, &mut ctx, &mut acc);
            on_progress(acc.counts());
        }

        // Bulk writes bypass per-row cache bookkeeping downstream of the
        // repositories, so external caches get one coarse invalidation.
        self.observer.post(&WriteEvent::AllDataChanged);

        let result = acc.finish(cancelled);
        tracing::info!(
            imported = result.total_imported(),
            skipped = result.counts.total_skipped(),
            failed = result.counts.total_failed(),
            batch_errors = result.batch_errors.len(),
            cancelled = result.was_cancelled,
            "import finished"
        );
        Ok(result)
    }

    /// Dispatch one kind's rows through the generic flow, attaching the
    /// referential checks and context updates that kind needs. Weak
    /// references (category links, budget id lists, tag association
    /// targets) are imported as-is.
    fn apply_batch(
        &self,
        kind: EntityKind,
        rows: Vec<Value>,
        ctx: &mut ImportContext,
        acc: &mut ResultAccumulator,
    ) {
        match kind {
            EntityKind::Account => apply_rows(
                &self.repos.accounts,
                rows,
                ctx,
                acc,
                |_row: &Account, _ctx| Ok(()),
                |row, ctx| {
                    ctx.accounts.insert(row.id);
                },
            ),
            EntityKind::Category => apply_rows(
                &self.repos.categories,
                rows,
                ctx,
                acc,
                |_row: &Category, _ctx| Ok(()),
                |_row, _ctx| {},
            ),
            EntityKind::Tag => apply_rows(
                &self.repos.tags,
                rows,
                ctx,
                acc,
                |_row: &Tag, _ctx| Ok(()),
                |row, ctx| {
                    ctx.tags.insert(row.id);
                },
            ),
            EntityKind::Settings => self.apply_settings(rows, acc),
            EntityKind::Budget => apply_rows(
                &self.repos.budgets,
                rows,
                ctx,
                acc,
                |_row: &Budget, _ctx| Ok(()),
                |_row, _ctx| {},
            ),
            EntityKind::Loan => apply_rows(
                &self.repos.loans,
                rows,
                ctx,
                acc,
                |row: &Loan, ctx| match row.account_id {
                    Some(account_id) => require_account(ctx, account_id),
                    None => Ok(()),
                },
                |row, ctx| {
                    ctx.loans.insert(row.id);
                },
            ),
            EntityKind::PlannedPaymentRule => apply_rows(
                &self.repos.planned_payment_rules,
                rows,
                ctx,
                acc,
                |row: &PlannedPaymentRule, ctx| require_account(ctx, row.account_id),
                |_row, _ctx| {},
            ),
            EntityKind::Transaction => apply_rows(
                &self.repos.transactions,
                rows,
                ctx,
                acc,
                |row: &Transaction, ctx| {
                    require_account(ctx, row.account_id)?;
                    match row.to_account_id {
                        Some(to_account_id) => require_account(ctx, to_account_id),
                        None => Ok(()),
                    }
                },
                |_row, _ctx| {},
            ),
            EntityKind::LoanRecord => apply_rows(
                &self.repos.loan_records,
                rows,
                ctx,
                acc,
                |row: &LoanRecord, ctx| {
                    if ctx.loans.contains(&row.loan_id) {
                        Ok(())
                    } else {
                        Err(format!("unknown loanId {}", row.loan_id))
                    }
                },
                |_row, _ctx| {},
            ),
            EntityKind::TagAssociation => apply_rows(
                &self.repos.tag_associations,
                rows,
                ctx,
                acc,
                |row: &TagAssociation, ctx| {
                    if ctx.tags.contains(&row.tag_id) {
                        Ok(())
                    } else {
                        Err(format!("unknown tagId {}", row.tag_id))
                    }
                },
                |_row, _ctx| {},
            ),
        }
    }

    /// Settings rows collapse into the single canonical row: the first
    /// valid row wins (reusing the existing row's id when the store has
    /// one), the rest are skipped.
    fn apply_settings(&self, rows: Vec<Value>, acc: &mut ResultAccumulator) {
        let kind = EntityKind::Settings;
        let mut canonical: Option<Settings> = None;
        let mut surplus = 0usize;

        for row in rows {
            let raw_id = raw_row_id(&row);
            match decode_row::<Settings>(row) {
                Ok(settings) => {
                    if canonical.is_none() {
                        canonical = Some(settings);
                    } else {
                        surplus += 1;
                    }
                }
                Err(reason) => acc.record_failed_row(kind, raw_id, reason),
            }
        }

        if let Some(mut row) = canonical {
            let existing_id = match self.repos.settings.find_all(true) {
                Ok(existing) => existing.first().map(|settings| settings.id),
                Err(e) => {
                    acc.record_batch_error(kind, e.to_string());
                    acc.record_skipped(kind, surplus);
                    return;
                }
            };
            if let Some(id) = existing_id {
                row.id = id;
            }

            match self.repos.settings.save(row) {
                Ok(()) => acc.record_imported(kind, 1),
                Err(e) => {
                    tracing::warn!(%kind, error = %e, "settings write rejected");
                    acc.record_batch_error(kind, e.to_string());
                }
            }
        }
        acc.record_skipped(kind, surplus);
    }
}

fn require_account(ctx: &ImportContext, account_id: Uuid) -> std::result::Result<(), String> {
    if ctx.accounts.contains(&account_id) {
        Ok(())
    } else {
        Err(format!("unknown accountId {account_id}"))
    }
}

/// Decode a raw row, folding both serde and semantic failures into one
/// human-readable reason.
fn decode_row<T>(row: Value) -> std::result::Result<T, String>
where
    T: Entity + DeserializeOwned,
{
    let decoded: T = serde_json::from_value(row).map_err(|e| e.to_string())?;
    decoded.validate()?;
    Ok(decoded)
}

/// Generic per-kind batch flow: decode each row alone, validate against
/// the context, drop in-batch duplicates, then write in chunks. Rows from
/// committed chunks feed the context via `collect`.
fn apply_rows<T>(
    repo: &Arc<dyn EntityRepository<T>>,
    rows: Vec<Value>,
    ctx: &mut ImportContext,
    acc: &mut ResultAccumulator,
    validate: impl Fn(&T, &ImportContext) -> std::result::Result<(), String>,
    collect: impl Fn(&T, &mut ImportContext),
) where
    T: Entity + DeserializeOwned,
{
    let kind = T::kind();
    let total = rows.len();
    let mut accepted: Vec<T> = Vec::with_capacity(total);
    let mut seen_keys: HashSet<T::Key> = HashSet::with_capacity(total);

    for row in rows {
        let raw_id = raw_row_id(&row);
        let decoded: T = match decode_row(row) {
            Ok(decoded) => decoded,
            Err(reason) => {
                acc.record_failed_row(kind, raw_id, reason);
                continue;
            }
        };
        if let Err(reason) = validate(&decoded, ctx) {
            acc.record_failed_row(kind, raw_id, reason);
            continue;
        }
        if !seen_keys.insert(decoded.key()) {
            // First occurrence wins; the payload listed this key twice.
            acc.record_skipped(kind, 1);
            continue;
        }
        accepted.push(decoded);
    }

    let mut written = 0usize;
    for chunk in accepted.chunks(BATCH_CHUNK_ROWS) {
        match repo.save_many(chunk.to_vec()) {
            Ok(()) => {
                written += chunk.len();
                for row in chunk {
                    collect(row, ctx);
                }
            }
            Err(e) => {
                tracing::warn!(%kind, error = %e, "batch write rejected; abandoning kind");
                acc.record_batch_error(kind, e.to_string());
                break;
            }
        }
    }
    acc.record_imported(kind, written);

    tracing::debug!(
        %kind,
        rows = total,
        imported = written,
        failed = acc.counts().failed(kind),
        "applied batch"
    );
}

/// Best-effort id of a raw row for failure reporting: the `id` field, or
/// the pair key of a tag association.
fn raw_row_id(row: &Value) -> Option<String> {
    if let Some(id) = row.get("id").and_then(Value::as_str) {
        return Some(id.to_string());
    }
    let tag = row.get("tagId").and_then(Value::as_str)?;
    let target = row.get("associatedId").and_then(Value::as_str)?;
    Some(format!("{tag}:{target}"))
}
