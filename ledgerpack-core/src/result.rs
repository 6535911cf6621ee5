/*!
Import accounting: per-kind counters, failed-row records, and the final
import result.

The accumulator is append-only. Rows and batches can only ever add to it;
nothing removes or rewrites a recorded failure, so the final result is a
faithful history of the run.
*/

use std::collections::BTreeMap;

use crate::model::EntityKind;

/// One row that could not be imported, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRow {
    pub kind: EntityKind,
    /// The row's id as it appeared in the payload, when one was present.
    pub raw_id: Option<String>,
    /// Human-readable reason suitable for showing to the user.
    pub reason: String,
}

/// A whole-batch write failure for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    pub kind: EntityKind,
    pub message: String,
}

/// Cumulative per-kind counters; the snapshot handed to progress callbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportCounts {
    imported: BTreeMap<EntityKind, usize>,
    skipped: BTreeMap<EntityKind, usize>,
    failed: BTreeMap<EntityKind, usize>,
}

impl ImportCounts {
    pub fn imported(&self, kind: EntityKind) -> usize {
        self.imported.get(&kind).copied().unwrap_or(0)
    }

    pub fn skipped(&self, kind: EntityKind) -> usize {
        self.skipped.get(&kind).copied().unwrap_or(0)
    }

    pub fn failed(&self, kind: EntityKind) -> usize {
        self.failed.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_imported(&self) -> usize {
        self.imported.values().sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn total_failed(&self) -> usize {
        self.failed.values().sum()
    }
}

/// Append-only accounting for one import run.
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    counts: ImportCounts,
    failed_rows: Vec<FailedRow>,
    batch_errors: Vec<BatchError>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record successfully written rows for a kind.
    pub fn record_imported(&mut self, kind: EntityKind, rows: usize) {
        *self.counts.imported.entry(kind).or_insert(0) += rows;
    }

    /// Record rows skipped without being written (in-batch duplicates,
    /// surplus settings rows).
    pub fn record_skipped(&mut self, kind: EntityKind, rows: usize) {
        *self.counts.skipped.entry(kind).or_insert(0) += rows;
    }

    /// Record one row that failed to decode or validate.
    pub fn record_failed_row(
        &mut self,
        kind: EntityKind,
        raw_id: Option<String>,
        reason: impl Into<String>,
    ) {
        *self.counts.failed.entry(kind).or_insert(0) += 1;
        self.failed_rows.push(FailedRow {
            kind,
            raw_id,
            reason: reason.into(),
        });
    }

    /// Record a collaborator failure that took down a whole batch.
    pub fn record_batch_error(&mut self, kind: EntityKind, message: impl Into<String>) {
        self.batch_errors.push(BatchError {
            kind,
            message: message.into(),
        });
    }

    /// Current cumulative counters, for progress reporting.
    pub fn counts(&self) -> &ImportCounts {
        &self.counts
    }

    pub fn failed_rows(&self) -> &[FailedRow] {
        &self.failed_rows
    }

    /// Seal the run into its final result.
    pub fn finish(self, was_cancelled: bool) -> ImportResult {
        ImportResult {
            counts: self.counts,
            failed_rows: self.failed_rows,
            batch_errors: self.batch_errors,
            was_cancelled,
        }
    }
}

/// Outcome of one import run.
///
/// A structurally successful run can still carry failed rows and batch
/// errors; callers decide how much partiality they accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub counts: ImportCounts,
    /// Every row that failed, in processing order.
    pub failed_rows: Vec<FailedRow>,
    /// Every kind whose batch write was rejected by the store.
    pub batch_errors: Vec<BatchError>,
    /// Whether the run stopped early at a cancellation point.
    pub was_cancelled: bool,
}

impl ImportResult {
    pub fn imported_count(&self, kind: EntityKind) -> usize {
        self.counts.imported(kind)
    }

    pub fn skipped_count(&self, kind: EntityKind) -> usize {
        self.counts.skipped(kind)
    }

    pub fn total_imported(&self) -> usize {
        self.counts.total_imported()
    }

    /// True when every row of every batch was written: no failed rows, no
    /// batch errors, not cancelled.
    pub fn is_fully_successful(&self) -> bool {
        self.failed_rows.is_empty() && self.batch_errors.is_empty() && !self.was_cancelled
    }
}
