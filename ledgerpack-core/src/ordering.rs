/*!
Fixed dependency order for import writes.

Parents are written before the rows that reference them: accounts before
transactions, tags before tag associations, loans before loan records. The
order is a constant over all ten entity kinds, never derived from payload
contents, so import behavior does not depend on document layout.
*/

use crate::model::EntityKind;

impl EntityKind {
    /// Write order for import. Tiers: standalone parents, then records
    /// referencing parents, then transactional records, then associations.
    pub const IMPORT_ORDER: [EntityKind; 10] = [
        EntityKind::Account,
        EntityKind::Category,
        EntityKind::Tag,
        EntityKind::Settings,
        EntityKind::Budget,
        EntityKind::Loan,
        EntityKind::PlannedPaymentRule,
        EntityKind::Transaction,
        EntityKind::LoanRecord,
        EntityKind::TagAssociation,
    ];

    /// Position of this kind in [`EntityKind::IMPORT_ORDER`].
    pub fn import_rank(&self) -> usize {
        Self::IMPORT_ORDER
            .iter()
            .position(|kind| kind == self)
            .unwrap_or(usize::MAX)
    }
}
