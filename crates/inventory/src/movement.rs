//! Movement history queries over the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehub_core::{DomainError, DomainResult};

use crate::{ItemId, Transaction, TransactionKind, TransactionStatus, WarehouseId};

/// Filter for ledger listings. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub item_id: Option<ItemId>,
    /// Matches rows with this warehouse on either side.
    pub warehouse_id: Option<WarehouseId>,
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub reference: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn validate(&self) -> DomainResult<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(DomainError::validation("'from' must not be after 'to'"));
            }
        }
        Ok(())
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.item_id.is_none_or(|i| tx.item_id == i)
            && self.warehouse_id.is_none_or(|w| tx.touches(w))
            && self.kind.is_none_or(|k| tx.kind == k)
            && self.status.is_none_or(|s| tx.status == s)
            && self
                .reference
                .as_deref()
                .is_none_or(|r| tx.reference.as_deref() == Some(r))
            && self.from.is_none_or(|from| tx.created_at >= from)
            && self.to.is_none_or(|to| tx.created_at <= to)
    }

    /// Matching rows, newest first.
    pub fn apply<'a>(&self, ledger: impl IntoIterator<Item = &'a Transaction>) -> Vec<Transaction> {
        let mut rows: Vec<Transaction> = ledger.into_iter().filter(|t| self.matches(t)).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        rows
    }
}
