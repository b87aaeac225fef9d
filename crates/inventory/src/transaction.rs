//! Append-only stock ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use warehub_core::{AggregateRoot, BusinessCode, DomainError, DomainResult, UserId};

use crate::{ItemId, WarehouseId};

warehub_core::entity_id!(
    /// Ledger row identifier.
    TransactionId,
    "TransactionId"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    #[serde(rename = "check-in")]
    CheckIn,
    #[serde(rename = "issue")]
    Issue,
    #[serde(rename = "transfer")]
    Transfer,
    #[serde(rename = "disposal")]
    Disposal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::CheckIn => "check-in",
            TransactionKind::Issue => "issue",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Disposal => "disposal",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "check-in" | "check_in" | "checkin" => Ok(TransactionKind::CheckIn),
            "issue" => Ok(TransactionKind::Issue),
            "transfer" => Ok(TransactionKind::Transfer),
            "disposal" => Ok(TransactionKind::Disposal),
            other => Err(DomainError::validation(format!("unknown transaction type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Recorded but not yet applied to balances (expected receipt).
    Pending,
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            other => Err(DomainError::validation(format!("unknown transaction status '{other}'"))),
        }
    }
}

/// A planned stock movement: the shape of one ledger row before it is recorded.
///
/// A movement removes `quantity` from `source` (if any) and adds it to
/// `destination` (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub kind: TransactionKind,
    pub item_id: ItemId,
    pub quantity: i64,
    pub source: Option<WarehouseId>,
    pub destination: Option<WarehouseId>,
    pub unit_cost: Option<Decimal>,
    pub reference: Option<String>,
}

fn require_positive(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

impl StockMovement {
    pub fn check_in(
        item_id: ItemId,
        warehouse: WarehouseId,
        quantity: i64,
        unit_cost: Option<Decimal>,
    ) -> DomainResult<Self> {
        require_positive(quantity)?;
        if let Some(cost) = unit_cost {
            if cost.is_sign_negative() {
                return Err(DomainError::validation("cost cannot be negative"));
            }
        }
        Ok(Self {
            kind: TransactionKind::CheckIn,
            item_id,
            quantity,
            source: None,
            destination: Some(warehouse),
            unit_cost,
            reference: None,
        })
    }

    pub fn issue(item_id: ItemId, warehouse: WarehouseId, quantity: i64) -> DomainResult<Self> {
        require_positive(quantity)?;
        Ok(Self {
            kind: TransactionKind::Issue,
            item_id,
            quantity,
            source: Some(warehouse),
            destination: None,
            unit_cost: None,
            reference: None,
        })
    }

    pub fn disposal(item_id: ItemId, warehouse: WarehouseId, quantity: i64) -> DomainResult<Self> {
        require_positive(quantity)?;
        Ok(Self {
            kind: TransactionKind::Disposal,
            ..Self::issue(item_id, warehouse, quantity)?
        })
    }

    /// Transfer leg leaving `from`. With `to = None` this is a check-out only:
    /// the matching arrival is recorded separately (or never, for goods lost
    /// or issued straight to a requester).
    pub fn transfer(
        item_id: ItemId,
        from: WarehouseId,
        to: Option<WarehouseId>,
        quantity: i64,
    ) -> DomainResult<Self> {
        require_positive(quantity)?;
        if to == Some(from) {
            return Err(DomainError::validation(
                "source and destination warehouse must differ",
            ));
        }
        Ok(Self {
            kind: TransactionKind::Transfer,
            item_id,
            quantity,
            source: Some(from),
            destination: to,
            unit_cost: None,
            reference: None,
        })
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Signed per-warehouse quantity changes.
    pub fn deltas(&self) -> impl Iterator<Item = (WarehouseId, i64)> + '_ {
        self.source
            .map(|w| (w, -self.quantity))
            .into_iter()
            .chain(self.destination.map(|w| (w, self.quantity)))
    }
}

/// Ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub code: BusinessCode,
    pub kind: TransactionKind,
    pub item_id: ItemId,
    pub quantity: i64,
    pub source_warehouse_id: Option<WarehouseId>,
    pub destination_warehouse_id: Option<WarehouseId>,
    pub unit_cost: Option<Decimal>,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Transaction {
    pub fn record(
        movement: StockMovement,
        status: TransactionStatus,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            code: BusinessCode::generate("TXN", now),
            kind: movement.kind,
            item_id: movement.item_id,
            quantity: movement.quantity,
            source_warehouse_id: movement.source,
            destination_warehouse_id: movement.destination,
            unit_cost: movement.unit_cost,
            status,
            reference: movement.reference,
            note: None,
            created_by,
            created_at: now,
            completed_at: (status == TransactionStatus::Completed).then_some(now),
            version: 1,
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn movement(&self) -> StockMovement {
        StockMovement {
            kind: self.kind,
            item_id: self.item_id,
            quantity: self.quantity,
            source: self.source_warehouse_id,
            destination: self.destination_warehouse_id,
            unit_cost: self.unit_cost,
            reference: self.reference.clone(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    /// When the row took effect on balances (`None` while pending).
    pub fn effective_at(&self) -> Option<DateTime<Utc>> {
        if self.is_completed() {
            Some(self.completed_at.unwrap_or(self.created_at))
        } else {
            None
        }
    }

    /// Confirm a pending row. The caller applies the movement to balances.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_completed() {
            return Err(DomainError::invariant("transaction is already completed"));
        }
        self.status = TransactionStatus::Completed;
        self.completed_at = Some(now);
        self.version += 1;
        Ok(())
    }

    pub fn touches(&self, warehouse: WarehouseId) -> bool {
        self.source_warehouse_id == Some(warehouse) || self.destination_warehouse_id == Some(warehouse)
    }
}

impl AggregateRoot for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn movement_shapes_match_kind() {
        let item = ItemId::new();
        let a = WarehouseId::new();
        let b = WarehouseId::new();

        let check_in = StockMovement::check_in(item, a, 5, Some(dec!(2.50))).unwrap();
        assert_eq!(check_in.deltas().collect::<Vec<_>>(), vec![(a, 5)]);

        let issue = StockMovement::issue(item, a, 3).unwrap();
        assert_eq!(issue.deltas().collect::<Vec<_>>(), vec![(a, -3)]);

        let transfer = StockMovement::transfer(item, a, Some(b), 2).unwrap();
        assert_eq!(transfer.deltas().collect::<Vec<_>>(), vec![(a, -2), (b, 2)]);

        let disposal = StockMovement::disposal(item, b, 1).unwrap();
        assert_eq!(disposal.kind, TransactionKind::Disposal);
        assert_eq!(disposal.deltas().collect::<Vec<_>>(), vec![(b, -1)]);
    }

    #[test]
    fn rejects_non_positive_quantity_and_negative_cost() {
        let item = ItemId::new();
        let w = WarehouseId::new();
        assert!(StockMovement::issue(item, w, 0).is_err());
        assert!(StockMovement::check_in(item, w, 1, Some(dec!(-1))).is_err());
        assert!(StockMovement::transfer(item, w, Some(w), 1).is_err());
    }

    #[test]
    fn pending_row_has_no_effect_until_confirmed() {
        let mv = StockMovement::check_in(ItemId::new(), WarehouseId::new(), 4, None).unwrap();
        let mut tx = Transaction::record(mv, TransactionStatus::Pending, UserId::new(), Utc::now());
        assert_eq!(tx.effective_at(), None);

        tx.confirm(Utc::now()).unwrap();
        assert!(tx.is_completed());
        assert!(tx.effective_at().is_some());
        assert_eq!(tx.version, 2);
        assert!(tx.confirm(Utc::now()).is_err());
    }

    #[test]
    fn kind_parses_wire_names() {
        assert_eq!(TransactionKind::parse("check-in").unwrap(), TransactionKind::CheckIn);
        assert_eq!(
            TransactionKind::parse(TransactionKind::Disposal.as_str()).unwrap(),
            TransactionKind::Disposal
        );
        assert!(TransactionKind::parse("teleport").is_err());
    }
}
