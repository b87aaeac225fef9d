use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehub_core::{AggregateRoot, BusinessCode, DomainError, DomainResult, UserId};
use warehub_inventory::{ItemId, StockMovement, WarehouseId};

use crate::{RejectedGoods, RejectedGoodsId, RejectedGoodsStatus, TransferActor, TransferStatus};

warehub_core::entity_id!(
    /// Transfer identifier.
    TransferId,
    "TransferId"
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub item_id: ItemId,
    pub requested_quantity: i64,
    pub approved_quantity: Option<i64>,
    pub actual_quantity: Option<i64>,
}

impl TransferLine {
    /// Quantity that physically moves: shipped, else approved, else requested.
    pub fn effective_quantity(&self) -> i64 {
        self.actual_quantity
            .or(self.approved_quantity)
            .unwrap_or(self.requested_quantity)
    }
}

/// One entry of a transfer's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: Option<TransferStatus>,
    pub to: TransferStatus,
    pub by: UserId,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub code: BusinessCode,
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub status: TransferStatus,
    pub lines: Vec<TransferLine>,
    pub requested_by: UserId,
    pub notes: Option<String>,
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransferLine {
    pub item_id: ItemId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub lines: Vec<NewTransferLine>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineQuantity {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Request to move a transfer into `to`.
///
/// `quantities` overrides per-line amounts when approving (approved quantity)
/// or shipping (actual quantity); lines not mentioned keep their current
/// effective quantity. `reason` is recorded on rejected goods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub to: TransferStatus,
    #[serde(default)]
    pub quantities: Vec<LineQuantity>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl TransitionRequest {
    pub fn to(status: TransferStatus) -> Self {
        Self {
            to: status,
            quantities: Vec::new(),
            reason: None,
            note: None,
        }
    }
}

/// Source stock that must be available for a transition to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockCheck {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoodsAction {
    None,
    Create(Vec<RejectedGoods>),
    MarkReturned,
    MarkDisposed,
}

/// Side effects of one transition, committed atomically with the transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub from: TransferStatus,
    pub to: TransferStatus,
    pub movements: Vec<StockMovement>,
    pub stock_checks: Vec<StockCheck>,
    pub goods: GoodsAction,
}

impl TransferPlan {
    pub fn is_stock_neutral(&self) -> bool {
        self.movements.is_empty()
    }
}

impl Transfer {
    pub fn create(input: NewTransfer, requested_by: UserId, now: DateTime<Utc>) -> DomainResult<Self> {
        if input.source_warehouse_id == input.destination_warehouse_id {
            return Err(DomainError::validation(
                "source and destination warehouse must differ",
            ));
        }
        if input.lines.is_empty() {
            return Err(DomainError::validation("transfer requires at least one item"));
        }
        let mut seen = HashSet::new();
        for line in &input.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation("quantity must be positive"));
            }
            if !seen.insert(line.item_id) {
                return Err(DomainError::validation(format!(
                    "item {} listed more than once",
                    line.item_id
                )));
            }
        }

        Ok(Self {
            id: TransferId::new(),
            code: BusinessCode::generate("TRF", now),
            source_warehouse_id: input.source_warehouse_id,
            destination_warehouse_id: input.destination_warehouse_id,
            status: TransferStatus::Pending,
            lines: input
                .lines
                .into_iter()
                .map(|l| TransferLine {
                    item_id: l.item_id,
                    requested_quantity: l.quantity,
                    approved_quantity: None,
                    actual_quantity: None,
                })
                .collect(),
            requested_by,
            notes: input.notes,
            history: vec![StatusChange {
                from: None,
                to: TransferStatus::Pending,
                by: requested_by,
                at: now,
                note: None,
            }],
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    pub fn actor(
        &self,
        user_id: UserId,
        is_admin: bool,
        source_manager: Option<UserId>,
        destination_manager: Option<UserId>,
    ) -> TransferActor {
        TransferActor {
            user_id,
            is_admin,
            manages_source: source_manager == Some(user_id),
            manages_destination: destination_manager == Some(user_id),
        }
    }

    fn override_for(&self, quantities: &[LineQuantity], line: &TransferLine) -> Option<i64> {
        quantities
            .iter()
            .find(|q| q.item_id == line.item_id)
            .map(|q| q.quantity)
    }

    fn check_overrides(&self, quantities: &[LineQuantity]) -> DomainResult<()> {
        for q in quantities {
            if !self.lines.iter().any(|l| l.item_id == q.item_id) {
                return Err(DomainError::validation(format!(
                    "item {} is not part of this transfer",
                    q.item_id
                )));
            }
        }
        Ok(())
    }

    /// Move to `request.to`, returning the effects the caller must commit.
    ///
    /// On error the transfer is left unchanged.
    pub fn transition(
        &mut self,
        actor: &TransferActor,
        request: TransitionRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<TransferPlan> {
        let from = self.status;
        let to = request.to;
        if !from.can_transition_to(to) {
            return Err(DomainError::invariant(format!(
                "cannot move transfer from {from} to {to}"
            )));
        }
        if !actor.may_enter(to) {
            return Err(DomainError::forbidden(format!(
                "not allowed to move transfer to {to}"
            )));
        }
        self.check_overrides(&request.quantities)?;

        let mut lines = self.lines.clone();
        let reference = self.code.as_str().to_string();
        let src = self.source_warehouse_id;
        let dst = self.destination_warehouse_id;
        let mut movements = Vec::new();
        let mut stock_checks = Vec::new();
        let mut goods = GoodsAction::None;

        match to {
            TransferStatus::Approved => {
                for line in &mut lines {
                    let qty = self
                        .override_for(&request.quantities, line)
                        .unwrap_or(line.requested_quantity);
                    if qty <= 0 || qty > line.requested_quantity {
                        return Err(DomainError::validation(format!(
                            "approved quantity for item {} must be between 1 and {}",
                            line.item_id, line.requested_quantity
                        )));
                    }
                    line.approved_quantity = Some(qty);
                }
            }
            TransferStatus::InTransit => {
                for line in &mut lines {
                    let approved = line.approved_quantity.unwrap_or(line.requested_quantity);
                    let qty = self.override_for(&request.quantities, line).unwrap_or(approved);
                    if qty <= 0 || qty > approved {
                        return Err(DomainError::validation(format!(
                            "shipped quantity for item {} must be between 1 and {}",
                            line.item_id, approved
                        )));
                    }
                    line.actual_quantity = Some(qty);
                    stock_checks.push(StockCheck {
                        item_id: line.item_id,
                        warehouse_id: src,
                        quantity: qty,
                    });
                }
            }
            TransferStatus::Completed => {
                for line in &lines {
                    let qty = line.effective_quantity();
                    movements.push(
                        StockMovement::transfer(line.item_id, src, None, qty)?
                            .with_reference(reference.clone()),
                    );
                    movements.push(
                        StockMovement::check_in(line.item_id, dst, qty, None)?
                            .with_reference(reference.clone()),
                    );
                }
            }
            TransferStatus::ReturnRequested => {
                let mut rejected = Vec::with_capacity(lines.len());
                for line in &lines {
                    let qty = line.effective_quantity();
                    movements.push(
                        StockMovement::transfer(line.item_id, src, None, qty)?
                            .with_reference(reference.clone()),
                    );
                    rejected.push(RejectedGoods {
                        id: RejectedGoodsId::new(),
                        transfer_id: self.id,
                        item_id: line.item_id,
                        warehouse_id: src,
                        quantity: qty,
                        reason: request.reason.clone(),
                        status: RejectedGoodsStatus::PendingDisposition,
                        created_at: now,
                        updated_at: now,
                    });
                }
                goods = GoodsAction::Create(rejected);
            }
            TransferStatus::Returned => {
                for line in &lines {
                    movements.push(
                        StockMovement::check_in(line.item_id, src, line.effective_quantity(), None)?
                            .with_reference(reference.clone()),
                    );
                }
                goods = GoodsAction::MarkReturned;
            }
            TransferStatus::Disposed => goods = GoodsAction::MarkDisposed,
            TransferStatus::Rejected
            | TransferStatus::ReturnApproved
            | TransferStatus::ReturnShipped
            | TransferStatus::Pending => {}
        }

        self.lines = lines;
        self.status = to;
        self.history.push(StatusChange {
            from: Some(from),
            to,
            by: actor.user_id,
            at: now,
            note: request.note.or(request.reason),
        });
        self.updated_at = now;
        self.version += 1;

        Ok(TransferPlan {
            from,
            to,
            movements,
            stock_checks,
            goods,
        })
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(TransferLine::effective_quantity).sum()
    }
}

impl AggregateRoot for Transfer {
    type Id = TransferId;

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
    use proptest::prelude::*;
    use warehub_inventory::{BalanceSheet, TransactionKind};

    fn admin() -> TransferActor {
        TransferActor {
            user_id: UserId::new(),
            is_admin: true,
            manages_source: false,
            manages_destination: false,
        }
    }

    fn transfer(qty: i64) -> Transfer {
        Transfer::create(
            NewTransfer {
                source_warehouse_id: WarehouseId::new(),
                destination_warehouse_id: WarehouseId::new(),
                lines: vec![NewTransferLine {
                    item_id: ItemId::new(),
                    quantity: qty,
                }],
                notes: None,
            },
            UserId::new(),
            Utc::now(),
        )
        .unwrap()
    }

    fn walk(t: &mut Transfer, path: &[TransferStatus]) -> Vec<TransferPlan> {
        path.iter()
            .map(|s| t.transition(&admin(), TransitionRequest::to(*s), Utc::now()).unwrap())
            .collect()
    }

    #[test]
    fn create_validates_shape() {
        let wh = WarehouseId::new();
        let item = ItemId::new();
        let same = NewTransfer {
            source_warehouse_id: wh,
            destination_warehouse_id: wh,
            lines: vec![NewTransferLine { item_id: item, quantity: 1 }],
            notes: None,
        };
        assert!(Transfer::create(same, UserId::new(), Utc::now()).is_err());

        let dup = NewTransfer {
            source_warehouse_id: wh,
            destination_warehouse_id: WarehouseId::new(),
            lines: vec![
                NewTransferLine { item_id: item, quantity: 1 },
                NewTransferLine { item_id: item, quantity: 2 },
            ],
            notes: None,
        };
        assert!(Transfer::create(dup, UserId::new(), Utc::now()).is_err());

        let empty = NewTransfer {
            source_warehouse_id: wh,
            destination_warehouse_id: WarehouseId::new(),
            lines: vec![],
            notes: None,
        };
        assert!(Transfer::create(empty, UserId::new(), Utc::now()).is_err());
    }

    #[test]
    fn completion_moves_shipped_quantity() {
        let mut t = transfer(10);
        let item = t.lines[0].item_id;
        let (src, dst) = (t.source_warehouse_id, t.destination_warehouse_id);

        let mut approve = TransitionRequest::to(TransferStatus::Approved);
        approve.quantities = vec![LineQuantity { item_id: item, quantity: 8 }];
        t.transition(&admin(), approve, Utc::now()).unwrap();

        let mut ship = TransitionRequest::to(TransferStatus::InTransit);
        ship.quantities = vec![LineQuantity { item_id: item, quantity: 6 }];
        let plan = t.transition(&admin(), ship, Utc::now()).unwrap();
        assert!(plan.is_stock_neutral());
        assert_eq!(plan.stock_checks[0].quantity, 6);

        let plan = t
            .transition(&admin(), TransitionRequest::to(TransferStatus::Completed), Utc::now())
            .unwrap();
        assert_eq!(plan.movements.len(), 2);
        assert_eq!(plan.movements[0].kind, TransactionKind::Transfer);
        assert_eq!(plan.movements[1].kind, TransactionKind::CheckIn);
        assert_eq!(plan.movements[1].reference.as_deref(), Some(t.code.as_str()));

        let mut sheet = BalanceSheet::new(Utc::now());
        sheet.apply_delta(item, src, 20).unwrap();
        for m in &plan.movements {
            sheet.apply(m).unwrap();
        }
        assert_eq!(sheet.quantity(item, src), 14);
        assert_eq!(sheet.quantity(item, dst), 6);
        assert_eq!(t.history.len(), 4);
        assert_eq!(t.version, 4);
    }

    #[test]
    fn over_approval_is_rejected_and_state_kept() {
        let mut t = transfer(3);
        let item = t.lines[0].item_id;
        let mut approve = TransitionRequest::to(TransferStatus::Approved);
        approve.quantities = vec![LineQuantity { item_id: item, quantity: 4 }];
        assert!(matches!(
            t.transition(&admin(), approve, Utc::now()),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(t.status, TransferStatus::Pending);
        assert_eq!(t.version, 1);
    }

    #[test]
    fn return_flow_round_trips_source_stock() {
        let mut t = transfer(5);
        let item = t.lines[0].item_id;
        let src = t.source_warehouse_id;
        let plans = walk(
            &mut t,
            &[
                TransferStatus::Approved,
                TransferStatus::InTransit,
                TransferStatus::ReturnRequested,
                TransferStatus::ReturnApproved,
                TransferStatus::ReturnShipped,
                TransferStatus::Returned,
            ],
        );

        match &plans[2].goods {
            GoodsAction::Create(goods) => {
                assert_eq!(goods.len(), 1);
                assert_eq!(goods[0].quantity, 5);
                assert_eq!(goods[0].warehouse_id, src);
            }
            other => panic!("expected rejected goods, got {other:?}"),
        }
        assert_eq!(plans[5].goods, GoodsAction::MarkReturned);

        let mut sheet = BalanceSheet::new(Utc::now());
        sheet.apply_delta(item, src, 5).unwrap();
        for plan in &plans {
            for m in &plan.movements {
                sheet.apply(m).unwrap();
            }
        }
        assert_eq!(sheet.quantity(item, src), 5);
        assert!(t.status.is_terminal());
    }

    #[test]
    fn disposal_moves_no_stock() {
        let mut t = transfer(2);
        let plans = walk(
            &mut t,
            &[
                TransferStatus::Approved,
                TransferStatus::InTransit,
                TransferStatus::ReturnRequested,
                TransferStatus::Disposed,
            ],
        );
        assert!(plans[3].is_stock_neutral());
        assert_eq!(plans[3].goods, GoodsAction::MarkDisposed);
    }

    #[test]
    fn source_manager_cannot_complete() {
        let mut t = transfer(2);
        walk(&mut t, &[TransferStatus::Approved, TransferStatus::InTransit]);
        let manager = UserId::new();
        let actor = t.actor(manager, false, Some(manager), None);
        let err = t
            .transition(&actor, TransitionRequest::to(TransferStatus::Completed), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        assert_eq!(t.status, TransferStatus::InTransit);
    }

    fn status() -> impl Strategy<Value = TransferStatus> {
        prop::sample::select(TransferStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Any walk of requested statuses only ever reaches in_transit from
        /// approved, and rejecting never plans stock movements.
        #[test]
        fn random_walks_respect_the_table(path in prop::collection::vec(status(), 1..12), qty in 1i64..100) {
            let mut t = transfer(qty);
            for to in path {
                let before = t.status;
                match t.transition(&admin(), TransitionRequest::to(to), Utc::now()) {
                    Ok(plan) => {
                        prop_assert!(before.can_transition_to(to));
                        if to == TransferStatus::InTransit {
                            prop_assert_eq!(before, TransferStatus::Approved);
                        }
                        if to == TransferStatus::Rejected {
                            prop_assert!(plan.is_stock_neutral());
                        }
                        for m in &plan.movements {
                            prop_assert!(m.quantity <= qty);
                        }
                    }
                    Err(_) => prop_assert_eq!(t.status, before),
                }
            }
        }

        /// Approved and shipped quantities never exceed what was requested.
        #[test]
        fn quantities_never_grow(requested in 1i64..500, approved in -5i64..600, shipped in -5i64..600) {
            let mut t = transfer(requested);
            let item = t.lines[0].item_id;
            let mut approve = TransitionRequest::to(TransferStatus::Approved);
            approve.quantities = vec![LineQuantity { item_id: item, quantity: approved }];
            if t.transition(&admin(), approve, Utc::now()).is_ok() {
                let mut ship = TransitionRequest::to(TransferStatus::InTransit);
                ship.quantities = vec![LineQuantity { item_id: item, quantity: shipped }];
                let _ = t.transition(&admin(), ship, Utc::now());
            }
            let line = &t.lines[0];
            prop_assert!(line.approved_quantity.unwrap_or(0) <= requested);
            prop_assert!(line.actual_quantity.unwrap_or(0) <= line.approved_quantity.unwrap_or(0));
        }
    }
}
