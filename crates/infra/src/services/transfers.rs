//! Transfer lifecycle.

use chrono::{DateTime, Utc};
use tracing::info;

use warehub_auth::{Principal, policy};
use warehub_core::{DomainResult, TenantId};
use warehub_inventory::BalanceSheet;
use warehub_transfers::{
    GoodsAction, NewTransfer, RejectedGoods, RejectedGoodsStatus, StockCheck, Transfer, TransferId,
    TransitionRequest,
};

use super::stock::completed_rows;
use super::{ServiceError, ServiceResult, Services, require, tenant};
use crate::notifications::{Notification, NotificationKind};
use crate::store::{ChangeSet, Versioned};

impl Services {
    pub async fn list_transfers(&self, principal: &Principal) -> ServiceResult<Vec<Transfer>> {
        require(principal, &policy::TRANSFERS_READ)?;
        Ok(self.store.list_transfers(tenant(principal)).await?)
    }

    pub async fn get_transfer(&self, principal: &Principal, id: TransferId) -> ServiceResult<Transfer> {
        require(principal, &policy::TRANSFERS_READ)?;
        self.require_transfer(tenant(principal), id).await
    }

    pub async fn list_rejected_goods(
        &self,
        principal: &Principal,
        id: TransferId,
    ) -> ServiceResult<Vec<RejectedGoods>> {
        require(principal, &policy::TRANSFERS_READ)?;
        let tenant_id = tenant(principal);
        self.require_transfer(tenant_id, id).await?;
        Ok(self.store.list_rejected_goods(tenant_id, id).await?)
    }

    pub async fn create_transfer(
        &self,
        principal: &Principal,
        input: NewTransfer,
    ) -> ServiceResult<Transfer> {
        require(principal, &policy::TRANSFERS_WRITE)?;
        let tenant_id = tenant(principal);
        for id in [input.source_warehouse_id, input.destination_warehouse_id] {
            self.require_warehouse(tenant_id, id).await?.ensure_active()?;
        }
        for line in &input.lines {
            self.require_item(tenant_id, line.item_id).await?;
        }

        let transfer = Transfer::create(input, principal.user_id, Utc::now())?;
        self.store
            .commit(
                tenant_id,
                ChangeSet {
                    transfers: vec![Versioned::new(transfer.clone())],
                    ..ChangeSet::default()
                },
            )
            .await?;
        info!(
            tenant_id = %tenant_id,
            code = %transfer.code,
            lines = transfer.lines.len(),
            "transfer created"
        );
        Ok(transfer)
    }

    /// Move a transfer to a new status and commit its stock effects.
    pub async fn transition_transfer(
        &self,
        principal: &Principal,
        id: TransferId,
        request: TransitionRequest,
    ) -> ServiceResult<Transfer> {
        require(principal, &policy::TRANSFERS_WRITE)?;
        self.with_retry("transition_transfer", || {
            self.transition_once(principal, id, request.clone())
        })
        .await
    }

    async fn transition_once(
        &self,
        principal: &Principal,
        id: TransferId,
        request: TransitionRequest,
    ) -> ServiceResult<Transfer> {
        let tenant_id = tenant(principal);
        let now = Utc::now();
        let mut transfer = self.require_transfer(tenant_id, id).await?;
        let loaded_version = transfer.version;

        let mut ctx = self
            .stock_context(
                tenant_id,
                [transfer.source_warehouse_id, transfer.destination_warehouse_id],
                now,
            )
            .await?;
        let actor = transfer.actor(
            principal.user_id,
            principal.is_admin(),
            ctx.warehouse(transfer.source_warehouse_id)?.manager_id,
            ctx.warehouse(transfer.destination_warehouse_id)?.manager_id,
        );
        let plan = transfer.transition(&actor, request, now)?;

        for check in &plan.stock_checks {
            ensure_on_hand(&ctx.sheet, check)?;
        }
        ctx.apply(&plan.movements)?;
        let mut changes = self.stock_effects(tenant_id, &ctx, now).await?;

        changes.rejected_goods = match plan.goods {
            GoodsAction::None => Vec::new(),
            GoodsAction::Create(goods) => goods,
            GoodsAction::MarkReturned => {
                self.settle_goods(tenant_id, id, now, RejectedGoods::mark_returned)
                    .await?
            }
            GoodsAction::MarkDisposed => {
                self.settle_goods(tenant_id, id, now, RejectedGoods::mark_disposed)
                    .await?
            }
        };

        changes.notifications.push(Notification::new(
            NotificationKind::TransferStatus,
            Some(transfer.requested_by),
            format!("Transfer {} is now {}", transfer.code, plan.to),
            Some(transfer.code.to_string()),
            now,
        ));

        changes.transfers = vec![Versioned::updated(transfer.clone(), loaded_version)];
        changes.transactions = completed_rows(&plan.movements, principal, now);
        self.commit(tenant_id, changes).await?;
        info!(
            tenant_id = %tenant_id,
            code = %transfer.code,
            from = plan.from.as_str(),
            to = plan.to.as_str(),
            movements = plan.movements.len(),
            "transfer status changed"
        );
        Ok(transfer)
    }

    async fn require_transfer(&self, tenant_id: TenantId, id: TransferId) -> ServiceResult<Transfer> {
        self.store
            .get_transfer(tenant_id, id)
            .await?
            .ok_or(ServiceError::NotFound("transfer"))
    }

    /// Settle every rejected-goods row still awaiting a decision.
    async fn settle_goods(
        &self,
        tenant_id: TenantId,
        id: TransferId,
        now: DateTime<Utc>,
        settle: fn(&mut RejectedGoods, DateTime<Utc>) -> DomainResult<()>,
    ) -> ServiceResult<Vec<RejectedGoods>> {
        let mut goods: Vec<RejectedGoods> = self
            .store
            .list_rejected_goods(tenant_id, id)
            .await?
            .into_iter()
            .filter(|g| g.status == RejectedGoodsStatus::PendingDisposition)
            .collect();
        for g in &mut goods {
            settle(g, now)?;
        }
        Ok(goods)
    }
}

fn ensure_on_hand(sheet: &BalanceSheet, check: &StockCheck) -> ServiceResult<()> {
    let on_hand = sheet.quantity(check.item_id, check.warehouse_id);
    if on_hand < check.quantity {
        return Err(ServiceError::Invariant(format!(
            "insufficient stock for item {}: {} on hand, {} to ship",
            check.item_id, on_hand, check.quantity
        )));
    }
    Ok(())
}
