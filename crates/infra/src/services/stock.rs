//! Balances and the stock ledger: check-in, issue, disposal, confirmation.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use warehub_auth::{Principal, policy};
use warehub_inventory::{
    ItemId, LowStockEntry, MovementFilter, StockBalance, StockMovement, Transaction, TransactionId,
    TransactionStatus, WarehouseId, low_stock,
};

use super::{ServiceError, ServiceResult, Services, require, require_scope, tenant};
use crate::store::{BalanceFilter, ChangeSet, Versioned};

/// Issue or disposal input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIn {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    /// Unit cost used for valuation.
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Record an expected receipt without touching stock until confirmed.
    #[serde(default)]
    pub pending: bool,
}

impl Services {
    pub async fn list_balances(
        &self,
        principal: &Principal,
        filter: BalanceFilter,
    ) -> ServiceResult<Vec<StockBalance>> {
        require(principal, &policy::INVENTORY_READ)?;
        Ok(self.store.list_balances(tenant(principal), filter).await?)
    }

    pub async fn low_stock(&self, principal: &Principal) -> ServiceResult<Vec<LowStockEntry>> {
        require(principal, &policy::INVENTORY_READ)?;
        let tenant_id = tenant(principal);
        let items = self.store.list_items(tenant_id).await?;
        let warehouses = self.store.list_warehouses(tenant_id).await?;
        let balances = self
            .store
            .list_balances(tenant_id, BalanceFilter::default())
            .await?;
        Ok(low_stock(&items, &warehouses, &balances))
    }

    pub async fn list_transactions(
        &self,
        principal: &Principal,
        filter: MovementFilter,
    ) -> ServiceResult<Vec<Transaction>> {
        require(principal, &policy::TRANSACTIONS_READ)?;
        filter.validate()?;
        Ok(self.store.list_transactions(tenant(principal), &filter).await?)
    }

    pub async fn get_transaction(
        &self,
        principal: &Principal,
        id: TransactionId,
    ) -> ServiceResult<Transaction> {
        require(principal, &policy::TRANSACTIONS_READ)?;
        self.store
            .get_transaction(tenant(principal), id)
            .await?
            .ok_or(ServiceError::NotFound("transaction"))
    }

    pub async fn check_in(&self, principal: &Principal, input: CheckIn) -> ServiceResult<Transaction> {
        require(principal, &policy::TRANSACTIONS_WRITE)?;
        let movement = StockMovement::check_in(
            input.item_id,
            input.warehouse_id,
            input.quantity,
            input.unit_cost,
        )?;
        let movement = match &input.reference {
            Some(r) => movement.with_reference(r.clone()),
            None => movement,
        };
        let status = if input.pending {
            TransactionStatus::Pending
        } else {
            TransactionStatus::Completed
        };
        self.with_retry("check_in", || {
            self.record_movement(principal, movement.clone(), status, input.note.clone())
        })
        .await
    }

    pub async fn issue(&self, principal: &Principal, input: StockEntry) -> ServiceResult<Transaction> {
        require(principal, &policy::TRANSACTIONS_WRITE)?;
        let movement = StockMovement::issue(input.item_id, input.warehouse_id, input.quantity)?;
        self.record_entry(principal, "issue", movement, input).await
    }

    pub async fn dispose(&self, principal: &Principal, input: StockEntry) -> ServiceResult<Transaction> {
        require(principal, &policy::TRANSACTIONS_WRITE)?;
        let movement = StockMovement::disposal(input.item_id, input.warehouse_id, input.quantity)?;
        self.record_entry(principal, "disposal", movement, input).await
    }

    async fn record_entry(
        &self,
        principal: &Principal,
        operation: &'static str,
        movement: StockMovement,
        input: StockEntry,
    ) -> ServiceResult<Transaction> {
        let movement = match input.reference {
            Some(r) => movement.with_reference(r),
            None => movement,
        };
        self.with_retry(operation, || {
            self.record_movement(
                principal,
                movement.clone(),
                TransactionStatus::Completed,
                input.note.clone(),
            )
        })
        .await
    }

    async fn record_movement(
        &self,
        principal: &Principal,
        movement: StockMovement,
        status: TransactionStatus,
        note: Option<String>,
    ) -> ServiceResult<Transaction> {
        let tenant_id = tenant(principal);
        let now = Utc::now();
        self.require_item(tenant_id, movement.item_id).await?;

        let warehouse_ids: Vec<WarehouseId> = movement.deltas().map(|(w, _)| w).collect();
        let mut ctx = self.stock_context(tenant_id, warehouse_ids.clone(), now).await?;
        for warehouse_id in &warehouse_ids {
            let warehouse = ctx.warehouse(*warehouse_id)?;
            require_scope(principal, warehouse)?;
            warehouse.ensure_active()?;
        }

        let transaction = Transaction::record(movement.clone(), status, principal.user_id, now)
            .with_note(note);
        let mut changes = if transaction.is_completed() {
            ctx.apply(std::slice::from_ref(&movement))?;
            self.stock_effects(tenant_id, &ctx, now).await?
        } else {
            ChangeSet::default()
        };
        changes.transactions.push(Versioned::new(transaction.clone()));

        self.commit(tenant_id, changes).await?;
        info!(
            tenant_id = %tenant_id,
            code = %transaction.code,
            kind = transaction.kind.as_str(),
            status = transaction.status.as_str(),
            quantity = transaction.quantity,
            "stock transaction recorded"
        );
        Ok(transaction)
    }

    /// Confirm a pending check-in, applying it to stock.
    pub async fn confirm_transaction(
        &self,
        principal: &Principal,
        id: TransactionId,
    ) -> ServiceResult<Transaction> {
        require(principal, &policy::TRANSACTIONS_WRITE)?;
        self.with_retry("confirm_transaction", || self.confirm_once(principal, id))
            .await
    }

    async fn confirm_once(&self, principal: &Principal, id: TransactionId) -> ServiceResult<Transaction> {
        let tenant_id = tenant(principal);
        let now = Utc::now();
        let mut transaction = self
            .store
            .get_transaction(tenant_id, id)
            .await?
            .ok_or(ServiceError::NotFound("transaction"))?;
        let loaded_version = transaction.version;
        transaction.confirm(now)?;

        let movement = transaction.movement();
        let warehouse_ids: Vec<WarehouseId> = movement.deltas().map(|(w, _)| w).collect();
        let mut ctx = self.stock_context(tenant_id, warehouse_ids.clone(), now).await?;
        for warehouse_id in &warehouse_ids {
            require_scope(principal, ctx.warehouse(*warehouse_id)?)?;
        }
        ctx.apply(std::slice::from_ref(&movement))?;
        let effects = self.stock_effects(tenant_id, &ctx, now).await?;

        self.commit(
            tenant_id,
            ChangeSet {
                transactions: vec![Versioned::updated(transaction.clone(), loaded_version)],
                ..effects
            },
        )
        .await?;
        info!(tenant_id = %tenant_id, code = %transaction.code, "pending transaction confirmed");
        Ok(transaction)
    }
}

/// Ledger rows for movements that take effect immediately.
pub(super) fn completed_rows(
    movements: &[StockMovement],
    principal: &Principal,
    now: chrono::DateTime<Utc>,
) -> Vec<Versioned<Transaction>> {
    movements
        .iter()
        .map(|m| {
            Versioned::new(Transaction::record(
                m.clone(),
                TransactionStatus::Completed,
                principal.user_id,
                now,
            ))
        })
        .collect()
}
