//! Application services.
//!
//! Each operation follows the same pipeline:
//!
//! ```text
//! authorize (permission + warehouse scope)
//!   ↓
//! load records and the balances they touch
//!   ↓
//! run pure domain rules (items, transfers, requests, sales)
//!   ↓
//! commit one ChangeSet with expected versions
//!   ↓
//! publish notifications
//! ```
//!
//! A version conflict reruns the whole operation on fresh state, up to
//! `conflict_retries` times.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use warehub_auth::{AuthzError, Permission, Principal, authorize};
use warehub_core::{DomainError, TenantId};
use warehub_inventory::{
    BalanceSheet, Item, ItemId, StockBalance, StockMovement, Warehouse, WarehouseId,
};

use crate::config::DEFAULT_CONFLICT_RETRIES;
use crate::notifications::{Notification, NotificationKind, NotificationSink};
use crate::settings::OrganizationSettings;
use crate::store::{BalanceFilter, ChangeSet, Store, StoreError, Versioned};

mod catalog;
mod inbox;
mod reports;
mod requests;
mod sales;
mod stock;
mod transfers;

#[cfg(test)]
mod tests;

pub use reports::ValuationQuery;
pub use stock::{CheckIn, StockEntry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Stale version; safe to retry.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A business rule refused the operation.
    #[error("{0}")]
    Invariant(String),

    #[error("store failure: {0}")]
    Store(String),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => ServiceError::Invariant(msg),
            DomainError::NotFound(what) => ServiceError::NotFound(what),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::Forbidden(msg) => ServiceError::Forbidden(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Duplicate(msg) => ServiceError::Duplicate(msg),
            StoreError::Backend(msg) => ServiceError::Store(msg),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        ServiceError::Forbidden(value.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Entry point for every use case the API exposes.
#[derive(Clone)]
pub struct Services {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
    conflict_retries: u32,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            store,
            sink,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run `op` again while it fails with a version conflict.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut op: F) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(ServiceError::Conflict(msg)) if attempt < self.conflict_retries => {
                    attempt += 1;
                    warn!(operation, attempt, error = %msg, "version conflict, retrying");
                }
                other => return other,
            }
        }
    }

    /// Commit, then push the change set's notifications to the realtime sink.
    async fn commit(&self, tenant_id: TenantId, changes: ChangeSet) -> ServiceResult<()> {
        let notifications = changes.notifications.clone();
        self.store.commit(tenant_id, changes).await?;
        for n in &notifications {
            self.sink.publish(tenant_id, n);
        }
        Ok(())
    }

    async fn settings(&self, tenant_id: TenantId) -> ServiceResult<OrganizationSettings> {
        Ok(self.store.get_settings(tenant_id).await?.unwrap_or_default())
    }

    async fn require_item(&self, tenant_id: TenantId, id: ItemId) -> ServiceResult<Item> {
        self.store
            .get_item(tenant_id, id)
            .await?
            .ok_or(ServiceError::NotFound("item"))
    }

    async fn require_warehouse(&self, tenant_id: TenantId, id: WarehouseId) -> ServiceResult<Warehouse> {
        self.store
            .get_warehouse(tenant_id, id)
            .await?
            .ok_or(ServiceError::NotFound("warehouse"))
    }

    /// Load the given warehouses and every balance they hold.
    async fn stock_context(
        &self,
        tenant_id: TenantId,
        warehouse_ids: impl IntoIterator<Item = WarehouseId>,
        now: DateTime<Utc>,
    ) -> ServiceResult<StockContext> {
        let mut warehouses = HashMap::new();
        let mut balances: Vec<StockBalance> = Vec::new();
        for id in warehouse_ids {
            if warehouses.contains_key(&id) {
                continue;
            }
            let warehouse = self.require_warehouse(tenant_id, id).await?;
            balances.extend(
                self.store
                    .list_balances(
                        tenant_id,
                        BalanceFilter {
                            warehouse_id: Some(id),
                            ..BalanceFilter::default()
                        },
                    )
                    .await?,
            );
            warehouses.insert(id, warehouse);
        }
        Ok(StockContext {
            warehouses,
            sheet: BalanceSheet::load(balances, now),
            decremented: BTreeSet::new(),
            touched: BTreeSet::new(),
        })
    }

    /// Balance rows and warehouse version bumps to write, plus any low-stock
    /// notifications they trigger.
    async fn stock_effects(
        &self,
        tenant_id: TenantId,
        ctx: &StockContext,
        now: DateTime<Utc>,
    ) -> ServiceResult<ChangeSet> {
        let mut notifications = Vec::new();
        if !ctx.decremented.is_empty() && self.settings(tenant_id).await?.low_stock_notifications {
            for &(item_id, warehouse_id) in &ctx.decremented {
                let item = self.require_item(tenant_id, item_id).await?;
                let quantity = ctx.sheet.quantity(item_id, warehouse_id);
                if !item.is_low(quantity) {
                    continue;
                }
                let warehouse = ctx.warehouse(warehouse_id)?;
                notifications.push(Notification::new(
                    NotificationKind::LowStock,
                    warehouse.manager_id,
                    format!(
                        "Low stock: {} in {} ({} left, minimum {})",
                        item.sku, warehouse.name, quantity, item.min_stock_level
                    ),
                    Some(item.sku.clone()),
                    now,
                ));
            }
        }
        Ok(ChangeSet {
            balances: ctx.sheet.changes(),
            warehouses: ctx.touched_warehouses(),
            notifications,
            ..ChangeSet::default()
        })
    }
}

/// Warehouses and balances loaded for one stock-moving operation.
struct StockContext {
    warehouses: HashMap<WarehouseId, Warehouse>,
    sheet: BalanceSheet,
    decremented: BTreeSet<(ItemId, WarehouseId)>,
    touched: BTreeSet<WarehouseId>,
}

impl StockContext {
    fn warehouse(&self, id: WarehouseId) -> ServiceResult<&Warehouse> {
        self.warehouses.get(&id).ok_or(ServiceError::NotFound("warehouse"))
    }

    /// Apply movements to the working balances.
    ///
    /// Touched warehouses must be active and receiving ones must stay within
    /// capacity.
    fn apply(&mut self, movements: &[StockMovement]) -> ServiceResult<()> {
        for movement in movements {
            for (warehouse_id, _) in movement.deltas() {
                self.warehouse(warehouse_id)?.ensure_active()?;
                self.touched.insert(warehouse_id);
            }
            self.sheet.apply(movement)?;
            if let Some(source) = movement.source {
                self.decremented.insert((movement.item_id, source));
            }
            if let Some(destination) = movement.destination {
                let total = self.sheet.warehouse_total(destination);
                self.warehouse(destination)?
                    .ensure_capacity(total - movement.quantity, movement.quantity)?;
            }
        }
        Ok(())
    }

    /// Record pairs decremented outside [`StockContext::apply`].
    fn note_decrements(&mut self, movements: &[StockMovement]) {
        for movement in movements {
            if let Some(source) = movement.source {
                self.decremented.insert((movement.item_id, source));
            }
            self.touched.extend(movement.deltas().map(|(warehouse_id, _)| warehouse_id));
        }
    }

    /// Every warehouse whose stock changed, at its next version.
    fn touched_warehouses(&self) -> Vec<Versioned<Warehouse>> {
        self.touched
            .iter()
            .filter_map(|id| self.warehouses.get(id))
            .map(|warehouse| {
                let loaded_version = warehouse.version;
                let mut warehouse = warehouse.clone();
                warehouse.record_stock_change();
                Versioned::updated(warehouse, loaded_version)
            })
            .collect()
    }
}

fn require(principal: &Principal, permission: &Permission) -> ServiceResult<()> {
    authorize(principal, permission)?;
    Ok(())
}

/// Admins act on every warehouse; everyone else only on those they manage.
fn require_scope(principal: &Principal, warehouse: &Warehouse) -> ServiceResult<()> {
    if principal.is_admin() || warehouse.is_managed_by(principal.user_id) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "not a manager of warehouse '{}'",
            warehouse.name
        )))
    }
}

fn tenant(principal: &Principal) -> TenantId {
    principal.active_tenant_id
}
