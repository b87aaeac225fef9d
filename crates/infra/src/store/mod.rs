//! Tenant-scoped persistence.
//!
//! Reads are plain lookups. Every write goes through [`Store::commit`] as one
//! [`ChangeSet`]: either all of it is applied or none of it is. Versioned
//! records carry the [`ExpectedVersion`] they were loaded at; a mismatch fails
//! the whole change set with [`StoreError::Conflict`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use warehub_core::{AggregateRoot, ExpectedVersion, TenantId, UserId};
use warehub_inventory::{
    Item, ItemId, MovementFilter, StockBalance, Transaction, TransactionId, Warehouse, WarehouseId,
};
use warehub_requests::{Request, RequestId};
use warehub_sales::{SalesOrder, SalesOrderId};
use warehub_transfers::{RejectedGoods, Transfer, TransferId};

use crate::notifications::{Notification, NotificationId};
use crate::settings::OrganizationSettings;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A versioned write did not match the stored version.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// A uniqueness constraint (e.g. SKU) was violated.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Connection, query or decoding failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// A record paired with the version it must replace.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub record: T,
    pub expected: ExpectedVersion,
}

impl<T: AggregateRoot> Versioned<T> {
    /// A record that must not exist yet.
    pub fn new(record: T) -> Self {
        Self {
            record,
            expected: ExpectedVersion::NEW,
        }
    }

    /// A record loaded at `loaded_version` and modified since.
    pub fn updated(record: T, loaded_version: u64) -> Self {
        Self {
            record,
            expected: ExpectedVersion::Exact(loaded_version),
        }
    }
}

/// Everything one operation writes.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub items: Vec<Versioned<Item>>,
    pub warehouses: Vec<Versioned<Warehouse>>,
    pub balances: Vec<(StockBalance, ExpectedVersion)>,
    pub transactions: Vec<Versioned<Transaction>>,
    pub transfers: Vec<Versioned<Transfer>>,
    /// Upserted by id.
    pub rejected_goods: Vec<RejectedGoods>,
    pub requests: Vec<Versioned<Request>>,
    pub sales_orders: Vec<Versioned<SalesOrder>>,
    /// Upserted by id.
    pub notifications: Vec<Notification>,
    pub settings: Option<OrganizationSettings>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
            && self.warehouses.is_empty()
            && self.balances.is_empty()
            && self.transactions.is_empty()
            && self.transfers.is_empty()
            && self.rejected_goods.is_empty()
            && self.requests.is_empty()
            && self.sales_orders.is_empty()
            && self.notifications.is_empty()
            && self.settings.is_none()
    }
}

/// Filter for balance listings. Empty fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceFilter {
    pub item_id: Option<ItemId>,
    pub warehouse_id: Option<WarehouseId>,
}

impl BalanceFilter {
    pub fn matches(&self, balance: &StockBalance) -> bool {
        self.item_id.is_none_or(|i| balance.item_id == i)
            && self.warehouse_id.is_none_or(|w| balance.warehouse_id == w)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Apply a change set atomically.
    async fn commit(&self, tenant_id: TenantId, changes: ChangeSet) -> Result<(), StoreError>;

    async fn get_item(&self, tenant_id: TenantId, id: ItemId) -> Result<Option<Item>, StoreError>;
    /// Ordered by SKU.
    async fn list_items(&self, tenant_id: TenantId) -> Result<Vec<Item>, StoreError>;

    async fn get_warehouse(
        &self,
        tenant_id: TenantId,
        id: WarehouseId,
    ) -> Result<Option<Warehouse>, StoreError>;
    /// Ordered by name, then id.
    async fn list_warehouses(&self, tenant_id: TenantId) -> Result<Vec<Warehouse>, StoreError>;

    async fn list_balances(
        &self,
        tenant_id: TenantId,
        filter: BalanceFilter,
    ) -> Result<Vec<StockBalance>, StoreError>;

    async fn get_transaction(
        &self,
        tenant_id: TenantId,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError>;
    /// Newest first.
    async fn list_transactions(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn get_transfer(
        &self,
        tenant_id: TenantId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError>;
    /// Newest first.
    async fn list_transfers(&self, tenant_id: TenantId) -> Result<Vec<Transfer>, StoreError>;
    async fn list_rejected_goods(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> Result<Vec<RejectedGoods>, StoreError>;

    async fn get_request(
        &self,
        tenant_id: TenantId,
        id: RequestId,
    ) -> Result<Option<Request>, StoreError>;
    /// Newest first.
    async fn list_requests(&self, tenant_id: TenantId) -> Result<Vec<Request>, StoreError>;

    async fn get_sales_order(
        &self,
        tenant_id: TenantId,
        id: SalesOrderId,
    ) -> Result<Option<SalesOrder>, StoreError>;
    /// Newest first.
    async fn list_sales_orders(&self, tenant_id: TenantId) -> Result<Vec<SalesOrder>, StoreError>;

    async fn get_notification(
        &self,
        tenant_id: TenantId,
        id: NotificationId,
    ) -> Result<Option<Notification>, StoreError>;
    /// Notifications addressed to `user` or to the whole tenant, newest first.
    async fn list_notifications(
        &self,
        tenant_id: TenantId,
        user: UserId,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn get_settings(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<OrganizationSettings>, StoreError>;
}

#[async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    async fn commit(&self, tenant_id: TenantId, changes: ChangeSet) -> Result<(), StoreError> {
        (**self).commit(tenant_id, changes).await
    }

    async fn get_item(&self, tenant_id: TenantId, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).get_item(tenant_id, id).await
    }

    async fn list_items(&self, tenant_id: TenantId) -> Result<Vec<Item>, StoreError> {
        (**self).list_items(tenant_id).await
    }

    async fn get_warehouse(
        &self,
        tenant_id: TenantId,
        id: WarehouseId,
    ) -> Result<Option<Warehouse>, StoreError> {
        (**self).get_warehouse(tenant_id, id).await
    }

    async fn list_warehouses(&self, tenant_id: TenantId) -> Result<Vec<Warehouse>, StoreError> {
        (**self).list_warehouses(tenant_id).await
    }

    async fn list_balances(
        &self,
        tenant_id: TenantId,
        filter: BalanceFilter,
    ) -> Result<Vec<StockBalance>, StoreError> {
        (**self).list_balances(tenant_id, filter).await
    }

    async fn get_transaction(
        &self,
        tenant_id: TenantId,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        (**self).get_transaction(tenant_id, id).await
    }

    async fn list_transactions(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> Result<Vec<Transaction>, StoreError> {
        (**self).list_transactions(tenant_id, filter).await
    }

    async fn get_transfer(
        &self,
        tenant_id: TenantId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError> {
        (**self).get_transfer(tenant_id, id).await
    }

    async fn list_transfers(&self, tenant_id: TenantId) -> Result<Vec<Transfer>, StoreError> {
        (**self).list_transfers(tenant_id).await
    }

    async fn list_rejected_goods(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> Result<Vec<RejectedGoods>, StoreError> {
        (**self).list_rejected_goods(tenant_id, transfer_id).await
    }

    async fn get_request(
        &self,
        tenant_id: TenantId,
        id: RequestId,
    ) -> Result<Option<Request>, StoreError> {
        (**self).get_request(tenant_id, id).await
    }

    async fn list_requests(&self, tenant_id: TenantId) -> Result<Vec<Request>, StoreError> {
        (**self).list_requests(tenant_id).await
    }

    async fn get_sales_order(
        &self,
        tenant_id: TenantId,
        id: SalesOrderId,
    ) -> Result<Option<SalesOrder>, StoreError> {
        (**self).get_sales_order(tenant_id, id).await
    }

    async fn list_sales_orders(&self, tenant_id: TenantId) -> Result<Vec<SalesOrder>, StoreError> {
        (**self).list_sales_orders(tenant_id).await
    }

    async fn get_notification(
        &self,
        tenant_id: TenantId,
        id: NotificationId,
    ) -> Result<Option<Notification>, StoreError> {
        (**self).get_notification(tenant_id, id).await
    }

    async fn list_notifications(
        &self,
        tenant_id: TenantId,
        user: UserId,
    ) -> Result<Vec<Notification>, StoreError> {
        (**self).list_notifications(tenant_id, user).await
    }

    async fn get_settings(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<OrganizationSettings>, StoreError> {
        (**self).get_settings(tenant_id).await
    }
}
