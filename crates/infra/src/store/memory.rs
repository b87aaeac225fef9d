use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use async_trait::async_trait;

use warehub_core::{AggregateRoot, ExpectedVersion, TenantId, UserId};
use warehub_inventory::{
    Item, ItemId, MovementFilter, StockBalance, Transaction, TransactionId, Warehouse, WarehouseId,
};
use warehub_requests::{Request, RequestId};
use warehub_sales::{SalesOrder, SalesOrderId};
use warehub_transfers::{RejectedGoods, RejectedGoodsId, Transfer, TransferId};

use super::{BalanceFilter, ChangeSet, Store, StoreError, Versioned};
use crate::notifications::{Notification, NotificationId};
use crate::settings::OrganizationSettings;

#[derive(Debug, Default)]
struct TenantData {
    items: HashMap<ItemId, Item>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    balances: HashMap<(ItemId, WarehouseId), StockBalance>,
    transactions: HashMap<TransactionId, Transaction>,
    transfers: HashMap<TransferId, Transfer>,
    rejected_goods: HashMap<RejectedGoodsId, RejectedGoods>,
    requests: HashMap<RequestId, Request>,
    sales_orders: HashMap<SalesOrderId, SalesOrder>,
    notifications: HashMap<NotificationId, Notification>,
    settings: Option<OrganizationSettings>,
}

/// In-memory tenant-isolated store for tests/dev.
///
/// A commit takes the write lock once, checks every expectation in the change
/// set, and only then applies it.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<HashMap<TenantId, TenantData>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, tenant_id: TenantId, f: impl FnOnce(&TenantData) -> T) -> Result<T, StoreError>
    where
        T: Default,
    {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;
        Ok(map.get(&tenant_id).map(f).unwrap_or_default())
    }
}

fn check_version(
    what: &str,
    id: impl core::fmt::Display,
    current: Option<u64>,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    let actual = current.unwrap_or(0);
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "{what} {id}: expected {expected:?}, found version {actual}"
        )))
    }
}

fn check_all<K, T>(what: &str, existing: &HashMap<K, T>, writes: &[Versioned<T>]) -> Result<(), StoreError>
where
    K: Eq + Hash,
    T: AggregateRoot<Id = K>,
    K: core::fmt::Display,
{
    for w in writes {
        let id = w.record.id();
        check_version(what, id, existing.get(id).map(AggregateRoot::version), w.expected)?;
    }
    Ok(())
}

fn apply_all<K, T>(existing: &mut HashMap<K, T>, writes: Vec<Versioned<T>>)
where
    K: Eq + Hash + Clone,
    T: AggregateRoot<Id = K>,
{
    for w in writes {
        existing.insert(w.record.id().clone(), w.record);
    }
}

/// SKUs stay unique once every item in the change set is written.
fn check_skus(existing: &HashMap<ItemId, Item>, writes: &[Versioned<Item>]) -> Result<(), StoreError> {
    let mut skus: HashMap<&str, ItemId> = existing
        .values()
        .filter(|i| !writes.iter().any(|w| w.record.id == i.id))
        .map(|i| (i.sku.as_str(), i.id))
        .collect();
    for w in writes {
        if let Some(other) = skus.insert(w.record.sku.as_str(), w.record.id) {
            if other != w.record.id {
                return Err(StoreError::Duplicate(format!(
                    "sku '{}' already exists",
                    w.record.sku
                )));
            }
        }
    }
    Ok(())
}

fn newest_first<T>(mut rows: Vec<T>, key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, uuid::Uuid)) -> Vec<T> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

#[async_trait]
impl Store for InMemoryStore {
    async fn commit(&self, tenant_id: TenantId, changes: ChangeSet) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;
        let data = map.entry(tenant_id).or_default();

        check_all("item", &data.items, &changes.items)?;
        check_skus(&data.items, &changes.items)?;
        check_all("warehouse", &data.warehouses, &changes.warehouses)?;
        for (balance, expected) in &changes.balances {
            check_version(
                "balance",
                format_args!("{}/{}", balance.item_id, balance.warehouse_id),
                data.balances.get(&balance.key()).map(|b| b.version),
                *expected,
            )?;
        }
        check_all("transaction", &data.transactions, &changes.transactions)?;
        check_all("transfer", &data.transfers, &changes.transfers)?;
        check_all("request", &data.requests, &changes.requests)?;
        check_all("sales order", &data.sales_orders, &changes.sales_orders)?;

        apply_all(&mut data.items, changes.items);
        apply_all(&mut data.warehouses, changes.warehouses);
        for (balance, _) in changes.balances {
            data.balances.insert(balance.key(), balance);
        }
        apply_all(&mut data.transactions, changes.transactions);
        apply_all(&mut data.transfers, changes.transfers);
        for goods in changes.rejected_goods {
            data.rejected_goods.insert(goods.id, goods);
        }
        apply_all(&mut data.requests, changes.requests);
        apply_all(&mut data.sales_orders, changes.sales_orders);
        for notification in changes.notifications {
            data.notifications.insert(notification.id, notification);
        }
        if let Some(settings) = changes.settings {
            data.settings = Some(settings);
        }
        Ok(())
    }

    async fn get_item(&self, tenant_id: TenantId, id: ItemId) -> Result<Option<Item>, StoreError> {
        self.read(tenant_id, |d| d.items.get(&id).cloned())
    }

    async fn list_items(&self, tenant_id: TenantId) -> Result<Vec<Item>, StoreError> {
        let mut items = self.read(tenant_id, |d| d.items.values().cloned().collect::<Vec<_>>())?;
        items.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(items)
    }

    async fn get_warehouse(
        &self,
        tenant_id: TenantId,
        id: WarehouseId,
    ) -> Result<Option<Warehouse>, StoreError> {
        self.read(tenant_id, |d| d.warehouses.get(&id).cloned())
    }

    async fn list_warehouses(&self, tenant_id: TenantId) -> Result<Vec<Warehouse>, StoreError> {
        let mut warehouses =
            self.read(tenant_id, |d| d.warehouses.values().cloned().collect::<Vec<_>>())?;
        warehouses.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(warehouses)
    }

    async fn list_balances(
        &self,
        tenant_id: TenantId,
        filter: BalanceFilter,
    ) -> Result<Vec<StockBalance>, StoreError> {
        let mut balances = self.read(tenant_id, |d| {
            d.balances
                .values()
                .filter(|b| filter.matches(b))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        balances.sort_by_key(StockBalance::key);
        Ok(balances)
    }

    async fn get_transaction(
        &self,
        tenant_id: TenantId,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        self.read(tenant_id, |d| d.transactions.get(&id).cloned())
    }

    async fn list_transactions(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.read(tenant_id, |d| filter.apply(d.transactions.values()))
    }

    async fn get_transfer(
        &self,
        tenant_id: TenantId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError> {
        self.read(tenant_id, |d| d.transfers.get(&id).cloned())
    }

    async fn list_transfers(&self, tenant_id: TenantId) -> Result<Vec<Transfer>, StoreError> {
        let rows = self.read(tenant_id, |d| d.transfers.values().cloned().collect::<Vec<_>>())?;
        Ok(newest_first(rows, |t| (t.created_at, *t.id.as_uuid())))
    }

    async fn list_rejected_goods(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> Result<Vec<RejectedGoods>, StoreError> {
        let mut rows = self.read(tenant_id, |d| {
            d.rejected_goods
                .values()
                .filter(|g| g.transfer_id == transfer_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn get_request(
        &self,
        tenant_id: TenantId,
        id: RequestId,
    ) -> Result<Option<Request>, StoreError> {
        self.read(tenant_id, |d| d.requests.get(&id).cloned())
    }

    async fn list_requests(&self, tenant_id: TenantId) -> Result<Vec<Request>, StoreError> {
        let rows = self.read(tenant_id, |d| d.requests.values().cloned().collect::<Vec<_>>())?;
        Ok(newest_first(rows, |r| (r.created_at, *r.id.as_uuid())))
    }

    async fn get_sales_order(
        &self,
        tenant_id: TenantId,
        id: SalesOrderId,
    ) -> Result<Option<SalesOrder>, StoreError> {
        self.read(tenant_id, |d| d.sales_orders.get(&id).cloned())
    }

    async fn list_sales_orders(&self, tenant_id: TenantId) -> Result<Vec<SalesOrder>, StoreError> {
        let rows = self.read(tenant_id, |d| d.sales_orders.values().cloned().collect::<Vec<_>>())?;
        Ok(newest_first(rows, |o| (o.created_at, *o.id.as_uuid())))
    }

    async fn get_notification(
        &self,
        tenant_id: TenantId,
        id: NotificationId,
    ) -> Result<Option<Notification>, StoreError> {
        self.read(tenant_id, |d| d.notifications.get(&id).cloned())
    }

    async fn list_notifications(
        &self,
        tenant_id: TenantId,
        user: UserId,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = self.read(tenant_id, |d| {
            d.notifications
                .values()
                .filter(|n| n.is_visible_to(user))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(newest_first(rows, |n| (n.created_at, *n.id.as_uuid())))
    }

    async fn get_settings(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<OrganizationSettings>, StoreError> {
        self.read(tenant_id, |d| d.settings.clone())
    }
}
