//! Items and warehouses.

use chrono::Utc;
use tracing::info;

use warehub_auth::{Principal, policy};
use warehub_core::TenantId;
use warehub_inventory::{
    Item, ItemId, ItemPatch, NewItem, NewWarehouse, Warehouse, WarehouseId, WarehousePatch,
};

use super::{ServiceResult, Services, require, tenant};
use crate::store::{BalanceFilter, ChangeSet, Versioned};

impl Services {
    pub async fn list_items(&self, principal: &Principal) -> ServiceResult<Vec<Item>> {
        require(principal, &policy::ITEMS_READ)?;
        Ok(self.store.list_items(tenant(principal)).await?)
    }

    pub async fn get_item(&self, principal: &Principal, id: ItemId) -> ServiceResult<Item> {
        require(principal, &policy::ITEMS_READ)?;
        self.require_item(tenant(principal), id).await
    }

    pub async fn create_item(&self, principal: &Principal, input: NewItem) -> ServiceResult<Item> {
        require(principal, &policy::ITEMS_WRITE)?;
        let tenant_id = tenant(principal);
        let item = Item::create(input, Utc::now())?;
        self.store
            .commit(
                tenant_id,
                ChangeSet {
                    items: vec![Versioned::new(item.clone())],
                    ..ChangeSet::default()
                },
            )
            .await?;
        info!(tenant_id = %tenant_id, sku = %item.sku, "item created");
        Ok(item)
    }

    pub async fn update_item(
        &self,
        principal: &Principal,
        id: ItemId,
        patch: ItemPatch,
    ) -> ServiceResult<Item> {
        require(principal, &policy::ITEMS_WRITE)?;
        let tenant_id = tenant(principal);
        self.with_retry("update_item", || {
            let patch = patch.clone();
            async move {
                let mut item = self.require_item(tenant_id, id).await?;
                let loaded_version = item.version;
                item.update(patch, Utc::now())?;
                self.store
                    .commit(
                        tenant_id,
                        ChangeSet {
                            items: vec![Versioned::updated(item.clone(), loaded_version)],
                            ..ChangeSet::default()
                        },
                    )
                    .await?;
                Ok(item)
            }
        })
        .await
    }

    pub async fn list_warehouses(&self, principal: &Principal) -> ServiceResult<Vec<Warehouse>> {
        require(principal, &policy::WAREHOUSES_READ)?;
        Ok(self.store.list_warehouses(tenant(principal)).await?)
    }

    pub async fn get_warehouse(&self, principal: &Principal, id: WarehouseId) -> ServiceResult<Warehouse> {
        require(principal, &policy::WAREHOUSES_READ)?;
        self.require_warehouse(tenant(principal), id).await
    }

    pub async fn create_warehouse(
        &self,
        principal: &Principal,
        input: NewWarehouse,
    ) -> ServiceResult<Warehouse> {
        require(principal, &policy::WAREHOUSES_WRITE)?;
        let tenant_id = tenant(principal);
        let warehouse = Warehouse::create(input, Utc::now())?;
        self.store
            .commit(
                tenant_id,
                ChangeSet {
                    warehouses: vec![Versioned::new(warehouse.clone())],
                    ..ChangeSet::default()
                },
            )
            .await?;
        info!(tenant_id = %tenant_id, warehouse = %warehouse.name, "warehouse created");
        Ok(warehouse)
    }

    pub async fn update_warehouse(
        &self,
        principal: &Principal,
        id: WarehouseId,
        patch: WarehousePatch,
    ) -> ServiceResult<Warehouse> {
        require(principal, &policy::WAREHOUSES_WRITE)?;
        let tenant_id = tenant(principal);
        self.with_retry("update_warehouse", || {
            let patch = patch.clone();
            async move {
                let mut warehouse = self.require_warehouse(tenant_id, id).await?;
                let loaded_version = warehouse.version;
                warehouse.update(patch, Utc::now())?;
                self.save_warehouse(tenant_id, &warehouse, loaded_version).await?;
                Ok(warehouse)
            }
        })
        .await
    }

    /// Archive an empty warehouse.
    pub async fn archive_warehouse(
        &self,
        principal: &Principal,
        id: WarehouseId,
    ) -> ServiceResult<Warehouse> {
        require(principal, &policy::WAREHOUSES_WRITE)?;
        let tenant_id = tenant(principal);
        self.with_retry("archive_warehouse", || async move {
            let mut warehouse = self.require_warehouse(tenant_id, id).await?;
            let loaded_version = warehouse.version;
            let on_hand: i64 = self
                .store
                .list_balances(
                    tenant_id,
                    BalanceFilter {
                        warehouse_id: Some(id),
                        ..BalanceFilter::default()
                    },
                )
                .await?
                .iter()
                .map(|b| b.quantity)
                .sum();
            warehouse.archive(on_hand, Utc::now())?;
            self.save_warehouse(tenant_id, &warehouse, loaded_version).await?;
            info!(tenant_id = %tenant_id, warehouse = %warehouse.name, "warehouse archived");
            Ok(warehouse)
        })
        .await
    }

    pub async fn restore_warehouse(
        &self,
        principal: &Principal,
        id: WarehouseId,
    ) -> ServiceResult<Warehouse> {
        require(principal, &policy::WAREHOUSES_WRITE)?;
        let tenant_id = tenant(principal);
        self.with_retry("restore_warehouse", || async move {
            let mut warehouse = self.require_warehouse(tenant_id, id).await?;
            let loaded_version = warehouse.version;
            warehouse.restore(Utc::now())?;
            self.save_warehouse(tenant_id, &warehouse, loaded_version).await?;
            info!(tenant_id = %tenant_id, warehouse = %warehouse.name, "warehouse restored");
            Ok(warehouse)
        })
        .await
    }

    async fn save_warehouse(
        &self,
        tenant_id: TenantId,
        warehouse: &Warehouse,
        loaded_version: u64,
    ) -> ServiceResult<()> {
        self.store
            .commit(
                tenant_id,
                ChangeSet {
                    warehouses: vec![Versioned::updated(warehouse.clone(), loaded_version)],
                    ..ChangeSet::default()
                },
            )
            .await?;
        Ok(())
    }
}
