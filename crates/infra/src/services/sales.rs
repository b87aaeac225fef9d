//! Sales orders.

use chrono::Utc;
use tracing::info;

use warehub_auth::{Principal, policy};
use warehub_core::TenantId;
use warehub_sales::{NewOrderLine, NewSalesOrder, SalesOrder, SalesOrderId};

use super::stock::completed_rows;
use super::{ServiceError, ServiceResult, Services, require, require_scope, tenant};
use crate::notifications::{Notification, NotificationKind};
use crate::store::{ChangeSet, Versioned};

impl Services {
    pub async fn list_sales_orders(&self, principal: &Principal) -> ServiceResult<Vec<SalesOrder>> {
        require(principal, &policy::SALES_READ)?;
        Ok(self.store.list_sales_orders(tenant(principal)).await?)
    }

    pub async fn get_sales_order(
        &self,
        principal: &Principal,
        id: SalesOrderId,
    ) -> ServiceResult<SalesOrder> {
        require(principal, &policy::SALES_READ)?;
        self.require_sales_order(tenant(principal), id).await
    }

    pub async fn create_sales_order(
        &self,
        principal: &Principal,
        input: NewSalesOrder,
    ) -> ServiceResult<SalesOrder> {
        require(principal, &policy::SALES_WRITE)?;
        let tenant_id = tenant(principal);
        self.require_warehouse(tenant_id, input.warehouse_id)
            .await?
            .ensure_active()?;
        for line in &input.lines {
            self.require_item(tenant_id, line.item_id).await?;
        }

        let order = SalesOrder::create(input, principal.user_id, Utc::now())?;
        self.store
            .commit(
                tenant_id,
                ChangeSet {
                    sales_orders: vec![Versioned::new(order.clone())],
                    ..ChangeSet::default()
                },
            )
            .await?;
        info!(
            tenant_id = %tenant_id,
            code = %order.code,
            customer = %order.customer_name,
            "sales order created"
        );
        Ok(order)
    }

    pub async fn add_order_line(
        &self,
        principal: &Principal,
        id: SalesOrderId,
        line: NewOrderLine,
    ) -> ServiceResult<SalesOrder> {
        require(principal, &policy::SALES_WRITE)?;
        let tenant_id = tenant(principal);
        self.require_item(tenant_id, line.item_id).await?;
        self.with_retry("add_order_line", || {
            let line = line.clone();
            async move {
                let mut order = self.require_sales_order(tenant_id, id).await?;
                let loaded_version = order.version;
                order.add_line(line, Utc::now())?;
                self.save_order(tenant_id, &order, loaded_version).await?;
                Ok(order)
            }
        })
        .await
    }

    pub async fn confirm_sales_order(
        &self,
        principal: &Principal,
        id: SalesOrderId,
    ) -> ServiceResult<SalesOrder> {
        require(principal, &policy::SALES_WRITE)?;
        let tenant_id = tenant(principal);
        self.with_retry("confirm_sales_order", || async move {
            let mut order = self.require_sales_order(tenant_id, id).await?;
            let loaded_version = order.version;
            order.confirm(Utc::now())?;
            self.save_order(tenant_id, &order, loaded_version).await?;
            info!(tenant_id = %tenant_id, code = %order.code, total = %order.total(), "sales order confirmed");
            Ok(order)
        })
        .await
    }

    pub async fn cancel_sales_order(
        &self,
        principal: &Principal,
        id: SalesOrderId,
    ) -> ServiceResult<SalesOrder> {
        require(principal, &policy::SALES_WRITE)?;
        let tenant_id = tenant(principal);
        self.with_retry("cancel_sales_order", || async move {
            let mut order = self.require_sales_order(tenant_id, id).await?;
            let loaded_version = order.version;
            order.cancel(Utc::now())?;
            self.save_order(tenant_id, &order, loaded_version).await?;
            info!(tenant_id = %tenant_id, code = %order.code, "sales order cancelled");
            Ok(order)
        })
        .await
    }

    /// Ship a confirmed order: issue every line from the order's warehouse.
    pub async fn fulfil_sales_order(
        &self,
        principal: &Principal,
        id: SalesOrderId,
    ) -> ServiceResult<SalesOrder> {
        require(principal, &policy::SALES_WRITE)?;
        self.with_retry("fulfil_sales_order", || self.fulfil_once(principal, id))
            .await
    }

    async fn fulfil_once(&self, principal: &Principal, id: SalesOrderId) -> ServiceResult<SalesOrder> {
        let tenant_id = tenant(principal);
        let now = Utc::now();
        let mut order = self.require_sales_order(tenant_id, id).await?;
        let loaded_version = order.version;

        let mut ctx = self.stock_context(tenant_id, [order.warehouse_id], now).await?;
        require_scope(principal, ctx.warehouse(order.warehouse_id)?)?;
        let movements = order.fulfil(now)?;
        ctx.apply(&movements)?;
        let mut changes = self.stock_effects(tenant_id, &ctx, now).await?;
        changes.notifications.push(Notification::new(
            NotificationKind::SalesOrder,
            Some(order.created_by),
            format!("Sales order {} fulfilled", order.code),
            Some(order.code.to_string()),
            now,
        ));

        changes.sales_orders = vec![Versioned::updated(order.clone(), loaded_version)];
        changes.transactions = completed_rows(&movements, principal, now);
        self.commit(tenant_id, changes).await?;
        info!(
            tenant_id = %tenant_id,
            code = %order.code,
            lines = order.lines.len(),
            total = %order.total(),
            "sales order fulfilled"
        );
        Ok(order)
    }

    async fn require_sales_order(
        &self,
        tenant_id: TenantId,
        id: SalesOrderId,
    ) -> ServiceResult<SalesOrder> {
        self.store
            .get_sales_order(tenant_id, id)
            .await?
            .ok_or(ServiceError::NotFound("sales order"))
    }

    async fn save_order(
        &self,
        tenant_id: TenantId,
        order: &SalesOrder,
        loaded_version: u64,
    ) -> ServiceResult<()> {
        self.store
            .commit(
                tenant_id,
                ChangeSet {
                    sales_orders: vec![Versioned::updated(order.clone(), loaded_version)],
                    ..ChangeSet::default()
                },
            )
            .await?;
        Ok(())
    }
}
