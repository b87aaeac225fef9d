//! Read-only reports over items, balances and the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use warehub_auth::{Principal, policy};
use warehub_inventory::{
    MovementFilter, StockSummaryLine, Transaction, TransactionStatus, ValuationReport, WarehouseId,
    resolve_method, stock_summary, value_inventory,
};

use super::{ServiceResult, Services, require, tenant};
use crate::store::BalanceFilter;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationQuery {
    /// Defaults to now.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    /// Overrides the tenant's configured method.
    #[serde(default)]
    pub method: Option<String>,
}

impl Services {
    pub async fn valuation(
        &self,
        principal: &Principal,
        query: ValuationQuery,
    ) -> ServiceResult<ValuationReport> {
        require(principal, &policy::REPORTS_READ)?;
        let tenant_id = tenant(principal);
        let settings = self.settings(tenant_id).await?;
        let method = resolve_method(query.method.as_deref(), settings.valuation_method)?;
        if let Some(id) = query.warehouse_id {
            self.require_warehouse(tenant_id, id).await?;
        }
        let as_of = query.as_of.unwrap_or_else(Utc::now);

        let items = self.store.list_items(tenant_id).await?;
        let ledger = self
            .store
            .list_transactions(
                tenant_id,
                &MovementFilter {
                    status: Some(TransactionStatus::Completed),
                    to: Some(as_of),
                    ..MovementFilter::default()
                },
            )
            .await?;
        debug!(
            tenant_id = %tenant_id,
            method = method.as_str(),
            rows = ledger.len(),
            "valuing inventory"
        );
        Ok(value_inventory(&items, &ledger, method, query.warehouse_id, as_of))
    }

    pub async fn stock_summary(&self, principal: &Principal) -> ServiceResult<Vec<StockSummaryLine>> {
        require(principal, &policy::REPORTS_READ)?;
        let tenant_id = tenant(principal);
        let items = self.store.list_items(tenant_id).await?;
        let warehouses = self.store.list_warehouses(tenant_id).await?;
        let balances = self
            .store
            .list_balances(tenant_id, BalanceFilter::default())
            .await?;
        Ok(stock_summary(&items, &warehouses, &balances))
    }

    /// Ledger history for reporting; same filters as the transaction listing.
    pub async fn movement_report(
        &self,
        principal: &Principal,
        filter: MovementFilter,
    ) -> ServiceResult<Vec<Transaction>> {
        require(principal, &policy::REPORTS_READ)?;
        filter.validate()?;
        Ok(self.store.list_transactions(tenant(principal), &filter).await?)
    }
}
