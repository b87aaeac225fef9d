use std::sync::Arc;

use axum::{Json, Router, extract::Extension, routing::get};

use warehub_inventory::{LowStockEntry, StockBalance};

use crate::app::dto::BalanceQuery;
use crate::app::errors::{ApiQuery, ApiResult};
use crate::app::services::AppServices;
use crate::authz::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_balances))
        .route("/low-stock", get(low_stock))
}

pub async fn list_balances(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(query): ApiQuery<BalanceQuery>,
) -> ApiResult<Json<Vec<StockBalance>>> {
    let filter = query.into_filter()?;
    Ok(Json(services.list_balances(&principal, filter).await?))
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Vec<LowStockEntry>>> {
    Ok(Json(services.low_stock(&principal).await?))
}
