use std::sync::Arc;

use axum::{Json, Router, extract::Extension, routing::get};

use warehub_inventory::{StockSummaryLine, Transaction, ValuationReport};

use crate::app::dto::{MovementQuery, ValuationParams};
use crate::app::errors::{ApiQuery, ApiResult};
use crate::app::services::AppServices;
use crate::authz::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/valuation", get(valuation))
        .route("/stock-summary", get(stock_summary))
        .route("/movements", get(movements))
}

pub async fn valuation(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(params): ApiQuery<ValuationParams>,
) -> ApiResult<Json<ValuationReport>> {
    let query = params.into_query()?;
    Ok(Json(services.valuation(&principal, query).await?))
}

pub async fn stock_summary(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Vec<StockSummaryLine>>> {
    Ok(Json(services.stock_summary(&principal).await?))
}

pub async fn movements(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(query): ApiQuery<MovementQuery>,
) -> ApiResult<Json<Vec<Transaction>>> {
    let filter = query.into_filter()?;
    Ok(Json(services.movement_report(&principal, filter).await?))
}
