use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use warehub_infra::services::{CheckIn, StockEntry};
use warehub_inventory::Transaction;

use crate::app::dto::MovementQuery;
use crate::app::errors::{ApiJson, ApiQuery, ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::authz::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transactions))
        .route("/check-in", post(check_in))
        .route("/issue", post(issue))
        .route("/disposal", post(dispose))
        .route("/:id", get(get_transaction))
        .route("/:id/confirm", post(confirm_transaction))
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(query): ApiQuery<MovementQuery>,
) -> ApiResult<Json<Vec<Transaction>>> {
    let filter = query.into_filter()?;
    Ok(Json(services.list_transactions(&principal, filter).await?))
}

pub async fn get_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Transaction>> {
    let id = parse_id(&id, "transaction")?;
    Ok(Json(services.get_transaction(&principal, id).await?))
}

pub async fn check_in(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<CheckIn>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let tx = services.check_in(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn issue(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<StockEntry>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let tx = services.issue(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn dispose(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<StockEntry>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let tx = services.dispose(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn confirm_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Transaction>> {
    let id = parse_id(&id, "transaction")?;
    Ok(Json(services.confirm_transaction(&principal, id).await?))
}
