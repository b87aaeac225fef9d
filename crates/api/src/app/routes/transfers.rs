use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use warehub_transfers::{NewTransfer, RejectedGoods, Transfer};

use crate::app::dto::TransferStatusRequest;
use crate::app::errors::{ApiJson, ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::authz::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transfers).post(create_transfer))
        .route("/:id", get(get_transfer))
        .route("/:id/status", post(change_status))
        .route("/:id/rejected-goods", get(rejected_goods))
}

pub async fn list_transfers(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Vec<Transfer>>> {
    Ok(Json(services.list_transfers(&principal).await?))
}

pub async fn create_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<NewTransfer>,
) -> ApiResult<(StatusCode, Json<Transfer>)> {
    let transfer = services.create_transfer(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

pub async fn get_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Transfer>> {
    let id = parse_id(&id, "transfer")?;
    Ok(Json(services.get_transfer(&principal, id).await?))
}

pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<TransferStatusRequest>,
) -> ApiResult<Json<Transfer>> {
    let id = parse_id(&id, "transfer")?;
    let request = body.into_transition()?;
    Ok(Json(services.transition_transfer(&principal, id, request).await?))
}

pub async fn rejected_goods(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<RejectedGoods>>> {
    let id = parse_id(&id, "transfer")?;
    Ok(Json(services.list_rejected_goods(&principal, id).await?))
}
