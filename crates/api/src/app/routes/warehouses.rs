use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use warehub_inventory::{NewWarehouse, Warehouse, WarehousePatch};

use crate::app::errors::{ApiJson, ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::authz::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_warehouses).post(create_warehouse))
        .route("/:id", get(get_warehouse).patch(update_warehouse))
        .route("/:id/archive", post(archive_warehouse))
        .route("/:id/restore", post(restore_warehouse))
}

pub async fn list_warehouses(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Vec<Warehouse>>> {
    Ok(Json(services.list_warehouses(&principal).await?))
}

pub async fn create_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<NewWarehouse>,
) -> ApiResult<(StatusCode, Json<Warehouse>)> {
    let warehouse = services.create_warehouse(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(warehouse)))
}

pub async fn get_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Warehouse>> {
    let id = parse_id(&id, "warehouse")?;
    Ok(Json(services.get_warehouse(&principal, id).await?))
}

pub async fn update_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<WarehousePatch>,
) -> ApiResult<Json<Warehouse>> {
    let id = parse_id(&id, "warehouse")?;
    Ok(Json(services.update_warehouse(&principal, id, body).await?))
}

pub async fn archive_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Warehouse>> {
    let id = parse_id(&id, "warehouse")?;
    Ok(Json(services.archive_warehouse(&principal, id).await?))
}

pub async fn restore_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Warehouse>> {
    let id = parse_id(&id, "warehouse")?;
    Ok(Json(services.restore_warehouse(&principal, id).await?))
}
