use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
};

use warehub_inventory::{Item, ItemPatch, NewItem};

use crate::app::errors::{ApiJson, ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::authz::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/:id", get(get_item).patch(update_item))
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Vec<Item>>> {
    Ok(Json(services.list_items(&principal).await?))
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<NewItem>,
) -> ApiResult<(StatusCode, Json<Item>)> {
    let item = services.create_item(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Item>> {
    let id = parse_id(&id, "item")?;
    Ok(Json(services.get_item(&principal, id).await?))
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ItemPatch>,
) -> ApiResult<Json<Item>> {
    let id = parse_id(&id, "item")?;
    Ok(Json(services.update_item(&principal, id, body).await?))
}
