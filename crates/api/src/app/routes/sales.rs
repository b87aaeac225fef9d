use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use warehub_sales::{NewOrderLine, NewSalesOrder, SalesOrder};

use crate::app::errors::{ApiJson, ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::authz::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/lines", post(add_line))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/fulfil", post(fulfil_order))
        .route("/:id/cancel", post(cancel_order))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Vec<SalesOrder>>> {
    Ok(Json(services.list_sales_orders(&principal).await?))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<NewSalesOrder>,
) -> ApiResult<(StatusCode, Json<SalesOrder>)> {
    let order = services.create_sales_order(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<SalesOrder>> {
    let id = parse_id(&id, "sales order")?;
    Ok(Json(services.get_sales_order(&principal, id).await?))
}

pub async fn add_line(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NewOrderLine>,
) -> ApiResult<Json<SalesOrder>> {
    let id = parse_id(&id, "sales order")?;
    Ok(Json(services.add_order_line(&principal, id, body).await?))
}

pub async fn confirm_order(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<SalesOrder>> {
    let id = parse_id(&id, "sales order")?;
    Ok(Json(services.confirm_sales_order(&principal, id).await?))
}

pub async fn fulfil_order(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<SalesOrder>> {
    let id = parse_id(&id, "sales order")?;
    Ok(Json(services.fulfil_sales_order(&principal, id).await?))
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<SalesOrder>> {
    let id = parse_id(&id, "sales order")?;
    Ok(Json(services.cancel_sales_order(&principal, id).await?))
}
