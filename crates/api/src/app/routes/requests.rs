use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use warehub_requests::{NewRequest, Request};

use crate::app::dto::DecisionRequest;
use crate::app::errors::{ApiJson, ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::authz::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/:id", get(get_request))
        .route("/:id/approve", post(approve_request))
        .route("/:id/reject", post(reject_request))
        .route("/:id/cancel", post(cancel_request))
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Vec<Request>>> {
    Ok(Json(services.list_requests(&principal).await?))
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<NewRequest>,
) -> ApiResult<(StatusCode, Json<Request>)> {
    let request = services.create_request(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Request>> {
    let id = parse_id(&id, "request")?;
    Ok(Json(services.get_request(&principal, id).await?))
}

pub async fn approve_request(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    body: Option<ApiJson<DecisionRequest>>,
) -> ApiResult<Json<Request>> {
    let id = parse_id(&id, "request")?;
    let comment = body.and_then(|ApiJson(b)| b.comment);
    Ok(Json(services.approve_request(&principal, id, comment).await?))
}

pub async fn reject_request(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    body: Option<ApiJson<DecisionRequest>>,
) -> ApiResult<Json<Request>> {
    let id = parse_id(&id, "request")?;
    let comment = body.and_then(|ApiJson(b)| b.comment);
    Ok(Json(services.reject_request(&principal, id, comment).await?))
}

pub async fn cancel_request(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Request>> {
    let id = parse_id(&id, "request")?;
    Ok(Json(services.cancel_request(&principal, id).await?))
}
