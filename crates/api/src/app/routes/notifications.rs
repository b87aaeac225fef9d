use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    routing::{get, post},
};

use warehub_infra::notifications::Notification;

use crate::app::errors::{ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::authz::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", post(mark_read))
}

pub async fn list_notifications(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(services.list_notifications(&principal).await?))
}

pub async fn mark_read(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    let id = parse_id(&id, "notification")?;
    Ok(Json(services.mark_notification_read(&principal, id).await?))
}
