use std::sync::Arc;

use axum::{Json, Router, extract::Extension, routing::get};

use warehub_infra::settings::{OrganizationSettings, SettingsPatch};

use crate::app::errors::{ApiJson, ApiResult};
use crate::app::services::AppServices;
use crate::authz::CurrentPrincipal;

pub fn router() -> Router {
    Router::new().route("/", get(get_settings).put(update_settings))
}

pub async fn get_settings(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<OrganizationSettings>> {
    Ok(Json(services.get_settings(&principal).await?))
}

pub async fn update_settings(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<SettingsPatch>,
) -> ApiResult<Json<OrganizationSettings>> {
    Ok(Json(services.update_settings(&principal, body).await?))
}
