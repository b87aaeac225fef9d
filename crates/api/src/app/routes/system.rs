use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{Sse, sse::Event as SseEvent},
};

use crate::app::dto::WhoAmI;
use crate::app::services::{self, AppServices};
use crate::authz::CurrentPrincipal;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(CurrentPrincipal(principal): CurrentPrincipal) -> Json<WhoAmI> {
    Json(WhoAmI::from(&principal))
}

pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    services::tenant_sse_stream(services, principal.active_tenant_id, principal.user_id)
}
