use axum::{Router, routing::get};

pub mod inventory;
pub mod items;
pub mod notifications;
pub mod reports;
pub mod requests;
pub mod sales;
pub mod settings;
pub mod system;
pub mod transactions;
pub mod transfers;
pub mod warehouses;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/items", items::router())
        .nest("/warehouses", warehouses::router())
        .nest("/inventory", inventory::router())
        .nest("/transactions", transactions::router())
        .nest("/transfers", transfers::router())
        .nest("/requests", requests::router())
        .nest("/sales", sales::router())
        .nest("/reports", reports::router())
        .nest("/notifications", notifications::router())
        .nest("/settings", settings::router())
}
