//! Service wiring: store selection, the realtime channel and the SSE stream.

use std::{convert::Infallible, sync::Arc, time::Duration};

use anyhow::Context;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::{info, warn};

use warehub_core::{TenantId, UserId};
use warehub_infra::config::AppConfig;
use warehub_infra::notifications::{Notification, NotificationSink};
use warehub_infra::services::Services;
use warehub_infra::store::{InMemoryStore, PostgresStore, Store};

/// Capacity of the realtime broadcast channel; slow subscribers drop messages.
const REALTIME_CHANNEL_CAPACITY: usize = 1024;

/// Realtime message broadcast via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    /// `None` reaches everyone in the tenant.
    pub recipient: Option<UserId>,
    pub topic: String,
    pub payload: serde_json::Value,
}

impl RealtimeMessage {
    pub fn is_for(&self, tenant_id: TenantId, user_id: UserId) -> bool {
        self.tenant_id == tenant_id && self.recipient.is_none_or(|r| r == user_id)
    }
}

/// Notification sink that fans committed notifications out to SSE
/// subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<RealtimeMessage>,
}

impl NotificationSink for BroadcastSink {
    fn publish(&self, tenant_id: TenantId, notification: &Notification) {
        let payload = match serde_json::to_value(notification) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to encode notification");
                return;
            }
        };
        // Lossy: no subscribers is not an error.
        let _ = self.tx.send(RealtimeMessage {
            tenant_id,
            recipient: notification.recipient,
            topic: notification.kind.as_str().to_string(),
            payload,
        });
    }
}

#[derive(Clone)]
pub struct AppServices {
    services: Services,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>, conflict_retries: u32) -> Self {
        let (realtime_tx, _) = broadcast::channel(REALTIME_CHANNEL_CAPACITY);
        let sink = BroadcastSink {
            tx: realtime_tx.clone(),
        };
        let services = Services::new(store, Arc::new(sink)).with_conflict_retries(conflict_retries);
        Self {
            services,
            realtime_tx,
        }
    }

    /// In-memory store; nothing survives a restart.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), warehub_infra::config::DEFAULT_CONFLICT_RETRIES)
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }
}

impl std::ops::Deref for AppServices {
    type Target = Services;

    fn deref(&self) -> &Self::Target {
        &self.services
    }
}

/// Build services from configuration, connecting and migrating Postgres when
/// persistent stores are enabled.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn Store> = if config.use_persistent_stores {
        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
        let store = PostgresStore::connect(url, config.db_max_connections)
            .await
            .context("failed to connect to postgres")?;
        store.migrate().await.context("failed to apply schema")?;
        info!(max_connections = config.db_max_connections, "using postgres store");
        Arc::new(store)
    } else {
        info!("using in-memory store");
        Arc::new(InMemoryStore::new())
    };
    Ok(AppServices::new(store, config.conflict_retries))
}

/// SSE stream of the realtime messages one user may see: their own plus
/// tenant-wide ones.
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
    user_id: UserId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.is_for(tenant_id, user_id) => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
