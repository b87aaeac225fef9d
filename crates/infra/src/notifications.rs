//! In-app notifications and the realtime sink they are pushed to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehub_core::{DomainError, DomainResult, TenantId, UserId};

warehub_core::entity_id!(NotificationId, "NotificationId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LowStock,
    TransferStatus,
    RequestStatus,
    SalesOrder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::LowStock => "low_stock",
            NotificationKind::TransferStatus => "transfer_status",
            NotificationKind::RequestStatus => "request_status",
            NotificationKind::SalesOrder => "sales_order",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "low_stock" => Ok(NotificationKind::LowStock),
            "transfer_status" => Ok(NotificationKind::TransferStatus),
            "request_status" => Ok(NotificationKind::RequestStatus),
            "sales_order" => Ok(NotificationKind::SalesOrder),
            other => Err(DomainError::validation(format!("unknown notification kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    /// `None` addresses everyone in the tenant.
    pub recipient: Option<UserId>,
    pub kind: NotificationKind,
    pub message: String,
    /// Business code of the record that triggered it.
    pub reference: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        recipient: Option<UserId>,
        message: impl Into<String>,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            recipient,
            kind,
            message: message.into(),
            reference,
            read: false,
            created_at: now,
        }
    }

    pub fn is_visible_to(&self, user: UserId) -> bool {
        self.recipient.is_none_or(|r| r == user)
    }
}

/// Receives notifications after the change set carrying them has committed.
///
/// Delivery is best effort; implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, tenant_id: TenantId, notification: &Notification);
}

impl<S> NotificationSink for Arc<S>
where
    S: NotificationSink + ?Sized,
{
    fn publish(&self, tenant_id: TenantId, notification: &Notification) {
        (**self).publish(tenant_id, notification)
    }
}

/// Sink that drops everything (tests, batch tools).
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl NotificationSink for DiscardSink {
    fn publish(&self, _tenant_id: TenantId, _notification: &Notification) {}
}
