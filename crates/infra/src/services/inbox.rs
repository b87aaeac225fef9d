//! Notifications inbox and organization settings.

use chrono::Utc;
use tracing::info;

use warehub_auth::{Principal, policy};

use super::{ServiceError, ServiceResult, Services, require, tenant};
use crate::notifications::{Notification, NotificationId};
use crate::settings::{OrganizationSettings, SettingsPatch};
use crate::store::ChangeSet;

impl Services {
    /// The caller's own notifications plus tenant-wide ones, newest first.
    pub async fn list_notifications(&self, principal: &Principal) -> ServiceResult<Vec<Notification>> {
        require(principal, &policy::NOTIFICATIONS_READ)?;
        Ok(self
            .store
            .list_notifications(tenant(principal), principal.user_id)
            .await?)
    }

    pub async fn mark_notification_read(
        &self,
        principal: &Principal,
        id: NotificationId,
    ) -> ServiceResult<Notification> {
        require(principal, &policy::NOTIFICATIONS_READ)?;
        let tenant_id = tenant(principal);
        let mut notification = self
            .store
            .get_notification(tenant_id, id)
            .await?
            .filter(|n| n.is_visible_to(principal.user_id))
            .ok_or(ServiceError::NotFound("notification"))?;
        if notification.read {
            return Ok(notification);
        }
        notification.read = true;
        // Read flags are not republished to the sink.
        self.store
            .commit(
                tenant_id,
                ChangeSet {
                    notifications: vec![notification.clone()],
                    ..ChangeSet::default()
                },
            )
            .await?;
        Ok(notification)
    }

    pub async fn get_settings(&self, principal: &Principal) -> ServiceResult<OrganizationSettings> {
        require(principal, &policy::SETTINGS_READ)?;
        self.settings(tenant(principal)).await
    }

    pub async fn update_settings(
        &self,
        principal: &Principal,
        patch: SettingsPatch,
    ) -> ServiceResult<OrganizationSettings> {
        require(principal, &policy::SETTINGS_WRITE)?;
        let tenant_id = tenant(principal);
        let mut settings = self.settings(tenant_id).await?;
        settings.apply(patch, Utc::now());
        self.store
            .commit(
                tenant_id,
                ChangeSet {
                    settings: Some(settings.clone()),
                    ..ChangeSet::default()
                },
            )
            .await?;
        info!(
            tenant_id = %tenant_id,
            valuation_method = settings.valuation_method.as_str(),
            low_stock_notifications = settings.low_stock_notifications,
            "organization settings updated"
        );
        Ok(settings)
    }
}
