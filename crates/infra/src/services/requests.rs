//! Stock requests: creation, the approval chain and fulfillment.

use chrono::Utc;
use tracing::info;

use warehub_auth::{Principal, authorize, policy};
use warehub_core::TenantId;
use warehub_inventory::WarehouseId;
use warehub_requests::{
    ApprovalOutcome, NewRequest, Request, RequestActor, RequestId, plan_fulfillment,
};

use super::stock::completed_rows;
use super::{ServiceError, ServiceResult, Services, require, tenant};
use crate::notifications::{Notification, NotificationKind};
use crate::store::{ChangeSet, Versioned};

/// Users who cannot approve only ever see their own requests.
fn visible_to(principal: &Principal, request: &Request) -> bool {
    request.requested_by == principal.user_id
        || authorize(principal, &policy::REQUESTS_APPROVE).is_ok()
}

impl Services {
    pub async fn list_requests(&self, principal: &Principal) -> ServiceResult<Vec<Request>> {
        require(principal, &policy::REQUESTS_READ)?;
        let requests = self.store.list_requests(tenant(principal)).await?;
        Ok(requests
            .into_iter()
            .filter(|r| visible_to(principal, r))
            .collect())
    }

    pub async fn get_request(&self, principal: &Principal, id: RequestId) -> ServiceResult<Request> {
        require(principal, &policy::REQUESTS_READ)?;
        let request = self.require_request(tenant(principal), id).await?;
        if !visible_to(principal, &request) {
            return Err(ServiceError::NotFound("request"));
        }
        Ok(request)
    }

    pub async fn create_request(
        &self,
        principal: &Principal,
        input: NewRequest,
    ) -> ServiceResult<Request> {
        require(principal, &policy::REQUESTS_WRITE)?;
        let tenant_id = tenant(principal);
        self.require_warehouse(tenant_id, input.warehouse_id)
            .await?
            .ensure_active()?;
        for item in &input.items {
            self.require_item(tenant_id, item.item_id).await?;
        }

        let request = Request::create(input, principal.user_id, Utc::now())?;
        self.store
            .commit(
                tenant_id,
                ChangeSet {
                    requests: vec![Versioned::new(request.clone())],
                    ..ChangeSet::default()
                },
            )
            .await?;
        info!(
            tenant_id = %tenant_id,
            code = %request.code,
            items = request.items.len(),
            "stock request created"
        );
        Ok(request)
    }

    /// Approve a request. Final approval fulfils it from stock in the same
    /// commit.
    pub async fn approve_request(
        &self,
        principal: &Principal,
        id: RequestId,
        comment: Option<String>,
    ) -> ServiceResult<Request> {
        require(principal, &policy::REQUESTS_APPROVE)?;
        self.with_retry("approve_request", || {
            self.approve_once(principal, id, comment.clone())
        })
        .await
    }

    async fn approve_once(
        &self,
        principal: &Principal,
        id: RequestId,
        comment: Option<String>,
    ) -> ServiceResult<Request> {
        let tenant_id = tenant(principal);
        let now = Utc::now();
        let mut request = self.require_request(tenant_id, id).await?;
        let loaded_version = request.version;
        let actor = self.request_actor(tenant_id, principal, &request).await?;

        let outcome = request.approve(&actor, comment, now)?;
        let mut changes = if outcome == ApprovalOutcome::Approved {
            let warehouses = self.store.list_warehouses(tenant_id).await?;
            let ids: Vec<WarehouseId> = warehouses.iter().map(|w| w.id).collect();
            let mut ctx = self.stock_context(tenant_id, ids, now).await?;
            ctx.warehouse(request.warehouse_id)?.ensure_active()?;

            let fulfillment = plan_fulfillment(&request, &warehouses, &mut ctx.sheet)?;
            ctx.note_decrements(&fulfillment.movements);
            request.record_fulfillment(fulfillment.lines)?;

            let mut changes = self.stock_effects(tenant_id, &ctx, now).await?;
            changes.transactions = completed_rows(&fulfillment.movements, principal, now);
            changes
        } else {
            ChangeSet::default()
        };

        changes.notifications.push(Notification::new(
            NotificationKind::RequestStatus,
            Some(request.requested_by),
            format!("Request {} is now {}", request.code, request.status.as_str()),
            Some(request.code.to_string()),
            now,
        ));
        changes.requests = vec![Versioned::updated(request.clone(), loaded_version)];
        self.commit(tenant_id, changes).await?;
        info!(
            tenant_id = %tenant_id,
            code = %request.code,
            status = request.status.as_str(),
            fulfilled_lines = request.fulfillment.len(),
            "stock request approved"
        );
        Ok(request)
    }

    pub async fn reject_request(
        &self,
        principal: &Principal,
        id: RequestId,
        comment: Option<String>,
    ) -> ServiceResult<Request> {
        require(principal, &policy::REQUESTS_APPROVE)?;
        let tenant_id = tenant(principal);
        self.with_retry("reject_request", || {
            let comment = comment.clone();
            async move {
                let now = Utc::now();
                let mut request = self.require_request(tenant_id, id).await?;
                let loaded_version = request.version;
                let actor = self.request_actor(tenant_id, principal, &request).await?;
                request.reject(&actor, comment, now)?;
                self.save_request(tenant_id, &request, loaded_version, true).await?;
                info!(tenant_id = %tenant_id, code = %request.code, "stock request rejected");
                Ok(request)
            }
        })
        .await
    }

    /// Withdraw a pending request; only its requester may do so.
    pub async fn cancel_request(&self, principal: &Principal, id: RequestId) -> ServiceResult<Request> {
        require(principal, &policy::REQUESTS_WRITE)?;
        let tenant_id = tenant(principal);
        self.with_retry("cancel_request", || async move {
            let mut request = self.require_request(tenant_id, id).await?;
            if !visible_to(principal, &request) {
                return Err(ServiceError::NotFound("request"));
            }
            let loaded_version = request.version;
            request.cancel(principal.user_id, Utc::now())?;
            self.save_request(tenant_id, &request, loaded_version, false).await?;
            info!(tenant_id = %tenant_id, code = %request.code, "stock request cancelled");
            Ok(request)
        })
        .await
    }

    async fn require_request(&self, tenant_id: TenantId, id: RequestId) -> ServiceResult<Request> {
        self.store
            .get_request(tenant_id, id)
            .await?
            .ok_or(ServiceError::NotFound("request"))
    }

    async fn request_actor(
        &self,
        tenant_id: TenantId,
        principal: &Principal,
        request: &Request,
    ) -> ServiceResult<RequestActor> {
        let warehouse = self.require_warehouse(tenant_id, request.warehouse_id).await?;
        Ok(RequestActor {
            user_id: principal.user_id,
            is_admin: principal.is_admin(),
            manages_warehouse: warehouse.is_managed_by(principal.user_id),
        })
    }

    async fn save_request(
        &self,
        tenant_id: TenantId,
        request: &Request,
        loaded_version: u64,
        notify_requester: bool,
    ) -> ServiceResult<()> {
        let mut changes = ChangeSet {
            requests: vec![Versioned::updated(request.clone(), loaded_version)],
            ..ChangeSet::default()
        };
        if notify_requester {
            changes.notifications.push(Notification::new(
                NotificationKind::RequestStatus,
                Some(request.requested_by),
                format!("Request {} is now {}", request.code, request.status.as_str()),
                Some(request.code.to_string()),
                request.updated_at,
            ));
        }
        self.commit(tenant_id, changes).await
    }
}
