use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehub_core::{AggregateRoot, BusinessCode, DomainError, DomainResult, UserId};
use warehub_inventory::{ItemId, WarehouseId};

use crate::FulfillmentLine;

warehub_core::entity_id!(
    /// Stock request identifier.
    RequestId,
    "RequestId"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    ManagerApproved,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::ManagerApproved => "manager_approved",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "manager_approved" => Ok(RequestStatus::ManagerApproved),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown request status '{other}'"))),
        }
    }

    /// Still waiting on a decision.
    pub fn is_open(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::ManagerApproved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    Requester,
    Manager,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestApproval {
    pub approver: UserId,
    pub level: ApprovalLevel,
    pub decision: ApprovalDecision,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub item_id: ItemId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub code: BusinessCode,
    pub warehouse_id: WarehouseId,
    pub requested_by: UserId,
    pub items: Vec<RequestItem>,
    pub purpose: Option<String>,
    pub status: RequestStatus,
    pub approvals: Vec<RequestApproval>,
    /// Filled in on final approval.
    pub fulfillment: Vec<FulfillmentLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequestItem {
    pub item_id: ItemId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub warehouse_id: WarehouseId,
    pub items: Vec<NewRequestItem>,
    pub purpose: Option<String>,
}

/// The caller's standing relative to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestActor {
    pub user_id: UserId,
    pub is_admin: bool,
    /// Manages the requested warehouse.
    pub manages_warehouse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// First level passed; an admin still has to approve.
    ManagerApproved,
    /// Final approval; the caller must plan and record fulfillment.
    Approved,
}

impl Request {
    pub fn create(input: NewRequest, requested_by: UserId, now: DateTime<Utc>) -> DomainResult<Self> {
        if input.items.is_empty() {
            return Err(DomainError::validation("request requires at least one item"));
        }
        if input.items.iter().any(|i| i.quantity <= 0) {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(Self {
            id: RequestId::new(),
            code: BusinessCode::generate("REQ", now),
            warehouse_id: input.warehouse_id,
            requested_by,
            items: input
                .items
                .into_iter()
                .map(|i| RequestItem {
                    item_id: i.item_id,
                    quantity: i.quantity,
                })
                .collect(),
            purpose: input.purpose,
            status: RequestStatus::Pending,
            approvals: Vec::new(),
            fulfillment: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    fn ensure_open(&self) -> DomainResult<()> {
        if !self.status.is_open() {
            return Err(DomainError::invariant(format!(
                "request is already {}",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn record(
        &mut self,
        actor: UserId,
        level: ApprovalLevel,
        decision: ApprovalDecision,
        status: RequestStatus,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.approvals.push(RequestApproval {
            approver: actor,
            level,
            decision,
            comment,
            at: now,
        });
        self.status = status;
        self.updated_at = now;
        self.version += 1;
    }

    pub fn approve(
        &mut self,
        actor: &RequestActor,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<ApprovalOutcome> {
        self.ensure_open()?;
        if actor.is_admin {
            self.record(
                actor.user_id,
                ApprovalLevel::Admin,
                ApprovalDecision::Approved,
                RequestStatus::Approved,
                comment,
                now,
            );
            return Ok(ApprovalOutcome::Approved);
        }
        if !actor.manages_warehouse {
            return Err(DomainError::forbidden(
                "only the warehouse manager or an admin may approve",
            ));
        }
        if self.status == RequestStatus::ManagerApproved {
            return Err(DomainError::forbidden("request is awaiting admin approval"));
        }
        self.record(
            actor.user_id,
            ApprovalLevel::Manager,
            ApprovalDecision::Approved,
            RequestStatus::ManagerApproved,
            comment,
            now,
        );
        Ok(ApprovalOutcome::ManagerApproved)
    }

    pub fn reject(
        &mut self,
        actor: &RequestActor,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_open()?;
        let level = if actor.is_admin {
            ApprovalLevel::Admin
        } else if actor.manages_warehouse {
            ApprovalLevel::Manager
        } else {
            return Err(DomainError::forbidden(
                "only the warehouse manager or an admin may reject",
            ));
        };
        self.record(
            actor.user_id,
            level,
            ApprovalDecision::Rejected,
            RequestStatus::Rejected,
            comment,
            now,
        );
        Ok(())
    }

    pub fn cancel(&mut self, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if by != self.requested_by {
            return Err(DomainError::forbidden("only the requester may cancel"));
        }
        if self.status != RequestStatus::Pending {
            return Err(DomainError::invariant(format!(
                "cannot cancel a {} request",
                self.status.as_str()
            )));
        }
        self.record(
            by,
            ApprovalLevel::Requester,
            ApprovalDecision::Cancelled,
            RequestStatus::Cancelled,
            None,
            now,
        );
        Ok(())
    }

    /// Attach the planned fulfillment after final approval.
    pub fn record_fulfillment(&mut self, lines: Vec<FulfillmentLine>) -> DomainResult<()> {
        if self.status != RequestStatus::Approved {
            return Err(DomainError::invariant("only approved requests are fulfilled"));
        }
        self.fulfillment = lines;
        Ok(())
    }
}

impl AggregateRoot for Request {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
