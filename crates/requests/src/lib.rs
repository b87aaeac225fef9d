//! Stock requests: user-initiated demand for items at a warehouse, approved
//! through a manager/admin chain and fulfilled from stock on final approval.

pub mod fulfillment;
pub mod request;

pub use fulfillment::{plan_fulfillment, Fulfillment, FulfillmentKind, FulfillmentLine};
pub use request::{
    ApprovalDecision, ApprovalLevel, ApprovalOutcome, NewRequest, NewRequestItem, Request,
    RequestActor, RequestApproval, RequestId, RequestItem, RequestStatus,
};
