//! Query/body DTOs and their mapping onto service inputs.
//!
//! Query strings carry ids and times as plain strings so that malformed values
//! surface as 400s with a useful message.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use warehub_auth::Principal;
use warehub_inventory::{MovementFilter, TransactionKind, TransactionStatus};
use warehub_infra::services::ValuationQuery;
use warehub_infra::store::BalanceFilter;
use warehub_transfers::{LineQuantity, TransferStatus, TransitionRequest};

use crate::app::errors::{ApiError, ApiResult, parse_id};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct BalanceQuery {
    pub item_id: Option<String>,
    pub warehouse_id: Option<String>,
}

impl BalanceQuery {
    pub fn into_filter(self) -> ApiResult<BalanceFilter> {
        Ok(BalanceFilter {
            item_id: self.item_id.as_deref().map(|v| parse_id(v, "item")).transpose()?,
            warehouse_id: self
                .warehouse_id
                .as_deref()
                .map(|v| parse_id(v, "warehouse"))
                .transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementQuery {
    pub item_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub kind: Option<String>,
    pub status: Option<String>,
    pub reference: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl MovementQuery {
    pub fn into_filter(self) -> ApiResult<MovementFilter> {
        Ok(MovementFilter {
            item_id: self.item_id.as_deref().map(|v| parse_id(v, "item")).transpose()?,
            warehouse_id: self
                .warehouse_id
                .as_deref()
                .map(|v| parse_id(v, "warehouse"))
                .transpose()?,
            kind: self
                .kind
                .as_deref()
                .map(TransactionKind::parse)
                .transpose()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
            status: self
                .status
                .as_deref()
                .map(TransactionStatus::parse)
                .transpose()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
            reference: self.reference.filter(|r| !r.trim().is_empty()),
            from: self.from.as_deref().map(|v| parse_time(v, false)).transpose()?,
            to: self.to.as_deref().map(|v| parse_time(v, true)).transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ValuationParams {
    pub as_of: Option<String>,
    pub warehouse_id: Option<String>,
    pub method: Option<String>,
}

impl ValuationParams {
    pub fn into_query(self) -> ApiResult<ValuationQuery> {
        Ok(ValuationQuery {
            as_of: self.as_of.as_deref().map(|v| parse_time(v, true)).transpose()?,
            warehouse_id: self
                .warehouse_id
                .as_deref()
                .map(|v| parse_id(v, "warehouse"))
                .transpose()?,
            method: self.method,
        })
    }
}

/// Body of `POST /transfers/:id/status`.
#[derive(Debug, Deserialize)]
pub struct TransferStatusRequest {
    pub status: String,
    #[serde(default)]
    pub quantities: Vec<LineQuantity>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl TransferStatusRequest {
    pub fn into_transition(self) -> ApiResult<TransitionRequest> {
        let to = TransferStatus::parse(self.status.trim())
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(TransitionRequest {
            to,
            quantities: self.quantities,
            reason: self.reason,
            note: self.note,
        })
    }
}

/// Optional body of request approve/reject.
#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub comment: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub tenant_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl From<&Principal> for WhoAmI {
    fn from(p: &Principal) -> Self {
        Self {
            tenant_id: p.active_tenant_id.to_string(),
            user_id: p.user_id.to_string(),
            roles: p.membership.roles.iter().map(|r| r.as_str().to_string()).collect(),
            permissions: p
                .membership
                .permissions
                .iter()
                .map(|p| p.as_str().to_string())
                .collect(),
        }
    }
}

/// RFC3339 timestamp or a plain `YYYY-MM-DD` date (start or end of that day,
/// UTC).
pub fn parse_time(raw: &str, end_of_day: bool) -> ApiResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("invalid date '{raw}'")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        Some(NaiveTime::MIN)
    }
    .ok_or_else(|| ApiError::BadRequest(format!("invalid date '{raw}'")))?;
    Ok(date.and_time(time).and_utc())
}
