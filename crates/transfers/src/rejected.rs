//! Goods refused by a destination warehouse, awaiting return or disposal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehub_core::{DomainError, DomainResult};
use warehub_inventory::{ItemId, WarehouseId};

use crate::TransferId;

warehub_core::entity_id!(RejectedGoodsId, "RejectedGoodsId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectedGoodsStatus {
    PendingDisposition,
    Returned,
    Disposed,
}

impl RejectedGoodsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectedGoodsStatus::PendingDisposition => "pending_disposition",
            RejectedGoodsStatus::Returned => "returned",
            RejectedGoodsStatus::Disposed => "disposed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending_disposition" => Ok(RejectedGoodsStatus::PendingDisposition),
            "returned" => Ok(RejectedGoodsStatus::Returned),
            "disposed" => Ok(RejectedGoodsStatus::Disposed),
            other => Err(DomainError::validation(format!(
                "unknown rejected goods status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedGoods {
    pub id: RejectedGoodsId,
    pub transfer_id: TransferId,
    pub item_id: ItemId,
    /// Warehouse the goods belong to (the transfer's source).
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub reason: Option<String>,
    pub status: RejectedGoodsStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RejectedGoods {
    fn settle(&mut self, status: RejectedGoodsStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != RejectedGoodsStatus::PendingDisposition {
            return Err(DomainError::invariant(format!(
                "rejected goods already {}",
                self.status.as_str()
            )));
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_returned(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.settle(RejectedGoodsStatus::Returned, now)
    }

    pub fn mark_disposed(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.settle(RejectedGoodsStatus::Disposed, now)
    }
}
