use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehub_core::{AggregateRoot, DomainError, DomainResult, UserId};

warehub_core::entity_id!(
    /// Warehouse identifier.
    WarehouseId,
    "WarehouseId"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseStatus {
    Active,
    Archived,
}

impl WarehouseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseStatus::Active => "active",
            WarehouseStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "active" => Ok(WarehouseStatus::Active),
            "archived" => Ok(WarehouseStatus::Archived),
            other => Err(DomainError::validation(format!("unknown warehouse status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub location: Option<String>,
    /// Maximum units held across all items; `None` is unbounded.
    pub capacity: Option<i64>,
    pub manager_id: Option<UserId>,
    pub status: WarehouseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub name: String,
    pub location: Option<String>,
    pub capacity: Option<i64>,
    pub manager_id: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehousePatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<i64>,
    pub manager_id: Option<UserId>,
}

fn require_capacity(capacity: Option<i64>) -> DomainResult<Option<i64>> {
    match capacity {
        Some(c) if c <= 0 => Err(DomainError::validation("capacity must be positive")),
        other => Ok(other),
    }
}

impl Warehouse {
    pub fn create(input: NewWarehouse, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(Self {
            id: WarehouseId::new(),
            name: name.to_string(),
            location: input.location,
            capacity: require_capacity(input.capacity)?,
            manager_id: input.manager_id,
            status: WarehouseStatus::Active,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    pub fn update(&mut self, patch: WarehousePatch, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DomainError::validation("name cannot be empty"));
            }
            self.name = name.to_string();
        }
        if let Some(location) = patch.location {
            self.location = Some(location);
        }
        if patch.capacity.is_some() {
            self.capacity = require_capacity(patch.capacity)?;
        }
        if let Some(manager) = patch.manager_id {
            self.manager_id = Some(manager);
        }
        self.updated_at = now;
        self.version += 1;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == WarehouseStatus::Active
    }

    pub fn is_managed_by(&self, user: UserId) -> bool {
        self.manager_id == Some(user)
    }

    /// Archive the warehouse. Callers must ensure it no longer holds stock.
    pub fn archive(&mut self, on_hand: i64, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::invariant("warehouse is already archived"));
        }
        if on_hand > 0 {
            return Err(DomainError::invariant(format!(
                "warehouse still holds {on_hand} units; move or dispose stock before archiving"
            )));
        }
        self.status = WarehouseStatus::Archived;
        self.updated_at = now;
        self.version += 1;
        Ok(())
    }

    pub fn restore(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_active() {
            return Err(DomainError::invariant("warehouse is not archived"));
        }
        self.status = WarehouseStatus::Active;
        self.updated_at = now;
        self.version += 1;
        Ok(())
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::invariant(format!(
                "warehouse '{}' is archived",
                self.name
            )));
        }
        Ok(())
    }

    /// Note that stock entered or left the warehouse.
    ///
    /// Stock writes carry the warehouse version, so they conflict with each
    /// other and with archive or capacity edits on the same warehouse.
    pub fn record_stock_change(&mut self) {
        self.version += 1;
    }

    /// Check that receiving `incoming` units on top of `on_hand` fits.
    pub fn ensure_capacity(&self, on_hand: i64, incoming: i64) -> DomainResult<()> {
        if let Some(capacity) = self.capacity {
            if on_hand + incoming > capacity {
                return Err(DomainError::invariant(format!(
                    "warehouse '{}' capacity exceeded ({} + {} > {})",
                    self.name, on_hand, incoming, capacity
                )));
            }
        }
        Ok(())
    }
}

impl AggregateRoot for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
