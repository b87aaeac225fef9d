use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehub_core::{AggregateRoot, DomainError, DomainResult};

warehub_core::entity_id!(
    /// Inventory item identifier.
    ItemId,
    "ItemId"
);

/// Catalog item. Identity for users is the SKU (unique per tenant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub description: Option<String>,
    /// Balances at or below this level are reported as low stock (0 disables).
    pub min_stock_level: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// Input for creating an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub sku: String,
    pub name: String,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub min_stock_level: Option<i64>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub min_stock_level: Option<i64>,
    pub active: Option<bool>,
}

/// Canonical SKU form: trimmed, upper-case.
pub fn normalize_sku(raw: &str) -> DomainResult<String> {
    let sku = raw.trim().to_uppercase();
    if sku.is_empty() {
        return Err(DomainError::validation("sku cannot be empty"));
    }
    if sku.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("sku cannot contain whitespace"));
    }
    Ok(sku)
}

fn require_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(name.to_string())
}

fn require_min_level(level: i64) -> DomainResult<i64> {
    if level < 0 {
        return Err(DomainError::validation("min_stock_level cannot be negative"));
    }
    Ok(level)
}

impl Item {
    pub fn create(input: NewItem, now: DateTime<Utc>) -> DomainResult<Self> {
        let unit = match input.unit {
            Some(u) if !u.trim().is_empty() => u.trim().to_string(),
            Some(_) => return Err(DomainError::validation("unit cannot be empty")),
            None => "pcs".to_string(),
        };

        Ok(Self {
            id: ItemId::new(),
            sku: normalize_sku(&input.sku)?,
            name: require_name(&input.name)?,
            unit,
            description: input.description,
            min_stock_level: require_min_level(input.min_stock_level.unwrap_or(0))?,
            active: true,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    pub fn update(&mut self, patch: ItemPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(sku) = patch.sku {
            self.sku = normalize_sku(&sku)?;
        }
        if let Some(name) = patch.name {
            self.name = require_name(&name)?;
        }
        if let Some(unit) = patch.unit {
            if unit.trim().is_empty() {
                return Err(DomainError::validation("unit cannot be empty"));
            }
            self.unit = unit.trim().to_string();
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(level) = patch.min_stock_level {
            self.min_stock_level = require_min_level(level)?;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        self.updated_at = now;
        self.version += 1;
        Ok(())
    }

    /// Low stock means at or below a non-zero minimum.
    pub fn is_low(&self, quantity: i64) -> bool {
        self.min_stock_level > 0 && quantity <= self.min_stock_level
    }
}

impl AggregateRoot for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
