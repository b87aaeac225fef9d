//! Stock balances and the working copy used to plan multi-line movements.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehub_core::{DomainError, DomainResult, ExpectedVersion};

use crate::{ItemId, StockMovement, WarehouseId};

/// On-hand quantity of one item in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl StockBalance {
    /// A balance row that has never been persisted.
    pub fn empty(item_id: ItemId, warehouse_id: WarehouseId, now: DateTime<Utc>) -> Self {
        Self {
            item_id,
            warehouse_id,
            quantity: 0,
            version: 0,
            updated_at: now,
        }
    }

    pub fn key(&self) -> (ItemId, WarehouseId) {
        (self.item_id, self.warehouse_id)
    }

    /// Apply a signed change. Quantity never goes below zero.
    pub fn apply_delta(&mut self, delta: i64, now: DateTime<Utc>) -> DomainResult<()> {
        let next = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        if next < 0 {
            return Err(DomainError::invariant(format!(
                "insufficient stock: {} on hand, {} requested",
                self.quantity, -delta
            )));
        }
        self.quantity = next;
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    balance: StockBalance,
    loaded_version: u64,
}

/// Balances touched by one operation.
///
/// Load the rows an operation may read, apply movements, then hand
/// [`BalanceSheet::changes`] to the store with the versions they were loaded
/// at. Pairs that were never loaded start at zero and are written as new rows.
#[derive(Debug, Clone)]
pub struct BalanceSheet {
    entries: BTreeMap<(ItemId, WarehouseId), Entry>,
    now: DateTime<Utc>,
}

impl BalanceSheet {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            entries: BTreeMap::new(),
            now,
        }
    }

    pub fn load(balances: impl IntoIterator<Item = StockBalance>, now: DateTime<Utc>) -> Self {
        let mut sheet = Self::new(now);
        for balance in balances {
            sheet.entries.insert(
                balance.key(),
                Entry {
                    loaded_version: balance.version,
                    balance,
                },
            );
        }
        sheet
    }

    pub fn quantity(&self, item_id: ItemId, warehouse_id: WarehouseId) -> i64 {
        self.entries
            .get(&(item_id, warehouse_id))
            .map(|e| e.balance.quantity)
            .unwrap_or(0)
    }

    /// Total on hand in one warehouse across all loaded items.
    pub fn warehouse_total(&self, warehouse_id: WarehouseId) -> i64 {
        self.entries
            .iter()
            .filter(|((_, w), _)| *w == warehouse_id)
            .map(|(_, e)| e.balance.quantity)
            .sum()
    }

    fn entry_mut(&mut self, item_id: ItemId, warehouse_id: WarehouseId) -> &mut Entry {
        let now = self.now;
        self.entries
            .entry((item_id, warehouse_id))
            .or_insert_with(|| Entry {
                balance: StockBalance::empty(item_id, warehouse_id, now),
                loaded_version: 0,
            })
    }

    pub fn apply_delta(
        &mut self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
        delta: i64,
    ) -> DomainResult<()> {
        let now = self.now;
        self.entry_mut(item_id, warehouse_id)
            .balance
            .apply_delta(delta, now)
    }

    /// Apply every delta of a movement; on failure the sheet is left unchanged.
    pub fn apply(&mut self, movement: &StockMovement) -> DomainResult<()> {
        let mut staged = self.clone();
        for (warehouse_id, delta) in movement.deltas() {
            staged.apply_delta(movement.item_id, warehouse_id, delta)?;
        }
        *self = staged;
        Ok(())
    }

    /// Rows that differ from what was loaded, each with the version to expect
    /// in the store.
    pub fn changes(&self) -> Vec<(StockBalance, ExpectedVersion)> {
        self.entries
            .values()
            .filter(|e| e.balance.version != e.loaded_version)
            .map(|e| {
                (
                    e.balance.clone(),
                    ExpectedVersion::Exact(e.loaded_version),
                )
            })
            .collect()
    }

    pub fn balances(&self) -> impl Iterator<Item = &StockBalance> {
        self.entries.values().map(|e| &e.balance)
    }
}
