//! Stock summary and low-stock listings built from current balances.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Item, ItemId, StockBalance, Warehouse, WarehouseId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseQuantity {
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummaryLine {
    pub item_id: ItemId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub min_stock_level: i64,
    pub total_quantity: i64,
    pub low_stock: bool,
    pub warehouses: Vec<WarehouseQuantity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockEntry {
    pub item_id: ItemId,
    pub sku: String,
    pub name: String,
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub quantity: i64,
    pub min_stock_level: i64,
}

/// Per-item totals with a per-warehouse breakdown, ordered by SKU.
///
/// Every active item is listed, including those with nothing on hand.
pub fn stock_summary(
    items: &[Item],
    warehouses: &[Warehouse],
    balances: &[StockBalance],
) -> Vec<StockSummaryLine> {
    let names: HashMap<WarehouseId, &str> =
        warehouses.iter().map(|w| (w.id, w.name.as_str())).collect();

    let mut by_item: HashMap<ItemId, Vec<&StockBalance>> = HashMap::new();
    for balance in balances.iter().filter(|b| b.quantity != 0) {
        by_item.entry(balance.item_id).or_default().push(balance);
    }

    let mut lines: Vec<StockSummaryLine> = items
        .iter()
        .filter(|i| i.active)
        .map(|item| {
            let mut breakdown: Vec<WarehouseQuantity> = by_item
                .get(&item.id)
                .into_iter()
                .flatten()
                .map(|b| WarehouseQuantity {
                    warehouse_id: b.warehouse_id,
                    warehouse_name: names.get(&b.warehouse_id).copied().unwrap_or_default().to_string(),
                    quantity: b.quantity,
                })
                .collect();
            breakdown.sort_by(|a, b| a.warehouse_name.cmp(&b.warehouse_name));
            let total_quantity = breakdown.iter().map(|w| w.quantity).sum();

            StockSummaryLine {
                item_id: item.id,
                sku: item.sku.clone(),
                name: item.name.clone(),
                unit: item.unit.clone(),
                min_stock_level: item.min_stock_level,
                total_quantity,
                low_stock: item.is_low(total_quantity),
                warehouses: breakdown,
            }
        })
        .collect();
    lines.sort_by(|a, b| a.sku.cmp(&b.sku));
    lines
}

/// Balances at or below their item's minimum, lowest quantity first.
pub fn low_stock(
    items: &[Item],
    warehouses: &[Warehouse],
    balances: &[StockBalance],
) -> Vec<LowStockEntry> {
    let items: HashMap<ItemId, &Item> = items.iter().map(|i| (i.id, i)).collect();
    let warehouses: HashMap<WarehouseId, &Warehouse> = warehouses.iter().map(|w| (w.id, w)).collect();

    let mut entries: Vec<LowStockEntry> = balances
        .iter()
        .filter_map(|b| {
            let item = items.get(&b.item_id)?;
            let warehouse = warehouses.get(&b.warehouse_id)?;
            (item.active && warehouse.is_active() && item.is_low(b.quantity)).then(|| LowStockEntry {
                item_id: item.id,
                sku: item.sku.clone(),
                name: item.name.clone(),
                warehouse_id: warehouse.id,
                warehouse_name: warehouse.name.clone(),
                quantity: b.quantity,
                min_stock_level: item.min_stock_level,
            })
        })
        .collect();
    entries.sort_by(|a, b| a.quantity.cmp(&b.quantity).then_with(|| a.sku.cmp(&b.sku)));
    entries
}
