//! Resolution of an approved request into stock movements.

use serde::{Deserialize, Serialize};

use warehub_core::{DomainError, DomainResult};
use warehub_inventory::{BalanceSheet, ItemId, StockMovement, Warehouse, WarehouseId};

use crate::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentKind {
    /// Issued from the requested warehouse.
    Issue,
    /// Pulled from another warehouse that had enough stock.
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentLine {
    pub item_id: ItemId,
    pub quantity: i64,
    pub warehouse_id: WarehouseId,
    pub kind: FulfillmentKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfillment {
    pub lines: Vec<FulfillmentLine>,
    pub movements: Vec<StockMovement>,
}

/// Plan how every line of `request` is served, reserving stock on `sheet`.
///
/// Each line is taken whole from the requested warehouse when it has enough,
/// otherwise from the first other active warehouse (by name, then id) that
/// does. A line nobody can serve fails the whole plan; the sheet is then left
/// as it was.
pub fn plan_fulfillment(
    request: &Request,
    warehouses: &[Warehouse],
    sheet: &mut BalanceSheet,
) -> DomainResult<Fulfillment> {
    let mut donors: Vec<&Warehouse> = warehouses
        .iter()
        .filter(|w| w.is_active() && w.id != request.warehouse_id)
        .collect();
    donors.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    let mut working = sheet.clone();
    let mut lines = Vec::with_capacity(request.items.len());
    let mut movements = Vec::with_capacity(request.items.len());
    let reference = request.code.as_str();

    for item in &request.items {
        let (warehouse_id, kind, movement) =
            if working.quantity(item.item_id, request.warehouse_id) >= item.quantity {
                (
                    request.warehouse_id,
                    FulfillmentKind::Issue,
                    StockMovement::issue(item.item_id, request.warehouse_id, item.quantity)?,
                )
            } else {
                let donor = donors
                    .iter()
                    .find(|w| working.quantity(item.item_id, w.id) >= item.quantity)
                    .ok_or_else(|| {
                        DomainError::invariant(format!(
                            "insufficient stock for item {} ({} requested) in any warehouse",
                            item.item_id, item.quantity
                        ))
                    })?;
                (
                    donor.id,
                    FulfillmentKind::Transfer,
                    StockMovement::transfer(item.item_id, donor.id, None, item.quantity)?,
                )
            };

        let movement = movement.with_reference(reference);
        working.apply(&movement)?;
        lines.push(FulfillmentLine {
            item_id: item.item_id,
            quantity: item.quantity,
            warehouse_id,
            kind,
        });
        movements.push(movement);
    }

    *sheet = working;
    Ok(Fulfillment { lines, movements })
}
