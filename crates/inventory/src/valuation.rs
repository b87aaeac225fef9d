//! Inventory valuation as of a point in time.
//!
//! Unit values come from completed check-ins that carry a cost; quantities come
//! from replaying every completed ledger row up to the cut-off. Both are a
//! single pass over the ledger.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use warehub_core::{DomainError, DomainResult};

use crate::{Item, ItemId, Transaction, TransactionKind, WarehouseId};

/// Decimal places kept for computed unit values.
pub const UNIT_VALUE_SCALE: u32 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    /// Cost of the most recent check-in.
    LastValue,
    /// Cost of the oldest check-in.
    EarliestValue,
    /// Quantity-weighted mean of all check-in costs.
    #[default]
    AverageValue,
}

impl ValuationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationMethod::LastValue => "last_value",
            ValuationMethod::EarliestValue => "earliest_value",
            ValuationMethod::AverageValue => "average_value",
        }
    }
}

impl FromStr for ValuationMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last" | "last_value" => Ok(ValuationMethod::LastValue),
            "earliest" | "earliest_value" | "first" => Ok(ValuationMethod::EarliestValue),
            "average" | "average_value" | "avg" => Ok(ValuationMethod::AverageValue),
            other => Err(DomainError::validation(format!(
                "unknown valuation method '{other}'"
            ))),
        }
    }
}

/// Running cost state for one item.
#[derive(Debug, Clone, Default)]
struct CostFold {
    earliest: Option<(DateTime<Utc>, Decimal)>,
    latest: Option<(DateTime<Utc>, Decimal)>,
    weighted: Decimal,
    quantity: i64,
}

impl CostFold {
    fn push(&mut self, at: DateTime<Utc>, quantity: i64, cost: Decimal) {
        // Ties keep ledger order: first seen is earliest, last seen is latest.
        if self.earliest.is_none_or(|(t, _)| at < t) {
            self.earliest = Some((at, cost));
        }
        if self.latest.is_none_or(|(t, _)| at >= t) {
            self.latest = Some((at, cost));
        }
        self.weighted += cost * Decimal::from(quantity);
        self.quantity += quantity;
    }

    fn unit_value(&self, method: ValuationMethod) -> Option<Decimal> {
        match method {
            ValuationMethod::LastValue => self.latest.map(|(_, c)| c),
            ValuationMethod::EarliestValue => self.earliest.map(|(_, c)| c),
            ValuationMethod::AverageValue => (self.quantity > 0)
                .then(|| (self.weighted / Decimal::from(self.quantity)).round_dp(UNIT_VALUE_SCALE)),
        }
    }
}

fn costed_check_in(tx: &Transaction, as_of: DateTime<Utc>) -> Option<(DateTime<Utc>, Decimal)> {
    if tx.kind != TransactionKind::CheckIn {
        return None;
    }
    let at = tx.effective_at().filter(|at| *at <= as_of)?;
    tx.unit_cost.map(|cost| (at, cost))
}

/// Unit value of one item from its ledger rows.
pub fn unit_value<'a>(
    method: ValuationMethod,
    ledger: impl IntoIterator<Item = &'a Transaction>,
    as_of: DateTime<Utc>,
) -> Option<Decimal> {
    let mut fold = CostFold::default();
    for tx in ledger {
        if let Some((at, cost)) = costed_check_in(tx, as_of) {
            fold.push(at, tx.quantity, cost);
        }
    }
    fold.unit_value(method)
}

/// On-hand quantity per item after replaying completed rows up to `as_of`,
/// optionally restricted to one warehouse.
pub fn on_hand_as_of<'a>(
    ledger: impl IntoIterator<Item = &'a Transaction>,
    warehouse: Option<WarehouseId>,
    as_of: DateTime<Utc>,
) -> HashMap<ItemId, i64> {
    let mut on_hand: HashMap<ItemId, i64> = HashMap::new();
    for tx in ledger {
        if tx.effective_at().is_none_or(|at| at > as_of) {
            continue;
        }
        for (wh, delta) in tx.movement().deltas() {
            if warehouse.is_none_or(|w| w == wh) {
                *on_hand.entry(tx.item_id).or_default() += delta;
            }
        }
    }
    on_hand
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationLine {
    pub item_id: ItemId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub quantity: i64,
    pub unit_value: Option<Decimal>,
    pub total_value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationReport {
    pub as_of: DateTime<Utc>,
    pub method: ValuationMethod,
    pub warehouse_id: Option<WarehouseId>,
    pub lines: Vec<ValuationLine>,
    pub total_quantity: i64,
    /// Sum over valued lines only.
    pub total_value: Decimal,
    pub unvalued_items: usize,
}

/// Value every item with stock on hand at `as_of`.
///
/// Lines are ordered by SKU. Items without any costed check-in are listed
/// with no unit value and do not contribute to `total_value`.
pub fn value_inventory(
    items: &[Item],
    ledger: &[Transaction],
    method: ValuationMethod,
    warehouse: Option<WarehouseId>,
    as_of: DateTime<Utc>,
) -> ValuationReport {
    let mut costs: HashMap<ItemId, CostFold> = HashMap::new();
    for tx in ledger {
        if let Some((at, cost)) = costed_check_in(tx, as_of) {
            costs.entry(tx.item_id).or_default().push(at, tx.quantity, cost);
        }
    }
    let on_hand = on_hand_as_of(ledger, warehouse, as_of);

    let mut lines: Vec<ValuationLine> = items
        .iter()
        .filter_map(|item| {
            let quantity = on_hand.get(&item.id).copied().unwrap_or(0);
            if quantity == 0 {
                return None;
            }
            let unit_value = costs.get(&item.id).and_then(|f| f.unit_value(method));
            Some(ValuationLine {
                item_id: item.id,
                sku: item.sku.clone(),
                name: item.name.clone(),
                unit: item.unit.clone(),
                quantity,
                unit_value,
                total_value: unit_value.map(|v| v * Decimal::from(quantity)),
            })
        })
        .collect();
    lines.sort_by(|a, b| a.sku.cmp(&b.sku));

    let total_quantity: i64 = lines.iter().map(|l| l.quantity).sum();
    let total_value: Decimal = lines.iter().filter_map(|l| l.total_value).sum();
    let unvalued_items = lines.iter().filter(|l| l.unit_value.is_none()).count();

    ValuationReport {
        as_of,
        method,
        warehouse_id: warehouse,
        lines,
        total_quantity,
        total_value,
        unvalued_items,
    }
}

/// Parse an optional method override, falling back to the tenant default.
pub fn resolve_method(raw: Option<&str>, default: ValuationMethod) -> DomainResult<ValuationMethod> {
    raw.map(str::parse).transpose().map(|m| m.unwrap_or(default))
}
