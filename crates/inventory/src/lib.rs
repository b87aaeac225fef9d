//! Inventory domain: items, warehouses, balances, the stock ledger and
//! valuation.
//!
//! Everything here is deterministic domain logic (no IO, no HTTP, no storage).
//! Callers load state, run these rules, and persist the result as one change
//! set.

pub mod balance;
pub mod item;
pub mod movement;
pub mod summary;
pub mod transaction;
pub mod valuation;
pub mod warehouse;

pub use balance::{BalanceSheet, StockBalance};
pub use item::{normalize_sku, Item, ItemId, ItemPatch, NewItem};
pub use movement::MovementFilter;
pub use summary::{low_stock, stock_summary, LowStockEntry, StockSummaryLine, WarehouseQuantity};
pub use transaction::{
    StockMovement, Transaction, TransactionId, TransactionKind, TransactionStatus,
};
pub use valuation::{
    on_hand_as_of, resolve_method, unit_value, value_inventory, ValuationLine, ValuationMethod,
    ValuationReport,
};
pub use warehouse::{NewWarehouse, Warehouse, WarehouseId, WarehousePatch, WarehouseStatus};
