//! Sales orders.
//!
//! Business rules for sales orders, implemented purely as deterministic domain
//! logic (no IO, no HTTP, no storage). Fulfilling an order yields the stock
//! issues the caller commits alongside the order.

pub mod order;

pub use order::{NewOrderLine, NewSalesOrder, OrderLine, SalesOrder, SalesOrderId, SalesOrderStatus};
