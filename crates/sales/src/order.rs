use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use warehub_core::{AggregateRoot, BusinessCode, DomainError, DomainResult, UserId};
use warehub_inventory::{ItemId, StockMovement, WarehouseId};

warehub_core::entity_id!(
    /// Sales order identifier.
    SalesOrderId,
    "SalesOrderId"
);

/// Sales order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesOrderStatus {
    Draft,
    Confirmed,
    Fulfilled,
    Cancelled,
}

impl SalesOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalesOrderStatus::Draft => "draft",
            SalesOrderStatus::Confirmed => "confirmed",
            SalesOrderStatus::Fulfilled => "fulfilled",
            SalesOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "draft" => Ok(SalesOrderStatus::Draft),
            "confirmed" => Ok(SalesOrderStatus::Confirmed),
            "fulfilled" => Ok(SalesOrderStatus::Fulfilled),
            "cancelled" => Ok(SalesOrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown sales order status '{other}'"))),
        }
    }
}

/// Order line: item, quantity, unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSalesOrder {
    pub customer_name: String,
    pub warehouse_id: WarehouseId,
    #[serde(default)]
    pub lines: Vec<NewOrderLine>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Aggregate root: SalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: SalesOrderId,
    pub code: BusinessCode,
    pub customer_name: String,
    /// Warehouse the order ships from.
    pub warehouse_id: WarehouseId,
    pub status: SalesOrderStatus,
    pub lines: Vec<OrderLine>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub version: u64,
}

fn validate_line(line: &NewOrderLine) -> DomainResult<()> {
    if line.quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    if line.unit_price.is_sign_negative() {
        return Err(DomainError::validation("unit_price cannot be negative"));
    }
    Ok(())
}

impl SalesOrder {
    pub fn create(input: NewSalesOrder, created_by: UserId, now: DateTime<Utc>) -> DomainResult<Self> {
        let customer_name = input.customer_name.trim();
        if customer_name.is_empty() {
            return Err(DomainError::validation("customer_name cannot be empty"));
        }

        let mut order = Self {
            id: SalesOrderId::new(),
            code: BusinessCode::generate("SO", now),
            customer_name: customer_name.to_string(),
            warehouse_id: input.warehouse_id,
            status: SalesOrderStatus::Draft,
            lines: Vec::with_capacity(input.lines.len()),
            notes: input.notes,
            created_by,
            created_at: now,
            updated_at: now,
            fulfilled_at: None,
            version: 1,
        };
        for line in input.lines {
            validate_line(&line)?;
            order.push_line(line);
        }
        Ok(order)
    }

    fn push_line(&mut self, line: NewOrderLine) {
        let line_no = (self.lines.len() as u32) + 1;
        self.lines.push(OrderLine {
            line_no,
            item_id: line.item_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        });
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, SalesOrderStatus::Draft)
    }

    pub fn add_line(&mut self, line: NewOrderLine, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "cannot modify order once it is confirmed",
            ));
        }
        validate_line(&line)?;
        self.push_line(line);
        self.touch(now);
        Ok(())
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != SalesOrderStatus::Draft {
            return Err(DomainError::invariant("only draft orders can be confirmed"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot confirm order without lines"));
        }
        self.status = SalesOrderStatus::Confirmed;
        self.touch(now);
        Ok(())
    }

    /// Mark the order fulfilled and return the stock issues to commit with it.
    pub fn fulfil(&mut self, now: DateTime<Utc>) -> DomainResult<Vec<StockMovement>> {
        if self.status != SalesOrderStatus::Confirmed {
            return Err(DomainError::invariant("only confirmed orders can be fulfilled"));
        }
        let movements = self
            .lines
            .iter()
            .map(|line| {
                StockMovement::issue(line.item_id, self.warehouse_id, line.quantity)
                    .map(|m| m.with_reference(self.code.as_str()))
            })
            .collect::<DomainResult<Vec<_>>>()?;
        self.status = SalesOrderStatus::Fulfilled;
        self.fulfilled_at = Some(now);
        self.touch(now);
        Ok(movements)
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !matches!(self.status, SalesOrderStatus::Draft | SalesOrderStatus::Confirmed) {
            return Err(DomainError::invariant(format!(
                "cannot cancel a {} order",
                self.status.as_str()
            )));
        }
        self.status = SalesOrderStatus::Cancelled;
        self.touch(now);
        Ok(())
    }

    pub fn total(&self) -> Decimal {
        self.lines.iter().map(OrderLine::total).sum()
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use warehub_inventory::TransactionKind;

    fn draft() -> SalesOrder {
        SalesOrder::create(
            NewSalesOrder {
                customer_name: "  Acme Ltd ".to_string(),
                warehouse_id: WarehouseId::new(),
                lines: vec![],
                notes: None,
            },
            UserId::new(),
            Utc::now(),
        )
        .unwrap()
    }

    fn line(quantity: i64, unit_price: Decimal) -> NewOrderLine {
        NewOrderLine {
            item_id: ItemId::new(),
            quantity,
            unit_price,
        }
    }

    #[test]
    fn add_line_numbers_lines_in_draft() {
        let mut order = draft();
        assert_eq!(order.customer_name, "Acme Ltd");
        order.add_line(line(2, dec!(10.50)), Utc::now()).unwrap();
        order.add_line(line(1, dec!(0)), Utc::now()).unwrap();
        assert_eq!(order.lines[1].line_no, 2);
        assert_eq!(order.total(), dec!(21.00));
        assert_eq!(order.version, 3);
    }

    #[test]
    fn invalid_lines_are_rejected() {
        let mut order = draft();
        assert!(order.add_line(line(0, dec!(1)), Utc::now()).is_err());
        assert!(order.add_line(line(1, dec!(-0.01)), Utc::now()).is_err());
        assert!(order.lines.is_empty());
    }

    #[test]
    fn confirm_requires_lines() {
        let mut order = draft();
        assert!(matches!(order.confirm(Utc::now()), Err(DomainError::Validation(_))));
        order.add_line(line(1, dec!(5)), Utc::now()).unwrap();
        order.confirm(Utc::now()).unwrap();
        assert!(order.add_line(line(1, dec!(5)), Utc::now()).is_err());
    }

    #[test]
    fn fulfil_issues_every_line_from_order_warehouse() {
        let mut order = draft();
        order.add_line(line(3, dec!(1)), Utc::now()).unwrap();
        order.add_line(line(4, dec!(2)), Utc::now()).unwrap();
        assert!(order.fulfil(Utc::now()).is_err());

        order.confirm(Utc::now()).unwrap();
        let movements = order.fulfil(Utc::now()).unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.kind == TransactionKind::Issue
            && m.source == Some(order.warehouse_id)
            && m.reference.as_deref() == Some(order.code.as_str())));
        assert_eq!(order.status, SalesOrderStatus::Fulfilled);
        assert!(order.fulfilled_at.is_some());
        assert!(order.cancel(Utc::now()).is_err());
    }

    #[test]
    fn cancel_from_confirmed() {
        let mut order = draft();
        order.add_line(line(1, dec!(1)), Utc::now()).unwrap();
        order.confirm(Utc::now()).unwrap();
        order.cancel(Utc::now()).unwrap();
        assert_eq!(order.status, SalesOrderStatus::Cancelled);
    }
}
