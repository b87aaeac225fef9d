//! Postgres-backed store.
//!
//! Every query is scoped by `tenant_id`. A [`ChangeSet`] is written inside one
//! database transaction; any failed expectation aborts it and the transaction
//! is rolled back on drop.
//!
//! ## Versioned writes
//!
//! | Expected | Statement | Failure |
//! |----------|-----------|---------|
//! | `Exact(0)` | `INSERT ... ON CONFLICT DO NOTHING`-style insert | row exists → `Conflict` |
//! | `Exact(n)` | `UPDATE ... WHERE version = n` | no row updated → `Conflict` |
//! | `Any` | upsert | never |
//!
//! ## Error mapping
//!
//! | SQLx error | Code | StoreError |
//! |------------|------|------------|
//! | Database, constraint `items_tenant_sku_key` | `23505` | `Duplicate` |
//! | Database, other unique violation | `23505` | `Conflict` |
//! | anything else | | `Backend` |
//!
//! Transfers, requests and sales orders are stored as JSONB documents next to
//! the columns they are filtered and versioned on.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{info, instrument};
use uuid::Uuid;

use warehub_core::{AggregateRoot, BusinessCode, ExpectedVersion, TenantId, UserId};
use warehub_inventory::{
    Item, ItemId, MovementFilter, StockBalance, Transaction, TransactionId, TransactionKind,
    TransactionStatus, Warehouse, WarehouseId, WarehouseStatus,
};
use warehub_requests::{Request, RequestId};
use warehub_sales::{SalesOrder, SalesOrderId};
use warehub_transfers::{RejectedGoods, RejectedGoodsId, RejectedGoodsStatus, Transfer, TransferId};

use super::{BalanceFilter, ChangeSet, Store, StoreError, Versioned};
use crate::notifications::{Notification, NotificationId, NotificationKind};
use crate::settings::OrganizationSettings;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const SKU_CONSTRAINT: &str = "items_tenant_sku_key";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create missing tables and indexes.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        info!("database schema is up to date");
        Ok(())
    }
}

/// How a versioned record is written.
#[derive(Debug, Clone, Copy)]
enum WriteMode {
    /// Insert; on an existing row, overwrite only when `upsert`.
    Insert { upsert: bool },
    /// Update the row currently at this version.
    Update(i64),
}

impl From<ExpectedVersion> for WriteMode {
    fn from(expected: ExpectedVersion) -> Self {
        match expected {
            ExpectedVersion::Exact(0) => WriteMode::Insert { upsert: false },
            ExpectedVersion::Exact(v) => WriteMode::Update(v as i64),
            ExpectedVersion::Any => WriteMode::Insert { upsert: true },
        }
    }
}

fn expect_written(
    what: &str,
    id: impl core::fmt::Display,
    expected: ExpectedVersion,
    rows_affected: u64,
) -> Result<(), StoreError> {
    if rows_affected == 0 {
        return Err(StoreError::Conflict(format!(
            "{what} {id}: stored version does not match {expected:?}"
        )));
    }
    Ok(())
}

async fn write_item(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    write: &Versioned<Item>,
) -> Result<(), StoreError> {
    let item = &write.record;
    let result = match WriteMode::from(write.expected) {
        WriteMode::Insert { upsert } => sqlx::query(
            r#"
            INSERT INTO items (
                tenant_id, id, sku, name, unit, description,
                min_stock_level, active, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (tenant_id, id) DO UPDATE SET
                sku = EXCLUDED.sku,
                name = EXCLUDED.name,
                unit = EXCLUDED.unit,
                description = EXCLUDED.description,
                min_stock_level = EXCLUDED.min_stock_level,
                active = EXCLUDED.active,
                updated_at = EXCLUDED.updated_at,
                version = EXCLUDED.version
            WHERE $12
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(item.id.as_uuid())
        .bind(&item.sku)
        .bind(&item.name)
        .bind(&item.unit)
        .bind(&item.description)
        .bind(item.min_stock_level)
        .bind(item.active)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.version as i64)
        .bind(upsert)
        .execute(&mut *conn)
        .await,
        WriteMode::Update(expected) => sqlx::query(
            r#"
            UPDATE items SET
                sku = $3, name = $4, unit = $5, description = $6,
                min_stock_level = $7, active = $8, updated_at = $9, version = $10
            WHERE tenant_id = $1 AND id = $2 AND version = $11
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(item.id.as_uuid())
        .bind(&item.sku)
        .bind(&item.name)
        .bind(&item.unit)
        .bind(&item.description)
        .bind(item.min_stock_level)
        .bind(item.active)
        .bind(item.updated_at)
        .bind(item.version as i64)
        .bind(expected)
        .execute(&mut *conn)
        .await,
    }
    .map_err(|e| map_sqlx_error("write_item", e))?;
    expect_written("item", item.id, write.expected, result.rows_affected())
}

async fn write_warehouse(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    write: &Versioned<Warehouse>,
) -> Result<(), StoreError> {
    let wh = &write.record;
    let result = match WriteMode::from(write.expected) {
        WriteMode::Insert { upsert } => sqlx::query(
            r#"
            INSERT INTO warehouses (
                tenant_id, id, name, location, capacity, manager_id,
                status, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (tenant_id, id) DO UPDATE SET
                name = EXCLUDED.name,
                location = EXCLUDED.location,
                capacity = EXCLUDED.capacity,
                manager_id = EXCLUDED.manager_id,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                version = EXCLUDED.version
            WHERE $11
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(wh.id.as_uuid())
        .bind(&wh.name)
        .bind(&wh.location)
        .bind(wh.capacity)
        .bind(wh.manager_id.map(Uuid::from))
        .bind(wh.status.as_str())
        .bind(wh.created_at)
        .bind(wh.updated_at)
        .bind(wh.version as i64)
        .bind(upsert)
        .execute(&mut *conn)
        .await,
        WriteMode::Update(expected) => sqlx::query(
            r#"
            UPDATE warehouses SET
                name = $3, location = $4, capacity = $5, manager_id = $6,
                status = $7, updated_at = $8, version = $9
            WHERE tenant_id = $1 AND id = $2 AND version = $10
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(wh.id.as_uuid())
        .bind(&wh.name)
        .bind(&wh.location)
        .bind(wh.capacity)
        .bind(wh.manager_id.map(Uuid::from))
        .bind(wh.status.as_str())
        .bind(wh.updated_at)
        .bind(wh.version as i64)
        .bind(expected)
        .execute(&mut *conn)
        .await,
    }
    .map_err(|e| map_sqlx_error("write_warehouse", e))?;
    expect_written("warehouse", wh.id, write.expected, result.rows_affected())
}

async fn write_balance(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    balance: &StockBalance,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    let result = match WriteMode::from(expected) {
        WriteMode::Insert { upsert } => sqlx::query(
            r#"
            INSERT INTO stock_balances (tenant_id, item_id, warehouse_id, quantity, version, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, item_id, warehouse_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            WHERE $7
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(balance.item_id.as_uuid())
        .bind(balance.warehouse_id.as_uuid())
        .bind(balance.quantity)
        .bind(balance.version as i64)
        .bind(balance.updated_at)
        .bind(upsert)
        .execute(&mut *conn)
        .await,
        WriteMode::Update(expected) => sqlx::query(
            r#"
            UPDATE stock_balances SET quantity = $4, version = $5, updated_at = $6
            WHERE tenant_id = $1 AND item_id = $2 AND warehouse_id = $3 AND version = $7
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(balance.item_id.as_uuid())
        .bind(balance.warehouse_id.as_uuid())
        .bind(balance.quantity)
        .bind(balance.version as i64)
        .bind(balance.updated_at)
        .bind(expected)
        .execute(&mut *conn)
        .await,
    }
    .map_err(|e| map_sqlx_error("write_balance", e))?;
    expect_written(
        "balance",
        format_args!("{}/{}", balance.item_id, balance.warehouse_id),
        expected,
        result.rows_affected(),
    )
}

async fn write_transaction(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    write: &Versioned<Transaction>,
) -> Result<(), StoreError> {
    let t = &write.record;
    let result = match WriteMode::from(write.expected) {
        WriteMode::Insert { upsert } => sqlx::query(
            r#"
            INSERT INTO stock_transactions (
                tenant_id, id, code, kind, item_id, quantity,
                source_warehouse_id, destination_warehouse_id, unit_cost,
                status, reference, note, created_by, created_at, completed_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (tenant_id, id) DO UPDATE SET
                status = EXCLUDED.status,
                note = EXCLUDED.note,
                completed_at = EXCLUDED.completed_at,
                version = EXCLUDED.version
            WHERE $17
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(t.id.as_uuid())
        .bind(t.code.as_str())
        .bind(t.kind.as_str())
        .bind(t.item_id.as_uuid())
        .bind(t.quantity)
        .bind(t.source_warehouse_id.map(|w| *w.as_uuid()))
        .bind(t.destination_warehouse_id.map(|w| *w.as_uuid()))
        .bind(t.unit_cost)
        .bind(t.status.as_str())
        .bind(&t.reference)
        .bind(&t.note)
        .bind(t.created_by.as_uuid())
        .bind(t.created_at)
        .bind(t.completed_at)
        .bind(t.version as i64)
        .bind(upsert)
        .execute(&mut *conn)
        .await,
        WriteMode::Update(expected) => sqlx::query(
            r#"
            UPDATE stock_transactions SET
                status = $3, note = $4, completed_at = $5, version = $6
            WHERE tenant_id = $1 AND id = $2 AND version = $7
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(t.id.as_uuid())
        .bind(t.status.as_str())
        .bind(&t.note)
        .bind(t.completed_at)
        .bind(t.version as i64)
        .bind(expected)
        .execute(&mut *conn)
        .await,
    }
    .map_err(|e| map_sqlx_error("write_transaction", e))?;
    expect_written("transaction", t.id, write.expected, result.rows_affected())
}

/// Columns shared by the JSONB-backed tables.
struct DocRow<'a> {
    id: Uuid,
    code: &'a str,
    status: &'static str,
    created_at: DateTime<Utc>,
}

async fn write_doc<T>(
    conn: &mut PgConnection,
    table: &'static str,
    tenant_id: TenantId,
    row: DocRow<'_>,
    write: &Versioned<T>,
) -> Result<(), StoreError>
where
    T: AggregateRoot + Serialize,
{
    let version = write.record.version() as i64;
    let result = match WriteMode::from(write.expected) {
        WriteMode::Insert { upsert } => {
            let sql = format!(
                r#"
                INSERT INTO {table} (tenant_id, id, code, status, created_at, version, doc)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (tenant_id, id) DO UPDATE SET
                    status = EXCLUDED.status,
                    version = EXCLUDED.version,
                    doc = EXCLUDED.doc
                WHERE $8
                "#
            );
            sqlx::query(&sql)
                .bind(tenant_id.as_uuid())
                .bind(row.id)
                .bind(row.code)
                .bind(row.status)
                .bind(row.created_at)
                .bind(version)
                .bind(Json(&write.record))
                .bind(upsert)
                .execute(&mut *conn)
                .await
        }
        WriteMode::Update(expected) => {
            let sql = format!(
                r#"
                UPDATE {table} SET status = $3, version = $4, doc = $5
                WHERE tenant_id = $1 AND id = $2 AND version = $6
                "#
            );
            sqlx::query(&sql)
                .bind(tenant_id.as_uuid())
                .bind(row.id)
                .bind(row.status)
                .bind(version)
                .bind(Json(&write.record))
                .bind(expected)
                .execute(&mut *conn)
                .await
        }
    }
    .map_err(|e| map_sqlx_error(table, e))?;
    expect_written(table, row.id, write.expected, result.rows_affected())
}

async fn write_rejected_goods(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    goods: &RejectedGoods,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO rejected_goods (
            tenant_id, id, transfer_id, item_id, warehouse_id, quantity,
            reason, status, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (tenant_id, id) DO UPDATE SET
            status = EXCLUDED.status,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(goods.id.as_uuid())
    .bind(goods.transfer_id.as_uuid())
    .bind(goods.item_id.as_uuid())
    .bind(goods.warehouse_id.as_uuid())
    .bind(goods.quantity)
    .bind(&goods.reason)
    .bind(goods.status.as_str())
    .bind(goods.created_at)
    .bind(goods.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_rejected_goods", e))?;
    Ok(())
}

async fn write_notification(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    n: &Notification,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO notifications (tenant_id, id, recipient, kind, message, reference, read, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (tenant_id, id) DO UPDATE SET read = EXCLUDED.read
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(n.id.as_uuid())
    .bind(n.recipient.map(Uuid::from))
    .bind(n.kind.as_str())
    .bind(&n.message)
    .bind(&n.reference)
    .bind(n.read)
    .bind(n.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_notification", e))?;
    Ok(())
}

async fn write_settings(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    settings: &OrganizationSettings,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO organization_settings (tenant_id, valuation_method, low_stock_notifications, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (tenant_id) DO UPDATE SET
            valuation_method = EXCLUDED.valuation_method,
            low_stock_notifications = EXCLUDED.low_stock_notifications,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(settings.valuation_method.as_str())
    .bind(settings.low_stock_notifications)
    .bind(settings.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_settings", e))?;
    Ok(())
}

fn decode_err(e: warehub_core::DomainError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        id: ItemId::from_uuid(row.try_get("id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        unit: row.try_get("unit")?,
        description: row.try_get("description")?,
        min_stock_level: row.try_get("min_stock_level")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get::<i64, _>("version")? as u64,
    })
}

fn warehouse_from_row(row: &PgRow) -> Result<Warehouse, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Warehouse {
        id: WarehouseId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        capacity: row.try_get("capacity")?,
        manager_id: row.try_get::<Option<Uuid>, _>("manager_id")?.map(UserId::from_uuid),
        status: WarehouseStatus::parse(&status).map_err(decode_err)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get::<i64, _>("version")? as u64,
    })
}

fn balance_from_row(row: &PgRow) -> Result<StockBalance, sqlx::Error> {
    Ok(StockBalance {
        item_id: ItemId::from_uuid(row.try_get("item_id")?),
        warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?),
        quantity: row.try_get("quantity")?,
        version: row.try_get::<i64, _>("version")? as u64,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(Transaction {
        id: TransactionId::from_uuid(row.try_get("id")?),
        code: BusinessCode::from_string(row.try_get::<String, _>("code")?),
        kind: TransactionKind::parse(&kind).map_err(decode_err)?,
        item_id: ItemId::from_uuid(row.try_get("item_id")?),
        quantity: row.try_get("quantity")?,
        source_warehouse_id: row
            .try_get::<Option<Uuid>, _>("source_warehouse_id")?
            .map(WarehouseId::from_uuid),
        destination_warehouse_id: row
            .try_get::<Option<Uuid>, _>("destination_warehouse_id")?
            .map(WarehouseId::from_uuid),
        unit_cost: row.try_get("unit_cost")?,
        status: TransactionStatus::parse(&status).map_err(decode_err)?,
        reference: row.try_get("reference")?,
        note: row.try_get("note")?,
        created_by: UserId::from_uuid(row.try_get("created_by")?),
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        version: row.try_get::<i64, _>("version")? as u64,
    })
}

fn rejected_goods_from_row(row: &PgRow) -> Result<RejectedGoods, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(RejectedGoods {
        id: RejectedGoodsId::from_uuid(row.try_get("id")?),
        transfer_id: TransferId::from_uuid(row.try_get("transfer_id")?),
        item_id: ItemId::from_uuid(row.try_get("item_id")?),
        warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?),
        quantity: row.try_get("quantity")?,
        reason: row.try_get("reason")?,
        status: RejectedGoodsStatus::parse(&status).map_err(decode_err)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    Ok(Notification {
        id: NotificationId::from_uuid(row.try_get("id")?),
        recipient: row.try_get::<Option<Uuid>, _>("recipient")?.map(UserId::from_uuid),
        kind: NotificationKind::parse(&kind).map_err(decode_err)?,
        message: row.try_get("message")?,
        reference: row.try_get("reference")?,
        read: row.try_get("read")?,
        created_at: row.try_get("created_at")?,
    })
}

fn doc_from_row<T: DeserializeOwned>(row: &PgRow) -> Result<T, sqlx::Error> {
    Ok(row.try_get::<Json<T>, _>("doc")?.0)
}

fn decode_all<T>(
    operation: &str,
    rows: Vec<PgRow>,
    decode: impl Fn(&PgRow) -> Result<T, sqlx::Error>,
) -> Result<Vec<T>, StoreError> {
    rows.iter()
        .map(|r| decode(r).map_err(|e| map_sqlx_error(operation, e)))
        .collect()
}

impl PostgresStore {
    async fn fetch_optional<T>(
        &self,
        operation: &str,
        sql: &str,
        tenant_id: TenantId,
        id: Uuid,
        decode: impl Fn(&PgRow) -> Result<T, sqlx::Error>,
    ) -> Result<Option<T>, StoreError> {
        let row = sqlx::query(sql)
            .bind(tenant_id.as_uuid())
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref()
            .map(|r| decode(r).map_err(|e| map_sqlx_error(operation, e)))
            .transpose()
    }

    async fn fetch_tenant<T>(
        &self,
        operation: &str,
        sql: &str,
        tenant_id: TenantId,
        decode: impl Fn(&PgRow) -> Result<T, sqlx::Error>,
    ) -> Result<Vec<T>, StoreError> {
        let rows = sqlx::query(sql)
            .bind(tenant_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        decode_all(operation, rows, decode)
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(
        skip(self, changes),
        fields(
            tenant_id = %tenant_id.as_uuid(),
            balances = changes.balances.len(),
            transactions = changes.transactions.len()
        ),
        err
    )]
    async fn commit(&self, tenant_id: TenantId, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for w in &changes.items {
            write_item(&mut tx, tenant_id, w).await?;
        }
        for w in &changes.warehouses {
            write_warehouse(&mut tx, tenant_id, w).await?;
        }
        for (balance, expected) in &changes.balances {
            write_balance(&mut tx, tenant_id, balance, *expected).await?;
        }
        for w in &changes.transactions {
            write_transaction(&mut tx, tenant_id, w).await?;
        }
        for w in &changes.transfers {
            let row = DocRow {
                id: *w.record.id.as_uuid(),
                code: w.record.code.as_str(),
                status: w.record.status.as_str(),
                created_at: w.record.created_at,
            };
            write_doc(&mut tx, "transfers", tenant_id, row, w).await?;
        }
        for goods in &changes.rejected_goods {
            write_rejected_goods(&mut tx, tenant_id, goods).await?;
        }
        for w in &changes.requests {
            let row = DocRow {
                id: *w.record.id.as_uuid(),
                code: w.record.code.as_str(),
                status: w.record.status.as_str(),
                created_at: w.record.created_at,
            };
            write_doc(&mut tx, "stock_requests", tenant_id, row, w).await?;
        }
        for w in &changes.sales_orders {
            let row = DocRow {
                id: *w.record.id.as_uuid(),
                code: w.record.code.as_str(),
                status: w.record.status.as_str(),
                created_at: w.record.created_at,
            };
            write_doc(&mut tx, "sales_orders", tenant_id, row, w).await?;
        }
        for n in &changes.notifications {
            write_notification(&mut tx, tenant_id, n).await?;
        }
        if let Some(settings) = &changes.settings {
            write_settings(&mut tx, tenant_id, settings).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn get_item(&self, tenant_id: TenantId, id: ItemId) -> Result<Option<Item>, StoreError> {
        self.fetch_optional(
            "get_item",
            "SELECT * FROM items WHERE tenant_id = $1 AND id = $2",
            tenant_id,
            *id.as_uuid(),
            item_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn list_items(&self, tenant_id: TenantId) -> Result<Vec<Item>, StoreError> {
        self.fetch_tenant(
            "list_items",
            "SELECT * FROM items WHERE tenant_id = $1 ORDER BY sku",
            tenant_id,
            item_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn get_warehouse(
        &self,
        tenant_id: TenantId,
        id: WarehouseId,
    ) -> Result<Option<Warehouse>, StoreError> {
        self.fetch_optional(
            "get_warehouse",
            "SELECT * FROM warehouses WHERE tenant_id = $1 AND id = $2",
            tenant_id,
            *id.as_uuid(),
            warehouse_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn list_warehouses(&self, tenant_id: TenantId) -> Result<Vec<Warehouse>, StoreError> {
        self.fetch_tenant(
            "list_warehouses",
            "SELECT * FROM warehouses WHERE tenant_id = $1 ORDER BY name, id",
            tenant_id,
            warehouse_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn list_balances(
        &self,
        tenant_id: TenantId,
        filter: BalanceFilter,
    ) -> Result<Vec<StockBalance>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM stock_balances
            WHERE tenant_id = $1
              AND ($2::UUID IS NULL OR item_id = $2)
              AND ($3::UUID IS NULL OR warehouse_id = $3)
            ORDER BY item_id, warehouse_id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(filter.item_id.map(|i| *i.as_uuid()))
        .bind(filter.warehouse_id.map(|w| *w.as_uuid()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_balances", e))?;
        decode_all("list_balances", rows, balance_from_row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn get_transaction(
        &self,
        tenant_id: TenantId,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        self.fetch_optional(
            "get_transaction",
            "SELECT * FROM stock_transactions WHERE tenant_id = $1 AND id = $2",
            tenant_id,
            *id.as_uuid(),
            transaction_from_row,
        )
        .await
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn list_transactions(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM stock_transactions
            WHERE tenant_id = $1
              AND ($2::UUID IS NULL OR item_id = $2)
              AND ($3::UUID IS NULL OR source_warehouse_id = $3 OR destination_warehouse_id = $3)
              AND ($4::TEXT IS NULL OR kind = $4)
              AND ($5::TEXT IS NULL OR status = $5)
              AND ($6::TEXT IS NULL OR reference = $6)
              AND ($7::TIMESTAMPTZ IS NULL OR created_at >= $7)
              AND ($8::TIMESTAMPTZ IS NULL OR created_at <= $8)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(filter.item_id.map(|i| *i.as_uuid()))
        .bind(filter.warehouse_id.map(|w| *w.as_uuid()))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.reference.as_deref())
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_transactions", e))?;
        decode_all("list_transactions", rows, transaction_from_row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn get_transfer(
        &self,
        tenant_id: TenantId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError> {
        self.fetch_optional(
            "get_transfer",
            "SELECT doc FROM transfers WHERE tenant_id = $1 AND id = $2",
            tenant_id,
            *id.as_uuid(),
            doc_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn list_transfers(&self, tenant_id: TenantId) -> Result<Vec<Transfer>, StoreError> {
        self.fetch_tenant(
            "list_transfers",
            "SELECT doc FROM transfers WHERE tenant_id = $1 ORDER BY created_at DESC, id DESC",
            tenant_id,
            doc_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn list_rejected_goods(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> Result<Vec<RejectedGoods>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM rejected_goods
            WHERE tenant_id = $1 AND transfer_id = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(transfer_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_rejected_goods", e))?;
        decode_all("list_rejected_goods", rows, rejected_goods_from_row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn get_request(
        &self,
        tenant_id: TenantId,
        id: RequestId,
    ) -> Result<Option<Request>, StoreError> {
        self.fetch_optional(
            "get_request",
            "SELECT doc FROM stock_requests WHERE tenant_id = $1 AND id = $2",
            tenant_id,
            *id.as_uuid(),
            doc_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn list_requests(&self, tenant_id: TenantId) -> Result<Vec<Request>, StoreError> {
        self.fetch_tenant(
            "list_requests",
            "SELECT doc FROM stock_requests WHERE tenant_id = $1 ORDER BY created_at DESC, id DESC",
            tenant_id,
            doc_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn get_sales_order(
        &self,
        tenant_id: TenantId,
        id: SalesOrderId,
    ) -> Result<Option<SalesOrder>, StoreError> {
        self.fetch_optional(
            "get_sales_order",
            "SELECT doc FROM sales_orders WHERE tenant_id = $1 AND id = $2",
            tenant_id,
            *id.as_uuid(),
            doc_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn list_sales_orders(&self, tenant_id: TenantId) -> Result<Vec<SalesOrder>, StoreError> {
        self.fetch_tenant(
            "list_sales_orders",
            "SELECT doc FROM sales_orders WHERE tenant_id = $1 ORDER BY created_at DESC, id DESC",
            tenant_id,
            doc_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn get_notification(
        &self,
        tenant_id: TenantId,
        id: NotificationId,
    ) -> Result<Option<Notification>, StoreError> {
        self.fetch_optional(
            "get_notification",
            "SELECT * FROM notifications WHERE tenant_id = $1 AND id = $2",
            tenant_id,
            *id.as_uuid(),
            notification_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn list_notifications(
        &self,
        tenant_id: TenantId,
        user: UserId,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM notifications
            WHERE tenant_id = $1 AND (recipient IS NULL OR recipient = $2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_notifications", e))?;
        decode_all("list_notifications", rows, notification_from_row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn get_settings(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<OrganizationSettings>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT valuation_method, low_stock_notifications, updated_at
            FROM organization_settings
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_settings", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let decode = |row: &PgRow| -> Result<OrganizationSettings, sqlx::Error> {
            let method: String = row.try_get("valuation_method")?;
            Ok(OrganizationSettings {
                valuation_method: method.parse().map_err(decode_err)?,
                low_stock_notifications: row.try_get("low_stock_notifications")?,
                updated_at: row.try_get("updated_at")?,
            })
        };
        decode(&row)
            .map(Some)
            .map_err(|e| map_sqlx_error("get_settings", e))
    }
}

/// Map SQLx errors to store errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") if db_err.constraint() == Some(SKU_CONSTRAINT) => {
                    StoreError::Duplicate("sku already exists".to_string())
                }
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
