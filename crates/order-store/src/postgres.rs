//! PostgreSQL-backed order store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::cursor::PageCursor;
use crate::error::{Result, StoreError};
use crate::records::{NewOrder, OrderItemRecord, OrderRecord, OrderStatus};
use crate::store::{CreateOutcome, OrderFilter, OrderLock, OrderPage, OrderStore};

const ORDER_COLUMNS: &str =
    "id, user_id, status, idempotency_key, total_amount_cents, shipping_address, created_at, updated_at";

/// PostgreSQL order store.
///
/// Idempotency-key uniqueness is enforced by the `uq_orders_idempotency_key`
/// constraint; row locks are `SELECT ... FOR UPDATE` transactions.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<OrderRecord> {
        let status: String = row.try_get("status")?;
        let status: OrderStatus = status.parse().map_err(StoreError::InvalidRow)?;

        Ok(OrderRecord {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status,
            idempotency_key: row.try_get("idempotency_key")?,
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            shipping_address: row.try_get("shipping_address")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<OrderItemRecord> {
        Ok(OrderItemRecord {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        })
    }
}

/// Current time truncated to microseconds, matching TIMESTAMPTZ precision
/// so records round-trip exactly through the database.
fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

fn is_idempotency_conflict(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        db_err.constraint() == Some("uq_orders_idempotency_key")
    } else {
        false
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert_order(&self, new_order: NewOrder) -> Result<CreateOutcome> {
        let mut tx = self.pool.begin().await?;
        let now = now_micros();

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, idempotency_key, total_amount_cents, shipping_address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            "#,
        )
        .bind(new_order.id.as_uuid())
        .bind(new_order.user_id.as_uuid())
        .bind(OrderStatus::Pending.as_str())
        .bind(&new_order.idempotency_key)
        .bind(new_order.total_amount.cents())
        .bind(&new_order.shipping_address)
        .bind(now)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            tx.rollback().await?;
            if is_idempotency_conflict(&e)
                && let Some(key) = &new_order.idempotency_key
                && let Some(winner) = self.find_by_idempotency_key(key).await?
            {
                return Ok(CreateOutcome::Duplicate(winner));
            }
            return Err(StoreError::Database(e));
        }

        for item in &new_order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(new_order.id.as_uuid())
            .bind(item.product_id.as_str())
            .bind(item.quantity as i32)
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(CreateOutcome::Created(OrderRecord {
            id: new_order.id,
            user_id: new_order.user_id,
            status: OrderStatus::Pending,
            idempotency_key: new_order.idempotency_key,
            total_amount: new_order.total_amount,
            shipping_address: new_order.shipping_address,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let rows = sqlx::query(
            "SELECT order_id, product_id, quantity, unit_price_cents FROM order_items WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        limit: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<OrderPage> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if filter.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if cursor.is_some() {
            let ts = param_count + 1;
            let id = param_count + 2;
            param_count += 2;
            sql.push_str(&format!(
                " AND (created_at < ${ts} OR (created_at = ${ts} AND id > ${id}))"
            ));
        }
        param_count += 1;
        sql.push_str(&format!(
            " ORDER BY created_at DESC, id ASC LIMIT ${param_count}"
        ));

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id.as_uuid());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(c) = cursor {
            query = query.bind(c.created_at).bind(c.id.as_uuid());
        }
        query = query.bind((limit + 1) as i64);

        let rows = query.fetch_all(&self.pool).await?;
        let mut orders = rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = if orders.len() > limit {
            orders.truncate(limit);
            orders
                .last()
                .map(|last| PageCursor::new(last.created_at, last.id))
        } else {
            None
        };

        Ok(OrderPage {
            orders,
            next_cursor,
        })
    }

    async fn lock_order(&self, order_id: OrderId) -> Result<Option<Box<dyn OrderLock>>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                let record = Self::row_to_order(row)?;
                Ok(Some(Box::new(PgOrderLock { tx, record })))
            }
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }
}

struct PgOrderLock {
    tx: Transaction<'static, Postgres>,
    record: OrderRecord,
}

#[async_trait]
impl OrderLock for PgOrderLock {
    fn order(&self) -> &OrderRecord {
        &self.record
    }

    async fn items(&mut self) -> Result<Vec<OrderItemRecord>> {
        let rows = sqlx::query(
            "SELECT order_id, product_id, quantity, unit_price_cents FROM order_items WHERE order_id = $1",
        )
        .bind(self.record.id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(PostgresOrderStore::row_to_item)
            .collect()
    }

    async fn commit_status(self: Box<Self>, status: OrderStatus) -> Result<OrderRecord> {
        let Self { mut tx, mut record } = *self;

        let now = now_micros();
        sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(now)
            .bind(record.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        record.status = status;
        record.updated_at = now;
        Ok(record)
    }
}
