//! The order store trait and its supporting types.

use async_trait::async_trait;
use common::OrderId;

use crate::cursor::PageCursor;
use crate::error::Result;
use crate::records::{NewOrder, OrderItemRecord, OrderRecord, OrderStatus};

/// Exact-match filters for order listing.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user_id: Option<common::UserId>,
    pub status: Option<OrderStatus>,
}

/// One page of an order listing.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<OrderRecord>,
    /// Present only when another page exists.
    pub next_cursor: Option<PageCursor>,
}

/// Result of an order insert.
///
/// `Duplicate` carries the winner's row when the insert lost a race (or a
/// replay) on the idempotency-key unique index.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(OrderRecord),
    Duplicate(OrderRecord),
}

/// Durable storage for orders and their items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts an order and its items atomically with status `Pending`.
    ///
    /// When the order carries an idempotency key that already exists, the
    /// existing row is returned as [`CreateOutcome::Duplicate`] instead of
    /// an error, so the losing writer of a concurrent duplicate-key create
    /// can hand back the winner's result.
    async fn insert_order(&self, new_order: NewOrder) -> Result<CreateOutcome>;

    /// Looks up an order by its idempotency key.
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OrderRecord>>;

    /// Looks up an order by ID.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    /// Returns the items of an order. Empty when the order does not exist.
    async fn get_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>>;

    /// Returns one page of orders in `created_at DESC, id ASC` order.
    ///
    /// Fetches `limit + 1` rows internally; the extra row only determines
    /// whether a `next_cursor` is emitted. The caller is responsible for
    /// clamping `limit`.
    async fn list_orders(
        &self,
        filter: &OrderFilter,
        limit: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<OrderPage>;

    /// Acquires the exclusive row lock for an order.
    ///
    /// Returns `None` when the order does not exist. The returned guard
    /// holds the lock until it is committed or dropped; concurrent
    /// transitions on the same order serialize on it.
    async fn lock_order(&self, order_id: OrderId) -> Result<Option<Box<dyn OrderLock>>>;
}

/// An exclusive lock over a single order row.
///
/// The lock spans the whole read-decide-write sequence of a state
/// transition. Dropping the guard without committing releases the lock and
/// leaves the row unchanged.
#[async_trait]
pub trait OrderLock: Send {
    /// The order row as read under the lock.
    fn order(&self) -> &OrderRecord;

    /// Reads the order's items under the lock.
    async fn items(&mut self) -> Result<Vec<OrderItemRecord>>;

    /// Persists a new status, stamps `updated_at`, and releases the lock.
    async fn commit_status(self: Box<Self>, status: OrderStatus) -> Result<OrderRecord>;
}
