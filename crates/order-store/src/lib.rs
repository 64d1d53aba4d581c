//! Durable order storage for the order saga service.
//!
//! Provides the [`OrderStore`] trait with two backends: an in-memory store
//! for tests and a PostgreSQL store for production. The store owns the
//! idempotency-key unique index and the per-order row lock used by the
//! state machine; callers never mutate order status outside an
//! [`OrderLock`].

pub mod cursor;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use cursor::{CursorError, PageCursor};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use records::{NewOrder, NewOrderItem, OrderItemRecord, OrderRecord, OrderStatus};
pub use store::{CreateOutcome, OrderFilter, OrderLock, OrderPage, OrderStore};
