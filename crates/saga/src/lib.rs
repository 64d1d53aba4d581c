//! Order saga orchestration.
//!
//! This crate drives the create-order saga across three independently-owned
//! resources (user directory, inventory, order store) without a distributed
//! transaction coordinator:
//! 1. Idempotency fast path before any remote call
//! 2. Validation, user lookup, address resolution
//! 3. Pricing and stock pre-check
//! 4. Per-item reservation with compensating release on failure
//! 5. Durable commit and best-effort event emission
//!
//! It also owns the order state machine: pay and cancel run their whole
//! read-decide-write sequence under the store's exclusive row lock.

pub mod error;
pub mod orchestrator;
mod transitions;

pub use error::{Result, SagaError};
pub use orchestrator::{
    CreateOrderOutcome, CreateOrderRequest, ListOrdersRequest, OrderItemRequest, OrderListing,
    OrderOrchestrator, OrderReceipt,
};
