//! Shared types for the order saga service.

mod types;

pub use types::{Money, OrderId, ProductId, UserId};
