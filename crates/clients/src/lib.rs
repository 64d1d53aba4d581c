//! Capability clients for the order saga's external collaborators.
//!
//! The user directory, the inventory resource, and the event sink are
//! independently-owned services. This crate models each as a typed trait
//! with closed result variants, isolating transport concerns from the saga
//! logic, plus in-memory implementations for tests and local runs.

pub mod error;
pub mod events;
pub mod inventory;
pub mod user;

pub use error::ClientError;
pub use events::{EventSink, InMemoryEventSink, NoopEventSink};
pub use inventory::{InMemoryInventory, InventoryClient, ProductInfo, ReleaseOutcome, ReserveOutcome};
pub use user::{InMemoryUserDirectory, UserDirectory, UserRef};
