//! Inventory client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, ProductId};

use crate::error::ClientError;

/// Current price and stock for a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub name: String,
    pub unit_price: Money,
    pub stock: u32,
}

/// Result of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Stock was decremented by the requested quantity.
    Reserved,
    /// Not enough stock; nothing was decremented.
    InsufficientStock,
    /// The product does not exist.
    NotFound,
}

/// Result of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Stock was incremented by the requested quantity.
    Released,
    /// The product does not exist.
    NotFound,
}

/// Trait for inventory lookups and stock reservation.
///
/// `reserve` is a conditional decrement that never drives stock negative;
/// `release` is an unconditional additive increment, the compensating
/// action for a prior reservation.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Fetches current price, stock, and name for a product.
    async fn fetch_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<ProductInfo>, ClientError>;

    /// Reserves `quantity` units of a product.
    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReserveOutcome, ClientError>;

    /// Releases `quantity` units back to a product's stock.
    async fn release(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReleaseOutcome, ClientError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    products: HashMap<ProductId, ProductInfo>,
    fail_reserve: std::collections::HashSet<ProductId>,
    unreachable: bool,
}

/// In-memory inventory for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventory {
    /// Creates a new empty in-memory inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub fn add_product(&self, product_id: ProductId, name: &str, unit_price: Money, stock: u32) {
        self.state.write().unwrap().products.insert(
            product_id,
            ProductInfo {
                name: name.to_string(),
                unit_price,
                stock,
            },
        );
    }

    /// Returns the current stock of a product.
    pub fn stock_of(&self, product_id: &ProductId) -> Option<u32> {
        self.state
            .read()
            .unwrap()
            .products
            .get(product_id)
            .map(|p| p.stock)
    }

    /// Simulates the inventory resource becoming unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().unreachable = unreachable;
    }

    /// Forces reservations of the given product to report insufficient
    /// stock, regardless of the stock level.
    pub fn set_reserve_failure(&self, product_id: ProductId) {
        self.state.write().unwrap().fail_reserve.insert(product_id);
    }
}

#[async_trait]
impl InventoryClient for InMemoryInventory {
    async fn fetch_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<ProductInfo>, ClientError> {
        let state = self.state.read().unwrap();
        if state.unreachable {
            return Err(ClientError::Unavailable(
                "inventory resource unreachable".to_string(),
            ));
        }
        Ok(state.products.get(product_id).cloned())
    }

    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReserveOutcome, ClientError> {
        let mut state = self.state.write().unwrap();
        if state.unreachable {
            return Err(ClientError::Unavailable(
                "inventory resource unreachable".to_string(),
            ));
        }
        if state.fail_reserve.contains(product_id) {
            return Ok(ReserveOutcome::InsufficientStock);
        }
        match state.products.get_mut(product_id) {
            Some(product) if product.stock >= quantity => {
                product.stock -= quantity;
                Ok(ReserveOutcome::Reserved)
            }
            Some(_) => Ok(ReserveOutcome::InsufficientStock),
            None => Ok(ReserveOutcome::NotFound),
        }
    }

    async fn release(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReleaseOutcome, ClientError> {
        let mut state = self.state.write().unwrap();
        if state.unreachable {
            return Err(ClientError::Unavailable(
                "inventory resource unreachable".to_string(),
            ));
        }
        match state.products.get_mut(product_id) {
            Some(product) => {
                product.stock += quantity;
                Ok(ReleaseOutcome::Released)
            }
            None => Ok(ReleaseOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory_with(stock: u32) -> (InMemoryInventory, ProductId) {
        let inventory = InMemoryInventory::new();
        let product = ProductId::new("P1");
        inventory.add_product(product.clone(), "Widget", Money::from_cents(1000), stock);
        (inventory, product)
    }

    #[tokio::test]
    async fn reserve_decrements_stock() {
        let (inventory, product) = inventory_with(5);

        let outcome = inventory.reserve(&product, 3).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::Reserved);
        assert_eq!(inventory.stock_of(&product), Some(2));
    }

    #[tokio::test]
    async fn reserve_never_goes_negative() {
        let (inventory, product) = inventory_with(2);

        let outcome = inventory.reserve(&product, 3).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::InsufficientStock);
        assert_eq!(inventory.stock_of(&product), Some(2));
    }

    #[tokio::test]
    async fn reserve_unknown_product() {
        let inventory = InMemoryInventory::new();
        let outcome = inventory.reserve(&ProductId::new("ghost"), 1).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::NotFound);
    }

    #[tokio::test]
    async fn release_is_additive() {
        let (inventory, product) = inventory_with(1);

        inventory.reserve(&product, 1).await.unwrap();
        let outcome = inventory.release(&product, 1).await.unwrap();
        assert_eq!(outcome, ReleaseOutcome::Released);
        assert_eq!(inventory.stock_of(&product), Some(1));
    }

    #[tokio::test]
    async fn concurrent_reservations_never_oversell() {
        let (inventory, product) = inventory_with(10);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let inventory = inventory.clone();
            let product = product.clone();
            handles.push(tokio::spawn(async move {
                inventory.reserve(&product, 1).await.unwrap()
            }));
        }

        let mut reserved = 0;
        for handle in handles {
            if handle.await.unwrap() == ReserveOutcome::Reserved {
                reserved += 1;
            }
        }

        assert_eq!(reserved, 10);
        assert_eq!(inventory.stock_of(&product), Some(0));
    }

    #[tokio::test]
    async fn unreachable_surfaces_unavailable() {
        let (inventory, product) = inventory_with(5);
        inventory.set_unreachable(true);

        assert!(matches!(
            inventory.reserve(&product, 1).await,
            Err(ClientError::Unavailable(_))
        ));
    }
}
