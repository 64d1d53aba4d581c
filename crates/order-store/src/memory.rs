//! In-memory order store implementation for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::cursor::PageCursor;
use crate::error::Result;
use crate::records::{NewOrder, OrderItemRecord, OrderRecord, OrderStatus};
use crate::store::{CreateOutcome, OrderFilter, OrderLock, OrderPage, OrderStore};

#[derive(Default)]
struct StoreState {
    orders: HashMap<OrderId, OrderRecord>,
    items: HashMap<OrderId, Vec<OrderItemRecord>>,
    by_key: HashMap<String, OrderId>,
    fail_on_insert: bool,
}

/// In-memory order store.
///
/// Provides the same interface as the PostgreSQL implementation. Row locks
/// are per-order async mutexes, so concurrent transitions on one order
/// serialize exactly as they do under `SELECT ... FOR UPDATE`.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<StoreState>>,
    row_locks: Arc<Mutex<HashMap<OrderId, Arc<Mutex<()>>>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Configures the store to fail inserts, simulating a durable-write
    /// failure after reservation.
    pub async fn set_fail_on_insert(&self, fail: bool) {
        self.state.write().await.fail_on_insert = fail;
    }

    /// Inserts an order with an explicit creation timestamp.
    ///
    /// Lets pagination tests position rows relative to a cursor boundary.
    pub async fn insert_order_at(
        &self,
        new_order: NewOrder,
        created_at: DateTime<Utc>,
    ) -> Result<CreateOutcome> {
        self.insert_with_timestamp(new_order, created_at).await
    }

    async fn insert_with_timestamp(
        &self,
        new_order: NewOrder,
        created_at: DateTime<Utc>,
    ) -> Result<CreateOutcome> {
        let mut state = self.state.write().await;

        if state.fail_on_insert {
            return Err(crate::error::StoreError::Database(sqlx::Error::PoolClosed));
        }

        if let Some(key) = &new_order.idempotency_key
            && let Some(existing_id) = state.by_key.get(key)
            && let Some(existing) = state.orders.get(existing_id)
        {
            return Ok(CreateOutcome::Duplicate(existing.clone()));
        }

        let record = OrderRecord {
            id: new_order.id,
            user_id: new_order.user_id,
            status: OrderStatus::Pending,
            idempotency_key: new_order.idempotency_key.clone(),
            total_amount: new_order.total_amount,
            shipping_address: new_order.shipping_address.clone(),
            created_at,
            updated_at: created_at,
        };

        let items: Vec<OrderItemRecord> = new_order
            .items
            .iter()
            .map(|item| OrderItemRecord {
                order_id: new_order.id,
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        if let Some(key) = new_order.idempotency_key {
            state.by_key.insert(key, new_order.id);
        }
        state.items.insert(new_order.id, items);
        state.orders.insert(new_order.id, record.clone());

        Ok(CreateOutcome::Created(record))
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, new_order: NewOrder) -> Result<CreateOutcome> {
        self.insert_with_timestamp(new_order, Utc::now()).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OrderRecord>> {
        let state = self.state.read().await;
        Ok(state
            .by_key
            .get(key)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn get_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        Ok(self
            .state
            .read()
            .await
            .items
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        limit: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<OrderPage> {
        let state = self.state.read().await;

        let mut rows: Vec<OrderRecord> = state
            .orders
            .values()
            .filter(|o| {
                if let Some(user_id) = filter.user_id
                    && o.user_id != user_id
                {
                    return false;
                }
                if let Some(status) = filter.status
                    && o.status != status
                {
                    return false;
                }
                if let Some(c) = cursor {
                    // Keyset predicate for created_at DESC, id ASC.
                    return o.created_at < c.created_at
                        || (o.created_at == c.created_at && o.id > c.id);
                }
                true
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.id.as_uuid().cmp(&b.id.as_uuid()))
        });
        rows.truncate(limit + 1);

        let next_cursor = if rows.len() > limit {
            rows.truncate(limit);
            rows.last()
                .map(|last| PageCursor::new(last.created_at, last.id))
        } else {
            None
        };

        Ok(OrderPage {
            orders: rows,
            next_cursor,
        })
    }

    async fn lock_order(&self, order_id: OrderId) -> Result<Option<Box<dyn OrderLock>>> {
        let cell = {
            let mut locks = self.row_locks.lock().await;
            locks
                .entry(order_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = cell.lock_owned().await;

        // Re-read under the lock; a concurrent transition may have run.
        let record = self.state.read().await.orders.get(&order_id).cloned();
        match record {
            Some(record) => Ok(Some(Box::new(InMemoryOrderLock {
                _guard: guard,
                state: self.state.clone(),
                record,
            }))),
            None => Ok(None),
        }
    }
}

struct InMemoryOrderLock {
    _guard: OwnedMutexGuard<()>,
    state: Arc<RwLock<StoreState>>,
    record: OrderRecord,
}

#[async_trait]
impl OrderLock for InMemoryOrderLock {
    fn order(&self) -> &OrderRecord {
        &self.record
    }

    async fn items(&mut self) -> Result<Vec<OrderItemRecord>> {
        Ok(self
            .state
            .read()
            .await
            .items
            .get(&self.record.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn commit_status(self: Box<Self>, status: OrderStatus) -> Result<OrderRecord> {
        let mut state = self.state.write().await;
        let mut updated = self.record.clone();
        updated.status = status;
        updated.updated_at = Utc::now();
        state.orders.insert(updated.id, updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, ProductId, UserId};
    use crate::records::NewOrderItem;

    fn new_order(user_id: UserId, key: Option<&str>) -> NewOrder {
        NewOrder {
            id: OrderId::new(),
            user_id,
            idempotency_key: key.map(String::from),
            total_amount: Money::from_cents(1000),
            shipping_address: None,
            items: vec![NewOrderItem {
                product_id: ProductId::new("P1"),
                quantity: 1,
                unit_price: Money::from_cents(1000),
            }],
        }
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new();
        let outcome = store.insert_order(new_order(user, None)).await.unwrap();
        let CreateOutcome::Created(record) = outcome else {
            panic!("expected fresh insert");
        };

        let fetched = store.get_order(record.id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
        assert_eq!(fetched.status, OrderStatus::Pending);

        let items = store.get_items(record.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id.as_str(), "P1");
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_returns_winner() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new();

        let first = store
            .insert_order(new_order(user, Some("K1")))
            .await
            .unwrap();
        let CreateOutcome::Created(winner) = first else {
            panic!("expected fresh insert");
        };

        let second = store
            .insert_order(new_order(user, Some("K1")))
            .await
            .unwrap();
        let CreateOutcome::Duplicate(existing) = second else {
            panic!("expected duplicate");
        };
        assert_eq!(existing.id, winner.id);
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn find_by_idempotency_key() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new();
        store
            .insert_order(new_order(user, Some("K9")))
            .await
            .unwrap();

        assert!(
            store
                .find_by_idempotency_key("K9")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_by_idempotency_key("missing")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn list_orders_pages_with_cursor() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new();
        for _ in 0..5 {
            store.insert_order(new_order(user, None)).await.unwrap();
            // Distinct timestamps keep ordering deterministic.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let filter = OrderFilter::default();
        let page1 = store.list_orders(&filter, 2, None).await.unwrap();
        assert_eq!(page1.orders.len(), 2);
        let cursor = page1.next_cursor.expect("more pages expected");

        let page2 = store.list_orders(&filter, 2, Some(&cursor)).await.unwrap();
        assert_eq!(page2.orders.len(), 2);
        let cursor2 = page2.next_cursor.expect("more pages expected");

        let page3 = store.list_orders(&filter, 2, Some(&cursor2)).await.unwrap();
        assert_eq!(page3.orders.len(), 1);
        assert!(page3.next_cursor.is_none());

        // No duplicates or omissions across the three pages.
        let mut seen: Vec<OrderId> = page1
            .orders
            .iter()
            .chain(&page2.orders)
            .chain(&page3.orders)
            .map(|o| o.id)
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn list_orders_filters_by_user_and_status() {
        let store = InMemoryOrderStore::new();
        let u1 = UserId::new();
        let u2 = UserId::new();
        store.insert_order(new_order(u1, None)).await.unwrap();
        store.insert_order(new_order(u2, None)).await.unwrap();

        let filter = OrderFilter {
            user_id: Some(u1),
            status: None,
        };
        let page = store.list_orders(&filter, 10, None).await.unwrap();
        assert_eq!(page.orders.len(), 1);
        assert_eq!(page.orders[0].user_id, u1);

        let filter = OrderFilter {
            user_id: None,
            status: Some(OrderStatus::Paid),
        };
        let page = store.list_orders(&filter, 10, None).await.unwrap();
        assert!(page.orders.is_empty());
    }

    #[tokio::test]
    async fn lock_commits_status() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new();
        let CreateOutcome::Created(record) =
            store.insert_order(new_order(user, None)).await.unwrap()
        else {
            panic!("expected fresh insert");
        };

        let lock = store.lock_order(record.id).await.unwrap().unwrap();
        assert_eq!(lock.order().status, OrderStatus::Pending);
        let updated = lock.commit_status(OrderStatus::Paid).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Paid);
        assert!(updated.updated_at >= record.updated_at);

        let fetched = store.get_order(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn lock_missing_order_returns_none() {
        let store = InMemoryOrderStore::new();
        assert!(store.lock_order(OrderId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_locks_serialize() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new();
        let CreateOutcome::Created(record) =
            store.insert_order(new_order(user, None)).await.unwrap()
        else {
            panic!("expected fresh insert");
        };

        let lock = store.lock_order(record.id).await.unwrap().unwrap();

        // A second lock attempt must block until the first commits.
        let store2 = store.clone();
        let id = record.id;
        let contender = tokio::spawn(async move {
            let lock = store2.lock_order(id).await.unwrap().unwrap();
            lock.order().status
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        lock.commit_status(OrderStatus::Cancelled).await.unwrap();
        let observed = contender.await.unwrap();
        assert_eq!(observed, OrderStatus::Cancelled);
    }
}
