//! The create-order saga.

use clients::{EventSink, InventoryClient, ReleaseOutcome, ReserveOutcome, UserDirectory};
use common::{Money, OrderId, ProductId, UserId};
use order_store::{
    CreateOutcome, NewOrder, NewOrderItem, OrderFilter, OrderItemRecord, OrderRecord, OrderStatus,
    OrderStore, PageCursor,
};

use crate::error::{Result, SagaError};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// A requested order line.
#[derive(Debug, Clone)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Input to the create-order saga.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub items: Vec<OrderItemRequest>,
    /// Caller-supplied shipping address; when absent, the user's first
    /// stored address is adopted as the default.
    pub shipping_address: Option<serde_json::Value>,
    /// Deduplication token for retried requests.
    pub idempotency_key: Option<String>,
}

/// Identity and status of an order as returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// Result of a create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOrderOutcome {
    /// A new order was committed.
    Created(OrderReceipt),
    /// An order with the same idempotency key already existed; its receipt
    /// is returned unchanged.
    Replayed(OrderReceipt),
}

impl CreateOrderOutcome {
    /// The receipt regardless of whether the call created or replayed.
    pub fn receipt(&self) -> OrderReceipt {
        match self {
            CreateOrderOutcome::Created(receipt) | CreateOrderOutcome::Replayed(receipt) => {
                *receipt
            }
        }
    }
}

/// Listing parameters as received from the caller, before clamping.
#[derive(Debug, Clone, Default)]
pub struct ListOrdersRequest {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// One page of orders with an encoded continuation token.
#[derive(Debug, Clone)]
pub struct OrderListing {
    pub orders: Vec<OrderRecord>,
    pub next_cursor: Option<String>,
}

/// Orchestrates order creation, lookup, and state transitions.
///
/// All collaborators are injected at construction so tests can substitute
/// doubles for the user directory, inventory resource, store, and sink.
pub struct OrderOrchestrator<S, U, I, E>
where
    S: OrderStore,
    U: UserDirectory,
    I: InventoryClient,
    E: EventSink,
{
    store: S,
    users: U,
    inventory: I,
    events: E,
}

impl<S, U, I, E> OrderOrchestrator<S, U, I, E>
where
    S: OrderStore,
    U: UserDirectory,
    I: InventoryClient,
    E: EventSink,
{
    /// Creates a new orchestrator.
    pub fn new(store: S, users: U, inventory: I, events: E) -> Self {
        Self {
            store,
            users,
            inventory,
            events,
        }
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn inventory(&self) -> &I {
        &self.inventory
    }

    /// Executes the create-order saga.
    ///
    /// Reservation is not atomic with the durable commit: a crash strictly
    /// between a successful reservation and the subsequent failure handling
    /// leaves that stock reserved until reconciled out of band. Failures
    /// observed in-process always release the reserved prefix before the
    /// error is returned.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<CreateOrderOutcome> {
        metrics::counter!("order_create_total").increment(1);
        let started = std::time::Instant::now();

        // 1. Idempotency fast path, before any remote call or reservation.
        if let Some(key) = &request.idempotency_key
            && let Some(existing) = self.store.find_by_idempotency_key(key).await?
        {
            tracing::info!(order_id = %existing.id, "idempotent replay");
            return Ok(CreateOrderOutcome::Replayed(OrderReceipt {
                order_id: existing.id,
                status: existing.status,
            }));
        }

        // 2. Validation, with no side effects on failure.
        if request.items.is_empty() {
            return Err(SagaError::Validation(
                "items must be a non-empty list".to_string(),
            ));
        }
        for item in &request.items {
            if item.product_id.is_empty() {
                return Err(SagaError::Validation(
                    "each item requires a productId".to_string(),
                ));
            }
            if item.quantity == 0 {
                return Err(SagaError::Validation("quantity must be > 0".to_string()));
            }
        }

        // 3. The user must exist before anything is mutated.
        let user = self.users.fetch_user(request.user_id).await?;
        if user.is_none() {
            return Err(SagaError::Validation(format!(
                "Invalid user ID {}",
                request.user_id
            )));
        }

        // 4. Adopt the user's first stored address when none was supplied.
        // An unreachable directory or an empty address list is not fatal.
        let shipping_address = match request.shipping_address {
            Some(address) => Some(address),
            None => match self.users.fetch_addresses(request.user_id).await {
                Ok(addresses) => addresses.into_iter().next(),
                Err(e) => {
                    tracing::debug!(error = %e, "address lookup failed, proceeding without");
                    None
                }
            },
        };

        // 5. Price snapshot and informational stock check. Real enforcement
        // happens at reservation time.
        let mut priced_items = Vec::with_capacity(request.items.len());
        let mut total_amount = Money::zero();
        for item in &request.items {
            let product = self
                .inventory
                .fetch_product(&item.product_id)
                .await?
                .ok_or_else(|| {
                    SagaError::Validation(format!(
                        "Product with ID {} not found",
                        item.product_id
                    ))
                })?;
            if product.stock < item.quantity {
                return Err(SagaError::Conflict(format!(
                    "Not enough stock for product {}",
                    product.name
                )));
            }
            total_amount += product.unit_price.multiply(item.quantity);
            priced_items.push(NewOrderItem {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price: product.unit_price,
            });
        }

        // 6. Reserve each item in caller order, compensating the reserved
        // prefix on the first failure.
        let mut reserved: Vec<(ProductId, u32)> = Vec::with_capacity(priced_items.len());
        for item in &priced_items {
            let outcome = match self.inventory.reserve(&item.product_id, item.quantity).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.release_reserved(&reserved).await;
                    return Err(e.into());
                }
            };
            match outcome {
                ReserveOutcome::Reserved => {
                    reserved.push((item.product_id.clone(), item.quantity));
                }
                ReserveOutcome::InsufficientStock => {
                    self.release_reserved(&reserved).await;
                    return Err(SagaError::Conflict(format!(
                        "Stock reservation failed for product {}",
                        item.product_id
                    )));
                }
                ReserveOutcome::NotFound => {
                    self.release_reserved(&reserved).await;
                    return Err(SagaError::Validation(format!(
                        "Product with ID {} not found",
                        item.product_id
                    )));
                }
            }
        }

        // 7. Durable commit. Reservation must never outlive a failed commit.
        let new_order = NewOrder {
            id: OrderId::new(),
            user_id: request.user_id,
            idempotency_key: request.idempotency_key,
            total_amount,
            shipping_address,
            items: priced_items,
        };
        let record = match self.store.insert_order(new_order).await {
            Ok(CreateOutcome::Created(record)) => record,
            Ok(CreateOutcome::Duplicate(winner)) => {
                // Lost a concurrent duplicate-key race. The winner already
                // holds its own reservation, so this call's must be undone.
                self.release_reserved(&reserved).await;
                tracing::info!(order_id = %winner.id, "duplicate-key race, returning winner");
                return Ok(CreateOrderOutcome::Replayed(OrderReceipt {
                    order_id: winner.id,
                    status: winner.status,
                }));
            }
            Err(e) => {
                self.release_reserved(&reserved).await;
                metrics::counter!("order_create_failures_total").increment(1);
                return Err(e.into());
            }
        };

        // 8. Best-effort event emission; never rolls back the commit.
        let items_payload: Vec<serde_json::Value> = record_items_payload(&record, &self.store)
            .await
            .unwrap_or_default();
        self.emit(
            "order_created",
            serde_json::json!({
                "orderId": record.id,
                "userId": record.user_id,
                "totalAmountCents": record.total_amount.cents(),
                "items": items_payload,
            }),
        )
        .await;

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_create_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(order_id = %record.id, total = %record.total_amount, "order created");

        Ok(CreateOrderOutcome::Created(OrderReceipt {
            order_id: record.id,
            status: record.status,
        }))
    }

    /// Loads an order and its items.
    pub async fn get_order(&self, order_id: OrderId) -> Result<(OrderRecord, Vec<OrderItemRecord>)> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| SagaError::NotFound(format!("Order {order_id} not found")))?;
        let items = self.store.get_items(order_id).await?;
        Ok((order, items))
    }

    /// Lists orders newest-first with keyset pagination.
    pub async fn list_orders(&self, request: ListOrdersRequest) -> Result<OrderListing> {
        let limit = request
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let cursor = request
            .cursor
            .as_deref()
            .map(str::parse::<PageCursor>)
            .transpose()
            .map_err(|_| SagaError::Validation("Invalid cursor".to_string()))?;

        let filter = OrderFilter {
            user_id: request.user_id,
            status: request.status,
        };
        let page = self.store.list_orders(&filter, limit, cursor.as_ref()).await?;

        Ok(OrderListing {
            orders: page.orders,
            next_cursor: page.next_cursor.map(|c| c.encode()),
        })
    }

    /// Releases every reserved quantity, in reservation order, best effort.
    pub(crate) async fn release_reserved(&self, reserved: &[(ProductId, u32)]) {
        if reserved.is_empty() {
            return;
        }
        metrics::counter!("saga_compensations_total").increment(1);
        for (product_id, quantity) in reserved {
            match self.inventory.release(product_id, *quantity).await {
                Ok(ReleaseOutcome::Released) => {}
                Ok(ReleaseOutcome::NotFound) => {
                    tracing::warn!(%product_id, "release skipped, product no longer exists");
                }
                Err(e) => {
                    tracing::warn!(%product_id, quantity, error = %e, "failed to release reserved stock");
                }
            }
        }
    }

    /// Publishes a lifecycle event, swallowing and logging failures.
    pub(crate) async fn emit(&self, event_type: &str, payload: serde_json::Value) {
        if let Err(e) = self.events.publish(event_type, payload).await {
            tracing::warn!(event_type, error = %e, "failed to publish event");
        }
    }
}

async fn record_items_payload<S: OrderStore>(
    record: &OrderRecord,
    store: &S,
) -> Result<Vec<serde_json::Value>> {
    let items = store.get_items(record.id).await?;
    Ok(items
        .iter()
        .map(|item| {
            serde_json::json!({
                "productId": item.product_id,
                "quantity": item.quantity,
                "unitPriceCents": item.unit_price.cents(),
            })
        })
        .collect())
}
