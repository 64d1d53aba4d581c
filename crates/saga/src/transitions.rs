//! The order state machine: `PENDING -> PAID | CANCELLED`.
//!
//! Both transitions acquire the store's exclusive row lock first and hold it
//! across the whole read-decide-write sequence, so concurrent pay and cancel
//! calls for the same order serialize and exactly one of them commits.

use clients::{EventSink, InventoryClient, ReleaseOutcome, UserDirectory};
use order_store::{OrderStatus, OrderStore};

use crate::error::{Result, SagaError};
use crate::orchestrator::{OrderOrchestrator, OrderReceipt};
use common::OrderId;

impl<S, U, I, E> OrderOrchestrator<S, U, I, E>
where
    S: OrderStore,
    U: UserDirectory,
    I: InventoryClient,
    E: EventSink,
{
    /// Marks a pending order as paid.
    ///
    /// Re-requesting payment of an already-paid order is an idempotent
    /// success; paying a cancelled order is a conflict.
    #[tracing::instrument(skip(self))]
    pub async fn pay_order(&self, order_id: OrderId) -> Result<OrderReceipt> {
        let lock = self
            .store()
            .lock_order(order_id)
            .await?
            .ok_or_else(|| SagaError::NotFound(format!("Order {order_id} not found")))?;

        match lock.order().status {
            OrderStatus::Paid => {
                // Lock drops without a write; the row is already terminal.
                return Ok(OrderReceipt {
                    order_id,
                    status: OrderStatus::Paid,
                });
            }
            OrderStatus::Cancelled => {
                return Err(SagaError::Conflict(format!(
                    "Order {order_id} is cancelled and cannot be paid"
                )));
            }
            OrderStatus::Pending => {}
        }

        let record = lock.commit_status(OrderStatus::Paid).await?;
        metrics::counter!("orders_paid_total").increment(1);
        tracing::info!(%order_id, "order paid");

        self.emit(
            "order_paid",
            serde_json::json!({
                "orderId": record.id,
                "userId": record.user_id,
                "totalAmountCents": record.total_amount.cents(),
            }),
        )
        .await;

        Ok(OrderReceipt {
            order_id: record.id,
            status: record.status,
        })
    }

    /// Cancels a pending order and releases its reserved stock.
    ///
    /// The release runs while the row lock is still held, so a concurrent
    /// pay cannot slip in between the release and the status write.
    /// Re-cancelling an already-cancelled order is an idempotent success;
    /// cancelling a paid order is a conflict.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<OrderReceipt> {
        let mut lock = self
            .store()
            .lock_order(order_id)
            .await?
            .ok_or_else(|| SagaError::NotFound(format!("Order {order_id} not found")))?;

        match lock.order().status {
            OrderStatus::Cancelled => {
                return Ok(OrderReceipt {
                    order_id,
                    status: OrderStatus::Cancelled,
                });
            }
            OrderStatus::Paid => {
                return Err(SagaError::Conflict(format!(
                    "Order {order_id} is paid and cannot be cancelled"
                )));
            }
            OrderStatus::Pending => {}
        }

        // Best effort: a failed release must not block the cancellation.
        let items = lock.items().await?;
        for item in &items {
            match self.inventory().release(&item.product_id, item.quantity).await {
                Ok(ReleaseOutcome::Released) => {}
                Ok(ReleaseOutcome::NotFound) => {
                    tracing::warn!(%order_id, product_id = %item.product_id, "release skipped, product no longer exists");
                }
                Err(e) => {
                    tracing::warn!(%order_id, product_id = %item.product_id, error = %e, "failed to release stock during cancel");
                }
            }
        }

        let record = lock.commit_status(OrderStatus::Cancelled).await?;
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, "order cancelled");

        self.emit(
            "order_cancelled",
            serde_json::json!({ "orderId": record.id }),
        )
        .await;

        Ok(OrderReceipt {
            order_id: record.id,
            status: record.status,
        })
    }
}
