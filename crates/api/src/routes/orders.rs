//! Order creation, listing, and state transition endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use clients::{InMemoryEventSink, InMemoryInventory, InMemoryUserDirectory};
use common::{OrderId, ProductId, UserId};
use order_store::{OrderItemRecord, OrderRecord, OrderStatus, OrderStore};
use saga::{CreateOrderOutcome, OrderOrchestrator};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore> {
    pub orchestrator:
        OrderOrchestrator<S, InMemoryUserDirectory, InMemoryInventory, InMemoryEventSink>,
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderBody {
    pub user_id: String,
    pub items: Vec<OrderItemBody>,
    #[serde(default)]
    pub shipping_address: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemBody {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub total_amount_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<serde_json::Value>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummaryResponse {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub total_amount_cents: i64,
    pub created_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListResponse {
    pub orders: Vec<OrderSummaryResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub order_id: String,
    pub status: String,
}

fn order_response(record: OrderRecord, items: Vec<OrderItemRecord>) -> OrderResponse {
    OrderResponse {
        id: record.id.to_string(),
        user_id: record.user_id.to_string(),
        status: record.status.as_str().to_string(),
        total_amount_cents: record.total_amount.cents(),
        shipping_address: record.shipping_address,
        items: items
            .into_iter()
            .map(|item| OrderItemResponse {
                product_id: item.product_id.to_string(),
                quantity: item.quantity,
                unit_price_cents: item.unit_price.cents(),
            })
            .collect(),
        created_at: record.created_at.to_rfc3339(),
        updated_at: record.updated_at.to_rfc3339(),
    }
}

// -- Handlers --

/// POST /orders — run the create-order saga.
///
/// Returns 201 for a fresh order and 200 when an `Idempotency-Key` replay
/// (or a lost duplicate-key race) resolved to an existing order.
#[tracing::instrument(skip(state, headers, body))]
pub async fn create<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderBody>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let request = saga::CreateOrderRequest {
        user_id,
        items: body
            .items
            .into_iter()
            .map(|item| saga::OrderItemRequest {
                product_id: ProductId::new(item.product_id),
                quantity: item.quantity,
            })
            .collect(),
        shipping_address: body.shipping_address,
        idempotency_key,
    };

    let outcome = state.orchestrator.create_order(request).await?;
    let status_code = match &outcome {
        CreateOrderOutcome::Created(_) => StatusCode::CREATED,
        CreateOrderOutcome::Replayed(_) => StatusCode::OK,
    };

    let (record, items) = state.orchestrator.get_order(outcome.receipt().order_id).await?;
    Ok((status_code, Json(order_response(record, items))))
}

/// GET /orders/{id} — load an order and its items.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let (record, items) = state.orchestrator.get_order(order_id).await?;
    Ok(Json(order_response(record, items)))
}

/// GET /orders — list orders newest-first with keyset pagination.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let user_id = query.user_id.as_deref().map(parse_user_id).transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<OrderStatus>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid status: {s}")))
        })
        .transpose()?;

    let listing = state
        .orchestrator
        .list_orders(saga::ListOrdersRequest {
            user_id,
            status,
            limit: query.limit,
            cursor: query.cursor,
        })
        .await?;

    Ok(Json(OrderListResponse {
        orders: listing
            .orders
            .into_iter()
            .map(|o| OrderSummaryResponse {
                id: o.id.to_string(),
                user_id: o.user_id.to_string(),
                status: o.status.as_str().to_string(),
                total_amount_cents: o.total_amount.cents(),
                created_at: o.created_at.to_rfc3339(),
            })
            .collect(),
        next_cursor: listing.next_cursor,
    }))
}

/// POST /orders/{id}/pay — transition a pending order to paid.
#[tracing::instrument(skip(state))]
pub async fn pay<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let receipt = state.orchestrator.pay_order(order_id).await?;
    Ok(Json(TransitionResponse {
        order_id: receipt.order_id.to_string(),
        status: receipt.status.as_str().to_string(),
    }))
}

/// POST /orders/{id}/cancel — cancel a pending order and release its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let receipt = state.orchestrator.cancel_order(order_id).await?;
    Ok(Json(TransitionResponse {
        order_id: receipt.order_id.to_string(),
        status: receipt.status.as_str().to_string(),
    }))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}

fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid user ID: {e}")))?;
    Ok(UserId::from_uuid(uuid))
}
