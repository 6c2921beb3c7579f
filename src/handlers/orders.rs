//! Read-side order API and the HTTP ingest endpoint.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::bus::{Headers, Record, IDEMPOTENCY_KEY_HEADER};
use crate::dto::{OrderRequest, OrderResponse};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let size = params.size.unwrap_or(10).clamp(1, 100);
    let page = params.page.unwrap_or(0).max(0);

    let orders = state.repository.list(size, page * size).await?;
    let total = state.repository.count().await?;

    let responses: Vec<OrderResponse> = orders.iter().map(OrderResponse::from_order).collect();

    Ok(Json(json!({
        "orders": responses,
        "page": page,
        "size": size,
        "totalElements": total,
    })))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .repository
        .find_by_id(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

    Ok(Json(OrderResponse::from_order(&order)))
}

pub async fn get_order_items(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .repository
        .find_by_id(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

    let response = OrderResponse::from_order(&order);
    Ok(Json(json!({ "items": response.items })))
}

/// Accepts an order request over HTTP and publishes it to the received
/// topic. Processing stays asynchronous; the caller polls the read API or
/// watches the completion topic.
pub async fn submit_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::BadRequest(format!("missing {IDEMPOTENCY_KEY_HEADER} header"))
        })?;

    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let payload = serde_json::to_vec(&request)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let record = Record::new(
        Some(idempotency_key.clone()),
        payload,
        Headers::new().with(IDEMPOTENCY_KEY_HEADER, idempotency_key.as_str()),
    );

    state
        .producer
        .send(&state.received_topic, record)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Order accepted for processing",
            "idempotencyKey": idempotency_key,
        })),
    ))
}
