//! Subscribe, inspect and unsubscribe price alerts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::ApiState;
use crate::engine::{SubscribeReceipt, SubscriptionStatus};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub target_price: Decimal,
    pub delivery_target: String,
}

/// `PUT /subscriptions/:id`: create or overwrite, always reactivates.
pub async fn put_subscription(
    State(state): State<ApiState>,
    Path(subscriber_id): Path<String>,
    Json(body): Json<SubscribeRequest>,
) -> Result<Json<SubscribeReceipt>, AppError> {
    let receipt = state
        .engine
        .subscribe(&subscriber_id, body.target_price, &body.delivery_target)
        .await?;
    Ok(Json(receipt))
}

/// `GET /subscriptions/:id`
pub async fn get_subscription(
    State(state): State<ApiState>,
    Path(subscriber_id): Path<String>,
) -> Result<Json<SubscriptionStatus>, AppError> {
    state
        .engine
        .subscription_status(&subscriber_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No subscription for {}", subscriber_id)))
}

/// `DELETE /subscriptions/:id`: deactivates; unknown ids are a no-op.
pub async fn delete_subscription(
    State(state): State<ApiState>,
    Path(subscriber_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.engine.unsubscribe(&subscriber_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
