use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;
use crate::middleware::idempotency::IDEMPOTENCY_HEADER;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPayload {
    pub user_id: Uuid,
    pub amount: BigDecimal,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePayload {
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub fee_type: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPayload {
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub campaign_id: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldPayload {
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub transaction_id: Uuid,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// The guard middleware has already verified presence; handlers re-read the
/// key here because the engine records it inside the unit of work.
fn idempotency_key(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .ok_or(AppError::MissingIdempotencyKey)
}

pub async fn credit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreditPayload>,
) -> Result<impl IntoResponse, AppError> {
    let key = idempotency_key(&headers)?;
    let tx = state
        .ledger
        .credit(
            payload.user_id,
            payload.amount,
            &payload.tx_type,
            payload.metadata,
            &key,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn debit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreditPayload>,
) -> Result<impl IntoResponse, AppError> {
    let key = idempotency_key(&headers)?;
    let tx = state
        .ledger
        .debit(
            payload.user_id,
            payload.amount,
            &payload.tx_type,
            payload.metadata,
            &key,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn charge_fee(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<FeePayload>,
) -> Result<impl IntoResponse, AppError> {
    let key = idempotency_key(&headers)?;
    let tx = state
        .ledger
        .charge_fee(
            payload.user_id,
            payload.amount,
            &payload.fee_type,
            payload.metadata,
            &key,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn apply_reward(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RewardPayload>,
) -> Result<impl IntoResponse, AppError> {
    let key = idempotency_key(&headers)?;
    let tx = state
        .ledger
        .apply_reward(
            payload.user_id,
            payload.amount,
            &payload.campaign_id,
            payload.metadata,
            &key,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn freeze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<HoldPayload>,
) -> Result<impl IntoResponse, AppError> {
    let key = idempotency_key(&headers)?;
    let tx = state
        .ledger
        .freeze(payload.user_id, payload.amount, payload.metadata, &key)
        .await?;

    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn unfreeze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<HoldPayload>,
) -> Result<impl IntoResponse, AppError> {
    let key = idempotency_key(&headers)?;
    let tx = state
        .ledger
        .unfreeze(payload.user_id, payload.amount, payload.metadata, &key)
        .await?;

    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let balance = state.ledger.get_balance(user_id).await?;
    Ok(Json(balance))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.ledger.get_transaction(id).await?;
    Ok(Json(tx))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);
    let transactions = state
        .ledger
        .list_transactions(user_id, limit, offset)
        .await?;

    Ok(Json(transactions))
}

pub async fn update_transaction_status(
    State(state): State<AppState>,
    Json(payload): Json<StatusPayload>,
) -> Result<impl IntoResponse, AppError> {
    state
        .ledger
        .update_transaction_status(payload.transaction_id, &payload.status)
        .await?;

    Ok(Json(serde_json::json!({ "status": "updated" })))
}
