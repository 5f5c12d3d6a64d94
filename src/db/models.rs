use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle states a ledger transaction may be in. Stored as text; parsing
/// through this enum is what rejects unknown statuses at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Some(TransactionStatus::Pending),
            "success" => Some(TransactionStatus::Success),
            "failed" => Some(TransactionStatus::Failed),
            "cancelled" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub frozen_balance: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable record of one ledger mutation. `balance_before`,
/// `balance_after` and `amount` never change after insert; only `status` may
/// be rewritten through the explicit status-update operation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub metadata: Option<serde_json::Value>,
    pub status: String,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallet_id: Uuid,
        user_id: Uuid,
        amount: BigDecimal,
        balance_before: BigDecimal,
        balance_after: BigDecimal,
        tx_type: &str,
        metadata: Option<serde_json::Value>,
        status: TransactionStatus,
        idempotency_key: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            user_id,
            amount,
            balance_before,
            balance_after,
            tx_type: tx_type.to_string(),
            metadata,
            status: status.as_str().to_string(),
            idempotency_key,
            created_at: Utc::now(),
        }
    }
}

/// Append-only line item attached 1:1 to a transaction, duplicating the
/// amount and balance snapshot for independent auditing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl TransactionDetail {
    pub fn for_transaction(tx: &Transaction) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id: tx.id,
            user_id: tx.user_id,
            amount: tx.amount.clone(),
            balance_before: tx.balance_before.clone(),
            balance_after: tx.balance_after.clone(),
            tx_type: tx.tx_type.clone(),
            metadata: tx.metadata.clone(),
            created_at: Utc::now(),
        }
    }
}

/// One row per inbound mutation attempt, success or failure. Lifecycle is
/// independent from the transactions it describes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub method: String,
    pub url: String,
    pub body: Option<serde_json::Value>,
    pub actor: Option<String>,
    pub response: Option<serde_json::Value>,
    pub status_code: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        method: String,
        url: String,
        body: Option<serde_json::Value>,
        actor: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            url,
            body,
            actor,
            response: None,
            status_code: None,
            timestamp: Utc::now(),
        }
    }
}
