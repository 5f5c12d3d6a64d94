//! The ledger engine: every balance mutation runs as one unit of work.
//!
//! A unit of work is {read wallet under FOR UPDATE, compute new balance,
//! write wallet, write transaction, write transaction detail} inside a single
//! database transaction. The row lock serializes mutations per wallet;
//! different wallets proceed in parallel. Dropping the sqlx transaction on
//! any early return rolls everything back and releases the lock.

use bigdecimal::BigDecimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{Transaction, TransactionDetail, TransactionStatus, Wallet};
use crate::db::queries;
use crate::error::AppError;

#[derive(Debug, Serialize, PartialEq)]
pub struct BalanceSummary {
    #[serde(rename = "availableBalance")]
    pub available_balance: BigDecimal,
    #[serde(rename = "frozenBalance")]
    pub frozen_balance: BigDecimal,
}

#[derive(Clone)]
pub struct LedgerService {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl LedgerService {
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }

    /// Credit the wallet, creating it with zero balances if absent.
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        tx_type: &str,
        metadata: Option<serde_json::Value>,
        idempotency_key: &str,
    ) -> Result<Transaction, AppError> {
        self.deposit_funds(user_id, amount, tx_type, metadata, idempotency_key)
            .await
    }

    /// Debit the wallet. An oversized debit leaves the wallet untouched but
    /// still commits a FAILED transaction before surfacing the error.
    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        tx_type: &str,
        metadata: Option<serde_json::Value>,
        idempotency_key: &str,
    ) -> Result<Transaction, AppError> {
        self.withdraw_funds(user_id, amount, tx_type, metadata, idempotency_key)
            .await
    }

    /// Same contract as debit, tagged with the fee type.
    pub async fn charge_fee(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        fee_type: &str,
        metadata: Option<serde_json::Value>,
        idempotency_key: &str,
    ) -> Result<Transaction, AppError> {
        self.withdraw_funds(user_id, amount, fee_type, metadata, idempotency_key)
            .await
    }

    /// Same contract as credit; the campaign id rides along in metadata and
    /// never affects balance arithmetic.
    pub async fn apply_reward(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        campaign_id: &str,
        metadata: Option<serde_json::Value>,
        idempotency_key: &str,
    ) -> Result<Transaction, AppError> {
        let metadata = attach_campaign(metadata, campaign_id);
        self.deposit_funds(user_id, amount, "reward", Some(metadata), idempotency_key)
            .await
    }

    /// Move funds from the available balance into the frozen balance.
    /// Follows the debit failure policy when the available balance is short.
    pub async fn freeze(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        metadata: Option<serde_json::Value>,
        idempotency_key: &str,
    ) -> Result<Transaction, AppError> {
        let amount = normalize_amount(amount)?;
        let mut tx = self.begin_guarded(idempotency_key).await?;
        let wallet = lock_existing_wallet(&mut tx, user_id).await?;

        if wallet.balance < amount {
            return self
                .commit_failed(tx, &wallet, amount, "freeze", metadata)
                .await;
        }

        let balance_after = &wallet.balance - &amount;
        let frozen_after = &wallet.frozen_balance + &amount;
        queries::update_wallet_balances(&mut tx, wallet.id, &balance_after, &frozen_after).await?;

        let record = Transaction::new(
            wallet.id,
            user_id,
            amount,
            wallet.balance.clone(),
            balance_after,
            "freeze",
            metadata,
            TransactionStatus::Success,
            Some(idempotency_key.to_string()),
        );
        self.commit_success(tx, record).await
    }

    /// Release previously frozen funds back into the available balance.
    /// Fails without a durable record when the hold is smaller than the
    /// requested release; nothing was at stake on the spendable side.
    pub async fn unfreeze(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        metadata: Option<serde_json::Value>,
        idempotency_key: &str,
    ) -> Result<Transaction, AppError> {
        let amount = normalize_amount(amount)?;
        let mut tx = self.begin_guarded(idempotency_key).await?;
        let wallet = lock_existing_wallet(&mut tx, user_id).await?;

        if wallet.frozen_balance < amount {
            return Err(AppError::InsufficientFunds);
        }

        let balance_after = &wallet.balance + &amount;
        let frozen_after = &wallet.frozen_balance - &amount;
        queries::update_wallet_balances(&mut tx, wallet.id, &balance_after, &frozen_after).await?;

        let record = Transaction::new(
            wallet.id,
            user_id,
            amount,
            wallet.balance.clone(),
            balance_after,
            "unfreeze",
            metadata,
            TransactionStatus::Success,
            Some(idempotency_key.to_string()),
        );
        self.commit_success(tx, record).await
    }

    /// Read-only; `{0, 0}` when the wallet does not exist. Never creates one.
    pub async fn get_balance(&self, user_id: Uuid) -> Result<BalanceSummary, AppError> {
        let wallet = queries::get_wallet_by_user(&self.pool, user_id).await?;

        Ok(match wallet {
            Some(w) => BalanceSummary {
                available_balance: w.balance,
                frozen_balance: w.frozen_balance,
            },
            None => BalanceSummary {
                available_balance: BigDecimal::from(0),
                frozen_balance: BigDecimal::from(0),
            },
        })
    }

    /// Rewrites only the status field of an existing transaction. Balances
    /// already applied are not reversed; this is bookkeeping, not a
    /// compensating transaction.
    pub async fn update_transaction_status(
        &self,
        transaction_id: Uuid,
        status: &str,
    ) -> Result<(), AppError> {
        let status = TransactionStatus::parse(status)
            .ok_or_else(|| AppError::InvalidStatus(status.to_string()))?;

        let updated =
            queries::update_transaction_status(&self.pool, transaction_id, status.as_str())
                .await?;
        if updated == 0 {
            return Err(AppError::TransactionNotFound(transaction_id.to_string()));
        }

        Ok(())
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction, AppError> {
        queries::get_transaction(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(id.to_string()))
    }

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(queries::list_transactions_by_user(&self.pool, user_id, limit, offset).await?)
    }

    async fn deposit_funds(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        tx_type: &str,
        metadata: Option<serde_json::Value>,
        idempotency_key: &str,
    ) -> Result<Transaction, AppError> {
        let amount = normalize_amount(amount)?;
        let mut tx = self.begin_guarded(idempotency_key).await?;

        // Lazy creation happens before the lock so credit and reward always
        // have a row to lock. The user_id unique constraint resolves
        // concurrent creation.
        queries::ensure_wallet(&mut tx, user_id).await?;
        let wallet = lock_existing_wallet(&mut tx, user_id).await?;

        let balance_after = &wallet.balance + &amount;
        queries::update_wallet_balances(&mut tx, wallet.id, &balance_after, &wallet.frozen_balance)
            .await?;

        let record = Transaction::new(
            wallet.id,
            user_id,
            amount,
            wallet.balance.clone(),
            balance_after,
            tx_type,
            metadata,
            TransactionStatus::Success,
            Some(idempotency_key.to_string()),
        );
        self.commit_success(tx, record).await
    }

    async fn withdraw_funds(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        tx_type: &str,
        metadata: Option<serde_json::Value>,
        idempotency_key: &str,
    ) -> Result<Transaction, AppError> {
        let amount = normalize_amount(amount)?;
        let mut tx = self.begin_guarded(idempotency_key).await?;
        let wallet = lock_existing_wallet(&mut tx, user_id).await?;

        if wallet.balance < amount {
            return self
                .commit_failed(tx, &wallet, amount, tx_type, metadata)
                .await;
        }

        let balance_after = &wallet.balance - &amount;
        queries::update_wallet_balances(&mut tx, wallet.id, &balance_after, &wallet.frozen_balance)
            .await?;

        let record = Transaction::new(
            wallet.id,
            user_id,
            amount,
            wallet.balance.clone(),
            balance_after,
            tx_type,
            metadata,
            TransactionStatus::Success,
            Some(idempotency_key.to_string()),
        );
        self.commit_success(tx, record).await
    }

    /// Open the unit of work: bounded lock wait plus the in-transaction
    /// duplicate check. The pre-check closes the common case early; the
    /// unique index on idempotency_key settles true races at insert time.
    async fn begin_guarded(
        &self,
        idempotency_key: &str,
    ) -> Result<SqlxTransaction<'static, Postgres>, AppError> {
        let mut tx = self.pool.begin().await?;
        queries::set_lock_timeout(&mut tx, self.lock_timeout_ms).await?;

        if queries::find_transaction_by_idempotency_key(&mut tx, idempotency_key)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateRequest);
        }

        Ok(tx)
    }

    async fn commit_success(
        &self,
        mut tx: SqlxTransaction<'static, Postgres>,
        record: Transaction,
    ) -> Result<Transaction, AppError> {
        let saved = queries::insert_transaction(&mut tx, &record).await?;
        queries::insert_transaction_detail(&mut tx, &TransactionDetail::for_transaction(&saved))
            .await?;
        tx.commit().await?;

        tracing::info!(
            transaction_id = %saved.id,
            user_id = %saved.user_id,
            tx_type = %saved.tx_type,
            amount = %saved.amount,
            balance_after = %saved.balance_after,
            "ledger mutation committed"
        );
        Ok(saved)
    }

    /// Durable record of a rejected withdrawal: balance_after equals
    /// balance_before, the wallet row is not updated, and the record commits
    /// even though the operation itself fails. The idempotency key is not
    /// consumed, so the caller may retry after funding the wallet.
    async fn commit_failed(
        &self,
        mut tx: SqlxTransaction<'static, Postgres>,
        wallet: &Wallet,
        amount: BigDecimal,
        tx_type: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Transaction, AppError> {
        let record = Transaction::new(
            wallet.id,
            wallet.user_id,
            amount,
            wallet.balance.clone(),
            wallet.balance.clone(),
            tx_type,
            metadata,
            TransactionStatus::Failed,
            None,
        );
        let saved = queries::insert_transaction(&mut tx, &record).await?;
        queries::insert_transaction_detail(&mut tx, &TransactionDetail::for_transaction(&saved))
            .await?;
        tx.commit().await?;

        tracing::warn!(
            transaction_id = %saved.id,
            user_id = %saved.user_id,
            tx_type = %saved.tx_type,
            amount = %saved.amount,
            balance = %saved.balance_before,
            "insufficient funds, failed transaction recorded"
        );
        Err(AppError::InsufficientFunds)
    }
}

async fn lock_existing_wallet(
    tx: &mut SqlxTransaction<'static, Postgres>,
    user_id: Uuid,
) -> Result<Wallet, AppError> {
    queries::lock_wallet(tx, user_id)
        .await?
        .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))
}

/// Amounts must be strictly positive and carry at most 2 fractional digits;
/// anything finer would silently drift once stored in NUMERIC(12,2).
fn normalize_amount(amount: BigDecimal) -> Result<BigDecimal, AppError> {
    if amount <= BigDecimal::from(0) {
        return Err(AppError::InvalidAmount);
    }

    let scaled = amount.with_scale(2);
    if scaled != amount {
        return Err(AppError::InvalidAmount);
    }

    Ok(scaled)
}

fn attach_campaign(metadata: Option<serde_json::Value>, campaign_id: &str) -> serde_json::Value {
    match metadata {
        Some(serde_json::Value::Object(mut map)) => {
            map.insert(
                "campaign_id".to_string(),
                serde_json::Value::String(campaign_id.to_string()),
            );
            serde_json::Value::Object(map)
        }
        Some(other) => serde_json::json!({
            "campaign_id": campaign_id,
            "metadata": other,
        }),
        None => serde_json::json!({ "campaign_id": campaign_id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_amount_accepts_two_digit_scale() {
        let amount = "10.05".parse::<BigDecimal>().unwrap();
        assert_eq!(normalize_amount(amount.clone()).unwrap(), amount);
    }

    #[test]
    fn test_normalize_amount_pads_integers() {
        let normalized = normalize_amount(BigDecimal::from(10)).unwrap();
        assert_eq!(normalized, BigDecimal::from(10));
    }

    #[test]
    fn test_normalize_amount_rejects_zero() {
        assert!(matches!(
            normalize_amount(BigDecimal::from(0)),
            Err(AppError::InvalidAmount)
        ));
    }

    #[test]
    fn test_normalize_amount_rejects_negative() {
        assert!(matches!(
            normalize_amount(BigDecimal::from(-5)),
            Err(AppError::InvalidAmount)
        ));
    }

    #[test]
    fn test_normalize_amount_rejects_sub_cent_precision() {
        let amount = "10.005".parse::<BigDecimal>().unwrap();
        assert!(matches!(
            normalize_amount(amount),
            Err(AppError::InvalidAmount)
        ));
    }

    #[test]
    fn test_attach_campaign_merges_into_object() {
        let merged = attach_campaign(
            Some(serde_json::json!({"source": "promo"})),
            "summer-2024",
        );
        assert_eq!(merged["campaign_id"], "summer-2024");
        assert_eq!(merged["source"], "promo");
    }

    #[test]
    fn test_attach_campaign_wraps_non_object() {
        let merged = attach_campaign(Some(serde_json::json!("free-text")), "c1");
        assert_eq!(merged["campaign_id"], "c1");
        assert_eq!(merged["metadata"], "free-text");
    }

    #[test]
    fn test_attach_campaign_without_metadata() {
        let merged = attach_campaign(None, "c2");
        assert_eq!(merged, serde_json::json!({"campaign_id": "c2"}));
    }

    #[test]
    fn test_balance_summary_field_names() {
        let summary = BalanceSummary {
            available_balance: BigDecimal::from(5),
            frozen_balance: BigDecimal::from(0),
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value.get("availableBalance").is_some());
        assert!(value.get("frozenBalance").is_some());
    }
}
