use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{AuditLogEntry, Transaction, TransactionDetail, Wallet};

// --- Wallet queries ---

/// Create the wallet row if it does not exist yet. The unique constraint on
/// `user_id` makes concurrent lazy creation race-free: the loser of a
/// create/create race lands on DO NOTHING and both proceed to lock the same
/// row.
pub async fn ensure_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO wallets (id, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .execute(&mut **executor)
    .await?;

    Ok(())
}

/// Acquire the per-wallet exclusive lock for the rest of this database
/// transaction. Blocks until the competing unit of work commits or the
/// transaction-local `lock_timeout` expires (surfaced as 55P03).
pub async fn lock_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<Option<Wallet>> {
    sqlx::query_as::<_, Wallet>(
        r#"
        SELECT id, user_id, balance, frozen_balance, created_at, updated_at
        FROM wallets
        WHERE user_id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut **executor)
    .await
}

/// Bound the wait on the wallet row lock. `SET LOCAL` scopes the setting to
/// the current transaction, so release on commit/rollback is automatic.
/// Postgres does not allow bind parameters in SET; the value is an integer
/// from our own config, never caller input.
pub async fn set_lock_timeout(
    executor: &mut SqlxTransaction<'_, Postgres>,
    timeout_ms: u64,
) -> Result<()> {
    sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", timeout_ms))
        .execute(&mut **executor)
        .await?;

    Ok(())
}

pub async fn get_wallet_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Wallet>> {
    sqlx::query_as::<_, Wallet>(
        r#"
        SELECT id, user_id, balance, frozen_balance, created_at, updated_at
        FROM wallets
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn update_wallet_balances(
    executor: &mut SqlxTransaction<'_, Postgres>,
    wallet_id: Uuid,
    balance: &BigDecimal,
    frozen_balance: &BigDecimal,
) -> Result<()> {
    sqlx::query(
        "UPDATE wallets SET balance = $1, frozen_balance = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(balance)
    .bind(frozen_balance)
    .bind(wallet_id)
    .execute(&mut **executor)
    .await?;

    Ok(())
}

// --- Transaction queries ---

pub async fn insert_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &Transaction,
) -> Result<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            id, wallet_id, user_id, amount, balance_before, balance_after,
            tx_type, metadata, status, idempotency_key, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id, wallet_id, user_id, amount, balance_before, balance_after,
            tx_type, metadata, status, idempotency_key, created_at
        "#,
    )
    .bind(tx.id)
    .bind(tx.wallet_id)
    .bind(tx.user_id)
    .bind(&tx.amount)
    .bind(&tx.balance_before)
    .bind(&tx.balance_after)
    .bind(&tx.tx_type)
    .bind(&tx.metadata)
    .bind(&tx.status)
    .bind(&tx.idempotency_key)
    .bind(tx.created_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn insert_transaction_detail(
    executor: &mut SqlxTransaction<'_, Postgres>,
    detail: &TransactionDetail,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO transaction_details (
            id, transaction_id, user_id, amount, balance_before, balance_after,
            tx_type, metadata, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(detail.id)
    .bind(detail.transaction_id)
    .bind(detail.user_id)
    .bind(&detail.amount)
    .bind(&detail.balance_before)
    .bind(&detail.balance_after)
    .bind(&detail.tx_type)
    .bind(&detail.metadata)
    .bind(detail.created_at)
    .execute(&mut **executor)
    .await?;

    Ok(())
}

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT id, wallet_id, user_id, amount, balance_before, balance_after,
            tx_type, metadata, status, idempotency_key, created_at
        FROM transactions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_transactions_by_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT id, wallet_id, user_id, amount, balance_before, balance_after,
            tx_type, metadata, status, idempotency_key, created_at
        FROM transactions
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Overwrites only the status field. Balances already applied are never
/// touched here; a status update is bookkeeping, not a compensating entry.
pub async fn update_transaction_status(pool: &PgPool, id: Uuid, status: &str) -> Result<u64> {
    let result = sqlx::query("UPDATE transactions SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// --- Idempotency queries ---

pub async fn find_transaction_by_idempotency_key(
    executor: &mut SqlxTransaction<'_, Postgres>,
    key: &str,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT id, wallet_id, user_id, amount, balance_before, balance_after,
            tx_type, metadata, status, idempotency_key, created_at
        FROM transactions
        WHERE idempotency_key = $1
        "#,
    )
    .bind(key)
    .fetch_optional(&mut **executor)
    .await
}

/// Fast-path duplicate check used by the idempotency middleware, outside any
/// lock. The authoritative check is the unique index hit inside the unit of
/// work.
pub async fn idempotency_key_exists(pool: &PgPool, key: &str) -> Result<bool> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM transactions WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(row.is_some())
}

// --- Audit log queries ---

pub async fn insert_audit_log(pool: &PgPool, entry: &AuditLogEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (
            id, method, url, body, actor, response, status_code, timestamp
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.method)
    .bind(&entry.url)
    .bind(&entry.body)
    .bind(&entry.actor)
    .bind(&entry.response)
    .bind(entry.status_code)
    .bind(entry.timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_audit_log(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<AuditLogEntry>> {
    sqlx::query_as::<_, AuditLogEntry>(
        r#"
        SELECT id, method, url, body, actor, response, status_code, timestamp
        FROM audit_log
        ORDER BY timestamp DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}
