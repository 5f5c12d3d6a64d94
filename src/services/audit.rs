//! Best-effort audit persistence.
//!
//! Audit rows are written off the request path. A failed audit write is
//! logged and dropped; it must never turn a committed ledger mutation into a
//! caller-visible error.

use sqlx::PgPool;

use crate::db::models::AuditLogEntry;
use crate::db::queries;

#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist one entry asynchronously. Returns immediately; the caller
    /// cannot observe (and must not depend on) the outcome.
    pub fn record(&self, entry: AuditLogEntry) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = queries::insert_audit_log(&pool, &entry).await {
                tracing::error!(
                    method = %entry.method,
                    url = %entry.url,
                    "failed to persist audit log entry: {}",
                    e
                );
            }
        });
    }
}
