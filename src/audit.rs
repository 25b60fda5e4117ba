//! Append-only audit log (§3 "Audit row").
//!
//! Audit writes race the response — they are fire-and-forget by design
//! (§9 "Fire-and-forget audit"): a write failure is logged and never
//! propagated to the caller, unlike cache-store failures, which are fatal
//! to the enclosing request.
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::model::AuditRow;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, row: AuditRow);
}

pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for SqliteAuditStore {
    async fn record(&self, row: AuditRow) {
        let parameters = match serde_json::to_string(&row.parameters) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize audit parameters; dropping audit row");
                return;
            }
        };

        let result = sqlx::query(
            "INSERT INTO audit_log (cmdlet, parameters, stdout, stderr, exit_code, duration_ms, scim_user_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&row.cmdlet)
        .bind(&parameters)
        .bind(&row.stdout)
        .bind(&row.stderr)
        .bind(row.exit_code)
        .bind(row.duration_ms)
        .bind(&row.scim_user_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, cmdlet = %row.cmdlet, "failed to write audit row");
        }
    }
}

/// Discards every audit row. Used by tests that exercise the processor
/// without a database, and available outside `#[cfg(test)]` so integration
/// tests in `tests/` can build on it too.
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _row: AuditRow) {}
}
