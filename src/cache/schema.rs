//! §4.F cache store schema (SQLite).
use sqlx::SqlitePool;

use crate::error::AppResult;

pub async fn init_schema(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_rows (
            id TEXT PRIMARY KEY,
            ad_object_guid TEXT,
            sam_account_name TEXT UNIQUE,
            scim_resource TEXT NOT NULL,
            ad_resource TEXT,
            sync_status TEXT NOT NULL,
            last_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_rows_created_at ON cache_rows (created_at ASC)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cmdlet TEXT NOT NULL,
            parameters TEXT NOT NULL,
            stdout TEXT,
            stderr TEXT,
            exit_code INTEGER,
            duration_ms INTEGER NOT NULL,
            scim_user_id TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
