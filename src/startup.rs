//! Process bring-up: schema init and `AppState` wiring. Configuration
//! problems are fatal before the listener binds (SPEC_FULL.md
//! "Configuration").
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::audit::{AuditSink, SqliteAuditStore};
use crate::cache::{schema, CacheStore, SqliteCacheStore};
use crate::config::AppConfig;
use crate::directory::executor::ProcessExecutor;
use crate::directory::DirectoryTool;
use crate::error::{AppError, AppResult};
use crate::processor::Processor;
use crate::routes::AppState;

/// Opens the SQLite pool backing both the cache and the audit log
/// (SPEC_FULL.md "database": they share one connection pool) and runs the
/// schema migration.
pub async fn connect_database(config: &AppConfig) -> AppResult<SqlitePool> {
    let options: SqliteConnectOptions = config
        .database
        .url
        .parse()
        .map_err(|e| AppError::Configuration(format!("invalid database url: {}", e)))?;
    let options = options.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(options)
        .await?;

    schema::init_schema(&pool).await?;

    Ok(pool)
}

/// Builds the fully wired application state: cache store, audit store,
/// directory tool, and request processor.
pub fn build_app_state(config: Arc<AppConfig>, pool: SqlitePool) -> Arc<AppState> {
    let cache: Arc<dyn CacheStore> = Arc::new(SqliteCacheStore::new(pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(SqliteAuditStore::new(pool));
    let executor = Arc::new(ProcessExecutor::new(
        config.directory.tool_path.clone(),
        config.directory.timeout_secs,
    ));
    let directory = DirectoryTool::new(executor, audit, config.directory.default_password.clone());
    let processor = Processor::new(cache, directory, config.directory.base_ou.clone());

    Arc::new(AppState {
        processor,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, DatabaseConfig, DirectoryConfig, ServerConfig};

    fn test_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://127.0.0.1:8080".to_string(),
                tls_cert_path: None,
                tls_key_path: None,
            },
            directory: DirectoryConfig {
                base_ou: None,
                default_password: "P@ssw0rd!".to_string(),
                tool_path: "pwsh".to_string(),
                server_hostname: None,
                timeout_secs: 30,
            },
            auth: AuthConfig {
                api_key: "test-key".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
        }
    }

    #[tokio::test]
    async fn connect_database_runs_schema_migration() {
        let config = test_config();
        let pool = connect_database(&config).await.unwrap();
        // Schema is idempotent: a second init against the same pool must not error.
        schema::init_schema(&pool).await.unwrap();
    }
}
