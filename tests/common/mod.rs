//! Shared integration-test harness: a fake `CommandExecutor` wired into a
//! real `TestServer`, grounded on the `ExecCommand` trait/test-double split
//! used for the corpus's OCI runtime wrapper.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use scim_ad_bridge::audit::NullAuditSink;
use scim_ad_bridge::cache::schema::init_schema;
use scim_ad_bridge::cache::SqliteCacheStore;
use scim_ad_bridge::config::{AppConfig, AuthConfig, DatabaseConfig, DirectoryConfig, ServerConfig};
use scim_ad_bridge::directory::executor::{CommandExecutor, CommandOutcome};
use scim_ad_bridge::directory::DirectoryTool;
use scim_ad_bridge::processor::Processor;
use scim_ad_bridge::routes::{build_router, AppState};
use sqlx::SqlitePool;

pub const API_KEY: &str = "test-api-key";

pub struct FakeExecutor {
    pub responses: Mutex<Vec<CommandOutcome>>,
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn run(&self, _args: &[String]) -> CommandOutcome {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            CommandOutcome {
                success: false,
                stdout: String::new(),
                stderr: "no more fake responses".to_string(),
                exit_code: Some(1),
                duration_ms: 0,
            }
        } else {
            responses.remove(0)
        }
    }
}

pub fn success(stdout: &str) -> CommandOutcome {
    CommandOutcome {
        success: true,
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
        duration_ms: 1,
    }
}

pub fn failure(stderr: &str) -> CommandOutcome {
    CommandOutcome {
        success: false,
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: Some(1),
        duration_ms: 1,
    }
}

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
            base_ou: Some("OU=Users,DC=corp,DC=example,DC=com".to_string()),
            default_password: "P@ssw0rd!".to_string(),
            tool_path: "pwsh".to_string(),
            server_hostname: None,
            timeout_secs: 30,
        },
        auth: AuthConfig {
            api_key: API_KEY.to_string(),
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
    }
}

/// Builds a `TestServer` whose directory tool is a `FakeExecutor` fed the
/// given queue of canned responses, in call order.
pub async fn test_server(responses: Vec<CommandOutcome>) -> TestServer {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    init_schema(&pool).await.unwrap();
    let cache = Arc::new(SqliteCacheStore::new(pool));
    let executor = Arc::new(FakeExecutor {
        responses: Mutex::new(responses),
    });
    let audit = Arc::new(NullAuditSink);
    let config = test_config();
    let directory = DirectoryTool::new(executor, audit, config.directory.default_password.clone());
    let processor = Processor::new(cache, directory, config.directory.base_ou.clone());
    let state = Arc::new(AppState {
        processor,
        config: Arc::new(config),
    });
    TestServer::new(build_router(state)).unwrap()
}
