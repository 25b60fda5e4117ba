//! §4.E Command builder + executor.
pub mod command;
pub mod executor;

use std::sync::Arc;

use serde_json::Value;

use crate::audit::AuditSink;
use crate::model::{AuditRow, DirectoryParams};
use crate::utils::truncate;
use command::Invocation;
use executor::{CommandExecutor, CommandOutcome};

/// The result of one directory-tool operation: the raw process outcome
/// plus, if the tool produced JSON on exit 0, the parsed record.
pub struct DirectoryResult {
    pub outcome: CommandOutcome,
    pub parsed: Option<Value>,
}

impl DirectoryResult {
    pub fn success(&self) -> bool {
        self.outcome.success
    }
}

/// Thin facade over [`CommandExecutor`] that builds each operation's
/// invocation, runs it, parses its JSON output, and writes the
/// corresponding audit row (fire-and-forget — §4.E "Audit").
pub struct DirectoryTool {
    executor: Arc<dyn CommandExecutor>,
    audit: Arc<dyn AuditSink>,
    default_password: String,
}

impl DirectoryTool {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        audit: Arc<dyn AuditSink>,
        default_password: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            audit,
            default_password: default_password.into(),
        }
    }

    pub async fn create(&self, params: &DirectoryParams, scim_user_id: &str) -> DirectoryResult {
        let invocation = command::build_create(params, &self.default_password);
        self.run("New-ADUser", invocation, scim_user_id).await
    }

    pub async fn update(&self, identity: &str, params: &DirectoryParams, scim_user_id: &str) -> DirectoryResult {
        let invocation = command::build_update(identity, params);
        self.run("Set-ADUser", invocation, scim_user_id).await
    }

    pub async fn delete(&self, identity: &str, scim_user_id: &str) -> DirectoryResult {
        let invocation = command::build_delete(identity);
        self.run("Remove-ADUser", invocation, scim_user_id).await
    }

    /// Full attribute read-back. Returns `None` on any failure, including a
    /// successful process exit whose stdout fails to parse as JSON.
    pub async fn read(&self, identity: &str, scim_user_id: &str) -> Option<Value> {
        let invocation = command::build_read(identity);
        let result = self.run("Get-ADUser", invocation, scim_user_id).await;
        if result.success() {
            result.parsed
        } else {
            None
        }
    }

    async fn run(&self, cmdlet: &str, invocation: Invocation, scim_user_id: &str) -> DirectoryResult {
        let outcome = self.executor.run(&invocation.args).await;

        let parsed = if outcome.success && !outcome.stdout.is_empty() {
            serde_json::from_str::<Value>(&outcome.stdout).ok()
        } else {
            None
        };

        let audit_row = AuditRow {
            cmdlet: cmdlet.to_string(),
            parameters: invocation.audit_parameters,
            stdout: Some(truncate(&outcome.stdout, 65535)),
            stderr: Some(truncate(&outcome.stderr, 65535)),
            exit_code: outcome.exit_code,
            duration_ms: outcome.duration_ms,
            scim_user_id: Some(scim_user_id.to_string()),
        };

        let audit = self.audit.clone();
        tokio::spawn(async move {
            audit.record(audit_row).await;
        });

        DirectoryResult { outcome, parsed }
    }
}

/// GUID extraction tolerates two layouts: a direct string under
/// `ObjectGUID`, or a wrapper object `{ "value": "<guid>" }`.
pub fn extract_object_guid(record: &Value) -> Option<String> {
    match record.get("ObjectGUID")? {
        Value::String(guid) => Some(guid.clone()),
        Value::Object(wrapper) => wrapper.get("value")?.as_str().map(str::to_string),
        _ => None,
    }
}
