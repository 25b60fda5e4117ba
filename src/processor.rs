//! §4.G Request processor.
//!
//! Orchestrates list/get/create/replace/patch/delete, sequencing cache
//! writes around the external directory command per operation (§5
//! "Cache-vs-AD ordering rationale"). Every public method here returns
//! either the data the transport layer needs to format a success response,
//! or an [`AppError`] that already carries the right SCIM error taxonomy.
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::classifier;
use crate::directory::DirectoryTool;
use crate::error::{AppError, AppResult};
use crate::filter;
use crate::mapper;
use crate::model::{CacheRow, CacheRowUpdate, PatchOp, SyncStatus};
use crate::patch;
use crate::utils::truncate;

/// `startIndex` and `count` are clamped per §4.G `list` before the cache is
/// queried: `startIndex` to `>= 1`, `count` to `[1, 200]`.
fn clamp_start_index(start_index: i64) -> i64 {
    start_index.max(1)
}

fn clamp_count(count: i64) -> i64 {
    count.clamp(1, 200)
}

pub struct Processor {
    cache: Arc<dyn CacheStore>,
    directory: DirectoryTool,
    base_ou: Option<String>,
}

/// Result of a successful `create` call: the new row plus the `id` the
/// transport layer needs to build the `Location` header.
pub struct CreateOutcome {
    pub row: CacheRow,
}

impl Processor {
    pub fn new(cache: Arc<dyn CacheStore>, directory: DirectoryTool, base_ou: Option<String>) -> Self {
        Self {
            cache,
            directory,
            base_ou,
        }
    }

    /// §4.G `list`.
    pub async fn list(
        &self,
        filter_str: Option<&str>,
        start_index: i64,
        count: i64,
    ) -> AppResult<(Vec<CacheRow>, i64, i64)> {
        let start_index = clamp_start_index(start_index);
        let count = clamp_count(count);
        let predicate = filter::to_cache_predicate(filter_str);
        let offset = start_index - 1;

        let page = self.cache.page(predicate, offset, count).await?;
        Ok((page.rows, page.total_results, start_index))
    }

    /// §4.G `get`.
    pub async fn get(&self, id: &str) -> AppResult<CacheRow> {
        self.cache
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no user with id {}", id)))
    }

    /// §4.G `create`.
    pub async fn create(&self, user: Value) -> AppResult<CreateOutcome> {
        let user_name = user
            .get("userName")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation("userName is required".to_string()))?
            .to_string();

        let sam = mapper::sam_account_name_from_user_name(&user_name);
        if self.cache.find_by_sam(&sam).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "sAMAccountName {} is already in use",
                sam
            )));
        }

        let id = user
            .get("externalId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut scim_view = user
            .as_object()
            .cloned()
            .ok_or_else(|| AppError::Validation("body must be a JSON object".to_string()))?;
        scim_view.insert("id".to_string(), Value::String(id.clone()));
        let scim_view = Value::Object(scim_view);

        let params = mapper::scim_to_params(&scim_view, self.base_ou.as_deref());
        let result = self.directory.create(&params, &id).await;

        if !result.success() {
            let (status, scim_type) = classifier::classify(&result.outcome.stderr);
            return Err(AppError::Upstream {
                status,
                scim_type,
                detail: result.outcome.stderr,
            });
        }

        let ad_object_guid = result
            .parsed
            .as_ref()
            .and_then(crate::directory::extract_object_guid);

        let now = Utc::now();
        let mut row = CacheRow {
            id: id.clone(),
            ad_object_guid,
            sam_account_name: Some(sam),
            scim_resource: scim_view,
            ad_resource: None,
            sync_status: SyncStatus::Synced,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.cache.insert(row.clone()).await?;

        if let Some(identity) = row.ad_object_guid.clone().or_else(|| row.sam_account_name.clone()) {
            if let Some(ad_resource) = self.directory.read(&identity, &id).await {
                let merged_scim = mapper::ad_to_scim(&row.scim_resource, &ad_resource);
                let update = CacheRowUpdate {
                    ad_resource: Some(ad_resource),
                    scim_resource: Some(merged_scim.clone()),
                    ..Default::default()
                };
                if self.cache.update(&id, update).await.is_ok() {
                    row.scim_resource = merged_scim;
                }
            }
        }

        Ok(CreateOutcome { row })
    }

    /// §4.G `replace`.
    pub async fn replace(&self, id: &str, user: Value) -> AppResult<CacheRow> {
        let existing = self
            .cache
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no user with id {}", id)))?;

        let mut scim_view = user
            .as_object()
            .cloned()
            .ok_or_else(|| AppError::Validation("body must be a JSON object".to_string()))?;
        scim_view.insert("id".to_string(), Value::String(id.to_string()));
        let scim_view = Value::Object(scim_view);

        self.cache
            .update(
                id,
                CacheRowUpdate {
                    scim_resource: Some(scim_view.clone()),
                    sync_status: Some(SyncStatus::Pending),
                    ..Default::default()
                },
            )
            .await?;

        let identity = existing
            .ad_object_guid
            .clone()
            .or_else(|| existing.sam_account_name.clone())
            .ok_or_else(|| AppError::Invariant(format!("row {} has neither objectGUID nor sAMAccountName", id)))?;

        let mut params = mapper::scim_to_params(&scim_view, None);
        params.remove("Name");
        params.remove("Path");

        let result = self.directory.update(&identity, &params, id).await;

        if !result.success() {
            let (status, scim_type) = classifier::classify(&result.outcome.stderr);
            self.cache
                .update(
                    id,
                    CacheRowUpdate {
                        sync_status: Some(SyncStatus::Error),
                        last_error: Some(Some(truncate(&result.outcome.stderr, 2000))),
                        ..Default::default()
                    },
                )
                .await?;
            return Err(AppError::Upstream {
                status,
                scim_type,
                detail: result.outcome.stderr,
            });
        }

        self.cache
            .update(
                id,
                CacheRowUpdate {
                    sync_status: Some(SyncStatus::Synced),
                    last_error: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        let mut final_view = scim_view;
        if let Some(ad_resource) = self.directory.read(&identity, id).await {
            let merged = mapper::ad_to_scim(&final_view, &ad_resource);
            let update = CacheRowUpdate {
                ad_resource: Some(ad_resource),
                scim_resource: Some(merged.clone()),
                ..Default::default()
            };
            if self.cache.update(id, update).await.is_ok() {
                final_view = merged;
            }
        }

        self.cache
            .find_by_id(id)
            .await?
            .map(|mut row| {
                row.scim_resource = final_view;
                row
            })
            .ok_or_else(|| AppError::Invariant(format!("row {} vanished mid-request", id)))
    }

    /// §4.G `patch`.
    pub async fn patch(&self, id: &str, patch_op: PatchOp) -> AppResult<CacheRow> {
        if patch_op.operations.is_empty() {
            return Err(AppError::Validation("Operations must be a non-empty list".to_string()));
        }

        let existing = self
            .cache
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no user with id {}", id)))?;

        let (new_view, changed_fields) = patch::apply(&existing.scim_resource, &patch_op.operations)?;

        self.cache
            .update(
                id,
                CacheRowUpdate {
                    scim_resource: Some(new_view.clone()),
                    sync_status: Some(SyncStatus::Pending),
                    ..Default::default()
                },
            )
            .await?;

        let mut changed_view = serde_json::Map::new();
        for (key, value) in &changed_fields {
            changed_view.insert(key.clone(), value.clone());
        }
        let mut params = mapper::scim_to_params(&Value::Object(changed_view), None);
        params.remove("Name");
        params.remove("Path");

        if params.is_empty() {
            // Nothing in the patch maps to a directory attribute (e.g. it only
            // touched fields outside the mapped set) — there is no AD call to
            // make, so the row goes straight back to `synced`.
            self.cache
                .update(
                    id,
                    CacheRowUpdate {
                        sync_status: Some(SyncStatus::Synced),
                        ..Default::default()
                    },
                )
                .await?;
            return self
                .cache
                .find_by_id(id)
                .await?
                .ok_or_else(|| AppError::Invariant(format!("row {} vanished mid-request", id)));
        }

        let identity = existing
            .ad_object_guid
            .clone()
            .or_else(|| existing.sam_account_name.clone())
            .ok_or_else(|| AppError::Invariant(format!("row {} has neither objectGUID nor sAMAccountName", id)))?;

        let result = self.directory.update(&identity, &params, id).await;

        if !result.success() {
            let (status, scim_type) = classifier::classify(&result.outcome.stderr);
            self.cache
                .update(
                    id,
                    CacheRowUpdate {
                        sync_status: Some(SyncStatus::Error),
                        last_error: Some(Some(truncate(&result.outcome.stderr, 2000))),
                        ..Default::default()
                    },
                )
                .await?;
            return Err(AppError::Upstream {
                status,
                scim_type,
                detail: result.outcome.stderr,
            });
        }

        self.cache
            .update(
                id,
                CacheRowUpdate {
                    sync_status: Some(SyncStatus::Synced),
                    last_error: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        let mut final_view = new_view;
        if let Some(ad_resource) = self.directory.read(&identity, id).await {
            let merged = mapper::ad_to_scim(&final_view, &ad_resource);
            let update = CacheRowUpdate {
                ad_resource: Some(ad_resource),
                scim_resource: Some(merged.clone()),
                ..Default::default()
            };
            if self.cache.update(id, update).await.is_ok() {
                final_view = merged;
            }
        }

        self.cache
            .find_by_id(id)
            .await?
            .map(|mut row| {
                row.scim_resource = final_view;
                row
            })
            .ok_or_else(|| AppError::Invariant(format!("row {} vanished mid-request", id)))
    }

    /// §4.G `delete`.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let existing = self
            .cache
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no user with id {}", id)))?;

        let identity = existing.ad_object_guid.clone().or(existing.sam_account_name.clone());

        if let Some(identity) = identity {
            let result = self.directory.delete(&identity, id).await;
            if !result.success() && !classifier::is_already_gone(&result.outcome.stderr) {
                let (status, scim_type) = classifier::classify(&result.outcome.stderr);
                return Err(AppError::Upstream {
                    status,
                    scim_type,
                    detail: result.outcome.stderr,
                });
            }
        }

        self.cache.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullAuditSink;
    use crate::cache::schema::init_schema;
    use crate::cache::SqliteCacheStore;
    use crate::directory::executor::{CommandExecutor, CommandOutcome};
    use async_trait::async_trait;
    use serde_json::json;
    use sqlx::SqlitePool;
    use std::sync::Mutex;

    struct FakeExecutor {
        responses: Mutex<Vec<CommandOutcome>>,
    }

    impl FakeExecutor {
        fn new(responses: Vec<CommandOutcome>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
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

    fn success(stdout: &str) -> CommandOutcome {
        CommandOutcome {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            duration_ms: 5,
        }
    }

    fn failure(stderr: &str) -> CommandOutcome {
        CommandOutcome {
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(1),
            duration_ms: 5,
        }
    }

    async fn processor_with(responses: Vec<CommandOutcome>) -> Processor {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        let cache = Arc::new(SqliteCacheStore::new(pool));
        let executor = Arc::new(FakeExecutor::new(responses));
        let audit = Arc::new(NullAuditSink);
        let directory = DirectoryTool::new(executor, audit, "P@ssw0rd!");
        Processor::new(cache, directory, Some("OU=Users,DC=corp".to_string()))
    }

    #[tokio::test]
    async fn create_success_stores_synced_row() {
        let guid = "11111111-1111-1111-1111-111111111111";
        let processor = processor_with(vec![
            success(&json!({"ObjectGUID": guid}).to_string()),
            success(&json!({"SamAccountName": "alice"}).to_string()),
        ])
        .await;

        let user = json!({"userName": "alice@ex.com", "externalId": "abc", "active": true});
        let outcome = processor.create(user).await.unwrap();

        assert_eq!(outcome.row.id, "abc");
        assert_eq!(outcome.row.ad_object_guid.as_deref(), Some(guid));
        assert_eq!(outcome.row.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn create_duplicate_sam_is_conflict_without_invocation() {
        let processor = processor_with(vec![
            success(&json!({"ObjectGUID": "11111111-1111-1111-1111-111111111111"}).to_string()),
            success(&json!({}).to_string()),
        ])
        .await;
        processor
            .create(json!({"userName": "alice@ex.com", "externalId": "abc"}))
            .await
            .unwrap();

        // No fake responses remain: if the duplicate-sam precheck did not
        // short-circuit before the directory call, this would fail with the
        // executor's "no more fake responses" error instead of Conflict.
        let err = processor
            .create(json!({"userName": "alice@ex.com", "externalId": "def"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_missing_username_is_validation_error() {
        let processor = processor_with(vec![]).await;
        let err = processor.create(json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn replace_failure_sets_error_status_but_keeps_pending_view() {
        let processor = processor_with(vec![
            success(&json!({"ObjectGUID": "11111111-1111-1111-1111-111111111111"}).to_string()),
            success(&json!({}).to_string()),
            failure("Access is denied."),
        ])
        .await;
        let created = processor
            .create(json!({"userName": "alice@ex.com", "externalId": "abc"}))
            .await
            .unwrap();
        assert_eq!(created.row.id, "abc");

        let err = processor
            .replace("abc", json!({"userName": "alice2@ex.com"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Upstream {
                status,
                ..
            } if status == axum::http::StatusCode::FORBIDDEN
        ));

        let row = processor.get("abc").await.unwrap();
        assert_eq!(row.sync_status, SyncStatus::Error);
        assert_eq!(row.scim_resource["userName"], json!("alice2@ex.com"));
    }

    #[tokio::test]
    async fn patch_active_false_updates_view_and_status() {
        let processor = processor_with(vec![
            success(&json!({"ObjectGUID": "11111111-1111-1111-1111-111111111111"}).to_string()),
            success(&json!({"Enabled": false}).to_string()),
            success(&json!({"Enabled": false}).to_string()),
        ])
        .await;

        let created = processor
            .create(json!({"userName": "alice@ex.com", "externalId": "abc", "active": true}))
            .await
            .unwrap();
        assert_eq!(created.row.scim_resource["active"], json!(true));

        let patch_op = PatchOp {
            schemas: vec![],
            operations: vec![crate::model::PatchOperation {
                op: "replace".to_string(),
                path: Some("active".to_string()),
                value: Some(json!(false)),
            }],
        };
        let updated = processor.patch("abc", patch_op).await.unwrap();
        assert_eq!(updated.scim_resource["active"], json!(false));
        assert_eq!(updated.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn delete_already_gone_still_removes_row() {
        let processor = processor_with(vec![
            success(&json!({"ObjectGUID": "11111111-1111-1111-1111-111111111111"}).to_string()),
            success(&json!({}).to_string()),
            failure("Cannot find an object with identity: 'abc'"),
        ])
        .await;
        processor
            .create(json!({"userName": "alice@ex.com", "externalId": "abc"}))
            .await
            .unwrap();

        processor.delete("abc").await.unwrap();
        let err = processor.get("abc").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_clamps_start_index_and_count() {
        let processor = processor_with(vec![]).await;
        let (rows, total, start_index) = processor.list(None, 0, 0).await.unwrap();
        assert_eq!(start_index, 1);
        assert_eq!(total, 0);
        assert!(rows.is_empty());
    }
}
