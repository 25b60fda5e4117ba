use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::error::{AppError, AppResult};
use crate::filter::CachePredicate;
use crate::model::{CacheRow, CacheRowUpdate, SyncStatus};
use crate::utils::truncate;

use super::{CacheStore, Page};

pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_from_sql(row: &sqlx::sqlite::SqliteRow) -> AppResult<CacheRow> {
        let scim_resource: String = row.try_get("scim_resource")?;
        let ad_resource: Option<String> = row.try_get("ad_resource")?;
        let sync_status: String = row.try_get("sync_status")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(CacheRow {
            id: row.try_get("id")?,
            ad_object_guid: row.try_get("ad_object_guid")?,
            sam_account_name: row.try_get("sam_account_name")?,
            scim_resource: serde_json::from_str(&scim_resource)?,
            ad_resource: ad_resource.map(|s| serde_json::from_str(&s)).transpose()?,
            sync_status: sync_status
                .parse::<SyncStatus>()
                .map_err(AppError::Invariant)?,
            last_error: row.try_get("last_error")?,
            created_at: created_at
                .parse()
                .map_err(|e| AppError::Invariant(format!("bad created_at timestamp: {}", e)))?,
            updated_at: updated_at
                .parse()
                .map_err(|e| AppError::Invariant(format!("bad updated_at timestamp: {}", e)))?,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE constraint failed"))
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<CacheRow>> {
        let row = sqlx::query("SELECT * FROM cache_rows WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_from_sql).transpose()
    }

    async fn find_by_sam(&self, sam_account_name: &str) -> AppResult<Option<CacheRow>> {
        let row = sqlx::query("SELECT * FROM cache_rows WHERE sam_account_name = ?1")
            .bind(sam_account_name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_from_sql).transpose()
    }

    async fn insert(&self, row: CacheRow) -> AppResult<()> {
        let scim_resource = serde_json::to_string(&row.scim_resource)?;
        let ad_resource = row.ad_resource.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            "INSERT INTO cache_rows \
             (id, ad_object_guid, sam_account_name, scim_resource, ad_resource, sync_status, last_error, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&row.id)
        .bind(&row.ad_object_guid)
        .bind(&row.sam_account_name)
        .bind(&scim_resource)
        .bind(&ad_resource)
        .bind(row.sync_status.as_str())
        .bind(row.last_error.as_ref().map(|e| truncate(e, 2000)))
        .bind(row.created_at.to_rfc3339())
        .bind(row.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(AppError::Conflict(format!("sAMAccountName already in use: {}", e)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, id: &str, update: CacheRowUpdate) -> AppResult<()> {
        let existing = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no cache row for id {}", id)))?;

        let ad_object_guid = update.ad_object_guid.or(existing.ad_object_guid);
        let sam_account_name = update.sam_account_name.or(existing.sam_account_name);
        let scim_resource = update.scim_resource.unwrap_or(existing.scim_resource);
        let ad_resource = update.ad_resource.or(existing.ad_resource);
        let sync_status = update.sync_status.unwrap_or(existing.sync_status);
        let last_error = update.last_error.unwrap_or(existing.last_error);

        let scim_resource_json = serde_json::to_string(&scim_resource)?;
        let ad_resource_json = ad_resource.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            "UPDATE cache_rows SET ad_object_guid = ?1, sam_account_name = ?2, scim_resource = ?3, \
             ad_resource = ?4, sync_status = ?5, last_error = ?6, updated_at = ?7 WHERE id = ?8",
        )
        .bind(&ad_object_guid)
        .bind(&sam_account_name)
        .bind(&scim_resource_json)
        .bind(&ad_resource_json)
        .bind(sync_status.as_str())
        .bind(last_error.as_ref().map(|e| truncate(e, 2000)))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(AppError::Conflict(format!("sAMAccountName already in use: {}", e)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM cache_rows WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn page(&self, predicate: Option<CachePredicate>, offset: i64, limit: i64) -> AppResult<Page> {
        let (where_clause, bind_value) = match &predicate {
            Some(CachePredicate::IdEquals(value)) => (" WHERE id = ?1", Some(value.clone())),
            Some(CachePredicate::SamAccountNameEquals(value)) => {
                (" WHERE sam_account_name = ?1", Some(value.clone()))
            }
            None => ("", None),
        };

        let count_sql = format!("SELECT COUNT(*) as count FROM cache_rows{}", where_clause);
        let total_results: i64 = {
            let mut query = sqlx::query(&count_sql);
            if let Some(value) = &bind_value {
                query = query.bind(value);
            }
            query.fetch_one(&self.pool).await?.try_get("count")?
        };

        let page_sql = format!(
            "SELECT * FROM cache_rows{} ORDER BY created_at ASC LIMIT ?{} OFFSET ?{}",
            where_clause,
            if bind_value.is_some() { 2 } else { 1 },
            if bind_value.is_some() { 3 } else { 2 },
        );
        let mut query = sqlx::query(&page_sql);
        if let Some(value) = &bind_value {
            query = query.bind(value);
        }
        query = query.bind(limit).bind(offset);
        let sql_rows = query.fetch_all(&self.pool).await?;

        let rows = sql_rows
            .iter()
            .map(Self::row_from_sql)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Page { rows, total_results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SyncStatus;
    use serde_json::json;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        super::super::schema::init_schema(&pool).await.unwrap();
        pool
    }

    fn sample_row(id: &str, sam: &str) -> CacheRow {
        let now = Utc::now();
        CacheRow {
            id: id.to_string(),
            ad_object_guid: None,
            sam_account_name: Some(sam.to_string()),
            scim_resource: json!({"id": id, "userName": format!("{}@example.com", sam)}),
            ad_resource: None,
            sync_status: SyncStatus::Synced,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_then_find_by_id() {
        let pool = test_pool().await;
        let store = SqliteCacheStore::new(pool);
        store.insert(sample_row("id-1", "alice")).await.unwrap();

        let found = store.find_by_id("id-1").await.unwrap().unwrap();
        assert_eq!(found.sam_account_name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn duplicate_sam_is_conflict() {
        let pool = test_pool().await;
        let store = SqliteCacheStore::new(pool);
        store.insert(sample_row("id-1", "alice")).await.unwrap();

        let err = store.insert(sample_row("id-2", "alice")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_preserves_guid_once_set() {
        let pool = test_pool().await;
        let store = SqliteCacheStore::new(pool);
        store.insert(sample_row("id-1", "alice")).await.unwrap();
        store
            .update(
                "id-1",
                CacheRowUpdate {
                    ad_object_guid: Some("guid-1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store
            .update(
                "id-1",
                CacheRowUpdate {
                    sync_status: Some(SyncStatus::Error),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let row = store.find_by_id("id-1").await.unwrap().unwrap();
        assert_eq!(row.ad_object_guid.as_deref(), Some("guid-1"));
        assert_eq!(row.sync_status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn page_orders_by_created_at_and_reports_total() {
        let pool = test_pool().await;
        let store = SqliteCacheStore::new(pool);
        store.insert(sample_row("id-1", "alice")).await.unwrap();
        store.insert(sample_row("id-2", "bob")).await.unwrap();

        let page = store.page(None, 0, 10).await.unwrap();
        assert_eq!(page.total_results, 2);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0].id, "id-1");
    }

    #[tokio::test]
    async fn page_with_predicate_filters() {
        let pool = test_pool().await;
        let store = SqliteCacheStore::new(pool);
        store.insert(sample_row("id-1", "alice")).await.unwrap();
        store.insert(sample_row("id-2", "bob")).await.unwrap();

        let page = store
            .page(Some(CachePredicate::SamAccountNameEquals("bob".to_string())), 0, 10)
            .await
            .unwrap();
        assert_eq!(page.total_results, 1);
        assert_eq!(page.rows[0].id, "id-2");
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let pool = test_pool().await;
        let store = SqliteCacheStore::new(pool);
        store.insert(sample_row("id-1", "alice")).await.unwrap();
        store.delete("id-1").await.unwrap();
        assert!(store.find_by_id("id-1").await.unwrap().is_none());
    }
}
