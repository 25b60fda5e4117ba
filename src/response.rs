//! §4.H Response formatter.
//!
//! Builds SCIM User, ListResponse, and Error envelopes from the cache's
//! stored data (§9 "Two representations of a row": the row is authoritative
//! for `id`, `sam_account_name`, `ad_object_guid`, timestamps; the stored
//! SCIM view is authoritative for everything else).
use serde_json::{json, Value};

use crate::model::{CacheRow, LIST_RESPONSE_SCHEMA, USER_SCHEMA};
use crate::utils::format_scim_datetime;

/// Formats a cache row into a SCIM User resource, filling `meta` and falling
/// back to row data for any top-level field absent from the stored view
/// (e.g. `userName` falls back to `sam_account_name`).
pub fn format_user(row: &CacheRow, base_url: &str) -> Value {
    let mut user = row
        .scim_resource
        .as_object()
        .cloned()
        .unwrap_or_default();

    user.insert("schemas".to_string(), json!([USER_SCHEMA]));
    user.insert("id".to_string(), json!(row.id));

    if !matches!(user.get("userName"), Some(Value::String(_))) {
        if let Some(sam) = &row.sam_account_name {
            user.insert("userName".to_string(), json!(sam));
        }
    }

    let location = format!("{}/scim/v2/Users/{}", base_url, row.id);
    user.insert(
        "meta".to_string(),
        json!({
            "resourceType": "User",
            "created": format_scim_datetime(row.created_at),
            "lastModified": format_scim_datetime(row.updated_at),
            "location": location,
        }),
    );

    Value::Object(user)
}

/// Builds a `ListResponse` envelope (§4.H). `start_index` is the already
/// clamped, echoed value; `items_per_page` is the number of rows actually
/// returned, not the requested `count`.
pub fn format_list_response(
    rows: &[CacheRow],
    total_results: i64,
    start_index: i64,
    base_url: &str,
) -> Value {
    let resources: Vec<Value> = rows.iter().map(|row| format_user(row, base_url)).collect();
    json!({
        "schemas": [LIST_RESPONSE_SCHEMA],
        "totalResults": total_results,
        "startIndex": start_index,
        "itemsPerPage": resources.len(),
        "Resources": resources,
    })
}
