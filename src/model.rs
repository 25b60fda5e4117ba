//! Wire and storage data model.
//!
//! The SCIM view and the PATCH `value` payload are both represented as
//! [`serde_json::Value`] rather than a strongly-typed `User` struct: the
//! patch applier (§4.C) must preserve attributes it doesn't recognize, and
//! the mapper (§4.A) only ever reads a handful of well-known fields out of
//! an otherwise free-form resource. A typed struct with an `extras` map
//! would need the same fallback logic at every field access; staying with
//! `Value` end to end keeps that logic in one place (`mapper::field`).
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const LIST_RESPONSE_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";
pub const ERROR_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:Error";
pub const PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// A single SCIM PATCH operation (RFC 7644 §3.5.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// The PATCH request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOp {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<PatchOperation>,
}

/// `sync_status` of a cache row (§3 invariant 3: `synced` implies
/// `last_error IS NULL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Pending,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "pending" => Ok(SyncStatus::Pending),
            "error" => Ok(SyncStatus::Error),
            other => Err(format!("unknown sync_status: {}", other)),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the cache store (§3 "Cache row", §4.F).
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub id: String,
    pub ad_object_guid: Option<String>,
    pub sam_account_name: Option<String>,
    pub scim_resource: Value,
    pub ad_resource: Option<Value>,
    pub sync_status: SyncStatus,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Partial update applied to a [`CacheRow`] by `CacheStore::update`.
///
/// Every field is optional: only the columns the caller sets are touched.
/// `ad_object_guid` is intentionally write-once from the caller's
/// perspective — see invariant 5 in §3 — so it is only ever set to `Some`,
/// never cleared, by callers of this struct.
#[derive(Debug, Default, Clone)]
pub struct CacheRowUpdate {
    pub ad_object_guid: Option<String>,
    pub sam_account_name: Option<String>,
    pub scim_resource: Option<Value>,
    pub ad_resource: Option<Value>,
    pub sync_status: Option<SyncStatus>,
    pub last_error: Option<Option<String>>,
}

/// A row of the append-only audit log (§3 "Audit row").
#[derive(Debug, Clone)]
pub struct AuditRow {
    pub cmdlet: String,
    pub parameters: Value,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: i64,
    pub scim_user_id: Option<String>,
}

/// The recognized keys of the directory parameter set (§3 "Directory
/// parameter set"). Unknown keys must never appear — the mapper only ever
/// constructs this type through the named setters below, so there is no
/// way to insert an unrecognized key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryParams {
    entries: std::collections::BTreeMap<&'static str, ParamValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Bool(bool),
}

macro_rules! str_param {
    ($getter:ident, $setter:ident, $key:literal) => {
        pub fn $setter(&mut self, value: impl Into<String>) {
            self.entries.insert($key, ParamValue::Str(value.into()));
        }
        #[allow(dead_code)]
        pub fn $getter(&self) -> Option<&str> {
            match self.entries.get($key) {
                Some(ParamValue::Str(s)) => Some(s.as_str()),
                _ => None,
            }
        }
    };
}

impl DirectoryParams {
    pub fn new() -> Self {
        Self::default()
    }

    str_param!(sam_account_name, set_sam_account_name, "SamAccountName");
    str_param!(given_name, set_given_name, "GivenName");
    str_param!(surname, set_surname, "Surname");
    str_param!(email_address, set_email_address, "EmailAddress");
    str_param!(display_name, set_display_name, "DisplayName");
    str_param!(name, set_name, "Name");
    str_param!(employee_id, set_employee_id, "EmployeeID");
    str_param!(path, set_path, "Path");
    str_param!(user_principal_name, set_user_principal_name, "UserPrincipalName");

    pub fn set_enabled(&mut self, value: bool) {
        self.entries.insert("Enabled", ParamValue::Bool(value));
    }

    pub fn enabled(&self) -> Option<bool> {
        match self.entries.get("Enabled") {
            Some(ParamValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Render as a JSON object, e.g. for passing to the command builder or
    /// for logging. Used by tests and by `directory::command`.
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (k, v) in self.entries.iter() {
            let value = match v {
                ParamValue::Str(s) => Value::String(s.clone()),
                ParamValue::Bool(b) => Value::Bool(*b),
            };
            map.insert((*k).to_string(), value);
        }
        Value::Object(map)
    }
}
