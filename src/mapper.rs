//! §4.A Attribute mapper.
//!
//! Bidirectional translation between a SCIM User resource (`serde_json::Value`,
//! see the module doc on [`crate::model`] for why) and a directory parameter
//! set. Every field read tolerates a type mismatch by treating the field as
//! absent rather than erroring (§9 "Partial type coercions").
use serde_json::Value;

use crate::model::DirectoryParams;

/// AD's sAMAccountName is capped at 20 characters and is derived from the
/// portion of `userName` before the first `@` (§3 invariant 2). Both the
/// mapper and the request processor's pre-create duplicate check use this
/// same derivation so the SamAccountName the directory tool receives always
/// matches the cache's `sam_account_name` column.
pub fn sam_account_name_from_user_name(user_name: &str) -> String {
    user_name.split('@').next().unwrap_or("").chars().take(20).collect()
}

fn str_field<'a>(resource: &'a Value, key: &str) -> Option<&'a str> {
    resource.get(key).and_then(Value::as_str)
}

fn nested_str_field<'a>(resource: &'a Value, parent: &str, child: &str) -> Option<&'a str> {
    resource.get(parent)?.get(child)?.as_str()
}

fn primary_email_value(resource: &Value) -> Option<&str> {
    let emails = resource.get("emails")?.as_array()?;
    let primary = emails
        .iter()
        .find(|e| e.get("primary").and_then(Value::as_bool) == Some(true))
        .or_else(|| emails.first())?;
    primary.get("value")?.as_str()
}

/// scim→params (§4.A). `base_ou` is only supplied on the creation path; its
/// presence is what causes `Path` to be emitted.
pub fn scim_to_params(user: &Value, base_ou: Option<&str>) -> DirectoryParams {
    let mut params = DirectoryParams::new();

    let user_name = str_field(user, "userName");
    if let Some(user_name) = user_name {
        params.set_sam_account_name(sam_account_name_from_user_name(user_name));
        if user_name.contains('@') {
            params.set_user_principal_name(user_name);
        }
    }

    if let Some(given) = nested_str_field(user, "name", "givenName") {
        params.set_given_name(given);
    }
    if let Some(family) = nested_str_field(user, "name", "familyName") {
        params.set_surname(family);
    }

    if let Some(email) = primary_email_value(user) {
        params.set_email_address(email);
    }

    let display_name = str_field(user, "displayName");
    if let Some(display_name) = display_name {
        params.set_display_name(display_name);
    }

    if let Some(active) = user.get("active").and_then(Value::as_bool) {
        params.set_enabled(active);
    }

    if let Some(external_id) = str_field(user, "externalId") {
        params.set_employee_id(external_id);
    }

    // Name (the CN) is required for creation: DisplayName if present, else
    // the derived SamAccountName.
    match display_name {
        Some(display_name) => params.set_name(display_name),
        None => {
            if let Some(user_name) = user_name {
                params.set_name(sam_account_name_from_user_name(user_name));
            }
        }
    }

    if let Some(base_ou) = base_ou {
        params.set_path(base_ou);
    }

    params
}

/// ad→scim (§4.A): merges a directory read-back into an existing SCIM
/// record, preserving fields the read-back doesn't speak to.
pub fn ad_to_scim(existing: &Value, ad_user: &Value) -> Value {
    let mut merged = existing.as_object().cloned().unwrap_or_default();

    if let Some(sam) = str_field(ad_user, "SamAccountName") {
        merged.insert("userName".to_string(), Value::String(sam.to_string()));
    }
    if let Some(display_name) = str_field(ad_user, "DisplayName") {
        merged.insert("displayName".to_string(), Value::String(display_name.to_string()));
    }

    let given = str_field(ad_user, "GivenName");
    let family = str_field(ad_user, "Surname");
    if given.is_some() || family.is_some() {
        let mut name = merged
            .get("name")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(given) = given {
            name.insert("givenName".to_string(), Value::String(given.to_string()));
        }
        if let Some(family) = family {
            name.insert("familyName".to_string(), Value::String(family.to_string()));
        }
        merged.insert("name".to_string(), Value::Object(name));
    }

    if let Some(email) = str_field(ad_user, "EmailAddress") {
        merged.insert(
            "emails".to_string(),
            serde_json::json!([{ "value": email, "type": "work", "primary": true }]),
        );
    }

    if let Some(enabled) = ad_user.get("Enabled").and_then(Value::as_bool) {
        merged.insert("active".to_string(), Value::Bool(enabled));
    }

    Value::Object(merged)
}
