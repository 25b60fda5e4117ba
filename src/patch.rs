//! §4.C Patch applier.
//!
//! Applies a finite, ordered list of SCIM PATCH operations (RFC 7644
//! §3.5.2) to a JSON resource. The original resource is left untouched;
//! the new resource and the set of top-level fields it touched are
//! returned so the caller (the request processor) can translate just the
//! changed fields into directory parameters instead of re-mapping the
//! whole resource.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::model::PatchOperation;

/// Top-level fields touched by a patch, each holding its post-update value.
/// A value of `Value::Null` for a key that no longer exists in the
/// resource means the key was removed.
pub type ChangedFields = std::collections::BTreeMap<String, Value>;

/// Apply `operations` to `resource` in order. `resource` must be a JSON
/// object; every other shape is a validation error.
pub fn apply(resource: &Value, operations: &[PatchOperation]) -> AppResult<(Value, ChangedFields)> {
    let mut result = resource
        .as_object()
        .cloned()
        .ok_or_else(|| AppError::Validation("patch target must be a JSON object".to_string()))?;
    let mut changed = ChangedFields::new();

    for operation in operations {
        apply_one(&mut result, operation, &mut changed)?;
    }

    Ok((Value::Object(result), changed))
}

fn apply_one(
    resource: &mut Map<String, Value>,
    operation: &PatchOperation,
    changed: &mut ChangedFields,
) -> AppResult<()> {
    let op = operation.op.to_lowercase();
    if op != "add" && op != "remove" && op != "replace" {
        return Err(AppError::Validation(format!("unsupported patch op: {}", operation.op)));
    }

    match &operation.path {
        None => apply_no_path(resource, &op, operation.value.as_ref(), changed),
        Some(path) if path.contains('[') => {
            apply_multi_valued(resource, path, &op, operation.value.as_ref(), changed)
        }
        Some(path) => {
            let parts: Vec<&str> = path.split('.').collect();
            if parts.len() == 2 && !parts.iter().any(|p| p.is_empty()) {
                apply_dotted(resource, parts[0], parts[1], &op, operation.value.as_ref(), changed)
            } else {
                apply_simple(resource, path, &op, operation.value.as_ref(), changed)
            }
        }
    }
}

/// Case 1: no path — `value` must be an object merged into the top level.
fn apply_no_path(
    resource: &mut Map<String, Value>,
    op: &str,
    value: Option<&Value>,
    changed: &mut ChangedFields,
) -> AppResult<()> {
    if op == "remove" {
        // remove with no path is a no-op.
        return Ok(());
    }
    let object = value
        .and_then(Value::as_object)
        .ok_or_else(|| AppError::Validation("value must be an object when path is absent".to_string()))?;
    for (key, val) in object {
        resource.insert(key.clone(), val.clone());
        changed.insert(key.clone(), val.clone());
    }
    Ok(())
}

/// Cases 2 and 5: a bare top-level key, whether because the path had no
/// dot/bracket at all, or because it had more dots than the depth-2 case
/// handles — either way the whole path string is the key.
fn apply_simple(
    resource: &mut Map<String, Value>,
    key: &str,
    op: &str,
    value: Option<&Value>,
    changed: &mut ChangedFields,
) -> AppResult<()> {
    if op == "remove" {
        resource.remove(key);
        changed.insert(key.to_string(), Value::Null);
        return Ok(());
    }
    let value = value
        .ok_or_else(|| AppError::Validation(format!("{} requires a value", op)))?
        .clone();
    resource.insert(key.to_string(), value.clone());
    changed.insert(key.to_string(), value);
    Ok(())
}

/// Case 4: dotted path of depth 2, `parent.child`.
fn apply_dotted(
    resource: &mut Map<String, Value>,
    parent: &str,
    child: &str,
    op: &str,
    value: Option<&Value>,
    changed: &mut ChangedFields,
) -> AppResult<()> {
    if !matches!(resource.get(parent), Some(Value::Object(_))) {
        resource.insert(parent.to_string(), Value::Object(Map::new()));
    }
    let parent_obj = resource
        .get_mut(parent)
        .and_then(Value::as_object_mut)
        .expect("just upserted to an object");

    if op == "remove" {
        parent_obj.remove(child);
    } else {
        let value = value
            .ok_or_else(|| AppError::Validation(format!("{} requires a value", op)))?
            .clone();
        parent_obj.insert(child.to_string(), value);
    }

    changed.insert(parent.to_string(), resource.get(parent).cloned().unwrap_or(Value::Null));
    Ok(())
}

/// Case 3: `attr[filter]` or `attr[filter].subAttr`.
fn apply_multi_valued(
    resource: &mut Map<String, Value>,
    path: &str,
    op: &str,
    value: Option<&Value>,
    changed: &mut ChangedFields,
) -> AppResult<()> {
    let bracket_start = path
        .find('[')
        .ok_or_else(|| AppError::Validation(format!("malformed multi-valued path: {}", path)))?;
    let bracket_end = path
        .find(']')
        .ok_or_else(|| AppError::Validation(format!("malformed multi-valued path: {}", path)))?;
    if bracket_end < bracket_start {
        return Err(AppError::Validation(format!("malformed multi-valued path: {}", path)));
    }
    let attr = &path[..bracket_start];
    let filter_expr = &path[bracket_start + 1..bracket_end];
    let sub_attr = match path[bracket_end + 1..].strip_prefix('.') {
        Some(rest) if !rest.is_empty() => Some(rest.to_string()),
        Some(_) => return Err(AppError::Validation(format!("malformed sub-attribute in {}", path))),
        None => None,
    };

    let (filter_name, filter_value) = parse_element_filter(filter_expr)
        .ok_or_else(|| AppError::Validation(format!("unsupported filter in path: {}", filter_expr)))?;

    let mut list = resource
        .get(attr)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if op == "remove" {
        list.retain(|element| !element_matches(element, &filter_name, &filter_value));
        resource.insert(attr.to_string(), Value::Array(list.clone()));
        changed.insert(attr.to_string(), Value::Array(list));
        return Ok(());
    }

    let value = value
        .ok_or_else(|| AppError::Validation(format!("{} requires a value", op)))?;

    let found_index = list
        .iter()
        .position(|element| element_matches(element, &filter_name, &filter_value));

    match found_index {
        Some(index) => {
            apply_value_to_element(&mut list[index], sub_attr.as_deref(), value)?;
        }
        None => {
            let mut new_element = Map::new();
            new_element.insert(filter_name, filter_value);
            let mut new_element = Value::Object(new_element);
            apply_value_to_element(&mut new_element, sub_attr.as_deref(), value)?;
            list.push(new_element);
        }
    }

    resource.insert(attr.to_string(), Value::Array(list.clone()));
    changed.insert(attr.to_string(), Value::Array(list));
    Ok(())
}

fn apply_value_to_element(element: &mut Value, sub_attr: Option<&str>, value: &Value) -> AppResult<()> {
    match sub_attr {
        Some(sub_attr) => {
            let object = element
                .as_object_mut()
                .ok_or_else(|| AppError::Validation("matched element is not an object".to_string()))?;
            object.insert(sub_attr.to_string(), value.clone());
        }
        None => {
            let incoming = value.as_object().ok_or_else(|| {
                AppError::Validation("value must be an object when no sub-attribute is given".to_string())
            })?;
            let object = element
                .as_object_mut()
                .ok_or_else(|| AppError::Validation("matched element is not an object".to_string()))?;
            for (k, v) in incoming {
                object.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(())
}

fn element_matches(element: &Value, name: &str, value: &Value) -> bool {
    element.get(name).map(|v| v == value).unwrap_or(false)
}

/// Parse the single `name eq value` predicate allowed inside `attr[...]`.
/// `value` may be a double-quoted string (no escape interpretation) or the
/// bare literals `true`/`false`.
fn parse_element_filter(expr: &str) -> Option<(String, Value)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\S+)\s+eq\s+(.+?)\s*$").expect("static element filter regex")
    });
    let captures = re.captures(expr)?;
    let name = captures.get(1)?.as_str().to_string();
    let raw_value = captures.get(2)?.as_str();

    let value = if raw_value.len() >= 2 && raw_value.starts_with('"') && raw_value.ends_with('"') {
        Value::String(raw_value[1..raw_value.len() - 1].to_string())
    } else if raw_value.eq_ignore_ascii_case("true") {
        Value::Bool(true)
    } else if raw_value.eq_ignore_ascii_case("false") {
        Value::Bool(false)
    } else {
        Value::String(raw_value.to_string())
    };

    Some((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PatchOperation;
    use serde_json::json;

    fn op(op: &str, path: Option<&str>, value: Option<Value>) -> PatchOperation {
        PatchOperation {
            op: op.to_string(),
            path: path.map(str::to_string),
            value,
        }
    }

    #[test]
    fn empty_operations_is_identity() {
        let resource = json!({"userName": "alice"});
        let (new_resource, changed) = apply(&resource, &[]).unwrap();
        assert_eq!(new_resource, resource);
        assert!(changed.is_empty());
    }

    #[test]
    fn simple_replace_active() {
        let resource = json!({"userName": "alice", "active": true});
        let ops = vec![op("replace", Some("active"), Some(json!(false)))];
        let (new_resource, changed) = apply(&resource, &ops).unwrap();
        assert_eq!(new_resource["active"], json!(false));
        assert_eq!(changed.get("active"), Some(&json!(false)));
    }

    #[test]
    fn replace_is_idempotent() {
        let resource = json!({"active": true});
        let ops = vec![op("replace", Some("active"), Some(json!(false)))];
        let (once, changed_once) = apply(&resource, &ops).unwrap();
        let (twice, changed_twice) = apply(&once, &ops).unwrap();
        assert_eq!(once, twice);
        assert_eq!(changed_once, changed_twice);
    }

    #[test]
    fn multi_valued_add_synthesizes_element() {
        let resource = json!({"emails": []});
        let ops = vec![op(
            "add",
            Some(r#"emails[type eq "work"].value"#),
            Some(json!("a@b")),
        )];
        let (new_resource, changed) = apply(&resource, &ops).unwrap();
        assert_eq!(
            new_resource["emails"],
            json!([{"type": "work", "value": "a@b"}])
        );
        assert_eq!(changed["emails"], json!([{"type": "work", "value": "a@b"}]));
    }

    #[test]
    fn multi_valued_remove_drops_matching() {
        let resource = json!({"emails": [{"type": "work", "value": "a@b"}]});
        let ops = vec![op("remove", Some(r#"emails[type eq "work"]"#), None)];
        let (new_resource, _) = apply(&resource, &ops).unwrap();
        assert_eq!(new_resource["emails"], json!([]));
    }

    #[test]
    fn dotted_path_upserts_missing_parent() {
        let resource = json!({});
        let ops = vec![op("replace", Some("name.givenName"), Some(json!("Al")))];
        let (new_resource, changed) = apply(&resource, &ops).unwrap();
        assert_eq!(new_resource["name"]["givenName"], json!("Al"));
        assert_eq!(changed["name"], json!({"givenName": "Al"}));
    }

    #[test]
    fn no_path_merges_object_value() {
        let resource = json!({"userName": "alice"});
        let ops = vec![op("add", None, Some(json!({"displayName": "Alice"})))];
        let (new_resource, changed) = apply(&resource, &ops).unwrap();
        assert_eq!(new_resource["displayName"], json!("Alice"));
        assert_eq!(changed["displayName"], json!("Alice"));
    }

    #[test]
    fn remove_without_path_is_noop() {
        let resource = json!({"userName": "alice"});
        let ops = vec![op("remove", None, None)];
        let (new_resource, changed) = apply(&resource, &ops).unwrap();
        assert_eq!(new_resource, resource);
        assert!(changed.is_empty());
    }
}
