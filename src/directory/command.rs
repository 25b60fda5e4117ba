//! Safe construction of directory-tool invocations (§4.E "Safety contract").
//!
//! Argument values are never interpolated through a shell; the executor
//! (`super::executor`) invokes the tool binary directly. Values that must
//! be embedded in the PowerShell script text passed via `-Command` are
//! single-quote literals with every embedded `'` doubled, which is
//! PowerShell's own escaping rule for single-quoted strings and therefore
//! closes off the same class of injection a shell-quoting bug would open.
use serde_json::{Map, Value};

use crate::model::{DirectoryParams, ParamValue};

/// Recognized sensitive keys (case-insensitive), §3 invariant 7.
const SENSITIVE_KEYS: &[&str] = &["accountpassword", "password", "secret", "token"];
const REDACTION_MARKER: &str = "***REDACTED***";

/// A fully-built invocation: the argv to pass to the executor and the
/// (already redacted) parameters to persist in the audit row.
pub struct Invocation {
    pub args: Vec<String>,
    pub audit_parameters: Value,
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn render_bool(value: bool) -> &'static str {
    if value {
        "$true"
    } else {
        "$false"
    }
}

fn render_params_as_flags(params: &DirectoryParams) -> String {
    let mut out = String::new();
    for (key, value) in params.iter() {
        out.push(' ');
        out.push('-');
        out.push_str(key);
        out.push(' ');
        match value {
            ParamValue::Str(s) => {
                out.push('\'');
                out.push_str(&escape_literal(s));
                out.push('\'');
            }
            ParamValue::Bool(b) => out.push_str(render_bool(*b)),
        }
    }
    out
}

/// Redact sensitive keys (case-insensitively) before a parameter set is
/// written to the audit log (§3 invariant 7, §4.E "Audit").
pub fn redact_parameters(params: &Value) -> Value {
    match params {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, value) in map {
                if SENSITIVE_KEYS.contains(&key.to_lowercase().as_str()) {
                    redacted.insert(key.clone(), Value::String(REDACTION_MARKER.to_string()));
                } else {
                    redacted.insert(key.clone(), value.clone());
                }
            }
            Value::Object(redacted)
        }
        other => other.clone(),
    }
}

const SELECT_PROPERTIES: &str =
    "ObjectGUID,SamAccountName,DisplayName,GivenName,Surname,EmailAddress,Enabled,UserPrincipalName,EmployeeID";

/// `create(params, id)` — §4.E.
pub fn build_create(params: &DirectoryParams, default_password: &str) -> Invocation {
    let script = format!(
        "$secure = ConvertTo-SecureString -AsPlainText '{password}' -Force; \
         $user = New-ADUser{flags} -AccountPassword $secure -ChangePasswordAtLogon $false -PassThru; \
         Get-ADUser -Identity $user.ObjectGUID -Properties {props} | Select-Object {props} | ConvertTo-Json -Compress",
        password = escape_literal(default_password),
        flags = render_params_as_flags(params),
        props = SELECT_PROPERTIES,
    );

    let mut audit_params = params.to_json();
    if let Value::Object(map) = &mut audit_params {
        map.insert("AccountPassword".to_string(), Value::String(default_password.to_string()));
    }

    Invocation {
        args: vec!["-NoProfile".to_string(), "-NonInteractive".to_string(), "-Command".to_string(), script],
        audit_parameters: redact_parameters(&audit_params),
    }
}

/// `update(identity, params, id)` — §4.E.
pub fn build_update(identity: &str, params: &DirectoryParams) -> Invocation {
    let script = format!(
        "Set-ADUser -Identity '{identity}'{flags} -PassThru | Select-Object {props} | ConvertTo-Json -Compress",
        identity = escape_literal(identity),
        flags = render_params_as_flags(params),
        props = SELECT_PROPERTIES,
    );

    Invocation {
        args: vec!["-NoProfile".to_string(), "-NonInteractive".to_string(), "-Command".to_string(), script],
        audit_parameters: redact_parameters(&params.to_json()),
    }
}

/// `delete(identity, id)` — §4.E, non-interactive confirmation.
pub fn build_delete(identity: &str) -> Invocation {
    let script = format!(
        "Remove-ADUser -Identity '{identity}' -Confirm:$false",
        identity = escape_literal(identity),
    );

    Invocation {
        args: vec!["-NoProfile".to_string(), "-NonInteractive".to_string(), "-Command".to_string(), script],
        audit_parameters: serde_json::json!({ "Identity": identity }),
    }
}

/// `read(identity, id)` — §4.E, full attribute read-back.
pub fn build_read(identity: &str) -> Invocation {
    let script = format!(
        "Get-ADUser -Identity '{identity}' -Properties {props} | Select-Object {props} | ConvertTo-Json -Compress",
        identity = escape_literal(identity),
        props = SELECT_PROPERTIES,
    );

    Invocation {
        args: vec!["-NoProfile".to_string(), "-NonInteractive".to_string(), "-Command".to_string(), script],
        audit_parameters: serde_json::json!({ "Identity": identity }),
    }
}
