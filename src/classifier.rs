//! §4.D Error classifier.
//!
//! Maps a directory-tool stderr string to an HTTP status and SCIM
//! `scimType`. Matching is on the lowercased stderr; the first rule that
//! matches wins. The `detail` the caller surfaces is always the original,
//! non-lowercased stderr (§7 "User-visible body") — this module only
//! decides the (status, scimType) pair.
use axum::http::StatusCode;

/// Classification result: an HTTP status and an optional SCIM `scimType`.
pub type Classification = (StatusCode, Option<&'static str>);

pub fn classify(stderr: &str) -> Classification {
    let lower = stderr.to_lowercase();

    if lower.contains("already exists") || lower.contains("already in use") {
        return (StatusCode::CONFLICT, Some("uniqueness"));
    }
    if lower.contains("cannot find an object with identity")
        || lower.contains("not found")
        || lower.contains("no such object")
    {
        return (StatusCode::NOT_FOUND, Some("noTarget"));
    }
    if lower.contains("password")
        && (lower.contains("complexity") || lower.contains("length") || lower.contains("requirement"))
    {
        return (StatusCode::BAD_REQUEST, Some("invalidValue"));
    }
    if lower.contains("access") && lower.contains("denied") {
        return (StatusCode::FORBIDDEN, None);
    }
    if lower.contains("invalid") || lower.contains("bad request") {
        return (StatusCode::BAD_REQUEST, Some("invalidValue"));
    }
    (StatusCode::INTERNAL_SERVER_ERROR, None)
}

/// `true` for stderr that the delete path should treat as "already gone"
/// (§4.G delete: "Treat \"cannot find\" / \"not found\" stderr as
/// already-gone").
pub fn is_already_gone(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("cannot find") || lower.contains("not found")
}
