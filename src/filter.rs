//! §4.B Filter parser.
//!
//! Supports exactly one shape: `<attr> <op> "<value>"`, a single binary
//! comparison per RFC 7644 §3.4.2.2, restricted to the subset real IdP
//! traffic uses. Logical connectives, grouping, and multi-valued path
//! expressions are out of scope (§1 Non-goals) and simply fail to parse.
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Co,
    Sw,
    Ew,
    Pr,
    Gt,
    Ge,
    Lt,
    Le,
}

impl FilterOp {
    fn parse(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "eq" => Some(FilterOp::Eq),
            "ne" => Some(FilterOp::Ne),
            "co" => Some(FilterOp::Co),
            "sw" => Some(FilterOp::Sw),
            "ew" => Some(FilterOp::Ew),
            "pr" => Some(FilterOp::Pr),
            "gt" => Some(FilterOp::Gt),
            "ge" => Some(FilterOp::Ge),
            "lt" => Some(FilterOp::Lt),
            "le" => Some(FilterOp::Le),
            _ => None,
        }
    }
}

/// A syntactically valid `attr op "value"` expression. Syntactic validity
/// does not imply the processor can act on it — see [`to_cache_predicate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    pub attr: String,
    pub op: FilterOp,
    pub value: String,
}

fn grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(\S+)[ ]+(\S+)[ ]+"([^"]*)"$"#).expect("static filter grammar regex")
    })
}

/// Parse the supported filter subset. Returns `None` ("unsupported") for
/// anything that doesn't match the single-comparison grammar, including the
/// bare `attr pr` form (no quoted value follows `pr`, so it never matches
/// this grammar) and any quoted value containing an escaped quote (Open
/// Question in spec §9 — not handled, matching observed IdP traffic).
pub fn parse(filter_str: &str) -> Option<ParsedFilter> {
    let trimmed = filter_str.trim();
    let captures = grammar().captures(trimmed)?;
    let attr = captures.get(1)?.as_str().to_string();
    let op = FilterOp::parse(captures.get(2)?.as_str())?;
    let value = captures.get(3)?.as_str().to_string();
    Some(ParsedFilter { attr, op, value })
}

/// A predicate the cache store can actually execute (§4.F `page`).
#[derive(Debug, Clone, PartialEq)]
pub enum CachePredicate {
    IdEquals(String),
    SamAccountNameEquals(String),
}

/// Narrow a parsed filter down to something the cache can query.
///
/// Only `eq` comparisons against `id`, `externalId` (aliases `id`), or
/// `userName` (aliases `sam_account_name`) are queryable — every other
/// attribute or operator, even one that parses successfully as a
/// [`ParsedFilter`], falls back to an unfiltered page. This matches the
/// spec's boundary case of `userName co "x"` being unsupported despite
/// `userName` being a recognized attribute: recognition is attribute *and*
/// operator, not attribute alone.
pub fn to_cache_predicate(filter_str: Option<&str>) -> Option<CachePredicate> {
    let parsed = parse(filter_str?)?;
    if parsed.op != FilterOp::Eq {
        return None;
    }
    match parsed.attr.to_lowercase().as_str() {
        "id" | "externalid" => Some(CachePredicate::IdEquals(parsed.value)),
        "username" => Some(CachePredicate::SamAccountNameEquals(
            parsed.value.split('@').next().unwrap_or("").to_string(),
        )),
        _ => None,
    }
}
