//! Scope & name utilities (spec §4.A).
//!
//! A scope is a dot-separated path of identifiers naming a dApp's position in the
//! tree; the empty string denotes root. These helpers are pure and fail with a single
//! recoverable `BadRequest` error, per spec.

use crate::error::InsprError;
use crate::meta::Metadata;
use regex::Regex;
use std::sync::LazyLock;

const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("valid identifier regex"));

/// Validates a single path segment: non-empty, alphanumeric plus `-`, length-bounded.
/// All three failure cases share the single recoverable `BadRequest` kind (spec §4.A).
pub fn structure_name_is_valid(name: &str) -> Result<(), InsprError> {
    if name.is_empty() {
        return Err(InsprError::bad_request("identifier must not be empty"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(InsprError::bad_request(format!(
            "identifier '{name}' exceeds the {MAX_IDENTIFIER_LEN}-character limit"
        )));
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err(InsprError::bad_request(format!(
            "identifier '{name}' must be alphanumeric with '-' separators"
        )));
    }
    Ok(())
}

/// Validates a dotted scope: the empty string is valid (root); otherwise no leading,
/// trailing, or consecutive dots, and every segment must be a valid identifier.
pub fn is_valid_scope(scope: &str) -> bool {
    if scope.is_empty() {
        return true;
    }
    if scope.starts_with('.') || scope.ends_with('.') || scope.contains("..") {
        return false;
    }
    scope.split('.').all(|seg| structure_name_is_valid(seg).is_ok())
}

fn validate_scope(scope: &str) -> Result<(), InsprError> {
    if is_valid_scope(scope) {
        Ok(())
    } else {
        Err(InsprError::bad_request(format!("invalid scope '{scope}'")))
    }
}

/// Joins two scopes with `.`, validating the result. `a == ""` returns `b` unchanged.
pub fn join_scopes(a: &str, b: &str) -> Result<String, InsprError> {
    validate_scope(a)?;
    validate_scope(b)?;
    let joined = if a.is_empty() {
        b.to_string()
    } else if b.is_empty() {
        a.to_string()
    } else {
        format!("{a}.{b}")
    };
    validate_scope(&joined)?;
    Ok(joined)
}

/// Splits a scope into its parent prefix and its last segment.
/// Fails on an invalid or empty scope (root has no "last part").
pub fn remove_last_part_in_scope(scope: &str) -> Result<(String, String), InsprError> {
    validate_scope(scope)?;
    if scope.is_empty() {
        return Err(InsprError::bad_request(
            "cannot remove the last part of the root scope",
        ));
    }
    match scope.rsplit_once('.') {
        Some((prefix, last)) => Ok((prefix.to_string(), last.to_string())),
        None => Ok((String::new(), scope.to_string())),
    }
}

/// Fills `meta.uuid` with a fresh v4 UUID when empty.
pub fn inject_uuid(meta: &mut Metadata) {
    if meta.uuid.is_empty() {
        meta.uuid = uuid::Uuid::new_v4().to_string();
    }
}
