use crate::common::KEY_PREFIX_SEPARATOR;

/// Normalizes a document key for case-insensitive lookups.
#[inline]
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
}

/// Compares two document keys ignoring case.
#[inline]
pub fn keys_equal(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Returns `true` when the key is a prefix that the server completes on write
/// (for example `"users/"`).
#[inline]
pub fn is_server_assigned_prefix(key: &str) -> bool {
    key.ends_with(KEY_PREFIX_SEPARATOR)
}

/// Returns the key only if it can be registered in the key map before the
/// server has answered.
#[inline]
pub fn registrable_key(key: Option<&str>) -> Option<&str> {
    match key {
        Some(k) if !k.is_empty() && !is_server_assigned_prefix(k) => Some(k),
        _ => None,
    }
}
