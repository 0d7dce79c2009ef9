//! Target identifiers derived from display names.

/// Identifier length used when the dialect does not impose one.
pub const DEFAULT_MAX_IDENTIFIER_LENGTH: usize = 63;

/// Derives a safe table name from a display name.
///
/// Lowercases, turns every run of characters outside `[a-z0-9_]` into one
/// `_`, trims `_` from both ends and truncates to `max_len`. If nothing is
/// left, falls back to `collection_<id>` built the same way. The result is
/// never empty and always matches `[a-z0-9_]+` without edge underscores.
#[must_use]
pub fn sanitize_table_name(display_name: &str, collection_id: &str, max_len: usize) -> String {
    let max_len = max_len.max(1);
    let name = sanitize_identifier(display_name, max_len);
    if !name.is_empty() {
        return name;
    }

    let fallback = sanitize_identifier(&format!("collection_{collection_id}"), max_len);
    if fallback.is_empty() {
        // Only reachable with max_len == 1 and a degenerate id.
        "c".to_string()
    } else {
        fallback
    }
}

fn sanitize_identifier(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_len));
    for c in input.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '_'
        };
        if c == '_' && (out.is_empty() || out.ends_with('_')) {
            continue;
        }
        out.push(c);
    }

    // ASCII only from here, so byte truncation is char-safe.
    out.truncate(max_len);
    out.trim_end_matches('_').to_string()
}
