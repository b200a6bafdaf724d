//! Path template helpers shared by the route tree and router handlers.
//!
//! Templates look like `/portal/:tenantId/products`. Colon-prefixed
//! segments are path parameters.

/// Joins `parts` with `separator`, collapsing a duplicated separator at
/// every joint and inserting one where neither side carries it.
pub fn path_combine(separator: &str, parts: &[&str]) -> String {
    let mut result = String::new();

    for part in parts {
        let sep_end = result.ends_with(separator);
        let sep_start = part.starts_with(separator);

        if sep_end && sep_start {
            result.push_str(&part[separator.len()..]);
        } else if !sep_end && !sep_start {
            result.push_str(separator);
            result.push_str(part);
        } else {
            result.push_str(part);
        }
    }

    result
}

/// Normalizes a template to exactly one leading `/` and no trailing `/`.
pub fn normalize_route_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

/// Names of the `:param` placeholders of `path`, in declaration order.
pub fn extract_params(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix(':'))
        .map(|name| {
            name.chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Route names are restricted to `[A-Za-z0-9_-]+`.
pub fn is_valid_route_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
