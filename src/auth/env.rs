//! Environment variable helpers used by [`AuthConfig::from_env`](super::AuthConfig::from_env).

/// Get an optional, non-empty environment variable.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a boolean environment variable.
///
/// Returns `true` if the value is "1" or "true" (case-insensitive).
pub fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Split a comma-separated environment variable, dropping blanks.
pub fn env_list(key: &str) -> Vec<String> {
    env_opt(key)
        .map(|v| split_list(&v))
        .unwrap_or_default()
}

pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_missing_vars() {
        assert!(!env_bool("GRAPH_AUTH_TEST_BOOL_NONEXISTENT"));
        assert!(env_opt("GRAPH_AUTH_TEST_OPT_NONEXISTENT").is_none());
        assert!(env_list("GRAPH_AUTH_TEST_LIST_NONEXISTENT").is_empty());
    }
}
