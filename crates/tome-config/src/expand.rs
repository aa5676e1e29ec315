//! `${VAR}` expansion for configuration strings.

use crate::error::ConfigError;

/// Expand environment variable references in a string.
///
/// `${VAR}` must be set; `${VAR:-default}` falls back to `default`. Strings
/// without `${` are returned untouched, so plain paths containing `$` survive.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, UnsetVar> {
        std::env::var(var).map(Some).map_err(|_| UnsetVar(var.to_owned()))
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{0}}} not set", e.cause.0),
    })
}

struct UnsetVar(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_cache_dir_var() {
        // SAFETY: each test uses its own variable name
        unsafe {
            std::env::set_var("TOME_TEST_CACHE_ROOT", "/var/cache");
        }
        let result = expand_env("${TOME_TEST_CACHE_ROOT}/tome", "cache.dir").unwrap();
        assert_eq!(result, "/var/cache/tome");
        unsafe {
            std::env::remove_var("TOME_TEST_CACHE_ROOT");
        }
    }

    #[test]
    fn test_expand_default_when_unset() {
        // SAFETY: each test uses its own variable name
        unsafe {
            std::env::remove_var("TOME_TEST_UNSET_SOURCE");
        }
        let result = expand_env("${TOME_TEST_UNSET_SOURCE:-docs}", "cache.dir").unwrap();
        assert_eq!(result, "docs");
    }

    #[test]
    fn test_expand_missing_var_names_field() {
        // SAFETY: each test uses its own variable name
        unsafe {
            std::env::remove_var("TOME_TEST_MISSING");
        }
        let err = expand_env("${TOME_TEST_MISSING}", "cache.dir").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("TOME_TEST_MISSING"));
        assert!(err.to_string().contains("cache.dir"));
    }

    #[test]
    fn test_bare_dollar_not_expanded() {
        assert_eq!(expand_env("docs/$draft", "cache.dir").unwrap(), "docs/$draft");
    }
}
