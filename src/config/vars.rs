//! Environment variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

use crate::error::ConfigError;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # Escape sequence $$
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?:
                (?P<sep>:?-)           # :- or just -
                (?P<default>[^}]*)
            )?
        \}
        |
        \$(?P<plain>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("Invalid regex pattern")
});

/// Interpolate environment variables in the given text.
///
/// All missing variables are accumulated into a single error so the user
/// sees every problem at once.
pub fn interpolate(input: &str) -> Result<String, ConfigError> {
    let mut missing = Vec::new();

    let text = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let full_match = caps.get(0).unwrap().as_str();
        if full_match == "$$" {
            return "$".to_string();
        }

        let name = caps
            .name("braced")
            .or_else(|| caps.name("plain"))
            .map(|m| m.as_str())
            .unwrap_or_default();

        match env::var(name) {
            Ok(value) if value.is_empty() && caps.name("sep").map(|s| s.as_str()) == Some(":-") => {
                caps.name("default").map(|m| m.as_str()).unwrap_or("").to_string()
            }
            Ok(value) => value,
            Err(_) => match caps.name("default") {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing.push(format!("environment variable '{name}' is not set"));
                    full_match.to_string()
                }
            },
        }
    });

    if missing.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(ConfigError::EnvInterpolation {
            message: missing.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        // Save original values
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: test-only mutation, restored before returning
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restoring original environment state
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_basic_substitution() {
        with_env_vars(&[("GALE_TEST_BASIC", Some("hello"))], || {
            let text = interpolate("value: $GALE_TEST_BASIC").unwrap();
            assert_eq!(text, "value: hello");
        });
    }

    #[test]
    fn test_braced_substitution() {
        with_env_vars(&[("GALE_TEST_BRACED", Some("world"))], || {
            let text = interpolate("value: ${GALE_TEST_BRACED}").unwrap();
            assert_eq!(text, "value: world");
        });
    }

    #[test]
    fn test_missing_variable_error() {
        with_env_vars(&[("GALE_TEST_MISSING", None)], || {
            let err = interpolate("value: $GALE_TEST_MISSING").unwrap_err();
            let message = err.to_string();
            assert!(message.contains("GALE_TEST_MISSING"));
        });
    }

    #[test]
    fn test_default_value_unset() {
        with_env_vars(&[("GALE_TEST_UNSET", None)], || {
            let text = interpolate("value: ${GALE_TEST_UNSET:-default}").unwrap();
            assert_eq!(text, "value: default");
        });
    }

    #[test]
    fn test_default_value_empty_with_colon() {
        with_env_vars(&[("GALE_TEST_EMPTY_COLON", Some(""))], || {
            let text = interpolate("value: ${GALE_TEST_EMPTY_COLON:-default}").unwrap();
            assert_eq!(text, "value: default");
        });
    }

    #[test]
    fn test_default_value_empty_without_colon() {
        with_env_vars(&[("GALE_TEST_EMPTY_NOCOLON", Some(""))], || {
            let text = interpolate("value: ${GALE_TEST_EMPTY_NOCOLON-default}").unwrap();
            assert_eq!(text, "value: ");
        });
    }

    #[test]
    fn test_escape_sequence() {
        let text = interpolate("cost: $$100").unwrap();
        assert_eq!(text, "cost: $100");
    }

    #[test]
    fn test_no_variables() {
        let text = interpolate("plain text").unwrap();
        assert_eq!(text, "plain text");
    }
}
