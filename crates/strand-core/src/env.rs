//! Environment variable utilities
//!
//! Typed lookups with defaults, used by the executor config, the logging
//! setup and the binaries' flag fallbacks.
//!
//! ```ignore
//! use strand_core::env::{env_get, env_get_bool};
//!
//! let frames: usize = env_get("STRAND_FRAME_COUNT", 1024);
//! let verbose = env_get_bool("STRAND_VERBOSE", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as `T`, or `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// "1", "true", "yes", "on" (any case) are true; any other set value is
/// false. Unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses, `None` otherwise
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_returns_default() {
        let val: usize = env_get("__STRAND_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert!(env_get_bool("__STRAND_TEST_UNSET__", true));
        assert!(env_get_opt::<u32>("__STRAND_TEST_UNSET__").is_none());
    }

    #[test]
    fn test_parse_with_whitespace() {
        std::env::set_var("__STRAND_TEST_NUM__", " 123 ");
        let val: usize = env_get("__STRAND_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__STRAND_TEST_NUM__");
    }

    #[test]
    fn test_bool_variants() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            std::env::set_var("__STRAND_TEST_BOOL__", v);
            assert!(env_get_bool("__STRAND_TEST_BOOL__", false), "{}", v);
        }
        for v in ["0", "false", "garbage"] {
            std::env::set_var("__STRAND_TEST_BOOL__", v);
            assert!(!env_get_bool("__STRAND_TEST_BOOL__", true), "{}", v);
        }
        std::env::remove_var("__STRAND_TEST_BOOL__");
    }

    #[test]
    fn test_invalid_parse_falls_back() {
        std::env::set_var("__STRAND_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__STRAND_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__STRAND_TEST_INVALID__");
    }
}
