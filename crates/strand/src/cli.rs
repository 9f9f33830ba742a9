//! Minimal `-x value` flag parsing for the applications
//!
//! Lookup order per flag: command line, then environment variable, then
//! the default.

use std::str::FromStr;

use strand_core::env::env_get_opt;

/// Parsed `-flag value` pairs plus positional arguments
#[derive(Debug, Default, Clone)]
pub struct Flags {
    pairs: Vec<(String, String)>,
    positional: Vec<String>,
    help: bool,
}

impl Flags {
    /// Parse the process arguments (program name skipped)
    pub fn from_args() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut flags = Flags::default();
        let mut iter = args.into_iter().map(Into::into);
        while let Some(arg) = iter.next() {
            if arg == "-h" || arg == "--help" {
                flags.help = true;
            } else if let Some(name) = arg.strip_prefix('-').filter(|n| !n.is_empty()) {
                let name = name.trim_start_matches('-').to_string();
                match iter.next() {
                    Some(value) => flags.pairs.push((name, value)),
                    None => flags.help = true,
                }
            } else {
                flags.positional.push(arg);
            }
        }
        flags
    }

    /// `-h`/`--help` given, or a flag was missing its value
    pub fn wants_help(&self) -> bool {
        self.help
    }

    /// Raw value of the last `-name`
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// `-name` parsed as `T`, else `env_key`, else `default`
    pub fn get<T: FromStr>(&self, name: &str, env_key: &str, default: T) -> T {
        self.raw(name)
            .and_then(|v| v.parse().ok())
            .or_else(|| env_get_opt(env_key))
            .unwrap_or(default)
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_and_positional() {
        let flags = Flags::parse(["-p", "4000", "--threads", "2", "hello"]);
        assert_eq!(flags.get("p", "__STRAND_TEST_UNSET__", 1u16), 4000);
        assert_eq!(flags.get("threads", "__STRAND_TEST_UNSET__", 1usize), 2);
        assert_eq!(flags.positional(0), Some("hello"));
        assert!(!flags.wants_help());
    }

    #[test]
    fn test_fallbacks() {
        let flags = Flags::parse(["-p", "not-a-port"]);
        assert_eq!(flags.get("p", "__STRAND_TEST_UNSET__", 9999u16), 9999);
        std::env::set_var("__STRAND_TEST_CLI_PORT__", "7000");
        assert_eq!(flags.get("q", "__STRAND_TEST_CLI_PORT__", 9999u16), 7000);
        std::env::remove_var("__STRAND_TEST_CLI_PORT__");
    }

    #[test]
    fn test_help() {
        assert!(Flags::parse(["-h"]).wants_help());
        assert!(Flags::parse(["-p"]).wants_help());
    }
}
