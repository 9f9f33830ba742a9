//! Executor configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env()` only)
//! 3. Library defaults (`defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use strand_runtime::config::ExecutorConfig;
//!
//! let config = ExecutorConfig::from_env()
//!     .frame_count(64)
//!     .stack_size(128 * 1024);
//! ```

pub mod defaults;

use strand_core::constants::{MAX_BATCH, MIN_STACK_SIZE};
use strand_core::env::env_get;
use strand_core::error::ConfigError;

use crate::memory::page_round;

/// Executor configuration with builder pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Task frames wanted (main frame excluded)
    pub frame_count: usize,
    /// Concurrent in-flight requests wanted
    pub reactor_capacity: usize,
    /// Stack bytes per frame, rounded up to whole pages
    pub stack_size: usize,
    /// Completions per reactor pass in `run()`
    pub batch_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ExecutorConfig {
    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `STRAND_FRAME_COUNT` - Task frames
    /// - `STRAND_REACTOR_CAPACITY` - Concurrent reactor requests
    /// - `STRAND_STACK_SIZE` - Stack bytes per frame
    /// - `STRAND_BATCH_SIZE` - Completions per reactor pass
    pub fn from_env() -> Self {
        Self {
            frame_count: env_get("STRAND_FRAME_COUNT", defaults::FRAME_COUNT),
            reactor_capacity: env_get("STRAND_REACTOR_CAPACITY", defaults::REACTOR_CAPACITY),
            stack_size: env_get("STRAND_STACK_SIZE", defaults::STACK_SIZE),
            batch_size: env_get("STRAND_BATCH_SIZE", defaults::BATCH_SIZE),
        }
    }

    /// Library defaults only, no environment lookup
    pub fn new() -> Self {
        Self {
            frame_count: defaults::FRAME_COUNT,
            reactor_capacity: defaults::REACTOR_CAPACITY,
            stack_size: defaults::STACK_SIZE,
            batch_size: defaults::BATCH_SIZE,
        }
    }

    // Builder methods

    pub fn frame_count(mut self, n: usize) -> Self {
        self.frame_count = n;
        self
    }

    pub fn reactor_capacity(mut self, n: usize) -> Self {
        self.reactor_capacity = n;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Stack size actually mapped per frame
    #[inline]
    pub fn rounded_stack_size(&self) -> usize {
        page_round(self.stack_size)
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_count == 0 {
            return Err(ConfigError::InvalidValue("frame_count must be > 0"));
        }
        if self.reactor_capacity == 0 {
            return Err(ConfigError::InvalidValue("reactor_capacity must be > 0"));
        }
        if self.frame_count >= u32::MAX as usize / 2 {
            return Err(ConfigError::InvalidValue("frame_count too large"));
        }
        if self.reactor_capacity >= u32::MAX as usize / 2 {
            return Err(ConfigError::InvalidValue("reactor_capacity too large"));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be >= 16KB"));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH {
            return Err(ConfigError::InvalidValue("batch_size must be in 1..=1024"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Strand Configuration:");
        eprintln!("  frame_count:       {}", self.frame_count);
        eprintln!("  reactor_capacity:  {}", self.reactor_capacity);
        eprintln!("  stack_size:        {}", self.rounded_stack_size());
        eprintln!("  batch_size:        {}", self.batch_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = ExecutorConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_count, defaults::FRAME_COUNT);
    }

    #[test]
    fn test_builder() {
        let config = ExecutorConfig::new()
            .frame_count(8)
            .reactor_capacity(32)
            .stack_size(20_000)
            .batch_size(16);

        assert_eq!(config.frame_count, 8);
        assert_eq!(config.reactor_capacity, 32);
        assert_eq!(config.rounded_stack_size(), 20_480);
        assert_eq!(config.batch_size, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(ExecutorConfig::new().frame_count(0).validate().is_err());
        assert!(ExecutorConfig::new().reactor_capacity(0).validate().is_err());
        assert!(ExecutorConfig::new().stack_size(4096).validate().is_err());
        assert!(ExecutorConfig::new().batch_size(0).validate().is_err());
        assert!(ExecutorConfig::new().batch_size(MAX_BATCH + 1).validate().is_err());
        assert!(ExecutorConfig::new().batch_size(MAX_BATCH).validate().is_ok());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("STRAND_BATCH_SIZE", "7");
        let config = ExecutorConfig::from_env();
        std::env::remove_var("STRAND_BATCH_SIZE");
        assert_eq!(config.batch_size, 7);
    }
}
