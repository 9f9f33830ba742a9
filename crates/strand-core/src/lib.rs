//! # strand-core
//!
//! Core types for the strand scheduler.
//!
//! This crate holds nothing that talks to the kernel. The io_uring reactor
//! lives in `strand-reactor`, stacks and context switching in
//! `strand-runtime`.
//!
//! ## Modules
//!
//! - `id` - Frame identifier type
//! - `context` - Saved register layout (repr(C), read by assembly)
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod context;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::FrameId;
pub use context::SavedRegs;
pub use error::{StrandError, StrandResult, ConfigError};
pub use env::{env_get, env_get_bool, env_get_opt};

/// Constants shared by the reactor and the runtime
pub mod constants {
    /// Upper bound on completions harvested by a single `process()` call
    pub const MAX_BATCH: usize = 1024;

    /// Batch size the run loop hands to the reactor
    pub const BATCH_SIZE: usize = 1024;

    /// Guard page size (4 KB)
    pub const GUARD_SIZE: usize = 4096;

    /// Page size used for stack rounding
    pub const PAGE_SIZE: usize = 4096;

    /// Smallest stack a frame may be configured with
    pub const MIN_STACK_SIZE: usize = 16 * 1024;

    /// Index of the main frame in the frame table
    pub const MAIN_FRAME: usize = 0;
}

/// Realized capacity for a requested element count.
///
/// One extra slot is reserved (the main frame, or the pool sentinel), then the
/// count is rounded up to a power of two. The result is always the smallest
/// power of two strictly greater than `hint`.
#[inline]
pub fn capacity_for(hint: usize) -> usize {
    hint.saturating_add(1).next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_for_known_values() {
        assert_eq!(capacity_for(1), 2);
        assert_eq!(capacity_for(5), 8);
        assert_eq!(capacity_for(7), 8);
        assert_eq!(capacity_for(8), 16);
        assert_eq!(capacity_for(10), 16);
        assert_eq!(capacity_for(40), 64);
        assert_eq!(capacity_for(1000), 1024);
    }

    #[test]
    fn test_capacity_is_smallest_power_above_hint() {
        for n in 1..5000usize {
            let cap = capacity_for(n);
            assert!(cap.is_power_of_two());
            assert!(cap > n);
            assert!(cap / 2 <= n, "capacity {} is not minimal for {}", cap, n);
        }
    }
}
