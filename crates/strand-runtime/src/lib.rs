//! # strand-runtime
//!
//! Runtime for the strand scheduler.
//!
//! This crate provides:
//! - Context switching (architecture-specific naked assembly)
//! - Guarded stack memory (one mmap reservation per executor)
//! - The frame table (stable storage, round-robin order, retirement)
//! - `ExecutorConfig` (defaults + environment overrides)
//! - `Executor`, which ties frames to an io_uring reactor

pub mod arch;
pub mod config;
pub mod executor;
pub mod frame;
pub mod memory;
mod tls;

// Re-exports
pub use config::ExecutorConfig;
pub use executor::Executor;
pub use frame::{Frame, FrameTable, Task};
pub use memory::StackRegion;

// Architecture detection
cfg_if::cfg_if! {
    if #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))] {
        compile_error!("Unsupported architecture");
    }
}

cfg_if::cfg_if! {
    if #[cfg(not(target_os = "linux"))] {
        compile_error!("strand requires Linux (io_uring)");
    }
}
