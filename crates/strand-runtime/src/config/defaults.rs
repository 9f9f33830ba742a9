//! Library defaults for `ExecutorConfig`

/// Task frames requested (realized capacity is the next power of two above)
pub const FRAME_COUNT: usize = 1024;

/// Concurrent reactor requests requested
pub const REACTOR_CAPACITY: usize = 1024;

/// Stack bytes per frame
pub const STACK_SIZE: usize = 64 * 1024;

/// Completions handed to dispatch per `process()` call
pub const BATCH_SIZE: usize = strand_core::constants::BATCH_SIZE;
