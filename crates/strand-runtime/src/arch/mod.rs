//! Architecture-specific context switching
//!
//! Each backend provides the same four items:
//!
//! - `init_context` - prepare a fresh context that starts in the trampoline
//! - `context_switch` - save the running context, resume another
//! - `context_jump` - resume another context without saving (retirement)
//! - `frame_trampoline` - first code a fresh frame runs
//!
//! The trampoline calls `entry(arg)`; `entry` returns the `SavedRegs` to
//! resume when the task is done, and the trampoline jumps there.

use strand_core::SavedRegs;

/// Entry point run on a fresh frame's stack.
///
/// Returns the context to resume once it is finished. Must not unwind.
pub type FrameEntry = extern "C" fn(arg: usize) -> *const SavedRegs;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use self::x86_64::*;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::*;
    }
}
