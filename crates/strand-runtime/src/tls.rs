//! Thread-local pointer to the executor currently inside `run()`
//!
//! A fresh frame starts in the trampoline with nothing but its `FrameId`;
//! this is how it finds its executor. The pointer is only set while `run()`
//! holds `&Executor`, so it never outlives the borrow.

use std::cell::Cell;
use std::ptr;

use crate::executor::Executor;

thread_local! {
    static CURRENT_EXECUTOR: Cell<*const Executor> = const { Cell::new(ptr::null()) };
}

/// Clears the current executor on drop
pub(crate) struct RunGuard {
    _private: (),
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        CURRENT_EXECUTOR.with(|cell| cell.set(ptr::null()));
    }
}

/// Mark `exec` as the running executor of this thread.
///
/// Returns `None` if one is already running here.
pub(crate) fn enter(exec: &Executor) -> Option<RunGuard> {
    CURRENT_EXECUTOR.with(|cell| {
        if !cell.get().is_null() {
            return None;
        }
        cell.set(exec as *const Executor);
        Some(RunGuard { _private: () })
    })
}

/// Executor running on this thread, if any
///
/// # Safety
///
/// The returned reference is only valid while that executor's `run()` is on
/// the main stack, which holds for any code running inside a frame.
#[inline]
pub(crate) unsafe fn current_executor<'a>() -> Option<&'a Executor> {
    let exec = CURRENT_EXECUTOR.with(|cell| cell.get());
    exec.as_ref()
}
