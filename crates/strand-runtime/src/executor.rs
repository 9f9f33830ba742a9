//! The executor: frame table, guarded stacks and one reactor on one thread
//!
//! Tasks are closures run on their own stacks. A task suspends only inside
//! an `async_*` call: the request goes to the reactor tagged with the task's
//! `FrameId`, the frame is parked and control switches to the next ready
//! frame. `run()` on the main frame drives the reactor whenever the round
//! robin comes back to it.
//!
//! # Borrow discipline
//!
//! State lives in an `UnsafeCell` and every method takes `&self`, because
//! task code holds `&Executor` while other frames run. A `&mut` to the inner
//! state is only ever created for a short section that never spans a
//! context switch.

use std::any::Any;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::os::unix::io::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use strand_core::constants::MAIN_FRAME;
use strand_core::error::{ConfigError, StrandError, StrandResult};
use strand_core::{capacity_for, kdebug, kerror, ktrace, FrameId, SavedRegs};
use strand_reactor::{IoContext, TokenId};

use crate::arch;
use crate::config::ExecutorConfig;
use crate::frame::FrameTable;
use crate::memory::StackRegion;
use crate::tls;

struct Inner {
    frames: FrameTable,
    reactor: IoContext,
    stacks: StackRegion,
    batch_size: usize,
    /// Returned by the next reactor pass instead of calling `process()`
    #[cfg(test)]
    fail_next_process: Option<StrandError>,
}

impl Inner {
    /// One reactor pass: completions mark their frames ready
    fn drain(&mut self) -> StrandResult<usize> {
        #[cfg(test)]
        if let Some(e) = self.fail_next_process.take() {
            return Err(e);
        }
        let Inner {
            frames,
            reactor,
            batch_size,
            ..
        } = self;
        reactor.process(*batch_size, |c| frames.complete(c.frame, c.result))
    }
}

/// Single-threaded stackful task scheduler
///
/// `!Send` and `!Sync`: one executor per thread.
pub struct Executor {
    inner: UnsafeCell<Inner>,
    _not_send: PhantomData<*const ()>,
}

impl Executor {
    /// Build an executor from a validated configuration.
    ///
    /// Either everything is allocated or nothing is: a later failure drops
    /// what was already set up.
    pub fn new(config: ExecutorConfig) -> StrandResult<Self> {
        config
            .validate()
            .map_err(|ConfigError::InvalidValue(msg)| StrandError::InvalidArgument(msg))?;

        let capacity = capacity_for(config.frame_count);
        let frames = FrameTable::new(capacity)?;
        // Slot 0 runs on the thread's own stack
        let stacks = StackRegion::new(capacity - 1, config.stack_size)?;
        let reactor = IoContext::new(config.reactor_capacity)?;

        kdebug!(
            "executor: {} frames, {} tokens, {} KiB stacks",
            capacity,
            reactor.capacity(),
            stacks.stack_size() / 1024
        );

        Ok(Self {
            inner: UnsafeCell::new(Inner {
                frames,
                reactor,
                stacks,
                batch_size: config.batch_size,
                #[cfg(test)]
                fail_next_process: None,
            }),
            _not_send: PhantomData,
        })
    }

    /// Executor with default stack and batch sizes
    pub fn with_capacity(frame_count: usize, reactor_capacity: usize) -> StrandResult<Self> {
        Self::new(
            ExecutorConfig::new()
                .frame_count(frame_count)
                .reactor_capacity(reactor_capacity),
        )
    }

    /// # Safety
    ///
    /// The caller must drop the returned reference before any context
    /// switch and before calling another method that does the same.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn inner(&self) -> &mut Inner {
        &mut *self.inner.get()
    }

    /// Read-only view for introspection between switches
    #[inline]
    fn state(&self) -> &Inner {
        unsafe { &*self.inner.get() }
    }

    /// Add a task. It runs the next time the round robin reaches it.
    pub fn spawn<F>(&self, task: F) -> StrandResult<()>
    where
        F: FnOnce(&Executor) + 'static,
    {
        let inner = unsafe { self.inner() };
        let id = inner.frames.claim(Box::new(task))?;
        let top = inner.stacks.stack_top(id.as_usize() - 1);
        let regs = inner.frames.regs_ptr(id);
        unsafe { arch::init_context(regs, top, frame_entry, id.as_usize()) };
        ktrace!("executor: spawned {} (size {})", id, inner.frames.size());
        Ok(())
    }

    /// Run until every task has finished.
    ///
    /// Must be called from the thread's own stack, not from a task. Returns
    /// early with the reactor's error if draining completions fails; tasks
    /// still parked at that point stay parked.
    pub fn run(&self) -> StrandResult<()> {
        let Some(_guard) = tls::enter(self) else {
            return Err(StrandError::InvalidState);
        };
        kdebug!("executor: run with {} frames", self.size());

        loop {
            let (prev, next) = {
                let frames = &mut unsafe { self.inner() }.frames;
                let prev = frames.current_id();
                let next = frames.next_ready();
                (frames.regs_ptr(prev), frames.regs_ptr(next))
            };
            if prev != next {
                unsafe { arch::context_switch(prev, next) };
            }

            let inner = unsafe { self.inner() };
            if inner.frames.size() <= 1 {
                kdebug!("executor: all tasks finished");
                return Ok(());
            }

            if let Err(e) = inner.drain() {
                kerror!("executor: reactor failed, stopping: {}", e);
                return Err(e);
            }
        }
    }

    /// Release the reactor, the stacks and the frame table
    pub fn teardown(self) -> StrandResult<()> {
        let Inner {
            frames,
            reactor,
            stacks,
            ..
        } = self.inner.into_inner();
        if frames.size() > 1 {
            kdebug!("executor: teardown with {} unfinished tasks", frames.size() - 1);
        }
        drop(reactor);
        drop(frames);
        stacks.release()
    }

    /// Accept a connection on a listening socket
    pub fn async_accept(&self, fd: RawFd) -> StrandResult<RawFd> {
        self.submit_and_suspend(|reactor, frame| reactor.request_accept(fd, frame))
    }

    /// Read into `buf`; `Ok(0)` is end of stream
    pub fn async_read(&self, fd: RawFd, buf: &mut [u8]) -> StrandResult<usize> {
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let ptr = buf.as_mut_ptr();
        // The buffer is borrowed for the whole call, which only returns
        // after the completion was dispatched.
        let n = self.submit_and_suspend(|reactor, frame| unsafe {
            reactor.request_read(fd, ptr, len, frame)
        })?;
        Ok(n as usize)
    }

    /// Write from `buf`; may write fewer bytes than given
    pub fn async_write(&self, fd: RawFd, buf: &[u8]) -> StrandResult<usize> {
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let ptr = buf.as_ptr();
        let n = self.submit_and_suspend(|reactor, frame| unsafe {
            reactor.request_write(fd, ptr, len, frame)
        })?;
        Ok(n as usize)
    }

    /// Write all of `buf`, resubmitting after short writes
    pub fn async_write_all(&self, fd: RawFd, mut buf: &[u8]) -> StrandResult<()> {
        while !buf.is_empty() {
            match self.async_write(fd, buf)? {
                0 => return Err(StrandError::Io(nix::errno::Errno::EPIPE)),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// Sleep for `duration` without blocking other tasks
    pub fn async_wait(&self, duration: Duration) -> StrandResult<()> {
        self.submit_and_suspend(|reactor, frame| reactor.request_wait(duration, frame))?;
        Ok(())
    }

    fn submit_and_suspend<F>(&self, submit: F) -> StrandResult<i32>
    where
        F: FnOnce(&mut IoContext, FrameId) -> StrandResult<TokenId>,
    {
        let id = {
            let inner = unsafe { self.inner() };
            let id = inner.frames.current_id();
            if id.is_main() {
                return Err(StrandError::NotInTask);
            }
            submit(&mut inner.reactor, id)?;
            id
        };

        self.suspend_current();

        let result = unsafe { self.inner() }
            .frames
            .frame(id)
            .map(|f| f.result())
            .unwrap_or(0);
        if result < 0 {
            Err(StrandError::from_result(result as i64))
        } else {
            Ok(result)
        }
    }

    /// Park the current frame and switch to the next ready one
    fn suspend_current(&self) {
        let (from, to) = {
            let frames = &mut unsafe { self.inner() }.frames;
            let from = frames.current_id();
            frames.block_current();
            let to = frames.next_ready();
            ktrace!("executor: {} -> {}", from, to);
            (frames.regs_ptr(from), frames.regs_ptr(to))
        };
        unsafe { arch::context_switch(from, to) };
    }

    /// Retire the running frame and leave it for good.
    ///
    /// Jumps straight into the next task when there is one. When the scan
    /// lands on the main frame, its context is returned instead and the
    /// trampoline resumes it.
    fn retire_current(&self) -> *const SavedRegs {
        let frames = &mut unsafe { self.inner() }.frames;
        let (retired, next) = frames.retire_current();
        ktrace!("executor: {} finished, next {} (size {})", retired, next, frames.size());

        let regs = frames.regs_ptr(next);
        if next.is_main() {
            return regs;
        }
        unsafe { arch::context_jump(regs) }
    }

    /// Live frames, main included
    pub fn size(&self) -> usize {
        self.state().frames.size()
    }

    /// Frame slots, main included
    pub fn capacity(&self) -> usize {
        self.state().frames.capacity()
    }

    /// Round-robin cursor
    pub fn current(&self) -> usize {
        self.state().frames.current()
    }

    /// Whether the caller is a task rather than the main frame
    pub fn in_task(&self) -> bool {
        self.state().frames.current() != MAIN_FRAME
    }

    pub fn reactor_capacity(&self) -> usize {
        self.state().reactor.capacity()
    }

    /// Reactor tokens not currently in flight
    pub fn free_tokens(&self) -> usize {
        self.state().reactor.free_tokens()
    }
}

/// First Rust code on a fresh frame's stack
extern "C" fn frame_entry(arg: usize) -> *const SavedRegs {
    let id = FrameId::new(arg as u32);
    let Some(exec) = (unsafe { tls::current_executor() }) else {
        kerror!("executor: {} started outside run()", id);
        std::process::abort();
    };

    let task = unsafe { exec.inner() }.frames.take_task(id);
    if let Some(task) = task {
        // Unwinding must not cross the trampoline
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(exec))) {
            kerror!("executor: task {} panicked: {}", id, panic_message(&*payload));
        }
    }

    // Nothing owned is left on this stack past this point
    exec.retire_current()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
