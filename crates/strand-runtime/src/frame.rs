//! Frames and the frame table
//!
//! Frame storage is allocated once and never moves: a `FrameId` names a
//! storage slot (and its stack) for the lifetime of the table. Scheduling
//! order is a separate permutation `order[index] -> FrameId`. The live
//! frames are `order[..size]`, with the main frame pinned at index 0.
//!
//! Retirement swaps the finishing frame's id to `order[size - 1]` and
//! shrinks `size`, so live frames stay contiguous without copying any
//! saved context. A token holding a `FrameId` still finds its frame after
//! such a swap.

use core::fmt;

use strand_core::constants::MAIN_FRAME;
use strand_core::error::{StrandError, StrandResult};
use strand_core::{FrameId, SavedRegs};

use crate::executor::Executor;

/// A task body waiting for its frame to start
pub type Task = Box<dyn FnOnce(&Executor)>;

/// One task's execution state
pub struct Frame {
    regs: SavedRegs,
    ready: bool,
    result: i32,
    task: Option<Task>,
}

impl Frame {
    fn vacant() -> Self {
        Self {
            regs: SavedRegs::default(),
            ready: false,
            result: 0,
            task: None,
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Result of the last completed request
    #[inline]
    pub fn result(&self) -> i32 {
        self.result
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("ready", &self.ready)
            .field("result", &self.result)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

/// Fixed-capacity frame storage plus round-robin order
pub struct FrameTable {
    frames: Box<[Frame]>,
    order: Box<[FrameId]>,
    size: usize,
    current: usize,
}

impl FrameTable {
    /// Table with `capacity` slots; slot 0 is the main frame, ready and live
    pub fn new(capacity: usize) -> StrandResult<Self> {
        if capacity < 2 {
            return Err(StrandError::InvalidArgument("frame table needs room for a task"));
        }
        let mut frames: Vec<Frame> = (0..capacity).map(|_| Frame::vacant()).collect();
        frames[MAIN_FRAME].ready = true;
        let order: Vec<FrameId> = (0..capacity as u32).map(FrameId::new).collect();

        Ok(Self {
            frames: frames.into_boxed_slice(),
            order: order.into_boxed_slice(),
            size: 1,
            current: MAIN_FRAME,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Live frames, main included
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Round-robin cursor (an index into the order, not a `FrameId`)
    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn current_id(&self) -> FrameId {
        self.order[self.current]
    }

    #[inline]
    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.as_usize())
    }

    /// Stable address of a frame's saved registers
    #[inline]
    pub(crate) fn regs_ptr(&mut self, id: FrameId) -> *mut SavedRegs {
        &mut self.frames[id.as_usize()].regs
    }

    /// Record a completion for `id` and make it runnable
    pub fn complete(&mut self, id: FrameId, result: i32) {
        if let Some(frame) = self.frames.get_mut(id.as_usize()) {
            frame.result = result;
            frame.ready = true;
        }
    }

    /// Park the current frame (never the main frame)
    pub fn block_current(&mut self) {
        debug_assert_ne!(self.current, MAIN_FRAME);
        let id = self.current_id();
        self.frames[id.as_usize()].ready = false;
    }

    /// Advance `current` cyclically to the next ready frame.
    ///
    /// Starts just past `current`; the main frame is always ready, so this
    /// takes at most `size` steps.
    pub fn next_ready(&mut self) -> FrameId {
        loop {
            self.current = (self.current + 1) % self.size;
            let id = self.order[self.current];
            if self.frames[id.as_usize()].ready {
                return id;
            }
        }
    }

    /// Claim the next free slot for `task` and mark it ready
    pub fn claim(&mut self, task: Task) -> StrandResult<FrameId> {
        if self.size == self.capacity() {
            return Err(StrandError::CapacityExceeded);
        }
        let id = self.order[self.size];
        let frame = &mut self.frames[id.as_usize()];
        frame.task = Some(task);
        frame.result = 0;
        frame.ready = true;
        self.size += 1;
        Ok(id)
    }

    /// Hand the not-yet-started task body to its frame
    pub(crate) fn take_task(&mut self, id: FrameId) -> Option<Task> {
        self.frames.get_mut(id.as_usize()).and_then(|f| f.task.take())
    }

    /// Remove the current frame and pick who runs next.
    ///
    /// Returns `(retired, next)`. `next` is the frame swapped into the
    /// current index if that one is ready, otherwise the result of a
    /// round-robin scan (possibly the main frame).
    pub fn retire_current(&mut self) -> (FrameId, FrameId) {
        debug_assert!(self.current != MAIN_FRAME && self.current < self.size);
        let retired = self.order[self.current];
        let last = self.size - 1;
        self.order.swap(self.current, last);
        self.size = last;

        let frame = &mut self.frames[retired.as_usize()];
        frame.ready = false;
        frame.task = None;
        frame.regs = SavedRegs::default();

        if self.current < self.size {
            let id = self.order[self.current];
            if self.frames[id.as_usize()].ready {
                return (retired, id);
            }
        } else {
            self.current = self.size - 1;
        }
        (retired, self.next_ready())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Task {
        Box::new(|_| {})
    }

    fn table_with(tasks: usize) -> (FrameTable, Vec<FrameId>) {
        let mut table = FrameTable::new(8).unwrap();
        let ids = (0..tasks).map(|_| table.claim(noop()).unwrap()).collect();
        (table, ids)
    }

    #[test]
    fn test_new_table() {
        let table = FrameTable::new(8).unwrap();
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.size(), 1);
        assert_eq!(table.current(), 0);
        assert!(table.current_id().is_main());
        assert!(table.frame(FrameId::MAIN).unwrap().is_ready());
        assert!(FrameTable::new(1).is_err());
    }

    #[test]
    fn test_claim_until_full() {
        let mut table = FrameTable::new(8).unwrap();
        for _ in 0..7 {
            table.claim(noop()).unwrap();
        }
        assert_eq!(table.size(), 8);
        assert_eq!(table.claim(noop()).unwrap_err(), StrandError::CapacityExceeded);
    }

    #[test]
    fn test_round_robin_order() {
        let (mut table, ids) = table_with(2);
        let (a, b) = (ids[0], ids[1]);
        let seen: Vec<FrameId> = (0..7).map(|_| table.next_ready()).collect();
        assert_eq!(seen, vec![a, b, FrameId::MAIN, a, b, FrameId::MAIN, a]);
    }

    #[test]
    fn test_blocked_frames_are_skipped() {
        let (mut table, ids) = table_with(3);
        assert_eq!(table.next_ready(), ids[0]);
        table.block_current();
        assert_eq!(table.next_ready(), ids[1]);
        assert_eq!(table.next_ready(), ids[2]);
        assert_eq!(table.next_ready(), FrameId::MAIN);
        assert_eq!(table.next_ready(), ids[1]);

        table.complete(ids[0], 42);
        assert_eq!(table.next_ready(), ids[2]);
        assert_eq!(table.next_ready(), FrameId::MAIN);
        assert_eq!(table.next_ready(), ids[0]);
        assert_eq!(table.frame(ids[0]).unwrap().result(), 42);
    }

    #[test]
    fn test_retire_resumes_swapped_in_frame() {
        let (mut table, ids) = table_with(3);
        assert_eq!(table.next_ready(), ids[0]);

        let (retired, next) = table.retire_current();
        assert_eq!(retired, ids[0]);
        assert_eq!(next, ids[2]);
        assert_eq!(table.size(), 3);
        assert_eq!(table.current(), 1);
        assert_eq!(table.order[3], ids[0]);
    }

    #[test]
    fn test_retire_last_index_wraps_to_main() {
        let (mut table, ids) = table_with(2);
        table.next_ready();
        assert_eq!(table.next_ready(), ids[1]);

        let (retired, next) = table.retire_current();
        assert_eq!(retired, ids[1]);
        assert_eq!(next, FrameId::MAIN);
        assert_eq!(table.current(), 0);
        assert_eq!(table.size(), 2);
    }

    #[test]
    fn test_blocked_frame_keeps_id_across_swap() {
        let (mut table, ids) = table_with(2);
        let (a, b) = (ids[0], ids[1]);

        // B blocks, then A retires and B is swapped into A's index
        table.next_ready();
        table.next_ready();
        table.block_current();
        table.current = 1;
        let (_, next) = table.retire_current();
        assert_eq!(next, FrameId::MAIN);
        assert_eq!(table.order[1], b);

        table.complete(b, 7);
        assert_eq!(table.next_ready(), b);
        assert_eq!(table.frame(b).unwrap().result(), 7);
        assert!(!table.frame(a).unwrap().is_ready());
    }

    #[test]
    fn test_retired_slot_is_reused() {
        let (mut table, ids) = table_with(1);
        table.next_ready();
        table.retire_current();
        assert_eq!(table.size(), 1);
        assert_eq!(table.claim(noop()).unwrap(), ids[0]);
    }
}
