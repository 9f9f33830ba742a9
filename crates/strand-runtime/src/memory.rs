//! Guarded stack region for frames
//!
//! One anonymous mapping holds every frame stack. Each slot is a guard page
//! (left `PROT_NONE`) followed by the stack, which grows down toward it:
//!
//! ```text
//! base                                                       base + total
//! | guard | stack 0 ........ | guard | stack 1 ........ | ... |
//!          ^ bottom    top ^
//! ```
//!
//! A stack overflow faults on the guard page instead of silently running
//! into the neighbouring frame.

use std::ptr;

use strand_core::constants::{GUARD_SIZE, PAGE_SIZE};
use strand_core::error::{StrandError, StrandResult};
use strand_core::kdebug;

/// Round `size` up to a whole number of pages
#[inline]
pub fn page_round(size: usize) -> usize {
    size.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

/// Fixed set of guarded stacks backed by one mapping
pub struct StackRegion {
    base: *mut u8,
    total_size: usize,
    slot_size: usize,
    stack_size: usize,
    slots: usize,
}

impl StackRegion {
    /// Map `slots` stacks of at least `stack_size` bytes each
    pub fn new(slots: usize, stack_size: usize) -> StrandResult<Self> {
        if slots == 0 || stack_size == 0 {
            return Err(StrandError::InvalidArgument("empty stack region"));
        }
        let stack_size = page_round(stack_size);
        let slot_size = stack_size + GUARD_SIZE;
        let total_size = slots
            .checked_mul(slot_size)
            .ok_or(StrandError::AllocationFailure)?;

        // Reserve everything inaccessible, then open up the stacks
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total_size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(StrandError::AllocationFailure);
        }

        let region = Self {
            base: base as *mut u8,
            total_size,
            slot_size,
            stack_size,
            slots,
        };

        for slot in 0..slots {
            let bottom = region.stack_bottom(slot);
            let ret = unsafe {
                libc::mprotect(
                    bottom as *mut libc::c_void,
                    stack_size,
                    libc::PROT_READ | libc::PROT_WRITE,
                )
            };
            if ret != 0 {
                // Drop unmaps the whole reservation
                return Err(StrandError::AllocationFailure);
            }
        }

        kdebug!(
            "stacks: {} x {} KiB mapped at {:p}",
            slots,
            stack_size / 1024,
            region.base
        );
        Ok(region)
    }

    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Usable bytes per stack (page rounded)
    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Lowest usable address of a slot's stack (just above its guard)
    #[inline]
    pub fn stack_bottom(&self, slot: usize) -> *mut u8 {
        debug_assert!(slot < self.slots);
        unsafe { self.base.add(slot * self.slot_size + GUARD_SIZE) }
    }

    /// One past the highest usable address of a slot's stack
    #[inline]
    pub fn stack_top(&self, slot: usize) -> *mut u8 {
        unsafe { self.stack_bottom(slot).add(self.stack_size) }
    }

    /// Unmap the region, reporting failure
    pub fn release(mut self) -> StrandResult<()> {
        self.unmap()
    }

    fn unmap(&mut self) -> StrandResult<()> {
        if self.base.is_null() {
            return Ok(());
        }
        let ret = unsafe { libc::munmap(self.base as *mut libc::c_void, self.total_size) };
        self.base = ptr::null_mut();
        if ret != 0 {
            return Err(StrandError::AllocationFailure);
        }
        Ok(())
    }
}

impl Drop for StackRegion {
    fn drop(&mut self) {
        let _ = self.unmap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_round() {
        assert_eq!(page_round(1), PAGE_SIZE);
        assert_eq!(page_round(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_round(PAGE_SIZE + 1), 2 * PAGE_SIZE);
        assert_eq!(page_round(20_000), 5 * PAGE_SIZE);
    }

    #[test]
    fn test_empty_rejected() {
        assert!(StackRegion::new(0, 64 * 1024).is_err());
        assert!(StackRegion::new(4, 0).is_err());
    }

    #[test]
    fn test_slots_are_disjoint_and_writable() {
        let region = StackRegion::new(4, 20_000).unwrap();
        assert_eq!(region.stack_size(), 5 * PAGE_SIZE);

        for slot in 0..region.slots() {
            let bottom = region.stack_bottom(slot);
            let top = region.stack_top(slot);
            assert_eq!(top as usize - bottom as usize, region.stack_size());
            assert_eq!(top as usize % 16, 0);
            unsafe {
                ptr::write_bytes(bottom, 0xAB, region.stack_size());
                assert_eq!(*top.sub(1), 0xAB);
            }
            if slot + 1 < region.slots() {
                let next = region.stack_bottom(slot + 1);
                assert_eq!(next as usize - top as usize, GUARD_SIZE);
            }
        }
        region.release().unwrap();
    }
}
