//! aarch64 context switching implementation
//!
//! Register offsets match `strand_core::context::SavedRegs`: sp, pc, x19-x28,
//! fp, d8-d15. The saved pc is the link register at switch time, so a
//! resumed context continues with `ret`.

use std::arch::naked_asm;
use strand_core::SavedRegs;

use super::FrameEntry;

/// Initialize a fresh frame's context
///
/// # Safety
///
/// `regs` must point to valid SavedRegs memory and `stack_top` to the
/// (exclusive) top of a mapped stack.
#[inline]
pub unsafe fn init_context(
    regs: *mut SavedRegs,
    stack_top: *mut u8,
    entry: FrameEntry,
    arg: usize,
) {
    let sp = (stack_top as usize) & !0xF;

    let regs = &mut *regs;
    *regs = SavedRegs::default();
    regs.sp = sp as u64;
    regs.pc = frame_trampoline as usize as u64;
    regs.x19_x28[0] = entry as usize as u64;
    regs.x19_x28[1] = arg as u64;
}

/// `entry(arg)` from x19/x20, then resume the context it returned
#[unsafe(naked)]
pub unsafe extern "C" fn frame_trampoline() {
    naked_asm!(
        "mov x29, xzr",
        "mov x0, x20",
        "blr x19",
        "b {jump}",
        jump = sym context_jump,
    );
}

/// Save callee-saved registers to `old` and resume `new`.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old: *mut SavedRegs, _new: *const SavedRegs) {
    naked_asm!(
        // Save into old (x0)
        "mov x9, sp",
        "str x9, [x0, #0x00]",
        "str x30, [x0, #0x08]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "str x29, [x0, #0x60]",
        "stp d8, d9, [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",
        // Load from new (x1)
        "ldr x9, [x1, #0x00]",
        "mov sp, x9",
        "ldr x30, [x1, #0x08]",
        "ldp x19, x20, [x1, #0x10]",
        "ldp x21, x22, [x1, #0x20]",
        "ldp x23, x24, [x1, #0x30]",
        "ldp x25, x26, [x1, #0x40]",
        "ldp x27, x28, [x1, #0x50]",
        "ldr x29, [x1, #0x60]",
        "ldp d8, d9, [x1, #0x68]",
        "ldp d10, d11, [x1, #0x78]",
        "ldp d12, d13, [x1, #0x88]",
        "ldp d14, d15, [x1, #0x98]",
        "ret",
    );
}

/// Resume `new` and abandon the running context.
#[unsafe(naked)]
pub unsafe extern "C" fn context_jump(_new: *const SavedRegs) -> ! {
    naked_asm!(
        "ldr x9, [x0, #0x00]",
        "mov sp, x9",
        "ldr x30, [x0, #0x08]",
        "ldp x19, x20, [x0, #0x10]",
        "ldp x21, x22, [x0, #0x20]",
        "ldp x23, x24, [x0, #0x30]",
        "ldp x25, x26, [x0, #0x40]",
        "ldp x27, x28, [x0, #0x50]",
        "ldr x29, [x0, #0x60]",
        "ldp d8, d9, [x0, #0x68]",
        "ldp d10, d11, [x0, #0x78]",
        "ldp d12, d13, [x0, #0x88]",
        "ldp d14, d15, [x0, #0x98]",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop(_arg: usize) -> *const SavedRegs {
        core::ptr::null()
    }

    #[test]
    fn test_init_context_alignment() {
        let mut regs = SavedRegs::default();
        let top = 0x1000_0007usize as *mut u8;
        unsafe { init_context(&mut regs, top, noop, 3) };
        assert_eq!(regs.sp % 16, 0);
        assert_eq!(regs.x19_x28[1], 3);
        assert_eq!(regs.pc, frame_trampoline as usize as u64);
    }
}
