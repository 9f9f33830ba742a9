//! x86_64 context switching implementation
//!
//! Naked functions, stable since Rust 1.88. Register offsets match
//! `strand_core::context::SavedRegs`.

use std::arch::naked_asm;
use strand_core::SavedRegs;

use super::FrameEntry;

/// Initialize a fresh frame's context
///
/// Switching to `regs` afterwards starts `frame_trampoline` on the given
/// stack, which calls `entry(arg)`.
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
    // The trampoline is entered by jmp, so rsp stays 16-byte aligned there
    // and its `call` leaves the callee at rsp % 16 == 8 as the ABI expects.
    let sp = (stack_top as usize) & !0xF;

    let regs = &mut *regs;
    *regs = SavedRegs::default();
    regs.rsp = sp as u64;
    regs.rip = frame_trampoline as usize as u64;
    regs.r12 = entry as usize as u64;
    regs.r13 = arg as u64;
}

/// First instructions of every frame: `entry(arg)`, then resume the context
/// it returned.
#[unsafe(naked)]
pub unsafe extern "C" fn frame_trampoline() {
    naked_asm!(
        "xor ebp, ebp",
        "mov rdi, r13",
        "call r12",
        "mov rdi, rax",
        "jmp {jump}",
        jump = sym context_jump,
    );
}

/// Save callee-saved registers to `old` and resume `new`.
///
/// Returns when something later switches back to `old`.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old: *mut SavedRegs, _new: *const SavedRegs) {
    naked_asm!(
        // Save into old (RDI)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // Load from new (RSI)
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "jmp rax",
        // Resume point of a saved context
        "1:",
        "ret",
    );
}

/// Resume `new` and abandon the running context.
#[unsafe(naked)]
pub unsafe extern "C" fn context_jump(_new: *const SavedRegs) -> ! {
    naked_asm!(
        "mov rsp, [rdi + 0x00]",
        "mov rax, [rdi + 0x08]",
        "mov rbx, [rdi + 0x10]",
        "mov rbp, [rdi + 0x18]",
        "mov r12, [rdi + 0x20]",
        "mov r13, [rdi + 0x28]",
        "mov r14, [rdi + 0x30]",
        "mov r15, [rdi + 0x38]",
        "jmp rax",
    );
}
