//! Saved register layout for frame context switches
//!
//! Only callee-saved registers are stored: a switch is always a plain
//! function call from the suspending frame's point of view, so the compiler
//! has already spilled everything caller-saved. Offsets are stable; the
//! assembly in `strand-runtime::arch` addresses fields by offset.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// Callee-saved registers per System V AMD64 ABI
        ///
        /// ```text
        /// 0x00: rsp   0x08: rip   0x10: rbx   0x18: rbp
        /// 0x20: r12   0x28: r13   0x30: r14   0x38: r15
        /// ```
        #[repr(C)]
        #[derive(Debug, Default, Clone, Copy)]
        pub struct SavedRegs {
            pub rsp: u64,
            pub rip: u64,
            pub rbx: u64,
            pub rbp: u64,
            pub r12: u64,
            pub r13: u64,
            pub r14: u64,
            pub r15: u64,
        }

        /// Size of SavedRegs in bytes
        pub const SAVED_REGS_SIZE: usize = 64;
    } else if #[cfg(target_arch = "aarch64")] {
        /// Callee-saved registers per AAPCS64
        ///
        /// ```text
        /// 0x00: sp    0x08: pc (x30 at switch time)
        /// 0x10: x19 .. 0x58: x28    0x60: x29 (fp)
        /// 0x68: d8  .. 0xA0: d15
        /// ```
        #[repr(C)]
        #[derive(Debug, Default, Clone, Copy)]
        pub struct SavedRegs {
            pub sp: u64,
            pub pc: u64,
            pub x19_x28: [u64; 10],
            pub fp: u64,
            pub d8_d15: [u64; 8],
        }

        /// Size of SavedRegs in bytes
        pub const SAVED_REGS_SIZE: usize = 168;
    } else {
        compile_error!("Unsupported architecture");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_size() {
        assert_eq!(core::mem::size_of::<SavedRegs>(), SAVED_REGS_SIZE);
        assert_eq!(core::mem::align_of::<SavedRegs>(), 8);
    }
}
