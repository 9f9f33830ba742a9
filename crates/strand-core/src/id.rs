//! Frame identifier type

use core::fmt;

/// Stable identifier of a frame's storage slot.
///
/// The frame table reorders live frames on retirement, but a frame's storage
/// (registers, stack, result) never moves. In-flight I/O refers to its
/// waiting frame by this id. `FrameId(0)` is always the main frame.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FrameId(u32);

impl FrameId {
    /// The main frame (the thread that called `run`)
    pub const MAIN: FrameId = FrameId(0);

    /// Sentinel value indicating no frame
    pub const NONE: FrameId = FrameId(u32::MAX);

    #[inline]
    pub const fn new(id: u32) -> Self {
        FrameId(id)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub const fn is_main(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for FrameId {
    #[inline]
    fn from(id: u32) -> Self {
        FrameId(id)
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "FrameId(NONE)")
        } else {
            write!(f, "FrameId({})", self.0)
        }
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_main() {
            write!(f, "main")
        } else {
            write!(f, "F{}", self.0)
        }
    }
}
