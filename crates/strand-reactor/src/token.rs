//! Correlation tokens and their fixed-capacity pool.
//!
//! The pool is a LIFO free stack over a boxed token array: `free[..tail]`
//! holds the ids of free tokens. Tokens never move, so the timer spec a
//! `Wait` request points the kernel at stays valid while in flight.

use core::fmt;
use std::os::unix::io::RawFd;

use io_uring::types::Timespec;
use strand_core::error::{StrandError, StrandResult};
use strand_core::id::FrameId;

/// What a token's request is waiting for
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Accept = 1,
    Read = 2,
    Write = 4,
    Wait = 8,
}

impl RequestKind {
    pub fn name(self) -> &'static str {
        match self {
            RequestKind::Accept => "accept",
            RequestKind::Read => "read",
            RequestKind::Write => "write",
            RequestKind::Wait => "wait",
        }
    }
}

/// Index of a token in its pool. Travels through the ring as `user_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TokenId(u32);

impl TokenId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        TokenId(id)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn user_data(self) -> u64 {
        self.0 as u64
    }
}

/// One outstanding (or reusable) I/O request record
pub struct Token {
    pub(crate) fd: RawFd,
    pub(crate) kind: RequestKind,
    pub(crate) frame: FrameId,
    pub(crate) timespec: Timespec,
    pub(crate) in_flight: bool,
}

impl Token {
    fn vacant() -> Self {
        Self {
            fd: -1,
            kind: RequestKind::Wait,
            frame: FrameId::NONE,
            timespec: Timespec::new(),
            in_flight: false,
        }
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    #[inline]
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    #[inline]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("fd", &self.fd)
            .field("kind", &self.kind)
            .field("frame", &self.frame)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

/// Fixed-capacity token pool. Never grows.
pub struct TokenPool {
    tokens: Box<[Token]>,
    free: Box<[TokenId]>,
    tail: usize,
}

impl TokenPool {
    /// Create a pool holding exactly `capacity` tokens, all free
    pub fn new(capacity: usize) -> Self {
        let tokens: Vec<Token> = (0..capacity).map(|_| Token::vacant()).collect();
        let free: Vec<TokenId> = (0..capacity as u32).map(TokenId::new).collect();
        Self {
            tokens: tokens.into_boxed_slice(),
            free: free.into_boxed_slice(),
            tail: capacity,
        }
    }

    /// Take a free token. O(1), never blocks.
    #[inline]
    pub fn acquire(&mut self) -> StrandResult<TokenId> {
        if self.tail == 0 {
            return Err(StrandError::PoolExhausted);
        }
        self.tail -= 1;
        let id = self.free[self.tail];
        self.tokens[id.as_usize()].in_flight = true;
        Ok(id)
    }

    /// Return a token to the pool.
    ///
    /// Out-of-range ids, tokens that are already free, and releases into a
    /// full pool are rejected and leave the pool untouched.
    #[inline]
    pub fn release(&mut self, id: TokenId) -> StrandResult<()> {
        if id.as_usize() >= self.tokens.len() {
            return Err(StrandError::InvalidArgument("token out of range"));
        }
        if self.tail == self.tokens.len() {
            return Err(StrandError::InvalidArgument("release into full token pool"));
        }
        let token = &mut self.tokens[id.as_usize()];
        if !token.in_flight {
            return Err(StrandError::InvalidArgument("token is not in flight"));
        }
        token.in_flight = false;
        token.frame = FrameId::NONE;
        self.free[self.tail] = id;
        self.tail += 1;
        Ok(())
    }

    /// Resolve a completion's `user_data` to an in-flight token
    #[inline]
    pub fn in_flight_id(&self, user_data: u64) -> Option<TokenId> {
        let idx = usize::try_from(user_data).ok()?;
        match self.tokens.get(idx) {
            Some(token) if token.in_flight => Some(TokenId::new(idx as u32)),
            _ => None,
        }
    }

    #[inline]
    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(id.as_usize())
    }

    #[inline]
    pub fn get_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.tokens.get_mut(id.as_usize())
    }

    /// Number of free tokens
    #[inline]
    pub fn tail(&self) -> usize {
        self.tail
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.tokens.len() - self.tail
    }
}
