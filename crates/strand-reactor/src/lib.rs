//! # strand-reactor — io_uring completion reactor
//!
//! The reactor owns one io_uring instance and a fixed pool of correlation
//! tokens. Every submitted request carries a token index in its
//! `user_data`; the token remembers what kind of request it was and which
//! frame is parked on it.
//!
//! ```text
//!  request_read(fd, buf, frame)
//!        │  acquire token ── PoolExhausted
//!        │  build SQE, user_data = token
//!        ▼  push ─────────── SubmissionFailure (token released)
//!   ┌──────────┐   process(batch)    ┌──────────┐
//!   │    SQ    │ ──── enter ───────▶ │  kernel  │
//!   └──────────┘                     └────┬─────┘
//!                                         ▼
//!   on_complete(Completion) ◀── harvest CQEs ◀── CQ
//!        │  release token
//! ```
//!
//! Single-threaded by construction: an `IoContext` is owned by exactly one
//! executor and is never shared.

pub mod token;
pub mod io_context;

pub use token::{RequestKind, Token, TokenId, TokenPool};
pub use io_context::{Completion, IoContext};
