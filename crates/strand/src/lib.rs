//! # strand - stackful tasks on one thread, driven by io_uring
//!
//! Tasks are plain closures that look like blocking code. Each one runs on
//! its own guarded stack and is parked at every `async_*` call until the
//! kernel reports the completion.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::os::unix::io::AsRawFd;
//! use strand::{Executor, ExecutorConfig};
//!
//! fn main() -> strand::StrandResult<()> {
//!     let exec = Executor::new(ExecutorConfig::from_env())?;
//!     let listener = std::net::TcpListener::bind("0.0.0.0:8080").unwrap();
//!     let lfd = listener.as_raw_fd();
//!
//!     exec.spawn(move |exec| loop {
//!         let Ok(fd) = exec.async_accept(lfd) else { return };
//!         let _ = exec.spawn(move |exec| {
//!             let mut buf = [0u8; 4096];
//!             while let Ok(n @ 1..) = exec.async_read(fd, &mut buf) {
//!                 if exec.async_write_all(fd, &buf[..n]).is_err() {
//!                     break;
//!                 }
//!             }
//!             unsafe { libc::close(fd) };
//!         });
//!     })?;
//!
//!     exec.run()?;
//!     exec.teardown()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Task code                            │
//! │     async_accept / async_read / async_write / async_wait    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ park frame, switch
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Executor                             │
//! │   FrameTable: stable frames, round robin, retirement        │
//! │   StackRegion: guarded stacks, one mmap                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ request_* / process(batch)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        IoContext                            │
//! │   TokenPool (user_data -> frame), io_uring SQ/CQ            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! One executor per thread; to use several cores, run one per thread.

pub mod cli;
pub mod net;

pub use strand_core::constants;
pub use strand_core::env;
pub use strand_core::kprint;
pub use strand_core::{capacity_for, ConfigError, FrameId, StrandError, StrandResult};
// `kprint` above brings both the module and the macro
pub use strand_core::{kdebug, kerror, kinfo, kprintln, ktrace, kwarn};

pub use strand_reactor::{Completion, IoContext, RequestKind, TokenId, TokenPool};

pub use strand_runtime::config;
pub use strand_runtime::{Executor, ExecutorConfig};
