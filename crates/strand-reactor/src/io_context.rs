//! `IoContext` — the io_uring reactor.
//!
//! Each `request_*` call acquires a token, builds an SQE stamped with the
//! token index, and queues it. Nothing reaches the kernel until `process()`
//! flushes the submission queue; `process()` then harvests a batch of CQEs
//! and hands each one to the caller's completion sink in harvest order.

use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

use io_uring::{opcode, squeue, types, IoUring};
use strand_core::constants::MAX_BATCH;
use strand_core::error::{StrandError, StrandResult};
use strand_core::id::FrameId;
use strand_core::{capacity_for, kdebug, ktrace};

use crate::token::{RequestKind, Token, TokenId, TokenPool};

/// A dispatched completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub kind: RequestKind,
    /// Frame parked on the request
    pub frame: FrameId,
    /// Byte count, accepted descriptor, `0` for an expired timer, or `-errno`
    pub result: i32,
}

impl Completion {
    fn new(kind: RequestKind, frame: FrameId, res: i32) -> Self {
        // A timeout "fails" with ETIME when it simply expired
        let result = match kind {
            RequestKind::Wait if res == -libc::ETIME => 0,
            _ => res,
        };
        Self { kind, frame, result }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.result < 0
    }
}

/// io_uring instance plus its correlation token pool
pub struct IoContext {
    ring: IoUring,
    pool: TokenPool,
    /// (user_data, result) pairs copied out of the CQ by `harvest`
    harvested: Vec<(u64, i32)>,
}

impl IoContext {
    /// Create a reactor for `capacity_hint` concurrent requests.
    ///
    /// The realized capacity is `capacity_for(capacity_hint)`; the ring's
    /// submission queue is sized to match so a queued token always has an
    /// SQE slot unless the queue was never flushed.
    pub fn new(capacity_hint: usize) -> StrandResult<Self> {
        if capacity_hint == 0 {
            return Err(StrandError::InvalidArgument("reactor capacity must be > 0"));
        }
        let capacity = capacity_for(capacity_hint);
        let entries = u32::try_from(capacity)
            .map_err(|_| StrandError::InvalidArgument("reactor capacity too large"))?;

        let ring = IoUring::new(entries).map_err(|e| StrandError::primitive(&e))?;
        kdebug!("reactor: io_uring ready, {} tokens", capacity);

        Ok(Self {
            ring,
            pool: TokenPool::new(capacity),
            harvested: Vec::with_capacity(MAX_BATCH),
        })
    }

    /// Queue an accept on a listening socket
    pub fn request_accept(&mut self, fd: RawFd, frame: FrameId) -> StrandResult<TokenId> {
        self.push(RequestKind::Accept, fd, frame, |_| {
            opcode::Accept::new(types::Fd(fd), ptr::null_mut(), ptr::null_mut())
                .flags(libc::SOCK_CLOEXEC)
                .build()
        })
    }

    /// Queue a read into `buf[..len]`.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for writes of `len` bytes until the completion
    /// has been dispatched by `process()`.
    pub unsafe fn request_read(
        &mut self,
        fd: RawFd,
        buf: *mut u8,
        len: u32,
        frame: FrameId,
    ) -> StrandResult<TokenId> {
        self.push(RequestKind::Read, fd, frame, |_| {
            // offset -1: use (and advance) the file position, like read(2)
            opcode::Read::new(types::Fd(fd), buf, len)
                .offset(u64::MAX)
                .build()
        })
    }

    /// Queue a write of `buf[..len]`.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for reads of `len` bytes until the completion has
    /// been dispatched by `process()`.
    pub unsafe fn request_write(
        &mut self,
        fd: RawFd,
        buf: *const u8,
        len: u32,
        frame: FrameId,
    ) -> StrandResult<TokenId> {
        self.push(RequestKind::Write, fd, frame, |_| {
            opcode::Write::new(types::Fd(fd), buf, len)
                .offset(u64::MAX)
                .build()
        })
    }

    /// Queue a pure timer
    pub fn request_wait(&mut self, duration: Duration, frame: FrameId) -> StrandResult<TokenId> {
        self.push(RequestKind::Wait, -1, frame, |token| {
            token.timespec = types::Timespec::new()
                .sec(duration.as_secs())
                .nsec(duration.subsec_nanos());
            // The kernel reads the timespec at submit time; it lives in the
            // token, which stays put until the completion is dispatched.
            opcode::Timeout::new(&token.timespec as *const types::Timespec).build()
        })
    }

    fn push<F>(
        &mut self,
        kind: RequestKind,
        fd: RawFd,
        frame: FrameId,
        build: F,
    ) -> StrandResult<TokenId>
    where
        F: FnOnce(&mut Token) -> squeue::Entry,
    {
        let id = self.pool.acquire()?;
        let sqe = {
            let token = self
                .pool
                .get_mut(id)
                .ok_or(StrandError::InvalidArgument("token out of range"))?;
            token.kind = kind;
            token.fd = fd;
            token.frame = frame;
            build(token).user_data(id.user_data())
        };

        // Safety: buffers and timespecs referenced by the SQE outlive the
        // request (caller contract / token storage).
        let pushed = unsafe { self.ring.submission().push(&sqe) };
        if pushed.is_err() {
            let _ = self.pool.release(id);
            return Err(StrandError::SubmissionFailure);
        }

        ktrace!("reactor: queued {} fd={} for {} as token {}", kind.name(), fd, frame, id.as_usize());
        Ok(id)
    }

    /// Flush submissions, harvest up to `max_batch` completions and
    /// dispatch them to `on_complete` in harvest order.
    ///
    /// Blocks the calling thread only when nothing has completed yet.
    /// Returns the number of completions processed.
    pub fn process<F>(&mut self, max_batch: usize, mut on_complete: F) -> StrandResult<usize>
    where
        F: FnMut(Completion),
    {
        if max_batch == 0 {
            return Ok(0);
        }
        let batch = max_batch.min(MAX_BATCH);

        self.flush()?;

        let mut count = self.harvest(batch);
        if count == 0 {
            self.wait_for_completion()?;
            count = self.harvest(batch);
        }

        for i in 0..count {
            let (user_data, res) = self.harvested[i];
            let Some(id) = self.pool.in_flight_id(user_data) else {
                ktrace!("reactor: dropping completion for unknown token {}", user_data);
                continue;
            };
            let completion = match self.pool.get(id) {
                Some(token) => Completion::new(token.kind, token.frame, res),
                None => continue,
            };
            on_complete(completion);
            let _ = self.pool.release(id);
        }

        Ok(count)
    }

    /// Push every queued SQE to the kernel. Never waits.
    pub fn flush(&mut self) -> StrandResult<usize> {
        if self.ring.submission().is_empty() {
            return Ok(0);
        }
        self.ring.submit().map_err(|e| StrandError::primitive(&e))
    }

    /// Copy up to `batch` CQEs out of the ring; the CQ head advances when
    /// the queue handle drops.
    fn harvest(&mut self, batch: usize) -> usize {
        self.harvested.clear();
        let cq = self.ring.completion();
        for cqe in cq.take(batch) {
            self.harvested.push((cqe.user_data(), cqe.result()));
        }
        self.harvested.len()
    }

    fn wait_for_completion(&mut self) -> StrandResult<()> {
        loop {
            match self.ring.submit_and_wait(1) {
                Ok(_) => return Ok(()),
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) => return Err(StrandError::primitive(&e)),
            }
        }
    }

    /// Total token capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Free tokens (the pool's `tail`)
    #[inline]
    pub fn free_tokens(&self) -> usize {
        self.pool.tail()
    }

    /// Requests queued or submitted but not yet dispatched
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    const MESSAGE: &[u8] = b"random message";

    /// io_uring may be disabled (seccomp, old kernel); skip instead of failing
    fn ring(capacity: usize) -> Option<IoContext> {
        match IoContext::new(capacity) {
            Ok(ioc) => Some(ioc),
            Err(StrandError::PrimitiveFailure(code)) => {
                eprintln!("skipping: io_uring unavailable (errno {})", code);
                None
            }
            Err(e) => panic!("unexpected reactor error: {}", e),
        }
    }

    fn drain(ioc: &mut IoContext) -> Vec<Completion> {
        let mut out = Vec::new();
        ioc.process(64, |c| out.push(c)).unwrap();
        out
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(matches!(
            IoContext::new(0),
            Err(StrandError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_capacity_rounding() {
        let Some(ioc) = ring(10) else { return };
        assert_eq!(ioc.capacity(), 16);
        assert_eq!(ioc.free_tokens(), 16);
        assert_eq!(ioc.in_flight(), 0);
    }

    #[test]
    fn test_zero_batch_is_noop() {
        let Some(mut ioc) = ring(1) else { return };
        ioc.request_wait(Duration::from_millis(1), FrameId::new(1)).unwrap();
        let mut called = false;
        assert_eq!(ioc.process(0, |_| called = true).unwrap(), 0);
        assert!(!called);
        assert_eq!(ioc.in_flight(), 1);
    }

    #[test]
    fn test_wait_completes_after_duration() {
        let Some(mut ioc) = ring(1) else { return };
        let frame = FrameId::new(5);
        let start = Instant::now();
        ioc.request_wait(Duration::from_millis(50), frame).unwrap();
        assert_eq!(ioc.free_tokens(), ioc.capacity() - 1);

        let done = drain(&mut ioc);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].kind, RequestKind::Wait);
        assert_eq!(done[0].frame, frame);
        assert_eq!(done[0].result, 0);
        assert_eq!(ioc.free_tokens(), ioc.capacity());
    }

    #[test]
    fn test_pool_exhaustion_rejects_without_queueing() {
        let Some(mut ioc) = ring(1) else { return };
        assert_eq!(ioc.capacity(), 2);
        ioc.request_wait(Duration::from_millis(1), FrameId::new(1)).unwrap();
        ioc.request_wait(Duration::from_millis(1), FrameId::new(2)).unwrap();
        assert_eq!(
            ioc.request_wait(Duration::from_millis(1), FrameId::new(3)),
            Err(StrandError::PoolExhausted)
        );
        assert_eq!(ioc.free_tokens(), 0);

        let mut frames = Vec::new();
        while frames.len() < 2 {
            ioc.process(8, |c| frames.push(c.frame)).unwrap();
        }
        frames.sort();
        assert_eq!(frames, vec![FrameId::new(1), FrameId::new(2)]);
        assert_eq!(ioc.free_tokens(), 2);
    }

    #[test]
    fn test_write_then_read_socket_pair() {
        let Some(mut ioc) = ring(4) else { return };
        let (a, b) = UnixStream::pair().unwrap();

        let n = unsafe {
            ioc.request_write(a.as_raw_fd(), MESSAGE.as_ptr(), MESSAGE.len() as u32, FrameId::new(1))
        };
        n.unwrap();
        let done = drain(&mut ioc);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].kind, RequestKind::Write);
        assert_eq!(done[0].result, MESSAGE.len() as i32);

        let mut buf = [0u8; 64];
        unsafe {
            ioc.request_read(b.as_raw_fd(), buf.as_mut_ptr(), buf.len() as u32, FrameId::new(2))
                .unwrap();
        }
        let done = drain(&mut ioc);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].kind, RequestKind::Read);
        assert_eq!(done[0].frame, FrameId::new(2));
        assert_eq!(&buf[..done[0].result as usize], MESSAGE);
    }

    #[test]
    fn test_read_reports_eof_and_errors() {
        let Some(mut ioc) = ring(4) else { return };
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);

        let mut buf = [0u8; 16];
        unsafe {
            ioc.request_read(b.as_raw_fd(), buf.as_mut_ptr(), 16, FrameId::new(1)).unwrap();
        }
        let done = drain(&mut ioc);
        assert_eq!(done[0].result, 0);

        unsafe {
            ioc.request_read(-1, buf.as_mut_ptr(), 16, FrameId::new(1)).unwrap();
        }
        let done = drain(&mut ioc);
        assert_eq!(done[0].result, -libc::EBADF);
        assert!(done[0].is_error());
    }

    #[test]
    fn test_read_blocks_until_peer_writes() {
        let Some(mut ioc) = ring(1) else { return };
        let (a, b) = UnixStream::pair().unwrap();

        let mut buf = [0u8; 64];
        unsafe {
            ioc.request_read(b.as_raw_fd(), buf.as_mut_ptr(), buf.len() as u32, FrameId::new(1))
                .unwrap();
        }

        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let mut a = a;
            a.write_all(MESSAGE).unwrap();
        });

        let done = drain(&mut ioc);
        writer.join().unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(&buf[..done[0].result as usize], MESSAGE);
    }

    #[test]
    fn test_accept_returns_descriptor() {
        let Some(mut ioc) = ring(1) else { return };
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        ioc.request_accept(listener.as_raw_fd(), FrameId::new(1)).unwrap();
        let client = std::thread::spawn(move || {
            let mut s = TcpStream::connect(addr).unwrap();
            s.write_all(MESSAGE).unwrap();
        });

        let done = drain(&mut ioc);
        client.join().unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].kind, RequestKind::Accept);
        assert!(done[0].result >= 0);

        let accepted = unsafe { OwnedFd::from_raw_fd(done[0].result) };
        let mut stream = TcpStream::from(accepted);
        let mut buf = vec![0u8; MESSAGE.len()];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, MESSAGE);
    }

    #[test]
    fn test_dispatch_order_matches_harvest_order() {
        let Some(mut ioc) = ring(8) else { return };
        for (i, ms) in [30u64, 10, 20].iter().enumerate() {
            ioc.request_wait(Duration::from_millis(*ms), FrameId::new(i as u32 + 1))
                .unwrap();
        }
        let mut order = Vec::new();
        while order.len() < 3 {
            ioc.process(1, |c| order.push(c.frame)).unwrap();
        }
        assert_eq!(order, vec![FrameId::new(2), FrameId::new(3), FrameId::new(1)]);
    }
}
