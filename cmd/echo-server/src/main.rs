//! Echo Server
//!
//! TCP echo server: one acceptor task, one task per connection, all on a
//! single executor. With `-t N` the same listening socket is shared by N
//! threads, each running its own executor (sharding, no shared state).
//!
//! Usage:
//!     cargo build --release -p echo-server
//!     ./target/release/echo-server [-a addr] [-p port] [-t threads]
//!
//! Test with:
//!     echo "hello" | nc -q1 localhost 40000
//!
//! Environment: `ECHO_ADDR`, `ECHO_PORT`, `ECHO_THREADS`, `ECHO_STATS_SECS`,
//! plus the `STRAND_*` executor and logging variables.

use std::cell::Cell;
use std::net::Ipv4Addr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::{Duration, Instant};

use strand::cli::Flags;
use strand::net;
use strand::{kerror, kinfo, kwarn, Executor, ExecutorConfig, StrandError, StrandResult};

const BUF_SIZE: usize = 4096;

#[derive(Default)]
struct Stats {
    accepts: Cell<u64>,
    closes: Cell<u64>,
    bytes: Cell<u64>,
    rejected: Cell<u64>,
    errors: Cell<u64>,
}

impl Stats {
    fn bump(cell: &Cell<u64>, by: u64) {
        cell.set(cell.get() + by);
    }

    fn print(&self, shard: usize, exec: &Executor, elapsed: Duration) {
        kinfo!(
            "[shard {} {:.1}s] live={} accepts={} closes={} bytes={} rejected={} err={}",
            shard,
            elapsed.as_secs_f64(),
            exec.size() - 1,
            self.accepts.get(),
            self.closes.get(),
            self.bytes.get(),
            self.rejected.get(),
            self.errors.get(),
        );
    }
}

fn echo(exec: &Executor, fd: RawFd, stats: &Stats) {
    // Closes the connection when the task ends
    let conn = unsafe { net::adopt(fd) };
    let mut buf = [0u8; BUF_SIZE];
    loop {
        match exec.async_read(conn.as_raw_fd(), &mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = exec.async_write_all(conn.as_raw_fd(), &buf[..n]) {
                    kwarn!("echo: write on fd {}: {}", fd, e);
                    Stats::bump(&stats.errors, 1);
                    break;
                }
                Stats::bump(&stats.bytes, n as u64);
            }
            Err(e) => {
                kwarn!("echo: read on fd {}: {}", fd, e);
                Stats::bump(&stats.errors, 1);
                break;
            }
        }
    }
    Stats::bump(&stats.closes, 1);
}

fn acceptor(exec: &Executor, listener: RawFd, stats: Rc<Stats>) {
    loop {
        let fd = match exec.async_accept(listener) {
            Ok(fd) => fd,
            Err(e) => {
                kwarn!("echo: accept: {}", e);
                Stats::bump(&stats.errors, 1);
                // Back off instead of spinning on a persistent error
                if let Err(e) = exec.async_wait(Duration::from_millis(10)) {
                    kerror!("echo: acceptor stopping: {}", e);
                    return;
                }
                continue;
            }
        };
        Stats::bump(&stats.accepts, 1);

        let conn_stats = stats.clone();
        match exec.spawn(move |exec| echo(exec, fd, &conn_stats)) {
            Ok(()) => {}
            Err(StrandError::CapacityExceeded) => {
                // Frame table full: refuse the connection
                drop(unsafe { net::adopt(fd) });
                Stats::bump(&stats.rejected, 1);
            }
            Err(e) => {
                kerror!("echo: spawn: {}", e);
                drop(unsafe { net::adopt(fd) });
            }
        }
    }
}

fn serve(shard: usize, listener: RawFd, stats_every: Duration) -> StrandResult<()> {
    let exec = Executor::new(ExecutorConfig::from_env())?;
    let stats = Rc::new(Stats::default());

    let acc_stats = stats.clone();
    exec.spawn(move |exec| acceptor(exec, listener, acc_stats))?;

    if !stats_every.is_zero() {
        let start = Instant::now();
        exec.spawn(move |exec| {
            while exec.async_wait(stats_every).is_ok() {
                stats.print(shard, exec, start.elapsed());
            }
        })?;
    }

    kinfo!("echo: shard {} running ({} frames)", shard, exec.capacity());
    exec.run()?;
    exec.teardown()
}

fn main() -> ExitCode {
    let flags = Flags::from_args();
    if flags.wants_help() {
        eprintln!("Usage: echo-server [-a addr] [-p port] [-t threads] [-s stats_secs]");
        return ExitCode::FAILURE;
    }
    let addr: Ipv4Addr = flags.get("a", "ECHO_ADDR", Ipv4Addr::UNSPECIFIED);
    let port: u16 = flags.get("p", "ECHO_PORT", 40000);
    let threads = flags.get::<usize>("t", "ECHO_THREADS", 1).max(1);
    let stats_every = Duration::from_secs(flags.get("s", "ECHO_STATS_SECS", 5));

    let listener = match net::listen(addr, port, net::DEFAULT_BACKLOG) {
        Ok(fd) => fd,
        Err(e) => {
            kerror!("echo: listen on {}:{}: {}", addr, port, e);
            return ExitCode::FAILURE;
        }
    };
    let lfd = listener.as_raw_fd();
    kinfo!("echo: listening on {}:{} with {} shard(s)", addr, port, threads);

    let failed = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|shard| s.spawn(move || serve(shard, lfd, stats_every)))
            .collect();
        let mut failed = false;
        for (shard, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    kerror!("echo: shard {} stopped: {}", shard, e);
                    failed = true;
                }
                Err(_) => {
                    kerror!("echo: shard {} panicked", shard);
                    failed = true;
                }
            }
        }
        failed
    });

    drop(listener);
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptor_gives_up_when_tokens_run_out() {
        // 1 requested token rounds up to 2; both go to the waiters below
        let config = ExecutorConfig::new().frame_count(4).reactor_capacity(1);
        let exec = match Executor::new(config) {
            Ok(exec) => exec,
            Err(StrandError::PrimitiveFailure(code)) => {
                eprintln!("skipping: io_uring unavailable (errno {})", code);
                return;
            }
            Err(e) => panic!("unexpected executor error: {}", e),
        };
        let listener = net::listen(Ipv4Addr::LOCALHOST, 0, 16).unwrap();
        let lfd = listener.as_raw_fd();

        for _ in 0..2 {
            exec.spawn(|e| e.async_wait(Duration::from_millis(30)).unwrap())
                .unwrap();
        }
        let stats = Rc::new(Stats::default());
        let acc_stats = stats.clone();
        exec.spawn(move |e| acceptor(e, lfd, acc_stats)).unwrap();

        exec.run().unwrap();
        assert_eq!(exec.size(), 1);
        assert_eq!(stats.errors.get(), 1);
        assert_eq!(stats.accepts.get(), 0);
    }
}
