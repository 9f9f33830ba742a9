//! Ping-pong Benchmark Server
//!
//! Every connection gets a task that reads fixed-size packets and writes
//! each one straight back. `-t N` starts N threads on the shared listening
//! socket, each pinned to its own core (starting at `-c`) and running its
//! own executor.
//!
//! Usage:
//!     ./target/release/pingpong-server [-a addr] [-p port] [-c first_core] [-t threads]
//!
//! Pair with `pingpong-client`.

use std::net::Ipv4Addr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::process::ExitCode;

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;
use strand::cli::Flags;
use strand::net;
use strand::{kdebug, kerror, kinfo, kwarn, Executor, ExecutorConfig, StrandResult};

const PACKET_SIZE: usize = 1024;
const FRAME_COUNT: usize = 400;
const RING_SIZE: usize = 1000;

fn pin_to_core(core: usize) -> nix::Result<()> {
    let mut set = CpuSet::new();
    set.set(core)?;
    sched_setaffinity(Pid::from_raw(0), &set)
}

fn client_handler(exec: &Executor, fd: RawFd) {
    let conn = unsafe { net::adopt(fd) };
    let mut buf = [0u8; PACKET_SIZE];
    loop {
        let n = match exec.async_read(conn.as_raw_fd(), &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        match exec.async_write(conn.as_raw_fd(), &buf[..n]) {
            Ok(w) if w == n => {}
            _ => break,
        }
    }
    kdebug!("pingpong: fd {} done", fd);
}

fn pingpong_server(exec: &Executor, listener: RawFd) {
    loop {
        match exec.async_accept(listener) {
            Ok(fd) => {
                if let Err(e) = exec.spawn(move |exec| client_handler(exec, fd)) {
                    kwarn!("pingpong: dropping fd {}: {}", fd, e);
                    drop(unsafe { net::adopt(fd) });
                }
            }
            Err(e) => kwarn!("pingpong: accept: {}", e),
        }
    }
}

fn run_thread(core: usize, listener: RawFd) -> StrandResult<()> {
    if let Err(e) = pin_to_core(core) {
        kwarn!("pingpong: cannot pin to core {}: {}", core, e);
    }

    let config = ExecutorConfig::from_env()
        .frame_count(FRAME_COUNT)
        .reactor_capacity(RING_SIZE);
    let exec = Executor::new(config)?;
    exec.spawn(move |exec| pingpong_server(exec, listener))?;
    kinfo!("pingpong: executor on core {}", core);
    exec.run()?;
    exec.teardown()
}

fn main() -> ExitCode {
    let flags = Flags::from_args();
    if flags.wants_help() {
        eprintln!("Usage: pingpong-server [-a addr] [-p port] [-c first_core] [-t threads]");
        return ExitCode::FAILURE;
    }
    let addr: Ipv4Addr = flags.get("a", "PINGPONG_ADDR", Ipv4Addr::LOCALHOST);
    let port: u16 = flags.get("p", "PINGPONG_PORT", 40000);
    let core: usize = flags.get("c", "PINGPONG_CORE", 1);
    let threads = flags.get::<usize>("t", "PINGPONG_THREADS", 1).max(1);

    let listener = match net::listen(addr, port, net::DEFAULT_BACKLOG) {
        Ok(fd) => fd,
        Err(e) => {
            kerror!("pingpong: listen on {}:{}: {}", addr, port, e);
            return ExitCode::FAILURE;
        }
    };
    let lfd = listener.as_raw_fd();
    kinfo!("pingpong: listening on {}:{}", addr, port);

    let ok = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| s.spawn(move || run_thread(core + t, lfd)))
            .collect();
        handles.into_iter().all(|h| match h.join() {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                kerror!("pingpong: executor stopped: {}", e);
                false
            }
            Err(_) => false,
        })
    });

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
