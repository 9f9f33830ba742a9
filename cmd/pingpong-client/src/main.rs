//! Ping-pong Benchmark Client
//!
//! `-t` threads, each with one executor running `-c` client tasks. Every
//! client connects, then does `-m` write/read round trips of a fixed-size
//! packet. Reports total QPS and the average round trip time.
//!
//! Usage:
//!     ./target/release/pingpong-client [-a addr] [-p port] [-t threads] [-c conns] [-m messages]

use std::cell::Cell;
use std::net::Ipv4Addr;
use std::os::unix::io::AsRawFd;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Instant;

use strand::cli::Flags;
use strand::net;
use strand::{kerror, kinfo, kwarn, Executor, ExecutorConfig, StrandResult};

const PACKET_SIZE: usize = 1024;
const MESSAGES_COUNT: usize = 150;

#[derive(Clone, Copy)]
struct Target {
    addr: Ipv4Addr,
    port: u16,
    messages: usize,
}

/// Round trips completed by one client task
fn pingpong_client(exec: &Executor, target: Target) -> usize {
    let stream = match net::connect(target.addr, target.port) {
        Ok(s) => s,
        Err(e) => {
            kwarn!("pingpong: connect to {}:{}: {}", target.addr, target.port, e);
            return 0;
        }
    };
    let fd = stream.as_raw_fd();
    let mut buf = [0u8; PACKET_SIZE];

    for done in 0..target.messages {
        if let Err(e) = exec.async_write_all(fd, &buf) {
            kwarn!("pingpong: send: {}", e);
            return done;
        }
        let mut got = 0;
        while got < PACKET_SIZE {
            match exec.async_read(fd, &mut buf[got..]) {
                Ok(0) => return done,
                Ok(n) => got += n,
                Err(e) => {
                    kwarn!("pingpong: recv: {}", e);
                    return done;
                }
            }
        }
    }
    target.messages
}

fn run_thread(connections: usize, target: Target) -> StrandResult<usize> {
    let config = ExecutorConfig::from_env()
        .frame_count(connections)
        .reactor_capacity(connections * 2);
    let exec = Executor::new(config)?;
    let total = Rc::new(Cell::new(0usize));

    for _ in 0..connections {
        let total = total.clone();
        exec.spawn(move |exec| {
            let n = pingpong_client(exec, target);
            total.set(total.get() + n);
        })?;
    }

    exec.run()?;
    exec.teardown()?;
    Ok(total.get())
}

fn main() -> ExitCode {
    let flags = Flags::from_args();
    if flags.wants_help() {
        eprintln!("Usage: pingpong-client [-a addr] [-p port] [-t threads] [-c conns per thread] [-m messages]");
        return ExitCode::FAILURE;
    }
    let target = Target {
        addr: flags.get("a", "PINGPONG_ADDR", Ipv4Addr::LOCALHOST),
        port: flags.get("p", "PINGPONG_PORT", 40000),
        messages: flags.get("m", "PINGPONG_MESSAGES", MESSAGES_COUNT),
    };
    let threads = flags.get::<usize>("t", "PINGPONG_THREADS", 1).max(1);
    let connections = flags.get::<usize>("c", "PINGPONG_CONNS", 1).max(1);

    kinfo!(
        "pingpong: {} thread(s) x {} connection(s) x {} messages to {}:{}",
        threads,
        connections,
        target.messages,
        target.addr,
        target.port
    );

    let start = Instant::now();
    let results: Vec<StrandResult<usize>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| s.spawn(move || run_thread(connections, target)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(Ok(0)))
            .collect()
    });
    let elapsed = start.elapsed().as_secs_f64();

    let mut round_trips = 0usize;
    let mut failed = false;
    for r in results {
        match r {
            Ok(n) => round_trips += n,
            Err(e) => {
                kerror!("pingpong: executor failed: {}", e);
                failed = true;
            }
        }
    }

    let expected = threads * connections * target.messages;
    println!("Round trips: {} / {}", round_trips, expected);
    if round_trips > 0 && elapsed > 0.0 {
        println!("Real QPS: {:.4}", round_trips as f64 / elapsed);
        println!("AVG RTT: {:.4} us", elapsed * 1e6 / round_trips as f64);
    }

    if failed || round_trips < expected {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
