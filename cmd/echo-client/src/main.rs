//! Echo Client
//!
//! Starts `-n` client tasks on one executor. Each connects, sends a
//! greeting, sleeps (`-w` ms) without blocking the others, reads the echo
//! back and checks it.
//!
//! Usage:
//!     ./target/release/echo-client [-a addr] [-p port] [-n clients] [-w wait_ms] [message]

use std::cell::Cell;
use std::io;
use std::net::Ipv4Addr;
use std::os::unix::io::AsRawFd;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use strand::cli::Flags;
use strand::net;
use strand::{kerror, kinfo, Executor, ExecutorConfig};

#[derive(Clone)]
struct Client {
    id: usize,
    addr: Ipv4Addr,
    port: u16,
    wait: Duration,
    message: Rc<str>,
}

fn echo_client(exec: &Executor, client: &Client) -> io::Result<()> {
    let stream = net::connect(client.addr, client.port)?;
    let fd = stream.as_raw_fd();

    let greeting = format!("{} from client {}", client.message, client.id);
    let sent = greeting.as_bytes();
    exec.async_write_all(fd, sent)?;

    exec.async_wait(client.wait)?;

    let mut buf = vec![0u8; sent.len()];
    let mut got = 0;
    while got < sent.len() {
        match exec.async_read(fd, &mut buf[got..])? {
            0 => break,
            n => got += n,
        }
    }
    if &buf[..got] != sent {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("echo mismatch: {:?}", String::from_utf8_lossy(&buf[..got])),
        ));
    }

    println!("client {}: {}", client.id, greeting);
    Ok(())
}

fn main() -> ExitCode {
    let flags = Flags::from_args();
    if flags.wants_help() {
        eprintln!("Usage: echo-client [-a addr] [-p port] [-n clients] [-w wait_ms] [message]");
        return ExitCode::FAILURE;
    }
    let clients = flags.get::<usize>("n", "ECHO_CLIENTS", 10).max(1);
    let template = Client {
        id: 0,
        addr: flags.get("a", "ECHO_ADDR", Ipv4Addr::LOCALHOST),
        port: flags.get("p", "ECHO_PORT", 40000),
        wait: Duration::from_millis(flags.get("w", "ECHO_WAIT_MS", 1000)),
        message: Rc::from(flags.positional(0).unwrap_or("Hello")),
    };

    let config = ExecutorConfig::from_env()
        .frame_count(clients)
        .reactor_capacity(clients * 2);
    let exec = match Executor::new(config) {
        Ok(exec) => exec,
        Err(e) => {
            kerror!("echo-client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let failures = Rc::new(Cell::new(0usize));
    for id in 0..clients {
        let client = Client { id, ..template.clone() };
        let failures = failures.clone();
        let spawned = exec.spawn(move |exec| {
            if let Err(e) = echo_client(exec, &client) {
                kerror!("client {}: {}", client.id, e);
                failures.set(failures.get() + 1);
            }
        });
        if let Err(e) = spawned {
            kerror!("echo-client: spawn: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = exec.run() {
        kerror!("echo-client: {}", e);
        return ExitCode::FAILURE;
    }
    let _ = exec.teardown();

    kinfo!("echo-client: {} of {} clients ok", clients - failures.get(), clients);
    if failures.get() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
