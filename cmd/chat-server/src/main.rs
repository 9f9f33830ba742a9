//! Chat Server
//!
//! A single chat room. Every session gets two tasks: a reader that
//! broadcasts whatever the client sends to everyone else's outbox, and a
//! writer that drains its own outbox, polling it with `async_wait` when
//! empty. Outboxes are bounded; a slow client loses messages instead of
//! growing memory.
//!
//! Usage:
//!     ./target/release/chat-server [-a addr] [-p port] [-f frames] [-q outbox] [-i poll_ms]
//!
//! Try with two terminals running `nc localhost 40000`.

use std::cell::{Cell, RefCell};
use std::net::Ipv4Addr;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use strand::cli::Flags;
use strand::net;
use strand::{kdebug, kerror, kinfo, kwarn, Executor, ExecutorConfig};

const PACKET_SIZE: usize = 1024;

type Message = Rc<[u8]>;

struct Session {
    id: usize,
    conn: OwnedFd,
    outbox: ArrayQueue<Message>,
    open: Cell<bool>,
    dropped: Cell<u64>,
}

impl Session {
    fn fd(&self) -> RawFd {
        self.conn.as_raw_fd()
    }

    /// Stop both tasks: the writer sees `open == false`, the reader's
    /// pending read returns once the socket is shut down.
    fn stop(&self) {
        if self.open.replace(false) {
            unsafe { libc::shutdown(self.fd(), libc::SHUT_RDWR) };
        }
    }
}

struct Room {
    sessions: RefCell<Vec<Rc<Session>>>,
    outbox_capacity: usize,
}

impl Room {
    fn new(outbox_capacity: usize) -> Self {
        Self {
            sessions: RefCell::new(Vec::new()),
            outbox_capacity,
        }
    }

    fn open_session(&self, id: usize, conn: OwnedFd) -> Rc<Session> {
        Rc::new(Session {
            id,
            conn,
            outbox: ArrayQueue::new(self.outbox_capacity),
            open: Cell::new(true),
            dropped: Cell::new(0),
        })
    }

    /// Queue `msg` for everyone except `from`
    fn broadcast(&self, from: Option<usize>, msg: Message) {
        for session in self.sessions.borrow().iter() {
            if Some(session.id) == from {
                continue;
            }
            if session.outbox.push(msg.clone()).is_err() {
                session.dropped.set(session.dropped.get() + 1);
            }
        }
    }

    fn join(&self, session: Rc<Session>) {
        let id = session.id;
        self.sessions.borrow_mut().push(session);
        self.broadcast(Some(id), notice(format!("* user {} joined\n", id)));
        kinfo!("chat: user {} joined ({} online)", id, self.sessions.borrow().len());
    }

    fn leave(&self, id: usize) {
        let removed = {
            let mut sessions = self.sessions.borrow_mut();
            let before = sessions.len();
            sessions.retain(|s| s.id != id);
            before != sessions.len()
        };
        if removed {
            self.broadcast(None, notice(format!("* user {} left\n", id)));
            kinfo!("chat: user {} left ({} online)", id, self.sessions.borrow().len());
        }
    }
}

fn notice(text: String) -> Message {
    Rc::from(text.into_bytes())
}

fn reader(exec: &Executor, room: &Room, session: &Session) {
    let prefix = format!("[{}] ", session.id);
    let mut buf = [0u8; PACKET_SIZE];
    while session.open.get() {
        match exec.async_read(session.fd(), &mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let mut msg = Vec::with_capacity(prefix.len() + n);
                msg.extend_from_slice(prefix.as_bytes());
                msg.extend_from_slice(&buf[..n]);
                room.broadcast(Some(session.id), Rc::from(msg));
            }
            Err(e) => {
                kdebug!("chat: user {} read: {}", session.id, e);
                break;
            }
        }
    }
    session.stop();
    room.leave(session.id);
}

fn writer(exec: &Executor, session: &Session, poll: Duration) {
    'session: while session.open.get() {
        while let Some(msg) = session.outbox.pop() {
            if let Err(e) = exec.async_write_all(session.fd(), &msg) {
                kdebug!("chat: user {} write: {}", session.id, e);
                break 'session;
            }
        }
        if exec.async_wait(poll).is_err() {
            break;
        }
    }
    session.stop();
    if session.dropped.get() > 0 {
        kwarn!("chat: user {} missed {} messages", session.id, session.dropped.get());
    }
}

fn chat_server(exec: &Executor, listener: RawFd, room: Rc<Room>, poll: Duration) {
    let mut next_id = 0usize;
    loop {
        let fd = match exec.async_accept(listener) {
            Ok(fd) => fd,
            Err(e) => {
                kwarn!("chat: accept: {}", e);
                // A rejected request never yields; the wait lets other tasks
                // release tokens before the next attempt
                if let Err(e) = exec.async_wait(Duration::from_millis(10)) {
                    kerror!("chat: acceptor stopping: {}", e);
                    return;
                }
                continue;
            }
        };
        next_id += 1;
        let session = room.open_session(next_id, unsafe { net::adopt(fd) });
        room.join(session.clone());

        let (r_room, r_session) = (room.clone(), session.clone());
        let w_session = session.clone();
        let started = exec
            .spawn(move |exec| reader(exec, &r_room, &r_session))
            .and_then(|()| exec.spawn(move |exec| writer(exec, &w_session, poll)));
        if let Err(e) = started {
            kwarn!("chat: user {} refused: {}", session.id, e);
            session.stop();
            room.leave(session.id);
        }
    }
}

fn main() -> ExitCode {
    let flags = Flags::from_args();
    if flags.wants_help() {
        eprintln!("Usage: chat-server [-a addr] [-p port] [-f frames] [-q outbox] [-i poll_ms]");
        return ExitCode::FAILURE;
    }
    let addr: Ipv4Addr = flags.get("a", "CHAT_ADDR", Ipv4Addr::LOCALHOST);
    let port: u16 = flags.get("p", "CHAT_PORT", 40000);
    let outbox = flags.get::<usize>("q", "CHAT_OUTBOX", 64).max(1);
    let poll = Duration::from_millis(flags.get("i", "CHAT_POLL_MS", 50));

    let listener = match net::listen(addr, port, net::DEFAULT_BACKLOG) {
        Ok(fd) => fd,
        Err(e) => {
            kerror!("chat: listen on {}:{}: {}", addr, port, e);
            return ExitCode::FAILURE;
        }
    };

    let config = ExecutorConfig::from_env()
        .frame_count(flags.get("f", "CHAT_FRAMES", 40))
        .reactor_capacity(1000);
    let exec = match Executor::new(config) {
        Ok(exec) => exec,
        Err(e) => {
            kerror!("chat: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let lfd = listener.as_raw_fd();
    let room = Rc::new(Room::new(outbox));
    if let Err(e) = exec.spawn(move |exec| chat_server(exec, lfd, room, poll)) {
        kerror!("chat: {}", e);
        return ExitCode::FAILURE;
    }

    kinfo!("chat: listening on {}:{}", addr, port);
    let result = exec.run();
    let _ = exec.teardown();
    drop(listener);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            kerror!("chat: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand::StrandError;

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
        let room = Rc::new(Room::new(4));
        let r = room.clone();
        exec.spawn(move |e| chat_server(e, lfd, r, Duration::from_millis(10)))
            .unwrap();

        exec.run().unwrap();
        assert_eq!(exec.size(), 1);
        assert!(room.sessions.borrow().is_empty());
        assert_eq!(exec.free_tokens(), exec.reactor_capacity());
    }
}
