//! Socket setup for strand applications
//!
//! The executor never opens descriptors itself; these helpers do the
//! blocking setup (socket, bind, listen, connect) before or between tasks.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4, TcpStream};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Listen backlog used by the applications
pub const DEFAULT_BACKLOG: i32 = 4096;

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn set_flag(fd: RawFd, opt: libc::c_int) -> io::Result<()> {
    let on: libc::c_int = 1;
    cvt(unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            opt,
            &on as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

/// Bound, listening IPv4 TCP socket with `SO_REUSEADDR` and `SO_REUSEPORT`
pub fn listen(addr: Ipv4Addr, port: u16, backlog: i32) -> io::Result<OwnedFd> {
    let fd = cvt(unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) })?;
    // Owned from here on: every early return closes it
    let sock = unsafe { OwnedFd::from_raw_fd(fd) };

    set_flag(fd, libc::SO_REUSEADDR)?;
    set_flag(fd, libc::SO_REUSEPORT)?;

    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    sa.sin_family = libc::AF_INET as libc::sa_family_t;
    sa.sin_port = port.to_be();
    sa.sin_addr.s_addr = u32::from(addr).to_be();

    cvt(unsafe {
        libc::bind(
            fd,
            &sa as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    })?;
    cvt(unsafe { libc::listen(fd, backlog) })?;
    Ok(sock)
}

/// Blocking connect; the stream owns (and closes) the descriptor
pub fn connect(addr: Ipv4Addr, port: u16) -> io::Result<TcpStream> {
    let stream = TcpStream::connect(SocketAddrV4::new(addr, port))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Take ownership of a descriptor returned by `async_accept`
///
/// # Safety
///
/// `fd` must be open and not owned by anything else.
pub unsafe fn adopt(fd: RawFd) -> OwnedFd {
    OwnedFd::from_raw_fd(fd)
}

/// Local port of a bound socket
pub fn local_port(fd: &impl AsRawFd) -> io::Result<u16> {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    cvt(unsafe {
        libc::getsockname(
            fd.as_raw_fd(),
            &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr,
            &mut len,
        )
    })?;
    Ok(u16::from_be(sa.sin_port))
}
