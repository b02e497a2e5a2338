//! Raw ICMPv6 socket carrying Router Solicitations and Advertisements.

use std::io;
use std::mem;
use std::net::Ipv6Addr;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr;
use std::time::Duration;

use libc::{c_int, c_void, in6_addr, in6_pktinfo, sockaddr_in6, socklen_t};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use crate::dispatch::PacketMeta;
use crate::engine::{Transport, ALL_ROUTERS};
use crate::{Error, Result};

const ICMP6_FILTER: c_int = 1;
const ND_ROUTER_SOLICIT: u8 = 133;
const ND_ROUTER_ADVERT: u8 = 134;
/// Offset of the checksum field in an ICMPv6 header.
const CHECKSUM_OFFSET: c_int = 2;

/// `struct icmp6_filter`. A set bit blocks the type.
#[repr(C)]
struct Icmp6Filter {
    data: [u32; 8],
}

impl Icmp6Filter {
    fn block_all() -> Self {
        Self { data: [u32::MAX; 8] }
    }

    fn pass(&mut self, kind: u8) {
        self.data[usize::from(kind >> 5)] &= !(1 << (kind & 31));
    }
}

pub(crate) fn setsockopt<T>(fd: RawFd, level: c_int, name: c_int, value: &T) -> io::Result<()> {
    // SAFETY: value points to a live T of the given size.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            (value as *const T).cast::<c_void>(),
            mem::size_of::<T>() as socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Waits until one of `fds` is readable or `timeout` passes, and returns
/// which ones are. A signal ends the wait early and reads as a timeout.
pub fn wait(fds: &[RawFd], timeout: Option<Duration>) -> Result<Vec<bool>> {
    let timeout_ms = match timeout {
        None => -1,
        // round up so a deadline is never reached a millisecond early
        Some(d) => d.as_nanos().div_ceil(1_000_000).min(c_int::MAX as u128) as c_int,
    };

    let mut pfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    // SAFETY: pfds holds exactly pfds.len() valid pollfd entries.
    let rc = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(vec![false; fds.len()]);
        }
        return Err(err.into());
    }

    Ok(pfds.iter().map(|p| p.revents & libc::POLLIN != 0).collect())
}

/// Aligned scratch space for control messages.
#[repr(C, align(8))]
struct CmsgBuf([u8; 128]);

pub struct Icmpv6Socket {
    sock: Socket,
}

impl Icmpv6Socket {
    pub fn open() -> Result<Self> {
        let sock = Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))?;
        let fd = sock.as_raw_fd();

        setsockopt(fd, libc::IPPROTO_IPV6, libc::IPV6_RECVPKTINFO, &(1 as c_int))?;
        setsockopt(fd, libc::IPPROTO_RAW, libc::IPV6_CHECKSUM, &CHECKSUM_OFFSET)?;
        setsockopt(fd, libc::IPPROTO_IPV6, libc::IPV6_RECVHOPLIMIT, &(1 as c_int))?;

        sock.set_multicast_hops_v6(255)?;
        sock.set_unicast_hops_v6(255)?;
        sock.set_multicast_loop_v6(false)?;
        sock.set_nonblocking(true)?;

        let mut filter = Icmp6Filter::block_all();
        filter.pass(ND_ROUTER_SOLICIT);
        filter.pass(ND_ROUTER_ADVERT);
        setsockopt(fd, libc::IPPROTO_ICMPV6, ICMP6_FILTER, &filter)?;

        Ok(Self { sock })
    }

    /// Reads one datagram with its source, arrival interface and hop limit.
    /// Returns `None` when nothing is queued.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, PacketMeta)>> {
        // SAFETY: all-zero is a valid sockaddr_in6 and msghdr.
        let mut src: sockaddr_in6 = unsafe { mem::zeroed() };
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        let mut control = CmsgBuf([0; 128]);

        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = (&mut src as *mut sockaddr_in6).cast();
        msg.msg_namelen = mem::size_of::<sockaddr_in6>() as socklen_t;
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.0.as_mut_ptr().cast();
        msg.msg_controllen = control.0.len() as _;

        // SAFETY: msg points at buffers that outlive the call.
        let n = unsafe { libc::recvmsg(self.sock.as_raw_fd(), &mut msg, 0) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(err.into());
        }

        let mut ifindex = None;
        let mut hoplimit = None;

        // SAFETY: recvmsg filled in msg_control and msg_controllen, the
        // CMSG_* macros stay within that region.
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg.is_null() {
                let hdr = &*cmsg;
                if hdr.cmsg_level == libc::IPPROTO_IPV6 {
                    let data = libc::CMSG_DATA(cmsg);
                    match hdr.cmsg_type {
                        libc::IPV6_PKTINFO => {
                            let info = ptr::read_unaligned(data.cast::<in6_pktinfo>());
                            ifindex = Some(info.ipi6_ifindex);
                        }
                        libc::IPV6_HOPLIMIT => {
                            let limit = ptr::read_unaligned(data.cast::<c_int>());
                            hoplimit = u8::try_from(limit).ok();
                        }
                        _ => {}
                    }
                }
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }

        let source = Ipv6Addr::from(src.sin6_addr.s6_addr);
        let ifindex = ifindex.ok_or(Error::Malformed("received packet with no pktinfo"))?;
        let hoplimit = hoplimit.ok_or(Error::Malformed("received packet with no hoplimit"))?;

        Ok(Some((
            n as usize,
            PacketMeta {
                source,
                ifindex,
                hoplimit,
            },
        )))
    }
}

impl Transport for Icmpv6Socket {
    fn send(&mut self, ifindex: u32, source: Option<Ipv6Addr>, dest: Ipv6Addr, packet: &[u8]) -> io::Result<()> {
        // SAFETY: all-zero is a valid sockaddr_in6 and msghdr.
        let mut addr: sockaddr_in6 = unsafe { mem::zeroed() };
        addr.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        addr.sin6_addr = in6_addr {
            s6_addr: dest.octets(),
        };
        addr.sin6_scope_id = ifindex;

        let mut iov = libc::iovec {
            iov_base: packet.as_ptr() as *mut c_void,
            iov_len: packet.len(),
        };
        let mut control = CmsgBuf([0; 128]);

        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = (&mut addr as *mut sockaddr_in6).cast();
        msg.msg_namelen = mem::size_of::<sockaddr_in6>() as socklen_t;
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.0.as_mut_ptr().cast();
        // SAFETY: CMSG_SPACE only computes a size.
        msg.msg_controllen = unsafe { libc::CMSG_SPACE(mem::size_of::<in6_pktinfo>() as u32) } as _;

        let info = in6_pktinfo {
            ipi6_addr: in6_addr {
                s6_addr: source.unwrap_or(Ipv6Addr::UNSPECIFIED).octets(),
            },
            ipi6_ifindex: ifindex,
        };

        // SAFETY: the control buffer holds one in6_pktinfo message, and msg
        // points at buffers that outlive the call.
        let n = unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::IPPROTO_IPV6;
            (*cmsg).cmsg_type = libc::IPV6_PKTINFO;
            (*cmsg).cmsg_len = libc::CMSG_LEN(mem::size_of::<in6_pktinfo>() as u32) as _;
            ptr::write_unaligned(libc::CMSG_DATA(cmsg).cast::<in6_pktinfo>(), info);

            libc::sendmsg(self.sock.as_raw_fd(), &msg, 0)
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn join_all_routers(&mut self, ifindex: u32) -> io::Result<()> {
        match self.sock.join_multicast_v6(&ALL_ROUTERS, ifindex) {
            Ok(()) => Ok(()),
            // already joined on an earlier setup of the same device
            Err(e) if e.raw_os_error() == Some(libc::EADDRINUSE) => {
                debug!(ifindex, "already in all-routers group");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl AsRawFd for Icmpv6Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_passes_only_router_discovery() {
        let mut filter = Icmp6Filter::block_all();
        filter.pass(ND_ROUTER_SOLICIT);
        filter.pass(ND_ROUTER_ADVERT);

        let blocked = |kind: u8| filter.data[usize::from(kind >> 5)] & (1 << (kind & 31)) != 0;
        assert!(!blocked(133));
        assert!(!blocked(134));
        assert!(blocked(135));
        assert!(blocked(128));
        assert!(blocked(1));
    }

    #[test]
    fn wait_reports_the_readable_descriptor() {
        let (a, b) = std::os::unix::net::UnixDatagram::pair().unwrap();
        let (c, _d) = std::os::unix::net::UnixDatagram::pair().unwrap();
        b.send(b"x").unwrap();

        let ready = wait(&[c.as_raw_fd(), a.as_raw_fd()], Some(Duration::from_secs(1))).unwrap();
        assert_eq!(ready, [false, true]);

        let mut buf = [0; 4];
        a.recv(&mut buf).unwrap();
        let ready = wait(&[c.as_raw_fd(), a.as_raw_fd()], Some(Duration::ZERO)).unwrap();
        assert_eq!(ready, [false, false]);
    }
}
