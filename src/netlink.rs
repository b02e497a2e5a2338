//! Link-state notifications from rtnetlink.
//!
//! The kernel multicasts an `RTM_NEWLINK` to the `RTMGRP_LINK` group
//! whenever a device changes flags, carrier or name, and `RTM_DELLINK` when
//! it goes away. All fields are in host byte order.

use std::io::{self, Read};
use std::mem;
use std::os::fd::{AsRawFd, RawFd};

use libc::{c_int, sockaddr_nl, socklen_t};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::socket::setsockopt;
use crate::wire::reader::Reader;
use crate::{Error, Result};

/// Large enough for a batch of link messages with all their attributes.
pub const NETLINK_BUF_SIZE: usize = 8192;

const RTMGRP_LINK: u32 = 1;

const NLMSG_HDRLEN: usize = 16;
const RTA_HDRLEN: usize = 4;

const NLMSG_ERROR: u16 = 2;
const NLMSG_DONE: u16 = 3;
const RTM_NEWLINK: u16 = 16;
const RTM_DELLINK: u16 = 17;

const IFLA_IFNAME: u16 = 3;
const IFF_UP: u32 = 0x1;
const IFF_RUNNING: u32 = 0x40;

fn align(len: usize) -> usize {
    (len + 3) & !3
}

fn ne_u16(r: &mut Reader) -> Result<u16> {
    Ok(u16::from_ne_bytes(r.read_array()?))
}

fn ne_u32(r: &mut Reader) -> Result<u32> {
    Ok(u32::from_ne_bytes(r.read_array()?))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub ifindex: u32,
    /// `IFLA_IFNAME`, which the kernel includes in every link message.
    pub name: Option<String>,
    pub up: bool,
    pub running: bool,
    pub removed: bool,
}

/// `struct ifinfomsg` followed by its attributes.
fn parse_ifinfo(body: &[u8], removed: bool) -> Result<LinkEvent> {
    let mut r = Reader::new(body);
    // family, padding and device type
    r.skip(4)?;
    let index = i32::from_ne_bytes(r.read_array()?);
    let flags = ne_u32(&mut r)?;
    // change mask
    r.skip(4)?;

    let mut name = None;
    while r.remaining() >= RTA_HDRLEN {
        let len = usize::from(ne_u16(&mut r)?);
        let kind = ne_u16(&mut r)?;
        if len < RTA_HDRLEN {
            return Err(Error::Malformed("netlink attribute shorter than its header"));
        }
        let data = r.read_bytes(len - RTA_HDRLEN)?;
        if kind == IFLA_IFNAME {
            let raw = data.split(|&b| b == 0).next().unwrap_or(data);
            name = Some(String::from_utf8_lossy(raw).into_owned());
        }
        r.skip((align(len) - len).min(r.remaining()))?;
    }

    Ok(LinkEvent {
        ifindex: u32::try_from(index).map_err(|_| Error::Malformed("negative interface index"))?,
        name,
        up: flags & IFF_UP != 0,
        running: flags & IFF_RUNNING != 0,
        removed,
    })
}

/// Walks one datagram of netlink messages and returns the link events in
/// it. Other message types are skipped; `NLMSG_DONE` ends the walk.
pub fn parse_link_events(buf: &[u8]) -> Result<Vec<LinkEvent>> {
    let mut events = Vec::new();
    let mut rest = buf;

    while rest.len() >= NLMSG_HDRLEN {
        let mut hdr = Reader::new(rest);
        let len = ne_u32(&mut hdr)? as usize;
        let kind = ne_u16(&mut hdr)?;
        if len < NLMSG_HDRLEN || len > rest.len() {
            return Err(Error::Truncated {
                offset: buf.len() - rest.len(),
                wanted: len.max(NLMSG_HDRLEN),
                available: rest.len(),
            });
        }

        let body = &rest[NLMSG_HDRLEN..len];
        match kind {
            NLMSG_DONE => break,
            NLMSG_ERROR => return Err(Error::Malformed("netlink error message")),
            RTM_NEWLINK | RTM_DELLINK => events.push(parse_ifinfo(body, kind == RTM_DELLINK)?),
            _ => {}
        }

        rest = &rest[align(len).min(rest.len())..];
    }

    Ok(events)
}

/// Subscription to link-state changes.
pub struct LinkMonitor {
    sock: Socket,
}

impl LinkMonitor {
    pub fn open() -> Result<Self> {
        let sock = Socket::new(
            Domain::from(libc::AF_NETLINK),
            Type::RAW,
            Some(Protocol::from(libc::NETLINK_ROUTE)),
        )?;
        let fd = sock.as_raw_fd();

        // a burst of changes must not end the subscription
        setsockopt(fd, libc::SOL_NETLINK, libc::NETLINK_NO_ENOBUFS, &(1 as c_int))?;

        // SAFETY: all-zero is a valid sockaddr_nl.
        let mut addr: sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_groups = RTMGRP_LINK;

        // SAFETY: addr is a live sockaddr_nl of the given size.
        let rc = unsafe {
            libc::bind(
                fd,
                (&addr as *const sockaddr_nl).cast(),
                mem::size_of::<sockaddr_nl>() as socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        sock.set_nonblocking(true)?;
        Ok(Self { sock })
    }

    /// Reads every queued notification. A datagram that does not parse is
    /// logged and skipped.
    pub fn recv_events(&self, buf: &mut [u8]) -> Result<Vec<LinkEvent>> {
        let mut events = Vec::new();
        loop {
            let n = match (&self.sock).read(buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            match parse_link_events(&buf[..n]) {
                Ok(mut batch) => events.append(&mut batch),
                Err(e) => warn!("bad netlink message: {}", e),
            }
        }

        debug!(count = events.len(), "link notifications");
        Ok(events)
    }
}

impl AsRawFd for LinkMonitor {
    fn as_raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}
