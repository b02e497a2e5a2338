//! Router Advertisement wire format.
//!
//! The fixed ICMPv6 header goes through `pnet_packet`'s NDP packet views, the
//! option chain is encoded by hand in [`options`] and walked with the
//! bounds-checked [`reader::Reader`].

pub mod options;
pub mod reader;

use pnet_packet::icmpv6::ndp::{MutableRouterAdvertPacket, RouterAdvertFlags, RouterAdvertPacket};
use pnet_packet::icmpv6::{Icmpv6Code, Icmpv6Type, Icmpv6Types};
use serde::Deserialize;

use crate::{Error, Result};

pub use options::NdOption;

pub const RA_HEADER_LEN: usize = 16;
pub const RS_HEADER_LEN: usize = 8;
/// Type, code and checksum. Anything shorter is not ICMPv6 at all.
pub const ICMPV6_HEADER_LEN: usize = 4;

const FLAG_HOME_AGENT: u8 = 0x20;
const PRF_SHIFT: u8 = 3;
const PRF_MASK: u8 = 0b11;

pub fn is_router_solicit(kind: u8) -> bool {
    Icmpv6Type::new(kind) == Icmpv6Types::RouterSolicit
}

pub fn is_router_advert(kind: u8) -> bool {
    Icmpv6Type::new(kind) == Icmpv6Types::RouterAdvert
}

/// Router and route preference (RFC 4191 §2.1).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Low,
    #[default]
    Medium,
    High,
}

impl Preference {
    pub fn bits(self) -> u8 {
        match self {
            Preference::High => 0b01,
            Preference::Medium => 0b00,
            Preference::Low => 0b11,
        }
    }

    /// The reserved value `10` is treated as medium, as receivers must.
    pub fn from_bits(bits: u8) -> Self {
        match bits & PRF_MASK {
            0b01 => Preference::High,
            0b11 => Preference::Low,
            _ => Preference::Medium,
        }
    }
}

/// Fixed part of a Router Advertisement after type, code and checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaHeader {
    pub cur_hop_limit: u8,
    pub managed: bool,
    pub other_config: bool,
    pub home_agent: bool,
    pub preference: Preference,
    /// Seconds. Zero means "not a default router".
    pub router_lifetime: u16,
    /// Milliseconds.
    pub reachable_time: u32,
    /// Milliseconds.
    pub retrans_timer: u32,
}

impl RaHeader {
    fn flags(&self) -> u8 {
        let mut flags = self.preference.bits() << PRF_SHIFT;
        if self.managed {
            flags |= RouterAdvertFlags::ManagedAddressConf;
        }
        if self.other_config {
            flags |= RouterAdvertFlags::OtherConf;
        }
        if self.home_agent {
            flags |= FLAG_HOME_AGENT;
        }
        flags
    }

    /// Serializes the 16-byte header. The checksum is left at zero for the
    /// kernel to fill in; `cease` forces the router lifetime to zero.
    pub fn encode(&self, cease: bool) -> Result<Vec<u8>> {
        let mut buf = vec![0; RA_HEADER_LEN];

        let mut pkt = MutableRouterAdvertPacket::new(&mut buf)
            .ok_or(Error::Malformed("ra header buffer too small"))?;
        pkt.set_icmpv6_type(Icmpv6Types::RouterAdvert);
        pkt.set_icmpv6_code(Icmpv6Code::new(0));
        pkt.set_checksum(0);
        pkt.set_hop_limit(self.cur_hop_limit);
        pkt.set_flags(self.flags());
        pkt.set_lifetime(if cease { 0 } else { self.router_lifetime });
        pkt.set_reachable_time(self.reachable_time);
        pkt.set_retrans_time(self.retrans_timer);

        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < RA_HEADER_LEN {
            return Err(Error::Truncated {
                offset: 0,
                wanted: RA_HEADER_LEN,
                available: buf.len(),
            });
        }

        let pkt = RouterAdvertPacket::new(&buf[..RA_HEADER_LEN])
            .ok_or(Error::Malformed("ra header"))?;
        if pkt.get_icmpv6_type() != Icmpv6Types::RouterAdvert {
            return Err(Error::Malformed("not a router advertisement"));
        }

        let flags = pkt.get_flags();
        Ok(Self {
            cur_hop_limit: pkt.get_hop_limit(),
            managed: flags & RouterAdvertFlags::ManagedAddressConf != 0,
            other_config: flags & RouterAdvertFlags::OtherConf != 0,
            home_agent: flags & FLAG_HOME_AGENT != 0,
            preference: Preference::from_bits(flags >> PRF_SHIFT),
            router_lifetime: pkt.get_lifetime(),
            reachable_time: pkt.get_reachable_time(),
            retrans_timer: pkt.get_retrans_time(),
        })
    }
}

/// One framed option, body excluding the type and length bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawOption<'a> {
    pub kind: u8,
    pub body: &'a [u8],
}

impl<'a> RawOption<'a> {
    pub fn decode(&self) -> Result<NdOption> {
        NdOption::decode(self.kind, self.body)
    }
}

/// Walks a TLV option chain.
///
/// Yields framed options until the buffer is exhausted or the framing
/// breaks: a zero length, a length running past the buffer, or a single
/// stray byte. The framing error is yielded once and iteration ends.
#[derive(Debug, Clone)]
pub struct OptionIter<'a> {
    buf: &'a [u8],
    pos: usize,
    /// Added to reported offsets so they refer to the whole packet.
    base: usize,
    done: bool,
}

impl<'a> OptionIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    pub fn with_base(buf: &'a [u8], base: usize) -> Self {
        Self {
            buf,
            pos: 0,
            base,
            done: false,
        }
    }

    fn fail(&mut self, err: Error) -> Option<Result<RawOption<'a>>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a> Iterator for OptionIter<'a> {
    type Item = Result<RawOption<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let remaining = self.buf.len() - self.pos;
        if remaining == 0 {
            self.done = true;
            return None;
        }
        if remaining < 2 {
            return self.fail(Error::Malformed("trailing garbage after options"));
        }

        let kind = self.buf[self.pos];
        let len = usize::from(self.buf[self.pos + 1]) * options::UNIT;
        if len == 0 {
            return self.fail(Error::Malformed("option with zero length"));
        }
        if len > remaining {
            return self.fail(Error::Truncated {
                offset: self.base + self.pos,
                wanted: len,
                available: remaining,
            });
        }

        let opt = RawOption {
            kind,
            body: &self.buf[self.pos + 2..self.pos + len],
        };
        self.pos += len;
        Some(Ok(opt))
    }
}

/// A decoded Router Advertisement.
///
/// `options` holds everything that decoded cleanly, in packet order.
/// `errors` collects per-option failures and at most one trailing framing
/// failure, after which nothing more was read.
#[derive(Debug)]
pub struct ParsedRa {
    pub header: RaHeader,
    pub options: Vec<NdOption>,
    pub errors: Vec<Error>,
}

pub fn decode_ra(buf: &[u8]) -> Result<ParsedRa> {
    let header = RaHeader::decode(buf)?;

    let mut options = Vec::new();
    let mut errors = Vec::new();
    for raw in OptionIter::with_base(&buf[RA_HEADER_LEN..], RA_HEADER_LEN) {
        match raw.and_then(|raw| raw.decode()) {
            Ok(opt) => options.push(opt),
            Err(e) => errors.push(e),
        }
    }

    Ok(ParsedRa {
        header,
        options,
        errors,
    })
}

/// Option chain of a Router Solicitation.
pub fn rs_options(buf: &[u8]) -> OptionIter<'_> {
    let start = buf.len().min(RS_HEADER_LEN);
    OptionIter::with_base(&buf[start..], start)
}
