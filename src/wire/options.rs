//! Neighbor Discovery options carried in Router Advertisements.
//!
//! Each option is a TLV: one type byte, one length byte counting 8-octet
//! units (type and length included), then the payload zero-padded to the
//! unit boundary. Encoders append to a caller-owned buffer and need nothing
//! but the option's own fields.

use std::net::Ipv6Addr;

use super::reader::Reader;
use super::Preference;
use crate::{Error, Result};

pub const SOURCE_LL_ADDR: u8 = 1;
pub const TARGET_LL_ADDR: u8 = 2;
pub const PREFIX_INFORMATION: u8 = 3;
pub const REDIRECTED_HEADER: u8 = 4;
pub const MTU: u8 = 5;
pub const ADV_INTERVAL: u8 = 7;
pub const HOME_AGENT_INFO: u8 = 8;
pub const ROUTE_INFORMATION: u8 = 24;
pub const RDNSS: u8 = 25;
pub const DNSSL: u8 = 31;
pub const SIXLOWPAN_CONTEXT: u8 = 34;
pub const ABRO: u8 = 35;

pub const UNIT: usize = 8;

const PI_FLAG_ON_LINK: u8 = 0x80;
const PI_FLAG_AUTONOMOUS: u8 = 0x40;
const PI_FLAG_ROUTER_ADDR: u8 = 0x20;
const RI_PRF_SHIFT: u8 = 3;
const HAI_FLAG_MOBILE_ROUTER: u16 = 0x8000;
const LOWPAN_FLAG_COMPRESSION: u8 = 0x10;
const LOWPAN_CID_MASK: u8 = 0x0f;

/// Clears every bit past `len`.
pub fn mask_prefix(addr: Ipv6Addr, len: u8) -> Ipv6Addr {
    let bits = u128::from(addr);
    let mask = match len {
        0 => 0,
        n if n >= 128 => u128::MAX,
        n => u128::MAX << (128 - u32::from(n)),
    };

    Ipv6Addr::from(bits & mask)
}

/// Writes the type byte and a placeholder length, returning the option start.
fn begin(out: &mut Vec<u8>, kind: u8) -> usize {
    let start = out.len();
    out.push(kind);
    out.push(0);
    start
}

/// Zero-pads the option started at `start` to the unit boundary and fills in
/// its length byte.
fn finish(out: &mut Vec<u8>, start: usize) -> Result<()> {
    let len = out.len() - start;
    let padded = len.div_ceil(UNIT) * UNIT;
    out.resize(start + padded, 0);

    out[start + 1] = u8::try_from(padded / UNIT)
        .map_err(|_| Error::Malformed("option longer than 255 units"))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixInfo {
    pub prefix: Ipv6Addr,
    pub prefix_len: u8,
    pub on_link: bool,
    pub autonomous: bool,
    pub router_addr: bool,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
}

impl PrefixInfo {
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut flags = 0;
        if self.on_link {
            flags |= PI_FLAG_ON_LINK;
        }
        if self.autonomous {
            flags |= PI_FLAG_AUTONOMOUS;
        }
        if self.router_addr {
            flags |= PI_FLAG_ROUTER_ADDR;
        }

        out.extend_from_slice(&[PREFIX_INFORMATION, 4, self.prefix_len, flags]);
        out.extend_from_slice(&self.valid_lifetime.to_be_bytes());
        out.extend_from_slice(&self.preferred_lifetime.to_be_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&mask_prefix(self.prefix, self.prefix_len).octets());
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        let prefix_len = r.read_u8()?;
        let flags = r.read_u8()?;
        let valid_lifetime = r.read_u32()?;
        let preferred_lifetime = r.read_u32()?;
        r.skip(4)?;
        let prefix = r.read_ipv6()?;

        Ok(Self {
            prefix,
            prefix_len,
            on_link: flags & PI_FLAG_ON_LINK != 0,
            autonomous: flags & PI_FLAG_AUTONOMOUS != 0,
            router_addr: flags & PI_FLAG_ROUTER_ADDR != 0,
            valid_lifetime,
            preferred_lifetime,
        })
    }
}

/// Route Information (RFC 4191 §2.3).
///
/// Only as many prefix octets as the prefix length needs are sent: none for
/// ::/0, eight up to /64, all sixteen beyond.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub prefix: Ipv6Addr,
    pub prefix_len: u8,
    pub preference: Preference,
    pub lifetime: u32,
}

impl RouteInfo {
    pub fn units(prefix_len: u8) -> u8 {
        match prefix_len {
            0 => 1,
            1..=64 => 2,
            _ => 3,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let units = Self::units(self.prefix_len);
        let prefix_bytes = (usize::from(units) - 1) * UNIT;
        let prefix = mask_prefix(self.prefix, self.prefix_len).octets();

        out.extend_from_slice(&[
            ROUTE_INFORMATION,
            units,
            self.prefix_len,
            self.preference.bits() << RI_PRF_SHIFT,
        ]);
        out.extend_from_slice(&self.lifetime.to_be_bytes());
        out.extend_from_slice(&prefix[..prefix_bytes]);
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        let prefix_len = r.read_u8()?;
        if prefix_len > 128 {
            return Err(Error::Malformed("route prefix length above 128"));
        }
        let flags = r.read_u8()?;
        let lifetime = r.read_u32()?;

        let carried = r.rest();
        let needed = (usize::from(Self::units(prefix_len)) - 1) * UNIT;
        if carried.len() < needed {
            return Err(Error::Malformed("route information too short for its prefix"));
        }

        let mut octets = [0u8; 16];
        let n = carried.len().min(16);
        octets[..n].copy_from_slice(&carried[..n]);

        Ok(Self {
            prefix: mask_prefix(Ipv6Addr::from(octets), prefix_len),
            prefix_len,
            preference: Preference::from_bits(flags >> RI_PRF_SHIFT),
            lifetime,
        })
    }
}

/// Recursive DNS Server option (RFC 8106 §5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdnss {
    pub lifetime: u32,
    pub servers: Vec<Ipv6Addr>,
}

impl Rdnss {
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = begin(out, RDNSS);
        out.extend_from_slice(&[0; 2]);
        out.extend_from_slice(&self.lifetime.to_be_bytes());
        for server in &self.servers {
            out.extend_from_slice(&server.octets());
        }
        finish(out, start)
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        r.skip(2)?;
        let lifetime = r.read_u32()?;

        let mut servers = Vec::new();
        while r.remaining() >= 16 {
            servers.push(r.read_ipv6()?);
        }
        if servers.is_empty() {
            return Err(Error::Malformed("rdnss without addresses"));
        }

        Ok(Self { lifetime, servers })
    }
}

/// DNS Search List option (RFC 8106 §5.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dnssl {
    pub lifetime: u32,
    pub suffixes: Vec<String>,
}

impl Dnssl {
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = begin(out, DNSSL);
        out.extend_from_slice(&[0; 2]);
        out.extend_from_slice(&self.lifetime.to_be_bytes());
        for suffix in &self.suffixes {
            encode_domain(out, suffix)?;
        }
        finish(out, start)
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        r.skip(2)?;
        let lifetime = r.read_u32()?;

        let mut suffixes = Vec::new();
        let mut labels: Vec<String> = Vec::new();
        while !r.is_empty() {
            let len = usize::from(r.read_u8()?);
            if len == 0 {
                // a zero byte with no pending labels is trailing padding
                if !labels.is_empty() {
                    suffixes.push(labels.join("."));
                    labels.clear();
                }
                continue;
            }
            if len > 63 {
                return Err(Error::Malformed("dnssl label longer than 63 bytes"));
            }
            let label = r.read_bytes(len)?;
            labels.push(String::from_utf8_lossy(label).into_owned());
        }
        if !labels.is_empty() {
            return Err(Error::Malformed("dnssl domain without terminator"));
        }

        Ok(Self { lifetime, suffixes })
    }
}

/// Appends `domain` as a sequence of length-prefixed labels plus the root label.
pub fn encode_domain(out: &mut Vec<u8>, domain: &str) -> Result<()> {
    for label in domain.split('.').filter(|l| !l.is_empty()) {
        let len = u8::try_from(label.len())
            .ok()
            .filter(|len| *len <= 63)
            .ok_or(Error::Malformed("dns label longer than 63 bytes"))?;
        out.push(len);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    Ok(())
}

/// Home Agent Information option (RFC 6275 §7.4, R flag from RFC 3963).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomeAgentInfo {
    pub mobile_router_support: bool,
    pub preference: u16,
    pub lifetime: u16,
}

impl HomeAgentInfo {
    pub fn encode(&self, out: &mut Vec<u8>) {
        let flags = if self.mobile_router_support {
            HAI_FLAG_MOBILE_ROUTER
        } else {
            0
        };

        out.extend_from_slice(&[HOME_AGENT_INFO, 1]);
        out.extend_from_slice(&flags.to_be_bytes());
        out.extend_from_slice(&self.preference.to_be_bytes());
        out.extend_from_slice(&self.lifetime.to_be_bytes());
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        let flags = r.read_u16()?;
        Ok(Self {
            mobile_router_support: flags & HAI_FLAG_MOBILE_ROUTER != 0,
            preference: r.read_u16()?,
            lifetime: r.read_u16()?,
        })
    }
}

/// 6LoWPAN Context option (RFC 6775 §4.2). Always sent with the full
/// sixteen-octet prefix field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SixLowpanContext {
    pub context_len: u8,
    pub compression: bool,
    pub context_id: u8,
    /// In units of 60 seconds.
    pub valid_lifetime: u16,
    pub prefix: Ipv6Addr,
}

impl SixLowpanContext {
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut flags = self.context_id & LOWPAN_CID_MASK;
        if self.compression {
            flags |= LOWPAN_FLAG_COMPRESSION;
        }

        out.extend_from_slice(&[SIXLOWPAN_CONTEXT, 3, self.context_len, flags, 0, 0]);
        out.extend_from_slice(&self.valid_lifetime.to_be_bytes());
        out.extend_from_slice(&self.prefix.octets());
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        let context_len = r.read_u8()?;
        let flags = r.read_u8()?;
        r.skip(2)?;
        let valid_lifetime = r.read_u16()?;

        // the two-unit form carries only the first eight prefix octets
        let mut octets = [0u8; 16];
        let n = r.remaining().min(16);
        let carried = r.read_bytes(n)?;
        if carried.len() < 8 {
            return Err(Error::Malformed("6lowpan context too short"));
        }
        octets[..carried.len()].copy_from_slice(carried);

        Ok(Self {
            context_len,
            compression: flags & LOWPAN_FLAG_COMPRESSION != 0,
            context_id: flags & LOWPAN_CID_MASK,
            valid_lifetime,
            prefix: Ipv6Addr::from(octets),
        })
    }
}

/// Authoritative Border Router option (RFC 6775 §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abro {
    pub version_low: u16,
    pub version_high: u16,
    /// In units of 60 seconds.
    pub valid_lifetime: u16,
    pub address: Ipv6Addr,
}

impl Abro {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[ABRO, 3]);
        out.extend_from_slice(&self.version_low.to_be_bytes());
        out.extend_from_slice(&self.version_high.to_be_bytes());
        out.extend_from_slice(&self.valid_lifetime.to_be_bytes());
        out.extend_from_slice(&self.address.octets());
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        Ok(Self {
            version_low: r.read_u16()?,
            version_high: r.read_u16()?,
            valid_lifetime: r.read_u16()?,
            address: r.read_ipv6()?,
        })
    }
}

pub fn encode_mtu(out: &mut Vec<u8>, mtu: u32) {
    out.extend_from_slice(&[MTU, 1, 0, 0]);
    out.extend_from_slice(&mtu.to_be_bytes());
}

/// Advertisement Interval option (RFC 6275 §7.3), interval in milliseconds.
pub fn encode_adv_interval(out: &mut Vec<u8>, interval_ms: u32) {
    out.extend_from_slice(&[ADV_INTERVAL, 1, 0, 0]);
    out.extend_from_slice(&interval_ms.to_be_bytes());
}

/// Source Link-Layer Address option. Length is `ceil((2 + addr) / 8)` units.
pub fn encode_source_ll_addr(out: &mut Vec<u8>, hwaddr: &[u8]) -> Result<()> {
    let start = begin(out, SOURCE_LL_ADDR);
    out.extend_from_slice(hwaddr);
    finish(out, start)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdOption {
    /// Link-layer address including any trailing padding.
    SourceLlAddr(Vec<u8>),
    TargetLlAddr(Vec<u8>),
    PrefixInfo(PrefixInfo),
    RedirectedHeader,
    Mtu(u32),
    AdvInterval(u32),
    HomeAgentInfo(HomeAgentInfo),
    RouteInfo(RouteInfo),
    Rdnss(Rdnss),
    Dnssl(Dnssl),
    SixLowpanContext(SixLowpanContext),
    Abro(Abro),
    Unknown { kind: u8, data: Vec<u8> },
}

impl NdOption {
    pub fn kind(&self) -> u8 {
        match self {
            NdOption::SourceLlAddr(_) => SOURCE_LL_ADDR,
            NdOption::TargetLlAddr(_) => TARGET_LL_ADDR,
            NdOption::PrefixInfo(_) => PREFIX_INFORMATION,
            NdOption::RedirectedHeader => REDIRECTED_HEADER,
            NdOption::Mtu(_) => MTU,
            NdOption::AdvInterval(_) => ADV_INTERVAL,
            NdOption::HomeAgentInfo(_) => HOME_AGENT_INFO,
            NdOption::RouteInfo(_) => ROUTE_INFORMATION,
            NdOption::Rdnss(_) => RDNSS,
            NdOption::Dnssl(_) => DNSSL,
            NdOption::SixLowpanContext(_) => SIXLOWPAN_CONTEXT,
            NdOption::Abro(_) => ABRO,
            NdOption::Unknown { kind, .. } => *kind,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            NdOption::SourceLlAddr(addr) => encode_source_ll_addr(out, addr)?,
            NdOption::TargetLlAddr(addr) => {
                let start = begin(out, TARGET_LL_ADDR);
                out.extend_from_slice(addr);
                finish(out, start)?;
            }
            NdOption::PrefixInfo(pi) => pi.encode(out),
            NdOption::RedirectedHeader => {
                out.extend_from_slice(&[REDIRECTED_HEADER, 1, 0, 0, 0, 0, 0, 0]);
            }
            NdOption::Mtu(mtu) => encode_mtu(out, *mtu),
            NdOption::AdvInterval(ms) => encode_adv_interval(out, *ms),
            NdOption::HomeAgentInfo(hai) => hai.encode(out),
            NdOption::RouteInfo(ri) => ri.encode(out),
            NdOption::Rdnss(rdnss) => rdnss.encode(out)?,
            NdOption::Dnssl(dnssl) => dnssl.encode(out)?,
            NdOption::SixLowpanContext(ctx) => ctx.encode(out),
            NdOption::Abro(abro) => abro.encode(out),
            NdOption::Unknown { kind, data } => {
                let start = begin(out, *kind);
                out.extend_from_slice(data);
                finish(out, start)?;
            }
        }
        Ok(())
    }

    /// Decodes the payload of an option whose framing has already been
    /// validated. `body` excludes the type and length bytes.
    pub fn decode(kind: u8, body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);

        let opt = match kind {
            SOURCE_LL_ADDR => NdOption::SourceLlAddr(r.rest().to_vec()),
            TARGET_LL_ADDR => NdOption::TargetLlAddr(r.rest().to_vec()),
            PREFIX_INFORMATION => NdOption::PrefixInfo(PrefixInfo::decode(&mut r)?),
            REDIRECTED_HEADER => NdOption::RedirectedHeader,
            MTU => {
                r.skip(2)?;
                NdOption::Mtu(r.read_u32()?)
            }
            ADV_INTERVAL => {
                r.skip(2)?;
                NdOption::AdvInterval(r.read_u32()?)
            }
            HOME_AGENT_INFO => NdOption::HomeAgentInfo(HomeAgentInfo::decode(&mut r)?),
            ROUTE_INFORMATION => NdOption::RouteInfo(RouteInfo::decode(&mut r)?),
            RDNSS => NdOption::Rdnss(Rdnss::decode(&mut r)?),
            DNSSL => NdOption::Dnssl(Dnssl::decode(&mut r)?),
            SIXLOWPAN_CONTEXT => NdOption::SixLowpanContext(SixLowpanContext::decode(&mut r)?),
            ABRO => NdOption::Abro(Abro::decode(&mut r)?),
            kind => NdOption::Unknown {
                kind,
                data: r.rest().to_vec(),
            },
        };

        Ok(opt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::OptionIter;

    fn encoded(opt: &NdOption) -> Vec<u8> {
        let mut out = Vec::new();
        opt.encode(&mut out).unwrap();
        out
    }

    fn round_trip(opt: NdOption) {
        let bytes = encoded(&opt);
        assert_eq!(bytes.len() % UNIT, 0, "{:?} not padded", opt);
        assert_eq!(usize::from(bytes[1]) * UNIT, bytes.len());

        let mut iter = OptionIter::new(&bytes);
        let raw = iter.next().unwrap().unwrap();
        assert!(iter.next().is_none());
        assert_eq!(NdOption::decode(raw.kind, raw.body).unwrap(), opt);
    }

    #[test]
    fn prefix_information_matches_reference_bytes() {
        let mut out = Vec::new();
        PrefixInfo {
            prefix: "fe80:1::".parse().unwrap(),
            prefix_len: 64,
            on_link: true,
            autonomous: true,
            router_addr: true,
            valid_lifetime: u32::MAX,
            preferred_lifetime: u32::MAX,
        }
        .encode(&mut out);
        PrefixInfo {
            prefix: "fe80:2::".parse().unwrap(),
            prefix_len: 64,
            on_link: true,
            autonomous: true,
            router_addr: false,
            valid_lifetime: 86400,
            preferred_lifetime: 14400,
        }
        .encode(&mut out);

        let expected = [
            0x03, 0x04, 0x40, 0xe0, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00,
            0x00, 0x00, 0xfe, 0x80, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x03, 0x04, 0x40, 0xc0, 0x00, 0x01, 0x51, 0x80, 0x00, 0x00,
            0x38, 0x40, 0x00, 0x00, 0x00, 0x00, 0xfe, 0x80, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn prefix_trailing_bits_are_cleared() {
        let mut out = Vec::new();
        PrefixInfo {
            prefix: "2001:db8:1:2:ffff::1".parse().unwrap(),
            prefix_len: 48,
            on_link: true,
            autonomous: false,
            router_addr: false,
            valid_lifetime: 0,
            preferred_lifetime: 0,
        }
        .encode(&mut out);

        let expected: Ipv6Addr = "2001:db8:1::".parse().unwrap();
        assert_eq!(&out[16..32], &expected.octets());
    }

    #[test]
    fn route_information_length_follows_prefix_length() {
        let route = |prefix: &str, prefix_len| RouteInfo {
            prefix: prefix.parse().unwrap(),
            prefix_len,
            preference: Preference::High,
            lifetime: 3000,
        };

        let mut out = Vec::new();
        route("::", 0).encode(&mut out);
        assert_eq!(out, [0x18, 0x01, 0x00, 0x08, 0x00, 0x00, 0x0b, 0xb8]);

        let mut out = Vec::new();
        route("fe80:f:1::", 48).encode(&mut out);
        assert_eq!(
            out,
            [
                0x18, 0x02, 0x30, 0x08, 0x00, 0x00, 0x0b, 0xb8, 0xfe, 0x80, 0x00, 0x0f, 0x00,
                0x01, 0x00, 0x00
            ]
        );

        let mut out = Vec::new();
        route("2001:db8::1:0:0:0", 80).encode(&mut out);
        assert_eq!(out.len(), 24);
        assert_eq!(out[1], 3);
    }

    #[test]
    fn route_preference_bits() {
        let mut out = Vec::new();
        RouteInfo {
            prefix: "fe80:f:1::".parse().unwrap(),
            prefix_len: 48,
            preference: Preference::Low,
            lifetime: 10000,
        }
        .encode(&mut out);
        assert_eq!(out[3], 0x18);
    }

    #[test]
    fn rdnss_matches_reference_bytes() {
        let mut out = Vec::new();
        Rdnss {
            lifetime: 1234,
            servers: vec![
                "ff02::1".parse().unwrap(),
                "ff02::2".parse().unwrap(),
                "ff02::3".parse().unwrap(),
            ],
        }
        .encode(&mut out)
        .unwrap();

        assert_eq!(out.len(), 56);
        assert_eq!(&out[..8], &[0x19, 0x07, 0x00, 0x00, 0x00, 0x00, 0x04, 0xd2]);
        assert_eq!(&out[40..], &"ff02::3".parse::<Ipv6Addr>().unwrap().octets());
    }

    #[test]
    fn dnssl_matches_reference_bytes() {
        let mut out = Vec::new();
        Dnssl {
            lifetime: 1100,
            suffixes: vec![
                "office.branch.example".into(),
                "branch.example".into(),
                "example".into(),
            ],
        }
        .encode(&mut out)
        .unwrap();

        let expected = [
            0x1f, 0x07, 0x00, 0x00, 0x00, 0x00, 0x04, 0x4c, 0x06, 0x6f, 0x66, 0x66, 0x69, 0x63,
            0x65, 0x06, 0x62, 0x72, 0x61, 0x6e, 0x63, 0x68, 0x07, 0x65, 0x78, 0x61, 0x6d, 0x70,
            0x6c, 0x65, 0x00, 0x06, 0x62, 0x72, 0x61, 0x6e, 0x63, 0x68, 0x07, 0x65, 0x78, 0x61,
            0x6d, 0x70, 0x6c, 0x65, 0x00, 0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x00,
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn dnssl_pads_to_unit_boundary() {
        let mut out = Vec::new();
        Dnssl {
            lifetime: 1000,
            suffixes: vec!["example.com".into()],
        }
        .encode(&mut out)
        .unwrap();

        // 8 header + 13 name bytes, padded to 24
        assert_eq!(out.len(), 24);
        assert_eq!(out[1], 3);
        assert_eq!(&out[21..], &[0, 0, 0]);
    }

    #[test]
    fn overlong_label_is_rejected() {
        let mut out = Vec::new();
        let label = "a".repeat(64);
        assert!(encode_domain(&mut out, &label).is_err());
    }

    #[test]
    fn mtu_matches_reference_bytes() {
        let mut out = Vec::new();
        encode_mtu(&mut out, 1234);
        assert_eq!(out, [0x05, 0x01, 0x00, 0x00, 0x00, 0x00, 0x04, 0xd2]);
    }

    #[test]
    fn source_ll_addr_pads_by_address_length() {
        let mut out = Vec::new();
        encode_source_ll_addr(&mut out, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(out, [0x01, 0x01, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

        let mut out = Vec::new();
        encode_source_ll_addr(&mut out, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(
            out,
            [0x01, 0x02, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn sixlowpan_context_matches_reference_bytes() {
        let mut out = Vec::new();
        SixLowpanContext {
            context_len: 50,
            compression: true,
            context_id: 4,
            valid_lifetime: 1000,
            prefix: Ipv6Addr::UNSPECIFIED,
        }
        .encode(&mut out);

        let mut expected = vec![0x22, 0x03, 0x32, 0x14, 0x00, 0x00, 0x03, 0xe8];
        expected.extend_from_slice(&[0; 16]);
        assert_eq!(out, expected);
    }

    #[test]
    fn abro_matches_reference_bytes() {
        let mut out = Vec::new();
        Abro {
            version_low: 10,
            version_high: 2,
            valid_lifetime: 2,
            address: "fe80::a200:0:0:1".parse().unwrap(),
        }
        .encode(&mut out);

        let expected = [
            0x23, 0x03, 0x00, 0x0a, 0x00, 0x02, 0x00, 0x02, 0xfe, 0x80, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0xa2, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn every_option_survives_a_round_trip() {
        for (valid, preferred) in [(0, 0), (86400, 14400), (u32::MAX, u32::MAX)] {
            round_trip(NdOption::PrefixInfo(PrefixInfo {
                prefix: "2001:db8::".parse().unwrap(),
                prefix_len: 64,
                on_link: true,
                autonomous: true,
                router_addr: false,
                valid_lifetime: valid,
                preferred_lifetime: preferred,
            }));
        }

        for (prefix, len) in [("::", 0), ("2001:db8:aa00::", 40), ("2001:db8::1:2:0", 112)] {
            round_trip(NdOption::RouteInfo(RouteInfo {
                prefix: prefix.parse().unwrap(),
                prefix_len: len,
                preference: Preference::Low,
                lifetime: u32::MAX,
            }));
        }

        round_trip(NdOption::SourceLlAddr(vec![0x02, 0, 0, 0xaa, 0xbb, 0xcc]));
        round_trip(NdOption::Mtu(1480));
        round_trip(NdOption::AdvInterval(600_000));
        round_trip(NdOption::HomeAgentInfo(HomeAgentInfo {
            mobile_router_support: true,
            preference: 10,
            lifetime: 1800,
        }));
        round_trip(NdOption::Rdnss(Rdnss {
            lifetime: 0,
            servers: vec!["2001:db8::53".parse().unwrap()],
        }));
        round_trip(NdOption::Dnssl(Dnssl {
            lifetime: u32::MAX,
            suffixes: vec!["lan".into(), "corp.example.org".into()],
        }));
        round_trip(NdOption::SixLowpanContext(SixLowpanContext {
            context_len: 64,
            compression: false,
            context_id: 15,
            valid_lifetime: u16::MAX,
            prefix: "2001:db8:6::".parse().unwrap(),
        }));
        round_trip(NdOption::Abro(Abro {
            version_low: 1,
            version_high: 0,
            valid_lifetime: 0,
            address: "2001:db8::1".parse().unwrap(),
        }));
        round_trip(NdOption::Unknown {
            kind: 200,
            data: vec![1, 2, 3, 4, 5, 6],
        });
    }
}
