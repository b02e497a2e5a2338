use std::fmt;
use std::net::Ipv6Addr;

use tracing::{debug, error, warn};

use crate::interface::{find_by_index, Interface};
use crate::wire::options::SOURCE_LL_ADDR;
use crate::wire::{is_router_advert, is_router_solicit, rs_options, ICMPV6_HEADER_LEN, RA_HEADER_LEN, RS_HEADER_LEN};

/// Ancillary data delivered with an inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketMeta {
    pub source: Ipv6Addr,
    pub ifindex: u32,
    pub hoplimit: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    TooShort,
    NotRouterDiscovery,
    BadCode,
    HopLimit,
    BadOptions,
    SllaoFromUnspecified,
    UnknownInterface,
    NotAdvertising,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::TooShort => "too short",
            DropReason::NotRouterDiscovery => "not rs or ra",
            DropReason::BadCode => "nonzero code",
            DropReason::HopLimit => "hop limit not 255",
            DropReason::BadOptions => "bad option chain",
            DropReason::SllaoFromUnspecified => "source link-layer address from ::",
            DropReason::UnknownInterface => "unknown interface",
            DropReason::NotAdvertising => "interface not advertising",
        };
        f.write_str(s)
    }
}

/// Where an inbound packet goes. Interfaces are referred to by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Solicitation { iface: usize },
    Advertisement { iface: usize },
    Dropped(DropReason),
}

fn drop_packet(reason: DropReason) -> Dispatch {
    Dispatch::Dropped(reason)
}

/// Validates an inbound ICMPv6 datagram and finds the interface it
/// belongs to. Has no side effects besides logging.
pub fn classify(ifaces: &[Interface], packet: &[u8], meta: &PacketMeta) -> Dispatch {
    if packet.len() < ICMPV6_HEADER_LEN {
        warn!(len = packet.len(), source = %meta.source, "received icmpv6 packet with invalid length");
        return drop_packet(DropReason::TooShort);
    }

    let kind = packet[0];
    let solicit = is_router_solicit(kind);
    if !solicit && !is_router_advert(kind) {
        error!(kind, "icmpv6 filter failed");
        return drop_packet(DropReason::NotRouterDiscovery);
    }

    let min_len = if solicit { RS_HEADER_LEN } else { RA_HEADER_LEN };
    if packet.len() < min_len {
        warn!(
            len = packet.len(),
            source = %meta.source,
            "received {} with invalid length",
            if solicit { "rs" } else { "ra" }
        );
        return drop_packet(DropReason::TooShort);
    }

    if packet[1] != 0 {
        warn!(code = packet[1], source = %meta.source, "received rs or ra with nonzero code");
        return drop_packet(DropReason::BadCode);
    }

    if meta.hoplimit != 255 {
        warn!(
            hoplimit = meta.hoplimit,
            source = %meta.source,
            "received rs or ra with invalid hoplimit"
        );
        return drop_packet(DropReason::HopLimit);
    }

    if solicit {
        let mut sllao = false;
        for opt in rs_options(packet) {
            match opt {
                Ok(opt) => sllao |= opt.kind == SOURCE_LL_ADDR,
                Err(e) => {
                    warn!(source = %meta.source, "received rs with {}", e);
                    return drop_packet(DropReason::BadOptions);
                }
            }
        }
        if sllao && meta.source.is_unspecified() {
            warn!("received rs from :: with source link-layer address option");
            return drop_packet(DropReason::SllaoFromUnspecified);
        }
    }

    let Some(iface) = find_by_index(ifaces, meta.ifindex) else {
        debug!(ifindex = meta.ifindex, "received packet from unknown interface");
        return drop_packet(DropReason::UnknownInterface);
    };

    if !ifaces[iface].policy.send_advert {
        debug!(interface = %ifaces[iface].name, "ignoring packet, AdvSendAdvert is off");
        return drop_packet(DropReason::NotAdvertising);
    }

    if solicit {
        Dispatch::Solicitation { iface }
    } else {
        Dispatch::Advertisement { iface }
    }
}
