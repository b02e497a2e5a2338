//! Consistency checks against Router Advertisements from other routers on
//! the link (RFC 4861 §6.2.7). Everything here is advisory: findings are
//! logged and returned, local behavior never changes.

use std::fmt;
use std::net::Ipv6Addr;

use tracing::{debug, error, warn};

use crate::interface::Interface;
use crate::wire::options::mask_prefix;
use crate::wire::{decode_ra, NdOption};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    CurHopLimit { ours: u8, theirs: u8 },
    ManagedFlag { ours: bool, theirs: bool },
    OtherConfigFlag { ours: bool, theirs: bool },
    ReachableTime { ours: u32, theirs: u32 },
    RetransTimer { ours: u32, theirs: u32 },
    LinkMtu { ours: u32, theirs: u32 },
    ValidLifetime { prefix: Ipv6Addr, len: u8, ours: u32, theirs: u32 },
    PreferredLifetime { prefix: Ipv6Addr, len: u8, ours: u32, theirs: u32 },
    UnknownRdnss(Ipv6Addr),
    UnknownDnssl(String),
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::CurHopLimit { ours, theirs } => {
                write!(f, "AdvCurHopLimit {} vs {}", ours, theirs)
            }
            Conflict::ManagedFlag { ours, theirs } => {
                write!(f, "AdvManagedFlag {} vs {}", ours, theirs)
            }
            Conflict::OtherConfigFlag { ours, theirs } => {
                write!(f, "AdvOtherConfigFlag {} vs {}", ours, theirs)
            }
            Conflict::ReachableTime { ours, theirs } => {
                write!(f, "AdvReachableTime {} vs {}", ours, theirs)
            }
            Conflict::RetransTimer { ours, theirs } => {
                write!(f, "AdvRetransTimer {} vs {}", ours, theirs)
            }
            Conflict::LinkMtu { ours, theirs } => write!(f, "AdvLinkMTU {} vs {}", ours, theirs),
            Conflict::ValidLifetime {
                prefix,
                len,
                ours,
                theirs,
            } => write!(f, "AdvValidLifetime for {}/{} {} vs {}", prefix, len, ours, theirs),
            Conflict::PreferredLifetime {
                prefix,
                len,
                ours,
                theirs,
            } => write!(
                f,
                "AdvPreferredLifetime for {}/{} {} vs {}",
                prefix, len, ours, theirs
            ),
            Conflict::UnknownRdnss(addr) => write!(f, "RDNSS server {} not advertised by us", addr),
            Conflict::UnknownDnssl(suffix) => {
                write!(f, "DNSSL suffix {} not advertised by us", suffix)
            }
        }
    }
}

fn addr_match(a: Ipv6Addr, b: Ipv6Addr, len: u8) -> bool {
    mask_prefix(a, len) == mask_prefix(b, len)
}

/// Compares a peer's advertisement against what `iface` is configured to
/// send and returns the disagreements. Malformed input is logged and
/// yields whatever was checked before the damage.
pub fn check_peer_ra(iface: &Interface, packet: &[u8], from: Ipv6Addr) -> Vec<Conflict> {
    if iface.props.link_local == Some(from) {
        debug!(interface = %iface.name, "ignoring our own ra");
        return Vec::new();
    }

    let ra = match decode_ra(packet) {
        Ok(ra) => ra,
        Err(e) => {
            warn!(interface = %iface.name, peer = %from, "discarding ra: {}", e);
            return Vec::new();
        }
    };

    let ours = &iface.policy.header;
    let theirs = &ra.header;
    let mut conflicts = Vec::new();

    if ours.cur_hop_limit != 0
        && theirs.cur_hop_limit != 0
        && ours.cur_hop_limit != theirs.cur_hop_limit
    {
        conflicts.push(Conflict::CurHopLimit {
            ours: ours.cur_hop_limit,
            theirs: theirs.cur_hop_limit,
        });
    }
    if ours.managed != theirs.managed {
        conflicts.push(Conflict::ManagedFlag {
            ours: ours.managed,
            theirs: theirs.managed,
        });
    }
    if ours.other_config != theirs.other_config {
        conflicts.push(Conflict::OtherConfigFlag {
            ours: ours.other_config,
            theirs: theirs.other_config,
        });
    }
    if ours.reachable_time != 0
        && theirs.reachable_time != 0
        && ours.reachable_time != theirs.reachable_time
    {
        conflicts.push(Conflict::ReachableTime {
            ours: ours.reachable_time,
            theirs: theirs.reachable_time,
        });
    }
    if ours.retrans_timer != 0
        && theirs.retrans_timer != 0
        && ours.retrans_timer != theirs.retrans_timer
    {
        conflicts.push(Conflict::RetransTimer {
            ours: ours.retrans_timer,
            theirs: theirs.retrans_timer,
        });
    }

    for opt in &ra.options {
        match opt {
            NdOption::Mtu(mtu) => {
                let ours = iface.policy.link_mtu;
                if ours != 0 && ours != *mtu {
                    conflicts.push(Conflict::LinkMtu { ours, theirs: *mtu });
                }
            }
            NdOption::PrefixInfo(pinfo) => {
                // a decrementing prefix is expected to drift
                let matching = iface.prefixes.iter().filter(|p| {
                    !p.decrement_lifetimes
                        && p.info.prefix_len == pinfo.prefix_len
                        && addr_match(p.info.prefix, pinfo.prefix, p.info.prefix_len)
                });
                for prefix in matching {
                    if prefix.info.valid_lifetime != pinfo.valid_lifetime {
                        conflicts.push(Conflict::ValidLifetime {
                            prefix: prefix.info.prefix,
                            len: prefix.info.prefix_len,
                            ours: prefix.info.valid_lifetime,
                            theirs: pinfo.valid_lifetime,
                        });
                    }
                    if prefix.info.preferred_lifetime != pinfo.preferred_lifetime {
                        conflicts.push(Conflict::PreferredLifetime {
                            prefix: prefix.info.prefix,
                            len: prefix.info.prefix_len,
                            ours: prefix.info.preferred_lifetime,
                            theirs: pinfo.preferred_lifetime,
                        });
                    }
                }
            }
            NdOption::Rdnss(rdnss) => {
                for server in &rdnss.servers {
                    if !iface.advertises_rdnss(server) {
                        conflicts.push(Conflict::UnknownRdnss(*server));
                    }
                }
            }
            NdOption::Dnssl(dnssl) => {
                for suffix in &dnssl.suffixes {
                    if !iface.advertises_dnssl(suffix) {
                        conflicts.push(Conflict::UnknownDnssl(suffix.clone()));
                    }
                }
            }
            NdOption::TargetLlAddr(_) | NdOption::RedirectedHeader => {
                error!(
                    interface = %iface.name,
                    peer = %from,
                    option = opt.kind(),
                    "invalid option in ra"
                );
            }
            NdOption::Unknown { kind, .. } => {
                debug!(interface = %iface.name, peer = %from, option = kind, "unknown option in ra");
            }
            _ => {}
        }
    }

    for e in &ra.errors {
        error!(interface = %iface.name, peer = %from, "bad option in ra: {}", e);
    }

    for conflict in &conflicts {
        warn!(interface = %iface.name, peer = %from, "our {} disagrees with peer", conflict);
    }

    conflicts
}
