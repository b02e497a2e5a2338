//! Device information on Linux.

use std::fs;
use std::net::Ipv6Addr;
use std::path::Path;

use ipnet::Ipv6Net;
use nix::ifaddrs::getifaddrs;
use nix::net::if_::{if_nametoindex, InterfaceFlags};
use tracing::debug;

use crate::defaults::RFC2460_MIN_MTU;
use crate::engine::{DeviceInfo, DeviceProbe};
use crate::{Error, Result};

fn is_link_local(addr: &Ipv6Addr) -> bool {
    addr.segments()[0] & 0xffc0 == 0xfe80
}

/// Leading one bits of a netmask.
fn prefix_len(mask: &Ipv6Addr) -> u8 {
    u128::from(*mask).leading_ones() as u8
}

/// Reads an integer from a sysfs or procfs file.
fn read_sysctl(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

const IPV6_FORWARDING: &str = "/proc/sys/net/ipv6/conf/all/forwarding";

/// The `all` forwarding sysctl, which a router expects to be 1. `None`
/// when procfs is missing or the value cannot be read.
pub fn ipv6_forwarding() -> Option<u32> {
    read_sysctl(Path::new(IPV6_FORWARDING))
}

/// Probes devices through `getifaddrs(3)` and the sysfs/procfs MTU files.
#[derive(Debug, Default)]
pub struct LinuxDevices;

impl DeviceProbe for LinuxDevices {
    fn probe(&mut self, name: &str) -> Result<DeviceInfo> {
        let ifindex = if_nametoindex(name).map_err(|e| Error::Device {
            iface: name.into(),
            reason: format!("no such device: {}", e),
        })?;

        let mut flags = InterfaceFlags::empty();
        let mut hwaddr = None;
        let mut link_local = None;
        let mut addresses = Vec::new();

        for ifaddr in getifaddrs()?.filter(|ifaddr| ifaddr.interface_name == name) {
            flags |= ifaddr.flags;

            let Some(addr) = ifaddr.address else {
                continue;
            };

            if let Some(link) = addr.as_link_addr() {
                // only ethernet-like links have a known address length
                if link.hatype() == libc::ARPHRD_ETHER {
                    hwaddr = link.addr().map(|mac| mac.to_vec());
                }
            } else if let Some(sin6) = addr.as_sockaddr_in6() {
                let ip = sin6.ip();
                if is_link_local(&ip) {
                    link_local.get_or_insert(ip);
                    continue;
                }

                let len = ifaddr
                    .netmask
                    .as_ref()
                    .and_then(|mask| mask.as_sockaddr_in6())
                    .map_or(128, |mask| prefix_len(&mask.ip()));
                if let Ok(net) = Ipv6Net::new(ip, len) {
                    addresses.push(net);
                }
            }
        }

        let link_mtu = read_sysctl(&Path::new("/sys/class/net").join(name).join("mtu"))
            .unwrap_or(RFC2460_MIN_MTU);
        let proto_mtu = read_sysctl(&Path::new("/proc/sys/net/ipv6/conf").join(name).join("mtu"))
            .unwrap_or(RFC2460_MIN_MTU);

        let info = DeviceInfo {
            ifindex,
            up: flags.contains(InterfaceFlags::IFF_UP),
            running: flags.contains(InterfaceFlags::IFF_RUNNING),
            multicast: flags.contains(InterfaceFlags::IFF_MULTICAST),
            hwaddr,
            link_mtu,
            proto_mtu,
            link_local,
            addresses,
        };
        debug!(interface = name, ?info, "probed device");

        Ok(info)
    }
}
