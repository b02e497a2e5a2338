//! The advertisement engine.
//!
//! Owns the interface set and drives it from two inputs: deadlines passing
//! and inbound packets. Socket and device access go through [`Transport`]
//! and [`DeviceProbe`] so the engine itself never blocks or touches a file
//! descriptor. Time is always passed in.

use std::io;
use std::net::Ipv6Addr;
use std::time::Instant;

use ipnet::Ipv6Net;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::builder::build;
use crate::conflict::check_peer_ra;
use crate::defaults::{IPV6_HEADER_LEN, RFC2460_MIN_MTU};
use crate::dispatch::{classify, Dispatch, PacketMeta};
use crate::interface::{find_by_name, DeviceProps, Interface, Status};
use crate::scheduler::{soonest, Event, ReplyKind};
use crate::{Error, Result};

pub const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
pub const ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);

pub trait Transport {
    /// Sends one ICMPv6 payload out of `ifindex`. `source` pins the source
    /// address when known.
    fn send(&mut self, ifindex: u32, source: Option<Ipv6Addr>, dest: Ipv6Addr, packet: &[u8]) -> io::Result<()>;

    fn join_all_routers(&mut self, ifindex: u32) -> io::Result<()>;
}

/// Snapshot of a network device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub ifindex: u32,
    pub up: bool,
    pub running: bool,
    pub multicast: bool,
    pub hwaddr: Option<Vec<u8>>,
    pub link_mtu: u32,
    /// IPv6 MTU of the device, which may be below the link MTU.
    pub proto_mtu: u32,
    pub link_local: Option<Ipv6Addr>,
    /// Other IPv6 addresses on the device with their prefix lengths.
    pub addresses: Vec<Ipv6Net>,
}

impl DeviceInfo {
    pub fn max_ra_option_size(&self, ra_mtu: u32) -> usize {
        let mtu = ra_mtu
            .min(self.link_mtu.max(RFC2460_MIN_MTU))
            .min(self.proto_mtu.max(RFC2460_MIN_MTU));
        (mtu as usize).saturating_sub(IPV6_HEADER_LEN)
    }
}

pub trait DeviceProbe {
    fn probe(&mut self, name: &str) -> Result<DeviceInfo>;
}

fn device_error(iface: &Interface, reason: &str) -> Error {
    Error::Device {
        iface: iface.name.clone(),
        reason: reason.into(),
    }
}

/// Logs a device problem, quietly for interfaces that may be absent.
fn log_missing(iface: &Interface, e: &Error) {
    if iface.ignore_if_missing {
        debug!(interface = %iface.name, "ignoring the interface: {}", e);
    } else {
        warn!(interface = %iface.name, "ignoring the interface: {}", e);
    }
}

pub struct Advertiser<T, D, R> {
    ifaces: Vec<Interface>,
    transport: T,
    devices: D,
    rng: R,
}

impl<T: Transport, D: DeviceProbe, R: Rng> Advertiser<T, D, R> {
    pub fn new(ifaces: Vec<Interface>, transport: T, devices: D, rng: R) -> Self {
        Self {
            ifaces,
            transport,
            devices,
            rng,
        }
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.ifaces
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn devices_mut(&mut self) -> &mut D {
        &mut self.devices
    }

    /// Sets up every interface and arms its initial burst.
    ///
    /// An interface that cannot be set up and is not marked
    /// `ignore_if_missing` makes the whole start fail.
    pub fn start(&mut self, now: Instant) -> Result<()> {
        let mut ifaces = std::mem::take(&mut self.ifaces);
        let res = self.bring_up(&mut ifaces, now);
        self.ifaces = ifaces;
        res
    }

    fn bring_up(&mut self, ifaces: &mut [Interface], now: Instant) -> Result<()> {
        for iface in ifaces.iter_mut() {
            match setup_iface(iface, &mut self.devices, &mut self.transport) {
                Ok(()) => kickoff_iface(iface, now),
                Err(e) if iface.ignore_if_missing => {
                    log_missing(iface, &e);
                    iface.timers.dormant(now, iface.policy.max_interval);
                }
                Err(e) => {
                    error!(interface = %iface.name, "setup failed: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Resolves device properties for interface `i` and marks it ready.
    pub fn setup(&mut self, i: usize) -> Result<()> {
        let iface = self
            .ifaces
            .get_mut(i)
            .ok_or(Error::Malformed("interface handle out of range"))?;
        setup_iface(iface, &mut self.devices, &mut self.transport)
    }

    /// Schedules an immediate advertisement on interface `i` and restarts
    /// its initial burst.
    pub fn kickoff(&mut self, i: usize, now: Instant) {
        if let Some(iface) = self.ifaces.get_mut(i) {
            kickoff_iface(iface, now);
        }
    }

    /// Replaces the interface set. On error the current set stays in place.
    pub fn reload(&mut self, mut ifaces: Vec<Interface>, now: Instant) -> Result<()> {
        info!(count = ifaces.len(), "reloading interfaces");
        self.bring_up(&mut ifaces, now)?;
        self.ifaces = ifaces;
        Ok(())
    }

    pub fn reset_prefix_lifetimes(&mut self) {
        info!("resetting prefix lifetimes");
        for iface in &mut self.ifaces {
            iface.reset_prefix_lifetimes();
        }
    }

    /// Link-state notification for `name`: the interface is set up again
    /// and restarts its initial burst on the next turn of the loop.
    pub fn link_changed(&mut self, name: &str, now: Instant) {
        let Some(i) = find_by_name(&self.ifaces, name) else {
            return;
        };
        let iface = &mut self.ifaces[i];
        if iface.status == Status::Ceasing {
            return;
        }

        info!(interface = %iface.name, "link state changed, reinitializing");
        iface.status = Status::Uninitialized;
        iface.timers.next_multicast = Some(now);
        iface.timers.pending.clear();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        soonest(&self.ifaces).map(|(due, _)| due)
    }

    /// Fires every event due at `now` and returns how many fired.
    pub fn fire_due(&mut self, now: Instant) -> Result<usize> {
        let mut fired = 0;
        while let Some((due, event)) = soonest(&self.ifaces) {
            if due > now {
                break;
            }
            self.timer_fired(event, now)?;
            fired += 1;
        }
        Ok(fired)
    }

    /// Handles one scheduled event. Only fatal errors are returned.
    pub fn timer_fired(&mut self, event: Event, now: Instant) -> Result<()> {
        let i = event.iface();
        if i >= self.ifaces.len() {
            return Ok(());
        }

        match event {
            Event::Advertise { .. } => self.periodic(i, now),
            Event::Reply { .. } => self.reply(i, now),
        }
    }

    fn periodic(&mut self, i: usize, now: Instant) -> Result<()> {
        let iface = &mut self.ifaces[i];
        debug!(interface = %iface.name, "timer fired");

        match iface.status {
            Status::Ceasing => return Ok(()),
            Status::Uninitialized => {
                match setup_iface(iface, &mut self.devices, &mut self.transport) {
                    Ok(()) => {
                        info!(interface = %iface.name, "interface ready");
                        kickoff_iface(iface, now);
                    }
                    Err(e) => {
                        log_missing(iface, &e);
                        iface.timers.dormant(now, iface.policy.max_interval);
                    }
                }
                return Ok(());
            }
            Status::Ready | Status::Dead => {}
        }

        if let Err(e) = self.check_device(i) {
            let iface = &mut self.ifaces[i];
            if iface.status != Status::Dead {
                log_missing(iface, &e);
                iface.status = Status::Dead;
            }
            iface.timers.dormant(now, iface.policy.max_interval);
            return Ok(());
        }

        let iface = &mut self.ifaces[i];
        if iface.status == Status::Dead {
            match setup_iface(iface, &mut self.devices, &mut self.transport) {
                Ok(()) => {
                    warn!(interface = %iface.name, "interface seems to have come back up, proceeding normally");
                    iface.timers.init_racount = 0;
                }
                Err(e) => {
                    debug!(interface = %iface.name, "still unusable: {}", e);
                    iface.timers.dormant(now, iface.policy.max_interval);
                    return Ok(());
                }
            }
        }

        if self.ifaces[i].policy.unicast_only {
            self.ifaces[i].timers.next_multicast = None;
            return Ok(());
        }

        self.send_multicast(i, now)
    }

    fn reply(&mut self, i: usize, now: Instant) -> Result<()> {
        let due = self.ifaces[i].timers.take_due_replies(now);
        if !self.ifaces[i].is_ready() {
            return Ok(());
        }

        for reply in due {
            let iface = &self.ifaces[i];
            let too_recent = iface.timers.multicast_too_recent(now, iface.policy.min_delay);

            match (reply.kind, too_recent) {
                (ReplyKind::Unicast(dest), _) => self.send_ra(i, dest, now)?,
                (ReplyKind::Multicast { .. }, false) => self.send_multicast(i, now)?,
                (ReplyKind::Multicast { solicitor: Some(dest) }, true) => {
                    self.send_ra(i, dest, now)?
                }
                (ReplyKind::Multicast { solicitor: None }, true) => {
                    debug!(interface = %self.ifaces[i].name, "multicast went out meanwhile, dropping reply");
                }
            }
        }
        Ok(())
    }

    fn check_device(&mut self, i: usize) -> Result<()> {
        let iface = &self.ifaces[i];
        let info = self.devices.probe(&iface.name)?;
        if !info.up {
            return Err(device_error(iface, "interface is down"));
        }
        if !info.running {
            return Err(device_error(iface, "interface is not running"));
        }
        if iface.status == Status::Ready && info.ifindex != iface.props.ifindex {
            return Err(device_error(iface, "interface index changed"));
        }
        Ok(())
    }

    fn send_multicast(&mut self, i: usize, now: Instant) -> Result<()> {
        self.send_ra(i, ALL_NODES, now)?;

        let iface = &mut self.ifaces[i];
        let (min, max) = (iface.policy.min_interval, iface.policy.max_interval);
        let interval = iface.timers.advance(now, &mut self.rng, min, max);
        debug!(
            interface = %iface.name,
            next = ?interval,
            init_racount = iface.timers.init_racount,
            "next multicast scheduled"
        );
        Ok(())
    }

    /// Builds and sends one advertisement. Send failures are logged; only a
    /// fatal build error is returned.
    fn send_ra(&mut self, i: usize, dest: Ipv6Addr, now: Instant) -> Result<()> {
        let iface = &mut self.ifaces[i];

        let elapsed = iface.timers.take_elapsed_secs(now);
        iface.decrement_prefix_lifetimes(elapsed);

        let packet = match build(iface) {
            Ok(packet) => packet,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(interface = %iface.name, "cannot build ra: {}", e);
                return Ok(());
            }
        };

        iface.timers.last_ra = Some(now);
        match self
            .transport
            .send(iface.props.ifindex, iface.props.link_local, dest, &packet)
        {
            Ok(()) => debug!(interface = %iface.name, dest = %dest, size = packet.len(), "sent ra"),
            Err(e) => warn!(interface = %iface.name, dest = %dest, "send ra: {}", e),
        }
        Ok(())
    }

    /// Classifies an inbound datagram and acts on it. Solicitation replies
    /// are only queued here; they go out from [`Self::fire_due`].
    pub fn handle_inbound(&mut self, packet: &[u8], meta: &PacketMeta, now: Instant) -> Dispatch {
        let dispatch = classify(&self.ifaces, packet, meta);
        match dispatch {
            Dispatch::Solicitation { iface } => self.solicited(iface, meta.source, now),
            Dispatch::Advertisement { iface } => {
                check_peer_ra(&self.ifaces[iface], packet, meta.source);
            }
            Dispatch::Dropped(_) => {}
        }
        dispatch
    }

    fn solicited(&mut self, i: usize, source: Ipv6Addr, now: Instant) {
        let iface = &mut self.ifaces[i];
        if !iface.is_ready() {
            debug!(interface = %iface.name, "ignoring rs, interface not ready");
            return;
        }
        debug!(interface = %iface.name, source = %source, "received rs");

        let policy = &iface.policy;
        let too_recent = iface.timers.multicast_too_recent(now, policy.min_delay);

        let kind = if source.is_unspecified() {
            if policy.unicast_only {
                debug!(interface = %iface.name, "cannot answer rs from :: on unicast-only interface");
                return;
            }
            if too_recent {
                debug!(interface = %iface.name, "rs from :: answered by recent multicast");
                return;
            }
            ReplyKind::Multicast { solicitor: None }
        } else if policy.unicast_only || policy.solicited_unicast || too_recent {
            ReplyKind::Unicast(source)
        } else {
            ReplyKind::Multicast {
                solicitor: Some(source),
            }
        };

        let due = iface.timers.defer_reply(now, &mut self.rng, kind);
        debug!(interface = %iface.name, reply = ?kind, delay = ?due.saturating_duration_since(now), "reply queued");
    }

    /// Sends the final advertisement with router lifetime zero on every
    /// ready interface that multicasts, then stops all scheduling. Returns
    /// how many final advertisements were built and handed to the
    /// transport.
    pub fn stop_all(&mut self, now: Instant) -> usize {
        info!("sending final advertisements");

        let mut sent = 0;
        for i in 0..self.ifaces.len() {
            let iface = &mut self.ifaces[i];
            let eligible = iface.policy.send_advert && !iface.policy.unicast_only && iface.is_ready();

            iface.status = Status::Ceasing;
            iface.timers.next_multicast = None;
            iface.timers.pending.clear();

            if !eligible {
                continue;
            }
            match self.send_ra(i, ALL_NODES, now) {
                Ok(()) => sent += 1,
                Err(e) => error!(interface = %self.ifaces[i].name, "final ra: {}", e),
            }
        }
        sent
    }
}

fn kickoff_iface(iface: &mut Interface, now: Instant) {
    iface.timers.kickoff(now);
    if iface.policy.unicast_only {
        iface.timers.next_multicast = None;
    }
}

fn setup_iface<T: Transport, D: DeviceProbe>(iface: &mut Interface, devices: &mut D, transport: &mut T) -> Result<()> {
    let info = devices.probe(&iface.name)?;

    if !info.up {
        return Err(device_error(iface, "interface is down"));
    }
    if !info.running {
        return Err(device_error(iface, "interface is not running"));
    }
    let link_local = info
        .link_local
        .ok_or_else(|| device_error(iface, "no link-local address configured"))?;

    if iface.policy.link_mtu > info.link_mtu {
        return Err(Error::Config {
            iface: iface.name.clone(),
            msg: format!(
                "AdvLinkMTU ({}) must not exceed the device MTU ({})",
                iface.policy.link_mtu, info.link_mtu
            ),
        });
    }

    if !info.multicast && !iface.policy.unicast_only {
        warn!(interface = %iface.name, "interface lacks multicast support, switching to unicast only");
        iface.policy.unicast_only = true;
    }

    if info.hwaddr.is_none() && iface.policy.source_ll_address {
        debug!(interface = %iface.name, "unknown hardware address length, omitting source link-layer address");
    }

    transport.join_all_routers(info.ifindex)?;

    iface.refresh_auto_prefixes(&info.addresses);
    iface.props = DeviceProps {
        ifindex: info.ifindex,
        max_ra_option_size: info.max_ra_option_size(iface.policy.ra_mtu),
        hwaddr: info.hwaddr,
        link_mtu: info.link_mtu,
        link_local: Some(link_local),
    };
    iface.status = Status::Ready;

    debug!(
        interface = %iface.name,
        ifindex = iface.props.ifindex,
        mtu = iface.props.link_mtu,
        max_ra_option_size = iface.props.max_ra_option_size,
        "device set up"
    );
    Ok(())
}
