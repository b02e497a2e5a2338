use std::net::Ipv6Addr;

use ipnet::Ipv6Net;
use tracing::{debug, error, info};

use crate::defaults::*;
use crate::scheduler::AdvertTimers;
use crate::wire::options::{Abro, Dnssl, HomeAgentInfo, PrefixInfo, Rdnss, RouteInfo, SixLowpanContext};
use crate::wire::{Preference, RaHeader};
use crate::{Error, Result};

/// Where an interface is in its life. Whether a ready interface is still
/// in its initial burst is tracked by `AdvertTimers::init_racount`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[default]
    Uninitialized,
    Ready,
    Dead,
    Ceasing,
}

/// Advertisement policy, fixed between reloads.
#[derive(Debug, Clone)]
pub struct AdvPolicy {
    pub send_advert: bool,
    pub unicast_only: bool,
    pub solicited_unicast: bool,
    /// Seconds.
    pub min_interval: f64,
    /// Seconds.
    pub max_interval: f64,
    /// Seconds.
    pub min_delay: f64,
    pub header: RaHeader,
    pub link_mtu: u32,
    pub ra_mtu: u32,
    pub source_ll_address: bool,
    pub interval_opt: bool,
    pub home_agent_info: Option<HomeAgentInfo>,
}

impl Default for AdvPolicy {
    fn default() -> Self {
        Self {
            send_advert: false,
            unicast_only: false,
            solicited_unicast: false,
            min_interval: dflt_min_rtr_adv_interval(DFLT_MAX_RTR_ADV_INTERVAL, false),
            max_interval: DFLT_MAX_RTR_ADV_INTERVAL,
            min_delay: MIN_DELAY_BETWEEN_RAS,
            header: RaHeader {
                cur_hop_limit: DFLT_ADV_CUR_HOP_LIMIT,
                managed: false,
                other_config: false,
                home_agent: false,
                preference: Preference::Medium,
                router_lifetime: dflt_adv_default_lifetime(DFLT_MAX_RTR_ADV_INTERVAL) as u16,
                reachable_time: 0,
                retrans_timer: 0,
            },
            link_mtu: 0,
            ra_mtu: DFLT_ADV_RA_MTU,
            source_ll_address: true,
            interval_opt: false,
            home_agent_info: None,
        }
    }
}

/// What setup learned about the underlying device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProps {
    pub ifindex: u32,
    /// `None` when the link type has no known hardware address length.
    pub hwaddr: Option<Vec<u8>>,
    pub link_mtu: u32,
    pub max_ra_option_size: usize,
    pub link_local: Option<Ipv6Addr>,
}

impl Default for DeviceProps {
    fn default() -> Self {
        Self {
            ifindex: 0,
            hwaddr: None,
            link_mtu: RFC2460_MIN_MTU,
            max_ra_option_size: DFLT_ADV_RA_MTU as usize - IPV6_HEADER_LEN,
            link_local: None,
        }
    }
}

/// A prefix as configured plus the lifetimes currently being advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvPrefix {
    pub info: PrefixInfo,
    pub decrement_lifetimes: bool,
    /// Learned from the addresses on the link rather than configured.
    pub auto: bool,
    pub curr_valid: u32,
    pub curr_preferred: u32,
}

impl AdvPrefix {
    pub fn new(info: PrefixInfo) -> Self {
        Self {
            curr_valid: info.valid_lifetime,
            curr_preferred: info.preferred_lifetime,
            decrement_lifetimes: false,
            auto: false,
            info,
        }
    }

    /// The option as it goes on the wire right now.
    pub fn advertised(&self) -> PrefixInfo {
        PrefixInfo {
            valid_lifetime: self.curr_valid,
            preferred_lifetime: self.curr_preferred,
            ..self.info.clone()
        }
    }

    pub fn reset_lifetimes(&mut self) {
        self.curr_valid = self.info.valid_lifetime;
        self.curr_preferred = self.info.preferred_lifetime;
    }

    pub fn decrement(&mut self, secs: u32) {
        if !self.decrement_lifetimes {
            return;
        }
        decrement_lifetime(secs, &mut self.curr_valid);
        decrement_lifetime(secs, &mut self.curr_preferred);
    }
}

/// Checks whether an IPv6 address is part of the `2000::/3` network.
fn is_gua(addr: &Ipv6Addr) -> bool {
    addr.octets()[0] & 0xe0 == 0x20
}

/// Checks whether an IPv6 address is part of the `fc00::/7` network.
fn is_ula(addr: &Ipv6Addr) -> bool {
    addr.segments()[0] & 0xfe00 == 0xfc00
}

/// Counts a lifetime down, saturating at zero. Infinity stays infinity.
pub fn decrement_lifetime(secs: u32, lifetime: &mut u32) {
    if *lifetime != u32::MAX {
        *lifetime = lifetime.saturating_sub(secs);
    }
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub ignore_if_missing: bool,
    pub policy: AdvPolicy,
    pub props: DeviceProps,
    pub prefixes: Vec<AdvPrefix>,
    /// Flags and lifetimes for prefixes taken from the link's addresses.
    /// `None` unless the interface has an automatic prefix block.
    pub auto_prefix: Option<AdvPrefix>,
    pub routes: Vec<RouteInfo>,
    pub rdnss: Vec<Rdnss>,
    pub dnssl: Vec<Dnssl>,
    pub lowpan_contexts: Vec<SixLowpanContext>,
    pub abros: Vec<Abro>,
    pub timers: AdvertTimers,
    pub status: Status,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ignore_if_missing: false,
            policy: AdvPolicy::default(),
            props: DeviceProps::default(),
            prefixes: Vec::new(),
            auto_prefix: None,
            routes: Vec::new(),
            rdnss: Vec::new(),
            dnssl: Vec::new(),
            lowpan_contexts: Vec::new(),
            abros: Vec::new(),
            timers: AdvertTimers::default(),
            status: Status::Uninitialized,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == Status::Ready
    }

    /// Whether any Mobile IPv6 extension is active, which relaxes the
    /// interval and delay minimums.
    pub fn uses_mipv6(&self) -> bool {
        self.policy.header.home_agent
            || self.policy.home_agent_info.is_some()
            || self.policy.interval_opt
            || self
                .prefixes
                .iter()
                .chain(&self.auto_prefix)
                .any(|p| p.info.router_addr)
    }

    pub fn advertises_rdnss(&self, addr: &Ipv6Addr) -> bool {
        self.rdnss.iter().any(|r| r.servers.contains(addr))
    }

    pub fn advertises_dnssl(&self, suffix: &str) -> bool {
        self.dnssl
            .iter()
            .any(|d| d.suffixes.iter().any(|s| s.eq_ignore_ascii_case(suffix)))
    }

    /// Restores every decrementing prefix to its configured lifetimes.
    /// Calling it twice in a row is the same as calling it once.
    pub fn reset_prefix_lifetimes(&mut self) {
        for prefix in self.prefixes.iter_mut().filter(|p| p.decrement_lifetimes) {
            debug!(
                interface = %self.name,
                prefix = %prefix.info.prefix,
                len = prefix.info.prefix_len,
                valid = prefix.curr_valid,
                preferred = prefix.curr_preferred,
                "reset prefix lifetimes"
            );
            prefix.reset_lifetimes();
        }
    }

    /// Syncs the learned prefixes with the global and unique local /64s
    /// assigned on the link. Configured prefixes always win, and a learned
    /// prefix that is still present keeps its current lifetimes.
    pub fn refresh_auto_prefixes(&mut self, addrs: &[Ipv6Net]) {
        let Some(template) = &self.auto_prefix else {
            return;
        };

        let mut nets: Vec<Ipv6Net> = addrs
            .iter()
            .map(Ipv6Net::trunc)
            .filter(|net| net.prefix_len() == 64 && (is_gua(&net.network()) || is_ula(&net.network())))
            .collect();
        nets.sort();
        nets.dedup();

        let covers = |p: &AdvPrefix, net: &Ipv6Net| {
            p.info.prefix == net.network() && p.info.prefix_len == net.prefix_len()
        };

        let name = &self.name;
        self.prefixes.retain(|p| {
            let keep = !p.auto || nets.iter().any(|net| covers(p, net));
            if !keep {
                debug!(interface = %name, prefix = %p.info.prefix, "prefix left the link");
            }
            keep
        });

        let mut learned = Vec::new();
        for net in nets {
            if self.prefixes.iter().any(|p| covers(p, &net)) {
                continue;
            }
            debug!(interface = %name, prefix = %net, "advertising prefix found on the link");

            let mut prefix = template.clone();
            prefix.info.prefix = net.network();
            prefix.info.prefix_len = net.prefix_len();
            prefix.auto = true;
            prefix.reset_lifetimes();
            learned.push(prefix);
        }
        self.prefixes.extend(learned);
    }

    pub fn decrement_prefix_lifetimes(&mut self, secs: u32) {
        for prefix in &mut self.prefixes {
            prefix.decrement(secs);
        }
    }

    fn invalid(&self, msg: String) -> Error {
        error!(interface = %self.name, "{}", msg);
        Error::Config {
            iface: self.name.clone(),
            msg,
        }
    }

    /// Validates the policy and children.
    ///
    /// Every problem is logged; the first one is returned.
    pub fn check(&self) -> Result<()> {
        let mipv6 = self.uses_mipv6();
        if mipv6 {
            info!(interface = %self.name, "using mobile ipv6 extensions");
        }

        let p = &self.policy;
        let mut problems = Vec::new();

        for (name, secs) in [
            ("MinRtrAdvInterval", p.min_interval),
            ("MaxRtrAdvInterval", p.max_interval),
            ("MinDelayBetweenRAs", p.min_delay),
        ] {
            if !(secs.is_finite() && secs > 0.0) {
                problems.push(format!("{} ({}) must be a positive number of seconds", name, secs));
            }
        }

        let min_min = if mipv6 {
            MIN_MIN_RTR_ADV_INTERVAL_MIPV6
        } else {
            MIN_MIN_RTR_ADV_INTERVAL
        };
        if p.min_interval < min_min || p.min_interval > 0.75 * p.max_interval {
            problems.push(format!(
                "MinRtrAdvInterval ({:.2}) must be at least {:.2} but no more than 3/4 of MaxRtrAdvInterval ({:.2})",
                p.min_interval,
                min_min,
                0.75 * p.max_interval
            ));
        }

        let min_max = if mipv6 {
            MIN_MAX_RTR_ADV_INTERVAL_MIPV6
        } else {
            MIN_MAX_RTR_ADV_INTERVAL
        };
        if p.max_interval < min_max || p.max_interval > MAX_MAX_RTR_ADV_INTERVAL {
            problems.push(format!(
                "MaxRtrAdvInterval ({:.2}) must be between {:.2} and {}",
                p.max_interval, min_max, MAX_MAX_RTR_ADV_INTERVAL
            ));
        }

        let min_delay = if mipv6 {
            MIN_DELAY_BETWEEN_RAS_MIPV6
        } else {
            MIN_DELAY_BETWEEN_RAS
        };
        if p.min_delay < min_delay {
            problems.push(format!(
                "MinDelayBetweenRAs ({:.2}) must be at least {:.2}",
                p.min_delay, min_delay
            ));
        }

        if p.link_mtu != 0 && p.link_mtu < RFC2460_MIN_MTU {
            problems.push(format!(
                "AdvLinkMTU ({}) must be zero or at least {}",
                p.link_mtu, RFC2460_MIN_MTU
            ));
        }

        if p.header.reachable_time > MAX_ADV_REACHABLE_TIME {
            problems.push(format!(
                "AdvReachableTime ({}) must not be greater than {}",
                p.header.reachable_time, MAX_ADV_REACHABLE_TIME
            ));
        }

        let lifetime = u32::from(p.header.router_lifetime);
        if lifetime != 0
            && (lifetime > MAX_ADV_DEFAULT_LIFETIME || f64::from(lifetime) < p.max_interval)
        {
            problems.push(format!(
                "AdvDefaultLifetime ({}) must be zero or between {} and {}",
                lifetime, p.max_interval as u32, MAX_ADV_DEFAULT_LIFETIME
            ));
        }

        if let Some(hai) = &p.home_agent_info {
            let lifetime = u32::from(hai.lifetime);
            if !(MIN_HOME_AGENT_LIFETIME..=MAX_HOME_AGENT_LIFETIME).contains(&lifetime) {
                problems.push(format!(
                    "HomeAgentLifetime ({}) must be between {} and {}",
                    lifetime, MIN_HOME_AGENT_LIFETIME, MAX_HOME_AGENT_LIFETIME
                ));
            }
            if !p.header.home_agent {
                problems.push("AdvHomeAgentFlag must be set with HomeAgentInfo".into());
            }
        }

        for prefix in self.prefixes.iter().chain(&self.auto_prefix) {
            let info = &prefix.info;
            if info.prefix_len > 128 {
                problems.push(format!("invalid prefix length ({})", info.prefix_len));
            }
            if info.preferred_lifetime > info.valid_lifetime {
                problems.push(format!(
                    "AdvValidLifetime ({}) of {}/{} must be greater than AdvPreferredLifetime ({})",
                    info.valid_lifetime, info.prefix, info.prefix_len, info.preferred_lifetime
                ));
            }
        }

        for route in &self.routes {
            if route.prefix_len > 128 {
                problems.push(format!("invalid route prefix length ({})", route.prefix_len));
            }

            // a default route whose lifetime disagrees with the router
            // lifetime makes hosts flap their default route
            if route.prefix.is_unspecified() && (route.lifetime == 0) != (lifetime == 0) {
                error!(
                    interface = %self.name,
                    route_lifetime = route.lifetime,
                    default_lifetime = lifetime,
                    "route ::/0 lifetime conflicts with AdvDefaultLifetime, default routes will flap"
                );
            }
        }

        for rdnss in &self.rdnss {
            if rdnss.servers.is_empty() || rdnss.servers.len() > MAX_RDNSS_SERVERS {
                problems.push(format!(
                    "rdnss must list between 1 and {} servers, got {}",
                    MAX_RDNSS_SERVERS,
                    rdnss.servers.len()
                ));
            }
        }

        for dnssl in &self.dnssl {
            if dnssl.suffixes.is_empty() {
                problems.push("dnssl must list at least one suffix".into());
            }
            for suffix in &dnssl.suffixes {
                if suffix.len() > 255 || suffix.split('.').any(|label| label.len() > 63) {
                    problems.push(format!("invalid dnssl suffix {:?}", suffix));
                }
            }
        }

        let mut first = None;
        for msg in problems {
            let err = self.invalid(msg);
            first.get_or_insert(err);
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn find_by_index(ifaces: &[Interface], ifindex: u32) -> Option<usize> {
    ifaces
        .iter()
        .position(|iface| iface.status != Status::Uninitialized && iface.props.ifindex == ifindex)
}

pub fn find_by_name(ifaces: &[Interface], name: &str) -> Option<usize> {
    ifaces.iter().position(|iface| iface.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(valid: u32, preferred: u32) -> AdvPrefix {
        AdvPrefix::new(PrefixInfo {
            prefix: "2001:db8::".parse().unwrap(),
            prefix_len: 64,
            on_link: true,
            autonomous: true,
            router_addr: false,
            valid_lifetime: valid,
            preferred_lifetime: preferred,
        })
    }

    #[test]
    fn decrement_saturates() {
        let mut lifetime = 10;
        decrement_lifetime(7, &mut lifetime);
        assert_eq!(lifetime, 3);
        decrement_lifetime(7, &mut lifetime);
        assert_eq!(lifetime, 0);

        let mut infinite = u32::MAX;
        decrement_lifetime(7, &mut infinite);
        assert_eq!(infinite, u32::MAX);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut iface = Interface::new("eth0");
        let mut p = prefix(86400, 14400);
        p.decrement_lifetimes = true;
        iface.prefixes.push(p);

        iface.decrement_prefix_lifetimes(400);
        assert_eq!(iface.prefixes[0].curr_valid, 86000);
        assert_eq!(iface.prefixes[0].advertised().preferred_lifetime, 14000);

        iface.reset_prefix_lifetimes();
        let once = iface.prefixes.clone();
        iface.reset_prefix_lifetimes();
        assert_eq!(iface.prefixes, once);
        assert_eq!(iface.prefixes[0].curr_valid, 86400);
    }

    #[test]
    fn prefixes_without_the_flag_keep_lifetimes() {
        let mut iface = Interface::new("eth0");
        iface.prefixes.push(prefix(600, 300));
        iface.decrement_prefix_lifetimes(100);
        assert_eq!(iface.prefixes[0].curr_valid, 600);
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(Interface::new("eth0").check().is_ok());
    }

    #[test]
    fn bad_interval_and_lifetimes_fail() {
        let mut iface = Interface::new("eth0");
        iface.policy.min_interval = 500.0;
        assert!(matches!(iface.check(), Err(Error::Config { .. })));

        let mut iface = Interface::new("eth0");
        iface.prefixes.push(prefix(100, 200));
        assert!(iface.check().is_err());

        let mut iface = Interface::new("eth0");
        iface.policy.header.router_lifetime = 10;
        assert!(iface.check().is_err());
    }

    #[test]
    fn home_agent_info_needs_flag() {
        let mut iface = Interface::new("eth0");
        iface.policy.home_agent_info = Some(HomeAgentInfo {
            mobile_router_support: false,
            preference: 0,
            lifetime: 1800,
        });
        assert!(iface.check().is_err());

        iface.policy.header.home_agent = true;
        assert!(iface.check().is_ok());
        assert!(iface.uses_mipv6());
    }

    #[test]
    fn default_route_conflict_is_not_an_error() {
        let mut iface = Interface::new("eth0");
        iface.routes.push(RouteInfo {
            prefix: Ipv6Addr::UNSPECIFIED,
            prefix_len: 0,
            preference: Preference::Medium,
            lifetime: 0,
        });
        assert!(iface.check().is_ok());
    }

    #[test]
    fn learned_prefixes_follow_the_link() {
        let mut iface = Interface::new("eth0");
        iface.prefixes.push(prefix(600, 300));
        let mut template = prefix(3600, 1800);
        template.info.prefix = Ipv6Addr::UNSPECIFIED;
        template.decrement_lifetimes = true;
        iface.auto_prefix = Some(template);

        let addrs: Vec<Ipv6Net> = [
            "2001:db8::1/64",
            "2001:db8:5::1/64",
            "2001:db8:5::2/64",
            "fd00:1::1/64",
            "fe80::1/64",
            "2001:db8:6::1/128",
            "::1/128",
        ]
        .iter()
        .map(|a| a.parse().unwrap())
        .collect();
        iface.refresh_auto_prefixes(&addrs);

        let nets: Vec<(String, bool)> = iface
            .prefixes
            .iter()
            .map(|p| (format!("{}/{}", p.info.prefix, p.info.prefix_len), p.auto))
            .collect();
        assert_eq!(
            nets,
            [
                ("2001:db8::/64".to_string(), false),
                ("2001:db8:5::/64".to_string(), true),
                ("fd00:1::/64".to_string(), true),
            ]
        );
        // the configured prefix keeps its own lifetimes
        assert_eq!(iface.prefixes[0].info.valid_lifetime, 600);
        assert_eq!(iface.prefixes[1].curr_valid, 3600);
        assert!(iface.prefixes[1].decrement_lifetimes);

        iface.decrement_prefix_lifetimes(100);
        iface.refresh_auto_prefixes(&addrs[..2]);
        assert_eq!(iface.prefixes.len(), 2);
        assert_eq!(iface.prefixes[1].curr_valid, 3500);

        iface.refresh_auto_prefixes(&[]);
        assert_eq!(iface.prefixes.len(), 1);
        assert!(!iface.prefixes[0].auto);
    }

    #[test]
    fn no_template_means_no_learning() {
        let mut iface = Interface::new("eth0");
        iface.refresh_auto_prefixes(&["2001:db8::1/64".parse().unwrap()]);
        assert!(iface.prefixes.is_empty());
    }

    #[test]
    fn non_finite_intervals_fail() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 0.0] {
            let mut iface = Interface::new("eth0");
            iface.policy.max_interval = bad;
            assert!(iface.check().is_err(), "max {}", bad);

            let mut iface = Interface::new("eth0");
            iface.policy.min_interval = bad;
            assert!(iface.check().is_err(), "min {}", bad);

            let mut iface = Interface::new("eth0");
            iface.policy.min_delay = bad;
            assert!(iface.check().is_err(), "delay {}", bad);
        }
    }
}
