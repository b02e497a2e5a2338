//! TOML configuration.
//!
//! ```toml
//! [[interface]]
//! name = "eth0"
//! adv_send_advert = true
//! max_rtr_adv_interval = 600
//!
//! [[interface.prefix]]
//! prefix = "2001:db8::/64"
//! adv_valid_lifetime = "infinity"
//!
//! # every global or unique local /64 found on eth0
//! [[interface.prefix]]
//! prefix = "auto"
//! ```

use std::collections::HashSet;
use std::fs;
use std::net::Ipv6Addr;
use std::path::Path;

use ipnet::Ipv6Net;
use serde::{Deserialize, Deserializer};

use crate::defaults::*;
use crate::interface::{AdvPolicy, AdvPrefix, Interface};
use crate::wire::options::{Abro, Dnssl, HomeAgentInfo, PrefixInfo, Rdnss, RouteInfo, SixLowpanContext};
use crate::wire::{Preference, RaHeader};
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default, rename = "interface")]
    interfaces: Vec<InterfaceConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InterfaceConfig {
    name: String,
    #[serde(default)]
    ignore_if_missing: bool,
    #[serde(default)]
    adv_send_advert: bool,
    #[serde(default)]
    unicast_only: bool,
    #[serde(default)]
    adv_ra_solicited_unicast: bool,
    #[serde(default = "default_max_interval")]
    max_rtr_adv_interval: f64,
    min_rtr_adv_interval: Option<f64>,
    min_delay_between_ras: Option<f64>,
    #[serde(default)]
    adv_managed_flag: bool,
    #[serde(default)]
    adv_other_config_flag: bool,
    #[serde(default)]
    adv_link_mtu: u32,
    #[serde(default = "default_ra_mtu")]
    adv_ra_mtu: u32,
    #[serde(default)]
    adv_reachable_time: u32,
    #[serde(default)]
    adv_retrans_timer: u32,
    #[serde(default = "default_cur_hop_limit")]
    adv_cur_hop_limit: u8,
    adv_default_lifetime: Option<u32>,
    #[serde(default)]
    adv_default_preference: Preference,
    #[serde(default = "default_true")]
    adv_source_ll_address: bool,
    #[serde(default)]
    adv_home_agent_flag: bool,
    #[serde(default)]
    adv_interval_opt: bool,
    #[serde(default)]
    adv_home_agent_info: bool,
    #[serde(default)]
    home_agent_preference: u16,
    home_agent_lifetime: Option<u32>,
    #[serde(default)]
    adv_mob_rtr_support_flag: bool,
    #[serde(default)]
    prefix: Vec<PrefixConfig>,
    #[serde(default)]
    route: Vec<RouteConfig>,
    #[serde(default)]
    rdnss: Vec<RdnssConfig>,
    #[serde(default)]
    dnssl: Vec<DnsslConfig>,
    #[serde(default)]
    lowpan_context: Vec<LowpanContextConfig>,
    #[serde(default)]
    abro: Vec<AbroConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PrefixConfig {
    /// `None` for `"auto"`.
    #[serde(deserialize_with = "prefix_or_auto")]
    prefix: Option<Ipv6Net>,
    #[serde(default = "default_true")]
    adv_on_link: bool,
    #[serde(default = "default_true")]
    adv_autonomous: bool,
    #[serde(default)]
    adv_router_addr: bool,
    #[serde(default = "default_valid_lifetime", deserialize_with = "lifetime")]
    adv_valid_lifetime: u32,
    #[serde(default = "default_preferred_lifetime", deserialize_with = "lifetime")]
    adv_preferred_lifetime: u32,
    #[serde(default)]
    decrement_lifetimes: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteConfig {
    route: Ipv6Net,
    #[serde(default)]
    adv_route_preference: Preference,
    #[serde(default, deserialize_with = "opt_lifetime")]
    adv_route_lifetime: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RdnssConfig {
    servers: Vec<Ipv6Addr>,
    #[serde(default, deserialize_with = "opt_lifetime")]
    adv_rdnss_lifetime: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DnsslConfig {
    suffixes: Vec<String>,
    #[serde(default, deserialize_with = "opt_lifetime")]
    adv_dnssl_lifetime: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LowpanContextConfig {
    prefix: Ipv6Net,
    #[serde(default = "default_true")]
    adv_context_compression_flag: bool,
    #[serde(default)]
    adv_context_id: u8,
    /// Units of 60 seconds.
    #[serde(default)]
    adv_lifetime: u16,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AbroConfig {
    address: Ipv6Addr,
    #[serde(default)]
    adv_version_low: u16,
    #[serde(default)]
    adv_version_high: u16,
    /// Units of 60 seconds.
    #[serde(default)]
    adv_valid_lifetime: u16,
}

fn default_true() -> bool {
    true
}

fn default_max_interval() -> f64 {
    DFLT_MAX_RTR_ADV_INTERVAL
}

fn default_ra_mtu() -> u32 {
    DFLT_ADV_RA_MTU
}

fn default_cur_hop_limit() -> u8 {
    DFLT_ADV_CUR_HOP_LIMIT
}

fn default_valid_lifetime() -> u32 {
    DFLT_ADV_VALID_LIFETIME
}

fn default_preferred_lifetime() -> u32 {
    DFLT_ADV_PREFERRED_LIFETIME
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lifetime {
    Seconds(u32),
    Word(String),
}

/// Accepts a number of seconds or `"infinity"`.
fn lifetime<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<u32, D::Error> {
    match Lifetime::deserialize(de)? {
        Lifetime::Seconds(secs) => Ok(secs),
        Lifetime::Word(word) if word.eq_ignore_ascii_case("infinity") => Ok(u32::MAX),
        Lifetime::Word(word) => Err(serde::de::Error::custom(format!(
            "expected seconds or \"infinity\", got {:?}",
            word
        ))),
    }
}

/// Accepts a prefix or `"auto"`.
fn prefix_or_auto<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Option<Ipv6Net>, D::Error> {
    let text = String::deserialize(de)?;
    if text.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    text.parse().map(Some).map_err(serde::de::Error::custom)
}

fn opt_lifetime<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Option<u32>, D::Error> {
    lifetime(de).map(Some)
}

fn invalid(iface: &str, msg: impl Into<String>) -> Error {
    Error::Config {
        iface: iface.into(),
        msg: msg.into(),
    }
}

impl InterfaceConfig {
    fn into_interface(self) -> Result<Interface> {
        let name = self.name;
        let max = self.max_rtr_adv_interval;

        let router_lifetime = self
            .adv_default_lifetime
            .unwrap_or_else(|| dflt_adv_default_lifetime(max));
        let router_lifetime = u16::try_from(router_lifetime)
            .map_err(|_| invalid(&name, format!("AdvDefaultLifetime ({}) is out of range", router_lifetime)))?;

        if self.adv_mob_rtr_support_flag && !self.adv_home_agent_info {
            return Err(invalid(&name, "AdvHomeAgentInfo must be set with AdvMobRtrSupportFlag"));
        }

        let home_agent_info = if self.adv_home_agent_info {
            let lifetime = self.home_agent_lifetime.unwrap_or(u32::from(router_lifetime));
            if !(MIN_HOME_AGENT_LIFETIME..=MAX_HOME_AGENT_LIFETIME).contains(&lifetime) {
                return Err(invalid(
                    &name,
                    format!(
                        "HomeAgentLifetime ({}) must be between {} and {}",
                        lifetime, MIN_HOME_AGENT_LIFETIME, MAX_HOME_AGENT_LIFETIME
                    ),
                ));
            }
            Some(HomeAgentInfo {
                mobile_router_support: self.adv_mob_rtr_support_flag,
                preference: self.home_agent_preference,
                lifetime: lifetime as u16,
            })
        } else {
            None
        };

        let option_lifetime = dflt_option_lifetime(max);

        let mut iface = Interface::new(name);
        iface.ignore_if_missing = self.ignore_if_missing;
        iface.policy = AdvPolicy {
            send_advert: self.adv_send_advert,
            unicast_only: self.unicast_only,
            solicited_unicast: self.adv_ra_solicited_unicast,
            min_interval: 0.0,
            max_interval: max,
            min_delay: 0.0,
            header: RaHeader {
                cur_hop_limit: self.adv_cur_hop_limit,
                managed: self.adv_managed_flag,
                other_config: self.adv_other_config_flag,
                home_agent: self.adv_home_agent_flag,
                preference: self.adv_default_preference,
                router_lifetime,
                reachable_time: self.adv_reachable_time,
                retrans_timer: self.adv_retrans_timer,
            },
            link_mtu: self.adv_link_mtu,
            ra_mtu: self.adv_ra_mtu,
            source_ll_address: self.adv_source_ll_address,
            interval_opt: self.adv_interval_opt,
            home_agent_info,
        };

        for p in self.prefix {
            // the automatic block is a template, its address is filled in
            // per prefix found on the link
            let (addr, len) = match p.prefix {
                Some(net) => (net.network(), net.prefix_len()),
                None => (Ipv6Addr::UNSPECIFIED, 64),
            };
            let mut prefix = AdvPrefix::new(PrefixInfo {
                prefix: addr,
                prefix_len: len,
                on_link: p.adv_on_link,
                autonomous: p.adv_autonomous,
                router_addr: p.adv_router_addr,
                valid_lifetime: p.adv_valid_lifetime,
                preferred_lifetime: p.adv_preferred_lifetime,
            });
            prefix.decrement_lifetimes = p.decrement_lifetimes;

            if p.prefix.is_some() {
                iface.prefixes.push(prefix);
            } else if iface.auto_prefix.replace(prefix).is_some() {
                return Err(invalid(&iface.name, "only one automatic prefix block is allowed"));
            }
        }

        iface.routes = self
            .route
            .into_iter()
            .map(|r| RouteInfo {
                prefix: r.route.network(),
                prefix_len: r.route.prefix_len(),
                preference: r.adv_route_preference,
                lifetime: r.adv_route_lifetime.unwrap_or(option_lifetime),
            })
            .collect();

        iface.rdnss = self
            .rdnss
            .into_iter()
            .map(|r| Rdnss {
                lifetime: r.adv_rdnss_lifetime.unwrap_or(option_lifetime),
                servers: r.servers,
            })
            .collect();

        iface.dnssl = self
            .dnssl
            .into_iter()
            .map(|d| Dnssl {
                lifetime: d.adv_dnssl_lifetime.unwrap_or(option_lifetime),
                suffixes: d.suffixes,
            })
            .collect();

        for ctx in &self.lowpan_context {
            if ctx.adv_context_id > 15 {
                return Err(invalid(
                    &iface.name,
                    format!("6LoWPAN context id ({}) must be at most 15", ctx.adv_context_id),
                ));
            }
        }
        iface.lowpan_contexts = self
            .lowpan_context
            .into_iter()
            .map(|c| SixLowpanContext {
                context_len: c.prefix.prefix_len(),
                compression: c.adv_context_compression_flag,
                context_id: c.adv_context_id,
                valid_lifetime: c.adv_lifetime,
                prefix: c.prefix.network(),
            })
            .collect();

        iface.abros = self
            .abro
            .into_iter()
            .map(|a| Abro {
                version_low: a.adv_version_low,
                version_high: a.adv_version_high,
                valid_lifetime: a.adv_valid_lifetime,
                address: a.address,
            })
            .collect();

        // the MIPv6 minimums depend on the finished option set
        let mipv6 = iface.uses_mipv6();
        iface.policy.min_interval = self
            .min_rtr_adv_interval
            .unwrap_or_else(|| dflt_min_rtr_adv_interval(max, mipv6));
        iface.policy.min_delay = self.min_delay_between_ras.unwrap_or(if mipv6 {
            MIN_DELAY_BETWEEN_RAS_MIPV6
        } else {
            MIN_DELAY_BETWEEN_RAS
        });

        iface.check()?;
        Ok(iface)
    }
}

/// Parses and validates a configuration document.
pub fn parse(text: &str) -> Result<Vec<Interface>> {
    let file: ConfigFile = toml::from_str(text)?;

    let mut seen = HashSet::new();
    let mut ifaces = Vec::with_capacity(file.interfaces.len());
    for raw in file.interfaces {
        if !seen.insert(raw.name.clone()) {
            return Err(invalid(&raw.name, "duplicate interface definition"));
        }
        ifaces.push(raw.into_interface()?);
    }

    Ok(ifaces)
}

pub fn load(path: impl AsRef<Path>) -> Result<Vec<Interface>> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [[interface]]
        name = "eth0"
        adv_send_advert = true
        max_rtr_adv_interval = 600
        min_rtr_adv_interval = 200
        adv_link_mtu = 1480
        adv_default_preference = "high"

        [[interface.prefix]]
        prefix = "2001:db8::/64"

        [[interface.prefix]]
        prefix = "2001:db8:1::/64"
        adv_valid_lifetime = "infinity"
        adv_preferred_lifetime = "infinity"
        decrement_lifetimes = true

        [[interface.route]]
        route = "2001:db8:ff::/48"
        adv_route_preference = "low"

        [[interface.rdnss]]
        servers = ["2001:db8::53", "2001:db8::54"]
        adv_rdnss_lifetime = 1200

        [[interface.dnssl]]
        suffixes = ["example.org"]

        [[interface]]
        name = "wlan0"
        ignore_if_missing = true
        adv_send_advert = true
        unicast_only = true
    "#;

    #[test]
    fn full_document() {
        let ifaces = parse(FULL).unwrap();
        assert_eq!(ifaces.len(), 2);

        let eth0 = &ifaces[0];
        assert!(eth0.policy.send_advert);
        assert_eq!(eth0.policy.min_interval, 200.0);
        assert_eq!(eth0.policy.min_delay, MIN_DELAY_BETWEEN_RAS);
        assert_eq!(eth0.policy.header.router_lifetime, 1800);
        assert_eq!(eth0.policy.header.preference, Preference::High);
        assert_eq!(eth0.policy.header.cur_hop_limit, 64);
        assert!(eth0.policy.source_ll_address);

        assert_eq!(eth0.prefixes[0].info.valid_lifetime, 86400);
        assert_eq!(eth0.prefixes[0].info.preferred_lifetime, 14400);
        assert!(eth0.prefixes[0].info.on_link && eth0.prefixes[0].info.autonomous);
        assert_eq!(eth0.prefixes[1].curr_valid, u32::MAX);
        assert!(eth0.prefixes[1].decrement_lifetimes);

        assert_eq!(eth0.routes[0].prefix_len, 48);
        assert_eq!(eth0.routes[0].preference, Preference::Low);
        assert_eq!(eth0.routes[0].lifetime, 1800);
        assert_eq!(eth0.rdnss[0].lifetime, 1200);
        assert_eq!(eth0.dnssl[0].lifetime, 1800);

        let wlan0 = &ifaces[1];
        assert!(wlan0.ignore_if_missing);
        assert!(wlan0.policy.unicast_only);
        assert!((wlan0.policy.min_interval - 198.0).abs() < 1e-9);
    }

    #[test]
    fn host_bits_are_dropped_from_prefixes() {
        let ifaces = parse(
            r#"
            [[interface]]
            name = "eth0"
            [[interface.prefix]]
            prefix = "2001:db8::1/64"
            "#,
        )
        .unwrap();
        assert_eq!(ifaces[0].prefixes[0].info.prefix, "2001:db8::".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn mipv6_relaxes_minimums() {
        let ifaces = parse(
            r#"
            [[interface]]
            name = "eth0"
            max_rtr_adv_interval = 1.5
            adv_home_agent_flag = true
            adv_interval_opt = true
            "#,
        )
        .unwrap();
        let policy = &ifaces[0].policy;
        assert_eq!(policy.min_delay, MIN_DELAY_BETWEEN_RAS_MIPV6);
        assert!((policy.min_interval - 0.495).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_documents() {
        let cases = [
            // duplicate name
            "[[interface]]\nname = \"eth0\"\n[[interface]]\nname = \"eth0\"\n",
            // unknown key
            "[[interface]]\nname = \"eth0\"\nadv_bogus = 1\n",
            // preferred above valid
            "[[interface]]\nname = \"eth0\"\n[[interface.prefix]]\nprefix = \"2001:db8::/64\"\nadv_valid_lifetime = 10\n",
            // max interval below the minimum
            "[[interface]]\nname = \"eth0\"\nmax_rtr_adv_interval = 2\n",
            // mobile router support without home agent info
            "[[interface]]\nname = \"eth0\"\nadv_mob_rtr_support_flag = true\n",
            // bad lifetime word
            "[[interface]]\nname = \"eth0\"\n[[interface.prefix]]\nprefix = \"2001:db8::/64\"\nadv_valid_lifetime = \"forever\"\n",
            // too many rdnss servers
            "[[interface]]\nname = \"eth0\"\n[[interface.rdnss]]\nservers = [\"::1\", \"::2\", \"::3\", \"::4\"]\n",
            // context id out of range
            "[[interface]]\nname = \"eth0\"\n[[interface.lowpan_context]]\nprefix = \"2001:db8::/64\"\nadv_context_id = 16\n",
            // prefix that is neither a network nor "auto"
            "[[interface]]\nname = \"eth0\"\n[[interface.prefix]]\nprefix = \"automatic\"\n",
            // two automatic blocks
            "[[interface]]\nname = \"eth0\"\n[[interface.prefix]]\nprefix = \"auto\"\n[[interface.prefix]]\nprefix = \"auto\"\n",
        ];

        for case in cases {
            assert!(parse(case).is_err(), "accepted: {}", case);
        }
    }

    #[test]
    fn rejects_non_finite_timing() {
        let cases = [
            "max_rtr_adv_interval = nan",
            "max_rtr_adv_interval = inf",
            "max_rtr_adv_interval = -inf",
            "max_rtr_adv_interval = 600\nmin_rtr_adv_interval = nan",
            "max_rtr_adv_interval = 600\nmin_rtr_adv_interval = inf",
            "min_delay_between_ras = nan",
            "min_delay_between_ras = inf",
            "min_delay_between_ras = 0",
        ];

        for case in cases {
            let doc = format!("[[interface]]\nname = \"eth0\"\n{}\n", case);
            assert!(
                matches!(parse(&doc), Err(Error::Config { .. })),
                "accepted: {}",
                case
            );
        }
    }

    #[test]
    fn auto_prefix_is_a_template() {
        let ifaces = parse(
            r#"
            [[interface]]
            name = "eth0"

            [[interface.prefix]]
            prefix = "2001:db8::/64"

            [[interface.prefix]]
            prefix = "auto"
            adv_valid_lifetime = 3600
            adv_preferred_lifetime = 1800
            adv_autonomous = false
            "#,
        )
        .unwrap();

        let eth0 = &ifaces[0];
        assert_eq!(eth0.prefixes.len(), 1);
        let template = eth0.auto_prefix.as_ref().unwrap();
        assert_eq!(template.info.prefix_len, 64);
        assert_eq!(template.info.valid_lifetime, 3600);
        assert!(template.info.on_link);
        assert!(!template.info.autonomous);
    }

    #[test]
    fn empty_document_has_no_interfaces() {
        assert!(parse("").unwrap().is_empty());
    }
}
