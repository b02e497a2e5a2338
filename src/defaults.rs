//! Protocol constants (RFC 4861 §10, RFC 6275 §13) and configuration defaults.

use std::time::Duration;

pub const MAX_INITIAL_RTR_ADVERT_INTERVAL: Duration = Duration::from_secs(16);
pub const MAX_INITIAL_RTR_ADVERTISEMENTS: u32 = 3;
pub const MAX_RA_DELAY_TIME: Duration = Duration::from_millis(500);

pub const MIN_DELAY_BETWEEN_RAS: f64 = 3.0;
pub const MIN_DELAY_BETWEEN_RAS_MIPV6: f64 = 0.03;

pub const DFLT_MAX_RTR_ADV_INTERVAL: f64 = 600.0;
pub const MIN_MIN_RTR_ADV_INTERVAL: f64 = 3.0;
pub const MIN_MIN_RTR_ADV_INTERVAL_MIPV6: f64 = 0.03;
pub const MIN_MAX_RTR_ADV_INTERVAL: f64 = 4.0;
pub const MIN_MAX_RTR_ADV_INTERVAL_MIPV6: f64 = 0.07;
pub const MAX_MAX_RTR_ADV_INTERVAL: f64 = 1800.0;

pub const MAX_ADV_DEFAULT_LIFETIME: u32 = 9000;
pub const MAX_ADV_REACHABLE_TIME: u32 = 3_600_000;
pub const DFLT_ADV_CUR_HOP_LIMIT: u8 = 64;

pub const DFLT_ADV_VALID_LIFETIME: u32 = 86400;
pub const DFLT_ADV_PREFERRED_LIFETIME: u32 = 14400;

pub const MIN_HOME_AGENT_LIFETIME: u32 = 1;
pub const MAX_HOME_AGENT_LIFETIME: u32 = 65520;

pub const RFC2460_MIN_MTU: u32 = 1280;
pub const DFLT_ADV_RA_MTU: u32 = 1500;
pub const IPV6_HEADER_LEN: usize = 40;

/// Receive buffer size for inbound RS/RA datagrams.
pub const MSG_SIZE_RECV: usize = 1500;

/// Multiplier applied to MaxRtrAdvInterval while an interface is dead or
/// not yet set up.
pub const DORMANT_FACTOR: f64 = 10.0;

pub const MAX_RDNSS_SERVERS: usize = 3;

pub fn dflt_min_rtr_adv_interval(max: f64, mipv6: bool) -> f64 {
    let floor = if mipv6 {
        MIN_MIN_RTR_ADV_INTERVAL_MIPV6
    } else {
        MIN_MIN_RTR_ADV_INTERVAL
    };

    (0.33 * max).max(floor).min(0.75 * max)
}

/// Three times MaxRtrAdvInterval, never zero since that would withdraw the
/// default route.
pub fn dflt_adv_default_lifetime(max: f64) -> u32 {
    ((3.0 * max) as u32).clamp(1, MAX_ADV_DEFAULT_LIFETIME)
}

/// Route, RDNSS and DNSSL lifetimes all default to three times MaxRtrAdvInterval.
pub fn dflt_option_lifetime(max: f64) -> u32 {
    ((3.0 * max) as u32).max(1)
}
