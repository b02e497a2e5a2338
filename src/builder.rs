use tracing::error;

use crate::interface::{Interface, Status};
use crate::wire::options::{encode_adv_interval, encode_mtu, encode_source_ll_addr};
use crate::{Error, Result};

/// Assembles the complete Router Advertisement for `iface` as it stands.
///
/// Options go out in a fixed order: source link-layer address, MTU,
/// prefixes, routes, RDNSS, DNSSL, advertisement interval, home agent
/// information, 6LoWPAN contexts, ABROs. A ceasing interface gets router
/// lifetime zero and everything else unchanged.
///
/// A packet larger than the interface allows is an error, never truncated.
pub fn build(iface: &Interface) -> Result<Vec<u8>> {
    let policy = &iface.policy;
    let cease = iface.status == Status::Ceasing;

    let mut buf = policy.header.encode(cease)?;

    if policy.source_ll_address {
        if let Some(hwaddr) = &iface.props.hwaddr {
            encode_source_ll_addr(&mut buf, hwaddr)?;
        }
    }

    if policy.link_mtu != 0 {
        encode_mtu(&mut buf, policy.link_mtu);
    }

    for prefix in &iface.prefixes {
        prefix.advertised().encode(&mut buf);
    }

    for route in &iface.routes {
        route.encode(&mut buf);
    }

    for rdnss in &iface.rdnss {
        rdnss.encode(&mut buf)?;
    }

    for dnssl in &iface.dnssl {
        dnssl.encode(&mut buf)?;
    }

    if policy.interval_opt {
        let ms = (policy.max_interval * 1000.0) as u32;
        encode_adv_interval(&mut buf, ms);
    }

    if let Some(hai) = &policy.home_agent_info {
        hai.encode(&mut buf);
    }

    for ctx in &iface.lowpan_contexts {
        ctx.encode(&mut buf);
    }

    for abro in &iface.abros {
        abro.encode(&mut buf);
    }

    let limit = iface.props.max_ra_option_size;
    if buf.len() > limit {
        error!(
            interface = %iface.name,
            size = buf.len(),
            limit,
            "router advertisement does not fit the link"
        );
        return Err(Error::PacketOverflow {
            iface: iface.name.clone(),
            size: buf.len(),
            limit,
        });
    }

    Ok(buf)
}
