// ── Candidate IP ranges ──
//
// Ranges come one per line (or comma separated) as single addresses or
// CIDR blocks. IPv4 blocks are sampled one random host per /24 unless
// every host is requested; IPv6 blocks yield one random address each.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use rand::Rng;

use crate::error::CoreError;

/// Parse range text. Blank lines and `#` comments are ignored.
pub fn parse_ranges(text: &str, origin: &str) -> Result<Vec<IpNetwork>, CoreError> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpNetwork>()
                .map_err(|e| CoreError::parse(origin, format!("invalid range `{entry}`: {e}")))
        })
        .collect()
}

/// Expand ranges into probe candidates.
pub fn candidates<R: Rng + ?Sized>(ranges: &[IpNetwork], test_all: bool, rng: &mut R) -> Vec<IpAddr> {
    let mut out = Vec::new();
    for range in ranges {
        match *range {
            IpNetwork::V4(net) => ipv4_candidates(net, test_all, rng, &mut out),
            IpNetwork::V6(net) => out.push(IpAddr::V6(ipv6_candidate(net, rng))),
        }
    }
    out
}

fn ipv4_candidates<R: Rng + ?Sized>(
    net: Ipv4Network,
    test_all: bool,
    rng: &mut R,
    out: &mut Vec<IpAddr>,
) {
    if test_all {
        out.extend(net.iter().map(IpAddr::V4));
        return;
    }

    let base = u32::from(net.network());
    let prefix = u32::from(net.prefix());
    if prefix >= 24 {
        let host_bits = 32 - prefix;
        let offset = if host_bits == 0 {
            0
        } else {
            rng.random_range(0..(1u32 << host_bits))
        };
        out.push(IpAddr::V4(Ipv4Addr::from(base | offset)));
        return;
    }

    let blocks = 1u32 << (24 - prefix);
    for block in 0..blocks {
        let octet = rng.random_range(0..=255u32);
        out.push(IpAddr::V4(Ipv4Addr::from(base | (block << 8) | octet)));
    }
}

fn ipv6_candidate<R: Rng + ?Sized>(net: Ipv6Network, rng: &mut R) -> Ipv6Addr {
    let host_bits = 128 - u32::from(net.prefix());
    if host_bits == 0 {
        return net.network();
    }
    let mask = if host_bits >= 128 {
        u128::MAX
    } else {
        (1u128 << host_bits) - 1
    };
    Ipv6Addr::from(u128::from(net.network()) | (rng.random::<u128>() & mask))
}
