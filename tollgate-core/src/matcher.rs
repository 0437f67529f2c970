//! IP and CIDR membership tests used by access list evaluation.
//!
//! Nothing here fails on malformed input: an unparseable address or range
//! simply does not match, so a corrupt list entry stays inert.

use std::net::IpAddr;

use ipnet::IpNet;

fn parse_ip(value: &str) -> Option<IpAddr> {
    value.trim().parse::<IpAddr>().ok().map(|addr| addr.to_canonical())
}

/// Text form stored for plain IP entries. IPv4-mapped IPv6 addresses fold to IPv4.
pub fn canonical_ip(value: &str) -> Option<String> {
    parse_ip(value).map(|addr| addr.to_string())
}

/// Same address regardless of notation. Values that are not addresses
/// fall back to exact string equality.
pub fn matches_ip(ip: &str, candidate: &str) -> bool {
    match (parse_ip(ip), parse_ip(candidate)) {
        (Some(addr), Some(other)) => addr == other,
        _ => !ip.is_empty() && ip == candidate,
    }
}

pub fn matches_cidr(ip: &str, cidr: &str) -> bool {
    let Some(addr) = parse_ip(ip) else {
        return false;
    };
    let Ok(net) = cidr.trim().parse::<IpNet>() else {
        return false;
    };
    net.contains(&addr)
}

pub fn is_valid_cidr(value: &str) -> bool {
    value.trim().parse::<IpNet>().is_ok()
}

pub fn is_valid_ip(value: &str) -> bool {
    value.trim().parse::<IpAddr>().is_ok()
}
