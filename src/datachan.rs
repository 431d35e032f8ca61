//! Passive data-channel negotiation: EPSV and PASV reply parsing, and the
//! guard against servers that advertise an address their NAT never
//! translated.

use std::net::{IpAddr, Ipv4Addr};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // 227 Entering Passive Mode (h1,h2,h3,h4,p1,p2).
    static ref PASV_RE: Regex = Regex::new(r"\((\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})\)").unwrap();
    // 229 Entering Extended Passive Mode (|||port|)
    static ref EPSV_RE: Regex = Regex::new(r"\|\|\|(\d{1,5})\|").unwrap();
}

/// Extracts host and port from a 227 reply.
pub(crate) fn parse_pasv_reply(text: &str) -> Option<(Ipv4Addr, u16)> {
    let caps = PASV_RE.captures(text)?;
    let mut octets = [0u8; 4];
    for (i, octet) in octets.iter_mut().enumerate() {
        *octet = caps[i + 1].parse().ok()?;
    }
    let p1: u16 = caps[5].parse().ok()?;
    let p2: u16 = caps[6].parse().ok()?;
    if p1 > 255 || p2 > 255 {
        return None;
    }
    Some((Ipv4Addr::from(octets), p1 * 256 + p2))
}

/// Extracts the port between the last two bars of a 229 reply.
pub(crate) fn parse_epsv_reply(text: &str) -> Option<u16> {
    let caps = EPSV_RE.captures(text)?;
    caps[1].parse().ok()
}

/// The granularity at which the bogus-IP guard compares addresses: the
/// 10/8 block as one class-A network, the 172.16/12 and 192.168/16 blocks
/// by their class-B prefix, everything else as plain routable space.
#[derive(Debug, PartialEq, Eq)]
enum NetClass {
    PrivateA,
    PrivateB(u8, u8),
    Public,
}

fn net_class(ip: Ipv4Addr) -> NetClass {
    let o = ip.octets();
    if o[0] == 10 {
        NetClass::PrivateA
    } else if (o[0] == 172 && (16..=31).contains(&o[1])) || (o[0] == 192 && o[1] == 168) {
        NetClass::PrivateB(o[0], o[1])
    } else {
        NetClass::Public
    }
}

/// Decides whether the host a 227 reply advertised can be trusted, given
/// where the control connection actually goes. Misconfigured NATs hand
/// out an address from the wrong side of the translation, in either
/// direction, so the advertised host must live in the same network class
/// as the control peer; otherwise the caller dials the control host
/// instead. An EPSV reply never carries a host, so it is never subject to
/// this guard.
pub(crate) fn pasv_host_is_plausible(control_peer: Option<IpAddr>, reported: Ipv4Addr) -> bool {
    match control_peer {
        Some(IpAddr::V4(peer)) => net_class(peer) == net_class(reported),
        // A v6 control connection cannot reach whatever v4 address the
        // server dreamt up; fall back to the control host.
        Some(IpAddr::V6(_)) => false,
        // The control host is a name we never resolved ourselves; only
        // trust routable advertised addresses.
        None => net_class(reported) == NetClass::Public,
    }
}
