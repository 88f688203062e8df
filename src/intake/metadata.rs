use std::net::IpAddr;

use axum::http::HeaderMap;
use ipnet::IpNet;

/// Where a lead form submission came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: IpAddr,
    pub user_agent: Option<String>,
}

pub fn extract(headers: &HeaderMap, peer_addr: IpAddr, trusted_proxies: &[IpNet]) -> ClientInfo {
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .map(str::to_string);

    ClientInfo {
        ip: client_ip(headers, peer_addr, trusted_proxies),
        user_agent,
    }
}

/// The peer address, or the first non-proxy hop of `X-Forwarded-For` when the
/// peer itself is a trusted proxy.
pub fn client_ip(headers: &HeaderMap, peer_addr: IpAddr, trusted_proxies: &[IpNet]) -> IpAddr {
    let is_trusted = |ip: &IpAddr| trusted_proxies.iter().any(|net| net.contains(ip));

    if !is_trusted(&peer_addr) {
        return peer_addr;
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|xff| {
            xff.split(',')
                .filter_map(|s| s.trim().parse::<IpAddr>().ok())
                .find(|ip| !is_trusted(ip))
        })
        .unwrap_or(peer_addr)
}
