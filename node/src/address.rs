//! Picks the address a node announces to the master
//!
//! Best effort: the first IPv4 interface address that is neither loopback nor
//! link-local, falling back to `localhost`. Nothing guarantees the result is
//! reachable from clients, which is why operators can set `public_host`.

use log::warn;
use std::net::IpAddr;

pub const FALLBACK_HOST: &str = "localhost";

/// Chooses a host from candidate interface addresses, in order
pub fn select_host<I>(addresses: I) -> String
where
    I: IntoIterator<Item = IpAddr>,
{
    addresses
        .into_iter()
        .find_map(|ip| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_link_local() => Some(v4.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| FALLBACK_HOST.to_string())
}

/// Host of the first usable local interface
pub fn discover_host() -> String {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => select_host(interfaces.iter().map(|interface| interface.ip())),
        Err(e) => {
            warn!("Unable to list network interfaces: {}", e);
            FALLBACK_HOST.to_string()
        }
    }
}

/// `host:port` to announce, preferring an explicitly configured host
pub fn advertised_address(public_host: Option<&str>, port: u16) -> String {
    let host = match public_host {
        Some(host) => host.to_string(),
        None => discover_host(),
    };
    format!("{}:{}", host, port)
}
