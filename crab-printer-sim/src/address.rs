//! Local address discovery
//!
//! The simulator only makes sense when other devices on the LAN can reach it,
//! so the server refuses to start when the host has no routable IPv4 address.

use std::net::{IpAddr, Ipv4Addr};

use tracing::warn;

/// Source of the address POS clients should print to
pub trait AddressProvider: Send + Sync {
    fn local_address(&self) -> Option<Ipv4Addr>;
}

/// Picks the first non-loopback, non-link-local IPv4 address of the host
///
/// Interfaces are sorted so the choice is stable across calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAddressProvider;

impl AddressProvider for LocalAddressProvider {
    fn local_address(&self) -> Option<Ipv4Addr> {
        match local_ip_address::list_afinet_netifas() {
            Ok(ifas) => first_usable(ifas.into_iter().map(|(_, ip)| ip)),
            Err(e) => {
                warn!(error = %e, "failed to list network interfaces");
                None
            }
        }
    }
}

/// A fixed answer, for configured hosts and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedAddress(pub Option<Ipv4Addr>);

impl AddressProvider for FixedAddress {
    fn local_address(&self) -> Option<Ipv4Addr> {
        self.0
    }
}

fn first_usable(addrs: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    let mut v4: Vec<Ipv4Addr> = addrs
        .into_iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_link_local() => Some(v4),
            _ => None,
        })
        .collect();
    v4.sort();
    v4.dedup();
    v4.into_iter().next()
}
