//! Network snapshots and the usable-address classifier.
//!
//! A [`NetworkSnapshot`] captures the link addresses of one interface at the
//! instant a link-change notification was observed.  The classifier decides
//! whether that snapshot offers a routable IPv4 address worth (re)binding the
//! group transport to.
//!
//! # Why ignore 169.254.0.0/16? (for beginners)
//!
//! When a device joins a network but DHCP has not yet handed out an address,
//! the OS may self-assign an address from the IPv4 link-local block
//! (169.254.x.x, RFC 3927).  Such an address only reaches hosts on the same
//! physical segment and is usually replaced a few seconds later.  Binding
//! multicast sockets to it would mean rebinding again almost immediately, so
//! the classifier treats it as "not usable yet".
//!
//! IPv6 addresses are ignored entirely: the group transport is IPv4 multicast.

use std::net::{IpAddr, Ipv4Addr};

/// One address assigned to a network link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAddress {
    /// The assigned address.  The address family is the enum variant.
    pub address: IpAddr,
    /// Network prefix length (e.g. `24` for a /24).
    pub prefix_len: u8,
}

impl LinkAddress {
    /// Creates a link address.
    pub fn new(address: IpAddr, prefix_len: u8) -> Self {
        Self {
            address,
            prefix_len,
        }
    }

    /// Returns `true` if this is an IPv4 address.
    pub fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }
}

/// Immutable view of one interface's addresses at a notification instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSnapshot {
    /// OS interface name (e.g. `eth0`, `wlan0`).
    pub interface: String,
    /// Addresses currently assigned to the interface.
    pub addresses: Vec<LinkAddress>,
    /// Whether the link reported itself as up.
    pub up: bool,
}

impl NetworkSnapshot {
    /// Creates a snapshot for an interface that is up.
    pub fn new(interface: impl Into<String>, addresses: Vec<LinkAddress>) -> Self {
        Self {
            interface: interface.into(),
            addresses,
            up: true,
        }
    }

    /// Convenience constructor from bare IP addresses (prefix length 24 for
    /// IPv4, 64 for IPv6).
    pub fn from_ips(interface: impl Into<String>, ips: &[IpAddr]) -> Self {
        let addresses = ips
            .iter()
            .map(|ip| LinkAddress::new(*ip, if ip.is_ipv4() { 24 } else { 64 }))
            .collect();
        Self::new(interface, addresses)
    }
}

/// Returns `true` if `addr` is in the 169.254.0.0/16 auto-configuration block.
fn is_auto_configured(addr: Ipv4Addr) -> bool {
    let [a, b, _, _] = addr.octets();
    a == 169 && b == 254
}

/// Returns the first IPv4 address in `snapshot` that is neither loopback nor
/// link-local auto-configured.
pub fn first_usable_ipv4(snapshot: Option<&NetworkSnapshot>) -> Option<Ipv4Addr> {
    snapshot?.addresses.iter().find_map(|link| match link.address {
        IpAddr::V4(v4) if !v4.is_loopback() && !is_auto_configured(v4) => Some(v4),
        _ => None,
    })
}

/// Decides whether a snapshot carries a usable, routable IPv4 address.
///
/// Returns `true` iff at least one address is IPv4, is not loopback and is
/// not in 169.254.0.0/16.  An absent snapshot is "not usable", never an
/// error.
pub fn is_usable_network(snapshot: Option<&NetworkSnapshot>) -> bool {
    first_usable_ipv4(snapshot).is_some()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn snapshot(ips: &[&str]) -> NetworkSnapshot {
        let ips: Vec<IpAddr> = ips.iter().map(|s| s.parse().unwrap()).collect();
        NetworkSnapshot::from_ips("eth0", &ips)
    }

    #[test]
    fn test_absent_snapshot_is_not_usable() {
        assert!(!is_usable_network(None));
    }

    #[test]
    fn test_empty_snapshot_is_not_usable() {
        let snap = NetworkSnapshot::new("eth0", Vec::new());
        assert!(!is_usable_network(Some(&snap)));
    }

    #[test]
    fn test_loopback_only_is_not_usable() {
        let snap = snapshot(&["127.0.0.1"]);
        assert!(!is_usable_network(Some(&snap)));
    }

    #[test]
    fn test_ipv6_only_is_not_usable() {
        let snap = snapshot(&["fe80::1", "2001:db8::42"]);
        assert!(!is_usable_network(Some(&snap)));
    }

    #[test]
    fn test_auto_configured_only_is_not_usable() {
        let snap = snapshot(&["169.254.3.4", "169.254.200.1"]);
        assert!(!is_usable_network(Some(&snap)));
    }

    #[test]
    fn test_private_ipv4_is_usable() {
        let snap = snapshot(&["192.168.1.50"]);
        assert!(is_usable_network(Some(&snap)));
    }

    #[test]
    fn test_mixed_snapshot_with_one_routable_ipv4_is_usable() {
        // Arrange: every excluded category plus one routable address
        let snap = snapshot(&["127.0.0.1", "::1", "169.254.9.9", "10.0.0.7"]);

        // Act / Assert
        assert!(is_usable_network(Some(&snap)));
        assert_eq!(
            first_usable_ipv4(Some(&snap)),
            Some(Ipv4Addr::new(10, 0, 0, 7))
        );
    }

    #[test]
    fn test_neighbouring_blocks_are_not_treated_as_auto_configured() {
        // 169.253.x.x and 170.254.x.x are ordinary addresses.
        assert!(is_usable_network(Some(&snapshot(&["169.253.1.1"]))));
        assert!(is_usable_network(Some(&snapshot(&["170.254.1.1"]))));
    }

    #[test]
    fn test_ipv4_mapped_ipv6_is_not_usable() {
        // The classifier only looks at the address family tag, not at the
        // embedded IPv4 inside an IPv6 address.
        let mapped = IpAddr::V6(Ipv4Addr::new(192, 168, 1, 1).to_ipv6_mapped());
        let snap = NetworkSnapshot::from_ips("wlan0", &[mapped, IpAddr::V6(Ipv6Addr::LOCALHOST)]);
        assert!(!is_usable_network(Some(&snap)));
    }

    #[test]
    fn test_from_ips_assigns_family_prefixes() {
        let snap = snapshot(&["192.168.1.50", "fe80::1"]);
        assert_eq!(snap.addresses[0].prefix_len, 24);
        assert!(snap.addresses[0].is_ipv4());
        assert_eq!(snap.addresses[1].prefix_len, 64);
        assert!(snap.up);
    }
}
