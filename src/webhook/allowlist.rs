//! Source-IP allowlist for the webhook endpoint.

use ipnet::IpNet;
use std::net::IpAddr;
use tracing::warn;

/// Published Mercado Pago webhook egress addresses. Used when no allowlist
/// is configured.
pub const DEFAULT_ALLOWED_CIDRS: [&str; 5] = [
    "34.195.82.184/32",
    "100.24.156.160/32",
    "35.196.38.56/32",
    "44.217.34.150/32",
    "44.219.124.34/32",
];

#[derive(Debug, Clone)]
pub struct IpAllowlist {
    networks: Vec<IpNet>,
}

impl IpAllowlist {
    /// Build from CIDR strings. Bare addresses are accepted as /32 (or /128)
    /// entries; entries that parse as neither are skipped with a warning.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut networks = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match entry.parse::<IpNet>() {
                Ok(net) => networks.push(net),
                Err(_) => match entry.parse::<IpAddr>() {
                    Ok(addr) => networks.push(IpNet::from(addr)),
                    Err(_) => warn!(entry = %entry, "skipping unparseable allowlist entry"),
                },
            }
        }
        Self { networks }
    }

    pub fn default_providers() -> Self {
        Self::new(DEFAULT_ALLOWED_CIDRS)
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(&ip))
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_matches_known_provider_ips() {
        let allowlist = IpAllowlist::default_providers();
        assert!(allowlist.contains("34.195.82.184".parse().unwrap()));
        assert!(allowlist.contains("44.219.124.34".parse().unwrap()));
        assert!(!allowlist.contains("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn cidr_ranges_match_contained_addresses() {
        let allowlist = IpAllowlist::new(["192.168.1.0/24"]);
        assert!(allowlist.contains("192.168.1.200".parse().unwrap()));
        assert!(!allowlist.contains("192.168.2.1".parse().unwrap()));
    }

    #[test]
    fn bare_addresses_are_treated_as_host_routes() {
        let allowlist = IpAllowlist::new(["203.0.113.7"]);
        assert!(allowlist.contains("203.0.113.7".parse().unwrap()));
        assert!(!allowlist.contains("203.0.113.8".parse().unwrap()));
    }

    #[test]
    fn garbage_entries_are_skipped() {
        let allowlist = IpAllowlist::new(["not-a-cidr", " ", "10.0.0.0/8"]);
        assert!(allowlist.contains("10.1.2.3".parse().unwrap()));
        assert!(!allowlist.is_empty());
    }
}
