use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{FilterError, Result};

/// Name of the profile applied when nothing else is known
pub const DEFAULT_PROFILE: &str = "opendns";

/// IP address family of a resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4
    V4,
    /// IPv6
    V6,
}

impl AddressFamily {
    /// Family of the given address
    #[must_use]
    pub const fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 => write!(f, "ipv4"),
            Self::V6 => write!(f, "ipv6"),
        }
    }
}

/// A named set of filtering resolvers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterProfile {
    /// Unique key, e.g. `opendns`
    pub name: String,

    /// Human-readable description of what the provider blocks
    pub description: String,

    /// Resolvers in priority order; within a family the first is primary
    pub resolver_addresses: Vec<IpAddr>,
}

impl FilterProfile {
    /// Addresses of one family, in priority order
    pub fn addresses_for(&self, family: AddressFamily) -> impl Iterator<Item = &IpAddr> + '_ {
        self.resolver_addresses
            .iter()
            .filter(move |a| AddressFamily::of(a) == family)
    }

    /// Primary resolver of a family, if the profile defines one
    #[must_use]
    pub fn primary(&self, family: AddressFamily) -> Option<&IpAddr> {
        self.addresses_for(family).next()
    }

    /// Secondary resolver of a family, if the profile defines one
    #[must_use]
    pub fn secondary(&self, family: AddressFamily) -> Option<&IpAddr> {
        self.addresses_for(family).nth(1)
    }
}

/// The immutable table of known filter profiles.
///
/// Built once at startup. The address index maps every resolver to the
/// profile that owns it, so matching a resolver list is a lookup per token.
#[derive(Debug, Clone)]
pub struct ProfileTable {
    profiles: Vec<FilterProfile>,
    index: HashMap<IpAddr, usize>,
}

impl ProfileTable {
    /// Build a table, rejecting duplicate names and addresses shared between profiles.
    pub fn new(profiles: Vec<FilterProfile>) -> Result<Self> {
        let mut index = HashMap::new();
        let mut names: Vec<String> = Vec::with_capacity(profiles.len());

        for (pos, profile) in profiles.iter().enumerate() {
            let key = normalize_name(&profile.name);
            if names.contains(&key) {
                return Err(FilterError::Config(format!(
                    "duplicate filter profile name: {}",
                    profile.name
                )));
            }
            names.push(key);

            if profile.resolver_addresses.is_empty() {
                return Err(FilterError::Config(format!(
                    "filter profile {} has no resolver addresses",
                    profile.name
                )));
            }

            for addr in &profile.resolver_addresses {
                if let Some(&other) = index.get(addr) {
                    let other: &FilterProfile = &profiles[other];
                    return Err(FilterError::Config(format!(
                        "resolver {addr} is shared by profiles {} and {}",
                        other.name, profile.name
                    )));
                }
                index.insert(*addr, pos);
            }
        }

        Ok(Self { profiles, index })
    }

    /// The built-in provider table.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(builtin_profiles()).expect("built-in profiles have unique addresses")
    }

    /// Look up a profile by name.
    ///
    /// Case-insensitive, and `-`/`_` are ignored, so `cleanBrowsing` finds
    /// `cleanbrowsing`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FilterProfile> {
        let key = normalize_name(name);
        self.profiles.iter().find(|p| normalize_name(&p.name) == key)
    }

    /// Look up a profile by name, failing with `UnknownProfile`.
    pub fn require(&self, name: &str) -> Result<&FilterProfile> {
        self.get(name)
            .ok_or_else(|| FilterError::UnknownProfile(name.to_string()))
    }

    /// All profiles in table order
    pub fn iter(&self) -> impl Iterator<Item = &FilterProfile> {
        self.profiles.iter()
    }

    /// Number of profiles
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// True if the table has no profiles
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profile owning the given resolver address
    #[must_use]
    pub fn profile_for(&self, addr: &IpAddr) -> Option<&FilterProfile> {
        self.index.get(addr).map(|&i| &self.profiles[i])
    }

    /// Match a list of configured resolvers against the table.
    ///
    /// The first server (in configured order) that belongs to a profile wins.
    #[must_use]
    pub fn match_servers(&self, servers: &[IpAddr]) -> Option<&FilterProfile> {
        servers.iter().find_map(|s| self.profile_for(s))
    }

    /// Match raw tool output against the table.
    #[must_use]
    pub fn match_output(&self, raw: &str) -> Option<&FilterProfile> {
        self.match_servers(&extract_servers(raw))
    }
}

/// Pull resolver addresses out of raw tool output.
///
/// The output is split on line boundaries and trimmed; every token that
/// parses as an IP address is kept, in order, without duplicates. Zone
/// suffixes (`fe80::1%en0`) are stripped before parsing.
#[must_use]
pub fn extract_servers(raw: &str) -> Vec<IpAddr> {
    let mut servers = Vec::new();

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let tokens = line.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '"' | '\'' | '{' | '}' | '(' | ')'));
        for token in tokens {
            let token = token.split('%').next().unwrap_or(token);
            // "2a0d:2a00:1::" is valid as-is; only strip punctuation if it is not
            let parsed = token
                .parse::<IpAddr>()
                .or_else(|_| token.trim_end_matches(['.', ':']).parse::<IpAddr>());
            if let Ok(addr) = parsed {
                if !servers.contains(&addr) {
                    servers.push(addr);
                }
            }
        }
    }

    servers
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn builtin_profiles() -> Vec<FilterProfile> {
    vec![
        FilterProfile {
            name: String::from(DEFAULT_PROFILE),
            description: String::from("OpenDNS FamilyShield: adult content and malware"),
            resolver_addresses: vec![
                IpAddr::V4(Ipv4Addr::new(208, 67, 222, 222)),
                IpAddr::V4(Ipv4Addr::new(208, 67, 220, 220)),
                IpAddr::V6(Ipv6Addr::new(0x2620, 0x119, 0x35, 0, 0, 0, 0, 0x123)),
                IpAddr::V6(Ipv6Addr::new(0x2620, 0x119, 0x53, 0, 0, 0, 0, 0x123)),
            ],
        },
        FilterProfile {
            name: String::from("cleanbrowsing"),
            description: String::from("CleanBrowsing Family: strongest adult content filtering"),
            resolver_addresses: vec![
                IpAddr::V4(Ipv4Addr::new(185, 228, 168, 168)),
                IpAddr::V4(Ipv4Addr::new(185, 228, 169, 168)),
                IpAddr::V6(Ipv6Addr::new(0x2a0d, 0x2a00, 0x1, 0, 0, 0, 0, 0)),
                IpAddr::V6(Ipv6Addr::new(0x2a0d, 0x2a00, 0x2, 0, 0, 0, 0, 0)),
            ],
        },
        FilterProfile {
            name: String::from("cloudflare-family"),
            description: String::from("Cloudflare for Families: malware and adult content"),
            resolver_addresses: vec![
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 3)),
                IpAddr::V4(Ipv4Addr::new(1, 0, 0, 3)),
                IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1113)),
                IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1003)),
            ],
        },
    ]
}
