use std::net::Ipv4Addr;

use dns_types::protocol::types::{DomainName, RecordType};

use crate::checks::{Rule, RuleSet};

/// Root servers to start discovery from.
pub const ROOT_HINTS: [&str; 13] = [
    "a.root-servers.net.",
    "b.root-servers.net.",
    "c.root-servers.net.",
    "d.root-servers.net.",
    "e.root-servers.net.",
    "f.root-servers.net.",
    "g.root-servers.net.",
    "h.root-servers.net.",
    "i.root-servers.net.",
    "j.root-servers.net.",
    "k.root-servers.net.",
    "l.root-servers.net.",
    "m.root-servers.net.",
];

/// Maximum number of referrals followed before discovery gives up.
/// Delegation chains in the wild are a handful of levels deep.
pub const MAX_REFERRAL_ROUNDS: usize = 20;

/// A domain which is never delegated, so any answer for a name under
/// it comes from a server willing to recurse.
pub const DEFAULT_OPEN_RESOLVER_DOMAIN: &str = "openresolvertest.net.";

/// The address an open resolver's answer for the probe name resolves
/// to.
pub const DEFAULT_OPEN_RESOLVER_ADDRESS: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);

/// RFC 9715 recommends this as a payload size which avoids
/// fragmentation.
pub const DEFAULT_EDNS_BUFFER_SIZE: u16 = 1232;

/// Everything which changes what a run checks.  Transport settings
/// (timeouts, retries) belong to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckConfig {
    pub rules: RuleSet,
    pub root_hints: Vec<DomainName>,
    pub max_referral_rounds: usize,
    /// Also query every nameserver for this type at the zone apex,
    /// and compare the answers.
    pub record_type: Option<RecordType>,
    pub open_resolver_domain: DomainName,
    pub open_resolver_address: Ipv4Addr,
    pub edns_buffer_size: u16,
    /// Annotate failures with the server's `hostname.bind` /
    /// `id.server` identity.
    pub identify: bool,
}

impl CheckConfig {
    /// The configured rules, plus record agreement if a record type
    /// was given.
    pub fn effective_rules(&self) -> RuleSet {
        let mut rules = self.rules.clone();
        if self.record_type.is_some() {
            rules.insert(Rule::Records);
        }
        rules
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            rules: RuleSet::default(),
            root_hints: default_root_hints(),
            max_referral_rounds: MAX_REFERRAL_ROUNDS,
            record_type: None,
            open_resolver_domain: DomainName::from_dotted_string(DEFAULT_OPEN_RESOLVER_DOMAIN)
                .unwrap_or_else(DomainName::root_domain),
            open_resolver_address: DEFAULT_OPEN_RESOLVER_ADDRESS,
            edns_buffer_size: DEFAULT_EDNS_BUFFER_SIZE,
            identify: false,
        }
    }
}

pub fn default_root_hints() -> Vec<DomainName> {
    ROOT_HINTS
        .iter()
        .filter_map(|name| DomainName::from_dotted_string(name))
        .collect()
}
