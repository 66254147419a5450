//! Per-nameserver query results, accumulated over the run.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use dns_types::protocol::types::*;

/// The queries sent to each nameserver in the direct query phase.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryKind {
    Soa,
    Ns,
    Record(RecordType),
}

/// A validated response, and the address which sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub server: IpAddr,
    pub message: Message,
}

impl Response {
    pub fn rcode(&self) -> Rcode {
        self.message.header.rcode
    }

    pub fn is_success(&self) -> bool {
        self.rcode() == Rcode::NoError
    }

    pub fn is_authoritative(&self) -> bool {
        self.message.header.is_authoritative
    }

    /// Targets of the NS records for `zone` in the answer and
    /// authority sections.
    pub fn ns_names(&self, zone: &DomainName) -> BTreeSet<DomainName> {
        let mut names = ns_names_in(&self.message.answers, zone);
        names.extend(ns_names_in(&self.message.authority, zone));
        names
    }

    /// The serial of the first SOA record in the answer section.
    pub fn soa_serial(&self) -> Option<u32> {
        self.message
            .answers
            .iter()
            .find_map(|rr| match &rr.rtype_with_data {
                RecordTypeWithData::SOA { serial, .. } => Some(*serial),
                _ => None,
            })
    }
}

/// Targets of the NS records owned by `zone`.
pub fn ns_names_in(rrs: &[ResourceRecord], zone: &DomainName) -> BTreeSet<DomainName> {
    rrs.iter()
        .filter(|rr| rr.name == *zone)
        .filter_map(|rr| match &rr.rtype_with_data {
            RecordTypeWithData::NS { nsdname } => Some(nsdname.clone()),
            _ => None,
        })
        .collect()
}

/// What is known about one nameserver.  A `None` response means the
/// query got no usable reply at all, which is different from a reply
/// with an error rcode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameserverRecord {
    pub queried: bool,
    pub responses: BTreeMap<QueryKind, Option<Response>>,
}

impl NameserverRecord {
    pub fn response(&self, kind: QueryKind) -> Option<&Response> {
        self.responses.get(&kind).and_then(Option::as_ref)
    }

    pub fn soa(&self) -> Option<&Response> {
        self.response(QueryKind::Soa)
    }

    /// The SOA response, if there is one and it has a success rcode.
    pub fn successful_soa(&self) -> Option<&Response> {
        self.soa().filter(|response| response.is_success())
    }
}

/// Every nameserver seen so far, keyed (and iterated) by name.
/// Entries are only ever added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: BTreeMap<DomainName, NameserverRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unqueried entry.  Returns `false` if the name was
    /// already known.
    pub fn insert_placeholder(&mut self, name: DomainName) -> bool {
        if self.entries.contains_key(&name) {
            false
        } else {
            self.entries.insert(name, NameserverRecord::default());
            true
        }
    }

    /// Store the results of querying a nameserver and mark it as
    /// queried.
    pub fn record(&mut self, name: DomainName, responses: BTreeMap<QueryKind, Option<Response>>) {
        let entry = self.entries.entry(name).or_default();
        entry.responses.extend(responses);
        entry.queried = true;
    }

    pub fn unqueried(&self) -> Vec<DomainName> {
        self.entries
            .iter()
            .filter(|(_, record)| !record.queried)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn get(&self, name: &DomainName) -> Option<&NameserverRecord> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &DomainName) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &DomainName> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DomainName, &NameserverRecord)> {
        self.entries.iter()
    }

    /// Nameservers with a successful SOA response, which is what
    /// every check other than "responding" looks at.
    pub fn responsive(&self) -> impl Iterator<Item = (&DomainName, &NameserverRecord, &Response)> {
        self.entries
            .iter()
            .filter_map(|(name, record)| record.successful_soa().map(|soa| (name, record, soa)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<DomainName> for Registry {
    fn from_iter<I: IntoIterator<Item = DomainName>>(names: I) -> Self {
        let mut registry = Self::new();
        for name in names {
            registry.insert_placeholder(name);
        }
        registry
    }
}

/// The delegation as the parent zone described it, captured before
/// any nameserver of the zone itself was asked.  There is no way to
/// change it after the fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentView {
    names: BTreeSet<DomainName>,
}

impl ParentView {
    pub fn snapshot(registry: &Registry) -> Self {
        Self {
            names: registry.names().cloned().collect(),
        }
    }

    pub fn names(&self) -> &BTreeSet<DomainName> {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
