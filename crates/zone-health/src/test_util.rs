//! A fake DNS hierarchy for tests: delegating servers from the root
//! down to the zone's parent, and the zone's own nameservers, each of
//! which can be made to misbehave in one particular way.

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Mutex;

use dns_types::protocol::types::test_util::*;
use dns_types::protocol::types::*;

use crate::checks::{run_battery, CheckContext, CheckResult, Rule, RuleSet};
use crate::config::CheckConfig;
use crate::discovery::discover;
use crate::query::query_nameservers;
use crate::registry::{ParentView, Registry, Response};
use crate::transport::{AddressFamily, HostOrIP, QueryOptions, Transport, TransportError};

/// A fixed "current time" for everything which cares.
pub const NOW: u64 = 1_760_000_000;

#[derive(Debug, Clone)]
pub struct FakeNetwork {
    pub zone: DomainName,
    /// Root first, the zone's parent last.
    pub delegations: Vec<FakeDelegation>,
    /// What the parent zone delegates to.
    pub parent_ns: Vec<DomainName>,
    pub servers: Vec<FakeServer>,
    pub config: CheckConfig,
    pub now: u64,
}

/// A server for some ancestor of the zone, which only ever refers
/// queries on.
#[derive(Debug, Clone)]
pub struct FakeDelegation {
    pub name: DomainName,
    pub address: IpAddr,
    /// The zone this server is authoritative for.
    pub zone: DomainName,
    pub refers_to: DomainName,
    /// Ignored when `refers_to` is the zone: the network's
    /// `parent_ns` is used instead.
    pub targets: Vec<DomainName>,
    pub extra_authority: Vec<ResourceRecord>,
    pub responds: bool,
    pub rcode: Rcode,
}

/// One of the zone's nameservers.  The defaults describe a healthy
/// server.
#[derive(Debug, Clone)]
pub struct FakeServer {
    pub name: DomainName,
    pub v4: IpAddr,
    pub v6: Option<IpAddr>,
    pub responds: bool,
    pub rcode: Rcode,
    pub authoritative: bool,
    /// Answers with no records at all.
    pub lame: bool,
    pub serial: u32,
    pub advertises: Vec<DomainName>,
    /// Put the NS RRset in the authority section of SOA answers.
    pub attach_authority: bool,
    pub tcp: bool,
    pub edns: bool,
    /// Accepts EDNS0 queries but leaves the OPT record out of the
    /// reply when false.
    pub echoes_opt: bool,
    pub ipv6_responds: bool,
    pub open_resolver: bool,
    pub recursion_times_out: bool,
    /// Offset of the server's clock from `NOW`, or `None` if it
    /// doesn't sign replies.
    pub clock_offset: Option<i64>,
    /// Extra apex records, served for queries of their type.
    pub records: Vec<ResourceRecord>,
    pub hostname: Option<String>,
    /// Answers `hostname.bind.` as well as `id.server.`.
    pub hostname_bind: bool,
}

impl FakeNetwork {
    /// A zone with `count` healthy nameservers `ns1.<zone>` ...
    pub fn new(zone: &str, count: usize) -> Self {
        let zone = domain(zone);

        let mut chain = if zone.is_root() {
            vec![DomainName::root_domain()]
        } else {
            (1..zone.labels.len())
                .rev()
                .map(|start| DomainName::from_labels(zone.labels[start..].to_vec()).unwrap())
                .collect::<Vec<_>>()
        };
        chain.push(zone.clone());
        let mut delegations = chain
            .windows(2)
            .enumerate()
            .map(|(i, pair)| FakeDelegation::new(i, &pair[0], &pair[1]))
            .collect::<Vec<_>>();
        for i in 1..delegations.len() {
            delegations[i - 1].targets = vec![delegations[i].name.clone()];
        }

        let names = (1..=count)
            .map(|i| {
                if zone.is_root() {
                    domain(&format!("ns{i}."))
                } else {
                    domain(&format!("ns{i}.{zone}"))
                }
            })
            .collect::<Vec<_>>();
        let servers = names
            .iter()
            .enumerate()
            .map(|(i, name)| FakeServer::new(name.clone(), i + 1, names.clone()))
            .collect();

        Self {
            zone,
            delegations,
            parent_ns: names,
            servers,
            config: CheckConfig {
                root_hints: vec![domain("a.root-servers.net.")],
                ..CheckConfig::default()
            },
            now: NOW,
        }
    }

    pub fn server_mut(&mut self, name: &str) -> &mut FakeServer {
        let name = domain(name);
        self.servers
            .iter_mut()
            .find(|server| server.name == name)
            .unwrap()
    }

    /// The delegating server for the given ancestor zone.
    pub fn delegation_mut(&mut self, zone: &str) -> &mut FakeDelegation {
        let zone = domain(zone);
        self.delegations
            .iter_mut()
            .find(|delegation| delegation.zone == zone)
            .unwrap()
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            network: self.clone(),
            log: Mutex::new(Vec::new()),
        }
    }

    /// The registry after discovery and the direct query phase.
    pub async fn queried_registry(&self) -> Registry {
        let transport = self.transport();
        let discovery = discover(
            &transport,
            &self.zone,
            &self.config.root_hints,
            self.config.max_referral_rounds,
        )
        .await
        .unwrap();
        query_nameservers(&transport, &self.zone, self.config.record_type, discovery.registry).await
    }

    fn addresses(&self, name: &DomainName) -> Vec<IpAddr> {
        let mut addresses = Vec::new();
        for delegation in &self.delegations {
            if delegation.name == *name {
                addresses.push(delegation.address);
            }
        }
        for server in &self.servers {
            if server.name == *name {
                addresses.push(server.v4);
                addresses.extend(server.v6);
            }
        }
        addresses
    }

    fn answer(&self, address: IpAddr, request: &Message, options: QueryOptions) -> Option<Message> {
        if let Some(delegation) = self.delegations.iter().find(|d| d.address == address) {
            let targets = if delegation.refers_to == self.zone {
                &self.parent_ns
            } else {
                &delegation.targets
            };
            return delegation.answer(request, targets);
        }
        self.servers
            .iter()
            .find(|server| server.v4 == address || server.v6 == Some(address))
            .and_then(|server| server.answer(self, address, request, options))
    }
}

impl FakeDelegation {
    fn new(index: usize, zone: &DomainName, refers_to: &DomainName) -> Self {
        let (name, address) = if zone.is_root() {
            ("a.root-servers.net.".to_string(), Ipv4Addr::new(198, 41, 0, 4))
        } else if zone.to_dotted_string() == "com." {
            ("a.gtld-servers.net.".to_string(), Ipv4Addr::new(192, 5, 6, 30))
        } else {
            (
                format!("a.nic.{zone}"),
                Ipv4Addr::new(198, 51, 100, u8::try_from(index + 1).unwrap()),
            )
        };
        Self {
            name: domain(&name),
            address: IpAddr::V4(address),
            zone: zone.clone(),
            refers_to: refers_to.clone(),
            targets: Vec::new(),
            extra_authority: Vec::new(),
            responds: true,
            rcode: Rcode::NoError,
        }
    }

    fn answer(&self, request: &Message, targets: &[DomainName]) -> Option<Message> {
        if !self.responds {
            return None;
        }

        let mut response = request.make_response();
        response.header.rcode = self.rcode;
        if self.rcode != Rcode::NoError {
            return Some(response);
        }

        if request.questions[0].name.is_subdomain_of(&self.refers_to) {
            response.authority = targets.iter().map(|target| ns(&self.refers_to, target)).collect();
        }
        response.authority.extend(self.extra_authority.iter().cloned());
        Some(response)
    }
}

impl FakeServer {
    fn new(name: DomainName, index: usize, advertises: Vec<DomainName>) -> Self {
        let octet = u8::try_from(index).unwrap();
        Self {
            name,
            v4: IpAddr::V4(Ipv4Addr::new(192, 0, 2, octet)),
            v6: Some(IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, u16::from(octet)))),
            responds: true,
            rcode: Rcode::NoError,
            authoritative: true,
            lame: false,
            serial: 2_024_010_100,
            advertises,
            attach_authority: true,
            tcp: true,
            edns: true,
            echoes_opt: true,
            ipv6_responds: true,
            open_resolver: false,
            recursion_times_out: false,
            clock_offset: Some(0),
            records: Vec::new(),
            hostname: None,
            hostname_bind: true,
        }
    }

    fn answer(
        &self,
        network: &FakeNetwork,
        address: IpAddr,
        request: &Message,
        options: QueryOptions,
    ) -> Option<Message> {
        if !self.responds
            || (address.is_ipv6() && !self.ipv6_responds)
            || (options.stream && !self.tcp)
        {
            return None;
        }

        let question = &request.questions[0];
        let mut response = request.make_response();

        if options.edns_buffer_size.is_some() && !self.edns {
            response.header.rcode = Rcode::FormatError;
            return Some(response);
        }

        if question.qclass == QueryClass::Record(RecordClass::CH) {
            let name = question.name.to_dotted_string();
            match &self.hostname {
                Some(hostname)
                    if name == "id.server." || (name == "hostname.bind." && self.hostname_bind) =>
                {
                    response.answers =
                        vec![txt_record(&name, RecordClass::CH, &[hostname.as_str()])];
                }
                _ => response.header.rcode = Rcode::Refused,
            }
            return Some(response);
        }

        if options.recursion_desired
            && question
                .name
                .is_subdomain_of(&network.config.open_resolver_domain)
        {
            if self.recursion_times_out {
                return None;
            }
            if self.open_resolver {
                response.header.recursion_available = true;
                response.answers = vec![ResourceRecord {
                    name: question.name.clone(),
                    rtype_with_data: RecordTypeWithData::A {
                        address: network.config.open_resolver_address,
                    },
                    rclass: RecordClass::IN,
                    ttl: 60,
                }];
            } else {
                response.header.rcode = Rcode::Refused;
            }
            return Some(response);
        }

        response.header.rcode = self.rcode;
        if self.rcode != Rcode::NoError {
            return Some(response);
        }

        response.header.is_authoritative = self.authoritative && !self.lame;
        if !self.lame {
            let zone = &network.zone;
            let ns_rrset = self.advertises.iter().map(|target| ns(zone, target));
            match question.qtype {
                QueryType::Record(RecordType::SOA) => {
                    response.answers = vec![self.soa(zone)];
                    if self.attach_authority {
                        response.authority = ns_rrset.collect();
                    }
                }
                QueryType::Record(RecordType::NS) => response.answers = ns_rrset.collect(),
                QueryType::Record(rtype) => {
                    response.answers = self
                        .records
                        .iter()
                        .filter(|rr| rr.rtype_with_data.rtype() == rtype)
                        .cloned()
                        .collect();
                }
                _ => (),
            }
        }

        if let Some(payload_size) = options.edns_buffer_size {
            if self.echoes_opt {
                response.additional.push(opt_record(payload_size));
            }
        }
        if options.signed {
            if let Some(offset) = self.clock_offset {
                response
                    .additional
                    .push(tsig_record("key.example.", network.now.saturating_add_signed(offset)));
            }
        }

        Some(response)
    }

    fn soa(&self, zone: &DomainName) -> ResourceRecord {
        ResourceRecord {
            name: zone.clone(),
            rtype_with_data: RecordTypeWithData::SOA {
                mname: self.name.clone(),
                rname: self.name.clone(),
                serial: self.serial,
                refresh: 3600,
                retry: 900,
                expire: 604_800,
                minimum: 300,
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }
}

fn ns(owner: &DomainName, target: &DomainName) -> ResourceRecord {
    ResourceRecord {
        name: owner.clone(),
        rtype_with_data: RecordTypeWithData::NS {
            nsdname: target.clone(),
        },
        rclass: RecordClass::IN,
        ttl: 300,
    }
}

/// A `Transport` over a `FakeNetwork`, which remembers every query.
#[derive(Debug)]
pub struct FakeTransport {
    pub network: FakeNetwork,
    log: Mutex<Vec<(IpAddr, Question, QueryOptions)>>,
}

impl FakeTransport {
    /// Every query sent to any address of the named server.
    pub fn queries_to(&self, name: &DomainName) -> Vec<(Question, QueryOptions)> {
        let addresses = self.network.addresses(name);
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(address, _, _)| addresses.contains(address))
            .map(|(_, question, options)| (question.clone(), *options))
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn resolve_addresses(&self, name: &DomainName, family: AddressFamily) -> Vec<IpAddr> {
        self.network
            .addresses(name)
            .into_iter()
            .filter(|address| family.matches(*address))
            .collect()
    }

    async fn query(
        &self,
        server: &HostOrIP,
        question: &Question,
        options: QueryOptions,
    ) -> Result<Response, TransportError> {
        let addresses = match server {
            HostOrIP::IP(address) => vec![*address],
            HostOrIP::Host(name) => {
                let addresses = self.network.addresses(name);
                if addresses.is_empty() {
                    return Err(TransportError::NoAddress(name.clone()));
                }
                addresses
            }
        };

        let mut request = Message::from_question(1, question.clone());
        request.header.recursion_desired = options.recursion_desired;

        for address in addresses {
            self.log
                .lock()
                .unwrap()
                .push((address, question.clone(), options));
            if let Some(message) = self.network.answer(address, &request, options) {
                return Ok(Response {
                    server: address,
                    message,
                });
            }
        }

        Err(TransportError::Timeout)
    }
}

/// Run one rule against the network, after discovery and the direct
/// query phase.
pub async fn run_rule_against(network: &FakeNetwork, rule: Rule) -> CheckResult {
    let transport = network.transport();
    let discovery = discover(
        &transport,
        &network.zone,
        &network.config.root_hints,
        network.config.max_referral_rounds,
    )
    .await
    .unwrap();
    let parent = ParentView::snapshot(&discovery.registry);
    let registry = query_nameservers(
        &transport,
        &network.zone,
        network.config.record_type,
        discovery.registry,
    )
    .await;

    let ctx = CheckContext {
        zone: &network.zone,
        registry: &registry,
        parent: &parent,
        transport: &transport,
        config: &network.config,
        now: network.now,
    };
    let rules: RuleSet = [rule].into_iter().collect();
    let (ran, result) = run_battery(&ctx, &rules).await.pop().unwrap();
    assert_eq!(rule, ran);
    result
}
