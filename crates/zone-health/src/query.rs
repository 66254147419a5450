//! The direct query phase: ask every known nameserver about the zone,
//! and keep asking newly mentioned nameservers until there are none
//! left.

use std::collections::BTreeMap;
use tracing::Instrument;

use dns_types::protocol::types::*;

use crate::registry::{QueryKind, Registry, Response};
use crate::transport::{HostOrIP, QueryOptions, Transport};

/// Query every unqueried nameserver in the registry, adding any new
/// nameservers they mention, until a pass finds nothing new.
///
/// Each nameserver gets a SOA query, an NS query if the SOA answer
/// didn't carry the NS RRset in its authority section, and a query
/// for `record_type` if one is given.  A query which gets no usable
/// response is stored as `None`.
pub async fn query_nameservers(
    transport: &dyn Transport,
    zone: &DomainName,
    record_type: Option<RecordType>,
    mut registry: Registry,
) -> Registry {
    let mut pass = 0;
    loop {
        let unqueried = registry.unqueried();
        if unqueried.is_empty() {
            break;
        }
        pass += 1;
        tracing::debug!(%pass, nameservers = %unqueried.len(), "querying nameservers");

        for name in unqueried {
            let responses = query_one(transport, zone, record_type, &name)
                .instrument(tracing::error_span!("query_nameserver", nameserver = %name))
                .await;

            let mentioned = responses
                .values()
                .flatten()
                .flat_map(|response| response.ns_names(zone))
                .collect::<Vec<_>>();

            registry.record(name, responses);
            for new_name in mentioned {
                if registry.insert_placeholder(new_name.clone()) {
                    tracing::debug!(nameserver = %new_name, "new nameserver");
                }
            }
        }
    }

    registry
}

async fn query_one(
    transport: &dyn Transport,
    zone: &DomainName,
    record_type: Option<RecordType>,
    name: &DomainName,
) -> BTreeMap<QueryKind, Option<Response>> {
    let server = HostOrIP::Host(name.clone());
    let mut responses = BTreeMap::new();

    let soa = ask(transport, &server, zone, RecordType::SOA).await;
    let needs_ns = soa
        .as_ref()
        .is_some_and(|response| response.message.authority.is_empty());
    responses.insert(QueryKind::Soa, soa);

    if needs_ns {
        responses.insert(QueryKind::Ns, ask(transport, &server, zone, RecordType::NS).await);
    }
    if let Some(rtype) = record_type {
        responses.insert(QueryKind::Record(rtype), ask(transport, &server, zone, rtype).await);
    }

    responses
}

async fn ask(
    transport: &dyn Transport,
    server: &HostOrIP,
    zone: &DomainName,
    rtype: RecordType,
) -> Option<Response> {
    let question = Question::internet(zone.clone(), rtype);
    match transport.query(server, &question, QueryOptions::default()).await {
        Ok(response) => Some(response),
        Err(error) => {
            tracing::debug!(%question, %error, "query failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use dns_types::protocol::types::test_util::*;

    use super::*;
    use crate::test_util::*;

    #[tokio::test]
    async fn queries_every_nameserver_once() {
        let network = FakeNetwork::new("example.com.", 3);
        let transport = network.transport();
        let registry: Registry = network.parent_ns.iter().cloned().collect();

        let registry = query_nameservers(&transport, &network.zone, None, registry).await;

        assert!(registry.unqueried().is_empty());
        for name in registry.names() {
            let soa_queries = transport
                .queries_to(name)
                .into_iter()
                .filter(|(question, _)| question.qtype == QueryType::Record(RecordType::SOA))
                .count();
            assert_eq!(1, soa_queries, "{name}");
        }
    }

    #[tokio::test]
    async fn ns_query_only_without_authority() {
        let mut network = FakeNetwork::new("example.com.", 2);
        network.server_mut("ns2.example.com.").attach_authority = false;
        let registry: Registry = network.parent_ns.iter().cloned().collect();

        let registry = query_nameservers(&network.transport(), &network.zone, None, registry).await;

        let ns1 = registry.get(&domain("ns1.example.com.")).unwrap();
        let ns2 = registry.get(&domain("ns2.example.com.")).unwrap();
        assert!(!ns1.responses.contains_key(&QueryKind::Ns));
        assert!(ns2.response(QueryKind::Ns).is_some());
    }

    #[tokio::test]
    async fn reaches_a_fixed_point() {
        // the parent only knows ns1, which mentions ns2, which
        // mentions ns3
        let mut network = FakeNetwork::new("example.com.", 3);
        network.parent_ns = vec![domain("ns1.example.com.")];
        network.server_mut("ns1.example.com.").advertises =
            vec![domain("ns1.example.com."), domain("ns2.example.com.")];
        network.server_mut("ns2.example.com.").advertises =
            vec![domain("ns2.example.com."), domain("ns3.example.com.")];
        network.server_mut("ns3.example.com.").advertises = vec![domain("ns3.example.com.")];
        let registry: Registry = network.parent_ns.iter().cloned().collect();

        let registry = query_nameservers(&network.transport(), &network.zone, None, registry).await;

        assert_eq!(
            vec![
                domain("ns1.example.com."),
                domain("ns2.example.com."),
                domain("ns3.example.com."),
            ],
            registry.names().cloned().collect::<Vec<_>>()
        );
        assert!(registry.unqueried().is_empty());
        assert_eq!(3, registry.responsive().count());
    }

    #[tokio::test]
    async fn failures_are_recorded_as_none() {
        let mut network = FakeNetwork::new("example.com.", 2);
        network.server_mut("ns2.example.com.").responds = false;
        let registry: Registry = network.parent_ns.iter().cloned().collect();

        let registry = query_nameservers(&network.transport(), &network.zone, None, registry).await;

        let ns2 = registry.get(&domain("ns2.example.com.")).unwrap();
        assert!(ns2.queried);
        assert_eq!(Some(&None), ns2.responses.get(&QueryKind::Soa));
    }

    #[tokio::test]
    async fn unresolvable_names_are_recorded_as_none() {
        let mut network = FakeNetwork::new("example.com.", 1);
        network.server_mut("ns1.example.com.").advertises =
            vec![domain("ns1.example.com."), domain("gone.example.com.")];
        let registry: Registry = network.parent_ns.iter().cloned().collect();

        let registry = query_nameservers(&network.transport(), &network.zone, None, registry).await;

        let gone = registry.get(&domain("gone.example.com.")).unwrap();
        assert!(gone.queried);
        assert_eq!(None, gone.soa());
    }

    #[tokio::test]
    async fn record_type_is_queried_too() {
        let network = FakeNetwork::new("example.com.", 1);
        let registry: Registry = network.parent_ns.iter().cloned().collect();

        let registry = query_nameservers(
            &network.transport(),
            &network.zone,
            Some(RecordType::MX),
            registry,
        )
        .await;

        let ns1 = registry.get(&domain("ns1.example.com.")).unwrap();
        assert!(ns1.response(QueryKind::Record(RecordType::MX)).is_some());
    }
}
