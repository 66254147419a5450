//! Asking a nameserver what it calls itself, so a failure report can
//! say which box behind an anycast address misbehaved.

use std::collections::BTreeMap;

use dns_types::protocol::types::*;

use crate::checks::{CheckResult, Rule};
use crate::registry::Registry;
use crate::transport::{HostOrIP, QueryOptions, Transport};

/// Names a server may answer a CH TXT query for with its identity,
/// most widely supported first.
pub const IDENTITY_NAMES: [&str; 2] = ["hostname.bind.", "id.server."];

/// Fill in the `identity` of every failure which names a nameserver.
/// Each nameserver is asked at most once.
pub async fn annotate(
    transport: &dyn Transport,
    registry: &Registry,
    outcomes: &mut [(Rule, CheckResult)],
) {
    let mut known: BTreeMap<DomainName, Option<String>> = BTreeMap::new();

    for (_, outcome) in outcomes.iter_mut() {
        let CheckResult::Fail(failure) = outcome else {
            continue;
        };
        let Some(name) = &failure.nameserver else {
            continue;
        };

        if !known.contains_key(name) {
            let server = registry
                .get(name)
                .and_then(|record| record.soa())
                .map_or_else(|| HostOrIP::Host(name.clone()), |soa| HostOrIP::IP(soa.server));
            let identity = identify(transport, &server).await;
            tracing::debug!(nameserver = %name, ?identity, "identified");
            known.insert(name.clone(), identity);
        }
        failure.identity = known.get(name).cloned().flatten();
    }
}

/// The first character-string of the server's answer to the first
/// identity query it answers.
pub async fn identify(transport: &dyn Transport, server: &HostOrIP) -> Option<String> {
    for name in IDENTITY_NAMES {
        let Some(name) = DomainName::from_dotted_string(name) else {
            continue;
        };
        let question = Question {
            name,
            qtype: QueryType::Record(RecordType::TXT),
            qclass: QueryClass::Record(RecordClass::CH),
        };

        match transport.query(server, &question, QueryOptions::default()).await {
            Ok(response) if response.is_success() => {
                let identity = response
                    .message
                    .answers
                    .iter()
                    .find_map(|rr| match &rr.rtype_with_data {
                        RecordTypeWithData::TXT { octets } => first_string(octets),
                        _ => None,
                    });
                if identity.is_some() {
                    return identity;
                }
            }
            Ok(response) => tracing::trace!(%question, rcode = %response.rcode(), "no identity"),
            Err(error) => tracing::trace!(%question, %error, "no identity"),
        }
    }

    None
}

fn first_string(octets: &[u8]) -> Option<String> {
    let (len, rest) = octets.split_first()?;
    let string = rest.get(..usize::from(*len))?;
    Some(String::from_utf8_lossy(string).into_owned())
}
