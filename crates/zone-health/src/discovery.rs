//! Finding the nameservers the parent zone delegates to, by walking
//! down from the root the way a resolver would.

use rand::seq::SliceRandom;
use std::net::IpAddr;
use thiserror::Error;
use tracing::Instrument;

use dns_types::protocol::types::*;

use crate::registry::{Registry, Response};
use crate::transport::{HostOrIP, QueryOptions, Transport};

/// The outcome of a successful walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// One unqueried entry per nameserver the parent delegates to.
    pub registry: Registry,
    /// How many referral rounds it took to get there.
    pub rounds: usize,
}

/// Why the walk failed.  Any of these ends the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("no nameserver responded to a query for {zone}")]
    NoSeedResponse { zone: DomainName },

    #[error("{server} answered a query for {zone} with {rcode}")]
    BadStatus {
        zone: DomainName,
        server: IpAddr,
        rcode: Rcode,
    },

    #[error("{server} gave no referral for {zone}")]
    NoReferral { zone: DomainName, server: IpAddr },

    #[error("gave up finding nameservers for {zone} after {rounds} referrals")]
    ReferralLoop { zone: DomainName, rounds: usize },
}

/// Walk down from the root hints to the nameservers of `zone`.
///
/// Each round sends a non-recursive SOA query for the zone to the
/// current candidates, in order, until one answers.  The NS records in
/// the authority section of that answer are the next round's
/// candidates, unless they belong to the zone itself, in which case
/// they are what we were looking for.
///
/// # Errors
///
/// See `DiscoveryError`.
pub async fn discover(
    transport: &dyn Transport,
    zone: &DomainName,
    root_hints: &[DomainName],
    max_rounds: usize,
) -> Result<Discovery, DiscoveryError> {
    let mut candidates = root_hints.to_vec();
    let question = Question::internet(zone.clone(), RecordType::SOA);

    for round in 1..=max_rounds {
        candidates.shuffle(&mut rand::thread_rng());
        tracing::debug!(%round, candidates = %candidates.len(), "referral round");

        let Some(response) = first_response(transport, &candidates, &question).await else {
            return Err(DiscoveryError::NoSeedResponse { zone: zone.clone() });
        };
        if !response.is_success() {
            return Err(DiscoveryError::BadStatus {
                zone: zone.clone(),
                server: response.server,
                rcode: response.rcode(),
            });
        }

        let mut referral = Vec::new();
        let mut found = Vec::new();
        for rr in &response.message.authority {
            if let RecordTypeWithData::NS { nsdname } = &rr.rtype_with_data {
                if rr.name == *zone {
                    found.push(nsdname.clone());
                }
                if !referral.contains(nsdname) {
                    referral.push(nsdname.clone());
                }
            }
        }

        // a server authoritative for both the parent and the zone may
        // answer without an authority section
        if found.is_empty() && has_apex_soa(zone, &response) {
            found = apex_ns(transport, zone, response.server).await;
        }

        if !found.is_empty() {
            tracing::debug!(%round, nameservers = %found.len(), "found delegation");
            return Ok(Discovery {
                registry: found.into_iter().collect(),
                rounds: round,
            });
        }
        if referral.is_empty() {
            return Err(DiscoveryError::NoReferral {
                zone: zone.clone(),
                server: response.server,
            });
        }

        candidates = referral;
    }

    Err(DiscoveryError::ReferralLoop {
        zone: zone.clone(),
        rounds: max_rounds,
    })
}

/// The first reply from any of the candidates.  Each candidate is
/// resolved and each of its addresses tried by the transport.
async fn first_response(
    transport: &dyn Transport,
    candidates: &[DomainName],
    question: &Question,
) -> Option<Response> {
    for candidate in candidates {
        match transport
            .query(&HostOrIP::Host(candidate.clone()), question, QueryOptions::default())
            .instrument(tracing::error_span!("query_nameserver", %candidate))
            .await
        {
            Ok(response) => return Some(response),
            Err(error) => tracing::debug!(%candidate, %error, "no response"),
        }
    }
    None
}

fn has_apex_soa(zone: &DomainName, response: &Response) -> bool {
    response
        .message
        .answers
        .iter()
        .any(|rr| rr.name == *zone && rr.rtype_with_data.rtype() == RecordType::SOA)
}

async fn apex_ns(transport: &dyn Transport, zone: &DomainName, server: IpAddr) -> Vec<DomainName> {
    let question = Question::internet(zone.clone(), RecordType::NS);
    match transport
        .query(&HostOrIP::IP(server), &question, QueryOptions::default())
        .await
    {
        Ok(response) if response.is_success() => response.ns_names(zone).into_iter().collect(),
        Ok(_) | Err(_) => Vec::new(),
    }
}
