//! Rules which re-query every server in a particular way: over TCP,
//! with EDNS0, or over IPv6.

use dns_types::protocol::types::*;

use super::{CheckContext, CheckResult, Failure, Rule};
use crate::registry::Response;
use crate::transport::{AddressFamily, HostOrIP, QueryOptions, TransportError};

/// Why a re-query didn't count as an answer.
fn describe(outcome: &Result<Response, TransportError>) -> Option<String> {
    match outcome {
        Ok(response) if response.is_success() => None,
        Ok(response) => Some(format!("answered with {}", response.rcode())),
        Err(error) => Some(error.to_string()),
    }
}

/// Every responsive server answers the SOA query over TCP too.
pub async fn check_tcp(ctx: &CheckContext<'_>) -> CheckResult {
    let question = Question::internet(ctx.zone.clone(), RecordType::SOA);
    let total = ctx.responsive_count();

    let mut first = None;
    let mut failed = 0;
    for (name, _, soa) in ctx.responsive() {
        let outcome = ctx
            .transport
            .query(&HostOrIP::IP(soa.server), &question, QueryOptions::tcp())
            .await;
        if let Some(reason) = describe(&outcome) {
            tracing::debug!(%name, %reason, "no answer over TCP");
            failed += 1;
            first.get_or_insert((name, reason));
        }
    }

    match first {
        None => CheckResult::pass(total, "NSs answer over TCP"),
        Some((name, reason)) => Failure::critical(
            Rule::Tcp,
            Some(name),
            format!("did not answer over TCP: {reason} ({failed} of {total} NSs failed)"),
        )
        .into(),
    }
}

/// Every responsive server accepts a query with an OPT record, and
/// sends one back.
pub async fn check_edns(ctx: &CheckContext<'_>) -> CheckResult {
    let question = Question::internet(ctx.zone.clone(), RecordType::SOA);
    let options = QueryOptions::edns(ctx.config.edns_buffer_size);

    for (name, _, soa) in ctx.responsive() {
        let outcome = ctx
            .transport
            .query(&HostOrIP::IP(soa.server), &question, options)
            .await;
        let reason = match &outcome {
            Ok(response) if response.is_success() && response.message.opt().is_none() => {
                Some("answered without an OPT record".to_string())
            }
            _ => describe(&outcome),
        };
        if let Some(reason) = reason {
            return Failure::critical(
                Rule::Edns,
                Some(name),
                format!("does not support EDNS0: {reason}"),
            )
            .into();
        }
    }

    CheckResult::pass(ctx.responsive_count(), "NSs support EDNS0")
}

/// Every IPv6 address of every responsive server answers the SOA
/// query.  Servers with no IPv6 address are not counted.
pub async fn check_ipv6(ctx: &CheckContext<'_>) -> CheckResult {
    let question = Question::internet(ctx.zone.clone(), RecordType::SOA);

    let mut checked = 0;
    for (name, _, _) in ctx.responsive() {
        let addresses = ctx.transport.resolve_addresses(name, AddressFamily::V6).await;
        if addresses.is_empty() {
            tracing::debug!(%name, "no IPv6 address");
            continue;
        }
        checked += 1;

        for address in addresses {
            let outcome = ctx
                .transport
                .query(&HostOrIP::IP(address), &question, QueryOptions::default())
                .await;
            if let Some(reason) = describe(&outcome) {
                return Failure::critical(
                    Rule::Ipv6,
                    Some(name),
                    format!("did not answer over IPv6 at {address}: {reason}"),
                )
                .into();
            }
        }
    }

    CheckResult::pass(checked, "NSs answer over IPv6")
}
