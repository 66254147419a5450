use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::IpAddr;

use dns_types::protocol::types::*;

use super::{CheckContext, CheckResult, Failure, Rule};
use crate::transport::{HostOrIP, QueryOptions};

const PROBE_LABEL_LEN: usize = 12;

/// A name nobody has asked for before, so the answer can't come from
/// a cache.
fn probe_name(domain: &DomainName) -> Option<DomainName> {
    let octets = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PROBE_LABEL_LEN)
        .collect::<Vec<u8>>();
    let label = Label::try_from(octets.as_slice()).ok()?;
    domain.prepend(label)
}

/// No server answers a recursive query for a name under the probe
/// domain with the address only a recursive resolution would find.
pub async fn check_open_resolver(ctx: &CheckContext<'_>) -> CheckResult {
    let sentinel = IpAddr::V4(ctx.config.open_resolver_address);

    for (name, _, soa) in ctx.responsive() {
        let Some(probe) = probe_name(&ctx.config.open_resolver_domain) else {
            return CheckResult::Skipped {
                reason: format!(
                    "open-resolver check skipped (cannot build a probe name under {})",
                    ctx.config.open_resolver_domain
                ),
            };
        };
        let question = Question::internet(probe, RecordType::A);

        let response = match ctx
            .transport
            .query(&HostOrIP::IP(soa.server), &question, QueryOptions::recursive())
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(%name, %error, "open resolver probe got no answer");
                continue;
            }
        };

        let recursed = response.message.answers.iter().any(|rr| match rr.rtype_with_data {
            RecordTypeWithData::A { address } => IpAddr::V4(address) == sentinel,
            _ => false,
        });
        if recursed {
            return Failure::critical(
                Rule::OpenResolver,
                Some(name),
                format!("is an open resolver ({} resolved to {sentinel})", question.name),
            )
            .into();
        }
    }

    CheckResult::pass(ctx.responsive_count(), "NSs are NOT open resolvers")
}
