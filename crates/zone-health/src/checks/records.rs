use dns_types::protocol::types::*;

use super::{CheckContext, CheckResult, Failure, Rule};
use crate::registry::{QueryKind, Response};

/// The apex RRset of one type, ignoring order and TTLs.
fn rrset(zone: &DomainName, rtype: RecordType, response: &Response) -> Vec<RecordTypeWithData> {
    let mut rdata = response
        .message
        .answers
        .iter()
        .filter(|rr| rr.name == *zone && rr.rtype_with_data.rtype() == rtype)
        .map(|rr| rr.rtype_with_data.clone())
        .collect::<Vec<_>>();
    rdata.sort();
    rdata.dedup();
    rdata
}

/// Every responsive server serves the same apex RRset of the
/// configured type as the first one does.
pub fn check_records(ctx: &CheckContext<'_>) -> CheckResult {
    let Some(rtype) = ctx.config.record_type else {
        return CheckResult::Skipped {
            reason: "no record type configured".to_string(),
        };
    };

    let mut reference: Option<(&DomainName, Vec<RecordTypeWithData>)> = None;
    for (name, record, _) in ctx.responsive() {
        let Some(response) = record.response(QueryKind::Record(rtype)) else {
            return Failure::critical(
                Rule::Records,
                Some(name),
                format!("did not answer {rtype} query"),
            )
            .into();
        };
        if !response.is_success() {
            return Failure::critical(
                Rule::Records,
                Some(name),
                format!("answered {rtype} query with {}", response.rcode()),
            )
            .into();
        }

        let rdata = rrset(ctx.zone, rtype, response);
        match &reference {
            None => reference = Some((name, rdata)),
            Some((first, expected)) if *expected != rdata => {
                return Failure::critical(
                    Rule::Records,
                    Some(name),
                    format!("serves a different {rtype} RRset from {first}"),
                )
                .into();
            }
            Some(_) => (),
        }
    }

    CheckResult::pass(ctx.responsive_count(), format!("NSs serve identical {rtype} RRset"))
}
