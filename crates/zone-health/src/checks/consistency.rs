use std::collections::{BTreeMap, BTreeSet};

use dns_types::protocol::types::DomainName;

use super::{join_names, CheckContext, CheckResult, Failure, Rule};
use crate::registry::{ns_names_in, NameserverRecord, QueryKind, Response};

/// The NS names a server lists for the zone: the authority section
/// of its SOA answer, plus its answer to the NS query if one was
/// sent.
fn advertised(
    zone: &DomainName,
    record: &NameserverRecord,
    soa: &Response,
) -> BTreeSet<DomainName> {
    let mut names = ns_names_in(&soa.message.authority, zone);
    if let Some(ns) = record.response(QueryKind::Ns) {
        names.extend(ns_names_in(&ns.message.answers, zone));
    }
    names
}

fn is_lame(soa: &Response) -> bool {
    soa.message.answers.is_empty()
}

/// Every non-lame server lists every nameserver we know of, less the
/// lame ones.
pub fn check_ns_consistency(ctx: &CheckContext<'_>) -> CheckResult {
    let lame = ctx
        .responsive()
        .filter(|(_, _, soa)| is_lame(soa))
        .map(|(name, _, _)| name.clone())
        .collect::<BTreeSet<_>>();
    let expected = ctx
        .registry
        .names()
        .filter(|name| !lame.contains(*name))
        .cloned()
        .collect::<BTreeSet<_>>();

    let mut checked = 0;
    let mut by_missing: BTreeMap<BTreeSet<DomainName>, Vec<DomainName>> = BTreeMap::new();
    for (name, record, soa) in ctx.responsive() {
        if is_lame(soa) {
            continue;
        }
        checked += 1;

        let advertised = advertised(ctx.zone, record, soa);
        let missing = expected
            .difference(&advertised)
            .cloned()
            .collect::<BTreeSet<_>>();
        if !missing.is_empty() {
            by_missing.entry(missing).or_default().push(name.clone());
        }
    }

    if by_missing.is_empty() {
        return CheckResult::pass(checked, "NSs have consistent NS RRset");
    }

    let groups = by_missing
        .iter()
        .map(|(missing, servers)| {
            let verb = if servers.len() == 1 { "does" } else { "do" };
            format!("{} {verb} not list {}", join_names(servers), join_names(missing))
        })
        .collect::<Vec<_>>();
    Failure::critical(
        Rule::NsConsistency,
        None,
        format!("inconsistent NS RRset: {}", groups.join("; ")),
    )
    .into()
}

/// The delegation at the parent names the same servers as the zone
/// itself does.
pub fn check_parent_consistency(ctx: &CheckContext<'_>) -> CheckResult {
    let mut in_zone = BTreeSet::new();
    for (_, record, soa) in ctx.responsive() {
        in_zone.extend(advertised(ctx.zone, record, soa));
    }
    let at_parent = ctx.parent.names();

    let parent_only = at_parent.difference(&in_zone).collect::<Vec<_>>();
    let zone_only = in_zone.difference(at_parent).collect::<Vec<_>>();

    if parent_only.is_empty() && zone_only.is_empty() {
        return CheckResult::pass(at_parent.len(), "NSs match between parent and zone");
    }

    let mut parts = Vec::with_capacity(2);
    if !parent_only.is_empty() {
        parts.push(format!("at parent only: {}", join_names(parent_only)));
    }
    if !zone_only.is_empty() {
        parts.push(format!("in zone only: {}", join_names(zone_only)));
    }
    Failure::critical(
        Rule::ParentConsistency,
        None,
        format!("parent and zone NS RRsets differ: {}", parts.join("; ")),
    )
    .into()
}
