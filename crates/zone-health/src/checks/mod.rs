//! The analysis battery: independent rules run over the registry
//! after the direct query phase.

pub mod authority;
#[cfg(feature = "clock-skew")]
pub mod clock_skew;
pub mod consistency;
pub mod open_resolver;
pub mod reachability;
pub mod records;
pub mod responding;
pub mod serial;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::Instrument;

use dns_types::protocol::types::DomainName;

use crate::config::CheckConfig;
use crate::registry::{NameserverRecord, ParentView, Registry, Response};
use crate::transport::Transport;

/// The rules, in the order they run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rule {
    Responding,
    Lame,
    NsConsistency,
    Authoritative,
    ParentConsistency,
    Serial,
    OpenResolver,
    Tcp,
    Edns,
    Ipv6,
    ClockSkew,
    Records,
}

impl Rule {
    pub const ALL: [Rule; 12] = [
        Rule::Responding,
        Rule::Lame,
        Rule::NsConsistency,
        Rule::Authoritative,
        Rule::ParentConsistency,
        Rule::Serial,
        Rule::OpenResolver,
        Rule::Tcp,
        Rule::Edns,
        Rule::Ipv6,
        Rule::ClockSkew,
        Rule::Records,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Rule::Responding => "responding",
            Rule::Lame => "lame",
            Rule::NsConsistency => "ns-consistency",
            Rule::Authoritative => "authoritative",
            Rule::ParentConsistency => "parent-consistency",
            Rule::Serial => "serial",
            Rule::OpenResolver => "open-resolver",
            Rule::Tcp => "tcp",
            Rule::Edns => "edns",
            Rule::Ipv6 => "ipv6",
            Rule::ClockSkew => "clock-skew",
            Rule::Records => "records",
        }
    }

    /// Whether the rule runs when none are explicitly asked for.
    pub fn on_by_default(self) -> bool {
        !matches!(
            self,
            Rule::Serial | Rule::Ipv6 | Rule::ClockSkew | Rule::Records
        )
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Rule {
    type Err = UnknownRule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rule::ALL
            .into_iter()
            .find(|rule| rule.id() == s)
            .ok_or_else(|| UnknownRule(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rule '{0}'")]
pub struct UnknownRule(pub String);

/// Which rules to run.  Iterates in battery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet(BTreeSet<Rule>);

impl RuleSet {
    pub fn all() -> Self {
        Rule::ALL.into_iter().collect()
    }

    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, rule: Rule) {
        self.0.insert(rule);
    }

    pub fn contains(&self, rule: Rule) -> bool {
        self.0.contains(&rule)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Rule> + '_ {
        self.0.iter().copied()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Rule::ALL.into_iter().filter(|rule| rule.on_by_default()).collect()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(rules: I) -> Self {
        Self(rules.into_iter().collect())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Critical,
}

/// A rule failure.  Rendered to text only when reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub rule: Rule,
    pub severity: Severity,
    pub nameserver: Option<DomainName>,
    /// What the server calls itself, if identification was asked for.
    pub identity: Option<String>,
    pub detail: String,
}

impl Failure {
    pub fn critical(
        rule: Rule,
        nameserver: Option<&DomainName>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            rule,
            severity: Severity::Critical,
            nameserver: nameserver.cloned(),
            identity: None,
            detail: detail.into(),
        }
    }

    pub fn warning(rule: Rule, nameserver: Option<&DomainName>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::critical(rule, nameserver, detail)
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(nameserver) = &self.nameserver {
            write!(f, "{nameserver} ")?;
            if let Some(identity) = &self.identity {
                write!(f, "[{identity}] ")?;
            }
        }
        f.write_str(&self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// `count` nameservers were looked at, `summary` completes the
    /// sentence "N NSs ...".
    Pass { count: usize, summary: String },
    Fail(Failure),
    /// The rule could not run at all in this build or configuration.
    Skipped { reason: String },
}

impl CheckResult {
    pub fn pass(count: usize, summary: impl Into<String>) -> Self {
        CheckResult::Pass {
            count,
            summary: summary.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, CheckResult::Fail(failure) if failure.severity == Severity::Critical)
    }
}

impl From<Failure> for CheckResult {
    fn from(failure: Failure) -> Self {
        CheckResult::Fail(failure)
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CheckResult::Pass { count, summary } => write!(f, "{count} {summary}"),
            CheckResult::Fail(failure) => failure.fmt(f),
            CheckResult::Skipped { reason } => f.write_str(reason),
        }
    }
}

/// Everything a rule may look at.
pub struct CheckContext<'a> {
    pub zone: &'a DomainName,
    pub registry: &'a Registry,
    pub parent: &'a ParentView,
    pub transport: &'a dyn Transport,
    pub config: &'a CheckConfig,
    /// Seconds since the Unix epoch, fixed for the whole run.
    pub now: u64,
}

impl CheckContext<'_> {
    pub fn responsive(&self) -> impl Iterator<Item = (&DomainName, &NameserverRecord, &Response)> {
        self.registry.responsive()
    }

    pub fn responsive_count(&self) -> usize {
        self.responsive().count()
    }
}

/// Run the rules in order, stopping after the first critical
/// failure.
pub async fn run_battery(ctx: &CheckContext<'_>, rules: &RuleSet) -> Vec<(Rule, CheckResult)> {
    let mut outcomes = Vec::new();

    for rule in rules.iter() {
        let result = run_rule(ctx, rule)
            .instrument(tracing::error_span!("check", %rule))
            .await;
        tracing::debug!(%result, "rule finished");

        let stop = result.is_critical();
        outcomes.push((rule, result));
        if stop {
            break;
        }
    }

    outcomes
}

async fn run_rule(ctx: &CheckContext<'_>, rule: Rule) -> CheckResult {
    match rule {
        Rule::Responding => responding::check_responding(ctx),
        Rule::Lame => responding::check_lame(ctx),
        Rule::NsConsistency => consistency::check_ns_consistency(ctx),
        Rule::Authoritative => authority::check_authoritative(ctx),
        Rule::ParentConsistency => consistency::check_parent_consistency(ctx),
        Rule::Serial => serial::check_serial(ctx),
        Rule::OpenResolver => open_resolver::check_open_resolver(ctx).await,
        Rule::Tcp => reachability::check_tcp(ctx).await,
        Rule::Edns => reachability::check_edns(ctx).await,
        Rule::Ipv6 => reachability::check_ipv6(ctx).await,
        #[cfg(feature = "clock-skew")]
        Rule::ClockSkew => clock_skew::check_clock_skew(ctx).await,
        #[cfg(not(feature = "clock-skew"))]
        Rule::ClockSkew => CheckResult::Skipped {
            reason: "clock-skew check skipped (not supported by this build)".to_string(),
        },
        Rule::Records => records::check_records(ctx),
    }
}

/// Join names for a message: "a., b., c."
pub(crate) fn join_names<'a>(names: impl IntoIterator<Item = &'a DomainName>) -> String {
    names
        .into_iter()
        .map(DomainName::to_dotted_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use dns_types::protocol::types::test_util::*;

    use super::*;
    use crate::test_util::*;

    #[test]
    fn default_rules() {
        let rules = RuleSet::default();
        assert_eq!(
            vec![
                Rule::Responding,
                Rule::Lame,
                Rule::NsConsistency,
                Rule::Authoritative,
                Rule::ParentConsistency,
                Rule::OpenResolver,
                Rule::Tcp,
                Rule::Edns,
            ],
            rules.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn rule_ids_round_trip() {
        for rule in Rule::ALL {
            assert_eq!(Ok(rule), rule.to_string().parse());
        }
        assert_eq!(
            Err(UnknownRule("dnssec".to_string())),
            "dnssec".parse::<Rule>()
        );
    }

    #[test]
    fn failure_display() {
        let mut failure = Failure::critical(
            Rule::Authoritative,
            Some(&domain("ns1.example.com.")),
            "answer is not authoritative",
        );
        assert_eq!(
            "ns1.example.com. answer is not authoritative",
            failure.to_string()
        );

        failure.identity = Some("bind-1".to_string());
        assert_eq!(
            "ns1.example.com. [bind-1] answer is not authoritative",
            failure.to_string()
        );

        assert_eq!(
            "at parent only: a.",
            Failure::warning(Rule::ParentConsistency, None, "at parent only: a.").to_string()
        );
    }

    #[tokio::test]
    async fn battery_stops_at_first_critical() {
        let network = FakeNetwork::new("example.com.", 3);
        let mut registry = network.queried_registry().await;
        // ns2 goes quiet after discovery
        registry.record(
            domain("ns2.example.com."),
            [(crate::registry::QueryKind::Soa, None)].into_iter().collect(),
        );
        let transport = network.transport();
        let config = CheckConfig::default();
        let parent = ParentView::snapshot(&registry);
        let zone = domain("example.com.");
        let ctx = CheckContext {
            zone: &zone,
            registry: &registry,
            parent: &parent,
            transport: &transport,
            config: &config,
            now: network.now,
        };

        let outcomes = run_battery(&ctx, &RuleSet::all()).await;

        assert_eq!(1, outcomes.len());
        assert_eq!(Rule::Responding, outcomes[0].0);
        assert!(outcomes[0].1.is_critical());
    }

    #[tokio::test]
    async fn battery_keeps_going_after_warning() {
        let mut network = FakeNetwork::new("example.com.", 2);
        network.server_mut("ns1.example.com.").clock_offset = Some(30);
        let registry = network.queried_registry().await;
        let transport = network.transport();
        let config = CheckConfig::default();
        let parent = ParentView::snapshot(&registry);
        let zone = domain("example.com.");
        let ctx = CheckContext {
            zone: &zone,
            registry: &registry,
            parent: &parent,
            transport: &transport,
            config: &config,
            now: network.now,
        };

        let rules: RuleSet = [Rule::ClockSkew, Rule::Records, Rule::Responding]
            .into_iter()
            .collect();
        let outcomes = run_battery(&ctx, &rules).await;

        assert_eq!(
            vec![Rule::Responding, Rule::ClockSkew, Rule::Records],
            outcomes.iter().map(|(rule, _)| *rule).collect::<Vec<_>>()
        );
        if cfg!(feature = "clock-skew") {
            assert!(matches!(
                &outcomes[1].1,
                CheckResult::Fail(Failure { severity: Severity::Warning, .. })
            ));
        } else {
            assert!(matches!(&outcomes[1].1, CheckResult::Skipped { .. }));
        }
    }
}
