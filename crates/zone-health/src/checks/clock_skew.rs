use dns_types::protocol::types::*;

use super::{CheckContext, CheckResult, Failure, Rule};
use crate::transport::{HostOrIP, QueryOptions};

/// Skew above this is a warning.
pub const WARNING_SKEW: u64 = 15;

/// Skew above this is critical.
pub const CRITICAL_SKEW: u64 = 60;

/// Send each responsive server a signed SOA query and compare the
/// time in its signed reply with ours.  Only the server with the
/// largest skew is reported.
pub async fn check_clock_skew(ctx: &CheckContext<'_>) -> CheckResult {
    let question = Question::internet(ctx.zone.clone(), RecordType::SOA);

    let mut worst: Option<(&DomainName, u64)> = None;
    for (name, _, soa) in ctx.responsive() {
        let response = match ctx
            .transport
            .query(&HostOrIP::IP(soa.server), &question, QueryOptions::signed())
            .await
        {
            Ok(response) => response,
            Err(error) => {
                return Failure::critical(
                    Rule::ClockSkew,
                    Some(name),
                    format!("did not answer signed query: {error}"),
                )
                .into();
            }
        };

        let time_signed = response.message.tsig().and_then(|rr| match rr.rtype_with_data {
            RecordTypeWithData::TSIG { time_signed, .. } => Some(time_signed),
            _ => None,
        });
        let Some(time_signed) = time_signed else {
            return Failure::critical(Rule::ClockSkew, Some(name), "did not return a TSIG record")
                .into();
        };

        let skew = ctx.now.abs_diff(time_signed);
        tracing::debug!(%name, %skew, "clock skew");
        if worst.map_or(true, |(_, largest)| skew > largest) {
            worst = Some((name, skew));
        }
    }

    match worst {
        Some((name, skew)) if skew > CRITICAL_SKEW => Failure::critical(
            Rule::ClockSkew,
            Some(name),
            format!("has clock skew of {skew}s (more than {CRITICAL_SKEW}s)"),
        )
        .into(),
        Some((name, skew)) if skew > WARNING_SKEW => Failure::warning(
            Rule::ClockSkew,
            Some(name),
            format!("has clock skew of {skew}s (more than {WARNING_SKEW}s)"),
        )
        .into(),
        _ => CheckResult::pass(
            ctx.responsive_count(),
            format!("NSs have clock skew within {WARNING_SKEW}s"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use dns_types::protocol::types::test_util::*;

    use super::*;
    use crate::checks::Severity;
    use crate::test_util::*;

    async fn with_offsets(offsets: &[Option<i64>]) -> CheckResult {
        let mut network = FakeNetwork::new("example.com.", offsets.len());
        for (server, offset) in network.servers.iter_mut().zip(offsets) {
            server.clock_offset = *offset;
        }
        run_rule_against(&network, Rule::ClockSkew).await
    }

    #[tokio::test]
    async fn small_skew_passes() {
        assert_eq!(
            CheckResult::pass(3, "NSs have clock skew within 15s"),
            with_offsets(&[Some(0), Some(-15), Some(15)]).await
        );
    }

    #[tokio::test]
    async fn over_fifteen_seconds_warns() {
        match with_offsets(&[Some(0), Some(16), Some(-3)]).await {
            CheckResult::Fail(failure) => {
                assert_eq!(Severity::Warning, failure.severity);
                assert_eq!(Some(domain("ns2.example.com.")), failure.nameserver);
                assert_eq!("has clock skew of 16s (more than 15s)", failure.detail);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn over_sixty_seconds_is_critical_and_names_the_worst() {
        match with_offsets(&[Some(20), Some(-90), Some(61)]).await {
            CheckResult::Fail(failure) => {
                assert_eq!(Severity::Critical, failure.severity);
                assert_eq!(Some(domain("ns2.example.com.")), failure.nameserver);
                assert_eq!("has clock skew of 90s (more than 60s)", failure.detail);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exactly_sixty_seconds_only_warns() {
        match with_offsets(&[Some(60)]).await {
            CheckResult::Fail(failure) => assert_eq!(Severity::Warning, failure.severity),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsigned_reply_is_critical() {
        match with_offsets(&[Some(0), None]).await {
            CheckResult::Fail(failure) => {
                assert_eq!(Severity::Critical, failure.severity);
                assert_eq!(Some(domain("ns2.example.com.")), failure.nameserver);
                assert_eq!("did not return a TSIG record", failure.detail);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
