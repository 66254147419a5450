use dns_types::protocol::types::DomainName;

use super::{CheckContext, CheckResult, Failure, Rule};

/// Serials which look like Unix timestamps are allowed to drift by
/// this many seconds.
const TIMESTAMP_TOLERANCE: u64 = 3600;

/// Every server's serial is within one of the highest.  Zones which
/// use a Unix timestamp as their serial are tolerated as long as the
/// newest serial is recent and the oldest is not far behind it.
pub fn check_serial(ctx: &CheckContext<'_>) -> CheckResult {
    let serials = ctx
        .responsive()
        .filter_map(|(name, _, soa)| soa.soa_serial().map(|serial| (name, serial)))
        .filter(|(_, serial)| *serial > 0)
        .collect::<Vec<(&DomainName, u32)>>();

    let Some((max_name, max)) = serials.iter().copied().max_by_key(|(_, serial)| *serial) else {
        return CheckResult::pass(0, "NSs have consistent serial");
    };
    let min = serials.iter().map(|(_, serial)| *serial).min().unwrap_or(max);

    let recent = ctx.now.abs_diff(u64::from(max)) <= TIMESTAMP_TOLERANCE;
    if recent && u64::from(max - min) <= TIMESTAMP_TOLERANCE {
        return CheckResult::pass(serials.len(), "NSs have consistent serial");
    }

    for (name, serial) in &serials {
        if max - serial >= 2 {
            return Failure::critical(
                Rule::Serial,
                Some(name),
                format!("has serial {serial}, {max_name} has {max}"),
            )
            .into();
        }
    }

    CheckResult::pass(serials.len(), "NSs have consistent serial")
}

#[cfg(test)]
mod tests {
    use dns_types::protocol::types::test_util::*;

    use super::*;
    use crate::test_util::*;

    fn with_serials(serials: &[u32]) -> FakeNetwork {
        let mut network = FakeNetwork::new("example.com.", serials.len());
        for (server, serial) in network.servers.iter_mut().zip(serials) {
            server.serial = *serial;
        }
        network
    }

    #[tokio::test]
    async fn identical_serials() {
        let network = with_serials(&[2_024_010_100, 2_024_010_100, 2_024_010_100]);
        assert_eq!(
            CheckResult::pass(3, "NSs have consistent serial"),
            run_rule_against(&network, Rule::Serial).await
        );
    }

    #[tokio::test]
    async fn gap_of_one_passes() {
        let network = with_serials(&[101, 102, 102]);
        assert_eq!(
            CheckResult::pass(3, "NSs have consistent serial"),
            run_rule_against(&network, Rule::Serial).await
        );
    }

    #[tokio::test]
    async fn gap_of_two_fails() {
        let network = with_serials(&[100, 101, 102]);
        match run_rule_against(&network, Rule::Serial).await {
            CheckResult::Fail(failure) => {
                assert_eq!(Some(domain("ns1.example.com.")), failure.nameserver);
                assert_eq!("has serial 100, ns3.example.com. has 102", failure.detail);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_serials_are_ignored() {
        let network = with_serials(&[0, 500, 500]);
        assert_eq!(
            CheckResult::pass(2, "NSs have consistent serial"),
            run_rule_against(&network, Rule::Serial).await
        );
    }

    #[tokio::test]
    async fn recent_timestamp_serials_are_tolerated() {
        let network = FakeNetwork::new("example.com.", 2);
        let now = u32::try_from(network.now).unwrap();
        let network = with_serials(&[now - 3000, now - 100]);
        assert_eq!(
            CheckResult::pass(2, "NSs have consistent serial"),
            run_rule_against(&network, Rule::Serial).await
        );
    }

    #[tokio::test]
    async fn old_timestamp_serials_are_not_tolerated() {
        let network = FakeNetwork::new("example.com.", 2);
        let now = u32::try_from(network.now).unwrap();
        let network = with_serials(&[now - 10_000, now - 9_000]);
        assert!(run_rule_against(&network, Rule::Serial).await.is_critical());
    }

    #[tokio::test]
    async fn timestamp_spread_over_an_hour_is_not_tolerated() {
        let network = FakeNetwork::new("example.com.", 2);
        let now = u32::try_from(network.now).unwrap();
        let network = with_serials(&[now - 4_000, now]);
        assert!(run_rule_against(&network, Rule::Serial).await.is_critical());
    }
}
