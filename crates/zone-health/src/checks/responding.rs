use super::{CheckContext, CheckResult, Failure, Rule};

/// Every nameserver gave a successful SOA response.  Reports the
/// first one (by name) which did not.
pub fn check_responding(ctx: &CheckContext<'_>) -> CheckResult {
    for (name, record) in ctx.registry.iter() {
        match record.soa() {
            None => {
                return Failure::critical(
                    Rule::Responding,
                    Some(name),
                    "did not respond to SOA query",
                )
                .into();
            }
            Some(response) if !response.is_success() => {
                return Failure::critical(
                    Rule::Responding,
                    Some(name),
                    format!("answered SOA query with {}", response.rcode()),
                )
                .into();
            }
            Some(_) => (),
        }
    }

    CheckResult::pass(ctx.registry.len(), "NSs are responding")
}

/// A server which answers for the zone but has no SOA record for it
/// is lame.
pub fn check_lame(ctx: &CheckContext<'_>) -> CheckResult {
    for (name, _, soa) in ctx.responsive() {
        if soa.message.answers.is_empty() {
            return Failure::critical(
                Rule::Lame,
                Some(name),
                "is lame (no SOA record in answer)",
            )
            .into();
        }
    }

    CheckResult::pass(ctx.responsive_count(), "NSs are NOT lame")
}

#[cfg(test)]
mod tests {
    use dns_types::protocol::types::test_util::*;
    use dns_types::protocol::types::Rcode;

    use super::*;
    use crate::test_util::*;

    #[tokio::test]
    async fn all_responding() {
        let network = FakeNetwork::new("example.com.", 3);
        let outcome = run_rule_against(&network, Rule::Responding).await;
        assert_eq!(CheckResult::pass(3, "NSs are responding"), outcome);
    }

    #[tokio::test]
    async fn first_silent_server_by_name_is_reported() {
        let mut network = FakeNetwork::new("example.com.", 3);
        network.server_mut("ns3.example.com.").responds = false;
        network.server_mut("ns2.example.com.").responds = false;

        match run_rule_against(&network, Rule::Responding).await {
            CheckResult::Fail(failure) => {
                assert_eq!(Some(domain("ns2.example.com.")), failure.nameserver);
                assert_eq!("did not respond to SOA query", failure.detail);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_rcode_is_not_responding() {
        let mut network = FakeNetwork::new("example.com.", 2);
        network.server_mut("ns1.example.com.").rcode = Rcode::ServerFailure;

        match run_rule_against(&network, Rule::Responding).await {
            CheckResult::Fail(failure) => {
                assert_eq!(Some(domain("ns1.example.com.")), failure.nameserver);
                assert_eq!("answered SOA query with SERVFAIL", failure.detail);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lame_server_is_reported() {
        let mut network = FakeNetwork::new("example.com.", 3);
        network.server_mut("ns2.example.com.").lame = true;

        match run_rule_against(&network, Rule::Lame).await {
            CheckResult::Fail(failure) => {
                assert_eq!(Some(domain("ns2.example.com.")), failure.nameserver);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lame_ignores_silent_servers() {
        let mut network = FakeNetwork::new("example.com.", 3);
        network.server_mut("ns2.example.com.").responds = false;

        assert_eq!(
            CheckResult::pass(2, "NSs are NOT lame"),
            run_rule_against(&network, Rule::Lame).await
        );
    }
}
