use super::{CheckContext, CheckResult, Failure, Rule};

/// Every responsive server sets the AA bit on its SOA answer.
pub fn check_authoritative(ctx: &CheckContext<'_>) -> CheckResult {
    for (name, _, soa) in ctx.responsive() {
        if !soa.is_authoritative() {
            return Failure::critical(
                Rule::Authoritative,
                Some(name),
                "answer is not authoritative",
            )
            .into();
        }
    }

    CheckResult::pass(ctx.responsive_count(), "NSs are authoritative")
}
