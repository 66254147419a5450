use std::fmt;

use dns_types::protocol::types::DomainName;

use crate::checks::{CheckResult, Failure, Rule, Severity};

/// Overall verdict, in the Nagios plugin sense.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl State {
    pub fn exit_code(self) -> i32 {
        match self {
            State::Ok => 0,
            State::Warning => 1,
            State::Critical => 2,
            State::Unknown => 3,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            State::Ok => write!(f, "OK"),
            State::Warning => write!(f, "WARNING"),
            State::Critical => write!(f, "CRITICAL"),
            State::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// The outcome of every rule which ran, in battery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub zone: DomainName,
    pub outcomes: Vec<(Rule, CheckResult)>,
}

impl Report {
    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.outcomes.iter().filter_map(|(_, outcome)| match outcome {
            CheckResult::Fail(failure) => Some(failure),
            _ => None,
        })
    }

    pub fn state(&self) -> State {
        match self.failures().map(|failure| failure.severity).max() {
            Some(Severity::Critical) => State::Critical,
            Some(Severity::Warning) => State::Warning,
            None => State::Ok,
        }
    }

    /// The critical failure if there is one, else every warning, else
    /// a summary of everything which passed.
    pub fn message(&self) -> String {
        if let Some(critical) = self
            .failures()
            .find(|failure| failure.severity == Severity::Critical)
        {
            return critical.to_string();
        }

        let warnings = self
            .failures()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        if !warnings.is_empty() {
            return warnings.join("; ");
        }

        self.outcomes
            .iter()
            .map(|(_, outcome)| outcome.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use dns_types::protocol::types::test_util::*;

    use super::*;

    fn report(outcomes: Vec<(Rule, CheckResult)>) -> Report {
        Report {
            zone: domain("example.com."),
            outcomes,
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(0, State::Ok.exit_code());
        assert_eq!(1, State::Warning.exit_code());
        assert_eq!(2, State::Critical.exit_code());
        assert_eq!(3, State::Unknown.exit_code());
    }

    #[test]
    fn all_passing() {
        let report = report(vec![
            (Rule::Responding, CheckResult::pass(3, "NSs are responding")),
            (Rule::Lame, CheckResult::pass(3, "NSs are NOT lame")),
            (
                Rule::ClockSkew,
                CheckResult::Skipped {
                    reason: "clock-skew check skipped (not supported by this build)".to_string(),
                },
            ),
        ]);

        assert_eq!(State::Ok, report.state());
        assert_eq!(
            "3 NSs are responding, 3 NSs are NOT lame, clock-skew check skipped (not supported by this build)",
            report.message()
        );
    }

    #[test]
    fn warnings_are_joined() {
        let report = report(vec![
            (Rule::Responding, CheckResult::pass(2, "NSs are responding")),
            (
                Rule::ClockSkew,
                Failure::warning(
                    Rule::ClockSkew,
                    Some(&domain("ns1.example.com.")),
                    "has clock skew of 20s",
                )
                .into(),
            ),
            (
                Rule::Records,
                Failure::warning(Rule::Records, None, "something else").into(),
            ),
        ]);

        assert_eq!(State::Warning, report.state());
        assert_eq!(
            "ns1.example.com. has clock skew of 20s; something else",
            report.message()
        );
    }

    #[test]
    fn critical_wins() {
        let report = report(vec![
            (
                Rule::ClockSkew,
                Failure::warning(Rule::ClockSkew, None, "a warning").into(),
            ),
            (
                Rule::Tcp,
                Failure::critical(
                    Rule::Tcp,
                    Some(&domain("ns2.example.com.")),
                    "did not answer over TCP",
                )
                .into(),
            ),
        ]);

        assert_eq!(State::Critical, report.state());
        assert_eq!("ns2.example.com. did not answer over TCP", report.message());
    }
}
