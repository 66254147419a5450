//! The one line a Nagios-style plugin prints.

use std::fmt;
use std::time::Duration;

use zone_health::discovery::DiscoveryError;
use zone_health::report::{Report, State};

/// Render the result of a run, and the state the process should exit
/// with.  A zone whose nameservers cannot be found is critical.
pub fn render(
    zone: &impl fmt::Display,
    result: &Result<Report, DiscoveryError>,
    elapsed: Duration,
) -> (State, String) {
    let (state, message) = match result {
        Ok(report) => (report.state(), report.message()),
        Err(error) => (State::Critical, error.to_string()),
    };
    (state, status_line(state, zone, &message, elapsed))
}

pub fn status_line(
    state: State,
    zone: &impl fmt::Display,
    message: &str,
    elapsed: Duration,
) -> String {
    let secs = format!("{:.3}", elapsed.as_secs_f64());
    // everything after a '|' is performance data
    let message = message.replace('|', "/");
    format!("DNS ZONE {state} - {zone}: {message} ({secs}s) | time={secs}s")
}

/// For when there is no zone to report on.
pub fn unknown(message: &str) -> String {
    format!("DNS ZONE {} - {}", State::Unknown, message.replace('|', "/"))
}
