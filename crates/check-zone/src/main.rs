#![warn(clippy::pedantic)]
// Don't care enough to fix
#![allow(clippy::struct_excessive_bools)]

mod output;

use clap::error::ErrorKind;
use clap::Parser;
use std::net::Ipv4Addr;
use std::process;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use dns_types::protocol::types::{DomainName, RecordType};
use zone_health::checks::{Rule, RuleSet};
use zone_health::config::{self, CheckConfig};
use zone_health::net::NetworkTransport;
use zone_health::report::State;
use zone_health::zone::parse_zone_name;

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Parser)]
#[clap(version)]
/// Check the delegation and nameservers of a DNS zone
///
/// Follows referrals down from the root to find the zone's
/// nameservers, asks each of them about the zone, and checks what they
/// say.  Prints one line and exits with 0 (OK), 1 (WARNING), 2
/// (CRITICAL), or 3 (UNKNOWN), as a Nagios plugin does.
///
/// If no checks are selected, every check except serial, ipv6, and
/// clock-skew runs.
struct Args {
    /// Zone to check, the trailing dot is optional ("ROOT" or "." for
    /// the root zone)
    zone: String,

    /// Check that every nameserver answers an SOA query
    #[clap(long, action(clap::ArgAction::SetTrue))]
    responding: bool,

    /// Check that every nameserver considers itself authoritative
    #[clap(long, action(clap::ArgAction::SetTrue))]
    lame: bool,

    /// Check that every nameserver gives the same NS RRset
    #[clap(long, action(clap::ArgAction::SetTrue))]
    ns_consistency: bool,

    /// Check that every answer has the AA flag set
    #[clap(long, action(clap::ArgAction::SetTrue))]
    authoritative: bool,

    /// Check that the parent's NS RRset matches the zone's
    #[clap(long, action(clap::ArgAction::SetTrue))]
    parent_consistency: bool,

    /// Check that every nameserver has (nearly) the same SOA serial
    #[clap(long, action(clap::ArgAction::SetTrue))]
    serial: bool,

    /// Check that no nameserver answers recursive queries for others
    #[clap(long, action(clap::ArgAction::SetTrue))]
    open_resolver: bool,

    /// Check that every nameserver answers over TCP
    #[clap(long, action(clap::ArgAction::SetTrue))]
    tcp: bool,

    /// Check that every nameserver supports EDNS0
    #[clap(long, action(clap::ArgAction::SetTrue))]
    edns: bool,

    /// Check that every nameserver with an IPv6 address answers on it
    #[clap(long, action(clap::ArgAction::SetTrue))]
    ipv6: bool,

    /// Check the nameservers' clocks with TSIG-signed queries
    #[clap(long, action(clap::ArgAction::SetTrue))]
    clock_skew: bool,

    /// Run every check
    #[clap(long, action(clap::ArgAction::SetTrue))]
    all: bool,

    /// Seconds to wait for each answer
    #[clap(short, long, default_value_t = 5, env = "CHECK_ZONE_TIMEOUT")]
    timeout: u64,

    /// How many more times to try a nameserver which does not answer
    #[clap(short, long, default_value_t = 2, env = "CHECK_ZONE_RETRIES")]
    retries: usize,

    /// Also check that every nameserver serves the same records of this
    /// type at the zone apex
    #[clap(long, value_parser)]
    record_type: Option<RecordType>,

    /// Undelegated domain to use in the open resolver check
    #[clap(
        long,
        default_value = config::DEFAULT_OPEN_RESOLVER_DOMAIN,
        env = "CHECK_ZONE_OPEN_RESOLVER_DOMAIN",
        value_parser = parse_zone_name
    )]
    open_resolver_domain: DomainName,

    /// Address names under the open resolver domain resolve to
    #[clap(long, default_value_t = config::DEFAULT_OPEN_RESOLVER_ADDRESS)]
    open_resolver_address: Ipv4Addr,

    /// UDP payload size to advertise in EDNS0 queries
    #[clap(long, default_value_t = config::DEFAULT_EDNS_BUFFER_SIZE)]
    edns_buffer_size: u16,

    /// Root server to start from, can be specified more than once
    /// (default: a.root-servers.net. to m.root-servers.net.)
    #[clap(long, value_parser = parse_zone_name)]
    root_hint: Vec<DomainName>,

    /// Give up after following this many referrals
    #[clap(long, default_value_t = config::MAX_REFERRAL_ROUNDS)]
    max_referral_rounds: usize,

    /// Ask misbehaving nameservers for their hostname.bind / id.server
    /// identity, and include it in the message
    #[clap(long, action(clap::ArgAction::SetTrue))]
    identify: bool,

    /// Log queries and their answers to stderr
    #[clap(short, long, action(clap::ArgAction::SetTrue))]
    debug: bool,
}

impl Args {
    fn rules(&self) -> RuleSet {
        // record agreement is switched on by --record-type
        if self.all {
            return Rule::ALL
                .into_iter()
                .filter(|rule| *rule != Rule::Records)
                .collect();
        }

        let selected = [
            (self.responding, Rule::Responding),
            (self.lame, Rule::Lame),
            (self.ns_consistency, Rule::NsConsistency),
            (self.authoritative, Rule::Authoritative),
            (self.parent_consistency, Rule::ParentConsistency),
            (self.serial, Rule::Serial),
            (self.open_resolver, Rule::OpenResolver),
            (self.tcp, Rule::Tcp),
            (self.edns, Rule::Edns),
            (self.ipv6, Rule::Ipv6),
            (self.clock_skew, Rule::ClockSkew),
        ]
        .into_iter()
        .filter_map(|(on, rule)| on.then_some(rule))
        .collect::<RuleSet>();

        if selected.is_empty() {
            RuleSet::default()
        } else {
            selected
        }
    }

    fn check_config(&self) -> CheckConfig {
        let root_hints = if self.root_hint.is_empty() {
            config::default_root_hints()
        } else {
            self.root_hint.clone()
        };

        CheckConfig {
            rules: self.rules(),
            root_hints,
            max_referral_rounds: self.max_referral_rounds,
            record_type: self.record_type,
            open_resolver_domain: self.open_resolver_domain.clone(),
            open_resolver_address: self.open_resolver_address,
            edns_buffer_size: self.edns_buffer_size,
            identify: self.identify,
        }
    }
}

fn begin_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // stdout is for the status line
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            begin_logging(false);
            if let Err(print_error) = error.print() {
                tracing::warn!(error = %print_error, "could not print usage");
            }
            if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                process::exit(0);
            }
            println!("{}", output::unknown("invalid command line, see --help"));
            process::exit(State::Unknown.exit_code());
        }
    };

    begin_logging(args.debug);

    let zone = match parse_zone_name(&args.zone) {
        Ok(zone) => zone,
        Err(error) => {
            println!("{}", output::unknown(&error.to_string()));
            process::exit(State::Unknown.exit_code());
        }
    };

    let config = args.check_config();
    tracing::debug!(%zone, ?config, "starting");

    let transport = NetworkTransport::new(Duration::from_secs(args.timeout), args.retries);
    let start = Instant::now();
    let result = zone_health::check_zone(&transport, &config, &zone).await;
    if let Err(error) = &result {
        tracing::error!(%zone, %error, "discovery failed");
    }

    let (state, line) = output::render(&zone, &result, start.elapsed());
    println!("{line}");
    process::exit(state.exit_code());
}
