//! The whole run: discovery, the direct query phase, the battery.

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::Instrument;

use dns_types::protocol::types::DomainName;

use crate::checks::{run_battery, CheckContext};
use crate::config::CheckConfig;
use crate::discovery::{discover, DiscoveryError};
use crate::identify::annotate;
use crate::query::query_nameservers;
use crate::registry::ParentView;
use crate::report::Report;
use crate::transport::Transport;

/// Seconds since the Unix epoch, or 0 if the clock is before it.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| since.as_secs())
}

/// Check the health of `zone`.
///
/// # Errors
///
/// If discovery fails there is nothing to check.  Everything which
/// goes wrong after that is part of the report.
pub async fn check_zone(
    transport: &dyn Transport,
    config: &CheckConfig,
    zone: &DomainName,
) -> Result<Report, DiscoveryError> {
    check_zone_at(transport, config, zone, unix_now()).await
}

/// Like `check_zone`, but with the current time given.
///
/// # Errors
///
/// See `check_zone`.
pub async fn check_zone_at(
    transport: &dyn Transport,
    config: &CheckConfig,
    zone: &DomainName,
    now: u64,
) -> Result<Report, DiscoveryError> {
    let discovery = discover(transport, zone, &config.root_hints, config.max_referral_rounds)
        .instrument(tracing::error_span!("discover", %zone))
        .await?;
    tracing::info!(
        %zone,
        rounds = %discovery.rounds,
        nameservers = %discovery.registry.len(),
        "found delegation"
    );

    let parent = ParentView::snapshot(&discovery.registry);
    let registry = query_nameservers(transport, zone, config.record_type, discovery.registry)
        .instrument(tracing::error_span!("query_nameservers", %zone))
        .await;
    tracing::info!(%zone, nameservers = %registry.len(), "queried nameservers");

    let ctx = CheckContext {
        zone,
        registry: &registry,
        parent: &parent,
        transport,
        config,
        now,
    };
    let mut outcomes = run_battery(&ctx, &config.effective_rules())
        .instrument(tracing::error_span!("battery", %zone))
        .await;

    if config.identify {
        annotate(transport, &registry, &mut outcomes).await;
    }

    Ok(Report {
        zone: zone.clone(),
        outcomes,
    })
}
