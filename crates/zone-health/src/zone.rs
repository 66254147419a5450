use thiserror::Error;

use dns_types::protocol::types::DomainName;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneNameError {
    #[error("zone name is empty")]
    Empty,

    #[error("'{0}' is not a valid zone name")]
    Invalid(String),
}

/// Normalise a zone name as typed by a user.
///
/// Accepts an optional `zone.` prefix, the word `ROOT` (or `.`) for
/// the root zone, and names with or without the trailing dot.
pub fn parse_zone_name(input: &str) -> Result<DomainName, ZoneNameError> {
    let trimmed = input.trim();
    let name = match trimmed.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("zone.") && trimmed.len() > 5 => &trimmed[5..],
        _ => trimmed,
    };

    if name.is_empty() {
        return Err(ZoneNameError::Empty);
    }
    if name == "." || name.eq_ignore_ascii_case("root") {
        return Ok(DomainName::root_domain());
    }

    let absolute = if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    };
    DomainName::from_dotted_string(&absolute)
        .ok_or_else(|| ZoneNameError::Invalid(input.to_string()))
}
