use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

use dns_types::protocol::types::{DomainName, Question};
use dns_types::protocol::{deserialise, serialise};

use crate::registry::Response;

/// A nameserver to send a query to: either a name which the
/// transport resolves itself, or a literal address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostOrIP {
    Host(DomainName),
    IP(IpAddr),
}

impl fmt::Display for HostOrIP {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HostOrIP::Host(name) => name.fmt(f),
            HostOrIP::IP(address) => address.fmt(f),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn matches(self, address: IpAddr) -> bool {
        match self {
            AddressFamily::V4 => address.is_ipv4(),
            AddressFamily::V6 => address.is_ipv6(),
        }
    }
}

/// How a single query is sent.  The default is a plain,
/// non-recursive query over UDP.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryOptions {
    /// Use TCP even if the answer would fit in a datagram.
    pub stream: bool,
    /// Attach an OPT record advertising this UDP payload size.
    pub edns_buffer_size: Option<u16>,
    /// Attach a TSIG record, so the server's reply carries its own
    /// idea of the current time.
    pub signed: bool,
    pub recursion_desired: bool,
}

impl QueryOptions {
    pub fn tcp() -> Self {
        Self {
            stream: true,
            ..Self::default()
        }
    }

    pub fn edns(buffer_size: u16) -> Self {
        Self {
            edns_buffer_size: Some(buffer_size),
            ..Self::default()
        }
    }

    pub fn signed() -> Self {
        Self {
            signed: true,
            ..Self::default()
        }
    }

    pub fn recursive() -> Self {
        Self {
            recursion_desired: true,
            ..Self::default()
        }
    }
}

/// Why a query produced no usable response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no address for {0}")]
    NoAddress(DomainName),

    #[error("timed out")]
    Timeout,

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not build query: {0}")]
    Serialise(#[from] serialise::Error),

    #[error("malformed response: {0}")]
    Malformed(#[from] deserialise::Error),

    #[error("response does not match query")]
    Mismatch,

    #[error("signed queries are not supported by this build")]
    Unsupported,
}

/// Everything the checker needs from the network.
///
/// Implementations must not answer from a cache: every call is a
/// fresh query to the named server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Look up the addresses of a host.  A failed lookup is an empty
    /// list, callers decide whether that matters.
    async fn resolve_addresses(&self, name: &DomainName, family: AddressFamily) -> Vec<IpAddr>;

    /// Send a query to one server and return its validated response.
    async fn query(
        &self,
        server: &HostOrIP,
        question: &Question,
        options: QueryOptions,
    ) -> Result<Response, TransportError>;
}
