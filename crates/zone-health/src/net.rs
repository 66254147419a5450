//! The real transport: plain DNS over UDP and TCP.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use rand::Rng;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use dns_types::protocol::types::*;

use crate::registry::Response;
use crate::transport::{AddressFamily, HostOrIP, QueryOptions, Transport, TransportError};

/// Big enough for any UDP answer to a query with EDNS0.
const UDP_RECV_BUFFER_SIZE: usize = 4096;

pub const DNS_PORT: u16 = 53;

/// Sends every query to the network, with no caching.
pub struct NetworkTransport {
    /// Bounds each attempt, and each host lookup.
    timeout: Duration,
    /// Extra attempts per address after the first fails.
    retries: usize,
    port: u16,
    #[cfg(feature = "clock-skew")]
    key: crate::tsig::TsigKey,
}

impl NetworkTransport {
    pub fn new(timeout: Duration, retries: usize) -> Self {
        Self {
            timeout,
            retries,
            port: DNS_PORT,
            #[cfg(feature = "clock-skew")]
            key: crate::tsig::TsigKey::generate(),
        }
    }

    /// Talk to servers on a port other than 53.
    #[must_use]
    pub fn with_port(self, port: u16) -> Self {
        Self { port, ..self }
    }

    fn build_request(
        &self,
        question: &Question,
        options: QueryOptions,
    ) -> Result<Message, TransportError> {
        let mut request = Message::from_question(rand::thread_rng().gen(), question.clone());
        request.header.recursion_desired = options.recursion_desired;

        if let Some(payload_size) = options.edns_buffer_size {
            request.additional.push(ResourceRecord {
                name: DomainName::root_domain(),
                rtype_with_data: RecordTypeWithData::OPT { octets: Bytes::new() },
                rclass: RecordClass::from(payload_size),
                ttl: 0,
            });
        }

        if options.signed {
            #[cfg(feature = "clock-skew")]
            self.key.sign(&mut request, crate::unix_now())?;
            #[cfg(not(feature = "clock-skew"))]
            return Err(TransportError::Unsupported);
        }

        Ok(request)
    }

    async fn query_address(
        &self,
        address: IpAddr,
        question: &Question,
        options: QueryOptions,
    ) -> Result<Message, TransportError> {
        let request = self.build_request(question, options)?;
        let octets = request.to_octets()?;
        let target = SocketAddr::new(address, self.port);

        let mut response = None;
        if !options.stream {
            let message = self.bounded(query_udp(target, &octets)).await?;
            if message.header.is_truncated {
                tracing::trace!(%address, "truncated, retrying over TCP");
            } else {
                response = Some(message);
            }
        }
        let response = match response {
            Some(message) => message,
            None => self.bounded(query_tcp(target, &octets)).await?,
        };

        if response_matches_request(&request, &response) {
            Ok(response)
        } else {
            Err(TransportError::Mismatch)
        }
    }

    async fn bounded<F>(&self, future: F) -> Result<Message, TransportError>
    where
        F: std::future::Future<Output = Result<Message, TransportError>>,
    {
        match timeout(self.timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    async fn resolve_addresses(&self, name: &DomainName, family: AddressFamily) -> Vec<IpAddr> {
        let dotted = name.to_dotted_string();
        let host = dotted.strip_suffix('.').unwrap_or(&dotted);

        let found = match timeout(self.timeout, tokio::net::lookup_host((host, self.port))).await {
            Ok(Ok(found)) => found,
            Ok(Err(error)) => {
                tracing::debug!(%name, %error, "lookup failed");
                return Vec::new();
            }
            Err(_) => {
                tracing::debug!(%name, "lookup timed out");
                return Vec::new();
            }
        };

        let mut addresses = Vec::new();
        for address in found.map(|socket| socket.ip()) {
            if family.matches(address) && !addresses.contains(&address) {
                addresses.push(address);
            }
        }
        addresses
    }

    async fn query(
        &self,
        server: &HostOrIP,
        question: &Question,
        options: QueryOptions,
    ) -> Result<Response, TransportError> {
        let addresses = match server {
            HostOrIP::IP(address) => vec![*address],
            HostOrIP::Host(name) => {
                let mut addresses = self.resolve_addresses(name, AddressFamily::V4).await;
                addresses.extend(self.resolve_addresses(name, AddressFamily::V6).await);
                if addresses.is_empty() {
                    return Err(TransportError::NoAddress(name.clone()));
                }
                addresses
            }
        };

        let mut last_error = TransportError::Timeout;
        for address in addresses {
            for attempt in 0..=self.retries {
                match self.query_address(address, question, options).await {
                    Ok(message) => {
                        return Ok(Response {
                            server: address,
                            message,
                        })
                    }
                    Err(error) => {
                        tracing::debug!(%address, %attempt, %error, %question, "query failed");
                        last_error = error;
                    }
                }
            }
        }

        Err(last_error)
    }
}

async fn query_udp(target: SocketAddr, octets: &[u8]) -> Result<Message, TransportError> {
    let local = if target.is_ipv4() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    } else {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    };

    let sock = UdpSocket::bind(local).await?;
    sock.connect(target).await?;
    sock.send(octets).await?;

    let mut buf = vec![0u8; UDP_RECV_BUFFER_SIZE];
    let size = sock.recv(&mut buf).await?;
    Ok(Message::from_octets(&buf[..size])?)
}

async fn query_tcp(target: SocketAddr, octets: &[u8]) -> Result<Message, TransportError> {
    let mut stream = TcpStream::connect(target).await?;
    send_tcp_bytes(&mut stream, octets).await?;
    let bytes = read_tcp_bytes(&mut stream).await?;
    Ok(Message::from_octets(bytes.as_ref())?)
}

/// Read a DNS message from a TCP stream.
///
/// Over TCP every message has a big-endian u16 length prefix, so the
/// whole message can be read before parsing begins.
pub async fn read_tcp_bytes(stream: &mut TcpStream) -> Result<BytesMut, io::Error> {
    let expected = usize::from(stream.read_u16().await?);
    let mut bytes = BytesMut::with_capacity(expected);
    while bytes.len() < expected {
        if stream.read_buf(&mut bytes).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {expected} octets, got {}", bytes.len()),
            ));
        }
    }
    bytes.truncate(expected);
    Ok(bytes)
}

/// Write a serialised message to a TCP stream, with its length
/// prefix.
pub async fn send_tcp_bytes(stream: &mut TcpStream, bytes: &[u8]) -> Result<(), io::Error> {
    let Ok(len) = u16::try_from(bytes.len()) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message of {} octets is too long for TCP", bytes.len()),
        ));
    };

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;

    Ok(())
}

/// Basic validation that a response is the answer to a request:
///
/// - the ID, opcode, and questions match;
///
/// - it is a response, and not truncated.
///
/// Some servers leave the question section out of error responses,
/// so that is accepted if the rcode is not `NoError`.
pub fn response_matches_request(request: &Message, response: &Message) -> bool {
    if request.header.id != response.header.id {
        return false;
    }
    if !response.header.is_response {
        return false;
    }
    if request.header.opcode != response.header.opcode {
        return false;
    }
    if response.header.is_truncated {
        return false;
    }
    if response.questions.is_empty() && response.header.rcode != Rcode::NoError {
        return true;
    }
    if request.questions != response.questions {
        return false;
    }

    true
}
