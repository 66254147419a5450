//! Transaction signatures (RFC 8945), just enough to get a server to
//! put its clock in a signed reply.

use bytes::Bytes;
use rand::Rng;
use ring::hmac;

use dns_types::protocol::serialise::{self, WritableBuffer};
use dns_types::protocol::types::*;

pub const ALGORITHM: &str = "hmac-sha256.";

/// Seconds either side of `time_signed` the receiver should accept.
pub const FUDGE: u16 = 300;

/// The class every TSIG record has.
const CLASS_ANY: u16 = 255;

pub struct TsigKey {
    pub name: DomainName,
    algorithm: DomainName,
    key: hmac::Key,
}

impl TsigKey {
    pub fn new(name: DomainName, secret: &[u8]) -> Self {
        Self {
            name,
            algorithm: DomainName::from_dotted_string(ALGORITHM)
                .unwrap_or_else(DomainName::root_domain),
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// A throwaway key.  No server will know it, but a server which
    /// implements TSIG still signs its BADKEY reply with the time.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let secret: [u8; 32] = rng.gen();
        let tag: u32 = rng.gen();
        let name = DomainName::from_dotted_string(&format!("check-zone-{tag:08x}."))
            .unwrap_or_else(DomainName::root_domain);
        Self::new(name, &secret)
    }

    /// Sign a query: compute the MAC over the message as it stands
    /// and append the TSIG record to the additional section.  Must
    /// be the last change made to the message.
    ///
    /// # Errors
    ///
    /// If the message cannot be serialised.
    pub fn sign(&self, message: &mut Message, now: u64) -> Result<(), serialise::Error> {
        let mut buffer = WritableBuffer::default();
        buffer.write_octets(&message.to_octets()?);
        self.name.serialise(&mut buffer, false);
        buffer.write_u16(CLASS_ANY);
        buffer.write_u32(0);
        self.algorithm.serialise(&mut buffer, false);
        buffer.write_u48(now);
        buffer.write_u16(FUDGE);
        // error, other len
        buffer.write_u16(0);
        buffer.write_u16(0);

        let mac = hmac::sign(&self.key, &buffer.octets);

        message.additional.push(ResourceRecord {
            name: self.name.clone(),
            rtype_with_data: RecordTypeWithData::TSIG {
                algorithm: self.algorithm.clone(),
                time_signed: now,
                fudge: FUDGE,
                mac: Bytes::copy_from_slice(mac.as_ref()),
                original_id: message.header.id,
                error: 0,
                other: Bytes::new(),
            },
            rclass: RecordClass::from(CLASS_ANY),
            ttl: 0,
        });

        Ok(())
    }
}
