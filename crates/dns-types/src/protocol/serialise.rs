//! Serialisation of DNS messages to the wire format.  See the `types`
//! module for details of the format.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use crate::protocol::types::*;

impl Message {
    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn to_octets(&self) -> Result<BytesMut, Error> {
        let mut buffer = WritableBuffer::default();
        self.serialise(&mut buffer)?;
        Ok(buffer.octets)
    }

    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        let qdcount = usize_to_u16(self.questions.len())?;
        let ancount = usize_to_u16(self.answers.len())?;
        let nscount = usize_to_u16(self.authority.len())?;
        let arcount = usize_to_u16(self.additional.len())?;

        self.header.serialise(buffer);
        buffer.write_u16(qdcount);
        buffer.write_u16(ancount);
        buffer.write_u16(nscount);
        buffer.write_u16(arcount);

        for question in &self.questions {
            question.serialise(buffer);
        }
        for rr in self
            .answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
        {
            rr.serialise(buffer)?;
        }

        Ok(())
    }
}

impl Header {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        let flag = |set: bool, mask: u8| if set { mask } else { 0 };

        let field_opcode = HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let field_rcode = HEADER_MASK_RCODE & (u8::from(self.rcode) << HEADER_OFFSET_RCODE);

        buffer.write_u16(self.id);
        buffer.write_u8(
            flag(self.is_response, HEADER_MASK_QR)
                | field_opcode
                | flag(self.is_authoritative, HEADER_MASK_AA)
                | flag(self.is_truncated, HEADER_MASK_TC)
                | flag(self.recursion_desired, HEADER_MASK_RD),
        );
        buffer.write_u8(flag(self.recursion_available, HEADER_MASK_RA) | field_rcode);
    }
}

impl Question {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        self.name.serialise(buffer, true);
        buffer.write_u16(self.qtype.into());
        buffer.write_u16(self.qclass.into());
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the RDATA is too long.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        self.name.serialise(buffer, true);
        buffer.write_u16(self.rtype_with_data.rtype().into());
        buffer.write_u16(self.rclass.into());
        buffer.write_u32(self.ttl);

        // filled in below
        let rdlength_index = buffer.index();
        buffer.write_u16(0);

        self.rtype_with_data.serialise(buffer)?;

        // -2 so we don't also include the 2 octets for the rdlength
        let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)?;
        let [hi, lo] = rdlength.to_be_bytes();
        buffer.octets[rdlength_index] = hi;
        buffer.octets[rdlength_index + 1] = lo;

        Ok(())
    }
}

impl RecordTypeWithData {
    /// Write just the RDATA.  Names inside RDATA are never
    /// compressed.
    ///
    /// # Errors
    ///
    /// If a length-prefixed field is too long.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        match self {
            RecordTypeWithData::A { address } => buffer.write_octets(&address.octets()),
            RecordTypeWithData::NS { nsdname } => nsdname.serialise(buffer, false),
            RecordTypeWithData::CNAME { cname } => cname.serialise(buffer, false),
            RecordTypeWithData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(buffer, false);
                rname.serialise(buffer, false);
                for field in [serial, refresh, retry, expire, minimum] {
                    buffer.write_u32(*field);
                }
            }
            RecordTypeWithData::PTR { ptrdname } => ptrdname.serialise(buffer, false),
            RecordTypeWithData::MX {
                preference,
                exchange,
            } => {
                buffer.write_u16(*preference);
                exchange.serialise(buffer, false);
            }
            RecordTypeWithData::AAAA { address } => buffer.write_octets(&address.octets()),
            RecordTypeWithData::TSIG {
                algorithm,
                time_signed,
                fudge,
                mac,
                original_id,
                error,
                other,
            } => {
                algorithm.serialise(buffer, false);
                buffer.write_u48(*time_signed);
                buffer.write_u16(*fudge);
                buffer.write_u16(usize_to_u16(mac.len())?);
                buffer.write_octets(mac);
                buffer.write_u16(*original_id);
                buffer.write_u16(*error);
                buffer.write_u16(usize_to_u16(other.len())?);
                buffer.write_octets(other);
            }
            RecordTypeWithData::TXT { octets }
            | RecordTypeWithData::OPT { octets }
            | RecordTypeWithData::Unknown { octets, .. } => buffer.write_octets(octets),
        };

        Ok(())
    }
}

impl DomainName {
    pub fn serialise(&self, buffer: &mut WritableBuffer, compress: bool) {
        if compress {
            if let Some(ptr) = buffer.name_pointer(self) {
                buffer.write_u16(ptr);
                return;
            }
        }

        buffer.memoise_name(self);
        for label in &self.labels {
            buffer.write_u8(label.len());
            buffer.write_octets(label.octets());
        }
    }
}

/// Errors encountered when serialising a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A counter does not fit in the desired width.
    CounterTooLarge { counter: usize, bits: u32 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CounterTooLarge { counter, bits } => {
                write!(f, "'{counter}' cannot be converted to a u{bits}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which can be written to, for serialisation purposes.
pub struct WritableBuffer {
    pub octets: BytesMut,
    name_pointers: HashMap<DomainName, u16>,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
            name_pointers: HashMap::new(),
        }
    }
}

impl WritableBuffer {
    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn memoise_name(&mut self, name: &DomainName) {
        if !name.is_root() && !self.name_pointers.contains_key(name) {
            if let Ok(index) = u16::try_from(self.index()) {
                let [hi, lo] = index.to_be_bytes();
                self.name_pointers
                    .insert(name.clone(), u16::from_be_bytes([hi | 0b1100_0000, lo]));
            }
        }
    }

    pub fn name_pointer(&self, name: &DomainName) -> Option<u16> {
        self.name_pointers.get(name).copied()
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.put_u8(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_octets(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_octets(&value.to_be_bytes());
    }

    /// Write the low 48 bits of `value`, big-endian.
    pub fn write_u48(&mut self, value: u64) {
        self.write_octets(&value.to_be_bytes()[2..]);
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.put_slice(octets);
    }
}

/// Helper function to convert a `usize` into a `u16` (or return an error).
///
/// # Errors
///
/// If the value cannot be converted.
fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    u16::try_from(counter).map_err(|_| Error::CounterTooLarge {
        counter,
        bits: u16::BITS,
    })
}
