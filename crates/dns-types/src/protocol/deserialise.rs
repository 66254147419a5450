//! Deserialisation of DNS messages from the network.  See the `types`
//! module for details of the format.

use bytes::Bytes;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;

impl Message {
    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        Self::deserialise(&mut ConsumableBuffer::new(octets))
    }

    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let wire_header = WireHeader::deserialise(buffer)?;
        let id = wire_header.header.id;

        let mut questions = Vec::with_capacity(wire_header.qdcount.into());
        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(id, buffer)?);
        }

        let mut section = |count: u16| -> Result<Vec<ResourceRecord>, Error> {
            let mut rrs = Vec::with_capacity(count.into());
            for _ in 0..count {
                rrs.push(ResourceRecord::deserialise(id, buffer)?);
            }
            Ok(rrs)
        };
        let answers = section(wire_header.ancount)?;
        let authority = section(wire_header.nscount)?;
        let additional = section(wire_header.arcount)?;

        Ok(Self {
            header: wire_header.header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

/// A `Header` plus the section counts, which only matter while
/// parsing.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct WireHeader {
    pub header: Header,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl WireHeader {
    /// # Errors
    ///
    /// If the header is too short.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::CompletelyBusted)?;
        let flags1 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let flags2 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let qdcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let ancount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let nscount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let arcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;

        Ok(Self {
            header: Header {
                id,
                is_response: flags1 & HEADER_MASK_QR != 0,
                opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
                is_authoritative: flags1 & HEADER_MASK_AA != 0,
                is_truncated: flags1 & HEADER_MASK_TC != 0,
                recursion_desired: flags1 & HEADER_MASK_RD != 0,
                recursion_available: flags2 & HEADER_MASK_RA != 0,
                rcode: Rcode::from((flags2 & HEADER_MASK_RCODE) >> HEADER_OFFSET_RCODE),
            },
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    /// # Errors
    ///
    /// If the question cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let qtype = buffer.next_u16().ok_or(Error::QuestionTooShort(id))?;
        let qclass = buffer.next_u16().ok_or(Error::QuestionTooShort(id))?;

        Ok(Self {
            name,
            qtype: QueryType::from(qtype),
            qclass: QueryClass::from(qclass),
        })
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the record cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let too_short = Error::ResourceRecordTooShort(id);

        let name = DomainName::deserialise(id, buffer)?;
        let rtype = RecordType::from(buffer.next_u16().ok_or(too_short)?);
        let rclass = RecordClass::from(buffer.next_u16().ok_or(too_short)?);
        let ttl = buffer.next_u32().ok_or(too_short)?;
        let rdlength = buffer.next_u16().ok_or(too_short)?;

        let rdata_start = buffer.position;

        // for records which include domain names, deserialise them to
        // expand pointers.
        let rtype_with_data = match rtype {
            RecordType::A => RecordTypeWithData::A {
                address: Ipv4Addr::from(buffer.next_u32().ok_or(too_short)?),
            },
            RecordType::NS => RecordTypeWithData::NS {
                nsdname: DomainName::deserialise(id, buffer)?,
            },
            RecordType::CNAME => RecordTypeWithData::CNAME {
                cname: DomainName::deserialise(id, buffer)?,
            },
            RecordType::SOA => RecordTypeWithData::SOA {
                mname: DomainName::deserialise(id, buffer)?,
                rname: DomainName::deserialise(id, buffer)?,
                serial: buffer.next_u32().ok_or(too_short)?,
                refresh: buffer.next_u32().ok_or(too_short)?,
                retry: buffer.next_u32().ok_or(too_short)?,
                expire: buffer.next_u32().ok_or(too_short)?,
                minimum: buffer.next_u32().ok_or(too_short)?,
            },
            RecordType::PTR => RecordTypeWithData::PTR {
                ptrdname: DomainName::deserialise(id, buffer)?,
            },
            RecordType::MX => RecordTypeWithData::MX {
                preference: buffer.next_u16().ok_or(too_short)?,
                exchange: DomainName::deserialise(id, buffer)?,
            },
            RecordType::TXT => RecordTypeWithData::TXT {
                octets: buffer.take_bytes(rdlength.into()).ok_or(too_short)?,
            },
            RecordType::AAAA => {
                let octets: [u8; 16] = buffer
                    .take(16)
                    .and_then(|os| os.try_into().ok())
                    .ok_or(too_short)?;
                RecordTypeWithData::AAAA {
                    address: Ipv6Addr::from(octets),
                }
            }
            RecordType::OPT => RecordTypeWithData::OPT {
                octets: buffer.take_bytes(rdlength.into()).ok_or(too_short)?,
            },
            RecordType::TSIG => {
                let algorithm = DomainName::deserialise(id, buffer)?;
                let time_hi = buffer.next_u16().ok_or(too_short)?;
                let time_lo = buffer.next_u32().ok_or(too_short)?;
                let fudge = buffer.next_u16().ok_or(too_short)?;
                let mac_size = buffer.next_u16().ok_or(too_short)?;
                let mac = buffer.take_bytes(mac_size.into()).ok_or(too_short)?;
                let original_id = buffer.next_u16().ok_or(too_short)?;
                let error = buffer.next_u16().ok_or(too_short)?;
                let other_len = buffer.next_u16().ok_or(too_short)?;
                let other = buffer.take_bytes(other_len.into()).ok_or(too_short)?;
                RecordTypeWithData::TSIG {
                    algorithm,
                    time_signed: (u64::from(time_hi) << 32) | u64::from(time_lo),
                    fudge,
                    mac,
                    original_id,
                    error,
                    other,
                }
            }
            RecordType::Unknown(tag) => RecordTypeWithData::Unknown {
                tag,
                octets: buffer.take_bytes(rdlength.into()).ok_or(too_short)?,
            },
        };

        if buffer.position == rdata_start + usize::from(rdlength) {
            Ok(Self {
                name,
                rtype_with_data,
                rclass,
                ttl,
            })
        } else {
            Err(Error::ResourceRecordInvalid(id))
        }
    }
}

impl DomainName {
    /// # Errors
    ///
    /// If the domain cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let mut len = 0;
        let mut labels = Vec::<Label>::with_capacity(5);
        let start = buffer.position;

        loop {
            let size = buffer.next_u8().ok_or(Error::DomainTooShort(id))?;

            if usize::from(size) <= LABEL_MAX_LEN {
                len += 1 + usize::from(size);

                if size == 0 {
                    labels.push(Label::new());
                    break;
                }

                let os = buffer
                    .take(size.into())
                    .ok_or(Error::DomainTooShort(id))?;
                let label = Label::try_from(os).map_err(|_| Error::DomainLabelInvalid(id))?;
                labels.push(label);

                if len > DOMAINNAME_MAX_LEN {
                    return Err(Error::DomainTooLong(id));
                }
            } else if size >= 192 {
                let hi = size & 0b0011_1111;
                let lo = buffer.next_u8().ok_or(Error::DomainTooShort(id))?;
                let ptr = u16::from_be_bytes([hi, lo]).into();

                // pointer must be to an earlier record (not merely a
                // different one: an earlier one: RFC 1035 section
                // 4.1.4)
                if ptr >= start {
                    return Err(Error::DomainPointerInvalid(id));
                }

                let other = DomainName::deserialise(id, &mut buffer.at_offset(ptr))?;
                len += other.len;
                labels.extend(other.labels);
                break;
            } else {
                return Err(Error::DomainLabelInvalid(id));
            }
        }

        if len <= DOMAINNAME_MAX_LEN {
            Ok(DomainName { labels, len })
        } else {
            Err(Error::DomainTooLong(id))
        }
    }
}

/// Errors encountered when parsing a datagram.  In all the errors
/// which have a `u16` parameter, that is the ID from the header.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The datagram is not even 2 octets long, so it doesn't even
    /// contain a valid ID.
    CompletelyBusted,

    /// The header is missing one or more required fields.
    HeaderTooShort(u16),

    /// A question ends with an incomplete field.
    QuestionTooShort(u16),

    /// A resource record ends with an incomplete field.
    ResourceRecordTooShort(u16),

    /// A resource record is the wrong format.
    ResourceRecordInvalid(u16),

    /// A domain is incomplete.
    DomainTooShort(u16),

    /// A domain is over 255 octets in size.
    DomainTooLong(u16),

    /// A domain pointer points to or after the current record.
    DomainPointerInvalid(u16),

    /// A domain label is longer than 63 octets, but not a pointer.
    DomainLabelInvalid(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::CompletelyBusted => None,
            Error::HeaderTooShort(id)
            | Error::QuestionTooShort(id)
            | Error::ResourceRecordTooShort(id)
            | Error::ResourceRecordInvalid(id)
            | Error::DomainTooShort(id)
            | Error::DomainTooLong(id)
            | Error::DomainPointerInvalid(id)
            | Error::DomainLabelInvalid(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CompletelyBusted => write!(f, "message too short to hold an ID"),
            Error::HeaderTooShort(_) => write!(f, "header too short"),
            Error::QuestionTooShort(_) => write!(f, "question too short"),
            Error::ResourceRecordTooShort(_) => write!(f, "resource record too short"),
            Error::ResourceRecordInvalid(_) => write!(f, "resource record length mismatch"),
            Error::DomainTooShort(_) => write!(f, "domain name too short"),
            Error::DomainTooLong(_) => write!(f, "domain name too long"),
            Error::DomainPointerInvalid(_) => write!(f, "domain name pointer invalid"),
            Error::DomainLabelInvalid(_) => write!(f, "domain name label invalid"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which will be consumed by the parsing process.
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        let octet = *self.octets.get(self.position)?;
        self.position += 1;
        Some(octet)
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        let octets = self.take(2)?;
        Some(u16::from_be_bytes([octets[0], octets[1]]))
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        let octets = self.take(4)?;
        Some(u32::from_be_bytes([octets[0], octets[1], octets[2], octets[3]]))
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.octets.len() >= self.position + size {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }

    pub fn take_bytes(&mut self, size: usize) -> Option<Bytes> {
        self.take(size).map(Bytes::copy_from_slice)
    }

    pub fn at_offset(&self, position: usize) -> ConsumableBuffer<'a> {
        Self {
            octets: self.octets,
            position,
        }
    }
}
