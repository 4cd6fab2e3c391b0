//! The fixed 12-byte DNS message header (RFC 1035 §4.1.1, RFC 2535 §6.1 for
//! the AD/CD bits).
//!
//! Grounded on heimdall's `dns/header.rs` field layout (`DNSHeader` with one
//! field per flag bit) but replacing its `bitstream_io`/`PacketComponent`
//! read-write plumbing with plain big-endian byte slicing, since a 12-byte
//! fixed header has no need for a generic bit reader.

use crate::error::{NsdError, Result};

/// RFC 1035 §4.1.1 opcodes, plus RFC 1996 NOTIFY and RFC 2136 UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Query,
    IQuery,
    Status,
    Notify,
    Update,
    Unknown(u8),
}

impl Opcode {
    pub fn to_u8(self) -> u8 {
        match self {
            Opcode::Query => 0,
            Opcode::IQuery => 1,
            Opcode::Status => 2,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Unknown(v) => v,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Opcode::Query,
            1 => Opcode::IQuery,
            2 => Opcode::Status,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            other => Opcode::Unknown(other),
        }
    }
}

/// Response codes. The base header only carries the low 4 bits; EDNS
/// extends this to 12 bits via the OPT pseudo-RR's TTL field (spec §4.A
/// "EDNS(0)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    YxDomain,
    YxRrSet,
    NxRrSet,
    NotAuth,
    NotZone,
    BadVers,
    BadCookie,
    Unknown(u16),
}

impl Rcode {
    pub fn to_u16(self) -> u16 {
        match self {
            Rcode::NoError => 0,
            Rcode::FormErr => 1,
            Rcode::ServFail => 2,
            Rcode::NxDomain => 3,
            Rcode::NotImp => 4,
            Rcode::Refused => 5,
            Rcode::YxDomain => 6,
            Rcode::YxRrSet => 7,
            Rcode::NxRrSet => 8,
            Rcode::NotAuth => 9,
            Rcode::NotZone => 10,
            Rcode::BadVers => 16,
            Rcode::BadCookie => 23,
            Rcode::Unknown(v) => v,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        match v {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NxDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            6 => Rcode::YxDomain,
            7 => Rcode::YxRrSet,
            8 => Rcode::NxRrSet,
            9 => Rcode::NotAuth,
            10 => Rcode::NotZone,
            16 => Rcode::BadVers,
            23 => Rcode::BadCookie,
            other => Rcode::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub qr: bool,
    pub opcode: Opcode,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    /// RFC 2535 §6.1 "authentic data" — set by a validating resolver.
    /// An authoritative-only server copies it through but never sets it.
    pub ad: bool,
    /// "checking disabled" — copied through unchanged.
    pub cd: bool,
    pub rcode: Rcode,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    pub const WIRE_LEN: usize = 12;

    pub fn decode(bytes: &[u8]) -> Result<(Header, usize)> {
        if bytes.len() < Self::WIRE_LEN {
            return Err(NsdError::Parse {
                offset: 0,
                reason: "message shorter than DNS header".into(),
            });
        }
        let id = u16::from_be_bytes([bytes[0], bytes[1]]);
        let flags = u16::from_be_bytes([bytes[2], bytes[3]]);
        let header = Header {
            id,
            qr: flags & 0x8000 != 0,
            opcode: Opcode::from_u8(((flags >> 11) & 0x0F) as u8),
            aa: flags & 0x0400 != 0,
            tc: flags & 0x0200 != 0,
            rd: flags & 0x0100 != 0,
            ra: flags & 0x0080 != 0,
            ad: flags & 0x0020 != 0,
            cd: flags & 0x0010 != 0,
            rcode: Rcode::from_u16(flags & 0x000F),
            qdcount: u16::from_be_bytes([bytes[4], bytes[5]]),
            ancount: u16::from_be_bytes([bytes[6], bytes[7]]),
            nscount: u16::from_be_bytes([bytes[8], bytes[9]]),
            arcount: u16::from_be_bytes([bytes[10], bytes[11]]),
        };
        Ok((header, Self::WIRE_LEN))
    }

    /// Merge in the extended rcode bits carried by an EDNS OPT record
    /// (spec §4.A). Call after decoding the additional section.
    pub fn apply_extended_rcode(&mut self, extended: u8) {
        let low4 = self.rcode.to_u16() & 0x000F;
        self.rcode = Rcode::from_u16(((extended as u16) << 4) | low4);
    }

    /// Split the (possibly extended) rcode into `(low4, high8)` for
    /// encoding: `low4` goes in the header, `high8` in the OPT TTL.
    pub fn rcode_split(&self) -> (u16, u8) {
        let full = self.rcode.to_u16();
        (full & 0x000F, (full >> 4) as u8)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_be_bytes());
        let (low4, _high) = self.rcode_split();
        let mut flags = low4;
        if self.qr {
            flags |= 0x8000;
        }
        flags |= (self.opcode.to_u8() as u16 & 0x0F) << 11;
        if self.aa {
            flags |= 0x0400;
        }
        if self.tc {
            flags |= 0x0200;
        }
        if self.rd {
            flags |= 0x0100;
        }
        if self.ra {
            flags |= 0x0080;
        }
        if self.ad {
            flags |= 0x0020;
        }
        if self.cd {
            flags |= 0x0010;
        }
        out.extend_from_slice(&flags.to_be_bytes());
        out.extend_from_slice(&self.qdcount.to_be_bytes());
        out.extend_from_slice(&self.ancount.to_be_bytes());
        out.extend_from_slice(&self.nscount.to_be_bytes());
        out.extend_from_slice(&self.arcount.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips() {
        let h = Header {
            id: 0x1234,
            qr: true,
            opcode: Opcode::Query,
            aa: true,
            tc: false,
            rd: true,
            ra: true,
            ad: false,
            cd: false,
            rcode: Rcode::NxDomain,
            qdcount: 1,
            ancount: 0,
            nscount: 1,
            arcount: 1,
        };
        let mut buf = Vec::new();
        h.encode(&mut buf);
        let (decoded, len) = Header::decode(&buf).unwrap();
        assert_eq!(len, 12);
        assert_eq!(decoded, h);
    }

    #[test]
    fn extended_rcode_splits_and_merges() {
        let mut h = Header {
            id: 1,
            qr: true,
            opcode: Opcode::Query,
            aa: false,
            tc: false,
            rd: false,
            ra: false,
            ad: false,
            cd: false,
            rcode: Rcode::Unknown(16), // BADVERS: 0x1 high byte, 0x0 low
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        };
        let (low, high) = h.rcode_split();
        assert_eq!(low, 0);
        assert_eq!(high, 1);
        h.rcode = Rcode::NoError;
        h.apply_extended_rcode(high);
        assert_eq!(h.rcode.to_u16(), 16);
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(Header::decode(&[0u8; 4]).is_err());
    }
}
