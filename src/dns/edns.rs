//! EDNS(0) (RFC 6891): the OPT pseudo-RR carried in the additional section,
//! used to negotiate a larger UDP payload size, the extended rcode/version,
//! the DNSSEC-OK bit, and option-coded extensions (NSID, COOKIE).
//!
//! Modeled as a value alongside the message rather than folded into
//! [`crate::rr::RData`]: OPT is a pseudo-RR (spec §4.A) whose "rdata" is an
//! option list, not one of the closed set of real record types, and its
//! presence/TTL fields interact with the header's rcode rather than with
//! zone storage.

use crate::error::{NsdError, Result};
use crate::name::{CompressionTable, Name};
use crate::rr::{DnsClass, RrType};

pub const OPT_CODE_NSID: u16 = 3;
pub const OPT_CODE_COOKIE: u16 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edns {
    pub udp_payload_size: u16,
    pub version: u8,
    pub extended_rcode: u8,
    pub do_bit: bool,
    pub options: Vec<EdnsOption>,
}

impl Edns {
    pub fn new(udp_payload_size: u16) -> Self {
        Edns {
            udp_payload_size,
            version: 0,
            extended_rcode: 0,
            do_bit: false,
            options: Vec::new(),
        }
    }

    pub fn cookie(&self) -> Option<&[u8]> {
        self.options.iter().find(|o| o.code == OPT_CODE_COOKIE).map(|o| o.data.as_slice())
    }

    /// Decode an OPT record already located in the additional section.
    /// `class` and `ttl` are the raw RR fields (the owner must be the root
    /// name, checked by the caller).
    pub fn decode(class: u16, ttl: u32, rdata: &[u8]) -> Result<Edns> {
        let version = ((ttl >> 16) & 0xFF) as u8;
        let extended_rcode = ((ttl >> 24) & 0xFF) as u8;
        let do_bit = ttl & 0x8000 != 0;
        let mut options = Vec::new();
        let mut pos = 0;
        while pos < rdata.len() {
            if pos + 4 > rdata.len() {
                return Err(NsdError::Parse {
                    offset: pos,
                    reason: "truncated EDNS option header".into(),
                });
            }
            let code = u16::from_be_bytes([rdata[pos], rdata[pos + 1]]);
            let len = u16::from_be_bytes([rdata[pos + 2], rdata[pos + 3]]) as usize;
            pos += 4;
            if pos + len > rdata.len() {
                return Err(NsdError::Parse {
                    offset: pos,
                    reason: "truncated EDNS option data".into(),
                });
            }
            options.push(EdnsOption {
                code,
                data: rdata[pos..pos + len].to_vec(),
            });
            pos += len;
        }
        Ok(Edns {
            udp_payload_size: class,
            version,
            extended_rcode,
            do_bit,
            options,
        })
    }

    /// Encode as an OPT RR: root owner, type OPT, class = payload size,
    /// TTL packs extended-rcode/version/flags, rdata is the option list.
    pub fn encode(&self, out: &mut Vec<u8>, comp: &mut CompressionTable) {
        Name::root().write_compressed(out, comp);
        out.extend_from_slice(&RrType::Opt.to_u16().to_be_bytes());
        out.extend_from_slice(&self.udp_payload_size.to_be_bytes());
        let mut ttl = (self.extended_rcode as u32) << 24 | (self.version as u32) << 16;
        if self.do_bit {
            ttl |= 0x8000;
        }
        out.extend_from_slice(&ttl.to_be_bytes());
        let mut rdata = Vec::new();
        for opt in &self.options {
            rdata.extend_from_slice(&opt.code.to_be_bytes());
            rdata.extend_from_slice(&(opt.data.len() as u16).to_be_bytes());
            rdata.extend_from_slice(&opt.data);
        }
        out.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        out.extend_from_slice(&rdata);
    }

    /// Class value is reused as the requester's class in the question
    /// section's semantics; OPT records always claim class `Unknown` here
    /// since the field is repurposed as a payload size, not a real class.
    pub const fn pseudo_class() -> DnsClass {
        DnsClass::Unknown(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edns_roundtrips_with_cookie_option() {
        let mut edns = Edns::new(4096);
        edns.do_bit = true;
        edns.extended_rcode = 1;
        edns.options.push(EdnsOption {
            code: OPT_CODE_COOKIE,
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
        });
        let mut out = Vec::new();
        let mut comp = CompressionTable::new();
        edns.encode(&mut out, &mut comp);
        // Skip the root-name byte (1) and type (2) to reach class/ttl/rdlen.
        let class = u16::from_be_bytes([out[1], out[2]]);
        let ttl = u32::from_be_bytes([out[3], out[4], out[5], out[6]]);
        let rdlen = u16::from_be_bytes([out[7], out[8]]) as usize;
        let rdata = &out[9..9 + rdlen];
        let decoded = Edns::decode(class, ttl, rdata).unwrap();
        assert_eq!(decoded.udp_payload_size, 4096);
        assert!(decoded.do_bit);
        assert_eq!(decoded.extended_rcode, 1);
        assert_eq!(decoded.cookie(), Some(&[1u8, 2, 3, 4, 5, 6, 7, 8][..]));
    }
}
