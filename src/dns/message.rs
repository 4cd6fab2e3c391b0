//! A fully decoded DNS message: header, question, and the three RR
//! sections, with the EDNS OPT and TSIG pseudo-RRs split out of the
//! additional section into their own fields (spec §4.A "Decode").
//!
//! Grounded on heimdall's `dns/mod.rs` `DNSPacket` (header + sections +
//! pulled-out pseudo-RRs) generalized from a single-question resolver
//! packet to the general multi-record authoritative message spec §4.A
//! describes, and rebuilt on [`crate::name::Name`]/[`crate::rr::RData`]
//! instead of heimdall's `DnsResourceRecord`.

use crate::dns::edns::Edns;
use crate::dns::header::{Header, Opcode, Rcode};
use crate::dns::question::Question;
use crate::error::{NsdError, Result};
use crate::name::{CompressionTable, Name};
use crate::rr::{DnsClass, RData, Rr, RrType};

/// Maximum records §4.A allows this crate to accept in a single section
/// before refusing the message outright; NSD enforces a similar sanity
/// bound to avoid amplification via crafted section counts.
const MAX_SECTION_RRS: u16 = 8192;

#[derive(Debug, Clone)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Rr>,
    pub authority: Vec<Rr>,
    pub additional: Vec<Rr>,
    pub edns: Option<Edns>,
    /// Raw TSIG RR bytes (owner name + rdata), left unparsed here — signing
    /// and verification need the exact wire bytes of everything preceding
    /// it, so [`crate::tsig`] re-reads the original buffer directly.
    pub tsig: Option<TsigRr>,
}

#[derive(Debug, Clone)]
pub struct TsigRr {
    pub key_name: Name,
    pub algorithm: Name,
    pub time_signed: u64,
    pub fudge: u16,
    pub mac: Vec<u8>,
    pub original_id: u16,
    pub error: u16,
    pub other_data: Vec<u8>,
}

impl Message {
    pub fn decode(msg: &[u8]) -> Result<Message> {
        let (header, mut pos) = Header::decode(msg)?;
        if header.qdcount > MAX_SECTION_RRS
            || header.ancount > MAX_SECTION_RRS
            || header.nscount > MAX_SECTION_RRS
            || header.arcount > MAX_SECTION_RRS
        {
            return Err(NsdError::Parse {
                offset: 0,
                reason: "section count exceeds sanity bound".into(),
            });
        }

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let (q, next) = Question::decode(msg, pos)?;
            questions.push(q);
            pos = next;
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            let (rr, next) = decode_rr(msg, pos)?;
            answers.push(rr);
            pos = next;
        }

        let mut authority = Vec::with_capacity(header.nscount as usize);
        for _ in 0..header.nscount {
            let (rr, next) = decode_rr(msg, pos)?;
            authority.push(rr);
            pos = next;
        }

        let mut additional = Vec::new();
        let mut edns = None;
        let mut tsig = None;
        for _ in 0..header.arcount {
            let (owner, type_pos) = Name::from_wire_compressed(msg, pos)?;
            if type_pos + 10 > msg.len() {
                return Err(NsdError::Parse {
                    offset: type_pos,
                    reason: "truncated RR header".into(),
                });
            }
            let rtype = RrType::from_u16(u16::from_be_bytes([msg[type_pos], msg[type_pos + 1]]));
            let class = u16::from_be_bytes([msg[type_pos + 2], msg[type_pos + 3]]);
            let ttl = u32::from_be_bytes([
                msg[type_pos + 4],
                msg[type_pos + 5],
                msg[type_pos + 6],
                msg[type_pos + 7],
            ]);
            let rdlen = u16::from_be_bytes([msg[type_pos + 8], msg[type_pos + 9]]) as usize;
            let rdata_start = type_pos + 10;
            if rdata_start + rdlen > msg.len() {
                return Err(NsdError::Parse {
                    offset: rdata_start,
                    reason: "truncated rdata".into(),
                });
            }
            let rdata_bytes = &msg[rdata_start..rdata_start + rdlen];
            let next = rdata_start + rdlen;

            match rtype {
                RrType::Opt => {
                    edns = Some(Edns::decode(class, ttl, rdata_bytes)?);
                }
                RrType::Tsig => {
                    tsig = Some(decode_tsig_rdata(owner, msg, rdata_start, rdlen)?);
                }
                other => {
                    let rdata = RData::decode(other, msg, rdata_start, rdlen)?;
                    additional.push(Rr {
                        owner,
                        class: DnsClass::from_u16(class),
                        rtype: other,
                        ttl,
                        rdata,
                    });
                }
            }
            pos = next;
        }

        let mut header = header;
        if let Some(e) = &edns {
            header.apply_extended_rcode(e.extended_rcode);
        }

        Ok(Message {
            header,
            questions,
            answers,
            authority,
            additional,
            edns,
            tsig,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(512);
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authority.len() as u16;
        header.arcount = self.additional.len() as u16 + self.edns.is_some() as u16 + self.tsig.is_some() as u16;
        header.encode(&mut out);

        let mut comp = CompressionTable::new();
        for q in &self.questions {
            q.encode(&mut out, &mut comp);
        }
        for rr in &self.answers {
            encode_rr(rr, &mut out, &mut comp);
        }
        for rr in &self.authority {
            encode_rr(rr, &mut out, &mut comp);
        }
        for rr in &self.additional {
            encode_rr(rr, &mut out, &mut comp);
        }
        if let Some(edns) = &self.edns {
            edns.encode(&mut out, &mut comp);
        }
        if let Some(tsig) = &self.tsig {
            encode_tsig_rdata(tsig, &mut out);
        }
        out
    }

    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    pub fn is_query(&self) -> bool {
        !self.header.qr
    }

    pub fn is_notify(&self) -> bool {
        self.header.opcode == Opcode::Notify
    }

    pub fn is_axfr_or_ixfr(&self) -> bool {
        self.question()
            .is_some_and(|q| matches!(q.qtype, RrType::Axfr | RrType::Ixfr))
    }

    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.header.rcode = rcode;
        if let Some(edns) = &mut self.edns {
            let (_, high) = self.header.rcode_split();
            edns.extended_rcode = high;
        }
    }
}

/// Locate the byte offset of the TSIG RR within a message that is already
/// known to decode successfully, without re-encoding it. TSIG signing and
/// verification need the exact wire offset into the *original* received
/// bytes (RFC 8945 §5.3's signed region is a prefix of those bytes, not of
/// some later re-encoding), so this walks the same section layout
/// [`Message::decode`] does and stops at the first TSIG RR.
pub fn tsig_rr_offset(msg: &[u8]) -> Option<usize> {
    let (header, mut pos) = Header::decode(msg).ok()?;
    for _ in 0..header.qdcount {
        let (_, next) = Question::decode(msg, pos).ok()?;
        pos = next;
    }
    for _ in 0..header.ancount {
        let (_, next) = decode_rr(msg, pos).ok()?;
        pos = next;
    }
    for _ in 0..header.nscount {
        let (_, next) = decode_rr(msg, pos).ok()?;
        pos = next;
    }
    for _ in 0..header.arcount {
        let rr_start = pos;
        let (_, type_pos) = Name::from_wire_compressed(msg, pos).ok()?;
        if type_pos + 10 > msg.len() {
            return None;
        }
        let rtype = RrType::from_u16(u16::from_be_bytes([msg[type_pos], msg[type_pos + 1]]));
        let rdlen = u16::from_be_bytes([msg[type_pos + 8], msg[type_pos + 9]]) as usize;
        let rdata_start = type_pos + 10;
        if rdata_start + rdlen > msg.len() {
            return None;
        }
        if rtype == RrType::Tsig {
            return Some(rr_start);
        }
        pos = rdata_start + rdlen;
    }
    None
}

fn decode_rr(msg: &[u8], pos: usize) -> Result<(Rr, usize)> {
    let (owner, type_pos) = Name::from_wire_compressed(msg, pos)?;
    if type_pos + 10 > msg.len() {
        return Err(NsdError::Parse {
            offset: type_pos,
            reason: "truncated RR header".into(),
        });
    }
    let rtype = RrType::from_u16(u16::from_be_bytes([msg[type_pos], msg[type_pos + 1]]));
    let class = u16::from_be_bytes([msg[type_pos + 2], msg[type_pos + 3]]);
    let ttl = u32::from_be_bytes([
        msg[type_pos + 4],
        msg[type_pos + 5],
        msg[type_pos + 6],
        msg[type_pos + 7],
    ]);
    let rdlen = u16::from_be_bytes([msg[type_pos + 8], msg[type_pos + 9]]) as usize;
    let rdata_start = type_pos + 10;
    if rdata_start + rdlen > msg.len() {
        return Err(NsdError::Parse {
            offset: rdata_start,
            reason: "truncated rdata".into(),
        });
    }
    let rdata = RData::decode(rtype, msg, rdata_start, rdlen)?;
    Ok((
        Rr {
            owner,
            class: DnsClass::from_u16(class),
            rtype,
            ttl,
            rdata,
        },
        rdata_start + rdlen,
    ))
}

fn encode_rr(rr: &Rr, out: &mut Vec<u8>, comp: &mut CompressionTable) {
    rr.owner.write_compressed(out, comp);
    out.extend_from_slice(&rr.rtype.to_u16().to_be_bytes());
    out.extend_from_slice(&rr.class.to_u16().to_be_bytes());
    out.extend_from_slice(&rr.ttl.to_be_bytes());
    let rdlen_pos = out.len();
    out.extend_from_slice(&[0, 0]);
    let rdata_start = out.len();
    rr.rdata.encode(out, comp);
    let rdlen = (out.len() - rdata_start) as u16;
    out[rdlen_pos..rdlen_pos + 2].copy_from_slice(&rdlen.to_be_bytes());
}

fn decode_tsig_rdata(owner: Name, msg: &[u8], start: usize, len: usize) -> Result<TsigRr> {
    let rdata = &msg[start..start + len];
    let (algorithm, mut p) = Name::from_wire_compressed(msg, start)?;
    let rel = |pos: usize| pos - start;
    if rel(p) + 10 > rdata.len() {
        return Err(NsdError::Parse {
            offset: p,
            reason: "truncated TSIG rdata".into(),
        });
    }
    let time_hi = u16::from_be_bytes([msg[p], msg[p + 1]]) as u64;
    let time_lo = u32::from_be_bytes([msg[p + 2], msg[p + 3], msg[p + 4], msg[p + 5]]) as u64;
    let time_signed = (time_hi << 32) | time_lo;
    let fudge = u16::from_be_bytes([msg[p + 6], msg[p + 7]]);
    let mac_size = u16::from_be_bytes([msg[p + 8], msg[p + 9]]) as usize;
    p += 10;
    if rel(p) + mac_size + 6 > rdata.len() {
        return Err(NsdError::Parse {
            offset: p,
            reason: "truncated TSIG MAC".into(),
        });
    }
    let mac = msg[p..p + mac_size].to_vec();
    p += mac_size;
    let original_id = u16::from_be_bytes([msg[p], msg[p + 1]]);
    let error = u16::from_be_bytes([msg[p + 2], msg[p + 3]]);
    let other_len = u16::from_be_bytes([msg[p + 4], msg[p + 5]]) as usize;
    p += 6;
    if rel(p) + other_len > rdata.len() {
        return Err(NsdError::Parse {
            offset: p,
            reason: "truncated TSIG other data".into(),
        });
    }
    let other_data = msg[p..p + other_len].to_vec();
    Ok(TsigRr {
        key_name: owner,
        algorithm,
        time_signed,
        fudge,
        mac,
        original_id,
        error,
        other_data,
    })
}

fn encode_tsig_rdata(tsig: &TsigRr, out: &mut Vec<u8>) {
    // TSIG is never compressed (RFC 8945 §5.2) and its own owner/algorithm
    // names are written literally, not via the message's compression
    // table, so a record written late in the packet still verifies.
    tsig.key_name.write_uncompressed(out);
    out.extend_from_slice(&RrType::Tsig.to_u16().to_be_bytes());
    out.extend_from_slice(&DnsClass::Any.to_u16().to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // TTL is always 0.
    let rdlen_pos = out.len();
    out.extend_from_slice(&[0, 0]);
    let rdata_start = out.len();
    tsig.algorithm.write_uncompressed(out);
    out.extend_from_slice(&((tsig.time_signed >> 32) as u16).to_be_bytes());
    out.extend_from_slice(&((tsig.time_signed & 0xFFFF_FFFF) as u32).to_be_bytes());
    out.extend_from_slice(&tsig.fudge.to_be_bytes());
    out.extend_from_slice(&(tsig.mac.len() as u16).to_be_bytes());
    out.extend_from_slice(&tsig.mac);
    out.extend_from_slice(&tsig.original_id.to_be_bytes());
    out.extend_from_slice(&tsig.error.to_be_bytes());
    out.extend_from_slice(&(tsig.other_data.len() as u16).to_be_bytes());
    out.extend_from_slice(&tsig.other_data);
    let rdlen = (out.len() - rdata_start) as u16;
    out[rdlen_pos..rdlen_pos + 2].copy_from_slice(&rdlen.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::header::{Opcode, Rcode};
    use std::net::Ipv4Addr;

    fn base_header(ancount: u16) -> Header {
        Header {
            id: 42,
            qr: true,
            opcode: Opcode::Query,
            aa: true,
            tc: false,
            rd: true,
            ra: false,
            ad: false,
            cd: false,
            rcode: Rcode::NoError,
            qdcount: 1,
            ancount,
            nscount: 0,
            arcount: 0,
        }
    }

    #[test]
    fn message_roundtrips_with_answer() {
        let msg = Message {
            header: base_header(1),
            questions: vec![Question {
                qname: Name::make("example.com").unwrap(),
                qtype: RrType::A,
                qclass: DnsClass::In,
            }],
            answers: vec![Rr::new(
                Name::make("example.com").unwrap(),
                DnsClass::In,
                3600,
                RData::A(Ipv4Addr::new(192, 0, 2, 1)),
            )],
            authority: vec![],
            additional: vec![],
            edns: None,
            tsig: None,
        };
        let bytes = msg.encode();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded.questions.len(), 1);
        assert_eq!(decoded.answers.len(), 1);
        assert_eq!(decoded.answers[0].rdata, RData::A(Ipv4Addr::new(192, 0, 2, 1)));
    }

    #[test]
    fn message_splits_edns_out_of_additional() {
        let mut msg = Message {
            header: base_header(0),
            questions: vec![Question {
                qname: Name::make("example.com").unwrap(),
                qtype: RrType::A,
                qclass: DnsClass::In,
            }],
            answers: vec![],
            authority: vec![],
            additional: vec![],
            edns: Some(Edns::new(4096)),
            tsig: None,
        };
        msg.header.arcount = 1;
        let bytes = msg.encode();
        let decoded = Message::decode(&bytes).unwrap();
        assert!(decoded.additional.is_empty());
        assert_eq!(decoded.edns.unwrap().udp_payload_size, 4096);
    }

    #[test]
    fn rejects_oversized_section_counts() {
        let mut bytes = vec![0u8; 12];
        bytes[4] = 0xFF;
        bytes[5] = 0xFF; // qdcount = 65535
        assert!(Message::decode(&bytes).is_err());
    }
}
